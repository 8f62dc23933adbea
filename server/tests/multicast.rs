// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! End-to-end tests of the enqueue pipeline and the dispatcher.
//!
//! These need a PostgreSQL instance; set `DATABASE_URL` and run with
//! `cargo test -- --ignored`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_bb8_diesel::AsyncSimpleConnection;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use slog::o;
use tokio::sync::Mutex;
use uuid::Uuid;

use lorikeet::classb;
use lorikeet::config::Config;
use lorikeet::gateway::{GatewayBackend, TxInfo};
use lorikeet::rxinfo::{
    DeviceGatewayRxInfo, DeviceGatewayRxInfoSet, InMemoryRxInfoStore,
};
use lorikeet::Core;
use lorikeet_common::{gps, Error};
use lorikeet_db_model::{
    MulticastGroup, MulticastGroupParams, MulticastGroupType,
    MulticastQueueItemValues,
};
use lorikeet_db_queries::DataStore;
use lorikeet_lorawan::{Aes128Key, DevAddr, Eui64};

const SCHEMA_SQL: &str = include_str!("../../schema/dbinit.sql");

/// Applied once per test binary; concurrent `CREATE TABLE IF NOT EXISTS`
/// can still race inside PostgreSQL.
static SCHEMA_APPLIED: tokio::sync::OnceCell<()> =
    tokio::sync::OnceCell::const_new();

/// All tests share one database and the dispatcher tests claim whatever
/// group is dispatchable, so tests in this binary run one at a time.
static DB_LOCK: tokio::sync::Mutex<()> = tokio::sync::Mutex::const_new(());

struct RecordingBackend {
    sends: Mutex<Vec<(u16, TxInfo, Vec<u8>)>>,
    fail_next: AtomicBool,
}

impl RecordingBackend {
    fn new() -> Arc<RecordingBackend> {
        Arc::new(RecordingBackend {
            sends: Mutex::new(Vec::new()),
            fail_next: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl GatewayBackend for RecordingBackend {
    async fn send_tx_packet(
        &self,
        token: u16,
        tx_info: &TxInfo,
        phy_payload: &[u8],
    ) -> Result<(), Error> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(Error::unavail("gateway backend down"));
        }
        self.sends.lock().await.push((
            token,
            tx_info.clone(),
            phy_payload.to_vec(),
        ));
        Ok(())
    }
}

struct TestHarness {
    core: Arc<Core>,
    rxinfo: Arc<InMemoryRxInfoStore>,
    backend: Arc<RecordingBackend>,
}

async fn harness() -> TestHarness {
    let url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must point at a PostgreSQL instance");
    let config: Config = toml::from_str(&format!(
        r#"
        [database]
        url = "{url}"
        "#
    ))
    .unwrap();

    let log = slog::Logger::root(slog::Discard, o!());
    let datastore = Arc::new(
        DataStore::new(&log, &config.database).await.unwrap(),
    );
    SCHEMA_APPLIED
        .get_or_init(|| async {
            let conn = datastore.pool_connection().await.unwrap();
            conn.batch_execute_async(SCHEMA_SQL)
                .await
                .expect("apply schema");
        })
        .await;

    let rxinfo =
        Arc::new(InMemoryRxInfoStore::new(std::time::Duration::from_secs(
            3600,
        )));
    let backend = RecordingBackend::new();
    let core = Arc::new(
        Core::new(
            &log,
            datastore,
            rxinfo.clone(),
            backend.clone(),
            &config,
        )
        .unwrap(),
    );
    TestHarness {
        core,
        rxinfo,
        backend,
    }
}

fn fresh_eui() -> Eui64 {
    let id = Uuid::new_v4();
    Eui64::from_slice(&id.as_bytes()[..8]).unwrap()
}

async fn insert_device(core: &Core, dev_eui: Eui64) {
    let conn = core.datastore().pool_connection().await.unwrap();
    conn.batch_execute_async(&format!(
        "INSERT INTO device (dev_eui) VALUES ('\\x{}')",
        dev_eui
    ))
    .await
    .unwrap();
}

async fn insert_gateway(core: &Core, gateway_id: Eui64) {
    let conn = core.datastore().pool_connection().await.unwrap();
    conn.batch_execute_async(&format!(
        "INSERT INTO gateway (gateway_id) VALUES ('\\x{}')",
        gateway_id
    ))
    .await
    .unwrap();
}

async fn create_group(
    core: &Core,
    group_type: MulticastGroupType,
    ping_slot_period: u32,
) -> MulticastGroup {
    core.datastore()
        .multicast_group_create(MulticastGroup::new(
            Uuid::new_v4(),
            MulticastGroupParams {
                mc_addr: DevAddr::new([1, 2, 3, 4]),
                mc_net_s_key: Aes128Key::new([2; 16]),
                f_cnt: 0,
                group_type,
                dr: 5,
                frequency: 868_300_000,
                ping_slot_period,
            },
        ))
        .await
        .unwrap()
}

/// Subscribe a device with the gateways that hear it, creating the rows
/// the foreign keys need.
async fn add_covered_device(
    harness: &TestHarness,
    group: &MulticastGroup,
    gateways: &[(Eui64, i32)],
) -> Eui64 {
    let dev_eui = fresh_eui();
    insert_device(&harness.core, dev_eui).await;
    harness
        .core
        .datastore()
        .device_multicast_group_add(group.id, dev_eui)
        .await
        .unwrap();
    harness
        .rxinfo
        .upsert(DeviceGatewayRxInfoSet {
            dev_eui,
            dr: 5,
            items: gateways
                .iter()
                .map(|(gateway_id, rssi)| DeviceGatewayRxInfo {
                    gateway_id: *gateway_id,
                    rssi: *rssi,
                    lora_snr: 5.0,
                })
                .collect(),
        })
        .await;
    dev_eui
}

#[tokio::test]
#[ignore = "requires PostgreSQL (set DATABASE_URL)"]
async fn class_c_enqueue_fans_out_per_gateway() {
    let _db = DB_LOCK.lock().await;
    let harness = harness().await;
    let group = create_group(&harness.core, MulticastGroupType::C, 0).await;

    let gw1 = fresh_eui();
    let gw2 = fresh_eui();
    insert_gateway(&harness.core, gw1).await;
    insert_gateway(&harness.core, gw2).await;
    add_covered_device(&harness, &group, &[(gw1, -60)]).await;
    add_covered_device(&harness, &group, &[(gw2, -60)]).await;

    let f_cnt = harness
        .core
        .multicast_enqueue(group.id, 10, vec![1, 2, 3])
        .await
        .unwrap();
    assert_eq!(f_cnt, 0);

    let items = harness
        .core
        .datastore()
        .multicast_queue_items_list(group.id)
        .await
        .unwrap();
    assert_eq!(items.len(), 2);
    let mut gateways: Vec<Eui64> =
        items.iter().map(|i| i.gateway_id.0).collect();
    gateways.sort();
    let mut expected = vec![gw1, gw2];
    expected.sort();
    assert_eq!(gateways, expected);
    for item in &items {
        assert_eq!(item.f_cnt, 0);
        assert_eq!(item.emit_at_time_since_gps_epoch, None);
    }

    let group = harness
        .core
        .datastore()
        .multicast_group_get(group.id)
        .await
        .unwrap();
    assert_eq!(group.f_cnt, 1);
}

#[tokio::test]
#[ignore = "requires PostgreSQL (set DATABASE_URL)"]
async fn successive_enqueues_assign_gap_free_counters() {
    let _db = DB_LOCK.lock().await;
    let harness = harness().await;
    let group = create_group(&harness.core, MulticastGroupType::C, 0).await;
    let gw = fresh_eui();
    insert_gateway(&harness.core, gw).await;
    add_covered_device(&harness, &group, &[(gw, -60)]).await;

    for expected in 0..5 {
        let f_cnt = harness
            .core
            .multicast_enqueue(group.id, 10, vec![1])
            .await
            .unwrap();
        assert_eq!(f_cnt, expected);
    }
}

#[tokio::test]
#[ignore = "requires PostgreSQL (set DATABASE_URL)"]
async fn class_b_enqueues_chain_onto_successive_ping_slots() {
    let _db = DB_LOCK.lock().await;
    let harness = harness().await;
    // ping_slot_period = 128 gives ping_nb = 32.
    let group = create_group(&harness.core, MulticastGroupType::B, 128).await;
    let gw = fresh_eui();
    insert_gateway(&harness.core, gw).await;
    add_covered_device(&harness, &group, &[(gw, -60)]).await;

    let before = gps::Clock::default().time_since_gps_epoch(Utc::now());
    harness
        .core
        .multicast_enqueue(group.id, 10, vec![1])
        .await
        .unwrap();
    harness
        .core
        .multicast_enqueue(group.id, 10, vec![2])
        .await
        .unwrap();

    let items = harness
        .core
        .datastore()
        .multicast_queue_items_list(group.id)
        .await
        .unwrap();
    assert_eq!(items.len(), 2);
    let emit1 = items[0].emit_at().expect("Class-B items carry emit time");
    let emit2 = items[1].emit_at().expect("Class-B items carry emit time");

    // Both are scheduled past the margin, in order, and on the group's
    // ping-slot schedule.
    assert!(emit1 > before + Duration::seconds(2));
    assert!(emit2 > emit1);
    assert_eq!(
        emit2,
        classb::next_ping_slot_after(emit1, &group.mc_addr.0, 32).unwrap()
    );

    // ScheduleAt mirrors the emission time on the wall clock.
    assert_eq!(
        items[0].schedule_at,
        gps::Clock::default().to_date_time(emit1)
    );
}

#[tokio::test]
#[ignore = "requires PostgreSQL (set DATABASE_URL)"]
async fn oversized_payload_is_rejected_without_side_effects() {
    let _db = DB_LOCK.lock().await;
    let harness = harness().await;
    let group = create_group(&harness.core, MulticastGroupType::C, 0).await;
    let gw = fresh_eui();
    insert_gateway(&harness.core, gw).await;
    add_covered_device(&harness, &group, &[(gw, -60)]).await;

    // DR5 on EU868 carries at most 242 bytes.
    let err = harness
        .core
        .multicast_enqueue(group.id, 10, vec![0; 243])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidRequest { .. }));

    assert!(harness
        .core
        .datastore()
        .multicast_queue_items_list(group.id)
        .await
        .unwrap()
        .is_empty());
    let group = harness
        .core
        .datastore()
        .multicast_group_get(group.id)
        .await
        .unwrap();
    assert_eq!(group.f_cnt, 0);
}

#[tokio::test]
#[ignore = "requires PostgreSQL (set DATABASE_URL)"]
async fn enqueue_fails_for_empty_or_unreachable_groups() {
    let _db = DB_LOCK.lock().await;
    let harness = harness().await;

    let empty = create_group(&harness.core, MulticastGroupType::C, 0).await;
    let err = harness
        .core
        .multicast_enqueue(empty.id, 10, vec![1])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidRequest { .. }));

    // A subscribed device with no fresh receptions is unreachable.
    let group = create_group(&harness.core, MulticastGroupType::C, 0).await;
    let dev_eui = fresh_eui();
    insert_device(&harness.core, dev_eui).await;
    harness
        .core
        .datastore()
        .device_multicast_group_add(group.id, dev_eui)
        .await
        .unwrap();
    let err = harness
        .core
        .multicast_enqueue(group.id, 10, vec![1])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ServiceUnavailable { .. }));
}

#[tokio::test]
#[ignore = "requires PostgreSQL (set DATABASE_URL)"]
async fn queued_rows_keep_their_snapshotted_gateway() {
    let _db = DB_LOCK.lock().await;
    let harness = harness().await;
    let group = create_group(&harness.core, MulticastGroupType::C, 0).await;
    let gw1 = fresh_eui();
    let gw2 = fresh_eui();
    insert_gateway(&harness.core, gw1).await;
    insert_gateway(&harness.core, gw2).await;
    let dev_eui = add_covered_device(&harness, &group, &[(gw1, -60)]).await;

    harness
        .core
        .multicast_enqueue(group.id, 10, vec![1])
        .await
        .unwrap();

    // Re-home the device onto another gateway and re-add it.
    harness
        .core
        .datastore()
        .device_multicast_group_remove(group.id, dev_eui)
        .await
        .unwrap();
    harness
        .core
        .datastore()
        .device_multicast_group_add(group.id, dev_eui)
        .await
        .unwrap();
    harness
        .rxinfo
        .upsert(DeviceGatewayRxInfoSet {
            dev_eui,
            dr: 5,
            items: vec![DeviceGatewayRxInfo {
                gateway_id: gw2,
                rssi: -50,
                lora_snr: 7.0,
            }],
        })
        .await;

    harness
        .core
        .multicast_enqueue(group.id, 10, vec![2])
        .await
        .unwrap();

    // The in-flight row still points at the gateway selected when it was
    // enqueued; only the new row uses the new coverage.
    let items = harness
        .core
        .datastore()
        .multicast_queue_items_list(group.id)
        .await
        .unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].gateway_id.0, gw1);
    assert_eq!(items[1].gateway_id.0, gw2);
}

/// The frames the backend accepted for one gateway.  The test database
/// is shared, so a dispatch tick may also claim groups created by other
/// tests (or leftovers of earlier runs); assertions filter by the
/// gateway MAC owned by the running test.
async fn sends_for(
    backend: &RecordingBackend,
    gateway: Eui64,
) -> Vec<(u16, TxInfo, Vec<u8>)> {
    backend
        .sends
        .lock()
        .await
        .iter()
        .filter(|(_, tx_info, _)| tx_info.mac == gateway)
        .cloned()
        .collect()
}

#[tokio::test]
#[ignore = "requires PostgreSQL (set DATABASE_URL)"]
async fn dispatch_emits_head_item_and_deletes_it() {
    let _db = DB_LOCK.lock().await;
    let harness = harness().await;
    let group = create_group(&harness.core, MulticastGroupType::C, 0).await;
    let gw = fresh_eui();
    insert_gateway(&harness.core, gw).await;
    add_covered_device(&harness, &group, &[(gw, -60)]).await;

    harness
        .core
        .multicast_enqueue(group.id, 10, vec![0xca, 0xfe])
        .await
        .unwrap();

    let mut frames = harness.core.framelog().subscribe();
    while !harness
        .core
        .datastore()
        .multicast_queue_items_list(group.id)
        .await
        .unwrap()
        .is_empty()
    {
        harness.core.dispatch_batch().await.unwrap();
    }

    let sends = sends_for(&harness.backend, gw).await;
    assert_eq!(sends.len(), 1);
    let (_token, tx_info, phy_payload) = &sends[0];
    assert!(tx_info.immediately);
    assert_eq!(tx_info.frequency, 868_300_000);
    assert_eq!(tx_info.code_rate, "4/5");
    // MHDR: unconfirmed data down; DevAddr on the wire little-endian.
    assert_eq!(phy_payload[0], 0x60);
    assert_eq!(&phy_payload[1..5], &[4, 3, 2, 1]);

    // The frame-log hook saw our emission.
    let event = loop {
        let event = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            frames.recv(),
        )
        .await
        .expect("frame log event")
        .unwrap();
        if event.tx_info.mac == gw {
            break event;
        }
    };
    assert_eq!(event.phy_payload, *phy_payload);
}

#[tokio::test]
#[ignore = "requires PostgreSQL (set DATABASE_URL)"]
async fn failed_send_keeps_the_item_for_the_next_tick() {
    let _db = DB_LOCK.lock().await;
    let harness = harness().await;
    let group = create_group(&harness.core, MulticastGroupType::C, 0).await;
    let gw = fresh_eui();
    insert_gateway(&harness.core, gw).await;
    add_covered_device(&harness, &group, &[(gw, -60)]).await;

    harness
        .core
        .multicast_enqueue(group.id, 10, vec![1])
        .await
        .unwrap();

    harness.backend.fail_next.store(true, Ordering::SeqCst);
    let err = harness.core.dispatch_batch().await.unwrap_err();
    assert!(err.retryable());

    // The failed tick rolled back: the row survived the hand-off
    // failure, whichever claimed group the failing send belonged to.
    let items = harness
        .core
        .datastore()
        .multicast_queue_items_list(group.id)
        .await
        .unwrap();
    assert_eq!(items.len(), 1);

    // Subsequent ticks re-send the same (group, f_cnt, gateway) row.
    while !harness
        .core
        .datastore()
        .multicast_queue_items_list(group.id)
        .await
        .unwrap()
        .is_empty()
    {
        harness.core.dispatch_batch().await.unwrap();
    }
    let sends = sends_for(&harness.backend, gw).await;
    assert_eq!(sends.len(), 1);
}

#[tokio::test]
#[ignore = "requires PostgreSQL (set DATABASE_URL)"]
async fn class_b_items_wait_for_their_ping_slot() {
    let _db = DB_LOCK.lock().await;
    let harness = harness().await;
    let group = create_group(&harness.core, MulticastGroupType::B, 128).await;
    let gw = fresh_eui();
    insert_gateway(&harness.core, gw).await;

    let now_gps = gps::Clock::default().time_since_gps_epoch(Utc::now());

    // One row due in an hour, one overdue; only the overdue one's group
    // state allows emission, and its frame carries the GPS timestamp.
    let conn = harness.core.datastore().pool_connection().await.unwrap();
    harness
        .core
        .datastore()
        .multicast_queue_item_enqueue_on_conn(
            &conn,
            MulticastQueueItemValues::new(
                group.id,
                gw,
                0,
                10,
                vec![1],
                Utc::now(),
                Some(now_gps + Duration::hours(1)),
            ),
        )
        .await
        .unwrap();
    drop(conn);

    harness.core.dispatch_batch().await.unwrap();
    assert!(sends_for(&harness.backend, gw).await.is_empty());
    assert_eq!(
        harness
            .core
            .datastore()
            .multicast_queue_items_list(group.id)
            .await
            .unwrap()
            .len(),
        1
    );

    // Make the item due.
    let due = now_gps - Duration::seconds(1);
    let conn = harness.core.datastore().pool_connection().await.unwrap();
    conn.batch_execute_async(&format!(
        "UPDATE multicast_queue
            SET emit_at_time_since_gps_epoch = {}
          WHERE multicast_group_id = '{}'",
        due.num_nanoseconds().unwrap(),
        group.id,
    ))
    .await
    .unwrap();
    drop(conn);

    while sends_for(&harness.backend, gw).await.is_empty() {
        harness.core.dispatch_batch().await.unwrap();
    }
    let sends = sends_for(&harness.backend, gw).await;
    assert_eq!(sends.len(), 1);
    assert!(!sends[0].1.immediately);
    assert_eq!(
        sends[0].1.time_since_gps_epoch,
        Some(due.num_nanoseconds().unwrap())
    );
}
