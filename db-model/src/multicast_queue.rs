// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use chrono::{DateTime, Duration, Utc};
use diesel::{Insertable, Queryable, QueryableByName, Selectable};
use uuid::Uuid;

use crate::bytes::Eui64;
use crate::schema::multicast_queue;

/// A queued multicast downlink for one gateway.
///
/// Fan-out to N covering gateways produces N rows sharing one `f_cnt`; the
/// dispatcher consumes rows in ascending `f_cnt` order and deletes each one
/// after the gateway backend accepted it.
#[derive(
    Queryable, QueryableByName, Selectable, Clone, Debug, PartialEq,
)]
#[diesel(table_name = multicast_queue)]
pub struct MulticastQueueItem {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    /// Wall-clock scheduling hint used for dispatcher indexing.
    pub schedule_at: DateTime<Utc>,
    /// Precise emission time as nanoseconds since the GPS epoch; set for
    /// Class-B items.
    pub emit_at_time_since_gps_epoch: Option<i64>,
    pub multicast_group_id: Uuid,
    pub gateway_id: Eui64,
    pub f_cnt: i32,
    pub f_port: i32,
    pub frm_payload: Vec<u8>,
}

impl MulticastQueueItem {
    /// Emission time as a duration, when one was stamped.
    pub fn emit_at(&self) -> Option<Duration> {
        self.emit_at_time_since_gps_epoch.map(Duration::nanoseconds)
    }
}

/// Values used to create a [`MulticastQueueItem`] in the database.
///
/// Omits `id`, which the database assigns from the sequence.
#[derive(Insertable, Clone, Debug, PartialEq)]
#[diesel(table_name = multicast_queue)]
pub struct MulticastQueueItemValues {
    pub created_at: DateTime<Utc>,
    pub schedule_at: DateTime<Utc>,
    pub emit_at_time_since_gps_epoch: Option<i64>,
    pub multicast_group_id: Uuid,
    pub gateway_id: Eui64,
    pub f_cnt: i32,
    pub f_port: i32,
    pub frm_payload: Vec<u8>,
}

impl MulticastQueueItemValues {
    pub fn new(
        multicast_group_id: Uuid,
        gateway_id: lorikeet_lorawan::Eui64,
        f_cnt: u32,
        f_port: u8,
        frm_payload: Vec<u8>,
        schedule_at: DateTime<Utc>,
        emit_at: Option<Duration>,
    ) -> MulticastQueueItemValues {
        MulticastQueueItemValues {
            created_at: Utc::now(),
            schedule_at,
            emit_at_time_since_gps_epoch: emit_at
                .and_then(|d| d.num_nanoseconds()),
            multicast_group_id,
            gateway_id: gateway_id.into(),
            f_cnt: f_cnt as i32,
            f_port: i32::from(f_port),
            frm_payload,
        }
    }
}
