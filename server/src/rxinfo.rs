// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Recent-uplink reception state, the side channel feeding gateway
//! selection.
//!
//! The uplink path (outside this core) records, per device, which
//! gateways heard its last uplink and how well.  The downlink path only
//! ever reads this; the [`DeviceGatewayRxInfoStore`] trait is the seam
//! between the two.  Entries age out: a reception older than the store's
//! TTL no longer counts as evidence that a gateway can reach the device.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use lorikeet_common::Error;
use lorikeet_lorawan::Eui64;

/// One gateway's reception of a device's last uplink.
#[derive(Clone, Debug, PartialEq)]
pub struct DeviceGatewayRxInfo {
    pub gateway_id: Eui64,
    pub rssi: i32,
    pub lora_snr: f64,
}

/// The set of gateways that heard a device's last uplink.
#[derive(Clone, Debug, PartialEq)]
pub struct DeviceGatewayRxInfoSet {
    pub dev_eui: Eui64,
    pub dr: u8,
    pub items: Vec<DeviceGatewayRxInfo>,
}

/// Read access to the reception state.
///
/// Devices without a fresh entry are absent from the result; deciding
/// whether that is an error belongs to the caller (the coverage
/// selector treats it as "device unreachable").
#[async_trait]
pub trait DeviceGatewayRxInfoStore: Send + Sync {
    async fn get_for_dev_euis(
        &self,
        dev_euis: &[Eui64],
    ) -> Result<Vec<DeviceGatewayRxInfoSet>, Error>;
}

/// In-process implementation holding the sets in a TTL map.
pub struct InMemoryRxInfoStore {
    ttl: Duration,
    sets: RwLock<HashMap<Eui64, (DateTime<Utc>, DeviceGatewayRxInfoSet)>>,
}

impl InMemoryRxInfoStore {
    pub fn new(ttl: Duration) -> InMemoryRxInfoStore {
        InMemoryRxInfoStore {
            ttl,
            sets: RwLock::new(HashMap::new()),
        }
    }

    /// Record the reception set of a device's latest uplink.
    pub async fn upsert(&self, set: DeviceGatewayRxInfoSet) {
        let mut sets = self.sets.write().await;
        sets.insert(set.dev_eui, (Utc::now(), set));
    }

    pub async fn remove(&self, dev_eui: &Eui64) {
        let mut sets = self.sets.write().await;
        sets.remove(dev_eui);
    }
}

#[async_trait]
impl DeviceGatewayRxInfoStore for InMemoryRxInfoStore {
    async fn get_for_dev_euis(
        &self,
        dev_euis: &[Eui64],
    ) -> Result<Vec<DeviceGatewayRxInfoSet>, Error> {
        let ttl = chrono::Duration::from_std(self.ttl).map_err(|_| {
            Error::internal_error("rx-info TTL overflows a duration")
        })?;
        let horizon = Utc::now() - ttl;

        let sets = self.sets.read().await;
        Ok(dev_euis
            .iter()
            .filter_map(|dev_eui| match sets.get(dev_eui) {
                Some((seen_at, set)) if *seen_at >= horizon => {
                    Some(set.clone())
                }
                _ => None,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eui(n: u8) -> Eui64 {
        Eui64::new([0, 0, 0, 0, 0, 0, 0, n])
    }

    fn set(dev: u8, gateways: &[u8]) -> DeviceGatewayRxInfoSet {
        DeviceGatewayRxInfoSet {
            dev_eui: eui(dev),
            dr: 5,
            items: gateways
                .iter()
                .map(|g| DeviceGatewayRxInfo {
                    gateway_id: eui(*g),
                    rssi: -60,
                    lora_snr: 5.5,
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn returns_only_requested_fresh_sets() {
        let store = InMemoryRxInfoStore::new(Duration::from_secs(3600));
        store.upsert(set(1, &[10])).await;
        store.upsert(set(2, &[11])).await;

        let sets =
            store.get_for_dev_euis(&[eui(1), eui(3)]).await.unwrap();
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].dev_eui, eui(1));
    }

    #[tokio::test]
    async fn expired_sets_are_dropped() {
        let store = InMemoryRxInfoStore::new(Duration::from_secs(0));
        store.upsert(set(1, &[10])).await;
        // TTL of zero: everything is stale by the time it is read.
        tokio::time::sleep(Duration::from_millis(5)).await;
        let sets = store.get_for_dev_euis(&[eui(1)]).await.unwrap();
        assert!(sets.is_empty());
    }

    #[tokio::test]
    async fn upsert_replaces_previous_reception() {
        let store = InMemoryRxInfoStore::new(Duration::from_secs(3600));
        store.upsert(set(1, &[10])).await;
        store.upsert(set(1, &[11, 12])).await;

        let sets = store.get_for_dev_euis(&[eui(1)]).await.unwrap();
        assert_eq!(sets[0].items.len(), 2);
    }
}
