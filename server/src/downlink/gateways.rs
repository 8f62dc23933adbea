// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Minimum gateway-set selection.
//!
//! A queued payload targets devices; the radio only knows gateways.  This
//! module picks a small set of gateways whose recent receptions cover
//! every target device, so each payload is radiated as few times as
//! possible.
//!
//! Greedy set cover: repeatedly take the gateway covering the most
//! still-uncovered devices, breaking ties by the highest aggregate RSSI
//! over those devices and then by the lowest gateway id.  Not globally
//! optimal (set cover is NP-hard) but deterministic, which the tests and
//! the multi-instance dispatcher rely on.

use std::collections::{BTreeMap, BTreeSet};

use lorikeet_common::Error;
use lorikeet_lorawan::Eui64;

use crate::rxinfo::DeviceGatewayRxInfoSet;

/// Select gateways covering every device in `dev_euis`.
///
/// `sets` holds the fresh reception sets the RX-info store returned; a
/// device missing from it (or present without any reception) is
/// unreachable and fails the whole selection.
pub fn min_gateway_set(
    dev_euis: &[Eui64],
    sets: &[DeviceGatewayRxInfoSet],
) -> Result<Vec<Eui64>, Error> {
    // gateway -> covered device -> best RSSI seen for that device.
    let mut coverage: BTreeMap<Eui64, BTreeMap<Eui64, i32>> = BTreeMap::new();
    let mut uncovered: BTreeSet<Eui64> = dev_euis.iter().copied().collect();

    for set in sets {
        if !uncovered.contains(&set.dev_eui) {
            continue;
        }
        for item in &set.items {
            let devices = coverage.entry(item.gateway_id).or_default();
            let rssi = devices.entry(set.dev_eui).or_insert(item.rssi);
            if item.rssi > *rssi {
                *rssi = item.rssi;
            }
        }
    }

    for dev_eui in &uncovered {
        if !coverage.values().any(|devices| devices.contains_key(dev_eui)) {
            return Err(Error::unavail(&format!(
                "device {} unreachable: no fresh uplink receptions",
                dev_eui
            )));
        }
    }

    let mut selected = Vec::new();
    while !uncovered.is_empty() {
        // BTreeMap iteration is ascending by gateway id and the
        // comparison below is strict, so on a full tie the lowest id
        // wins.
        let mut best: Option<(Eui64, usize, i64)> = None;
        for (gateway_id, devices) in &coverage {
            let newly_covered: Vec<_> = devices
                .iter()
                .filter(|(dev_eui, _)| uncovered.contains(*dev_eui))
                .collect();
            if newly_covered.is_empty() {
                continue;
            }
            let aggregate_rssi: i64 = newly_covered
                .iter()
                .map(|(_, rssi)| i64::from(**rssi))
                .sum();
            let candidate =
                (*gateway_id, newly_covered.len(), aggregate_rssi);
            let better = match &best {
                None => true,
                Some((_, count, rssi)) => {
                    candidate.1 > *count
                        || (candidate.1 == *count && candidate.2 > *rssi)
                }
            };
            if better {
                best = Some(candidate);
            }
        }

        let Some((gateway_id, _, _)) = best else {
            // Unreachable: the per-device check above guarantees cover.
            return Err(Error::internal_error(
                "gateway cover exists but greedy selection stalled",
            ));
        };

        if let Some(devices) = coverage.get(&gateway_id) {
            for dev_eui in devices.keys() {
                uncovered.remove(dev_eui);
            }
        }
        selected.push(gateway_id);
    }

    Ok(selected)
}
