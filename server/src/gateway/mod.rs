// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The gateway backend interface.
//!
//! The scheduling core hands finished frames to a backend; how they reach
//! the gateway (MQTT bridge, packet forwarder, test double) is behind
//! [`GatewayBackend`].  The backend does not retry: its error is surfaced
//! verbatim to the dispatcher, which decides what a failed hand-off means
//! for the queue.

use async_trait::async_trait;
use serde::Serialize;

use lorikeet_common::Error;
use lorikeet_lorawan::Eui64;

pub mod mqtt;

/// Transmission parameters accompanying a frame to the gateway.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TxInfo {
    /// Gateway MAC the frame must be radiated by.
    pub mac: Eui64,
    /// Transmit as soon as the gateway receives the frame.
    pub immediately: bool,
    /// Precise emission time, nanoseconds since the GPS epoch.  Set for
    /// Class-B transmissions; mutually exclusive with `immediately`.
    #[serde(
        rename = "timeSinceGPSEpoch",
        skip_serializing_if = "Option::is_none"
    )]
    pub time_since_gps_epoch: Option<i64>,
    /// TX frequency (Hz).
    pub frequency: u32,
    /// Data-rate index.
    pub dr: u8,
    /// Coding rate.
    pub code_rate: String,
    /// TX power (dBm).
    pub power: i32,
}

/// Hand-off point to the gateway network.
#[async_trait]
pub trait GatewayBackend: Send + Sync {
    /// Deliver one downlink frame.  `token` is an opaque 16-bit value the
    /// backend may echo in TX acknowledgements.
    async fn send_tx_packet(
        &self,
        token: u16,
        tx_info: &TxInfo,
        phy_payload: &[u8],
    ) -> Result<(), Error>;
}
