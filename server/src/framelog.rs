// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Structured log of emitted downlink frames.
//!
//! Every frame the dispatcher hands to a gateway backend is recorded
//! twice: as a structured log line and on a broadcast channel that
//! in-process observers (API streaming endpoints, tests) can subscribe
//! to.  Lagging observers lose old events rather than back-pressuring
//! the dispatcher.

use chrono::{DateTime, Utc};
use serde::Serialize;
use slog::{info, o, Logger};
use tokio::sync::broadcast;

use crate::gateway::TxInfo;

/// One emitted downlink frame.
#[derive(Clone, Debug, Serialize)]
pub struct DownlinkFrameLog {
    pub time: DateTime<Utc>,
    pub token: u16,
    pub tx_info: TxInfo,
    pub phy_payload: Vec<u8>,
}

#[derive(Clone)]
pub struct FrameLog {
    log: Logger,
    tx: broadcast::Sender<DownlinkFrameLog>,
}

impl FrameLog {
    pub fn new(log: &Logger) -> FrameLog {
        let (tx, _) = broadcast::channel(128);
        FrameLog {
            log: log.new(o!("component" => "framelog")),
            tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DownlinkFrameLog> {
        self.tx.subscribe()
    }

    pub fn log_downlink_frame(
        &self,
        token: u16,
        tx_info: &TxInfo,
        phy_payload: &[u8],
    ) {
        info!(
            self.log, "downlink frame";
            "gateway" => %tx_info.mac,
            "token" => token,
            "frequency" => tx_info.frequency,
            "dr" => tx_info.dr,
            "immediately" => tx_info.immediately,
            "phy_payload_len" => phy_payload.len(),
        );
        // Send fails only when nobody is subscribed, which is fine.
        let _ = self.tx.send(DownlinkFrameLog {
            time: Utc::now(),
            token,
            tx_info: tx_info.clone(),
            phy_payload: phy_payload.to_vec(),
        });
    }
}
