// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Dispatch of claimed groups: building and emitting the head-of-queue
//! frame.
//!
//! The per-tick transaction claims a batch of groups under skip-locked
//! semantics, emits each group's head item and deletes the emitted row.
//! The delete commits together with the claim, so a crash after the
//! backend accepted the frame but before commit re-sends the row on the
//! next tick: delivery is at-least-once, and devices dedup on the frame
//! counter.

use async_bb8_diesel::AsyncConnection;
use chrono::Utc;
use slog::{error, info};

use lorikeet_common::Error;
use lorikeet_db_model::MulticastGroup;
use lorikeet_db_queries::db::error::TransactionError;
use lorikeet_db_queries::db::Conn;
use lorikeet_lorawan::phy::PhyPayload;

use crate::app::Core;
use crate::gateway::TxInfo;

/// TX coding rate.  Constant for now; a band-driven policy would replace
/// this in one place.
const CODE_RATE: &str = "4/5";

impl Core {
    /// One dispatcher tick: claim up to `batch_size` dispatchable groups
    /// and emit each one's head item, all in a single transaction.
    ///
    /// Returns the number of groups an item was emitted for.
    pub async fn dispatch_batch(&self) -> Result<usize, Error> {
        let horizon = self.clock.time_since_gps_epoch(Utc::now())
            + self.scheduling_margin();
        let batch_size = self.batch_size;

        let conn = self.datastore.pool_connection().await?;
        let emitted = conn
            .transaction_async(|conn| async move {
                let groups = self
                    .datastore
                    .multicast_groups_with_dispatchable_items_on_conn(
                        &conn, batch_size, horizon,
                    )
                    .await?;

                let mut emitted = 0;
                for group in &groups {
                    if self.emit_next_queue_item(&conn, group).await? {
                        emitted += 1;
                    }
                }
                Ok::<usize, TransactionError<Error>>(emitted)
            })
            .await
            .map_err(Error::from)?;
        Ok(emitted)
    }

    /// Emit the head of one claimed group's queue.
    ///
    /// Returns whether a frame was handed to the backend.  An invalid
    /// item (oversized payload, data-rate the band does not know) is
    /// deleted and the group is skipped for this tick; transient backend
    /// or database errors propagate and abort the surrounding
    /// transaction, leaving every row in place for the next tick.
    async fn emit_next_queue_item(
        &self,
        conn: &Conn,
        group: &MulticastGroup,
    ) -> Result<bool, Error> {
        let Some(item) = self
            .datastore
            .multicast_queue_next_item_on_conn(conn, group.id)
            .await?
        else {
            return Ok(false);
        };

        let fits = match self.band.max_frm_payload_size(group.dr as u8) {
            Ok(max_size) => item.frm_payload.len() <= max_size,
            Err(_) => false,
        };
        if !fits {
            error!(
                self.log,
                "discarding multicast queue-item: payload does not fit data-rate";
                "multicast_group_id" => %group.id,
                "f_cnt" => item.f_cnt,
                "dr" => group.dr,
                "payload_len" => item.frm_payload.len(),
            );
            self.datastore
                .multicast_queue_item_delete_by_id_on_conn(conn, item.id)
                .await?;
            return Ok(false);
        }

        let tx_info = TxInfo {
            mac: item.gateway_id.0,
            immediately: item.emit_at().is_none(),
            time_since_gps_epoch: item.emit_at_time_since_gps_epoch,
            frequency: group.frequency as u32,
            dr: group.dr as u8,
            code_rate: CODE_RATE.to_string(),
            power: self.downlink_tx_power(),
        };

        let mut phy = PhyPayload::unconfirmed_data_down(
            group.mc_addr.0,
            item.f_cnt as u32,
            item.f_port as u8,
            item.frm_payload.clone(),
        );
        phy.set_downlink_data_mic(0, &group.mc_net_s_key.0)
            .map_err(|e| {
                Error::internal_error(&format!(
                    "failed to compute downlink MIC: {}",
                    e
                ))
            })?;
        let phy_payload = phy.to_vec().map_err(|e| {
            Error::internal_error(&format!(
                "failed to serialize downlink frame: {}",
                e
            ))
        })?;

        let token: u16 = rand::random();
        self.backend
            .send_tx_packet(token, &tx_info, &phy_payload)
            .await?;

        self.framelog
            .log_downlink_frame(token, &tx_info, &phy_payload);

        // Deleting after the send, inside the claiming transaction, is
        // what gives at-least-once delivery.
        self.datastore
            .multicast_queue_item_delete_by_id_on_conn(conn, item.id)
            .await?;

        info!(
            self.log, "multicast queue-item emitted";
            "multicast_group_id" => %group.id,
            "f_cnt" => item.f_cnt,
            "gateway_id" => %item.gateway_id.0,
        );
        Ok(true)
    }
}
