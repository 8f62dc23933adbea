// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The enqueue pipeline: one application payload in, one queue row per
//! covering gateway out.
//!
//! Everything happens inside a single transaction holding the group row
//! lock.  That serialises enqueues against each other (frame-counter
//! assignment stays gap-free) and against the dispatcher (item k cannot
//! be emitted while item k+1 is mid-fan-out, which would break Class-B
//! emission-time monotonicity).

use async_bb8_diesel::AsyncConnection;
use chrono::Utc;
use slog::info;
use uuid::Uuid;

use lorikeet_common::Error;
use lorikeet_db_model::{MulticastGroupType, MulticastQueueItemValues};
use lorikeet_db_queries::db::error::TransactionError;

use crate::app::Core;
use crate::classb;
use crate::downlink::gateways;

impl Core {
    /// Enqueue `payload` for every device in the group.
    ///
    /// Returns the frame counter assigned to this payload.  The group's
    /// counter is bumped by exactly one; the N fan-out rows share the
    /// assigned value.
    pub async fn multicast_enqueue(
        &self,
        multicast_group_id: Uuid,
        f_port: u8,
        payload: Vec<u8>,
    ) -> Result<u32, Error> {
        if f_port == 0 {
            return Err(Error::invalid_value("f_port", "must be > 0"));
        }

        let conn = self.datastore.pool_connection().await?;
        let f_cnt = conn
            .transaction_async(|conn| async move {
                let group = self
                    .datastore
                    .multicast_group_get_for_update_on_conn(
                        &conn,
                        multicast_group_id,
                    )
                    .await?;

                let dev_euis = self
                    .datastore
                    .dev_euis_for_multicast_group_on_conn(
                        &conn,
                        multicast_group_id,
                    )
                    .await?;
                if dev_euis.is_empty() {
                    return Err(Error::invalid_request(
                        "multicast group has no devices",
                    )
                    .into());
                }

                let rx_info_sets =
                    self.rxinfo.get_for_dev_euis(&dev_euis).await?;
                let gateways =
                    gateways::min_gateway_set(&dev_euis, &rx_info_sets)?;

                let max_size =
                    self.band.max_frm_payload_size(group.dr as u8)?;
                if payload.len() > max_size {
                    return Err(Error::invalid_request(&format!(
                        "payload exceeds max size: {} > {} bytes for data-rate {}",
                        payload.len(),
                        max_size,
                        group.dr,
                    ))
                    .into());
                }

                let now = Utc::now();
                let (schedule_at, emit_at) = match group.group_type {
                    MulticastGroupType::C => (now, None),
                    MulticastGroupType::B => {
                        if group.ping_slot_period <= 0
                            || classb::PING_PERIOD_BASE as i32
                                % group.ping_slot_period
                                != 0
                        {
                            return Err(Error::invalid_value(
                                "ping_slot_period",
                                &format!(
                                    "{} does not divide the beacon period",
                                    group.ping_slot_period
                                ),
                            )
                            .into());
                        }
                        let ping_nb = classb::PING_PERIOD_BASE
                            / group.ping_slot_period as u32;

                        // Anchor on the last scheduled item so successive
                        // payloads land on successive ping slots.
                        let mut after =
                            self.clock.time_since_gps_epoch(now)
                                + self.scheduling_margin();
                        let max_emit = self
                            .datastore
                            .multicast_queue_max_emit_at_on_conn(
                                &conn, group.id,
                            )
                            .await?;
                        if max_emit > after {
                            after = max_emit;
                        }

                        let emit = classb::next_ping_slot_after(
                            after,
                            &group.mc_addr.0,
                            ping_nb,
                        )?;
                        (self.clock.to_date_time(emit), Some(emit))
                    }
                };

                let f_cnt = group.f_cnt as u32;
                for gateway_id in gateways {
                    self.datastore
                        .multicast_queue_item_enqueue_on_conn(
                            &conn,
                            MulticastQueueItemValues::new(
                                group.id,
                                gateway_id,
                                f_cnt,
                                f_port,
                                payload.clone(),
                                schedule_at,
                                emit_at,
                            ),
                        )
                        .await?;
                }

                self.datastore
                    .multicast_group_set_f_cnt_on_conn(
                        &conn,
                        group.id,
                        f_cnt + 1,
                    )
                    .await?;

                Ok::<u32, TransactionError<Error>>(f_cnt)
            })
            .await
            .map_err(Error::from)?;

        info!(
            self.log, "payload enqueued for multicast-group";
            "multicast_group_id" => %multicast_group_id,
            "f_cnt" => f_cnt,
        );
        Ok(f_cnt)
    }
}
