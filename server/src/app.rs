// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The assembled scheduling core.
//!
//! [`Core`] owns the collaborators every downlink operation needs: the
//! datastore, the RX-info side channel, the gateway backend, the frame
//! log and the radio parameters.  The enqueue pipeline and the
//! dispatcher are implemented as `impl Core` blocks in [`crate::downlink`].

use std::sync::Arc;

use chrono::Duration;
use slog::{o, Logger};

use lorikeet_common::band::Band;
use lorikeet_common::{gps, Error};
use lorikeet_db_queries::DataStore;

use crate::config::Config;
use crate::framelog::FrameLog;
use crate::gateway::GatewayBackend;
use crate::rxinfo::DeviceGatewayRxInfoStore;

pub struct Core {
    pub(crate) log: Logger,
    pub(crate) datastore: Arc<DataStore>,
    pub(crate) rxinfo: Arc<dyn DeviceGatewayRxInfoStore>,
    pub(crate) backend: Arc<dyn GatewayBackend>,
    pub(crate) framelog: FrameLog,
    pub(crate) clock: gps::Clock,
    pub(crate) band: Band,
    downlink_tx_power: i32,
    pub(crate) scheduler_interval: Duration,
    pub(crate) batch_size: i64,
}

impl Core {
    pub fn new(
        log: &Logger,
        datastore: Arc<DataStore>,
        rxinfo: Arc<dyn DeviceGatewayRxInfoStore>,
        backend: Arc<dyn GatewayBackend>,
        config: &Config,
    ) -> Result<Core, Error> {
        let scheduler_interval =
            Duration::from_std(config.scheduler.scheduler_interval)
                .map_err(|_| {
                    Error::invalid_value(
                        "scheduler_interval",
                        "interval out of range",
                    )
                })?;
        if config.scheduler.batch_size <= 0 {
            return Err(Error::invalid_value(
                "batch_size",
                "must be positive",
            ));
        }

        let log = log.new(o!("component" => "core"));
        Ok(Core {
            framelog: FrameLog::new(&log),
            log,
            datastore,
            rxinfo,
            backend,
            clock: gps::Clock::new(config.network.gps_epoch_leap_seconds),
            band: config.network.band_name,
            downlink_tx_power: config.network.downlink_tx_power,
            scheduler_interval,
            batch_size: config.scheduler.batch_size,
        })
    }

    pub fn datastore(&self) -> &Arc<DataStore> {
        &self.datastore
    }

    pub fn framelog(&self) -> &FrameLog {
        &self.framelog
    }

    /// TX power for downlinks: the configured value, or the band default
    /// when the configuration says -1.
    pub(crate) fn downlink_tx_power(&self) -> i32 {
        if self.downlink_tx_power == -1 {
            self.band.default_downlink_tx_power()
        } else {
            self.downlink_tx_power
        }
    }

    /// Scheduling margin: items due within two scheduler intervals are
    /// considered dispatchable, and new Class-B items are never placed
    /// closer to now than this.
    pub(crate) fn scheduling_margin(&self) -> Duration {
        self.scheduler_interval * 2
    }
}
