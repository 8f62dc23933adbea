// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Wiring: datastore, core and background driver for one process.

use std::sync::Arc;

use slog::{info, Logger};

use lorikeet_common::Error;
use lorikeet_db_queries::DataStore;

use crate::app::Core;
use crate::background::dispatcher::MulticastDispatcher;
use crate::background::{Driver, TaskHandle};
use crate::config::Config;
use crate::gateway::GatewayBackend;
use crate::rxinfo::DeviceGatewayRxInfoStore;

pub struct Server {
    core: Arc<Core>,
    driver: Driver,
    dispatcher: TaskHandle,
}

impl Server {
    /// Connect to the database and start the background dispatcher.
    ///
    /// The server runs until dropped; dropping it aborts the dispatcher,
    /// rolling back any tick in flight.
    pub async fn start(
        log: &Logger,
        config: &Config,
        backend: Arc<dyn GatewayBackend>,
        rxinfo: Arc<dyn DeviceGatewayRxInfoStore>,
    ) -> Result<Server, Error> {
        let datastore =
            Arc::new(DataStore::new(log, &config.database).await?);
        let core =
            Arc::new(Core::new(log, datastore, rxinfo, backend, config)?);

        let mut driver = Driver::new();
        let dispatcher = driver.register(
            "multicast_dispatcher",
            config.scheduler.scheduler_interval,
            Box::new(MulticastDispatcher::new(Arc::clone(&core))),
            log,
        );

        info!(
            log, "server started";
            "scheduler_interval" => ?config.scheduler.scheduler_interval,
            "batch_size" => config.scheduler.batch_size,
        );
        Ok(Server {
            core,
            driver,
            dispatcher,
        })
    }

    pub fn core(&self) -> &Arc<Core> {
        &self.core
    }

    pub fn driver(&self) -> &Driver {
        &self.driver
    }

    /// Nudge the dispatcher to run before its next period elapses.
    pub fn wakeup_dispatcher(&self) {
        self.driver.wakeup(&self.dispatcher);
    }
}
