// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The datastore: pooled access to PostgreSQL plus every query the
//! scheduling core runs.
//!
//! Operations that participate in caller-owned transactions (enqueue, the
//! dispatcher tick) are exposed as `*_on_conn` methods taking the caller's
//! connection; the remaining methods fetch a pooled connection themselves.

use async_bb8_diesel::ConnectionManager;
use slog::{o, Logger};

use lorikeet_common::Error;

use crate::db::{Config, DbConnection, DbPool};

mod multicast_group;

pub struct DataStore {
    log: Logger,
    pool: DbPool,
}

impl DataStore {
    /// Connect to the database and build the connection pool.
    pub async fn new(log: &Logger, config: &Config) -> Result<DataStore, Error> {
        let manager = ConnectionManager::<DbConnection>::new(&config.url);
        let pool = bb8::Pool::builder()
            .max_size(config.max_connections)
            .build(manager)
            .await
            .map_err(|e| {
                Error::unavail(&format!(
                    "failed to create database pool: {}",
                    e
                ))
            })?;
        Ok(DataStore {
            log: log.new(o!("component" => "datastore")),
            pool,
        })
    }

    /// Fetch a connection from the pool.
    pub async fn pool_connection(
        &self,
    ) -> Result<
        bb8::PooledConnection<'_, ConnectionManager<DbConnection>>,
        Error,
    > {
        self.pool.get().await.map_err(|e| {
            Error::unavail(&format!(
                "no database connection available: {}",
                e
            ))
        })
    }
}
