// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Database plumbing: connection pool, configuration and error mapping.

use serde::{Deserialize, Serialize};

pub mod datastore;
pub mod error;

/// The concrete connection every query runs over.
pub type DbConnection = diesel::PgConnection;

/// Pool of asynchronous database connections.
pub type DbPool =
    bb8::Pool<async_bb8_diesel::ConnectionManager<DbConnection>>;

/// A single pooled connection, as handed to `*_on_conn` operations.
pub type Conn = async_bb8_diesel::Connection<DbConnection>;

/// Database configuration.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Config {
    /// database url
    pub url: String,
    /// maximum number of pooled connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}
