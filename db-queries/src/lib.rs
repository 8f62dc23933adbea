// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Datastore layer: a pooled PostgreSQL connection and the query
//! operations the scheduling core needs.

pub mod db;

pub use db::datastore::DataStore;
pub use db::{Config, DbConnection};
