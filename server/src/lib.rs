// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The multicast downlink scheduling core of the lorikeet network server.
//!
//! An application enqueues one payload for a multicast group; this crate
//! fans it out to the minimum set of gateways covering the group's
//! devices, stamps Class-B items onto ping slots, persists the work
//! durably and hands each frame to the gateway backend at the right
//! moment.  Multiple instances may run against one database; the group
//! row lock (skip-locked for the dispatcher, `FOR UPDATE` for enqueue)
//! keeps exactly one actor on a group at any instant.

pub mod app;
pub mod background;
pub mod classb;
pub mod config;
pub mod downlink;
pub mod framelog;
pub mod gateway;
pub mod rxinfo;
pub mod server;

pub use app::Core;
pub use config::Config;
pub use server::Server;
