// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Database model types for multicast groups, their device membership and
//! the per-group downlink queue.
//!
//! Structs here map 1:1 onto the tables declared in [`schema`]; conversion
//! to and from the domain types in `lorikeet-lorawan` happens at this
//! boundary so the query layer never handles raw byte columns.

mod bytes;
mod device_multicast_group;
mod multicast_group;
mod multicast_queue;
pub mod schema;

pub use bytes::{Aes128Key, DevAddr, Eui64};
pub use device_multicast_group::DeviceMulticastGroup;
pub use multicast_group::{
    MulticastGroup, MulticastGroupParams, MulticastGroupType,
    MulticastGroupUpdate,
};
pub use multicast_queue::{MulticastQueueItem, MulticastQueueItemValues};
