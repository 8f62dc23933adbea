// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The multicast downlink path: queueing payloads and emitting frames.
//!
//! [`enqueue`] turns one application payload into N queue rows (one per
//! covering gateway, selected by [`gateways`]); [`emit`] drains the head
//! of a claimed group's queue into the gateway backend.

pub mod emit;
pub mod enqueue;
pub mod gateways;
