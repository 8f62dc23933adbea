// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Facilities shared by every crate in the lorikeet workspace: the public
//! error model, the GPS-epoch clock and the regional band parameters.

pub mod band;
pub mod error;
pub mod gps;

pub use error::{
    CreateResult, DeleteResult, Error, ListResultVec, LookupResult,
    LookupType, ResourceType, UpdateResult,
};
