// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use chrono::{DateTime, Utc};
use diesel::{Insertable, Queryable, Selectable};
use uuid::Uuid;

use crate::bytes::Eui64;
use crate::schema::device_multicast_group;

/// Membership of a device in a multicast group.  Composite primary key;
/// rows cascade away with either side.
#[derive(Queryable, Selectable, Insertable, Clone, Debug, PartialEq)]
#[diesel(table_name = device_multicast_group)]
pub struct DeviceMulticastGroup {
    pub multicast_group_id: Uuid,
    pub dev_eui: Eui64,
    pub created_at: DateTime<Utc>,
}

impl DeviceMulticastGroup {
    pub fn new(
        multicast_group_id: Uuid,
        dev_eui: lorikeet_lorawan::Eui64,
    ) -> DeviceMulticastGroup {
        DeviceMulticastGroup {
            multicast_group_id,
            dev_eui: dev_eui.into(),
            created_at: Utc::now(),
        }
    }
}
