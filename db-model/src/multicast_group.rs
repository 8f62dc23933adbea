// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use chrono::{DateTime, Utc};
use diesel::deserialize::{self, FromSql};
use diesel::pg::{Pg, PgValue};
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types;
use diesel::{AsChangeset, AsExpression, FromSqlRow, Insertable, Queryable, QueryableByName, Selectable};
use serde::{Deserialize, Serialize};
use std::io::Write;
use uuid::Uuid;

use crate::bytes::{Aes128Key, DevAddr};
use crate::schema::multicast_group;

/// Device class of a multicast group.
///
/// Class-B groups are scheduled onto ping slots; Class-C groups listen
/// continuously and are dispatched eagerly.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    AsExpression,
    FromSqlRow,
    Serialize,
    Deserialize,
)]
#[diesel(sql_type = sql_types::Text)]
pub enum MulticastGroupType {
    B,
    C,
}

impl std::fmt::Display for MulticastGroupType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            MulticastGroupType::B => "B",
            MulticastGroupType::C => "C",
        })
    }
}

impl ToSql<sql_types::Text, Pg> for MulticastGroupType {
    fn to_sql<'a>(&'a self, out: &mut Output<'a, '_, Pg>) -> serialize::Result {
        match self {
            MulticastGroupType::B => out.write_all(b"B")?,
            MulticastGroupType::C => out.write_all(b"C")?,
        }
        Ok(IsNull::No)
    }
}

impl FromSql<sql_types::Text, Pg> for MulticastGroupType {
    fn from_sql(value: PgValue<'_>) -> deserialize::Result<Self> {
        match value.as_bytes() {
            b"B" => Ok(MulticastGroupType::B),
            b"C" => Ok(MulticastGroupType::C),
            other => Err(format!(
                "unrecognized multicast group type: {:?}",
                String::from_utf8_lossy(other)
            )
            .into()),
        }
    }
}

/// A multicast group row.
#[derive(
    Queryable,
    QueryableByName,
    Selectable,
    Insertable,
    Clone,
    Debug,
    PartialEq,
    Serialize,
    Deserialize,
)]
#[diesel(table_name = multicast_group)]
pub struct MulticastGroup {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Multicast address shared by all member devices.
    pub mc_addr: DevAddr,
    /// Multicast network session key; signs every downlink MIC.
    pub mc_net_s_key: Aes128Key,
    /// Downlink frame counter, owned exclusively by the enqueue pipeline.
    pub f_cnt: i32,
    pub group_type: MulticastGroupType,
    pub dr: i32,
    /// Downlink frequency (Hz).
    pub frequency: i64,
    /// Class-B ping-slot periodicity, in 30.72 ms beacon-reserved slots.
    /// Zero for Class-C groups.
    pub ping_slot_period: i32,
}

/// Caller-supplied values for creating a [`MulticastGroup`].
#[derive(Clone, Debug, PartialEq)]
pub struct MulticastGroupParams {
    pub mc_addr: lorikeet_lorawan::DevAddr,
    pub mc_net_s_key: lorikeet_lorawan::Aes128Key,
    pub f_cnt: u32,
    pub group_type: MulticastGroupType,
    pub dr: u8,
    pub frequency: u64,
    pub ping_slot_period: u32,
}

impl MulticastGroup {
    pub fn new(id: Uuid, params: MulticastGroupParams) -> MulticastGroup {
        let now = Utc::now();
        MulticastGroup {
            id,
            created_at: now,
            updated_at: now,
            mc_addr: params.mc_addr.into(),
            mc_net_s_key: params.mc_net_s_key.into(),
            f_cnt: params.f_cnt as i32,
            group_type: params.group_type,
            dr: i32::from(params.dr),
            frequency: params.frequency as i64,
            ping_slot_period: params.ping_slot_period as i32,
        }
    }
}

/// Update data for a multicast group.  Every mutable column is written;
/// partial updates are a gRPC-layer concern.
#[derive(AsChangeset, Clone, Debug, PartialEq)]
#[diesel(table_name = multicast_group)]
pub struct MulticastGroupUpdate {
    pub updated_at: DateTime<Utc>,
    pub mc_addr: DevAddr,
    pub mc_net_s_key: Aes128Key,
    pub f_cnt: i32,
    pub group_type: MulticastGroupType,
    pub dr: i32,
    pub frequency: i64,
    pub ping_slot_period: i32,
}

impl From<MulticastGroupParams> for MulticastGroupUpdate {
    fn from(params: MulticastGroupParams) -> Self {
        MulticastGroupUpdate {
            updated_at: Utc::now(),
            mc_addr: params.mc_addr.into(),
            mc_net_s_key: params.mc_net_s_key.into(),
            f_cnt: params.f_cnt as i32,
            group_type: params.group_type,
            dr: i32::from(params.dr),
            frequency: params.frequency as i64,
            ping_slot_period: params.ping_slot_period as i32,
        }
    }
}
