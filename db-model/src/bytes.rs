// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Newtypes binding the fixed-width lorawan byte types to `bytea` columns.

use std::io::Write;

use diesel::deserialize::{self, FromSql};
use diesel::pg::{Pg, PgValue};
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types;
use serde::{Deserialize, Serialize};

macro_rules! bytea_newtype {
    ($(#[$doc:meta])* $name:ident, $inner:path) => {
        $(#[$doc])*
        #[derive(
            Clone,
            Copy,
            Debug,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            Serialize,
            Deserialize,
            diesel::AsExpression,
            diesel::FromSqlRow,
        )]
        #[diesel(sql_type = sql_types::Binary)]
        pub struct $name(pub $inner);

        impl From<$inner> for $name {
            fn from(value: $inner) -> Self {
                Self(value)
            }
        }

        impl From<$name> for $inner {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl ToSql<sql_types::Binary, Pg> for $name {
            fn to_sql<'a>(
                &'a self,
                out: &mut Output<'a, '_, Pg>,
            ) -> serialize::Result {
                out.write_all(self.0.as_bytes())?;
                Ok(IsNull::No)
            }
        }

        impl FromSql<sql_types::Binary, Pg> for $name {
            fn from_sql(value: PgValue<'_>) -> deserialize::Result<Self> {
                let inner = <$inner>::from_slice(value.as_bytes())?;
                Ok(Self(inner))
            }
        }
    };
}

bytea_newtype!(
    /// A multicast (or device) address column.
    DevAddr,
    lorikeet_lorawan::DevAddr
);

bytea_newtype!(
    /// A DevEUI or gateway MAC column.
    Eui64,
    lorikeet_lorawan::Eui64
);

bytea_newtype!(
    /// A 128-bit session-key column.
    Aes128Key,
    lorikeet_lorawan::Aes128Key
);
