// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! LoRaWAN wire-level types shared across the lorikeet workspace.
//!
//! This crate is deliberately free of any I/O or storage concerns: it holds
//! the scalar identifier and key types (`DevAddr`, `Eui64`, `Aes128Key`) and
//! the PHYPayload framing in [`phy`].  Byte order follows the LoRaWAN L2
//! specification: identifiers are displayed big-endian (the order they are
//! written in hex everywhere) and transmitted little-endian on the wire.

use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub mod phy;

/// Errors produced while parsing or assembling wire types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid hex encoding: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("expected {expected} bytes, got {got}")]
    Length { expected: usize, got: usize },
    #[error("FPort must be set for a non-empty FRMPayload")]
    MissingFPort,
}

macro_rules! fixed_bytes_type {
    ($(#[$doc:meta])* $name:ident, $len:expr) => {
        $(#[$doc])*
        #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub [u8; $len]);

        impl $name {
            pub const fn new(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            /// Wire representation (little-endian byte order).
            pub fn to_le_bytes(&self) -> [u8; $len] {
                let mut out = self.0;
                out.reverse();
                out
            }

            pub fn from_slice(bytes: &[u8]) -> Result<Self, Error> {
                let arr: [u8; $len] = bytes.try_into().map_err(|_| {
                    Error::Length { expected: $len, got: bytes.len() }
                })?;
                Ok(Self(arr))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&hex::encode(self.0))
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_slice(&hex::decode(s)?)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(
                &self,
                serializer: S,
            ) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(
                deserializer: D,
            ) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(D::Error::custom)
            }
        }
    };
}

fixed_bytes_type!(
    /// 32-bit device (or multicast group) address.
    DevAddr,
    4
);

fixed_bytes_type!(
    /// 64-bit extended unique identifier, used for both devices (DevEUI)
    /// and gateways (gateway MAC).
    Eui64,
    8
);

fixed_bytes_type!(
    /// 128-bit AES session key.
    Aes128Key,
    16
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dev_addr_hex_round_trip() {
        let addr = DevAddr::new([0x01, 0x02, 0x03, 0xff]);
        assert_eq!(addr.to_string(), "010203ff");
        assert_eq!("010203ff".parse::<DevAddr>().unwrap(), addr);
    }

    #[test]
    fn dev_addr_wire_order_is_little_endian() {
        let addr = DevAddr::new([0x01, 0x02, 0x03, 0x04]);
        assert_eq!(addr.to_le_bytes(), [0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn eui64_rejects_wrong_length() {
        assert!(matches!(
            "0102".parse::<Eui64>(),
            Err(Error::Length { expected: 8, got: 2 })
        ));
        assert!("zz0203040506070z".parse::<Eui64>().is_err());
    }

    #[test]
    fn serde_uses_hex_strings() {
        let key = Aes128Key::new([1; 16]);
        let encoded = serde_json::to_string(&key).unwrap();
        assert_eq!(encoded, "\"01010101010101010101010101010101\"");
        let decoded: Aes128Key = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, key);
    }
}
