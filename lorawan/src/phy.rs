// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! PHYPayload framing and message integrity codes.
//!
//! Only the downlink data path is implemented: the network server side of
//! this workspace never parses uplinks and never constructs join frames.
//! Layout per LoRaWAN L2 1.1 §4: `MHDR | FHDR | FPort | FRMPayload | MIC`,
//! with all multi-byte fields little-endian.

use aes::Aes128;
use cmac::{Cmac, Mac};

use crate::{Aes128Key, DevAddr, Error};

/// Message type, the high three bits of the MHDR octet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum MType {
    JoinRequest = 0x00,
    JoinAccept = 0x01,
    UnconfirmedDataUp = 0x02,
    UnconfirmedDataDown = 0x03,
    ConfirmedDataUp = 0x04,
    ConfirmedDataDown = 0x05,
    RejoinRequest = 0x06,
    Proprietary = 0x07,
}

/// Major version, the low two bits of the MHDR octet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Major {
    LorawanR1 = 0x00,
}

/// MAC header octet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Mhdr {
    pub m_type: MType,
    pub major: Major,
}

impl Mhdr {
    fn to_byte(self) -> u8 {
        (self.m_type as u8) << 5 | (self.major as u8)
    }
}

/// Downlink frame-control octet.  FOpts are never carried on the multicast
/// path, so the low nibble is always zero here.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FCtrl {
    pub adr: bool,
    pub ack: bool,
    pub f_pending: bool,
}

impl FCtrl {
    fn to_byte(self) -> u8 {
        (self.adr as u8) << 7 | (self.ack as u8) << 5 | (self.f_pending as u8) << 4
    }
}

/// Frame header.  `f_cnt` holds the full 32-bit counter; only the low
/// 16 bits go on the wire, the rest participates in the MIC.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Fhdr {
    pub dev_addr: DevAddr,
    pub f_ctrl: FCtrl,
    pub f_cnt: u32,
}

/// MACPayload of a data frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MacPayload {
    pub fhdr: Fhdr,
    pub f_port: Option<u8>,
    pub frm_payload: Vec<u8>,
}

/// A complete physical payload.  Construct it, call
/// [`PhyPayload::set_downlink_data_mic`], then serialise with
/// [`PhyPayload::to_vec`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PhyPayload {
    pub mhdr: Mhdr,
    pub mac_payload: MacPayload,
    pub mic: [u8; 4],
}

impl PhyPayload {
    /// Assemble an unconfirmed data-down frame without a MIC.
    pub fn unconfirmed_data_down(
        dev_addr: DevAddr,
        f_cnt: u32,
        f_port: u8,
        frm_payload: Vec<u8>,
    ) -> PhyPayload {
        PhyPayload {
            mhdr: Mhdr {
                m_type: MType::UnconfirmedDataDown,
                major: Major::LorawanR1,
            },
            mac_payload: MacPayload {
                fhdr: Fhdr {
                    dev_addr,
                    f_ctrl: FCtrl::default(),
                    f_cnt,
                },
                f_port: Some(f_port),
                frm_payload,
            },
            mic: [0; 4],
        }
    }

    /// MHDR..FRMPayload, the portion covered by the MIC.
    fn mac_bytes(&self) -> Result<Vec<u8>, Error> {
        let mac = &self.mac_payload;
        if mac.f_port.is_none() && !mac.frm_payload.is_empty() {
            return Err(Error::MissingFPort);
        }

        let mut out = Vec::with_capacity(8 + 1 + mac.frm_payload.len());
        out.push(self.mhdr.to_byte());
        out.extend_from_slice(&mac.fhdr.dev_addr.to_le_bytes());
        out.push(mac.fhdr.f_ctrl.to_byte());
        out.extend_from_slice(&(mac.fhdr.f_cnt as u16).to_le_bytes());
        if let Some(f_port) = mac.f_port {
            out.push(f_port);
            out.extend_from_slice(&mac.frm_payload);
        }
        Ok(out)
    }

    /// Compute and store the LoRaWAN 1.1 downlink data MIC.
    ///
    /// `conf_f_cnt` is the counter of the confirmed uplink being
    /// acknowledged; it is zero whenever the ACK bit is unset, which is
    /// always the case for multicast downlinks.
    pub fn set_downlink_data_mic(
        &mut self,
        conf_f_cnt: u16,
        key: &Aes128Key,
    ) -> Result<(), Error> {
        let msg = self.mac_bytes()?;

        let mut b0 = [0u8; 16];
        b0[0] = 0x49;
        b0[1..3].copy_from_slice(&conf_f_cnt.to_le_bytes());
        b0[5] = 0x01; // direction: downlink
        b0[6..10].copy_from_slice(&self.mac_payload.fhdr.dev_addr.to_le_bytes());
        b0[10..14].copy_from_slice(&self.mac_payload.fhdr.f_cnt.to_le_bytes());
        b0[15] = msg.len() as u8;

        let mut mac = Cmac::<Aes128>::new((&key.0).into());
        mac.update(&b0);
        mac.update(&msg);
        let tag = mac.finalize().into_bytes();
        self.mic.copy_from_slice(&tag[..4]);
        Ok(())
    }

    /// Serialise to wire order.
    pub fn to_vec(&self) -> Result<Vec<u8>, Error> {
        let mut out = self.mac_bytes()?;
        out.extend_from_slice(&self.mic);
        Ok(out)
    }
}
