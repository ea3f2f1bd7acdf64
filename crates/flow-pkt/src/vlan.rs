// Copyright (C) 2022-present The NetGauze Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! IEEE 802.1Q tag of the outermost VLAN.

use crate::{
    plugin::{OnInitResult, OnUpdateResult, ProcessPlugin},
    FieldIndex, FieldValue, Getter, Packet, Protocol, ProtocolContext, ProtocolFields,
};
use serde::{Deserialize, Serialize};
use strum::EnumCount as _;
use strum_macros::{Display, EnumCount, EnumIter, IntoStaticStr};

/// Tag Control Information
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VlanTci(u16);

impl VlanTci {
    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    pub const fn value(&self) -> u16 {
        self.0
    }

    /// Priority code point
    pub const fn pcp(&self) -> u8 {
        (self.0 >> 13) as u8
    }

    /// Drop eligible indicator
    pub const fn dei(&self) -> bool {
        self.0 & 0x1000 != 0
    }

    pub const fn vid(&self) -> u16 {
        self.0 & 0x0fff
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VlanContext {
    tci: VlanTci,
}

impl VlanContext {
    pub const fn new(tci: u16) -> Self {
        Self {
            tci: VlanTci::new(tci),
        }
    }

    pub const fn tci(&self) -> VlanTci {
        self.tci
    }
}

impl From<VlanContext> for ProtocolContext {
    fn from(value: VlanContext) -> Self {
        ProtocolContext::Vlan(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumCount, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum VlanField {
    VlanId,
}

impl FieldIndex for VlanField {
    fn index(self) -> usize {
        self as usize
    }
}

fn vlan_id(context: &VlanContext) -> Option<FieldValue<'_>> {
    Some(FieldValue::U16(context.tci.vid()))
}

const GETTERS: [Getter<VlanContext>; VlanField::COUNT] = [vlan_id];

impl ProtocolFields for VlanContext {
    const PROTOCOL: Protocol = Protocol::Vlan;
    type Field = VlanField;
    const GETTERS: &'static [Getter<Self>] = &GETTERS;

    fn from_context(context: &ProtocolContext) -> Option<&Self> {
        match context {
            ProtocolContext::Vlan(value) => Some(value),
            _ => None,
        }
    }

    fn from_context_mut(context: &mut ProtocolContext) -> Option<&mut Self> {
        match context {
            ProtocolContext::Vlan(value) => Some(value),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct VlanPlugin;

impl ProcessPlugin for VlanPlugin {
    fn protocol(&self) -> Protocol {
        Protocol::Vlan
    }

    fn on_init(&self, packet: &Packet<'_>) -> OnInitResult {
        match packet.vlan_tci() {
            Some(tci) => OnInitResult::ConstructedFinal(VlanContext::new(tci).into()),
            None => OnInitResult::Irrelevant,
        }
    }

    fn on_update(&self, _packet: &Packet<'_>, _context: &mut ProtocolContext) -> OnUpdateResult {
        OnUpdateResult::Final
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::IPPROTO_UDP;

    #[test]
    fn tci_bits() {
        let tci = VlanTci::new(0xb064);
        assert_eq!(tci.pcp(), 5);
        assert!(tci.dei());
        assert_eq!(tci.vid(), 0x064);
        assert!(!VlanTci::new(0x0fff).dei());
    }

    #[test]
    fn field_names() {
        assert_eq!(VlanField::VlanId.name(), "VLAN_ID");
        assert_eq!(VlanField::VlanId.index(), 0);
    }

    #[test]
    fn plugin() {
        let plugin = VlanPlugin;
        let tagged = Packet::new(IPPROTO_UDP, b"").with_vlan_tci(0x2001);
        let ctx = match plugin.on_init(&tagged) {
            OnInitResult::ConstructedFinal(ctx) => ctx,
            other => panic!("unexpected {other:?}"),
        };
        let vlan = VlanContext::from_context(&ctx).unwrap();
        assert_eq!(vlan.get(VlanField::VlanId), Some(FieldValue::U16(1)));
        assert_eq!(
            plugin.on_init(&Packet::new(IPPROTO_UDP, b"")),
            OnInitResult::Irrelevant
        );
    }
}
