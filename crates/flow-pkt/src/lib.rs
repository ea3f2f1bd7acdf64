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

//! Per-protocol flow contexts and the field registry used to export them.
//!
//! Every protocol plugin owns a context type holding the values it decoded
//! from the packets of a flow, an ordered enumeration of the fields it can
//! export and one getter per field. Contexts of different protocols are
//! stored side by side in a [`FlowRecord`] as [`ProtocolContext`] values; the
//! variant tag is checked every time a context is handed back to typed code.

pub mod flow;
pub mod http;
pub mod icmp;
pub mod mpls;
pub mod mqtt;
pub mod packet;
pub mod plugin;
pub mod quic;
pub mod registry;
pub mod value;
pub mod vlan;

pub use flow::{FlowAction, FlowRecord};
pub use packet::{Direction, Packet};
pub use plugin::{BeforeUpdateResult, OnInitResult, OnUpdateResult, ProcessPlugin};
pub use registry::{FieldIndex, FieldManager, Getter, ProtocolFields, RegisteredField, RegistryError};
pub use value::FieldValue;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumCount, EnumIter, EnumString, FromRepr, IntoStaticStr};

/// Identity of a protocol plugin. The lowercase name doubles as the plugin
/// name used in configuration.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    EnumCount,
    EnumIter,
    EnumString,
    FromRepr,
    IntoStaticStr,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Protocol {
    Vlan,
    Mpls,
    Icmp,
    Quic,
    Mqtt,
    Http,
}

impl Protocol {
    pub fn name(self) -> &'static str {
        self.into()
    }

    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Context of any protocol, tagged with the protocol that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "protocol", rename_all = "lowercase")]
pub enum ProtocolContext {
    Vlan(vlan::VlanContext),
    Mpls(mpls::MplsContext),
    Icmp(icmp::IcmpContext),
    Quic(quic::QuicContext),
    Mqtt(mqtt::MqttContext),
    Http(http::HttpContext),
}

impl ProtocolContext {
    pub const fn protocol(&self) -> Protocol {
        match self {
            Self::Vlan(_) => Protocol::Vlan,
            Self::Mpls(_) => Protocol::Mpls,
            Self::Icmp(_) => Protocol::Icmp,
            Self::Quic(_) => Protocol::Quic,
            Self::Mqtt(_) => Protocol::Mqtt,
            Self::Http(_) => Protocol::Http,
        }
    }
}
