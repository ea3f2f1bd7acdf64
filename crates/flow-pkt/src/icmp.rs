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

//! ICMP and ICMPv6 message type and code. For these protocols the packet
//! payload starts at the ICMP header.

use crate::{
    packet::{IPPROTO_ICMP, IPPROTO_ICMPV6},
    plugin::{OnInitResult, OnUpdateResult, ProcessPlugin},
    FieldIndex, FieldValue, Getter, Packet, Protocol, ProtocolContext, ProtocolFields,
};
use flowprobe_parse_utils::{ErrorKindSerdeDeref, FromNomErrorKind, Located, ReadablePdu, Span};
use nom::{error::ErrorKind, number::complete::be_u8, IResult};
use serde::{Deserialize, Serialize};
use strum::EnumCount as _;
use strum_macros::{Display, EnumCount, EnumIter, IntoStaticStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IcmpParsingError {
    #[serde(with = "ErrorKindSerdeDeref")]
    NomError(ErrorKind),
}

impl std::fmt::Display for IcmpParsingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NomError(kind) => write!(f, "{}", nom::Err::Error(kind)),
        }
    }
}

impl std::error::Error for IcmpParsingError {}

impl FromNomErrorKind for IcmpParsingError {
    fn from_nom_error_kind(kind: ErrorKind) -> Self {
        Self::NomError(kind)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IcmpTypeCode {
    icmp_type: u8,
    code: u8,
}

impl IcmpTypeCode {
    pub const fn new(icmp_type: u8, code: u8) -> Self {
        Self { icmp_type, code }
    }

    pub const fn icmp_type(&self) -> u8 {
        self.icmp_type
    }

    pub const fn code(&self) -> u8 {
        self.code
    }

    /// Type in the high octet, code in the low octet.
    pub const fn value(&self) -> u16 {
        ((self.icmp_type as u16) << 8) | self.code as u16
    }
}

impl<'a> ReadablePdu<'a, Located<'a, IcmpParsingError>> for IcmpTypeCode {
    fn from_wire(buf: Span<'a>) -> IResult<Span<'a>, Self, Located<'a, IcmpParsingError>> {
        let (buf, icmp_type) = be_u8(buf)?;
        let (buf, code) = be_u8(buf)?;
        Ok((buf, Self::new(icmp_type, code)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IcmpContext {
    type_code: IcmpTypeCode,
}

impl IcmpContext {
    pub const fn new(icmp_type: u8, code: u8) -> Self {
        Self {
            type_code: IcmpTypeCode::new(icmp_type, code),
        }
    }

    pub const fn type_code(&self) -> IcmpTypeCode {
        self.type_code
    }
}

impl From<IcmpContext> for ProtocolContext {
    fn from(value: IcmpContext) -> Self {
        ProtocolContext::Icmp(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumCount, EnumIter, IntoStaticStr)]
pub enum IcmpField {
    #[strum(serialize = "L4_ICMP_TYPE_CODE")]
    L4IcmpTypeCode,
}

impl FieldIndex for IcmpField {
    fn index(self) -> usize {
        self as usize
    }
}

fn type_code(context: &IcmpContext) -> Option<FieldValue<'_>> {
    Some(FieldValue::U16(context.type_code.value()))
}

const GETTERS: [Getter<IcmpContext>; IcmpField::COUNT] = [type_code];

impl ProtocolFields for IcmpContext {
    const PROTOCOL: Protocol = Protocol::Icmp;
    type Field = IcmpField;
    const GETTERS: &'static [Getter<Self>] = &GETTERS;

    fn from_context(context: &ProtocolContext) -> Option<&Self> {
        match context {
            ProtocolContext::Icmp(value) => Some(value),
            _ => None,
        }
    }

    fn from_context_mut(context: &mut ProtocolContext) -> Option<&mut Self> {
        match context {
            ProtocolContext::Icmp(value) => Some(value),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IcmpPlugin;

impl ProcessPlugin for IcmpPlugin {
    fn protocol(&self) -> Protocol {
        Protocol::Icmp
    }

    fn on_init(&self, packet: &Packet<'_>) -> OnInitResult {
        if !matches!(packet.ip_protocol(), IPPROTO_ICMP | IPPROTO_ICMPV6) {
            return OnInitResult::Irrelevant;
        }
        match IcmpTypeCode::from_wire(packet.payload()) {
            Ok((_, type_code)) => OnInitResult::ConstructedFinal(
                IcmpContext::new(type_code.icmp_type(), type_code.code()).into(),
            ),
            Err(err) => {
                tracing::debug!(error = ?err, "truncated ICMP header");
                OnInitResult::Irrelevant
            }
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
    use flowprobe_parse_utils::test_helpers::test_parse_error;
    use rstest::rstest;

    #[rstest]
    #[case::echo_request(IPPROTO_ICMP, &[0x08, 0x00, 0xf7, 0xff], Some(0x0800))]
    #[case::port_unreachable(IPPROTO_ICMP, &[0x03, 0x03], Some(0x0303))]
    #[case::neighbor_solicitation(IPPROTO_ICMPV6, &[0x87, 0x00, 0x00, 0x00], Some(0x8700))]
    #[case::truncated(IPPROTO_ICMP, &[0x08], None)]
    #[case::not_icmp(IPPROTO_UDP, &[0x08, 0x00], None)]
    fn plugin(#[case] ip_protocol: u8, #[case] payload: &[u8], #[case] expected: Option<u16>) {
        let ret = IcmpPlugin.on_init(&Packet::new(ip_protocol, payload));
        match (ret, expected) {
            (OnInitResult::ConstructedFinal(ctx), Some(value)) => {
                let icmp = IcmpContext::from_context(&ctx).unwrap();
                assert_eq!(icmp.get(IcmpField::L4IcmpTypeCode), Some(FieldValue::U16(value)));
            }
            (OnInitResult::Irrelevant, None) => {}
            (ret, expected) => panic!("got {ret:?}, expected {expected:?}"),
        }
    }

    #[test]
    fn truncated_header() {
        let bad_wire = [0x03];
        let bad = Located::new(
            Span::with_offset(1, &[]),
            IcmpParsingError::NomError(ErrorKind::Eof),
        );
        test_parse_error::<IcmpTypeCode, Located<'_, IcmpParsingError>>(&bad_wire, &bad);
    }

    #[test]
    fn field_name() {
        assert_eq!(IcmpField::L4IcmpTypeCode.name(), "L4_ICMP_TYPE_CODE");
    }
}
