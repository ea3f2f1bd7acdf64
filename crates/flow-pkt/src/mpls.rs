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

//! Top entry of the MPLS label stack.

use crate::{
    plugin::{OnInitResult, OnUpdateResult, ProcessPlugin},
    FieldIndex, FieldValue, Getter, Packet, Protocol, ProtocolContext, ProtocolFields,
};
use flowprobe_parse_utils::{ErrorKindSerdeDeref, FromNomErrorKind, Located, ReadablePdu, Span};
use nom::{error::ErrorKind, number::complete::be_u32, IResult};
use serde::{Deserialize, Serialize};
use strum::EnumCount as _;
use strum_macros::{Display, EnumCount, EnumIter, IntoStaticStr};

/// Label, traffic class and bottom of stack bit, as exported.
pub const MPLS_LABEL_SECTION_LENGTH: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MplsParsingError {
    #[serde(with = "ErrorKindSerdeDeref")]
    NomError(ErrorKind),
}

impl std::fmt::Display for MplsParsingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NomError(kind) => write!(f, "{}", nom::Err::Error(kind)),
        }
    }
}

impl std::error::Error for MplsParsingError {}

impl FromNomErrorKind for MplsParsingError {
    fn from_nom_error_kind(kind: ErrorKind) -> Self {
        Self::NomError(kind)
    }
}

/// One four byte label stack entry.
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                Label                  | TC  |S|       TTL     |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MplsLabelStackEntry(u32);

impl MplsLabelStackEntry {
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    pub const fn label(&self) -> u32 {
        self.0 >> 12
    }

    pub const fn traffic_class(&self) -> u8 {
        ((self.0 >> 9) & 0x07) as u8
    }

    pub const fn bottom_of_stack(&self) -> bool {
        self.0 & 0x100 != 0
    }

    pub const fn ttl(&self) -> u8 {
        (self.0 & 0xff) as u8
    }

    /// Entry without the TTL octet.
    pub const fn label_section(&self) -> [u8; MPLS_LABEL_SECTION_LENGTH] {
        let bytes = self.0.to_be_bytes();
        [bytes[0], bytes[1], bytes[2]]
    }
}

impl<'a> ReadablePdu<'a, Located<'a, MplsParsingError>> for MplsLabelStackEntry {
    fn from_wire(buf: Span<'a>) -> IResult<Span<'a>, Self, Located<'a, MplsParsingError>> {
        let (buf, value) = be_u32(buf)?;
        Ok((buf, Self(value)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MplsContext {
    top_label: [u8; MPLS_LABEL_SECTION_LENGTH],
}

impl MplsContext {
    pub const fn new(top: MplsLabelStackEntry) -> Self {
        Self {
            top_label: top.label_section(),
        }
    }

    pub const fn top_label_section(&self) -> &[u8; MPLS_LABEL_SECTION_LENGTH] {
        &self.top_label
    }
}

impl From<MplsContext> for ProtocolContext {
    fn from(value: MplsContext) -> Self {
        ProtocolContext::Mpls(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumCount, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum MplsField {
    MplsTopLabelStackSection,
}

impl FieldIndex for MplsField {
    fn index(self) -> usize {
        self as usize
    }
}

fn top_label_stack_section(context: &MplsContext) -> Option<FieldValue<'_>> {
    Some(FieldValue::Bytes(&context.top_label))
}

const GETTERS: [Getter<MplsContext>; MplsField::COUNT] = [top_label_stack_section];

impl ProtocolFields for MplsContext {
    const PROTOCOL: Protocol = Protocol::Mpls;
    type Field = MplsField;
    const GETTERS: &'static [Getter<Self>] = &GETTERS;

    fn from_context(context: &ProtocolContext) -> Option<&Self> {
        match context {
            ProtocolContext::Mpls(value) => Some(value),
            _ => None,
        }
    }

    fn from_context_mut(context: &mut ProtocolContext) -> Option<&mut Self> {
        match context {
            ProtocolContext::Mpls(value) => Some(value),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MplsPlugin;

impl ProcessPlugin for MplsPlugin {
    fn protocol(&self) -> Protocol {
        Protocol::Mpls
    }

    fn on_init(&self, packet: &Packet<'_>) -> OnInitResult {
        match MplsLabelStackEntry::from_wire(packet.mpls_label_stack()) {
            Ok((_, top)) => OnInitResult::ConstructedFinal(MplsContext::new(top).into()),
            Err(_) => OnInitResult::Irrelevant,
        }
    }

    fn on_update(&self, _packet: &Packet<'_>, _context: &mut ProtocolContext) -> OnUpdateResult {
        OnUpdateResult::Final
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::IPPROTO_TCP;
    use flowprobe_parse_utils::test_helpers::{test_parse_error, test_parsed_completely};

    #[test]
    fn label_stack_entry() {
        let good_wire = [0x00, 0x3e, 0x81, 0x40];
        let entry = MplsLabelStackEntry::new(0x003e8140);
        let parsed = test_parsed_completely::<MplsLabelStackEntry, Located<'_, MplsParsingError>>(
            &good_wire,
            &entry,
        );
        assert_eq!(parsed.label(), 1000);
        assert_eq!(parsed.traffic_class(), 0);
        assert!(parsed.bottom_of_stack());
        assert_eq!(parsed.ttl(), 64);
        assert_eq!(parsed.label_section(), [0x00, 0x3e, 0x81]);
    }

    #[test]
    fn truncated_entry() {
        let bad_wire = [0x00, 0x3e, 0x81];
        let bad = Located::new(
            Span::with_offset(0, &bad_wire),
            MplsParsingError::NomError(ErrorKind::Eof),
        );
        test_parse_error::<MplsLabelStackEntry, Located<'_, MplsParsingError>>(&bad_wire, &bad);
    }

    #[test]
    fn plugin_takes_the_top_entry() {
        let stack = [0x00, 0x01, 0x20, 0x3f, 0x00, 0x3e, 0x81, 0x40];
        let packet = Packet::new(IPPROTO_TCP, b"").with_mpls_label_stack(&stack);
        let ctx = match MplsPlugin.on_init(&packet) {
            OnInitResult::ConstructedFinal(ctx) => ctx,
            other => panic!("unexpected {other:?}"),
        };
        let mpls = MplsContext::from_context(&ctx).unwrap();
        assert_eq!(
            mpls.get(MplsField::MplsTopLabelStackSection),
            Some(FieldValue::Bytes(&[0x00, 0x01, 0x20]))
        );
        assert_eq!(
            MplsPlugin.on_init(&Packet::new(IPPROTO_TCP, b"")),
            OnInitResult::Irrelevant
        );
    }
}
