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

//! MQTT v3.1.1 and v5.0 control packets carried in TCP segments.

use crate::{
    plugin::{OnInitResult, OnUpdateResult, ProcessPlugin},
    FieldIndex, FieldValue, Getter, Packet, Protocol, ProtocolContext, ProtocolFields,
};
use flowprobe_parse_utils::{
    token::{LazyTokenSequence, ParsingState, Step, TokenRule},
    varint::read_variable_length,
    ErrorKindSerdeDeref, FromNomErrorKind, Located, ReadablePdu, Span,
};
use nom::{
    bytes::complete::take,
    error::ErrorKind,
    number::complete::{be_u16, be_u8},
    IResult,
};
use serde::{Deserialize, Serialize};
use strum::EnumCount as _;
use strum_macros::{Display, EnumCount, EnumIter, FromRepr, IntoStaticStr};

pub const MQTT_PROTOCOL_NAME: &str = "MQTT";

/// Separator appended after every recorded topic. `#` cannot appear in a
/// topic name of a PUBLISH packet.
pub const TOPIC_SEPARATOR: char = '#';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MqttParsingError {
    #[serde(with = "ErrorKindSerdeDeref")]
    NomError(ErrorKind),
    InvalidProtocolName,
    UnsupportedVersion(u8),
    InvalidUtf8,
}

impl std::fmt::Display for MqttParsingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NomError(kind) => write!(f, "{}", nom::Err::Error(kind)),
            Self::InvalidProtocolName => write!(f, "protocol name is not {MQTT_PROTOCOL_NAME}"),
            Self::UnsupportedVersion(version) => {
                write!(f, "unsupported MQTT protocol level {version}")
            }
            Self::InvalidUtf8 => write!(f, "string is not valid UTF-8"),
        }
    }
}

impl std::error::Error for MqttParsingError {}

impl FromNomErrorKind for MqttParsingError {
    fn from_nom_error_kind(kind: ErrorKind) -> Self {
        Self::NomError(kind)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, FromRepr, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum MqttHeaderType {
    Reserved = 0,
    Connect = 1,
    ConnAck = 2,
    Publish = 3,
    PubAck = 4,
    PubRec = 5,
    PubRel = 6,
    PubComp = 7,
    Subscribe = 8,
    SubAck = 9,
    Unsubscribe = 10,
    UnsubAck = 11,
    PingReq = 12,
    PingResp = 13,
    Disconnect = 14,
    Auth = 15,
}

/// First byte of every control packet: type in the high nibble, flags in
/// the low nibble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MqttFixedHeader(u8);

impl MqttFixedHeader {
    pub const fn new(value: u8) -> Self {
        Self(value)
    }

    pub const fn type_code(&self) -> u8 {
        self.0 >> 4
    }

    pub fn header_type(&self) -> MqttHeaderType {
        MqttHeaderType::from_repr(self.type_code()).unwrap_or(MqttHeaderType::Reserved)
    }

    pub const fn flags(&self) -> u8 {
        self.0 & 0x0f
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MqttPacket<'a> {
    header: MqttFixedHeader,
    body: Span<'a>,
}

impl<'a> MqttPacket<'a> {
    pub const fn header(&self) -> MqttFixedHeader {
        self.header
    }

    /// Variable header and payload.
    pub const fn body(&self) -> Span<'a> {
        self.body
    }
}

/// Splits a TCP segment into consecutive control packets.
#[derive(Debug, Clone, Copy, Default)]
pub struct MqttPacketRule;

impl<'a> TokenRule<'a> for MqttPacketRule {
    type Token = MqttPacket<'a>;

    fn step(&mut self, view: &mut Span<'a>) -> Step<Self::Token> {
        let Some(first) = view.byte(0) else {
            return Step::Finished;
        };
        let Some(rest) = view.advance(1) else {
            return Step::Stop;
        };
        let Some(remaining_length) = read_variable_length(rest) else {
            tracing::trace!(offset = rest.location_offset(), "unterminated MQTT remaining length");
            return Step::Stop;
        };
        let start = usize::from(remaining_length.length());
        let Some(end) = usize::try_from(remaining_length.value())
            .ok()
            .and_then(|length| start.checked_add(length))
        else {
            return Step::Stop;
        };
        let (Some(body), Some(next)) = (rest.subview(start..end), rest.advance(end)) else {
            tracing::trace!(offset = rest.location_offset(), "truncated MQTT packet");
            return Step::Stop;
        };
        *view = next;
        Step::Yield(MqttPacket {
            header: MqttFixedHeader::new(first),
            body,
        })
    }
}

pub type MqttPacketReader<'a> = LazyTokenSequence<'a, MqttPacketRule>;

/// Two byte length prefixed UTF-8 string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MqttString<'a>(&'a str);

impl<'a> MqttString<'a> {
    pub const fn as_str(&self) -> &'a str {
        self.0
    }
}

impl<'a> ReadablePdu<'a, Located<'a, MqttParsingError>> for MqttString<'a> {
    fn from_wire(buf: Span<'a>) -> IResult<Span<'a>, Self, Located<'a, MqttParsingError>> {
        let (buf, length) = be_u16(buf)?;
        let (buf, value) = take(length)(buf)?;
        match value.as_str() {
            Some(value) => Ok((buf, Self(value))),
            None => Err(nom::Err::Error(Located::new(
                value,
                MqttParsingError::InvalidUtf8,
            ))),
        }
    }
}

/// Variable header of a CONNECT packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MqttConnect {
    version: u8,
    flags: u8,
    keep_alive: u16,
}

impl MqttConnect {
    pub const fn new(version: u8, flags: u8, keep_alive: u16) -> Self {
        Self {
            version,
            flags,
            keep_alive,
        }
    }

    pub const fn version(&self) -> u8 {
        self.version
    }

    pub const fn flags(&self) -> u8 {
        self.flags
    }

    pub const fn keep_alive(&self) -> u16 {
        self.keep_alive
    }
}

impl<'a> ReadablePdu<'a, Located<'a, MqttParsingError>> for MqttConnect {
    fn from_wire(buf: Span<'a>) -> IResult<Span<'a>, Self, Located<'a, MqttParsingError>> {
        let input = buf;
        let (buf, name) = MqttString::from_wire(buf)?;
        if name.as_str() != MQTT_PROTOCOL_NAME {
            return Err(nom::Err::Error(Located::new(
                input,
                MqttParsingError::InvalidProtocolName,
            )));
        }
        let version_pos = buf;
        let (buf, version) = be_u8(buf)?;
        // v3.1.1 and v5.0
        if version != 4 && version != 5 {
            return Err(nom::Err::Error(Located::new(
                version_pos,
                MqttParsingError::UnsupportedVersion(version),
            )));
        }
        let (buf, flags) = be_u8(buf)?;
        let (buf, keep_alive) = be_u16(buf)?;
        Ok((buf, Self::new(version, flags, keep_alive)))
    }
}

/// Variable header of a CONNACK packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MqttConnAck {
    session_present: bool,
    return_code: u8,
}

impl MqttConnAck {
    pub const fn session_present(&self) -> bool {
        self.session_present
    }

    pub const fn return_code(&self) -> u8 {
        self.return_code
    }
}

impl<'a> ReadablePdu<'a, Located<'a, MqttParsingError>> for MqttConnAck {
    fn from_wire(buf: Span<'a>) -> IResult<Span<'a>, Self, Located<'a, MqttParsingError>> {
        let (buf, ack_flags) = be_u8(buf)?;
        let (buf, return_code) = be_u8(buf)?;
        Ok((
            buf,
            Self {
                session_present: ack_flags & 0x01 != 0,
                return_code,
            },
        ))
    }
}

/// Checks that the first packet of `payload` is a CONNECT naming the MQTT
/// protocol.
pub fn mqtt_label_present(payload: Span<'_>) -> bool {
    let Some(rest) = payload.advance(1) else {
        return false;
    };
    let Some(remaining_length) = read_variable_length(rest) else {
        return false;
    };
    let Some(label) = rest.advance(usize::from(remaining_length.length())) else {
        return false;
    };
    matches!(
        MqttString::from_wire(label),
        Ok((_, name)) if name.as_str() == MQTT_PROTOCOL_NAME
    )
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MqttOptions {
    /// Number of PUBLISH topics recorded per flow
    #[serde(rename = "topiccount", default)]
    max_topics: usize,
}

impl MqttOptions {
    pub const fn new(max_topics: usize) -> Self {
        Self { max_topics }
    }

    pub const fn max_topics(&self) -> usize {
        self.max_topics
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MqttContext {
    type_cumulative: Option<u16>,
    version: Option<u8>,
    connection_flags: Option<u8>,
    keep_alive: Option<u16>,
    connection_return_code: Option<u8>,
    publish_flags: Option<u8>,
    topics: Option<String>,
    topic_count: usize,
}

impl MqttContext {
    /// Bit `n` is set when a packet of type `n` was seen. Bit 0 carries the
    /// session present flag of CONNACK.
    pub const fn type_cumulative(&self) -> Option<u16> {
        self.type_cumulative
    }

    pub const fn version(&self) -> Option<u8> {
        self.version
    }

    pub const fn connection_flags(&self) -> Option<u8> {
        self.connection_flags
    }

    pub const fn keep_alive(&self) -> Option<u16> {
        self.keep_alive
    }

    pub const fn connection_return_code(&self) -> Option<u8> {
        self.connection_return_code
    }

    pub const fn publish_flags(&self) -> Option<u8> {
        self.publish_flags
    }

    /// Recorded topics, each followed by [`TOPIC_SEPARATOR`].
    pub fn topics(&self) -> Option<&str> {
        self.topics.as_deref()
    }

    fn add_topic(&mut self, topic: &str, max_topics: usize) {
        if self.topic_count < max_topics {
            let topics = self.topics.get_or_insert_with(String::new);
            topics.push_str(topic);
            topics.push(TOPIC_SEPARATOR);
        }
        self.topic_count = self.topic_count.saturating_add(1);
    }

    fn update(&mut self, payload: Span<'_>, options: &MqttOptions) -> OnUpdateResult {
        let mut reader = MqttPacketReader::new(payload, MqttPacketRule);
        for packet in reader.by_ref() {
            let header = packet.header();
            let cumulative = self.type_cumulative.get_or_insert(0);
            *cumulative |= 1 << header.type_code();
            match header.header_type() {
                MqttHeaderType::Connect => match MqttConnect::from_wire(packet.body()) {
                    Ok((_, connect)) => {
                        self.version = Some(connect.version());
                        self.connection_flags = Some(connect.flags());
                        self.keep_alive = Some(connect.keep_alive());
                    }
                    Err(err) => {
                        tracing::debug!(error = ?err, "invalid MQTT CONNECT");
                        return OnUpdateResult::Remove;
                    }
                },
                MqttHeaderType::ConnAck => match MqttConnAck::from_wire(packet.body()) {
                    Ok((_, ack)) => {
                        *cumulative |= u16::from(ack.session_present());
                        self.connection_return_code = Some(ack.return_code());
                    }
                    Err(_) => return OnUpdateResult::Remove,
                },
                MqttHeaderType::Publish => {
                    *self.publish_flags.get_or_insert(0) |= header.flags();
                    match MqttString::from_wire(packet.body()) {
                        Ok((_, topic)) if !topic.as_str().contains(TOPIC_SEPARATOR) => {
                            self.add_topic(topic.as_str(), options.max_topics());
                        }
                        _ => return OnUpdateResult::Remove,
                    }
                }
                MqttHeaderType::Disconnect => return OnUpdateResult::FlushFlow,
                _ => {}
            }
        }
        match reader.state() {
            ParsingState::Success => OnUpdateResult::NeedsUpdate,
            ParsingState::Failure => OnUpdateResult::Remove,
        }
    }
}

impl From<MqttContext> for ProtocolContext {
    fn from(value: MqttContext) -> Self {
        ProtocolContext::Mqtt(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumCount, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum MqttField {
    MqttTypeCumulative,
    MqttVersion,
    MqttConnectionFlags,
    MqttKeepAlive,
    MqttConnectionReturnCode,
    MqttPublishFlags,
    MqttTopics,
}

impl FieldIndex for MqttField {
    fn index(self) -> usize {
        self as usize
    }
}

fn type_cumulative(context: &MqttContext) -> Option<FieldValue<'_>> {
    context.type_cumulative.map(FieldValue::U16)
}

fn version(context: &MqttContext) -> Option<FieldValue<'_>> {
    context.version.map(FieldValue::U8)
}

fn connection_flags(context: &MqttContext) -> Option<FieldValue<'_>> {
    context.connection_flags.map(FieldValue::U8)
}

fn keep_alive(context: &MqttContext) -> Option<FieldValue<'_>> {
    context.keep_alive.map(FieldValue::U16)
}

fn connection_return_code(context: &MqttContext) -> Option<FieldValue<'_>> {
    context.connection_return_code.map(FieldValue::U8)
}

fn publish_flags(context: &MqttContext) -> Option<FieldValue<'_>> {
    context.publish_flags.map(FieldValue::U8)
}

fn topics(context: &MqttContext) -> Option<FieldValue<'_>> {
    context.topics().map(FieldValue::Str)
}

const GETTERS: [Getter<MqttContext>; MqttField::COUNT] = [
    type_cumulative,
    version,
    connection_flags,
    keep_alive,
    connection_return_code,
    publish_flags,
    topics,
];

impl ProtocolFields for MqttContext {
    const PROTOCOL: Protocol = Protocol::Mqtt;
    type Field = MqttField;
    const GETTERS: &'static [Getter<Self>] = &GETTERS;

    fn from_context(context: &ProtocolContext) -> Option<&Self> {
        match context {
            ProtocolContext::Mqtt(value) => Some(value),
            _ => None,
        }
    }

    fn from_context_mut(context: &mut ProtocolContext) -> Option<&mut Self> {
        match context {
            ProtocolContext::Mqtt(value) => Some(value),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MqttPlugin {
    options: MqttOptions,
}

impl MqttPlugin {
    pub const fn new(options: MqttOptions) -> Self {
        Self { options }
    }
}

impl ProcessPlugin for MqttPlugin {
    fn protocol(&self) -> Protocol {
        Protocol::Mqtt
    }

    fn on_init(&self, packet: &Packet<'_>) -> OnInitResult {
        if !packet.is_tcp() {
            return OnInitResult::Irrelevant;
        }
        let payload = packet.payload();
        if payload.is_empty() {
            return OnInitResult::PendingConstruction;
        }
        if !mqtt_label_present(payload) {
            return OnInitResult::Irrelevant;
        }
        let mut context = MqttContext::default();
        match context.update(payload, &self.options) {
            OnUpdateResult::Remove => OnInitResult::PendingConstruction,
            OnUpdateResult::NeedsUpdate => OnInitResult::ConstructedNeedsUpdate(context.into()),
            OnUpdateResult::Final | OnUpdateResult::FlushFlow => {
                OnInitResult::ConstructedFinal(context.into())
            }
        }
    }

    fn on_update(&self, packet: &Packet<'_>, context: &mut ProtocolContext) -> OnUpdateResult {
        let Some(context) = MqttContext::from_context_mut(context) else {
            return OnUpdateResult::Remove;
        };
        if packet.payload().is_empty() {
            return OnUpdateResult::NeedsUpdate;
        }
        context.update(packet.payload(), &self.options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{IPPROTO_TCP, IPPROTO_UDP};
    use flowprobe_parse_utils::test_helpers::{combine, test_parse_error, test_parsed_completely};
    use rstest::rstest;

    const CONNECT: [u8; 14] = [
        0x10, 0x0c, 0x00, 0x04, b'M', b'Q', b'T', b'T', 0x04, 0x02, 0x00, 0x3c, 0x00, 0x00,
    ];
    const CONNACK: [u8; 4] = [0x20, 0x02, 0x01, 0x00];
    const DISCONNECT: [u8; 2] = [0xe0, 0x00];

    fn publish(flags: u8, topic: &str) -> Vec<u8> {
        let topic = topic.as_bytes();
        let length = 2 + topic.len() + 5;
        combine(vec![
            &[0x30 | flags, length as u8, 0x00, topic.len() as u8],
            topic,
            b"hello",
        ])
    }

    fn tcp(payload: &[u8]) -> Packet<'_> {
        Packet::new(IPPROTO_TCP, payload).with_ports(51000, 1883)
    }

    fn plugin(max_topics: usize) -> MqttPlugin {
        MqttPlugin::new(MqttOptions::new(max_topics))
    }

    #[rstest]
    #[case(0x10, MqttHeaderType::Connect, 0)]
    #[case(0xe0, MqttHeaderType::Disconnect, 0)]
    #[case(0x3b, MqttHeaderType::Publish, 0x0b)]
    #[case(0x00, MqttHeaderType::Reserved, 0)]
    #[case(0xf0, MqttHeaderType::Auth, 0)]
    fn fixed_header(#[case] value: u8, #[case] header_type: MqttHeaderType, #[case] flags: u8) {
        let header = MqttFixedHeader::new(value);
        assert_eq!(header.header_type(), header_type);
        assert_eq!(header.flags(), flags);
    }

    #[test]
    fn packet_rule_splits_segment() {
        let segment = combine(vec![&CONNECT, &CONNACK]);
        let mut reader = MqttPacketReader::new(Span::new(&segment), MqttPacketRule);
        let packets: Vec<_> = reader.by_ref().collect();
        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0].header().header_type(), MqttHeaderType::Connect);
        assert_eq!(packets[0].body().len(), 12);
        assert_eq!(packets[1].body().fragment(), &[0x01, 0x00]);
        assert_eq!(packets[1].body().location_offset(), 16);
        assert_eq!(reader.state(), ParsingState::Success);
    }

    #[rstest]
    #[case::truncated_body(&[0x30, 0x05, 0x00, 0x01])]
    #[case::unterminated_length(&[0x30, 0xff])]
    #[case::length_too_long(&[0x30, 0xff, 0xff, 0xff, 0xff, 0x01])]
    fn packet_rule_stops(#[case] segment: &[u8]) {
        let mut reader = MqttPacketReader::new(Span::new(segment), MqttPacketRule);
        assert_eq!(reader.next(), None);
        assert_eq!(reader.state(), ParsingState::Failure);
    }

    #[test]
    fn connect() {
        let good_wire = &CONNECT[2..12];
        test_parsed_completely::<MqttConnect, Located<'_, MqttParsingError>>(
            good_wire,
            &MqttConnect::new(4, 0x02, 60),
        );
    }

    #[test]
    fn connect_unsupported_version() {
        let bad_wire = [0x00, 0x04, b'M', b'Q', b'T', b'T', 0x03, 0x02, 0x00, 0x3c];
        let bad = Located::new(
            Span::with_offset(6, &bad_wire[6..]),
            MqttParsingError::UnsupportedVersion(3),
        );
        test_parse_error::<MqttConnect, Located<'_, MqttParsingError>>(&bad_wire, &bad);
    }

    #[test]
    fn connect_wrong_protocol_name() {
        let bad_wire = [0x00, 0x04, b'M', b'Q', b'I', b's', 0x04, 0x02, 0x00, 0x3c];
        let bad = Located::new(Span::new(&bad_wire), MqttParsingError::InvalidProtocolName);
        test_parse_error::<MqttConnect, Located<'_, MqttParsingError>>(&bad_wire, &bad);
    }

    #[test]
    fn label() {
        assert!(mqtt_label_present(Span::new(&CONNECT)));
        assert!(!mqtt_label_present(Span::new(&CONNACK)));
        assert!(!mqtt_label_present(Span::new(&[0x10])));
        assert!(!mqtt_label_present(Span::new(b"GET / HTTP/1.1\r\n")));
    }

    #[test]
    fn connect_and_publish_in_one_segment() {
        let segment = combine(vec![&CONNECT, &publish(0x01, "a/b"), &publish(0x08, "c")]);
        let ctx = match plugin(1).on_init(&tcp(&segment)) {
            OnInitResult::ConstructedNeedsUpdate(ctx) => ctx,
            other => panic!("unexpected {other:?}"),
        };
        let mqtt = MqttContext::from_context(&ctx).unwrap();
        assert_eq!(mqtt.get(MqttField::MqttTypeCumulative), Some(FieldValue::U16(0x0a)));
        assert_eq!(mqtt.get(MqttField::MqttVersion), Some(FieldValue::U8(4)));
        assert_eq!(mqtt.get(MqttField::MqttConnectionFlags), Some(FieldValue::U8(0x02)));
        assert_eq!(mqtt.get(MqttField::MqttKeepAlive), Some(FieldValue::U16(60)));
        assert_eq!(mqtt.get(MqttField::MqttConnectionReturnCode), None);
        assert_eq!(mqtt.get(MqttField::MqttPublishFlags), Some(FieldValue::U8(0x09)));
        assert_eq!(mqtt.get(MqttField::MqttTopics), Some(FieldValue::Str("a/b#")));
    }

    #[test]
    fn session_and_disconnect() {
        let plugin = plugin(0);
        let mut ctx = match plugin.on_init(&tcp(&CONNECT)) {
            OnInitResult::ConstructedNeedsUpdate(ctx) => ctx,
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(
            plugin.on_update(&tcp(&CONNACK), &mut ctx),
            OnUpdateResult::NeedsUpdate
        );
        assert_eq!(plugin.on_update(&tcp(&[]), &mut ctx), OnUpdateResult::NeedsUpdate);
        assert_eq!(
            plugin.on_update(&tcp(&publish(0, "x")), &mut ctx),
            OnUpdateResult::NeedsUpdate
        );
        assert_eq!(
            plugin.on_update(&tcp(&DISCONNECT), &mut ctx),
            OnUpdateResult::FlushFlow
        );
        let mqtt = MqttContext::from_context(&ctx).unwrap();
        // CONNECT, CONNACK, PUBLISH, DISCONNECT and session present
        assert_eq!(mqtt.type_cumulative(), Some(0x400f));
        assert_eq!(mqtt.connection_return_code(), Some(0));
        assert_eq!(mqtt.topics(), None);
        assert_eq!(mqtt.get(MqttField::MqttTopics), None);
    }

    #[test]
    fn wildcard_topic_removes() {
        let plugin = plugin(4);
        let mut ctx = match plugin.on_init(&tcp(&CONNECT)) {
            OnInitResult::ConstructedNeedsUpdate(ctx) => ctx,
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(
            plugin.on_update(&tcp(&publish(0, "a/#")), &mut ctx),
            OnUpdateResult::Remove
        );
    }

    #[test]
    fn init_outcomes() {
        let plugin = plugin(0);
        assert_eq!(plugin.on_init(&tcp(&[])), OnInitResult::PendingConstruction);
        assert_eq!(plugin.on_init(&tcp(&CONNACK)), OnInitResult::Irrelevant);
        assert_eq!(
            plugin.on_init(&Packet::new(IPPROTO_UDP, &CONNECT)),
            OnInitResult::Irrelevant
        );
        let truncated = combine(vec![&CONNECT, &[0x30, 0x09, 0x00]]);
        assert_eq!(
            plugin.on_init(&tcp(&truncated)),
            OnInitResult::PendingConstruction
        );
        let closing = combine(vec![&CONNECT, &DISCONNECT]);
        assert!(matches!(
            plugin.on_init(&tcp(&closing)),
            OnInitResult::ConstructedFinal(_)
        ));
    }
}
