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

//! QUIC long header inspection.
//!
//! Only the unprotected parts of the long header are read (RFC 9000 17.2).
//! Packet payloads are skipped using their Length field so that coalesced
//! packets in one UDP datagram are all seen. Short header packets cannot be
//! delimited without the connection state and end a datagram.

use crate::{
    packet::IPPROTO_UDP,
    plugin::{OnInitResult, OnUpdateResult, ProcessPlugin},
    Direction, FieldIndex, FieldValue, Getter, Packet, Protocol, ProtocolContext, ProtocolFields,
};
use flowprobe_parse_utils::{
    token::{LazyTokenSequence, ParsingState, Step, TokenRule},
    varint::quic_variable_length,
    ErrorKindSerdeDeref, FromNomErrorKind, Located, ReadablePdu, Span,
};
use nom::{
    bytes::complete::take,
    error::ErrorKind,
    number::complete::{be_u32, be_u8},
    IResult, Slice,
};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use strum::EnumCount as _;
use strum_macros::{Display, EnumCount, EnumIter, FromRepr, IntoStaticStr};

pub const MAX_CONNECTION_ID_LENGTH: usize = 20;

/// Number of datagrams whose packet types are recorded per flow.
pub const MAX_QUIC_PACKETS: usize = 30;

/// First byte, version and both connection id lengths.
const MIN_PACKET_SIZE: usize = 8;

pub const QUIC_V1: u32 = 0x0000_0001;
pub const QUIC_V2: u32 = 0x6b33_43cf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuicParsingError {
    #[serde(with = "ErrorKindSerdeDeref")]
    NomError(ErrorKind),
    ShortHeader,
    FixedBitNotSet,
    ConnectionIdTooLong(u8),
    LengthOverflow(u64),
}

impl std::fmt::Display for QuicParsingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NomError(kind) => write!(f, "{}", nom::Err::Error(kind)),
            Self::ShortHeader => write!(f, "expected a long header packet"),
            Self::FixedBitNotSet => write!(f, "QUIC fixed bit is not set"),
            Self::ConnectionIdTooLong(len) => write!(
                f,
                "connection id length {len} exceeds {MAX_CONNECTION_ID_LENGTH}"
            ),
            Self::LengthOverflow(len) => write!(f, "length {len} does not fit the platform"),
        }
    }
}

impl std::error::Error for QuicParsingError {}

impl FromNomErrorKind for QuicParsingError {
    fn from_nom_error_kind(kind: ErrorKind) -> Self {
        Self::NomError(kind)
    }
}

/// ```text
/// +-+-+-+-+-+-+-+-+
/// |1|1|T T|X X X X|
/// +-+-+-+-+-+-+-+-+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuicFirstByte(u8);

impl QuicFirstByte {
    pub const fn new(value: u8) -> Self {
        Self(value)
    }

    pub const fn value(&self) -> u8 {
        self.0
    }

    pub const fn is_long_header(&self) -> bool {
        self.0 & 0x80 != 0
    }

    pub const fn fixed_bit(&self) -> bool {
        self.0 & 0x40 != 0
    }

    pub const fn long_packet_type_bits(&self) -> u8 {
        (self.0 >> 4) & 0x03
    }

    /// Reserved and packet number length bits, header protected.
    pub const fn type_specific_bits(&self) -> u8 {
        self.0 & 0x0f
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, FromRepr, Serialize, Deserialize)]
#[repr(u8)]
pub enum QuicPacketType {
    VersionNegotiation = 0x01,
    Initial = 0x02,
    ZeroRtt = 0x04,
    Handshake = 0x08,
    Retry = 0x10,
}

impl QuicPacketType {
    /// Long packet type as encoded by `version`. QUIC v2 rotates the code
    /// points (RFC 9369 3.2).
    pub const fn from_long_header(bits: u8, version: u32) -> Self {
        match (version == QUIC_V2, bits & 0x03) {
            (false, 0b00) | (true, 0b01) => Self::Initial,
            (false, 0b01) | (true, 0b10) => Self::ZeroRtt,
            (false, 0b10) | (true, 0b11) => Self::Handshake,
            _ => Self::Retry,
        }
    }

    pub const fn bit(self) -> u8 {
        self as u8
    }
}

/// Set of the packet types seen in one datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct QuicPacketTypes(u8);

impl QuicPacketTypes {
    pub const fn bits(&self) -> u8 {
        self.0
    }

    pub fn insert(&mut self, packet_type: QuicPacketType) {
        self.0 |= packet_type.bit();
    }

    pub const fn contains(&self, packet_type: QuicPacketType) -> bool {
        self.0 & packet_type.bit() != 0
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ConnectionId {
    length: u8,
    bytes: [u8; MAX_CONNECTION_ID_LENGTH],
}

impl ConnectionId {
    /// `None` if `value` is longer than [`MAX_CONNECTION_ID_LENGTH`].
    pub fn new(value: &[u8]) -> Option<Self> {
        if value.len() > MAX_CONNECTION_ID_LENGTH {
            return None;
        }
        let mut bytes = [0u8; MAX_CONNECTION_ID_LENGTH];
        bytes[..value.len()].copy_from_slice(value);
        Some(Self {
            length: value.len() as u8,
            bytes,
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..usize::from(self.length)]
    }

    pub const fn len(&self) -> usize {
        self.length as usize
    }

    pub const fn is_empty(&self) -> bool {
        self.length == 0
    }
}

impl std::fmt::Debug for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ConnectionId(")?;
        for byte in self.as_bytes() {
            write!(f, "{byte:02x}")?;
        }
        write!(f, ")")
    }
}

impl Serialize for ConnectionId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(self.as_bytes())
    }
}

impl<'a> ReadablePdu<'a, Located<'a, QuicParsingError>> for ConnectionId {
    fn from_wire(buf: Span<'a>) -> IResult<Span<'a>, Self, Located<'a, QuicParsingError>> {
        let input = buf;
        let (buf, length) = be_u8(buf)?;
        if usize::from(length) > MAX_CONNECTION_ID_LENGTH {
            return Err(nom::Err::Error(Located::new(
                input,
                QuicParsingError::ConnectionIdTooLong(length),
            )));
        }
        let (buf, value) = take(length)(buf)?;
        match Self::new(value.fragment()) {
            Some(id) => Ok((buf, id)),
            None => Err(nom::Err::Error(Located::new(
                input,
                QuicParsingError::ConnectionIdTooLong(length),
            ))),
        }
    }
}

fn take_u64<'a>(
    buf: Span<'a>,
    count: u64,
) -> IResult<Span<'a>, Span<'a>, Located<'a, QuicParsingError>> {
    match usize::try_from(count) {
        Ok(count) => take(count)(buf),
        Err(_) => Err(nom::Err::Error(Located::new(
            buf,
            QuicParsingError::LengthOverflow(count),
        ))),
    }
}

/// Unprotected fields of a long header packet.
///
/// ```text
/// Long Header Packet {
///   Header Form (1) = 1,
///   Fixed Bit (1) = 1,
///   Long Packet Type (2),
///   Type-Specific Bits (4),
///   Version (32),
///   Destination Connection ID Length (8),
///   Destination Connection ID (0..160),
///   Source Connection ID Length (8),
///   Source Connection ID (0..160),
///   Type-Specific Payload (..),
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuicLongHeader {
    first_byte: QuicFirstByte,
    version: u32,
    packet_type: QuicPacketType,
    dcid: ConnectionId,
    scid: ConnectionId,
    token_length: Option<u64>,
    payload_length: Option<u64>,
}

impl QuicLongHeader {
    pub const fn first_byte(&self) -> QuicFirstByte {
        self.first_byte
    }

    pub const fn version(&self) -> u32 {
        self.version
    }

    pub const fn packet_type(&self) -> QuicPacketType {
        self.packet_type
    }

    pub const fn dcid(&self) -> &ConnectionId {
        &self.dcid
    }

    pub const fn scid(&self) -> &ConnectionId {
        &self.scid
    }

    /// Present on Initial packets only.
    pub const fn token_length(&self) -> Option<u64> {
        self.token_length
    }

    /// Length of the packet number and protected payload that follow the
    /// header. Version Negotiation and Retry packets have none.
    pub const fn payload_length(&self) -> Option<u64> {
        self.payload_length
    }
}

impl<'a> ReadablePdu<'a, Located<'a, QuicParsingError>> for QuicLongHeader {
    fn from_wire(buf: Span<'a>) -> IResult<Span<'a>, Self, Located<'a, QuicParsingError>> {
        let input = buf;
        let (buf, first_byte) = be_u8(buf)?;
        let first_byte = QuicFirstByte::new(first_byte);
        if !first_byte.is_long_header() {
            return Err(nom::Err::Error(Located::new(
                input,
                QuicParsingError::ShortHeader,
            )));
        }
        let (buf, version) = be_u32(buf)?;
        // The fixed bit is unused in Version Negotiation packets
        if version != 0 && !first_byte.fixed_bit() {
            return Err(nom::Err::Error(Located::new(
                input,
                QuicParsingError::FixedBitNotSet,
            )));
        }
        let (buf, dcid) = ConnectionId::from_wire(buf)?;
        let (buf, scid) = ConnectionId::from_wire(buf)?;
        let packet_type = if version == 0 {
            QuicPacketType::VersionNegotiation
        } else {
            QuicPacketType::from_long_header(first_byte.long_packet_type_bits(), version)
        };
        let (buf, token_length) = if packet_type == QuicPacketType::Initial {
            let (buf, token_length) = quic_variable_length(buf)?;
            let (buf, _token) = take_u64(buf, token_length)?;
            (buf, Some(token_length))
        } else {
            (buf, None)
        };
        let (buf, payload_length) = match packet_type {
            QuicPacketType::Initial | QuicPacketType::ZeroRtt | QuicPacketType::Handshake => {
                let (buf, length) = quic_variable_length(buf)?;
                (buf, Some(length))
            }
            QuicPacketType::VersionNegotiation | QuicPacketType::Retry => (buf, None),
        };
        Ok((
            buf,
            Self {
                first_byte,
                version,
                packet_type,
                dcid,
                scid,
                token_length,
                payload_length,
            },
        ))
    }
}

/// Splits a UDP payload into its coalesced long header packets.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuicPacketRule;

impl<'a> TokenRule<'a> for QuicPacketRule {
    type Token = QuicLongHeader;

    fn step(&mut self, view: &mut Span<'a>) -> Step<Self::Token> {
        if view.len() < MIN_PACKET_SIZE || view.byte(0).is_some_and(|byte| byte & 0x80 == 0) {
            return Step::Finished;
        }
        match QuicLongHeader::from_wire(*view) {
            Ok((rest, header)) => {
                let skip = match header.payload_length {
                    Some(length) => usize::try_from(length)
                        .map_or(rest.len(), |length| length.min(rest.len())),
                    None => rest.len(),
                };
                *view = rest.slice(skip..);
                Step::Yield(header)
            }
            Err(err) => {
                tracing::debug!(error = ?err, "malformed QUIC long header");
                Step::Stop
            }
        }
    }
}

pub type QuicPacketReader<'a> = LazyTokenSequence<'a, QuicPacketRule>;

/// Long header packets of one UDP datagram.
#[derive(Debug, Clone, Default)]
pub struct QuicDatagram {
    packets: SmallVec<[QuicLongHeader; 4]>,
    types: QuicPacketTypes,
    zero_rtt_packets: u8,
}

impl QuicDatagram {
    /// `None` when a long header is malformed. A datagram carrying only a
    /// short header packet yields an empty datagram.
    pub fn parse(payload: Span<'_>) -> Option<Self> {
        let mut reader = QuicPacketReader::new(payload, QuicPacketRule);
        let mut datagram = Self::default();
        for header in reader.by_ref() {
            datagram.types.insert(header.packet_type);
            if header.packet_type == QuicPacketType::ZeroRtt {
                datagram.zero_rtt_packets = datagram.zero_rtt_packets.saturating_add(1);
            }
            datagram.packets.push(header);
        }
        match reader.state() {
            ParsingState::Success => Some(datagram),
            ParsingState::Failure => None,
        }
    }

    pub fn packets(&self) -> &[QuicLongHeader] {
        &self.packets
    }

    pub const fn types(&self) -> QuicPacketTypes {
        self.types
    }

    pub const fn zero_rtt_packets(&self) -> u8 {
        self.zero_rtt_packets
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    fn first_of(&self, packet_type: QuicPacketType) -> Option<&QuicLongHeader> {
        self.packets
            .iter()
            .find(|header| header.packet_type == packet_type)
    }

    /// The packet that drives the context update.
    fn most_significant(&self) -> Option<&QuicLongHeader> {
        [
            QuicPacketType::VersionNegotiation,
            QuicPacketType::Initial,
            QuicPacketType::Retry,
            QuicPacketType::ZeroRtt,
            QuicPacketType::Handshake,
        ]
        .into_iter()
        .find_map(|packet_type| self.first_of(packet_type))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QuicContext {
    version: Option<u32>,
    client_version: Option<u32>,
    token_length: Option<u64>,
    occid: Option<ConnectionId>,
    oscid: Option<ConnectionId>,
    scid: Option<ConnectionId>,
    retry_scid: Option<ConnectionId>,
    multiplexed: u8,
    zero_rtt: u8,
    server_port: Option<u16>,
    packet_types: SmallVec<[u8; MAX_QUIC_PACKETS]>,
    #[serde(skip)]
    retry_packets: u8,
}

fn set_once(slot: &mut Option<ConnectionId>, value: &ConnectionId) {
    if slot.is_none() && !value.is_empty() {
        *slot = Some(*value);
    }
}

impl QuicContext {
    pub const fn version(&self) -> Option<u32> {
        self.version
    }

    pub const fn client_version(&self) -> Option<u32> {
        self.client_version
    }

    pub const fn token_length(&self) -> Option<u64> {
        self.token_length
    }

    /// Source connection id first chosen by the client.
    pub const fn occid(&self) -> Option<&ConnectionId> {
        self.occid.as_ref()
    }

    /// Destination connection id of the first client Initial.
    pub const fn oscid(&self) -> Option<&ConnectionId> {
        self.oscid.as_ref()
    }

    /// Source connection id chosen by the server.
    pub const fn scid(&self) -> Option<&ConnectionId> {
        self.scid.as_ref()
    }

    pub const fn retry_scid(&self) -> Option<&ConnectionId> {
        self.retry_scid.as_ref()
    }

    pub const fn multiplexed(&self) -> u8 {
        self.multiplexed
    }

    pub const fn zero_rtt(&self) -> u8 {
        self.zero_rtt
    }

    pub const fn server_port(&self) -> Option<u16> {
        self.server_port
    }

    pub fn packet_types(&self) -> &[u8] {
        &self.packet_types
    }

    fn update(&mut self, datagram: &QuicDatagram, packet: &Packet<'_>) -> OnUpdateResult {
        if self.packet_types.len() < MAX_QUIC_PACKETS {
            self.packet_types.push(datagram.types.bits());
        }
        if let Some(zero_rtt) = datagram.first_of(QuicPacketType::ZeroRtt) {
            self.version = Some(zero_rtt.version);
            self.zero_rtt = self.zero_rtt.saturating_add(datagram.zero_rtt_packets);
        }
        let Some(header) = datagram.most_significant() else {
            return OnUpdateResult::NeedsUpdate;
        };
        let direction = match header.packet_type {
            QuicPacketType::VersionNegotiation | QuicPacketType::Retry => {
                Direction::ServerToClient
            }
            QuicPacketType::ZeroRtt => Direction::ClientToServer,
            QuicPacketType::Initial | QuicPacketType::Handshake => packet.direction(),
        };
        match header.packet_type {
            QuicPacketType::VersionNegotiation => {
                self.set_connection_ids(direction, header);
                return OnUpdateResult::FlushFlow;
            }
            QuicPacketType::Initial => self.process_initial(direction, header, packet),
            QuicPacketType::Handshake => self.set_connection_ids(direction, header),
            QuicPacketType::Retry => self.process_retry(header),
            QuicPacketType::ZeroRtt => set_once(&mut self.occid, &header.scid),
        }
        OnUpdateResult::NeedsUpdate
    }

    fn set_connection_ids(&mut self, direction: Direction, header: &QuicLongHeader) {
        match direction {
            Direction::ClientToServer => {
                set_once(&mut self.oscid, &header.dcid);
                set_once(&mut self.occid, &header.scid);
            }
            Direction::ServerToClient => {
                set_once(&mut self.scid, &header.scid);
                set_once(&mut self.occid, &header.dcid);
            }
        }
    }

    fn process_initial(
        &mut self,
        direction: Direction,
        header: &QuicLongHeader,
        packet: &Packet<'_>,
    ) {
        if direction == Direction::ServerToClient {
            self.set_connection_ids(direction, header);
            self.version = Some(header.version);
            return;
        }
        let after_retry = header.token_length.is_some_and(|length| length > 0)
            && self.retry_scid.as_ref() == Some(&header.dcid);
        let new_connection = self.client_version.is_some()
            && !after_retry
            && self.oscid.as_ref() != Some(&header.dcid);
        if new_connection {
            self.multiplexed = self.multiplexed.saturating_add(1);
            return;
        }
        self.set_connection_ids(direction, header);
        if let Some(token_length) = header.token_length {
            self.token_length = Some(token_length);
        }
        if after_retry {
            return;
        }
        self.client_version.get_or_insert(header.version);
        self.server_port.get_or_insert(packet.server_port());
        self.version = Some(header.version);
    }

    fn process_retry(&mut self, header: &QuicLongHeader) {
        self.retry_packets = self.retry_packets.saturating_add(1);
        // A client processes at most one Retry per connection attempt
        if self.retry_packets != 1 {
            return;
        }
        self.retry_scid = (!header.scid.is_empty()).then_some(header.scid);
        set_once(&mut self.occid, &header.dcid);
    }
}

impl From<QuicContext> for ProtocolContext {
    fn from(value: QuicContext) -> Self {
        ProtocolContext::Quic(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumCount, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum QuicField {
    QuicVersion,
    QuicClientVersion,
    QuicTokenLength,
    QuicOccid,
    QuicOscid,
    QuicScid,
    QuicRetryScid,
    QuicMultiplexed,
    QuicZeroRtt,
    QuicServerPort,
    QuicPackets,
}

impl FieldIndex for QuicField {
    fn index(self) -> usize {
        self as usize
    }
}

fn connection_id(value: Option<&ConnectionId>) -> Option<FieldValue<'_>> {
    value.map(|id| FieldValue::Bytes(id.as_bytes()))
}

fn version(context: &QuicContext) -> Option<FieldValue<'_>> {
    context.version.map(FieldValue::U32)
}

fn client_version(context: &QuicContext) -> Option<FieldValue<'_>> {
    context.client_version.map(FieldValue::U32)
}

fn token_length(context: &QuicContext) -> Option<FieldValue<'_>> {
    context.token_length.map(FieldValue::U64)
}

fn occid(context: &QuicContext) -> Option<FieldValue<'_>> {
    connection_id(context.occid())
}

fn oscid(context: &QuicContext) -> Option<FieldValue<'_>> {
    connection_id(context.oscid())
}

fn scid(context: &QuicContext) -> Option<FieldValue<'_>> {
    connection_id(context.scid())
}

fn retry_scid(context: &QuicContext) -> Option<FieldValue<'_>> {
    connection_id(context.retry_scid())
}

fn multiplexed(context: &QuicContext) -> Option<FieldValue<'_>> {
    Some(FieldValue::U8(context.multiplexed))
}

fn zero_rtt(context: &QuicContext) -> Option<FieldValue<'_>> {
    Some(FieldValue::U8(context.zero_rtt))
}

fn server_port(context: &QuicContext) -> Option<FieldValue<'_>> {
    context.server_port.map(FieldValue::U16)
}

fn packets(context: &QuicContext) -> Option<FieldValue<'_>> {
    Some(FieldValue::U8List(&context.packet_types))
}

const GETTERS: [Getter<QuicContext>; QuicField::COUNT] = [
    version,
    client_version,
    token_length,
    occid,
    oscid,
    scid,
    retry_scid,
    multiplexed,
    zero_rtt,
    server_port,
    packets,
];

impl ProtocolFields for QuicContext {
    const PROTOCOL: Protocol = Protocol::Quic;
    type Field = QuicField;
    const GETTERS: &'static [Getter<Self>] = &GETTERS;

    fn from_context(context: &ProtocolContext) -> Option<&Self> {
        match context {
            ProtocolContext::Quic(value) => Some(value),
            _ => None,
        }
    }

    fn from_context_mut(context: &mut ProtocolContext) -> Option<&mut Self> {
        match context {
            ProtocolContext::Quic(value) => Some(value),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct QuicPlugin;

impl ProcessPlugin for QuicPlugin {
    fn protocol(&self) -> Protocol {
        Protocol::Quic
    }

    fn on_init(&self, packet: &Packet<'_>) -> OnInitResult {
        if packet.ip_protocol() != IPPROTO_UDP {
            return OnInitResult::Irrelevant;
        }
        let datagram = match QuicDatagram::parse(packet.payload()) {
            Some(datagram) if !datagram.is_empty() => datagram,
            _ => return OnInitResult::Irrelevant,
        };
        let mut context = QuicContext::default();
        match context.update(&datagram, packet) {
            OnUpdateResult::NeedsUpdate => OnInitResult::ConstructedNeedsUpdate(context.into()),
            _ => OnInitResult::ConstructedFinal(context.into()),
        }
    }

    fn on_update(&self, packet: &Packet<'_>, context: &mut ProtocolContext) -> OnUpdateResult {
        let Some(context) = QuicContext::from_context_mut(context) else {
            return OnUpdateResult::Remove;
        };
        match QuicDatagram::parse(packet.payload()) {
            Some(datagram) => context.update(&datagram, packet),
            None => OnUpdateResult::Remove,
        }
    }
}
