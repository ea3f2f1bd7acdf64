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

//! HTTP/1.x request and response heads.
//!
//! A flow holds at most one request and one response. A second request or
//! response on the same flow flushes it and starts a new one.

use crate::{
    plugin::{BeforeUpdateResult, OnInitResult, OnUpdateResult, ProcessPlugin},
    FieldIndex, FieldValue, Getter, Packet, Protocol, ProtocolContext, ProtocolFields,
};
use flowprobe_parse_utils::{
    header::header_fields, ErrorKindSerdeDeref, FromNomErrorKind, Located, ReadablePdu, Span,
};
use nom::{
    bytes::complete::{tag, take_until},
    error::ErrorKind,
    IResult, Slice,
};
use serde::{Deserialize, Serialize};
use strum::EnumCount as _;
use strum_macros::{Display, EnumCount, EnumIter, IntoStaticStr};

pub const METHOD_CAPACITY: usize = 10;
pub const HOST_CAPACITY: usize = 64;
pub const URI_CAPACITY: usize = 128;
pub const USER_AGENT_CAPACITY: usize = 128;
pub const REFERER_CAPACITY: usize = 128;
pub const CONTENT_TYPE_CAPACITY: usize = 32;
pub const SERVER_CAPACITY: usize = 32;
pub const COOKIE_NAMES_CAPACITY: usize = 512;

const HTTP_VERSION_PREFIX: &[u8] = b"HTTP/";
const COOKIE_NAME_SEPARATOR: char = ';';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HttpParsingError {
    #[serde(with = "ErrorKindSerdeDeref")]
    NomError(ErrorKind),
    EmptyMethod,
}

impl std::fmt::Display for HttpParsingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NomError(kind) => write!(f, "{}", nom::Err::Error(kind)),
            Self::EmptyMethod => write!(f, "request line does not start with a method"),
        }
    }
}

impl std::error::Error for HttpParsingError {}

impl FromNomErrorKind for HttpParsingError {
    fn from_nom_error_kind(kind: ErrorKind) -> Self {
        Self::NomError(kind)
    }
}

/// `METHOD SP request-target SP HTTP-version`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpRequestLine<'a> {
    method: Span<'a>,
    uri: Span<'a>,
}

impl<'a> HttpRequestLine<'a> {
    pub const fn method(&self) -> Span<'a> {
        self.method
    }

    pub const fn uri(&self) -> Span<'a> {
        self.uri
    }
}

impl<'a> ReadablePdu<'a, Located<'a, HttpParsingError>> for HttpRequestLine<'a> {
    fn from_wire(buf: Span<'a>) -> IResult<Span<'a>, Self, Located<'a, HttpParsingError>> {
        let input = buf;
        let (buf, method) = take_until(" ")(buf)?;
        if method.is_empty() {
            return Err(nom::Err::Error(Located::new(
                input,
                HttpParsingError::EmptyMethod,
            )));
        }
        let (buf, _) = tag(" ")(buf)?;
        let (buf, uri) = take_until(" ")(buf)?;
        let (buf, _) = tag(" ")(buf)?;
        let (buf, _) = tag(HTTP_VERSION_PREFIX)(buf)?;
        Ok((buf, Self { method, uri }))
    }
}

/// `HTTP-version SP status-code SP reason-phrase`, only the status code is
/// kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpStatusLine {
    status_code: u16,
}

impl HttpStatusLine {
    pub const fn new(status_code: u16) -> Self {
        Self { status_code }
    }

    pub const fn status_code(&self) -> u16 {
        self.status_code
    }
}

impl<'a> ReadablePdu<'a, Located<'a, HttpParsingError>> for HttpStatusLine {
    fn from_wire(buf: Span<'a>) -> IResult<Span<'a>, Self, Located<'a, HttpParsingError>> {
        let (buf, _) = tag(HTTP_VERSION_PREFIX)(buf)?;
        let (buf, _) = take_until(" ")(buf)?;
        let (buf, _) = tag(" ")(buf)?;
        let (buf, status_code) = nom::character::complete::u16(buf)?;
        Ok((buf, Self { status_code }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpStartLine<'a> {
    Request(HttpRequestLine<'a>),
    Response(HttpStatusLine),
}

/// Start line of a message and the header block that follows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpMessage<'a> {
    start_line: HttpStartLine<'a>,
    headers: Span<'a>,
}

impl<'a> HttpMessage<'a> {
    /// Returns `None` when the payload does not start with a complete HTTP
    /// start line.
    pub fn parse(payload: Span<'a>) -> Option<Self> {
        let line_end = payload.find(b"\n")?;
        let line = payload.slice(..line_end);
        let headers = payload.slice(line_end + 1..);
        let start_line = if line.starts_with(HTTP_VERSION_PREFIX) {
            HttpStatusLine::from_wire(line).map(|(_, line)| HttpStartLine::Response(line))
        } else {
            HttpRequestLine::from_wire(line).map(|(_, line)| HttpStartLine::Request(line))
        };
        match start_line {
            Ok(start_line) => Some(Self {
                start_line,
                headers,
            }),
            Err(err) => {
                tracing::trace!(error = ?err, "payload is not an HTTP message");
                None
            }
        }
    }

    pub const fn start_line(&self) -> HttpStartLine<'a> {
        self.start_line
    }

    pub const fn headers(&self) -> Span<'a> {
        self.headers
    }

    pub const fn is_request(&self) -> bool {
        matches!(self.start_line, HttpStartLine::Request(_))
    }
}

/// Copy at most `capacity` bytes of `value`, cut back to a char boundary.
fn truncated(value: &[u8], capacity: usize) -> String {
    let value = String::from_utf8_lossy(value);
    let mut end = value.len().min(capacity);
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    value[..end].to_owned()
}

/// Name of the cookie set by a `Set-Cookie` value, without its attributes.
fn cookie_name(value: &[u8]) -> &[u8] {
    let end = value
        .iter()
        .position(|byte| matches!(byte, b'=' | b';'))
        .unwrap_or(value.len());
    value[..end].trim_ascii()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HttpContext {
    method: Option<String>,
    host: Option<String>,
    uri: Option<String>,
    user_agent: Option<String>,
    referer: Option<String>,
    status_code: Option<u16>,
    content_type: Option<String>,
    server: Option<String>,
    cookie_names: Option<String>,
    #[serde(skip)]
    request_parsed: bool,
    #[serde(skip)]
    response_parsed: bool,
}

impl HttpContext {
    pub fn method(&self) -> Option<&str> {
        self.method.as_deref()
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }

    pub fn referer(&self) -> Option<&str> {
        self.referer.as_deref()
    }

    pub const fn status_code(&self) -> Option<u16> {
        self.status_code
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn server(&self) -> Option<&str> {
        self.server.as_deref()
    }

    /// Names of the cookies set by the response, each followed by `;`.
    pub fn cookie_names(&self) -> Option<&str> {
        self.cookie_names.as_deref()
    }

    pub const fn request_parsed(&self) -> bool {
        self.request_parsed
    }

    pub const fn response_parsed(&self) -> bool {
        self.response_parsed
    }

    /// True when `message` would overwrite what the flow already recorded.
    fn collides_with(&self, message: &HttpMessage<'_>) -> bool {
        match message.start_line() {
            HttpStartLine::Request(_) => self.request_parsed,
            HttpStartLine::Response(_) => self.response_parsed,
        }
    }

    fn apply(&mut self, message: &HttpMessage<'_>) {
        match message.start_line() {
            HttpStartLine::Request(line) => {
                self.method = Some(truncated(&line.method(), METHOD_CAPACITY));
                self.uri = Some(truncated(&line.uri(), URI_CAPACITY));
                for field in header_fields(message.headers()) {
                    let value = field.value();
                    if field.key_is("Host") {
                        self.host = Some(truncated(&value, HOST_CAPACITY));
                    } else if field.key_is("User-Agent") {
                        self.user_agent = Some(truncated(&value, USER_AGENT_CAPACITY));
                    } else if field.key_is("Referer") {
                        self.referer = Some(truncated(&value, REFERER_CAPACITY));
                    }
                }
                self.request_parsed = true;
            }
            HttpStartLine::Response(line) => {
                self.status_code = Some(line.status_code());
                for field in header_fields(message.headers()) {
                    let value = field.value();
                    if field.key_is("Content-Type") {
                        self.content_type = Some(truncated(&value, CONTENT_TYPE_CAPACITY));
                    } else if field.key_is("Server") {
                        self.server = Some(truncated(&value, SERVER_CAPACITY));
                    } else if field.key_is("Set-Cookie") {
                        self.add_cookie_name(cookie_name(&value));
                    }
                }
                self.response_parsed = true;
            }
        }
    }

    fn add_cookie_name(&mut self, name: &[u8]) {
        if name.is_empty() {
            return;
        }
        let names = self.cookie_names.get_or_insert_with(String::new);
        let remaining = COOKIE_NAMES_CAPACITY.saturating_sub(names.len());
        if name.len() + 1 > remaining {
            tracing::trace!("cookie names are full, dropping the rest");
            return;
        }
        names.push_str(&String::from_utf8_lossy(name));
        names.push(COOKIE_NAME_SEPARATOR);
    }

    fn is_complete(&self) -> bool {
        self.request_parsed && self.response_parsed
    }
}

impl From<HttpContext> for ProtocolContext {
    fn from(value: HttpContext) -> Self {
        ProtocolContext::Http(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumCount, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum HttpField {
    HttpRequestMethod,
    HttpRequestHost,
    HttpRequestUrl,
    HttpRequestAgent,
    HttpRequestReferer,
    HttpResponseStatusCode,
    HttpResponseContentType,
    HttpResponseServer,
    HttpResponseSetCookieNames,
}

impl FieldIndex for HttpField {
    fn index(self) -> usize {
        self as usize
    }
}

fn method(context: &HttpContext) -> Option<FieldValue<'_>> {
    context.method().map(FieldValue::Str)
}

fn host(context: &HttpContext) -> Option<FieldValue<'_>> {
    context.host().map(FieldValue::Str)
}

fn uri(context: &HttpContext) -> Option<FieldValue<'_>> {
    context.uri().map(FieldValue::Str)
}

fn user_agent(context: &HttpContext) -> Option<FieldValue<'_>> {
    context.user_agent().map(FieldValue::Str)
}

fn referer(context: &HttpContext) -> Option<FieldValue<'_>> {
    context.referer().map(FieldValue::Str)
}

fn status_code(context: &HttpContext) -> Option<FieldValue<'_>> {
    context.status_code.map(FieldValue::U16)
}

fn content_type(context: &HttpContext) -> Option<FieldValue<'_>> {
    context.content_type().map(FieldValue::Str)
}

fn server(context: &HttpContext) -> Option<FieldValue<'_>> {
    context.server().map(FieldValue::Str)
}

fn cookie_names(context: &HttpContext) -> Option<FieldValue<'_>> {
    context.cookie_names().map(FieldValue::Str)
}

const GETTERS: [Getter<HttpContext>; HttpField::COUNT] = [
    method,
    host,
    uri,
    user_agent,
    referer,
    status_code,
    content_type,
    server,
    cookie_names,
];

impl ProtocolFields for HttpContext {
    const PROTOCOL: Protocol = Protocol::Http;
    type Field = HttpField;
    const GETTERS: &'static [Getter<Self>] = &GETTERS;

    fn from_context(context: &ProtocolContext) -> Option<&Self> {
        match context {
            ProtocolContext::Http(value) => Some(value),
            _ => None,
        }
    }

    fn from_context_mut(context: &mut ProtocolContext) -> Option<&mut Self> {
        match context {
            ProtocolContext::Http(value) => Some(value),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HttpPlugin;

impl ProcessPlugin for HttpPlugin {
    fn protocol(&self) -> Protocol {
        Protocol::Http
    }

    fn on_init(&self, packet: &Packet<'_>) -> OnInitResult {
        if !packet.is_tcp() {
            return OnInitResult::Irrelevant;
        }
        match HttpMessage::parse(packet.payload()) {
            Some(message) if message.is_request() => {
                let mut context = HttpContext::default();
                context.apply(&message);
                OnInitResult::ConstructedNeedsUpdate(context.into())
            }
            _ => OnInitResult::PendingConstruction,
        }
    }

    fn before_update(&self, packet: &Packet<'_>, context: &ProtocolContext) -> BeforeUpdateResult {
        let Some(http) = HttpContext::from_context(context) else {
            return BeforeUpdateResult::NoAction;
        };
        match HttpMessage::parse(packet.payload()) {
            Some(message) if http.collides_with(&message) => {
                BeforeUpdateResult::FlushFlowAndReinsert
            }
            _ => BeforeUpdateResult::NoAction,
        }
    }

    fn on_update(&self, packet: &Packet<'_>, context: &mut ProtocolContext) -> OnUpdateResult {
        let Some(http) = HttpContext::from_context_mut(context) else {
            return OnUpdateResult::Remove;
        };
        if let Some(message) = HttpMessage::parse(packet.payload()) {
            http.apply(&message);
        }
        if http.is_complete() {
            OnUpdateResult::Final
        } else {
            OnUpdateResult::NeedsUpdate
        }
    }
}
