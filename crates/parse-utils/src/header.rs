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

//! `Key: value` header blocks terminated by an empty line, as used by HTTP,
//! RTSP, SIP and SMTP.

use crate::token::{LazyTokenSequence, Step, TokenRule};
use crate::Span;
use nom::Slice;

const CRLF: &[u8] = b"\r\n";
const DELIMITER: &[u8] = b":";

/// One header line. Neither view contains the `:` delimiter or the line
/// terminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderField<'a> {
    key: Span<'a>,
    value: Span<'a>,
}

impl<'a> HeaderField<'a> {
    pub const fn key(&self) -> Span<'a> {
        self.key
    }

    pub const fn value(&self) -> Span<'a> {
        self.value
    }

    /// ASCII case-insensitive key comparison.
    pub fn key_is(&self, name: &str) -> bool {
        self.key.eq_ignore_ascii_case(name.as_bytes())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderFieldRule;

impl<'a> TokenRule<'a> for HeaderFieldRule {
    type Token = HeaderField<'a>;

    fn step(&mut self, view: &mut Span<'a>) -> Step<Self::Token> {
        let Some(line_end) = view.find(CRLF) else {
            tracing::trace!(
                offset = view.location_offset(),
                "header block is not terminated"
            );
            return Step::Stop;
        };
        if line_end == 0 {
            *view = view.slice(CRLF.len()..);
            return Step::Finished;
        }
        let line = view.slice(..line_end);
        let delimiter = match line.find(DELIMITER) {
            Some(delimiter) if delimiter > 0 => delimiter,
            _ => {
                tracing::debug!(
                    offset = line.location_offset(),
                    "malformed header line, missing key"
                );
                return Step::Stop;
            }
        };
        // the value starts after ": "
        let value_start = (delimiter + 2).min(line.len());
        let field = HeaderField {
            key: line.slice(..delimiter),
            value: line.slice(value_start..),
        };
        *view = view.slice(line_end + CRLF.len()..);
        Step::Yield(field)
    }
}

pub type HeaderFieldReader<'a> = LazyTokenSequence<'a, HeaderFieldRule>;

/// Tokenize the header block at the start of `view`.
///
/// After a successful run [`LazyTokenSequence::remaining`] starts right after
/// the empty line, at the message body.
pub const fn header_fields(view: Span<'_>) -> HeaderFieldReader<'_> {
    LazyTokenSequence::new(view, HeaderFieldRule)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::ParsingState;

    fn collect(input: &[u8]) -> (Vec<(&[u8], &[u8])>, ParsingState) {
        let mut reader = header_fields(Span::new(input));
        let fields = reader
            .by_ref()
            .map(|field| (field.key().fragment(), field.value().fragment()))
            .collect();
        (fields, reader.state())
    }

    #[test]
    fn complete_block() {
        let (fields, state) = collect(b"A: 1\r\nB: 2\r\n\r\n");
        assert_eq!(fields, vec![(&b"A"[..], &b"1"[..]), (&b"B"[..], &b"2"[..])]);
        assert_eq!(state, ParsingState::Success);
    }

    #[test]
    fn missing_terminator_is_incomplete() {
        let (fields, state) = collect(b"A: 1\r\nB: 2\r\n");
        assert_eq!(fields, vec![(&b"A"[..], &b"1"[..]), (&b"B"[..], &b"2"[..])]);
        assert_eq!(state, ParsingState::Failure);
    }

    #[test]
    fn empty_key_aborts() {
        let (fields, state) = collect(b":1\r\n\r\n");
        assert!(fields.is_empty());
        assert_eq!(state, ParsingState::Failure);
    }

    #[test]
    fn line_without_delimiter_aborts() {
        let (fields, state) = collect(b"A: 1\r\nbogus\r\n\r\n");
        assert_eq!(fields, vec![(&b"A"[..], &b"1"[..])]);
        assert_eq!(state, ParsingState::Failure);
    }

    #[test]
    fn empty_block() {
        let (fields, state) = collect(b"\r\nbody");
        assert!(fields.is_empty());
        assert_eq!(state, ParsingState::Success);
    }

    #[test]
    fn value_is_clamped_to_the_line() {
        let (fields, _) = collect(b"Empty:\r\nX:y\r\n\r\n");
        assert_eq!(fields, vec![(&b"Empty"[..], &b""[..]), (&b"X"[..], &b""[..])]);
    }

    #[test]
    fn views_keep_their_location() {
        let input = b"Host: example.com\r\nAccept: */*\r\n\r\n<body>";
        let mut reader = header_fields(Span::new(input));
        let host = reader.next().unwrap();
        assert!(host.key_is("host"));
        assert_eq!(host.value().location_offset(), 6);
        assert_eq!(host.value().as_str(), Some("example.com"));
        let accept = reader.next().unwrap();
        assert_eq!(accept.key().location_offset(), 19);
        assert_eq!(reader.next(), None);
        assert_eq!(reader.state(), ParsingState::Success);
        assert_eq!(reader.remaining().fragment(), b"<body>");
    }
}
