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

//! Zero-copy primitives shared by every protocol decoder: located parsing
//! errors, self-delimiting integers, and lazy token sequences.

pub mod header;
pub mod token;
pub mod varint;

#[cfg(feature = "test-helpers")]
pub mod test_helpers;

pub use flowprobe_locate::PayloadView;
use nom::error::{ErrorKind, FromExternalError, ParseError};
use nom::IResult;
use std::fmt::Debug;

pub type Span<'a> = PayloadView<'a>;

/// Generic trait for Readable Protocol Data Unit that doesn't need any external
/// input while parsing the packet.
pub trait ReadablePdu<'a, Error: Debug> {
    fn from_wire(buf: Span<'a>) -> IResult<Span<'a>, Self, Error>
    where
        Self: Sized;
}

/// Located Parsing error is the error raised by parsing a given buffer and a
/// reference to the location where it occurred. The offset of the buffer in the
/// [`Span`] should refer (as much as possible) to the first byte where the
/// error started
pub trait LocatedParsingError {
    type Span;
    type Error;

    fn span(&self) -> &Self::Span;
    fn error(&self) -> &Self::Error;
}

/// Error enums that can absorb a plain `nom` failure.
pub trait FromNomErrorKind {
    fn from_nom_error_kind(kind: ErrorKind) -> Self;
}

/// A protocol specific parsing error together with the [`Span`] where it
/// happened.
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Located<'a, E> {
    span: Span<'a>,
    error: E,
}

impl<'a, E> Located<'a, E> {
    pub const fn new(span: Span<'a>, error: E) -> Self {
        Self { span, error }
    }
}

impl<'a, E> LocatedParsingError for Located<'a, E> {
    type Span = Span<'a>;
    type Error = E;

    fn span(&self) -> &Self::Span {
        &self.span
    }

    fn error(&self) -> &Self::Error {
        &self.error
    }
}

impl<'a, E: FromNomErrorKind> ParseError<Span<'a>> for Located<'a, E> {
    fn from_error_kind(input: Span<'a>, kind: ErrorKind) -> Self {
        Located::new(input, E::from_nom_error_kind(kind))
    }

    fn append(_input: Span<'a>, _kind: ErrorKind, other: Self) -> Self {
        other
    }
}

impl<'a, E> FromExternalError<Span<'a>, E> for Located<'a, E> {
    fn from_external_error(input: Span<'a>, _kind: ErrorKind, error: E) -> Self {
        Located::new(input, error)
    }
}

impl<E: std::fmt::Display> std::fmt::Display for Located<'_, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at offset {}", self.error, self.span.location_offset())
    }
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
#[serde(remote = "nom::error::ErrorKind")]
pub enum ErrorKindSerdeDeref {
    Tag,
    MapRes,
    MapOpt,
    Alt,
    IsNot,
    IsA,
    SeparatedList,
    SeparatedNonEmptyList,
    Many0,
    Many1,
    ManyTill,
    Count,
    TakeUntil,
    LengthValue,
    TagClosure,
    Alpha,
    Digit,
    HexDigit,
    OctDigit,
    AlphaNumeric,
    Space,
    MultiSpace,
    LengthValueFn,
    Eof,
    Switch,
    TagBits,
    OneOf,
    NoneOf,
    Char,
    CrLf,
    RegexpMatch,
    RegexpMatches,
    RegexpFind,
    RegexpCapture,
    RegexpCaptures,
    TakeWhile1,
    Complete,
    Fix,
    Escaped,
    EscapedTransform,
    NonEmpty,
    ManyMN,
    Not,
    Permutation,
    Verify,
    TakeTill1,
    TakeWhileMN,
    TooLarge,
    Many0Count,
    Many1Count,
    Float,
    Satisfy,
    Fail,
}

#[cfg(test)]
mod tests {
    use super::*;
    use nom::number::complete::be_u16;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum TestParsingError {
        NomError(ErrorKind),
        Zero,
    }

    impl FromNomErrorKind for TestParsingError {
        fn from_nom_error_kind(kind: ErrorKind) -> Self {
            Self::NomError(kind)
        }
    }

    #[derive(Debug, PartialEq)]
    struct NonZero(u16);

    impl<'a> ReadablePdu<'a, Located<'a, TestParsingError>> for NonZero {
        fn from_wire(
            buf: Span<'a>,
        ) -> IResult<Span<'a>, Self, Located<'a, TestParsingError>> {
            let input = buf;
            let (buf, value) = be_u16(buf)?;
            if value == 0 {
                return Err(nom::Err::Error(Located::new(input, TestParsingError::Zero)));
            }
            Ok((buf, NonZero(value)))
        }
    }

    #[test]
    fn located_error_points_at_failure() {
        let buf = Span::new(&[0x00, 0x01, 0x00, 0x00]);
        let (buf, first) = NonZero::from_wire(buf).unwrap();
        assert_eq!(first, NonZero(1));
        match NonZero::from_wire(buf) {
            Err(nom::Err::Error(err)) => {
                assert_eq!(err.error(), &TestParsingError::Zero);
                assert_eq!(err.span().location_offset(), 2);
            }
            other => panic!("expected an error, got {other:?}"),
        }
    }

    #[test]
    fn nom_errors_are_wrapped() {
        let buf = Span::new(&[0x00]);
        let ret = NonZero::from_wire(buf);
        match ret {
            Err(nom::Err::Error(err)) => {
                assert_eq!(err.error(), &TestParsingError::NomError(ErrorKind::Eof));
                assert_eq!(err.span().location_offset(), 0);
            }
            other => panic!("expected an error, got {other:?}"),
        }
    }
}
