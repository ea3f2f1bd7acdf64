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

//! Self-delimiting integers.
//!
//! Two encodings are found in the supported protocols:
//!
//! * A continuation-bit encoding (MQTT remaining length). Every byte carries
//!   seven value bits and a continuation flag in the most significant bit. The
//!   value bits are accumulated one byte at a time, shifting the accumulator
//!   left by eight bits per byte.
//! * The QUIC encoding (RFC 9000, section 16) where the two most significant
//!   bits of the first byte select a total length of 1, 2, 4 or 8 bytes.

use crate::Span;
use nom::error::{ErrorKind, ParseError};
use nom::{IResult, Slice};
use serde::{Deserialize, Serialize};

/// Upper bound on the bytes consumed by [`read_variable_length`]. A longer
/// run of continuation bytes is treated as malformed.
pub const MAX_VARIABLE_LENGTH_BYTES: usize = 4;

/// Decoded integer plus the number of bytes it occupied on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VariableLengthValue<T> {
    value: T,
    length: u16,
}

impl<T: Copy> VariableLengthValue<T> {
    pub const fn new(value: T, length: u16) -> Self {
        Self { value, length }
    }

    pub const fn value(&self) -> T {
        self.value
    }

    /// Number of bytes consumed from the view.
    pub const fn length(&self) -> u16 {
        self.length
    }
}

/// Decode a continuation-bit integer from the start of `view`.
///
/// Returns `None` when the view ends, or [`MAX_VARIABLE_LENGTH_BYTES`] bytes
/// are read, before a byte with a clear continuation flag is seen.
pub fn read_variable_length(view: Span<'_>) -> Option<VariableLengthValue<u32>> {
    let mut value = 0u32;
    for (index, byte) in view.iter().take(MAX_VARIABLE_LENGTH_BYTES).enumerate() {
        value = (value << 8) | u32::from(byte & 0x7f);
        if byte & 0x80 == 0 {
            return Some(VariableLengthValue::new(value, index as u16 + 1));
        }
    }
    None
}

/// Decode a QUIC variable-length integer from the start of `view`.
pub fn read_quic_variable_length(view: Span<'_>) -> Option<VariableLengthValue<u64>> {
    let first = view.byte(0)?;
    let length = 1usize << (first >> 6);
    let encoded = view.get(..length)?;
    let value = encoded[1..]
        .iter()
        .fold(u64::from(first & 0x3f), |acc, byte| {
            (acc << 8) | u64::from(*byte)
        });
    Some(VariableLengthValue::new(value, length as u16))
}

/// `nom` adapter for [`read_variable_length`].
pub fn variable_length<'a, E: ParseError<Span<'a>>>(buf: Span<'a>) -> IResult<Span<'a>, u32, E> {
    match read_variable_length(buf) {
        Some(decoded) => Ok((buf.slice(usize::from(decoded.length())..), decoded.value())),
        None => Err(nom::Err::Error(E::from_error_kind(buf, ErrorKind::TooLarge))),
    }
}

/// `nom` adapter for [`read_quic_variable_length`].
pub fn quic_variable_length<'a, E: ParseError<Span<'a>>>(
    buf: Span<'a>,
) -> IResult<Span<'a>, u64, E> {
    match read_quic_variable_length(buf) {
        Some(decoded) => Ok((buf.slice(usize::from(decoded.length())..), decoded.value())),
        None => Err(nom::Err::Error(E::from_error_kind(buf, ErrorKind::Eof))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn single_byte() {
        let decoded = read_variable_length(Span::new(&[0x7f])).unwrap();
        assert_eq!(decoded.value(), 127);
        assert_eq!(decoded.length(), 1);
    }

    #[test]
    fn accumulates_eight_bits_per_byte() {
        let decoded = read_variable_length(Span::new(&[0x81, 0x01])).unwrap();
        assert_eq!(decoded.value(), 0x0101);
        assert_eq!(decoded.length(), 2);
    }

    #[test]
    fn stops_at_first_clear_continuation_bit() {
        let decoded = read_variable_length(Span::new(&[0x05, 0xff, 0xff])).unwrap();
        assert_eq!(decoded, VariableLengthValue::new(5, 1));
    }

    #[rstest]
    #[case(&[])]
    #[case(&[0x81])]
    #[case(&[0xff, 0xff, 0x80])]
    #[case(&[0x80, 0x80, 0x80, 0x80, 0x01])]
    fn unterminated_is_absent(#[case] input: &[u8]) {
        assert_eq!(read_variable_length(Span::new(input)), None);
    }

    #[test]
    fn longest_accepted_encoding() {
        let decoded = read_variable_length(Span::new(&[0xff, 0xff, 0xff, 0x7f])).unwrap();
        assert_eq!(decoded.value(), 0x7f7f_7f7f);
        assert_eq!(decoded.length(), 4);
    }

    // RFC 9000, appendix A.1
    #[rstest]
    #[case(&[0xc2, 0x19, 0x7c, 0x5e, 0xff, 0x14, 0xe8, 0x8c], 151_288_809_941_952_652, 8)]
    #[case(&[0x9d, 0x7f, 0x3e, 0x7d], 494_878_333, 4)]
    #[case(&[0x7b, 0xbd], 15_293, 2)]
    #[case(&[0x25], 37, 1)]
    #[case(&[0x40, 0x25], 37, 2)]
    fn quic_encoding(#[case] input: &[u8], #[case] value: u64, #[case] length: u16) {
        let decoded = read_quic_variable_length(Span::new(input)).unwrap();
        assert_eq!(decoded.value(), value);
        assert_eq!(decoded.length(), length);
    }

    #[rstest]
    #[case(&[])]
    #[case(&[0x40])]
    #[case(&[0xc2, 0x19, 0x7c])]
    fn quic_truncated_is_absent(#[case] input: &[u8]) {
        assert_eq!(read_quic_variable_length(Span::new(input)), None);
    }

    #[test]
    fn nom_adapters_advance_the_view() {
        let buf = Span::new(&[0x81, 0x01, 0xaa]);
        let (rest, value) = variable_length::<nom::error::Error<_>>(buf).unwrap();
        assert_eq!(value, 257);
        assert_eq!(rest.location_offset(), 2);

        let buf = Span::new(&[0x40, 0x25, 0xaa]);
        let (rest, value) = quic_variable_length::<nom::error::Error<_>>(buf).unwrap();
        assert_eq!(value, 37);
        assert_eq!(rest.fragment(), &[0xaa]);

        assert!(variable_length::<nom::error::Error<_>>(Span::new(&[0x80])).is_err());
    }
}
