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

use serde::Serialize;

/// Value of one exported field, borrowed from the context it was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FieldValue<'a> {
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    Str(&'a str),
    /// Fixed size octet array
    Bytes(&'a [u8]),
    /// Variable length list of unsigned8 elements
    U8List(&'a [u8]),
}

impl FieldValue<'_> {
    /// Encoded size in bytes, not counting any length prefix an exporter may
    /// add for variable length values.
    pub const fn len(&self) -> usize {
        match self {
            Self::U8(_) => 1,
            Self::U16(_) => 2,
            Self::U32(_) => 4,
            Self::U64(_) => 8,
            Self::Str(value) => value.len(),
            Self::Bytes(value) | Self::U8List(value) => value.len(),
        }
    }

    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Display for FieldValue<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::U8(value) => write!(f, "{value}"),
            Self::U16(value) => write!(f, "{value}"),
            Self::U32(value) => write!(f, "{value}"),
            Self::U64(value) => write!(f, "{value}"),
            Self::Str(value) => write!(f, "{value}"),
            Self::Bytes(value) => {
                for byte in value.iter() {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
            Self::U8List(value) => {
                write!(f, "[")?;
                for (index, element) in value.iter().enumerate() {
                    if index > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{element}")?;
                }
                write!(f, "]")
            }
        }
    }
}
