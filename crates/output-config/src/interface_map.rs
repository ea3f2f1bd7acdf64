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

//! Interface map grammar.
//!
//! ```text
//! List  := Item (',' Item)*
//! Item  := Name | '(' Name (',' Name)* ')'
//! ```
//!
//! A name is a non-empty run of characters other than `(`, `)`, `,` and
//! whitespace. Whitespace around names and separators is ignored. Groups
//! don't nest.

use nom::bytes::complete::take_while1;
use nom::character::complete::multispace0;
use nom::error::{ErrorKind, ParseError};
use nom::IResult;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

const SEPARATOR: char = ',';
const GROUP_OPEN: char = '(';
const GROUP_CLOSE: char = ')';

/// Names mapped to the same output interface, in source order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InterfaceGroup(Vec<String>);

impl InterfaceGroup {
    pub fn names(&self) -> &[String] {
        &self.0
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|candidate| candidate == name)
    }
}

impl std::fmt::Display for InterfaceGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0.as_slice() {
            [single] => write!(f, "{single}"),
            names => write!(f, "({})", names.join(",")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum InterfaceMapErrorKind {
    #[strum(to_string = "interface map is empty")]
    Empty,
    #[strum(to_string = "expected an interface name")]
    ExpectedName,
    #[strum(to_string = "empty group")]
    EmptyGroup,
    #[strum(to_string = "groups cannot be nested")]
    NestedGroup,
    #[strum(to_string = "group is not closed")]
    UnterminatedGroup,
    #[strum(to_string = "')' without a matching '('")]
    UnbalancedParenthesis,
    #[strum(to_string = "expected ','")]
    MissingSeparator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid interface map at offset {offset}: {kind}")]
pub struct InterfaceMapError {
    offset: usize,
    kind: InterfaceMapErrorKind,
}

impl InterfaceMapError {
    pub const fn offset(&self) -> usize {
        self.offset
    }

    pub const fn kind(&self) -> InterfaceMapErrorKind {
        self.kind
    }
}

/// Grammar violation together with the unparsed remainder of the input.
#[derive(Debug)]
struct Violation<'a> {
    remaining: &'a str,
    kind: InterfaceMapErrorKind,
}

impl<'a> Violation<'a> {
    fn fail<T>(remaining: &'a str, kind: InterfaceMapErrorKind) -> IResult<&'a str, T, Self> {
        Err(nom::Err::Failure(Self { remaining, kind }))
    }
}

impl<'a> ParseError<&'a str> for Violation<'a> {
    fn from_error_kind(input: &'a str, _kind: ErrorKind) -> Self {
        Self {
            remaining: input,
            kind: InterfaceMapErrorKind::ExpectedName,
        }
    }

    fn append(_input: &'a str, _kind: ErrorKind, other: Self) -> Self {
        other
    }
}

type MapResult<'a, T> = IResult<&'a str, T, Violation<'a>>;

fn is_name_char(c: char) -> bool {
    !matches!(c, SEPARATOR | GROUP_OPEN | GROUP_CLOSE) && !c.is_whitespace()
}

fn name(input: &str, in_group: bool) -> MapResult<'_, String> {
    let (input, _) = multispace0(input)?;
    match take_while1::<_, _, Violation<'_>>(is_name_char)(input) {
        Ok((remaining, name)) => {
            let (remaining, _) = multispace0(remaining)?;
            Ok((remaining, name.to_string()))
        }
        Err(_) => {
            use InterfaceMapErrorKind::*;
            let kind = match (input.chars().next(), in_group) {
                (None, true) => UnterminatedGroup,
                (Some(GROUP_OPEN), true) => NestedGroup,
                (Some(GROUP_CLOSE), false) => UnbalancedParenthesis,
                _ => ExpectedName,
            };
            Violation::fail(input, kind)
        }
    }
}

fn group(input: &str) -> MapResult<'_, InterfaceGroup> {
    let (mut input, _) = multispace0(input)?;
    if input.starts_with(GROUP_CLOSE) {
        return Violation::fail(input, InterfaceMapErrorKind::EmptyGroup);
    }
    let mut names = Vec::new();
    loop {
        let (remaining, name) = name(input, true)?;
        names.push(name);
        let mut chars = remaining.chars();
        match chars.next() {
            Some(SEPARATOR) => input = chars.as_str(),
            Some(GROUP_CLOSE) => return Ok((chars.as_str(), InterfaceGroup(names))),
            Some(GROUP_OPEN) => {
                return Violation::fail(remaining, InterfaceMapErrorKind::NestedGroup)
            }
            None => return Violation::fail(remaining, InterfaceMapErrorKind::UnterminatedGroup),
            Some(_) => return Violation::fail(remaining, InterfaceMapErrorKind::MissingSeparator),
        }
    }
}

fn item(input: &str) -> MapResult<'_, InterfaceGroup> {
    let (input, _) = multispace0(input)?;
    match input.strip_prefix(GROUP_OPEN) {
        Some(inner) => {
            let (remaining, group) = group(inner)?;
            let (remaining, _) = multispace0(remaining)?;
            Ok((remaining, group))
        }
        None => {
            let (remaining, name) = name(input, false)?;
            Ok((remaining, InterfaceGroup(vec![name])))
        }
    }
}

fn interface_map(input: &str) -> MapResult<'_, Vec<InterfaceGroup>> {
    if input.trim().is_empty() {
        return Violation::fail(input, InterfaceMapErrorKind::Empty);
    }
    let (mut input, first) = item(input)?;
    let mut groups = vec![first];
    loop {
        let mut chars = input.chars();
        match chars.next() {
            None => return Ok((input, groups)),
            Some(SEPARATOR) => {
                let (remaining, group) = item(chars.as_str())?;
                groups.push(group);
                input = remaining;
            }
            Some(GROUP_OPEN) => {
                return Violation::fail(input, InterfaceMapErrorKind::MissingSeparator)
            }
            Some(GROUP_CLOSE) => {
                return Violation::fail(input, InterfaceMapErrorKind::UnbalancedParenthesis)
            }
            Some(_) => return Violation::fail(input, InterfaceMapErrorKind::MissingSeparator),
        }
    }
}

/// Parse an interface map such as `foo1,(bar1,bar2),foo2` into its groups.
/// Parsing stops at the first violation of the grammar.
pub fn parse_interface_map(input: &str) -> Result<Vec<InterfaceGroup>, InterfaceMapError> {
    match interface_map(input) {
        Ok((_, groups)) => Ok(groups),
        Err(nom::Err::Error(violation)) | Err(nom::Err::Failure(violation)) => {
            Err(InterfaceMapError {
                offset: input.len() - violation.remaining.len(),
                kind: violation.kind,
            })
        }
        Err(nom::Err::Incomplete(_)) => Err(InterfaceMapError {
            offset: input.len(),
            kind: InterfaceMapErrorKind::ExpectedName,
        }),
    }
}

pub(crate) fn deserialize_interface_map<'de, D>(
    deserializer: D,
) -> Result<Option<Vec<InterfaceGroup>>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(text) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };
    parse_interface_map(&text)
        .map(Some)
        .map_err(serde::de::Error::custom)
}

pub(crate) fn serialize_interface_map<S>(
    groups: &Option<Vec<InterfaceGroup>>,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match groups {
        Some(groups) => {
            let text = groups
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(",");
            serializer.serialize_some(&text)
        }
        None => serializer.serialize_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn groups(input: &str) -> Vec<Vec<String>> {
        parse_interface_map(input)
            .unwrap()
            .into_iter()
            .map(|group| group.names().to_vec())
            .collect()
    }

    #[rstest]
    #[case("foo", vec![vec!["foo"]])]
    #[case("foo,bar", vec![vec!["foo"], vec!["bar"]])]
    #[case("foo,(bar)", vec![vec!["foo"], vec!["bar"]])]
    #[case("(foo)", vec![vec!["foo"]])]
    #[case("(foo,bar)", vec![vec!["foo", "bar"]])]
    #[case("foo1,(bar1,bar2),foo2", vec![vec!["foo1"], vec!["bar1", "bar2"], vec!["foo2"]])]
    #[case("(f)", vec![vec!["f"]])]
    #[case(" foo , ( bar1 , bar2 ) ", vec![vec!["foo"], vec!["bar1", "bar2"]])]
    #[case("eth0.100,(mlx5_0,mlx5_1)", vec![vec!["eth0.100"], vec!["mlx5_0", "mlx5_1"]])]
    #[case("foo,\nbar", vec![vec!["foo"], vec!["bar"]])]
    #[case("foo\n", vec![vec!["foo"]])]
    #[case("foo\r\n", vec![vec!["foo"]])]
    #[case("(a,\n b)", vec![vec!["a", "b"]])]
    fn accepted(#[case] input: &str, #[case] expected: Vec<Vec<&str>>) {
        assert_eq!(groups(input), expected);
    }

    #[rstest]
    #[case("", InterfaceMapErrorKind::Empty)]
    #[case("    ", InterfaceMapErrorKind::Empty)]
    #[case("\n", InterfaceMapErrorKind::Empty)]
    #[case("foo,", InterfaceMapErrorKind::ExpectedName)]
    #[case(",foo", InterfaceMapErrorKind::ExpectedName)]
    #[case("()", InterfaceMapErrorKind::EmptyGroup)]
    #[case("(,)", InterfaceMapErrorKind::ExpectedName)]
    #[case("foo,(,bar)", InterfaceMapErrorKind::ExpectedName)]
    #[case("foo,(bar", InterfaceMapErrorKind::UnterminatedGroup)]
    #[case("bar),foo", InterfaceMapErrorKind::UnbalancedParenthesis)]
    #[case("foo()", InterfaceMapErrorKind::MissingSeparator)]
    #[case("foo,()", InterfaceMapErrorKind::EmptyGroup)]
    #[case("(foo,(bar))", InterfaceMapErrorKind::NestedGroup)]
    #[case("foo(),bar", InterfaceMapErrorKind::MissingSeparator)]
    #[case("foo bar", InterfaceMapErrorKind::MissingSeparator)]
    #[case("(foo bar)", InterfaceMapErrorKind::MissingSeparator)]
    #[case("(foo,bar", InterfaceMapErrorKind::UnterminatedGroup)]
    #[case("(foo,", InterfaceMapErrorKind::UnterminatedGroup)]
    #[case(")", InterfaceMapErrorKind::UnbalancedParenthesis)]
    fn rejected(#[case] input: &str, #[case] kind: InterfaceMapErrorKind) {
        let err = parse_interface_map(input).unwrap_err();
        assert_eq!(err.kind(), kind, "input: {input:?}, error: {err}");
    }

    #[test]
    fn error_offset_points_at_violation() {
        let err = parse_interface_map("foo1,(bar1,(x))").unwrap_err();
        assert_eq!(err.offset(), 11);
        assert_eq!(err.kind(), InterfaceMapErrorKind::NestedGroup);
        assert_eq!(
            err.to_string(),
            "invalid interface map at offset 11: groups cannot be nested"
        );
        assert_eq!(parse_interface_map("foo,").unwrap_err().offset(), 4);
    }

    #[test]
    fn parsing_is_idempotent() {
        let input = "foo1,(bar1,bar2),foo2";
        assert_eq!(parse_interface_map(input), parse_interface_map(input));
    }

    #[test]
    fn display_round_trips() {
        let parsed = parse_interface_map("a,( b ,c),(d)").unwrap();
        let text = parsed
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        assert_eq!(text, "a,(b,c),d");
        assert_eq!(parse_interface_map(&text).unwrap(), parsed);
        assert!(parsed[1].contains("c"));
        assert!(!parsed[1].contains("a"));
    }
}
