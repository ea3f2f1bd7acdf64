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

//! Pull based tokenization of a payload.
//!
//! A [`LazyTokenSequence`] walks a [`Span`] one token at a time using a
//! [`TokenRule`]. Nothing is copied: tokens are sub-views of the payload and
//! the rule only decides where the next token starts and ends. The sequence
//! is finite and cannot be restarted. Once it ends, [`LazyTokenSequence::state`]
//! tells whether the grammar reached a definite end
//! ([`ParsingState::Success`]) or ran out of data / hit malformed input
//! ([`ParsingState::Failure`]).

use crate::Span;
use serde::{Deserialize, Serialize};

#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum_macros::Display,
    Serialize,
    Deserialize,
)]
pub enum ParsingState {
    Success,
    #[default]
    Failure,
}

/// Outcome of one tokenization step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step<T> {
    /// A token was produced, the view has been advanced past it.
    Yield(T),
    /// The grammar's terminator was reached.
    Finished,
    /// Out of data or malformed input. No further tokens.
    Stop,
}

/// Grammar of a token sequence.
///
/// `step` is called with the not yet tokenized part of the payload and must
/// advance it past whatever it consumed.
pub trait TokenRule<'a> {
    type Token;

    fn step(&mut self, view: &mut Span<'a>) -> Step<Self::Token>;
}

#[derive(Debug, Clone)]
pub struct LazyTokenSequence<'a, R> {
    view: Span<'a>,
    rule: R,
    state: ParsingState,
    done: bool,
}

impl<'a, R: TokenRule<'a>> LazyTokenSequence<'a, R> {
    pub const fn new(view: Span<'a>, rule: R) -> Self {
        Self {
            view,
            rule,
            state: ParsingState::Failure,
            done: false,
        }
    }

    pub const fn state(&self) -> ParsingState {
        self.state
    }

    /// The part of the payload the rule has not consumed yet.
    pub const fn remaining(&self) -> Span<'a> {
        self.view
    }

    pub const fn is_done(&self) -> bool {
        self.done
    }

    /// Drain the sequence, handing every token to `f`, and return the final
    /// state.
    pub fn for_each_token<F: FnMut(R::Token)>(&mut self, mut f: F) -> ParsingState {
        for token in self.by_ref() {
            f(token);
        }
        self.state
    }
}

impl<'a, R: TokenRule<'a>> Iterator for LazyTokenSequence<'a, R> {
    type Item = R::Token;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.rule.step(&mut self.view) {
            Step::Yield(token) => Some(token),
            Step::Finished => {
                self.done = true;
                self.state = ParsingState::Success;
                None
            }
            Step::Stop => {
                self.done = true;
                None
            }
        }
    }
}

impl<'a, R: TokenRule<'a>> std::iter::FusedIterator for LazyTokenSequence<'a, R> {}

#[cfg(test)]
mod tests {
    use super::*;
    use nom::Slice;

    /// Splits on `;`, finishes on an empty item.
    struct SemicolonRule;

    impl<'a> TokenRule<'a> for SemicolonRule {
        type Token = Span<'a>;

        fn step(&mut self, view: &mut Span<'a>) -> Step<Self::Token> {
            let Some(end) = view.find(b";") else {
                return Step::Stop;
            };
            if end == 0 {
                *view = view.slice(1..);
                return Step::Finished;
            }
            let token = view.slice(..end);
            *view = view.slice(end + 1..);
            Step::Yield(token)
        }
    }

    #[test]
    fn starts_as_failure() {
        let seq = LazyTokenSequence::new(Span::new(b"a;"), SemicolonRule);
        assert_eq!(seq.state(), ParsingState::Failure);
        assert!(!seq.is_done());
        assert_eq!(ParsingState::default(), ParsingState::Failure);
    }

    #[test]
    fn finishes_with_success() {
        let mut seq = LazyTokenSequence::new(Span::new(b"a;bc;;tail"), SemicolonRule);
        let tokens: Vec<_> = seq.by_ref().map(|t| t.fragment()).collect();
        assert_eq!(tokens, vec![&b"a"[..], &b"bc"[..]]);
        assert_eq!(seq.state(), ParsingState::Success);
        assert_eq!(seq.remaining().fragment(), b"tail");
        assert_eq!(seq.remaining().location_offset(), 6);
    }

    #[test]
    fn stops_without_success_when_incomplete() {
        let mut seq = LazyTokenSequence::new(Span::new(b"a;bc"), SemicolonRule);
        let mut tokens = vec![];
        let state = seq.for_each_token(|t| tokens.push(t.fragment()));
        assert_eq!(tokens, vec![&b"a"[..]]);
        assert_eq!(state, ParsingState::Failure);
        assert_eq!(seq.remaining().fragment(), b"bc");
    }

    #[test]
    fn is_fused_after_the_end() {
        let mut seq = LazyTokenSequence::new(Span::new(b";a;"), SemicolonRule);
        assert_eq!(seq.next(), None);
        assert_eq!(seq.state(), ParsingState::Success);
        // The view still holds "a;", but the sequence has ended.
        assert_eq!(seq.next(), None);
        assert!(seq.is_done());
    }
}
