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

//! Field selection language.
//!
//! ```text
//! fields: '
//!     # one entry per comma, comments run to the end of the line
//!     quic.QUIC_SNI,   # a single field
//!     tls,             # every field of a plugin
//!     -tls.TLS_F2,     # a leading '-' excludes instead of includes
//!     *                # every registered field
//! '
//! ```
//!
//! Entries are applied in order, starting from an empty selection.

use crate::{FieldCatalog, FieldDescriptor};
use nom::bytes::complete::{tag, take_while};
use nom::character::complete::{char, multispace0};
use nom::combinator::all_consuming;
use nom::sequence::{delimited, tuple};
use serde::Serialize;
use std::collections::BTreeSet;

const GLOBAL_SCOPE: &str = "*";
const EXCLUDE_PREFIX: char = '-';
const COMMENT: char = '#';

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("field list must start with 'fields:' followed by a single quoted list")]
    MalformedFieldList,

    #[error("invalid entry '{0}': entries must not contain whitespace")]
    WhitespaceInEntry(String),

    #[error("invalid entry '{0}': expected '*', 'plugin' or 'plugin.FIELD'")]
    InvalidEntry(String),

    #[error("Plugin name '{0}' not found among available plugins.")]
    UnknownPlugin(String),

    #[error("Field name '{field}' not found in plugin '{plugin}'.")]
    UnknownField { plugin: String, field: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum ActionType {
    Include,
    Exclude,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionScope {
    Global,
    Plugin(String),
    Field(FieldDescriptor),
}

/// One entry of the field list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputAction {
    action: ActionType,
    scope: ActionScope,
}

impl OutputAction {
    pub const fn new(action: ActionType, scope: ActionScope) -> Self {
        Self { action, scope }
    }

    pub const fn action(&self) -> ActionType {
        self.action
    }

    pub const fn scope(&self) -> &ActionScope {
        &self.scope
    }

    fn parse_entry(entry: &str) -> Result<Self, ConfigError> {
        if entry.chars().any(char::is_whitespace) {
            return Err(ConfigError::WhitespaceInEntry(entry.to_string()));
        }
        let (action, name) = match entry.strip_prefix(EXCLUDE_PREFIX) {
            Some(name) => (ActionType::Exclude, name),
            None => (ActionType::Include, entry),
        };
        let scope = if name == GLOBAL_SCOPE {
            ActionScope::Global
        } else {
            match name.split_once('.') {
                None if is_identifier(name) => ActionScope::Plugin(name.to_string()),
                Some((plugin, field)) if is_identifier(plugin) && is_identifier(field) => {
                    ActionScope::Field(FieldDescriptor::new(plugin, field))
                }
                _ => return Err(ConfigError::InvalidEntry(entry.to_string())),
            }
        };
        Ok(Self::new(action, scope))
    }
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn strip_comments(text: &str) -> String {
    text.lines()
        .map(|line| line.split_once(COMMENT).map_or(line, |(code, _)| code))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Extract the quoted list from `fields: '...'`.
fn field_list(input: &str) -> nom::IResult<&str, &str> {
    all_consuming(delimited(
        tuple((multispace0, tag("fields:"), multispace0)),
        delimited(char('\''), take_while(|c: char| c != '\''), char('\'')),
        multispace0,
    ))(input)
}

/// Parse the field list into its ordered actions without resolving any names.
pub fn parse_output_actions(text: &str) -> Result<Vec<OutputAction>, ConfigError> {
    let text = strip_comments(text);
    let (_, list) = field_list(&text).map_err(|_| ConfigError::MalformedFieldList)?;
    list.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(OutputAction::parse_entry)
        .collect()
}

/// The set of fields to export.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldSelection {
    fields: BTreeSet<FieldDescriptor>,
}

impl FieldSelection {
    /// Parse a field list and resolve it against `catalog`. Including an
    /// unknown plugin or field is an error.
    pub fn parse<C: FieldCatalog>(text: &str, catalog: &C) -> Result<Self, ConfigError> {
        let actions = parse_output_actions(text)?;
        Self::from_actions(&actions, catalog)
    }

    pub fn from_actions<C: FieldCatalog>(
        actions: &[OutputAction],
        catalog: &C,
    ) -> Result<Self, ConfigError> {
        let mut selection = Self::default();
        for action in actions {
            selection.apply(action, catalog)?;
        }
        tracing::debug!(
            actions = actions.len(),
            fields = selection.len(),
            "resolved field selection"
        );
        Ok(selection)
    }

    /// Every field known to `catalog`.
    pub fn all<C: FieldCatalog>(catalog: &C) -> Self {
        Self {
            fields: catalog.all_fields().into_iter().collect(),
        }
    }

    fn apply<C: FieldCatalog>(
        &mut self,
        action: &OutputAction,
        catalog: &C,
    ) -> Result<(), ConfigError> {
        match (action.action(), action.scope()) {
            (ActionType::Include, ActionScope::Global) => {
                self.fields.extend(catalog.all_fields());
            }
            (ActionType::Include, ActionScope::Plugin(plugin)) => {
                let fields = catalog
                    .plugin_fields(plugin)
                    .ok_or_else(|| ConfigError::UnknownPlugin(plugin.clone()))?;
                self.fields.extend(fields);
            }
            (ActionType::Include, ActionScope::Field(descriptor)) => {
                let fields = catalog
                    .plugin_fields(descriptor.plugin())
                    .ok_or_else(|| ConfigError::UnknownPlugin(descriptor.plugin().to_string()))?;
                if !fields.contains(descriptor) {
                    return Err(ConfigError::UnknownField {
                        plugin: descriptor.plugin().to_string(),
                        field: descriptor.field().to_string(),
                    });
                }
                self.fields.insert(descriptor.clone());
            }
            (ActionType::Exclude, ActionScope::Global) => self.fields.clear(),
            (ActionType::Exclude, ActionScope::Plugin(plugin)) => {
                self.fields.retain(|descriptor| descriptor.plugin() != plugin.as_str());
            }
            (ActionType::Exclude, ActionScope::Field(descriptor)) => {
                self.fields.remove(descriptor);
            }
        }
        Ok(())
    }

    pub fn contains(&self, descriptor: &FieldDescriptor) -> bool {
        self.fields.contains(descriptor)
    }

    /// Selected fields in `(plugin, field)` order.
    pub fn iter(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter()
    }

    pub fn fields_of<'a>(&'a self, plugin: &'a str) -> impl Iterator<Item = &'a FieldDescriptor> {
        self.fields
            .iter()
            .filter(move |descriptor| descriptor.plugin() == plugin)
    }

    pub fn plugins(&self) -> BTreeSet<&str> {
        self.fields.iter().map(FieldDescriptor::plugin).collect()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<'a> IntoIterator for &'a FieldSelection {
    type Item = &'a FieldDescriptor;
    type IntoIter = std::collections::btree_set::Iter<'a, FieldDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}
