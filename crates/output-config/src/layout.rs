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

//! Assignment of selected fields to output interfaces.

use crate::{ConfigError, FieldCatalog, FieldDescriptor, FieldSelection, InterfaceGroup};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LayoutError {
    #[error(transparent)]
    Selection(#[from] ConfigError),

    #[error("Plugin '{0}' in the interface map is not a known plugin.")]
    UnknownPlugin(String),

    #[error("Plugin '{plugin}' is mapped to interfaces {first} and {second}, a plugin can be specified only once.")]
    DuplicatePlugin {
        plugin: String,
        first: usize,
        second: usize,
    },
}

/// One output interface and the fields exported through it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputInterface {
    index: usize,
    plugins: Vec<String>,
    fields: Vec<FieldDescriptor>,
}

impl OutputInterface {
    pub const fn index(&self) -> usize {
        self.index
    }

    pub fn plugins(&self) -> &[String] {
        &self.plugins
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterfaceLayout {
    interfaces: Vec<OutputInterface>,
}

impl InterfaceLayout {
    /// Every selected field on a single interface.
    pub fn single(selection: &FieldSelection) -> Self {
        let interface = OutputInterface {
            index: 0,
            plugins: selection.plugins().into_iter().map(str::to_string).collect(),
            fields: selection.iter().cloned().collect(),
        };
        Self {
            interfaces: vec![interface],
        }
    }

    /// One interface per group, in group order. Selected fields of plugins
    /// that appear in no group are not exported.
    pub fn build<C: FieldCatalog>(
        groups: &[InterfaceGroup],
        selection: &FieldSelection,
        catalog: &C,
    ) -> Result<Self, LayoutError> {
        let mut assigned: BTreeMap<&str, usize> = BTreeMap::new();
        for (index, group) in groups.iter().enumerate() {
            for plugin in group.names() {
                if !catalog.has_plugin(plugin) {
                    return Err(LayoutError::UnknownPlugin(plugin.clone()));
                }
                if let Some(first) = assigned.insert(plugin, index) {
                    return Err(LayoutError::DuplicatePlugin {
                        plugin: plugin.clone(),
                        first,
                        second: index,
                    });
                }
            }
        }
        for plugin in selection.plugins() {
            if !assigned.contains_key(plugin) {
                tracing::warn!(
                    plugin,
                    "plugin has selected fields but is not mapped to any output interface"
                );
            }
        }
        let interfaces = groups
            .iter()
            .enumerate()
            .map(|(index, group)| OutputInterface {
                index,
                plugins: group.names().to_vec(),
                fields: group
                    .names()
                    .iter()
                    .flat_map(|plugin| selection.fields_of(plugin))
                    .cloned()
                    .collect(),
            })
            .collect();
        Ok(Self { interfaces })
    }

    pub fn interfaces(&self) -> &[OutputInterface] {
        &self.interfaces
    }

    /// Index of the interface `plugin` is exported through.
    pub fn interface_of(&self, plugin: &str) -> Option<usize> {
        self.interfaces
            .iter()
            .find(|interface| interface.plugins.iter().any(|p| p == plugin))
            .map(OutputInterface::index)
    }
}
