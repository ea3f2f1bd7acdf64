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

//! Export configuration: which `(plugin, field)` pairs end up in the exported
//! records and how plugins are spread over output interfaces.

pub mod interface_map;
pub mod layout;
pub mod selection;

pub use interface_map::{parse_interface_map, InterfaceGroup, InterfaceMapError};
pub use layout::{InterfaceLayout, LayoutError, OutputInterface};
pub use selection::{ConfigError, FieldSelection, OutputAction};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Identifies one exportable value: a field name within a plugin.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FieldDescriptor {
    plugin: String,
    field: String,
}

impl FieldDescriptor {
    pub fn new(plugin: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            plugin: plugin.into(),
            field: field.into(),
        }
    }

    pub fn plugin(&self) -> &str {
        &self.plugin
    }

    pub fn field(&self) -> &str {
        &self.field
    }
}

impl std::fmt::Display for FieldDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.plugin, self.field)
    }
}

/// Source of the plugins and fields a configuration may refer to.
pub trait FieldCatalog {
    /// Every field of `plugin` in registration order, `None` if the plugin is
    /// unknown.
    fn plugin_fields(&self, plugin: &str) -> Option<Vec<FieldDescriptor>>;

    /// Every field of every plugin.
    fn all_fields(&self) -> Vec<FieldDescriptor>;

    fn has_plugin(&self, plugin: &str) -> bool {
        self.plugin_fields(plugin).is_some()
    }
}

/// Plugin name to field names.
impl FieldCatalog for BTreeMap<String, Vec<String>> {
    fn plugin_fields(&self, plugin: &str) -> Option<Vec<FieldDescriptor>> {
        self.get(plugin).map(|fields| {
            fields
                .iter()
                .map(|field| FieldDescriptor::new(plugin, field.as_str()))
                .collect()
        })
    }

    fn all_fields(&self) -> Vec<FieldDescriptor> {
        self.iter()
            .flat_map(|(plugin, fields)| {
                fields
                    .iter()
                    .map(|field| FieldDescriptor::new(plugin.as_str(), field.as_str()))
            })
            .collect()
    }
}

/// Output section of the configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Field selection text, see [`FieldSelection::parse`]. Nothing is
    /// exported when absent.
    #[serde(default)]
    pub fields: Option<String>,

    /// Plugin to interface mapping, e.g. `http,(quic,mqtt)`. All selected
    /// plugins go to a single interface when absent.
    #[serde(
        default,
        deserialize_with = "interface_map::deserialize_interface_map",
        serialize_with = "interface_map::serialize_interface_map"
    )]
    pub interfaces: Option<Vec<InterfaceGroup>>,
}

impl OutputConfig {
    /// Resolve the configuration against the registered plugins.
    pub fn resolve<C: FieldCatalog>(&self, catalog: &C) -> Result<InterfaceLayout, LayoutError> {
        let selection = match &self.fields {
            Some(text) => FieldSelection::parse(text, catalog)?,
            None => FieldSelection::default(),
        };
        match &self.interfaces {
            Some(groups) => InterfaceLayout::build(groups, &selection, catalog),
            None => Ok(InterfaceLayout::single(&selection)),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn catalog() -> BTreeMap<String, Vec<String>> {
        BTreeMap::from([
            (
                "quic".to_string(),
                vec!["QUIC_SNI".to_string(), "QUIC_VERSION".to_string()],
            ),
            (
                "tls".to_string(),
                vec!["TLS_F1".to_string(), "TLS_F2".to_string()],
            ),
            ("http".to_string(), vec!["HTTP_REQUEST_HOST".to_string()]),
        ])
    }

    #[test]
    fn descriptor_ordering_and_display() {
        let a = FieldDescriptor::new("quic", "QUIC_VERSION");
        let b = FieldDescriptor::new("tls", "TLS_F1");
        assert!(a < b);
        assert_eq!(a.to_string(), "quic.QUIC_VERSION");
    }

    #[test]
    fn map_catalog() {
        let catalog = catalog();
        assert!(catalog.has_plugin("tls"));
        assert!(!catalog.has_plugin("dns"));
        assert_eq!(
            catalog.plugin_fields("quic"),
            Some(vec![
                FieldDescriptor::new("quic", "QUIC_SNI"),
                FieldDescriptor::new("quic", "QUIC_VERSION"),
            ])
        );
        assert_eq!(catalog.all_fields().len(), 5);
    }

    #[test]
    fn config_from_yaml() {
        let yaml = r#"
fields: |
  fields: '
    quic,
    http.HTTP_REQUEST_HOST
  '
interfaces: "http,(quic, tls)"
"#;
        let config: OutputConfig = serde_yaml::from_str(yaml).unwrap();
        let groups = config.interfaces.as_ref().unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[1].names(), &["quic".to_string(), "tls".to_string()]);

        let layout = config.resolve(&catalog()).unwrap();
        assert_eq!(layout.interfaces().len(), 2);
        assert_eq!(
            layout.interfaces()[0].fields(),
            &[FieldDescriptor::new("http", "HTTP_REQUEST_HOST")]
        );
        assert_eq!(layout.interfaces()[1].fields().len(), 2);
    }

    #[test]
    fn interface_map_as_block_scalar() {
        let yaml = "interfaces: |\n  http,\n  (quic, tls)\n";
        let config: OutputConfig = serde_yaml::from_str(yaml).unwrap();
        let groups = config.interfaces.unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].names(), &["http".to_string()]);
        assert_eq!(groups[1].names(), &["quic".to_string(), "tls".to_string()]);
    }

    #[test]
    fn malformed_interface_map_fails_deserialization() {
        let yaml = "interfaces: \"foo,()\"\n";
        let ret = serde_yaml::from_str::<OutputConfig>(yaml);
        assert!(ret.is_err());
    }

    #[test]
    fn config_serialization_round_trip() {
        let config = OutputConfig {
            fields: Some("fields: 'quic'".to_string()),
            interfaces: Some(parse_interface_map("quic,(tls,http)").unwrap()),
        };
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(
            json,
            r#"{"fields":"fields: 'quic'","interfaces":"quic,(tls,http)"}"#
        );
        let back: OutputConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn empty_config_exports_nothing() {
        let layout = OutputConfig::default().resolve(&catalog()).unwrap();
        assert_eq!(layout.interfaces().len(), 1);
        assert!(layout.interfaces()[0].fields().is_empty());
    }
}
