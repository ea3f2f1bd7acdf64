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

//! Life cycle hooks every protocol plugin implements.

use crate::{
    http::HttpPlugin, icmp::IcmpPlugin, mpls::MplsPlugin, mqtt::MqttOptions, mqtt::MqttPlugin,
    quic::QuicPlugin, vlan::VlanPlugin, Packet, Protocol, ProtocolContext,
};
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;

/// Outcome of offering the first packets of a flow to a plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OnInitResult {
    /// Context created, later packets are of interest.
    ConstructedNeedsUpdate(ProtocolContext),
    /// Context created and complete.
    ConstructedFinal(ProtocolContext),
    /// Nothing recognized yet, offer the next packet again.
    PendingConstruction,
    /// The flow does not carry this protocol.
    Irrelevant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BeforeUpdateResult {
    #[default]
    NoAction,
    /// Export the flow as it is and start a new one with this packet.
    FlushFlowAndReinsert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnUpdateResult {
    NeedsUpdate,
    /// The context is complete, no further packets are offered.
    Final,
    /// Drop the context from the flow.
    Remove,
    /// Export the flow including this packet.
    FlushFlow,
}

pub trait ProcessPlugin: Send + Sync {
    fn protocol(&self) -> Protocol;

    fn name(&self) -> &'static str {
        self.protocol().name()
    }

    fn on_init(&self, packet: &Packet<'_>) -> OnInitResult;

    /// Called for a constructed context before any plugin sees the packet.
    fn before_update(&self, _packet: &Packet<'_>, _context: &ProtocolContext) -> BeforeUpdateResult {
        BeforeUpdateResult::NoAction
    }

    fn on_update(&self, packet: &Packet<'_>, context: &mut ProtocolContext) -> OnUpdateResult;
}

/// Selects and configures the plugins a probe runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginsConfig {
    #[serde(default = "default_enabled")]
    enabled: Vec<Protocol>,

    #[serde(default)]
    mqtt: MqttOptions,
}

fn default_enabled() -> Vec<Protocol> {
    Protocol::iter().collect()
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            mqtt: MqttOptions::default(),
        }
    }
}

impl PluginsConfig {
    pub fn new(enabled: Vec<Protocol>, mqtt: MqttOptions) -> Self {
        Self { enabled, mqtt }
    }

    pub fn enabled(&self) -> &[Protocol] {
        &self.enabled
    }

    pub const fn mqtt(&self) -> &MqttOptions {
        &self.mqtt
    }

    /// Instantiate the enabled plugins in configuration order. A protocol
    /// listed more than once is instantiated once.
    pub fn build(&self) -> Vec<Box<dyn ProcessPlugin>> {
        let mut plugins: Vec<Box<dyn ProcessPlugin>> = Vec::with_capacity(self.enabled.len());
        for protocol in &self.enabled {
            if plugins.iter().any(|plugin| plugin.protocol() == *protocol) {
                tracing::warn!(plugin = protocol.name(), "plugin enabled more than once");
                continue;
            }
            let plugin: Box<dyn ProcessPlugin> = match protocol {
                Protocol::Vlan => Box::new(VlanPlugin),
                Protocol::Mpls => Box::new(MplsPlugin),
                Protocol::Icmp => Box::new(IcmpPlugin),
                Protocol::Quic => Box::new(QuicPlugin),
                Protocol::Mqtt => Box::new(MqttPlugin::new(self.mqtt.clone())),
                Protocol::Http => Box::new(HttpPlugin),
            };
            plugins.push(plugin);
        }
        plugins
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_enables_everything() {
        let plugins = PluginsConfig::default().build();
        let names: Vec<_> = plugins.iter().map(|plugin| plugin.name()).collect();
        assert_eq!(names, vec!["vlan", "mpls", "icmp", "quic", "mqtt", "http"]);
    }

    #[test]
    fn duplicates_are_built_once() {
        let config = PluginsConfig::new(
            vec![Protocol::Http, Protocol::Quic, Protocol::Http],
            MqttOptions::default(),
        );
        let names: Vec<_> = config.build().iter().map(|plugin| plugin.name()).collect();
        assert_eq!(names, vec!["http", "quic"]);
    }

    #[test]
    fn deserialize() {
        let config: PluginsConfig =
            serde_json::from_str(r#"{"enabled": ["mqtt"], "mqtt": {"topiccount": 3}}"#).unwrap();
        assert_eq!(config.enabled(), &[Protocol::Mqtt]);
        assert_eq!(config.mqtt().max_topics(), 3);
        let config: PluginsConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, PluginsConfig::default());
    }
}
