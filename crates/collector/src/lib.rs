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

use crate::config::CollectorConfig;
use anyhow::Context;
use flowprobe_flow_pkt::{FieldManager, FieldValue, FlowAction, FlowRecord, Packet, ProcessPlugin};
use flowprobe_output_config::{FieldDescriptor, InterfaceLayout};
use tracing::{info, warn};

pub mod config;

/// Plugins, field registry and output layout built from one configuration.
pub struct Probe {
    manager: FieldManager,
    plugins: Vec<Box<dyn ProcessPlugin>>,
    layout: InterfaceLayout,
}

impl Probe {
    pub fn from_config(config: &CollectorConfig) -> anyhow::Result<Self> {
        let manager = FieldManager::with_builtin_plugins();
        let plugins = config.plugins.build();
        let layout = config
            .output
            .resolve(&manager)
            .context("invalid output configuration")?;

        for interface in layout.interfaces() {
            for plugin in interface.plugins() {
                let enabled = plugins.iter().any(|p| p.name() == plugin.as_str());
                if !enabled && interface.fields().iter().any(|f| f.plugin() == plugin) {
                    warn!(
                        plugin = plugin.as_str(),
                        "fields are selected for a plugin that is not enabled"
                    );
                }
            }
            info!(
                interface = interface.index(),
                plugins = ?interface.plugins(),
                fields = interface.fields().len(),
                "output interface configured"
            );
        }
        info!(
            plugins = ?plugins.iter().map(|p| p.name()).collect::<Vec<_>>(),
            "probe configured"
        );
        Ok(Self {
            manager,
            plugins,
            layout,
        })
    }

    pub const fn manager(&self) -> &FieldManager {
        &self.manager
    }

    pub fn plugins(&self) -> &[Box<dyn ProcessPlugin>] {
        &self.plugins
    }

    pub const fn layout(&self) -> &InterfaceLayout {
        &self.layout
    }

    pub fn process_packet(&self, flow: &mut FlowRecord, packet: &Packet<'_>) -> FlowAction {
        flow.process_packet(&self.plugins, packet)
    }

    /// Hand every exported value of `flow` to `f` together with the index of
    /// the output interface it belongs to.
    pub fn export<F>(&self, flow: &FlowRecord, mut f: F)
    where
        F: FnMut(usize, &FieldDescriptor, FieldValue<'_>),
    {
        for interface in self.layout.interfaces() {
            flow.for_each_field(&self.manager, interface.fields(), |descriptor, value| {
                f(interface.index(), descriptor, value)
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowprobe_flow_pkt::{
        mqtt::MqttOptions,
        packet::{Direction, IPPROTO_TCP, IPPROTO_UDP},
        plugin::PluginsConfig,
        Protocol,
    };
    use flowprobe_output_config::{parse_interface_map, OutputConfig};
    use tracing_test::traced_test;

    fn config(fields: &str, interfaces: Option<&str>) -> CollectorConfig {
        CollectorConfig {
            output: OutputConfig {
                fields: Some(fields.to_string()),
                interfaces: interfaces.map(|text| parse_interface_map(text).unwrap()),
            },
            ..Default::default()
        }
    }

    #[test]
    fn export_per_interface() {
        let probe = Probe::from_config(&config(
            "fields: 'http.HTTP_REQUEST_HOST, http.HTTP_RESPONSE_STATUS_CODE, vlan'",
            Some("http,vlan"),
        ))
        .unwrap();
        let mut flow = FlowRecord::new();
        let request = Packet::new(
            IPPROTO_TCP,
            b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n",
        )
        .with_ports(40000, 80)
        .with_vlan_tci(0x2064);
        let response = Packet::new(IPPROTO_TCP, b"HTTP/1.1 301 Moved\r\n\r\n")
            .with_ports(80, 40000)
            .with_direction(Direction::ServerToClient);
        assert_eq!(probe.process_packet(&mut flow, &request), FlowAction::Continue);
        assert_eq!(probe.process_packet(&mut flow, &response), FlowAction::Continue);

        let mut exported = vec![];
        probe.export(&flow, |interface, descriptor, value| {
            exported.push(format!("{interface}:{descriptor}={value}"))
        });
        assert_eq!(
            exported,
            vec![
                "0:http.HTTP_REQUEST_HOST=example.com",
                "0:http.HTTP_RESPONSE_STATUS_CODE=301",
                "1:vlan.VLAN_ID=100",
            ]
        );
    }

    #[test]
    fn second_request_is_reported() {
        let probe = Probe::from_config(&config("fields: 'http'", None)).unwrap();
        let mut flow = FlowRecord::new();
        let request = Packet::new(IPPROTO_TCP, b"GET / HTTP/1.1\r\n\r\n");
        assert_eq!(probe.process_packet(&mut flow, &request), FlowAction::Continue);
        assert_eq!(
            probe.process_packet(&mut flow, &request),
            FlowAction::FlushAndReinsert
        );
        assert_eq!(flow.packets(), 1);
    }

    #[test]
    fn unknown_plugin_in_interface_map() {
        let ret = Probe::from_config(&config("fields: 'http'", Some("http,dns")));
        let err = ret.err().unwrap();
        assert_eq!(err.to_string(), "invalid output configuration");
        assert!(format!("{err:#}").contains("'dns'"));
    }

    #[test]
    fn unknown_field_in_selection() {
        assert!(Probe::from_config(&config("fields: 'quic.QUIC_BOGUS'", None)).is_err());
    }

    #[test]
    #[traced_test]
    fn selected_but_disabled_plugin() {
        let mut config = config("fields: 'quic'", None);
        config.plugins = PluginsConfig::new(vec![Protocol::Mqtt], MqttOptions::default());
        let probe = Probe::from_config(&config).unwrap();
        assert_eq!(probe.plugins().len(), 1);
        assert!(logs_contain("fields are selected for a plugin that is not enabled"));

        let mut flow = FlowRecord::new();
        probe.process_packet(&mut flow, &Packet::new(IPPROTO_UDP, &[0xc0; 32]));
        let mut count = 0;
        probe.export(&flow, |_, _, _| count += 1);
        assert_eq!(count, 0);
    }
}
