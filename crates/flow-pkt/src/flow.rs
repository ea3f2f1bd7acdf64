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

//! Per flow storage of protocol contexts and the packet dispatch loop.

use crate::{
    plugin::{BeforeUpdateResult, OnInitResult, OnUpdateResult, ProcessPlugin},
    FieldManager, FieldValue, Packet, Protocol, ProtocolContext, ProtocolFields,
};
use flowprobe_output_config::{FieldDescriptor, FieldSelection};
use strum::EnumCount;

/// What the flow cache should do with a flow after a packet was processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlowAction {
    #[default]
    Continue,
    /// Export the flow and remove it from the cache.
    Flush,
    /// Export the flow without the current packet, then process the packet
    /// again on a fresh record.
    FlushAndReinsert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum PluginState {
    #[default]
    Pending,
    Active,
    Finished,
    Ignored,
}

#[derive(Debug, Clone, Default)]
pub struct FlowRecord {
    contexts: [Option<ProtocolContext>; Protocol::COUNT],
    states: [PluginState; Protocol::COUNT],
    packets: u64,
}

impl FlowRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub const fn packets(&self) -> u64 {
        self.packets
    }

    /// Store `context` in the slot of its protocol. An existing context of
    /// the same protocol is replaced.
    pub fn attach(&mut self, context: ProtocolContext) {
        let protocol = context.protocol();
        let slot = &mut self.contexts[protocol.index()];
        if slot.is_some() {
            tracing::warn!(plugin = protocol.name(), "replacing existing protocol context");
        }
        *slot = Some(context);
    }

    pub fn detach(&mut self, protocol: Protocol) -> Option<ProtocolContext> {
        self.contexts[protocol.index()].take()
    }

    pub fn context(&self, protocol: Protocol) -> Option<&ProtocolContext> {
        self.contexts[protocol.index()].as_ref()
    }

    /// Typed access to the context of protocol `C`.
    pub fn context_of<C: ProtocolFields>(&self) -> Option<&C> {
        self.context(C::PROTOCOL).and_then(C::from_context)
    }

    pub fn contexts(&self) -> impl Iterator<Item = &ProtocolContext> {
        self.contexts.iter().flatten()
    }

    /// Run `packet` through `plugins`.
    ///
    /// A plugin is offered packets through `on_init` until it constructs a
    /// context or declares the flow irrelevant, then through `on_update`
    /// until its context is final or removed.
    pub fn process_packet(
        &mut self,
        plugins: &[Box<dyn ProcessPlugin>],
        packet: &Packet<'_>,
    ) -> FlowAction {
        for plugin in plugins {
            let slot = plugin.protocol().index();
            if self.states[slot] != PluginState::Active {
                continue;
            }
            if let Some(context) = &self.contexts[slot] {
                if plugin.before_update(packet, context) == BeforeUpdateResult::FlushFlowAndReinsert
                {
                    tracing::debug!(plugin = plugin.name(), "flushing flow before update");
                    return FlowAction::FlushAndReinsert;
                }
            }
        }

        self.packets += 1;
        let mut action = FlowAction::Continue;
        for plugin in plugins {
            let protocol = plugin.protocol();
            let slot = protocol.index();
            match self.states[slot] {
                PluginState::Pending => self.init_plugin(plugin.as_ref(), packet),
                PluginState::Active => {
                    let Some(context) = self.contexts[slot].as_mut() else {
                        self.states[slot] = PluginState::Ignored;
                        continue;
                    };
                    match plugin.on_update(packet, context) {
                        OnUpdateResult::NeedsUpdate => {}
                        OnUpdateResult::Final => self.states[slot] = PluginState::Finished,
                        OnUpdateResult::Remove => {
                            self.contexts[slot] = None;
                            self.states[slot] = PluginState::Ignored;
                        }
                        OnUpdateResult::FlushFlow => action = FlowAction::Flush,
                    }
                }
                PluginState::Finished | PluginState::Ignored => {}
            }
        }
        action
    }

    fn init_plugin(&mut self, plugin: &dyn ProcessPlugin, packet: &Packet<'_>) {
        let protocol = plugin.protocol();
        let (context, state) = match plugin.on_init(packet) {
            OnInitResult::ConstructedNeedsUpdate(context) => (context, PluginState::Active),
            OnInitResult::ConstructedFinal(context) => (context, PluginState::Finished),
            OnInitResult::PendingConstruction => return,
            OnInitResult::Irrelevant => {
                self.states[protocol.index()] = PluginState::Ignored;
                return;
            }
        };
        if context.protocol() != protocol {
            tracing::warn!(
                plugin = protocol.name(),
                context = context.protocol().name(),
                "plugin constructed a context of another protocol"
            );
            self.states[protocol.index()] = PluginState::Ignored;
            return;
        }
        self.attach(context);
        self.states[protocol.index()] = state;
    }

    /// Deliver `(plugin, field, value)` for every selected field that has a
    /// value on this flow, in selection order.
    pub fn for_each_selected_field<F>(
        &self,
        manager: &FieldManager,
        selection: &FieldSelection,
        mut f: F,
    ) where
        F: FnMut(&str, &str, FieldValue<'_>),
    {
        self.for_each_field(manager, selection, |descriptor, value| {
            f(descriptor.plugin(), descriptor.field(), value)
        });
    }

    /// Hand every field in `fields` that has a value on this flow to `f`.
    /// Fields of protocols without a context and unknown fields are skipped.
    pub fn for_each_field<'d, I, F>(&self, manager: &FieldManager, fields: I, mut f: F)
    where
        I: IntoIterator<Item = &'d FieldDescriptor>,
        F: FnMut(&'d FieldDescriptor, FieldValue<'_>),
    {
        for descriptor in fields {
            let Some(field) = manager.field(descriptor) else {
                continue;
            };
            let Some(context) = self.context(field.protocol()) else {
                continue;
            };
            if let Some(value) = field.get(context) {
                f(descriptor, value);
            }
        }
    }
}
