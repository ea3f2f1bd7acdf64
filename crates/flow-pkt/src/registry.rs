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

//! Registry of the fields every protocol plugin exports.
//!
//! A protocol declares its fields as an enum implementing [`FieldIndex`] and
//! a getter table with exactly one entry per variant. The [`FieldManager`]
//! collects the declared fields of all registered protocols and serves them
//! by `(plugin, field)` name.

use crate::{
    http::HttpContext, icmp::IcmpContext, mpls::MplsContext, mqtt::MqttContext,
    quic::QuicContext, vlan::VlanContext, FieldValue, Protocol, ProtocolContext,
};
use flowprobe_output_config::{FieldCatalog, FieldDescriptor};
use std::collections::{BTreeMap, HashMap};
use strum::IntoEnumIterator;

/// Reads one field from a context. `None` marks a field that was never
/// observed on the flow.
pub type Getter<C> = for<'c> fn(&'c C) -> Option<FieldValue<'c>>;

type ErasedGetter = for<'c> fn(&'c ProtocolContext, usize) -> Option<FieldValue<'c>>;

/// Field enumeration of one protocol. Variants are numbered from zero in
/// declaration order and the static string is the exported field name.
pub trait FieldIndex: Copy + Eq + IntoEnumIterator + Into<&'static str> + 'static {
    fn index(self) -> usize;

    fn name(self) -> &'static str {
        self.into()
    }
}

/// Implemented by every protocol context type.
pub trait ProtocolFields: Sized + 'static {
    const PROTOCOL: Protocol;

    type Field: FieldIndex;

    /// One getter per [`Self::Field`] variant, indexed by
    /// [`FieldIndex::index`].
    const GETTERS: &'static [Getter<Self>];

    fn from_context(context: &ProtocolContext) -> Option<&Self>;

    fn from_context_mut(context: &mut ProtocolContext) -> Option<&mut Self>;

    fn get(&self, field: Self::Field) -> Option<FieldValue<'_>> {
        Self::GETTERS
            .get(field.index())
            .and_then(|getter| getter(self))
    }
}

fn erased_get<C: ProtocolFields>(context: &ProtocolContext, index: usize) -> Option<FieldValue<'_>> {
    let typed = C::from_context(context)?;
    C::GETTERS.get(index).and_then(|getter| getter(typed))
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Plugin '{0}' is already registered.")]
    DuplicatePlugin(Protocol),
}

/// A field of a registered protocol together with the means to read it from
/// a type erased [`ProtocolContext`].
#[derive(Clone)]
pub struct RegisteredField {
    descriptor: FieldDescriptor,
    protocol: Protocol,
    index: usize,
    getter: ErasedGetter,
}

impl RegisteredField {
    pub const fn descriptor(&self) -> &FieldDescriptor {
        &self.descriptor
    }

    pub const fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub const fn index(&self) -> usize {
        self.index
    }

    /// Reads the field from `context`. Contexts of another protocol yield
    /// `None`.
    pub fn get<'c>(&self, context: &'c ProtocolContext) -> Option<FieldValue<'c>> {
        if context.protocol() != self.protocol {
            return None;
        }
        (self.getter)(context, self.index)
    }
}

impl std::fmt::Debug for RegisteredField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredField")
            .field("descriptor", &self.descriptor)
            .field("protocol", &self.protocol)
            .field("index", &self.index)
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct FieldManager {
    fields: Vec<RegisteredField>,
    by_descriptor: HashMap<FieldDescriptor, usize>,
    plugins: BTreeMap<Protocol, Vec<usize>>,
}

impl FieldManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Manager with the fields of every built-in protocol.
    pub fn with_builtin_plugins() -> Self {
        let mut manager = Self::new();
        manager.insert::<VlanContext>();
        manager.insert::<MplsContext>();
        manager.insert::<IcmpContext>();
        manager.insert::<QuicContext>();
        manager.insert::<MqttContext>();
        manager.insert::<HttpContext>();
        manager
    }

    pub fn register<C: ProtocolFields>(&mut self) -> Result<(), RegistryError> {
        if self.plugins.contains_key(&C::PROTOCOL) {
            return Err(RegistryError::DuplicatePlugin(C::PROTOCOL));
        }
        self.insert::<C>();
        Ok(())
    }

    fn insert<C: ProtocolFields>(&mut self) {
        let mut positions = Vec::new();
        for field in C::Field::iter() {
            let descriptor = FieldDescriptor::new(C::PROTOCOL.name(), field.name());
            let position = self.fields.len();
            self.by_descriptor.insert(descriptor.clone(), position);
            self.fields.push(RegisteredField {
                descriptor,
                protocol: C::PROTOCOL,
                index: field.index(),
                getter: erased_get::<C>,
            });
            positions.push(position);
        }
        tracing::debug!(
            plugin = C::PROTOCOL.name(),
            fields = positions.len(),
            "registered plugin fields"
        );
        self.plugins.insert(C::PROTOCOL, positions);
    }

    pub fn field(&self, descriptor: &FieldDescriptor) -> Option<&RegisteredField> {
        self.by_descriptor
            .get(descriptor)
            .and_then(|position| self.fields.get(*position))
    }

    pub fn fields(&self) -> &[RegisteredField] {
        &self.fields
    }

    /// Fields of `protocol` in declaration order.
    pub fn fields_of(&self, protocol: Protocol) -> impl Iterator<Item = &RegisteredField> {
        self.plugins
            .get(&protocol)
            .into_iter()
            .flatten()
            .filter_map(|position| self.fields.get(*position))
    }

    pub fn protocols(&self) -> impl Iterator<Item = Protocol> + '_ {
        self.plugins.keys().copied()
    }

    pub fn plugin_names(&self) -> Vec<&'static str> {
        self.protocols().map(Protocol::name).collect()
    }
}

impl FieldCatalog for FieldManager {
    fn plugin_fields(&self, plugin: &str) -> Option<Vec<FieldDescriptor>> {
        let protocol = plugin.parse::<Protocol>().ok()?;
        let positions = self.plugins.get(&protocol)?;
        Some(
            positions
                .iter()
                .filter_map(|position| self.fields.get(*position))
                .map(|field| field.descriptor.clone())
                .collect(),
        )
    }

    fn all_fields(&self) -> Vec<FieldDescriptor> {
        self.fields
            .iter()
            .map(|field| field.descriptor.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{icmp::IcmpField, quic::QuicField, vlan::VlanField};
    use flowprobe_output_config::FieldSelection;

    #[test]
    fn builtin_plugins_are_registered_in_order() {
        let manager = FieldManager::with_builtin_plugins();
        assert_eq!(
            manager.plugin_names(),
            vec!["vlan", "mpls", "icmp", "quic", "mqtt", "http"]
        );
        let quic: Vec<_> = manager
            .fields_of(Protocol::Quic)
            .map(|field| field.descriptor().field().to_string())
            .collect();
        assert_eq!(quic.first().map(String::as_str), Some("QUIC_VERSION"));
        for (index, field) in manager.fields_of(Protocol::Quic).enumerate() {
            assert_eq!(field.index(), index);
        }
    }

    #[test]
    fn register_twice_fails() {
        let mut manager = FieldManager::new();
        assert_eq!(manager.register::<VlanContext>(), Ok(()));
        assert_eq!(
            manager.register::<VlanContext>(),
            Err(RegistryError::DuplicatePlugin(Protocol::Vlan))
        );
        assert_eq!(manager.fields().len(), 1);
    }

    #[test]
    fn lookup_by_descriptor() {
        let manager = FieldManager::with_builtin_plugins();
        let field = manager
            .field(&FieldDescriptor::new("icmp", "L4_ICMP_TYPE_CODE"))
            .unwrap();
        assert_eq!(field.protocol(), Protocol::Icmp);
        assert_eq!(field.index(), IcmpField::L4IcmpTypeCode.index());
        assert!(manager
            .field(&FieldDescriptor::new("icmp", "VLAN_ID"))
            .is_none());
    }

    #[test]
    fn erased_getter_checks_the_tag() {
        let manager = FieldManager::with_builtin_plugins();
        let vlan_id = manager
            .field(&FieldDescriptor::new("vlan", VlanField::VlanId.name()))
            .unwrap();
        let vlan = ProtocolContext::from(VlanContext::new(0x2064));
        let icmp = ProtocolContext::from(IcmpContext::new(8, 0));
        assert_eq!(vlan_id.get(&vlan), Some(FieldValue::U16(0x064)));
        assert_eq!(vlan_id.get(&icmp), None);
    }

    #[test]
    fn catalog_drives_selection() {
        let manager = FieldManager::with_builtin_plugins();
        let selection =
            FieldSelection::parse("fields: 'quic, -quic.QUIC_ZERO_RTT'", &manager).unwrap();
        assert_eq!(selection.len(), QuicField::iter().count() - 1);
        assert!(!selection.contains(&FieldDescriptor::new("quic", "QUIC_ZERO_RTT")));
        assert!(manager.plugin_fields("dns").is_none());
        assert_eq!(manager.all_fields().len(), manager.fields().len());
    }
}
