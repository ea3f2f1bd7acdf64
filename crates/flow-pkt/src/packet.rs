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

//! Already dissected packet as seen by the protocol plugins.

use flowprobe_parse_utils::Span;
use serde::{Deserialize, Serialize};
use strum_macros::Display;

pub const IPPROTO_ICMP: u8 = 1;
pub const IPPROTO_TCP: u8 = 6;
pub const IPPROTO_UDP: u8 = 17;
pub const IPPROTO_ICMPV6: u8 = 58;

/// Direction of a packet relative to the flow initiator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    ClientToServer,
    ServerToClient,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Packet<'a> {
    vlan_tci: Option<u16>,
    mpls_label_stack: Span<'a>,
    ip_protocol: u8,
    src_port: u16,
    dst_port: u16,
    direction: Direction,
    payload: Span<'a>,
}

impl<'a> Packet<'a> {
    pub const fn new(ip_protocol: u8, payload: &'a [u8]) -> Self {
        Self {
            vlan_tci: None,
            mpls_label_stack: Span::new(&[]),
            ip_protocol,
            src_port: 0,
            dst_port: 0,
            direction: Direction::ClientToServer,
            payload: Span::new(payload),
        }
    }

    pub const fn with_ports(mut self, src_port: u16, dst_port: u16) -> Self {
        self.src_port = src_port;
        self.dst_port = dst_port;
        self
    }

    pub const fn with_vlan_tci(mut self, tci: u16) -> Self {
        self.vlan_tci = Some(tci);
        self
    }

    /// Raw label stack entries, four bytes each, top of the stack first.
    pub const fn with_mpls_label_stack(mut self, stack: &'a [u8]) -> Self {
        self.mpls_label_stack = Span::new(stack);
        self
    }

    pub const fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub const fn vlan_tci(&self) -> Option<u16> {
        self.vlan_tci
    }

    pub const fn mpls_label_stack(&self) -> Span<'a> {
        self.mpls_label_stack
    }

    pub const fn ip_protocol(&self) -> u8 {
        self.ip_protocol
    }

    pub const fn src_port(&self) -> u16 {
        self.src_port
    }

    pub const fn dst_port(&self) -> u16 {
        self.dst_port
    }

    pub const fn direction(&self) -> Direction {
        self.direction
    }

    pub const fn payload(&self) -> Span<'a> {
        self.payload
    }

    pub const fn is_tcp(&self) -> bool {
        self.ip_protocol == IPPROTO_TCP
    }

    pub const fn is_udp(&self) -> bool {
        self.ip_protocol == IPPROTO_UDP
    }

    /// Port of the flow responder.
    pub const fn server_port(&self) -> u16 {
        match self.direction {
            Direction::ClientToServer => self.dst_port,
            Direction::ServerToClient => self.src_port,
        }
    }
}
