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

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use flowprobe_flow_pkt::{
    packet::{Direction, IPPROTO_TCP},
    plugin::PluginsConfig,
    FieldManager, FlowRecord, Packet,
};
use flowprobe_output_config::FieldSelection;
use std::hint::black_box;

const REQUEST: &[u8] = b"GET /index.html HTTP/1.1\r\n\
    Host: example.com\r\n\
    User-Agent: curl/8.5.0\r\n\
    \r\n";

const RESPONSE: &[u8] = b"HTTP/1.1 200 OK\r\n\
    Content-Type: text/html\r\n\
    Server: nginx\r\n\
    Set-Cookie: id=a3fWa; Max-Age=2592000\r\n\
    \r\n";

fn process_packet(c: &mut Criterion) {
    let plugins = PluginsConfig::default().build();
    let request = Packet::new(IPPROTO_TCP, REQUEST)
        .with_ports(51000, 80)
        .with_vlan_tci(0x0064);
    let response = Packet::new(IPPROTO_TCP, RESPONSE)
        .with_ports(80, 51000)
        .with_vlan_tci(0x0064)
        .with_direction(Direction::ServerToClient);

    c.bench_function("http flow", |b| {
        b.iter_batched(
            FlowRecord::new,
            |mut flow| {
                flow.process_packet(&plugins, black_box(&request));
                flow.process_packet(&plugins, black_box(&response));
                flow
            },
            BatchSize::SmallInput,
        )
    });

    let manager = FieldManager::with_builtin_plugins();
    let selection = FieldSelection::all(&manager);
    let mut flow = FlowRecord::new();
    flow.process_packet(&plugins, &request);
    flow.process_packet(&plugins, &response);
    c.bench_function("export all fields", |b| {
        b.iter(|| {
            let mut exported = 0usize;
            flow.for_each_selected_field(&manager, &selection, |_, _, value| {
                exported += black_box(value).len();
            });
            exported
        })
    });
}

criterion_group!(benches, process_packet);
criterion_main!(benches);
