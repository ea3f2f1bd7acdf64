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


use anyhow::Context;
use flowprobe_collector::{config::CollectorConfig, Probe};
use std::{env, path::PathBuf, str::FromStr};
use tracing::{info, Level};

fn init_tracing(level: &str) -> anyhow::Result<()> {
    let level = Level::from_str(level).with_context(|| format!("invalid logging level `{level}`"))?;
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;
    Ok(())
}

/// Load and validate a probe configuration, then report the resolved
/// plugins and output interfaces.
fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        anyhow::bail!("Usage: {} <config-file>", args[0]);
    }
    let config_file = PathBuf::from(&args[1]);
    if !config_file.is_file() {
        anyhow::bail!("Config file {} does not exist", config_file.display());
    }
    let config = CollectorConfig::load(&config_file).context("Parsing config file failed")?;
    init_tracing(&config.logging.level)?;

    let probe = Probe::from_config(&config)?;
    for interface in probe.layout().interfaces() {
        for field in interface.fields() {
            info!(interface = interface.index(), field = %field, "exported field");
        }
    }
    info!(
        config = %config_file.display(),
        fields = probe.manager().fields().len(),
        "configuration is valid"
    );
    Ok(())
}
