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

use figment::{
    providers::{Env, Format, Yaml},
    Figment,
};
use flowprobe_flow_pkt::plugin::PluginsConfig;
use flowprobe_output_config::OutputConfig;
use std::path::Path;

/// Prefix of the environment variables overriding the configuration file.
/// Nested keys are separated by `__`, e.g. `FLOWPROBE_LOGGING__LEVEL=debug`.
pub const ENV_PREFIX: &str = "FLOWPROBE_";

const ENV_KEY_SEPARATOR: &str = "__";

#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CollectorConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub plugins: PluginsConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl CollectorConfig {
    /// Read the YAML file at `path`, then apply the environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, figment::Error> {
        Self::figment(path).extract()
    }

    pub fn figment(path: impl AsRef<Path>) -> Figment {
        Figment::new()
            .merge(Yaml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split(ENV_KEY_SEPARATOR))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
