// Copyright 2025 coScene
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Configuration loader with environment variable substitution

use super::types::*;
use anyhow::{bail, Context, Result};
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

/// One year
const MAX_RESENDING_INTERVAL_MINUTES: u64 = 365 * 24 * 60;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load the base configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<SyncConfig> {
        let config: SyncConfig = Self::parse_file(path.as_ref())?;
        Self::validate(&config)?;
        Ok(config)
    }

    /// Load a user override file
    pub fn load_user<P: AsRef<Path>>(path: P) -> Result<UserConfig> {
        Self::parse_file(path.as_ref())
    }

    fn parse_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let content = Self::substitute_env_vars(&content);

        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML configuration {}", path.display()))
    }

    /// Substitute ${VAR} and ${VAR:-default} patterns with environment variables
    ///
    /// Examples:
    /// - ${HOME} -> /home/user
    /// - ${DEVICE_ID:-AirSENCE-001} -> AirSENCE-001 (if DEVICE_ID not set)
    pub(crate) fn substitute_env_vars(content: &str) -> String {
        static PATTERN: OnceLock<Regex> = OnceLock::new();
        let re = PATTERN.get_or_init(|| {
            Regex::new(r"\$\{([^}:]+)(?::-([^}]+))?\}").expect("static pattern is valid")
        });

        re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default_value = caps.get(2).map(|m| m.as_str());

            match std::env::var(var_name) {
                Ok(value) => value,
                Err(_) => match default_value {
                    Some(default) => default.to_string(),
                    // Keep original if no default and var not found
                    None => format!("${{{}}}", var_name),
                },
            }
        })
        .to_string()
    }

    /// Validate configuration
    pub fn validate(config: &SyncConfig) -> Result<()> {
        if config.mqtt.client_id.is_empty() {
            bail!("mqtt.client_id cannot be empty");
        }

        if config.mqtt.qos > 2 {
            bail!("mqtt.qos must be 0, 1 or 2");
        }

        if config.mqtt.resending_interval_minutes == 0 {
            bail!("mqtt.resending_interval_minutes must be > 0");
        }

        if config.mqtt.resending_interval_minutes > MAX_RESENDING_INTERVAL_MINUTES {
            bail!(
                "mqtt.resending_interval_minutes must be at most {}",
                MAX_RESENDING_INTERVAL_MINUTES
            );
        }

        if config.mqtt.publish_timeout_seconds == 0 {
            bail!("mqtt.publish_timeout_seconds must be > 0");
        }

        if config.server.clock_retry_seconds == 0 {
            bail!("server.clock_retry_seconds must be > 0");
        }

        if config.server.storage_retry_seconds == 0 {
            bail!("server.storage_retry_seconds must be > 0");
        }

        for (name, template) in [
            ("raw_topic", &config.mqtt.raw_topic),
            ("pollutant_topic", &config.mqtt.pollutant_topic),
            ("resend_raw_topic", &config.mqtt.resend_raw_topic),
            ("resend_pollutant_topic", &config.mqtt.resend_pollutant_topic),
        ] {
            if template.is_empty() {
                bail!("mqtt.{} cannot be empty", name);
            }
        }

        if config.server.main_folder.is_empty() {
            bail!("server.main_folder cannot be empty");
        }

        match config.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            unknown => bail!("Unknown log level: '{}'", unknown),
        }

        match config.logging.format.as_str() {
            "text" | "json" => {}
            unknown => bail!("Unknown log format: '{}'. Supported: text, json", unknown),
        }

        Ok(())
    }
}
