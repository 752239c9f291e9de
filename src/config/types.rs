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

// Configuration types for edge-datasync

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::protocol::MeasurementClass;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub recovery: RecoveryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl SyncConfig {
    /// Apply the fields present in a user override file
    pub fn merge_user(&mut self, user: UserConfig) {
        let server = user.server;
        if let Some(v) = server.log_raw {
            self.server.log_raw = v;
        }
        if let Some(v) = server.log_pollutant {
            self.server.log_pollutant = v;
        }
        if let Some(v) = server.send_raw_data {
            self.server.send_raw_data = v;
        }
        if let Some(v) = server.send_pollutant_data {
            self.server.send_pollutant_data = v;
        }
        if let Some(v) = server.wait_time_seconds {
            self.server.wait_time_seconds = v;
        }

        let mqtt = user.mqtt;
        if let Some(v) = mqtt.client_id {
            self.mqtt.client_id = v;
        }
        if let Some(v) = mqtt.qos {
            self.mqtt.qos = v;
        }
        if let Some(v) = mqtt.will_topic {
            self.mqtt.will_topic = v;
        }
        if let Some(v) = mqtt.will_payload {
            self.mqtt.will_payload = v;
        }
        if let Some(v) = mqtt.raw_topic {
            self.mqtt.raw_topic = v;
        }
        if let Some(v) = mqtt.pollutant_topic {
            self.mqtt.pollutant_topic = v;
        }
        if let Some(v) = mqtt.resend_raw_topic {
            self.mqtt.resend_raw_topic = v;
        }
        if let Some(v) = mqtt.resend_pollutant_topic {
            self.mqtt.resend_pollutant_topic = v;
        }
        if let Some(v) = mqtt.resending_interval_minutes {
            self.mqtt.resending_interval_minutes = v;
        }
    }
}

/// Engine behaviour and storage location
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Directory holding the per-month store files
    #[serde(default = "default_main_folder")]
    pub main_folder: String,

    #[serde(default = "default_true")]
    pub log_raw: bool,
    #[serde(default = "default_true")]
    pub log_pollutant: bool,
    #[serde(default = "default_true")]
    pub send_raw_data: bool,
    #[serde(default = "default_true")]
    pub send_pollutant_data: bool,

    /// Delay before the engine starts, in seconds
    #[serde(default)]
    pub wait_time_seconds: u64,

    /// Store files are not opened before the wall clock reaches this instant
    #[serde(default = "default_clock_milestone")]
    pub clock_milestone: DateTime<Utc>,

    #[serde(default = "default_clock_retry")]
    pub clock_retry_seconds: u64,

    #[serde(default = "default_storage_retry")]
    pub storage_retry_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            main_folder: default_main_folder(),
            log_raw: true,
            log_pollutant: true,
            send_raw_data: true,
            send_pollutant_data: true,
            wait_time_seconds: 0,
            clock_milestone: default_clock_milestone(),
            clock_retry_seconds: default_clock_retry(),
            storage_retry_seconds: default_storage_retry(),
        }
    }
}

impl ServerConfig {
    pub fn forwarding_enabled(&self, class: MeasurementClass) -> bool {
        match class {
            MeasurementClass::Raw => self.send_raw_data,
            MeasurementClass::Pollutant => self.send_pollutant_data,
        }
    }

    pub fn logging_enabled(&self, class: MeasurementClass) -> bool {
        match class {
            MeasurementClass::Raw => self.log_raw,
            MeasurementClass::Pollutant => self.log_pollutant,
        }
    }

    pub fn clock_retry(&self) -> Duration {
        Duration::from_secs(self.clock_retry_seconds)
    }

    pub fn storage_retry(&self) -> Duration {
        Duration::from_secs(self.storage_retry_seconds)
    }
}

/// MQTT sessions and topic templates
///
/// Every topic template, the will topic and the will payload carry a `+`
/// placeholder that is replaced by `client_id`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MqttConfig {
    /// Device identity, also used to derive both MQTT client ids
    #[serde(default = "default_client_id")]
    pub client_id: String,

    #[serde(default = "default_qos")]
    pub qos: u8,

    #[serde(default)]
    pub local: LocalBrokerConfig,

    #[serde(default)]
    pub remote: RemoteBrokerConfig,

    #[serde(default = "default_will_topic")]
    pub will_topic: String,
    #[serde(default = "default_will_payload")]
    pub will_payload: String,

    #[serde(default = "default_raw_topic")]
    pub raw_topic: String,
    #[serde(default = "default_pollutant_topic")]
    pub pollutant_topic: String,
    #[serde(default = "default_resend_raw_topic")]
    pub resend_raw_topic: String,
    #[serde(default = "default_resend_pollutant_topic")]
    pub resend_pollutant_topic: String,

    #[serde(default = "default_resending_interval")]
    pub resending_interval_minutes: u64,

    #[serde(default = "default_publish_timeout")]
    pub publish_timeout_seconds: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            client_id: default_client_id(),
            qos: default_qos(),
            local: LocalBrokerConfig::default(),
            remote: RemoteBrokerConfig::default(),
            will_topic: default_will_topic(),
            will_payload: default_will_payload(),
            raw_topic: default_raw_topic(),
            pollutant_topic: default_pollutant_topic(),
            resend_raw_topic: default_resend_raw_topic(),
            resend_pollutant_topic: default_resend_pollutant_topic(),
            resending_interval_minutes: default_resending_interval(),
            publish_timeout_seconds: default_publish_timeout(),
        }
    }
}

impl MqttConfig {
    pub fn resending_interval(&self) -> Duration {
        Duration::from_secs(self.resending_interval_minutes.saturating_mul(60))
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_secs(self.publish_timeout_seconds)
    }

    /// Client id used on both brokers
    pub fn session_client_id(&self) -> String {
        format!("{}_DataSync", self.client_id)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LocalBrokerConfig {
    #[serde(default = "default_local_host")]
    pub host: String,
    #[serde(default = "default_local_port")]
    pub port: u16,
    #[serde(default = "default_keep_alive")]
    pub keep_alive_seconds: u64,
}

impl Default for LocalBrokerConfig {
    fn default() -> Self {
        Self {
            host: default_local_host(),
            port: default_local_port(),
            keep_alive_seconds: default_keep_alive(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RemoteBrokerConfig {
    /// Broker address, `mqtts://host:port`, `ssl://host:port` or `host:port`
    #[serde(default = "default_remote_server")]
    pub server: String,
    #[serde(default = "default_ca_file")]
    pub ca_file: String,
    #[serde(default = "default_cert_file")]
    pub cert_file: String,
    #[serde(default = "default_key_file")]
    pub key_file: String,
    #[serde(default = "default_keep_alive")]
    pub keep_alive_seconds: u64,
}

impl Default for RemoteBrokerConfig {
    fn default() -> Self {
        Self {
            server: default_remote_server(),
            ca_file: default_ca_file(),
            cert_file: default_cert_file(),
            key_file: default_key_file(),
            keep_alive_seconds: default_keep_alive(),
        }
    }
}

/// Out-of-band repair of the storage medium
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RecoveryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_repair_program")]
    pub program: String,
    #[serde(default = "default_repair_args")]
    pub args: Vec<String>,
    #[serde(default = "default_repair_device")]
    pub device: String,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            program: default_repair_program(),
            args: default_repair_args(),
            device: default_repair_device(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"

    #[serde(default = "default_log_format")]
    pub format: String, // "text", "json"
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// User-controlled overrides; only the fields present are applied
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct UserConfig {
    #[serde(default)]
    pub server: UserServerConfig,
    #[serde(default)]
    pub mqtt: UserMqttConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct UserServerConfig {
    pub log_raw: Option<bool>,
    pub log_pollutant: Option<bool>,
    pub send_raw_data: Option<bool>,
    pub send_pollutant_data: Option<bool>,
    pub wait_time_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct UserMqttConfig {
    pub client_id: Option<String>,
    pub qos: Option<u8>,
    pub will_topic: Option<String>,
    pub will_payload: Option<String>,
    pub raw_topic: Option<String>,
    pub pollutant_topic: Option<String>,
    pub resend_raw_topic: Option<String>,
    pub resend_pollutant_topic: Option<String>,
    pub resending_interval_minutes: Option<u64>,
}

// Default value functions
fn default_true() -> bool { true }
fn default_main_folder() -> String { "/mnt/mmcblk0p1".to_string() }
fn default_clock_milestone() -> DateTime<Utc> {
    DateTime::from_timestamp(1_617_235_200, 0).unwrap_or_default() // 2021-04-01T00:00:00Z
}
fn default_clock_retry() -> u64 { 15 }
fn default_storage_retry() -> u64 { 30 }
fn default_client_id() -> String { "AirSENCE-Dummy".to_string() }
fn default_qos() -> u8 { 1 }
fn default_will_topic() -> String { "airsence/AUG/+/status".to_string() }
fn default_will_payload() -> String { r#"{"DeviceID":"+","Online":false}"#.to_string() }
fn default_raw_topic() -> String { "airsence/AUG/+/raw".to_string() }
fn default_pollutant_topic() -> String { "airsence/AUG/+/pollutant".to_string() }
fn default_resend_raw_topic() -> String { "airsence/AUG/+/resend/raw".to_string() }
fn default_resend_pollutant_topic() -> String { "airsence/AUG/+/resend/pollutant".to_string() }
fn default_resending_interval() -> u64 { 10 }
fn default_publish_timeout() -> u64 { 5 }
fn default_local_host() -> String { "127.0.0.1".to_string() }
fn default_local_port() -> u16 { 1883 }
fn default_keep_alive() -> u64 { 60 }
fn default_remote_server() -> String { "mqtts://localhost:8883".to_string() }
fn default_ca_file() -> String { "certs/root-CA.crt".to_string() }
fn default_cert_file() -> String { "certs/device.pem.crt".to_string() }
fn default_key_file() -> String { "certs/private.pem.key".to_string() }
fn default_repair_program() -> String { "fsck.fat".to_string() }
fn default_repair_args() -> Vec<String> { vec!["-a".to_string()] }
fn default_repair_device() -> String { "/dev/mmcblk0p1".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "text".to_string() }
