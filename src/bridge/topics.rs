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

use crate::config::MqttConfig;
use crate::protocol::MeasurementClass;

/// Replace the first `+` placeholder in a template with the device id
pub fn substitute_device(template: &str, device_id: &str) -> String {
    template.replacen('+', device_id, 1)
}

/// What an incoming message on a subscribed topic is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicRole {
    Measurement(MeasurementClass),
    ResendRequest(MeasurementClass),
}

/// Concrete topics for one device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSet {
    pub raw: String,
    pub pollutant: String,
    pub resend_raw: String,
    pub resend_pollutant: String,
    pub will: String,
    pub will_payload: String,
}

impl TopicSet {
    pub fn from_config(config: &MqttConfig) -> Self {
        let id = config.client_id.as_str();
        Self {
            raw: substitute_device(&config.raw_topic, id),
            pollutant: substitute_device(&config.pollutant_topic, id),
            resend_raw: substitute_device(&config.resend_raw_topic, id),
            resend_pollutant: substitute_device(&config.resend_pollutant_topic, id),
            will: substitute_device(&config.will_topic, id),
            will_payload: substitute_device(&config.will_payload, id),
        }
    }

    /// Topic measurements of a class are forwarded on
    pub fn measurement(&self, class: MeasurementClass) -> &str {
        match class {
            MeasurementClass::Raw => &self.raw,
            MeasurementClass::Pollutant => &self.pollutant,
        }
    }

    pub fn resend_request(&self, class: MeasurementClass) -> &str {
        match class {
            MeasurementClass::Raw => &self.resend_raw,
            MeasurementClass::Pollutant => &self.resend_pollutant,
        }
    }

    /// Topics the local session subscribes to on every connect
    pub fn local_subscriptions(&self) -> Vec<(&str, TopicRole)> {
        vec![
            (self.pollutant.as_str(), TopicRole::Measurement(MeasurementClass::Pollutant)),
            (self.raw.as_str(), TopicRole::Measurement(MeasurementClass::Raw)),
            (
                self.resend_pollutant.as_str(),
                TopicRole::ResendRequest(MeasurementClass::Pollutant),
            ),
            (self.resend_raw.as_str(), TopicRole::ResendRequest(MeasurementClass::Raw)),
        ]
    }

    /// Topics the remote session subscribes to on every connect
    pub fn remote_subscriptions(&self) -> Vec<(&str, TopicRole)> {
        vec![
            (self.resend_raw.as_str(), TopicRole::ResendRequest(MeasurementClass::Raw)),
            (
                self.resend_pollutant.as_str(),
                TopicRole::ResendRequest(MeasurementClass::Pollutant),
            ),
        ]
    }

    /// Classify an incoming topic against a subscription list
    pub fn classify(subscriptions: &[(&str, TopicRole)], topic: &str) -> Option<TopicRole> {
        subscriptions
            .iter()
            .find(|(t, _)| *t == topic)
            .map(|(_, role)| *role)
    }
}
