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

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;

use crate::protocol::MeasurementClass;

/// Broker session a message arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Local,
    Remote,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Local => f.write_str("local"),
            Origin::Remote => f.write_str("remote"),
        }
    }
}

/// Receiver of messages the bridge pulls off its subscriptions
///
/// Each call runs on its own task; calls for different messages overlap.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn on_measurement(&self, class: MeasurementClass, payload: Bytes);

    async fn on_resend_request(
        &self,
        class: MeasurementClass,
        origin: Origin,
        topic: String,
        payload: Bytes,
    );
}
