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
use std::time::Duration;
use thiserror::Error;

/// Why a publish was not confirmed
///
/// Callers treat every variant the same way: the message was not confirmed
/// delivered and must stay eligible for resend.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Remote MQTT client not connected")]
    NotConnected,

    #[error("publish request rejected by client: {0}")]
    Rejected(String),

    #[error("broker connection dropped before confirmation")]
    ConnectionLost,

    #[error("no confirmation within {0:?}")]
    Timeout(Duration),
}

/// Publish capability of a broker session
///
/// `publish` returns only once the broker confirmed delivery at the session's
/// QoS, or fails after a bounded wait.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), PublishError>;
}
