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

// Broker bridge
//
// Two MQTT sessions: the local broker supplies measurements and resend
// requests, the remote broker receives forwarded measurements and may also
// send resend requests. Subscriptions are wired here and dispatched through
// `MessageHandler`.

pub mod handler;
pub mod link;
pub mod publisher;
pub mod runner;
pub mod session;
pub mod topics;

pub use handler::{MessageHandler, Origin};
pub use link::{ConnectionState, LinkStateWriter, RemoteLinkState};
pub use publisher::{PublishError, Publisher};
pub use runner::{BridgeRunners, BrokerBridge};
pub use session::{AckTracker, MqttSession};
pub use topics::{substitute_device, TopicRole, TopicSet};
