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

// Edge store-and-forward bridge for sensor measurements
//
// Measurements published on the local MQTT broker are forwarded to a remote
// broker and logged to a per-month SQLite store with the forwarding outcome.
// Records the remote side never confirmed are resent on a schedule or on
// request until they are acknowledged.

pub mod bridge;
pub mod config;
pub mod control;
pub mod engine;
pub mod ingest;
pub mod protocol;
pub mod resend;
pub mod storage;

// Re-export main types
pub use bridge::{BrokerBridge, ConnectionState, MessageHandler, Origin, PublishError, Publisher};
pub use config::{load_config, load_config_with_user, SyncConfig};
pub use control::ControlInterface;
pub use engine::{DataSync, SyncHandler};
pub use ingest::{IngestOutcome, Ingestor};
pub use protocol::{
    MeasurementClass, PollutantDataMsgPack, RawDataMsgPack, ResendRequest, ResendResponse,
};
pub use resend::{ResendEngine, ResendError, ResendSummary};
pub use storage::{DurableStore, StorageError, StoreSettings};
