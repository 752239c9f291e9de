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

// Ingestion path: forward each measurement once, then log it with the outcome

use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::bridge::{Publisher, RemoteLinkState, TopicSet};
use crate::config::ServerConfig;
use crate::protocol::MeasurementClass;
use crate::storage::DurableStore;

/// What happened to one measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IngestOutcome {
    /// The remote broker confirmed the immediate forward
    pub forwarded: bool,
    /// Id of the stored record, when it was logged
    pub stored: Option<i64>,
}

pub struct Ingestor {
    server: ServerConfig,
    topics: TopicSet,
    store: Arc<DurableStore>,
    remote: Arc<dyn Publisher>,
    link: RemoteLinkState,
}

impl Ingestor {
    pub fn new(
        server: ServerConfig,
        topics: TopicSet,
        store: Arc<DurableStore>,
        remote: Arc<dyn Publisher>,
        link: RemoteLinkState,
    ) -> Self {
        Self {
            server,
            topics,
            store,
            remote,
            link,
        }
    }

    /// Handle one measurement from the local broker
    ///
    /// Forward failures are not retried here; an unacknowledged record is
    /// picked up by the next resend.
    pub async fn ingest(&self, class: MeasurementClass, payload: Bytes) -> IngestOutcome {
        let mut outcome = IngestOutcome::default();

        if self.server.forwarding_enabled(class) {
            outcome.forwarded = self.forward(class, payload.clone()).await;
        }

        if !self.server.logging_enabled(class) {
            if !outcome.forwarded {
                debug!("Dropping {} measurement: not forwarded and logging disabled", class);
            }
            return outcome;
        }

        let timestamp = match class.decode_timestamp(&payload) {
            Ok(ts) => ts,
            Err(e) => {
                error!("Unable to decode {} measurement, not storing: {}", class, e);
                return outcome;
            }
        };

        match self
            .store
            .append(class, timestamp, &payload, outcome.forwarded)
            .await
        {
            Ok(id) => {
                debug!(
                    "Stored {} record {} (ts {}, acknowledged {})",
                    class, id, timestamp, outcome.forwarded
                );
                outcome.stored = Some(id);
            }
            Err(e) => error!("Unable to store {} data into database: {}", class, e),
        }

        outcome
    }

    async fn forward(&self, class: MeasurementClass, payload: Bytes) -> bool {
        let topic = self.topics.measurement(class);
        if !self.link.is_connected() {
            debug!("Remote link down, {} measurement left for resend", class);
            return false;
        }

        match self.remote.publish(topic, payload).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to forward {} measurement to {}: {}", class, topic, e);
                false
            }
        }
    }
}
