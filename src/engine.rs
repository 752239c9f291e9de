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

// Engine lifecycle: wires store, bridge, ingestion and resend together

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

use crate::bridge::{BrokerBridge, MessageHandler, Origin, Publisher, TopicSet};
use crate::config::{ServerConfig, SyncConfig};
use crate::control::ControlInterface;
use crate::ingest::Ingestor;
use crate::protocol::MeasurementClass;
use crate::resend::ResendEngine;
use crate::storage::DurableStore;

/// Routes bridge messages to the ingestion path and the control interface
pub struct SyncHandler {
    ingestor: Arc<Ingestor>,
    control: Arc<ControlInterface>,
    local: Arc<dyn Publisher>,
    remote: Arc<dyn Publisher>,
}

impl SyncHandler {
    pub fn new(
        ingestor: Arc<Ingestor>,
        control: Arc<ControlInterface>,
        local: Arc<dyn Publisher>,
        remote: Arc<dyn Publisher>,
    ) -> Self {
        Self {
            ingestor,
            control,
            local,
            remote,
        }
    }
}

#[async_trait]
impl MessageHandler for SyncHandler {
    async fn on_measurement(&self, class: MeasurementClass, payload: Bytes) {
        self.ingestor.ingest(class, payload).await;
    }

    async fn on_resend_request(
        &self,
        class: MeasurementClass,
        origin: Origin,
        topic: String,
        payload: Bytes,
    ) {
        info!("Received {} resend request from {} broker on {}", class, origin, topic);
        let reply = match origin {
            Origin::Local => self.local.as_ref(),
            Origin::Remote => self.remote.as_ref(),
        };
        self.control.respond(class, &topic, &payload, reply).await;
    }
}

/// Classes the scheduled resend covers, pollutant first
pub fn scheduled_classes(server: &ServerConfig) -> Vec<MeasurementClass> {
    [MeasurementClass::Pollutant, MeasurementClass::Raw]
        .into_iter()
        .filter(|class| server.forwarding_enabled(*class))
        .collect()
}

/// The running bridge
pub struct DataSync {
    config: SyncConfig,
    store: Arc<DurableStore>,
    shutdown: CancellationToken,
}

impl DataSync {
    pub fn new(config: SyncConfig, store: Arc<DurableStore>, shutdown: CancellationToken) -> Self {
        Self {
            config,
            store,
            shutdown,
        }
    }

    /// Run until the shutdown token is cancelled
    ///
    /// Fails only on startup errors such as unreadable TLS credentials.
    pub async fn run(self) -> Result<()> {
        let topics = TopicSet::from_config(&self.config.mqtt);
        let (bridge, runners) = BrokerBridge::new(&self.config, &topics)?;
        let link = bridge.link();

        let ingestor = Arc::new(Ingestor::new(
            self.config.server.clone(),
            topics.clone(),
            Arc::clone(&self.store),
            bridge.remote(),
            link.clone(),
        ));
        let engine = Arc::new(ResendEngine::new(
            Arc::clone(&self.store),
            bridge.remote(),
            link.clone(),
            topics,
        ));
        let control = Arc::new(ControlInterface::new(Arc::clone(&engine)));
        let handler = Arc::new(SyncHandler::new(
            ingestor,
            control,
            bridge.local(),
            bridge.remote(),
        ));

        self.store.spawn_open();

        let tasks = TaskTracker::new();
        let (local_session, remote_session) = runners.spawn(handler, &tasks, &self.shutdown);

        let classes = scheduled_classes(&self.config.server);
        let mut ticker = tokio::time::interval(self.config.mqtt.resending_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        info!(
            "Data sync running, resending every {:?}",
            self.config.mqtt.resending_interval()
        );

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if link.is_connected() {
                        engine.resend_pending(&classes, Utc::now().timestamp()).await;
                    } else {
                        warn!("Lost internet connection. Cannot perform any resending.");
                        bridge.request_reconnect();
                    }
                }
            }
        }

        info!("Shutting down data sync");
        for (name, session) in [("local", local_session), ("remote", remote_session)] {
            if let Err(e) = session.await {
                error!("{} session task failed: {}", name, e);
            }
        }

        // Let in-flight message handlers finish
        tasks.close();
        tasks.wait().await;

        self.store.close().await;
        info!("Data sync stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheduled_classes_order_and_toggles() {
        let mut server = ServerConfig::default();
        assert_eq!(
            scheduled_classes(&server),
            vec![MeasurementClass::Pollutant, MeasurementClass::Raw]
        );

        server.send_pollutant_data = false;
        assert_eq!(scheduled_classes(&server), vec![MeasurementClass::Raw]);
    }
}
