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

// Broker bridge: builds both MQTT sessions and drives their event loops

use anyhow::{bail, Context, Result};
use rumqttc::{
    AsyncClient, ConnectionError, Event, EventLoop, LastWill, MqttOptions, Outgoing, Packet,
    Publish, QoS, SubscribeReasonCode, TlsConfiguration, Transport,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use super::handler::{MessageHandler, Origin};
use super::link::{ConnectionState, LinkStateWriter, RemoteLinkState};
use super::publisher::Publisher;
use super::session::{AckTracker, MqttSession};
use super::topics::{TopicRole, TopicSet};
use crate::config::SyncConfig;

/// Requests buffered between session handles and their event loop
const REQUEST_CAPACITY: usize = 64;

/// Pause between local reconnect attempts
const LOCAL_RECONNECT_DELAY: Duration = Duration::from_secs(5);

const DEFAULT_TLS_PORT: u16 = 8883;

pub fn qos_from_level(level: u8) -> Result<QoS> {
    match level {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        other => bail!("Invalid MQTT QoS level: {}", other),
    }
}

/// Parse `mqtts://host:port`, `ssl://host:port`, `tls://host:port` or `host[:port]`
pub fn parse_remote_address(server: &str) -> Result<(String, u16)> {
    let address = ["mqtts://", "ssl://", "tls://", "tcp://", "mqtt://"]
        .iter()
        .find_map(|scheme| server.strip_prefix(scheme))
        .unwrap_or(server);

    match address.rsplit_once(':') {
        None if !address.is_empty() => Ok((address.to_string(), DEFAULT_TLS_PORT)),
        Some((host, port)) if !host.is_empty() => {
            let port = port
                .parse::<u16>()
                .with_context(|| format!("Invalid port in broker address: {}", server))?;
            Ok((host.to_string(), port))
        }
        _ => bail!("Invalid broker address: '{}'", server),
    }
}

/// Both broker sessions plus the shared remote connectivity flag
pub struct BrokerBridge {
    local: Arc<MqttSession>,
    remote: Arc<MqttSession>,
    link: RemoteLinkState,
    reconnect: Arc<Notify>,
}

/// Event loops of the two sessions, consumed by [`BridgeRunners::spawn`]
pub struct BridgeRunners {
    local: SessionRunner,
    remote: SessionRunner,
}

impl BrokerBridge {
    /// Build both sessions from configuration
    ///
    /// Fails when the remote TLS credentials cannot be read; nothing connects
    /// until the runners are spawned.
    pub fn new(config: &SyncConfig, topics: &TopicSet) -> Result<(Self, BridgeRunners)> {
        let mqtt = &config.mqtt;
        let qos = qos_from_level(mqtt.qos)?;
        let client_id = mqtt.session_client_id();

        // Local session
        let mut local_options =
            MqttOptions::new(client_id.clone(), mqtt.local.host.clone(), mqtt.local.port);
        local_options.set_keep_alive(Duration::from_secs(mqtt.local.keep_alive_seconds));
        local_options.set_clean_session(true);

        let (local_client, local_eventloop) = AsyncClient::new(local_options, REQUEST_CAPACITY);
        let local_tracker = Arc::new(AckTracker::default());

        // Remote session
        let remote = &mqtt.remote;
        let ca = std::fs::read(&remote.ca_file)
            .with_context(|| format!("Unable to read CA file {}", remote.ca_file))?;
        let cert = std::fs::read(&remote.cert_file)
            .with_context(|| format!("Unable to read certificate file {}", remote.cert_file))?;
        let key = std::fs::read(&remote.key_file)
            .with_context(|| format!("Unable to read key file {}", remote.key_file))?;

        let (host, port) = parse_remote_address(&remote.server)?;
        let mut remote_options = MqttOptions::new(client_id, host, port);
        remote_options.set_keep_alive(Duration::from_secs(remote.keep_alive_seconds));
        remote_options.set_clean_session(true);
        remote_options.set_last_will(LastWill::new(
            topics.will.clone(),
            topics.will_payload.clone().into_bytes(),
            qos,
            false,
        ));
        remote_options.set_transport(Transport::tls_with_config(TlsConfiguration::Simple {
            ca,
            alpn: None,
            client_auth: Some((cert, key)),
        }));

        let (remote_client, remote_eventloop) = AsyncClient::new(remote_options, REQUEST_CAPACITY);
        let remote_tracker = Arc::new(AckTracker::default());

        let (link, link_writer) = RemoteLinkState::new();
        let reconnect = Arc::new(Notify::new());
        let timeout = mqtt.publish_timeout();

        let bridge = Self {
            local: Arc::new(MqttSession::new(
                Origin::Local,
                local_client.clone(),
                qos,
                timeout,
                Arc::clone(&local_tracker),
                None,
            )),
            remote: Arc::new(MqttSession::new(
                Origin::Remote,
                remote_client.clone(),
                qos,
                timeout,
                Arc::clone(&remote_tracker),
                Some(link.clone()),
            )),
            link,
            reconnect: Arc::clone(&reconnect),
        };

        let runners = BridgeRunners {
            local: SessionRunner {
                origin: Origin::Local,
                client: local_client,
                eventloop: local_eventloop,
                tracker: local_tracker,
                topics: topics.clone(),
                link: None,
                reconnect: Arc::clone(&reconnect),
            },
            remote: SessionRunner {
                origin: Origin::Remote,
                client: remote_client,
                eventloop: remote_eventloop,
                tracker: remote_tracker,
                topics: topics.clone(),
                link: Some(link_writer),
                reconnect,
            },
        };

        Ok((bridge, runners))
    }

    pub fn local(&self) -> Arc<dyn Publisher> {
        self.local.clone()
    }

    pub fn remote(&self) -> Arc<dyn Publisher> {
        self.remote.clone()
    }

    pub fn link(&self) -> RemoteLinkState {
        self.link.clone()
    }

    /// Let a remote session waiting after a failed reconnect try again
    pub fn request_reconnect(&self) {
        self.reconnect.notify_one();
    }
}

impl BridgeRunners {
    /// Start both event loops; they stop when `shutdown` is cancelled
    pub fn spawn(
        self,
        handler: Arc<dyn MessageHandler>,
        tasks: &TaskTracker,
        shutdown: &CancellationToken,
    ) -> (JoinHandle<()>, JoinHandle<()>) {
        let local = tokio::spawn(self.local.run(
            Arc::clone(&handler),
            tasks.clone(),
            shutdown.clone(),
        ));
        let remote = tokio::spawn(self.remote.run(handler, tasks.clone(), shutdown.clone()));
        (local, remote)
    }
}

struct SessionRunner {
    origin: Origin,
    client: AsyncClient,
    eventloop: EventLoop,
    tracker: Arc<AckTracker>,
    topics: TopicSet,
    link: Option<LinkStateWriter>,
    reconnect: Arc<Notify>,
}

impl SessionRunner {
    async fn run(
        mut self,
        handler: Arc<dyn MessageHandler>,
        tasks: TaskTracker,
        shutdown: CancellationToken,
    ) {
        let topics = self.topics.clone();
        let subscriptions = match self.origin {
            Origin::Local => topics.local_subscriptions(),
            Origin::Remote => topics.remote_subscriptions(),
        };

        info!("Starting {} MQTT session", self.origin);

        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => break,
                event = self.eventloop.poll() => event,
            };

            match event {
                Ok(Event::Incoming(Packet::ConnAck(_))) => self.on_connected(&subscriptions),
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    self.dispatch(&subscriptions, publish, &handler, &tasks)
                }
                Ok(Event::Incoming(Packet::PubAck(ack))) => self.tracker.on_ack(ack.pkid),
                Ok(Event::Incoming(Packet::PubComp(comp))) => self.tracker.on_ack(comp.pkid),
                Ok(Event::Incoming(Packet::SubAck(ack))) => {
                    if ack
                        .return_codes
                        .iter()
                        .any(|code| matches!(code, SubscribeReasonCode::Failure))
                    {
                        error!("{} broker rejected subscription {}", self.origin, ack.pkid);
                    }
                }
                Ok(Event::Outgoing(Outgoing::Publish(pkid))) => {
                    self.tracker.on_outgoing_publish(pkid)
                }
                Ok(_) => {}
                Err(e) => {
                    if !self.on_connection_error(e, &shutdown).await {
                        break;
                    }
                }
            }
        }

        if let Some(link) = &self.link {
            link.set(ConnectionState::Disconnected);
        }
        if let Err(e) = self.client.try_disconnect() {
            debug!("{} session disconnect: {}", self.origin, e);
        }
        info!("{} MQTT session stopped", self.origin);
    }

    fn on_connected(&self, subscriptions: &[(&str, TopicRole)]) {
        info!("MQTT client get connection with {} MQTT broker", self.origin);
        if let Some(link) = &self.link {
            link.set(ConnectionState::Connected);
        }

        for (topic, _) in subscriptions {
            match self.client.try_subscribe(*topic, QoS::AtMostOnce) {
                Ok(()) => info!("Subscribe to {}", topic),
                Err(e) => error!("Error when subscribe to {}: {}", topic, e),
            }
        }
    }

    fn dispatch(
        &self,
        subscriptions: &[(&str, TopicRole)],
        publish: Publish,
        handler: &Arc<dyn MessageHandler>,
        tasks: &TaskTracker,
    ) {
        let topic = publish.topic;
        let Some(role) = TopicSet::classify(subscriptions, &topic) else {
            debug!("Ignoring {} message on unexpected topic {}", self.origin, topic);
            return;
        };

        let handler = Arc::clone(handler);
        let payload = publish.payload;
        let origin = self.origin;
        tasks.spawn(async move {
            match role {
                TopicRole::Measurement(class) => handler.on_measurement(class, payload).await,
                TopicRole::ResendRequest(class) => {
                    handler
                        .on_resend_request(class, origin, topic, payload)
                        .await
                }
            }
        });
    }

    /// Returns false when shutdown interrupted the wait
    async fn on_connection_error(
        &mut self,
        e: ConnectionError,
        shutdown: &CancellationToken,
    ) -> bool {
        self.tracker.on_connection_lost();

        let Some(link) = &self.link else {
            // Local broker: keep reconnecting
            error!("MQTT client lost connection with local MQTT broker: {}", e);
            return tokio::select! {
                _ = shutdown.cancelled() => false,
                _ = tokio::time::sleep(LOCAL_RECONNECT_DELAY) => true,
            };
        };

        if link.set(ConnectionState::Disconnected) == ConnectionState::Connected {
            // The next poll is the one immediate reconnect attempt
            error!("MQTT client lost connection with remote MQTT broker: {}", e);
            return true;
        }

        error!("Error when client connect to remote MQTT broker: {}", e);
        warn!("Remote reconnect deferred until the next resend tick");
        tokio::select! {
            _ = shutdown.cancelled() => false,
            _ = self.reconnect.notified() => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_remote_address_with_scheme() {
        let (host, port) = parse_remote_address("mqtts://iot.example.com:8883").unwrap();
        assert_eq!(host, "iot.example.com");
        assert_eq!(port, 8883);
    }

    #[test]
    fn test_parse_remote_address_default_port() {
        let (host, port) = parse_remote_address("ssl://broker.local").unwrap();
        assert_eq!(host, "broker.local");
        assert_eq!(port, 8883);
    }

    #[test]
    fn test_parse_remote_address_without_scheme() {
        let (host, port) = parse_remote_address("10.0.0.5:9883").unwrap();
        assert_eq!(host, "10.0.0.5");
        assert_eq!(port, 9883);
    }

    #[test]
    fn test_parse_remote_address_invalid() {
        assert!(parse_remote_address("mqtts://host:notaport").is_err());
        assert!(parse_remote_address("").is_err());
        assert!(parse_remote_address(":8883").is_err());
    }

    #[test]
    fn test_qos_levels() {
        assert_eq!(qos_from_level(0).unwrap(), QoS::AtMostOnce);
        assert_eq!(qos_from_level(2).unwrap(), QoS::ExactlyOnce);
        assert!(qos_from_level(3).is_err());
    }
}
