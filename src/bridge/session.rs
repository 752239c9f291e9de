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

// Publish side of an MQTT session with broker confirmation

use async_trait::async_trait;
use bytes::Bytes;
use rumqttc::{AsyncClient, QoS};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::debug;

use super::handler::Origin;
use super::link::RemoteLinkState;
use super::publisher::{PublishError, Publisher};

type Confirm = oneshot::Sender<Result<(), PublishError>>;

#[derive(Default)]
struct TrackerState {
    /// Waiters in request order, not yet written to the network
    queued: VecDeque<Confirm>,
    /// Waiters keyed by packet id, written and awaiting PUBACK/PUBCOMP
    inflight: HashMap<u16, Confirm>,
    /// Packet ids the client will retransmit after a reconnect; their
    /// waiters were already failed
    replayed: HashSet<u16>,
}

/// Matches the event loop's outgoing publishes and acks to waiting callers
///
/// The client writes requests in the order they were queued, so the n-th
/// outgoing publish belongs to the n-th queued waiter.
#[derive(Default)]
pub struct AckTracker {
    state: Mutex<TrackerState>,
}

impl AckTracker {
    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The event loop wrote a publish with this packet id (0 for QoS 0)
    pub fn on_outgoing_publish(&self, pkid: u16) {
        let mut state = self.lock();
        if pkid != 0 && state.replayed.remove(&pkid) {
            debug!("Retransmitted publish {} after reconnect", pkid);
            return;
        }
        let Some(confirm) = state.queued.pop_front() else {
            return;
        };
        if pkid == 0 {
            let _ = confirm.send(Ok(()));
        } else {
            state.inflight.insert(pkid, confirm);
        }
    }

    /// The broker acknowledged this packet id
    pub fn on_ack(&self, pkid: u16) {
        if let Some(confirm) = self.lock().inflight.remove(&pkid) {
            let _ = confirm.send(Ok(()));
        }
    }

    /// Fail every publish written but not yet acknowledged
    ///
    /// Queued requests stay queued: the client still holds them and will
    /// write them after reconnecting, which keeps waiter order aligned.
    pub fn on_connection_lost(&self) {
        let mut guard = self.lock();
        let state = &mut *guard;
        for (pkid, confirm) in state.inflight.drain() {
            state.replayed.insert(pkid);
            let _ = confirm.send(Err(PublishError::ConnectionLost));
        }
    }
}

/// Publishing handle of one broker session
pub struct MqttSession {
    origin: Origin,
    client: AsyncClient,
    qos: QoS,
    timeout: Duration,
    tracker: Arc<AckTracker>,
    link: Option<RemoteLinkState>,
}

impl MqttSession {
    pub(crate) fn new(
        origin: Origin,
        client: AsyncClient,
        qos: QoS,
        timeout: Duration,
        tracker: Arc<AckTracker>,
        link: Option<RemoteLinkState>,
    ) -> Self {
        Self {
            origin,
            client,
            qos,
            timeout,
            tracker,
            link,
        }
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }
}

#[async_trait]
impl Publisher for MqttSession {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), PublishError> {
        if let Some(link) = &self.link {
            if !link.is_connected() {
                return Err(PublishError::NotConnected);
            }
        }

        let confirmed = {
            // Queue the waiter and the request under one lock so the event
            // loop sees them in the same order
            let mut state = self.tracker.lock();
            let (tx, rx) = oneshot::channel();
            state.queued.push_back(tx);
            if let Err(e) = self.client.try_publish(topic, self.qos, false, payload) {
                state.queued.pop_back();
                return Err(PublishError::Rejected(e.to_string()));
            }
            rx
        };

        match tokio::time::timeout(self.timeout, confirmed).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(PublishError::ConnectionLost),
            Err(_) => Err(PublishError::Timeout(self.timeout)),
        }
    }
}
