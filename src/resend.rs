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

// Resend engine: republish unacknowledged records for a time range

use bytes::Bytes;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::bridge::{PublishError, Publisher, RemoteLinkState, TopicSet};
use crate::protocol::MeasurementClass;
use crate::storage::{DurableStore, ScanBatch, StorageError};

#[derive(Debug, Error)]
pub enum ResendError {
    #[error("Remote MQTT client not connected")]
    NotConnected,

    #[error("Database not connected")]
    StoreNotOpen,

    #[error("storage error after committing {delivered} record(s): {source}")]
    Storage {
        delivered: usize,
        #[source]
        source: StorageError,
    },

    #[error("failed to publish {class} record {id}, nothing acknowledged: {source}")]
    Publish {
        class: MeasurementClass,
        id: i64,
        /// Records published before the failure; they stay eligible for resend
        published: usize,
        #[source]
        source: PublishError,
    },
}

impl ResendError {
    /// Records committed as acknowledged before the failure
    ///
    /// Only a commit failure after earlier files committed reports a
    /// non-zero count; every other failure leaves the store untouched.
    pub fn delivered(&self) -> usize {
        match self {
            ResendError::Storage { delivered, .. } => *delivered,
            ResendError::NotConnected
            | ResendError::StoreNotOpen
            | ResendError::Publish { .. } => 0,
        }
    }
}

/// Outcome of a completed scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResendSummary {
    pub class: MeasurementClass,
    pub start: i64,
    pub end: i64,
    /// Records published and acknowledged
    pub delivered: usize,
    /// Store files scanned
    pub files: usize,
}

pub struct ResendEngine {
    store: Arc<DurableStore>,
    remote: Arc<dyn Publisher>,
    link: RemoteLinkState,
    topics: TopicSet,
}

impl ResendEngine {
    pub fn new(
        store: Arc<DurableStore>,
        remote: Arc<dyn Publisher>,
        link: RemoteLinkState,
        topics: TopicSet,
    ) -> Self {
        Self {
            store,
            remote,
            link,
            topics,
        }
    }

    pub fn link(&self) -> &RemoteLinkState {
        &self.link
    }

    /// Publish every unacknowledged `class` record with a timestamp in
    /// `[start, end]`, in id order, oldest store file first
    ///
    /// Every file's batch stays open until the last publish confirmed, then
    /// all of them commit, oldest first. The first failure rolls back every
    /// batch, so an interrupted resend acknowledges nothing.
    pub async fn resend(
        &self,
        class: MeasurementClass,
        start: i64,
        end: i64,
    ) -> Result<ResendSummary, ResendError> {
        if !self.link.is_connected() {
            return Err(ResendError::NotConnected);
        }

        let files = match self.store.files().await {
            Ok(files) => files,
            Err(StorageError::NotOpen) => return Err(ResendError::StoreNotOpen),
            Err(source) => return Err(self.storage_failure(0, source).await),
        };

        let topic = self.topics.measurement(class);
        let mut batches: Vec<ScanBatch> = Vec::with_capacity(files.len());
        let mut published = 0;

        for file in &files {
            // Every scan locks files oldest first
            let mut batch = match file.begin_scan(class, start, end).await {
                Ok(batch) => batch,
                Err(source) => return Err(self.storage_failure(0, source).await),
            };

            loop {
                let record = match batch.next_record() {
                    Ok(Some(record)) => record,
                    Ok(None) => break,
                    Err(source) => return Err(self.storage_failure(0, source).await),
                };

                let id = record.id;
                let payload = Bytes::from(record.payload);
                if let Err(source) = self.remote.publish(topic, payload).await {
                    batch.rollback();
                    batches.into_iter().for_each(ScanBatch::rollback);
                    return Err(ResendError::Publish {
                        class,
                        id,
                        published,
                        source,
                    });
                }
                published += 1;

                if let Err(source) = batch.acknowledge(id) {
                    return Err(self.storage_failure(0, source).await);
                }
            }
            batches.push(batch);
        }

        let mut delivered = 0;
        for batch in batches.drain(..) {
            let period = batch.period();
            match batch.commit() {
                Ok(committed) => {
                    if committed > 0 {
                        debug!("Resent {} {} record(s) from {}", committed, class, period);
                    }
                    delivered += committed;
                }
                // The remaining batches roll back when dropped
                Err(source) => return Err(self.storage_failure(delivered, source).await),
            }
        }

        Ok(ResendSummary {
            class,
            start,
            end,
            delivered,
            files: files.len(),
        })
    }

    async fn storage_failure(&self, delivered: usize, source: StorageError) -> ResendError {
        self.store.handle_failure(&source).await;
        ResendError::Storage { delivered, source }
    }

    /// Scheduled resend of everything pending for the given classes, in order
    ///
    /// A failed class is logged and does not stop the next one.
    pub async fn resend_pending(&self, classes: &[MeasurementClass], now: i64) {
        for &class in classes {
            match self.resend(class, 0, now).await {
                Ok(summary) if summary.delivered > 0 => info!(
                    "Resent {} pending {} record(s)",
                    summary.delivered, class
                ),
                Ok(_) => debug!("No pending {} records", class),
                Err(e) => error!("Scheduled {} resend failed: {}", class, e),
            }
        }
    }
}
