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

// Durable store: the active per-month file plus access to older months

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::error::StorageError;
use super::period::{Clock, StorePeriod};
use super::recovery::MediumRepair;
use super::store_file::StoreFile;
use crate::config::SyncConfig;
use crate::protocol::MeasurementClass;

/// Opens one store file; runs on the blocking pool
pub type FileOpener =
    Arc<dyn Fn(&Path, StorePeriod) -> Result<StoreFile, StorageError> + Send + Sync>;

/// Where store files live and how opening them is retried
#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub root: PathBuf,
    pub device_id: String,
    pub clock_milestone: DateTime<Utc>,
    pub clock_retry: Duration,
    pub storage_retry: Duration,
}

impl StoreSettings {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            root: PathBuf::from(&config.server.main_folder),
            device_id: config.mqtt.client_id.clone(),
            clock_milestone: config.server.clock_milestone,
            clock_retry: config.server.clock_retry(),
            storage_retry: config.server.storage_retry(),
        }
    }
}

pub struct DurableStore {
    settings: StoreSettings,
    clock: Arc<dyn Clock>,
    repair: Arc<dyn MediumRepair>,
    opener: FileOpener,
    active: RwLock<Option<Arc<StoreFile>>>,
    /// One handle per period, shared by appends and scans
    handles: Mutex<HashMap<StorePeriod, Arc<StoreFile>>>,
    initializing: AtomicBool,
    shutdown: CancellationToken,
}

impl DurableStore {
    pub fn new(
        settings: StoreSettings,
        clock: Arc<dyn Clock>,
        repair: Arc<dyn MediumRepair>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            settings,
            clock,
            repair,
            opener: Arc::new(StoreFile::open),
            active: RwLock::new(None),
            handles: Mutex::new(HashMap::new()),
            initializing: AtomicBool::new(false),
            shutdown,
        }
    }

    /// Replace how store files are opened
    pub fn with_opener(mut self, opener: FileOpener) -> Self {
        self.opener = opener;
        self
    }

    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    pub fn path_for(&self, period: StorePeriod) -> PathBuf {
        self.settings
            .root
            .join(period.file_name(&self.settings.device_id))
    }

    /// The active store file, if one is open
    pub async fn active(&self) -> Option<Arc<StoreFile>> {
        self.active.read().await.clone()
    }

    pub async fn is_open(&self) -> bool {
        self.active.read().await.is_some()
    }

    /// Open the store file for the current period
    ///
    /// Waits until the wall clock passes the clock-validity milestone, then
    /// retries with a fixed backoff until the file opens. A read-only medium
    /// triggers a repair before each retry. Only shutdown ends the wait early.
    pub async fn open(&self) -> Result<StorePeriod, StorageError> {
        self.wait_for_valid_clock().await?;

        loop {
            let period = StorePeriod::containing(self.clock.now());
            match self.file(period).await {
                Ok(file) => {
                    *self.active.write().await = Some(file);
                    info!("Store ready for period {}", period);
                    return Ok(period);
                }
                Err(e) => {
                    error!("Unable to open database for storing data: {}", e);
                    if e.is_read_only_medium() {
                        self.repair.repair().await;
                    }
                }
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => return Err(StorageError::Cancelled),
                _ = tokio::time::sleep(self.settings.storage_retry) => {}
            }
        }
    }

    async fn wait_for_valid_clock(&self) -> Result<(), StorageError> {
        loop {
            let now = self.clock.now();
            if now >= self.settings.clock_milestone {
                return Ok(());
            }
            warn!(
                "System clock {} is before {}, waiting for time synchronization",
                now.to_rfc3339(),
                self.settings.clock_milestone.to_rfc3339()
            );
            tokio::select! {
                _ = self.shutdown.cancelled() => return Err(StorageError::Cancelled),
                _ = tokio::time::sleep(self.settings.clock_retry) => {}
            }
        }
    }

    /// Run [`DurableStore::open`] in the background unless a run is already
    /// in flight
    pub fn spawn_open(self: &Arc<Self>) {
        self.spawn_init(false);
    }

    fn spawn_init(self: &Arc<Self>, repair_first: bool) {
        if self
            .initializing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Store initialization already in progress");
            return;
        }

        let store = Arc::clone(self);
        tokio::spawn(async move {
            if repair_first {
                store.repair.repair().await;
            }
            if let Err(e) = store.open().await {
                info!("Store initialization stopped: {}", e);
            }
            store.initializing.store(false, Ordering::Release);
        });
    }

    /// The shared handle for `period`, opened on first use
    async fn file(&self, period: StorePeriod) -> Result<Arc<StoreFile>, StorageError> {
        let mut handles = self.handles.lock().await;
        if let Some(file) = handles.get(&period) {
            return Ok(Arc::clone(file));
        }

        let path = self.path_for(period);
        let opener = Arc::clone(&self.opener);
        let file = tokio::task::spawn_blocking(move || opener(&path, period)).await??;
        let file = Arc::new(file);
        handles.insert(period, Arc::clone(&file));
        Ok(file)
    }

    /// React to a failed store operation
    ///
    /// A read-only medium invalidates every open handle: the store drops them,
    /// repairs the medium and reopens in the background. Other errors are
    /// left to the caller.
    pub async fn handle_failure(self: &Arc<Self>, error: &StorageError) {
        if !error.is_read_only_medium() {
            return;
        }
        warn!("Storage medium went read-only, reopening the store after repair");
        self.handles.lock().await.clear();
        *self.active.write().await = None;
        self.spawn_init(true);
    }

    /// Append a record to the file of the current period
    ///
    /// An unset store triggers background initialization and fails with
    /// [`StorageError::NotOpen`].
    pub async fn append(
        self: &Arc<Self>,
        class: MeasurementClass,
        timestamp: i64,
        payload: &[u8],
        acknowledged: bool,
    ) -> Result<i64, StorageError> {
        let file = self.current_file().await?;
        let result = file.append(class, timestamp, payload, acknowledged).await;
        if let Err(e) = &result {
            self.handle_failure(e).await;
        }
        result
    }

    /// Active file, rotated to the current period when the month changed
    async fn current_file(self: &Arc<Self>) -> Result<Arc<StoreFile>, StorageError> {
        let Some(file) = self.active().await else {
            self.spawn_open();
            return Err(StorageError::NotOpen);
        };

        let period = StorePeriod::containing(self.clock.now());
        if file.period() == period {
            return Ok(file);
        }

        let mut active = self.active.write().await;
        if let Some(current) = active.as_ref() {
            if current.period() == period {
                return Ok(Arc::clone(current));
            }
        }

        match self.file(period).await {
            Ok(next) => {
                info!("Rotating store from {} to {}", file.period(), period);
                *active = Some(Arc::clone(&next));
                Ok(next)
            }
            Err(e) => {
                // Keep writing to the previous month rather than dropping data
                warn!(
                    "Unable to rotate store to {}: {}, still writing to {}",
                    period,
                    e,
                    file.path().display()
                );
                drop(active);
                if e.is_read_only_medium() {
                    let repair = Arc::clone(&self.repair);
                    tokio::spawn(async move { repair.repair().await });
                }
                Ok(file)
            }
        }
    }

    /// Every store file of the device, oldest period first
    ///
    /// A file's period does not bound the timestamps inside it: records are
    /// logged when they arrive, and after a failed rotation the previous
    /// month's file keeps taking new records. Scans select by timestamp within
    /// each file instead.
    pub async fn files(self: &Arc<Self>) -> Result<Vec<Arc<StoreFile>>, StorageError> {
        let Some(active) = self.active().await else {
            self.spawn_open();
            return Err(StorageError::NotOpen);
        };

        let mut periods = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.settings.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(period) = StorePeriod::from_file_name(name, &self.settings.device_id) {
                if period != active.period() {
                    periods.push(period);
                }
            }
        }
        periods.sort();

        let mut files = Vec::with_capacity(periods.len() + 1);
        for period in periods {
            match self.file(period).await {
                Ok(file) => files.push(file),
                Err(e) => {
                    self.handle_failure(&e).await;
                    return Err(e);
                }
            }
        }
        files.push(active);
        // The active file is normally the newest, but not after a clock jump
        files.sort_by_key(|f| f.period());

        debug!("Store holds {} file(s)", files.len());
        Ok(files)
    }

    /// Drop every store handle, closing connections once no scan holds them
    pub async fn close(&self) {
        self.handles.lock().await.clear();
        if let Some(file) = self.active.write().await.take() {
            info!("Closing store file {}", file.path().display());
        }
    }
}
