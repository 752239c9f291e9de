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

// Shared fixtures: in-memory publisher, adjustable clock, payload builders

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use edge_datasync::bridge::{PublishError, Publisher};
use edge_datasync::protocol::{PollutantDataMsgPack, RawDataMsgPack};
use edge_datasync::storage::{Clock, DisabledRepair, DurableStore, MediumRepair, StoreSettings};

pub const DEVICE: &str = "AirSENCE-Test";

/// Publisher that records every confirmed publish
#[derive(Default)]
pub struct FakePublisher {
    published: Mutex<Vec<(String, Vec<u8>)>>,
    attempts: Mutex<usize>,
    fail_attempt: Mutex<Option<usize>>,
    fail_all: Mutex<bool>,
    delay: Mutex<Duration>,
}

impl FakePublisher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fail the n-th publish attempt (1-based) from now on
    pub fn fail_on_attempt(&self, n: usize) {
        let attempts = *self.attempts.lock().unwrap();
        *self.fail_attempt.lock().unwrap() = Some(attempts + n);
    }

    pub fn fail_all(&self, fail: bool) {
        *self.fail_all.lock().unwrap() = fail;
    }

    /// Hold every publish for `delay` before confirming
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.published.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        *self.attempts.lock().unwrap()
    }
}

#[async_trait]
impl Publisher for FakePublisher {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), PublishError> {
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            *attempts += 1;
            *attempts
        };

        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if *self.fail_all.lock().unwrap() {
            return Err(PublishError::Timeout(Duration::from_secs(5)));
        }
        if *self.fail_attempt.lock().unwrap() == Some(attempt) {
            return Err(PublishError::Timeout(Duration::from_secs(5)));
        }

        self.published
            .lock()
            .unwrap()
            .push((topic.to_string(), payload.to_vec()));
        Ok(())
    }
}

/// Repair strategy that only counts its runs
#[derive(Default)]
pub struct CountingRepair {
    runs: AtomicUsize,
}

impl CountingRepair {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediumRepair for CountingRepair {
    async fn repair(&self) {
        self.runs.fetch_add(1, Ordering::SeqCst);
    }
}

/// Clock the test moves by hand
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn at(now: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(now),
        })
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

pub fn utc(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 12, 0, 0).unwrap()
}

pub fn settings(dir: &TempDir) -> StoreSettings {
    StoreSettings {
        root: dir.path().to_path_buf(),
        device_id: DEVICE.to_string(),
        clock_milestone: Utc.with_ymd_and_hms(2021, 4, 1, 0, 0, 0).unwrap(),
        clock_retry: Duration::from_millis(20),
        storage_retry: Duration::from_millis(20),
    }
}

/// A store on a temp dir, not yet opened
pub fn new_store(dir: &TempDir, clock: Arc<ManualClock>) -> Arc<DurableStore> {
    Arc::new(DurableStore::new(
        settings(dir),
        clock,
        Arc::new(DisabledRepair),
        CancellationToken::new(),
    ))
}

/// A store on a temp dir, opened at `now`
pub async fn open_store(dir: &TempDir, now: DateTime<Utc>) -> (Arc<DurableStore>, Arc<ManualClock>) {
    let clock = ManualClock::at(now);
    let store = new_store(dir, Arc::clone(&clock));
    store.open().await.unwrap();
    (store, clock)
}

pub fn raw_payload(timestamp: i64) -> Vec<u8> {
    let msg = RawDataMsgPack {
        device_id: DEVICE.to_string(),
        timestamp,
        raw_data: HashMap::from([("NO2_WE".to_string(), 231.5), ("T".to_string(), 21.0)]),
    };
    rmp_serde::to_vec_named(&msg).unwrap()
}

pub fn pollutant_payload(timestamp: i64) -> Vec<u8> {
    let msg = PollutantDataMsgPack {
        device_id: DEVICE.to_string(),
        timestamp,
        gps: HashMap::from([("Lat".to_string(), 43.65), ("Lon".to_string(), -79.38)]),
        pollutant_data: HashMap::from([("PM25".to_string(), 8.2), ("NO2".to_string(), 12.4)]),
    };
    rmp_serde::to_vec_named(&msg).unwrap()
}
