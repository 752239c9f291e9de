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

// One SQLite store file holding the raw and pollutant record sets

use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

use super::error::StorageError;
use super::period::StorePeriod;
use crate::protocol::MeasurementClass;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Rows fetched per query while a scan walks its range
const SCAN_PAGE_SIZE: i64 = 64;

/// One persisted measurement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeasurementRecord {
    pub id: i64,
    pub timestamp: i64,
    pub payload: Vec<u8>,
    pub acknowledged: bool,
}

/// A store file for one (device, period)
///
/// All access goes through one connection behind an async mutex, so there is
/// a single writer at a time and a scan batch excludes appends until it
/// commits or rolls back. Statements that may wait on the medium or the busy
/// handler run on the blocking pool.
pub struct StoreFile {
    path: PathBuf,
    period: StorePeriod,
    conn: Arc<Mutex<Connection>>,
}

impl StoreFile {
    /// Open or create the store file and its tables
    ///
    /// Blocking; async callers go through `spawn_blocking`.
    pub fn open(path: &Path, period: StorePeriod) -> Result<Self, StorageError> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags)?;

        conn.busy_timeout(BUSY_TIMEOUT)?;
        // journal_mode returns the resulting mode as a row
        let mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        debug!("Store file {} journal mode {}", path.display(), mode);

        for class in MeasurementClass::ALL {
            let table = class.table();
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                     id INTEGER NOT NULL PRIMARY KEY,
                     ts INTEGER,
                     data BLOB,
                     sent BOOLEAN DEFAULT 0
                 );
                 CREATE INDEX IF NOT EXISTS {table}_sent_ts ON {table} (sent, ts);"
            ))?;
        }

        debug!("Opened store file {}", path.display());

        Ok(Self {
            path: path.to_path_buf(),
            period,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn period(&self) -> StorePeriod {
        self.period
    }

    /// Run `f` on the connection from the blocking pool
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StorageError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn).lock_owned().await;
        tokio::task::spawn_blocking(move || f(&*conn)).await?
    }

    /// Append a record and return its id
    pub async fn append(
        &self,
        class: MeasurementClass,
        timestamp: i64,
        payload: &[u8],
        acknowledged: bool,
    ) -> Result<i64, StorageError> {
        let payload = payload.to_vec();
        self.with_conn(move |conn| {
            conn.execute(
                &format!("INSERT INTO {} (ts, data, sent) VALUES (?1, ?2, ?3)", class.table()),
                params![timestamp, payload, acknowledged],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    /// Look up one record by id
    pub async fn record(
        &self,
        class: MeasurementClass,
        id: i64,
    ) -> Result<Option<MeasurementRecord>, StorageError> {
        self.with_conn(move |conn| {
            let record = conn
                .query_row(
                    &format!("SELECT id, ts, data, sent FROM {} WHERE id = ?1", class.table()),
                    params![id],
                    read_record,
                )
                .optional()?;
            Ok(record)
        })
        .await
    }

    /// All records of a class in id order
    pub async fn records(
        &self,
        class: MeasurementClass,
    ) -> Result<Vec<MeasurementRecord>, StorageError> {
        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare(&format!("SELECT id, ts, data, sent FROM {} ORDER BY id", class.table()))?;
            let records = stmt
                .query_map([], read_record)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(records)
        })
        .await
    }

    /// Number of unacknowledged records of a class
    pub async fn pending_count(&self, class: MeasurementClass) -> Result<i64, StorageError> {
        self.with_conn(move |conn| {
            let count = conn.query_row(
                &format!("SELECT COUNT(*) FROM {} WHERE sent = 0", class.table()),
                [],
                |row| row.get(0),
            )?;
            Ok(count)
        })
        .await
    }

    /// Start a resend batch over unacknowledged records with `start <= ts <= end`
    ///
    /// The batch holds the file's write transaction until [`ScanBatch::commit`];
    /// dropping it without committing rolls back every acknowledgement.
    pub async fn begin_scan(
        &self,
        class: MeasurementClass,
        start: i64,
        end: i64,
    ) -> Result<ScanBatch, StorageError> {
        let conn = Arc::clone(&self.conn).lock_owned().await;
        // BEGIN IMMEDIATE can sit in the busy handler
        let conn = tokio::task::spawn_blocking(move || -> Result<_, StorageError> {
            conn.execute_batch("BEGIN IMMEDIATE")?;
            Ok(conn)
        })
        .await??;

        Ok(ScanBatch {
            conn,
            period: self.period,
            class,
            start,
            end,
            cursor: 0,
            page: VecDeque::new(),
            exhausted: false,
            acknowledged: 0,
            finished: false,
        })
    }
}

fn read_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<MeasurementRecord> {
    Ok(MeasurementRecord {
        id: row.get(0)?,
        timestamp: row.get(1)?,
        payload: row.get(2)?,
        acknowledged: row.get(3)?,
    })
}

/// An open resend transaction over one class of one store file
///
/// Records come back lazily in ascending id order.
pub struct ScanBatch {
    conn: OwnedMutexGuard<Connection>,
    period: StorePeriod,
    class: MeasurementClass,
    start: i64,
    end: i64,
    cursor: i64,
    page: VecDeque<MeasurementRecord>,
    exhausted: bool,
    acknowledged: usize,
    finished: bool,
}

impl ScanBatch {
    pub fn period(&self) -> StorePeriod {
        self.period
    }

    pub fn class(&self) -> MeasurementClass {
        self.class
    }

    /// Next unacknowledged record in range, or `None` when the range is done
    pub fn next_record(&mut self) -> Result<Option<MeasurementRecord>, StorageError> {
        if self.page.is_empty() && !self.exhausted {
            self.fetch_page()?;
        }
        Ok(self.page.pop_front())
    }

    fn fetch_page(&mut self) -> Result<(), StorageError> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT id, ts, data, sent FROM {} \
             WHERE sent = 0 AND ts BETWEEN ?1 AND ?2 AND id > ?3 \
             ORDER BY id LIMIT ?4",
            self.class.table()
        ))?;
        let rows = stmt
            .query_map(
                params![self.start, self.end, self.cursor, SCAN_PAGE_SIZE],
                read_record,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        if (rows.len() as i64) < SCAN_PAGE_SIZE {
            self.exhausted = true;
        }
        if let Some(last) = rows.last() {
            self.cursor = last.id;
        }
        self.page.extend(rows);
        Ok(())
    }

    /// Mark a record acknowledged inside this transaction
    ///
    /// Setting the flag on an already acknowledged record is a no-op.
    pub fn acknowledge(&mut self, id: i64) -> Result<(), StorageError> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "UPDATE {} SET sent = 1 WHERE id = ?1 AND sent = 0",
            self.class.table()
        ))?;
        self.acknowledged += stmt.execute(params![id])?;
        Ok(())
    }

    /// Commit and return how many records were acknowledged
    pub fn commit(mut self) -> Result<usize, StorageError> {
        self.finished = true;
        if let Err(e) = self.conn.execute_batch("COMMIT") {
            self.rollback_quietly();
            return Err(e.into());
        }
        Ok(self.acknowledged)
    }

    /// Discard every acknowledgement made in this batch
    pub fn rollback(mut self) {
        self.finished = true;
        self.rollback_quietly();
    }

    fn rollback_quietly(&mut self) {
        if let Err(e) = self.conn.execute_batch("ROLLBACK") {
            warn!("Rollback of {} resend batch failed: {}", self.class, e);
        }
    }
}

impl Drop for ScanBatch {
    fn drop(&mut self) {
        if !self.finished {
            self.rollback_quietly();
        }
    }
}
