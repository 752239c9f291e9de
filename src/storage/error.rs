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

use rusqlite::ErrorCode;
use thiserror::Error;

/// `EROFS` on Linux
const READ_ONLY_FS_ERRNO: i32 = 30;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("blocking store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Database not connected")]
    NotOpen,

    #[error("store initialization cancelled by shutdown")]
    Cancelled,
}

impl StorageError {
    /// True when the storage medium reports a read-only filesystem, the
    /// signature of a corrupted SD card that the kernel remounted read-only
    pub fn is_read_only_medium(&self) -> bool {
        match self {
            StorageError::Io(e) => {
                e.raw_os_error() == Some(READ_ONLY_FS_ERRNO)
                    || e.to_string().to_lowercase().contains("read-only file system")
            }
            StorageError::Sqlite(e) => {
                if let rusqlite::Error::SqliteFailure(failure, _) = e {
                    if failure.code == ErrorCode::ReadOnly {
                        return true;
                    }
                }
                e.to_string().to_lowercase().contains("read-only file system")
            }
            StorageError::Task(_) | StorageError::NotOpen | StorageError::Cancelled => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_erofs_is_read_only() {
        let err = StorageError::Io(std::io::Error::from_raw_os_error(30));
        assert!(err.is_read_only_medium());
    }

    #[test]
    fn test_sqlite_readonly_code() {
        let failure = rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_READONLY);
        let err = StorageError::Sqlite(rusqlite::Error::SqliteFailure(failure, None));
        assert!(err.is_read_only_medium());
    }

    #[test]
    fn test_message_signature() {
        let failure = rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CANTOPEN);
        let err = StorageError::Sqlite(rusqlite::Error::SqliteFailure(
            failure,
            Some("disk I/O error: read-only file system".to_string()),
        ));
        assert!(err.is_read_only_medium());
    }

    #[test]
    fn test_other_errors_are_not_read_only() {
        let err = StorageError::Io(std::io::Error::from(std::io::ErrorKind::NotFound));
        assert!(!err.is_read_only_medium());
        assert!(!StorageError::NotOpen.is_read_only_medium());
    }
}
