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

// Calendar periods that name store files, and the wall clock they derive from

use chrono::{DateTime, Datelike, TimeZone, Utc};
use std::fmt;

/// Source of wall-clock time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// One calendar month (UTC); each device gets one store file per period
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StorePeriod {
    year: i32,
    month: u32,
}

impl StorePeriod {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        if !(1..=12).contains(&month) || !(0..=9999).contains(&year) {
            return None;
        }
        Some(Self { year, month })
    }

    /// Period containing the given instant
    pub fn containing(instant: DateTime<Utc>) -> Self {
        Self {
            year: instant.year(),
            month: instant.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// First second of the period, as seconds since the epoch
    pub fn start(&self) -> i64 {
        Utc.with_ymd_and_hms(self.year, self.month, 1, 0, 0, 0)
            .single()
            .map(|t| t.timestamp())
            .unwrap_or(i64::MIN)
    }

    /// First second after the period
    pub fn end(&self) -> i64 {
        self.next().start()
    }

    /// `YYYYMM`
    pub fn tag(&self) -> String {
        format!("{:04}{:02}", self.year, self.month)
    }

    pub fn parse_tag(tag: &str) -> Option<Self> {
        if tag.len() != 6 || !tag.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let year = tag[..4].parse().ok()?;
        let month = tag[4..].parse().ok()?;
        Self::new(year, month)
    }

    /// Store file name for a device, `<device>_<YYYYMM>.db`
    pub fn file_name(&self, device_id: &str) -> String {
        format!("{}_{}.db", device_id, self.tag())
    }

    /// Inverse of [`StorePeriod::file_name`] for the given device
    pub fn from_file_name(name: &str, device_id: &str) -> Option<Self> {
        let rest = name.strip_prefix(device_id)?.strip_prefix('_')?;
        let tag = rest.strip_suffix(".db")?;
        Self::parse_tag(tag)
    }
}

impl fmt::Display for StorePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}
