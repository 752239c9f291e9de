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

// Durable store module
//
// One SQLite file per (device, calendar month), each holding the raw and
// pollutant record sets. Records are append-only; the only mutation is the
// one-way `acknowledged` flag set inside a resend batch.

pub mod durable;
pub mod error;
pub mod period;
pub mod recovery;
pub mod store_file;

pub use durable::{DurableStore, FileOpener, StoreSettings};
pub use error::StorageError;
pub use period::{Clock, StorePeriod, SystemClock};
pub use recovery::{DisabledRepair, FsckRepair, MediumRepair};
pub use store_file::{MeasurementRecord, ScanBatch, StoreFile};
