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

// Out-of-band repair of the storage medium

use async_trait::async_trait;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{error, info, warn};

use crate::config::RecoveryConfig;

/// Best-effort repair of a storage medium that went read-only
///
/// Implementations log their own failures; callers never retry a repair,
/// they retry whatever operation observed the failure.
#[async_trait]
pub trait MediumRepair: Send + Sync {
    async fn repair(&self);
}

/// Build the repair strategy from configuration
pub fn from_config(config: &RecoveryConfig) -> Arc<dyn MediumRepair> {
    if config.enabled {
        Arc::new(FsckRepair::new(config))
    } else {
        Arc::new(DisabledRepair)
    }
}

/// Runs a filesystem checker such as `fsck.fat -a /dev/mmcblk0p1`
pub struct FsckRepair {
    program: String,
    args: Vec<String>,
    device: String,
}

impl FsckRepair {
    pub fn new(config: &RecoveryConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            device: config.device.clone(),
        }
    }
}

#[async_trait]
impl MediumRepair for FsckRepair {
    async fn repair(&self) {
        warn!(
            "Read-only file system detected, running {} on {}",
            self.program, self.device
        );

        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(&self.device)
            .output()
            .await;

        match output {
            Ok(output) if output.status.success() => {
                info!("File system repair of {} finished", self.device);
            }
            Ok(output) => {
                error!(
                    "File system repair of {} failed ({}): {}",
                    self.device,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                );
            }
            Err(e) => {
                error!("File system repair could not start {}: {}", self.program, e);
            }
        }
    }
}

/// Logs the condition without touching the medium
pub struct DisabledRepair;

#[async_trait]
impl MediumRepair for DisabledRepair {
    async fn repair(&self) {
        warn!("Read-only file system detected, medium repair is disabled");
    }
}
