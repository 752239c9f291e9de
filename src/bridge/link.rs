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

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Connectivity of the remote broker session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

/// Read side of the remote connectivity flag
///
/// Cheap to clone and read from any task. Only the matching
/// [`LinkStateWriter`], owned by the remote session, can change it.
#[derive(Debug, Clone)]
pub struct RemoteLinkState {
    connected: Arc<AtomicBool>,
}

/// Write side of the remote connectivity flag
#[derive(Debug)]
pub struct LinkStateWriter {
    connected: Arc<AtomicBool>,
}

impl RemoteLinkState {
    /// A disconnected flag and its writer
    pub fn new() -> (RemoteLinkState, LinkStateWriter) {
        let connected = Arc::new(AtomicBool::new(false));
        (
            RemoteLinkState {
                connected: Arc::clone(&connected),
            },
            LinkStateWriter { connected },
        )
    }

    pub fn state(&self) -> ConnectionState {
        if self.is_connected() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}

impl LinkStateWriter {
    /// Record the new state and return the previous one
    pub fn set(&self, state: ConnectionState) -> ConnectionState {
        let was = self
            .connected
            .swap(state == ConnectionState::Connected, Ordering::AcqRel);
        if was {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }
}
