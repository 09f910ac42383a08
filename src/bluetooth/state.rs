// Copyright 2026 Smart Blinds Team
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

//! Observable link state: connectivity and last error.

use tokio::sync::watch;

use crate::error::LinkError;

/// Shared connectivity and last-error signals.
///
/// Written by the connection manager and command engine; any number of
/// observers may read or subscribe.
#[derive(Debug)]
pub struct LinkState {
    connected: watch::Sender<bool>,
    last_error: watch::Sender<Option<String>>,
}

impl Default for LinkState {
    fn default() -> Self {
        Self {
            connected: watch::Sender::new(false),
            last_error: watch::Sender::new(None),
        }
    }
}

impl LinkState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.borrow().clone()
    }

    /// Subscribe to connectivity changes.
    pub fn subscribe_connected(&self) -> watch::Receiver<bool> {
        self.connected.subscribe()
    }

    /// Subscribe to last-error changes.
    pub fn subscribe_errors(&self) -> watch::Receiver<Option<String>> {
        self.last_error.subscribe()
    }

    pub(crate) fn set_connected(&self, connected: bool) {
        self.connected.send_if_modified(|current| {
            let changed = *current != connected;
            *current = connected;
            changed
        });
    }

    /// Record a failure; every call notifies observers, even for a repeated message.
    pub(crate) fn set_error(&self, err: &LinkError) {
        self.last_error.send_replace(Some(err.to_string()));
    }

    pub(crate) fn clear_error(&self) {
        self.last_error.send_if_modified(|current| current.take().is_some());
    }
}
