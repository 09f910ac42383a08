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

//! Line protocol spoken by the blinds controller.
//!
//! Requests are single ASCII lines terminated by `\n`. Replies are free-form
//! and only classified by the presence of `OK` or `ERROR`.

use chrono::NaiveDateTime;

/// Manual open.
pub const MANUAL_OPEN: u8 = 1;
/// Manual close.
pub const MANUAL_CLOSE: u8 = 2;
/// Update schedule settings.
pub const UPDATE_SETTINGS: u8 = 3;
/// Sync the controller clock.
pub const SYNC_TIME: u8 = 4;

/// Field separator inside a request line.
const FIELD_SEP: char = '|';

/// Timestamp layout expected by the controller.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const OK_TOKEN: &str = "OK";
const ERROR_TOKEN: &str = "ERROR";

/// Manual blinds actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlindsAction {
    Open,
    Close,
}

impl BlindsAction {
    pub fn opcode(&self) -> u8 {
        match self {
            Self::Open => MANUAL_OPEN,
            Self::Close => MANUAL_CLOSE,
        }
    }
}

/// An outbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandFrame {
    /// A bare opcode.
    Command(u8),
    /// Ordered key/value settings.
    Settings(Vec<(String, String)>),
    /// Clock sync with the host wall-clock time.
    SyncTime(NaiveDateTime),
}

impl CommandFrame {
    /// Build a settings frame, preserving the given key order.
    pub fn settings<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self::Settings(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn opcode(&self) -> u8 {
        match self {
            Self::Command(op) => *op,
            Self::Settings(_) => UPDATE_SETTINGS,
            Self::SyncTime(_) => SYNC_TIME,
        }
    }

    /// Serialize to a newline-terminated request line.
    pub fn encode(&self) -> String {
        match self {
            Self::Command(op) => format!("{}\n", op),
            Self::Settings(pairs) => {
                let mut line = format!("{}{}", UPDATE_SETTINGS, FIELD_SEP);
                for (key, value) in pairs {
                    line.push_str(key);
                    line.push(':');
                    line.push_str(value);
                    line.push(FIELD_SEP);
                }
                line.push('\n');
                line
            }
            Self::SyncTime(at) => format!(
                "{}{}{}{}\n",
                SYNC_TIME,
                FIELD_SEP,
                at.format(TIMESTAMP_FORMAT),
                FIELD_SEP
            ),
        }
    }
}

/// Classification of an accumulated reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Ok,
    Error,
    /// No terminator token seen yet.
    Incomplete,
}

impl Reply {
    /// Classify accumulated reply bytes. `OK` wins if both tokens appear.
    pub fn classify(buf: &[u8]) -> Self {
        let text = String::from_utf8_lossy(buf);
        if text.contains(OK_TOKEN) {
            Self::Ok
        } else if text.contains(ERROR_TOKEN) {
            Self::Error
        } else {
            Self::Incomplete
        }
    }
}
