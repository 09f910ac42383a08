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

//! Error types for the device link.

use std::io;
use thiserror::Error;

/// Failures reported by the connection manager and the command engine.
///
/// The `Display` text of each variant is what gets published as the last
/// error, so callers and observers always see the same message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("Missing Bluetooth permissions")]
    Unauthorized,

    #[error("Bluetooth not supported on this device")]
    Unsupported,

    #[error("Bluetooth is not enabled")]
    Disabled,

    #[error("Device '{0}' not found in paired devices")]
    DeviceNotFound(String),

    #[error("Connection failed: {0}")]
    ConnectFailed(String),

    #[error("Not connected to device")]
    NotConnected,

    #[error("Command failed: {0}")]
    Io(String),

    #[error("Device rejected request: {0}")]
    Protocol(String),

    #[error("Disconnect error: {0}")]
    Close(String),

    #[error("Timed out waiting for response")]
    Timeout,

    #[error("Connection error: {0}")]
    Unexpected(String),
}

impl LinkError {
    /// Whether this failure means the link itself is unusable.
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io(_))
    }

    /// Classify a platform I/O error raised while talking to the device.
    pub fn from_io(err: &io::Error) -> Self {
        if err.kind() == io::ErrorKind::PermissionDenied {
            Self::Unauthorized
        } else {
            Self::Io(err.to_string())
        }
    }
}

/// Result type for protocol operations: `Ok(())` is success.
pub type LinkResult<T = ()> = std::result::Result<T, LinkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(LinkError::NotConnected.to_string(), "Not connected to device");
        assert_eq!(
            LinkError::Timeout.to_string(),
            "Timed out waiting for response"
        );
        assert_eq!(
            LinkError::DeviceNotFound("ESP32test".into()).to_string(),
            "Device 'ESP32test' not found in paired devices"
        );
    }

    #[test]
    fn test_from_io_classification() {
        let denied = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        assert_eq!(LinkError::from_io(&denied), LinkError::Unauthorized);

        let broken = io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed");
        let err = LinkError::from_io(&broken);
        assert!(err.is_io());
        assert_eq!(err.to_string(), "Command failed: pipe closed");
    }
}
