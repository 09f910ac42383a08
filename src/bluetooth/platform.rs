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

//! Platform seam between the link core and the host Bluetooth stack.

use async_trait::async_trait;
use std::fmt;
use std::io;
use tokio::io::{AsyncRead, AsyncWrite};
use uuid::Uuid;

/// Standard SPP UUID.
pub const SPP_UUID: Uuid = Uuid::from_u128(0x00001101_0000_1000_8000_00805F9B34FB);

/// RFCOMM channel used by the numbered-channel fallback.
pub const FALLBACK_CHANNEL: u8 = 1;

/// Socket open strategies, tried in this order until one succeeds.
pub const OPEN_STRATEGIES: [OpenStrategy; 3] = [
    OpenStrategy::Insecure,
    OpenStrategy::Secure,
    OpenStrategy::Channel(FALLBACK_CHANNEL),
];

/// A bonded peer as reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub name: String,
    pub address: String,
}

impl DeviceIdentity {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }
}

/// How to open the RFCOMM stream to a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenStrategy {
    /// Service lookup by [`SPP_UUID`] without authentication.
    Insecure,
    /// Service lookup by [`SPP_UUID`] with authentication.
    Secure,
    /// Raw connect to a numbered RFCOMM channel, skipping service lookup.
    Channel(u8),
}

impl fmt::Display for OpenStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Insecure => write!(f, "insecure RFCOMM"),
            Self::Secure => write!(f, "secure RFCOMM"),
            Self::Channel(ch) => write!(f, "RFCOMM channel {}", ch),
        }
    }
}

/// An open bidirectional byte stream to the device.
pub trait SerialLink: AsyncRead + AsyncWrite + Send + Unpin {
    /// Whether the underlying socket still reports itself connected.
    fn is_connected(&self) -> bool;
}

pub type BoxedLink = Box<dyn SerialLink>;

/// Host Bluetooth stack operations needed by the connection manager.
///
/// Implementations report missing authorization as
/// [`io::ErrorKind::PermissionDenied`].
#[async_trait]
pub trait BluetoothPlatform: Send + Sync + 'static {
    /// Whether the process has been granted Bluetooth access.
    fn has_permissions(&self) -> bool;

    /// Whether a Bluetooth radio is present.
    fn adapter_present(&self) -> bool;

    /// Whether the radio is powered on.
    async fn adapter_powered(&self) -> io::Result<bool>;

    /// Devices already bonded with this host.
    async fn bonded_devices(&self) -> io::Result<Vec<DeviceIdentity>>;

    /// Open a stream to `device` using `strategy`.
    async fn open_link(
        &self,
        device: &DeviceIdentity,
        strategy: OpenStrategy,
    ) -> io::Result<BoxedLink>;
}
