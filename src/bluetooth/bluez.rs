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

//! BlueZ platform implementation.

use async_trait::async_trait;
use bluer::rfcomm::{Profile, ProfileHandle, Role, SocketAddr, Stream};
use bluer::{Adapter, Address, Device, Session};
use futures::StreamExt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tracing::{debug, info, warn};

use super::platform::{
    BluetoothPlatform, BoxedLink, DeviceIdentity, OpenStrategy, SerialLink, SPP_UUID,
};

/// How long BlueZ gets to hand over a profile connection.
const PROFILE_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Map a BlueZ error, keeping authorization failures recognizable.
fn bluez_error(err: bluer::Error) -> io::Error {
    let kind = match err.kind {
        bluer::ErrorKind::NotAuthorized | bluer::ErrorKind::NotPermitted => {
            io::ErrorKind::PermissionDenied
        }
        _ => io::ErrorKind::Other,
    };
    io::Error::new(kind, err)
}

/// RFCOMM stream opened through BlueZ.
struct BluezLink {
    stream: Stream,
    // Unregisters the SPP profile when the link is dropped
    _profile: Option<ProfileHandle>,
}

impl AsyncRead for BluezLink {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_read(cx, buf)
    }
}

impl AsyncWrite for BluezLink {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.stream).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_shutdown(cx)
    }
}

impl SerialLink for BluezLink {
    fn is_connected(&self) -> bool {
        self.stream.peer_addr().is_ok()
    }
}

/// Linux Bluetooth access through the BlueZ daemon.
pub struct BluezPlatform {
    session: Session,
    adapter: Option<Adapter>,
}

impl BluezPlatform {
    /// Open a BlueZ session and pick the default adapter, if any.
    pub async fn new() -> io::Result<Self> {
        let session = Session::new().await.map_err(bluez_error)?;
        debug!("BlueZ session created");

        let adapter = match session.default_adapter().await {
            Ok(adapter) => {
                info!("Using Bluetooth adapter: {}", adapter.name());
                Some(adapter)
            }
            Err(e) => {
                warn!("No Bluetooth adapter available: {}", e);
                None
            }
        };

        Ok(Self { session, adapter })
    }

    fn adapter(&self) -> io::Result<&Adapter> {
        self.adapter
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no Bluetooth adapter"))
    }

    fn device(&self, identity: &DeviceIdentity) -> io::Result<(Address, Device)> {
        let address: Address = identity.address.parse().map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid Bluetooth address {}", identity.address),
            )
        })?;
        let device = self.adapter()?.device(address).map_err(bluez_error)?;
        Ok((address, device))
    }

    /// Register an SPP client profile and have BlueZ connect it.
    async fn connect_profile(&self, device: &Device, secure: bool) -> io::Result<BoxedLink> {
        let profile = Profile {
            uuid: SPP_UUID,
            role: Some(Role::Client),
            require_authentication: Some(secure),
            require_authorization: Some(false),
            auto_connect: Some(false),
            ..Default::default()
        };
        let mut handle = self
            .session
            .register_profile(profile)
            .await
            .map_err(bluez_error)?;

        let connect = async { device.connect_profile(&SPP_UUID).await.map_err(bluez_error) };
        let accept = async {
            let request = tokio::time::timeout(PROFILE_CONNECT_TIMEOUT, handle.next())
                .await
                .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "profile connection timed out"))?
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "profile unregistered"))?;
            request.accept().map_err(io::Error::other)
        };
        let ((), stream) = tokio::try_join!(connect, accept)?;

        Ok(Box::new(BluezLink {
            stream,
            _profile: Some(handle),
        }))
    }
}

#[async_trait]
impl BluetoothPlatform for BluezPlatform {
    /// D-Bus access to BlueZ was granted when the session opened; denials
    /// on later calls surface as `PermissionDenied`.
    fn has_permissions(&self) -> bool {
        true
    }

    fn adapter_present(&self) -> bool {
        self.adapter.is_some()
    }

    async fn adapter_powered(&self) -> io::Result<bool> {
        match &self.adapter {
            Some(adapter) => adapter.is_powered().await.map_err(bluez_error),
            None => Ok(false),
        }
    }

    async fn bonded_devices(&self) -> io::Result<Vec<DeviceIdentity>> {
        let adapter = self.adapter()?;
        let mut devices = Vec::new();

        for addr in adapter.device_addresses().await.map_err(bluez_error)? {
            let device = adapter.device(addr).map_err(bluez_error)?;
            if device.is_paired().await.map_err(bluez_error)? {
                let name = device.alias().await.unwrap_or_else(|_| addr.to_string());
                devices.push(DeviceIdentity::new(name, addr.to_string()));
            }
        }

        Ok(devices)
    }

    async fn open_link(
        &self,
        identity: &DeviceIdentity,
        strategy: OpenStrategy,
    ) -> io::Result<BoxedLink> {
        let (address, device) = self.device(identity)?;

        match strategy {
            OpenStrategy::Insecure => self.connect_profile(&device, false).await,
            OpenStrategy::Secure => self.connect_profile(&device, true).await,
            OpenStrategy::Channel(channel) => {
                let stream = Stream::connect(SocketAddr::new(address, channel)).await?;
                Ok(Box::new(BluezLink {
                    stream,
                    _profile: None,
                }))
            }
        }
    }
}
