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

//! In-memory Bluetooth platform for exercising the link without a radio.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{duplex, AsyncRead, AsyncWrite, DuplexStream, ReadBuf};

use super::platform::{BluetoothPlatform, BoxedLink, DeviceIdentity, OpenStrategy, SerialLink};

const PIPE_CAPACITY: usize = 4096;

/// Host end of an in-memory link. The device end is a plain [`DuplexStream`].
#[derive(Debug)]
pub struct MockLink {
    stream: DuplexStream,
    connected: bool,
    write_failure: Option<io::ErrorKind>,
    failing_close: bool,
    chattering: bool,
}

impl MockLink {
    /// Create a connected link and the device end of it.
    pub fn pair() -> (Self, DuplexStream) {
        let (host, device) = duplex(PIPE_CAPACITY);
        (
            Self {
                stream: host,
                connected: true,
                write_failure: None,
                failing_close: false,
                chattering: false,
            },
            device,
        )
    }

    /// A link whose socket never reports connected.
    pub fn reporting_disconnected(mut self) -> Self {
        self.connected = false;
        self
    }

    /// A link whose writes fail as if the peer went away.
    pub fn broken(mut self) -> Self {
        self.write_failure = Some(io::ErrorKind::BrokenPipe);
        self
    }

    /// A link whose writes are refused by the OS permission check.
    pub fn denied(mut self) -> Self {
        self.write_failure = Some(io::ErrorKind::PermissionDenied);
        self
    }

    /// A link whose shutdown reports an error.
    pub fn failing_close(mut self) -> Self {
        self.failing_close = true;
        self
    }

    /// A link whose peer never stops sending; every read returns a full buffer.
    pub fn chattering(mut self) -> Self {
        self.chattering = true;
        self
    }
}

impl AsyncRead for MockLink {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.chattering {
            let filled = {
                let unfilled = buf.initialize_unfilled();
                unfilled.fill(b'.');
                unfilled.len()
            };
            buf.advance(filled);
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut self.stream).poll_read(cx, buf)
    }
}

impl AsyncWrite for MockLink {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if let Some(kind) = self.write_failure {
            self.connected = false;
            let message = match kind {
                io::ErrorKind::PermissionDenied => "permission denied",
                _ => "socket closed by peer",
            };
            return Poll::Ready(Err(io::Error::new(kind, message)));
        }
        Pin::new(&mut self.stream).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.connected = false;
        if self.failing_close {
            return Poll::Ready(Err(io::Error::new(io::ErrorKind::Other, "close failed")));
        }
        Pin::new(&mut self.stream).poll_shutdown(cx)
    }
}

impl SerialLink for MockLink {
    fn is_connected(&self) -> bool {
        self.connected
    }
}

/// Scriptable platform backed by in-memory links.
pub struct MockPlatform {
    permissions: bool,
    present: bool,
    powered: bool,
    devices: Vec<DeviceIdentity>,
    failing: Vec<OpenStrategy>,
    denied: Vec<OpenStrategy>,
    device_list_fails: bool,
    scripted: Mutex<VecDeque<BoxedLink>>,
    peers: Mutex<Vec<DuplexStream>>,
    attempts: Mutex<Vec<(String, OpenStrategy)>>,
}

impl Default for MockPlatform {
    fn default() -> Self {
        Self {
            permissions: true,
            present: true,
            powered: true,
            devices: Vec::new(),
            failing: Vec::new(),
            denied: Vec::new(),
            device_list_fails: false,
            scripted: Mutex::new(VecDeque::new()),
            peers: Mutex::new(Vec::new()),
            attempts: Mutex::new(Vec::new()),
        }
    }
}

impl MockPlatform {
    /// A permitted, present and powered radio with no bonded devices.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(mut self, name: &str, address: &str) -> Self {
        self.devices.push(DeviceIdentity::new(name, address));
        self
    }

    pub fn without_permissions(mut self) -> Self {
        self.permissions = false;
        self
    }

    pub fn without_adapter(mut self) -> Self {
        self.present = false;
        self
    }

    pub fn powered_off(mut self) -> Self {
        self.powered = false;
        self
    }

    /// Make every open attempt with `strategy` fail.
    pub fn fail_strategy(mut self, strategy: OpenStrategy) -> Self {
        self.failing.push(strategy);
        self
    }

    /// Make every open attempt with `strategy` fail with a permission error.
    pub fn deny_strategy(mut self, strategy: OpenStrategy) -> Self {
        self.denied.push(strategy);
        self
    }

    /// Make the bonded-device query fail.
    pub fn failing_device_list(mut self) -> Self {
        self.device_list_fails = true;
        self
    }

    /// Queue a link to hand out on the next successful open.
    ///
    /// Once the queue is empty, fresh connected links are created and their
    /// device ends are kept open for the lifetime of the platform.
    pub fn push_link(&self, link: impl SerialLink + 'static) {
        self.scripted.lock().push_back(Box::new(link));
    }

    /// Every open attempt so far, in order.
    pub fn attempts(&self) -> Vec<(String, OpenStrategy)> {
        self.attempts.lock().clone()
    }
}

#[async_trait]
impl BluetoothPlatform for MockPlatform {
    fn has_permissions(&self) -> bool {
        self.permissions
    }

    fn adapter_present(&self) -> bool {
        self.present
    }

    async fn adapter_powered(&self) -> io::Result<bool> {
        Ok(self.powered)
    }

    async fn bonded_devices(&self) -> io::Result<Vec<DeviceIdentity>> {
        if self.device_list_fails {
            return Err(io::Error::new(io::ErrorKind::Other, "adapter query failed"));
        }
        Ok(self.devices.clone())
    }

    async fn open_link(
        &self,
        device: &DeviceIdentity,
        strategy: OpenStrategy,
    ) -> io::Result<BoxedLink> {
        self.attempts.lock().push((device.name.clone(), strategy));

        if self.denied.contains(&strategy) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("{} not permitted", strategy),
            ));
        }

        if self.failing.contains(&strategy) {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("{} refused by {}", strategy, device.address),
            ));
        }

        if let Some(link) = self.scripted.lock().pop_front() {
            return Ok(link);
        }

        let (link, peer) = MockLink::pair();
        self.peers.lock().push(peer);
        Ok(Box::new(link))
    }
}
