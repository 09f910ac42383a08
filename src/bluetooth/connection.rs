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

//! Connection lifecycle for the blinds controller link.

use std::io;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::platform::{BluetoothPlatform, BoxedLink, DeviceIdentity, OPEN_STRATEGIES};
use super::state::LinkState;
use crate::error::{LinkError, LinkResult};

/// Device name used when none is given, and for background reconnects.
pub const DEFAULT_DEVICE_NAME: &str = "ESP32test";

struct Shared<P> {
    platform: P,
    state: LinkState,
    link: Mutex<Option<BoxedLink>>,
    default_device: String,
    reconnect: parking_lot::Mutex<Option<JoinHandle<bool>>>,
}

/// Owns the single link to the controller and publishes its state.
///
/// Cheap to clone; clones share the same link and state.
pub struct ConnectionManager<P> {
    inner: Arc<Shared<P>>,
}

impl<P> Clone for ConnectionManager<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Map a platform failure outside of an exchange.
fn platform_error(err: io::Error) -> LinkError {
    if err.kind() == io::ErrorKind::PermissionDenied {
        LinkError::Unauthorized
    } else {
        LinkError::Unexpected(err.to_string())
    }
}

impl<P: BluetoothPlatform> ConnectionManager<P> {
    /// Create a manager that reconnects to [`DEFAULT_DEVICE_NAME`].
    pub fn new(platform: P) -> Self {
        Self::with_default_device(platform, DEFAULT_DEVICE_NAME)
    }

    /// Create a manager with a custom default device name.
    pub fn with_default_device(platform: P, device_name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Shared {
                platform,
                state: LinkState::new(),
                link: Mutex::new(None),
                default_device: device_name.into(),
                reconnect: parking_lot::Mutex::new(None),
            }),
        }
    }

    /// The underlying Bluetooth platform.
    pub fn platform(&self) -> &P {
        &self.inner.platform
    }

    /// Connectivity and last-error signals.
    pub fn state(&self) -> &LinkState {
        &self.inner.state
    }

    /// Device name used by [`connect_default`](Self::connect_default) and reconnects.
    pub fn default_device(&self) -> &str {
        &self.inner.default_device
    }

    /// Whether the current link reports connected.
    pub fn is_connected(&self) -> bool {
        self.inner.state.is_connected()
    }

    /// Whether a Bluetooth radio is present.
    pub fn is_supported(&self) -> bool {
        self.inner.platform.adapter_present()
    }

    /// Whether the radio is present, permitted and powered on.
    pub async fn is_enabled(&self) -> bool {
        match self.check_enabled().await {
            Ok(()) => true,
            Err(e) => {
                self.inner.state.set_error(&e);
                false
            }
        }
    }

    async fn check_enabled(&self) -> LinkResult {
        let platform = &self.inner.platform;
        if !platform.has_permissions() {
            return Err(LinkError::Unauthorized);
        }
        if !platform.adapter_present() {
            return Err(LinkError::Unsupported);
        }
        match platform.adapter_powered().await {
            Ok(true) => Ok(()),
            Ok(false) => Err(LinkError::Disabled),
            Err(e) => Err(platform_error(e)),
        }
    }

    /// Connect to the default device.
    pub async fn connect_default(&self) -> bool {
        let name = self.inner.default_device.clone();
        self.connect(&name).await
    }

    /// Connect to a bonded device by name.
    ///
    /// Any existing link is closed first. Returns whether the new link
    /// reports itself connected; failures are published as the last error.
    pub async fn connect(&self, device_name: &str) -> bool {
        info!("Starting connection attempt to {}", device_name);

        if let Err(e) = self.check_enabled().await {
            error!("Cannot connect: {}", e);
            self.inner.state.set_error(&e);
            return false;
        }

        let mut slot = self.inner.link.lock().await;
        self.close_link(&mut slot).await;

        match self.open(device_name, &mut slot).await {
            Ok(connected) => connected,
            Err(e) => {
                error!("Connection to {} failed: {}", device_name, e);
                self.close_link(&mut slot).await;
                self.inner.state.set_error(&e);
                false
            }
        }
    }

    async fn open(&self, device_name: &str, slot: &mut Option<BoxedLink>) -> LinkResult<bool> {
        let device = self.find_device(device_name).await?;
        info!("Found device: {} ({})", device.name, device.address);

        let mut last_failure = None;
        for strategy in OPEN_STRATEGIES {
            debug!("Attempting {} connection...", strategy);
            match self.inner.platform.open_link(&device, strategy).await {
                Ok(link) => {
                    *slot = Some(link);
                    break;
                }
                Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                    return Err(LinkError::Unauthorized);
                }
                Err(e) => {
                    warn!("{} connection failed: {}", strategy, e);
                    last_failure = Some(e);
                }
            }
        }

        let Some(link) = slot.as_ref() else {
            let reason = last_failure
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no strategy available".to_string());
            return Err(LinkError::ConnectFailed(reason));
        };

        let connected = link.is_connected();
        self.inner.state.set_connected(connected);
        if connected {
            self.inner.state.clear_error();
            info!("Connection established successfully");
        } else {
            warn!("Socket opened but does not report connected");
        }
        Ok(connected)
    }

    async fn find_device(&self, device_name: &str) -> LinkResult<DeviceIdentity> {
        let devices = self
            .inner
            .platform
            .bonded_devices()
            .await
            .map_err(platform_error)?;

        for device in &devices {
            debug!("Paired device: '{}' with address {}", device.name, device.address);
        }

        let wanted = device_name.to_lowercase();
        devices
            .into_iter()
            .find(|d| d.name.to_lowercase() == wanted)
            .ok_or_else(|| LinkError::DeviceNotFound(device_name.to_string()))
    }

    /// Close the link if open. Never fails; close errors only update the last error.
    pub async fn disconnect(&self) {
        let mut slot = self.inner.link.lock().await;
        self.close_link(&mut slot).await;
    }

    async fn close_link(&self, slot: &mut Option<BoxedLink>) {
        if let Some(mut link) = slot.take() {
            debug!("Closing link");
            if let Err(e) = link.shutdown().await {
                let err = match e.kind() {
                    io::ErrorKind::PermissionDenied => LinkError::Unauthorized,
                    _ => LinkError::Close(e.to_string()),
                };
                warn!("{}", err);
                self.inner.state.set_error(&err);
            }
        }
        self.inner.state.set_connected(false);
    }

    /// Exclusive access to the link for one exchange.
    pub(crate) async fn lock_link(&self) -> MutexGuard<'_, Option<BoxedLink>> {
        self.inner.link.lock().await
    }

    /// Drop a link that failed mid-exchange.
    pub(crate) fn mark_lost(&self, slot: &mut Option<BoxedLink>, err: &LinkError) {
        *slot = None;
        self.inner.state.set_connected(false);
        self.inner.state.set_error(err);
        info!("Connection lost: {}", err);
    }

    /// Start one background reconnect to the default device, unless one is running.
    pub(crate) fn spawn_reconnect(&self) {
        let mut pending = self.inner.reconnect.lock();
        if pending.as_ref().is_some_and(|h| !h.is_finished()) {
            debug!("Reconnect already in progress");
            return;
        }

        let manager = self.clone();
        let name = self.inner.default_device.clone();
        info!("Scheduling background reconnect to {}", name);
        *pending = Some(tokio::spawn(async move { manager.connect(&name).await }));
    }

    /// Wait for the last background reconnect, if any. Returns its outcome.
    ///
    /// A reconnect task that panicked or was cancelled counts as a failed reconnect.
    pub async fn wait_for_reconnect(&self) -> Option<bool> {
        let handle = self.inner.reconnect.lock().take()?;
        match handle.await {
            Ok(connected) => Some(connected),
            Err(e) => {
                error!("Background reconnect did not complete: {}", e);
                Some(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bluetooth::mock::{MockLink, MockPlatform};
    use crate::bluetooth::platform::OpenStrategy;

    fn manager(platform: MockPlatform) -> ConnectionManager<MockPlatform> {
        ConnectionManager::new(platform)
    }

    #[tokio::test]
    async fn test_connect_first_strategy() {
        let mgr = manager(MockPlatform::new().with_device("ESP32test", "AA:BB:CC:DD:EE:FF"));

        assert!(mgr.connect(DEFAULT_DEVICE_NAME).await);
        assert!(mgr.is_connected());
        assert_eq!(mgr.state().last_error(), None);
        assert_eq!(
            mgr.platform().attempts(),
            vec![("ESP32test".to_string(), OpenStrategy::Insecure)]
        );
    }

    #[tokio::test]
    async fn test_connect_falls_back_to_secure() {
        let platform = MockPlatform::new()
            .with_device("ESP32test", "AA:BB:CC:DD:EE:FF")
            .fail_strategy(OpenStrategy::Insecure);
        let mgr = manager(platform);

        assert!(mgr.connect("ESP32test").await);
        assert!(mgr.is_connected());
        assert_eq!(mgr.state().last_error(), None);

        let strategies: Vec<_> = mgr.platform().attempts().into_iter().map(|(_, s)| s).collect();
        assert_eq!(strategies, vec![OpenStrategy::Insecure, OpenStrategy::Secure]);
    }

    #[tokio::test]
    async fn test_connect_all_strategies_fail() {
        let platform = MockPlatform::new()
            .with_device("ESP32test", "AA:BB:CC:DD:EE:FF")
            .fail_strategy(OpenStrategy::Insecure)
            .fail_strategy(OpenStrategy::Secure)
            .fail_strategy(OpenStrategy::Channel(1));
        let mgr = manager(platform);

        assert!(!mgr.connect("ESP32test").await);
        assert!(!mgr.is_connected());
        assert_eq!(mgr.platform().attempts().len(), 3);

        let err = mgr.state().last_error().unwrap();
        assert!(err.starts_with("Connection failed:"));
        assert!(err.contains("RFCOMM channel 1"));
    }

    #[tokio::test]
    async fn test_connect_case_insensitive_name() {
        let mgr = manager(MockPlatform::new().with_device("ESP32Test", "AA:BB:CC:DD:EE:FF"));
        assert!(mgr.connect("esp32TEST").await);
    }

    #[tokio::test]
    async fn test_connect_device_not_found() {
        let mgr = manager(MockPlatform::new().with_device("Headphones", "11:22:33:44:55:66"));

        assert!(!mgr.connect("ESP32test").await);
        assert!(!mgr.is_connected());
        assert_eq!(
            mgr.state().last_error().as_deref(),
            Some("Device 'ESP32test' not found in paired devices")
        );
        assert!(mgr.platform().attempts().is_empty());
    }

    #[tokio::test]
    async fn test_connect_preconditions() {
        let mgr = manager(MockPlatform::new().without_permissions());
        assert!(!mgr.connect("ESP32test").await);
        assert_eq!(
            mgr.state().last_error().as_deref(),
            Some("Missing Bluetooth permissions")
        );

        let mgr = manager(MockPlatform::new().without_adapter());
        assert!(!mgr.is_supported());
        assert!(!mgr.connect("ESP32test").await);
        assert_eq!(
            mgr.state().last_error().as_deref(),
            Some("Bluetooth not supported on this device")
        );

        let mgr = manager(MockPlatform::new().powered_off());
        assert!(mgr.is_supported());
        assert!(!mgr.connect("ESP32test").await);
        assert_eq!(
            mgr.state().last_error().as_deref(),
            Some("Bluetooth is not enabled")
        );
    }

    #[tokio::test]
    async fn test_is_enabled_fails_closed() {
        let mgr = manager(MockPlatform::new().without_permissions());
        assert!(!mgr.is_enabled().await);
        assert_eq!(
            mgr.state().last_error().as_deref(),
            Some("Missing Bluetooth permissions")
        );

        let mgr = manager(MockPlatform::new());
        assert!(mgr.is_enabled().await);
    }

    #[tokio::test]
    async fn test_unverified_socket_stays_disconnected() {
        let platform = MockPlatform::new().with_device("ESP32test", "AA:BB:CC:DD:EE:FF");
        let (link, _peer) = MockLink::pair();
        platform.push_link(link.reporting_disconnected());
        let mgr = manager(platform);

        assert!(!mgr.connect("ESP32test").await);
        assert!(!mgr.is_connected());
        assert_eq!(mgr.state().last_error(), None);
    }

    #[tokio::test]
    async fn test_disconnect_without_link() {
        let mgr = manager(MockPlatform::new());
        mgr.disconnect().await;
        mgr.disconnect().await;
        assert!(!mgr.is_connected());
        assert_eq!(mgr.state().last_error(), None);
    }

    #[tokio::test]
    async fn test_disconnect_after_connect() {
        let mgr = manager(MockPlatform::new().with_device("ESP32test", "AA:BB:CC:DD:EE:FF"));
        let mut rx = mgr.state().subscribe_connected();

        assert!(mgr.connect("ESP32test").await);
        assert!(*rx.borrow_and_update());

        mgr.disconnect().await;
        rx.changed().await.unwrap();
        assert!(!*rx.borrow());
    }

    #[tokio::test]
    async fn test_reconnect_closes_previous_link() {
        let mgr = manager(MockPlatform::new().with_device("ESP32test", "AA:BB:CC:DD:EE:FF"));

        assert!(mgr.connect("ESP32test").await);
        assert!(mgr.connect("ESP32test").await);
        assert!(mgr.is_connected());
        assert_eq!(mgr.platform().attempts().len(), 2);
    }

    #[tokio::test]
    async fn test_disconnect_reports_close_failure() {
        let platform = MockPlatform::new().with_device("ESP32test", "AA:BB:CC:DD:EE:FF");
        let (link, _peer) = MockLink::pair();
        platform.push_link(link.failing_close());
        let mgr = manager(platform);

        assert!(mgr.connect("ESP32test").await);
        mgr.disconnect().await;

        assert!(!mgr.is_connected());
        assert_eq!(
            mgr.state().last_error().as_deref(),
            Some("Disconnect error: close failed")
        );

        // The link is gone even though closing it failed
        mgr.disconnect().await;
        assert!(!mgr.is_connected());
    }

    #[tokio::test]
    async fn test_denied_strategy_aborts_connect() {
        let platform = MockPlatform::new()
            .with_device("ESP32test", "AA:BB:CC:DD:EE:FF")
            .deny_strategy(OpenStrategy::Insecure);
        let mgr = manager(platform);

        assert!(!mgr.connect("ESP32test").await);
        assert!(!mgr.is_connected());
        assert_eq!(
            mgr.state().last_error().as_deref(),
            Some("Missing Bluetooth permissions")
        );
        assert_eq!(
            mgr.platform().attempts(),
            vec![("ESP32test".to_string(), OpenStrategy::Insecure)]
        );
    }

    #[tokio::test]
    async fn test_device_list_failure() {
        let platform = MockPlatform::new()
            .with_device("ESP32test", "AA:BB:CC:DD:EE:FF")
            .failing_device_list();
        let mgr = manager(platform);

        assert!(!mgr.connect("ESP32test").await);
        assert!(!mgr.is_connected());
        assert_eq!(
            mgr.state().last_error().as_deref(),
            Some("Connection error: adapter query failed")
        );
        assert!(mgr.platform().attempts().is_empty());
    }

    #[tokio::test]
    async fn test_panicked_reconnect_counts_as_failure() {
        let mgr = manager(MockPlatform::new());
        assert_eq!(mgr.wait_for_reconnect().await, None);

        *mgr.inner.reconnect.lock() = Some(tokio::spawn(async { panic!("reconnect crashed") }));
        assert_eq!(mgr.wait_for_reconnect().await, Some(false));
        assert_eq!(mgr.wait_for_reconnect().await, None);
    }
}
