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

//! Bluetooth communication module.
//!
//! Handles the RFCOMM link to the blinds controller: connection lifecycle
//! with fallback open strategies, and the line-oriented command protocol.

mod bluez;
mod connection;
mod engine;
pub mod mock;
mod platform;
pub mod protocol;
mod state;

pub use bluez::BluezPlatform;
pub use connection::{ConnectionManager, DEFAULT_DEVICE_NAME};
pub use engine::{CommandEngine, POLL_INTERVAL, RESPONSE_GRACE, RESPONSE_TIMEOUT};
pub use platform::{
    BluetoothPlatform, BoxedLink, DeviceIdentity, OpenStrategy, SerialLink, FALLBACK_CHANNEL,
    OPEN_STRATEGIES, SPP_UUID,
};
pub use protocol::{BlindsAction, CommandFrame, Reply};
pub use state::LinkState;
