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

//! Request/response exchanges with the blinds controller.

use chrono::{Local, NaiveDateTime};
use futures::FutureExt;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use super::connection::ConnectionManager;
use super::platform::{BluetoothPlatform, BoxedLink};
use super::protocol::{BlindsAction, CommandFrame, Reply};
use crate::error::{LinkError, LinkResult};

/// Wait before the first read so the reply can start arriving.
pub const RESPONSE_GRACE: Duration = Duration::from_millis(100);

/// Pause between reads while no terminator has been seen.
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Upper bound on waiting for a terminated reply.
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

const READ_CHUNK: usize = 1024;

/// Most chunks discarded before a request; a peer that keeps sending cannot hold it back.
const MAX_DRAIN_CHUNKS: usize = 16;

/// Sends requests over the manager's link and classifies the replies.
///
/// Exchanges hold the link for their whole duration, so concurrent calls
/// are serialized rather than interleaved on the wire.
pub struct CommandEngine<P> {
    manager: ConnectionManager<P>,
}

impl<P> Clone for CommandEngine<P> {
    fn clone(&self) -> Self {
        Self {
            manager: self.manager.clone(),
        }
    }
}

impl<P: BluetoothPlatform> CommandEngine<P> {
    /// Create an engine that talks over `manager`'s link.
    pub fn new(manager: ConnectionManager<P>) -> Self {
        Self { manager }
    }

    /// The connection manager this engine sends through.
    pub fn manager(&self) -> &ConnectionManager<P> {
        &self.manager
    }

    /// Send a bare opcode.
    pub async fn send_command(&self, opcode: u8) -> LinkResult {
        info!("Sending command: {}", opcode);
        self.exchange(CommandFrame::Command(opcode)).await
    }

    /// Open the blinds now.
    pub async fn open_blinds(&self) -> LinkResult {
        self.send_command(BlindsAction::Open.opcode()).await
    }

    /// Close the blinds now.
    pub async fn close_blinds(&self) -> LinkResult {
        self.send_command(BlindsAction::Close.opcode()).await
    }

    /// Send schedule settings; keys are written in iteration order.
    pub async fn send_settings<K, V>(&self, settings: impl IntoIterator<Item = (K, V)>) -> LinkResult
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.exchange(CommandFrame::settings(settings)).await
    }

    /// Set the controller clock to the host's local time.
    pub async fn sync_time(&self) -> LinkResult {
        self.sync_time_at(Local::now().naive_local()).await
    }

    /// Set the controller clock to `at`.
    pub async fn sync_time_at(&self, at: NaiveDateTime) -> LinkResult {
        self.exchange(CommandFrame::SyncTime(at)).await
    }

    async fn exchange(&self, frame: CommandFrame) -> LinkResult {
        let state = self.manager.state();

        if !self.manager.platform().has_permissions() {
            let err = LinkError::Unauthorized;
            state.set_error(&err);
            return Err(err);
        }

        let mut slot = self.manager.lock_link().await;

        let link = match slot.as_mut() {
            Some(link) if state.is_connected() => link,
            _ => {
                let err = LinkError::NotConnected;
                state.set_error(&err);
                return Err(err);
            }
        };

        let line = frame.encode();
        debug!("Sending: {}", line.trim_end());

        let err = match transact(link, line.as_bytes()).await {
            Ok(reply) => {
                debug!("Received response: {}", reply.trim_end());
                return Ok(());
            }
            Err(err) => err,
        };

        match err {
            LinkError::Io(_) | LinkError::Unauthorized => {
                let lost = !link.is_connected();
                self.manager.mark_lost(&mut slot, &err);
                drop(slot);
                if lost && err.is_io() {
                    self.manager.spawn_reconnect();
                }
            }
            _ => {
                warn!("Request {} failed: {}", frame.opcode(), err);
                state.set_error(&err);
            }
        }

        Err(err)
    }
}

/// Drain stale input, write the request, then wait for a terminated reply.
async fn transact(link: &mut BoxedLink, request: &[u8]) -> LinkResult<String> {
    let io_err = |e: io::Error| LinkError::from_io(&e);

    drain(link).map_err(io_err)?;
    link.write_all(request).await.map_err(io_err)?;
    link.flush().await.map_err(io_err)?;

    let mut reply = Vec::new();
    match timeout(RESPONSE_TIMEOUT, read_reply(link, &mut reply)).await {
        Ok(result) => result.map_err(io_err)?,
        Err(_) => {
            warn!(
                "No reply within {:?} ({} bytes received: {:?})",
                RESPONSE_TIMEOUT,
                reply.len(),
                String::from_utf8_lossy(&reply)
            );
            return Err(LinkError::Timeout);
        }
    }

    let text = String::from_utf8_lossy(&reply).into_owned();
    match Reply::classify(&reply) {
        Reply::Ok => Ok(text),
        _ => Err(LinkError::Protocol(text.trim().to_string())),
    }
}

/// Discard whatever is already buffered from an earlier exchange.
fn drain(link: &mut BoxedLink) -> io::Result<()> {
    let mut buf = [0u8; READ_CHUNK];
    let mut discarded = 0;

    for _ in 0..MAX_DRAIN_CHUNKS {
        let Some(read) = link.read(&mut buf).now_or_never() else {
            break;
        };
        match read? {
            0 => break,
            n => discarded += n,
        }
    }

    if discarded > 0 {
        debug!("Discarded {} stale bytes", discarded);
    }
    Ok(())
}

/// Accumulate reply bytes until a terminator token shows up.
async fn read_reply(link: &mut BoxedLink, reply: &mut Vec<u8>) -> io::Result<()> {
    let mut buf = [0u8; READ_CHUNK];

    sleep(RESPONSE_GRACE).await;

    loop {
        if let Some(read) = link.read(&mut buf).now_or_never() {
            match read? {
                0 => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "connection closed by remote",
                    ))
                }
                n => reply.extend_from_slice(&buf[..n]),
            }
        }

        if Reply::classify(reply) != Reply::Incomplete {
            return Ok(());
        }

        sleep(POLL_INTERVAL).await;
    }
}
