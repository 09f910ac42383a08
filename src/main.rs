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

//! Smart Blinds link command-line front end.

use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use smartblinds_link::bluetooth::{
    BluetoothPlatform, BluezPlatform, CommandEngine, ConnectionManager,
};
use smartblinds_link::config::Config;
use smartblinds_link::schedule::{Schedule, TriggerMode};
use smartblinds_link::LinkResult;

#[derive(Parser)]
#[command(name = "smartblinds-link")]
#[command(about = "Control an ESP32 smart-blinds controller over Bluetooth")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Bonded device name (overrides the configured one)
    #[arg(short, long, global = true)]
    device: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show adapter state and bonded devices
    Status,
    /// Open the blinds
    Open,
    /// Close the blinds
    Close,
    /// Set the controller clock to the local time
    SyncTime,
    /// Send the schedule, with optional overrides of the configured values
    Settings {
        #[arg(long)]
        open_time: Option<String>,
        #[arg(long)]
        close_time: Option<String>,
        #[arg(long)]
        open_lux: Option<String>,
        #[arg(long)]
        close_lux: Option<String>,
        /// TIME or LIGHT
        #[arg(long)]
        open_mode: Option<String>,
        /// TIME or LIGHT
        #[arg(long)]
        close_mode: Option<String>,
    },
}

/// Work that needs a live link.
enum Request {
    Open,
    Close,
    SyncTime,
    Settings(Schedule),
}

fn parse_mode(value: &str) -> Result<TriggerMode> {
    TriggerMode::parse(value).ok_or_else(|| anyhow!("Invalid trigger mode '{}'", value))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("smartblinds_link={}", level).parse()?),
        )
        .init();

    let config = Config::load()?;
    let device_name = cli.device.unwrap_or(config.device.name);

    let platform = BluezPlatform::new().await?;
    let manager = ConnectionManager::with_default_device(platform, device_name.clone());

    let request = match cli.command {
        Commands::Status => return print_status(&manager).await,
        Commands::Open => Request::Open,
        Commands::Close => Request::Close,
        Commands::SyncTime => Request::SyncTime,
        Commands::Settings {
            open_time,
            close_time,
            open_lux,
            close_lux,
            open_mode,
            close_mode,
        } => {
            let mut schedule: Schedule = config.schedule;
            if let Some(v) = open_time {
                schedule.open_time = v;
            }
            if let Some(v) = close_time {
                schedule.close_time = v;
            }
            if let Some(v) = open_lux {
                schedule.open_lux = v;
            }
            if let Some(v) = close_lux {
                schedule.close_lux = v;
            }
            if let Some(v) = open_mode {
                schedule.open_mode = parse_mode(&v)?;
            }
            if let Some(v) = close_mode {
                schedule.close_mode = parse_mode(&v)?;
            }
            schedule.normalize()?;
            Request::Settings(schedule)
        }
    };

    if !manager.connect(&device_name).await {
        bail!(
            "Failed to connect to {}: {}",
            device_name,
            manager
                .state()
                .last_error()
                .unwrap_or_else(|| "socket not connected".to_string())
        );
    }

    let engine = CommandEngine::new(manager.clone());
    let result: LinkResult = match request {
        Request::Open => engine.open_blinds().await,
        Request::Close => engine.close_blinds().await,
        Request::SyncTime => engine.sync_time().await,
        Request::Settings(schedule) => engine.send_settings(schedule.to_settings()).await,
    };

    manager.disconnect().await;

    match result {
        Ok(()) => {
            info!("Request acknowledged by {}", device_name);
            println!("OK");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

async fn print_status<P: BluetoothPlatform>(manager: &ConnectionManager<P>) -> Result<()> {
    println!("Bluetooth supported: {}", manager.is_supported());
    println!("Bluetooth enabled:   {}", manager.is_enabled().await);

    match manager.platform().bonded_devices().await {
        Ok(devices) => {
            println!("Bonded devices:");
            for device in devices {
                let marker = if device.name.eq_ignore_ascii_case(manager.default_device()) {
                    "*"
                } else {
                    " "
                };
                println!(" {} {} ({})", marker, device.name, device.address);
            }
        }
        Err(e) => println!("Bonded devices unavailable: {}", e),
    }

    if let Some(err) = manager.state().last_error() {
        println!("Last error: {}", err);
    }
    Ok(())
}
