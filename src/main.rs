// Copyright 2025 coScene
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

use anyhow::{bail, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use edge_datasync::config::{apply_overrides, load_config, LoggingConfig};
use edge_datasync::storage::{recovery, DurableStore, StoreSettings, SystemClock};
use edge_datasync::DataSync;

/// Edge data sync - store-and-forward bridge between the local and remote MQTT brokers
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the base configuration file
    #[arg(short, long, default_value = "config/datasync.yaml")]
    default: PathBuf,

    /// Path to the user override configuration file
    #[arg(short, long, default_value = "config/datasync_user.yaml")]
    config: PathBuf,
}

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    // Initialize tracing with configured level
    let log_level = match logging.level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let builder = FmtSubscriber::builder().with_max_level(log_level);
    if logging.format == "json" {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

async fn shutdown_signal(token: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("Received Ctrl+C, shutting down"),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
                }
            }
            Err(e) => {
                tracing::warn!("Unable to listen for SIGTERM: {}", e);
                let _ = tokio::signal::ctrl_c().await;
                info!("Received Ctrl+C, shutting down");
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received Ctrl+C, shutting down");
    }
    token.cancel();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Load the base file first so logging is up before the user file merges
    let mut config = load_config(&args.default)?;
    init_tracing(&config.logging)?;

    let user_path = args.config.exists().then_some(args.config.as_path());
    apply_overrides(&mut config, user_path)?;

    info!("Starting edge data sync");
    info!("Loaded configuration from: {:?}", args.default);
    info!("Device ID: {}", config.mqtt.client_id);
    info!("Main folder: {}", config.server.main_folder);

    if !Path::new(&config.server.main_folder).is_dir() {
        bail!(
            "Main folder {} does not exist or is not a directory",
            config.server.main_folder
        );
    }

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    if config.server.wait_time_seconds > 0 {
        info!("Waiting {}s before starting", config.server.wait_time_seconds);
        tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            _ = tokio::time::sleep(Duration::from_secs(config.server.wait_time_seconds)) => {}
        }
    }

    let store = Arc::new(DurableStore::new(
        StoreSettings::from_config(&config),
        Arc::new(SystemClock),
        recovery::from_config(&config.recovery),
        shutdown.clone(),
    ));

    DataSync::new(config, store, shutdown).run().await?;

    info!("Edge data sync shut down successfully");
    Ok(())
}
