//! WiFi Control Daemon (wifictld)
//!
//! Brings the radio up in AP+STA mode, serves the management AP and optionally
//! holds a station link until SIGINT/SIGTERM.
//!
//! # Usage
//!
//! ```bash
//! # Start with defaults (requires root/sudo)
//! sudo wifictld
//!
//! # Keep a station link to a network on channel 6
//! sudo wifictld --connect-ssid HomeNet --connect-channel 6 --password secret123
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use libwifictl::{
    AuthMode, LinuxRadioDriver, MacAddress, NetworkDescriptor, RadioController, WifiCtlConfig,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

/// WiFi Control Daemon
#[derive(Parser, Debug)]
#[command(name = "wifictld")]
#[command(version)]
#[command(about = "WiFi radio controller - management AP and station link", long_about = None)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Connect the station role to this SSID
    #[arg(long)]
    connect_ssid: Option<String>,

    /// Channel of the station network
    #[arg(long, default_value_t = 1)]
    connect_channel: u8,

    /// Station network password (open network when omitted)
    #[arg(long, requires = "connect_ssid")]
    password: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args);

    info!("Starting WiFi Control Daemon (wifictld)");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = match &args.config {
        Some(path) => WifiCtlConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => WifiCtlConfig::default(),
    };

    // Check if running as root
    #[cfg(target_os = "linux")]
    {
        let uid = unsafe { libc::geteuid() };
        if uid != 0 {
            warn!("Not running as root - radio operations will likely fail");
        }
    }

    let driver = Arc::new(LinuxRadioDriver::new(config.linux.clone())?);
    let radio = RadioController::new(driver, config.mgmt_ap.clone());

    radio.initialize().await.context("Radio initialization failed")?;
    radio
        .start_management_ap()
        .await
        .context("Failed to start management AP")?;
    info!("Management AP {} up", config.mgmt_ap.ssid);

    if let Some(ssid) = &args.connect_ssid {
        let auth_mode = if args.password.is_some() {
            AuthMode::Wpa2Psk
        } else {
            AuthMode::Open
        };
        let target = NetworkDescriptor::new(
            ssid.as_bytes(),
            MacAddress::default(),
            args.connect_channel,
            auth_mode,
        );
        info!("Connecting station to {} on channel {}", ssid, args.connect_channel);
        if let Err(e) = radio.connect_station(&target, args.password.as_deref()).await {
            if e.is_fatal() {
                return Err(e).context("Station connect failed");
            }
            error!("Station connect rejected: {}", e);
        }
    }

    wait_for_shutdown().await?;

    info!("Shutting down WiFi Control Daemon...");
    if let Err(e) = radio.stop_access_point().await {
        error!("Failed to stop AP: {}", e);
    }
    if let Err(e) = radio.restore_ap_mac().await {
        error!("Failed to restore AP MAC: {}", e);
    }

    info!("WiFi Control Daemon stopped");
    Ok(())
}

/// Initialize logging based on command-line arguments
fn init_logging(args: &Args) {
    let log_level = if args.verbose {
        "debug"
    } else {
        &args.log_level
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("wifictld={},libwifictl={}", log_level, log_level)));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_ansi(atty::is(atty::Stream::Stdout))
        .init();
}

/// Wait for SIGTERM or SIGINT
async fn wait_for_shutdown() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to register SIGTERM handler")?;
        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to register SIGINT handler")?;

        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM, initiating graceful shutdown"),
            _ = sigint.recv() => info!("Received SIGINT (Ctrl+C), initiating graceful shutdown"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl+C")?;
    }

    Ok(())
}
