//! cartfs command-line harness.
//!
//! # Usage
//!
//! ```bash
//! # Verify the controller answers a power cycle
//! cartfs --port 19876 cycle
//!
//! # Store a local file on the device and read it back
//! cartfs roundtrip ./some-file.bin
//! ```
//!
//! One invocation is one power cycle: power-on zeroes every cartridge, so
//! device contents do not outlive the process.

use std::{error::Error, fs, net::IpAddr, path::PathBuf};

use cartfs_core::{DEFAULT_CACHE_FRAMES, Driver, DriverConfig};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Cartridge filesystem driver harness
#[derive(Parser, Debug)]
#[command(name = "cartfs")]
#[command(about = "Exercise a cartfs controller over TCP")]
#[command(version)]
struct Args {
    /// Controller address
    #[arg(long, default_value_t = cartfs_proto::DEFAULT_ADDRESS)]
    address: IpAddr,

    /// Controller TCP port
    #[arg(long, default_value_t = cartfs_proto::DEFAULT_PORT)]
    port: u16,

    /// Frame cache capacity in frames (0 disables the cache)
    #[arg(long, default_value_t = DEFAULT_CACHE_FRAMES)]
    cache_frames: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Power the device on and off again
    Cycle,

    /// Store a local file on the device, read it back, and verify
    Roundtrip {
        /// Local file to store
        path: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let config = DriverConfig {
        address: args.address,
        port: args.port,
        cache_frames: args.cache_frames,
    };
    tracing::info!(controller = %config.controller_addr(), "starting");

    match args.command {
        Command::Cycle => {
            let driver = Driver::poweron(&config)?;
            driver.poweroff()?;
            tracing::info!("power cycle complete");
        },

        Command::Roundtrip { path } => {
            let contents = fs::read(&path)?;
            let name = path
                .file_name()
                .map_or_else(|| b"upload".to_vec(), |n| n.as_encoded_bytes().to_vec());

            let mut driver = Driver::poweron(&config)?;
            let handle = driver.open(&name)?;
            driver.write(handle, &contents)?;
            driver.seek(handle, 0)?;

            let mut readback = vec![0u8; contents.len()];
            let got = driver.read(handle, &mut readback)?;
            driver.close(handle)?;
            driver.poweroff()?;

            if got != contents.len() || readback != contents {
                return Err(format!(
                    "readback mismatch: stored {} bytes, read {got}",
                    contents.len()
                )
                .into());
            }
            tracing::info!(bytes = contents.len(), "roundtrip verified");
        },
    }

    Ok(())
}
