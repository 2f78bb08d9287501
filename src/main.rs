//! Command-line entry point.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use kanal::{DeviceManager, Outcome, PlaybackController, PlaybackSession};

#[derive(Parser, Debug)]
#[command(name = "kanal")]
#[command(about = "Plays a sound file on a chosen output channel")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List available audio output devices
    ListDevices,
    /// Play an audio file on a specific output channel
    Play {
        /// Path to the sound file
        #[arg(long)]
        file: PathBuf,
        /// 1-based output channel index
        #[arg(long, default_value_t = 1)]
        channel: u16,
        /// Output device name (system default when omitted)
        #[arg(long)]
        device: Option<String>,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "kanal=info".into()),
        )
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::ListDevices => list_devices(),
        Command::Play {
            file,
            channel,
            device,
        } => play(file, channel, device),
    }
}

fn list_devices() -> anyhow::Result<()> {
    let manager = DeviceManager::new();
    let devices = manager.list_devices().context("device enumeration failed")?;
    if devices.is_empty() {
        println!("no output devices found");
        return Ok(());
    }

    println!("[[ {} ]]", devices[0].backend);
    for device in &devices {
        println!(
            "  - {} ({} ch, {} Hz)",
            device.name, device.channels, device.sample_rate
        );
    }
    Ok(())
}

fn play(file: PathBuf, channel: u16, device: Option<String>) -> anyhow::Result<()> {
    anyhow::ensure!(
        file.is_file(),
        "no such file: {}",
        file.display()
    );

    let mut controller = PlaybackController::new(DeviceManager::new());
    let outcome = controller
        .play(PlaybackSession {
            file,
            channel,
            device,
        })
        .context("playback failed")?;

    match outcome {
        Outcome::Finished => info!("playback finished"),
        Outcome::Stopped => info!("playback stopped"),
    }
    Ok(())
}
