//! rtmix - live gain, compression and EQ between an input and an output device
//!
//! Main application entry point. The stream manager runs on the main thread;
//! control commands are read from stdin on a second thread.

mod commands;

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rtmix_audio::{AudioBackend, AudioConfig, CpalBackend, MixerControl, create_engine};
use rtmix_core::DeviceId;

/// Real-time per-channel gain, compressor and peaking EQ
#[derive(Parser, Debug)]
#[command(name = "rtmix")]
#[command(about = "Process a live input device into an output device", long_about = None)]
struct Args {
    /// Configuration file (RON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Input device id (see --list-devices)
    #[arg(short, long)]
    input: Option<DeviceId>,

    /// Output device id (see --list-devices)
    #[arg(short, long)]
    output: Option<DeviceId>,

    /// Frames per block
    #[arg(short, long)]
    block_size: Option<usize>,

    /// Print the available devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Write the effective configuration to this file and exit
    #[arg(long)]
    save_config: Option<PathBuf>,
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rtmix=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = effective_config(&args)?;

    if let Some(path) = &args.save_config {
        config
            .save(path)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        println!("Configuration written to {}", path.display());
        return Ok(());
    }

    let backend: Arc<dyn AudioBackend> = Arc::new(CpalBackend::new());
    tracing::info!("Using audio host: {}", backend.name());

    if args.list_devices {
        print_devices(backend.as_ref())?;
        return Ok(());
    }

    tracing::info!("Audio config: {:?}", config);
    let engine = create_engine(backend, config);
    engine
        .manager
        .start()
        .context("Failed to open audio stream")?;

    let control = engine.control.clone();
    std::thread::Builder::new()
        .name("rtmix-control".into())
        .spawn(move || command_loop(&control))
        .context("Failed to spawn control thread")?;

    println!("rtmix running. Type 'help' for commands.");
    engine.manager.run(&engine.signals);

    tracing::info!("rtmix shutting down");
    Ok(())
}

/// Defaults, then the config file, then command line flags
fn effective_config(args: &Args) -> Result<AudioConfig> {
    let mut config = match &args.config {
        Some(path) => AudioConfig::load(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => AudioConfig::default(),
    };

    if args.input.is_some() {
        config.devices.input_device = args.input;
    }
    if args.output.is_some() {
        config.devices.output_device = args.output;
    }
    if let Some(block_size) = args.block_size {
        config.block_size = block_size;
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn print_devices(backend: &dyn AudioBackend) -> Result<()> {
    let devices = backend.devices().context("Failed to enumerate devices")?;
    if devices.is_empty() {
        println!("No audio devices found.");
        return Ok(());
    }

    println!("Audio devices ({}):", backend.name());
    for device in devices {
        println!(
            "  [{:2}] {} ({} in, {} out, {} Hz)",
            device.id,
            device.name,
            device.max_input_channels,
            device.max_output_channels,
            device.default_sample_rate
        );
    }
    Ok(())
}

/// Read commands until `quit` or end of input, then stop the engine
fn command_loop(control: &MixerControl) {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let Ok(line) = line else {
            break;
        };
        match commands::parse(&line) {
            Ok(Some(command)) => match commands::execute(command, control) {
                Ok(true) => {}
                Ok(false) => return,
                Err(e) => println!("error: {e:#}"),
            },
            Ok(None) => {}
            Err(e) => println!("error: {e:#}"),
        }
    }
    control.shutdown();
}
