//! Generate a test WAV file with a sine wave tone
//!
//! Useful for testing the rtmix-process tool. With `--burst` the tone
//! alternates between full and reduced amplitude, which makes compressor
//! attack and release easy to hear and to see in a waveform view.

use anyhow::{Context, Result};
use clap::Parser;
use hound::{WavSpec, WavWriter};
use std::f32::consts::PI;
use std::path::PathBuf;

/// Generate a test WAV file with a sine wave
#[derive(Parser, Debug)]
#[command(name = "generate-test-wav")]
#[command(about = "Generate test WAV files for audio processing", long_about = None)]
struct Args {
    /// Output WAV file
    #[arg(short, long)]
    output: PathBuf,

    /// Sample rate (Hz)
    #[arg(short, long, default_value_t = 48000)]
    sample_rate: u32,

    /// Number of channels
    #[arg(short, long, default_value_t = 2)]
    channels: u16,

    /// Duration (seconds)
    #[arg(short, long, default_value_t = 5.0)]
    duration: f32,

    /// Frequency (Hz)
    #[arg(short, long, default_value_t = 440.0)]
    frequency: f32,

    /// Amplitude (0.0-1.0)
    #[arg(short, long, default_value_t = 0.5)]
    amplitude: f32,

    /// Alternate loud and quiet sections of this length (ms)
    #[arg(long)]
    burst: Option<f32>,

    /// Level of the quiet sections relative to the loud ones (dB)
    #[arg(long, default_value_t = -24.0, allow_hyphen_values = true)]
    burst_drop: f32,
}

/// Amplitude envelope: 1 for loud sections, `quiet` for the others
fn burst_gain(frame: usize, burst_frames: Option<usize>, quiet: f32) -> f32 {
    match burst_frames {
        Some(len) if len > 0 && (frame / len) % 2 == 1 => quiet,
        _ => 1.0,
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    anyhow::ensure!(args.channels > 0, "Channel count must be at least 1");

    println!("Generating test WAV:");
    println!("  Output: {}", args.output.display());
    println!("  Sample rate: {} Hz", args.sample_rate);
    println!("  Channels: {}", args.channels);
    println!("  Duration: {:.1} seconds", args.duration);
    println!("  Frequency: {:.1} Hz", args.frequency);
    println!("  Amplitude: {:.2}", args.amplitude);
    if let Some(burst) = args.burst {
        println!("  Bursts: {burst:.0} ms, quiet at {:.1} dB", args.burst_drop);
    }

    let spec = WavSpec {
        channels: args.channels,
        sample_rate: args.sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };

    let mut writer = WavWriter::create(&args.output, spec)
        .with_context(|| format!("Failed to create output file: {}", args.output.display()))?;

    let num_frames = (args.sample_rate as f32 * args.duration) as usize;
    let burst_frames = args
        .burst
        .map(|ms| (ms * 0.001 * args.sample_rate as f32) as usize);
    let quiet = rtmix_core::db::to_gain(args.burst_drop);

    for frame in 0..num_frames {
        let t = frame as f32 / args.sample_rate as f32;
        let sample = args.amplitude
            * burst_gain(frame, burst_frames, quiet)
            * (2.0 * PI * args.frequency * t).sin();

        // Write same sample to all channels
        for _ in 0..args.channels {
            writer
                .write_sample(sample)
                .context("Failed to write sample")?;
        }
    }

    writer.finalize().context("Failed to finalize WAV file")?;

    println!("Successfully wrote {num_frames} frames");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_gain() {
        assert_eq!(burst_gain(0, None, 0.1), 1.0);
        assert_eq!(burst_gain(5, Some(10), 0.1), 1.0);
        assert_eq!(burst_gain(10, Some(10), 0.1), 0.1);
        assert_eq!(burst_gain(25, Some(10), 0.1), 1.0);
        // A zero-length burst means no bursts
        assert_eq!(burst_gain(3, Some(0), 0.1), 1.0);
    }
}
