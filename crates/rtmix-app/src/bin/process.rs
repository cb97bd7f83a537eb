//! Offline WAV file processor
//!
//! Renders a WAV file through the same engine callback the live stream uses,
//! block by block, without touching any audio device. Handy for listening to
//! parameter settings and for regression checks.

use anyhow::{Context, Result};
use clap::Parser;
use hound::{WavReader, WavWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rtmix_audio::{DuplexBlock, EngineCallback};
use rtmix_comms::{LevelMeters, ParameterStore, StatusFlags, create_event_channel};
use rtmix_core::{CompressorSettings, EqSettings, MixerParameters, db};

/// Offline WAV file processor
#[derive(Parser, Debug)]
#[command(name = "rtmix-process")]
#[command(about = "Render WAV files through the gain/compressor/EQ chain", long_about = None)]
struct Args {
    /// Input WAV file
    #[arg(short, long)]
    input: PathBuf,

    /// Output WAV file
    #[arg(short, long)]
    output: PathBuf,

    /// Processing block size
    #[arg(short, long, default_value_t = 512)]
    block_size: usize,

    /// Input gain (dB)
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    gain: f32,

    /// Compressor threshold (dBFS)
    #[arg(long, default_value_t = CompressorSettings::default().threshold_db, allow_hyphen_values = true)]
    threshold: f32,

    /// Compressor ratio (1 = off)
    #[arg(long, default_value_t = CompressorSettings::default().ratio)]
    ratio: f32,

    /// Compressor attack (ms)
    #[arg(long, default_value_t = CompressorSettings::default().attack_ms)]
    attack: f32,

    /// Compressor release (ms)
    #[arg(long, default_value_t = CompressorSettings::default().release_ms)]
    release: f32,

    /// EQ center frequency (Hz)
    #[arg(long, default_value_t = EqSettings::default().frequency)]
    eq_frequency: f32,

    /// EQ gain (dB)
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    eq_gain: f32,

    /// EQ quality factor
    #[arg(long, default_value_t = EqSettings::default().q)]
    eq_q: f32,

    /// Output gain (dB)
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    output_gain: f32,
}

impl Args {
    fn parameters(&self) -> MixerParameters {
        MixerParameters {
            gain_db: self.gain,
            compressor: CompressorSettings {
                threshold_db: self.threshold,
                ratio: self.ratio,
                attack_ms: self.attack,
                release_ms: self.release,
            },
            eq: EqSettings {
                frequency: self.eq_frequency,
                gain_db: self.eq_gain,
                q: self.eq_q,
            },
            output_gain_db: self.output_gain,
        }
    }
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
    anyhow::ensure!(args.block_size > 0, "Block size must be at least 1");

    tracing::info!("rtmix-process: Offline WAV processor");
    tracing::info!("Input:  {:?}", args.input);
    tracing::info!("Output: {:?}", args.output);
    tracing::info!("Block size: {}", args.block_size);

    let (samples, spec) = read_wav(&args.input)?;
    let channel_count = usize::from(spec.channels);
    anyhow::ensure!(channel_count > 0, "Input file has no channels");

    let parameters = args.parameters();
    tracing::info!("Parameters: {:?}", parameters);

    let output_samples = render(
        &samples,
        channel_count,
        spec.sample_rate,
        parameters,
        args.block_size,
    );

    tracing::info!(
        "Peak level: {:.1} dBFS in, {:.1} dBFS out",
        peak_db(&samples),
        peak_db(&output_samples)
    );

    write_wav(&args.output, &output_samples, spec)?;
    tracing::info!("Done! Output written to {:?}", args.output);

    Ok(())
}

/// Read a WAV file as interleaved f32 samples
fn read_wav(path: &Path) -> Result<(Vec<f32>, hound::WavSpec)> {
    let mut reader = WavReader::open(path)
        .with_context(|| format!("Failed to open input file: {}", path.display()))?;

    let spec = reader.spec();
    tracing::info!(
        "Input format: {} Hz, {} channels, {} bits, {:?}",
        spec.sample_rate,
        spec.channels,
        spec.bits_per_sample,
        spec.sample_format
    );

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read float samples")?,
        hound::SampleFormat::Int => match spec.bits_per_sample {
            16 => reader
                .samples::<i16>()
                .map(|s| s.map(|sample| f32::from(sample) / f32::from(i16::MAX)))
                .collect::<Result<Vec<_>, _>>()
                .context("Failed to read 16-bit samples")?,
            24 => reader
                .samples::<i32>()
                .map(|s| s.map(|sample| sample as f32 / 8_388_608.0)) // 2^23
                .collect::<Result<Vec<_>, _>>()
                .context("Failed to read 24-bit samples")?,
            32 => reader
                .samples::<i32>()
                .map(|s| s.map(|sample| sample as f32 / i32::MAX as f32))
                .collect::<Result<Vec<_>, _>>()
                .context("Failed to read 32-bit samples")?,
            bits => anyhow::bail!("Unsupported bit depth: {bits}"),
        },
    };

    tracing::info!(
        "Read {} frames ({} samples)",
        samples.len() / usize::from(spec.channels.max(1)),
        samples.len()
    );
    Ok((samples, spec))
}

/// Run interleaved samples through a fresh engine callback, one block at a time
fn render(
    samples: &[f32],
    channel_count: usize,
    sample_rate: u32,
    parameters: MixerParameters,
    block_size: usize,
) -> Vec<f32> {
    let store = Arc::new(ParameterStore::with_initial(
        parameters,
        rtmix_core::DeviceSelection::default(),
    ));
    let meters = Arc::new(LevelMeters::default());
    // Nobody reads events offline; a full ring just drops them
    let (event_tx, _event_rx) = create_event_channel(1);
    let mut callback = EngineCallback::new(
        store,
        channel_count,
        sample_rate,
        block_size,
        meters,
        event_tx,
    );

    let mut output = vec![0.0_f32; samples.len() - samples.len() % channel_count];
    let block_samples = block_size * channel_count;
    for (input_block, output_block) in samples
        .chunks(block_samples)
        .zip(output.chunks_mut(block_samples))
    {
        callback.process_block(DuplexBlock {
            input: input_block,
            input_channels: channel_count,
            output: output_block,
            output_channels: channel_count,
            status: StatusFlags::default(),
        });
    }

    tracing::info!("Processed {} frames total", output.len() / channel_count);
    output
}

fn peak_db(samples: &[f32]) -> f32 {
    // Use fold instead of max_by to avoid panic on NaN
    let peak = samples.iter().fold(0.0_f32, |max, &s| max.max(s.abs()));
    db::from_gain(peak, -120.0)
}

/// Write interleaved samples to WAV file
fn write_wav(path: &Path, samples: &[f32], spec: hound::WavSpec) -> Result<()> {
    let mut writer = WavWriter::create(path, spec)
        .with_context(|| format!("Failed to create output file: {}", path.display()))?;

    match spec.sample_format {
        hound::SampleFormat::Float => {
            for &sample in samples {
                writer
                    .write_sample(sample)
                    .context("Failed to write float sample")?;
            }
        }
        hound::SampleFormat::Int => match spec.bits_per_sample {
            16 => {
                for &sample in samples {
                    let int_sample = (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16;
                    writer
                        .write_sample(int_sample)
                        .context("Failed to write 16-bit sample")?;
                }
            }
            24 => {
                for &sample in samples {
                    let int_sample = (sample.clamp(-1.0, 1.0) * 8_388_607.0) as i32; // 2^23 - 1
                    writer
                        .write_sample(int_sample)
                        .context("Failed to write 24-bit sample")?;
                }
            }
            32 => {
                for &sample in samples {
                    let int_sample = (sample.clamp(-1.0, 1.0) * i32::MAX as f32) as i32;
                    writer
                        .write_sample(int_sample)
                        .context("Failed to write 32-bit sample")?;
                }
            }
            bits => anyhow::bail!("Unsupported output bit depth: {bits}"),
        },
    }

    writer.finalize().context("Failed to finalize WAV file")?;
    Ok(())
}
