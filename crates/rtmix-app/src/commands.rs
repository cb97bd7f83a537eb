//! Line-based control commands read from stdin.

use anyhow::{Context, Result, bail};
use rtmix_audio::MixerControl;
use rtmix_comms::{Levels, METER_FLOOR_DB};
use rtmix_core::{CompressorSettings, DeviceId, DeviceSelection, EqSettings, db};

pub const HELP: &str = "\
Commands:
  gain <db>                      input gain
  out <db>                       output gain
  comp <thr> <ratio> <atk> <rel> compressor (dB, ratio, ms, ms)
  eq <freq> <gain> <q>           peaking EQ (Hz, dB, Q)
  select <in|-> <out|->          device ids, '-' for the system default
  devices                        list devices
  state                          show parameters and devices
  levels                         show input/output meters
  help                           this text
  quit                           stop and exit";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Gain(f32),
    OutputGain(f32),
    Compressor(CompressorSettings),
    Eq(EqSettings),
    Select(DeviceSelection),
    Devices,
    State,
    Levels,
    Help,
    Quit,
}

/// Parse one input line. Blank lines and `#` comments give `None`.
pub fn parse(line: &str) -> Result<Option<Command>> {
    let mut words = line.split_whitespace();
    let Some(name) = words.next() else {
        return Ok(None);
    };
    if name.starts_with('#') {
        return Ok(None);
    }
    let args: Vec<&str> = words.collect();

    let command = match (name, args.as_slice()) {
        ("gain", [gain]) => Command::Gain(number(gain)?),
        ("out", [gain]) => Command::OutputGain(number(gain)?),
        ("comp", [threshold, ratio, attack, release]) => Command::Compressor(CompressorSettings {
            threshold_db: number(threshold)?,
            ratio: number(ratio)?,
            attack_ms: number(attack)?,
            release_ms: number(release)?,
        }),
        ("eq", [frequency, gain, q]) => Command::Eq(EqSettings {
            frequency: number(frequency)?,
            gain_db: number(gain)?,
            q: number(q)?,
        }),
        ("select", [input, output]) => {
            Command::Select(DeviceSelection::new(device_id(input)?, device_id(output)?))
        }
        ("devices", []) => Command::Devices,
        ("state", []) => Command::State,
        ("levels", []) => Command::Levels,
        ("help" | "?", []) => Command::Help,
        ("quit" | "exit", []) => Command::Quit,
        (
            "gain" | "out" | "comp" | "eq" | "select" | "devices" | "state" | "levels" | "help"
            | "quit",
            _,
        ) => bail!("wrong number of arguments for '{name}' (try 'help')"),
        _ => bail!("unknown command '{name}' (try 'help')"),
    };
    Ok(Some(command))
}

fn number(word: &str) -> Result<f32> {
    let value: f32 = word
        .parse()
        .with_context(|| format!("'{word}' is not a number"))?;
    if !value.is_finite() {
        bail!("'{word}' is not a finite number");
    }
    Ok(value)
}

fn device_id(word: &str) -> Result<Option<DeviceId>> {
    if word == "-" {
        return Ok(None);
    }
    word.parse()
        .map(Some)
        .with_context(|| format!("'{word}' is not a device id"))
}

/// Run a command against the engine. Returns `false` once the user quits.
pub fn execute(command: Command, control: &MixerControl) -> Result<bool> {
    match command {
        Command::Gain(gain_db) => {
            let mut params = control.get_parameters();
            params.gain_db = gain_db;
            control.set_parameters(params);
        }
        Command::OutputGain(gain_db) => {
            let mut params = control.get_parameters();
            params.output_gain_db = gain_db;
            control.set_parameters(params);
        }
        Command::Compressor(settings) => {
            let mut params = control.get_parameters();
            params.compressor = settings;
            control.set_parameters(params);
        }
        Command::Eq(settings) => {
            let mut params = control.get_parameters();
            params.eq = settings;
            control.set_parameters(params);
        }
        Command::Select(selection) => {
            if control.set_device_selection(selection)? {
                println!("Switching devices...");
            } else {
                println!("Devices unchanged");
            }
        }
        Command::Devices => {
            for device in control.list_devices()? {
                println!(
                    "  [{:2}] {} ({} in, {} out, {} Hz)",
                    device.id,
                    device.name,
                    device.max_input_channels,
                    device.max_output_channels,
                    device.default_sample_rate
                );
            }
        }
        Command::State => {
            let params = control.get_parameters();
            let selection = control.get_device_selection();
            println!("  gain        {:+.1} dB", params.gain_db);
            println!(
                "  compressor  {:.1} dB, {:.1}:1, {:.1} ms / {:.1} ms",
                params.compressor.threshold_db,
                params.compressor.ratio,
                params.compressor.attack_ms,
                params.compressor.release_ms
            );
            println!(
                "  eq          {:.1} Hz, {:+.1} dB, Q {:.2}",
                params.eq.frequency, params.eq.gain_db, params.eq.q
            );
            println!("  output      {:+.1} dB", params.output_gain_db);
            println!(
                "  devices     in {}, out {}",
                describe_device(selection.input_device),
                describe_device(selection.output_device)
            );
        }
        Command::Levels => {
            let levels = control.levels();
            println!("{}", meter_line(&levels));
        }
        Command::Help => println!("{HELP}"),
        Command::Quit => {
            control.shutdown();
            return Ok(false);
        }
    }
    Ok(true)
}

fn describe_device(id: Option<DeviceId>) -> String {
    id.map_or_else(|| "default".to_string(), |id| id.to_string())
}

const METER_WIDTH: usize = 30;

/// Two text meters spanning the meter range
pub fn meter_line(levels: &Levels) -> String {
    format!(
        "  in  {:>6.1} dB [{}]\n  out {:>6.1} dB [{}]",
        db::from_gain(levels.input_rms, METER_FLOOR_DB),
        bar(levels.input_normalized()),
        db::from_gain(levels.output_rms, METER_FLOOR_DB),
        bar(levels.output_normalized())
    )
}

fn bar(normalized: f32) -> String {
    let filled = (normalized * METER_WIDTH as f32).round() as usize;
    let filled = filled.min(METER_WIDTH);
    format!("{}{}", "#".repeat(filled), " ".repeat(METER_WIDTH - filled))
}
