#![doc = include_str!("../../README.md")]

mod buffer;
mod cli;
mod config;
mod script;

use std::error::Error;
use std::fs;
use std::io::{self, Write};
use std::path::Path;

use cli::*;
use fds_emulator::Fds;
use log::{info, LevelFilter};
use simplelog::TermLogger;
use sound_traits::DeltaLog;

use crate::buffer::StepBuffer;
use crate::config::PlayerConfig;
use crate::script::Script;

const DEFAULT_OUT: &str = "fds.wav";

fn main() -> Result<(), Box<dyn Error>> {
    let options: CLIOptions = argh::from_env();

    TermLogger::init(
        options.verbose.unwrap_or(LevelFilter::Warn),
        simplelog::ConfigBuilder::default()
            .set_time_level(LevelFilter::Trace)
            .build(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    let mut config = PlayerConfig::load(options.config.as_deref());
    config.sync_cli(&options);
    config.validate()?;

    let text = fs::read_to_string(&options.script)?;
    let script = Script::parse(&text)?;
    info!("Parsed {} frames from {}", script.frames.len(), options.script);

    if options.dump_deltas {
        dump_deltas(&script, &config, &mut io::stdout().lock())?;
    } else {
        let out = options.out.as_deref().unwrap_or(DEFAULT_OUT);
        render(&script, &config, Path::new(out))?;
    }
    Ok(())
}

/// Run the script through a step buffer and save it as WAV
fn render(script: &Script, config: &PlayerConfig, out: &Path) -> Result<(), Box<dyn Error>> {
    let mut fds = Fds::with_output(StepBuffer::new(config.clock_rate, config.sample_rate));
    fds.set_volume(config.volume);
    fds.treble_eq(config.treble_eq());

    for frame in &script.frames {
        frame.play(&mut fds);
        if let Some(buffer) = fds.output_mut() {
            buffer.end_frame(frame.length);
        }
    }

    let buffer = fds.into_output().ok_or("chip lost its output")?;
    info!(
        "Rendered {} frames, {} samples",
        script.frames.len(),
        buffer.samples().len()
    );
    buffer.write_wav(out)?;
    info!("Wrote {:?}", out);
    Ok(())
}

/// Print each frame's deltas as `frame time delta`
fn dump_deltas(
    script: &Script,
    config: &PlayerConfig,
    out: &mut impl Write,
) -> Result<(), Box<dyn Error>> {
    let mut fds = Fds::with_output(DeltaLog::new());
    fds.set_volume(config.volume);
    fds.treble_eq(config.treble_eq());

    for (index, frame) in script.frames.iter().enumerate() {
        frame.play(&mut fds);
        if let Some(log) = fds.output_mut() {
            for (time, delta) in log.take() {
                writeln!(out, "{index} {time} {delta}")?;
            }
        }
    }
    Ok(())
}
