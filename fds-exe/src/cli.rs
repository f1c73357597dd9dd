use argh::FromArgs;
use log::LevelFilter;

/// Render a Famicom Disk System register-write script to audio
#[derive(Debug, Clone, FromArgs)]
pub struct CLIOptions {
    /// verbose level: off, error, warn, info, debug, trace
    #[argh(option)]
    pub verbose: Option<LevelFilter>,
    /// path to the register-write script
    #[argh(positional)]
    pub script: String,
    /// write a mono 16-bit WAV file here
    #[argh(option)]
    pub out: Option<String>,
    /// print every amplitude delta instead of rendering audio
    #[argh(switch)]
    pub dump_deltas: bool,
    /// path to a config file, instead of the user config
    #[argh(option)]
    pub config: Option<String>,
    /// output volume, 1.0 is nominal
    #[argh(option)]
    pub volume: Option<f64>,
    /// output sample rate in Hz
    #[argh(option)]
    pub sample_rate: Option<u32>,
    /// emulated CPU clock rate in Hz
    #[argh(option)]
    pub clock_rate: Option<f64>,
    /// treble attenuation in dB, negative is duller
    #[argh(option)]
    pub treble_db: Option<f64>,
}
