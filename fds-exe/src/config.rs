//! User configuration options.

use crate::CLIOptions;
use dirs::config_dir;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use sound_traits::TrebleEq;
use std::{error::Error, fmt, fs, path::PathBuf};

const LOG_TAG: &str = "PlayerConfig";
const BASE_DIR: &str = "fds-player/";

/// NTSC Famicom CPU clock
pub const NTSC_CLOCK_RATE: f64 = 1_789_773.0;

fn get_cfg_file() -> Option<PathBuf> {
    let mut dir = config_dir()?;
    dir.push(BASE_DIR);
    dir.push("config.toml");
    Some(dir)
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    ClockRate(f64),
    SampleRate(u32),
    Volume(f64),
}

impl Error for ConfigError {}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ClockRate(r) => write!(f, "clock rate {r} must be a positive number"),
            ConfigError::SampleRate(r) => write!(f, "sample rate {r} must be above zero"),
            ConfigError::Volume(v) => write!(f, "volume {v} must be a finite number"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub volume: f64,
    pub clock_rate: f64,
    pub sample_rate: u32,
    pub treble_db: f64,
    pub treble_rolloff_freq: i64,
    pub treble_cutoff_freq: i64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            volume: 1.0,
            clock_rate: NTSC_CLOCK_RATE,
            sample_rate: 44100,
            treble_db: 0.0,
            treble_rolloff_freq: 0,
            treble_cutoff_freq: 0,
        }
    }
}

impl PlayerConfig {
    /// `load` reads the given config, or the user config if there is one.
    /// Anything missing or unreadable falls back to defaults.
    pub fn load(path: Option<&str>) -> Self {
        let path = match path.map(PathBuf::from).or_else(get_cfg_file) {
            Some(path) if path.exists() => path,
            _ => {
                info!(target: LOG_TAG, "No config file, using defaults");
                return Self::default();
            }
        };

        match fs::read_to_string(&path) {
            Ok(buf) => match Self::parse(&buf) {
                Ok(config) => {
                    info!(target: LOG_TAG, "Loaded config from {:?}", path);
                    config
                }
                Err(e) => {
                    warn!(target: LOG_TAG, "Could not deserialise {:?}: {}", path, e);
                    Self::default()
                }
            },
            Err(e) => {
                warn!(target: LOG_TAG, "Could not read {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    pub fn parse(buf: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(buf)
    }

    /// CLI options win over the config file
    pub fn sync_cli(&mut self, cli: &CLIOptions) {
        if let Some(volume) = cli.volume {
            self.volume = volume;
        }
        if let Some(rate) = cli.sample_rate {
            self.sample_rate = rate;
        }
        if let Some(rate) = cli.clock_rate {
            self.clock_rate = rate;
        }
        if let Some(db) = cli.treble_db {
            self.treble_db = db;
        }
        info!(target: LOG_TAG, "Using {:?}", self);
    }

    /// Both rates must be positive and finite, and volume finite.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.clock_rate.is_finite() && self.clock_rate > 0.0) {
            return Err(ConfigError::ClockRate(self.clock_rate));
        }
        if self.sample_rate == 0 {
            return Err(ConfigError::SampleRate(self.sample_rate));
        }
        if !self.volume.is_finite() {
            return Err(ConfigError::Volume(self.volume));
        }
        Ok(())
    }

    pub fn treble_eq(&self) -> TrebleEq {
        TrebleEq {
            treble_db: self.treble_db,
            rolloff_freq: self.treble_rolloff_freq,
            sample_rate: self.sample_rate as i64,
            cutoff_freq: self.treble_cutoff_freq,
        }
    }
}
