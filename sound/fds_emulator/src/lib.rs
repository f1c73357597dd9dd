//! # FDS Audio Emulator
//!
//! A sample-accurate emulation of the wavetable/FM oscillator in the Famicom
//! Disk System's expansion audio. The chip plays a 64 step, 6-bit wavetable
//! whose pitch is bent by a second table of modulation codes, and the
//! emulator reproduces the hardware's integer quirks exactly: the sweep bias
//! wraps, the modulation product is rounded in a peculiar way and the
//! counters reload from single-precision divisions.
//!
//! Output is a stream of amplitude deltas stamped with CPU cycle times, handed
//! to a [`DeltaSink`] which is responsible for turning them into PCM.
//!
//! ## Architecture
//!
//! - **Oscillator**: wavetable, modulation table, registers and the running
//!   counters. Knows how to step itself forward in time.
//! - **Fds**: the bus-facing chip. Validates register writes, catches the
//!   oscillator up to the time of each write before applying it, and rebases
//!   its clock at the end of every frame.
//!
//! ## Usage
//!
//! ```rust
//! use fds_emulator::Fds;
//! use sound_traits::DeltaLog;
//!
//! let mut fds = Fds::with_output(DeltaLog::new());
//!
//! // Load a square wave into wave RAM
//! fds.write_register(0, 0x4089, 0x80);
//! for i in 0..64 {
//!     fds.write_register(0, 0x4040 + i, if i < 32 { 0x3F } else { 0x00 });
//! }
//! fds.write_register(0, 0x4089, 0x00);
//!
//! // Full volume, pitch 0x200, no modulation
//! fds.write_register(10, 0x4080, 0xA0);
//! fds.write_register(20, 0x4082, 0x00);
//! fds.write_register(30, 0x4083, 0x02);
//! fds.write_register(40, 0x4087, 0x80);
//!
//! fds.end_frame(29780);
//! assert!(!fds.output().unwrap().is_empty());
//! ```
//!
//! ## Register Reference
//!
//! - `0x4040-0x407F`: wave RAM, writable only while `0x4089` bit 7 is set
//! - `0x4080`: volume envelope. Only direct mode (bit 7 set) is supported
//! - `0x4082-0x4083`: wave period low/high, `0x4083` bit 7 halts the wave
//! - `0x4084`: sweep envelope. Only direct mode (bit 7 set) is supported,
//!   the low 6 bits are the modulation gain
//! - `0x4085`: sweep bias (stored, not used by the direct mode)
//! - `0x4086-0x4087`: modulation period low/high, `0x4087` bit 7 halts it
//! - `0x4088`: modulation table push
//! - `0x4089`: wave write enable (bit 7), master volume (bits 0-1, must be 0)
//! - `0x408A`: envelope speed, reads back as `0xFF`

use std::{fmt::Display, ops::Index};

pub use sound_traits::{CpuAddr, CpuTime, DeltaSink, TrebleEq};

pub mod chip;
pub mod oscillator;

pub use chip::check_write;

/// First wave RAM address
pub const WAVE_ADDR: CpuAddr = 0x4040;
/// Entries in wave RAM
pub const WAVE_COUNT: usize = 0x40;
/// First control register address
pub const REGS_ADDR: CpuAddr = 0x4080;
/// Number of control registers
pub const REGS_COUNT: usize = 11;
/// Entries in the modulation table
pub const MODT_COUNT: usize = 64;

/// Lowest address the chip decodes
pub const START_ADDR: CpuAddr = WAVE_ADDR;
/// Highest address the chip decodes (inclusive)
pub const END_ADDR: CpuAddr = REGS_ADDR + REGS_COUNT as CpuAddr - 1;

/// Index of the status register. It always reads `0xFF`
pub const STATUS_REG: usize = 10;
const STATUS_VALUE: u8 = 0xFF;

/// Loudest volume the oscillator will play at, whatever the envelope says
pub const MAX_VOLUME: i32 = 0x20;

/// Span of amplitude units the oscillator can produce, used to scale the
/// volume handed to the sink
pub const AMP_RANGE: i32 = 2048;

/// Proportion of the nominal output the chip is mixed at
const VOLUME_SCALE: f64 = 0.25;

/// Numerator of the counter reload, `65536 / period` cycles per step
const COUNTER_RELOAD: f32 = 65536.0;

/// Phases index 64 entry tables
const PHASE_MASK: usize = 0x3F;

/// Sweep bias change for each modulation code
static MOD_TABLE: [i32; 8] = [0, 1, 2, 4, 0, -4, -2, -1];

/// Modulation code that resets the sweep bias instead of adding to it
const MOD_RESET: u8 = 4;

/// Register masks
const MASK_DIRECT: u8 = 0x80;
const MASK_HALT: u8 = 0x80;
const MASK_WAVE_WRITE: u8 = 0x80;
const MASK_MASTER_VOLUME: u8 = 0x03;
const MASK_PERIOD_HIGH: u8 = 0x0F;
const MASK_VOLUME: u8 = 0x3F;
const MASK_SAMPLE: u8 = 0x3F;
const MASK_MOD_CODE: u8 = 0x07;

/// Bias that centres a 6-bit wave RAM byte on zero
const SAMPLE_BIAS: i8 = 0x20;

/// The 64 entry history of modulation codes.
///
/// The hardware takes modulation writes two entries at a time, so each push
/// retires the two oldest codes and appends the new one twice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModTable([u8; MODT_COUNT]);

impl Default for ModTable {
    fn default() -> Self {
        Self([0; MODT_COUNT])
    }
}

impl ModTable {
    pub fn push(&mut self, code: u8) {
        self.0.copy_within(2.., 0);
        self.0[MODT_COUNT - 2] = code;
        self.0[MODT_COUNT - 1] = code;
    }

    pub fn clear(&mut self) {
        self.0.fill(0);
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

impl Index<usize> for ModTable {
    type Output = u8;

    fn index(&self, index: usize) -> &u8 {
        &self.0[index]
    }
}

/// Complete state of the FDS oscillator.
///
/// The counters are fractional; they are only truncated when deciding how far
/// the next step may go.
#[derive(Debug, Clone)]
pub struct Oscillator {
    /// Signed wave samples in -32..=31
    wave: [i8; WAVE_COUNT],
    /// Modulation code history
    mod_table: ModTable,
    /// Raw bytes last written to 0x4080-0x408A
    regs: [u8; REGS_COUNT],
    /// Cycles until the next modulation table step
    mod_count: f32,
    /// Cycles until the next wave step
    wav_count: f32,
    /// Position in the modulation table
    mod_phase: usize,
    /// Position in the wavetable
    phase: usize,
    /// Accumulated pitch offset, kept in -64..=63
    sweep_bias: i32,
    /// Volume requested through 0x4080
    volume_env: i32,
    /// Volume actually applied, latched at the start of each wave cycle
    volume: i32,
    /// Amplitude most recently sent to the sink
    last_amp: i32,
    /// Cycles to skip before the next step
    delay: CpuTime,
}

impl Default for Oscillator {
    fn default() -> Self {
        let mut regs = [0; REGS_COUNT];
        regs[STATUS_REG] = STATUS_VALUE;
        Self {
            wave: [0; WAVE_COUNT],
            mod_table: ModTable::default(),
            regs,
            mod_count: 0.0,
            wav_count: 0.0,
            mod_phase: 0,
            phase: 0,
            sweep_bias: 0,
            volume_env: MAX_VOLUME,
            volume: MAX_VOLUME,
            last_amp: 0,
            delay: 0,
        }
    }
}

/// The Famicom Disk System audio chip as seen from the CPU bus.
///
/// Register writes are applied immediately, but the oscillator is first run
/// up to the write's time so the change is heard at the right cycle. Times
/// are relative to the start of the current frame.
pub struct Fds<O> {
    osc: Oscillator,
    /// Time up to which the oscillator has been run
    last_time: CpuTime,
    /// Output volume after the chip's mix scaling
    volume: f64,
    treble: TrebleEq,
    /// Where deltas go. Without one the chip still runs, silently
    output: Option<O>,
}

/// A register write the chip can't accept. These are driver bugs or hardware
/// modes the emulator doesn't implement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteError {
    /// Address outside wave RAM and the control registers
    AddressOutOfRange(CpuAddr),
    /// 0x4080 written without the direct volume bit
    VolumeEnvelope(u8),
    /// 0x4084 written without the direct sweep bit
    SweepEnvelope(u8),
    /// 0x4089 written with a master volume attenuation
    MasterVolume(u8),
}

impl Display for WriteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriteError::AddressOutOfRange(addr) => write!(
                f,
                "address 0x{addr:04X} is outside 0x{START_ADDR:04X}-0x{END_ADDR:04X}"
            ),
            WriteError::VolumeEnvelope(data) => {
                write!(f, "volume envelope mode is not supported (0x{data:02X})")
            }
            WriteError::SweepEnvelope(data) => {
                write!(f, "sweep envelope mode is not supported (0x{data:02X})")
            }
            WriteError::MasterVolume(data) => {
                write!(f, "master volume attenuation is not supported (0x{data:02X})")
            }
        }
    }
}

impl std::error::Error for WriteError {}
