use std::ops::RangeInclusive;

mod delta_log;
pub use delta_log::*;

/// Emulated CPU clock cycles, relative to the start of the current frame
pub type CpuTime = i64;
/// Address on the emulated CPU bus
pub type CpuAddr = u32;

/// Treble response shaping handed through to whatever turns deltas into PCM.
/// The chips never look at these values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrebleEq {
    /// Attenuation at half the sample rate, in dB. Negative is duller.
    pub treble_db: f64,
    /// Frequency where the treble rolloff begins, 0 for the sink's default
    pub rolloff_freq: i64,
    pub sample_rate: i64,
    /// Upper cutoff, 0 for none
    pub cutoff_freq: i64,
}

impl Default for TrebleEq {
    fn default() -> Self {
        Self {
            treble_db: 0.0,
            rolloff_freq: 0,
            sample_rate: 44100,
            cutoff_freq: 0,
        }
    }
}

impl TrebleEq {
    pub fn new(treble_db: f64) -> Self {
        Self {
            treble_db,
            ..Default::default()
        }
    }
}

/// Receives the amplitude changes an oscillator produces. Events arrive in
/// non-decreasing time order within a frame and the sink is never read back
/// by the chip.
pub trait DeltaSink {
    /// Amplitude changed by `delta` units at `time`
    fn offset(&mut self, time: CpuTime, delta: i32);

    /// Linear gain per amplitude unit, where 1.0 maps one unit to full scale
    fn set_volume(&mut self, _gain: f64) {}

    fn set_treble_eq(&mut self, _eq: TrebleEq) {}
}

impl<S: DeltaSink + ?Sized> DeltaSink for &mut S {
    fn offset(&mut self, time: CpuTime, delta: i32) {
        (**self).offset(time, delta)
    }

    fn set_volume(&mut self, gain: f64) {
        (**self).set_volume(gain)
    }

    fn set_treble_eq(&mut self, eq: TrebleEq) {
        (**self).set_treble_eq(eq)
    }
}

impl<S: DeltaSink + ?Sized> DeltaSink for Box<S> {
    fn offset(&mut self, time: CpuTime, delta: i32) {
        (**self).offset(time, delta)
    }

    fn set_volume(&mut self, gain: f64) {
        (**self).set_volume(gain)
    }

    fn set_treble_eq(&mut self, eq: TrebleEq) {
        (**self).set_treble_eq(eq)
    }
}

/// A register-driven sound chip that is stepped by an external driver. Writes
/// and frame ends within one frame must be presented in time order.
pub trait SoundChip {
    /// The bus addresses the chip decodes
    const ADDRESSES: RangeInclusive<CpuAddr>;

    fn reset(&mut self);

    fn write_register(&mut self, time: CpuTime, addr: CpuAddr, data: u8);

    /// Finish the frame at `time` and rebase the chip's clock so the next
    /// frame starts at zero
    fn end_frame(&mut self, time: CpuTime);

    /// Overall output volume, 1.0 being the chip's nominal level
    fn set_volume(&mut self, volume: f64);

    fn set_treble_eq(&mut self, eq: TrebleEq);
}
