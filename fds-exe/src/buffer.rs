//! A plain step buffer: deltas are summed per output sample and integrated
//! into 16-bit PCM when a frame ends. There is no band limiting, so expect
//! some aliasing on high pitches.

use std::path::Path;

use log::debug;
use sound_traits::{CpuTime, DeltaSink, TrebleEq};

pub struct StepBuffer {
    clock_rate: f64,
    sample_rate: u32,
    /// Full-scale fraction per amplitude unit
    gain: f64,
    treble: TrebleEq,
    /// CPU clock at the start of the current frame
    frame_start: CpuTime,
    /// Samples already integrated
    flushed: u64,
    /// Amplitude change landing in each sample from `flushed` onwards
    pending: Vec<i64>,
    level: i64,
    samples: Vec<i16>,
}

impl StepBuffer {
    pub fn new(clock_rate: f64, sample_rate: u32) -> Self {
        Self {
            clock_rate,
            sample_rate,
            gain: 1.0 / i16::MAX as f64,
            treble: TrebleEq::default(),
            frame_start: 0,
            flushed: 0,
            pending: Vec::new(),
            level: 0,
            samples: Vec::new(),
        }
    }

    fn sample_index(&self, clock: CpuTime) -> u64 {
        (clock as f64 * self.sample_rate as f64 / self.clock_rate) as u64
    }

    fn to_pcm(&self, level: i64) -> i16 {
        let scaled = (level as f64 * self.gain * i16::MAX as f64).round();
        scaled.clamp(i16::MIN as f64, i16::MAX as f64) as i16
    }

    /// Integrate everything up to `time` in the current frame into samples
    /// and start the next frame there
    pub fn end_frame(&mut self, time: CpuTime) {
        self.frame_start += time;
        let end = self.sample_index(self.frame_start);
        let count = end.saturating_sub(self.flushed) as usize;

        for i in 0..count {
            self.level += self.pending.get(i).copied().unwrap_or(0);
            self.samples.push(self.to_pcm(self.level));
        }
        self.pending.drain(..count.min(self.pending.len()));
        self.flushed = self.flushed.max(end);
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn treble_eq(&self) -> TrebleEq {
        self.treble
    }

    pub fn write_wav(&self, path: &Path) -> Result<(), hound::Error> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec)?;
        for &sample in &self.samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()
    }
}

impl DeltaSink for StepBuffer {
    fn offset(&mut self, time: CpuTime, delta: i32) {
        let index = self.sample_index(self.frame_start + time);
        let slot = index.saturating_sub(self.flushed) as usize;
        if slot >= self.pending.len() {
            self.pending.resize(slot + 1, 0);
        }
        self.pending[slot] += delta as i64;
    }

    fn set_volume(&mut self, gain: f64) {
        self.gain = gain;
    }

    fn set_treble_eq(&mut self, eq: TrebleEq) {
        debug!("Step buffer keeps {eq:?} but does not shape treble");
        self.treble = eq;
    }
}
