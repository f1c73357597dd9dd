//! # Oscillator Implementation
//!
//! Register side effects on the oscillator state and the time-stepped
//! synthesis loop. The loop never steps past the next modulation or wave
//! event, so every amplitude change lands on the exact cycle it happens.

use crate::*;

/// Truncated step bound for a countdown, the counter reaching zero included
fn step_bound(count: f32) -> CpuTime {
    (count + 1.0) as CpuTime
}

/// Keep the sweep bias in its 7-bit signed range
fn wrap_sweep_bias(mut bias: i32) -> i32 {
    while bias > 63 {
        bias -= 128;
    }
    while bias < -64 {
        bias += 128;
    }
    bias
}

/// The hardware's modulation amount for a bias and gain. The rounding and the
/// two wraps are straight from the silicon and are not symmetric.
fn modulation_amount(sweep_bias: i32, sweep_gain: i32) -> i32 {
    let product = sweep_bias * sweep_gain;
    let mut amount = if product & 0x0F != 0 {
        (product >> 4) + if sweep_bias < 0 { -1 } else { 2 }
    } else {
        product >> 4
    };

    if amount > 193 {
        amount -= 258;
    }
    if amount < -64 {
        amount += 256;
    }
    amount
}

impl Oscillator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// 12-bit wave period from 0x4082/0x4083
    pub fn wav_period(&self) -> i32 {
        ((self.regs[3] & MASK_PERIOD_HIGH) as i32) << 8 | self.regs[2] as i32
    }

    /// 12-bit modulation period from 0x4086/0x4087
    pub fn mod_period(&self) -> i32 {
        ((self.regs[7] & MASK_PERIOD_HIGH) as i32) << 8 | self.regs[6] as i32
    }

    /// Modulation gain, the low 6 bits of 0x4084
    pub fn sweep_gain(&self) -> i32 {
        (self.regs[4] & MASK_VOLUME) as i32
    }

    pub fn mod_enabled(&self) -> bool {
        self.mod_period() != 0 && self.regs[7] & MASK_HALT == 0
    }

    /// The wave plays unless halted, and wave RAM writes silence it
    pub fn wav_enabled(&self) -> bool {
        self.wav_period() != 0
            && self.regs[3] & MASK_HALT == 0
            && self.regs[9] & MASK_WAVE_WRITE == 0
    }

    pub fn wave_write_enabled(&self) -> bool {
        self.regs[9] & MASK_WAVE_WRITE != 0
    }

    pub fn wave(&self) -> &[i8; WAVE_COUNT] {
        &self.wave
    }

    pub fn mod_table(&self) -> &ModTable {
        &self.mod_table
    }

    pub fn registers(&self) -> &[u8; REGS_COUNT] {
        &self.regs
    }

    pub fn phase(&self) -> usize {
        self.phase
    }

    pub fn mod_phase(&self) -> usize {
        self.mod_phase
    }

    pub fn sweep_bias(&self) -> i32 {
        self.sweep_bias
    }

    pub fn volume(&self) -> i32 {
        self.volume
    }

    pub fn volume_env(&self) -> i32 {
        self.volume_env
    }

    pub fn last_amp(&self) -> i32 {
        self.last_amp
    }

    pub fn mod_count(&self) -> f32 {
        self.mod_count
    }

    pub fn wav_count(&self) -> f32 {
        self.wav_count
    }

    /// Amplitude the wave would output right now
    pub fn amplitude(&self) -> i32 {
        if self.wav_enabled() {
            self.wave[self.phase] as i32 * self.volume
        } else {
            0
        }
    }

    /// Store a wave RAM byte, ignored unless wave writes are enabled
    pub(crate) fn write_wave(&mut self, index: usize, data: u8) {
        if self.wave_write_enabled() {
            self.wave[index] = (data & MASK_SAMPLE) as i8 - SAMPLE_BIAS;
        }
    }

    /// Direct volume write. The new level is only latched at once if the wave
    /// is at the start of its cycle
    pub(crate) fn write_volume(&mut self, data: u8) {
        self.volume_env = ((data & MASK_VOLUME) as i32).min(MAX_VOLUME);
        if self.phase == 0 {
            self.volume = self.volume_env.min(MAX_VOLUME);
        }
    }

    pub(crate) fn push_mod(&mut self, data: u8) {
        self.mod_table.push(data & MASK_MOD_CODE);
    }

    /// Run from `time` to `end_time`, sending every amplitude change to
    /// `output`
    ///
    /// # Arguments
    /// * `time` - Where the previous run stopped
    /// * `end_time` - Where this run stops, not before `time`
    /// * `output` - Receives the deltas. `None` drops them
    pub(crate) fn run<S: DeltaSink>(
        &mut self,
        mut time: CpuTime,
        end_time: CpuTime,
        mut output: Option<&mut S>,
    ) {
        assert!(end_time >= time, "run to {end_time} is before {time}");

        time += self.delay;
        self.delay = 0;
        let mut last_amp = self.last_amp;

        while time < end_time {
            let mod_on = self.mod_enabled();
            let wav_on = self.wav_enabled();

            let mut sub_step = end_time - time;
            if mod_on {
                sub_step = sub_step.min(step_bound(self.mod_count));
            }
            if wav_on {
                sub_step = sub_step.min(step_bound(self.wav_count));
            }
            debug_assert!(sub_step > 0);

            let sub_freq = if mod_on {
                self.step_modulation(sub_step)
            } else {
                0
            };

            let mut amp = 0;
            if wav_on {
                amp = self.wave[self.phase] as i32 * self.volume;
                self.step_wave(sub_step, sub_freq);
            }

            let delta = amp - last_amp;
            if delta != 0 {
                if let Some(out) = output.as_mut() {
                    out.offset(time, delta);
                }
            }
            time += sub_step;
            last_amp = amp;
        }

        self.last_amp = last_amp;
    }

    /// Count down the modulation unit, apply the next table code when it
    /// expires, and return the resulting wave frequency offset
    fn step_modulation(&mut self, sub_step: CpuTime) -> i32 {
        self.mod_count -= sub_step as f32;
        if self.mod_count <= 0.0 {
            self.mod_count += COUNTER_RELOAD / self.mod_period() as f32;

            let code = self.mod_table[self.mod_phase];
            self.sweep_bias = if code == MOD_RESET {
                0
            } else {
                self.sweep_bias + MOD_TABLE[code as usize]
            };
            self.mod_phase = (self.mod_phase + 1) & PHASE_MASK;
        }

        self.sweep_bias = wrap_sweep_bias(self.sweep_bias);

        let amount = modulation_amount(self.sweep_bias, self.sweep_gain());
        (self.wav_period() * amount) >> 6
    }

    fn step_wave(&mut self, sub_step: CpuTime, sub_freq: i32) {
        let period = sub_freq + self.wav_period();
        if period > 0 {
            self.wav_count -= sub_step as f32;
            if self.wav_count <= 0.0 {
                self.wav_count += COUNTER_RELOAD / period as f32;
                self.phase = (self.phase + 1) & PHASE_MASK;
                if self.phase == 0 {
                    self.volume = self.volume_env.min(MAX_VOLUME);
                }
            }
        } else {
            // Modulation has pushed the pitch to zero or below. The hardware
            // keeps the wave counter in step with the modulator.
            self.wav_count = self.mod_count;
        }
    }
}
