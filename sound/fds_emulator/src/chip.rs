//! # Chip Implementation
//!
//! The bus side of the FDS: register decoding, the catch-up that keeps
//! register changes on the right cycle, and per-frame clock rebasing.

use log::{debug, trace};
use sound_traits::SoundChip;

use crate::*;

/// Check a write without applying it
///
/// # Returns
/// The reason the chip would refuse the write, if it would
pub fn check_write(addr: CpuAddr, data: u8) -> Result<(), WriteError> {
    if !(START_ADDR..=END_ADDR).contains(&addr) {
        return Err(WriteError::AddressOutOfRange(addr));
    }
    if addr < REGS_ADDR {
        return Ok(());
    }
    match (addr - REGS_ADDR) as usize {
        0 if data & MASK_DIRECT == 0 => Err(WriteError::VolumeEnvelope(data)),
        4 if data & MASK_DIRECT == 0 => Err(WriteError::SweepEnvelope(data)),
        9 if data & MASK_MASTER_VOLUME != 0 => Err(WriteError::MasterVolume(data)),
        _ => Ok(()),
    }
}

impl<O: DeltaSink> Default for Fds<O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O: DeltaSink> Fds<O> {
    /// Creates a chip with no output attached, at nominal volume, in its
    /// power-on state
    pub fn new() -> Self {
        let mut fds = Self {
            osc: Oscillator::new(),
            last_time: 0,
            volume: 0.0,
            treble: TrebleEq::default(),
            output: None,
        };
        fds.set_volume(1.0);
        fds.reset();
        fds
    }

    pub fn with_output(output: O) -> Self {
        let mut fds = Self::new();
        fds.set_output(Some(output));
        fds
    }

    /// Attach a new sink, or detach with `None`. The current volume and treble
    /// settings are handed to the new sink. Returns the previous sink.
    pub fn set_output(&mut self, output: Option<O>) -> Option<O> {
        let previous = std::mem::replace(&mut self.output, output);
        if let Some(out) = self.output.as_mut() {
            out.set_volume(self.volume / AMP_RANGE as f64);
            out.set_treble_eq(self.treble);
        }
        previous
    }

    pub fn output(&self) -> Option<&O> {
        self.output.as_ref()
    }

    pub fn output_mut(&mut self) -> Option<&mut O> {
        self.output.as_mut()
    }

    pub fn into_output(self) -> Option<O> {
        self.output
    }

    /// Overall volume, 1.0 being nominal. The chip is mixed at a quarter of
    /// that.
    pub fn set_volume(&mut self, volume: f64) {
        self.volume = volume * VOLUME_SCALE;
        debug!("FDS volume {volume} (gain {})", self.volume);
        if let Some(out) = self.output.as_mut() {
            out.set_volume(self.volume / AMP_RANGE as f64);
        }
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }

    pub fn treble_eq(&mut self, eq: TrebleEq) {
        debug!("FDS treble {eq:?}");
        self.treble = eq;
        if let Some(out) = self.output.as_mut() {
            out.set_treble_eq(eq);
        }
    }

    /// Power-on state: empty tables, registers cleared, full volume and the
    /// clock back at zero
    pub fn reset(&mut self) {
        debug!("FDS reset");
        self.last_time = 0;
        self.osc.reset();
    }

    pub fn oscillator(&self) -> &Oscillator {
        &self.osc
    }

    /// Time up to which the oscillator has been run
    pub fn last_time(&self) -> CpuTime {
        self.last_time
    }

    /// Write a wave RAM byte or control register
    ///
    /// # Arguments
    /// * `time` - CPU cycle of the write within the current frame
    /// * `addr` - Bus address in 0x4040-0x408A
    /// * `data` - The byte written
    ///
    /// # Panics
    /// If the address is not the chip's, the write selects a hardware mode
    /// that isn't emulated, or `time` is earlier than a previous write in
    /// the frame
    pub fn write_register(&mut self, time: CpuTime, addr: CpuAddr, data: u8) {
        if let Err(e) = check_write(addr, data) {
            panic!("FDS write of 0x{data:02X} to 0x{addr:04X} rejected: {e}");
        }

        self.run_until(time);
        trace!("FDS write 0x{addr:04X} = 0x{data:02X} at {time}");

        if addr < REGS_ADDR {
            self.osc.write_wave((addr - WAVE_ADDR) as usize, data);
            return;
        }

        let reg = (addr - REGS_ADDR) as usize;
        match reg {
            0 => self.osc.write_volume(data),
            8 => self.osc.push_mod(data),
            STATUS_REG => return,
            _ => {}
        }
        self.osc.regs[reg] = data;
    }

    /// Read back wave RAM or a control register. Wave RAM returns the 6-bit
    /// sample as written.
    pub fn read_register(&self, addr: CpuAddr) -> Option<u8> {
        match addr {
            WAVE_ADDR..REGS_ADDR => {
                Some((self.osc.wave[(addr - WAVE_ADDR) as usize] + SAMPLE_BIAS) as u8)
            }
            REGS_ADDR..=END_ADDR => Some(self.osc.regs[(addr - REGS_ADDR) as usize]),
            _ => None,
        }
    }

    /// Run the oscillator up to `time`
    ///
    /// # Panics
    /// If `time` is before the point already reached
    pub fn run_until(&mut self, time: CpuTime) {
        assert!(
            time >= self.last_time,
            "FDS run to {time} is before {}",
            self.last_time
        );
        self.osc.run(self.last_time, time, self.output.as_mut());
        self.last_time = time;
    }

    /// Finish the frame at `time`, the length of the frame in CPU cycles.
    /// The clock is rebased so the next frame's times start from zero. If the
    /// chip was already run past `time`, the overshoot carries into the next
    /// frame.
    ///
    /// # Panics
    /// If `time` is negative
    pub fn end_frame(&mut self, time: CpuTime) {
        assert!(time >= 0, "FDS frame length {time} is negative");
        if time > self.last_time {
            self.run_until(time);
        }
        self.last_time -= time;
        assert!(
            self.last_time >= 0,
            "FDS clock rebased to {} at frame end {time}",
            self.last_time
        );
        trace!("FDS end frame at {time}");
    }
}

impl<O: DeltaSink> SoundChip for Fds<O> {
    const ADDRESSES: std::ops::RangeInclusive<CpuAddr> = START_ADDR..=END_ADDR;

    fn reset(&mut self) {
        Fds::reset(self)
    }

    fn write_register(&mut self, time: CpuTime, addr: CpuAddr, data: u8) {
        Fds::write_register(self, time, addr, data)
    }

    fn end_frame(&mut self, time: CpuTime) {
        Fds::end_frame(self, time)
    }

    fn set_volume(&mut self, volume: f64) {
        Fds::set_volume(self, volume)
    }

    fn set_treble_eq(&mut self, eq: TrebleEq) {
        Fds::treble_eq(self, eq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sound_traits::DeltaLog;

    fn chip() -> Fds<DeltaLog> {
        Fds::with_output(DeltaLog::new())
    }

    fn events(fds: &Fds<DeltaLog>) -> &[(CpuTime, i32)] {
        fds.output().map(|log| log.events()).unwrap_or_default()
    }

    /// Fill wave RAM through the bus, leaving writes disabled
    fn load_wave(fds: &mut Fds<DeltaLog>, time: CpuTime, f: impl Fn(u32) -> u8) {
        fds.write_register(time, 0x4089, 0x80);
        for i in 0..WAVE_COUNT as u32 {
            fds.write_register(time, WAVE_ADDR + i, f(i));
        }
        fds.write_register(time, 0x4089, 0x00);
    }

    #[test]
    fn test_power_on_state() {
        let mut fds = chip();
        let osc = fds.oscillator();
        assert!(osc.wave().iter().all(|&s| s == 0));
        assert!(osc.mod_table().as_slice().iter().all(|&c| c == 0));
        assert_eq!(osc.volume(), 0x20);
        assert_eq!(osc.volume_env(), 0x20);
        assert_eq!(fds.read_register(0x408A), Some(0xFF));
        assert_eq!(fds.last_time(), 0);

        fds.end_frame(29780);
        assert!(events(&fds).is_empty());
    }

    #[test]
    fn test_reset_restores_power_on() {
        let mut fds = chip();
        load_wave(&mut fds, 0, |_| 0x3F);
        fds.write_register(0, 0x4088, 3);
        fds.write_register(0, 0x4082, 0x10);
        fds.write_register(5, 0x4080, 0x84);
        fds.write_register(300, 0x4083, 0x01);
        fds.reset();

        let osc = fds.oscillator();
        assert!(osc.wave().iter().all(|&s| s == 0));
        assert!(osc.mod_table().as_slice().iter().all(|&c| c == 0));
        assert_eq!(osc.registers()[..10], [0; 10]);
        assert_eq!(osc.registers()[STATUS_REG], 0xFF);
        assert_eq!(osc.volume(), 0x20);
        assert_eq!(osc.phase(), 0);
        assert_eq!(osc.last_amp(), 0);
        assert_eq!(fds.last_time(), 0);
    }

    #[test]
    fn test_check_write() {
        assert_eq!(
            check_write(0x403F, 0),
            Err(WriteError::AddressOutOfRange(0x403F))
        );
        assert_eq!(
            check_write(0x408B, 0),
            Err(WriteError::AddressOutOfRange(0x408B))
        );
        assert_eq!(check_write(0x4040, 0xFF), Ok(()));
        assert_eq!(
            check_write(0x4080, 0x3F),
            Err(WriteError::VolumeEnvelope(0x3F))
        );
        assert_eq!(check_write(0x4080, 0x80), Ok(()));
        assert_eq!(
            check_write(0x4084, 0x00),
            Err(WriteError::SweepEnvelope(0x00))
        );
        assert_eq!(
            check_write(0x4089, 0x82),
            Err(WriteError::MasterVolume(0x82))
        );
        assert_eq!(check_write(0x4089, 0x80), Ok(()));
        assert_eq!(check_write(0x408A, 0x12), Ok(()));
    }

    #[test]
    #[should_panic(expected = "outside")]
    fn test_bad_address_panics() {
        chip().write_register(0, 0x4000, 0);
    }

    #[test]
    #[should_panic(expected = "volume envelope")]
    fn test_volume_envelope_panics() {
        chip().write_register(0, 0x4080, 0x20);
    }

    #[test]
    #[should_panic(expected = "sweep envelope")]
    fn test_sweep_envelope_panics() {
        chip().write_register(0, 0x4084, 0x3F);
    }

    #[test]
    #[should_panic(expected = "master volume")]
    fn test_master_volume_panics() {
        chip().write_register(0, 0x4089, 0x01);
    }

    #[test]
    #[should_panic(expected = "is before")]
    fn test_time_going_backwards_panics() {
        let mut fds = chip();
        fds.write_register(100, 0x4082, 0);
        fds.write_register(99, 0x4082, 0);
    }

    #[test]
    #[should_panic(expected = "is negative")]
    fn test_negative_frame_panics() {
        chip().end_frame(-1);
    }

    #[test]
    fn test_overshoot_carries_into_next_frame() {
        let mut fds = chip();
        fds.write_register(100, 0x4082, 0);
        fds.end_frame(50);
        assert_eq!(fds.last_time(), 50);
        fds.write_register(60, 0x4082, 0);
        fds.end_frame(60);
        assert_eq!(fds.last_time(), 0);
    }

    #[test]
    fn test_registers_store_raw_bytes() {
        let mut fds = chip();
        fds.write_register(0, 0x4085, 0x7F);
        fds.write_register(0, 0x4084, 0xA5);
        fds.write_register(0, 0x408A, 0x12);
        assert_eq!(fds.read_register(0x4085), Some(0x7F));
        assert_eq!(fds.read_register(0x4084), Some(0xA5));
        assert_eq!(fds.read_register(0x408A), Some(0xFF));
        assert_eq!(fds.oscillator().sweep_gain(), 0x25);
        assert_eq!(fds.read_register(0x4030), None);
    }

    #[test]
    fn test_wave_writes_need_enable() {
        let mut fds = chip();
        fds.write_register(0, 0x4045, 0x3F);
        assert_eq!(fds.oscillator().wave()[5], 0);
        assert_eq!(fds.read_register(0x4045), Some(0x20));

        fds.write_register(0, 0x4089, 0x80);
        fds.write_register(0, 0x4045, 0x3F);
        fds.write_register(0, 0x4046, 0x01);
        fds.write_register(0, 0x4089, 0x00);
        // Writes outside the enabled window are dropped
        fds.write_register(0, 0x4046, 0x3F);
        fds.write_register(0, 0x4047, 0x3F);

        fds.write_register(0, 0x4089, 0x80);
        fds.write_register(0, 0x4048, 0x00);
        fds.write_register(0, 0x4089, 0x00);

        let wave = fds.oscillator().wave();
        assert_eq!(&wave[5..9], &[31, -31, 0, -32]);
        assert_eq!(fds.read_register(0x4046), Some(0x01));
    }

    #[test]
    fn test_mod_table_push() {
        let mut fds = chip();
        fds.write_register(0, 0x4088, 0x05);
        fds.write_register(0, 0x4088, 0xFE);
        let table = fds.oscillator().mod_table();
        assert_eq!(&table.as_slice()[60..], &[5, 5, 6, 6]);
        assert_eq!(fds.read_register(0x4088), Some(0xFE));
    }

    #[test]
    fn test_volume_applies_at_phase_zero() {
        let mut fds = chip();
        fds.write_register(0, 0x4080, 0x90);
        assert_eq!(fds.oscillator().volume(), 0x10);
        fds.write_register(0, 0x4080, 0xA0);
        assert_eq!(fds.oscillator().volume(), 0x20);
    }

    #[test]
    fn test_volume_waits_for_wrap() {
        let mut fds = chip();
        load_wave(&mut fds, 0, |_| 0x21);
        fds.write_register(0, 0x4082, 0xFF);
        fds.write_register(0, 0x4083, 0x0F);
        fds.write_register(10, 0x4080, 0x84);
        assert_ne!(fds.oscillator().phase(), 0);
        assert_eq!(fds.oscillator().volume(), 0x20);
        assert_eq!(fds.oscillator().volume_env(), 4);

        // 0xFFF steps every 16 cycles, so one cycle of the wave is ~1024
        fds.end_frame(2000);
        assert_eq!(fds.oscillator().volume(), 4);
        // Amplitude dropped from 1 * 32 to 1 * 4 on the wrap
        assert_eq!(events(&fds).last().map(|e| e.1), Some(4 - 32));
    }

    #[test]
    fn test_write_catches_up_first() {
        let mut fds = chip();
        load_wave(&mut fds, 0, |_| 0x30);
        fds.write_register(0, 0x4082, 0x00);
        fds.write_register(0, 0x4083, 0x01);
        // Halting at 500 is heard at 500, not earlier
        fds.write_register(500, 0x4083, 0x81);
        fds.end_frame(1000);
        assert_eq!(events(&fds), &[(0, 16 * 32), (500, -16 * 32)]);
    }

    #[test]
    fn test_end_frame_rebases() {
        let mut fds = chip();
        fds.write_register(100, 0x4082, 0x00);
        fds.end_frame(100);
        assert_eq!(fds.last_time(), 0);
        fds.write_register(20, 0x4082, 0x00);
        fds.end_frame(1000);
        assert_eq!(fds.last_time(), 0);
        // Repeating the same end is harmless once rebased
        fds.end_frame(0);
        assert_eq!(fds.last_time(), 0);
    }

    #[test]
    fn test_frames_match_continuous_run() {
        fn setup(fds: &mut Fds<DeltaLog>) {
            load_wave(fds, 0, |i| (i * 9) as u8);
            for code in [1, 2, 3, 7, 6, 5, 4, 0] {
                fds.write_register(0, 0x4088, code);
            }
            fds.write_register(0, 0x4084, 0x88);
            fds.write_register(0, 0x4086, 0x40);
            fds.write_register(0, 0x4087, 0x00);
            fds.write_register(0, 0x4082, 0x90);
            fds.write_register(0, 0x4083, 0x02);
        }

        let mut whole = chip();
        setup(&mut whole);
        whole.end_frame(30_000);

        let mut framed = chip();
        setup(&mut framed);
        let mut rebased = Vec::new();
        for frame in 0..3 {
            framed.end_frame(10_000);
            let log = framed.output_mut().unwrap();
            rebased.extend(log.take().into_iter().map(|(t, d)| (t + frame * 10_000, d)));
        }

        assert_eq!(events(&whole), rebased.as_slice());
        assert_eq!(whole.oscillator().phase(), framed.oscillator().phase());
    }

    #[test]
    fn test_volume_forwarded_to_output() {
        let mut fds = chip();
        let nominal = 0.25 / AMP_RANGE as f64;
        assert_eq!(fds.output().and_then(|o| o.gain()), Some(nominal));

        fds.set_volume(2.0);
        assert_eq!(fds.volume(), 0.5);
        assert_eq!(fds.output().and_then(|o| o.gain()), Some(nominal * 2.0));

        fds.treble_eq(TrebleEq::new(-8.0));
        let previous = fds.set_output(Some(DeltaLog::new()));
        assert!(previous.is_some());
        let fresh = fds.output().unwrap();
        assert_eq!(fresh.gain(), Some(nominal * 2.0));
        assert_eq!(fresh.treble_eq(), Some(TrebleEq::new(-8.0)));
    }

    #[test]
    fn test_runs_without_output() {
        let mut fds: Fds<DeltaLog> = Fds::new();
        load_wave(&mut fds, 0, |_| 0x3F);
        fds.write_register(0, 0x4083, 0x01);
        fds.end_frame(1000);
        assert_eq!(fds.oscillator().last_amp(), 31 * 32);
        assert!(fds.into_output().is_none());
    }

    #[test]
    fn test_drive_through_trait() {
        fn drive<C: SoundChip>(chip: &mut C) {
            chip.set_volume(1.0);
            chip.write_register(0, *C::ADDRESSES.start() + 0x49, 0x80);
            chip.end_frame(100);
            chip.reset();
        }
        let mut fds = chip();
        drive(&mut fds);
        assert!(!fds.oscillator().wave_write_enabled());
    }
}
