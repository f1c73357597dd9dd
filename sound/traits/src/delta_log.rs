use crate::{CpuTime, DeltaSink, TrebleEq};

/// A sink that keeps every event it is given. Lets a test or a dump tool
/// replay exactly what a chip emitted.
#[derive(Debug, Default, Clone)]
pub struct DeltaLog {
    events: Vec<(CpuTime, i32)>,
    gain: Option<f64>,
    treble: Option<TrebleEq>,
}

impl DeltaLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[(CpuTime, i32)] {
        &self.events
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Drain the recorded events, leaving the log empty
    pub fn take(&mut self) -> Vec<(CpuTime, i32)> {
        std::mem::take(&mut self.events)
    }

    /// Net amplitude change over everything recorded
    pub fn sum(&self) -> i32 {
        self.events.iter().map(|(_, d)| d).sum()
    }

    /// Amplitude reconstructed from the deltas at or before `time`, assuming
    /// the log started from silence. Only meaningful while every event belongs
    /// to the same frame.
    pub fn amplitude_at(&self, time: CpuTime) -> i32 {
        self.events
            .iter()
            .take_while(|(t, _)| *t <= time)
            .map(|(_, d)| d)
            .sum()
    }

    /// Last gain forwarded by the chip, if any
    pub fn gain(&self) -> Option<f64> {
        self.gain
    }

    pub fn treble_eq(&self) -> Option<TrebleEq> {
        self.treble
    }
}

impl DeltaSink for DeltaLog {
    fn offset(&mut self, time: CpuTime, delta: i32) {
        self.events.push((time, delta));
    }

    fn set_volume(&mut self, gain: f64) {
        self.gain = Some(gain);
    }

    fn set_treble_eq(&mut self, eq: TrebleEq) {
        self.treble = Some(eq);
    }
}
