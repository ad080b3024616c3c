//! `Server-Timing` phase tracking for the comm handler. See spec §6.

use std::time::Instant;

/// Accumulates named phase durations for one request, rendered into a
/// `Server-Timing` header value.
#[derive(Debug)]
pub struct TracingState {
    start: Instant,
    phases: Vec<(&'static str, std::time::Duration)>,
    phase_start: Instant,
}

impl TracingState {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            phases: Vec::new(),
            phase_start: now,
        }
    }

    /// Close out the current phase under `name` and start timing the next.
    pub fn mark(&mut self, name: &'static str) {
        let now = Instant::now();
        self.phases.push((name, now.duration_since(self.phase_start)));
        self.phase_start = now;
    }

    pub fn total_elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }

    /// Render as a `Server-Timing` header value: `phase;dur=1.23,phase2;dur=4.56`.
    pub fn header_value(&self) -> String {
        self.phases
            .iter()
            .map(|(name, dur)| format!("{name};dur={:.3}", dur.as_secs_f64() * 1000.0))
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl Default for TracingState {
    fn default() -> Self {
        Self::new()
    }
}
