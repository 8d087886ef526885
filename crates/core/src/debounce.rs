//! Timer-gated edge filter shared by every fault detector and by the button
//! and TSMS monitors.
//!
//! The filter is polled with the latest sample of a boolean condition and the
//! current time. A rising edge arms the timer, a single low sample cancels it,
//! and the condition is confirmed once it has been sampled high continuously
//! for the whole period. Confirmation happens at most once per continuous
//! assertion: the timer stays latched until the input falls again.

use embassy_time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum Phase {
    Idle,
    Running,
    /// Fired for the current assertion; waits for the input to fall.
    Latched,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DebounceTimer {
    phase: Phase,
    armed_at: Instant,
    deadline: Instant,
}

impl DebounceTimer {
    pub const fn new() -> Self {
        DebounceTimer {
            phase: Phase::Idle,
            armed_at: Instant::from_ticks(0),
            deadline: Instant::from_ticks(0),
        }
    }

    pub fn is_running(&self) -> bool {
        self.phase == Phase::Running
    }

    /// Time at which the current assertion started, if one is being timed.
    pub fn armed_at(&self) -> Option<Instant> {
        match self.phase {
            Phase::Idle => None,
            _ => Some(self.armed_at),
        }
    }

    pub fn cancel(&mut self) {
        self.phase = Phase::Idle;
    }

    /// Feeds one sample. Returns `true` exactly once per continuous
    /// assertion, on the first sample at or after the deadline.
    pub fn update(&mut self, input: bool, now: Instant, period: Duration) -> bool {
        if !input {
            self.phase = Phase::Idle;
            return false;
        }

        match self.phase {
            Phase::Idle => {
                self.phase = Phase::Running;
                self.armed_at = now;
                self.deadline = now + period;
                false
            }
            Phase::Running if now >= self.deadline => {
                self.phase = Phase::Latched;
                true
            }
            Phase::Running | Phase::Latched => false,
        }
    }
}

impl Default for DebounceTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// Polls `timer` with `input` and runs `on_confirmed` when the condition has
/// held for `period`.
pub fn debounce<F: FnOnce()>(
    input: bool,
    timer: &mut DebounceTimer,
    now: Instant,
    period: Duration,
    on_confirmed: F,
) {
    if timer.update(input, now, period) {
        on_confirmed();
    }
}

/// A boolean input whose reported value only changes after the raw reading
/// has disagreed with it for a full debounce period, in either direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DebouncedInput {
    stable: bool,
    timer: DebounceTimer,
}

impl DebouncedInput {
    pub const fn new(initial: bool) -> Self {
        DebouncedInput {
            stable: initial,
            timer: DebounceTimer::new(),
        }
    }

    pub fn value(&self) -> bool {
        self.stable
    }

    /// Feeds a raw sample; returns the new stable value when it changed.
    pub fn update(&mut self, raw: bool, now: Instant, period: Duration) -> Option<bool> {
        let mut changed = None;
        debounce(raw != self.stable, &mut self.timer, now, period, || {
            changed = Some(raw);
        });
        if let Some(value) = changed {
            self.stable = value;
            self.timer.cancel();
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PERIOD: Duration = Duration::from_millis(5);

    fn at(ms: u64) -> Instant {
        Instant::from_millis(ms)
    }

    fn fires(timer: &mut DebounceTimer, input: bool, ms: u64) -> bool {
        let mut fired = false;
        debounce(input, timer, at(ms), PERIOD, || fired = true);
        fired
    }

    #[test]
    fn short_assertion_never_fires() {
        let mut timer = DebounceTimer::new();
        for ms in 0..5 {
            assert!(!fires(&mut timer, true, ms));
        }
        assert!(!fires(&mut timer, false, 5));
        assert!(!timer.is_running());
    }

    #[test]
    fn full_assertion_fires_once() {
        let mut timer = DebounceTimer::new();
        let mut count = 0;
        for ms in 0..=20 {
            if fires(&mut timer, true, ms) {
                count += 1;
                assert_eq!(ms, 5);
            }
        }
        assert_eq!(count, 1);
    }

    #[test]
    fn low_sample_resets_accumulation() {
        let mut timer = DebounceTimer::new();
        for ms in 0..4 {
            assert!(!fires(&mut timer, true, ms));
        }
        assert!(!fires(&mut timer, false, 4));
        for ms in 5..10 {
            assert!(!fires(&mut timer, true, ms));
        }
        assert!(fires(&mut timer, true, 10));
    }

    #[test]
    fn fires_again_after_a_new_assertion() {
        let mut timer = DebounceTimer::new();
        assert!(!fires(&mut timer, true, 0));
        assert!(fires(&mut timer, true, 5));
        assert!(!fires(&mut timer, false, 6));
        assert!(!fires(&mut timer, true, 7));
        assert!(fires(&mut timer, true, 12));
    }

    #[test]
    fn armed_at_tracks_rising_edge() {
        let mut timer = DebounceTimer::new();
        assert_eq!(timer.armed_at(), None);
        timer.update(true, at(3), PERIOD);
        assert_eq!(timer.armed_at(), Some(at(3)));
        timer.update(true, at(4), PERIOD);
        assert_eq!(timer.armed_at(), Some(at(3)));
    }

    #[test]
    fn debounced_input_follows_both_edges() {
        let mut input = DebouncedInput::new(false);
        assert_eq!(input.update(true, at(0), PERIOD), None);
        assert_eq!(input.update(true, at(4), PERIOD), None);
        assert_eq!(input.update(true, at(5), PERIOD), Some(true));
        assert!(input.value());

        // a glitch low shorter than the period is ignored
        assert_eq!(input.update(false, at(6), PERIOD), None);
        assert_eq!(input.update(true, at(7), PERIOD), None);
        assert_eq!(input.update(false, at(20), PERIOD), None);
        assert_eq!(input.update(false, at(25), PERIOD), Some(false));
        assert!(!input.value());
    }
}
