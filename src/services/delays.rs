//! Polling delay schedule.
//!
//! Walks an ordered list of `(interval, repeat | infinite)` entries with a
//! cursor, yielding one wait duration per poll attempt. The sequence is
//! restartable: every new poll loop calls `reset()` and begins at entry 0.

use std::time::Duration;

use crate::models::subscription::DelayEntry;

/// Stateful cursor over a delay schedule.
///
/// A finite entry yields its interval exactly `repeat` times before the
/// cursor advances; an infinite entry yields forever. The schedules handed
/// to this type are validated upstream to end with an infinite entry, so
/// `next_delay()` returning `None` is an invariant violation the caller
/// surfaces as an internal error.
#[derive(Debug, Clone)]
pub struct DelaySequence {
    entries: Vec<DelayEntry>,
    index: usize,
    remaining: Option<u32>,
}

impl DelaySequence {
    pub fn new(entries: Vec<DelayEntry>) -> Self {
        Self {
            entries,
            index: 0,
            remaining: None,
        }
    }

    /// The next wait duration, or `None` if the schedule ran dry.
    pub fn next_delay(&mut self) -> Option<Duration> {
        loop {
            let entry = self.entries.get(self.index)?;
            match entry.repeat {
                None => return Some(entry.interval()),
                Some(count) => {
                    let remaining = self.remaining.get_or_insert(count);
                    if *remaining == 0 {
                        self.index += 1;
                        self.remaining = None;
                        continue;
                    }
                    *remaining -= 1;
                    return Some(entry.interval());
                }
            }
        }
    }

    /// Restart the cursor at entry 0 with a fresh segment counter.
    pub fn reset(&mut self) {
        self.index = 0;
        self.remaining = None;
    }
}
