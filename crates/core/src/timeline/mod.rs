use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Handle to a timer registered with [`CoarseTimers`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimerId(u64);

/// What a timer drives when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimerKind {
    CountdownTick,
    HapticPulse,
    StopComplete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FiredTimer {
    pub id: TimerId,
    pub kind: TimerKind,
    /// Virtual time at which the timer was due.
    pub at: Duration,
}

#[derive(Debug, Clone)]
struct ScheduledTimer {
    id: TimerId,
    kind: TimerKind,
    deadline: Duration,
    period: Option<Duration>,
}

/// Millisecond-granularity timers on a virtual monotonic clock.
///
/// Nothing runs on its own: the host advances the clock and collects due
/// timers one at a time with [`pop_due`](Self::pop_due), so a handler can
/// cancel timers that would otherwise fire later in the same window.
#[derive(Debug, Default)]
pub struct CoarseTimers {
    now: Duration,
    next_id: u64,
    timers: Vec<ScheduledTimer>,
}

impl CoarseTimers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn schedule_once(&mut self, delay: Duration, kind: TimerKind) -> TimerId {
        self.push(kind, delay, None)
    }

    /// First fires one `period` from now. Zero periods are clamped to one
    /// millisecond.
    pub fn schedule_repeating(&mut self, period: Duration, kind: TimerKind) -> TimerId {
        let period = period.max(Duration::from_millis(1));
        self.push(kind, period, Some(period))
    }

    pub fn cancel(&mut self, id: TimerId) -> bool {
        let before = self.timers.len();
        self.timers.retain(|timer| timer.id != id);
        self.timers.len() != before
    }

    pub fn is_scheduled(&self, id: TimerId) -> bool {
        self.timers.iter().any(|timer| timer.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    /// Removes and returns the earliest timer due at or before `until`,
    /// moving the clock to its deadline. Repeating timers are re-armed.
    pub fn pop_due(&mut self, until: Duration) -> Option<FiredTimer> {
        let index = self
            .timers
            .iter()
            .enumerate()
            .filter(|(_, timer)| timer.deadline <= until)
            .min_by_key(|(_, timer)| (timer.deadline, timer.id))
            .map(|(index, _)| index)?;

        let timer = &self.timers[index];
        let fired = FiredTimer {
            id: timer.id,
            kind: timer.kind,
            at: timer.deadline,
        };
        let period = timer.period;
        self.now = self.now.max(fired.at);

        match period {
            Some(period) => self.timers[index].deadline += period,
            None => {
                self.timers.swap_remove(index);
            }
        }

        Some(fired)
    }

    /// Moves the clock forward without firing anything.
    pub fn advance_to(&mut self, until: Duration) {
        self.now = self.now.max(until);
    }

    fn push(&mut self, kind: TimerKind, delay: Duration, period: Option<Duration>) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.timers.push(ScheduledTimer {
            id,
            kind,
            deadline: self.now + delay,
            period,
        });
        tracing::trace!(?id, ?kind, ?delay, "timer scheduled");
        id
    }
}
