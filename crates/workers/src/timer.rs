//! Timer queue driving worker callbacks
//!
//! Timers are identified by `TimerHandle`. The queue does not run callbacks
//! itself; the executor pops due handles and dispatches them to the worker
//! that armed them. Deadlines use `tokio::time::Instant`, so tests can pause
//! and advance time deterministically.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::Duration;

use tokio::time::Instant;

/// Shortest period a repeating timer may have
pub const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Identifies an armed timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

#[derive(Debug, Clone, Copy)]
enum TimerKind {
    Once,
    Repeating(Duration),
}

#[derive(Debug)]
struct TimerEntry {
    kind: TimerKind,
    deadline: Instant,
}

/// One-shot and repeating timers ordered by deadline.
///
/// Cancelled timers are dropped from the heap lazily.
#[derive(Debug, Default)]
pub struct TimerQueue {
    next_id: u64,
    timers: HashMap<TimerHandle, TimerEntry>,
    heap: BinaryHeap<Reverse<(Instant, TimerHandle)>>,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a timer that fires once after `delay`. A zero delay fires on the
    /// next dispatch, never inline.
    pub fn schedule_once(&mut self, delay: Duration) -> TimerHandle {
        self.insert(TimerKind::Once, Instant::now() + delay)
    }

    /// Arm a timer that fires every `period`, first after one period.
    /// Periods shorter than `MIN_PERIOD` are clamped.
    pub fn schedule_repeating(&mut self, period: Duration) -> TimerHandle {
        let period = period.max(MIN_PERIOD);
        self.insert(TimerKind::Repeating(period), Instant::now() + period)
    }

    /// Cancel a timer. Cancelling an unknown, fired, or already cancelled
    /// timer is a no-op. Returns whether a live timer was removed.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        self.timers.remove(&handle).is_some()
    }

    pub fn is_active(&self, handle: TimerHandle) -> bool {
        self.timers.contains_key(&handle)
    }

    /// Number of live timers
    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    /// Earliest deadline among live timers
    pub fn next_deadline(&mut self) -> Option<Instant> {
        self.discard_stale();
        self.heap.peek().map(|Reverse((deadline, _))| *deadline)
    }

    /// Pop one timer whose deadline is at or before `now`.
    ///
    /// One-shot timers are removed. Repeating timers are re-armed at their
    /// next period boundary after `now`; ticks missed while the caller was
    /// busy are skipped rather than replayed.
    pub fn pop_due(&mut self, now: Instant) -> Option<TimerHandle> {
        self.discard_stale();
        let Reverse((deadline, handle)) = *self.heap.peek()?;
        if deadline > now {
            return None;
        }
        self.heap.pop();

        let kind = self.timers.get(&handle)?.kind;
        match kind {
            TimerKind::Once => {
                self.timers.remove(&handle);
            }
            TimerKind::Repeating(period) => {
                let next = next_boundary(deadline, period, now);
                if let Some(entry) = self.timers.get_mut(&handle) {
                    entry.deadline = next;
                }
                self.heap.push(Reverse((next, handle)));
            }
        }
        Some(handle)
    }

    fn insert(&mut self, kind: TimerKind, deadline: Instant) -> TimerHandle {
        let handle = TimerHandle(self.next_id);
        self.next_id += 1;
        self.timers.insert(handle, TimerEntry { kind, deadline });
        self.heap.push(Reverse((deadline, handle)));
        handle
    }

    fn discard_stale(&mut self) {
        while let Some(Reverse((deadline, handle))) = self.heap.peek() {
            match self.timers.get(handle) {
                Some(entry) if entry.deadline == *deadline => break,
                _ => {
                    self.heap.pop();
                }
            }
        }
    }
}

/// First `deadline + k * period` (k >= 1) strictly after `now`
fn next_boundary(deadline: Instant, period: Duration, now: Instant) -> Instant {
    let next = deadline + period;
    if next > now {
        return next;
    }
    let behind = now.duration_since(deadline).as_nanos();
    let periods = behind / period.as_nanos() + 1;
    let offset = period.as_nanos() * periods;
    deadline + Duration::from_nanos(u64::try_from(offset).unwrap_or(u64::MAX))
}
