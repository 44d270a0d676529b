//! Timing wheel: a time-ordered multimap of recurring tasks owned by the
//! reactor's executor thread.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// A recurring task owned by the reactor's timing wheel.
///
/// `run()` is invoked once the task's scheduled time has passed.
/// `next_run_time()` is then consulted: a non-zero absolute millisecond
/// timestamp reinserts the task at that time; zero means "don't
/// reschedule" and the task is dropped.
pub trait TimingTask: Send {
    /// Initial delay, in milliseconds, before the first run.
    fn interval_ms(&self) -> u64;
    fn run(&mut self);
    /// Absolute monotonic time (ms) for the next run, or `0` to stop.
    fn next_run_time(&self) -> u64;
}

/// Opaque handle returned by [`TimingWheel::insert`], usable to cancel a
/// still-pending task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimingTaskHandle(u64);

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

pub struct TimingWheel {
    /// fire_time_ms -> tasks due at that time, each tagged with its handle
    /// id so cancellation can find it without a linear scan of every
    /// bucket.
    buckets: BTreeMap<u64, Vec<(u64, Box<dyn TimingTask>)>>,
    index: std::collections::HashMap<u64, u64>,
}

impl Default for TimingWheel {
    fn default() -> Self {
        Self::new()
    }
}

impl TimingWheel {
    pub fn new() -> Self {
        Self { buckets: BTreeMap::new(), index: std::collections::HashMap::new() }
    }

    /// Inserts `task`, scheduling its first run at `now_ms + task.interval_ms()`.
    pub fn insert(&mut self, now_ms: u64, task: Box<dyn TimingTask>) -> TimingTaskHandle {
        let fire_time = now_ms + task.interval_ms();
        let id = NEXT_HANDLE.fetch_add(1, Ordering::Relaxed);
        self.insert_at(fire_time, id, task);
        TimingTaskHandle(id)
    }

    fn insert_at(&mut self, fire_time: u64, id: u64, task: Box<dyn TimingTask>) {
        self.buckets.entry(fire_time).or_default().push((id, task));
        self.index.insert(id, fire_time);
    }

    /// Cancels a still-pending task. A no-op if the handle already fired
    /// and was not rescheduled, or was already cancelled.
    pub fn cancel(&mut self, handle: TimingTaskHandle) {
        if let Some(fire_time) = self.index.remove(&handle.0) {
            if let Some(bucket) = self.buckets.get_mut(&fire_time) {
                bucket.retain(|(id, _)| *id != handle.0);
                if bucket.is_empty() {
                    self.buckets.remove(&fire_time);
                }
            }
        }
    }

    /// The absolute time of the earliest pending task, if any.
    pub fn earliest_fire_time(&self) -> Option<u64> {
        self.buckets.keys().next().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Runs every task whose fire time is `<= now_ms`, reinserting each
    /// one whose `next_run_time()` is non-zero.
    pub fn fire_due(&mut self, now_ms: u64) {
        loop {
            let Some((&fire_time, _)) = self.buckets.iter().next() else {
                return;
            };
            if fire_time > now_ms {
                return;
            }
            let (_, mut due) = self.buckets.remove_entry(&fire_time).unwrap();
            for (id, mut task) in due.drain(..) {
                self.index.remove(&id);
                let ran = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| task.run()));
                if ran.is_err() {
                    tracing::error!(task_id = id, "timing task panicked; dropping it from the wheel");
                    continue;
                }
                let next = task.next_run_time();
                if next > 0 {
                    self.insert_at(next, id, task);
                }
            }
        }
    }

    /// Removes and drops every pending task, for shutdown.
    pub fn clear(&mut self) {
        self.buckets.clear();
        self.index.clear();
    }
}
