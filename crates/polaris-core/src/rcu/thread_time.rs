//! Per-thread reader-epoch tracker backing [`super::RcuMap`] reclamation.
//!
//! Each thread that enters a read critical section publishes its current
//! time into a slot; [`ThreadTimeMgr::min_reader_time`] is the minimum
//! across all live slots, i.e. the oldest point any in-flight reader could
//! still be observing. A retired value is safe to free once that minimum
//! has advanced past its retirement time.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::RwLock;

/// Sentinel meaning "not currently inside a read critical section".
const OFFLINE: u64 = 0;

pub struct ThreadTimeMgr {
    slots: RwLock<HashMap<ThreadId, Arc<AtomicU64>>>,
}

impl Default for ThreadTimeMgr {
    fn default() -> Self {
        Self::new()
    }
}

thread_local! {
    static LOCAL_SLOT: RefCell<Option<Arc<AtomicU64>>> = const { RefCell::new(None) };
}

impl ThreadTimeMgr {
    pub fn new() -> Self {
        Self { slots: RwLock::new(HashMap::new()) }
    }

    fn local_slot(&self) -> Arc<AtomicU64> {
        LOCAL_SLOT.with(|cell| {
            if let Some(slot) = cell.borrow().as_ref() {
                return slot.clone();
            }
            let slot = Arc::new(AtomicU64::new(OFFLINE));
            self.slots.write().insert(thread::current().id(), slot.clone());
            *cell.borrow_mut() = Some(slot.clone());
            slot
        })
    }

    /// Marks the calling thread as entering a read critical section at
    /// `now_ms`.
    pub fn enter(&self, now_ms: u64) {
        self.local_slot().store(now_ms, Ordering::Release);
    }

    /// Marks the calling thread as having left its read critical section.
    pub fn exit(&self) {
        self.local_slot().store(OFFLINE, Ordering::Release);
    }

    /// The minimum `reader_in` timestamp across all registered threads, or
    /// `u64::MAX` if no thread is currently inside a read critical section.
    pub fn min_reader_time(&self) -> u64 {
        let slots = self.slots.read();
        let mut min = u64::MAX;
        for slot in slots.values() {
            let t = slot.load(Ordering::Acquire);
            if t != OFFLINE && t < min {
                min = t;
            }
        }
        min
    }

    /// Number of threads that have ever entered a read section on this
    /// manager (includes threads currently offline). Exposed for tests.
    pub fn registered_thread_count(&self) -> usize {
        self.slots.read().len()
    }
}
