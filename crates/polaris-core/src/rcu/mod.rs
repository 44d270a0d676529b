//! Read-optimized concurrent map with deferred reclamation (C2).
//!
//! Two internal tables: a *primary* table published for readers, and a
//! *dirty* table holding writes not yet merged into primary. Writers append
//! to `dirty` under a mutex; once the pending-write count reaches
//! `dirty_threshold` the writer merges `dirty` into `primary` under
//! `primary`'s write lock and retires whatever values the merge displaced.
//! Retired values are freed by [`RcuMap::check_gc`] once no registered
//! reader could still observe them (tracked via [`ThreadTimeMgr`]).
//!
//! Values are held behind `Arc`, so "release by decrementing a refcount"
//! (the behavior the original C++ map needed a manual destructor hook for)
//! falls out of `Arc`'s own `Drop` — readers that already cloned a handle
//! keep it alive regardless of when `check_gc` runs.

mod thread_time;

pub use thread_time::ThreadTimeMgr;

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::{Mutex, RwLock};

/// Pending writes not yet merged into the primary table. `None` marks a
/// tombstone (pending delete).
struct Dirty<K, V> {
    writes: HashMap<K, Option<Arc<V>>>,
}

impl<K, V> Dirty<K, V> {
    fn new() -> Self {
        Self { writes: HashMap::new() }
    }
}

struct Retired<V> {
    value: Arc<V>,
    retired_at_ms: u64,
}

/// Default number of pending writes buffered in `dirty` before a merge is
/// forced. `1` gives read-after-write consistency on every single `Get`
/// (the map behaves like a plain copy-on-write RCU table); callers doing
/// write bursts can raise it with [`RcuMap::with_dirty_threshold`] to
/// amortize the primary-table write-lock acquisition across many writes,
/// at the cost of `Get` needing to consult the dirty table as well.
const DEFAULT_DIRTY_THRESHOLD: usize = 1;

pub struct RcuMap<K, V> {
    primary: RwLock<HashMap<K, Arc<V>>>,
    dirty: Mutex<Dirty<K, V>>,
    dirty_count: AtomicUsize,
    dirty_threshold: usize,
    retired: Mutex<Vec<Retired<V>>>,
    time_mgr: ThreadTimeMgr,
}

impl<K, V> Default for RcuMap<K, V>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> RcuMap<K, V>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self::with_dirty_threshold(DEFAULT_DIRTY_THRESHOLD)
    }

    pub fn with_dirty_threshold(dirty_threshold: usize) -> Self {
        Self {
            primary: RwLock::new(HashMap::new()),
            dirty: Mutex::new(Dirty::new()),
            dirty_count: AtomicUsize::new(0),
            dirty_threshold: dirty_threshold.max(1),
            retired: Mutex::new(Vec::new()),
            time_mgr: ThreadTimeMgr::new(),
        }
    }

    /// Non-blocking, wait-free in the common case (no pending dirty
    /// writes): a single atomic load plus a shared read-lock acquisition.
    pub fn get(&self, k: &K) -> Option<Arc<V>> {
        self.time_mgr.enter(crate::time::now_ms());
        let result = self.get_inner(k);
        self.time_mgr.exit();
        result
    }

    fn get_inner(&self, k: &K) -> Option<Arc<V>> {
        if self.dirty_count.load(Ordering::Acquire) > 0 {
            let dirty = self.dirty.lock();
            if let Some(entry) = dirty.writes.get(k) {
                return entry.clone();
            }
        }
        self.primary.read().get(k).cloned()
    }

    /// Installs `v` for `k`, marking any previous value for deferred
    /// reclamation. After this call returns, any subsequent `get(k)` on any
    /// thread observes `v` or a later value, never a prior one.
    pub fn update(&self, k: K, v: V) {
        self.put(k, Some(Arc::new(v)));
    }

    /// Marks `k` for deferred reclamation. A no-op if `k` is absent.
    pub fn delete(&self, k: K) {
        self.put(k, None);
    }

    fn put(&self, k: K, v: Option<Arc<V>>) {
        let mut dirty = self.dirty.lock();
        dirty.writes.insert(k, v);
        let count = self.dirty_count.fetch_add(1, Ordering::AcqRel) + 1;
        if count >= self.dirty_threshold {
            self.merge_locked(&mut dirty);
        }
    }

    /// Returns the existing value for `k`, or calls `factory` under a
    /// writer-side lock to insert and return a new one. `factory` runs at
    /// most once per admitted insertion — a racing caller that loses sees
    /// the winner's value and its own factory output is dropped.
    pub fn create_or_get(&self, k: K, factory: impl FnOnce() -> V) -> Arc<V> {
        if let Some(v) = self.get(&k) {
            return v;
        }
        let mut dirty = self.dirty.lock();
        if let Some(entry) = dirty.writes.get(&k) {
            if let Some(v) = entry {
                return v.clone();
            }
            // Tombstoned in dirty: fall through and treat as absent.
        } else if let Some(v) = self.primary.read().get(&k) {
            return v.clone();
        }
        let v = Arc::new(factory());
        dirty.writes.insert(k, Some(v.clone()));
        let count = self.dirty_count.fetch_add(1, Ordering::AcqRel) + 1;
        if count >= self.dirty_threshold {
            self.merge_locked(&mut dirty);
        }
        v
    }

    fn merge_locked(&self, dirty: &mut Dirty<K, V>) {
        let now = crate::time::now_ms();
        let mut primary = self.primary.write();
        let mut retired = self.retired.lock();
        for (k, v) in dirty.writes.drain() {
            match v {
                Some(new_v) => {
                    if let Some(old) = primary.insert(k, new_v) {
                        retired.push(Retired { value: old, retired_at_ms: now });
                    }
                }
                None => {
                    if let Some(old) = primary.remove(&k) {
                        retired.push(Retired { value: old, retired_at_ms: now });
                    }
                }
            }
        }
        self.dirty_count.store(0, Ordering::Release);
    }

    /// Forces any pending dirty writes to merge into primary immediately,
    /// regardless of `dirty_threshold`. Useful at known quiescent points
    /// (e.g. the reactor's idle sweep).
    pub fn flush(&self) {
        let mut dirty = self.dirty.lock();
        if !dirty.writes.is_empty() {
            self.merge_locked(&mut dirty);
        }
    }

    /// Frees retired entries whose retirement time is older than
    /// `min_reader_time`. Returns the number of entries freed. Calling this
    /// twice with the same `min_reader_time` has the same effect as calling
    /// it once (idempotent).
    pub fn check_gc(&self, min_reader_time: u64) -> usize {
        let mut retired = self.retired.lock();
        let before = retired.len();
        retired.retain(|r| r.retired_at_ms >= min_reader_time);
        before - retired.len()
    }

    /// Convenience wrapper around `check_gc` using this map's own
    /// `ThreadTimeMgr` as the epoch source.
    pub fn check_gc_now(&self) -> usize {
        self.check_gc(self.time_mgr.min_reader_time())
    }

    pub fn retired_count(&self) -> usize {
        self.retired.lock().len()
    }

    /// Snapshot iteration returning all live values with incremented
    /// refcounts. Dirty entries take precedence over primary for the same
    /// key; tombstoned keys are skipped.
    pub fn get_all_values_with_ref(&self, out: &mut Vec<Arc<V>>) {
        out.clear();
        self.time_mgr.enter(crate::time::now_ms());
        {
            let dirty = self.dirty.lock();
            let primary = self.primary.read();
            for (k, v) in primary.iter() {
                if dirty.writes.contains_key(k) {
                    continue;
                }
                out.push(v.clone());
            }
            for v in dirty.writes.values().flatten() {
                out.push(v.clone());
            }
        }
        self.time_mgr.exit();
    }

    /// Removes every entry for which `keep` returns `false`. Forces a
    /// flush first so the check sees a settled view rather than racing
    /// in-flight dirty writes.
    pub fn retain(&self, keep: impl Fn(&K, &V) -> bool) {
        self.flush();
        let to_delete: Vec<K> = {
            let primary = self.primary.read();
            primary.iter().filter(|(k, v)| !keep(k, v)).map(|(k, _)| k.clone()).collect()
        };
        for k in to_delete {
            self.delete(k);
        }
    }

    pub fn len(&self) -> usize {
        self.flush();
        self.primary.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
