//! Single-threaded cooperative event loop (C3): one reactor per worker
//! thread, multiplexing I/O readiness, a timing wheel, and a cross-thread
//! task queue.
//!
//! Grounded closely on the original reactor's `Run()`/`RunPendingTask()`/
//! `RunEpollTask()`/`RunTimingTask()` split, translated from runtime
//! `POLARIS_ASSERT(executor_tid_ == pthread_self())` checks to a Rust
//! ownership split instead: registry and timing-wheel mutation requires
//! `&mut Reactor`, which by construction cannot be obtained from another
//! thread, so the thread-affinity contract is upheld by the borrow checker
//! rather than a runtime assertion. Cross-thread submission goes through
//! [`ReactorHandle`], a small `Send + Sync` handle wrapping only the
//! pending-task queue and the wakeup notifier.

mod event;
mod timing;

pub use event::{EventBase, SharedHandler, Task};
pub use timing::{TimingTask, TimingTaskHandle, TimingWheel};

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, ThreadId};

use parking_lot::Mutex;
use polaris_membrane::{Epoll, Notifier};

/// Default I/O poll timeout, keeping the loop responsive to newly queued
/// tasks even without pending I/O.
const DEFAULT_POLL_TIMEOUT_MS: i32 = 10;

/// A pending-task flood is interleaved with a zero-timeout I/O poll every
/// this many drained tasks, so I/O is never starved by a burst of work.
const IO_INTERLEAVE_EVERY: usize = 100;

struct Shared {
    pending: Mutex<VecDeque<Task>>,
    notifier: Notifier,
    stop_received: AtomicBool,
}

/// Cloneable, `Send + Sync` handle used to submit work to a reactor from
/// any thread, and to request it stop.
#[derive(Clone)]
pub struct ReactorHandle {
    shared: Arc<Shared>,
}

impl ReactorHandle {
    /// Queues `task` for the executor thread and wakes it if blocked in
    /// `epoll_wait`. Safe from any thread.
    pub fn submit_task(&self, task: Task) {
        self.shared.pending.lock().push_back(task);
        let _ = self.shared.notifier.notify();
    }

    /// Requests the reactor stop after completing its current iteration.
    /// Idempotent; safe from any thread.
    pub fn stop(&self) {
        if self.shared.stop_received.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.shared.notifier.notify();
    }

    pub fn is_stopping(&self) -> bool {
        self.shared.stop_received.load(Ordering::Acquire)
    }
}

thread_local! {
    static CURRENT_HANDLE: RefCell<Option<ReactorHandle>> = const { RefCell::new(None) };
}

/// Returns a handle to the reactor currently executing on this thread, if
/// any. Lets components submit work to "their" reactor without plumbing a
/// reference through every call site.
pub fn current() -> Option<ReactorHandle> {
    CURRENT_HANDLE.with(|c| c.borrow().clone())
}

fn set_current(handle: Option<ReactorHandle>) {
    CURRENT_HANDLE.with(|c| *c.borrow_mut() = handle);
}

pub struct Reactor {
    epoll: Epoll,
    registry: HashMap<RawFd, SharedHandler>,
    wheel: TimingWheel,
    shared: Arc<Shared>,
    executor_thread: Cell<Option<ThreadId>>,
}

impl Reactor {
    pub fn new() -> io::Result<Self> {
        let epoll = Epoll::new()?;
        let notifier = Notifier::new()?;
        epoll.add(notifier.as_raw_fd(), notifier.as_raw_fd() as u64)?;
        Ok(Self {
            epoll,
            registry: HashMap::new(),
            wheel: TimingWheel::new(),
            shared: Arc::new(Shared {
                pending: Mutex::new(VecDeque::new()),
                notifier,
                stop_received: AtomicBool::new(false),
            }),
            executor_thread: Cell::new(None),
        })
    }

    pub fn handle(&self) -> ReactorHandle {
        ReactorHandle { shared: self.shared.clone() }
    }

    pub fn submit_task(&self, task: Task) {
        self.handle().submit_task(task);
    }

    pub fn stop(&self) {
        self.handle().stop();
    }

    fn assert_executor_thread(&self) {
        let current = thread::current().id();
        debug_assert!(
            self.executor_thread.get().is_none() || self.executor_thread.get() == Some(current),
            "reactor registry/timing-wheel methods must run on the executor thread"
        );
    }

    /// Registers `handler` edge-triggered for read, write, hangup, and
    /// error. Must be called from the executor thread (or before `run()`
    /// starts, from the thread that will become the executor).
    pub fn add_event_handler(&mut self, handler: SharedHandler) -> io::Result<()> {
        self.assert_executor_thread();
        let fd = handler.lock().fd();
        self.epoll.add(fd, fd as u64)?;
        self.registry.insert(fd, handler);
        Ok(())
    }

    pub fn remove_event_handler(&mut self, fd: RawFd) {
        self.assert_executor_thread();
        if self.registry.remove(&fd).is_some() {
            let _ = self.epoll.remove(fd);
        }
    }

    pub fn add_timing_task(&mut self, task: Box<dyn TimingTask>) -> TimingTaskHandle {
        self.assert_executor_thread();
        self.wheel.insert(crate::time::now_ms(), task)
    }

    pub fn cancel_timing_task(&mut self, handle: TimingTaskHandle) {
        self.assert_executor_thread();
        if !self.shared.stop_received.load(Ordering::Acquire) {
            self.wheel.cancel(handle);
        }
    }

    fn run_pending_tasks(&mut self) {
        let mut pending = {
            let mut guard = self.shared.pending.lock();
            std::mem::take(&mut *guard)
        };
        for (i, task) in pending.drain(..).enumerate() {
            if std::panic::catch_unwind(std::panic::AssertUnwindSafe(task)).is_err() {
                tracing::error!("submitted task panicked; reactor loop continues");
            }
            if i % IO_INTERLEAVE_EVERY == 0 {
                self.run_epoll_task(0);
            }
        }
    }

    fn calculate_epoll_wait_time(&self) -> i32 {
        match self.wheel.earliest_fire_time() {
            None => DEFAULT_POLL_TIMEOUT_MS,
            Some(fire_time) => {
                let now = crate::time::now_ms();
                if fire_time <= now {
                    0
                } else {
                    let diff = fire_time - now;
                    diff.min(DEFAULT_POLL_TIMEOUT_MS as u64) as i32
                }
            }
        }
    }

    fn run_epoll_task(&mut self, timeout_ms: i32) {
        let readiness = match self.epoll.wait(timeout_ms) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "epoll_wait failed");
                return;
            }
        };
        for ready in readiness {
            let fd = ready.token as RawFd;
            if fd == self.shared.notifier.as_raw_fd() {
                let _ = self.shared.notifier.drain();
                continue;
            }
            let Some(handler) = self.registry.get(&fd) else { continue };
            let mut handler = handler.lock();
            if ready.readable {
                Self::dispatch_handler(fd, "read", || handler.read_handler());
            }
            if ready.writable {
                Self::dispatch_handler(fd, "write", || handler.write_handler());
            }
            if ready.closed {
                Self::dispatch_handler(fd, "close", || handler.close_handler());
            }
        }
    }

    /// Runs one handler callback, catching a panic so a misbehaving
    /// `EventBase` cannot take down every other descriptor and timing task
    /// sharing this reactor.
    fn dispatch_handler(fd: RawFd, which: &'static str, f: impl FnOnce()) {
        if std::panic::catch_unwind(std::panic::AssertUnwindSafe(f)).is_err() {
            tracing::error!(fd, handler = which, "event handler panicked; reactor loop continues");
        }
    }

    fn run_timing_tasks(&mut self) {
        self.wheel.fire_due(crate::time::now_ms());
    }

    /// Runs the event loop until `stop()`/`ReactorHandle::stop()` is
    /// called. Blocks `SIGPIPE` on this thread for the duration.
    pub fn run(&mut self) {
        self.executor_thread.set(Some(thread::current().id()));
        set_current(Some(self.handle()));
        if let Err(e) = polaris_membrane::block_sigpipe() {
            tracing::warn!(error = %e, "failed to block SIGPIPE on reactor thread");
        }

        loop {
            self.run_pending_tasks();
            let timeout = self.calculate_epoll_wait_time();
            self.run_epoll_task(timeout);
            self.run_timing_tasks();
            if self.shared.stop_received.load(Ordering::Acquire) {
                break;
            }
        }

        self.executor_thread.set(None);
        set_current(None);
    }

    /// Pre-sets the stop flag and executes exactly one loop iteration.
    /// Used by tests and embedded single-shot callers.
    pub fn run_once(&mut self) {
        self.shared.stop_received.store(true, Ordering::Release);
        self.run();
    }
}

impl Drop for Reactor {
    fn drop(&mut self) {
        debug_assert!(
            self.shared.stop_received.load(Ordering::Acquire),
            "reactor dropped without receiving stop()"
        );
        self.run_pending_tasks();
        self.wheel.clear();
        let _ = self.epoll.remove(self.shared.notifier.as_raw_fd());
        self.registry.clear();
    }
}
