//! Event-handler registry: the reactor's side of a registered descriptor.

use std::os::fd::RawFd;
use std::sync::Arc;

use parking_lot::Mutex;

/// A handler bound to a file descriptor, dispatched to on I/O readiness.
///
/// Handlers are non-blocking: the executor thread calls straight through,
/// so any handler that blocks stalls every other descriptor and timing task
/// registered with the same reactor.
pub trait EventBase: Send {
    fn fd(&self) -> RawFd;
    fn read_handler(&mut self);
    fn write_handler(&mut self);
    fn close_handler(&mut self);
}

/// Shared handle to a registered handler. The reactor does not own the
/// handler outright (callers keep their own clone); it only keeps this
/// association alive long enough to dispatch readiness to it.
pub type SharedHandler = Arc<Mutex<dyn EventBase>>;

/// One-shot closure submitted from any thread, run and discarded by the
/// executor thread.
pub type Task = Box<dyn FnOnce() + Send>;
