//! Unsafe FFI boundary for the polaris reactor: epoll multiplexing, raw
//! socket helpers, the self-pipe cross-thread notifier, and signal masking.
//!
//! `polaris-core` depends on this crate for everything that must touch a
//! raw file descriptor. Nothing in here decides policy (timeouts, retry,
//! what to do with a closed peer) — it only exposes the syscalls as safe
//! Rust types and propagates OS errors untranslated. Policy lives in
//! `polaris-core::reactor` and `polaris-core::health_check`.

pub mod epoll;
pub mod net;
pub mod notifier;
pub mod signal;

pub use epoll::{Epoll, Readiness};
pub use net::{
    set_cloexec, set_nonblocking, tcp_connect_timeout, tcp_send_recv, udp_send_recv, udp_socket,
    MembraneNetError,
};
pub use notifier::Notifier;
pub use signal::block_sigpipe;
