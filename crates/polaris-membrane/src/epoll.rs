//! Thin safe wrapper around Linux `epoll`.
//!
//! Mirrors the shape of the original reactor's epoll usage: one epoll
//! instance per reactor, edge-triggered registration covering read, write,
//! and hangup/error, a fixed-size event buffer reused across calls.

use std::io;
use std::os::fd::{AsRawFd, RawFd};

/// Number of `epoll_event` slots reused across `wait()` calls.
const EPOLL_EVENT_SIZE: usize = 1024;

/// Bits a caller cares about for one ready descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readiness {
    /// Opaque token supplied at registration time (the reactor uses this to
    /// recover which `EventBase` owns the descriptor without a second map
    /// lookup keyed by fd).
    pub token: u64,
    pub readable: bool,
    pub writable: bool,
    pub closed: bool,
}

pub struct Epoll {
    epoll_fd: RawFd,
    events: Vec<libc::epoll_event>,
}

impl Epoll {
    pub fn new() -> io::Result<Self> {
        // SAFETY: epoll_create1 has no preconditions beyond a valid flags
        // argument; 0 is always valid. We check the return value below.
        let epoll_fd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if epoll_fd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self {
            epoll_fd,
            events: vec![unsafe { std::mem::zeroed() }; EPOLL_EVENT_SIZE],
        })
    }

    /// Registers `fd` edge-triggered for read, write, hangup and error,
    /// tagging it with `token` so the reactor can resolve the handler.
    pub fn add(&self, fd: RawFd, token: u64) -> io::Result<()> {
        let mut ev = libc::epoll_event {
            events: (libc::EPOLLIN | libc::EPOLLOUT | libc::EPOLLET | libc::EPOLLERR | libc::EPOLLRDHUP)
                as u32,
            u64: token,
        };
        // SAFETY: epoll_fd is a valid epoll instance owned by self; fd is
        // caller-supplied and must itself be a valid, open descriptor. ev
        // is a fully initialized epoll_event on the stack.
        let rc = unsafe { libc::epoll_ctl(self.epoll_fd, libc::EPOLL_CTL_ADD, fd, &mut ev) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    pub fn remove(&self, fd: RawFd) -> io::Result<()> {
        // SAFETY: epoll_ctl with EPOLL_CTL_DEL ignores the event pointer;
        // null is explicitly permitted by the epoll_ctl(2) contract since
        // Linux 2.6.9.
        let rc = unsafe { libc::epoll_ctl(self.epoll_fd, libc::EPOLL_CTL_DEL, fd, std::ptr::null_mut()) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Blocks up to `timeout_ms` (0 = return immediately) waiting for
    /// readiness, returning the set of ready descriptors.
    pub fn wait(&mut self, timeout_ms: i32) -> io::Result<Vec<Readiness>> {
        // SAFETY: self.events is a Vec of the advertised capacity and stays
        // alive for the duration of the call; epoll_fd is valid.
        let n = unsafe {
            libc::epoll_wait(
                self.epoll_fd,
                self.events.as_mut_ptr(),
                self.events.len() as i32,
                timeout_ms,
            )
        };
        if n < 0 {
            let err = io::Error::last_os_error();
            // EINTR is routine under signal delivery; the reactor treats it
            // as "nothing ready" rather than an error.
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(Vec::new());
            }
            return Err(err);
        }
        let mut out = Vec::with_capacity(n as usize);
        for ev in &self.events[..n as usize] {
            let mask = ev.events as i32;
            out.push(Readiness {
                token: ev.u64,
                readable: mask & libc::EPOLLIN != 0,
                writable: mask & libc::EPOLLOUT != 0,
                closed: mask & (libc::EPOLLRDHUP | libc::EPOLLERR) != 0,
            });
        }
        Ok(out)
    }
}

impl AsRawFd for Epoll {
    fn as_raw_fd(&self) -> RawFd {
        self.epoll_fd
    }
}

impl Drop for Epoll {
    fn drop(&mut self) {
        // SAFETY: epoll_fd was created by epoll_create1 in new() and is
        // closed exactly once here.
        unsafe {
            libc::close(self.epoll_fd);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::Notifier;

    #[test]
    fn add_and_wait_sees_notifier() {
        let mut epoll = Epoll::new().unwrap();
        let notifier = Notifier::new().unwrap();
        epoll.add(notifier.as_raw_fd(), 42).unwrap();
        notifier.notify().unwrap();
        let readiness = epoll.wait(1000).unwrap();
        assert_eq!(readiness.len(), 1);
        assert_eq!(readiness[0].token, 42);
        assert!(readiness[0].readable);
    }

    #[test]
    fn wait_with_nothing_ready_times_out_empty() {
        let mut epoll = Epoll::new().unwrap();
        let readiness = epoll.wait(10).unwrap();
        assert!(readiness.is_empty());
    }

    #[test]
    fn remove_stops_delivering_events() {
        let mut epoll = Epoll::new().unwrap();
        let notifier = Notifier::new().unwrap();
        epoll.add(notifier.as_raw_fd(), 7).unwrap();
        epoll.remove(notifier.as_raw_fd()).unwrap();
        notifier.notify().unwrap();
        let readiness = epoll.wait(10).unwrap();
        assert!(readiness.is_empty());
    }
}
