//! Signal masking for the reactor thread.
//!
//! A reactor writing to a socket whose peer already closed would otherwise
//! take `SIGPIPE` and die; the reactor checks write() return codes itself,
//! so the signal is masked on the thread before the event loop starts.

use std::io;

/// Blocks `SIGPIPE` on the calling thread via `pthread_sigmask`. Call this
/// once, from the reactor thread, before entering the event loop.
pub fn block_sigpipe() -> io::Result<()> {
    // SAFETY: `mask` is a fully initialized sigset_t on the stack; passing
    // null for `oldset` is permitted by pthread_sigmask(3) when the caller
    // does not need the previous mask.
    unsafe {
        let mut mask: libc::sigset_t = std::mem::zeroed();
        if libc::sigemptyset(&mut mask) != 0 {
            return Err(io::Error::last_os_error());
        }
        if libc::sigaddset(&mut mask, libc::SIGPIPE) != 0 {
            return Err(io::Error::last_os_error());
        }
        let rc = libc::pthread_sigmask(libc::SIG_BLOCK, &mask, std::ptr::null_mut());
        if rc != 0 {
            return Err(io::Error::from_raw_os_error(rc));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_sigpipe_succeeds() {
        block_sigpipe().unwrap();
    }
}
