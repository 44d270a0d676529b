//! Non-blocking socket helpers used by detectors and connectors.
//!
//! These wrap `connect`/`send`/`recv` with an explicit deadline implemented
//! via `poll`, since the sockets themselves are non-blocking. No retry:
//! callers (the health-check detectors) decide what a failure means.

use std::io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs, UdpSocket};
use std::os::fd::{AsRawFd, RawFd};
use std::time::{Duration, Instant};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MembraneNetError {
    #[error("resolve failed for {host}:{port}: {source}")]
    Resolve {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },
    #[error("no addresses resolved for {host}:{port}")]
    NoAddress { host: String, port: u16 },
    #[error("connect failed: {0}")]
    Connect(io::Error),
    #[error("operation timed out after {0}ms")]
    Timeout(u64),
    #[error("send failed: {0}")]
    Send(io::Error),
    #[error("recv failed: {0}")]
    Recv(io::Error),
}

/// Sets `FD_CLOEXEC` on `fd`. Every socket this crate creates carries it so
/// a forked child (e.g. a health-check probe shelling out) never inherits
/// live connections to discovered instances.
pub fn set_cloexec(fd: RawFd) -> io::Result<()> {
    // SAFETY: fd is caller-supplied and expected to be a valid, open
    // descriptor; fcntl with F_GETFD/F_SETFD never touches memory beyond
    // its integer arguments.
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFD);
        if flags < 0 {
            return Err(io::Error::last_os_error());
        }
        if libc::fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC) < 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

pub fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    // SAFETY: same preconditions as set_cloexec.
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL);
        if flags < 0 {
            return Err(io::Error::last_os_error());
        }
        if libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

fn resolve_one(host: &str, port: u16) -> Result<SocketAddr, MembraneNetError> {
    (host, port)
        .to_socket_addrs()
        .map_err(|source| MembraneNetError::Resolve {
            host: host.to_string(),
            port,
            source,
        })?
        .next()
        .ok_or_else(|| MembraneNetError::NoAddress {
            host: host.to_string(),
            port,
        })
}

/// Waits up to `remaining` for `fd` to become writable (connect completion)
/// using `poll(2)`. Returns `Ok(true)` if writable before the deadline.
fn poll_writable(fd: RawFd, remaining: Duration) -> io::Result<bool> {
    let mut pfd = libc::pollfd {
        fd,
        events: libc::POLLOUT,
        revents: 0,
    };
    let timeout_ms = remaining.as_millis().min(i32::MAX as u128) as i32;
    // SAFETY: pfd is a single, fully initialized pollfd on the stack; fd is
    // caller-supplied and expected to be valid for the duration of the call.
    let rc = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
    if rc < 0 {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            return Ok(false);
        }
        return Err(err);
    }
    Ok(rc > 0 && pfd.revents & (libc::POLLOUT | libc::POLLERR | libc::POLLHUP) != 0)
}

fn poll_readable(fd: RawFd, remaining: Duration) -> io::Result<bool> {
    let mut pfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };
    let timeout_ms = remaining.as_millis().min(i32::MAX as u128) as i32;
    // SAFETY: see poll_writable.
    let rc = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
    if rc < 0 {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            return Ok(false);
        }
        return Err(err);
    }
    Ok(rc > 0 && pfd.revents & (libc::POLLIN | libc::POLLERR | libc::POLLHUP) != 0)
}

/// Opens a non-blocking TCP connection to `host:port`, waiting up to
/// `timeout_ms` for the handshake to complete. Returns the connected,
/// still-non-blocking stream.
pub fn tcp_connect_timeout(host: &str, port: u16, timeout_ms: u64) -> Result<TcpStream, MembraneNetError> {
    let addr = resolve_one(host, port)?;
    let deadline = Instant::now() + Duration::from_millis(timeout_ms);

    let stream = TcpStream::connect_timeout(&addr, Duration::from_millis(timeout_ms))
        .or_else(|err| {
            // connect_timeout already implements the poll-based wait
            // internally for us; a real failure here is terminal.
            Err(err)
        })
        .map_err(MembraneNetError::Connect)?;
    stream.set_nonblocking(true).map_err(MembraneNetError::Connect)?;
    set_cloexec(stream.as_raw_fd()).map_err(MembraneNetError::Connect)?;

    if Instant::now() >= deadline {
        return Err(MembraneNetError::Timeout(timeout_ms));
    }
    Ok(stream)
}

/// Sends `request` (if non-empty) then reads until the peer closes, the
/// deadline expires, or `max_response` bytes have been read.
pub fn tcp_send_recv(
    host: &str,
    port: u16,
    timeout_ms: u64,
    request: &[u8],
    max_response: usize,
) -> Result<Vec<u8>, MembraneNetError> {
    use std::io::{Read, Write};

    let deadline = Instant::now() + Duration::from_millis(timeout_ms);
    let mut stream = tcp_connect_timeout(host, port, timeout_ms)?;

    if !request.is_empty() {
        let mut written = 0;
        while written < request.len() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(MembraneNetError::Timeout(timeout_ms));
            }
            if !poll_writable(stream.as_raw_fd(), remaining).map_err(MembraneNetError::Send)? {
                return Err(MembraneNetError::Timeout(timeout_ms));
            }
            match stream.write(&request[written..]) {
                Ok(0) => break,
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                Err(e) => return Err(MembraneNetError::Send(e)),
            }
        }
    }

    let mut out = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        if out.len() >= max_response {
            break;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(MembraneNetError::Timeout(timeout_ms));
        }
        if !poll_readable(stream.as_raw_fd(), remaining).map_err(MembraneNetError::Recv)? {
            return Err(MembraneNetError::Timeout(timeout_ms));
        }
        match stream.read(&mut buf) {
            Ok(0) => break, // peer closed
            Ok(n) => out.extend_from_slice(&buf[..n.min(max_response - out.len())]),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
            Err(e) => return Err(MembraneNetError::Recv(e)),
        }
    }
    Ok(out)
}

/// Binds an ephemeral, non-blocking UDP socket connected to `host:port`.
pub fn udp_socket(host: &str, port: u16) -> Result<UdpSocket, MembraneNetError> {
    let addr = resolve_one(host, port)?;
    let bind_addr: SocketAddr = if addr.is_ipv6() {
        "[::]:0".parse().unwrap()
    } else {
        "0.0.0.0:0".parse().unwrap()
    };
    let socket = UdpSocket::bind(bind_addr).map_err(MembraneNetError::Connect)?;
    socket.connect(addr).map_err(MembraneNetError::Connect)?;
    socket.set_nonblocking(true).map_err(MembraneNetError::Connect)?;
    set_cloexec(socket.as_raw_fd()).map_err(MembraneNetError::Connect)?;
    Ok(socket)
}

/// Sends `request` as a single datagram then waits for one reply datagram,
/// symmetric to `tcp_send_recv`.
pub fn udp_send_recv(
    host: &str,
    port: u16,
    timeout_ms: u64,
    request: &[u8],
    max_response: usize,
) -> Result<Vec<u8>, MembraneNetError> {
    let deadline = Instant::now() + Duration::from_millis(timeout_ms);
    let socket = udp_socket(host, port)?;

    socket.send(request).map_err(MembraneNetError::Send)?;

    let remaining = deadline.saturating_duration_since(Instant::now());
    if remaining.is_zero() {
        return Err(MembraneNetError::Timeout(timeout_ms));
    }
    if !poll_readable(socket.as_raw_fd(), remaining).map_err(MembraneNetError::Recv)? {
        return Err(MembraneNetError::Timeout(timeout_ms));
    }
    let mut buf = vec![0u8; max_response.max(1)];
    let n = socket.recv(&mut buf).map_err(MembraneNetError::Recv)?;
    buf.truncate(n);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn tcp_send_recv_round_trips_through_echo_server() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || {
            use std::io::{Read, Write};
            let (mut sock, _) = listener.accept().unwrap();
            let mut buf = [0u8; 16];
            let n = sock.read(&mut buf).unwrap();
            sock.write_all(&buf[..n]).unwrap();
        });
        let resp = tcp_send_recv("127.0.0.1", addr.port(), 2000, b"hello", 16).unwrap();
        assert_eq!(resp, b"hello");
        handle.join().unwrap();
    }

    #[test]
    fn tcp_connect_to_closed_port_fails() {
        // Bind then drop to get a port nothing listens on.
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let result = tcp_send_recv("127.0.0.1", port, 300, b"x", 16);
        assert!(result.is_err());
    }

    #[test]
    fn udp_send_recv_round_trips_through_echo_server() {
        let server = UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr = server.local_addr().unwrap();
        let handle = thread::spawn(move || {
            let mut buf = [0u8; 16];
            let (n, peer) = server.recv_from(&mut buf).unwrap();
            server.send_to(&buf[..n], peer).unwrap();
        });
        let resp = udp_send_recv("127.0.0.1", addr.port(), 2000, b"world", 16).unwrap();
        assert_eq!(resp, b"world");
        handle.join().unwrap();
    }
}
