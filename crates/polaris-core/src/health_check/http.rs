//! HTTP health-check detector.
//!
//! Not a general HTTP client: it builds a minimal HTTP/1.0 request line
//! over `tcp_send_recv` and scans only the status line of the response.
//! A full client stack (redirects, chunked transfer, keep-alive) is out of
//! scope for a liveness probe.

use super::{DetectResult, DetectType, Detector};
use crate::config::Config;
use crate::error::{PolarisError, ReturnCode};
use crate::model::Instance;

const DEFAULT_TIMEOUT_MS: u64 = 100;
const DEFAULT_MAX_RESPONSE: usize = 4096;

pub struct HttpDetector {
    path: String,
    timeout_ms: u64,
    healthy_codes: Vec<u16>,
}

impl Default for HttpDetector {
    fn default() -> Self {
        Self { path: "/".to_string(), timeout_ms: DEFAULT_TIMEOUT_MS, healthy_codes: vec![200] }
    }
}

impl Detector for HttpDetector {
    fn init(&mut self, config: &dyn Config) -> Result<(), PolarisError> {
        self.path = config.get_str_or("path", "/").to_string();
        self.timeout_ms = config.get_int_or("timeout", DEFAULT_TIMEOUT_MS as i64).max(0) as u64;
        let codes = config.get_str_or("healthyCodes", "200");
        self.healthy_codes = codes
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<u16>()
                    .map_err(|_| PolarisError::invalid_config(format!("bad status code: {s}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        if self.healthy_codes.is_empty() {
            self.healthy_codes.push(200);
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "http"
    }

    fn detect_instance_once(&self, instance: &Instance, result: &mut DetectResult) -> ReturnCode {
        *result = DetectResult::new(DetectType::Http);
        let started = crate::time::now_ms();

        let request = format!(
            "GET {} HTTP/1.0\r\nHost: {}\r\nConnection: close\r\n\r\n",
            self.path, instance.host
        );

        let outcome = polaris_membrane::tcp_send_recv(
            &instance.host,
            instance.port,
            self.timeout_ms,
            request.as_bytes(),
            DEFAULT_MAX_RESPONSE,
        );

        result.elapse_ms = crate::time::now_ms().saturating_sub(started);

        let response = match outcome {
            Ok(bytes) => bytes,
            Err(e) => {
                let err: PolarisError = e.into();
                result.return_code = err.as_return_code();
                return result.return_code;
            }
        };

        result.return_code = match parse_status_code(&response) {
            Some(code) if self.healthy_codes.contains(&code) => ReturnCode::Ok,
            Some(_) => ReturnCode::ServerError,
            None => ReturnCode::ServerError,
        };
        result.return_code
    }
}

/// Extracts the numeric status code from a `HTTP/1.x <code> ...` status
/// line. Anything after the status line (headers, body) is ignored.
fn parse_status_code(response: &[u8]) -> Option<u16> {
    let line_end = response.iter().position(|&b| b == b'\n').unwrap_or(response.len());
    let line = std::str::from_utf8(&response[..line_end]).ok()?;
    let mut parts = line.split_whitespace();
    let version = parts.next()?;
    if !version.starts_with("HTTP/") {
        return None;
    }
    parts.next()?.parse::<u16>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MapConfig;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    fn spawn_server(response: &'static [u8]) -> (u16, thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut buf = [0u8; 256];
                let _ = stream.read(&mut buf);
                let _ = stream.write_all(response);
            }
        });
        (port, handle)
    }

    #[test]
    fn status_200_is_healthy() {
        let (port, handle) = spawn_server(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n");
        let mut det = HttpDetector::default();
        det.init(&MapConfig::new()).unwrap();
        let instance = Instance::new("i1", "127.0.0.1", port);
        let mut result = DetectResult::new(DetectType::Http);
        assert_eq!(det.detect_instance_once(&instance, &mut result), ReturnCode::Ok);
        handle.join().unwrap();
    }

    #[test]
    fn status_500_is_server_error() {
        let (port, handle) = spawn_server(b"HTTP/1.1 500 Internal Server Error\r\n\r\n");
        let mut det = HttpDetector::default();
        det.init(&MapConfig::new()).unwrap();
        let instance = Instance::new("i1", "127.0.0.1", port);
        let mut result = DetectResult::new(DetectType::Http);
        assert_eq!(det.detect_instance_once(&instance, &mut result), ReturnCode::ServerError);
        handle.join().unwrap();
    }

    #[test]
    fn custom_healthy_codes_accept_204() {
        let (port, handle) = spawn_server(b"HTTP/1.1 204 No Content\r\n\r\n");
        let mut det = HttpDetector::default();
        det.init(&MapConfig::new().with("healthyCodes", "200,204")).unwrap();
        let instance = Instance::new("i1", "127.0.0.1", port);
        let mut result = DetectResult::new(DetectType::Http);
        assert_eq!(det.detect_instance_once(&instance, &mut result), ReturnCode::Ok);
        handle.join().unwrap();
    }

    #[test]
    fn parse_status_code_extracts_code() {
        assert_eq!(parse_status_code(b"HTTP/1.1 200 OK\r\n"), Some(200));
        assert_eq!(parse_status_code(b"garbage"), None);
    }
}
