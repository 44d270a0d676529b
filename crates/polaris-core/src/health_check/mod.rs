//! Active health-check engine (C5): pluggable detectors probing instances
//! on a schedule driven by the reactor's timing wheel.

mod engine;
mod http;
mod tcp;
mod udp;

pub use engine::schedule_instance;
pub use http::HttpDetector;
pub use tcp::TcpDetector;
pub use udp::UdpDetector;

use crate::config::Config;
use crate::error::{PolarisError, ReturnCode};
use crate::model::Instance;

/// What kind of probe produced a [`DetectResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectType {
    Tcp,
    Udp,
    Http,
}

/// Outcome of one probe, populated by [`Detector::detect_instance_once`].
#[derive(Debug, Clone, Copy)]
pub struct DetectResult {
    pub detect_type: DetectType,
    pub return_code: ReturnCode,
    pub elapse_ms: u64,
}

impl DetectResult {
    pub fn new(detect_type: DetectType) -> Self {
        Self { detect_type, return_code: ReturnCode::Ok, elapse_ms: 0 }
    }
}

/// Capability set a health-check plugin exposes: one-time configuration,
/// an identifying name, and the probe entrypoint itself.
///
/// Implementations must not block beyond their own configured timeout —
/// they run on whatever thread the engine schedules them on, which may be
/// the reactor's executor thread.
pub trait Detector: Send {
    fn init(&mut self, config: &dyn Config) -> Result<(), PolarisError>;
    fn name(&self) -> &'static str;
    fn detect_instance_once(&self, instance: &Instance, result: &mut DetectResult) -> ReturnCode;
}

/// Decodes a hex string such as `"68656c6c6f"` into raw bytes. An empty
/// string decodes to an empty payload (meaning "send/expect nothing").
pub(crate) fn decode_hex(s: &str) -> Result<Vec<u8>, PolarisError> {
    if s.is_empty() {
        return Ok(Vec::new());
    }
    if s.len() % 2 != 0 {
        return Err(PolarisError::invalid_config(format!("odd-length hex string: {s}")));
    }
    let mut out = Vec::with_capacity(s.len() / 2);
    let bytes = s.as_bytes();
    for chunk in bytes.chunks(2) {
        let hi = hex_digit(chunk[0])?;
        let lo = hex_digit(chunk[1])?;
        out.push((hi << 4) | lo);
    }
    Ok(out)
}

fn hex_digit(b: u8) -> Result<u8, PolarisError> {
    match b {
        b'0'..=b'9' => Ok(b - b'0'),
        b'a'..=b'f' => Ok(b - b'a' + 10),
        b'A'..=b'F' => Ok(b - b'A' + 10),
        _ => Err(PolarisError::invalid_config(format!("invalid hex digit: {}", b as char))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_hex_round_trips_hello() {
        assert_eq!(decode_hex("68656c6c6f").unwrap(), b"hello");
    }

    #[test]
    fn decode_hex_empty_is_empty() {
        assert_eq!(decode_hex("").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn decode_hex_rejects_odd_length() {
        assert!(decode_hex("abc").is_err());
    }

    #[test]
    fn decode_hex_rejects_bad_digit() {
        assert!(decode_hex("zz").is_err());
    }
}
