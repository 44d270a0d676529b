//! UDP health-check detector: send a datagram, optionally compare the
//! response. Symmetric to [`super::TcpDetector`].

use super::{decode_hex, DetectResult, DetectType, Detector};
use crate::config::Config;
use crate::error::{PolarisError, ReturnCode};
use crate::model::Instance;

const DEFAULT_TIMEOUT_MS: u64 = 100;
const DEFAULT_MAX_RESPONSE: usize = 4096;

pub struct UdpDetector {
    send: Vec<u8>,
    receive: Option<Vec<u8>>,
    timeout_ms: u64,
}

impl Default for UdpDetector {
    fn default() -> Self {
        Self { send: Vec::new(), receive: None, timeout_ms: DEFAULT_TIMEOUT_MS }
    }
}

impl Detector for UdpDetector {
    fn init(&mut self, config: &dyn Config) -> Result<(), PolarisError> {
        self.send = decode_hex(config.get_str_or("send", ""))?;
        let receive = config.get_str_or("receive", "");
        self.receive = if receive.is_empty() { None } else { Some(decode_hex(receive)?) };
        self.timeout_ms = config.get_int_or("timeout", DEFAULT_TIMEOUT_MS as i64).max(0) as u64;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "udp"
    }

    fn detect_instance_once(&self, instance: &Instance, result: &mut DetectResult) -> ReturnCode {
        *result = DetectResult::new(DetectType::Udp);
        let started = crate::time::now_ms();

        let outcome = polaris_membrane::udp_send_recv(
            &instance.host,
            instance.port,
            self.timeout_ms,
            &self.send,
            DEFAULT_MAX_RESPONSE,
        );

        result.elapse_ms = crate::time::now_ms().saturating_sub(started);

        let response = match outcome {
            Ok(bytes) => bytes,
            Err(e) => {
                // §4.5 fixes this detector's outcome set to NetworkFailed /
                // ServerError / Ok: a probe timeout is a socket-level
                // failure here, not the generic `ReturnCode::Timeout`.
                let err: PolarisError = e.into();
                result.return_code = match err {
                    PolarisError::Timeout => ReturnCode::NetworkFailed,
                    other => other.as_return_code(),
                };
                return result.return_code;
            }
        };

        if let Some(expected) = &self.receive {
            if &response != expected {
                result.return_code = ReturnCode::ServerError;
                return result.return_code;
            }
        }

        result.return_code = ReturnCode::Ok;
        result.return_code
    }
}
