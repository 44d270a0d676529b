//! Crate-wide error taxonomy.
//!
//! `PolarisError` carries context for operations that can fail during setup
//! (plugin init, config lookup). Hot-path telemetry and probe results use
//! [`ReturnCode`] instead — a cheap `Copy` enum that never allocates, since
//! that path runs under load on caller threads and inside the reactor.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PolarisError {
    #[error("invalid config: {detail}")]
    InvalidConfig { detail: String },

    #[error("network failed: {detail}")]
    NetworkFailed { detail: String },

    #[error("server error: {detail}")]
    ServerError { detail: String },

    #[error("operation timed out")]
    Timeout,

    #[error("not initialized")]
    NotInitialized,

    #[error("internal error: {detail}")]
    InternalError { detail: String },
}

impl PolarisError {
    pub fn invalid_config(detail: impl Into<String>) -> Self {
        Self::InvalidConfig { detail: detail.into() }
    }

    pub fn network_failed(detail: impl Into<String>) -> Self {
        Self::NetworkFailed { detail: detail.into() }
    }

    pub fn server_error(detail: impl Into<String>) -> Self {
        Self::ServerError { detail: detail.into() }
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::InternalError { detail: detail.into() }
    }

    /// Maps this error onto its hot-path `ReturnCode` equivalent.
    pub fn as_return_code(&self) -> ReturnCode {
        match self {
            Self::InvalidConfig { .. } => ReturnCode::InvalidConfig,
            Self::NetworkFailed { .. } => ReturnCode::NetworkFailed,
            Self::ServerError { .. } => ReturnCode::ServerError,
            Self::Timeout => ReturnCode::Timeout,
            Self::NotInitialized => ReturnCode::NotInitialized,
            Self::InternalError { .. } => ReturnCode::InternalError,
        }
    }
}

impl From<polaris_membrane::MembraneNetError> for PolarisError {
    fn from(e: polaris_membrane::MembraneNetError) -> Self {
        match e {
            polaris_membrane::MembraneNetError::Timeout(_) => Self::Timeout,
            other => Self::NetworkFailed { detail: other.to_string() },
        }
    }
}

/// Cheap, non-allocating mirror of [`PolarisError`] for the probe and
/// telemetry hot path. `Ok` is the success case; everything else matches
/// one taxonomy branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnCode {
    Ok,
    InvalidConfig,
    NetworkFailed,
    ServerError,
    Timeout,
    NotInitialized,
    InternalError,
}

impl ReturnCode {
    pub fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn return_code_maps_from_error() {
        let err = PolarisError::invalid_config("missing key");
        assert_eq!(err.as_return_code(), ReturnCode::InvalidConfig);
    }

    #[test]
    fn ok_is_ok() {
        assert!(ReturnCode::Ok.is_ok());
        assert!(!ReturnCode::Timeout.is_ok());
    }
}
