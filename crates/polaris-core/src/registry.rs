//! Plugin registry (C7): process-wide lookup tables of named factories for
//! health-check detectors and circuit-breaker strategies.
//!
//! Registration happens once at startup; `create` yields a freshly
//! constructed, not-yet-`Init`ed instance that the caller configures with
//! a `Config` subtree. Unknown names fail fast with
//! `PolarisError::InvalidConfig`, matching §4.7's "unknown names produce a
//! configuration error".

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::circuit_breaker::{CircuitBreakerStrategy, ErrorCountStrategy, ErrorRateStrategy};
use crate::error::PolarisError;
use crate::health_check::{Detector, HttpDetector, TcpDetector, UdpDetector};

/// A named lookup table of zero-argument factories producing boxed trait
/// objects. Generic over the capability `T` so the same shape backs both
/// the detector registry and the circuit-breaker-strategy registry.
pub struct PluginTable<T: ?Sized> {
    factories: RwLock<HashMap<String, fn() -> Box<T>>>,
}

impl<T: ?Sized> Default for PluginTable<T> {
    fn default() -> Self {
        Self { factories: RwLock::new(HashMap::new()) }
    }
}

impl<T: ?Sized> PluginTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `factory` under `name`, overwriting any prior
    /// registration for that name.
    pub fn register(&self, name: impl Into<String>, factory: fn() -> Box<T>) {
        self.factories.write().insert(name.into(), factory);
    }

    /// Looks up `name` and constructs a fresh, un-`Init`ed instance.
    pub fn create(&self, name: &str) -> Result<Box<T>, PolarisError> {
        let factories = self.factories.read();
        let factory = factories
            .get(name)
            .ok_or_else(|| PolarisError::invalid_config(format!("unknown plugin: {name}")))?;
        Ok(factory())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.read().contains_key(name)
    }
}

/// Process-wide registry of every plugin kind the core itself consumes.
///
/// Pre-populated with the three detectors and two breaker strategies this
/// crate ships, under the names §6 requires at minimum. Host applications
/// register their own weight-adjuster/router/load-balancer plugins
/// elsewhere — this crate only consumes those through their capability
/// interface, so it has no table for them.
pub struct PluginRegistry {
    pub detectors: PluginTable<dyn Detector>,
    pub breaker_strategies: PluginTable<dyn CircuitBreakerStrategy>,
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginRegistry {
    pub fn new() -> Self {
        let registry = Self { detectors: PluginTable::new(), breaker_strategies: PluginTable::new() };
        registry.detectors.register("tcp", || Box::new(TcpDetector::default()));
        registry.detectors.register("udp", || Box::new(UdpDetector::default()));
        registry.detectors.register("http", || Box::new(HttpDetector::default()));
        registry
            .breaker_strategies
            .register("errorCount", || Box::new(ErrorCountStrategy::new(Default::default())));
        registry
            .breaker_strategies
            .register("errorRate", || Box::new(ErrorRateStrategy::new(Default::default())));
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MapConfig;

    #[test]
    fn default_registry_knows_the_required_plugin_names() {
        let registry = PluginRegistry::new();
        for name in ["tcp", "udp", "http"] {
            assert!(registry.detectors.contains(name), "missing detector: {name}");
        }
        for name in ["errorCount", "errorRate"] {
            assert!(registry.breaker_strategies.contains(name), "missing strategy: {name}");
        }
    }

    #[test]
    fn create_unknown_detector_is_invalid_config() {
        let registry = PluginRegistry::new();
        let err = registry.detectors.create("grpc").unwrap_err();
        assert!(matches!(err, PolarisError::InvalidConfig { .. }));
    }

    #[test]
    fn created_detector_can_be_initialized() {
        let registry = PluginRegistry::new();
        let mut detector = registry.detectors.create("tcp").unwrap();
        assert_eq!(detector.name(), "tcp");
        detector.init(&MapConfig::new()).unwrap();
    }

    #[test]
    fn register_overwrites_prior_factory_for_same_name() {
        let table: PluginTable<dyn Detector> = PluginTable::new();
        table.register("tcp", || Box::new(TcpDetector::default()));
        table.register("tcp", || Box::new(UdpDetector::default()));
        let instance = table.create("tcp").unwrap();
        assert_eq!(instance.name(), "udp");
    }
}
