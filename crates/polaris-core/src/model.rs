//! Shared data model: instances, service snapshots, and call telemetry.

use std::collections::BTreeMap;
use std::sync::Arc;

/// Stable instance identity plus its endpoint and static weight.
///
/// Instances are immutable within a snapshot; a change to any field is
/// expressed by publishing a new [`ServiceData`] snapshot that contains a
/// replacement instance, never by mutating one in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    pub instance_id: String,
    pub host: String,
    pub port: u16,
    pub weight: u32,
    pub metadata: BTreeMap<String, String>,
}

impl Instance {
    pub fn new(instance_id: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            instance_id: instance_id.into(),
            host: host.into(),
            port,
            weight: 100,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// An immutable published view of a service's instances.
///
/// Superseded as a whole by later snapshots (never mutated in place); the
/// RCU map that stores snapshots keyed by service name handles reference
/// counting and deferred reclamation via [`Arc`].
#[derive(Debug, Clone)]
pub struct ServiceData {
    pub service: String,
    pub revision: u64,
    pub instances: Arc<Vec<Instance>>,
}

impl ServiceData {
    pub fn new(service: impl Into<String>, revision: u64, instances: Vec<Instance>) -> Self {
        Self {
            service: service.into(),
            revision,
            instances: Arc::new(instances),
        }
    }

    pub fn find(&self, instance_id: &str) -> Option<&Instance> {
        self.instances.iter().find(|i| i.instance_id == instance_id)
    }
}

/// Report code surfaced by call-result reporting APIs.
///
/// Any non-`Ok` increments an instance's failure counter; `Ok` resets
/// (Closed state) or contributes to `success_count` (HalfOpen state).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportCode {
    Ok,
    Error,
    Timeout,
}

impl ReportCode {
    pub fn is_failure(self) -> bool {
        !matches!(self, Self::Ok)
    }
}

/// One telemetry record ingested by a circuit-breaker strategy.
#[derive(Debug, Clone, Copy)]
pub struct InstanceGauge {
    pub report: ReportCode,
    pub elapse_ms: u32,
}

impl InstanceGauge {
    pub fn new(report: ReportCode, elapse_ms: u32) -> Self {
        Self { report, elapse_ms }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_data_finds_instance_by_id() {
        let svc = ServiceData::new(
            "orders",
            1,
            vec![Instance::new("i1", "10.0.0.1", 8080), Instance::new("i2", "10.0.0.2", 8080)],
        );
        assert_eq!(svc.find("i2").unwrap().host, "10.0.0.2");
        assert!(svc.find("missing").is_none());
    }

    #[test]
    fn report_code_failure_classification() {
        assert!(!ReportCode::Ok.is_failure());
        assert!(ReportCode::Error.is_failure());
        assert!(ReportCode::Timeout.is_failure());
    }
}
