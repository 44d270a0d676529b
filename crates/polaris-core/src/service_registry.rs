//! Per-service snapshot storage (§2's "C2 holds hot lookup state... per-
//! service instance lists", §3's Service snapshot data model): an RCU map
//! keyed by service name so publishing a new snapshot never blocks
//! concurrent lookups from caller threads.

use std::sync::Arc;

use crate::model::ServiceData;
use crate::rcu::RcuMap;

/// Publishes and serves [`ServiceData`] snapshots by service name.
///
/// A snapshot is replaced, never mutated: `publish` installs a whole new
/// `ServiceData` and the RCU map handles deferred reclamation of the one
/// it supersedes, so a reader holding an `Arc` from `get` never observes a
/// torn view.
pub struct ServiceRegistry {
    services: RcuMap<String, ServiceData>,
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self { services: RcuMap::new() }
    }

    /// Installs `data` as the current snapshot for its service, superseding
    /// whatever snapshot was published before.
    pub fn publish(&self, data: ServiceData) {
        self.services.update(data.service.clone(), data);
    }

    pub fn get(&self, service: &str) -> Option<Arc<ServiceData>> {
        self.services.get(&service.to_string())
    }

    /// Removes a service's snapshot entirely, e.g. once the discovery
    /// control plane reports it deregistered.
    pub fn remove(&self, service: &str) {
        self.services.delete(service.to_string());
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Instance;

    #[test]
    fn publish_then_get_returns_the_latest_snapshot() {
        let registry = ServiceRegistry::new();
        registry.publish(ServiceData::new("orders", 1, vec![Instance::new("i1", "10.0.0.1", 8080)]));
        assert_eq!(registry.get("orders").unwrap().revision, 1);

        registry.publish(ServiceData::new(
            "orders",
            2,
            vec![Instance::new("i1", "10.0.0.1", 8080), Instance::new("i2", "10.0.0.2", 8080)],
        ));
        let latest = registry.get("orders").unwrap();
        assert_eq!(latest.revision, 2);
        assert_eq!(latest.instances.len(), 2);
    }

    #[test]
    fn get_on_unknown_service_is_none() {
        let registry = ServiceRegistry::new();
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn remove_drops_the_snapshot() {
        let registry = ServiceRegistry::new();
        registry.publish(ServiceData::new("orders", 1, vec![]));
        assert!(registry.get("orders").is_some());
        registry.remove("orders");
        assert!(registry.get("orders").is_none());
    }

    #[test]
    fn a_reader_holding_an_arc_keeps_seeing_its_own_snapshot_after_republish() {
        let registry = ServiceRegistry::new();
        registry.publish(ServiceData::new("orders", 1, vec![Instance::new("i1", "10.0.0.1", 8080)]));
        let held = registry.get("orders").unwrap();
        registry.publish(ServiceData::new("orders", 2, vec![]));
        assert_eq!(held.revision, 1, "snapshot held by a reader must not change under it");
        assert_eq!(registry.get("orders").unwrap().revision, 2);
    }
}
