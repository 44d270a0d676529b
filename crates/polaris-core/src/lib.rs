//! Concurrency and data-plane substrate for a service-discovery and
//! traffic-governance client.
//!
//! This crate is the core covered by the spec: the single-threaded event
//! [`reactor`] multiplexing timed tasks and file-descriptor events; the
//! read-optimized [`rcu`] map serving hot instance lookups without
//! blocking readers (published through [`service_registry`] for
//! per-service snapshots); the [`circuit_breaker`] chain classifying
//! instance health from call telemetry; and the active [`health_check`]
//! loop probing instances through pluggable detectors, scheduled onto the
//! reactor's timing wheel. [`registry`] is the process-wide plugin lookup
//! table those detectors and strategies are registered under by name.
//!
//! Deliberately out of scope, consumed only through the narrow interfaces
//! defined here (`Config`, `Detector`, `CircuitBreakerStrategy`): the wire
//! protocol to the discovery control plane, the rate-limit quota
//! protocol, the outer public lookup/report API, and the plugin bodies
//! themselves beyond the three detectors and two breaker strategies this
//! crate ships.

pub mod circuit_breaker;
pub mod config;
pub mod error;
pub mod health_check;
pub mod model;
pub mod rcu;
pub mod reactor;
pub mod registry;
pub mod service_registry;
pub mod time;

pub use config::{Config, MapConfig};
pub use error::{PolarisError, ReturnCode};
pub use model::{Instance, InstanceGauge, ReportCode, ServiceData};
pub use service_registry::ServiceRegistry;
