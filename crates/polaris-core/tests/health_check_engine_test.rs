//! Black-box integration test: a published service snapshot's instance is
//! probed through the reactor's timing wheel, and a healthy instance never
//! trips its circuit-breaker chain.

use std::net::TcpListener;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use polaris_core::circuit_breaker::{CircuitBreakerChainData, CircuitBreakerStrategy, ErrorCountStrategy};
use polaris_core::config::MapConfig;
use polaris_core::health_check::{schedule_instance, DetectType, Detector, TcpDetector};
use polaris_core::model::{Instance, ServiceData};
use polaris_core::reactor::Reactor;
use polaris_core::service_registry::ServiceRegistry;

#[test]
fn healthy_instance_stays_closed_under_scheduled_probing() {
    // Any inbound connection is accepted and immediately dropped: a
    // well-formed but response-less TCP health check, which the detector
    // treats as Ok absent a configured `receive` to match against.
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let server = thread::spawn(move || {
        for stream in listener.incoming().take(20) {
            if let Ok(stream) = stream {
                drop(stream);
            } else {
                break;
            }
        }
    });

    let registry = ServiceRegistry::new();
    registry.publish(ServiceData::new(
        "orders",
        1,
        vec![Instance::new("i1", addr.ip().to_string(), addr.port())],
    ));
    let snapshot = registry.get("orders").unwrap();
    let instance = snapshot.find("i1").unwrap().clone();

    let mut detector = TcpDetector::default();
    detector.init(&MapConfig::new().with("timeout", "50")).unwrap();

    let chain = Arc::new(CircuitBreakerChainData::new(vec![
        Box::new(ErrorCountStrategy::new(Default::default())) as Box<dyn CircuitBreakerStrategy>
    ]));

    let mut reactor = Reactor::new().unwrap();
    schedule_instance(&mut reactor, instance, Box::new(detector), DetectType::Tcp, chain.clone(), 20, 5_000);

    let stopper = reactor.handle();
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(300));
        stopper.stop();
    });
    reactor.run();

    assert!(chain.is_instance_healthy("i1"));
    let _ = server.join();
}
