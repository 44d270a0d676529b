//! Orchestration layer (§4.5's "the engine"): schedules a detector's
//! recurring probe and a circuit-breaker sweep for one instance onto a
//! reactor's timing wheel, and feeds probe outcomes into that instance's
//! breaker chain.

use std::sync::Arc;

use crate::circuit_breaker::CircuitBreakerChainData;
use crate::error::ReturnCode;
use crate::model::{Instance, InstanceGauge, ReportCode};
use crate::reactor::{Reactor, TimingTask};

use super::{DetectResult, DetectType, Detector};

fn report_code_for(code: ReturnCode) -> ReportCode {
    match code {
        ReturnCode::Ok => ReportCode::Ok,
        ReturnCode::Timeout => ReportCode::Timeout,
        _ => ReportCode::Error,
    }
}

/// Recurring task: probes one instance through its detector, then reports
/// the outcome into the owning service's circuit-breaker chain.
struct ProbeTask {
    instance: Instance,
    detector: Box<dyn Detector>,
    detect_type: DetectType,
    chain: Arc<CircuitBreakerChainData>,
    interval_ms: u64,
}

impl TimingTask for ProbeTask {
    fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    fn run(&mut self) {
        let mut result = DetectResult::new(self.detect_type);
        let code = self.detector.detect_instance_once(&self.instance, &mut result);
        let gauge = InstanceGauge::new(report_code_for(code), result.elapse_ms as u32);
        tracing::debug!(
            instance_id = %self.instance.instance_id,
            detector = self.detector.name(),
            return_code = ?code,
            elapse_ms = result.elapse_ms,
            "health probe completed"
        );
        self.chain.report(&self.instance.instance_id, gauge);
    }

    fn next_run_time(&self) -> u64 {
        crate::time::now_ms() + self.interval_ms
    }
}

/// Recurring task: advances this instance's scheduled circuit-breaker
/// transitions (Open -> HalfOpen, HalfOpen -> Open/Closed).
struct SweepTask {
    instance_id: String,
    chain: Arc<CircuitBreakerChainData>,
    interval_ms: u64,
}

impl TimingTask for SweepTask {
    fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    fn run(&mut self) {
        self.chain.sweep(&self.instance_id);
    }

    fn next_run_time(&self) -> u64 {
        crate::time::now_ms() + self.interval_ms
    }
}

/// Schedules `instance`'s recurring probe and breaker sweep onto
/// `reactor`'s timing wheel. Must be called from the reactor's executor
/// thread (or before `run`/`run_once` starts, per C3's in-thread-operation
/// contract).
pub fn schedule_instance(
    reactor: &mut Reactor,
    instance: Instance,
    detector: Box<dyn Detector>,
    detect_type: DetectType,
    chain: Arc<CircuitBreakerChainData>,
    probe_interval_ms: u64,
    sweep_interval_ms: u64,
) {
    let instance_id = instance.instance_id.clone();
    reactor.add_timing_task(Box::new(ProbeTask {
        instance,
        detector,
        detect_type,
        chain: chain.clone(),
        interval_ms: probe_interval_ms,
    }));
    reactor.add_timing_task(Box::new(SweepTask { instance_id, chain, interval_ms: sweep_interval_ms }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::{CircuitBreakerStrategy, ErrorCountConfig, ErrorCountStrategy};
    use crate::config::MapConfig;
    use crate::health_check::TcpDetector;
    use std::net::TcpListener;

    // Grounds §4.5's "results update the circuit-breaker chain for that
    // instance": repeated probes against a closed port should trip the
    // breaker without any caller driving the probe loop by hand.
    #[test]
    fn scheduled_probe_opens_breaker_against_a_closed_port() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener); // now closed: connects fail fast

        let mut detector = TcpDetector::default();
        detector.init(&MapConfig::new()).unwrap();

        let strategy = ErrorCountStrategy::new(ErrorCountConfig {
            continuous_error_threshold: 2,
            ..Default::default()
        });
        let chain = Arc::new(CircuitBreakerChainData::new(vec![
            Box::new(strategy) as Box<dyn CircuitBreakerStrategy>
        ]));

        let instance = Instance::new("i1", addr.ip().to_string(), addr.port());

        let mut reactor = Reactor::new().unwrap();
        schedule_instance(
            &mut reactor,
            instance,
            Box::new(detector),
            DetectType::Tcp,
            chain.clone(),
            10,
            1_000_000,
        );

        let stopper = reactor.handle();
        std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(200));
            stopper.stop();
        });
        reactor.run();

        assert!(!chain.is_instance_healthy("i1"));
    }
}
