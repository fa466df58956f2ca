use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use commons::loadgen::{LoadGenerator, LoadReport};
use commons::rpc::{CallTarget, Caller, CallerKind};
use commons::HelloRequest;
use log::{debug, info};

pub struct ClientContext {
    target: CallTarget,
    kind: CallerKind,
    deadline: Option<Duration>,
    caller: Option<Arc<dyn Caller>>,
}

#[derive(Debug, Default, PartialEq)]
pub struct BenchmarkStats {
    pub total_requests: usize,
    pub successful_requests: usize,
    pub failed_requests: usize,
    pub total_duration_ms: u128,
    pub min_latency_ms: u128,
    pub max_latency_ms: u128,
    pub avg_latency_ms: f64,
}

impl ClientContext {
    pub fn new(target: CallTarget, kind: CallerKind) -> Self {
        Self {
            target,
            kind,
            deadline: None,
            caller: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Uses an already built caller instead of one derived from `kind`.
    pub fn with_caller(mut self, caller: Arc<dyn Caller>) -> Self {
        self.caller = Some(caller);
        self
    }

    pub fn ensure_caller_initialized(&mut self) -> Result<Arc<dyn Caller>> {
        if self.caller.is_none() {
            info!("Initializing {} caller for {}", self.kind, self.target);
            self.caller = Some(self.kind.build(self.target.clone())?);
        }
        self.caller
            .clone()
            .ok_or_else(|| anyhow!("caller not initialized"))
    }

    pub fn target(&self) -> &CallTarget {
        &self.target
    }

    pub fn kind(&self) -> CallerKind {
        self.kind
    }

    pub async fn benchmark_rpc(
        &mut self,
        workers: usize,
        iterations: usize,
        name: &str,
    ) -> Result<(LoadReport, BenchmarkStats)> {
        let caller = self.ensure_caller_initialized()?;
        debug!(
            "Benchmarking {} with {} worker(s) x {} iteration(s), deadline {:?}",
            self.target, workers, iterations, self.deadline
        );

        let report = LoadGenerator::new(caller)
            .with_deadline(self.deadline)
            .run(workers, iterations, HelloRequest::new(name))
            .await;
        let stats = BenchmarkStats::from_report(&report);
        Ok((report, stats))
    }
}

impl BenchmarkStats {
    /// Latency figures cover successful calls only; duration is wall clock.
    pub fn from_report(report: &LoadReport) -> Self {
        let mut stats = BenchmarkStats {
            total_requests: report.records.len(),
            total_duration_ms: report.elapsed.as_millis(),
            ..Default::default()
        };

        let mut latency_sum_ms = 0u128;
        for record in report.successes() {
            let latency = record.latency.as_millis();
            if stats.successful_requests == 0 {
                stats.min_latency_ms = latency;
            }
            stats.successful_requests += 1;
            stats.min_latency_ms = stats.min_latency_ms.min(latency);
            stats.max_latency_ms = stats.max_latency_ms.max(latency);
            latency_sum_ms += latency;
        }
        stats.failed_requests = stats.total_requests - stats.successful_requests;

        if stats.successful_requests > 0 {
            stats.avg_latency_ms = latency_sum_ms as f64 / stats.successful_requests as f64;
        }
        stats
    }

    pub fn tps(&self) -> f64 {
        if self.total_duration_ms > 0 {
            (self.successful_requests as f64 * 1000.0) / self.total_duration_ms as f64
        } else {
            0.0
        }
    }

    pub fn print_stats(&self) {
        info!(
            "total={} success={} failed={} duration={}ms min={}ms max={}ms avg={:.2}ms tps={:.2}",
            self.total_requests,
            self.successful_requests,
            self.failed_requests,
            self.total_duration_ms,
            self.min_latency_ms,
            self.max_latency_ms,
            self.avg_latency_ms,
            self.tps()
        );
    }
}
