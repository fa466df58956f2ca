use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use tokio::task::JoinSet;

use crate::err::RpcError;
use crate::rpc::msg::{HelloReply, HelloRequest};
use crate::rpc::Caller;

/// What a single worker task is told to do. Handed over by value at spawn
/// time so workers never share mutable state.
#[derive(Debug, Clone)]
pub struct WorkerPlan {
    pub worker: usize,
    pub iterations: usize,
    pub request: HelloRequest,
}

/// One attempt made by the load generator.
#[derive(Debug)]
pub struct CallRecord {
    pub worker: usize,
    pub iteration: usize,
    pub latency: Duration,
    pub outcome: Result<HelloReply, RpcError>,
}

impl CallRecord {
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

#[derive(Debug, Default)]
pub struct LoadReport {
    pub records: Vec<CallRecord>,
    pub elapsed: Duration,
}

impl LoadReport {
    pub fn successes(&self) -> impl Iterator<Item = &CallRecord> {
        self.records.iter().filter(|r| r.is_ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = &CallRecord> {
        self.records.iter().filter(|r| !r.is_ok())
    }

    pub fn failure_count(&self) -> usize {
        self.failures().count()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failure_count() == 0
    }
}

/// Upper bound on records reserved up front; larger runs grow as they go.
const MAX_PREALLOCATED_RECORDS: usize = 1024;

/// Drives `workers` concurrent tasks, each issuing `iterations` sequential
/// greeting calls through a shared [`Caller`].
#[derive(Clone)]
pub struct LoadGenerator {
    caller: Arc<dyn Caller>,
    deadline: Option<Duration>,
}

impl LoadGenerator {
    pub fn new(caller: Arc<dyn Caller>) -> Self {
        Self {
            caller,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Returns once every worker has finished. Call failures are recorded,
    /// never propagated.
    pub async fn run(&self, workers: usize, iterations: usize, request: HelloRequest) -> LoadReport {
        info!(
            "Starting {} worker(s) x {} iteration(s)",
            workers, iterations
        );
        let start = Instant::now();

        let mut tasks = JoinSet::new();
        for worker in 0..workers {
            let plan = WorkerPlan {
                worker,
                iterations,
                request: request.clone(),
            };
            tasks.spawn(Self::work(self.caller.clone(), self.deadline, plan));
        }

        let mut records =
            Vec::with_capacity(workers.saturating_mul(iterations).min(MAX_PREALLOCATED_RECORDS));
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(mut worker_records) => records.append(&mut worker_records),
                Err(e) => error!("worker task aborted: {}", e),
            }
        }
        records.sort_by_key(|r| (r.worker, r.iteration));

        let report = LoadReport {
            records,
            elapsed: start.elapsed(),
        };
        info!(
            "Finished {} call(s) in {:?}, {} failed",
            report.records.len(),
            report.elapsed,
            report.failure_count()
        );
        report
    }

    async fn work(
        caller: Arc<dyn Caller>,
        deadline: Option<Duration>,
        plan: WorkerPlan,
    ) -> Vec<CallRecord> {
        let mut records = Vec::with_capacity(plan.iterations.min(MAX_PREALLOCATED_RECORDS));
        for iteration in 0..plan.iterations {
            let started = Instant::now();
            let outcome = caller.say_hello(plan.request.clone(), deadline).await;
            let latency = started.elapsed();

            match &outcome {
                Ok(reply) => debug!(
                    "worker={} iteration={} reply={:?} latency={:?}",
                    plan.worker, iteration, reply.message, latency
                ),
                Err(e) => warn!(
                    "could not greet: worker={} iteration={} code={} {}",
                    plan.worker,
                    iteration,
                    e.code(),
                    e
                ),
            }

            records.push(CallRecord {
                worker: plan.worker,
                iteration,
                latency,
                outcome,
            });
        }
        records
    }
}
