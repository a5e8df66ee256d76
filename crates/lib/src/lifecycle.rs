//! Worker supervision: the first worker to exit cancels the rest; `wait` returns only after all exited.

use std::collections::HashMap;
use std::future::Future;
use tokio::task::{Id, JoinSet};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// All started workers are running.
    Running,
    /// A worker has exited and cancellation was broadcast; waiting for the rest.
    Draining,
    /// Every started worker has exited.
    Stopped,
}

/// What happened during one supervised run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Name of the worker whose exit triggered cancellation (None when no worker was started).
    pub first: Option<String>,
    /// Number of worker exits observed; equals the number of started workers.
    pub completions: usize,
}

/// Starts workers and tears them all down together.
///
/// Each spawned worker produces exactly one completion, whether it returns `Ok`, `Err` or panics.
/// Cancellation is cooperative: workers must observe the token; nothing is aborted.
pub struct Supervisor {
    cancel: CancellationToken,
    workers: JoinSet<anyhow::Result<()>>,
    names: HashMap<Id, String>,
    started: usize,
    phase: Phase,
}

impl Supervisor {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            workers: JoinSet::new(),
            names: HashMap::new(),
            started: 0,
            phase: Phase::Running,
        }
    }

    /// Token shared with every worker.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn started(&self) -> usize {
        self.started
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn spawn<F>(&mut self, name: impl Into<String>, worker: F)
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let name = name.into();
        log::debug!("starting worker {}", name);
        self.started += 1;
        let handle = self.workers.spawn(worker);
        self.names.insert(handle.id(), name);
    }

    fn transition(&mut self, to: Phase) {
        log::debug!("supervisor: {:?} -> {:?}", self.phase, to);
        self.phase = to;
    }

    /// Wait for the first exit, cancel everything, then wait for all remaining exits.
    pub async fn wait(mut self) -> ShutdownReport {
        let mut report = ShutdownReport {
            first: None,
            completions: 0,
        };
        while let Some(joined) = self.workers.join_next_with_id().await {
            report.completions += 1;
            let (id, outcome) = match joined {
                Ok((id, res)) => (id, Ok(res)),
                Err(e) => (e.id(), Err(e)),
            };
            let name = self
                .names
                .remove(&id)
                .unwrap_or_else(|| format!("task {}", id));
            match outcome {
                Ok(Ok(())) => log::info!("worker {} exited", name),
                Ok(Err(e)) => log::error!("worker {} failed: {:#}", name, e),
                Err(e) => log::error!("worker {} panicked: {}", name, e),
            }
            if self.phase == Phase::Running {
                log::info!(
                    "{} worker(s) still running after {} exited; cancelling",
                    self.started - report.completions,
                    name
                );
                report.first = Some(name);
                self.cancel.cancel();
                self.transition(Phase::Draining);
            }
        }
        self.transition(Phase::Stopped);
        report
    }
}
