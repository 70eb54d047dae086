//! Bounded-parallel dispatch of per-unit tasks
//!
//! Every unit gets its own task, but a task only runs its body while holding
//! one of `limit` semaphore permits. The permit is an RAII guard, so it is
//! returned on success, on error and on panic alike.
//!
//! The first fatal error cancels a shared token before its permit is
//! released. Tasks still waiting for a permit observe the token and exit
//! without calling the service.

use crate::unit::SourceUnit;
use crate::{LlmError, LlmResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use vulnhud_utils::logging::get_logger;

/// What happens to in-flight tasks once one task fails fatally
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum FatalPolicy {
    /// Stop dispatching, let calls already in flight finish
    #[default]
    Drain,
    /// Stop dispatching and abandon calls already in flight
    Abort,
}

impl std::fmt::Display for FatalPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FatalPolicy::Drain => write!(f, "drain"),
            FatalPolicy::Abort => write!(f, "abort"),
        }
    }
}

/// A unit whose task failed without aborting the run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedUnit {
    pub unit_id: String,
    pub reason: String,
}

/// Outcome of a dispatch that was not aborted
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    /// Units whose task completed successfully, in completion order
    pub completed: Vec<String>,
    pub skipped: Vec<SkippedUnit>,
}

enum TaskOutcome {
    Finished(LlmResult<()>),
    NotDispatched,
}

/// Runs one task per unit with at most `limit` running at once
#[derive(Debug, Clone)]
pub struct BoundedScheduler {
    limit: usize,
    policy: FatalPolicy,
}

impl BoundedScheduler {
    pub fn new(limit: usize) -> LlmResult<Self> {
        if limit == 0 {
            return Err(LlmError::Config("Concurrency limit must be at least 1".to_string()));
        }
        Ok(Self {
            limit,
            policy: FatalPolicy::default(),
        })
    }

    #[must_use]
    pub fn with_policy(mut self, policy: FatalPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Run `task` for every unit and wait for all of them.
    ///
    /// Returns the first fatal error if any task hit one; per-unit failures
    /// are collected in [`DispatchSummary::skipped`].
    pub async fn run<F, Fut>(&self, units: Vec<SourceUnit>, task: F) -> LlmResult<DispatchSummary>
    where
        F: Fn(SourceUnit) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = LlmResult<()>> + Send + 'static,
    {
        let logger = get_logger("vulnhud.scheduler");
        let semaphore = Arc::new(Semaphore::new(self.limit));
        let cancel = CancellationToken::new();
        let task = Arc::new(task);
        let mut set = JoinSet::new();
        // a panicked task only reports its task id
        let mut unit_ids: HashMap<tokio::task::Id, String> = HashMap::new();

        logger.info(&format!(
            "Dispatching {} units with concurrency {}",
            units.len(),
            self.limit
        ));

        for unit in units {
            let semaphore = semaphore.clone();
            let cancel = cancel.clone();
            let task = task.clone();
            let spawned_id = unit.id().to_string();

            let handle = set.spawn(async move {
                let unit_id = unit.id().to_string();

                let permit = tokio::select! {
                    biased;
                    () = cancel.cancelled() => return (unit_id, TaskOutcome::NotDispatched),
                    permit = semaphore.acquire_owned() => permit,
                };
                let Ok(_permit) = permit else {
                    return (unit_id, TaskOutcome::NotDispatched);
                };

                tracing::debug!(unit = %unit_id, "Processing unit");
                let result = task(unit).await;

                if matches!(&result, Err(e) if e.is_fatal()) {
                    cancel.cancel();
                }

                (unit_id, TaskOutcome::Finished(result))
            });
            unit_ids.insert(handle.id(), spawned_id);
        }

        let mut summary = DispatchSummary::default();
        let mut fatal: Option<LlmError> = None;
        let mut not_dispatched = 0usize;

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((unit_id, TaskOutcome::Finished(Ok(())))) => {
                    logger.debug(&format!("Unit completed: {}", unit_id));
                    summary.completed.push(unit_id);
                }
                Ok((unit_id, TaskOutcome::Finished(Err(error)))) if error.is_fatal() => {
                    if fatal.is_none() {
                        logger.error(&format!("Fatal error while processing {}: {}", unit_id, error));
                        cancel.cancel();
                        if self.policy == FatalPolicy::Abort {
                            set.abort_all();
                        }
                        fatal = Some(error);
                    } else {
                        logger.debug(&format!("Additional fatal error from {}: {}", unit_id, error));
                    }
                }
                Ok((unit_id, TaskOutcome::Finished(Err(error)))) => {
                    logger.warning(&format!("Skipping {}: {}", unit_id, error));
                    summary.skipped.push(SkippedUnit {
                        unit_id,
                        reason: error.to_string(),
                    });
                }
                Ok((_, TaskOutcome::NotDispatched)) => not_dispatched += 1,
                Err(join_error) if join_error.is_cancelled() => not_dispatched += 1,
                Err(join_error) => {
                    let unit_id = unit_ids
                        .remove(&join_error.id())
                        .unwrap_or_else(|| "<unknown>".to_string());
                    logger.error(&format!("Task for {} panicked: {}", unit_id, join_error));
                    summary.skipped.push(SkippedUnit {
                        unit_id,
                        reason: LlmError::TaskFailed(join_error.to_string()).to_string(),
                    });
                }
            }
        }

        if let Some(error) = fatal {
            logger.error(&format!(
                "Dispatch aborted: {} completed, {} not dispatched or abandoned",
                summary.completed.len(),
                not_dispatched
            ));
            return Err(error);
        }

        logger.info(&format!(
            "Dispatch finished: {} completed, {} skipped",
            summary.completed.len(),
            summary.skipped.len()
        ));
        Ok(summary)
    }
}
