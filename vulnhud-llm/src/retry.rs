//! Retrying wrapper around an [`AnalysisService`]
//!
//! Rate-limited calls are retried on a fixed exponential schedule
//! (`base * 2^(k-1)` before retry `k`) until the attempt cap is reached. The
//! rate-limit error of the last allowed attempt is escalated to a fatal one. Fatal errors are never
//! retried.

use crate::service::{AnalysisService, ServiceError};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Fixed exponential backoff schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total service calls allowed for one logical call, first attempt included
    pub max_attempts: u32,
    /// Delay before the first retry; doubles for each following retry
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry `retry` (1-based): `base * 2^(retry-1)`
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        self.base_delay.saturating_mul(1u32 << exponent)
    }

    /// Full delay sequence for a call that is rate-limited on every attempt
    pub fn schedule(&self) -> Vec<Duration> {
        (1..self.max_attempts()).map(|retry| self.delay_for_retry(retry)).collect()
    }

    /// Attempt cap; a zero cap still makes one call
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Outcome of a single attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Succeeded,
    RateLimited(String),
    Failed(String),
}

/// One observed attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptRecord {
    /// What the call was for (unit id or the global context)
    pub label: String,
    /// 1-based attempt number
    pub attempt: u32,
    pub outcome: AttemptOutcome,
    /// Backoff slept before the next attempt, if one follows
    pub next_delay: Option<Duration>,
}

/// Receives every attempt made by a [`RetryingClient`]
pub trait RetryObserver: Send + Sync {
    fn on_attempt(&self, record: &AttemptRecord);
}

/// [`AnalysisService`] wrapper applying the [`RetryPolicy`]
#[derive(Clone)]
pub struct RetryingClient {
    service: Arc<dyn AnalysisService>,
    policy: RetryPolicy,
    observers: Vec<Arc<dyn RetryObserver>>,
}

impl std::fmt::Debug for RetryingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryingClient")
            .field("policy", &self.policy)
            .field("observers", &self.observers.len())
            .finish_non_exhaustive()
    }
}

impl RetryingClient {
    pub fn new(service: Arc<dyn AnalysisService>, policy: RetryPolicy) -> Self {
        Self {
            service,
            policy,
            observers: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn RetryObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    fn notify(&self, record: &AttemptRecord) {
        for observer in &self.observers {
            observer.on_attempt(record);
        }
    }

    /// Call the service, retrying rate-limited attempts
    pub async fn call(&self, label: &str, payload: &str) -> Result<String, ServiceError> {
        let max_attempts = self.policy.max_attempts();
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!(unit = label, attempt, "Sending request to analysis service");

            match self.service.generate(payload).await {
                Ok(text) => {
                    self.notify(&AttemptRecord {
                        label: label.to_string(),
                        attempt,
                        outcome: AttemptOutcome::Succeeded,
                        next_delay: None,
                    });
                    return Ok(text);
                }
                Err(ServiceError::Transient(message)) => {
                    if attempt >= max_attempts {
                        self.notify(&AttemptRecord {
                            label: label.to_string(),
                            attempt,
                            outcome: AttemptOutcome::RateLimited(message.clone()),
                            next_delay: None,
                        });
                        error!(unit = label, attempt, "Rate limit persisted, giving up: {}", message);
                        return Err(ServiceError::Fatal(format!(
                            "rate limit persisted after {} attempts: {}",
                            attempt, message
                        )));
                    }

                    let delay = self.policy.delay_for_retry(attempt);
                    self.notify(&AttemptRecord {
                        label: label.to_string(),
                        attempt,
                        outcome: AttemptOutcome::RateLimited(message.clone()),
                        next_delay: Some(delay),
                    });
                    warn!(
                        unit = label,
                        attempt,
                        max_attempts,
                        delay_secs = delay.as_secs_f64(),
                        "Rate limit error: {}; retrying",
                        message
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(ServiceError::Fatal(message)) => {
                    self.notify(&AttemptRecord {
                        label: label.to_string(),
                        attempt,
                        outcome: AttemptOutcome::Failed(message.clone()),
                        next_delay: None,
                    });
                    error!(unit = label, attempt, "Analysis service error: {}", message);
                    return Err(ServiceError::Fatal(message));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// Replays scripted results, then succeeds with "done"
    struct Scripted {
        script: Mutex<VecDeque<Result<String, ServiceError>>>,
        calls: Mutex<u32>,
    }

    impl Scripted {
        fn new(script: Vec<Result<String, ServiceError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(0),
            })
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl AnalysisService for Scripted {
        async fn generate(&self, _payload: &str) -> Result<String, ServiceError> {
            *self.calls.lock().unwrap() += 1;
            self.script.lock().unwrap().pop_front().unwrap_or_else(|| Ok("done".to_string()))
        }
    }

    #[derive(Default)]
    struct Recorder {
        records: Mutex<Vec<AttemptRecord>>,
    }

    impl RetryObserver for Recorder {
        fn on_attempt(&self, record: &AttemptRecord) {
            self.records.lock().unwrap().push(record.clone());
        }
    }

    fn rate_limited() -> Result<String, ServiceError> {
        Err(ServiceError::Transient("429".to_string()))
    }

    #[test]
    fn test_default_schedule() {
        let policy = RetryPolicy::default();
        let secs: Vec<u64> = policy.schedule().iter().map(Duration::as_secs).collect();

        assert_eq!(secs, vec![2, 4, 8, 16]);
        assert_eq!(policy.max_attempts(), 5);
    }

    #[test]
    fn test_delay_does_not_overflow() {
        let policy = RetryPolicy { max_attempts: 100, base_delay: Duration::from_secs(2) };
        assert!(policy.delay_for_retry(100) >= policy.delay_for_retry(40));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_twice_then_success() {
        let service = Scripted::new(vec![rate_limited(), rate_limited(), Ok("ok".to_string())]);
        let recorder = Arc::new(Recorder::default());
        let client = RetryingClient::new(service.clone(), RetryPolicy::default())
            .with_observer(recorder.clone());

        let started = Instant::now();
        let text = client.call("C", "payload").await.unwrap();

        assert_eq!(text, "ok");
        assert_eq!(service.calls(), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(6));

        let delays: Vec<_> = recorder.records.lock().unwrap()
            .iter()
            .filter_map(|r| r.next_delay)
            .collect();
        assert_eq!(delays, vec![Duration::from_secs(2), Duration::from_secs(4)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_become_fatal() {
        let service = Scripted::new((0..10).map(|_| rate_limited()).collect());
        let client = RetryingClient::new(service.clone(), RetryPolicy::default());

        let started = Instant::now();
        let error = client.call("C", "payload").await.unwrap_err();

        assert!(!error.is_transient());
        assert_eq!(service.calls(), 5);
        assert_eq!(started.elapsed(), Duration::from_secs(2 + 4 + 8 + 16));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_on_last_allowed_attempt_still_fails() {
        // succeeds on the 6th call, one past the default cap
        let mut script: Vec<_> = (0..5).map(|_| rate_limited()).collect();
        script.push(Ok("late".to_string()));
        let service = Scripted::new(script);
        let recorder = Arc::new(Recorder::default());
        let client = RetryingClient::new(service.clone(), RetryPolicy::default())
            .with_observer(recorder.clone());

        let error = client.call("C", "payload").await.unwrap_err();

        assert!(error.to_string().contains("after 5 attempts"));
        assert_eq!(service.calls(), 5);
        let records = recorder.records.lock().unwrap();
        assert_eq!(records.last().map(|r| r.attempt), Some(5));
        assert_eq!(records.last().and_then(|r| r.next_delay), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_attempt_cap() {
        let service = Scripted::new(vec![rate_limited()]);
        let policy = RetryPolicy { max_attempts: 1, base_delay: Duration::from_secs(2) };
        let client = RetryingClient::new(service.clone(), policy);

        let started = Instant::now();
        assert!(client.call("C", "payload").await.is_err());
        assert_eq!(service.calls(), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_is_not_retried() {
        let service = Scripted::new(vec![Err(ServiceError::Fatal("bad request".to_string()))]);
        let recorder = Arc::new(Recorder::default());
        let client = RetryingClient::new(service.clone(), RetryPolicy::default())
            .with_observer(recorder.clone());

        let started = Instant::now();
        let error = client.call("D", "payload").await.unwrap_err();

        assert_eq!(error, ServiceError::Fatal("bad request".to_string()));
        assert_eq!(service.calls(), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert_eq!(recorder.records.lock().unwrap().len(), 1);
    }
}
