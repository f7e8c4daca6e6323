//! Convergence - Wait for a remote resource to reach a target status
//!
//! Astra applies most changes asynchronously: a database is `PENDING` long after
//! the create call returns, a CDC stream needs its connector to come up, a PCU
//! association is `CREATING` for a while. Every lifecycle operation that has to
//! observe such a transition builds a [`ConvergenceTarget`] and hands it a
//! [`StatusProbe`].
//!
//! A run ends in exactly one of three ways: the probe reports a success status
//! ([`Converged`]), a terminal failure status or non-transient probe error
//! ([`ConvergeError::Terminal`] / [`ConvergeError::Probe`]), or the budget runs
//! out ([`ConvergeError::Timeout`]). Cancellation of the caller's token aborts
//! the wait between probes.

use std::fmt;
use std::time::Duration;

use log::{debug, warn};
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;

use crate::provider::BoxFuture;

/// Default wait between probes
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

/// Default overall budget for a single wait
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20 * 60);

/// Result of a single status check
#[derive(Debug, Clone, PartialEq)]
pub enum Probed<S, T> {
    /// The resource exists and reports `status`
    Found { status: S, payload: T },
    /// The backend answered 404 (or the batch listing has no matching entry)
    NotFound,
}

impl<S, T> Probed<S, T> {
    pub fn found(status: S, payload: T) -> Self {
        Probed::Found { status, payload }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeErrorKind {
    /// Network failure, 5xx or throttling; worth another attempt
    Transient,
    /// Any other 4xx or an undecodable body; retrying will not help
    Permanent,
}

/// Failure of a single status check
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct ProbeError {
    pub kind: ProbeErrorKind,
    pub message: String,
}

impl ProbeError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: ProbeErrorKind::Transient,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: ProbeErrorKind::Permanent,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind == ProbeErrorKind::Transient
    }
}

/// A read-only status check against a backend endpoint
pub trait StatusProbe: Send + Sync {
    type Status: PartialEq + fmt::Display + Send;
    type Payload: Send;

    /// Identifier of the probed resource, used in log lines and errors
    fn resource(&self) -> String;

    fn probe(&self) -> BoxFuture<'_, Result<Probed<Self::Status, Self::Payload>, ProbeError>>;
}

/// What a 404 from the probe means for this wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotFoundPolicy {
    /// The resource is gone, which is what a deletion wait is for
    Succeed,
    /// The resource vanished while we expected it to exist
    Fail,
    /// Keep polling; the backend may not list a fresh resource yet
    Retry,
}

/// How an observed status is treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Success,
    Failure,
    Pending,
}

/// Successful end of a convergence run
#[derive(Debug, Clone, PartialEq)]
pub enum Converged<S, T> {
    Reached { status: S, payload: T, attempts: u32 },
    Gone { attempts: u32 },
}

impl<S, T> Converged<S, T> {
    pub fn attempts(&self) -> u32 {
        match self {
            Converged::Reached { attempts, .. } | Converged::Gone { attempts } => *attempts,
        }
    }

    pub fn payload(&self) -> Option<&T> {
        match self {
            Converged::Reached { payload, .. } => Some(payload),
            Converged::Gone { .. } => None,
        }
    }

    pub fn into_payload(self) -> Option<T> {
        match self {
            Converged::Reached { payload, .. } => Some(payload),
            Converged::Gone { .. } => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConvergeError {
    #[error("{resource} entered terminal status {status} after {attempts} attempt(s)")]
    Terminal {
        resource: String,
        status: String,
        attempts: u32,
    },

    #[error("status check for {resource} failed: {source}")]
    Probe {
        resource: String,
        attempts: u32,
        #[source]
        source: ProbeError,
    },

    #[error("{resource} not found")]
    NotFound { resource: String, attempts: u32 },

    #[error(
        "timed out waiting for {resource} after {attempts} attempt(s) in {elapsed:?}; last observed: {last}"
    )]
    Timeout {
        resource: String,
        attempts: u32,
        elapsed: Duration,
        last: String,
    },

    #[error("wait for {resource} was cancelled")]
    Cancelled { resource: String },

    #[error("invalid convergence target: {0}")]
    InvalidTarget(String),
}

impl ConvergeError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ConvergeError::Timeout { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ConvergeError::NotFound { .. })
    }
}

/// Success/failure state sets plus the budget for one wait
#[derive(Debug, Clone)]
pub struct ConvergenceTarget<S> {
    success: Vec<S>,
    failure: Vec<S>,
    interval: Duration,
    timeout: Duration,
    max_attempts: Option<u32>,
    deadline: Option<Instant>,
    not_found: NotFoundPolicy,
}

impl<S: PartialEq + fmt::Display> ConvergenceTarget<S> {
    /// Build a target; the two state sets must not overlap.
    pub fn new(
        success: impl IntoIterator<Item = S>,
        failure: impl IntoIterator<Item = S>,
    ) -> Result<Self, ConvergeError> {
        let success: Vec<S> = success.into_iter().collect();
        let failure: Vec<S> = failure.into_iter().collect();

        if let Some(overlap) = success.iter().find(|s| failure.contains(s)) {
            return Err(ConvergeError::InvalidTarget(format!(
                "status {} is both a success and a failure state",
                overlap
            )));
        }

        Ok(Self {
            success,
            failure,
            interval: DEFAULT_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
            max_attempts: None,
            deadline: None,
            not_found: NotFoundPolicy::Fail,
        })
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts.max(1));
        self
    }

    /// Cap the wait at an operation-level deadline owned by the caller
    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn on_not_found(mut self, policy: NotFoundPolicy) -> Self {
        self.not_found = policy;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn classify(&self, status: &S) -> Classification {
        if self.success.contains(status) {
            Classification::Success
        } else if self.failure.contains(status) {
            Classification::Failure
        } else {
            Classification::Pending
        }
    }

    /// Poll `probe` until it converges, fails, or the budget runs out.
    pub async fn wait<P>(
        &self,
        probe: &P,
        cancel: Option<&CancellationToken>,
    ) -> Result<Converged<S, P::Payload>, ConvergeError>
    where
        P: StatusProbe<Status = S>,
    {
        let resource = probe.resource();
        let start = Instant::now();
        // A budget past the clock's range leaves only the caller's deadline
        let deadline = match (start.checked_add(self.timeout), self.deadline) {
            (Some(budget_end), Some(d)) => Some(budget_end.min(d)),
            (budget_end, d) => budget_end.or(d),
        };

        let mut attempts = 0u32;

        loop {
            if cancel.is_some_and(|t| t.is_cancelled()) {
                return Err(ConvergeError::Cancelled { resource });
            }

            attempts += 1;
            let last = match probe.probe().await {
                Ok(Probed::Found { status, payload }) => match self.classify(&status) {
                    Classification::Success => {
                        debug!("{} reached {} after {} attempt(s)", resource, status, attempts);
                        return Ok(Converged::Reached {
                            status,
                            payload,
                            attempts,
                        });
                    }
                    Classification::Failure => {
                        return Err(ConvergeError::Terminal {
                            resource,
                            status: status.to_string(),
                            attempts,
                        });
                    }
                    Classification::Pending => {
                        debug!("{} is {} (attempt {})", resource, status, attempts);
                        format!("status {}", status)
                    }
                },
                Ok(Probed::NotFound) => match self.not_found {
                    NotFoundPolicy::Succeed => {
                        debug!("{} is gone after {} attempt(s)", resource, attempts);
                        return Ok(Converged::Gone { attempts });
                    }
                    NotFoundPolicy::Fail => {
                        return Err(ConvergeError::NotFound { resource, attempts });
                    }
                    NotFoundPolicy::Retry => {
                        debug!("{} not found yet (attempt {})", resource, attempts);
                        "not found".to_string()
                    }
                },
                Err(e) if e.is_transient() => {
                    warn!(
                        "status check for {} failed (attempt {}), retrying: {}",
                        resource, attempts, e
                    );
                    format!("error: {}", e)
                }
                Err(e) => {
                    return Err(ConvergeError::Probe {
                        resource,
                        attempts,
                        source: e,
                    });
                }
            };

            let now = Instant::now();
            let out_of_time = deadline.is_some_and(|d| now >= d);
            if self.max_attempts.is_some_and(|max| attempts >= max) || out_of_time {
                return Err(ConvergeError::Timeout {
                    resource,
                    attempts,
                    elapsed: now - start,
                    last,
                });
            }

            let pause = match deadline {
                Some(d) => self.interval.min(d - now),
                None => self.interval,
            };
            match cancel {
                Some(token) => {
                    tokio::select! {
                        _ = sleep(pause) => {}
                        _ = token.cancelled() => {
                            return Err(ConvergeError::Cancelled { resource });
                        }
                    }
                }
                None => sleep(pause).await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    type Step = Result<Probed<&'static str, u32>, ProbeError>;

    struct ScriptedProbe {
        steps: Mutex<VecDeque<Step>>,
        calls: AtomicU32,
    }

    impl ScriptedProbe {
        fn new(steps: Vec<Step>) -> Self {
            Self {
                steps: Mutex::new(steps.into()),
                calls: AtomicU32::new(0),
            }
        }

        fn statuses(statuses: &[&'static str]) -> Self {
            Self::new(
                statuses
                    .iter()
                    .enumerate()
                    .map(|(i, s)| Ok(Probed::found(*s, i as u32)))
                    .collect(),
            )
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl StatusProbe for ScriptedProbe {
        type Status = &'static str;
        type Payload = u32;

        fn resource(&self) -> String {
            "database 3f1c".to_string()
        }

        fn probe(&self) -> BoxFuture<'_, Step> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self
                .steps
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(Probed::found("PENDING", 99)));
            Box::pin(async move { next })
        }
    }

    fn database_active() -> ConvergenceTarget<&'static str> {
        ConvergenceTarget::new(["ACTIVE"], ["ERROR", "TERMINATED", "TERMINATING"])
            .unwrap()
            .with_interval(Duration::from_secs(5))
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_third_attempt() {
        let probe = ScriptedProbe::statuses(&["PENDING", "PENDING", "ACTIVE"]);
        let target = database_active().with_max_attempts(3);

        let result = target.wait(&probe, None).await.unwrap();

        assert_eq!(
            result,
            Converged::Reached {
                status: "ACTIVE",
                payload: 2,
                attempts: 3
            }
        );
        assert_eq!(probe.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_status_fails_without_more_probes() {
        let probe = ScriptedProbe::statuses(&["PENDING", "ERROR", "ACTIVE"]);
        let target = database_active().with_max_attempts(10);

        let err = target.wait(&probe, None).await.unwrap_err();

        match err {
            ConvergeError::Terminal {
                status, attempts, ..
            } => {
                assert_eq!(status, "ERROR");
                assert_eq!(attempts, 2);
            }
            other => panic!("expected terminal error, got {other:?}"),
        }
        assert_eq!(probe.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_attempts_time_out() {
        let probe = ScriptedProbe::statuses(&["PENDING", "PENDING", "PENDING"]);
        let target = database_active().with_max_attempts(2);

        let err = target.wait(&probe, None).await.unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(probe.calls(), 2);
        assert!(err.to_string().contains("last observed: status PENDING"));
    }

    #[tokio::test(start_paused = true)]
    async fn deletion_wait_treats_not_found_as_success() {
        let probe = ScriptedProbe::new(vec![Ok(Probed::NotFound)]);
        let target = ConvergenceTarget::new(["TERMINATED"], ["ERROR"])
            .unwrap()
            .on_not_found(NotFoundPolicy::Succeed)
            .with_max_attempts(5);

        let result = target.wait(&probe, None).await.unwrap();

        assert_eq!(result, Converged::Gone { attempts: 1 });
        assert_eq!(probe.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn not_found_fails_read_waits() {
        let probe = ScriptedProbe::new(vec![Ok(Probed::NotFound)]);
        let err = database_active().wait(&probe, None).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test(start_paused = true)]
    async fn not_found_can_be_retried() {
        let probe = ScriptedProbe::new(vec![Ok(Probed::NotFound), Ok(Probed::found("ACTIVE", 1))]);
        let target = database_active().on_not_found(NotFoundPolicy::Retry);

        let result = target.wait(&probe, None).await.unwrap();
        assert_eq!(result.attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_consume_budget_then_succeed() {
        let probe = ScriptedProbe::new(vec![
            Err(ProbeError::transient("503 Service Unavailable")),
            Err(ProbeError::transient("connection reset")),
            Ok(Probed::found("ACTIVE", 7)),
        ]);
        let target = database_active().with_max_attempts(3);

        let result = target.wait(&probe, None).await.unwrap();

        assert_eq!(result.payload(), Some(&7));
        assert_eq!(result.attempts(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_exhausting_budget_report_last_error() {
        let probe = ScriptedProbe::new(vec![
            Err(ProbeError::transient("502 Bad Gateway")),
            Err(ProbeError::transient("503 Service Unavailable")),
        ]);
        let target = database_active().with_max_attempts(2);

        let err = target.wait(&probe, None).await.unwrap_err();

        assert!(err.is_timeout());
        assert!(err.to_string().contains("503 Service Unavailable"));
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_error_fails_immediately() {
        let probe = ScriptedProbe::new(vec![
            Err(ProbeError::permanent("401 Unauthorized")),
            Ok(Probed::found("ACTIVE", 1)),
        ]);

        let err = database_active().wait(&probe, None).await.unwrap_err();

        assert!(matches!(err, ConvergeError::Probe { attempts: 1, .. }));
        assert_eq!(probe.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn time_budget_bounds_the_wait() {
        let probe = ScriptedProbe::statuses(&[]);
        let target = database_active()
            .with_interval(Duration::from_secs(10))
            .with_timeout(Duration::from_secs(35));

        let start = Instant::now();
        let err = target.wait(&probe, None).await.unwrap_err();

        assert!(err.is_timeout());
        // probes at 0, 10, 20, 30 and a final one at the 35s deadline
        assert_eq!(probe.calls(), 5);
        assert_eq!(start.elapsed(), Duration::from_secs(35));
    }

    #[tokio::test(start_paused = true)]
    async fn caller_deadline_caps_the_budget() {
        let probe = ScriptedProbe::statuses(&[]);
        let target = database_active()
            .with_interval(Duration::from_secs(5))
            .with_deadline(Some(Instant::now() + Duration::from_secs(12)));

        let err = target.wait(&probe, None).await.unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(probe.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_aborts_between_probes() {
        let probe = ScriptedProbe::statuses(&[]);
        let target = database_active();
        let token = CancellationToken::new();

        let canceller = {
            let token = token.clone();
            tokio::spawn(async move {
                sleep(Duration::from_secs(7)).await;
                token.cancel();
            })
        };

        let err = target.wait(&probe, Some(&token)).await.unwrap_err();
        canceller.await.unwrap();

        assert!(matches!(err, ConvergeError::Cancelled { .. }));
        assert_eq!(probe.calls(), 2);
    }

    #[test]
    fn overlapping_state_sets_are_rejected() {
        let result = ConvergenceTarget::new(["ACTIVE", "ERROR"], ["ERROR"]);
        assert!(matches!(result, Err(ConvergeError::InvalidTarget(_))));
    }

    #[test]
    fn classify_statuses() {
        let target = database_active();
        assert_eq!(target.classify(&"ACTIVE"), Classification::Success);
        assert_eq!(target.classify(&"TERMINATING"), Classification::Failure);
        assert_eq!(target.classify(&"INITIALIZING"), Classification::Pending);
    }

    #[tokio::test(start_paused = true)]
    async fn unbounded_timeout_still_polls() {
        let probe = ScriptedProbe::statuses(&["PENDING", "PENDING", "ACTIVE"]);
        let target = database_active().with_timeout(Duration::MAX);

        let result = target.wait(&probe, None).await.unwrap();
        assert_eq!(result.attempts(), 3);

        let probe = ScriptedProbe::statuses(&[]);
        let err = database_active()
            .with_timeout(Duration::MAX)
            .with_max_attempts(2)
            .wait(&probe, None)
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test(start_paused = true)]
    async fn unbounded_timeout_keeps_caller_deadline() {
        let probe = ScriptedProbe::statuses(&[]);
        let target = database_active()
            .with_timeout(Duration::MAX)
            .with_deadline(Some(Instant::now() + Duration::from_secs(12)));

        let err = target.wait(&probe, None).await.unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(probe.calls(), 4);
    }
}
