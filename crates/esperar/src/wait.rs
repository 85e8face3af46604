//! Wait Mechanisms: the bounded poll loop.
//!
//! [`Poller`] evaluates a [`Condition`] against a fresh [`Snapshot`]
//! immediately, then after every `poll_interval` until the condition holds
//! or `timeout` elapses. Timing out is an ordinary [`WaitOutcome`], not an
//! error; callers choose whether it fails their scenario.
//!
//! ## Toyota Way Application
//!
//! - **Jidoka**: invariant violations abort the wait on the spot
//! - **Muda**: no up-front sleep, and sleeps never run past the deadline
//! - **Heijunka**: one attempt at a time, no overlapping snapshots

use crate::condition::{AlertPresent, Condition, ConditionError};
use crate::page::{PageQuery, Snapshot};
use crate::result::{EsperarError, EsperarResult, PageError};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

// =============================================================================
// CONSTANTS
// =============================================================================

/// Default timeout for wait operations (10 seconds)
pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 10_000;

/// Default polling interval (500ms)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

/// Default window for best-effort alert checks (250ms)
pub const DEFAULT_ALERT_WINDOW_MS: u64 = 250;

/// Longest pause between attempts of a best-effort probe
const PROBE_INTERVAL_CAP: Duration = Duration::from_millis(50);

/// Deadline used when `start + timeout` overflows the clock
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

// =============================================================================
// WAIT OPTIONS
// =============================================================================

/// Options for wait operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitOptions {
    /// Timeout in milliseconds
    pub timeout_ms: u64,
    /// Polling interval in milliseconds
    pub poll_interval_ms: u64,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_WAIT_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl WaitOptions {
    /// Create new wait options with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set timeout in milliseconds
    #[must_use]
    pub const fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Set polling interval in milliseconds
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval_ms: u64) -> Self {
        self.poll_interval_ms = poll_interval_ms;
        self
    }

    /// Get timeout as Duration
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Get poll interval as Duration
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Reject zero timeouts and zero intervals.
    ///
    /// An interval longer than the timeout is accepted; the wait then
    /// performs its immediate attempt plus one at the deadline.
    pub fn validate(&self) -> EsperarResult<()> {
        if self.timeout_ms == 0 {
            return Err(EsperarError::InvalidOptions {
                message: "timeout must be greater than zero".to_string(),
            });
        }
        if self.poll_interval_ms == 0 {
            return Err(EsperarError::InvalidOptions {
                message: "poll interval must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

// =============================================================================
// WAIT OUTCOME
// =============================================================================

/// Result of a wait operation
#[derive(Debug)]
pub enum WaitOutcome<T> {
    /// The condition held
    Satisfied {
        /// Value produced by the condition
        value: T,
        /// Attempts performed, including the successful one
        attempts: u32,
        /// Time spent waiting
        elapsed: Duration,
    },
    /// The deadline passed first
    TimedOut {
        /// Description of the condition
        condition: String,
        /// Attempts performed
        attempts: u32,
        /// Time spent waiting
        elapsed: Duration,
        /// Last not-yet reason reported by the condition
        last_observed: Option<String>,
    },
}

impl<T> WaitOutcome<T> {
    /// Whether the condition held
    #[must_use]
    pub const fn is_satisfied(&self) -> bool {
        matches!(self, Self::Satisfied { .. })
    }

    /// Attempts performed
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        match self {
            Self::Satisfied { attempts, .. } | Self::TimedOut { attempts, .. } => *attempts,
        }
    }

    /// Time spent waiting
    #[must_use]
    pub const fn elapsed(&self) -> Duration {
        match self {
            Self::Satisfied { elapsed, .. } | Self::TimedOut { elapsed, .. } => *elapsed,
        }
    }

    /// The satisfying value, if any
    pub fn value(self) -> Option<T> {
        match self {
            Self::Satisfied { value, .. } => Some(value),
            Self::TimedOut { .. } => None,
        }
    }

    /// Borrow the satisfying value, if any
    pub const fn value_ref(&self) -> Option<&T> {
        match self {
            Self::Satisfied { value, .. } => Some(value),
            Self::TimedOut { .. } => None,
        }
    }

    /// Transform the satisfying value
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> WaitOutcome<U> {
        match self {
            Self::Satisfied {
                value,
                attempts,
                elapsed,
            } => WaitOutcome::Satisfied {
                value: f(value),
                attempts,
                elapsed,
            },
            Self::TimedOut {
                condition,
                attempts,
                elapsed,
                last_observed,
            } => WaitOutcome::TimedOut {
                condition,
                attempts,
                elapsed,
                last_observed,
            },
        }
    }

    /// Treat a timeout as a failure
    pub fn into_result(self) -> EsperarResult<T> {
        match self {
            Self::Satisfied { value, .. } => Ok(value),
            Self::TimedOut {
                condition,
                attempts,
                elapsed,
                last_observed,
            } => Err(EsperarError::Timeout {
                condition,
                attempts,
                elapsed_ms: elapsed.as_millis() as u64,
                last_observed,
            }),
        }
    }
}

// =============================================================================
// POLLER
// =============================================================================

/// Bounded, cancellable poll loop.
///
/// A poller may carry a [`CancellationToken`]; every wait run through it,
/// including growth waits, artifact open/close and selection toggles,
/// ends with [`EsperarError::Cancelled`] once the token fires.
#[derive(Debug, Clone, Default)]
pub struct Poller {
    options: WaitOptions,
    cancel: Option<CancellationToken>,
}

impl Poller {
    /// Create a poller with the given options
    #[must_use]
    pub const fn new(options: WaitOptions) -> Self {
        Self {
            options,
            cancel: None,
        }
    }

    /// Create a poller from durations.
    ///
    /// Durations round up to whole milliseconds, so any non-zero interval
    /// stays valid; values beyond `u64::MAX` milliseconds saturate.
    #[must_use]
    pub fn from_durations(timeout: Duration, poll_interval: Duration) -> Self {
        Self::new(WaitOptions {
            timeout_ms: millis_ceil(timeout),
            poll_interval_ms: millis_ceil(poll_interval),
        })
    }

    /// Options in use
    #[must_use]
    pub const fn options(&self) -> &WaitOptions {
        &self.options
    }

    /// Copy of this poller with another timeout
    #[must_use]
    pub fn with_timeout(self, timeout_ms: u64) -> Self {
        Self {
            options: self.options.with_timeout(timeout_ms),
            ..self
        }
    }

    /// Abort every wait run through this poller once `token` is cancelled
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Token cancelling this poller's waits, if any
    #[must_use]
    pub const fn cancellation(&self) -> Option<&CancellationToken> {
        self.cancel.as_ref()
    }

    /// Wait until `condition` holds or the timeout elapses.
    ///
    /// Returns `Err` only for invalid options and invariant violations.
    pub async fn wait<C: Condition + ?Sized>(
        &self,
        page: &dyn PageQuery,
        condition: &C,
    ) -> EsperarResult<WaitOutcome<C::Output>> {
        self.run(page, condition, None, None).await
    }

    /// Like [`Poller::wait`], aborting with [`EsperarError::Cancelled`]
    /// as soon as `cancel` fires. Takes precedence over the poller's own
    /// token.
    pub async fn wait_cancellable<C: Condition + ?Sized>(
        &self,
        page: &dyn PageQuery,
        condition: &C,
        cancel: &CancellationToken,
    ) -> EsperarResult<WaitOutcome<C::Output>> {
        self.run(page, condition, Some(cancel), None).await
    }

    /// Evaluate `condition` exactly once, without sleeping.
    ///
    /// For state expected to be present synchronously; the evaluation is
    /// still bounded by the timeout.
    pub async fn check_once<C: Condition + ?Sized>(
        &self,
        page: &dyn PageQuery,
        condition: &C,
    ) -> EsperarResult<WaitOutcome<C::Output>> {
        self.run(page, condition, None, Some(1)).await
    }

    /// One-off wait with explicit options
    pub async fn wait_for<C: Condition + ?Sized>(
        options: WaitOptions,
        page: &dyn PageQuery,
        condition: &C,
    ) -> EsperarResult<WaitOutcome<C::Output>> {
        Self::new(options).wait(page, condition).await
    }

    /// Wait and treat a timeout as an error
    pub async fn until<C: Condition + ?Sized>(
        &self,
        page: &dyn PageQuery,
        condition: &C,
    ) -> EsperarResult<C::Output> {
        self.wait(page, condition).await?.into_result()
    }

    /// Best-effort [`crate::wait::probe`] that still honours this poller's token
    pub async fn probe<C: Condition + ?Sized>(
        &self,
        page: &dyn PageQuery,
        condition: &C,
        window: Duration,
    ) -> EsperarResult<Option<C::Output>> {
        let window = window.max(Duration::from_millis(1));
        let interval = window.min(PROBE_INTERVAL_CAP);
        let mut prober = Self::from_durations(window, interval);
        prober.cancel.clone_from(&self.cancel);
        Ok(prober.wait(page, condition).await?.value())
    }

    async fn run<C: Condition + ?Sized>(
        &self,
        page: &dyn PageQuery,
        condition: &C,
        cancel: Option<&CancellationToken>,
        max_attempts: Option<u32>,
    ) -> EsperarResult<WaitOutcome<C::Output>> {
        self.options.validate()?;
        let cancel = cancel.or(self.cancel.as_ref());
        let description = condition.description();
        let interval = self.options.poll_interval();
        let start = Instant::now();
        let deadline = start
            .checked_add(self.options.timeout())
            .unwrap_or_else(|| start + FAR_FUTURE);
        let mut attempts = 0u32;

        debug!(
            condition = %description,
            timeout_ms = self.options.timeout_ms,
            poll_interval_ms = self.options.poll_interval_ms,
            "wait started"
        );

        loop {
            attempts += 1;
            let snapshot = Snapshot::new(page, attempts);
            let evaluation = tokio::select! {
                biased;
                () = cancelled(cancel) => return Err(cancel_error(&description, attempts - 1)),
                result = tokio::time::timeout_at(deadline, condition.evaluate(&snapshot)) => result,
            };
            drop(snapshot);

            let observed = match evaluation {
                Ok(Ok(value)) => {
                    let elapsed = start.elapsed();
                    debug!(
                        condition = %description,
                        attempt = attempts,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "condition satisfied"
                    );
                    return Ok(WaitOutcome::Satisfied {
                        value,
                        attempts,
                        elapsed,
                    });
                }
                Ok(Err(ConditionError::Invariant(message))) => {
                    warn!(condition = %description, attempt = attempts, %message, "invariant violated");
                    return Err(EsperarError::InvariantViolation {
                        condition: description,
                        message,
                    });
                }
                Ok(Err(err)) => {
                    trace!(condition = %description, attempt = attempts, reason = %err, "not yet");
                    err.observation()
                }
                Err(_) => "evaluation still pending at deadline".to_string(),
            };

            let now = Instant::now();
            if now >= deadline || max_attempts.is_some_and(|max| attempts >= max) {
                let elapsed = start.elapsed();
                debug!(
                    condition = %description,
                    attempts,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "wait timed out"
                );
                return Ok(WaitOutcome::TimedOut {
                    condition: description,
                    attempts,
                    elapsed,
                    last_observed: Some(observed),
                });
            }

            let pause = interval.min(deadline - now);
            tokio::select! {
                biased;
                () = cancelled(cancel) => return Err(cancel_error(&description, attempts)),
                () = tokio::time::sleep(pause) => {}
            }
        }
    }
}

fn millis_ceil(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos().div_ceil(1_000_000)).unwrap_or(u64::MAX)
}

async fn cancelled(token: Option<&CancellationToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}

fn cancel_error(description: &str, attempts: u32) -> EsperarError {
    debug!(condition = %description, attempts, "wait cancelled");
    EsperarError::Cancelled {
        condition: description.to_string(),
        attempts,
    }
}

// =============================================================================
// CONVENIENCE FUNCTIONS
// =============================================================================

/// Wait for a condition, treating a timeout as an error
pub async fn wait_until<C: Condition + ?Sized>(
    page: &dyn PageQuery,
    condition: &C,
    timeout_ms: u64,
) -> EsperarResult<C::Output> {
    let poller = Poller::new(WaitOptions::new().with_timeout(timeout_ms));
    poller.until(page, condition).await
}

/// Best-effort check: the value if `condition` holds within `window`.
///
/// Absence is not an error; only invariant violations are reported.
pub async fn probe<C: Condition + ?Sized>(
    page: &dyn PageQuery,
    condition: &C,
    window: Duration,
) -> EsperarResult<Option<C::Output>> {
    Poller::default().probe(page, condition, window).await
}

/// Accept a native dialog if one opens within `window`.
///
/// Returns whether a dialog was accepted. A dialog that disappears before it
/// can be accepted counts as not present.
pub async fn accept_alert_if_present(
    page: &dyn PageQuery,
    window: Duration,
) -> EsperarResult<bool> {
    let Some(alert) = probe(page, &AlertPresent, window).await? else {
        trace!("no alert to accept");
        return Ok(false);
    };
    match alert.accept().await {
        Ok(()) => {
            debug!("alert accepted");
            Ok(true)
        }
        Err(PageError::Stale { .. }) => Ok(false),
        Err(err) => Err(err.into()),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::condition::{hidden_or_absent, present, BoxFuture, Evaluation, FnCondition};
    use crate::mock::{MockNode, MockPage};
    use crate::selector::Selector;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Condition that fails with `failure` until its `k`-th evaluation
    fn after_k(
        k: u32,
        failure: ConditionError,
    ) -> FnCondition<
        impl for<'s> Fn(&'s Snapshot<'s>) -> BoxFuture<'s, Evaluation<u32>> + Send + Sync,
        u32,
    > {
        let calls = AtomicU32::new(0);
        FnCondition::new(format!("true after {k}"), move |_snap| {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            let failure = failure.clone();
            Box::pin(async move { if n >= k { Ok(n) } else { Err(failure) } })
        })
    }

    fn never() -> FnCondition<
        impl for<'s> Fn(&'s Snapshot<'s>) -> BoxFuture<'s, Evaluation<()>> + Send + Sync,
        (),
    > {
        FnCondition::new("never", |_snap| {
            Box::pin(async { Err(ConditionError::not_yet("still false")) })
        })
    }

    mod wait_options_tests {
        use super::*;

        #[test]
        fn test_wait_options_default() {
            let opts = WaitOptions::default();
            assert_eq!(opts.timeout_ms, DEFAULT_WAIT_TIMEOUT_MS);
            assert_eq!(opts.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
        }

        #[test]
        fn test_wait_options_chained() {
            let opts = WaitOptions::new().with_timeout(2_000).with_poll_interval(100);
            assert_eq!(opts.timeout(), Duration::from_secs(2));
            assert_eq!(opts.poll_interval(), Duration::from_millis(100));
        }

        #[test]
        fn test_validate_rejects_zero() {
            assert!(WaitOptions::new().with_timeout(0).validate().is_err());
            assert!(WaitOptions::new().with_poll_interval(0).validate().is_err());
            assert!(WaitOptions::new()
                .with_timeout(100)
                .with_poll_interval(500)
                .validate()
                .is_ok());
        }

        #[test]
        fn test_deserialize_partial() {
            let opts: WaitOptions = serde_json::from_str(r#"{"timeout_ms": 3000}"#).unwrap();
            assert_eq!(opts.timeout_ms, 3000);
            assert_eq!(opts.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
        }
    }

    mod wait_outcome_tests {
        use super::*;

        #[test]
        fn test_satisfied_accessors() {
            let outcome = WaitOutcome::Satisfied {
                value: 15usize,
                attempts: 3,
                elapsed: Duration::from_millis(200),
            };
            assert!(outcome.is_satisfied());
            assert_eq!(outcome.attempts(), 3);
            assert_eq!(outcome.value_ref(), Some(&15));
            assert_eq!(outcome.map(|v| v * 2).value(), Some(30));
        }

        #[test]
        fn test_timed_out_into_result() {
            let outcome: WaitOutcome<()> = WaitOutcome::TimedOut {
                condition: "rows to grow".into(),
                attempts: 21,
                elapsed: Duration::from_secs(10),
                last_observed: Some("10 rows".into()),
            };
            match outcome.into_result() {
                Err(EsperarError::Timeout {
                    attempts,
                    elapsed_ms,
                    last_observed,
                    ..
                }) => {
                    assert_eq!(attempts, 21);
                    assert_eq!(elapsed_ms, 10_000);
                    assert_eq!(last_observed.as_deref(), Some("10 rows"));
                }
                other => panic!("expected timeout, got {other:?}"),
            }
        }
    }

    mod poller_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_immediate_success_does_not_sleep() {
            let page = MockPage::new();
            page.insert(".data-grid-container", MockNode::new());
            let outcome = Poller::default()
                .wait(&page, &present(".data-grid-container"))
                .await
                .unwrap();
            assert_eq!(outcome.attempts(), 1);
            assert_eq!(outcome.elapsed(), Duration::ZERO);
        }

        #[tokio::test(start_paused = true)]
        async fn test_attempts_match_k() {
            let page = MockPage::new();
            let poller = Poller::new(WaitOptions::new().with_timeout(1_000).with_poll_interval(100));
            for k in [1, 2, 5, 9] {
                let outcome = poller
                    .wait(&page, &after_k(k, ConditionError::not_yet("no")))
                    .await
                    .unwrap();
                assert!(outcome.is_satisfied());
                assert_eq!(outcome.attempts(), k);
                assert_eq!(outcome.value(), Some(k));
            }
        }

        #[tokio::test(start_paused = true)]
        async fn test_never_true_times_out_near_deadline() {
            let page = MockPage::new();
            let poller = Poller::new(WaitOptions::new().with_timeout(1_000).with_poll_interval(100));
            let outcome = poller.wait(&page, &never()).await.unwrap();
            let elapsed = outcome.elapsed();
            assert!(elapsed >= Duration::from_millis(1_000));
            assert!(elapsed <= Duration::from_millis(1_100));
            match outcome {
                WaitOutcome::TimedOut {
                    condition,
                    attempts,
                    last_observed,
                    ..
                } => {
                    assert_eq!(condition, "never");
                    assert!(attempts >= 10);
                    assert_eq!(last_observed.as_deref(), Some("still false"));
                }
                WaitOutcome::Satisfied { .. } => panic!("never() cannot succeed"),
            }
        }

        #[tokio::test(start_paused = true)]
        async fn test_interval_longer_than_timeout() {
            let page = MockPage::new();
            let poller = Poller::new(WaitOptions::new().with_timeout(100).with_poll_interval(5_000));
            let outcome = poller.wait(&page, &never()).await.unwrap();
            assert!(!outcome.is_satisfied());
            assert_eq!(outcome.attempts(), 2);
            assert!(outcome.elapsed() < Duration::from_millis(200));
        }

        #[tokio::test(start_paused = true)]
        async fn test_stale_evaluations_are_retried() {
            let page = MockPage::new();
            let poller = Poller::new(WaitOptions::new().with_timeout(1_000).with_poll_interval(50));
            let outcome = poller
                .wait(&page, &after_k(3, ConditionError::Stale("detached".into())))
                .await
                .unwrap();
            assert_eq!(outcome.attempts(), 3);
        }

        #[tokio::test(start_paused = true)]
        async fn test_invariant_violation_fails_fast() {
            let page = MockPage::new();
            let poller = Poller::new(WaitOptions::new().with_timeout(5_000).with_poll_interval(50));
            let err = poller
                .wait(&page, &after_k(10, ConditionError::invariant("open and absent")))
                .await
                .unwrap_err();
            match err {
                EsperarError::InvariantViolation { message, .. } => {
                    assert_eq!(message, "open and absent");
                }
                other => panic!("expected invariant violation, got {other:?}"),
            }
        }

        #[tokio::test(start_paused = true)]
        async fn test_pending_evaluation_bounded_by_deadline() {
            let page = MockPage::new();
            let stuck = FnCondition::new("stuck", |_snap| {
                Box::pin(std::future::pending::<Evaluation<()>>())
            });
            let poller = Poller::new(WaitOptions::new().with_timeout(300).with_poll_interval(50));
            let outcome = poller.wait(&page, &stuck).await.unwrap();
            assert!(!outcome.is_satisfied());
            assert_eq!(outcome.attempts(), 1);
            assert!(outcome.elapsed() >= Duration::from_millis(300));
        }

        #[tokio::test(start_paused = true)]
        async fn test_cancellation_stops_wait() {
            let page = MockPage::new();
            let token = CancellationToken::new();
            let trigger = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(250)).await;
                trigger.cancel();
            });
            let poller = Poller::new(WaitOptions::new().with_timeout(10_000).with_poll_interval(100));
            let start = Instant::now();
            let err = poller
                .wait_cancellable(&page, &never(), &token)
                .await
                .unwrap_err();
            assert!(matches!(err, EsperarError::Cancelled { attempts: 3, .. }));
            assert!(start.elapsed() < Duration::from_secs(1));
        }

        #[tokio::test(start_paused = true)]
        async fn test_already_cancelled_token() {
            let page = MockPage::new();
            let token = CancellationToken::new();
            token.cancel();
            let err = Poller::default()
                .wait_cancellable(&page, &never(), &token)
                .await
                .unwrap_err();
            assert!(matches!(err, EsperarError::Cancelled { attempts: 0, .. }));
        }

        #[tokio::test(start_paused = true)]
        async fn test_check_once_never_sleeps() {
            let page = MockPage::new();
            let outcome = Poller::default().check_once(&page, &never()).await.unwrap();
            assert_eq!(outcome.attempts(), 1);
            assert_eq!(outcome.elapsed(), Duration::ZERO);
        }

        #[tokio::test(start_paused = true)]
        async fn test_observes_page_mutation() {
            let page = MockPage::new();
            page.insert(".modal-content", MockNode::new());
            page.schedule(Duration::from_millis(300), |dom| dom.remove(".modal-content"));
            let poller = Poller::new(WaitOptions::new().with_timeout(1_000).with_poll_interval(100));
            let outcome = poller
                .wait(&page, &hidden_or_absent(".modal-content"))
                .await
                .unwrap();
            assert!(outcome.is_satisfied());
            assert_eq!(outcome.attempts(), 4);
        }

        #[tokio::test(start_paused = true)]
        async fn test_poller_token_cancels_plain_wait() {
            let page = MockPage::new();
            let token = CancellationToken::new();
            let poller = Poller::new(WaitOptions::new().with_timeout(10_000).with_poll_interval(100))
                .with_cancellation(token.clone());
            assert!(poller.cancellation().is_some());
            let trigger = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(150)).await;
                trigger.cancel();
            });
            let err = poller.wait(&page, &never()).await.unwrap_err();
            assert!(matches!(err, EsperarError::Cancelled { attempts: 2, .. }));
        }

        #[tokio::test(start_paused = true)]
        async fn test_with_timeout_keeps_token() {
            let token = CancellationToken::new();
            token.cancel();
            let poller = Poller::default().with_cancellation(token).with_timeout(1_000);
            assert_eq!(poller.options().timeout_ms, 1_000);
            let err = poller.wait(&MockPage::new(), &never()).await.unwrap_err();
            assert!(matches!(err, EsperarError::Cancelled { attempts: 0, .. }));
        }

        #[tokio::test]
        async fn test_invalid_options_rejected() {
            let page = MockPage::new();
            let poller = Poller::new(WaitOptions::new().with_timeout(0));
            let err = poller.wait(&page, &never()).await.unwrap_err();
            assert!(matches!(err, EsperarError::InvalidOptions { .. }));
        }
    }

    mod duration_tests {
        use super::*;

        #[test]
        fn test_sub_millisecond_durations_round_up() {
            let poller = Poller::from_durations(Duration::from_secs(1), Duration::from_micros(500));
            assert_eq!(poller.options().poll_interval_ms, 1);
            assert_eq!(poller.options().timeout_ms, 1_000);
            let poller = Poller::from_durations(Duration::from_nanos(1_000_001), Duration::from_millis(2));
            assert_eq!(poller.options().timeout_ms, 2);
            assert_eq!(poller.options().poll_interval_ms, 2);
        }

        #[test]
        fn test_huge_durations_saturate() {
            let poller = Poller::from_durations(Duration::MAX, Duration::from_millis(10));
            assert_eq!(poller.options().timeout_ms, u64::MAX);
        }

        #[tokio::test(start_paused = true)]
        async fn test_sub_millisecond_interval_waits() {
            let page = MockPage::new();
            page.schedule(Duration::from_millis(3), |dom| {
                dom.insert(".x", MockNode::new());
            });
            let outcome = Poller::from_durations(Duration::from_secs(1), Duration::from_micros(500))
                .wait(&page, &present(".x"))
                .await
                .unwrap();
            assert!(outcome.is_satisfied());
            assert_eq!(outcome.attempts(), 4);
        }

        #[tokio::test(start_paused = true)]
        async fn test_saturated_timeout_still_polls() {
            let page = MockPage::new();
            page.insert(".x", MockNode::new());
            let outcome = Poller::from_durations(Duration::MAX, Duration::from_millis(10))
                .wait(&page, &present(".x"))
                .await
                .unwrap();
            assert_eq!(outcome.attempts(), 1);
        }
    }

    mod convenience_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_wait_until_timeout_is_error() {
            let page = MockPage::new();
            let err = wait_until(&page, &present(".missing"), 200).await.unwrap_err();
            assert!(err.is_timeout());
            assert!(err.to_string().contains("no element matches .missing"));
        }

        #[tokio::test(start_paused = true)]
        async fn test_probe_absent_is_none() {
            let page = MockPage::new();
            let found = probe(&page, &present(Selector::class("loading-indicator")), Duration::from_millis(100))
                .await
                .unwrap();
            assert!(found.is_none());
        }

        #[tokio::test(start_paused = true)]
        async fn test_accept_alert_if_present() {
            let page = MockPage::new();
            assert!(!accept_alert_if_present(&page, Duration::from_millis(100))
                .await
                .unwrap());

            page.open_alert("Action A");
            assert!(accept_alert_if_present(&page, Duration::from_millis(100))
                .await
                .unwrap());
            assert!(!page.alert_open());
            assert!(page.was_called("alert:accept"));
        }

        #[tokio::test(start_paused = true)]
        async fn test_accept_alert_opening_late() {
            let page = MockPage::new();
            page.schedule(Duration::from_millis(60), |dom| dom.open_alert("late"));
            assert!(accept_alert_if_present(&page, Duration::from_millis(250))
                .await
                .unwrap());
        }
    }
}
