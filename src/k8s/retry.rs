use super::error::K8sError;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Decides whether a failed api call is attempted again.
pub type RetryPredicate = fn(&K8sError) -> bool;

const DEFAULT_STEPS: u32 = 4;
const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(10);
const DEFAULT_FACTOR: f64 = 5.0;
const DEFAULT_CAP: Duration = Duration::from_secs(10);

/// Exponential backoff bounded by a number of steps. Each step is one call to the api-server,
/// so the total time spent sleeping is bounded as well.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    steps: u32,
    initial_delay: Duration,
    factor: f64,
    cap: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            steps: DEFAULT_STEPS,
            initial_delay: DEFAULT_INITIAL_DELAY,
            factor: DEFAULT_FACTOR,
            cap: DEFAULT_CAP,
        }
    }
}

impl Backoff {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_steps(mut self, steps: u32) -> Self {
        self.steps = steps;
        self
    }

    pub fn with_initial_delay(mut self, initial_delay: Duration) -> Self {
        self.initial_delay = initial_delay;
        self
    }

    pub fn with_factor(mut self, factor: f64) -> Self {
        self.factor = factor;
        self
    }

    /// Upper bound for a single sleep between attempts.
    pub fn with_cap(mut self, cap: Duration) -> Self {
        self.cap = cap;
        self
    }

    /// Maximum number of attempts. Zero steps still performs one attempt.
    pub fn steps(&self) -> u32 {
        self.steps.max(1)
    }

    /// Delay to wait after the given failed attempt (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let nanos = self.initial_delay.as_nanos() as f64 * self.factor.powi(exponent);
        if !nanos.is_finite() || nanos >= self.cap.as_nanos() as f64 {
            return self.cap;
        }
        Duration::from_nanos(nanos.max(0.0) as u64)
    }
}

/// Every error is retried. Retrying non-retryable errors (AlreadyExists, NotFound) only costs
/// the remaining steps, and callers handle AlreadyExists themselves.
pub fn retry_always(_: &K8sError) -> bool {
    true
}

/// Retries only throttling, server-side errors, conflicts and transport failures.
pub fn retry_transient(err: &K8sError) -> bool {
    match err {
        K8sError::Generic(kube::Error::Api(response)) => {
            response.code == 429 || response.code >= 500 || response.reason == "Conflict"
        }
        K8sError::Generic(kube::Error::HyperError(_)) => true,
        K8sError::Generic(kube::Error::Service(_)) => true,
        _ => false,
    }
}

/// Backoff plus the predicate selecting which errors are worth another attempt.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    backoff: Backoff,
    retryable: RetryPredicate,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff: Backoff::default(),
            retryable: retry_always,
        }
    }
}

impl RetryPolicy {
    pub fn new(backoff: Backoff, retryable: RetryPredicate) -> Self {
        Self { backoff, retryable }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_predicate(mut self, retryable: RetryPredicate) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    pub fn is_retryable(&self, err: &K8sError) -> bool {
        (self.retryable)(err)
    }
}

/// Runs `operation` until it succeeds, the error is not retryable or the backoff steps are
/// exhausted. The last error is returned unchanged.
pub async fn retry_on_error<T, F, Fut>(policy: &RetryPolicy, mut operation: F) -> Result<T, K8sError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, K8sError>>,
{
    let steps = policy.backoff.steps();
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(err) if attempt < steps && policy.is_retryable(&err) => {
                let delay = policy.backoff.delay(attempt);
                warn!(
                    attempt,
                    error = %err,
                    delay_ms = delay.as_millis() as u64,
                    "k8s request failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                debug!(attempt, "k8s request not retried");
                return Err(err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::k8s::error::tests::api_error;
    use assert_matches::assert_matches;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;
    use tracing_test::traced_test;

    #[test]
    fn default_backoff_delays() {
        let b = Backoff::default();
        assert_eq!(b.steps(), 4);
        assert_eq!(b.delay(1), Duration::from_millis(10));
        assert_eq!(b.delay(2), Duration::from_millis(50));
        assert_eq!(b.delay(3), Duration::from_millis(250));
    }

    #[test]
    fn backoff_delay_is_capped() {
        let b = Backoff::new()
            .with_initial_delay(Duration::from_secs(1))
            .with_factor(10.0)
            .with_cap(Duration::from_secs(5));
        assert_eq!(b.delay(1), Duration::from_secs(1));
        assert_eq!(b.delay(2), Duration::from_secs(5));
        assert_eq!(b.delay(200), Duration::from_secs(5));
    }

    #[test]
    fn zero_steps_still_attempts_once() {
        assert_eq!(Backoff::new().with_steps(0).steps(), 1);
    }

    #[test]
    fn transient_predicate() {
        assert!(retry_transient(&api_error(500, "InternalError")));
        assert!(retry_transient(&api_error(429, "TooManyRequests")));
        assert!(retry_transient(&api_error(409, "Conflict")));
        assert!(!retry_transient(&api_error(409, "AlreadyExists")));
        assert!(!retry_transient(&api_error(404, "NotFound")));
        assert!(!retry_transient(&api_error(422, "Invalid")));
        assert!(retry_always(&api_error(404, "NotFound")));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_success() {
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let result = retry_on_error(&RetryPolicy::default(), || {
            let call = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if call < 2 {
                    Err(api_error(500, "InternalError"))
                } else {
                    Ok(call)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 10ms + 50ms
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(60), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(70), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn returns_last_error_when_steps_are_exhausted() {
        let calls = AtomicU32::new(0);

        let result: Result<(), K8sError> = retry_on_error(&RetryPolicy::default(), || {
            let call = calls.fetch_add(1, Ordering::SeqCst);
            async move { Err(api_error(500 + call as u16, "InternalError")) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(result.unwrap_err().api_code(), Some(503));
    }

    #[tokio::test(start_paused = true)]
    async fn always_predicate_retries_already_exists() {
        let calls = AtomicU32::new(0);

        let result: Result<(), K8sError> = retry_on_error(&RetryPolicy::default(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(api_error(409, "AlreadyExists")) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert!(result.unwrap_err().is_already_exists());
    }

    #[tokio::test(start_paused = true)]
    async fn stricter_predicate_stops_at_first_permanent_error() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default().with_predicate(retry_transient);

        let result: Result<(), K8sError> = retry_on_error(&policy, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(api_error(404, "NotFound")) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_matches!(result, Err(K8sError::Generic(kube::Error::Api(_))));
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn scheduled_retries_are_logged() {
        let calls = AtomicU32::new(0);

        let _: Result<(), K8sError> = retry_on_error(&RetryPolicy::default(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(api_error(503, "ServiceUnavailable")) }
        })
        .await;

        assert!(logs_contain("k8s request failed, retrying"));
        assert!(logs_contain("k8s request not retried"));
    }
}
