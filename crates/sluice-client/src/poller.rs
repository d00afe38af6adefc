//! Adaptive status polling.
//!
//! Each [`AdaptivePoller::start`] call spawns an independent loop with its
//! own [`PollState`] and returns a [`PollerHandle`] that stops it. Ticks are
//! strictly sequential: the next status request is only issued after the
//! previous one finished and the chosen interval elapsed.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use sluice_core::SluiceError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::backoff::BackoffPolicy;
use crate::status::{PollPhase, Summary};

/// Source of raw status payloads
pub trait StatusSource: Send + Sync + 'static {
    /// Fetch one status payload.
    ///
    /// Implementations should abort the underlying request once `cancel`
    /// fires; the poller cancels it on timeout and on stop.
    fn fetch_status(
        &self,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<Value, SluiceError>> + Send;
}

/// Poller configuration
#[derive(Debug, Clone, PartialEq)]
pub struct PollerConfig {
    /// Cadence while the backend reports ready
    pub ready_interval: Duration,
    /// Cadence while warming, on fallback, or starting
    pub degraded_interval: Duration,
    /// Upper bound on a single status request
    pub request_timeout: Duration,
    /// Backoff after failed requests
    pub backoff: BackoffPolicy,
    /// Shortest interval ever scheduled, in any phase
    pub min_interval: Duration,
    /// Longest interval ever scheduled, in any phase
    pub max_interval: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            ready_interval: Duration::from_secs(30),
            degraded_interval: Duration::from_secs(5),
            request_timeout: Duration::from_secs(4),
            backoff: BackoffPolicy::default(),
            min_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(300),
        }
    }
}

impl PollerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ready_interval(mut self, interval: Duration) -> Self {
        self.ready_interval = interval;
        self
    }

    pub fn degraded_interval(mut self, interval: Duration) -> Self {
        self.degraded_interval = interval;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn backoff(mut self, policy: BackoffPolicy) -> Self {
        self.backoff = policy;
        self
    }

    pub fn min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    pub fn max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    /// Clamp an interval into `[min_interval, max_interval]`
    pub fn clamp(&self, interval: Duration) -> Duration {
        let floor = self.min_interval.min(self.max_interval);
        interval.clamp(floor, self.max_interval)
    }
}

/// Per-loop polling state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollState {
    interval: Duration,
    consecutive_failures: u32,
}

impl PollState {
    pub fn new(config: &PollerConfig) -> Self {
        Self {
            interval: config.clamp(config.degraded_interval),
            consecutive_failures: 0,
        }
    }

    /// Interval until the next tick
    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Record a successful tick and return the next interval
    pub fn record_success(&mut self, phase: PollPhase, config: &PollerConfig) -> Duration {
        self.consecutive_failures = 0;
        let interval = match phase {
            PollPhase::Ready => config.ready_interval,
            _ => config.degraded_interval,
        };
        self.interval = config.clamp(interval);
        self.interval
    }

    /// Record a failed tick and return the backed-off interval
    pub fn record_failure(&mut self, config: &PollerConfig) -> Duration {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.interval = config.clamp(config.backoff.interval_for(self.consecutive_failures));
        self.interval
    }
}

/// Polls a [`StatusSource`] and reports normalized summaries
#[derive(Debug)]
pub struct AdaptivePoller<S> {
    source: Arc<S>,
    config: PollerConfig,
}

impl<S: StatusSource> AdaptivePoller<S> {
    pub fn new(source: S) -> Self {
        Self::with_config(source, PollerConfig::default())
    }

    pub fn with_config(source: S, config: PollerConfig) -> Self {
        Self {
            source: Arc::new(source),
            config,
        }
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    /// Start a polling loop on the current tokio runtime.
    ///
    /// `on_update` receives a summary on every tick, success or failure.
    /// The first tick runs immediately.
    ///
    /// # Panics
    ///
    /// Panics if called from outside a tokio runtime, as `tokio::spawn` does.
    pub fn start<F>(&self, on_update: F) -> PollerHandle
    where
        F: FnMut(Summary) + Send + 'static,
    {
        let token = CancellationToken::new();
        let task = tokio::spawn(run(
            Arc::clone(&self.source),
            self.config.clone(),
            token.clone(),
            on_update,
        ));

        PollerHandle {
            token,
            task: Some(task),
        }
    }
}

async fn run<S, F>(source: Arc<S>, config: PollerConfig, token: CancellationToken, mut on_update: F)
where
    S: StatusSource,
    F: FnMut(Summary) + Send + 'static,
{
    let mut state = PollState::new(&config);

    loop {
        let result = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            result = fetch_with_timeout(source.as_ref(), &token, config.request_timeout) => result,
        };

        // A request that finished as stop() was called must not report
        if token.is_cancelled() {
            break;
        }

        let summary = match result {
            Ok(payload) => {
                let summary = Summary::from_payload(&payload);
                state.record_success(summary.phase, &config);
                tracing::debug!(
                    phase = summary.phase.as_str(),
                    provider = summary.provider.as_str(),
                    next_ms = state.interval().as_millis() as u64,
                    "Status poll succeeded"
                );
                summary
            }
            Err(e) => {
                state.record_failure(&config);
                tracing::warn!(
                    error = %e,
                    failures = state.consecutive_failures(),
                    next_ms = state.interval().as_millis() as u64,
                    "Status poll failed"
                );
                Summary::connecting()
            }
        };

        on_update(summary);

        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(state.interval()) => {}
        }
    }

    tracing::debug!("Status poller stopped");
}

async fn fetch_with_timeout<S: StatusSource>(
    source: &S,
    parent: &CancellationToken,
    timeout: Duration,
) -> Result<Value, SluiceError> {
    let request_token = parent.child_token();
    // Releases the request however this future ends
    let _guard = request_token.clone().drop_guard();

    match tokio::time::timeout(timeout, source.fetch_status(request_token)).await {
        Ok(result) => result,
        Err(_) => Err(SluiceError::Timeout(timeout)),
    }
}

/// Stops the polling loop it was returned for.
///
/// Dropping the handle stops the loop as well.
#[derive(Debug)]
pub struct PollerHandle {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl PollerHandle {
    /// Stop polling. Idempotent.
    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Stop polling and wait for the loop to exit
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Status poller task failed");
            }
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PollerConfig {
        PollerConfig::new()
            .ready_interval(Duration::from_secs(30))
            .degraded_interval(Duration::from_secs(5))
            .backoff(
                BackoffPolicy::new()
                    .baseline(Duration::from_secs(2))
                    .growth_factor(2.0)
                    .floor(Duration::from_secs(1))
                    .ceiling(Duration::from_secs(60)),
            )
    }

    #[test]
    fn test_failures_back_off_exponentially() {
        let config = config();
        let mut state = PollState::new(&config);

        for n in 1..=8u32 {
            let interval = state.record_failure(&config);
            let expected = Duration::from_secs((2u64 << n).min(60));
            assert_eq!(interval, expected, "after {n} failures");
            assert_eq!(state.consecutive_failures(), n);
        }
    }

    #[test]
    fn test_success_resets_failures() {
        let config = config();
        let mut state = PollState::new(&config);
        state.record_failure(&config);
        state.record_failure(&config);
        state.record_failure(&config);

        let interval = state.record_success(PollPhase::Ready, &config);
        assert_eq!(interval, Duration::from_secs(30));
        assert_eq!(state.consecutive_failures(), 0);

        state.record_failure(&config);
        assert_eq!(state.interval(), Duration::from_secs(4));
    }

    #[test]
    fn test_degraded_phases_use_moderate_cadence() {
        let config = config();
        let mut state = PollState::new(&config);
        for phase in [PollPhase::Warming, PollPhase::Fallback, PollPhase::Starting] {
            assert_eq!(state.record_success(phase, &config), Duration::from_secs(5));
        }
    }

    #[test]
    fn test_ready_cadence_not_capped_by_backoff_ceiling() {
        let config = config()
            .ready_interval(Duration::from_secs(120))
            .backoff(BackoffPolicy::new().ceiling(Duration::from_secs(5)));
        let mut state = PollState::new(&config);

        state.record_failure(&config);
        assert_eq!(state.record_success(PollPhase::Ready, &config), Duration::from_secs(120));
        for _ in 0..10 {
            state.record_failure(&config);
        }
        assert_eq!(state.interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_intervals_stay_in_band() {
        let config = config()
            .ready_interval(Duration::from_secs(600))
            .degraded_interval(Duration::from_millis(10))
            .min_interval(Duration::from_secs(1))
            .max_interval(Duration::from_secs(300));
        let mut state = PollState::new(&config);

        assert_eq!(state.interval(), Duration::from_secs(1));
        assert_eq!(state.record_success(PollPhase::Ready, &config), Duration::from_secs(300));
        assert_eq!(state.record_success(PollPhase::Warming, &config), Duration::from_secs(1));

        let config = config.max_interval(Duration::from_secs(10));
        for _ in 0..8 {
            state.record_failure(&config);
        }
        assert_eq!(state.interval(), Duration::from_secs(10));
    }
}
