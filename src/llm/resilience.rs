//! LLM resilience wrapper with circuit breaking and timeout retries.

use super::LlmProvider;
use crate::config::LlmConfig;
use crate::{Error, Result};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Resilience configuration for LLM calls.
#[derive(Debug, Clone)]
pub struct LlmResilienceConfig {
    /// Maximum number of retries for timed-out calls.
    pub max_retries: u32,
    /// Backoff between retries in milliseconds.
    pub retry_backoff_ms: u64,
    /// Consecutive failures before opening the circuit.
    pub breaker_failure_threshold: u32,
    /// How long to keep the circuit open before half-open.
    pub breaker_reset_timeout_ms: u64,
    /// Maximum trial calls while half-open.
    pub breaker_half_open_max_calls: u32,
}

impl Default for LlmResilienceConfig {
    fn default() -> Self {
        Self {
            max_retries: 1,
            retry_backoff_ms: 250,
            breaker_failure_threshold: 5,
            breaker_reset_timeout_ms: 30_000,
            breaker_half_open_max_calls: 1,
        }
    }
}

impl LlmResilienceConfig {
    /// Loads resilience configuration from config file settings.
    #[must_use]
    pub fn from_config(config: &LlmConfig) -> Self {
        let mut settings = Self::default();
        if let Some(max_retries) = config.max_retries {
            settings.max_retries = max_retries;
        }
        if let Some(retry_backoff_ms) = config.retry_backoff_ms {
            settings.retry_backoff_ms = retry_backoff_ms;
        }
        if let Some(threshold) = config.breaker_failure_threshold {
            settings.breaker_failure_threshold = threshold.max(1);
        }
        if let Some(reset_ms) = config.breaker_reset_ms {
            settings.breaker_reset_timeout_ms = reset_ms;
        }
        if let Some(half_open) = config.breaker_half_open_max_calls {
            settings.breaker_half_open_max_calls = half_open.max(1);
        }
        settings
    }
}

/// Circuit breaker state machine.
#[derive(Debug)]
enum BreakerState {
    Closed { failures: u32 },
    Open { opened_at: Instant },
    HalfOpen { attempts: u32 },
}

#[derive(Debug)]
struct CircuitBreaker {
    state: BreakerState,
    failure_threshold: u32,
    reset_timeout: Duration,
    half_open_max_calls: u32,
}

impl CircuitBreaker {
    fn new(config: &LlmResilienceConfig) -> Self {
        Self {
            state: BreakerState::Closed { failures: 0 },
            failure_threshold: config.breaker_failure_threshold.max(1),
            reset_timeout: Duration::from_millis(config.breaker_reset_timeout_ms),
            half_open_max_calls: config.breaker_half_open_max_calls.max(1),
        }
    }

    fn allow(&mut self) -> bool {
        match self.state {
            BreakerState::Closed { .. } => true,
            BreakerState::Open { opened_at } => {
                if opened_at.elapsed() >= self.reset_timeout {
                    self.state = BreakerState::HalfOpen { attempts: 1 };
                    true
                } else {
                    false
                }
            },
            BreakerState::HalfOpen { ref mut attempts } => {
                if *attempts >= self.half_open_max_calls {
                    false
                } else {
                    *attempts += 1;
                    true
                }
            },
        }
    }

    const fn on_success(&mut self) {
        self.state = BreakerState::Closed { failures: 0 };
    }

    /// Records a failure; returns true if the circuit just opened.
    fn on_failure(&mut self) -> bool {
        match self.state {
            BreakerState::Closed { ref mut failures } => {
                *failures += 1;
                if *failures >= self.failure_threshold {
                    self.state = BreakerState::Open {
                        opened_at: Instant::now(),
                    };
                    return true;
                }
            },
            BreakerState::HalfOpen { .. } => {
                self.state = BreakerState::Open {
                    opened_at: Instant::now(),
                };
                return true;
            },
            BreakerState::Open { .. } => {},
        }
        false
    }

    const fn state_value(&self) -> u8 {
        match self.state {
            BreakerState::Closed { .. } => 0,
            BreakerState::Open { .. } => 1,
            BreakerState::HalfOpen { .. } => 2,
        }
    }
}

/// LLM provider wrapper with a circuit breaker and timeout retries.
///
/// An open circuit fails calls immediately, which lets the resolver move
/// straight to its heuristic fallback instead of waiting on a dead model.
pub struct ResilientLlmProvider<P: LlmProvider> {
    inner: P,
    config: LlmResilienceConfig,
    breaker: Mutex<CircuitBreaker>,
}

impl<P: LlmProvider> ResilientLlmProvider<P> {
    /// Creates a new resilient LLM provider wrapper.
    #[must_use]
    pub fn new(inner: P, config: LlmResilienceConfig) -> Self {
        let breaker = CircuitBreaker::new(&config);
        Self {
            inner,
            config,
            breaker: Mutex::new(breaker),
        }
    }

    fn execute<F>(&self, operation: &'static str, mut call: F) -> Result<String>
    where
        F: FnMut() -> Result<String>,
    {
        let provider = self.inner.name();
        let span = tracing::debug_span!(
            "llm.request",
            provider = provider,
            operation = operation,
            status = tracing::field::Empty
        );
        let _enter = span.enter();

        if !self.lock_breaker().allow() {
            span.record("status", "circuit_open");
            record_request(provider, "circuit_open", Duration::ZERO);
            return Err(Error::OperationFailed {
                operation: format!("llm_{operation}"),
                cause: "circuit breaker open".to_string(),
            });
        }

        let max_attempts = self.config.max_retries + 1;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let started = Instant::now();
            let result = call();
            let elapsed = started.elapsed();

            let err = match result {
                Ok(value) => {
                    let mut breaker = self.lock_breaker();
                    breaker.on_success();
                    record_breaker_state(provider, breaker.state_value());
                    drop(breaker);
                    span.record("status", "success");
                    record_request(provider, "success", elapsed);
                    return Ok(value);
                },
                Err(err) => err,
            };

            let is_timeout = is_timeout_error(&err);
            let status = if is_timeout { "timeout" } else { "error" };
            span.record("status", status);
            record_request(provider, status, elapsed);

            let mut breaker = self.lock_breaker();
            let tripped = breaker.on_failure();
            record_breaker_state(provider, breaker.state_value());
            drop(breaker);
            if tripped {
                metrics::counter!("llm_circuit_breaker_trips_total", "provider" => provider)
                    .increment(1);
                tracing::warn!(provider, operation, "LLM circuit breaker opened");
            }

            if !is_timeout || tripped || attempt >= max_attempts {
                return Err(err);
            }

            tracing::warn!(
                provider,
                operation,
                attempt,
                elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                "Retrying timed-out LLM call"
            );
            if self.config.retry_backoff_ms > 0 {
                std::thread::sleep(Duration::from_millis(self.config.retry_backoff_ms));
            }
        }
    }

    fn lock_breaker(&self) -> std::sync::MutexGuard<'_, CircuitBreaker> {
        self.breaker
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl<P: LlmProvider> LlmProvider for ResilientLlmProvider<P> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn complete(&self, prompt: &str) -> Result<String> {
        self.execute("complete", || self.inner.complete(prompt))
    }

    fn complete_with_system(&self, system: &str, user: &str) -> Result<String> {
        self.execute("complete_with_system", || {
            self.inner.complete_with_system(system, user)
        })
    }
}

fn record_request(provider: &'static str, status: &'static str, elapsed: Duration) {
    metrics::counter!("llm_requests_total", "provider" => provider, "status" => status)
        .increment(1);
    metrics::histogram!("llm_request_duration_ms", "provider" => provider)
        .record(elapsed.as_secs_f64() * 1000.0);
}

fn record_breaker_state(provider: &'static str, state: u8) {
    metrics::gauge!("llm_circuit_breaker_state", "provider" => provider).set(f64::from(state));
}

fn is_timeout_error(err: &Error) -> bool {
    match err {
        Error::OperationFailed { cause, .. } => {
            let lower = cause.to_lowercase();
            lower.contains("timeout") || lower.contains("timed out")
        },
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyProvider {
        calls: AtomicU32,
        cause: &'static str,
        succeed_after: u32,
    }

    impl LlmProvider for FlakyProvider {
        fn name(&self) -> &'static str {
            "flaky"
        }

        fn complete(&self, _prompt: &str) -> Result<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n > self.succeed_after {
                Ok("ok".to_string())
            } else {
                Err(Error::OperationFailed {
                    operation: "flaky".to_string(),
                    cause: self.cause.to_string(),
                })
            }
        }
    }

    fn config(max_retries: u32, threshold: u32) -> LlmResilienceConfig {
        LlmResilienceConfig {
            max_retries,
            retry_backoff_ms: 0,
            breaker_failure_threshold: threshold,
            breaker_reset_timeout_ms: 60_000,
            breaker_half_open_max_calls: 1,
        }
    }

    #[test]
    fn test_retries_timeouts() {
        let provider = ResilientLlmProvider::new(
            FlakyProvider {
                calls: AtomicU32::new(0),
                cause: "timeout error: operation timed out",
                succeed_after: 1,
            },
            config(2, 10),
        );
        assert_eq!(provider.complete("x").expect("retried"), "ok");
        assert_eq!(provider.inner.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_does_not_retry_other_errors() {
        let provider = ResilientLlmProvider::new(
            FlakyProvider {
                calls: AtomicU32::new(0),
                cause: "API returned status: 500",
                succeed_after: 1,
            },
            config(2, 10),
        );
        assert!(provider.complete("x").is_err());
        assert_eq!(provider.inner.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_circuit_opens_after_threshold() {
        let provider = ResilientLlmProvider::new(
            FlakyProvider {
                calls: AtomicU32::new(0),
                cause: "connect error",
                succeed_after: u32::MAX,
            },
            config(0, 2),
        );
        assert!(provider.complete("x").is_err());
        assert!(provider.complete("x").is_err());
        let err = provider.complete("x").expect_err("circuit open");
        assert!(err.to_string().contains("circuit breaker open"));
        assert_eq!(provider.inner.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_half_open_after_reset() {
        let mut cfg = config(0, 1);
        cfg.breaker_reset_timeout_ms = 0;
        let provider = ResilientLlmProvider::new(
            FlakyProvider {
                calls: AtomicU32::new(0),
                cause: "connect error",
                succeed_after: 1,
            },
            cfg,
        );
        assert!(provider.complete("x").is_err());
        assert_eq!(provider.complete("x").expect("half-open trial"), "ok");
    }

    #[test]
    fn test_system_prompt_retried_through_breaker() {
        let provider = ResilientLlmProvider::new(
            FlakyProvider {
                calls: AtomicU32::new(0),
                cause: "request timed out",
                succeed_after: 1,
            },
            config(1, 10),
        );
        // The default method folds both parts into one `complete` call.
        assert_eq!(
            provider
                .complete_with_system("Extract ingredients.", "Water, Glycerin")
                .expect("retried"),
            "ok"
        );
        assert_eq!(provider.inner.calls.load(Ordering::SeqCst), 2);
    }
}
