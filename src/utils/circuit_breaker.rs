use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use super::retry::IsTransient;

// ============================================================================
// Circuit Breaker (payment provider calls)
// ============================================================================
//
// Stops calling a dependency that keeps failing, then lets a few trial calls
// through once the timeout has passed.
//
// States:
// - Closed: Normal operation, requests pass through
// - Open: Too many failures, requests blocked immediately
// - HalfOpen: Testing if service recovered, limited requests allowed
//
// Only transient failures count. A request the dependency answered with a
// permanent rejection proves it is up.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,     // Normal operation
    Open,       // Blocking requests
    HalfOpen,   // Testing recovery
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

type StateListener = Arc<dyn Fn(CircuitState) + Send + Sync>;

#[derive(Clone)]
pub struct CircuitBreaker {
    name: &'static str,
    state: Arc<Mutex<CircuitBreakerState>>,
    config: CircuitBreakerConfig,
    listener: Option<StateListener>,
}

#[derive(Clone, Debug)]
pub struct CircuitBreakerConfig {
    /// Number of failures before opening circuit
    pub failure_threshold: u32,
    /// Time to wait before attempting recovery
    pub timeout: Duration,
    /// Number of successes needed to close circuit from half-open
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}

struct CircuitBreakerState {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure_time: Option<Instant>,
}

impl CircuitBreaker {
    pub fn new(name: &'static str, config: CircuitBreakerConfig) -> Self {
        Self {
            name,
            state: Arc::new(Mutex::new(CircuitBreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                last_failure_time: None,
            })),
            config,
            listener: None,
        }
    }

    /// Called with the new state on every transition
    pub fn on_state_change(mut self, listener: impl Fn(CircuitState) + Send + Sync + 'static) -> Self {
        self.listener = Some(Arc::new(listener));
        self
    }

    /// Execute an operation with circuit breaker protection
    pub async fn call<F, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: std::future::Future<Output = Result<T, E>>,
        E: IsTransient,
    {
        {
            let mut state = self.state.lock().await;

            if state.state == CircuitState::Open {
                let elapsed = state
                    .last_failure_time
                    .map_or(true, |last| last.elapsed() >= self.config.timeout);
                if !elapsed {
                    return Err(CircuitBreakerError::CircuitOpen);
                }
                tracing::info!(breaker = self.name, "Circuit breaker transitioning to HalfOpen");
                state.success_count = 0;
                self.transition(&mut state, CircuitState::HalfOpen);
            }
        }

        match operation.await {
            Ok(result) => {
                self.record_success().await;
                Ok(result)
            }
            Err(err) if err.is_transient() => {
                self.record_failure().await;
                Err(CircuitBreakerError::OperationFailed(err))
            }
            Err(err) => {
                self.record_success().await;
                Err(CircuitBreakerError::OperationFailed(err))
            }
        }
    }

    fn transition(&self, state: &mut CircuitBreakerState, to: CircuitState) {
        state.state = to;
        if let Some(listener) = &self.listener {
            listener(to);
        }
    }

    async fn record_success(&self) {
        let mut state = self.state.lock().await;

        match state.state {
            CircuitState::HalfOpen => {
                state.success_count += 1;
                if state.success_count >= self.config.success_threshold {
                    tracing::info!(
                        breaker = self.name,
                        "Circuit breaker closing after {} successes",
                        state.success_count
                    );
                    state.failure_count = 0;
                    state.success_count = 0;
                    state.last_failure_time = None;
                    self.transition(&mut state, CircuitState::Closed);
                }
            }
            CircuitState::Closed => {
                state.failure_count = 0;
            }
            CircuitState::Open => {
                // A call admitted before the circuit opened finished late
            }
        }
    }

    async fn record_failure(&self) {
        let mut state = self.state.lock().await;

        state.failure_count += 1;
        state.last_failure_time = Some(Instant::now());

        match state.state {
            CircuitState::Closed => {
                if state.failure_count >= self.config.failure_threshold {
                    tracing::warn!(
                        breaker = self.name,
                        "Circuit breaker opening after {} failures",
                        state.failure_count
                    );
                    self.transition(&mut state, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => {
                tracing::warn!(breaker = self.name, "Failure during half-open, reopening circuit");
                state.success_count = 0;
                self.transition(&mut state, CircuitState::Open);
            }
            CircuitState::Open => {}
        }
    }

    pub async fn get_state(&self) -> CircuitState {
        self.state.lock().await.state
    }
}

#[derive(Debug)]
pub enum CircuitBreakerError<E> {
    CircuitOpen,
    OperationFailed(E),
}

impl<E: std::fmt::Display> std::fmt::Display for CircuitBreakerError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitBreakerError::CircuitOpen => write!(f, "Circuit breaker is open"),
            CircuitBreakerError::OperationFailed(e) => write!(f, "Operation failed: {}", e),
        }
    }
}

impl<E: std::fmt::Debug + std::fmt::Display> std::error::Error for CircuitBreakerError<E> {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct Flaky(bool);

    impl IsTransient for Flaky {
        fn is_transient(&self) -> bool {
            self.0
        }
    }

    fn config(failure_threshold: u32, timeout: Duration, success_threshold: u32) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold,
            timeout,
            success_threshold,
        }
    }

    #[tokio::test]
    async fn test_circuit_breaker_opens_after_failures() {
        let cb = CircuitBreaker::new("test", config(3, Duration::from_secs(1), 2));

        for _ in 0..3 {
            let result = cb.call(async { Err::<(), _>(Flaky(true)) }).await;
            assert!(result.is_err());
        }

        assert_eq!(cb.get_state().await, CircuitState::Open);

        // Next call should fail immediately
        let result = cb.call(async { Ok::<_, Flaky>(()) }).await;
        assert!(matches!(result, Err(CircuitBreakerError::CircuitOpen)));
    }

    #[tokio::test]
    async fn test_permanent_errors_do_not_open_circuit() {
        let cb = CircuitBreaker::new("test", config(2, Duration::from_secs(1), 1));

        for _ in 0..5 {
            let _ = cb.call(async { Err::<(), _>(Flaky(false)) }).await;
        }

        assert_eq!(cb.get_state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_circuit_breaker_half_open_after_timeout() {
        let transitions = Arc::new(AtomicU32::new(0));
        let seen = transitions.clone();
        let cb = CircuitBreaker::new("test", config(2, Duration::from_millis(100), 1))
            .on_state_change(move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            });

        for _ in 0..2 {
            let _ = cb.call(async { Err::<(), _>(Flaky(true)) }).await;
        }
        assert_eq!(cb.get_state().await, CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(150)).await;

        let result = cb.call(async { Ok::<_, Flaky>(()) }).await;
        assert!(result.is_ok());
        assert_eq!(cb.get_state().await, CircuitState::Closed);

        // Closed -> Open -> HalfOpen -> Closed
        assert_eq!(transitions.load(Ordering::SeqCst), 3);
    }
}
