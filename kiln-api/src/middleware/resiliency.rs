use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CircuitState {
    Closed,
    /// Failing fast until the reset timeout elapses
    Open,
    /// Letting traffic through to probe the gateway
    HalfOpen,
}

/// Response extension marking a failure to reach the payment gateway.
/// Only these responses count against the breaker.
#[derive(Debug, Clone, Copy)]
pub struct GatewayOutage;

pub struct CircuitBreaker {
    pub name: String,
    state: RwLock<CircuitState>,
    failure_count: AtomicU32,
    failure_threshold: u32,
    reset_timeout: Duration,
    last_failure: RwLock<Option<Instant>>,
    /// Half-open admits a single request at a time
    probe_in_flight: AtomicBool,
}

impl CircuitBreaker {
    pub fn new(name: &str, threshold: u32, timeout: Duration) -> Self {
        Self {
            name: name.to_string(),
            state: RwLock::new(CircuitState::Closed),
            failure_count: AtomicU32::new(0),
            failure_threshold: threshold.max(1),
            reset_timeout: timeout,
            last_failure: RwLock::new(None),
            probe_in_flight: AtomicBool::new(false),
        }
    }

    pub async fn state(&self) -> CircuitState {
        *self.state.read().await
    }

    /// Whether a request may go through
    pub async fn check(&self) -> bool {
        let mut state = self.state.write().await;
        match *state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => self.claim_probe(),
            CircuitState::Open => {
                let elapsed = (*self.last_failure.read().await).map(|instant| instant.elapsed());
                match elapsed {
                    Some(elapsed) if elapsed >= self.reset_timeout => {
                        *state = CircuitState::HalfOpen;
                        tracing::info!("Circuit Breaker [{}] moving to Half-Open", self.name);
                        self.claim_probe()
                    }
                    _ => false,
                }
            }
        }
    }

    fn claim_probe(&self) -> bool {
        self.probe_in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub async fn record_success(&self) {
        let mut state = self.state.write().await;
        if *state == CircuitState::HalfOpen {
            *state = CircuitState::Closed;
            tracing::info!("Circuit Breaker [{}] recovered to Closed", self.name);
        }
        self.failure_count.store(0, Ordering::SeqCst);
        self.probe_in_flight.store(false, Ordering::SeqCst);
    }

    pub async fn record_failure(&self) {
        let count = self.failure_count.fetch_add(1, Ordering::SeqCst) + 1;
        let mut state = self.state.write().await;

        if count >= self.failure_threshold || *state == CircuitState::HalfOpen {
            *state = CircuitState::Open;
            *self.last_failure.write().await = Some(Instant::now());
            tracing::error!("Circuit Breaker [{}] TRIPPED to Open. Failures: {}", self.name, count);
        }
        self.probe_in_flight.store(false, Ordering::SeqCst);
    }
}

/// Guards routes that call the payment gateway. Responses carrying
/// [`GatewayOutage`] count as failures.
pub async fn gateway_circuit_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let cb = &state.resiliency.gateway_cb;

    if !cb.check().await {
        return AppError::ServiceUnavailable(format!(
            "Circuit Breaker [{}] is OPEN, try again later",
            cb.name
        ))
        .into_response();
    }

    let response = next.run(req).await;

    if response.extensions().get::<GatewayOutage>().is_some() {
        cb.record_failure().await;
    } else {
        cb.record_success().await;
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_trips_after_threshold() {
        let cb = CircuitBreaker::new("gateway", 2, Duration::from_secs(60));

        cb.record_failure().await;
        assert!(cb.check().await);
        cb.record_failure().await;

        assert_eq!(cb.state().await, CircuitState::Open);
        assert!(!cb.check().await);
    }

    #[tokio::test]
    async fn test_success_resets_failure_count() {
        let cb = CircuitBreaker::new("gateway", 2, Duration::from_secs(60));

        cb.record_failure().await;
        cb.record_success().await;
        cb.record_failure().await;

        assert_eq!(cb.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_half_open_after_timeout() {
        let cb = CircuitBreaker::new("gateway", 1, Duration::from_millis(10));
        cb.record_failure().await;
        assert!(!cb.check().await);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(cb.check().await);
        assert_eq!(cb.state().await, CircuitState::HalfOpen);
        assert!(!cb.check().await, "only one request probes a half-open circuit");

        // A failed probe reopens immediately
        cb.record_failure().await;
        assert_eq!(cb.state().await, CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(cb.check().await);
        cb.record_success().await;
        assert_eq!(cb.state().await, CircuitState::Closed);
    }
}
