//! Per-platform circuit breaker (§5): 5 failures inside a 60s window opens
//! the circuit for 30s, then half-open admits one probe call — a success
//! closes it, a failure reopens it. Adapted from `empath-delivery`'s
//! per-domain breaker, keyed here by platform name instead of domain since
//! the breaker guards outbound calls to a `PlatformAdapter`, not SMTP.

use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use dashmap::DashMap;
use parking_lot::Mutex;

const FAILURE_THRESHOLD: u32 = 5;
const FAILURE_WINDOW: Duration = Duration::from_secs(60);
const OPEN_TIMEOUT: Duration = Duration::from_secs(30);
const SUCCESS_THRESHOLD: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct Breaker {
    state: CircuitState,
    failure_count: u32,
    first_failure_at: Option<Instant>,
    opened_at: Option<Instant>,
    consecutive_successes: u32,
}

impl Breaker {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            first_failure_at: None,
            opened_at: None,
            consecutive_successes: 0,
        }
    }

    fn window_expired(&self) -> bool {
        self.first_failure_at
            .is_none_or(|t| Instant::now().duration_since(t) > FAILURE_WINDOW)
    }

    fn timeout_expired(&self) -> bool {
        self.opened_at
            .is_some_and(|t| Instant::now().duration_since(t) >= OPEN_TIMEOUT)
    }

    fn record_failure(&mut self, platform: &str) {
        match self.state {
            CircuitState::Closed => {
                if self.window_expired() {
                    self.failure_count = 0;
                    self.first_failure_at = None;
                }
                self.first_failure_at.get_or_insert_with(Instant::now);
                self.failure_count += 1;
                if self.failure_count >= FAILURE_THRESHOLD {
                    self.state = CircuitState::Open;
                    self.opened_at = Some(Instant::now());
                    tracing::warn!(platform, "circuit breaker opened");
                }
            }
            CircuitState::HalfOpen => {
                self.state = CircuitState::Open;
                self.opened_at = Some(Instant::now());
                self.consecutive_successes = 0;
                tracing::warn!(platform, "circuit breaker probe failed, reopening");
            }
            CircuitState::Open => {}
        }
    }

    fn record_success(&mut self, platform: &str) {
        match self.state {
            CircuitState::Closed => {
                self.failure_count = 0;
                self.first_failure_at = None;
            }
            CircuitState::HalfOpen => {
                self.consecutive_successes += 1;
                if self.consecutive_successes >= SUCCESS_THRESHOLD {
                    self.state = CircuitState::Closed;
                    self.failure_count = 0;
                    self.first_failure_at = None;
                    self.opened_at = None;
                    self.consecutive_successes = 0;
                    tracing::info!(platform, "circuit breaker closed");
                }
            }
            CircuitState::Open => {}
        }
    }

    fn should_allow(&mut self) -> bool {
        match self.state {
            CircuitState::Open => {
                if self.timeout_expired() {
                    self.state = CircuitState::HalfOpen;
                    self.consecutive_successes = 0;
                    true
                } else {
                    false
                }
            }
            CircuitState::Closed | CircuitState::HalfOpen => true,
        }
    }
}

#[derive(Debug, Default)]
pub struct CircuitBreakerRegistry {
    breakers: DashMap<String, Arc<Mutex<Breaker>>>,
}

impl CircuitBreakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn get(&self, platform: &str) -> Arc<Mutex<Breaker>> {
        self.breakers
            .entry(platform.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Breaker::new())))
            .clone()
    }

    pub fn should_allow(&self, platform: &str) -> bool {
        self.get(platform).lock().should_allow()
    }

    pub fn record_success(&self, platform: &str) {
        self.get(platform).lock().record_success(platform);
    }

    pub fn record_failure(&self, platform: &str) {
        self.get(platform).lock().record_failure(platform);
    }

    pub fn state(&self, platform: &str) -> CircuitState {
        self.get(platform).lock().state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_threshold_failures() {
        let registry = CircuitBreakerRegistry::new();
        for _ in 0..FAILURE_THRESHOLD {
            registry.record_failure("sendgrid");
        }
        assert_eq!(registry.state("sendgrid"), CircuitState::Open);
        assert!(!registry.should_allow("sendgrid"));
    }

    #[test]
    fn success_resets_closed_failure_count() {
        let registry = CircuitBreakerRegistry::new();
        registry.record_failure("sendgrid");
        registry.record_failure("sendgrid");
        registry.record_success("sendgrid");
        registry.record_failure("sendgrid");
        registry.record_failure("sendgrid");
        assert_eq!(registry.state("sendgrid"), CircuitState::Closed);
    }

    #[test]
    fn independent_per_platform() {
        let registry = CircuitBreakerRegistry::new();
        for _ in 0..FAILURE_THRESHOLD {
            registry.record_failure("sendgrid");
        }
        assert_eq!(registry.state("sendgrid"), CircuitState::Open);
        assert_eq!(registry.state("mailgun"), CircuitState::Closed);
    }
}
