//! Provider Health Tracking
//!
//! Per-provider circuit breaker consulted before every generation call.
//!
//! # State Transitions
//! ```text
//! Closed   --(failure_threshold consecutive failures)--> Open
//! Open     --(cooldown elapsed since last failure)-----> HalfOpen
//! HalfOpen --(success)---------------------------------> Closed
//! HalfOpen --(failure)---------------------------------> Open (timer restarts)
//! ```
//!
//! `HalfOpen` is never stored; it is derived at query time from
//! `circuit_open` and `last_failure_at`. The half-open decision is advisory:
//! concurrent callers that query after the cooldown may all try the provider.
//!
//! The tracker is process-local and in-memory; a restart resets every circuit.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Consecutive failures that open a circuit
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

/// Time an open circuit waits before allowing a trial call
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(5 * 60);

// =============================================================================
// Configuration
// =============================================================================

/// Circuit breaker parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerConfig {
    /// Consecutive failures that open the circuit (minimum 1)
    pub failure_threshold: u32,
    /// Cooldown after the most recent failure before a trial call is allowed
    pub cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            cooldown: DEFAULT_COOLDOWN,
        }
    }
}

impl BreakerConfig {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            cooldown,
        }
    }
}

/// Cooldowns too large for `chrono` saturate instead of wrapping
fn cooldown_chrono(cooldown: Duration) -> chrono::Duration {
    chrono::Duration::from_std(cooldown).unwrap_or(chrono::Duration::MAX)
}

// =============================================================================
// Health Snapshot
// =============================================================================

/// Derived circuit state at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls flow normally
    Closed,
    /// Calls are refused until the cooldown elapses
    Open,
    /// Cooldown elapsed; a probing call is allowed
    HalfOpen,
}

/// Read-only snapshot of one provider's health
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderHealth {
    /// Provider identifier
    pub provider: String,
    /// Failures since the last success
    pub consecutive_failures: u32,
    /// Time of the most recent failure
    pub last_failure_at: Option<DateTime<Utc>>,
    /// Set when the failure threshold is reached, cleared by a success
    pub circuit_open: bool,
}

impl ProviderHealth {
    fn new(provider: &str) -> Self {
        Self {
            provider: provider.to_string(),
            consecutive_failures: 0,
            last_failure_at: None,
            circuit_open: false,
        }
    }

    /// Computes the circuit state at `now`
    pub fn state_at(&self, cooldown: Duration, now: DateTime<Utc>) -> CircuitState {
        if !self.circuit_open {
            return CircuitState::Closed;
        }
        let cooldown = cooldown_chrono(cooldown);
        match self.last_failure_at {
            Some(last) if now.signed_duration_since(last) >= cooldown => CircuitState::HalfOpen,
            Some(_) => CircuitState::Open,
            // Open with no recorded failure time cannot be produced by the tracker;
            // treat it as retryable rather than stuck.
            None => CircuitState::HalfOpen,
        }
    }
}

// =============================================================================
// Circuit Gate
// =============================================================================

/// Breaker operations the pipeline needs.
///
/// Implemented by [`ProviderHealthTracker`]; tests may substitute a fake.
pub trait CircuitGate: Send + Sync {
    /// Whether a call to `provider` should be attempted now
    fn should_use(&self, provider: &str) -> bool;

    /// Records a successful call
    fn record_success(&self, provider: &str);

    /// Records a failed call
    fn record_failure(&self, provider: &str);
}

// =============================================================================
// Tracker
// =============================================================================

type Entry = Arc<Mutex<ProviderHealth>>;

/// Shared, thread-safe provider health tracker.
///
/// Each provider entry sits behind its own mutex, so the increment-and-check
/// in [`record_failure`](Self::record_failure) is atomic per provider while
/// different providers never contend.
#[derive(Debug, Default)]
pub struct ProviderHealthTracker {
    config: BreakerConfig,
    entries: RwLock<HashMap<String, Entry>>,
}

impl ProviderHealthTracker {
    /// Creates a tracker with the given breaker parameters
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the breaker parameters
    pub fn config(&self) -> BreakerConfig {
        self.config
    }

    /// Gets the entry for a provider, creating it on first reference
    fn entry(&self, provider: &str) -> Entry {
        {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(entry) = entries.get(provider) {
                return Arc::clone(entry);
            }
        }

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            entries
                .entry(provider.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(ProviderHealth::new(provider)))),
        )
    }

    /// Whether a call should be attempted at `now`
    pub fn should_use_at(&self, provider: &str, now: DateTime<Utc>) -> bool {
        let entry = self.entry(provider);
        let health = entry.lock().unwrap_or_else(PoisonError::into_inner);
        !matches!(
            health.state_at(self.config.cooldown, now),
            CircuitState::Open
        )
    }

    /// Whether a call should be attempted now
    pub fn should_use(&self, provider: &str) -> bool {
        self.should_use_at(provider, Utc::now())
    }

    /// Resets the failure count and closes the circuit
    pub fn record_success(&self, provider: &str) {
        let entry = self.entry(provider);
        let mut health = entry.lock().unwrap_or_else(PoisonError::into_inner);
        if health.circuit_open {
            info!("Circuit closed for provider {}", provider);
        }
        health.consecutive_failures = 0;
        health.circuit_open = false;
    }

    /// Records a failure at `now`, opening the circuit at the threshold
    pub fn record_failure_at(&self, provider: &str, now: DateTime<Utc>) {
        let entry = self.entry(provider);
        let mut health = entry.lock().unwrap_or_else(PoisonError::into_inner);
        health.consecutive_failures = health.consecutive_failures.saturating_add(1);
        health.last_failure_at = Some(now);

        if health.consecutive_failures >= self.config.failure_threshold {
            if !health.circuit_open {
                warn!(
                    "Circuit opened for provider {} after {} consecutive failures",
                    provider, health.consecutive_failures
                );
            }
            health.circuit_open = true;
        }
    }

    /// Records a failure now
    pub fn record_failure(&self, provider: &str) {
        self.record_failure_at(provider, Utc::now());
    }

    /// Returns a snapshot of a provider's health
    pub fn get_health(&self, provider: &str) -> ProviderHealth {
        let entry = self.entry(provider);
        let health = entry.lock().unwrap_or_else(PoisonError::into_inner);
        health.clone()
    }

    /// Returns the derived circuit state at `now`
    pub fn circuit_state_at(&self, provider: &str, now: DateTime<Utc>) -> CircuitState {
        self.get_health(provider).state_at(self.config.cooldown, now)
    }

    /// Returns the derived circuit state now
    pub fn circuit_state(&self, provider: &str) -> CircuitState {
        self.circuit_state_at(provider, Utc::now())
    }

    /// Snapshots every provider seen so far, sorted by provider id
    pub fn snapshot_all(&self) -> Vec<ProviderHealth> {
        let entries: Vec<Entry> = {
            let map = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            map.values().cloned().collect()
        };

        let mut snapshots: Vec<ProviderHealth> = entries
            .iter()
            .map(|e| e.lock().unwrap_or_else(PoisonError::into_inner).clone())
            .collect();
        snapshots.sort_by(|a, b| a.provider.cmp(&b.provider));
        snapshots
    }
}

impl CircuitGate for ProviderHealthTracker {
    fn should_use(&self, provider: &str) -> bool {
        ProviderHealthTracker::should_use(self, provider)
    }

    fn record_success(&self, provider: &str) {
        ProviderHealthTracker::record_success(self, provider)
    }

    fn record_failure(&self, provider: &str) {
        ProviderHealthTracker::record_failure(self, provider)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-15T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn secs(n: i64) -> chrono::Duration {
        chrono::Duration::seconds(n)
    }

    // -------------------------------------------------------------------------
    // Threshold
    // -------------------------------------------------------------------------

    #[test]
    fn test_new_provider_is_closed() {
        let tracker = ProviderHealthTracker::default();

        assert!(tracker.should_use("elevenlabs"));
        let health = tracker.get_health("elevenlabs");
        assert_eq!(health.consecutive_failures, 0);
        assert!(health.last_failure_at.is_none());
        assert!(!health.circuit_open);
        assert_eq!(tracker.circuit_state("elevenlabs"), CircuitState::Closed);
    }

    #[test]
    fn test_circuit_opens_at_threshold() {
        let tracker = ProviderHealthTracker::default();
        let now = t0();

        tracker.record_failure_at("runway", now);
        tracker.record_failure_at("runway", now);
        assert!(tracker.should_use_at("runway", now));
        assert!(!tracker.get_health("runway").circuit_open);

        tracker.record_failure_at("runway", now);
        assert!(!tracker.should_use_at("runway", now));
        assert!(tracker.get_health("runway").circuit_open);
        assert_eq!(tracker.circuit_state_at("runway", now), CircuitState::Open);
    }

    #[test]
    fn test_custom_threshold() {
        let tracker = ProviderHealthTracker::new(BreakerConfig::new(1, Duration::from_secs(10)));
        tracker.record_failure_at("did", t0());
        assert!(!tracker.should_use_at("did", t0()));
    }

    #[test]
    fn test_zero_threshold_is_clamped_to_one() {
        let config = BreakerConfig::new(0, Duration::from_secs(1));
        assert_eq!(config.failure_threshold, 1);
    }

    #[test]
    fn test_providers_are_independent() {
        let tracker = ProviderHealthTracker::default();
        for _ in 0..3 {
            tracker.record_failure_at("runway", t0());
        }

        assert!(!tracker.should_use_at("runway", t0()));
        assert!(tracker.should_use_at("runway-cinematic", t0()));
    }

    // -------------------------------------------------------------------------
    // Success Reset
    // -------------------------------------------------------------------------

    #[test]
    fn test_success_resets_count() {
        let tracker = ProviderHealthTracker::default();
        tracker.record_failure_at("elevenlabs", t0());
        tracker.record_failure_at("elevenlabs", t0());
        tracker.record_success("elevenlabs");

        assert_eq!(tracker.get_health("elevenlabs").consecutive_failures, 0);

        // Two more failures must not open the circuit after a reset.
        tracker.record_failure_at("elevenlabs", t0());
        tracker.record_failure_at("elevenlabs", t0());
        assert!(tracker.should_use_at("elevenlabs", t0()));
    }

    #[test]
    fn test_success_closes_open_circuit_immediately() {
        let tracker = ProviderHealthTracker::default();
        for _ in 0..3 {
            tracker.record_failure_at("did", t0());
        }
        assert!(!tracker.should_use_at("did", t0()));

        tracker.record_success("did");
        assert!(tracker.should_use_at("did", t0()));
        let health = tracker.get_health("did");
        assert!(!health.circuit_open);
        assert_eq!(health.consecutive_failures, 0);
    }

    #[test]
    fn test_success_is_idempotent() {
        let tracker = ProviderHealthTracker::default();
        tracker.record_success("runway");
        tracker.record_success("runway");
        assert_eq!(tracker.get_health("runway"), ProviderHealth::new("runway"));
    }

    // -------------------------------------------------------------------------
    // Cooldown
    // -------------------------------------------------------------------------

    #[test]
    fn test_cooldown_boundary() {
        let tracker = ProviderHealthTracker::default();
        for _ in 0..3 {
            tracker.record_failure_at("runway", t0());
        }

        assert!(!tracker.should_use_at("runway", t0() + secs(299)));
        assert!(tracker.should_use_at("runway", t0() + secs(300)));
        assert!(tracker.should_use_at("runway", t0() + secs(301)));
        assert_eq!(
            tracker.circuit_state_at("runway", t0() + secs(300)),
            CircuitState::HalfOpen
        );
    }

    #[test]
    fn test_repeated_queries_do_not_change_decision() {
        let tracker = ProviderHealthTracker::default();
        for _ in 0..3 {
            tracker.record_failure_at("runway", t0());
        }

        for _ in 0..10 {
            assert!(!tracker.should_use_at("runway", t0() + secs(60)));
        }
        for _ in 0..10 {
            assert!(tracker.should_use_at("runway", t0() + secs(300)));
        }
        assert_eq!(tracker.get_health("runway").consecutive_failures, 3);
    }

    #[test]
    fn test_cooldown_measured_from_last_failure() {
        let tracker = ProviderHealthTracker::default();
        tracker.record_failure_at("did", t0());
        tracker.record_failure_at("did", t0() + secs(100));
        tracker.record_failure_at("did", t0() + secs(200));

        assert!(!tracker.should_use_at("did", t0() + secs(450)));
        assert!(tracker.should_use_at("did", t0() + secs(500)));
    }

    #[test]
    fn test_failed_trial_reopens_with_fresh_timer() {
        let tracker = ProviderHealthTracker::default();
        for _ in 0..3 {
            tracker.record_failure_at("runway", t0());
        }

        let trial_time = t0() + secs(300);
        assert!(tracker.should_use_at("runway", trial_time));
        tracker.record_failure_at("runway", trial_time);

        assert!(!tracker.should_use_at("runway", trial_time + secs(1)));
        assert!(!tracker.should_use_at("runway", trial_time + secs(299)));
        assert!(tracker.should_use_at("runway", trial_time + secs(300)));
        assert_eq!(tracker.get_health("runway").consecutive_failures, 4);
    }

    #[test]
    fn test_oversized_cooldown_saturates() {
        let tracker =
            ProviderHealthTracker::new(BreakerConfig::new(1, Duration::from_secs(u64::MAX)));
        tracker.record_failure_at("runway", t0());

        // Clock stepped backwards past the failure time.
        assert_eq!(
            tracker.circuit_state_at("runway", t0() - secs(60)),
            CircuitState::Open
        );
        assert!(!tracker.should_use_at("runway", t0() + secs(86_400 * 365)));
    }

    // -------------------------------------------------------------------------
    // Snapshots
    // -------------------------------------------------------------------------

    #[test]
    fn test_snapshot_is_detached_copy() {
        let tracker = ProviderHealthTracker::default();
        let mut snapshot = tracker.get_health("elevenlabs");
        snapshot.consecutive_failures = 99;
        snapshot.circuit_open = true;

        assert_eq!(tracker.get_health("elevenlabs").consecutive_failures, 0);
        assert!(tracker.should_use("elevenlabs"));
    }

    #[test]
    fn test_snapshot_all_sorted() {
        let tracker = ProviderHealthTracker::default();
        tracker.record_failure("runway");
        tracker.record_success("did");
        tracker.record_success("elevenlabs");

        let names: Vec<String> = tracker
            .snapshot_all()
            .into_iter()
            .map(|h| h.provider)
            .collect();
        assert_eq!(names, vec!["did", "elevenlabs", "runway"]);
    }

    #[test]
    fn test_health_serialization() {
        let tracker = ProviderHealthTracker::default();
        tracker.record_failure_at("runway", t0());

        let json = serde_json::to_value(tracker.get_health("runway")).unwrap();
        assert_eq!(json["provider"], "runway");
        assert_eq!(json["consecutiveFailures"], 1);
        assert_eq!(json["circuitOpen"], false);
        assert!(json["lastFailureAt"].is_string());
    }

    // -------------------------------------------------------------------------
    // Concurrency
    // -------------------------------------------------------------------------

    #[test]
    fn test_concurrent_failures_are_not_lost() {
        let tracker = Arc::new(ProviderHealthTracker::new(BreakerConfig::new(
            10_000,
            DEFAULT_COOLDOWN,
        )));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tracker = Arc::clone(&tracker);
                std::thread::spawn(move || {
                    for _ in 0..250 {
                        tracker.record_failure("runway");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(tracker.get_health("runway").consecutive_failures, 2000);
    }

    #[test]
    fn test_gate_trait_delegates() {
        let tracker = ProviderHealthTracker::default();
        let gate: &dyn CircuitGate = &tracker;
        gate.record_failure("did");
        gate.record_failure("did");
        gate.record_failure("did");
        assert!(!gate.should_use("did"));
        gate.record_success("did");
        assert!(gate.should_use("did"));
    }
}
