//! Shared run-control state for a session.
//!
//! The step loop and whoever manages the process (signal handler, the
//! messaging adapter receiving a stop order) share one [`SessionControl`]
//! through an [`Arc`](std::sync::Arc). The stop flag is an atomic so the
//! step loop reads it without locking.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use phasebridge_types::SimTime;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Notify};

use crate::config::SessionConfig;

/// Reason why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionEndReason {
    /// Simulated time reached the configured limit.
    TimeLimitReached,
    /// A stop was requested.
    StopRequested,
    /// The inbound channel closed while waiting for the start order.
    InboundClosed,
}

/// Shared session control state.
#[derive(Debug)]
pub struct SessionControl {
    stop_requested: AtomicBool,
    stop_notify: Notify,
    /// Real-time pause between steps, in milliseconds.
    step_interval_ms: u64,
    started_at: DateTime<Utc>,
    time_limit: Option<SimTime>,
    end_reason: Mutex<Option<SessionEndReason>>,
}

impl SessionControl {
    /// Control state for a session configured by `config`.
    pub fn new(config: &SessionConfig) -> Self {
        Self::with_limits(
            config.step_interval_ms,
            config.time_limit.map(SimTime::from_secs),
        )
    }

    /// Control state with explicit pacing and simulated time limit.
    pub fn with_limits(step_interval_ms: u64, time_limit: Option<SimTime>) -> Self {
        Self {
            stop_requested: AtomicBool::new(false),
            stop_notify: Notify::new(),
            step_interval_ms,
            started_at: Utc::now(),
            time_limit,
            end_reason: Mutex::new(None),
        }
    }

    // -----------------------------------------------------------------------
    // Stop
    // -----------------------------------------------------------------------

    /// Request a clean stop. Also wakes a step loop waiting at the start
    /// gate.
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
        self.stop_notify.notify_waiters();
    }

    /// Whether a stop has been requested.
    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    /// Resolves once a stop is requested.
    pub async fn stopped(&self) {
        while !self.is_stop_requested() {
            let notified = self.stop_notify.notified();
            if self.is_stop_requested() {
                break;
            }
            notified.await;
        }
    }

    /// Record the reason the session ended.
    pub async fn set_end_reason(&self, reason: SessionEndReason) {
        *self.end_reason.lock().await = Some(reason);
    }

    /// The reason the session ended, if it has.
    pub async fn end_reason(&self) -> Option<SessionEndReason> {
        *self.end_reason.lock().await
    }

    // -----------------------------------------------------------------------
    // Pacing
    // -----------------------------------------------------------------------

    /// Real-time pause between steps in milliseconds.
    pub const fn step_interval_ms(&self) -> u64 {
        self.step_interval_ms
    }

    // -----------------------------------------------------------------------
    // Boundaries
    // -----------------------------------------------------------------------

    /// The simulated time limit, if any.
    pub const fn time_limit(&self) -> Option<SimTime> {
        self.time_limit
    }

    /// Whether `now` has reached the simulated time limit.
    pub fn time_limit_reached(&self, now: SimTime) -> bool {
        self.time_limit.is_some_and(|limit| now >= limit)
    }

    /// Wall-clock time the session started.
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Wall-clock seconds since the session started.
    pub fn elapsed_seconds(&self) -> u64 {
        let elapsed = Utc::now()
            .signed_duration_since(self.started_at)
            .num_seconds();
        u64::try_from(elapsed.max(0)).unwrap_or(u64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn initial_state() {
        let control = SessionControl::with_limits(0, None);
        assert!(!control.is_stop_requested());
        assert!(!control.time_limit_reached(SimTime::from_secs(dec!(1000000))));
    }

    #[test]
    fn time_limit_is_inclusive() {
        let control = SessionControl::with_limits(0, Some(SimTime::from_secs(dec!(10))));
        assert!(!control.time_limit_reached(SimTime::from_secs(dec!(9.5))));
        assert!(control.time_limit_reached(SimTime::from_secs(dec!(10))));
    }

    #[test]
    fn from_session_config() {
        let config = SessionConfig {
            time_limit: Some(dec!(3600)),
            step_interval_ms: 250,
            ..SessionConfig::default()
        };
        let control = SessionControl::new(&config);
        assert_eq!(control.step_interval_ms(), 250);
        assert_eq!(control.time_limit(), Some(SimTime::from_secs(dec!(3600))));
    }

    #[tokio::test]
    async fn stop_wakes_waiter() {
        let control = Arc::new(SessionControl::with_limits(0, None));
        let waiter = Arc::clone(&control);
        let handle = tokio::spawn(async move { waiter.stopped().await });
        tokio::task::yield_now().await;
        control.request_stop();
        handle.await.unwrap_or_default();
        assert!(control.is_stop_requested());
    }

    #[tokio::test]
    async fn end_reason_round_trips() {
        let control = SessionControl::with_limits(0, None);
        assert_eq!(control.end_reason().await, None);
        control.set_end_reason(SessionEndReason::StopRequested).await;
        assert_eq!(control.end_reason().await, Some(SessionEndReason::StopRequested));
    }
}
