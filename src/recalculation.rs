//! Re-route decision policy.
//!
//! Decides, on every accepted position update, whether the traveler has
//! strayed far enough from the route to request a new one, while keeping at
//! most one request in flight and spacing attempts by a cooldown.
//!
//! ## State machine
//!
//! ```text
//!            deviated && cooled down
//!   Idle ─────────────────────────────▶ InFlight
//!    ▲                                     │
//!    └──────── complete(ticket) ───────────┘
//! ```
//!
//! The cooldown is measured from the *start* of the last attempt and is
//! never reset by a failure (including rate limiting), so a failing backend
//! is retried at most once per cooldown.

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::progress::RouteProgress;

/// Configuration for re-route decisions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecalculationConfig {
    /// Minimum time between two re-route attempts (milliseconds).
    /// Default: 8000
    pub cooldown_ms: u64,

    /// Deviation that triggers a re-route even when still flagged on route (meters).
    /// Default: 50.0
    pub deviation_threshold: f64,

    /// Time after which an outstanding re-route request is abandoned (milliseconds).
    /// Default: 15000
    pub request_timeout_ms: u64,
}

impl Default for RecalculationConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: 8000,
            deviation_threshold: 50.0,
            request_timeout_ms: 15_000,
        }
    }
}

/// Mutable re-route state of one navigation session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecalculationState {
    /// Start time of the last attempt; `None` until the first one, so the
    /// first deviation can trigger immediately.
    pub last_recalculate_ms: Option<u64>,
    /// True for exactly as long as one request is outstanding
    pub is_recalculating: bool,
}

/// Why [`decide`] returned what it did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DecisionReason {
    OnRoute,
    InFlight,
    CoolingDown { remaining_ms: u64 },
    Deviated { deviation: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    pub should_recalculate: bool,
    pub reason: DecisionReason,
}

/// Pure re-route decision.
pub fn decide(
    progress: &RouteProgress,
    state: &RecalculationState,
    now_ms: u64,
    config: &RecalculationConfig,
) -> Decision {
    let deviated = !progress.is_on_route || progress.deviation_distance > config.deviation_threshold;
    if !deviated {
        return Decision { should_recalculate: false, reason: DecisionReason::OnRoute };
    }

    if state.is_recalculating {
        return Decision { should_recalculate: false, reason: DecisionReason::InFlight };
    }

    if let Some(last) = state.last_recalculate_ms {
        let elapsed = now_ms.saturating_sub(last);
        if elapsed < config.cooldown_ms {
            return Decision {
                should_recalculate: false,
                reason: DecisionReason::CoolingDown { remaining_ms: config.cooldown_ms - elapsed },
            };
        }
    }

    Decision {
        should_recalculate: true,
        reason: DecisionReason::Deviated { deviation: progress.deviation_distance },
    }
}

/// Proof that a re-route attempt was started; hand it back on completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecalculationTicket {
    id: u64,
    started_at_ms: u64,
}

impl RecalculationTicket {
    pub fn started_at_ms(&self) -> u64 {
        self.started_at_ms
    }
}

/// Sole writer of a session's [`RecalculationState`].
#[derive(Debug, Clone, Default)]
pub struct RecalculationPolicy {
    config: RecalculationConfig,
    state: RecalculationState,
    next_ticket: u64,
    outstanding: Option<u64>,
}

impl RecalculationPolicy {
    pub fn new(config: RecalculationConfig) -> Self {
        Self { config, ..Self::default() }
    }

    pub fn config(&self) -> &RecalculationConfig {
        &self.config
    }

    pub fn state(&self) -> &RecalculationState {
        &self.state
    }

    /// Evaluate a progress update. When a re-route should start, marks the
    /// request in flight, records the attempt time and returns a ticket.
    pub fn evaluate(&mut self, progress: &RouteProgress, now_ms: u64) -> Option<RecalculationTicket> {
        let decision = decide(progress, &self.state, now_ms, &self.config);

        match decision.reason {
            DecisionReason::OnRoute => return None,
            DecisionReason::InFlight => {
                debug!(
                    "[Recalculation] Deviation {:.0}m ignored, request already in flight",
                    progress.deviation_distance
                );
                return None;
            }
            DecisionReason::CoolingDown { remaining_ms } => {
                debug!(
                    "[Recalculation] Deviation {:.0}m ignored, cooldown {}ms left",
                    progress.deviation_distance, remaining_ms
                );
                return None;
            }
            DecisionReason::Deviated { deviation } => {
                info!("[Recalculation] Off route by {:.0}m @{}ms, requesting new route", deviation, now_ms);
            }
        }

        self.next_ticket += 1;
        let ticket = RecalculationTicket { id: self.next_ticket, started_at_ms: now_ms };
        self.state.is_recalculating = true;
        self.state.last_recalculate_ms = Some(now_ms);
        self.outstanding = Some(ticket.id);
        Some(ticket)
    }

    /// Mark the attempt behind `ticket` finished, whatever its outcome.
    ///
    /// Returns false for a ticket that is not the outstanding one.
    pub fn complete(&mut self, ticket: &RecalculationTicket) -> bool {
        if self.outstanding != Some(ticket.id) {
            debug!("[Recalculation] Ignoring completion of stale ticket #{}", ticket.id);
            return false;
        }
        self.outstanding = None;
        self.state.is_recalculating = false;
        true
    }
}
