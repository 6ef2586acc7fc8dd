//! Bridge lifecycle states and the status published to observers.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Simulator link state as seen by observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    /// No link; waiting for a connect event
    Disconnected,
    /// Link up, display sink being opened and settled
    Connecting,
    /// Frames are flowing (or being retried after a failed tick)
    Connected,
}

/// Controller state machine.
///
/// ```text
/// Idle --connect--> Connecting --settled--> Connected <--> Degraded
///   ^                   |                       |             |
///   +---- open failed --+---- disconnect -------+-------------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BridgeState {
    /// Rest state, waiting for the simulator link
    Idle,
    /// Opening the display sink
    Connecting,
    /// Ticking normally
    Connected,
    /// Ticking, but the last tick produced no frame
    Degraded,
}

impl BridgeState {
    /// Link state implied by this controller state.
    pub fn connection(&self) -> ConnectionState {
        match self {
            BridgeState::Idle => ConnectionState::Disconnected,
            BridgeState::Connecting => ConnectionState::Connecting,
            BridgeState::Connected | BridgeState::Degraded => ConnectionState::Connected,
        }
    }

    /// Whether ticks produce frames in this state.
    pub fn is_ticking(&self) -> bool {
        matches!(self, BridgeState::Connected | BridgeState::Degraded)
    }
}

impl fmt::Display for BridgeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Running counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BridgeStats {
    /// Ticks started
    pub ticks: u64,
    /// Frames written to the sink
    pub frames_sent: u64,
    /// Ticks that produced no frame
    pub degraded_ticks: u64,
    /// Sample timeouts and unresolved fields
    pub sample_failures: u64,
    /// Failed writes
    pub write_failures: u64,
    /// Sink close/reopen cycles after repeated write failures
    pub sink_recycles: u64,
    /// Failed sink opens
    pub open_failures: u64,
    /// Link connect events handled
    pub connects: u64,
    /// Link disconnect events handled
    pub disconnects: u64,
}

/// Snapshot of the bridge published on every change.
#[derive(Debug, Clone, Serialize)]
pub struct BridgeStatus {
    /// Current controller state
    pub state: BridgeState,
    /// When `state` was entered
    pub since: DateTime<Utc>,
    /// Counters
    pub stats: BridgeStats,
    /// Last frame written, as text
    pub last_frame: Option<String>,
    /// Most recent failure, for operators
    pub last_error: Option<String>,
}

impl BridgeStatus {
    /// Link state derived from `state`.
    pub fn connection(&self) -> ConnectionState {
        self.state.connection()
    }
}

impl Default for BridgeStatus {
    fn default() -> Self {
        Self {
            state: BridgeState::Idle,
            since: Utc::now(),
            stats: BridgeStats::default(),
            last_frame: None,
            last_error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degraded_still_counts_as_connected() {
        assert_eq!(BridgeState::Degraded.connection(), ConnectionState::Connected);
        assert!(BridgeState::Degraded.is_ticking());
        assert!(!BridgeState::Connecting.is_ticking());
        assert_eq!(BridgeState::Idle.connection(), ConnectionState::Disconnected);
    }

    #[test]
    fn status_serializes() {
        let status = BridgeStatus::default();
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["state"], "Idle");
        assert_eq!(json["stats"]["frames_sent"], 0);
    }
}
