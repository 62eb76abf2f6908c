//! Connection state machine for platform adapters
//!
//! Tracks the lifecycle of an adapter's connection and rejects transitions
//! that skip authentication. A bounded history of transitions is kept for
//! diagnostics.

use crate::core::error::{PlatformError, PlatformResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Number of transitions retained per adapter
const HISTORY_LIMIT: usize = 50;

/// Connection state of one adapter
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    Disconnected,
    Authenticating,
    Connected,
    Degraded,
    Unhealthy,
}

impl ConnectionState {
    /// Whether publish operations may be attempted in this state
    pub fn is_usable(&self) -> bool {
        matches!(self, ConnectionState::Connected | ConnectionState::Degraded)
    }

    /// Check whether `self -> to` is a legal transition
    pub fn can_transition_to(&self, to: ConnectionState) -> bool {
        use ConnectionState::*;

        match (self, to) {
            // disconnect() is always allowed
            (_, Disconnected) => true,
            (Disconnected, Authenticating) => true,
            (Authenticating, Connected) => true,
            (Connected, Authenticating | Degraded | Unhealthy) => true,
            (Degraded, Authenticating | Connected | Unhealthy) => true,
            (Unhealthy, Authenticating) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Authenticating => "authenticating",
            ConnectionState::Connected => "connected",
            ConnectionState::Degraded => "degraded",
            ConnectionState::Unhealthy => "unhealthy",
        };
        f.write_str(name)
    }
}

/// State transition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StateTransition {
    pub from: ConnectionState,
    pub to: ConnectionState,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// State machine for one adapter's connection
#[derive(Debug, Clone)]
pub struct ConnectionStateMachine {
    platform: String,
    current_state: ConnectionState,
    transitions: VecDeque<StateTransition>,
}

impl ConnectionStateMachine {
    /// Create a new state machine in `Disconnected`
    pub fn new(platform: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            current_state: ConnectionState::Disconnected,
            transitions: VecDeque::new(),
        }
    }

    /// Get current state
    pub fn state(&self) -> ConnectionState {
        self.current_state
    }

    /// Transition to a new state
    ///
    /// Moving to the current state is a no-op and is not recorded.
    pub fn transition(&mut self, to: ConnectionState, reason: Option<&str>) -> PlatformResult<()> {
        let from = self.current_state;
        if from == to {
            return Ok(());
        }

        if !from.can_transition_to(to) {
            return Err(PlatformError::InvalidStateTransition {
                platform: self.platform.clone(),
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        if self.transitions.len() == HISTORY_LIMIT {
            self.transitions.pop_front();
        }
        self.transitions.push_back(StateTransition {
            from,
            to,
            timestamp: Utc::now(),
            reason: reason.map(str::to_string),
        });
        self.current_state = to;

        Ok(())
    }

    /// Recorded transitions, oldest first
    pub fn transitions(&self) -> impl Iterator<Item = &StateTransition> {
        self.transitions.iter()
    }

    /// When the current state was entered, if it was ever changed
    pub fn last_changed(&self) -> Option<DateTime<Utc>> {
        self.transitions.back().map(|t| t.timestamp)
    }

    /// Get transition history as human-readable string
    pub fn get_history(&self) -> String {
        self.transitions
            .iter()
            .map(|t| {
                let reason = t
                    .reason
                    .as_ref()
                    .map(|r| format!(" ({})", r))
                    .unwrap_or_default();
                format!("{}: {} → {}{}", t.timestamp.to_rfc3339(), t.from, t.to, reason)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
