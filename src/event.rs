//! Events and types used throughout kanata-indicator.
//!
//! This module defines the vocabulary that all components share:
//! [`Event`] is everything the coordinator reacts to, and
//! [`LayerEvent`] / [`ServiceNotification`] / [`ServiceState`] are the
//! payloads produced by the kanata stream and the service manager.

use std::fmt;

/// Identifies one connection to the daemon.
///
/// Every successful connect gets a fresh id so events still in flight from
/// an older connection can be told apart from the current one.
pub type SessionId = u64;

/// A layer change reported by the daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerEvent {
    pub layer_name: String,
}

impl LayerEvent {
    pub fn new(layer_name: impl Into<String>) -> Self {
        Self {
            layer_name: layer_name.into(),
        }
    }
}

/// Why a connection stopped producing events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The daemon closed the socket (zero-length read).
    Peer,
    /// The read failed for any reason other than cancellation.
    Error(String),
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::Peer => write!(f, "closed by peer"),
            CloseReason::Error(e) => write!(f, "unexpected error: {}", e),
        }
    }
}

/// Everything the [`ReconnectCoordinator`](crate::coordinator::ReconnectCoordinator)
/// reacts to.
///
/// Events arrive over a single [`mpsc`](std::sync::mpsc) channel, so the
/// coordinator sees them one at a time and never has to lock its state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The background connect for `session` succeeded and its read loop is
    /// running.
    Connected { session: SessionId },
    /// The background connect for `session` failed.  No read loop was
    /// started.
    ConnectFailed { session: SessionId, error: String },
    /// A connection decoded a new layer name.
    Layer { session: SessionId, name: String },
    /// A connection ended. Cancelled reads never produce this.
    Closed {
        session: SessionId,
        reason: CloseReason,
    },
    /// The watched unit finished a job and is now active.
    ServiceActivated,
    /// The process was asked to exit.
    Shutdown,
}

/// One `JobRemoved` notification, reduced to the fields we filter on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceNotification {
    pub unit_name: String,
    pub job_result: String,
}

impl ServiceNotification {
    pub fn new(unit_name: impl Into<String>, job_result: impl Into<String>) -> Self {
        Self {
            unit_name: unit_name.into(),
            job_result: job_result.into(),
        }
    }

    /// `true` when this is a successfully completed job for `unit_name`.
    pub fn is_done_for(&self, unit_name: &str) -> bool {
        self.job_result == "done" && self.unit_name == unit_name
    }
}

/// The `ActiveState` of a systemd unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceState {
    Active,
    Reloading,
    Inactive,
    Failed,
    Activating,
    Deactivating,
    Maintenance,
    Refreshing,
    /// Anything newer systemd versions may report.
    Other(String),
}

impl ServiceState {
    pub fn is_active(&self) -> bool {
        matches!(self, ServiceState::Active)
    }
}

impl From<&str> for ServiceState {
    fn from(s: &str) -> Self {
        match s {
            "active" => ServiceState::Active,
            "reloading" => ServiceState::Reloading,
            "inactive" => ServiceState::Inactive,
            "failed" => ServiceState::Failed,
            "activating" => ServiceState::Activating,
            "deactivating" => ServiceState::Deactivating,
            "maintenance" => ServiceState::Maintenance,
            "refreshing" => ServiceState::Refreshing,
            other => ServiceState::Other(other.to_string()),
        }
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceState::Active => write!(f, "active"),
            ServiceState::Reloading => write!(f, "reloading"),
            ServiceState::Inactive => write!(f, "inactive"),
            ServiceState::Failed => write!(f, "failed"),
            ServiceState::Activating => write!(f, "activating"),
            ServiceState::Deactivating => write!(f, "deactivating"),
            ServiceState::Maintenance => write!(f, "maintenance"),
            ServiceState::Refreshing => write!(f, "refreshing"),
            ServiceState::Other(s) => write!(f, "{}", s),
        }
    }
}

//  Tests
