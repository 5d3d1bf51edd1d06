// src/model/alert.rs

//! Alert record and its lifecycle states.
//!
//! Legal moves:
//!
//! ```text
//! active ──► acknowledged ──► resolved
//!   │              │
//!   │              └────────► dismissed   (expiry sweep)
//!   ├──────────────────────► resolved
//!   └──────────────────────► dismissed
//! ```
//!
//! `resolved` and `dismissed` are terminal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::feed::FeedId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlertId(pub u64);

impl fmt::Display for AlertId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    Detection,
    Error,
    Warning,
    Critical,
    Info,
}

impl AlertKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertKind::Detection => "detection",
            AlertKind::Error => "error",
            AlertKind::Warning => "warning",
            AlertKind::Critical => "critical",
            AlertKind::Info => "info",
        }
    }
}

/// `Low < Medium < High < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Active,
    Acknowledged,
    Resolved,
    Dismissed,
}

impl AlertStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, AlertStatus::Resolved | AlertStatus::Dismissed)
    }

    /// Whether `self -> to` is a legal move for an operator. Expiry may
    /// additionally dismiss an acknowledged alert.
    pub fn can_transition_to(self, to: AlertStatus) -> bool {
        use AlertStatus::*;
        matches!(
            (self, to),
            (Active, Acknowledged)
                | (Active, Resolved)
                | (Active, Dismissed)
                | (Acknowledged, Resolved)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AlertStatus::Active => "active",
            AlertStatus::Acknowledged => "acknowledged",
            AlertStatus::Resolved => "resolved",
            AlertStatus::Dismissed => "dismissed",
        }
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        })
    }
}

/// Deduplication key: alerts with the same feed and title collapse while active.
/// `feed_id == None` marks a system-level alert.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub feed_id: Option<FeedId>,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: AlertId,
    pub kind: AlertKind,
    pub severity: Severity,
    pub status: AlertStatus,
    pub feed_id: Option<FeedId>,
    pub title: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Number of signals folded into this alert.
    pub occurrences: u32,
    #[serde(default)]
    pub last_actor: Option<String>,
}

impl Alert {
    pub fn dedup_key(&self) -> DedupKey {
        DedupKey { feed_id: self.feed_id.clone(), title: self.title.clone() }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use AlertStatus::*;

    #[test]
    fn terminal_states_have_no_exits() {
        for to in [Active, Acknowledged, Resolved, Dismissed] {
            assert!(!Resolved.can_transition_to(to));
            assert!(!Dismissed.can_transition_to(to));
        }
    }

    #[test]
    fn no_un_acknowledging() {
        assert!(!Acknowledged.can_transition_to(Active));
        assert!(Acknowledged.can_transition_to(Resolved));
        assert!(!Acknowledged.can_transition_to(Dismissed));
        assert!(Active.can_transition_to(Resolved));
    }

    #[test]
    fn severity_orders_low_to_critical() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
    }
}
