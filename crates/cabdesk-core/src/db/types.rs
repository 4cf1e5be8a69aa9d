//! ============================================================================
//! Ledger Types - Serializable records for redb storage
//! ============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A submission that could not reach the CRM.
/// Appended once, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FailedOperationRecord {
    /// Original input exactly as the front end submitted it
    pub payload: Value,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

impl FailedOperationRecord {
    pub fn new(payload: Value, error: impl Into<String>) -> Self {
        Self {
            payload,
            error: error.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Which ledger a record belongs to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LedgerKind {
    Bookings,
    Inquiries,
}

impl LedgerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerKind::Bookings => "bookings",
            LedgerKind::Inquiries => "inquiries",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "bookings" | "booking" => Some(Self::Bookings),
            "inquiries" | "inquiry" => Some(Self::Inquiries),
            _ => None,
        }
    }
}

/// Entry counts for the operator tool
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerStats {
    pub failed_bookings: usize,
    pub failed_inquiries: usize,
    pub inquiry_shown: bool,
}
