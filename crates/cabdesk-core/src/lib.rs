//! ============================================================================
//! CABDESK-CORE: CRM integration for the taxi booking site
//! ============================================================================
//! This crate handles everything the booking front end needs from the CRM:
//! - Session authentication with single-flight de-duplication
//! - JSON-RPC calls with re-authenticate-and-retry on session expiry
//! - Customer, lead, booking and fleet operations
//! - Periodic fleet sync into local vehicle listings
//! - A durable ledger of failed submissions for operator replay
//! ============================================================================

pub mod auth;
pub mod config;
pub mod crm;
pub mod db;
pub mod desk;
pub mod fleet;
pub mod ledger;
pub mod rpc;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

// Re-export main types for convenience
pub use auth::{AuthError, Session, SessionManager};
pub use config::{ConfigError, CrmConfig, SyncConfig};
pub use crm::{CrmError, CrmService};
pub use db::{LedgerDb, LedgerKind};
pub use desk::{BookingDesk, SubmissionOutcome};
pub use fleet::{FleetSnapshot, FleetSync, SyncError};
pub use ledger::{FailedOperationRecord, Ledger, RetrySummary};
pub use rpc::{RpcClient, RpcError, RpcRequest};
pub use types::*;
