//! ============================================================================
//! Fleet Module - Fleet sync and local vehicle listings
//! ============================================================================
//! - catalog: pure mapping from CRM fleet records to listing cards
//! - sync: one-shot and periodic pulls from the CRM
//! ============================================================================

pub mod catalog;
mod sync;

pub use catalog::to_listing;
pub use sync::{merge_with_fallback, FleetSnapshot, FleetSync, SyncError};
