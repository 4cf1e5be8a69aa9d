//! ============================================================================
//! RPC Module - Generic CRM call primitive
//! ============================================================================
//! The only place where untyped model/method dispatch happens. Domain
//! operations in `crm` build typed payloads on top of it.
//! ============================================================================

mod client;
pub mod wire;

pub use client::{RpcClient, RpcError, RpcRequest};
