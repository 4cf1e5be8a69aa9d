//! ============================================================================
//! Auth Module - CRM session authentication
//! ============================================================================
//! Handles the session lifecycle against the CRM:
//! - Credential handshake at /web/session/authenticate
//! - Single-flight de-duplication of concurrent attempts
//! - Invalidation on session expiry
//! ============================================================================

mod session;

pub use session::{AuthError, Session, SessionManager};
