//! ============================================================================
//! Session Manager - Authenticated CRM session with single-flight login
//! ============================================================================
//! Holds at most one live session. Concurrent callers that find no session
//! share one pending authentication future instead of each logging in.
//! ============================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use reqwest::header::SET_COOKIE;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::CrmConfig;
use crate::rpc::wire::{self, AuthParams, AuthResult, Envelope, Response};

const AUTH_PATH: &str = "/web/session/authenticate";

/// Authentication failures. Cloneable so every caller sharing one attempt
/// receives the same outcome.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AuthError {
    #[error("Authentication rejected: {0}")]
    Rejected(String),

    #[error("Authentication transport error: {0}")]
    Transport(String),

    #[error("Non-JSON auth response: {status} {body}")]
    MalformedResponse { status: u16, body: String },

    #[error("Authentication succeeded but no session token was returned")]
    MissingSession,
}

/// A live CRM session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    pub token: String,
    pub user_id: i64,
    pub authenticated_at: DateTime<Utc>,
}

type PendingAuth = Shared<BoxFuture<'static, Result<Session, AuthError>>>;

#[derive(Default)]
struct AuthState {
    session: Option<Session>,
    pending: Option<PendingAuth>,
}

struct Inner {
    http: reqwest::Client,
    config: CrmConfig,
    state: Mutex<AuthState>,
    attempts: AtomicU64,
}

/// Owns the CRM session. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    /// Create a session manager with its own HTTP client
    pub fn new(config: CrmConfig) -> Self {
        let http = build_http_client(&config);
        Self::with_client(config, http)
    }

    /// Create a session manager over an existing HTTP client
    pub fn with_client(config: CrmConfig, http: reqwest::Client) -> Self {
        Self {
            inner: Arc::new(Inner {
                http,
                config,
                state: Mutex::new(AuthState::default()),
                attempts: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &CrmConfig {
        &self.inner.config
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.inner.http
    }

    /// Return the live session, authenticating if there is none.
    /// At most one authentication request is in flight at any time.
    pub async fn ensure_authenticated(&self) -> Result<Session, AuthError> {
        let attempt = {
            let mut state = self.inner.lock_state();
            if let Some(session) = &state.session {
                return Ok(session.clone());
            }
            match &state.pending {
                Some(pending) => {
                    debug!("Joining in-flight CRM authentication");
                    pending.clone()
                }
                None => {
                    let inner = Arc::clone(&self.inner);
                    let attempt = async move {
                        let outcome = inner.authenticate().await;
                        inner.settle(&outcome);
                        outcome
                    }
                    .boxed()
                    .shared();
                    state.pending = Some(attempt.clone());
                    attempt
                }
            }
        };

        attempt.await
    }

    /// Drop the session if it still carries `stale_token`.
    /// A newer session obtained by another caller is left alone.
    pub fn invalidate(&self, stale_token: &str) {
        let mut state = self.inner.lock_state();
        let matches = state
            .session
            .as_ref()
            .map(|s| s.token == stale_token)
            .unwrap_or(false);
        if matches {
            info!("Invalidating expired CRM session");
            state.session = None;
        }
    }

    /// Peek at the current session without authenticating
    pub fn current(&self) -> Option<Session> {
        self.inner.lock_state().session.clone()
    }

    /// Number of authentication requests sent so far
    pub fn attempts(&self) -> u64 {
        self.inner.attempts.load(Ordering::Relaxed)
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, AuthState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record the outcome of an attempt and release the in-flight slot
    fn settle(&self, outcome: &Result<Session, AuthError>) {
        let mut state = self.lock_state();
        state.pending = None;
        state.session = outcome.as_ref().ok().cloned();
    }

    async fn authenticate(&self) -> Result<Session, AuthError> {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        info!("Authenticating with CRM as {}", self.config.login);

        let url = self.config.endpoint(AUTH_PATH);
        let envelope = Envelope::call(AuthParams {
            db: &self.config.database,
            login: &self.config.login,
            password: &self.config.password,
        });

        let response = self
            .http
            .post(&url)
            .json(&envelope)
            .send()
            .await
            .map_err(|e| {
                error!("CRM authentication request failed: {}", e);
                AuthError::Transport(e.to_string())
            })?;

        let status = response.status().as_u16();
        let cookie_token = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find_map(wire::session_cookie);
        let body = response
            .text()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;

        let parsed: Response<AuthResult> = serde_json::from_str(&body).map_err(|_| {
            error!("Non-JSON auth response ({}): {}", status, body);
            AuthError::MalformedResponse {
                status,
                body: body.clone(),
            }
        })?;

        if let Some(err) = parsed.error {
            let message = err
                .best_message()
                .unwrap_or("Authentication failed")
                .to_string();
            warn!("CRM rejected credentials: {}", message);
            return Err(AuthError::Rejected(message));
        }

        let result = parsed.result.ok_or_else(|| {
            warn!("CRM auth response carried neither result nor error");
            AuthError::Rejected("Authentication failed".to_string())
        })?;
        let user_id = result
            .uid
            .ok_or_else(|| AuthError::Rejected("Authentication failed".to_string()))?;
        let token = result
            .session_id
            .or(cookie_token)
            .ok_or(AuthError::MissingSession)?;

        info!("CRM authentication successful (uid {})", user_id);
        Ok(Session {
            token,
            user_id,
            authenticated_at: Utc::now(),
        })
    }
}

/// Build the shared HTTP client, honouring the configured timeout
pub(crate) fn build_http_client(config: &CrmConfig) -> reqwest::Client {
    let mut builder = reqwest::Client::builder().user_agent("cabdesk/0.1");
    if let Some(timeout) = config.request_timeout {
        builder = builder.timeout(timeout);
    }
    builder.build().unwrap_or_else(|_| reqwest::Client::new())
}
