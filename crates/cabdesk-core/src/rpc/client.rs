//! ============================================================================
//! RPC Client - Authenticated call_kw wrapper with one retry on expiry
//! ============================================================================

use reqwest::header::COOKIE;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, error, warn};

use super::wire::{CallParams, Envelope, RemoteError, Response};
use crate::auth::{AuthError, Session, SessionManager};
use crate::config::CrmConfig;

const CALL_PATH: &str = "/web/dataset/call_kw";

/// Failures of a remote call
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("CRM error: {message}")]
    Remote { code: Option<i64>, message: String },

    #[error("CRM session expired again after re-authentication: {message}")]
    SessionExpired { message: String },

    #[error("CRM transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Non-JSON API response: {status} {body}")]
    MalformedResponse { status: u16, body: String },

    #[error("Unexpected result from {model}.{method}: {detail}")]
    UnexpectedResult {
        model: String,
        method: String,
        detail: String,
    },
}

/// One remote operation: target model, method and its arguments
#[derive(Debug, Clone, PartialEq)]
pub struct RpcRequest {
    pub model: String,
    pub method: String,
    pub args: Vec<Value>,
    pub kwargs: Map<String, Value>,
}

impl RpcRequest {
    pub fn new(model: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            method: method.into(),
            args: Vec::new(),
            kwargs: Map::new(),
        }
    }

    pub fn arg(mut self, value: Value) -> Self {
        self.args.push(value);
        self
    }

    pub fn kwarg(mut self, key: &str, value: Value) -> Self {
        self.kwargs.insert(key.to_string(), value);
        self
    }
}

/// What a single dispatch produced
enum Dispatch {
    Done(Value),
    Expired { token: String, message: String },
}

/// Generic JSON-RPC client over the CRM session. Cheap to clone.
#[derive(Clone)]
pub struct RpcClient {
    session: SessionManager,
}

impl RpcClient {
    pub fn new(config: CrmConfig) -> Self {
        Self {
            session: SessionManager::new(config),
        }
    }

    pub fn with_session(session: SessionManager) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    /// Call `model.method(*args, **kwargs)` and return the raw result
    pub async fn call(
        &self,
        model: &str,
        method: &str,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
    ) -> Result<Value, RpcError> {
        self.execute(&RpcRequest {
            model: model.to_string(),
            method: method.to_string(),
            args,
            kwargs,
        })
        .await
    }

    /// Execute a request, re-authenticating and retrying once if the
    /// session turns out to be expired. A second expiry is terminal.
    pub async fn execute(&self, request: &RpcRequest) -> Result<Value, RpcError> {
        match self.dispatch(request).await? {
            Dispatch::Done(value) => Ok(value),
            Dispatch::Expired { token, .. } => {
                warn!(
                    "Session expired during {}.{}, re-authenticating",
                    request.model, request.method
                );
                self.session.invalidate(&token);

                match self.dispatch(request).await? {
                    Dispatch::Done(value) => Ok(value),
                    Dispatch::Expired { token, message } => {
                        error!(
                            "Session expired again on retry of {}.{}",
                            request.model, request.method
                        );
                        self.session.invalidate(&token);
                        Err(RpcError::SessionExpired { message })
                    }
                }
            }
        }
    }

    /// Execute a request and deserialize its result
    pub async fn execute_as<T: DeserializeOwned>(&self, request: &RpcRequest) -> Result<T, RpcError> {
        let value = self.execute(request).await?;
        serde_json::from_value(value).map_err(|e| RpcError::UnexpectedResult {
            model: request.model.clone(),
            method: request.method.clone(),
            detail: e.to_string(),
        })
    }

    async fn dispatch(&self, request: &RpcRequest) -> Result<Dispatch, RpcError> {
        let session = self.session.ensure_authenticated().await?;
        let (status, body) = self.post(&session, request).await?;

        let parsed: Response<Value> = serde_json::from_str(&body).map_err(|_| {
            error!("Non-JSON API response ({}): {}", status, body);
            RpcError::MalformedResponse {
                status,
                body: body.clone(),
            }
        })?;

        match parsed.error {
            Some(err) if err.is_session_expired() => Ok(Dispatch::Expired {
                token: session.token,
                message: expiry_message(&err),
            }),
            Some(err) => {
                let message = err.best_message().unwrap_or("Odoo API Error").to_string();
                error!(
                    "CRM error on {}.{}: {}",
                    request.model, request.method, message
                );
                Err(RpcError::Remote {
                    code: err.code,
                    message,
                })
            }
            None => Ok(Dispatch::Done(parsed.result.unwrap_or(Value::Null))),
        }
    }

    async fn post(&self, session: &Session, request: &RpcRequest) -> Result<(u16, String), RpcError> {
        debug!("CRM call {}.{}", request.model, request.method);

        let envelope = Envelope::call(CallParams {
            model: &request.model,
            method: &request.method,
            args: &request.args,
            kwargs: &request.kwargs,
        });

        let response = self
            .session
            .http()
            .post(self.session.config().endpoint(CALL_PATH))
            .header(COOKIE, format!("session_id={}", session.token))
            .json(&envelope)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok((status, body))
    }
}

fn expiry_message(err: &RemoteError) -> String {
    err.best_message().unwrap_or("Session expired").to_string()
}
