//! ============================================================================
//! JSON-RPC Wire Types - Envelopes exchanged with the CRM
//! ============================================================================
//! Request:  { jsonrpc: "2.0", method: "call", params, id }
//! Response: { result } | { error: { code, message, data: { name, message } } }
//! The CRM encodes empty fields as `false`; the helpers below map that to
//! `None` / `Default`.
//! ============================================================================

use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

pub const JSONRPC_VERSION: &str = "2.0";

/// Error code the CRM uses for an expired or unknown session
pub const SESSION_EXPIRED_CODE: i64 = 100;

const SESSION_EXPIRED_MESSAGE: &str = "Session expired";
const SESSION_EXPIRED_EXCEPTION: &str = "SessionExpiredException";

/// Outer JSON-RPC request envelope
#[derive(Debug, Serialize)]
pub struct Envelope<P> {
    pub jsonrpc: &'static str,
    pub method: &'static str,
    pub params: P,
    pub id: u32,
}

impl<P: Serialize> Envelope<P> {
    pub fn call(params: P) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            method: "call",
            params,
            id: rand::random::<u32>() % 1_000_000,
        }
    }
}

/// Params for `/web/session/authenticate`
#[derive(Debug, Serialize)]
pub struct AuthParams<'a> {
    pub db: &'a str,
    pub login: &'a str,
    pub password: &'a str,
}

/// Params for `/web/dataset/call_kw`
#[derive(Debug, Serialize)]
pub struct CallParams<'a> {
    pub model: &'a str,
    pub method: &'a str,
    pub args: &'a [Value],
    pub kwargs: &'a Map<String, Value>,
}

/// Generic JSON-RPC response
#[derive(Debug, Deserialize)]
pub struct Response<T> {
    pub result: Option<T>,
    #[serde(default)]
    pub error: Option<RemoteError>,
}

/// `result` of a successful authentication
#[derive(Debug, Deserialize)]
pub struct AuthResult {
    #[serde(default, deserialize_with = "false_as_none")]
    pub uid: Option<i64>,
    #[serde(default, deserialize_with = "false_as_none")]
    pub session_id: Option<String>,
}

/// Structured error object returned by the CRM
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RemoteError {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<RemoteErrorData>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RemoteErrorData {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl RemoteError {
    /// Most specific message available: `data.message`, then `message`
    pub fn best_message(&self) -> Option<&str> {
        self.data
            .as_ref()
            .and_then(|d| d.message.as_deref())
            .or(self.message.as_deref())
            .filter(|m| !m.is_empty())
    }

    pub fn is_session_expired(&self) -> bool {
        if self.code == Some(SESSION_EXPIRED_CODE) {
            return true;
        }
        let mentions_expiry = |s: &Option<String>| {
            s.as_deref()
                .map(|m| m.contains(SESSION_EXPIRED_MESSAGE))
                .unwrap_or(false)
        };
        if mentions_expiry(&self.message) {
            return true;
        }
        match &self.data {
            Some(data) => {
                mentions_expiry(&data.message)
                    || data
                        .name
                        .as_deref()
                        .map(|n| n.ends_with(SESSION_EXPIRED_EXCEPTION))
                        .unwrap_or(false)
            }
            None => false,
        }
    }
}

/// A many2one reference, encoded by the CRM as `[id, display_name]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "(i64, String)", into = "(i64, String)")]
pub struct Many2One {
    pub id: i64,
    pub name: String,
}

impl From<(i64, String)> for Many2One {
    fn from((id, name): (i64, String)) -> Self {
        Self { id, name }
    }
}

impl From<Many2One> for (i64, String) {
    fn from(m: Many2One) -> Self {
        (m.id, m.name)
    }
}

/// Deserialize an optional field where the CRM sends `false` for "unset"
pub fn false_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    match Value::deserialize(deserializer)? {
        Value::Null | Value::Bool(false) => Ok(None),
        other => serde_json::from_value(other).map(Some).map_err(D::Error::custom),
    }
}

/// Like [`false_as_none`] but falls back to `T::default()`
pub fn false_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    Ok(false_as_none(deserializer)?.unwrap_or_default())
}

/// Extract the `session_id` value from a `Set-Cookie` header
pub fn session_cookie(set_cookie: &str) -> Option<String> {
    set_cookie
        .split(';')
        .next()
        .and_then(|pair| pair.trim().strip_prefix("session_id="))
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
