//! Shared fixtures for the wiremock-backed CRM tests

use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::config::CrmConfig;

pub fn test_config(base_url: &str) -> CrmConfig {
    CrmConfig::new(base_url, "yourcar", "ops@example.com", "secret")
}

pub fn auth_ok(token: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "jsonrpc": "2.0",
        "id": 1,
        "result": {"uid": 2, "session_id": token}
    }))
}

pub fn rpc_result(result: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "jsonrpc": "2.0",
        "id": 1,
        "result": result
    }))
}

pub fn rpc_error(code: i64, message: &str, data_message: Option<&str>) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "jsonrpc": "2.0",
        "id": 1,
        "error": {
            "code": code,
            "message": message,
            "data": {"name": "odoo.exceptions.UserError", "message": data_message}
        }
    }))
}

pub fn session_expired() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "jsonrpc": "2.0",
        "id": 1,
        "error": {
            "code": 100,
            "message": "Odoo Session Expired",
            "data": {"name": "odoo.http.SessionExpiredException", "message": "Session expired"}
        }
    }))
}

/// Accept any authentication and hand out `token`
pub async fn mount_auth(server: &MockServer, token: &str) {
    Mock::given(method("POST"))
        .and(path("/web/session/authenticate"))
        .respond_with(auth_ok(token))
        .mount(server)
        .await;
}

/// Answer `model.method` calls with `response`
pub async fn mount_call(server: &MockServer, model: &str, rpc_method: &str, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path("/web/dataset/call_kw"))
        .and(body_partial_json(json!({
            "params": {"model": model, "method": rpc_method}
        })))
        .respond_with(response)
        .mount(server)
        .await;
}
