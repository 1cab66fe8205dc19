//! Heuristics over provider error bodies.
//!
//! Providers return errors as JSON of varying shape or as plain text. Everything
//! that sniffs those bodies lives here so the state machines only see the
//! resulting [`ProviderFailure`].

use serde_json::Value;

/// Body signature of a 404 meaning the model has no route for this account.
pub const MODEL_UNAVAILABLE_SIGNATURE: &str = "No matching route";

/// Gateway failure code that earns a follow-up one retry.
///
/// TODO: decide whether 503 and 504 should also retry; only 502 is retried today.
pub const TRANSIENT_CODE: u16 = 502;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderFailure {
    /// HTTP status of the response.
    pub status: u16,
    /// Application code from the body when present, otherwise `status`.
    pub code: u16,
    /// `error.message`, then `message`, then `API error <status>`.
    pub message: String,
    /// Raw body as received.
    pub body: String,
}

impl ProviderFailure {
    pub fn classify(status: u16, body: &str) -> Self {
        let parsed = serde_json::from_str::<Value>(body).ok();
        let code = parsed.as_ref().and_then(body_code).unwrap_or(status);
        let message = parsed
            .as_ref()
            .and_then(body_message)
            .unwrap_or_else(|| format!("API error {}", status));

        Self {
            status,
            code,
            message,
            body: body.to_string(),
        }
    }

    /// The model is not provisioned for this account: a 404 whose body, raw
    /// or re-encoded from JSON, contains the no-route signature.
    pub fn is_model_unavailable(&self) -> bool {
        if self.status != 404 {
            return false;
        }
        if self.body.contains(MODEL_UNAVAILABLE_SIGNATURE) {
            return true;
        }
        serde_json::from_str::<Value>(&self.body)
            .map(|v| v.to_string().contains(MODEL_UNAVAILABLE_SIGNATURE))
            .unwrap_or(false)
    }

    /// A 502 from either the HTTP status or the application code.
    pub fn is_transient(&self) -> bool {
        self.status == TRANSIENT_CODE || self.code == TRANSIENT_CODE
    }

    /// Text surfaced verbatim for reasoning failures.
    pub fn verbatim(&self) -> String {
        if self.body.trim().is_empty() {
            format!("Reasoning API error {}", self.status)
        } else {
            self.body.clone()
        }
    }
}

fn body_code(body: &Value) -> Option<u16> {
    [
        body.get("code"),
        body.get("status"),
        body.get("error").and_then(|e| e.get("code")),
    ]
    .into_iter()
    .flatten()
    .find_map(numeric_code)
}

fn numeric_code(value: &Value) -> Option<u16> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn body_message(body: &Value) -> Option<String> {
    [
        body.get("error").and_then(|e| e.get("message")),
        body.get("message"),
    ]
    .into_iter()
    .flatten()
    .find_map(|v| v.as_str())
    .filter(|s| !s.trim().is_empty())
    .map(str::to_string)
}
