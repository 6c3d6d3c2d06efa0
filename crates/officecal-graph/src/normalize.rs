//! Conversion of raw responses and transport failures into [`GraphError`].
//!
//! This is the single decode boundary: a response is inspected here exactly
//! once, and either decoded into JSON or turned into one normalized error.
//! Nothing downstream re-interprets status codes or error bodies.

use std::time::Duration;

use chrono::{DateTime, Utc};
use officecal_core::{GraphError, GraphResult};
use serde::Deserialize;
use serde_json::Value;

use crate::http::{HttpResponse, TransportError};

/// Graph error envelope: `{"error": {"code", "message", "innerError": {...}}}`.
///
/// Every field is optional so partially-formed bodies still yield whatever
/// they contain.
#[derive(Debug, Default, Deserialize)]
struct ErrorEnvelope {
    error: Option<ErrorField>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorField {
    Object(ErrorBody),
    Code(String),
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    code: Option<String>,
    message: Option<String>,
    inner_error: Option<InnerError>,
}

#[derive(Debug, Default, Deserialize)]
struct InnerError {
    #[serde(rename = "request-id")]
    request_id: Option<String>,
    #[serde(rename = "client-request-id")]
    client_request_id: Option<String>,
}

/// Converts a non-2xx response into a normalized error.
pub fn error_from_response(response: &HttpResponse, retryable: &[u16]) -> GraphError {
    let envelope: ErrorEnvelope = serde_json::from_slice(&response.body).unwrap_or_default();

    let (code, message, inner) = match envelope.error {
        Some(ErrorField::Object(body)) => (body.code, body.message, body.inner_error),
        Some(ErrorField::Code(code)) => (Some(code), None, None),
        None => (None, None, None),
    };

    let message = message
        .or(envelope.message)
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| generic_message(response.status));

    let request_id = inner
        .and_then(|inner| inner.request_id.or(inner.client_request_id))
        .or_else(|| response.header("request-id").map(String::from))
        .or_else(|| response.header("x-ms-request-id").map(String::from))
        .or_else(|| response.header("client-request-id").map(String::from));

    let mut err = GraphError::from_status(response.status, retryable, message);
    if let Some(code) = code {
        err = err.with_code(code);
    }
    if let Some(request_id) = request_id {
        err = err.with_request_id(request_id);
    }
    if let Some(retry_after) = response
        .header("retry-after")
        .and_then(|value| parse_retry_after(value, Utc::now()))
    {
        err = err.with_retry_after(retry_after);
    }
    err
}

/// Converts a transport failure into a normalized (transient) error.
pub fn error_from_transport(err: TransportError) -> GraphError {
    GraphError::transient(err.to_string()).with_source(err)
}

/// Decodes a 2xx response body.
///
/// Empty bodies (e.g. `202 Accepted` from `/cancel`, `204 No Content` from a
/// delete) decode to an empty JSON object.
pub fn decode_success(response: &HttpResponse) -> GraphResult<Value> {
    if response.status == 204 || response.body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_slice(&response.body).map_err(|e| {
        GraphError::invalid_response(format!("failed to parse response body: {}", e))
            .with_status(response.status)
            .with_source(e)
    })
}

/// Parses a `Retry-After` value: delta-seconds or an HTTP-date.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?;
    Some(
        (at.with_timezone(&Utc) - now)
            .to_std()
            .unwrap_or(Duration::ZERO),
    )
}

fn generic_message(status: u16) -> String {
    let reason = match status {
        400 => "bad request",
        401 => "access token rejected",
        403 => "access denied",
        404 => "resource not found",
        409 => "conflict",
        410 => "resource no longer available",
        429 => "too many requests",
        500 => "internal server error",
        502 => "bad gateway",
        503 => "service unavailable",
        504 => "gateway timeout",
        _ => "request failed",
    };
    format!("HTTP {}: {}", status, reason)
}
