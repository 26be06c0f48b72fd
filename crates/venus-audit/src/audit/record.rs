//! Canonical audit record built from a completed request

use std::time::Duration;

use axum::body::Bytes;
use chrono::{DateTime, FixedOffset, Utc};
use http::{header::AUTHORIZATION, HeaderMap, Method, StatusCode};
use serde::Serialize;
use serde_json::{json, Map, Value as JsonValue};

/// Prefix removed from the `Authorization` header to obtain the client token
pub const BEARER_PREFIX: &str = "Bearer ";

/// Offset of the reference time zone audit timestamps are stored in
/// (Asia/Jakarta, which observes no daylight saving time).
pub const REFERENCE_UTC_OFFSET_SECS: i32 = 7 * 3600;

/// Per-request fields handed over by the host middleware
#[derive(Debug, Clone)]
pub struct RequestParams {
    pub method: Method,
    /// Request path, including `?query` when present
    pub path: String,
    pub status_code: StatusCode,
    pub host: String,
    pub user_agent: String,
    pub client_ip: String,
    pub latency: Duration,
    /// Time the response was completed
    pub timestamp: DateTime<Utc>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// One audit entry, created and dropped within a single request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<FixedOffset>,
    /// Bearer token without its prefix; empty when no `Authorization`
    /// header was sent
    pub client_token: String,
    pub method: String,
    pub path: String,
    pub status_code: u16,
    /// `{"data": {...}}` payload persisted as JSON and sent to the sinks
    pub details: JsonValue,
}

impl AuditRecord {
    pub fn build(params: &RequestParams) -> Self {
        Self {
            timestamp: normalize_timestamp(params.timestamp, reference_offset()),
            client_token: client_token(&params.headers),
            method: params.method.to_string(),
            path: params.path.clone(),
            status_code: params.status_code.as_u16(),
            details: details(params),
        }
    }

    /// The structured payload forwarded to the logging sinks
    pub fn payload(&self) -> &JsonValue {
        &self.details
    }
}

/// Reference zone offset, `None` if it cannot be represented
pub fn reference_offset() -> Option<FixedOffset> {
    FixedOffset::east_opt(REFERENCE_UTC_OFFSET_SECS)
}

/// Convert to the reference zone, keeping the UTC instant unchanged when no
/// zone is available
pub fn normalize_timestamp(
    timestamp: DateTime<Utc>,
    offset: Option<FixedOffset>,
) -> DateTime<FixedOffset> {
    match offset {
        Some(offset) => timestamp.with_timezone(&offset),
        None => timestamp.fixed_offset(),
    }
}

/// Extract the client token from every `Authorization` header value
///
/// Duplicate headers are joined with `", "` before every `"Bearer "`
/// occurrence is stripped.
pub fn client_token(headers: &HeaderMap) -> String {
    let values: Vec<String> = headers
        .get_all(AUTHORIZATION)
        .iter()
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
        .collect();

    if values.is_empty() {
        return String::new();
    }

    values.join(", ").replace(BEARER_PREFIX, "")
}

fn details(params: &RequestParams) -> JsonValue {
    let latency = u64::try_from(params.latency.as_nanos()).unwrap_or(u64::MAX);

    json!({
        "data": {
            "method": params.method.as_str(),
            "host": params.host,
            "path": params.path,
            "status_code": params.status_code.as_u16(),
            "user_agent": params.user_agent,
            "client_ip": params.client_ip,
            "latency": latency,
            "response_timestamp": params.timestamp.to_rfc3339(),
            "body": body_snapshot(&params.body),
            "header": header_snapshot(&params.headers),
        }
    })
}

/// JSON bodies are embedded as-is, anything else as (lossy) text
fn body_snapshot(body: &Bytes) -> JsonValue {
    if body.is_empty() {
        return JsonValue::Null;
    }

    serde_json::from_slice(body)
        .unwrap_or_else(|_| JsonValue::String(String::from_utf8_lossy(body).into_owned()))
}

fn header_snapshot(headers: &HeaderMap) -> JsonValue {
    let mut snapshot = Map::new();

    for name in headers.keys() {
        let values = headers
            .get_all(name)
            .iter()
            .map(|value| JsonValue::String(String::from_utf8_lossy(value.as_bytes()).into_owned()))
            .collect();
        snapshot.insert(name.as_str().to_string(), JsonValue::Array(values));
    }

    JsonValue::Object(snapshot)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use http::HeaderValue;

    fn params() -> RequestParams {
        RequestParams {
            method: Method::GET,
            path: "/orders".to_string(),
            status_code: StatusCode::CREATED,
            host: "gateway.local".to_string(),
            user_agent: "curl/8.0".to_string(),
            client_ip: "10.0.0.7".to_string(),
            latency: Duration::from_millis(12),
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 20, 30, 0).unwrap(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    #[test]
    fn test_bearer_token_is_stripped() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc123"));
        assert_eq!(client_token(&headers), "abc123");
    }

    #[test]
    fn test_missing_authorization_yields_empty_token() {
        assert_eq!(client_token(&HeaderMap::new()), "");
    }

    #[test]
    fn test_non_bearer_authorization_is_kept() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic dXNlcjpwYXNz"));
        assert_eq!(client_token(&headers), "Basic dXNlcjpwYXNz");
    }

    #[test]
    fn test_duplicate_authorization_headers() {
        let mut headers = HeaderMap::new();
        headers.append(AUTHORIZATION, HeaderValue::from_static("Bearer one"));
        headers.append(AUTHORIZATION, HeaderValue::from_static("Bearer two"));
        assert_eq!(client_token(&headers), "one, two");
    }

    #[test]
    fn test_timestamp_normalized_to_reference_zone() {
        let record = AuditRecord::build(&params());

        assert_eq!(record.timestamp.offset().local_minus_utc(), REFERENCE_UTC_OFFSET_SECS);
        assert_eq!(record.timestamp.to_rfc3339(), "2024-03-02T03:30:00+07:00");
        assert_eq!(record.timestamp, params().timestamp);
    }

    #[test]
    fn test_timestamp_falls_back_without_zone() {
        let timestamp = params().timestamp;
        let normalized = normalize_timestamp(timestamp, None);

        assert_eq!(normalized.offset().local_minus_utc(), 0);
        assert_eq!(normalized, timestamp);
    }

    #[test]
    fn test_record_scalars() {
        let mut params = params();
        params
            .headers
            .insert(AUTHORIZATION, HeaderValue::from_static("Bearer xyz"));

        let record = AuditRecord::build(&params);

        assert_eq!(record.client_token, "xyz");
        assert_eq!(record.method, "GET");
        assert_eq!(record.path, "/orders");
        assert_eq!(record.status_code, 201);
    }

    #[test]
    fn test_details_contain_all_fields_with_empty_body_and_headers() {
        let record = AuditRecord::build(&params());
        let data = &record.details["data"];

        for field in [
            "method",
            "host",
            "path",
            "status_code",
            "user_agent",
            "client_ip",
            "latency",
            "response_timestamp",
            "body",
            "header",
        ] {
            assert!(data.get(field).is_some(), "missing field {field}");
        }

        assert_eq!(data["status_code"], json!(201));
        assert_eq!(data["latency"], json!(12_000_000u64));
        assert_eq!(data["body"], JsonValue::Null);
        assert_eq!(data["header"], json!({}));
        assert_eq!(record.client_token, "");
    }

    #[test]
    fn test_json_body_is_embedded() {
        let mut params = params();
        params.body = Bytes::from_static(br#"{"item":"book","qty":2}"#);

        let record = AuditRecord::build(&params);
        assert_eq!(record.details["data"]["body"], json!({"item": "book", "qty": 2}));
    }

    #[test]
    fn test_non_json_body_is_kept_as_text() {
        let mut params = params();
        params.body = Bytes::from_static(b"plain \xff text");

        let record = AuditRecord::build(&params);
        assert_eq!(record.details["data"]["body"], json!("plain \u{fffd} text"));
    }

    #[test]
    fn test_header_snapshot_keeps_every_value() {
        let mut params = params();
        params
            .headers
            .append("x-trace", HeaderValue::from_static("a"));
        params
            .headers
            .append("x-trace", HeaderValue::from_static("b"));
        params
            .headers
            .insert(http::header::USER_AGENT, HeaderValue::from_static("curl/8.0"));

        let record = AuditRecord::build(&params);
        let header = &record.details["data"]["header"];

        assert_eq!(header["x-trace"], json!(["a", "b"]));
        assert_eq!(header["user-agent"], json!(["curl/8.0"]));
    }
}
