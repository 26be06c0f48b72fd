//! Audit middleware for the host gateway
//!
//! Wraps the gateway's services and, for every request whose path is not in
//! the skip list:
//! - Captures method, path, headers and, when its length is known and within
//!   `max_body_bytes`, the body (restored for the inner service)
//! - Resolves host, user agent and client IP
//! - Measures latency around the inner service
//! - Hands the completed request to the [`AuditFormatter`] before returning
//!   the response unchanged

use axum::{
    body::{Body, Bytes},
    extract::{ConnectInfo, Request},
    http::{header, HeaderMap, Uri},
    response::Response,
};
use chrono::Utc;
use futures::future::BoxFuture;
use http_body::Body as _;
use http_body_util::{BodyExt, Limited};
use std::{
    collections::HashSet,
    net::SocketAddr,
    sync::Arc,
    task::{Context, Poll},
    time::Instant,
};
use tower::{Layer, Service};
use tracing::{debug, info, warn};
use venus_common::config::ExtraConfig;

use super::formatter::AuditFormatter;
use super::record::RequestParams;
use crate::config::{AuditConfig, MODULE_NAME};

/// Audit logging layer
#[derive(Clone)]
pub struct AuditLayer {
    formatter: Arc<AuditFormatter>,
    skip_paths: Arc<HashSet<String>>,
}

impl AuditLayer {
    /// The body capture limit comes from the formatter's configuration
    pub fn new(formatter: Arc<AuditFormatter>, skip_paths: Vec<String>) -> Self {
        Self {
            formatter,
            skip_paths: Arc::new(skip_paths.into_iter().collect()),
        }
    }

    /// Build the layer from the gateway configuration blob
    ///
    /// Returns `None` when the venus namespace is absent; the host then keeps
    /// its plain request logging. Must be called within a Tokio runtime.
    pub fn from_extra_config(extra: &ExtraConfig) -> Option<Self> {
        let Some(config) = AuditConfig::from_extra_config(extra) else {
            debug!("{}: no audit configuration found, audit logging disabled", MODULE_NAME);
            return None;
        };

        info!(
            "{}: total skip paths set: {}",
            MODULE_NAME,
            config.skip_paths.len()
        );

        let skip_paths = config.skip_paths.clone();
        Some(Self::new(Arc::new(AuditFormatter::from_config(config)), skip_paths))
    }

    pub fn formatter(&self) -> &Arc<AuditFormatter> {
        &self.formatter
    }
}

impl<S> Layer<S> for AuditLayer {
    type Service = AuditMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuditMiddleware {
            inner,
            formatter: self.formatter.clone(),
            skip_paths: self.skip_paths.clone(),
        }
    }
}

/// Audit middleware service
#[derive(Clone)]
pub struct AuditMiddleware<S> {
    inner: S,
    formatter: Arc<AuditFormatter>,
    skip_paths: Arc<HashSet<String>>,
}

impl<S> Service<Request> for AuditMiddleware<S>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        // The clone is not necessarily ready; swap so the ready one serves
        // this request.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        if self.skip_paths.contains(request.uri().path()) {
            return Box::pin(inner.call(request));
        }

        let formatter = self.formatter.clone();

        Box::pin(async move {
            let start = Instant::now();

            let method = request.method().clone();
            let path = path_with_query(request.uri());
            let headers = request.headers().clone();
            let host = host(&headers, request.uri());
            let user_agent = header_str(&headers, header::USER_AGENT.as_str());
            let client_ip = client_ip(&headers, &request);

            let (parts, body) = request.into_parts();
            let (body, captured) = capture_body(body, formatter.config().max_body_bytes).await;
            if captured.is_none() {
                debug!(method = %method, path = %path, "Request body not captured");
            }

            let request = Request::from_parts(parts, body);
            let response = inner.call(request).await?;

            let params = RequestParams {
                method,
                path,
                status_code: response.status(),
                host,
                user_agent,
                client_ip,
                latency: start.elapsed(),
                timestamp: Utc::now(),
                headers,
                body: captured.unwrap_or_default(),
            };

            formatter.format(&params).await;

            Ok(response)
        })
    }
}

/// Buffer the body when its size is known and at most `limit` bytes
///
/// Returns the body to hand to the inner service and the captured bytes.
/// Streams of unknown or excessive length pass through untouched.
async fn capture_body(body: Body, limit: usize) -> (Body, Option<Bytes>) {
    let limit_bytes = u64::try_from(limit).unwrap_or(u64::MAX);
    match body.size_hint().upper() {
        Some(len) if len <= limit_bytes => {},
        _ => return (body, None),
    }

    match Limited::new(body, limit).collect().await {
        Ok(collected) => {
            let bytes = collected.to_bytes();
            (Body::from(bytes.clone()), Some(bytes))
        },
        Err(e) => {
            warn!(error = %e, "Failed to capture request body");
            (Body::empty(), None)
        },
    }
}

/// Path plus raw query, the way request logs usually show it
fn path_with_query(uri: &Uri) -> String {
    match uri.query() {
        Some(query) if !query.is_empty() => format!("{}?{}", uri.path(), query),
        _ => uri.path().to_string(),
    }
}

fn header_str(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

fn host(headers: &HeaderMap, uri: &Uri) -> String {
    headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| uri.authority().map(|a| a.to_string()))
        .unwrap_or_default()
}

/// First `X-Forwarded-For` hop, then `X-Real-IP`, then the peer address
fn client_ip(headers: &HeaderMap, request: &Request) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());

    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    let real_ip = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());

    if let Some(ip) = real_ip {
        return ip.to_string();
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
        .unwrap_or_default()
}
