//! Venus Gateway - demo host for the audit layer

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    http::{Method, StatusCode, Uri},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use clap::Parser;
use serde_json::json;
use std::{
    future::{Future, IntoFuture},
    net::SocketAddr,
    path::PathBuf,
    time::Duration,
};
use tokio::{signal, sync::oneshot};
use tracing::{info, warn};
use venus_common::{
    config::load_extra_config,
    logging::{init_logging, LogConfig},
};

use venus_audit::{audit::AuditLayer, middleware, AuditError};

/// Minimal gateway wired with the Venus audit layer
#[derive(Parser, Debug)]
#[command(name = "venus-gateway")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Gateway configuration file (JSON, TOML or YAML)
    #[arg(short, long, env = "VENUS_CONFIG")]
    config: PathBuf,

    /// Address to listen on
    #[arg(short, long, env = "VENUS_BIND", default_value = "127.0.0.1:8080")]
    bind: SocketAddr,

    /// Seconds to wait for in-flight requests after a shutdown signal
    #[arg(long, default_value_t = 5)]
    shutdown_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let extra = load_extra_config(&args.config)
        .map_err(AuditError::from)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;

    init_logging(&LogConfig::from_extra_config(&extra))?;

    info!("Starting Venus gateway");

    let app = create_router();
    let app = match AuditLayer::from_extra_config(&extra) {
        Some(audit) => {
            info!(sink = %audit.formatter().config().sink, "Audit logging enabled");
            app.layer(audit)
        },
        None => {
            info!("Audit logging disabled, using plain request logging");
            app.layer(middleware::tracing_layer())
        },
    };

    let listener = tokio::net::TcpListener::bind(args.bind).await?;
    info!("Gateway listening on {}", args.bind);

    serve(
        listener,
        app,
        shutdown_signal(),
        Duration::from_secs(args.shutdown_timeout_secs),
    )
    .await
}

/// Serve until `shutdown` resolves, then give in-flight requests at most
/// `drain` to finish
async fn serve(
    listener: tokio::net::TcpListener,
    app: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
    drain: Duration,
) -> Result<()> {
    let (signalled_tx, signalled_rx) = oneshot::channel();
    let server = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async move {
            shutdown.await;
            let _ = signalled_tx.send(());
        })
        .into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => result?,
        _ = signalled_rx => {
            info!("Waiting up to {:?} for connections to close", drain);

            match tokio::time::timeout(drain, &mut server).await {
                Ok(result) => result?,
                Err(_) => {
                    warn!("Connections still open after {:?}, shutting down anyway", drain);
                    return Ok(());
                },
            }
        },
    }

    info!("Gateway shut down gracefully");

    Ok(())
}

fn create_router() -> Router {
    Router::new()
        .route("/health", get(health_check))
        .fallback(echo)
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}

/// Stands in for a proxied backend
async fn echo(method: Method, uri: Uri, body: Bytes) -> impl IntoResponse {
    let body = serde_json::from_slice::<serde_json::Value>(&body)
        .unwrap_or_else(|_| json!(String::from_utf8_lossy(&body)));

    (
        StatusCode::OK,
        Json(json!({
            "method": method.as_str(),
            "path": uri.path(),
            "body": body,
        })),
    )
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::time::Instant;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn listener() -> (tokio::net::TcpListener, SocketAddr) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        (listener, addr)
    }

    #[tokio::test]
    async fn test_idle_server_stops_as_soon_as_signalled() {
        let (listener, _) = listener().await;
        let started = Instant::now();

        serve(listener, create_router(), async {}, Duration::from_secs(30))
            .await
            .unwrap();

        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_in_flight_requests_finish_within_drain() {
        let (listener, addr) = listener().await;
        let app = Router::new().route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                "done"
            }),
        );
        let (trigger_tx, trigger_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(serve(
            listener,
            app,
            async move {
                let _ = trigger_rx.await;
            },
            Duration::from_secs(10),
        ));

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /slow HTTP/1.1\r\nHost: gateway\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger_tx.send(()).unwrap();

        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.ends_with("done"));

        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_drain_is_bounded() {
        let (listener, addr) = listener().await;
        let app = Router::new().route(
            "/stuck",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                "late"
            }),
        );
        let (trigger_tx, trigger_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(serve(
            listener,
            app,
            async move {
                let _ = trigger_rx.await;
            },
            Duration::from_millis(200),
        ));

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /stuck HTTP/1.1\r\nHost: gateway\r\n\r\n")
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let started = Instant::now();
        trigger_tx.send(()).unwrap();
        server.await.unwrap().unwrap();

        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
