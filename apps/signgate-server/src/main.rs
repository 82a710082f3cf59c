//! SignGate Server - request signature verification in front of an upstream.
//!
//! The server accepts requests, establishes the caller identity from a
//! trusted header set by the authentication stage in front of it, verifies
//! the request parameter signature, and forwards verified requests to a
//! single upstream.
//!
//! # Usage
//!
//! ```text
//! REGISTRY_URL=http://registry:8233 UPSTREAM_URL=http://api:8080 signgate-server
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `GATEWAY_LISTEN` | `0.0.0.0:8888` | Bind address |
//! | `CHECK_SIGNATURE` | `true` | Enable signature checking |
//! | `SIGNATURE_EXEMPT_PATHS` | `/**/login/**,/**/logout/**` | Exempt ANT patterns |
//! | `REGISTRY_URL` | *(unset)* | Application registry base URL |
//! | `REGISTRY_TIMEOUT_MS` | `3000` | Registry lookup bound |
//! | `SIGNATURE_TIMESTAMP_TOLERANCE_SECS` | `300` | Accepted clock skew, `0` disables |
//! | `MAX_BODY_BYTES` | `1048576` | Body buffering limit |
//! | `UPSTREAM_URL` | `http://127.0.0.1:8080` | Forwarding target |
//! | `IDENTITY_HEADER` | `x-auth-app-id` | Header carrying the authenticated app id |
//! | `STATIC_APPS` | *(unset)* | `id:secret,...` used when `REGISTRY_URL` is unset |
//! | `LOG_LEVEL` | `info` | Log level filter |
//! | `LOG_FORMAT` | `text` | `json` for JSON-lines output |
//! | `RUST_LOG` | *(unset)* | Fine-grained tracing filter (overrides `LOG_LEVEL`) |

mod gateway;
mod identity;
mod upstream;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as HttpConnBuilder;
use hyper_util::server::graceful::GracefulShutdown;
use signgate_auth::{
    ApplicationRegistry, CredentialResolver, HttpApplicationRegistry, StaticApplicationRegistry,
};
use signgate_core::SignGateConfig;
use signgate_http::{FilterSettings, SignatureFilter, SignatureService};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::gateway::GatewayService;
use crate::identity::IdentityHeader;
use crate::upstream::UpstreamService;

/// Server version reported in health check responses.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Bound on the whole `--health-check` exchange.
const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` takes precedence over `LOG_LEVEL`. With `LOG_FORMAT=json` every
/// event is written as one JSON line.
fn init_tracing(config: &SignGateConfig) -> Result<()> {
    let filter = match std::env::var("RUST_LOG") {
        Ok(directives) => EnvFilter::try_new(&directives)
            .with_context(|| format!("invalid RUST_LOG filter: {directives}"))?,
        Err(_) => EnvFilter::try_new(&config.log_level)
            .with_context(|| format!("invalid LOG_LEVEL filter: {}", config.log_level))?,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    if config.log_json {
        builder.json().init();
    } else {
        builder.init();
    }

    Ok(())
}

/// Pick the application registry: the remote one when `REGISTRY_URL` is set,
/// otherwise the in-memory `STATIC_APPS`.
fn build_registry(config: &SignGateConfig) -> Result<Arc<dyn ApplicationRegistry>> {
    if let Some(url) = &config.registry_url {
        info!(registry_url = %url, "using remote application registry");
        let registry = HttpApplicationRegistry::new(url.as_str(), config.registry_timeout)
            .context("failed to build registry client")?;
        return Ok(Arc::new(registry));
    }

    if config.static_apps.is_empty() {
        warn!("no REGISTRY_URL or STATIC_APPS configured, every signed request will be denied");
    }
    info!(
        applications = config.static_apps.len(),
        "using in-memory application registry"
    );
    Ok(Arc::new(StaticApplicationRegistry::new(
        config.static_apps.clone(),
    )))
}

/// Assemble the full request pipeline from `config`.
fn build_gateway(config: &SignGateConfig) -> Result<GatewayService> {
    let registry = build_registry(config)?;
    let resolver = CredentialResolver::new(registry, config.registry_timeout);
    let filter = SignatureFilter::new(FilterSettings::from(config), resolver)
        .context("invalid signature exemption pattern")?;

    let upstream = UpstreamService::new(&config.upstream_url)
        .context("failed to build upstream client")?;
    let identity = IdentityHeader::new(&config.identity_header)
        .with_context(|| format!("invalid IDENTITY_HEADER: {}", config.identity_header))?;

    Ok(GatewayService::new(
        identity,
        SignatureService::new(upstream, Arc::new(filter)),
    ))
}

/// Accept connections until `shutdown` resolves, then drain in-flight requests.
///
/// A request that is still being verified when shutdown starts either
/// completes normally or is dropped with its connection; it is never
/// forwarded half-checked.
async fn serve(
    listener: TcpListener,
    gateway: GatewayService,
    shutdown: impl Future<Output = ()>,
) -> Result<()> {
    let graceful = GracefulShutdown::new();
    let http = HttpConnBuilder::new(TokioExecutor::new());
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer_addr) = match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(error = %e, "failed to accept connection");
                        continue;
                    }
                };
                debug!(%peer_addr, "accepted connection");

                let conn = http.serve_connection(TokioIo::new(stream), gateway.clone());
                let conn = graceful.watch(conn.into_owned());
                tokio::spawn(async move {
                    if let Err(e) = conn.await {
                        error!(%peer_addr, error = %e, "connection error");
                    }
                });
            }

            () = &mut shutdown => break,
        }
    }

    info!("stopped accepting connections, draining in-flight requests");
    graceful.shutdown().await;
    info!("all connections drained");

    Ok(())
}

/// Resolve on Ctrl-C, or on SIGTERM from a container runtime.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received Ctrl-C"),
        () = terminate => info!("received SIGTERM"),
    }
}

/// Check the gateway at `addr`: `GET /health` must answer `200` with a body
/// reporting `"status": "running"`.
async fn run_health_check(addr: &str) -> Result<()> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    let exchange = async {
        let mut stream = TcpStream::connect(addr)
            .await
            .with_context(|| format!("cannot connect to {addr}"))?;
        let request =
            format!("GET /health HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).await?;

        let mut response = String::new();
        stream.read_to_string(&mut response).await?;
        anyhow::Ok(response)
    };
    let response = tokio::time::timeout(HEALTH_CHECK_TIMEOUT, exchange)
        .await
        .with_context(|| format!("no health response from {addr}"))??;

    let (head, body) = response
        .split_once("\r\n\r\n")
        .with_context(|| format!("truncated health response from {addr}"))?;
    let status_line = head.lines().next().unwrap_or_default();
    anyhow::ensure!(
        status_line.split_whitespace().nth(1) == Some("200"),
        "unhealthy status from {addr}: {status_line}"
    );

    let health: serde_json::Value =
        serde_json::from_str(body.trim()).context("health response is not JSON")?;
    anyhow::ensure!(
        health["status"] == "running",
        "gateway at {addr} reports {health}"
    );

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = SignGateConfig::from_env();

    // Handle --health-check flag for Docker HEALTHCHECK.
    if std::env::args().any(|a| a == "--health-check") {
        let addr = config.gateway_listen.replace("0.0.0.0", "127.0.0.1");
        let healthy = run_health_check(&addr).await.is_ok();
        std::process::exit(i32::from(!healthy));
    }

    init_tracing(&config)?;

    let gateway = build_gateway(&config)?;

    let addr: SocketAddr = config
        .gateway_listen
        .parse()
        .with_context(|| format!("invalid bind address: {}", config.gateway_listen))?;

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;

    info!(
        %addr,
        upstream = %config.upstream_url,
        check_signature = config.check_signature_enabled,
        exempt_paths = ?config.exempt_path_patterns,
        version = VERSION,
        "starting SignGate Server",
    );

    serve(listener, gateway, shutdown_signal()).await
}
