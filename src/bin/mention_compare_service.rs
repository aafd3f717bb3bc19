//! HTTP front end for mention comparison.
//!
//! Serves the routes of [`mention_compare::service`] with access logging,
//! `x-request-id` propagation and graceful shutdown on Ctrl+C or SIGTERM.
//!
//! ## Environment
//!
//! | Variable     | Default   | Meaning                                  |
//! |--------------|-----------|------------------------------------------|
//! | `HOST`       | `0.0.0.0` | Bind address                             |
//! | `PORT`       | `8002`    | Bind port                                |
//! | `LOG_FORMAT` | `json`    | `json` or `pretty`                       |
//! | `RUST_LOG`   | see below | `tracing_subscriber::EnvFilter` override |
//!
//! ```bash
//! LOG_FORMAT=pretty cargo run --bin mention_compare_service --features service
//! ```

use std::net::SocketAddr;
use std::time::Instant;

use axum::{
    extract::Request,
    http::HeaderValue,
    middleware::{self, Next},
    response::Response,
};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, info_span, Instrument};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use mention_compare::service::{create_router, metrics_middleware, ConfigRegistry, ServiceState};

const DEFAULT_FILTER: &str = "mention_compare_service=info,mention_compare=info,tower_http=info";
const REQUEST_ID: &str = "x-request-id";

/// Process settings read from the environment.
#[derive(Debug, Clone)]
struct ServiceSettings {
    host: String,
    port: u16,
    json_logs: bool,
}

impl ServiceSettings {
    fn from_env() -> Self {
        let env = |key: &str| std::env::var(key).ok();
        Self {
            host: env("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: env("PORT").and_then(|p| p.parse().ok()).unwrap_or(8002),
            json_logs: env("LOG_FORMAT").map_or(true, |f| f != "pretty"),
        }
    }

    fn bind_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }
}

fn init_tracing(settings: &ServiceSettings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into());
    let registry = tracing_subscriber::registry().with(filter);

    if settings.json_logs {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .flatten_event(true),
            )
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_span_events(FmtSpan::CLOSE))
            .init();
    }
}

/// Tags each request with an id, runs it inside a span and logs the outcome.
///
/// A caller-supplied `x-request-id` is kept, otherwise a v4 UUID is minted.
/// Either way the id is echoed on the response.
async fn access_log(mut request: Request, next: Next) -> Response {
    let started = Instant::now();

    let request_id = request
        .headers()
        .get(REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let header = HeaderValue::from_str(&request_id).ok();
    if let Some(value) = header.clone() {
        request.headers_mut().insert(REQUEST_ID, value);
    }

    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let span = info_span!(
        "request",
        request_id = %request_id,
        method = %method,
        path = %path,
        status = tracing::field::Empty,
        latency_ms = tracing::field::Empty,
    );

    let mut response = next.run(request).instrument(span.clone()).await;

    let status = response.status().as_u16();
    let latency_ms = started.elapsed().as_millis() as u64;
    span.record("status", status);
    span.record("latency_ms", latency_ms);

    if let Some(value) = header {
        response.headers_mut().insert(REQUEST_ID, value);
    }

    info!(
        target: "mention_compare_service::access",
        request_id = %request_id,
        method = %method,
        path = %path,
        status = status,
        latency_ms = latency_ms,
        "request completed"
    );

    response
}

async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Cannot listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => info!(signal = "SIGINT", "Shutting down"),
        _ = terminate => info!(signal = "SIGTERM", "Shutting down"),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let settings = ServiceSettings::from_env();
    init_tracing(&settings);

    let version = env!("CARGO_PKG_VERSION");
    info!(
        version = version,
        build_sha = option_env!("BUILD_SHA").unwrap_or("dev"),
        schema_version = mention_compare::MENTION_COMPARE_SCHEMA_VERSION,
        "Starting mention comparison service"
    );

    let registry = ConfigRegistry::with_defaults();
    info!(
        configs = registry.len(),
        registry_fingerprint = %registry.fingerprint(),
        "Loaded comparison configs"
    );

    let app = create_router(ServiceState::with_registry(registry))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(access_log))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    let addr = settings.bind_addr()?;
    let listener = TcpListener::bind(addr).await?;
    info!(address = %addr, version = version, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Service stopped");
    Ok(())
}
