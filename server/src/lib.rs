use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::DefaultBodyLimit,
    http::Request,
    middleware,
    routing::{delete, get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{
    classify::ServerErrorsFailureClass,
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing::Span;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;

pub mod batch;
pub mod config;
pub mod context;
pub mod disk;
pub mod domain;
pub mod error;
pub mod file_reply;
mod handlers;
pub mod pipeline;
pub mod rate_limit;
pub mod retry;
pub mod sweeper;
pub mod transform;
pub mod upload;

extern crate serde;

#[cfg(test)] // <-- not needed in integration tests
extern crate rstest;

use crate::config::Config;
use crate::disk::{DiskStorage, DOWNLOADS_PREFIX};
use crate::domain::Storage;
use crate::rate_limit::RateLimiter;
use crate::retry::RetryPolicy;
use crate::sweeper::Sweeper;

/// Shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub storage: Arc<dyn Storage>,
    pub sweeper: Arc<Sweeper>,
    pub retry: RetryPolicy,
}

impl AppState {
    #[must_use]
    pub fn new(config: Config) -> Self {
        let storage = DiskStorage::new(&config.temp_dir, &config.base_url);
        Self::with_storage(config, Arc::new(storage))
    }

    /// State over a custom storage backend. The sweeper works on its root.
    #[must_use]
    pub fn with_storage(config: Config, storage: Arc<dyn Storage>) -> Self {
        let sweeper = Sweeper::new(storage.root(), config.retention());
        Self {
            config: Arc::new(config),
            storage,
            sweeper: Arc::new(sweeper),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::compress,
        handlers::compress_batch,
        handlers::cleanup,
        handlers::stats,
        handlers::health,
    ),
    components(responses(file_reply::ImageReply)),
    tags(
        (name = "compression", description = "Image compression API"),
        (name = "admin", description = "Storage maintenance and health")
    )
)]
pub struct ApiDoc;

pub async fn run(config: Config) -> io::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "imgpress=debug,server=debug,tower_http=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let socket = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(socket).await?;
    tracing::info!("listening on {}", listener.local_addr()?);

    serve(listener, AppState::new(config), shutdown_signal()).await
}

/// Serves the API on `listener` until `shutdown` resolves, sweeping in the
/// background meanwhile.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    state.storage.ensure_ready().await.map_err(io::Error::other)?;

    let token = CancellationToken::new();
    let sweeper = Arc::clone(&state.sweeper).spawn(state.config.cleanup_interval, token.clone());

    let app = create_routes(state);
    let result = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await;

    token.cancel();
    sweeper.await.map_err(io::Error::other)?;
    result
}

const REQUEST_ID_HEADER: &str = "x-request-id";

pub fn create_routes(state: AppState) -> Router {
    let limiter = Arc::new(RateLimiter::new(
        state.config.rate_limit_window,
        state.config.rate_limit_max,
    ));
    let body_limit = state.config.request_body_limit();
    let downloads = ServeDir::new(state.storage.root());

    Router::new()
        .route("/compress", post(handlers::compress))
        .route("/compress/batch", post(handlers::compress_batch))
        .route("/admin/cleanup", delete(handlers::cleanup))
        .route("/admin/stats", get(handlers::stats))
        .route("/health", get(handlers::health))
        .route("/api-docs/openapi.json", get(handlers::openapi))
        .nest_service(DOWNLOADS_PREFIX, downloads)
        .with_state(state)
        .layer(middleware::from_fn_with_state(limiter, rate_limit::limit))
        .layer(
            ServiceBuilder::new()
                .layer(middleware::map_request(discard_client_request_id))
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(|request: &Request<Body>| {
                            let request_id = request
                                .extensions()
                                .get::<RequestId>()
                                .and_then(|id| id.header_value().to_str().ok())
                                .unwrap_or("unknown");
                            tracing::info_span!(
                                "request",
                                request_id,
                                method = %request.method(),
                                uri = %request.uri(),
                            )
                        })
                        .on_failure(
                            |error: ServerErrorsFailureClass, _latency: Duration, _span: &Span| {
                                tracing::error!("Server error: {error}");
                            },
                        ),
                )
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(CorsLayer::permissive())
                .layer(DefaultBodyLimit::max(body_limit))
                .into_inner(),
        )
}

/// Request ids are always minted by the service, never taken from the caller.
async fn discard_client_request_id(mut request: Request<Body>) -> Request<Body> {
    request.headers_mut().remove(REQUEST_ID_HEADER);
    request
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("signal received, starting graceful shutdown");
}
