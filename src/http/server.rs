//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (request ID, tracing, timeout)
//! - Own the shared circuit breaker used for upstream calls
//! - Serve on a listener until shutdown is signalled

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::{AppConfig, ServiceConfig};
use crate::http::handlers;
use crate::http::request::UuidRequestId;
use crate::resilience::{CircuitBreaker, ReqwestExecutor};

/// Circuit breaker shared by every upstream call site.
pub type SharedBreaker = Arc<CircuitBreaker<ReqwestExecutor>>;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub app: Arc<AppConfig>,
    pub breaker: SharedBreaker,
    /// Upstream name → URL.
    pub upstreams: Arc<HashMap<String, String>>,
}

/// HTTP server for the service.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    /// Create a server with its own circuit breaker built from `config.breaker`.
    pub fn new(config: ServiceConfig) -> Self {
        let breaker = Arc::new(CircuitBreaker::new(&config.breaker, ReqwestExecutor::default()));
        Self::with_breaker(config, breaker)
    }

    /// Create a server that routes upstream calls through `breaker`.
    pub fn with_breaker(config: ServiceConfig, breaker: SharedBreaker) -> Self {
        let upstreams: HashMap<String, String> = config
            .upstreams
            .iter()
            .map(|u| (u.name.clone(), u.url.clone()))
            .collect();

        let state = AppState {
            app: Arc::new(config.app.clone()),
            breaker,
            upstreams: Arc::new(upstreams),
        };

        Self {
            router: Self::build_router(&config, state),
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ServiceConfig, state: AppState) -> Router {
        let middleware = ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)));

        Router::new()
            .route("/", get(handlers::root))
            .route("/info", get(handlers::info))
            .route("/healthcheck", get(handlers::healthcheck))
            .route("/hello/{name}", get(handlers::hello))
            .route("/post", post(handlers::create_post))
            .route("/upstream/{name}", get(handlers::upstream))
            .with_state(state)
            .layer(middleware)
    }

    /// The fully layered router, for serving or driving in-process.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve on `listener` until `shutdown` fires, then drain in-flight
    /// requests.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
