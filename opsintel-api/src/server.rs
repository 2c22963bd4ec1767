use crate::{handlers, state::AppState};
use axum::{routing::get, Router};
use opsintel_core::{ApiConfig, OpsError, Result};
use std::future::Future;
use std::net::SocketAddr;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::get_metrics))
        // Alert feed
        .route("/api/v1/alerts", get(handlers::get_alerts))
        .route("/api/v1/alerts/report", get(handlers::get_report))
        .route("/api/v1/alerts/summary", get(handlers::get_summary))
        // Dataset overview
        .route("/api/v1/metrics/overview", get(handlers::get_overview))
        .route("/api/v1/metrics/daily", get(handlers::get_daily_metrics))
        .route("/api/v1/metrics/products", get(handlers::get_products))
        .route("/api/v1/metrics/comparison", get(handlers::get_comparison))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

pub struct ApiServer {
    app: Router,
    addr: SocketAddr,
}

impl ApiServer {
    pub fn new(config: &ApiConfig, state: AppState) -> Result<Self> {
        let addr: SocketAddr = format!("{}:{}", config.host, config.port)
            .parse()
            .map_err(|e| {
                OpsError::Configuration(format!(
                    "Invalid API address {}:{}: {}",
                    config.host, config.port, e
                ))
            })?;

        Ok(Self {
            app: router(state),
            addr,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn run(self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Serves until `shutdown` resolves, then drains in-flight requests.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        info!(addr = %self.addr, "API server listening");

        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("API server stopped");
        Ok(())
    }
}
