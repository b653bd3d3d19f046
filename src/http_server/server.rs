//! # HTTP Server
//!
//! Combines the health route and the REST routes behind CORS and request
//! tracing.

use axum::body::Body;
use axum::http::{header, Method, Request};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, info_span, warn};
use uuid::Uuid;

use super::config::HttpServerConfig;
use super::health_routes::health_routes;
use crate::rest_api::{RestServer, RestState, TOTAL_HEADER};

/// HTTP server for the query endpoints
pub struct HttpServer {
    config: HttpServerConfig,
    router: Router,
}

impl HttpServer {
    pub fn new(config: HttpServerConfig, state: RestState) -> Self {
        let router = Self::build_router(&config, state);
        Self { config, router }
    }

    fn build_router(config: &HttpServerConfig, state: RestState) -> Router {
        let cors = cors_layer(&config.cors_origins);

        let trace = TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
            info_span!(
                "request",
                request_id = %Uuid::new_v4(),
                method = %request.method(),
                path = %request.uri().path(),
            )
        });

        Router::new()
            .merge(health_routes())
            .merge(RestServer::new(state).router())
            .layer(trace)
            .layer(cors)
    }

    /// Get the router (for testing)
    pub fn router(self) -> Router {
        self.router
    }

    /// Serve until Ctrl-C
    pub async fn start(self) -> Result<(), std::io::Error> {
        let addr = self
            .config
            .bind_addr()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

        let listener = TcpListener::bind(addr).await?;
        info!(%addr, "aeroquery listening");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async {
                if let Err(err) = tokio::signal::ctrl_c().await {
                    warn!(error = %err, "failed to listen for shutdown signal");
                }
                info!("shutting down");
            })
            .await
    }
}

/// Read-only CORS: GET from the configured origins, or from any origin
/// when none are listed
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed = if origins.is_empty() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(origins.iter().filter_map(|o| o.parse().ok()))
    };
    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods([Method::GET])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .expose_headers([header::HeaderName::from_static(TOTAL_HEADER)])
}
