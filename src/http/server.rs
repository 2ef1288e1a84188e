//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the forwarding handler
//! - Wire up middleware (tracing, capture, timeout)
//! - Forward requests to the configured upstream
//! - Apply hot-reloaded capture policies
//! - Bind server to listener, stop on shutdown signal

use axum::{
    body::Body,
    extract::{Request, State},
    http::{uri::PathAndQuery, StatusCode, Uri},
    middleware,
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::capture::{capture_middleware, CapturePolicy, Interceptor};
use crate::config::CaptureProxyConfig;
use crate::export::Exporter;

/// Error type for server construction.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("invalid upstream URL '{url}': {reason}")]
    InvalidUpstream { url: String, reason: String },
}

/// Upstream base the handler forwards to.
#[derive(Debug)]
struct Upstream {
    scheme: axum::http::uri::Scheme,
    authority: axum::http::uri::Authority,
    base_path: String,
}

impl Upstream {
    fn parse(url: &str) -> Result<Self, ServerError> {
        let invalid = |reason: &str| ServerError::InvalidUpstream {
            url: url.to_string(),
            reason: reason.to_string(),
        };
        let uri: Uri = url.parse().map_err(|_| invalid("not a URI"))?;
        let parts = uri.into_parts();
        let scheme = parts.scheme.ok_or_else(|| invalid("missing scheme"))?;
        let authority = parts.authority.ok_or_else(|| invalid("missing host"))?;
        let base_path = parts
            .path_and_query
            .map(|pq| pq.path().trim_end_matches('/').to_string())
            .unwrap_or_default();
        Ok(Self {
            scheme,
            authority,
            base_path,
        })
    }

    fn uri_for(&self, path_and_query: Option<&PathAndQuery>) -> Result<Uri, axum::http::Error> {
        let tail = path_and_query.map(PathAndQuery::as_str).unwrap_or("/");
        Uri::builder()
            .scheme(self.scheme.clone())
            .authority(self.authority.clone())
            .path_and_query(format!("{}{}", self.base_path, tail))
            .build()
    }
}

/// State injected into the forwarding handler.
#[derive(Clone)]
pub struct AppState {
    upstream: Arc<Upstream>,
    client: Client<HttpConnector, Body>,
}

/// HTTP server for the capture proxy.
pub struct HttpServer {
    router: Router,
    config: CaptureProxyConfig,
    interceptor: Interceptor,
}

impl HttpServer {
    /// Create a new HTTP server. The exporter must already be started.
    pub fn new(config: CaptureProxyConfig, exporter: Exporter) -> Result<Self, ServerError> {
        let upstream = Arc::new(Upstream::parse(&config.upstream.url)?);
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        let interceptor = Interceptor::new(CapturePolicy::from_config(&config.capture), exporter);

        let state = AppState { upstream, client };
        let router = Self::build_router(&config, state, interceptor.clone());
        Ok(Self {
            router,
            config,
            interceptor,
        })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &CaptureProxyConfig, state: AppState, interceptor: Interceptor) -> Router {
        Router::new()
            .route("/{*path}", any(forward_handler))
            .route("/", any(forward_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    // Capture wraps the timeout so a 408 is recorded like any other response.
                    .layer(middleware::from_fn_with_state(interceptor, capture_middleware))
                    .layer(TimeoutLayer::new(Duration::from_secs(config.upstream.timeout_secs))),
            )
    }

    /// Run the server until `shutdown` resolves, applying capture policy reloads.
    pub async fn run<F>(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<CaptureProxyConfig>,
        shutdown: F,
    ) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            upstream = %self.config.upstream.url,
            "HTTP server starting"
        );

        let interceptor = self.interceptor.clone();
        tokio::spawn(async move {
            while let Some(config) = config_updates.recv().await {
                interceptor.update_policy(CapturePolicy::from_config(&config.capture));
            }
        });

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn config(&self) -> &CaptureProxyConfig {
        &self.config
    }

    pub fn interceptor(&self) -> &Interceptor {
        &self.interceptor
    }
}

/// Forward the request to the upstream, unchanged apart from its URI.
async fn forward_handler(State(state): State<AppState>, request: Request) -> Response {
    let (mut parts, body) = request.into_parts();
    let method = parts.method.clone();

    parts.uri = match state.upstream.uri_for(parts.uri.path_and_query()) {
        Ok(uri) => uri,
        Err(e) => {
            tracing::warn!(error = %e, "Could not build upstream URI");
            return (StatusCode::BAD_REQUEST, "Invalid request target").into_response();
        }
    };
    let target = parts.uri.clone();

    match state.client.request(Request::from_parts(parts, body)).await {
        Ok(response) => {
            let (parts, body) = response.into_parts();
            Response::from_parts(parts, Body::new(body))
        }
        Err(e) => {
            tracing::error!(method = %method, uri = %target, error = %e, "Upstream error");
            (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response()
        }
    }
}

/// Wait for Ctrl+C.
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_keeps_base_path() {
        let upstream = Upstream::parse("http://127.0.0.1:3000/api/").unwrap();
        let pq = PathAndQuery::from_static("/users?page=2");
        assert_eq!(
            upstream.uri_for(Some(&pq)).unwrap().to_string(),
            "http://127.0.0.1:3000/api/users?page=2"
        );
    }

    #[test]
    fn upstream_defaults_to_root() {
        let upstream = Upstream::parse("http://backend:8000").unwrap();
        assert_eq!(upstream.uri_for(None).unwrap().to_string(), "http://backend:8000/");
    }

    #[test]
    fn upstream_requires_scheme_and_host() {
        assert!(Upstream::parse("/just/a/path").is_err());
        assert!(Upstream::parse("not a uri at all").is_err());
    }
}
