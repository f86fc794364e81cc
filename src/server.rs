// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! HTTP routing shared by the webhook and diagnostics servers.

use crate::error::{OperatorError, Result};
use axum::extract::DefaultBodyLimit;
use axum::http::header::CONTENT_TYPE;
use axum::routing::{get, MethodRouter};
use bytes::Bytes;
use serde::Serialize;
use std::collections::BTreeSet;
use std::future::Future;
use tokio::net::TcpListener;
use tracing::{debug, info};

/// Upper bound for request bodies buffered by the handlers
pub const MAX_REQUEST_BODY_BYTES: usize = 4 * 1024 * 1024;

/// Route table refusing to register the same path twice
#[derive(Default)]
pub struct Router {
    paths: BTreeSet<String>,
    inner: axum::Router,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handlers of a path. Each path can be registered once.
    pub fn route(&mut self, path: &str, handler: MethodRouter) -> Result<()> {
        if !self.paths.insert(path.to_string()) {
            return Err(OperatorError::RegistrationError {
                kind: "handler",
                name: path.to_string(),
                reason: "path already registered".to_string(),
            });
        }
        debug!("Registering handler for {}", path);
        self.inner = std::mem::take(&mut self.inner).route(path, handler);
        Ok(())
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(String::as_str)
    }

    /// The routes as an axum service, with the request body limit applied
    pub fn into_service(self) -> axum::Router {
        self.inner
            .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
    }
}

/// Liveness and readiness probe.
///
/// Answers as soon as the server accepts connections; it does not check that
/// the webhook CA bundle has been installed.
pub fn readiness_probe() -> MethodRouter {
    get(|| async { "OK" })
}

/// Serves a fixed JSON document on GET
pub fn json_document<T: Serialize>(value: &T) -> Result<MethodRouter> {
    let body = serde_json::to_vec_pretty(value)
        .map(Bytes::from)
        .map_err(|e| OperatorError::WebhookError(format!("Failed to encode document: {}", e)))?;
    Ok(get(move || async move { ([(CONTENT_TYPE, "application/json")], body) }))
}

/// Serve `router` until `shutdown` resolves, then drain open connections
pub async fn serve<F>(listener: TcpListener, router: Router, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    info!("HTTP server listening on {}", addr);
    axum::serve(listener, router.into_service())
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("HTTP server on {} stopped", addr);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Method, Request, Response, StatusCode};
    use axum::routing::post;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    async fn send(router: Router, method: Method, path: &str, body: Vec<u8>) -> Response<Body> {
        let request = Request::builder()
            .method(method)
            .uri(path)
            .body(Body::from(body))
            .unwrap();
        router.into_service().oneshot(request).await.unwrap()
    }

    async fn body_string(response: Response<Body>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_readiness_probe_returns_ok() {
        let mut router = Router::new();
        router.route("/readyz", readiness_probe()).unwrap();

        let response = send(router, Method::GET, "/readyz", Vec::new()).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "OK");
    }

    #[tokio::test]
    async fn test_unknown_path_is_not_found() {
        let response = send(Router::new(), Method::GET, "/missing", Vec::new()).await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_duplicate_path_is_rejected() {
        let mut router = Router::new();
        router.route("/readyz", readiness_probe()).unwrap();

        let err = router.route("/readyz", readiness_probe()).unwrap_err();
        assert!(matches!(err, OperatorError::RegistrationError { .. }));
        assert_eq!(router.paths().collect::<Vec<_>>(), vec!["/readyz"]);
    }

    #[tokio::test]
    async fn test_json_document_only_answers_get() {
        let document = || json_document(&serde_json::json!({"mode": "unfiltered"})).unwrap();

        let mut router = Router::new();
        router.route("/debug/cache-scope", document()).unwrap();
        let ok = send(router, Method::GET, "/debug/cache-scope", Vec::new()).await;
        assert_eq!(ok.status(), StatusCode::OK);
        assert_eq!(ok.headers()[CONTENT_TYPE], "application/json");
        assert!(body_string(ok).await.contains("unfiltered"));

        let mut router = Router::new();
        router.route("/debug/cache-scope", document()).unwrap();
        let rejected = send(router, Method::POST, "/debug/cache-scope", Vec::new()).await;
        assert_eq!(rejected.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let mut router = Router::new();
        router
            .route("/echo", post(|body: Bytes| async move { body.len().to_string() }))
            .unwrap();

        let response = send(router, Method::POST, "/echo", vec![b'x'; MAX_REQUEST_BODY_BYTES + 1]).await;

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_body_within_limit_is_accepted() {
        let mut router = Router::new();
        router
            .route("/echo", post(|body: Bytes| async move { body.len().to_string() }))
            .unwrap();

        let response = send(router, Method::POST, "/echo", vec![b'x'; 1024]).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "1024");
    }

    #[tokio::test]
    async fn test_serve_stops_on_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();

        let result = serve(listener, Router::new(), async {}).await;
        assert!(result.is_ok());
    }
}
