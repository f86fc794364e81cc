// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Test utilities for mocking Kubernetes API responses.

use base64::prelude::{Engine, BASE64_STANDARD};
use http::{Request, Response};
use kube::client::Body;
use kube::Client;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tower::Service;

type Responses = HashMap<(String, String), (u16, String)>;

/// A mock HTTP service that returns predefined responses based on method and exact path.
///
/// Unmatched requests get a 404 `Status`. Every request is recorded.
#[derive(Clone, Default)]
pub struct MockService {
    responses: Arc<Mutex<Responses>>,
    requests: Arc<Mutex<Vec<(String, String)>>>,
}

impl MockService {
    pub fn new() -> Self {
        Self::default()
    }

    fn on(self, method: &str, path: &str, status: u16, body: &str) -> Self {
        self.responses.lock().unwrap().insert(
            (method.to_string(), path.to_string()),
            (status, body.to_string()),
        );
        self
    }

    /// Add a response for GET requests matching the exact path
    pub fn on_get(self, path: &str, status: u16, body: &str) -> Self {
        self.on("GET", path, status, body)
    }

    /// Add a response for POST requests matching the exact path
    pub fn on_post(self, path: &str, status: u16, body: &str) -> Self {
        self.on("POST", path, status, body)
    }

    /// Add a response for PUT requests matching the exact path
    pub fn on_put(self, path: &str, status: u16, body: &str) -> Self {
        self.on("PUT", path, status, body)
    }

    /// Requests served so far, as (method, path)
    pub fn requests(&self) -> Vec<(String, String)> {
        self.requests.lock().unwrap().clone()
    }

    /// Build a kube Client from this mock service
    pub fn into_client(self) -> Client {
        Client::new(self, "default")
    }
}

impl Service<Request<Body>> for MockService {
    type Response = Response<Body>;
    type Error = tower::BoxError;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let method = req.method().to_string();
        let path = req.uri().path().to_string();

        self.requests
            .lock()
            .unwrap()
            .push((method.clone(), path.clone()));
        let response = self.responses.lock().unwrap().get(&(method, path)).cloned();

        Box::pin(async move {
            let (status, body) =
                response.unwrap_or_else(|| (404, status_json(404, "NotFound", "not found")));
            Ok(Response::builder()
                .status(status)
                .header("content-type", "application/json")
                .body(Body::from(body.into_bytes()))
                .unwrap())
        })
    }
}

/// A `Status` failure body
pub fn status_json(code: u16, reason: &str, message: &str) -> String {
    serde_json::json!({
        "kind": "Status",
        "apiVersion": "v1",
        "status": "Failure",
        "message": message,
        "reason": reason,
        "code": code
    })
    .to_string()
}

/// A discovery `APIResourceList` serving a single kind
pub fn api_resource_list_json(group_version: &str, kind: &str, plural: &str, namespaced: bool) -> String {
    serde_json::json!({
        "kind": "APIResourceList",
        "apiVersion": "v1",
        "groupVersion": group_version,
        "resources": [{
            "name": plural,
            "singularName": kind.to_lowercase(),
            "namespaced": namespaced,
            "kind": kind,
            "verbs": ["get", "list", "watch", "create", "update", "patch", "delete"]
        }]
    })
    .to_string()
}

/// An empty object list
pub fn empty_list_json(api_version: &str, list_kind: &str) -> String {
    serde_json::json!({
        "apiVersion": api_version,
        "kind": list_kind,
        "metadata": {"resourceVersion": "1"},
        "items": []
    })
    .to_string()
}

pub fn config_map_json(namespace: &str, name: &str, data: &[(&str, &str)]) -> String {
    let data: serde_json::Map<String, serde_json::Value> = data
        .iter()
        .map(|(k, v)| (k.to_string(), serde_json::Value::from(*v)))
        .collect();
    serde_json::json!({
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": {"name": name, "namespace": namespace},
        "data": data
    })
    .to_string()
}

/// A Secret whose values are base64 encoded like the API server returns them
pub fn secret_json(namespace: &str, name: &str, data: &[(&str, &str)]) -> String {
    let data: serde_json::Map<String, serde_json::Value> = data
        .iter()
        .map(|(k, v)| (k.to_string(), BASE64_STANDARD.encode(v).into()))
        .collect();
    serde_json::json!({
        "apiVersion": "v1",
        "kind": "Secret",
        "metadata": {"name": name, "namespace": namespace},
        "type": "Opaque",
        "data": data
    })
    .to_string()
}
