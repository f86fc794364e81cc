// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! `AdmissionReview` endpoints wrapping validators and defaulters

use super::{AdmissionDefaulter, AdmissionOutcome, AdmissionValidator};
use crate::error::Result;
use crate::server::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Json;
use base64::prelude::{Engine, BASE64_STANDARD};
use kube::api::{DynamicObject, ObjectMeta};
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};
use kube::Resource;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Marker bound for the resources served by admission endpoints
pub trait AdmissionResource: Resource<DynamicType = ()> + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<K> AdmissionResource for K where K: Resource<DynamicType = ()> + DeserializeOwned + Clone + Send + Sync + 'static {}

fn webhook_path<K: AdmissionResource>(prefix: &str) -> String {
    format!(
        "/{}-{}-{}-{}",
        prefix,
        K::group(&()).replace('.', "-"),
        K::version(&()),
        K::kind(&()).to_lowercase()
    )
}

/// `/validate-postgresql-cnpg-io-v1-pooler` for `Pooler`
pub fn validate_path<K: AdmissionResource>() -> String {
    webhook_path::<K>("validate")
}

/// `/mutate-postgresql-cnpg-io-v1-pooler` for `Pooler`
pub fn mutate_path<K: AdmissionResource>() -> String {
    webhook_path::<K>("mutate")
}

/// Register the validating and mutating endpoints of a webhook
pub fn register_webhook<K, W>(router: &mut Router, webhook: Arc<W>) -> Result<()>
where
    K: AdmissionResource,
    W: AdmissionValidator<K> + AdmissionDefaulter<K> + 'static,
{
    router.route(
        &validate_path::<K>(),
        post(validate::<K, W>).with_state(webhook.clone()),
    )?;
    router.route(&mutate_path::<K>(), post(mutate::<K, W>).with_state(webhook))
}

fn admission_request<K: AdmissionResource>(
    review: AdmissionReview<K>,
) -> std::result::Result<AdmissionRequest<K>, Json<AdmissionReview<DynamicObject>>> {
    TryInto::<AdmissionRequest<K>>::try_into(review).map_err(|e| {
        warn!("AdmissionReview for {} without request: {}", K::kind(&()), e);
        Json(AdmissionResponse::invalid(e.to_string()).into_review())
    })
}

async fn validate<K, W>(
    State(validator): State<Arc<W>>,
    Json(review): Json<AdmissionReview<K>>,
) -> Json<AdmissionReview<DynamicObject>>
where
    K: AdmissionResource,
    W: AdmissionValidator<K> + 'static,
{
    let request = match admission_request(review) {
        Ok(request) => request,
        Err(invalid) => return invalid,
    };

    let outcome = match (&request.operation, request.object.clone(), request.old_object.clone()) {
        (Operation::Create, Some(obj), _) => validator.validate_create(obj),
        (Operation::Update, Some(new), Some(old)) => validator.validate_update(old, new),
        (Operation::Delete, _, Some(old)) => validator.validate_delete(&old),
        (Operation::Delete, _, None) | (Operation::Connect, _, _) => AdmissionOutcome::allowed(),
        (operation, _, _) => {
            let response = AdmissionResponse::from(&request)
                .deny(format!("{:?} request for {} without an object", operation, K::kind(&())));
            return Json(response.into_review());
        }
    };

    let mut response = AdmissionResponse::from(&request);
    if let Some(message) = outcome.rejection_message(&K::kind(&()), &K::group(&()), &request.name) {
        debug!("Denying {:?} of {} {}: {}", request.operation, K::kind(&()), request.name, message);
        response = response.deny(message);
    }
    if !outcome.warnings.is_empty() {
        response.warnings = Some(outcome.warnings);
    }

    Json(response.into_review())
}

async fn mutate<K, W>(State(defaulter): State<Arc<W>>, Json(review): Json<AdmissionReview<K>>) -> Response
where
    K: AdmissionResource,
    W: AdmissionDefaulter<K> + 'static,
{
    let request = match admission_request(review) {
        Ok(request) => request,
        Err(invalid) => return invalid.into_response(),
    };

    let patch = match &request.object {
        Some(original) => {
            let mut defaulted = original.clone();
            defaulter.apply_defaults(&mut defaulted);
            metadata_patch(original.meta(), defaulted.meta())
        }
        None => Vec::new(),
    };

    let mut review = match serde_json::to_value(AdmissionResponse::from(&request).into_review()) {
        Ok(review) => review,
        Err(e) => {
            warn!("Failed to encode AdmissionReview: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "failed to encode response").into_response();
        }
    };

    if !patch.is_empty() {
        let encoded = BASE64_STANDARD.encode(Value::Array(patch).to_string());
        if let Some(response) = review.get_mut("response").and_then(Value::as_object_mut) {
            response.insert("patch".to_string(), Value::String(encoded));
            response.insert("patchType".to_string(), Value::String("JSONPatch".to_string()));
        }
    }

    Json(review).into_response()
}

/// RFC 6901 escaping of a JSON pointer segment
fn escape_pointer(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

fn map_patch(
    field: &str,
    before: Option<&BTreeMap<String, String>>,
    after: Option<&BTreeMap<String, String>>,
) -> Vec<Value> {
    let Some(after) = after.filter(|m| !m.is_empty()) else {
        return Vec::new();
    };

    match before {
        None => vec![json!({"op": "add", "path": format!("/metadata/{}", field), "value": after})],
        Some(before) => after
            .iter()
            .filter(|(key, _)| !before.contains_key(*key))
            .map(|(key, value)| {
                json!({
                    "op": "add",
                    "path": format!("/metadata/{}/{}", field, escape_pointer(key)),
                    "value": value
                })
            })
            .collect(),
    }
}

/// JSON patch adding the labels and annotations present in `after` but not in `before`
fn metadata_patch(before: &ObjectMeta, after: &ObjectMeta) -> Vec<Value> {
    let mut patch = map_patch("labels", before.labels.as_ref(), after.labels.as_ref());
    patch.extend(map_patch(
        "annotations",
        before.annotations.as_ref(),
        after.annotations.as_ref(),
    ));
    patch
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Pooler;
    use crate::server::MAX_REQUEST_BODY_BYTES;
    use crate::webhooks::{MandatoryMetadata, PoolerWebhook};
    use axum::body::Body;
    use axum::http::{header::CONTENT_TYPE, Method, Request};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn webhook(labels: &[(&str, &str)]) -> Arc<PoolerWebhook> {
        Arc::new(PoolerWebhook::new(MandatoryMetadata {
            labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            annotations: BTreeMap::new(),
        }))
    }

    fn pooler_json(name: &str, spec: Value, labels: Option<Value>) -> Value {
        let mut metadata = json!({"name": name, "namespace": "default", "uid": "1234"});
        if let Some(labels) = labels {
            metadata["labels"] = labels;
        }
        json!({
            "apiVersion": "postgresql.cnpg.io/v1",
            "kind": "Pooler",
            "metadata": metadata,
            "spec": spec
        })
    }

    fn review(operation: &str, object: Option<Value>, old_object: Option<Value>) -> Vec<u8> {
        json!({
            "apiVersion": "admission.k8s.io/v1",
            "kind": "AdmissionReview",
            "request": {
                "uid": "705ab4f5-6393-11e8-b7cc-42010a800002",
                "kind": {"group": "postgresql.cnpg.io", "version": "v1", "kind": "Pooler"},
                "resource": {"group": "postgresql.cnpg.io", "version": "v1", "resource": "poolers"},
                "requestKind": {"group": "postgresql.cnpg.io", "version": "v1", "kind": "Pooler"},
                "requestResource": {"group": "postgresql.cnpg.io", "version": "v1", "resource": "poolers"},
                "name": "pooler-rw",
                "namespace": "default",
                "operation": operation,
                "userInfo": {"username": "admin"},
                "object": object,
                "oldObject": old_object,
                "dryRun": false
            }
        })
        .to_string()
        .into_bytes()
    }

    async fn send(router: Router, method: Method, path: &str, body: Vec<u8>) -> axum::response::Response {
        let request = Request::builder()
            .method(method)
            .uri(path)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap();
        router.into_service().oneshot(request).await.unwrap()
    }

    async fn call(router: Router, path: &str, body: Vec<u8>) -> Value {
        let response = send(router, Method::POST, path, body).await;
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn router_with(webhook: Arc<PoolerWebhook>) -> Router {
        let mut router = Router::new();
        register_webhook::<Pooler, _>(&mut router, webhook).unwrap();
        router
    }

    #[test]
    fn test_paths() {
        assert_eq!(validate_path::<Pooler>(), "/validate-postgresql-cnpg-io-v1-pooler");
        assert_eq!(mutate_path::<Pooler>(), "/mutate-postgresql-cnpg-io-v1-pooler");
    }

    #[tokio::test]
    async fn test_create_without_pgbouncer_is_denied() {
        let router = router_with(webhook(&[]));
        let body = review(
            "CREATE",
            Some(pooler_json("pooler-rw", json!({"cluster": {"name": "cluster-example"}}), None)),
            None,
        );

        let review = call(router, "/validate-postgresql-cnpg-io-v1-pooler", body).await;

        assert_eq!(review["response"]["allowed"], false);
        assert_eq!(review["response"]["uid"], "705ab4f5-6393-11e8-b7cc-42010a800002");
        let message = review["response"]["status"]["message"].as_str().unwrap();
        assert!(message.starts_with("Pooler.postgresql.cnpg.io \"pooler-rw\" is invalid"));
        assert!(message.contains("spec.pgbouncer"));
    }

    #[tokio::test]
    async fn test_create_manual_pooler_is_allowed_with_warning() {
        let router = router_with(webhook(&[]));
        let spec = json!({
            "cluster": {"name": "cluster-example"},
            "pgbouncer": {"authQuery": "SELECT 1", "authQuerySecret": {"name": "auth"}}
        });
        let body = review("CREATE", Some(pooler_json("pooler-rw", spec, None)), None);

        let review = call(router, "/validate-postgresql-cnpg-io-v1-pooler", body).await;

        assert_eq!(review["response"]["allowed"], true);
        let warnings = review["response"]["warnings"].as_array().unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].as_str().unwrap().contains("Manually configure it"));
    }

    #[tokio::test]
    async fn test_delete_is_allowed() {
        let router = router_with(webhook(&[]));
        let body = review(
            "DELETE",
            None,
            Some(pooler_json("pooler-rw", json!({"cluster": {"name": "pooler-rw"}}), None)),
        );

        let review = call(router, "/validate-postgresql-cnpg-io-v1-pooler", body).await;

        assert_eq!(review["response"]["allowed"], true);
    }

    #[tokio::test]
    async fn test_mutate_returns_label_patch() {
        let router = router_with(webhook(&[("cnpg.io/reload", "true")]));
        let spec = json!({"cluster": {"name": "cluster-example"}, "pgbouncer": {}});
        let body = review(
            "CREATE",
            Some(pooler_json("pooler-rw", spec, Some(json!({"app": "db"})))),
            None,
        );

        let review = call(router, "/mutate-postgresql-cnpg-io-v1-pooler", body).await;

        assert_eq!(review["response"]["allowed"], true);
        assert_eq!(review["response"]["patchType"], "JSONPatch");
        let patch = BASE64_STANDARD
            .decode(review["response"]["patch"].as_str().unwrap())
            .unwrap();
        let patch: Value = serde_json::from_slice(&patch).unwrap();
        assert_eq!(
            patch,
            json!([{"op": "add", "path": "/metadata/labels/cnpg.io~1reload", "value": "true"}])
        );
    }

    #[tokio::test]
    async fn test_mutate_without_changes_has_no_patch() {
        let router = router_with(webhook(&[("app", "other")]));
        let spec = json!({"cluster": {"name": "cluster-example"}, "pgbouncer": {}});
        let body = review(
            "CREATE",
            Some(pooler_json("pooler-rw", spec, Some(json!({"app": "db"})))),
            None,
        );

        let review = call(router, "/mutate-postgresql-cnpg-io-v1-pooler", body).await;

        assert_eq!(review["response"]["allowed"], true);
        assert!(review["response"].get("patch").is_none());
    }

    #[tokio::test]
    async fn test_non_post_is_rejected() {
        let router = router_with(webhook(&[]));
        let response = send(router, Method::GET, "/validate-postgresql-cnpg-io-v1-pooler", Vec::new()).await;

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_review_without_request_is_invalid() {
        let router = router_with(webhook(&[]));
        let body = json!({"apiVersion": "admission.k8s.io/v1", "kind": "AdmissionReview"})
            .to_string()
            .into_bytes();

        let review = call(router, "/validate-postgresql-cnpg-io-v1-pooler", body).await;

        assert_eq!(review["response"]["allowed"], false);
    }

    #[tokio::test]
    async fn test_malformed_review_is_rejected() {
        let router = router_with(webhook(&[]));
        let response = send(
            router,
            Method::POST,
            "/mutate-postgresql-cnpg-io-v1-pooler",
            b"{not json".to_vec(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_oversized_review_is_not_buffered() {
        let router = router_with(webhook(&[]));
        let response = send(
            router,
            Method::POST,
            "/validate-postgresql-cnpg-io-v1-pooler",
            vec![b' '; MAX_REQUEST_BODY_BYTES + 1],
        )
        .await;

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn test_metadata_patch_adds_whole_map_when_missing() {
        let before = ObjectMeta::default();
        let after = ObjectMeta {
            annotations: Some(BTreeMap::from([("a".to_string(), "1".to_string())])),
            ..Default::default()
        };

        assert_eq!(
            metadata_patch(&before, &after),
            vec![json!({"op": "add", "path": "/metadata/annotations", "value": {"a": "1"}})]
        );
    }
}
