//! Facade contract tests driven through `tower::ServiceExt::oneshot`.

mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use server::{build_router, AppState, FacadeConfig};
use tower::ServiceExt;

fn test_state(anon_burst: u32) -> Arc<AppState> {
    let snapshot_dir = tempfile::tempdir().unwrap();
    let corpus = Arc::new(common::fixture_corpus(snapshot_dir.path()));
    let embedder: Arc<dyn index::Embedder> = Arc::new(index::HashEmbedder::default());
    let vindex = Arc::new(index::VectorIndex::build(
        &corpus,
        index::SidecarSnapshot {
            snapshot_id: "ecfr-2026-06-01".to_string(),
            snapshot_sha256: "s".repeat(64),
        },
        embedder.as_ref(),
        "2000-01-01T00:00:00Z",
    ));

    let mut config = FacadeConfig {
        anon_burst,
        ..FacadeConfig::default()
    };
    config.api_keys.insert("facade-test-key".to_string());

    let pipeline = rag::RagPipeline::new(
        vindex.clone(),
        corpus.clone(),
        embedder.clone(),
        Arc::new(rag::StaticGenerator::new(
            "license_required",
            "A license is required.",
        )),
        rag::RetrievalProfile::new(1, 0.9, 0),
        "kgdigest",
    )
    .unwrap();

    Arc::new(AppState::new(config, corpus, vindex, embedder).with_rag(Arc::new(pipeline)))
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn anonymous_burst_exhaustion_returns_429_with_headers() {
    let app = build_router(test_state(3));

    for _ in 0..3 {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/v1/search?q=license")
                    .header("x-forwarded-for", "10.1.2.3")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-ratelimit-limit"));
        assert!(response.headers().contains_key("x-ratelimit-remaining"));
    }

    let throttled = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/v1/search?q=license")
                .header("x-forwarded-for", "10.1.2.3")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(throttled.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(throttled.headers().contains_key("retry-after"));
    assert_eq!(
        throttled.headers()["x-ratelimit-limit"],
        "30",
        "limit header reports the sustained budget"
    );

    let body = body_json(throttled).await;
    assert_eq!(
        body["type"],
        "https://ear.example.org/problems/resource-exhausted"
    );
    assert!(body["trace_id"].as_str().is_some());

    // A different identity still has budget.
    let other = app
        .oneshot(
            Request::builder()
                .uri("/v1/search?q=license")
                .header("x-forwarded-for", "10.9.9.9")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(other.status(), StatusCode::OK);
}

#[tokio::test]
async fn keyed_identity_gets_the_larger_budget() {
    let app = build_router(test_state(1));

    // Anonymous burns out after one request.
    for expected in [StatusCode::OK, StatusCode::TOO_MANY_REQUESTS] {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/v1/search?q=license")
                    .header("x-forwarded-for", "10.1.2.3")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), expected);
    }

    // The keyed caller runs on its own 20-burst bucket.
    for _ in 0..20 {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/v1/search?q=license")
                    .header("x-api-key", "facade-test-key")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-ratelimit-limit"], "120");
    }
}

#[tokio::test]
async fn unknown_api_key_is_denied() {
    let app = build_router(test_state(10));
    let response = app
        .oneshot(
            Request::builder()
                .uri("/v1/search?q=license")
                .header("x-api-key", "wrong")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(
        body["type"],
        "https://ear.example.org/problems/authorization-denied"
    );
}

#[tokio::test]
async fn request_id_propagates_to_header_and_problem_body() {
    let app = build_router(test_state(10));
    let response = app
        .oneshot(
            Request::builder()
                .uri("/v1/search?q=")
                .header("x-request-id", "trace-123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response.headers()["x-request-id"], "trace-123");
    let body = body_json(response).await;
    assert_eq!(body["trace_id"], "trace-123");
    assert_eq!(body["type"], "https://ear.example.org/problems/invalid-input");
}

#[tokio::test]
async fn rag_endpoint_refuses_thin_retrieval() {
    let app = build_router(test_state(10));
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/rag/query")
                .header("content-type", "application/json")
                .body(Body::from(
                    serde_json::json!({ "question": "unrelated string", "top_k": 3 }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["refusal_reason"], "thin_retrieval");
    assert_eq!(body["citations"].as_array().unwrap().len(), 0);
    assert_eq!(body["grounded"], false);
    assert_eq!(body["label"], "unanswerable");
}

#[tokio::test]
async fn oversize_body_is_rejected() {
    let app = build_router(test_state(10));
    let oversized = "x".repeat(64 * 1024);
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/rag/query")
                .header("content-type", "application/json")
                .body(Body::from(
                    serde_json::json!({ "question": oversized }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn sparql_requires_allowlisted_template() {
    let app = build_router(test_state(10));
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/sparql")
                .header("content-type", "application/json")
                .body(Body::from(
                    serde_json::json!({
                        "template": "drop_all",
                        "iri": "https://ear.example.org/resource/ear/section/EAR-736.2"
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    // No endpoint is configured in this state, which is the first check;
    // the template allowlist is covered in kg's own tests.
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn health_is_outside_the_rate_limit_budget() {
    let app = build_router(test_state(1));

    // Exhaust the anonymous budget.
    let _ = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/v1/search?q=license")
                .header("x-forwarded-for", "10.1.2.3")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    for _ in 0..5 {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header("x-forwarded-for", "10.1.2.3")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn unknown_route_returns_problem_details() {
    let app = build_router(test_state(10));
    let response = app
        .oneshot(
            Request::builder()
                .uri("/v1/nope")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["type"], "https://ear.example.org/problems/not-found");
}
