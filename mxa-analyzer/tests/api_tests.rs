//! HTTP API integration tests
//!
//! Drive the full router with `oneshot` against a temporary database and an
//! empty model directory.

mod helpers;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use http_body_util::BodyExt;
use mxa_analyzer::{build_router, AppState};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

async fn test_app() -> (TempDir, Router) {
    let (dir, analyzer) = helpers::test_analyzer().await.unwrap();
    (dir, build_router(AppState::new(analyzer)))
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    into_json(response).await
}

async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    into_json(response).await
}

async fn into_json(response: axum::response::Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn health_reports_degraded_without_artifacts() {
    let (_dir, app) = test_app().await;

    let (status, body) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["module"], "mxa-analyzer");
    assert_eq!(body["capabilities"]["holistic_model"], false);
    assert_eq!(body["capabilities"]["landmark_predictor"], false);
    assert!(body.get("last_error").is_none());
}

#[tokio::test]
async fn root_describes_the_service() {
    let (_dir, app) = test_app().await;

    let (status, body) = get(&app, "/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["module"], "mxa-analyzer");
    assert!(body["endpoints"].as_array().unwrap().len() > 3);
}

#[tokio::test]
async fn methods_lists_the_vocabulary() {
    let (_dir, app) = test_app().await;

    let (status, body) = get(&app, "/api/methods").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["methods"].as_array().unwrap().len(), 9);
    assert_eq!(body["default_methods"].as_array().unwrap().len(), 9);
}

#[tokio::test]
async fn analyze_without_image_is_rejected() {
    let (_dir, app) = test_app().await;

    let (status, body) = post_json(&app, "/api/analyze", json!({ "methods": ["hog_rf"] })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
    assert_eq!(body["error"]["message"], "No image data provided");
}

#[tokio::test]
async fn analyze_with_invalid_base64_is_rejected() {
    let (_dir, app) = test_app().await;

    let (status, body) = post_json(&app, "/api/analyze", json!({ "image": "%%% not base64 %%%" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn analyze_upload_then_query_history() {
    let (_dir, app) = test_app().await;
    let image = STANDARD.encode(helpers::gray_png(64, 64, 128));

    let (status, body) = post_json(
        &app,
        "/api/analyze",
        json!({
            "image": format!("data:image/png;base64,{}", image),
            "filename": "portrait.png",
            "methods": ["hog_rf", "bogus", "raw_pixels_lr"]
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["requested"], 3);
    assert_eq!(body["completed"], 2);
    let stored_as = body["image"].as_str().unwrap().to_string();
    assert!(stored_as.starts_with("upload_"));
    assert_eq!(body["results"][0]["original_filename"], "portrait.png");

    let (status, body) = get(&app, "/api/results").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 2);
    assert!(body["results"][0]["id"].is_i64());

    let (status, body) = get(&app, &format!("/api/results?image_path={}", stored_as)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 2);

    let (status, body) = get(&app, "/api/statistics").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_analyses"], 2);
    assert_eq!(body["timing_by_encoding"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn predict_alias_runs_default_methods() {
    let (_dir, app) = test_app().await;
    let image = STANDARD.encode(helpers::gray_png(64, 64, 40));

    let (status, body) = post_json(&app, "/predict", json!({ "image": image })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["requested"], 9);
    // No embedding backbone: the three resnet methods are skipped
    assert_eq!(body["completed"], 6);
}

#[tokio::test]
async fn results_limit_is_validated() {
    let (_dir, app) = test_app().await;

    let (status, _) = get(&app, "/api/results?limit=0").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = get(&app, "/api/results?limit=100000").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = get(&app, "/api/results?limit=5").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 0);
}

#[tokio::test]
async fn capabilities_and_reload() {
    let (_dir, app) = test_app().await;

    let (status, body) = get(&app, "/api/capabilities").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["flags"]["embedding_backbone"], false);
    assert!(body["strategies"].is_array());

    let (status, body) = post_json(&app, "/api/models/reload", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "reloaded");
    assert_eq!(body["capabilities"]["holistic_model"], false);
}

#[tokio::test]
async fn reload_picks_up_classifiers_written_after_startup() {
    let (dir, app) = test_app().await;

    std::fs::write(
        dir.path().join("models").join("rf_model.json"),
        r#"{"type": "decision_tree", "classes": ["truth", "lie"],
            "nodes": [{"leaf": {"value": [1.0, 3.0]}}]}"#,
    )
    .unwrap();

    let (status, body) = post_json(&app, "/api/models/reload", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["capabilities"]["saved_classifiers"], json!(["rf"]));

    let image = STANDARD.encode(helpers::gray_png(64, 64, 128));
    let (_, body) = post_json(&app, "/api/analyze", json!({ "image": image, "methods": ["hog_rf"] })).await;
    assert_eq!(body["results"][0]["prediction"], "lie");
    assert_eq!(body["results"][0]["prediction_source"], "saved_classifier");
}
