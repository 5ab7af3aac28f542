//! HttpInferenceClient against an in-process endpoint.

use axum::extract::Json;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::Router;
use bindscope_inference::{HttpInferenceClient, InferenceClient, InferenceError, InferenceRequest};
use serde_json::{json, Value};

/// Behaviour is chosen by the drug name so one server covers every case.
async fn predict(Json(body): Json<Value>) -> impl IntoResponse {
    match body["drug_name"].as_str().unwrap_or("") {
        "busy" => {
            let mut headers = HeaderMap::new();
            headers.insert("retry-after", "7".parse().unwrap());
            (StatusCode::TOO_MANY_REQUESTS, headers, Json(json!({"detail": "slow down"}))).into_response()
        }
        "invalid" => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({"detail": "Invalid SMILES string"})),
        )
            .into_response(),
        "crash" => (StatusCode::INTERNAL_SERVER_ERROR, "worker died").into_response(),
        _ => {
            let len = body["fasta"].as_str().map(str::len).unwrap_or(0) as f64;
            Json(json!({"binding_affinity_pk": 5.0 + len / 100.0, "confidence_score": 0.92})).into_response()
        }
    }
}

async fn spawn_endpoint() -> String {
    let app = Router::new().route("/predict", post(predict));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn request(drug: &str) -> InferenceRequest {
    InferenceRequest::new("CC(=O)Oc1ccccc1C(=O)O", "M".repeat(50)).with_names(drug, "COX-1")
}

#[tokio::test]
async fn test_successful_prediction() {
    let client = HttpInferenceClient::new(spawn_endpoint().await).unwrap();
    let resp = client.predict(&request("aspirin")).await.unwrap();
    assert!((resp.binding_affinity_pk - 5.5).abs() < 1e-9);
    assert!((resp.confidence_percent() - 92.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_rate_limit_is_distinguished() {
    let client = HttpInferenceClient::new(spawn_endpoint().await).unwrap();
    let err = client.predict(&request("busy")).await.unwrap_err();
    assert!(matches!(err, InferenceError::RateLimited { retry_after_secs: Some(7) }));
}

#[tokio::test]
async fn test_validation_error_carries_detail() {
    let client = HttpInferenceClient::new(spawn_endpoint().await).unwrap();
    let err = client.predict(&request("invalid")).await.unwrap_err();
    match err {
        InferenceError::Api { status, message } => {
            assert_eq!(status, 422);
            assert_eq!(message, "Invalid SMILES string");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_plain_text_error_body() {
    let client = HttpInferenceClient::new(spawn_endpoint().await).unwrap();
    let err = client.predict(&request("crash")).await.unwrap_err();
    assert!(matches!(err, InferenceError::Api { status: 500, ref message } if message == "worker died"));
}

#[tokio::test]
async fn test_unreachable_endpoint_is_http_error() {
    // Bind then drop to get a port with nothing listening
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = HttpInferenceClient::new(format!("http://{addr}")).unwrap();
    let err = client.predict(&request("aspirin")).await.unwrap_err();
    assert!(matches!(err, InferenceError::Http(_)));
}
