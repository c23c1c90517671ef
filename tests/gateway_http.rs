#![cfg(feature = "gateway")]

use std::time::Duration;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use httpmock::{Method::GET, Method::POST, MockServer};
use imagegate::gateway::{GatewayHttpState, router};
use imagegate::utils::test_support::{FAKE_PNG, should_skip_httpmock};
use imagegate::{
    Credential, Dispatcher, HuggingFaceImages, OpenAIImages, PollConfig, ProviderKind,
    ReplicateImages, StabilityImages,
};
use serde_json::{Value, json};
use tower::util::ServiceExt;

fn unconfigured_app() -> axum::Router {
    let dispatcher = Dispatcher::new()
        .with_adapter(HuggingFaceImages::new().with_base_url("http://127.0.0.1:9"))
        .with_adapter(StabilityImages::new().with_base_url("http://127.0.0.1:9"))
        .with_adapter(OpenAIImages::new().with_base_url("http://127.0.0.1:9"))
        .with_adapter(ReplicateImages::new().with_base_url("http://127.0.0.1:9"));
    router(GatewayHttpState::new(dispatcher))
}

fn hf_app(server: &MockServer) -> axum::Router {
    let dispatcher = Dispatcher::new()
        .with_adapter(HuggingFaceImages::new().with_base_url(server.base_url()))
        .with_credential(
            ProviderKind::HuggingFace,
            Credential::new("hf-configured").expect("credential"),
        );
    router(GatewayHttpState::new(dispatcher))
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn b64(bytes: &[u8]) -> String {
    use base64::Engine as _;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

#[tokio::test]
async fn landing_and_health_carry_request_ids() {
    let app = unconfigured_app();

    let request = Request::builder()
        .uri("/")
        .header("x-request-id", "req-landing")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("x-request-id").unwrap(),
        "req-landing"
    );
    let text = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert!(String::from_utf8_lossy(&text).contains("imagegate"));

    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let generated = response
        .headers()
        .get("x-request-id")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(generated.starts_with("imagegate-"), "{generated}");
    assert_eq!(json_body(response).await, json!({ "status": "ok" }));
}

#[tokio::test]
async fn providers_report_configuration_without_secrets() {
    let dispatcher = Dispatcher::new()
        .with_adapter(OpenAIImages::new())
        .with_credential(
            ProviderKind::OpenAi,
            Credential::new("sk-secret").expect("credential"),
        );
    let app = router(GatewayHttpState::new(dispatcher));

    let request = Request::builder()
        .uri("/providers")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let providers = body["providers"].as_array().unwrap();
    assert_eq!(providers.len(), 4);
    let openai = providers
        .iter()
        .find(|entry| entry["name"] == "openai")
        .unwrap();
    assert_eq!(openai["configured"], true);
    let replicate = providers
        .iter()
        .find(|entry| entry["name"] == "replicate")
        .unwrap();
    assert_eq!(replicate["configured"], false);
    assert!(!body.to_string().contains("sk-secret"));
}

#[tokio::test]
async fn unknown_service_is_rejected_with_400() {
    let app = unconfigured_app();
    let response = app
        .oneshot(post_json(
            "/generate",
            json!({ "service": "midjourney", "prompt": "a red cube" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(response.headers().contains_key("x-request-id"));
    let body = json_body(response).await;
    assert_eq!(body["code"], "unknown_provider");
    assert!(body["error"].as_str().unwrap().contains("midjourney"));
}

#[tokio::test]
async fn batch_without_any_credential_is_rejected_with_400() {
    let app = unconfigured_app();
    let response = app
        .oneshot(post_json(
            "/generate-image",
            json!({ "prompts": ["a red cube"], "service": "openai" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["code"], "missing_credential");
}

#[tokio::test]
async fn malformed_bodies_are_validation_errors() {
    let app = unconfigured_app();

    let request = Request::builder()
        .method("POST")
        .uri("/generate-image")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["code"], "validation_error");

    let response = app
        .clone()
        .oneshot(post_json("/generate-image", json!({ "prompts": [] })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(post_json("/generate", json!({ "service": "openai" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(
        json_body(response).await["error"]
            .as_str()
            .unwrap()
            .contains("prompt")
    );
}

#[tokio::test]
async fn batch_returns_images_in_prompt_order() {
    if should_skip_httpmock() {
        return;
    }
    let server = MockServer::start_async().await;
    let first = server
        .mock_async(|when, then| {
            when.method(POST)
                .header("authorization", "Bearer hf-from-header")
                .body_includes("\"inputs\":\"first\"")
                .body_includes("\"width\":1024")
                .body_includes("\"height\":576");
            then.status(200).body([1u8, 2, 3]);
        })
        .await;
    let second = server
        .mock_async(|when, then| {
            when.method(POST)
                .header("authorization", "Bearer hf-from-header")
                .body_includes("\"inputs\":\"second\"");
            then.status(200).body(FAKE_PNG);
        })
        .await;

    let request = Request::builder()
        .method("POST")
        .uri("/generate-image")
        .header("content-type", "application/json")
        .header("x-api-key", "hf-from-header")
        .body(Body::from(
            json!({ "prompts": ["first", "second"], "ratio": "16:9", "apiKey": "ignored" })
                .to_string(),
        ))
        .unwrap();
    let response = hf_app(&server).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    first.assert_async().await;
    second.assert_async().await;
    assert_eq!(
        json_body(response).await,
        json!({ "data": ["AQID", b64(FAKE_PNG)] })
    );
}

#[tokio::test]
async fn video_route_shares_the_batch_contract() {
    if should_skip_httpmock() {
        return;
    }
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .header("authorization", "Bearer body-key")
                .body_includes("\"inputs\":\"a wave\"");
            then.status(200).body(FAKE_PNG);
        })
        .await;

    let response = hf_app(&server)
        .oneshot(post_json(
            "/generate-video",
            json!({ "prompts": ["a wave"], "apiKey": "body-key" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    mock.assert_async().await;
    assert_eq!(json_body(response).await["data"][0], b64(FAKE_PNG));
}

#[tokio::test]
async fn generate_returns_single_or_many_images() {
    if should_skip_httpmock() {
        return;
    }
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .header("authorization", "Bearer hf-configured")
                .body_includes("\"inputs\":\"a fox\"");
            then.status(200).body(FAKE_PNG);
        })
        .await;
    let app = hf_app(&server);

    let response = app
        .clone()
        .oneshot(post_json(
            "/generate",
            json!({ "service": "huggingface", "prompt": "a fox" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({ "base64": b64(FAKE_PNG) }));

    let response = app
        .oneshot(post_json(
            "/generate",
            json!({ "service": "hf", "prompt": "a fox", "num_images": 2 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["images"].as_array().unwrap().len(), 2);
    mock.assert_calls_async(3).await;
}

#[tokio::test]
async fn upstream_failure_maps_to_500_with_message() {
    if should_skip_httpmock() {
        return;
    }
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST);
            then.status(500).body("rate limited");
        })
        .await;

    let response = hf_app(&server)
        .oneshot(post_json(
            "/generate-image",
            json!({ "prompts": ["a red cube"] }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert_eq!(body["code"], "upstream_error");
    let message = body["error"].as_str().unwrap();
    assert!(message.contains("500"), "{message}");
    assert!(message.contains("rate limited"), "{message}");
    assert!(!message.contains("Api {"), "{message}");
}

#[tokio::test]
async fn replicate_batch_polls_and_downloads() {
    if should_skip_httpmock() {
        return;
    }
    let server = MockServer::start_async().await;
    let output_url = server.url("/files/out.png");
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/predictions")
                .body_includes("\"version\":\"v-1\"");
            then.status(201)
                .header("content-type", "application/json")
                .body(json!({ "id": "pred-9", "status": "starting" }).to_string());
        })
        .await;
    let status = server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/predictions/pred-9");
            then.status(200)
                .header("content-type", "application/json")
                .body(json!({ "id": "pred-9", "status": "succeeded", "output": output_url }).to_string());
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/files/out.png");
            then.status(200).body(FAKE_PNG);
        })
        .await;

    let replicate = ReplicateImages::new()
        .with_base_url(server.url("/v1"))
        .with_model_version("v-1")
        .with_poll_config(PollConfig::new(Duration::from_millis(1), 20));
    let dispatcher = Dispatcher::new()
        .with_adapter(replicate)
        .with_credential(
            ProviderKind::Replicate,
            Credential::new("r8").expect("credential"),
        );
    let response = router(GatewayHttpState::new(dispatcher))
        .oneshot(post_json(
            "/generate-image",
            json!({ "prompts": ["a red cube"], "service": "replicate" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    status.assert_calls_async(1).await;
    assert_eq!(json_body(response).await["data"][0], b64(FAKE_PNG));
}

#[tokio::test]
async fn unusable_body_api_key_is_a_validation_error() {
    let app = unconfigured_app();
    let response = app
        .oneshot(post_json(
            "/generate-image",
            json!({ "prompts": ["a red cube"], "apiKey": "cl\u{e9}\n" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["code"], "validation_error");
    let message = body["error"].as_str().unwrap();
    assert!(message.contains("api key"), "{message}");
    assert!(!message.contains("127.0.0.1"), "{message}");
}

#[tokio::test]
async fn dropping_a_pending_request_stops_status_polling() {
    if should_skip_httpmock() {
        return;
    }
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/predictions");
            then.status(201)
                .header("content-type", "application/json")
                .body(json!({ "id": "pred-slow", "status": "starting" }).to_string());
        })
        .await;
    let status = server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/predictions/pred-slow");
            then.status(200)
                .header("content-type", "application/json")
                .body(json!({ "id": "pred-slow", "status": "processing" }).to_string());
        })
        .await;

    let replicate = ReplicateImages::new()
        .with_base_url(server.url("/v1"))
        .with_model_version("v-1")
        .with_poll_config(PollConfig::new(Duration::from_millis(10), 10_000));
    let dispatcher = Dispatcher::new()
        .with_adapter(replicate)
        .with_credential(
            ProviderKind::Replicate,
            Credential::new("r8").expect("credential"),
        );
    let app = router(GatewayHttpState::new(dispatcher));

    let pending = tokio::time::timeout(
        Duration::from_millis(200),
        app.oneshot(post_json(
            "/generate-image",
            json!({ "prompts": ["a red cube"], "service": "replicate" }),
        )),
    )
    .await;
    assert!(pending.is_err(), "request finished while the job was pending");

    tokio::time::sleep(Duration::from_millis(50)).await;
    let polled = status.calls_async().await;
    assert!(polled > 0);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(status.calls_async().await, polled);
}
