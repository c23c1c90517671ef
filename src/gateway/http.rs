use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::dispatch::Dispatcher;
use crate::profile::Credential;
use crate::types::{AspectRatio, BatchRequest, GenerationRequest, ProviderKind};
use crate::{ImagegateError, Result};

/// JSON request bodies above this size are refused before parsing.
pub const MAX_REQUEST_BODY_BYTES: usize = 50 * 1024 * 1024;

const LANDING_TEXT: &str = "imagegate is running. POST /generate-image with {\"prompts\": [...], \"service\": \"huggingface\"}.\n";

static REQUEST_ID_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Clone)]
pub struct GatewayHttpState {
    dispatcher: Arc<Dispatcher>,
}

impl GatewayHttpState {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    code: &'static str,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct ProviderStatus {
    name: &'static str,
    configured: bool,
}

#[derive(Debug, Serialize)]
struct ProvidersResponse {
    providers: Vec<ProviderStatus>,
}

#[derive(Debug, Deserialize)]
struct GenerateBody {
    #[serde(default)]
    service: Option<String>,
    #[serde(default)]
    prompt: Option<String>,
    #[serde(default)]
    ratio: Option<String>,
    #[serde(default)]
    num_images: Option<usize>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BatchBody {
    #[serde(default, rename = "apiKey")]
    api_key: Option<String>,
    #[serde(default)]
    prompts: Option<Vec<String>>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    ratio: Option<String>,
    #[serde(default)]
    service: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum GenerateResponse {
    Single { base64: String },
    Many { images: Vec<String> },
}

#[derive(Debug, Serialize)]
struct BatchResponse {
    data: Vec<String>,
}

pub fn router(state: GatewayHttpState) -> Router {
    Router::new()
        .route("/", get(landing))
        .route("/health", get(health))
        .route("/providers", get(list_providers))
        .route("/generate", post(handle_generate))
        .route("/generate-image", post(handle_generate_image))
        .route("/generate-video", post(handle_generate_video))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .with_state(state)
}

async fn landing(headers: HeaderMap) -> Response {
    let request_id = request_id(&headers);
    with_request_id(LANDING_TEXT.into_response(), &request_id)
}

async fn health(headers: HeaderMap) -> Response {
    let request_id = request_id(&headers);
    with_request_id(
        Json(HealthResponse { status: "ok" }).into_response(),
        &request_id,
    )
}

async fn list_providers(State(state): State<GatewayHttpState>, headers: HeaderMap) -> Response {
    let request_id = request_id(&headers);
    let providers = ProviderKind::ALL
        .into_iter()
        .map(|kind| ProviderStatus {
            name: kind.as_str(),
            configured: state.dispatcher.is_configured(kind),
        })
        .collect();
    with_request_id(
        Json(ProvidersResponse { providers }).into_response(),
        &request_id,
    )
}

async fn handle_generate(
    State(state): State<GatewayHttpState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request_id = request_id(&headers);
    let started = Instant::now();
    // Dropping the handler future (client disconnect) cancels any poll loop.
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let result = generate(&state, &headers, &body, &request_id, &cancel).await;
    finish("/generate", &request_id, started, result)
}

async fn generate(
    state: &GatewayHttpState,
    headers: &HeaderMap,
    body: &[u8],
    request_id: &str,
    cancel: &CancellationToken,
) -> Result<GenerateResponse> {
    let payload: GenerateBody = parse_body(body)?;
    let service = payload
        .service
        .as_deref()
        .filter(|service| !service.trim().is_empty())
        .ok_or_else(|| ImagegateError::Validation("service is required".to_string()))?;
    let kind = ProviderKind::parse(service)?;
    let prompt = payload
        .prompt
        .filter(|prompt| !prompt.trim().is_empty())
        .ok_or_else(|| ImagegateError::Validation("prompt must be a non-empty string".to_string()))?;

    let mut request =
        GenerationRequest::new(prompt).with_ratio(AspectRatio::parse(payload.ratio.as_deref()));
    if let Some(model) = payload.model {
        request = request.with_model(model);
    }
    let credential = caller_credential(
        extract_header(headers, "x-api-key").or_else(|| extract_bearer(headers)),
    )?;

    tracing::info!(request_id, provider = %kind, ratio = %request.ratio, num_images = ?payload.num_images, "generate request");
    match payload.num_images {
        None => {
            let bytes = state
                .dispatcher
                .dispatch(kind, &request, credential.as_ref(), cancel)
                .await?;
            Ok(GenerateResponse::Single {
                base64: base64_encode(&bytes),
            })
        }
        Some(count) => {
            let images = state
                .dispatcher
                .generate_many(kind, &request, count, credential, cancel)
                .await?;
            Ok(GenerateResponse::Many { images })
        }
    }
}

async fn handle_generate_image(
    State(state): State<GatewayHttpState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    generate_batch_route("/generate-image", state, headers, body).await
}

async fn handle_generate_video(
    State(state): State<GatewayHttpState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    generate_batch_route("/generate-video", state, headers, body).await
}

async fn generate_batch_route(
    route: &'static str,
    state: GatewayHttpState,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request_id = request_id(&headers);
    let started = Instant::now();
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let result = generate_batch(&state, &headers, &body, &request_id, &cancel).await;
    finish(route, &request_id, started, result)
}

async fn generate_batch(
    state: &GatewayHttpState,
    headers: &HeaderMap,
    body: &[u8],
    request_id: &str,
    cancel: &CancellationToken,
) -> Result<BatchResponse> {
    let payload: BatchBody = parse_body(body)?;
    let kind = match payload
        .service
        .as_deref()
        .filter(|service| !service.trim().is_empty())
    {
        Some(service) => ProviderKind::parse(service)?,
        None => ProviderKind::HuggingFace,
    };
    let credential =
        caller_credential(extract_header(headers, "x-api-key").or(payload.api_key))?;
    let prompts = payload.prompts.unwrap_or_default();

    tracing::info!(request_id, provider = %kind, prompts = prompts.len(), "batch request");
    let batch = BatchRequest::new(kind, prompts)
        .with_ratio(AspectRatio::parse(payload.ratio.as_deref()))
        .with_model(payload.model)
        .with_credential(credential);
    let data = state.dispatcher.generate_batch(&batch, cancel).await?;
    Ok(BatchResponse { data })
}

/// A blank caller key means "use the configured one"; a present but unusable
/// key is the caller's mistake.
fn caller_credential(secret: Option<String>) -> Result<Option<Credential>> {
    secret
        .filter(|secret| !secret.trim().is_empty())
        .map(Credential::new)
        .transpose()
}

fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    serde_json::from_slice(body)
        .map_err(|err| ImagegateError::Validation(format!("invalid JSON body: {err}")))
}

fn base64_encode(bytes: &[u8]) -> String {
    use base64::Engine as _;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

fn finish<T: Serialize>(
    route: &'static str,
    request_id: &str,
    started: Instant,
    result: Result<T>,
) -> Response {
    let elapsed_ms = started.elapsed().as_millis() as u64;
    let response = match result {
        Ok(body) => {
            tracing::info!(request_id, route, elapsed_ms, "request completed");
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(err) => {
            let (status, body) = error_response(&err);
            if status.is_server_error() {
                tracing::error!(request_id, route, elapsed_ms, code = body.0.code, error = %err, "request failed");
            } else {
                tracing::info!(request_id, route, elapsed_ms, code = body.0.code, error = %err, "request rejected");
            }
            (status, body).into_response()
        }
    };
    with_request_id(response, request_id)
}

fn error_response(err: &ImagegateError) -> (StatusCode, Json<ErrorResponse>) {
    let status = if err.is_client_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
            code: err.code(),
        }),
    )
}

fn extract_header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn extract_bearer(headers: &HeaderMap) -> Option<String> {
    let auth = extract_header(headers, "authorization")?;
    let rest = auth
        .strip_prefix("Bearer ")
        .or_else(|| auth.strip_prefix("bearer "))?;
    let token = rest.trim();
    (!token.is_empty()).then(|| token.to_string())
}

fn request_id(headers: &HeaderMap) -> String {
    extract_header(headers, "x-request-id").unwrap_or_else(generate_request_id)
}

fn generate_request_id() -> String {
    let seq = REQUEST_ID_SEQ.fetch_add(1, Ordering::Relaxed);
    let ts_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis())
        .unwrap_or(0);
    format!("imagegate-{ts_ms}-{seq}")
}

fn with_request_id(mut response: Response, request_id: &str) -> Response {
    if let Ok(value) = HeaderValue::from_str(request_id) {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}
