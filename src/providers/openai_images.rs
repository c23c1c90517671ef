use async_trait::async_trait;
use base64::Engine as _;
use bytes::Bytes;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::image::ImageGenerationModel;
use crate::profile::{Credential, Env, ProviderConfig};
use crate::types::{GenerationRequest, ProviderKind};
use crate::utils::http::{build_http_client, send_checked_json};
use crate::{ImagegateError, Result};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "dall-e-3";

#[derive(Debug, Deserialize)]
struct ImagesGenerationResponse {
    #[serde(default)]
    data: Vec<ImageGenerationData>,
}

#[derive(Debug, Deserialize)]
struct ImageGenerationData {
    #[serde(default)]
    b64_json: Option<String>,
}

/// Multimodal images endpoint. The image comes back base64-encoded inside a
/// JSON envelope and is decoded here so every adapter yields raw bytes.
#[derive(Clone)]
pub struct OpenAIImages {
    http: reqwest::Client,
    base_url: String,
    model: String,
}

impl Default for OpenAIImages {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenAIImages {
    pub fn new() -> Self {
        Self {
            http: build_http_client(std::time::Duration::from_secs(300)),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn from_config(config: &ProviderConfig, env: &Env) -> Self {
        let kind = ProviderKind::OpenAi;
        let mut out = Self::new().with_http_client(build_http_client(config.timeout()));
        if let Some(base_url) = config.resolve_base_url(kind, env) {
            out = out.with_base_url(base_url);
        }
        if let Some(model) = config.resolve_model(kind, env) {
            out = out.with_model(model);
        }
        out
    }

    fn images_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if base.ends_with("/images/generations") {
            base.to_string()
        } else {
            format!("{base}/images/generations")
        }
    }

    fn resolve_model<'a>(&'a self, request: &'a GenerationRequest) -> Result<&'a str> {
        if let Some(model) = request.model() {
            return Ok(model);
        }
        if !self.model.trim().is_empty() {
            return Ok(self.model.as_str());
        }
        Err(ImagegateError::Validation(
            "openai image model is not set (pass a model or set OPENAI_IMAGE_MODEL)".to_string(),
        ))
    }
}

fn first_encoded_image(parsed: ImagesGenerationResponse) -> Result<Bytes> {
    let encoded = parsed
        .data
        .into_iter()
        .next()
        .and_then(|item| item.b64_json)
        .filter(|data| !data.trim().is_empty())
        .ok_or_else(|| {
            ImagegateError::InvalidResponse(
                "openai image response is missing data[0].b64_json".to_string(),
            )
        })?;
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|err| {
            ImagegateError::InvalidResponse(format!("openai image is not valid base64: {err}"))
        })?;
    Ok(Bytes::from(decoded))
}

#[async_trait]
impl ImageGenerationModel for OpenAIImages {
    fn provider(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
        credential: &Credential,
    ) -> Result<Bytes> {
        let model = self.resolve_model(request)?;
        let dims = self.provider().dimensions(request.ratio);

        let mut body = Map::<String, Value>::new();
        body.insert("model".to_string(), Value::String(model.to_string()));
        body.insert("prompt".to_string(), Value::String(request.prompt.clone()));
        body.insert("n".to_string(), Value::Number(1.into()));
        body.insert("size".to_string(), Value::String(dims.size_string()));
        body.insert(
            "response_format".to_string(),
            Value::String("b64_json".to_string()),
        );

        tracing::debug!(provider = "openai", %model, size = %dims.size_string(), "submitting prompt");
        let req = credential.apply(self.http.post(self.images_url())).json(&body);
        let parsed = send_checked_json::<ImagesGenerationResponse>(req).await?;
        first_encoded_image(parsed)
    }
}
