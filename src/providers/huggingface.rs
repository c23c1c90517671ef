use async_trait::async_trait;
use bytes::Bytes;
use serde_json::json;

use crate::image::ImageGenerationModel;
use crate::profile::{Credential, Env, ProviderConfig};
use crate::types::{GenerationRequest, ProviderKind};
use crate::utils::http::{MAX_RESPONSE_BODY_BYTES, build_http_client, send_checked_bytes};
use crate::{ImagegateError, Result};

pub const DEFAULT_BASE_URL: &str = "https://api-inference.huggingface.co";
pub const DEFAULT_MODEL: &str = "stabilityai/stable-diffusion-xl-base-1.0";

/// Hosted inference API; answers with the raw image body.
#[derive(Clone)]
pub struct HuggingFaceImages {
    http: reqwest::Client,
    base_url: String,
    model: String,
}

impl Default for HuggingFaceImages {
    fn default() -> Self {
        Self::new()
    }
}

impl HuggingFaceImages {
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
        let kind = ProviderKind::HuggingFace;
        let mut out = Self::new().with_http_client(build_http_client(config.timeout()));
        if let Some(base_url) = config.resolve_base_url(kind, env) {
            out = out.with_base_url(base_url);
        }
        if let Some(model) = config.resolve_model(kind, env) {
            out = out.with_model(model);
        }
        out
    }

    fn model_url(&self, model: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        let model = model.trim_matches('/');
        if base.ends_with("/models") {
            format!("{base}/{model}")
        } else {
            format!("{base}/models/{model}")
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
            "huggingface model is not set (pass a model or set HUGGINGFACE_MODEL)".to_string(),
        ))
    }
}

#[async_trait]
impl ImageGenerationModel for HuggingFaceImages {
    fn provider(&self) -> ProviderKind {
        ProviderKind::HuggingFace
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
        credential: &Credential,
    ) -> Result<Bytes> {
        let model = self.resolve_model(request)?;
        let dims = self.provider().dimensions(request.ratio);
        let body = json!({
            "inputs": request.prompt,
            "options": { "wait_for_model": true },
            "parameters": { "width": dims.width, "height": dims.height },
        });

        let url = self.model_url(model);
        tracing::debug!(provider = "huggingface", %model, width = dims.width, height = dims.height, "submitting prompt");
        let req = credential.apply(self.http.post(url)).json(&body);
        send_checked_bytes(req, MAX_RESPONSE_BODY_BYTES).await
    }
}
