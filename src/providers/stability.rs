use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use serde_json::json;

use crate::image::ImageGenerationModel;
use crate::profile::{Credential, Env, ProviderConfig};
use crate::types::{GenerationRequest, ProviderKind};
use crate::utils::http::{
    MAX_RESPONSE_BODY_BYTES, build_http_client, send_checked_bytes, send_checked_json,
};
use crate::{ImagegateError, Result};

pub const DEFAULT_BASE_URL: &str = "https://api.stability.ai";

#[derive(Debug, Deserialize)]
struct Engine {
    id: String,
}

/// Diffusion API. Every generation first lists the engines available to the
/// credential and renders with the first one.
#[derive(Clone)]
pub struct StabilityImages {
    http: reqwest::Client,
    base_url: String,
    preferred_engine: Option<String>,
}

impl Default for StabilityImages {
    fn default() -> Self {
        Self::new()
    }
}

impl StabilityImages {
    pub fn new() -> Self {
        Self {
            http: build_http_client(std::time::Duration::from_secs(300)),
            base_url: DEFAULT_BASE_URL.to_string(),
            preferred_engine: None,
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

    /// Engine to use when the listing contains it; otherwise the first listed
    /// engine wins.
    pub fn with_preferred_engine(mut self, engine: impl Into<String>) -> Self {
        self.preferred_engine = Some(engine.into());
        self
    }

    pub fn from_config(config: &ProviderConfig, env: &Env) -> Self {
        let kind = ProviderKind::Stability;
        let mut out = Self::new().with_http_client(build_http_client(config.timeout()));
        if let Some(base_url) = config.resolve_base_url(kind, env) {
            out = out.with_base_url(base_url);
        }
        if let Some(engine) = config.resolve_model(kind, env) {
            out = out.with_preferred_engine(engine);
        }
        out
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn list_engines(&self, credential: &Credential) -> Result<Vec<Engine>> {
        let req = credential.apply(self.http.get(self.endpoint("v1/engines/list")));
        send_checked_json::<Vec<Engine>>(req).await
    }

    async fn select_engine(
        &self,
        request: &GenerationRequest,
        credential: &Credential,
    ) -> Result<String> {
        let engines = self.list_engines(credential).await?;
        let wanted = request.model().or(self.preferred_engine.as_deref());
        if let Some(wanted) = wanted {
            if let Some(engine) = engines.iter().find(|engine| engine.id == wanted) {
                return Ok(engine.id.clone());
            }
            tracing::warn!(provider = "stability", engine = %wanted, "requested engine not listed; using first engine");
        }
        engines
            .into_iter()
            .next()
            .map(|engine| engine.id)
            .ok_or_else(|| {
                ImagegateError::InvalidResponse("stability engine list returned no engines".to_string())
            })
    }
}

#[async_trait]
impl ImageGenerationModel for StabilityImages {
    fn provider(&self) -> ProviderKind {
        ProviderKind::Stability
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
        credential: &Credential,
    ) -> Result<Bytes> {
        let engine = self.select_engine(request, credential).await?;
        let dims = self.provider().dimensions(request.ratio);
        let body = json!({
            "text_prompts": [{ "text": request.prompt }],
            "width": dims.width,
            "height": dims.height,
            "samples": 1,
            "cfg_scale": 7,
            "steps": 30,
        });

        tracing::debug!(provider = "stability", %engine, width = dims.width, height = dims.height, "submitting prompt");
        let url = self.endpoint(&format!("v1/generation/{engine}/text-to-image"));
        let req = credential
            .apply(self.http.post(url))
            .header(reqwest::header::ACCEPT, "image/png")
            .json(&body);
        send_checked_bytes(req, MAX_RESPONSE_BODY_BYTES).await
    }
}
