use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use super::poll::{self, Job, JobClient};
use crate::image::ImageGenerationModel;
use crate::profile::{Credential, Env, PollConfig, ProviderConfig};
use crate::types::{GenerationRequest, ProviderKind};
use crate::utils::http::{
    MAX_RESPONSE_BODY_BYTES, build_http_client, send_checked_bytes, send_checked_json,
};
use crate::{ImagegateError, Result};

pub const DEFAULT_BASE_URL: &str = "https://api.replicate.com/v1";

/// Prediction API: submit a job, poll it by id, download the produced asset.
#[derive(Clone)]
pub struct ReplicateImages {
    http: reqwest::Client,
    base_url: String,
    model_version: String,
    poll: PollConfig,
}

impl Default for ReplicateImages {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplicateImages {
    pub fn new() -> Self {
        Self {
            http: build_http_client(std::time::Duration::from_secs(300)),
            base_url: DEFAULT_BASE_URL.to_string(),
            model_version: String::new(),
            poll: PollConfig::default(),
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

    pub fn with_model_version(mut self, version: impl Into<String>) -> Self {
        self.model_version = version.into();
        self
    }

    pub fn with_poll_config(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    pub fn from_config(config: &ProviderConfig, env: &Env, poll: PollConfig) -> Self {
        let kind = ProviderKind::Replicate;
        let mut out = Self::new()
            .with_http_client(build_http_client(config.timeout()))
            .with_poll_config(poll);
        if let Some(base_url) = config.resolve_base_url(kind, env) {
            out = out.with_base_url(base_url);
        }
        if let Some(version) = config.resolve_model(kind, env) {
            out = out.with_model_version(version);
        }
        out
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    fn resolve_version<'a>(&'a self, request: &'a GenerationRequest) -> Result<&'a str> {
        if let Some(version) = request.model() {
            return Ok(version);
        }
        if !self.model_version.trim().is_empty() {
            return Ok(self.model_version.trim());
        }
        Err(ImagegateError::Validation(
            "replicate model version is not set (pass a model or set REPLICATE_MODEL_VERSION)"
                .to_string(),
        ))
    }

    fn prediction_body(&self, request: &GenerationRequest) -> Result<Value> {
        let version = self.resolve_version(request)?;
        let dims = ProviderKind::Replicate.dimensions(request.ratio);
        Ok(json!({
            "version": version,
            "input": {
                "prompt": request.prompt,
                "width": dims.width,
                "height": dims.height,
            },
        }))
    }

    /// Runs one prediction to completion, stopping early once `cancel` fires.
    pub async fn generate_cancellable(
        &self,
        request: &GenerationRequest,
        credential: &Credential,
        cancel: &CancellationToken,
    ) -> Result<Bytes> {
        let body = self.prediction_body(request)?;
        let jobs = PredictionClient {
            images: self,
            credential,
        };
        poll::run_job(&jobs, &body, &self.poll, cancel).await
    }
}

/// A [`ReplicateImages`] bound to one caller's credential.
struct PredictionClient<'a> {
    images: &'a ReplicateImages,
    credential: &'a Credential,
}

#[async_trait]
impl JobClient for PredictionClient<'_> {
    type Submission = Value;

    async fn submit(&self, submission: &Value) -> Result<Job> {
        let url = self.images.endpoint("predictions");
        let req = self
            .credential
            .apply(self.images.http.post(url))
            .json(submission);
        Job::from_value(send_checked_json::<Value>(req).await?)
    }

    async fn status(&self, id: &str) -> Result<Job> {
        let url = self.images.endpoint(&format!("predictions/{id}"));
        let req = self.credential.apply(self.images.http.get(url));
        Job::from_value(send_checked_json::<Value>(req).await?)
    }

    async fn download(&self, url: &str) -> Result<Bytes> {
        send_checked_bytes(self.images.http.get(url), MAX_RESPONSE_BODY_BYTES).await
    }
}

#[async_trait]
impl ImageGenerationModel for ReplicateImages {
    fn provider(&self) -> ProviderKind {
        ProviderKind::Replicate
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
        credential: &Credential,
    ) -> Result<Bytes> {
        self.generate_cancellable(request, credential, &CancellationToken::new())
            .await
    }
}
