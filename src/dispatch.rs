//! Routes a request to the adapter for its provider tag.

use std::collections::HashMap;

use base64::Engine as _;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::image::ImageGenerationModel;
use crate::profile::{Credential, Env, ImagegateConfig};
use crate::providers::{HuggingFaceImages, OpenAIImages, ReplicateImages, StabilityImages};
use crate::types::{BatchRequest, GenerationRequest, ProviderKind};
use crate::{ImagegateError, Result};

pub const MAX_IMAGES_PER_REQUEST: usize = 4;

#[derive(Clone)]
pub enum ProviderAdapter {
    HuggingFace(HuggingFaceImages),
    Stability(StabilityImages),
    OpenAi(OpenAIImages),
    Replicate(ReplicateImages),
}

impl ProviderAdapter {
    pub fn kind(&self) -> ProviderKind {
        match self {
            Self::HuggingFace(_) => ProviderKind::HuggingFace,
            Self::Stability(_) => ProviderKind::Stability,
            Self::OpenAi(_) => ProviderKind::OpenAi,
            Self::Replicate(_) => ProviderKind::Replicate,
        }
    }

    /// Only the polling adapter observes `cancel`; synchronous adapters are
    /// stopped by dropping their future.
    pub async fn generate(
        &self,
        request: &GenerationRequest,
        credential: &Credential,
        cancel: &CancellationToken,
    ) -> Result<Bytes> {
        match self {
            Self::HuggingFace(adapter) => adapter.generate(request, credential).await,
            Self::Stability(adapter) => adapter.generate(request, credential).await,
            Self::OpenAi(adapter) => adapter.generate(request, credential).await,
            Self::Replicate(adapter) => {
                adapter
                    .generate_cancellable(request, credential, cancel)
                    .await
            }
        }
    }
}

impl From<HuggingFaceImages> for ProviderAdapter {
    fn from(adapter: HuggingFaceImages) -> Self {
        Self::HuggingFace(adapter)
    }
}

impl From<StabilityImages> for ProviderAdapter {
    fn from(adapter: StabilityImages) -> Self {
        Self::Stability(adapter)
    }
}

impl From<OpenAIImages> for ProviderAdapter {
    fn from(adapter: OpenAIImages) -> Self {
        Self::OpenAi(adapter)
    }
}

impl From<ReplicateImages> for ProviderAdapter {
    fn from(adapter: ReplicateImages) -> Self {
        Self::Replicate(adapter)
    }
}

/// Adapters plus the credentials configured at startup. Read-only once built.
#[derive(Clone, Default)]
pub struct Dispatcher {
    adapters: HashMap<ProviderKind, ProviderAdapter>,
    credentials: HashMap<ProviderKind, Credential>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_adapter(mut self, adapter: impl Into<ProviderAdapter>) -> Self {
        let adapter = adapter.into();
        self.adapters.insert(adapter.kind(), adapter);
        self
    }

    pub fn with_credential(mut self, kind: ProviderKind, credential: Credential) -> Self {
        self.credentials.insert(kind, credential);
        self
    }

    /// Builds every adapter. Providers without a credential are still routable
    /// so a per-request key can be supplied.
    pub fn from_config(config: &ImagegateConfig, env: &Env) -> Self {
        let mut out = Self::new();
        for kind in ProviderKind::ALL {
            let provider = config.provider(kind);
            let adapter: ProviderAdapter = match kind {
                ProviderKind::HuggingFace => HuggingFaceImages::from_config(&provider, env).into(),
                ProviderKind::Stability => StabilityImages::from_config(&provider, env).into(),
                ProviderKind::OpenAi => OpenAIImages::from_config(&provider, env).into(),
                ProviderKind::Replicate => {
                    ReplicateImages::from_config(&provider, env, config.poll).into()
                }
            };
            out = out.with_adapter(adapter);
            match provider.resolve_credential(kind, env) {
                Some(credential) => out = out.with_credential(kind, credential),
                None => tracing::warn!(
                    provider = %kind,
                    keys = ?kind.default_credential_keys(),
                    "no credential configured; requests must supply one"
                ),
            }
        }
        out
    }

    pub fn is_configured(&self, kind: ProviderKind) -> bool {
        self.credentials.contains_key(&kind)
    }

    fn adapter(&self, kind: ProviderKind) -> Result<&ProviderAdapter> {
        self.adapters
            .get(&kind)
            .ok_or_else(|| ImagegateError::UnknownProvider(kind.to_string()))
    }

    fn credential<'a>(
        &'a self,
        kind: ProviderKind,
        override_credential: Option<&'a Credential>,
    ) -> Result<&'a Credential> {
        override_credential
            .or_else(|| self.credentials.get(&kind))
            .ok_or(ImagegateError::MissingCredential { provider: kind })
    }

    pub async fn dispatch(
        &self,
        kind: ProviderKind,
        request: &GenerationRequest,
        credential: Option<&Credential>,
        cancel: &CancellationToken,
    ) -> Result<Bytes> {
        let adapter = self.adapter(kind)?;
        let credential = self.credential(kind, credential)?;
        adapter.generate(request, credential, cancel).await
    }

    /// Runs the prompts one after another and returns base64 images in prompt
    /// order. The first failure aborts the batch and nothing partial is returned.
    pub async fn generate_batch(
        &self,
        batch: &BatchRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>> {
        if batch.prompts.is_empty() {
            return Err(ImagegateError::Validation(
                "prompts must be a non-empty array".to_string(),
            ));
        }
        if let Some(index) = batch.prompts.iter().position(|p| p.trim().is_empty()) {
            return Err(ImagegateError::Validation(format!(
                "prompts[{index}] must be a non-empty string"
            )));
        }

        let kind = batch.provider;
        let adapter = self.adapter(kind)?;
        let credential = self.credential(kind, batch.credential.as_ref())?;

        let mut images = Vec::with_capacity(batch.prompts.len());
        for (index, prompt) in batch.prompts.iter().enumerate() {
            let request = batch.request_for(prompt);
            tracing::info!(provider = %kind, index, ratio = %request.ratio, "generating image");
            let bytes = adapter
                .generate(&request, credential, cancel)
                .await
                .inspect_err(|err| {
                    tracing::warn!(provider = %kind, index, error = %err, "generation failed; aborting batch")
                })?;
            images.push(base64::engine::general_purpose::STANDARD.encode(&bytes));
        }
        Ok(images)
    }

    /// The same prompt `count` times, for the `num_images` field.
    pub async fn generate_many(
        &self,
        kind: ProviderKind,
        request: &GenerationRequest,
        count: usize,
        credential: Option<Credential>,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>> {
        if !(1..=MAX_IMAGES_PER_REQUEST).contains(&count) {
            return Err(ImagegateError::Validation(format!(
                "num_images must be between 1 and {MAX_IMAGES_PER_REQUEST}"
            )));
        }
        let batch = BatchRequest::new(kind, vec![request.prompt.clone(); count])
            .with_ratio(request.ratio)
            .with_model(request.model.clone())
            .with_credential(credential);
        self.generate_batch(&batch, cancel).await
    }
}
