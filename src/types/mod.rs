mod dimensions;

use serde::{Deserialize, Serialize};

use crate::profile::Credential;
use crate::{ImagegateError, Result};

pub use dimensions::{
    AspectRatio, DimensionTable, Dimensions, HUGGINGFACE_DIMENSIONS, OPENAI_DIMENSIONS,
    REPLICATE_DIMENSIONS, STABILITY_DIMENSIONS,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[serde(alias = "hf")]
    HuggingFace,
    #[serde(alias = "stabilityai")]
    Stability,
    #[serde(rename = "openai", alias = "dalle")]
    OpenAi,
    Replicate,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 4] = [
        ProviderKind::HuggingFace,
        ProviderKind::Stability,
        ProviderKind::OpenAi,
        ProviderKind::Replicate,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::HuggingFace => "huggingface",
            Self::Stability => "stability",
            Self::OpenAi => "openai",
            Self::Replicate => "replicate",
        }
    }

    pub fn parse(token: &str) -> Result<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "huggingface" | "hf" => Ok(Self::HuggingFace),
            "stability" | "stabilityai" => Ok(Self::Stability),
            "openai" | "dalle" => Ok(Self::OpenAi),
            "replicate" => Ok(Self::Replicate),
            _ => Err(ImagegateError::UnknownProvider(token.trim().to_string())),
        }
    }

    pub fn dimension_table(self) -> &'static DimensionTable {
        match self {
            Self::HuggingFace => &HUGGINGFACE_DIMENSIONS,
            Self::Stability => &STABILITY_DIMENSIONS,
            Self::OpenAi => &OPENAI_DIMENSIONS,
            Self::Replicate => &REPLICATE_DIMENSIONS,
        }
    }

    pub fn dimensions(self, ratio: AspectRatio) -> Dimensions {
        self.dimension_table().resolve(ratio)
    }

    /// Environment keys consulted, in order, when no `api_key_env` is configured.
    pub fn default_credential_keys(self) -> &'static [&'static str] {
        match self {
            Self::HuggingFace => &["HUGGINGFACE_API_KEY", "HF_API_TOKEN"],
            Self::Stability => &["STABILITY_API_KEY"],
            Self::OpenAi => &["OPENAI_API_KEY"],
            Self::Replicate => &["REPLICATE_API_TOKEN", "REPLICATE_API_KEY"],
        }
    }

    pub fn model_env_key(self) -> &'static str {
        match self {
            Self::HuggingFace => "HUGGINGFACE_MODEL",
            Self::Stability => "STABILITY_ENGINE",
            Self::OpenAi => "OPENAI_IMAGE_MODEL",
            Self::Replicate => "REPLICATE_MODEL_VERSION",
        }
    }

    pub fn base_url_env_key(self) -> &'static str {
        match self {
            Self::HuggingFace => "HUGGINGFACE_BASE_URL",
            Self::Stability => "STABILITY_BASE_URL",
            Self::OpenAi => "OPENAI_BASE_URL",
            Self::Replicate => "REPLICATE_BASE_URL",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = ImagegateError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// One prompt bound for one provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    #[serde(default)]
    pub ratio: AspectRatio,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ratio: AspectRatio::default(),
            model: None,
        }
    }

    pub fn with_ratio(mut self, ratio: AspectRatio) -> Self {
        self.ratio = ratio;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// The requested model, ignoring blank values.
    pub fn model(&self) -> Option<&str> {
        self.model.as_deref().map(str::trim).filter(|m| !m.is_empty())
    }
}

/// Several prompts for the same provider; results keep the prompt order.
#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub provider: ProviderKind,
    pub prompts: Vec<String>,
    pub ratio: AspectRatio,
    pub model: Option<String>,
    pub credential: Option<Credential>,
}

impl BatchRequest {
    pub fn new(provider: ProviderKind, prompts: Vec<String>) -> Self {
        Self {
            provider,
            prompts,
            ratio: AspectRatio::default(),
            model: None,
            credential: None,
        }
    }

    pub fn with_ratio(mut self, ratio: AspectRatio) -> Self {
        self.ratio = ratio;
        self
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    pub fn with_credential(mut self, credential: Option<Credential>) -> Self {
        self.credential = credential;
        self
    }

    pub(crate) fn request_for(&self, prompt: &str) -> GenerationRequest {
        GenerationRequest {
            prompt: prompt.to_string(),
            ratio: self.ratio,
            model: self.model.clone(),
        }
    }
}
