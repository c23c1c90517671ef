use thiserror::Error;

use crate::types::ProviderKind;

#[derive(Debug, Error)]
pub enum ImagegateError {
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
    #[error("no credential configured for provider {provider}")]
    MissingCredential { provider: ProviderKind },
    #[error("api error ({status}): {body}")]
    Api {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("job {id} failed: {payload}")]
    JobFailed {
        id: String,
        payload: serde_json::Value,
    },
    #[error("job {id} still pending after {attempts} status checks")]
    Timeout { id: String, attempts: u32 },
    #[error("job {id} cancelled: caller went away")]
    Cancelled { id: String },
    #[error("config error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse json: {0}")]
    Json(#[from] serde_json::Error),
}

impl ImagegateError {
    /// Errors caused by the caller's input rather than by a provider.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::UnknownProvider(_) | Self::MissingCredential { .. }
        )
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::UnknownProvider(_) => "unknown_provider",
            Self::MissingCredential { .. } => "missing_credential",
            Self::Api { .. } | Self::Http(_) | Self::Json(_) => "upstream_error",
            Self::InvalidResponse(_) => "invalid_response",
            Self::JobFailed { .. } => "job_failed",
            Self::Timeout { .. } => "timeout",
            Self::Cancelled { .. } => "cancelled",
            Self::Config(_) | Self::Io(_) => "internal_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, ImagegateError>;
