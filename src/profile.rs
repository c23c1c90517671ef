use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use reqwest::header::{AUTHORIZATION, HeaderValue};
use serde::{Deserialize, Serialize};

use crate::types::ProviderKind;
use crate::{ImagegateError, Result};

mod env;

pub use env::{Env, parse_dotenv};

pub const DEFAULT_LISTEN: &str = "127.0.0.1:3000";

/// A provider secret, held as a ready `Authorization` value. Never printed by
/// `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(HeaderValue);

impl Credential {
    /// Rejects blank secrets and secrets that cannot travel in an HTTP header.
    pub fn new(secret: impl Into<String>) -> Result<Self> {
        let secret = secret.into();
        let secret = secret.trim();
        if secret.is_empty() {
            return Err(ImagegateError::Validation(
                "api key must be non-empty".to_string(),
            ));
        }
        let mut value = HeaderValue::from_str(&format!("Bearer {secret}")).map_err(|_| {
            ImagegateError::Validation(
                "api key contains characters not allowed in an HTTP header".to_string(),
            )
        })?;
        value.set_sensitive(true);
        Ok(Self(value))
    }

    pub(crate) fn apply(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header(AUTHORIZATION, self.0.clone())
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_poll_max_attempts() -> u32 {
    20
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_poll_max_attempts")]
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_poll_interval_ms(),
            max_attempts: default_poll_max_attempts(),
        }
    }
}

impl PollConfig {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval_ms: u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
            max_attempts,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Model id, engine id, or model version depending on the provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Environment keys holding the secret; provider defaults apply when empty.
    #[serde(default)]
    pub api_key_env: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl ProviderConfig {
    pub fn resolve_base_url(&self, kind: ProviderKind, env: &Env) -> Option<String> {
        self.base_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(str::to_string)
            .or_else(|| env.get(kind.base_url_env_key()))
    }

    pub fn resolve_model(&self, kind: ProviderKind, env: &Env) -> Option<String> {
        self.model
            .as_deref()
            .map(str::trim)
            .filter(|model| !model.is_empty())
            .map(str::to_string)
            .or_else(|| env.get(kind.model_env_key()))
    }

    pub fn resolve_credential(&self, kind: ProviderKind, env: &Env) -> Option<Credential> {
        let secret = if self.api_key_env.is_empty() {
            env.first_of(kind.default_credential_keys())
        } else {
            env.first_of(self.api_key_env.as_slice())
        };
        match Credential::new(secret?) {
            Ok(credential) => Some(credential),
            Err(err) => {
                tracing::warn!(provider = %kind, error = %err, "ignoring unusable configured credential");
                None
            }
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(300))
    }
}

/// Contents of the optional `imagegate.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagegateConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listen: Option<String>,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub providers: BTreeMap<ProviderKind, ProviderConfig>,
}

impl ImagegateConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|err| ImagegateError::Config(err.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn provider(&self, kind: ProviderKind) -> ProviderConfig {
        self.providers.get(&kind).cloned().unwrap_or_default()
    }

    /// Bind address: config file, then `PORT` on all interfaces, then the default.
    pub fn resolve_listen(&self, env: &Env) -> String {
        if let Some(listen) = self
            .listen
            .as_deref()
            .map(str::trim)
            .filter(|listen| !listen.is_empty())
        {
            return listen.to_string();
        }
        if let Some(port) = env.get("PORT").and_then(|port| port.trim().parse::<u16>().ok()) {
            return format!("0.0.0.0:{port}");
        }
        DEFAULT_LISTEN.to_string()
    }
}
