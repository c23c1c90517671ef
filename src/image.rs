use async_trait::async_trait;
use bytes::Bytes;

use crate::Result;
use crate::profile::Credential;
use crate::types::{GenerationRequest, ProviderKind};

/// Turns one prompt into the bytes of one image.
#[async_trait]
pub trait ImageGenerationModel: Send + Sync {
    fn provider(&self) -> ProviderKind;

    async fn generate(&self, request: &GenerationRequest, credential: &Credential)
    -> Result<Bytes>;
}
