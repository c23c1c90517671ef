pub mod dispatch;
mod error;
pub mod image;
mod profile;
pub mod providers;
pub mod types;
pub mod utils;

#[cfg(feature = "gateway")]
pub mod gateway;

pub use dispatch::{Dispatcher, MAX_IMAGES_PER_REQUEST, ProviderAdapter};
pub use error::{ImagegateError, Result};
pub use image::ImageGenerationModel;
pub use profile::{
    Credential, DEFAULT_LISTEN, Env, ImagegateConfig, PollConfig, ProviderConfig, parse_dotenv,
};
pub use providers::{HuggingFaceImages, OpenAIImages, ReplicateImages, StabilityImages};
pub use types::{AspectRatio, BatchRequest, Dimensions, GenerationRequest, ProviderKind};
