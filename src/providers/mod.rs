pub mod huggingface;
pub mod openai_images;
pub mod poll;
pub mod replicate;
pub mod stability;

pub use huggingface::HuggingFaceImages;
pub use openai_images::OpenAIImages;
pub use poll::{Job, JobClient, JobStatus};
pub use replicate::ReplicateImages;
pub use stability::StabilityImages;
