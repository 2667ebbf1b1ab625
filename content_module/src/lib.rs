pub mod config;
pub mod errors;
pub mod image_store;
pub mod openai;
pub mod writer;

pub use config::OpenAiConfig;
pub use errors::{GenerationError, ValidationError};
pub use image_store::ImageStore;
pub use openai::OpenAiClient;
pub use writer::{parse_idea_score, validate_post_content, ContentStats, ContentWriter, IdeaScore};
