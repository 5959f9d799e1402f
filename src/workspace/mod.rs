pub mod error;
pub mod inference;
pub mod manifests;
pub mod preset;
pub mod sku;
pub mod types;
pub mod utils;

pub use error::InferenceError;
pub use inference::{InferenceConfig, LaunchPlan};
pub use preset::PresetInference;
pub use types::Workspace;
