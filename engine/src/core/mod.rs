//! KitGen Core Engine
//!
//! Provider health tracking, generation providers, and the campaign
//! media pipeline.

pub mod fs;
pub mod generative;
pub mod health;
pub mod pipeline;
pub mod settings;

// Re-export common types
mod types;
pub use types::*;

mod error;
pub use error::*;
