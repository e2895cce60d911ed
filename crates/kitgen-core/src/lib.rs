//! KitGen Core
//!
//! Headless facade over the KitGen engine: the provider health tracker,
//! the campaign pipeline, and a broadcast progress sink for embedding the
//! pipeline in other processes.

pub mod broadcast;

pub use broadcast::{encode_progress_line, BroadcastProgressSink};
pub use kitgen_lib::core::*;
pub use kitgen_lib::logging;
