//! KitGen Core Library
//!
//! Campaign media pipeline for Japanese-language ad kits.
//! This library contains the provider health tracker, the video/audio
//! pipeline orchestrator, and the generation provider adapters it drives.
//!
//! The database, auth, and billing layers of the dashboard live elsewhere;
//! they reach this crate through the `ProgressSink` and `AssetRegistry`
//! traits and the `PipelineOrchestrator::run` entry point.

pub mod core;
pub mod logging;

pub use crate::core::{CoreError, CoreResult};
