//! Pipeline stages and execution.
//!
//! This module provides:
//! - Stage and animation identifiers
//! - The [`AssetPipeline`] sequencer

mod flow;
mod integration_tests;
mod stages;

pub use flow::{AnimationReceipts, AssetPipeline};
pub use stages::{AnimationKind, StageName};
