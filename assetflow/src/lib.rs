//! # Assetflow
//!
//! A retry-wrapped pipeline that turns a text prompt into a reviewed,
//! rigged, animated and retextured 3D asset.
//!
//! Assetflow drives a remote generation service through five stages:
//!
//! - **Generate**: submit a text-to-3D task for the static model
//! - **Rig**: rig the static model
//! - **Animate**: submit walk and attack animations for the rigged model
//! - **Retexture**: produce a color variant of the static model
//! - **Review**: aggregate every variant for human review
//!
//! Each remote stage runs under its own [`retry::RetryPolicy`]; every failed
//! attempt is recorded on the [`state::PipelineState`].
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use assetflow::prelude::*;
//!
//! let registry = ServiceRegistry::new(|species, stage| {
//!     format!("https://hooks.example.com/{species}/{stage}")
//! })
//! .with_all(Arc::new(my_service));
//!
//! let pipeline = AssetPipeline::new(Arc::new(registry), PipelineConfig::new());
//! let mut state = PipelineState::new("goblin", "a goblin warrior", "crimson war paint");
//! let review = pipeline.run(&mut state).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod errors;
pub mod events;
pub mod observability;
pub mod pipeline;
pub mod retry;
pub mod services;
pub mod state;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{AnimationConfig, PipelineConfig, ReviewConfig, StagePolicies};
    pub use crate::errors::{
        AnimationStateError, AssetFlowError, ConfigError, ErrorKind, SubmissionError,
    };
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::observability::{init_logging, LogFormat, LoggingConfig};
    pub use crate::pipeline::{AnimationKind, AnimationReceipts, AssetPipeline, StageName};
    pub use crate::retry::{with_retry, with_retry_notify, Classify, RetryError, RetryPolicy};
    pub use crate::services::{
        Capability, ServiceFactory, ServiceRegistry, TaskInput, TaskReceipt, TaskRequest,
        TaskService,
    };
    pub use crate::state::{AnimationResult, PipelineState, ReviewResults, VariantReview};
}
