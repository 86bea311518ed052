//! Testing utilities for asset pipelines.
//!
//! This module provides:
//! - Scripted and slow task services
//! - A fixture wiring one service per capability into a pipeline

mod fixtures;
mod mocks;

pub use fixtures::{
    animation_service, instant_config, test_webhook_url, TestFixture, TEST_WEBHOOK_BASE,
};
pub use mocks::{ScriptedTaskService, SlowTaskService};
