//! Test fixtures for pipeline testing.

use std::sync::Arc;

use super::mocks::ScriptedTaskService;
use crate::config::{PipelineConfig, StagePolicies};
use crate::errors::SubmissionError;
use crate::events::CollectingEventSink;
use crate::pipeline::AssetPipeline;
use crate::retry::RetryPolicy;
use crate::services::{Capability, ServiceRegistry, TaskInput, TaskReceipt};
use crate::state::PipelineState;

/// Webhook base used by fixture registries.
pub const TEST_WEBHOOK_BASE: &str = "https://hooks.test";

/// Builds `"<base>/<species>/<stage>"` callback URLs.
#[must_use]
pub fn test_webhook_url(species: &str, stage: &str) -> String {
    format!("{TEST_WEBHOOK_BASE}/{species}/{stage}")
}

/// A config whose retry policies never sleep.
#[must_use]
pub fn instant_config() -> PipelineConfig {
    PipelineConfig::new().with_policies(StagePolicies::uniform(
        RetryPolicy::new().with_initial_delay_ms(0),
    ))
}

/// An animation service answering walk with `walk` and attack with `attack`.
///
/// Routing is by the configured animation id, so it is independent of the
/// order the two branches are polled in.
#[must_use]
pub fn animation_service(walk: &str, attack: &str) -> ScriptedTaskService {
    let (walk, attack) = (walk.to_string(), attack.to_string());
    ScriptedTaskService::from_fn(move |request| match &request.input {
        TaskInput::Animation { animation_id, .. } if animation_id == "1" => {
            Ok(TaskReceipt::new(walk.clone()))
        }
        TaskInput::Animation { animation_id, .. } if animation_id == "4" => {
            Ok(TaskReceipt::new(attack.clone()))
        }
        other => Err(SubmissionError::rejected(format!("unexpected input {other:?}"))),
    })
}

/// One scripted service per capability, a collecting event sink and a state.
#[derive(Debug)]
pub struct TestFixture {
    /// Text-to-3D service.
    pub text_to_3d: Arc<ScriptedTaskService>,
    /// Rigging service.
    pub rigging: Arc<ScriptedTaskService>,
    /// Animation service.
    pub animation: Arc<ScriptedTaskService>,
    /// Retexture service.
    pub retexture: Arc<ScriptedTaskService>,
    /// Events emitted by pipelines built from this fixture.
    pub events: Arc<CollectingEventSink>,
    /// Config used by [`TestFixture::pipeline`].
    pub config: PipelineConfig,
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

impl TestFixture {
    /// Services that all succeed: S1, R1, W1/A1 and T1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            text_to_3d: Arc::new(ScriptedTaskService::succeeding("S1")),
            rigging: Arc::new(ScriptedTaskService::succeeding("R1")),
            animation: Arc::new(animation_service("W1", "A1")),
            retexture: Arc::new(ScriptedTaskService::succeeding("T1")),
            events: Arc::new(CollectingEventSink::new()),
            config: instant_config(),
        }
    }

    /// Replaces the text-to-3D service.
    #[must_use]
    pub fn with_text_to_3d(mut self, service: ScriptedTaskService) -> Self {
        self.text_to_3d = Arc::new(service);
        self
    }

    /// Replaces the rigging service.
    #[must_use]
    pub fn with_rigging(mut self, service: ScriptedTaskService) -> Self {
        self.rigging = Arc::new(service);
        self
    }

    /// Replaces the animation service.
    #[must_use]
    pub fn with_animation(mut self, service: ScriptedTaskService) -> Self {
        self.animation = Arc::new(service);
        self
    }

    /// Replaces the retexture service.
    #[must_use]
    pub fn with_retexture(mut self, service: ScriptedTaskService) -> Self {
        self.retexture = Arc::new(service);
        self
    }

    /// Replaces the config.
    #[must_use]
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// A registry holding all four services.
    #[must_use]
    pub fn registry(&self) -> ServiceRegistry {
        ServiceRegistry::new(test_webhook_url)
            .with_service(Capability::TextTo3d, self.text_to_3d.clone())
            .with_service(Capability::Rigging, self.rigging.clone())
            .with_service(Capability::Animation, self.animation.clone())
            .with_service(Capability::Retexture, self.retexture.clone())
    }

    /// A pipeline over [`TestFixture::registry`] reporting to [`TestFixture::events`].
    #[must_use]
    pub fn pipeline(&self) -> AssetPipeline {
        AssetPipeline::new(Arc::new(self.registry()), self.config.clone())
            .with_event_sink(self.events.clone())
    }

    /// A fresh goblin state.
    #[must_use]
    pub fn state() -> PipelineState {
        PipelineState::new("goblin", "a goblin warrior", "crimson war paint").with_id("run-1")
    }

    /// Total calls across all four services.
    #[must_use]
    pub fn total_calls(&self) -> usize {
        self.text_to_3d.call_count()
            + self.rigging.call_count()
            + self.animation.call_count()
            + self.retexture.call_count()
    }
}
