//! Pipeline configuration.
//!
//! Everything has a default, so an empty JSON object is a valid config.

use crate::errors::ConfigError;
use crate::observability::LoggingConfig;
use crate::pipeline::{AnimationKind, StageName};
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Retry policy for each stage that calls out to a service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StagePolicies {
    /// Policy for text-to-3D generation.
    #[serde(default)]
    pub generate_static: RetryPolicy,
    /// Policy for rigging.
    #[serde(default)]
    pub rig: RetryPolicy,
    /// Policy for the animation fan-out.
    #[serde(default)]
    pub animate: RetryPolicy,
    /// Policy for retexturing.
    #[serde(default)]
    pub retexture: RetryPolicy,
}

impl StagePolicies {
    /// Uses one policy for every stage.
    #[must_use]
    pub fn uniform(policy: RetryPolicy) -> Self {
        Self {
            generate_static: policy.clone(),
            rig: policy.clone(),
            animate: policy.clone(),
            retexture: policy,
        }
    }

    /// The policy for a stage; the review stage has none.
    #[must_use]
    pub fn for_stage(&self, stage: StageName) -> Option<&RetryPolicy> {
        match stage {
            StageName::GenerateStatic => Some(&self.generate_static),
            StageName::Rig => Some(&self.rig),
            StageName::Animate => Some(&self.animate),
            StageName::Retexture => Some(&self.retexture),
            StageName::Review => None,
        }
    }

    fn for_stage_mut(&mut self, stage: StageName) -> Option<&mut RetryPolicy> {
        match stage {
            StageName::GenerateStatic => Some(&mut self.generate_static),
            StageName::Rig => Some(&mut self.rig),
            StageName::Animate => Some(&mut self.animate),
            StageName::Retexture => Some(&mut self.retexture),
            StageName::Review => None,
        }
    }
}

fn default_walk_id() -> String {
    "1".to_string()
}

fn default_attack_id() -> String {
    "4".to_string()
}

/// Provider-side animation identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnimationConfig {
    /// Identifier of the walk cycle.
    #[serde(default = "default_walk_id")]
    pub walk_id: String,
    /// Identifier of the attack animation.
    #[serde(default = "default_attack_id")]
    pub attack_id: String,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            walk_id: default_walk_id(),
            attack_id: default_attack_id(),
        }
    }
}

impl AnimationConfig {
    /// The provider identifier for an animation kind.
    #[must_use]
    pub fn action_id(&self, kind: AnimationKind) -> &str {
        match kind {
            AnimationKind::Walk => &self.walk_id,
            AnimationKind::Attack => &self.attack_id,
        }
    }
}

fn default_static_rating() -> u8 {
    8
}

fn default_walk_rating() -> u8 {
    7
}

fn default_attack_rating() -> u8 {
    9
}

fn default_variant_rating() -> u8 {
    8
}

fn default_notes() -> String {
    "All variants look good, ready for integration".to_string()
}

/// Ratings and notes attached to the review results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewConfig {
    /// Rating for the static model.
    #[serde(default = "default_static_rating")]
    pub static_rating: u8,
    /// Rating for the walk animation.
    #[serde(default = "default_walk_rating")]
    pub walk_rating: u8,
    /// Rating for the attack animation.
    #[serde(default = "default_attack_rating")]
    pub attack_rating: u8,
    /// Rating for the retextured variant.
    #[serde(default = "default_variant_rating")]
    pub variant_rating: u8,
    /// Notes attached to the results.
    #[serde(default = "default_notes")]
    pub notes: String,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            static_rating: default_static_rating(),
            walk_rating: default_walk_rating(),
            attack_rating: default_attack_rating(),
            variant_rating: default_variant_rating(),
            notes: default_notes(),
        }
    }
}

fn default_name() -> String {
    "meshy_asset_flow".to_string()
}

/// Top-level pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline name, used in logs and events.
    #[serde(default = "default_name")]
    pub name: String,
    /// Per-stage retry policies.
    #[serde(default)]
    pub policies: StagePolicies,
    /// Animation identifiers.
    #[serde(default)]
    pub animations: AnimationConfig,
    /// Review defaults.
    #[serde(default)]
    pub review: ReviewConfig,
    /// Upper bound for a single service call, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_timeout_ms: Option<u64>,
    /// Logging setup.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            policies: StagePolicies::default(),
            animations: AnimationConfig::default(),
            review: ReviewConfig::default(),
            call_timeout_ms: None,
            logging: LoggingConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Creates a config with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a config from JSON.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a JSON config file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Sets the pipeline name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Replaces every stage policy.
    #[must_use]
    pub fn with_policies(mut self, policies: StagePolicies) -> Self {
        self.policies = policies;
        self
    }

    /// Sets the policy for one stage. Ignored for the review stage.
    #[must_use]
    pub fn with_policy(mut self, stage: StageName, policy: RetryPolicy) -> Self {
        if let Some(slot) = self.policies.for_stage_mut(stage) {
            *slot = policy;
        }
        self
    }

    /// Sets the per-call timeout.
    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Sets the review defaults.
    #[must_use]
    pub fn with_review(mut self, review: ReviewConfig) -> Self {
        self.review = review;
        self
    }

    /// The per-call timeout, if any.
    #[must_use]
    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_ms.map(Duration::from_millis)
    }

    /// Validates every policy and the timeout.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for stage in StageName::ALL {
            if let Some(policy) = self.policies.for_stage(stage) {
                policy.validate().map_err(|e| match e {
                    ConfigError::Invalid(reason) => {
                        ConfigError::Invalid(format!("policy for {stage}: {reason}"))
                    }
                    other => other,
                })?;
            }
        }
        if self.call_timeout_ms == Some(0) {
            return Err(ConfigError::Invalid("call_timeout_ms must be > 0".to_string()));
        }
        Ok(())
    }
}
