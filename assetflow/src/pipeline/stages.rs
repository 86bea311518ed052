//! Stage and animation identifiers.

use crate::services::Capability;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The five pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    /// Text-to-3D generation of the static model.
    GenerateStatic,
    /// Skeleton rigging.
    Rig,
    /// Walk and attack animations.
    Animate,
    /// Retextured color variant.
    Retexture,
    /// Local aggregation for human review.
    Review,
}

impl StageName {
    /// Every stage, in execution order.
    pub const ALL: [Self; 5] = [
        Self::GenerateStatic,
        Self::Rig,
        Self::Animate,
        Self::Retexture,
        Self::Review,
    ];

    /// Operation label used in logs, events and recorded errors.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::GenerateStatic => "generate_static_model",
            Self::Rig => "rig_model",
            Self::Animate => "animate_variants",
            Self::Retexture => "retexture_variant",
            Self::Review => "hitl_review",
        }
    }

    /// The remote capability the stage calls; review calls none.
    #[must_use]
    pub fn capability(self) -> Option<Capability> {
        match self {
            Self::GenerateStatic => Some(Capability::TextTo3d),
            Self::Rig => Some(Capability::Rigging),
            Self::Animate => Some(Capability::Animation),
            Self::Retexture => Some(Capability::Retexture),
            Self::Review => None,
        }
    }

    /// Stage name passed to the webhook URL builder.
    ///
    /// The animate stage uses one webhook per [`AnimationKind`] instead.
    #[must_use]
    pub fn webhook_stage(self) -> Option<&'static str> {
        match self {
            Self::GenerateStatic => Some("static"),
            Self::Rig => Some("rigged"),
            Self::Retexture => Some("retextured"),
            Self::Animate | Self::Review => None,
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Capability {
    /// The stage that calls this capability.
    #[must_use]
    pub fn stage(self) -> StageName {
        match self {
            Self::TextTo3d => StageName::GenerateStatic,
            Self::Rigging => StageName::Rig,
            Self::Animation => StageName::Animate,
            Self::Retexture => StageName::Retexture,
        }
    }
}

/// The two animation branches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnimationKind {
    /// Walk cycle.
    Walk,
    /// Attack.
    Attack,
}

impl AnimationKind {
    /// Both branches, in the order they are recorded.
    pub const ALL: [Self; 2] = [Self::Walk, Self::Attack];

    /// Name used in state, webhooks and review.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Walk => "walk",
            Self::Attack => "attack",
        }
    }

    /// Position in `PipelineState::animations`.
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Self::Walk => 0,
            Self::Attack => 1,
        }
    }
}

impl fmt::Display for AnimationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
