//! Ports for the external task-submission services.
//!
//! The pipeline never talks to the generation API directly. Each capability
//! (text-to-3D, rigging, animation, retexture) is a [`TaskService`] handed out
//! by a [`ServiceFactory`], which also builds the webhook URLs the remote side
//! calls back on.

mod registry;

pub use registry::ServiceRegistry;

use crate::errors::SubmissionError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A remote capability the pipeline submits tasks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Text prompt to static 3D model.
    TextTo3d,
    /// Skeleton rigging of an existing model.
    Rigging,
    /// Animation of a rigged model.
    Animation,
    /// New texture for an existing model.
    Retexture,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TextTo3d => write!(f, "text_to_3d"),
            Self::Rigging => write!(f, "rigging"),
            Self::Animation => write!(f, "animation"),
            Self::Retexture => write!(f, "retexture"),
        }
    }
}

/// Capability-specific part of a task request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskInput {
    /// Generate a model from a prompt.
    TextTo3d {
        /// Generation prompt.
        prompt: String,
    },
    /// Rig a previously generated model.
    Rigging {
        /// Task id of the model to rig.
        model_id: String,
    },
    /// Animate a rigged model.
    Animation {
        /// Task id of the rigged model.
        model_id: String,
        /// Provider-side animation identifier.
        animation_id: String,
    },
    /// Retexture a previously generated model.
    Retexture {
        /// Task id of the model to retexture.
        model_id: String,
        /// Texture prompt.
        prompt: String,
    },
}

impl TaskInput {
    /// The capability that serves this input.
    #[must_use]
    pub fn capability(&self) -> Capability {
        match self {
            Self::TextTo3d { .. } => Capability::TextTo3d,
            Self::Rigging { .. } => Capability::Rigging,
            Self::Animation { .. } => Capability::Animation,
            Self::Retexture { .. } => Capability::Retexture,
        }
    }

    /// The upstream model this input builds on, if any.
    #[must_use]
    pub fn model_id(&self) -> Option<&str> {
        match self {
            Self::TextTo3d { .. } => None,
            Self::Rigging { model_id }
            | Self::Animation { model_id, .. }
            | Self::Retexture { model_id, .. } => Some(model_id),
        }
    }
}

/// A task submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRequest {
    /// Species (asset family) the task belongs to.
    pub species: String,
    /// Capability-specific input.
    pub input: TaskInput,
    /// URL the service calls when the task finishes.
    pub callback_url: String,
}

impl TaskRequest {
    /// Creates a new task request.
    #[must_use]
    pub fn new(
        species: impl Into<String>,
        input: TaskInput,
        callback_url: impl Into<String>,
    ) -> Self {
        Self {
            species: species.into(),
            input,
            callback_url: callback_url.into(),
        }
    }

    /// The capability that serves this request.
    #[must_use]
    pub fn capability(&self) -> Capability {
        self.input.capability()
    }
}

/// What a service hands back for an accepted submission.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskReceipt {
    /// Opaque remote task identifier.
    pub task_id: String,
}

impl TaskReceipt {
    /// Creates a new receipt.
    #[must_use]
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
        }
    }
}

impl fmt::Display for TaskReceipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.task_id)
    }
}

/// A remote service accepting tasks for one capability.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TaskService: Send + Sync {
    /// Submits a task and returns its receipt.
    async fn submit_task(&self, request: &TaskRequest) -> Result<TaskReceipt, SubmissionError>;
}

/// Hands out task services and webhook URLs.
pub trait ServiceFactory: Send + Sync {
    /// Returns the service for a capability, if one is available.
    fn service(&self, capability: Capability) -> Option<&dyn TaskService>;

    /// Builds the callback URL for a species and webhook stage name.
    fn webhook_url(&self, species: &str, stage: &str) -> String;
}
