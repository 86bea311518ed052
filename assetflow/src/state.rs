//! Pipeline state threaded through every stage.

use crate::errors::AnimationStateError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Placeholder surfaced in review when an animation result is absent.
pub const MISSING: &str = "missing";

/// Task id reported for an animation entry recorded without one.
pub const UNKNOWN_TASK_ID: &str = "unknown";

/// One submitted animation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnimationResult {
    /// Animation name (`walk`, `attack`).
    pub name: String,
    /// Remote task id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
}

impl AnimationResult {
    /// Creates a new animation result.
    #[must_use]
    pub fn new(name: impl Into<String>, task_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            task_id: Some(task_id.into()),
        }
    }

    /// The task id, or [`UNKNOWN_TASK_ID`] if none was recorded.
    #[must_use]
    pub fn task_id(&self) -> &str {
        self.task_id.as_deref().unwrap_or(UNKNOWN_TASK_ID)
    }
}

/// Verdict for one variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantReview {
    /// Whether the variant is accepted.
    pub approved: bool,
    /// Score given by the reviewer.
    pub rating: u8,
    /// Task id shown to the reviewer, or [`MISSING`].
    #[serde(default)]
    pub task_id: String,
}

/// Output of the review stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewResults {
    /// The static model.
    #[serde(rename = "static")]
    pub static_model: VariantReview,
    /// The walk animation.
    pub walk: VariantReview,
    /// The attack animation.
    pub attack: VariantReview,
    /// The retextured model.
    pub variant: VariantReview,
    /// Reviewer notes.
    pub notes: String,
    /// Errors accumulated during the run, copied at review time.
    pub errors: Vec<String>,
}

impl ReviewResults {
    /// Variants keyed by their review name.
    #[must_use]
    pub fn variants(&self) -> [(&'static str, &VariantReview); 4] {
        [
            ("static", &self.static_model),
            ("walk", &self.walk),
            ("attack", &self.attack),
            ("variant", &self.variant),
        ]
    }

    /// Returns true if every variant was approved.
    #[must_use]
    pub fn all_approved(&self) -> bool {
        self.variants().iter().all(|(_, review)| review.approved)
    }
}

/// Mutable record carried through the pipeline.
///
/// Each stage writes only its own fields; nothing written by an earlier stage
/// is removed or replaced by a later one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineState {
    /// Run identifier.
    #[serde(default)]
    pub id: String,
    /// Species (asset family) being generated.
    #[serde(default)]
    pub species: String,
    /// Text-to-3D prompt.
    #[serde(default)]
    pub prompt: String,
    /// Prompt for the retextured variant.
    #[serde(default)]
    pub retexture_prompt: String,
    /// Task id of the static model.
    #[serde(default)]
    pub static_task_id: String,
    /// Task id of the rigged model.
    #[serde(default)]
    pub rigged_task_id: String,
    /// Submitted animations, walk first.
    #[serde(default)]
    pub animations: Vec<AnimationResult>,
    /// Task id of the retextured model.
    #[serde(default)]
    pub retexture_task_id: String,
    /// Set by the review stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_results: Option<ReviewResults>,
    /// Every error seen during the run, in order.
    #[serde(default)]
    pub errors: Vec<String>,
}

impl PipelineState {
    /// Creates a state with a fresh run id.
    #[must_use]
    pub fn new(
        species: impl Into<String>,
        prompt: impl Into<String>,
        retexture_prompt: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            species: species.into(),
            prompt: prompt.into(),
            retexture_prompt: retexture_prompt.into(),
            ..Default::default()
        }
    }

    /// Sets the run id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Assigns a run id if none is set and returns it.
    pub fn ensure_id(&mut self) -> &str {
        if self.id.is_empty() {
            self.id = Uuid::new_v4().to_string();
        }
        &self.id
    }

    /// Appends an error to the log.
    pub fn record_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }

    /// Returns true if any error was recorded.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Returns true once review results are in.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.review_results.is_some()
    }

    /// Task id of the animation at `index`, bounds-checked.
    pub fn animation_task_id(&self, index: usize, name: &str) -> Result<&str, AnimationStateError> {
        self.animations
            .get(index)
            .map(AnimationResult::task_id)
            .ok_or_else(|| AnimationStateError::new(name, index, self.animations.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state_has_id() {
        let state = PipelineState::new("fox", "a red fox", "arctic fox");
        assert!(Uuid::parse_str(&state.id).is_ok());
        assert_eq!(state.species, "fox");
        assert!(!state.is_complete());
        assert!(!state.has_errors());
    }

    #[test]
    fn test_ensure_id_keeps_existing() {
        let mut state = PipelineState::default().with_id("run-1");
        assert_eq!(state.ensure_id(), "run-1");

        let mut empty = PipelineState::default();
        assert!(!empty.ensure_id().is_empty());
    }

    #[test]
    fn test_animation_task_id_out_of_bounds() {
        let state = PipelineState::default();
        let err = state.animation_task_id(0, "walk").unwrap_err();
        assert_eq!(err, AnimationStateError::new("walk", 0, 0));
    }

    #[test]
    fn test_animation_task_id_partial() {
        let mut state = PipelineState::default();
        state.animations.push(AnimationResult::new("walk", "W1"));

        assert_eq!(state.animation_task_id(0, "walk").unwrap(), "W1");
        let err = state.animation_task_id(1, "attack").unwrap_err();
        assert_eq!(err.available, 1);
    }

    #[test]
    fn test_animation_without_task_id_is_unknown() {
        let state: PipelineState =
            serde_json::from_str(r#"{"animations": [{"name": "walk"}]}"#).unwrap();
        assert_eq!(state.animation_task_id(0, "walk").unwrap(), UNKNOWN_TASK_ID);
    }

    #[test]
    fn test_review_results_layout() {
        let review = |task_id: &str| VariantReview {
            approved: true,
            rating: 8,
            task_id: task_id.to_string(),
        };
        let results = ReviewResults {
            static_model: review("S1"),
            walk: review("W1"),
            attack: review("A1"),
            variant: review("T1"),
            notes: "ok".to_string(),
            errors: Vec::new(),
        };

        let json = serde_json::to_value(&results).unwrap();
        assert_eq!(json["static"]["task_id"], "S1");
        assert_eq!(json["variant"]["approved"], true);
        assert!(json["errors"].as_array().unwrap().is_empty());
        assert!(results.all_approved());
    }
}
