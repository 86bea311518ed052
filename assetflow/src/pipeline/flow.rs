//! The generate → rig → animate → retexture → review sequencer.

use super::{AnimationKind, StageName};
use crate::config::PipelineConfig;
use crate::errors::{AssetFlowError, SubmissionError};
use crate::events::{EventSink, LoggingEventSink};
use crate::retry::{with_retry_notify, AttemptFailure, RetryError, RetryPolicy};
use crate::services::{ServiceFactory, TaskInput, TaskReceipt, TaskRequest, TaskService};
use crate::state::{AnimationResult, PipelineState, ReviewResults, VariantReview, MISSING};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::Instrument;

/// Receipts produced by the animate stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnimationReceipts {
    /// The walk animation task.
    pub walk: TaskReceipt,
    /// The attack animation task.
    pub attack: TaskReceipt,
}

/// Runs the asset stages against a [`ServiceFactory`].
///
/// Every remote stage is wrapped in its own retry policy. Errors from each
/// failed attempt are appended to [`PipelineState::errors`]; a stage that
/// gives up ends the run and no later stage executes. Review is local and
/// always completes, substituting [`MISSING`] for absent animations.
pub struct AssetPipeline {
    factory: Arc<dyn ServiceFactory>,
    config: PipelineConfig,
    events: Arc<dyn EventSink>,
}

impl std::fmt::Debug for AssetPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetPipeline")
            .field("name", &self.config.name)
            .finish_non_exhaustive()
    }
}

impl AssetPipeline {
    /// Creates a pipeline that logs its events through `tracing`.
    #[must_use]
    pub fn new(factory: Arc<dyn ServiceFactory>, config: PipelineConfig) -> Self {
        Self {
            factory,
            config,
            events: Arc::new(LoggingEventSink::default()),
        }
    }

    /// Replaces the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// The pipeline configuration.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs every stage in order and returns the review results.
    ///
    /// Assigns a run id if the state has none. On error the state keeps
    /// whatever earlier stages wrote, plus the recorded errors.
    pub async fn run(&self, state: &mut PipelineState) -> Result<ReviewResults, AssetFlowError> {
        state.ensure_id();
        let span = tracing::info_span!(
            "pipeline",
            name = %self.config.name,
            run_id = %state.id,
            species = %state.species,
        );

        async move {
            self.events.try_emit(
                "pipeline.started",
                Some(json!({
                    "pipeline": self.config.name,
                    "run_id": state.id,
                    "species": state.species,
                })),
            );

            let outcome = self.run_stages(state).await;
            match &outcome {
                Ok(_) => self.events.try_emit(
                    "pipeline.completed",
                    Some(json!({"run_id": state.id, "error_count": state.errors.len()})),
                ),
                Err(err) => self.events.try_emit(
                    "pipeline.failed",
                    Some(json!({
                        "run_id": state.id,
                        "stage": err.stage().map(StageName::label),
                        "error": err.to_string(),
                    })),
                ),
            }
            outcome
        }
        .instrument(span)
        .await
    }

    async fn run_stages(&self, state: &mut PipelineState) -> Result<ReviewResults, AssetFlowError> {
        let static_model = self.generate_static(state).await?;
        let rigged = self.rig(state, &static_model).await?;
        let animations = self.animate(state, &rigged).await?;
        // Retexture only needs the static model but stays ordered after animate.
        let retextured = self.retexture(state, &animations).await?;
        Ok(self.review(state, &retextured))
    }

    /// Submits the text-to-3D task. Writes `static_task_id`.
    pub async fn generate_static(
        &self,
        state: &mut PipelineState,
    ) -> Result<TaskReceipt, AssetFlowError> {
        let stage = StageName::GenerateStatic;
        let service = self.service(state, stage)?;
        let request = self.stage_request(
            state,
            stage,
            TaskInput::TextTo3d {
                prompt: state.prompt.clone(),
            },
        );

        let receipt = self.submit(state, stage, service, &request).await?;
        state.static_task_id.clone_from(&receipt.task_id);
        tracing::info!(task_id = %receipt, "Static model task submitted");
        self.stage_completed(stage, json!({"task_id": receipt.task_id}));
        Ok(receipt)
    }

    /// Submits the rigging task for the static model. Writes `rigged_task_id`.
    pub async fn rig(
        &self,
        state: &mut PipelineState,
        static_model: &TaskReceipt,
    ) -> Result<TaskReceipt, AssetFlowError> {
        let stage = StageName::Rig;
        let service = self.service(state, stage)?;
        let request = self.stage_request(
            state,
            stage,
            TaskInput::Rigging {
                model_id: static_model.task_id.clone(),
            },
        );

        let receipt = self.submit(state, stage, service, &request).await?;
        state.rigged_task_id.clone_from(&receipt.task_id);
        tracing::info!(task_id = %receipt, "Rigging task submitted");
        self.stage_completed(stage, json!({"task_id": receipt.task_id}));
        Ok(receipt)
    }

    /// Submits the walk and attack animations for the rigged model.
    ///
    /// Both branches are in flight together and joined before the stage
    /// returns; when both fail their errors are merged. A retry resubmits
    /// both. Writes `animations` as `[walk, attack]`.
    pub async fn animate(
        &self,
        state: &mut PipelineState,
        rigged: &TaskReceipt,
    ) -> Result<AnimationReceipts, AssetFlowError> {
        let stage = StageName::Animate;
        let service = self.service(state, stage)?;
        let walk_request = self.animation_request(state, rigged, AnimationKind::Walk);
        let attack_request = self.animation_request(state, rigged, AnimationKind::Attack);

        let policy = self.stage_policy(stage);

        let pipeline = self;
        let (walk_request, attack_request, policy) = (&walk_request, &attack_request, &policy);
        let receipts = self
            .run_stage(state, stage, move || async move {
                let (walk, attack) = futures::join!(
                    pipeline.call(service, walk_request),
                    pipeline.call(service, attack_request),
                );
                match (walk, attack) {
                    (Ok(walk), Ok(attack)) => Ok(AnimationReceipts { walk, attack }),
                    (Err(walk), Ok(_)) => Err(branch_error(AnimationKind::Walk, &walk)),
                    (Ok(_), Err(attack)) => Err(branch_error(AnimationKind::Attack, &attack)),
                    (Err(walk), Err(attack)) => Err(merge_branch_errors(&walk, &attack, policy)),
                }
            })
            .await?;

        state.animations = vec![
            AnimationResult::new(AnimationKind::Walk.name(), receipts.walk.task_id.clone()),
            AnimationResult::new(AnimationKind::Attack.name(), receipts.attack.task_id.clone()),
        ];
        tracing::info!(
            walk = %receipts.walk,
            attack = %receipts.attack,
            "Animation tasks submitted"
        );
        self.stage_completed(
            stage,
            json!({"walk": receipts.walk.task_id, "attack": receipts.attack.task_id}),
        );
        Ok(receipts)
    }

    /// Submits the retexture task for the static model. Writes `retexture_task_id`.
    ///
    /// The animation receipts are not used as input; they only order this
    /// stage after animate.
    pub async fn retexture(
        &self,
        state: &mut PipelineState,
        animations: &AnimationReceipts,
    ) -> Result<TaskReceipt, AssetFlowError> {
        let stage = StageName::Retexture;
        tracing::debug!(
            walk = %animations.walk,
            attack = %animations.attack,
            "Retexturing after animations"
        );
        let service = self.service(state, stage)?;
        let request = self.stage_request(
            state,
            stage,
            TaskInput::Retexture {
                model_id: state.static_task_id.clone(),
                prompt: state.retexture_prompt.clone(),
            },
        );

        let receipt = self.submit(state, stage, service, &request).await?;
        state.retexture_task_id.clone_from(&receipt.task_id);
        tracing::info!(task_id = %receipt, "Retexture task submitted");
        self.stage_completed(stage, json!({"task_id": receipt.task_id}));
        Ok(receipt)
    }

    /// Aggregates every variant for human review. Writes `review_results`.
    ///
    /// Never fails: a missing animation is recorded as an error and shown as
    /// [`MISSING`], not approved.
    pub fn review(&self, state: &mut PipelineState, retextured: &TaskReceipt) -> ReviewResults {
        let stage = StageName::Review;
        self.events
            .try_emit("stage.started", Some(json!({"stage": stage.label()})));
        tracing::info!(
            static_model = %state.static_task_id,
            retextured = %retextured,
            "Asset review required"
        );

        let walk = self.reviewed_animation(state, AnimationKind::Walk);
        let attack = self.reviewed_animation(state, AnimationKind::Attack);

        if state.has_errors() {
            tracing::warn!(
                error_count = state.errors.len(),
                "{} error(s) occurred during flow",
                state.errors.len()
            );
        }

        let ratings = &self.config.review;
        let results = ReviewResults {
            static_model: VariantReview {
                approved: true,
                rating: ratings.static_rating,
                task_id: state.static_task_id.clone(),
            },
            walk: VariantReview {
                approved: walk != MISSING,
                rating: ratings.walk_rating,
                task_id: walk,
            },
            attack: VariantReview {
                approved: attack != MISSING,
                rating: ratings.attack_rating,
                task_id: attack,
            },
            variant: VariantReview {
                approved: true,
                rating: ratings.variant_rating,
                task_id: state.retexture_task_id.clone(),
            },
            notes: ratings.notes.clone(),
            errors: state.errors.clone(),
        };

        state.review_results = Some(results.clone());
        self.stage_completed(
            stage,
            json!({"all_approved": results.all_approved(), "error_count": results.errors.len()}),
        );
        results
    }

    fn reviewed_animation(&self, state: &mut PipelineState, kind: AnimationKind) -> String {
        let lookup = state
            .animation_task_id(kind.index(), kind.name())
            .map(str::to_owned);

        match lookup {
            Ok(task_id) => {
                tracing::info!(animation = %kind, task_id = %task_id, "Animation ready for review");
                task_id
            }
            Err(err) => {
                tracing::error!(animation = %kind, error = %err, "Animation missing from review");
                self.events.try_emit(
                    "review.animation_missing",
                    Some(json!({
                        "name": err.name,
                        "index": err.index,
                        "available": err.available,
                    })),
                );
                state.record_error(err.to_string());
                MISSING.to_string()
            }
        }
    }

    fn service(
        &self,
        state: &mut PipelineState,
        stage: StageName,
    ) -> Result<&dyn TaskService, AssetFlowError> {
        let Some(capability) = stage.capability() else {
            return Err(AssetFlowError::Config(crate::errors::ConfigError::Invalid(format!(
                "stage {stage} does not call a service"
            ))));
        };

        self.events
            .try_emit("stage.started", Some(json!({"stage": stage.label()})));

        match self.factory.service(capability) {
            Some(service) => Ok(service),
            None => {
                let err = AssetFlowError::ServiceUnavailable { capability };
                tracing::error!(stage = %stage, error = %err, "Stage failed");
                state.record_error(format!("{stage} failed: {err}"));
                self.events.try_emit(
                    "stage.failed",
                    Some(json!({"stage": stage.label(), "error": err.to_string()})),
                );
                Err(err)
            }
        }
    }

    fn stage_request(
        &self,
        state: &PipelineState,
        stage: StageName,
        input: TaskInput,
    ) -> TaskRequest {
        let webhook_stage = stage.webhook_stage().unwrap_or_else(|| stage.label());
        TaskRequest::new(
            state.species.clone(),
            input,
            self.factory.webhook_url(&state.species, webhook_stage),
        )
    }

    fn animation_request(
        &self,
        state: &PipelineState,
        rigged: &TaskReceipt,
        kind: AnimationKind,
    ) -> TaskRequest {
        TaskRequest::new(
            state.species.clone(),
            TaskInput::Animation {
                model_id: rigged.task_id.clone(),
                animation_id: self.config.animations.action_id(kind).to_string(),
            },
            self.factory.webhook_url(&state.species, kind.name()),
        )
    }

    async fn submit(
        &self,
        state: &mut PipelineState,
        stage: StageName,
        service: &dyn TaskService,
        request: &TaskRequest,
    ) -> Result<TaskReceipt, AssetFlowError> {
        let pipeline = self;
        self.run_stage(state, stage, move || pipeline.call(service, request))
            .await
    }

    /// One service call, bounded by the configured timeout.
    async fn call(
        &self,
        service: &dyn TaskService,
        request: &TaskRequest,
    ) -> Result<TaskReceipt, SubmissionError> {
        match self.config.call_timeout() {
            Some(limit) => tokio::time::timeout(limit, service.submit_task(request))
                .await
                .unwrap_or_else(|_| {
                    Err(SubmissionError::timeout(format!(
                        "{} call timed out after {}ms",
                        request.capability(),
                        limit.as_millis()
                    )))
                }),
            None => service.submit_task(request).await,
        }
    }

    async fn run_stage<T, F, Fut>(
        &self,
        state: &mut PipelineState,
        stage: StageName,
        operation: F,
    ) -> Result<T, AssetFlowError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SubmissionError>>,
    {
        let policy = self.stage_policy(stage);
        let started = Instant::now();
        let events = &self.events;
        let errors = &mut state.errors;

        let outcome = with_retry_notify(
            &policy,
            stage.label(),
            operation,
            |err: &SubmissionError, failure: &AttemptFailure| {
                errors.push(format!("{stage} failed: {err}"));
                events.try_emit(
                    "stage.attempt_failed",
                    Some(json!({
                        "stage": stage.label(),
                        "attempt": failure.attempt,
                        "max_attempts": failure.max_attempts,
                        "kind": err.kind,
                        "error": err.message,
                        "next_delay_ms": failure.next_delay.map(millis),
                    })),
                );
            },
        )
        .await;

        outcome.map_err(|err| {
            let duration_ms = millis(started.elapsed());
            let err = match err {
                RetryError::Exhausted {
                    attempts,
                    last_error,
                    ..
                } => {
                    self.events.try_emit(
                        "stage.retry_exhausted",
                        Some(json!({
                            "stage": stage.label(),
                            "attempts": attempts,
                            "error": last_error.message,
                            "duration_ms": duration_ms,
                        })),
                    );
                    AssetFlowError::RetryExhausted {
                        stage,
                        attempts,
                        source: last_error,
                    }
                }
                RetryError::NotRetryable { source, .. } => {
                    AssetFlowError::Submission { stage, source }
                }
            };
            self.events.try_emit(
                "stage.failed",
                Some(json!({"stage": stage.label(), "error": err.to_string()})),
            );
            err
        })
    }

    fn stage_policy(&self, stage: StageName) -> RetryPolicy {
        self.config
            .policies
            .for_stage(stage)
            .cloned()
            .unwrap_or_default()
    }

    fn stage_completed(&self, stage: StageName, data: serde_json::Value) {
        self.events.try_emit(
            "stage.completed",
            Some(json!({"stage": stage.label(), "result": data})),
        );
    }
}

fn branch_error(kind: AnimationKind, err: &SubmissionError) -> SubmissionError {
    SubmissionError::new(err.kind, format!("{kind} animation: {}", err.message))
}

fn millis(duration: std::time::Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Merges two branch failures into one.
///
/// The merged kind is the first one `policy` retries, walk before attack, so
/// a branch the policy gives up on never masks a retryable one. Falls back to
/// walk's kind when neither is retryable.
fn merge_branch_errors(
    walk: &SubmissionError,
    attack: &SubmissionError,
    policy: &RetryPolicy,
) -> SubmissionError {
    let kind = [walk.kind, attack.kind]
        .into_iter()
        .find(|kind| policy.is_retryable(*kind))
        .unwrap_or(walk.kind);
    SubmissionError::new(
        kind,
        format!(
            "{}; {}",
            branch_error(AnimationKind::Walk, walk).message,
            branch_error(AnimationKind::Attack, attack).message
        ),
    )
}
