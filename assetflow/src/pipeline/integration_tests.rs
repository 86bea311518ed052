//! End-to-end tests for pipeline execution.

#[cfg(test)]
mod tests {
    use crate::errors::{AssetFlowError, ErrorKind, SubmissionError};
    use crate::pipeline::{AnimationKind, AssetPipeline, StageName};
    use crate::retry::RetryPolicy;
    use crate::services::{Capability, MockTaskService, ServiceRegistry, TaskInput, TaskReceipt};
    use crate::state::{AnimationResult, PipelineState, MISSING};
    use crate::testing::{
        animation_service, instant_config, test_webhook_url, ScriptedTaskService, SlowTaskService,
        TestFixture,
    };
    use pretty_assertions::assert_eq;
    use std::error::Error as _;
    use std::sync::Arc;
    use std::time::Duration;

    fn instant_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new()
            .with_max_attempts(max_attempts)
            .with_initial_delay_ms(0)
    }

    #[tokio::test]
    async fn test_full_run_succeeds() {
        let fixture = TestFixture::new();
        let pipeline = fixture.pipeline();
        let mut state = TestFixture::state();

        let results = pipeline.run(&mut state).await.unwrap();

        assert_eq!(state.static_task_id, "S1");
        assert_eq!(state.rigged_task_id, "R1");
        assert_eq!(
            state.animations,
            vec![AnimationResult::new("walk", "W1"), AnimationResult::new("attack", "A1")]
        );
        assert_eq!(state.retexture_task_id, "T1");
        assert!(state.errors.is_empty());
        assert!(state.is_complete());

        assert!(results.all_approved());
        assert_eq!(results.static_model.task_id, "S1");
        assert_eq!(results.static_model.rating, 8);
        assert_eq!(results.walk.task_id, "W1");
        assert_eq!(results.walk.rating, 7);
        assert_eq!(results.attack.task_id, "A1");
        assert_eq!(results.attack.rating, 9);
        assert_eq!(results.variant.task_id, "T1");
        assert_eq!(results.variant.rating, 8);
        assert_eq!(results.notes, "All variants look good, ready for integration");
        assert_eq!(state.review_results, Some(results));
    }

    #[tokio::test]
    async fn test_requests_chain_task_ids() {
        let fixture = TestFixture::new();
        let mut state = TestFixture::state();
        fixture.pipeline().run(&mut state).await.unwrap();

        let generate = fixture.text_to_3d.last_request().unwrap();
        assert_eq!(
            generate.input,
            TaskInput::TextTo3d {
                prompt: "a goblin warrior".to_string()
            }
        );
        assert_eq!(generate.callback_url, "https://hooks.test/goblin/static");

        let rig = fixture.rigging.last_request().unwrap();
        assert_eq!(rig.input.model_id(), Some("S1"));
        assert_eq!(rig.callback_url, "https://hooks.test/goblin/rigged");

        let animations = fixture.animation.requests();
        assert_eq!(animations.len(), 2);
        let mut seen: Vec<_> = animations
            .iter()
            .map(|r| match &r.input {
                TaskInput::Animation {
                    model_id,
                    animation_id,
                } => (model_id.clone(), animation_id.clone(), r.callback_url.clone()),
                other => panic!("unexpected input {other:?}"),
            })
            .collect();
        seen.sort();
        assert_eq!(
            seen,
            vec![
                ("R1".to_string(), "1".to_string(), test_webhook_url("goblin", "walk")),
                ("R1".to_string(), "4".to_string(), test_webhook_url("goblin", "attack")),
            ]
        );

        let retexture = fixture.retexture.last_request().unwrap();
        assert_eq!(
            retexture.input,
            TaskInput::Retexture {
                model_id: "S1".to_string(),
                prompt: "crimson war paint".to_string()
            }
        );
        assert_eq!(retexture.callback_url, "https://hooks.test/goblin/retextured");
    }

    #[tokio::test]
    async fn test_success_event_sequence() {
        let fixture = TestFixture::new();
        let mut state = TestFixture::state();
        fixture.pipeline().run(&mut state).await.unwrap();

        let mut expected = vec!["pipeline.started".to_string()];
        for _ in StageName::ALL {
            expected.push("stage.started".to_string());
            expected.push("stage.completed".to_string());
        }
        expected.push("pipeline.completed".to_string());
        assert_eq!(fixture.events.event_types(), expected);

        let completed = fixture.events.events_of_type("stage.completed");
        let stages: Vec<_> = completed
            .iter()
            .filter_map(|e| e.data.as_ref()?.get("stage")?.as_str().map(str::to_owned))
            .collect();
        assert_eq!(
            stages,
            StageName::ALL.iter().map(|s| s.label().to_string()).collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn test_run_assigns_missing_id() {
        let fixture = TestFixture::new();
        let mut state = PipelineState {
            species: "wolf".to_string(),
            prompt: "a grey wolf".to_string(),
            ..Default::default()
        };

        fixture.pipeline().run(&mut state).await.unwrap();

        assert!(!state.id.is_empty());
        assert_eq!(fixture.rigging.last_request().unwrap().species, "wolf");
    }

    #[tokio::test]
    async fn test_rig_exhaustion_stops_pipeline() {
        let mut animate = MockTaskService::new();
        animate.expect_submit_task().times(0);
        let mut retexture = MockTaskService::new();
        retexture.expect_submit_task().times(0);

        let fixture = TestFixture::new().with_rigging(ScriptedTaskService::failing(
            SubmissionError::server("503 from rigging"),
        ));
        let registry = fixture
            .registry()
            .with_service(Capability::Animation, Arc::new(animate))
            .with_service(Capability::Retexture, Arc::new(retexture));
        let pipeline = AssetPipeline::new(Arc::new(registry), instant_config())
            .with_event_sink(fixture.events.clone());
        let mut state = TestFixture::state();

        let err = pipeline.run(&mut state).await.unwrap_err();

        match &err {
            AssetFlowError::RetryExhausted {
                stage,
                attempts,
                source,
            } => {
                assert_eq!(*stage, StageName::Rig);
                assert_eq!(*attempts, 3);
                assert_eq!(source.kind, ErrorKind::Server);
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(err.to_string(), "Operation rig_model failed after 3 attempts");
        assert_eq!(err.source().unwrap().to_string(), "503 from rigging");

        assert_eq!(fixture.rigging.call_count(), 3);
        assert_eq!(state.static_task_id, "S1");
        assert!(state.rigged_task_id.is_empty());
        assert!(state.animations.is_empty());
        assert!(state.review_results.is_none());
        assert_eq!(state.errors, vec!["rig_model failed: 503 from rigging"; 3]);
    }

    #[tokio::test]
    async fn test_failure_event_sequence() {
        let fixture = TestFixture::new()
            .with_rigging(ScriptedTaskService::failing(SubmissionError::transport("reset")));
        let mut state = TestFixture::state();
        fixture.pipeline().run(&mut state).await.unwrap_err();

        assert_eq!(
            fixture.events.event_types(),
            vec![
                "pipeline.started",
                "stage.started",
                "stage.completed",
                "stage.started",
                "stage.attempt_failed",
                "stage.attempt_failed",
                "stage.attempt_failed",
                "stage.retry_exhausted",
                "stage.failed",
                "pipeline.failed",
            ]
        );

        let attempts: Vec<_> = fixture
            .events
            .events_of_type("stage.attempt_failed")
            .iter()
            .filter_map(|e| e.data.as_ref()?.get("attempt")?.as_u64())
            .collect();
        assert_eq!(attempts, vec![1, 2, 3]);

        let failed = &fixture.events.events_of_type("pipeline.failed")[0];
        assert_eq!(failed.data.as_ref().unwrap()["stage"], "rig_model");
    }

    #[tokio::test]
    async fn test_transient_failure_recovers() {
        let fixture = TestFixture::new().with_text_to_3d(
            ScriptedTaskService::new()
                .then_err(SubmissionError::timeout("gateway timeout"))
                .then_ok("S2"),
        );
        let mut state = TestFixture::state();

        let results = fixture.pipeline().run(&mut state).await.unwrap();

        assert_eq!(fixture.text_to_3d.call_count(), 2);
        assert_eq!(state.static_task_id, "S2");
        assert_eq!(state.errors, vec!["generate_static_model failed: gateway timeout"]);
        assert!(results.all_approved());
        assert_eq!(results.errors, state.errors);
        assert_eq!(fixture.rigging.last_request().unwrap().input.model_id(), Some("S2"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_backoff_between_attempts() {
        let fixture = TestFixture::new()
            .with_config(crate::config::PipelineConfig::new())
            .with_rigging(
                ScriptedTaskService::new()
                    .then_err(SubmissionError::server("busy"))
                    .then_err(SubmissionError::server("busy"))
                    .then_ok("R1"),
            );
        let mut state = TestFixture::state();

        let start = tokio::time::Instant::now();
        fixture.pipeline().run(&mut state).await.unwrap();
        let elapsed = start.elapsed();

        // 2s before the second attempt, 4s before the third.
        assert!(elapsed >= Duration::from_secs(6));
        assert!(elapsed < Duration::from_secs(7));
        assert_eq!(state.rigged_task_id, "R1");
        assert_eq!(state.errors.len(), 2);
    }

    #[tokio::test]
    async fn test_non_retryable_error_fails_fast() {
        let fixture = TestFixture::new()
            .with_config(instant_config().with_policy(
                StageName::Retexture,
                RetryPolicy::transient_only().with_initial_delay_ms(0),
            ))
            .with_retexture(ScriptedTaskService::failing(SubmissionError::rejected(
                "prompt violates content policy",
            )));
        let mut state = TestFixture::state();

        let err = fixture.pipeline().run(&mut state).await.unwrap_err();

        assert!(matches!(
            err,
            AssetFlowError::Submission {
                stage: StageName::Retexture,
                ..
            }
        ));
        assert_eq!(
            err.to_string(),
            "retexture_variant failed: prompt violates content policy"
        );
        assert_eq!(fixture.retexture.call_count(), 1);
        assert_eq!(state.animations.len(), 2);
        assert!(state.review_results.is_none());
        assert_eq!(state.errors.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_service_is_reported() {
        let fixture = TestFixture::new();
        let registry = ServiceRegistry::new(test_webhook_url)
            .with_service(Capability::TextTo3d, fixture.text_to_3d.clone())
            .with_service(Capability::Rigging, fixture.rigging.clone())
            .with_service(Capability::Animation, fixture.animation.clone());
        let pipeline = AssetPipeline::new(Arc::new(registry), instant_config())
            .with_event_sink(fixture.events.clone());
        let mut state = TestFixture::state();

        let err = pipeline.run(&mut state).await.unwrap_err();

        assert!(matches!(
            err,
            AssetFlowError::ServiceUnavailable {
                capability: Capability::Retexture
            }
        ));
        assert_eq!(
            state.errors,
            vec!["retexture_variant failed: No task service registered for retexture"]
        );
        assert_eq!(fixture.events.count("stage.failed"), 1);
        assert_eq!(fixture.events.count("stage.attempt_failed"), 0);
        assert_eq!(fixture.total_calls(), 4);
        assert_eq!(fixture.retexture.call_count(), 0);
    }

    #[tokio::test]
    async fn test_one_animation_branch_retries_both() {
        let fixture = TestFixture::new()
            .with_animation(animation_service("W1", "A1").then_err(SubmissionError::server("502")));
        let mut state = TestFixture::state();

        let results = fixture.pipeline().run(&mut state).await.unwrap();

        assert_eq!(fixture.animation.call_count(), 4);
        assert_eq!(state.errors, vec!["animate_variants failed: walk animation: 502"]);
        assert_eq!(results.walk.task_id, "W1");
        assert_eq!(results.attack.task_id, "A1");
    }

    #[tokio::test]
    async fn test_both_animation_branches_fail() {
        let fixture = TestFixture::new()
            .with_config(instant_config().with_policy(StageName::Animate, instant_policy(2)))
            .with_animation(ScriptedTaskService::failing(SubmissionError::server("down")));
        let mut state = TestFixture::state();

        let err = fixture.pipeline().run(&mut state).await.unwrap_err();

        let source = err.submission_error().unwrap();
        assert_eq!(source.message, "walk animation: down; attack animation: down");
        assert_eq!(source.kind, ErrorKind::Server);
        assert_eq!(err.stage(), Some(StageName::Animate));
        assert_eq!(fixture.animation.call_count(), 4);
        assert_eq!(fixture.retexture.call_count(), 0);
        assert!(state.animations.is_empty());
        assert_eq!(state.errors.len(), 2);
    }

    #[tokio::test]
    async fn test_retryable_branch_keeps_animate_retrying() {
        let timeouts_only = instant_policy(3).retry_on([ErrorKind::Timeout]);
        let fixture = TestFixture::new()
            .with_config(instant_config().with_policy(StageName::Animate, timeouts_only))
            .with_animation(
                animation_service("W1", "A1")
                    .then_err(SubmissionError::server("walk 500"))
                    .then_err(SubmissionError::timeout("attack slow")),
            );
        let mut state = TestFixture::state();

        let results = fixture.pipeline().run(&mut state).await.unwrap();

        assert_eq!(fixture.animation.call_count(), 4);
        assert_eq!(
            state.errors,
            vec!["animate_variants failed: walk animation: walk 500; attack animation: attack slow"]
        );
        assert_eq!(results.walk.task_id, "W1");
        assert_eq!(results.attack.task_id, "A1");
    }

    #[tokio::test]
    async fn test_no_retryable_branch_stops_animate() {
        let timeouts_only = instant_policy(3).retry_on([ErrorKind::Timeout]);
        let fixture = TestFixture::new()
            .with_config(instant_config().with_policy(StageName::Animate, timeouts_only))
            .with_animation(
                animation_service("W1", "A1")
                    .then_err(SubmissionError::server("walk 500"))
                    .then_err(SubmissionError::rejected("bad rig")),
            );
        let mut state = TestFixture::state();

        let err = fixture.pipeline().run(&mut state).await.unwrap_err();

        assert!(matches!(
            err,
            AssetFlowError::Submission {
                stage: StageName::Animate,
                ..
            }
        ));
        assert_eq!(err.submission_error().unwrap().kind, ErrorKind::Server);
        assert_eq!(fixture.animation.call_count(), 2);
        assert!(state.animations.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_timeout_counts_as_failed_attempt() {
        let fixture = TestFixture::new();
        let slow = Arc::new(SlowTaskService::with_delay_ms(5_000, "R1"));
        let registry = fixture.registry().with_service(Capability::Rigging, slow.clone());
        let config = instant_config()
            .with_policy(StageName::Rig, instant_policy(2))
            .with_call_timeout(Duration::from_millis(100));
        let pipeline = AssetPipeline::new(Arc::new(registry), config);
        let mut state = TestFixture::state();

        let err = pipeline.run(&mut state).await.unwrap_err();

        let source = err.submission_error().unwrap();
        assert_eq!(source.kind, ErrorKind::Timeout);
        assert_eq!(source.message, "rigging call timed out after 100ms");
        assert_eq!(slow.call_count(), 2);
        assert_eq!(state.errors.len(), 2);
    }

    #[test]
    fn test_review_with_no_animations() {
        let fixture = TestFixture::new();
        let pipeline = fixture.pipeline();
        let mut state = TestFixture::state();
        state.static_task_id = "S1".to_string();
        state.retexture_task_id = "T1".to_string();

        let results = pipeline.review(&mut state, &TaskReceipt::new("T1"));

        assert!(!results.walk.approved);
        assert_eq!(results.walk.task_id, MISSING);
        assert!(!results.attack.approved);
        assert_eq!(results.attack.task_id, MISSING);
        assert!(results.static_model.approved);
        assert!(results.variant.approved);
        assert!(!results.all_approved());
        assert_eq!(
            state.errors,
            vec![
                "Animation 'walk' not found at index 0. Only 0 animations available.",
                "Animation 'attack' not found at index 1. Only 0 animations available.",
            ]
        );
        assert_eq!(results.errors, state.errors);
        assert_eq!(fixture.events.count("review.animation_missing"), 2);
    }

    #[test]
    fn test_review_with_walk_only() {
        let fixture = TestFixture::new();
        let pipeline = fixture.pipeline();
        let mut state = TestFixture::state();
        state.animations = vec![AnimationResult::new(AnimationKind::Walk.name(), "W1")];

        let results = pipeline.review(&mut state, &TaskReceipt::new("T1"));

        assert!(results.walk.approved);
        assert_eq!(results.walk.task_id, "W1");
        assert!(!results.attack.approved);
        assert_eq!(
            state.errors,
            vec!["Animation 'attack' not found at index 1. Only 1 animations available."]
        );
    }

    #[test]
    fn test_review_uses_unknown_for_missing_task_id() {
        let pipeline = TestFixture::new().pipeline();
        let mut state = TestFixture::state();
        state.animations = vec![
            AnimationResult {
                name: "walk".to_string(),
                task_id: None,
            },
            AnimationResult::new("attack", "A1"),
        ];

        let results = pipeline.review(&mut state, &TaskReceipt::new("T1"));

        assert_eq!(results.walk.task_id, "unknown");
        assert!(results.walk.approved);
        assert!(state.errors.is_empty());
    }
}
