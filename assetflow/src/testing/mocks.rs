//! Scripted task services for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;

use crate::errors::SubmissionError;
use crate::services::{TaskReceipt, TaskRequest, TaskService};

type Outcome = Result<TaskReceipt, SubmissionError>;
type Responder = dyn Fn(&TaskRequest) -> Outcome + Send + Sync;

/// A task service that replays queued outcomes, then falls back to a responder.
///
/// Every request is recorded, including ones that fail.
pub struct ScriptedTaskService {
    script: Mutex<VecDeque<Outcome>>,
    fallback: Box<Responder>,
    requests: Mutex<Vec<TaskRequest>>,
}

impl std::fmt::Debug for ScriptedTaskService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedTaskService")
            .field("queued", &self.script.lock().len())
            .field("calls", &self.requests.lock().len())
            .finish_non_exhaustive()
    }
}

impl Default for ScriptedTaskService {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedTaskService {
    /// Creates a service that fails once its script runs out.
    #[must_use]
    pub fn new() -> Self {
        Self::from_fn(|request| {
            Err(SubmissionError::unavailable(format!(
                "no scripted response for {}",
                request.capability()
            )))
        })
    }

    /// Creates a service that always returns the same task id.
    #[must_use]
    pub fn succeeding(task_id: impl Into<String>) -> Self {
        let task_id = task_id.into();
        Self::from_fn(move |_| Ok(TaskReceipt::new(task_id.clone())))
    }

    /// Creates a service that always fails with the same error.
    #[must_use]
    pub fn failing(error: SubmissionError) -> Self {
        Self::from_fn(move |_| Err(error.clone()))
    }

    /// Creates a service answering every unscripted request with `responder`.
    #[must_use]
    pub fn from_fn<F>(responder: F) -> Self
    where
        F: Fn(&TaskRequest) -> Outcome + Send + Sync + 'static,
    {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Box::new(responder),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queues a success.
    #[must_use]
    pub fn then_ok(self, task_id: impl Into<String>) -> Self {
        self.script.lock().push_back(Ok(TaskReceipt::new(task_id)));
        self
    }

    /// Queues a failure.
    #[must_use]
    pub fn then_err(self, error: SubmissionError) -> Self {
        self.script.lock().push_back(Err(error));
        self
    }

    /// Number of requests received.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// All requests received, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<TaskRequest> {
        self.requests.lock().clone()
    }

    /// The most recent request.
    #[must_use]
    pub fn last_request(&self) -> Option<TaskRequest> {
        self.requests.lock().last().cloned()
    }

    /// Resets call tracking. Queued outcomes are kept.
    pub fn reset(&self) {
        self.requests.lock().clear();
    }
}

#[async_trait]
impl TaskService for ScriptedTaskService {
    async fn submit_task(&self, request: &TaskRequest) -> Result<TaskReceipt, SubmissionError> {
        self.requests.lock().push(request.clone());
        let scripted = self.script.lock().pop_front();
        scripted.unwrap_or_else(|| (self.fallback)(request))
    }
}

/// A task service that takes time to answer.
#[derive(Debug)]
pub struct SlowTaskService {
    delay: Duration,
    task_id: String,
    calls: Mutex<usize>,
}

impl SlowTaskService {
    /// Creates a service that sleeps for `delay`, then succeeds.
    #[must_use]
    pub fn new(delay: Duration, task_id: impl Into<String>) -> Self {
        Self {
            delay,
            task_id: task_id.into(),
            calls: Mutex::new(0),
        }
    }

    /// Creates a slow service with the delay in milliseconds.
    #[must_use]
    pub fn with_delay_ms(ms: u64, task_id: impl Into<String>) -> Self {
        Self::new(Duration::from_millis(ms), task_id)
    }

    /// Number of requests received.
    #[must_use]
    pub fn call_count(&self) -> usize {
        *self.calls.lock()
    }
}

#[async_trait]
impl TaskService for SlowTaskService {
    async fn submit_task(&self, _request: &TaskRequest) -> Result<TaskReceipt, SubmissionError> {
        *self.calls.lock() += 1;
        tokio::time::sleep(self.delay).await;
        Ok(TaskReceipt::new(self.task_id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::services::TaskInput;

    fn request() -> TaskRequest {
        TaskRequest::new(
            "goblin",
            TaskInput::TextTo3d {
                prompt: "a goblin".to_string(),
            },
            "https://hooks.test/goblin/static",
        )
    }

    #[tokio::test]
    async fn test_script_then_fallback() {
        let service = ScriptedTaskService::succeeding("S9")
            .then_err(SubmissionError::server("503"))
            .then_ok("S1");

        let first = service.submit_task(&request()).await;
        assert_eq!(first.unwrap_err().kind, ErrorKind::Server);
        assert_eq!(service.submit_task(&request()).await.unwrap().task_id, "S1");
        assert_eq!(service.submit_task(&request()).await.unwrap().task_id, "S9");
        assert_eq!(service.call_count(), 3);
    }

    #[tokio::test]
    async fn test_empty_script_is_unavailable() {
        let service = ScriptedTaskService::new();
        let err = service.submit_task(&request()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Unavailable);
        assert_eq!(err.message, "no scripted response for text_to_3d");
    }

    #[tokio::test]
    async fn test_requests_recorded() {
        let service = ScriptedTaskService::failing(SubmissionError::rejected("bad prompt"));
        let _ = service.submit_task(&request()).await;

        let recorded = service.last_request().unwrap();
        assert_eq!(recorded.species, "goblin");
        assert_eq!(recorded.callback_url, "https://hooks.test/goblin/static");

        service.reset();
        assert_eq!(service.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_service() {
        let service = SlowTaskService::with_delay_ms(500, "S1");
        let start = tokio::time::Instant::now();
        let receipt = service.submit_task(&request()).await.unwrap();
        assert_eq!(receipt.task_id, "S1");
        assert!(start.elapsed() >= Duration::from_millis(500));
        assert_eq!(service.call_count(), 1);
    }
}
