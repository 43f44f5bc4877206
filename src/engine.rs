//! In-process interpreter of a [`Topology`].
//!
//! The engine honours the contract a durable execution substrate provides:
//! choices pick the first matching rule, failed tasks are retried according
//! to the matching [`crate::workflow::RetryPolicy`] with the unmodified
//! input, and errors that no retry absorbs follow the catch edge with the
//! payload replaced by `{Error, Cause}`. It keeps everything in memory and
//! is meant for local runs and tests.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::handlers::{HandlerError, Registry};
use crate::payload::{ExecutionPayload, PayloadError};
use crate::sanitizer::{JobRequest, JobRunner, SanitizerEngine};
use crate::workflow::{SANITIZE_RESULT_KEY, State, TaskState, TaskWork, Topology, TopologyError};

/// Error name reported when a sanitization job fails.
pub const TASK_FAILED: &str = "States.TaskFailed";

/// Default ceiling on state entries per execution.
pub const DEFAULT_MAX_TRANSITIONS: usize = 1_000;

/// Future returned by [`Sleeper::sleep`].
pub type SleepFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// Waits between retry attempts.
pub trait Sleeper: Send + Sync {
    /// Completes after `duration`.
    fn sleep(&self, duration: Duration) -> SleepFuture<'_>;
}

/// Sleeper backed by the tokio timer.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, duration: Duration) -> SleepFuture<'_> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// A failed task attempt, named the way the substrate reports it.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct TaskFailure {
    /// Error name matched by retry and catch policies.
    pub error: String,
    /// Human-readable description.
    pub cause: String,
}

impl TaskFailure {
    /// Builds a failure from its parts.
    #[must_use]
    pub fn new(error: impl Into<String>, cause: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            cause: cause.into(),
        }
    }

    /// The document that replaces the payload along a catch edge.
    #[must_use]
    pub fn to_document(&self) -> Value {
        json!({"Error": self.error, "Cause": self.cause})
    }
}

impl From<HandlerError> for TaskFailure {
    fn from(err: HandlerError) -> Self {
        Self::new(err.error_name(), err.to_string())
    }
}

/// Terminal status of an execution.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExecutionStatus {
    /// A succeed state was reached.
    Succeeded,
    /// A fail state was reached, or a task failed without a catch.
    Failed,
}

/// Result of one execution.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ExecutionOutcome {
    /// Terminal status.
    pub status: ExecutionStatus,
    /// Every state entered, in order. Retries do not repeat an entry.
    pub path: Vec<String>,
    /// Payload at the end of the execution.
    pub output: Value,
    /// Last task failure, whether it was caught or ended the execution.
    pub error: Option<TaskFailure>,
}

impl ExecutionOutcome {
    /// Returns `true` for a successful execution.
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        matches!(self.status, ExecutionStatus::Succeeded)
    }
}

/// Errors that stop the interpreter itself.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The topology is malformed.
    #[error(transparent)]
    Topology(#[from] TopologyError),
    /// A transition named a state the topology does not define.
    #[error("state `{0}` is not defined")]
    UnknownState(String),
    /// The execution did not terminate within the transition ceiling.
    #[error("execution did not terminate within {0} transitions")]
    TooManyTransitions(usize),
}

/// Reference interpreter of the workflow.
pub struct Engine {
    topology: Topology,
    registry: Registry,
    jobs: Arc<dyn JobRunner>,
    sanitize_sql: String,
    sleeper: Arc<dyn Sleeper>,
    max_transitions: usize,
}

impl Engine {
    /// Creates an engine sleeping on the tokio timer.
    #[must_use]
    pub fn new(
        topology: Topology,
        registry: Registry,
        jobs: Arc<dyn JobRunner>,
        sanitize_sql: impl Into<String>,
    ) -> Self {
        Self {
            topology,
            registry,
            jobs,
            sanitize_sql: sanitize_sql.into(),
            sleeper: Arc::new(TokioSleeper),
            max_transitions: DEFAULT_MAX_TRANSITIONS,
        }
    }

    /// Replaces the sleeper used between retries.
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Replaces the transition ceiling.
    #[must_use]
    pub const fn with_max_transitions(mut self, max_transitions: usize) -> Self {
        self.max_transitions = max_transitions;
        self
    }

    /// Runs the workflow from its start state with `input` as payload.
    ///
    /// Task failures are part of the outcome, not errors.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the topology is malformed or the
    /// execution does not terminate.
    pub async fn run(&self, input: Value, uid: &str) -> Result<ExecutionOutcome, EngineError> {
        self.topology.validate()?;

        let mut current = self.topology.start_at();
        let mut payload = input;
        let mut path = Vec::new();
        let mut last_failure = None;

        for _ in 0..self.max_transitions {
            path.push(current.to_owned());
            let state = self
                .topology
                .state(current)
                .ok_or_else(|| EngineError::UnknownState(current.to_owned()))?;
            let terminal = match state {
                State::Succeed => Some(ExecutionStatus::Succeeded),
                State::Fail => Some(ExecutionStatus::Failed),
                State::Choice(choice) => {
                    let next = choice.evaluate(&payload);
                    debug!(state = current, next, "choice evaluated");
                    current = next;
                    None
                }
                State::Task(task) => match self.run_task(current, task, &payload, uid).await {
                    Ok(output) => {
                        payload = output;
                        current = task.next;
                        None
                    }
                    Err(failure) => {
                        let catch_next = task.catch.as_ref().map(|catch| catch.next);
                        warn!(
                            state = current,
                            error = %failure.error,
                            cause = %failure.cause,
                            next = catch_next.unwrap_or_default(),
                            "task failed"
                        );
                        let document = failure.to_document();
                        last_failure = Some(failure);
                        catch_next.map_or(Some(ExecutionStatus::Failed), |next| {
                            payload = document;
                            current = next;
                            None
                        })
                    }
                },
            };
            if let Some(status) = terminal {
                info!(uid, ?status, states = path.len(), "execution finished");
                return Ok(ExecutionOutcome {
                    status,
                    path,
                    output: payload,
                    error: last_failure,
                });
            }
        }
        Err(EngineError::TooManyTransitions(self.max_transitions))
    }

    async fn run_task(
        &self,
        name: &str,
        task: &TaskState,
        payload: &Value,
        uid: &str,
    ) -> Result<Value, TaskFailure> {
        let mut retries = vec![0_u32; task.retry.len()];
        loop {
            let failure = match self.attempt(name, task.work, payload, uid).await {
                Ok(output) => return Ok(output),
                Err(failure) => failure,
            };
            let Some((index, policy)) = task.retrier_for(&failure.error) else {
                return Err(failure);
            };
            let Some(count) = retries.get_mut(index) else {
                return Err(failure);
            };
            if *count >= policy.max_attempts {
                warn!(state = name, error = %failure.error, attempts = *count, "retries exhausted");
                return Err(failure);
            }
            *count += 1;
            let delay = policy.delay_for(*count);
            debug!(
                state = name,
                error = %failure.error,
                retry = *count,
                delay_secs = delay.as_secs(),
                "retrying task"
            );
            self.sleeper.sleep(delay).await;
        }
    }

    async fn attempt(
        &self,
        name: &str,
        work: TaskWork,
        payload: &Value,
        uid: &str,
    ) -> Result<Value, TaskFailure> {
        match work {
            TaskWork::Function => self
                .registry
                .invoke(name, payload.clone(), uid)
                .await
                .map_err(TaskFailure::from),
            TaskWork::Sanitize(engine) => self.sanitize(engine, payload).await,
        }
    }

    async fn sanitize(&self, engine: SanitizerEngine, payload: &Value) -> Result<Value, TaskFailure> {
        let parsed = ExecutionPayload::from_value(payload.clone())
            .map_err(|err| TaskFailure::from(HandlerError::Payload(err)))?;
        let details = parsed
            .db
            .ok_or_else(|| TaskFailure::from(HandlerError::Payload(PayloadError::Missing("db"))))?;
        let request = JobRequest::new(engine, &self.sanitize_sql, &details);
        info!(engine = %engine, "running sanitization job");
        let outcome = self
            .jobs
            .run_job(&request)
            .await
            .map_err(|err| TaskFailure::new(TASK_FAILED, err.to_string()))?;
        let result = serde_json::to_value(&outcome)
            .map_err(|err| TaskFailure::new(TASK_FAILED, err.to_string()))?;
        if !outcome.succeeded() {
            return Err(TaskFailure::new(TASK_FAILED, result.to_string()));
        }

        let mut output = payload.clone();
        if let Value::Object(map) = &mut output {
            map.insert(SANITIZE_RESULT_KEY.to_owned(), result);
        }
        Ok(output)
    }
}
