//! Declarative topology of the provisioning workflow.
//!
//! The graph is plain data: the reference [`crate::engine::Engine`] walks it
//! in process and [`Topology::to_state_machine`] renders it for a durable
//! execution substrate. Both read the same retry and catch policies.

mod standard;
mod state_machine;
pub mod states;

use std::collections::{BTreeSet, VecDeque};
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use crate::sanitizer::SanitizerEngine;

pub use state_machine::StateMachineResources;

/// Error class matching every error.
pub const STATES_ALL: &str = "States.ALL";

/// Payload key receiving the result of a sanitization job.
pub const SANITIZE_RESULT_KEY: &str = "SanitizeResult";

/// Bounded retry applied to errors of one class.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Error name matched by the policy, or [`STATES_ALL`].
    pub error_equals: &'static str,
    /// Delay before the first retry.
    pub interval_seconds: u32,
    /// Number of retries after the first attempt.
    pub max_attempts: u32,
    /// Multiplier applied to the delay after every retry.
    pub backoff_rate: f64,
}

impl RetryPolicy {
    /// Policy of the waiting states: `NotReady` every minute for five hours.
    #[must_use]
    pub const fn readiness() -> Self {
        Self {
            error_equals: crate::handlers::NOT_READY,
            interval_seconds: 60,
            max_attempts: 300,
            backoff_rate: 1.0,
        }
    }

    /// Policy of the cleanup states: any error every two minutes, ten times.
    #[must_use]
    pub const fn cleanup() -> Self {
        Self {
            error_equals: STATES_ALL,
            interval_seconds: 120,
            max_attempts: 10,
            backoff_rate: 1.0,
        }
    }

    /// Returns `true` when the policy applies to `error_name`.
    #[must_use]
    pub fn matches(&self, error_name: &str) -> bool {
        self.error_equals == STATES_ALL || self.error_equals == error_name
    }

    /// Delay before retry number `retry` (starting at 1).
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry.saturating_sub(1)).unwrap_or(i32::MAX);
        let factor = self.backoff_rate.powi(exponent);
        Duration::try_from_secs_f64(factor.mul_add(f64::from(self.interval_seconds), 0.0))
            .unwrap_or(Duration::MAX)
    }
}

/// Redirects any unhandled error to a compensating state.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CatchPolicy {
    /// State entered when the task fails.
    pub next: &'static str,
}

/// Work performed by a task state.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TaskWork {
    /// Invokes the handler registered under the state's name.
    Function,
    /// Runs the engine's sanitization job to completion.
    Sanitize(SanitizerEngine),
}

/// A state that performs work and then moves on unconditionally.
#[derive(Clone, Debug, PartialEq)]
pub struct TaskState {
    /// Work to perform.
    pub work: TaskWork,
    /// State entered on success.
    pub next: &'static str,
    /// Retry policies, checked in order.
    pub retry: Vec<RetryPolicy>,
    /// Catch policy for errors no retry absorbs.
    pub catch: Option<CatchPolicy>,
}

impl TaskState {
    /// Returns the first retry policy applying to `error_name` with its
    /// position in [`TaskState::retry`].
    #[must_use]
    pub fn retrier_for(&self, error_name: &str) -> Option<(usize, &RetryPolicy)> {
        self.retry
            .iter()
            .enumerate()
            .find(|(_, policy)| policy.matches(error_name))
    }
}

/// One branch of a choice: exact string equality on a payload field.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChoiceRule {
    /// Top-level payload field compared.
    pub variable: &'static str,
    /// Value the field must equal.
    pub string_equals: &'static str,
    /// State entered when the rule matches.
    pub next: &'static str,
}

/// A state selecting the next state from the payload.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChoiceState {
    /// Rules, first match wins.
    pub choices: Vec<ChoiceRule>,
    /// State entered when no rule matches.
    pub default: &'static str,
}

impl ChoiceState {
    /// Selects the next state for `payload`. A missing or non-string field
    /// never matches.
    #[must_use]
    pub fn evaluate(&self, payload: &Value) -> &'static str {
        self.choices
            .iter()
            .find(|rule| {
                payload
                    .get(rule.variable)
                    .and_then(Value::as_str)
                    .is_some_and(|value| value == rule.string_equals)
            })
            .map_or(self.default, |rule| rule.next)
    }
}

/// A workflow state.
#[derive(Clone, Debug, PartialEq)]
pub enum State {
    /// Performs work.
    Task(TaskState),
    /// Branches on the payload.
    Choice(ChoiceState),
    /// Ends the execution successfully.
    Succeed,
    /// Ends the execution as failed.
    Fail,
}

impl State {
    /// States this state can transition to.
    #[must_use]
    pub fn successors(&self) -> Vec<&'static str> {
        match self {
            Self::Task(task) => {
                let mut next = vec![task.next];
                next.extend(task.catch.as_ref().map(|catch| catch.next));
                next
            }
            Self::Choice(choice) => choice
                .choices
                .iter()
                .map(|rule| rule.next)
                .chain(std::iter::once(choice.default))
                .collect(),
            Self::Succeed | Self::Fail => Vec::new(),
        }
    }
}

/// Structural problems detected by [`Topology::validate`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum TopologyError {
    /// The start state is not defined.
    #[error("start state `{0}` is not defined")]
    MissingStart(String),
    /// Two states share a name.
    #[error("state `{0}` is defined twice")]
    DuplicateState(String),
    /// A transition names an undefined state.
    #[error("state `{from}` transitions to undefined state `{target}`")]
    UnknownTarget {
        /// State holding the transition.
        from: String,
        /// Undefined target.
        target: String,
    },
    /// A task could fail without reaching the compensating state.
    #[error("task `{0}` does not catch errors into the compensating state")]
    MissingCatch(String),
    /// A state cannot be reached from the start state.
    #[error("state `{0}` is unreachable")]
    Unreachable(String),
}

/// The workflow graph.
#[derive(Clone, Debug, PartialEq)]
pub struct Topology {
    start_at: &'static str,
    states: Vec<(&'static str, State)>,
}

impl Topology {
    /// Builds a topology from its parts.
    #[must_use]
    pub const fn new(start_at: &'static str, states: Vec<(&'static str, State)>) -> Self {
        Self { start_at, states }
    }

    /// Name of the start state.
    #[must_use]
    pub const fn start_at(&self) -> &'static str {
        self.start_at
    }

    /// Looks a state up by name.
    #[must_use]
    pub fn state(&self, name: &str) -> Option<&State> {
        self.states
            .iter()
            .find(|(state_name, _)| *state_name == name)
            .map(|(_, state)| state)
    }

    /// Iterates over the states in definition order.
    pub fn states(&self) -> impl Iterator<Item = (&'static str, &State)> {
        self.states.iter().map(|(name, state)| (*name, state))
    }

    /// Checks the graph is well formed.
    ///
    /// Every transition must name a defined state, every task other than the
    /// cleanup states must catch into [`states::ERROR_CLEANUP`], and every
    /// state must be reachable from the start.
    ///
    /// # Errors
    ///
    /// Returns the first [`TopologyError`] found.
    pub fn validate(&self) -> Result<(), TopologyError> {
        let mut names = BTreeSet::new();
        for (name, _) in &self.states {
            if !names.insert(*name) {
                return Err(TopologyError::DuplicateState((*name).to_owned()));
            }
        }
        if !names.contains(self.start_at) {
            return Err(TopologyError::MissingStart(self.start_at.to_owned()));
        }

        for (name, state) in &self.states {
            if let Some(target) = state
                .successors()
                .into_iter()
                .find(|target| !names.contains(target))
            {
                return Err(TopologyError::UnknownTarget {
                    from: (*name).to_owned(),
                    target: target.to_owned(),
                });
            }
            if let State::Task(task) = state {
                let is_cleanup = *name == states::CLEANUP || *name == states::ERROR_CLEANUP;
                let catches = task
                    .catch
                    .as_ref()
                    .is_some_and(|catch| catch.next == states::ERROR_CLEANUP);
                if !is_cleanup && !catches {
                    return Err(TopologyError::MissingCatch((*name).to_owned()));
                }
            }
        }

        let reachable = self.reachable();
        match self.states.iter().find(|(name, _)| !reachable.contains(name)) {
            Some((name, _)) => Err(TopologyError::Unreachable((*name).to_owned())),
            None => Ok(()),
        }
    }

    fn reachable(&self) -> BTreeSet<&'static str> {
        let mut seen = BTreeSet::from([self.start_at]);
        let mut queue = VecDeque::from([self.start_at]);
        while let Some(name) = queue.pop_front() {
            let Some(state) = self.state(name) else {
                continue;
            };
            for next in state.successors() {
                if seen.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        seen
    }
}

#[cfg(test)]
mod tests;
