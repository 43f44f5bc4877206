//! The standard sanitize-and-share graph.

use super::states::{
    CHOOSE_SANITIZER, CHOOSE_SNAPSHOT, CLEANUP, CREATE_TEMP_DATABASE, ENCRYPT, ERROR_CLEANUP,
    FAILURE, FIND_LATEST_SNAPSHOT, INITIALIZE, SET_TEMP_PASSWORD, SHARE_SNAPSHOT, SHOULD_ENCRYPT,
    SUCCESS, TAKE_FINAL_SNAPSHOT, TAKE_SNAPSHOT, WAIT_FOR_ENCRYPT, WAIT_FOR_FINAL_SNAPSHOT,
    WAIT_FOR_PASSWORD, WAIT_FOR_SNAPSHOT, WAIT_FOR_TEMP_DATABASE,
};
use super::{
    CatchPolicy, ChoiceRule, ChoiceState, RetryPolicy, State, TaskState, TaskWork, Topology,
};
use crate::payload::{TAKE_NEW_SNAPSHOT, USE_LATEST_SNAPSHOT};
use crate::sanitizer::SanitizerEngine;

fn task(next: &'static str) -> State {
    State::Task(TaskState {
        work: TaskWork::Function,
        next,
        retry: Vec::new(),
        catch: Some(CatchPolicy {
            next: ERROR_CLEANUP,
        }),
    })
}

fn waiting(next: &'static str) -> State {
    State::Task(TaskState {
        work: TaskWork::Function,
        next,
        retry: vec![RetryPolicy::readiness()],
        catch: Some(CatchPolicy {
            next: ERROR_CLEANUP,
        }),
    })
}

fn sanitize(engine: SanitizerEngine) -> State {
    State::Task(TaskState {
        work: TaskWork::Sanitize(engine),
        next: TAKE_FINAL_SNAPSHOT,
        retry: Vec::new(),
        catch: Some(CatchPolicy {
            next: ERROR_CLEANUP,
        }),
    })
}

fn cleanup(next: &'static str) -> State {
    State::Task(TaskState {
        work: TaskWork::Function,
        next,
        retry: vec![RetryPolicy::cleanup()],
        catch: None,
    })
}

const fn rule(
    variable: &'static str,
    string_equals: &'static str,
    next: &'static str,
) -> ChoiceRule {
    ChoiceRule {
        variable,
        string_equals,
        next,
    }
}

impl Topology {
    /// Builds the standard workflow.
    ///
    /// ```text
    /// Initialize -> ChooseSnapshot -> TakeSnapshot -> WaitForSnapshot ----+
    ///                              \-> FindLatestSnapshot ----------------+
    /// ShouldEncrypt -> [Encrypt -> WaitForEncrypt] -> CreateTempDatabase
    /// -> WaitForTempDatabase -> SetTempPassword -> WaitForPassword
    /// -> ChooseSanitizer -> Sanitize<Engine> -> TakeFinalSnapshot
    /// -> WaitForFinalSnapshot -> ShareSnapshot -> Cleanup -> Success
    /// any failure -> ErrorCleanup -> Failure
    /// ```
    #[must_use]
    pub fn standard() -> Self {
        let mut states = vec![
            (INITIALIZE, task(CHOOSE_SNAPSHOT)),
            (
                CHOOSE_SNAPSHOT,
                State::Choice(ChoiceState {
                    choices: vec![
                        rule("new_snapshot", TAKE_NEW_SNAPSHOT, TAKE_SNAPSHOT),
                        rule("new_snapshot", USE_LATEST_SNAPSHOT, FIND_LATEST_SNAPSHOT),
                    ],
                    default: ERROR_CLEANUP,
                }),
            ),
            (TAKE_SNAPSHOT, task(WAIT_FOR_SNAPSHOT)),
            (WAIT_FOR_SNAPSHOT, waiting(SHOULD_ENCRYPT)),
            (FIND_LATEST_SNAPSHOT, task(SHOULD_ENCRYPT)),
            (
                SHOULD_ENCRYPT,
                State::Choice(ChoiceState {
                    choices: vec![rule("kms", "", CREATE_TEMP_DATABASE)],
                    default: ENCRYPT,
                }),
            ),
            (ENCRYPT, task(WAIT_FOR_ENCRYPT)),
            (WAIT_FOR_ENCRYPT, waiting(CREATE_TEMP_DATABASE)),
            (CREATE_TEMP_DATABASE, task(WAIT_FOR_TEMP_DATABASE)),
            (WAIT_FOR_TEMP_DATABASE, waiting(SET_TEMP_PASSWORD)),
            (SET_TEMP_PASSWORD, task(WAIT_FOR_PASSWORD)),
            (WAIT_FOR_PASSWORD, waiting(CHOOSE_SANITIZER)),
            (
                CHOOSE_SANITIZER,
                State::Choice(ChoiceState {
                    choices: SanitizerEngine::ALL
                        .into_iter()
                        .map(|engine| rule("engine", engine.engine_name(), engine.state_name()))
                        .collect(),
                    default: ERROR_CLEANUP,
                }),
            ),
        ];
        states.extend(
            SanitizerEngine::ALL
                .into_iter()
                .map(|engine| (engine.state_name(), sanitize(engine))),
        );
        states.extend([
            (TAKE_FINAL_SNAPSHOT, task(WAIT_FOR_FINAL_SNAPSHOT)),
            (WAIT_FOR_FINAL_SNAPSHOT, waiting(SHARE_SNAPSHOT)),
            (SHARE_SNAPSHOT, task(CLEANUP)),
            (CLEANUP, cleanup(SUCCESS)),
            (ERROR_CLEANUP, cleanup(FAILURE)),
            (SUCCESS, State::Succeed),
            (FAILURE, State::Fail),
        ]);
        Self::new(INITIALIZE, states)
    }
}
