//! BDD step definitions for cleanup behaviour.

use rstest_bdd_macros::{given, then, when};
use sanitized_snapshots::backend::ProviderError;
use sanitized_snapshots::tags::OWNERSHIP_TAG_KEY;
use serde_json::json;
use tokio::runtime::Runtime;

use super::test_helpers::{
    CleanupContext, CleanupOutcome, DELIVERED_SNAPSHOT, insert_delivered_snapshot,
    insert_temp_database, insert_temp_snapshot, temp_database_id, temp_snapshot_id,
};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("assertion failed: {0}")]
    Assertion(String),
}

#[given("execution \"{uid}\" left a temporary database and snapshot")]
fn execution_left_database_and_snapshot(cleanup_context: CleanupContext, uid: String) -> CleanupContext {
    insert_temp_database(&cleanup_context.provider, uid.trim());
    insert_temp_snapshot(&cleanup_context.provider, uid.trim());
    cleanup_context
}

#[given("execution \"{uid}\" left a temporary snapshot")]
fn execution_left_snapshot(cleanup_context: CleanupContext, uid: String) -> CleanupContext {
    insert_temp_snapshot(&cleanup_context.provider, uid.trim());
    cleanup_context
}

#[given("a sanitized snapshot was delivered")]
fn sanitized_snapshot_delivered(cleanup_context: CleanupContext) -> CleanupContext {
    insert_delivered_snapshot(&cleanup_context.provider);
    cleanup_context
}

#[given("snapshot deletion fails once")]
fn snapshot_deletion_fails(cleanup_context: CleanupContext) -> CleanupContext {
    cleanup_context
        .provider
        .fail_next("delete_snapshot", ProviderError::api("rate exceeded"));
    cleanup_context
}

fn run_state(
    mut cleanup_context: CleanupContext,
    state: &str,
    uid: &str,
    payload: serde_json::Value,
) -> Result<CleanupContext, StepError> {
    let runtime = Runtime::new().map_err(|err| StepError::Assertion(err.to_string()))?;
    let registry = cleanup_context.registry();
    let result = runtime.block_on(async { registry.invoke(state, payload, uid).await });
    cleanup_context.outcomes.push(match result {
        Ok(_) => CleanupOutcome::Success,
        Err(err) => CleanupOutcome::Failure(err.error_name().to_owned()),
    });
    Ok(cleanup_context)
}

#[when("the \"{state}\" state runs for \"{uid}\" with an error document")]
fn state_runs_with_error_document(
    cleanup_context: CleanupContext,
    state: String,
    uid: String,
) -> Result<CleanupContext, StepError> {
    let document = json!({
        "Error": "BadStatus",
        "Cause": "temporary database reported status failed",
    });
    run_state(cleanup_context, state.trim(), uid.trim(), document)
}

#[when("the \"{state}\" state runs for \"{uid}\"")]
fn state_runs(
    cleanup_context: CleanupContext,
    state: String,
    uid: String,
) -> Result<CleanupContext, StepError> {
    let payload = json!({"db_identifier": "orders"});
    run_state(cleanup_context, state.trim(), uid.trim(), payload)
}

#[then("the state succeeds")]
fn state_succeeds(cleanup_context: &CleanupContext) -> Result<(), StepError> {
    match cleanup_context.outcomes.last() {
        Some(CleanupOutcome::Success) => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected success, got {other:?}"
        ))),
    }
}

#[then("every cleanup run succeeds")]
fn every_run_succeeds(cleanup_context: &CleanupContext) -> Result<(), StepError> {
    let failures: Vec<&CleanupOutcome> = cleanup_context
        .outcomes
        .iter()
        .filter(|outcome| matches!(outcome, CleanupOutcome::Failure(_)))
        .collect();
    if cleanup_context.outcomes.len() == 2 && failures.is_empty() {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected two successful runs, got {:?}",
            cleanup_context.outcomes
        )))
    }
}

#[then("the state fails with error \"{name}\"")]
fn state_fails_with(cleanup_context: &CleanupContext, name: String) -> Result<(), StepError> {
    match cleanup_context.outcomes.last() {
        Some(CleanupOutcome::Failure(actual)) if actual == name.trim() => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected failure {name}, got {other:?}"
        ))),
    }
}

#[then("no resource tagged for \"{uid}\" remains")]
fn no_tagged_resource_remains(cleanup_context: &CleanupContext, uid: String) -> Result<(), StepError> {
    let provider = &cleanup_context.provider;
    let owned = |tags: Option<Vec<sanitized_snapshots::Tag>>| {
        tags.unwrap_or_default()
            .iter()
            .any(|tag| tag.key == OWNERSHIP_TAG_KEY && tag.value == uid.trim())
    };
    let leftovers: Vec<String> = provider
        .instance_ids()
        .into_iter()
        .filter(|id| owned(provider.instance_tags(id)))
        .chain(
            provider
                .snapshot_ids()
                .into_iter()
                .filter(|id| owned(provider.snapshot_tags(id))),
        )
        .collect();
    if leftovers.is_empty() {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "resources of {uid} remain: {leftovers:?}"
        )))
    }
}

#[then("the resources tagged for \"{uid}\" remain")]
fn tagged_resources_remain(cleanup_context: &CleanupContext, uid: String) -> Result<(), StepError> {
    let expected = temp_snapshot_id(uid.trim());
    if cleanup_context.provider.snapshot_ids().contains(&expected) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!("{expected} was deleted")))
    }
}

#[then("the sanitized snapshot remains")]
fn sanitized_snapshot_remains(cleanup_context: &CleanupContext) -> Result<(), StepError> {
    if cleanup_context
        .provider
        .snapshot_ids()
        .iter()
        .any(|id| id == DELIVERED_SNAPSHOT)
    {
        Ok(())
    } else {
        Err(StepError::Assertion(String::from(
            "the delivered snapshot was deleted",
        )))
    }
}

#[then("the temporary database of \"{uid}\" is gone")]
fn temporary_database_gone(cleanup_context: &CleanupContext, uid: String) -> Result<(), StepError> {
    let id = temp_database_id(uid.trim());
    if cleanup_context.provider.instance_ids().contains(&id) {
        Err(StepError::Assertion(format!("{id} still exists")))
    } else {
        Ok(())
    }
}
