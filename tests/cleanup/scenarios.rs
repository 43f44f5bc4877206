//! BDD scenarios for the cleanup states.

use rstest_bdd_macros::scenario;

use super::test_helpers::{CleanupContext, cleanup_context};

#[scenario(
    path = "tests/features/cleanup.feature",
    name = "Error cleanup removes only the resources of its execution"
)]
fn scenario_error_cleanup_scoped_to_execution(cleanup_context: CleanupContext) {
    let _ = cleanup_context;
}

#[scenario(
    path = "tests/features/cleanup.feature",
    name = "Repeating the cleanup is harmless"
)]
fn scenario_cleanup_is_idempotent(cleanup_context: CleanupContext) {
    let _ = cleanup_context;
}

#[scenario(
    path = "tests/features/cleanup.feature",
    name = "A failed deletion is reported for retry"
)]
fn scenario_failed_deletion_is_reported(cleanup_context: CleanupContext) {
    let _ = cleanup_context;
}
