//! Names of every state in the provisioning workflow.

/// Entry state: inspects the source database and derives identifiers.
pub const INITIALIZE: &str = "Initialize";
/// Choice between a fresh snapshot and the latest existing one.
pub const CHOOSE_SNAPSHOT: &str = "ChooseSnapshot";
/// Takes a fresh snapshot of the source database.
pub const TAKE_SNAPSHOT: &str = "TakeSnapshot";
/// Picks the most recent existing snapshot of the source database.
pub const FIND_LATEST_SNAPSHOT: &str = "FindLatestSnapshot";
/// Waits for the fresh source snapshot.
pub const WAIT_FOR_SNAPSHOT: &str = "WaitForSnapshot";
/// Choice on whether a KMS key was configured.
pub const SHOULD_ENCRYPT: &str = "ShouldEncrypt";
/// Copies the source snapshot under the configured KMS key.
pub const ENCRYPT: &str = "Encrypt";
/// Waits for the re-encrypted copy.
pub const WAIT_FOR_ENCRYPT: &str = "WaitForEncrypt";
/// Restores the temporary database.
pub const CREATE_TEMP_DATABASE: &str = "CreateTempDatabase";
/// Waits for the temporary database to become available.
pub const WAIT_FOR_TEMP_DATABASE: &str = "WaitForTempDatabase";
/// Rotates the temporary database's master password.
pub const SET_TEMP_PASSWORD: &str = "SetTempPassword";
/// Waits for the password change to be applied.
pub const WAIT_FOR_PASSWORD: &str = "WaitForPassword";
/// Choice on the detected engine.
pub const CHOOSE_SANITIZER: &str = "ChooseSanitizer";
/// Snapshots the sanitized temporary database.
pub const TAKE_FINAL_SNAPSHOT: &str = "TakeFinalSnapshot";
/// Waits for the sanitized snapshot.
pub const WAIT_FOR_FINAL_SNAPSHOT: &str = "WaitForFinalSnapshot";
/// Grants restore access on the sanitized snapshot.
pub const SHARE_SNAPSHOT: &str = "ShareSnapshot";
/// Removes ephemeral resources after a successful run.
pub const CLEANUP: &str = "Cleanup";
/// Removes ephemeral resources after a failure.
pub const ERROR_CLEANUP: &str = "ErrorCleanup";
/// Terminal success state.
pub const SUCCESS: &str = "Success";
/// Terminal failure state.
pub const FAILURE: &str = "Failure";
