//! Capability seams for the relational provisioning API and the tag index.
//!
//! Handlers only ever talk to these traits. The AWS implementations live in
//! [`crate::aws`]; tests substitute the in-memory provider from
//! [`crate::test_support`].

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Future returned by provider operations.
pub type BackendFuture<'a, T, E = ProviderError> =
    Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Key/value metadata attached to a resource at creation time.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct Tag {
    /// Tag key.
    pub key: String,
    /// Tag value.
    pub value: String,
}

impl Tag {
    /// Creates a tag from any string-like key and value.
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Network address of a database instance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Endpoint {
    /// DNS name of the instance.
    pub address: String,
    /// TCP port the engine listens on.
    pub port: u16,
}

/// Subset of a database instance description used by the workflow.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DbInstance {
    /// Instance identifier.
    pub id: String,
    /// Engine name as reported by the provider (for example `postgres`).
    pub engine: String,
    /// Provider status string (for example `available`).
    pub status: String,
    /// Whether the provider still has modifications queued for the instance.
    pub pending_modifications: bool,
    /// Connection endpoint, absent while the instance is being created.
    pub endpoint: Option<Endpoint>,
    /// Master user name.
    pub master_username: String,
    /// Initial database name, when one was configured.
    pub db_name: Option<String>,
}

/// Subset of a snapshot description used by the workflow.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DbSnapshot {
    /// Snapshot identifier.
    pub id: String,
    /// Identifier of the instance the snapshot was taken from.
    pub instance_id: String,
    /// Provider status string (for example `creating`).
    pub status: String,
    /// Creation time; absent until the provider records it.
    pub created_at: Option<DateTime<Utc>>,
}

/// Request to copy a snapshot under a different encryption key.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CopySnapshotRequest {
    /// Snapshot to copy.
    pub source_snapshot_id: String,
    /// Identifier of the copy.
    pub target_snapshot_id: String,
    /// Key used to encrypt the copy.
    pub kms_key_id: String,
    /// Tags applied to the copy.
    pub tags: Vec<Tag>,
}

/// Request to restore a new, private database instance from a snapshot.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RestoreRequest {
    /// Identifier of the new instance.
    pub instance_id: String,
    /// Snapshot to restore from.
    pub snapshot_id: String,
    /// VPC security group attached to the instance.
    pub security_group_id: String,
    /// DB subnet group the instance is placed in.
    pub subnet_group_name: String,
    /// Tags applied to the instance.
    pub tags: Vec<Tag>,
}

/// Request to rotate the master credential of an instance.
#[derive(Clone, Eq, PartialEq)]
pub struct ModifyInstanceRequest {
    /// Instance to modify.
    pub instance_id: String,
    /// New master password.
    pub master_password: String,
    /// Automated backup retention in days.
    pub backup_retention_days: i32,
    /// Apply immediately instead of during the next maintenance window.
    pub apply_immediately: bool,
}

impl fmt::Debug for ModifyInstanceRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModifyInstanceRequest")
            .field("instance_id", &self.instance_id)
            .field("master_password", &"<redacted>")
            .field("backup_retention_days", &self.backup_retention_days)
            .field("apply_immediately", &self.apply_immediately)
            .finish()
    }
}

/// Resource families that can be discovered through the tag index.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum ResourceType {
    /// Database instances (`rds:db`).
    Database,
    /// Manual database snapshots (`rds:snapshot`).
    Snapshot,
}

impl ResourceType {
    /// Returns the resource-type filter understood by the tag index.
    #[must_use]
    pub const fn filter(self) -> &'static str {
        match self {
            Self::Database => "rds:db",
            Self::Snapshot => "rds:snapshot",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.filter())
    }
}

/// Errors raised by provider implementations.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ProviderError {
    /// The resource being created already exists.
    #[error("already exists: {message}")]
    AlreadyExists {
        /// Provider message.
        message: String,
    },
    /// The resource does not exist or is already being deleted.
    #[error("not found: {message}")]
    NotFound {
        /// Provider message.
        message: String,
    },
    /// Any other provider failure.
    #[error("provider error: {message}")]
    Api {
        /// Provider error code, when one was returned.
        code: Option<String>,
        /// Provider message.
        message: String,
    },
}

impl ProviderError {
    /// Builds an [`ProviderError::Api`] without an error code.
    #[must_use]
    pub fn api(message: impl Into<String>) -> Self {
        Self::Api {
            code: None,
            message: message.into(),
        }
    }

    /// Returns `true` when the error reports an already existing resource.
    #[must_use]
    pub const fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    /// Returns `true` when the error reports a missing resource.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Relational resource provisioning API.
pub trait RdsApi: Send + Sync {
    /// Describes a single database instance.
    fn describe_instance<'a>(&'a self, instance_id: &'a str) -> BackendFuture<'a, DbInstance>;

    /// Describes a single snapshot.
    fn describe_snapshot<'a>(&'a self, snapshot_id: &'a str) -> BackendFuture<'a, DbSnapshot>;

    /// Lists every snapshot of an instance, following pagination.
    fn list_snapshots<'a>(&'a self, instance_id: &'a str) -> BackendFuture<'a, Vec<DbSnapshot>>;

    /// Takes a manual snapshot of an instance.
    fn create_snapshot<'a>(
        &'a self,
        instance_id: &'a str,
        snapshot_id: &'a str,
        tags: &'a [Tag],
    ) -> BackendFuture<'a, ()>;

    /// Copies a snapshot under a new encryption key.
    fn copy_snapshot<'a>(&'a self, request: &'a CopySnapshotRequest) -> BackendFuture<'a, ()>;

    /// Restores a new instance from a snapshot.
    fn restore_instance<'a>(&'a self, request: &'a RestoreRequest) -> BackendFuture<'a, ()>;

    /// Modifies credentials and backup retention of an instance.
    fn modify_instance<'a>(&'a self, request: &'a ModifyInstanceRequest)
    -> BackendFuture<'a, ()>;

    /// Grants restore permission on a snapshot to the given accounts.
    fn share_snapshot<'a>(
        &'a self,
        snapshot_id: &'a str,
        accounts: &'a [String],
    ) -> BackendFuture<'a, ()>;

    /// Deletes an instance without a final snapshot, dropping automated
    /// backups.
    fn delete_instance<'a>(&'a self, instance_id: &'a str) -> BackendFuture<'a, ()>;

    /// Deletes a manual snapshot.
    fn delete_snapshot<'a>(&'a self, snapshot_id: &'a str) -> BackendFuture<'a, ()>;
}

/// Tag-based resource index.
pub trait TagIndex: Send + Sync {
    /// Returns the ARNs of every resource of `resource_type` carrying `tag`.
    fn find_tagged<'a>(
        &'a self,
        resource_type: ResourceType,
        tag: &'a Tag,
    ) -> BackendFuture<'a, Vec<String>>;
}
