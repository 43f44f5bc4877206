//! Tag-driven cleanup of ephemeral resources.
//!
//! The janitor identifies resources belonging to one execution through the
//! ownership tag (`RDS-sanitized-snapshots-temp=<uid>`) and deletes them. It
//! never relies on identifiers recorded in the payload, so it works on the
//! error path where the payload has been replaced by an error description.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::backend::{ProviderError, RdsApi, ResourceType, TagIndex};
use crate::tags::{ownership_tag, resource_id_from_arn};

/// Environment variable the operator janitor reads the execution id from.
pub const EXECUTION_ID_ENV: &str = "SANITIZE_EXECUTION_ID";

/// Summary of janitor work.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SweepSummary {
    /// Number of database instances deleted during the sweep.
    pub deleted_databases: usize,
    /// Number of snapshots deleted during the sweep.
    pub deleted_snapshots: usize,
}

impl SweepSummary {
    /// Total number of resources removed.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.deleted_databases + self.deleted_snapshots
    }
}

/// Errors returned by the janitor.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum JanitorError {
    /// Raised when the sweep is started without an execution id.
    #[error("missing {field}")]
    InvalidConfig {
        /// Name of the missing or invalid field.
        field: String,
    },
    /// Raised when tagged resources cannot be listed.
    #[error("failed to list tagged {resource_type} resources: {source}")]
    Discovery {
        /// Resource family being listed.
        resource_type: ResourceType,
        /// Underlying provider failure.
        source: ProviderError,
    },
    /// Raised when a tagged resource cannot be deleted.
    #[error("failed to delete {resource_type} `{id}`: {source}")]
    Delete {
        /// Resource family of the resource.
        resource_type: ResourceType,
        /// Identifier of the resource.
        id: String,
        /// Underlying provider failure.
        source: ProviderError,
    },
}

/// Deletes execution-tagged databases and snapshots.
#[derive(Clone)]
pub struct Janitor {
    rds: Arc<dyn RdsApi>,
    index: Arc<dyn TagIndex>,
}

impl Janitor {
    /// Creates a new janitor over the given provider and tag index.
    #[must_use]
    pub fn new(rds: Arc<dyn RdsApi>, index: Arc<dyn TagIndex>) -> Self {
        Self { rds, index }
    }

    /// Deletes every database and snapshot tagged with `uid`.
    ///
    /// Databases are removed first so their automated backups go with them.
    /// Resources that are already gone or already being deleted count as
    /// deleted, which keeps a retried sweep idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`JanitorError::InvalidConfig`] for a blank `uid`, and
    /// propagates any discovery or deletion failure.
    pub async fn sweep(&self, uid: &str) -> Result<SweepSummary, JanitorError> {
        let execution_id = uid.trim();
        if execution_id.is_empty() {
            return Err(JanitorError::InvalidConfig {
                field: String::from("execution id"),
            });
        }

        let deleted_databases = self.sweep_type(ResourceType::Database, execution_id).await?;
        let deleted_snapshots = self.sweep_type(ResourceType::Snapshot, execution_id).await?;
        let summary = SweepSummary {
            deleted_databases,
            deleted_snapshots,
        };
        info!(
            uid = execution_id,
            deleted_databases, deleted_snapshots, "janitor sweep complete"
        );
        Ok(summary)
    }

    async fn sweep_type(&self, resource_type: ResourceType, uid: &str) -> Result<usize, JanitorError> {
        let tag = ownership_tag(uid);
        let arns = self
            .index
            .find_tagged(resource_type, &tag)
            .await
            .map_err(|source| JanitorError::Discovery {
                resource_type,
                source,
            })?;
        debug!(%resource_type, uid, found = arns.len(), "listed tagged resources");

        let mut deleted = 0;
        for arn in &arns {
            let id = resource_id_from_arn(arn);
            let result = match resource_type {
                ResourceType::Database => self.rds.delete_instance(id).await,
                ResourceType::Snapshot => self.rds.delete_snapshot(id).await,
            };
            match result {
                Ok(()) => info!(%resource_type, id, "deleted tagged resource"),
                Err(err) if err.is_not_found() => {
                    debug!(%resource_type, id, "tagged resource already gone");
                }
                Err(source) => {
                    return Err(JanitorError::Delete {
                        resource_type,
                        id: id.to_owned(),
                        source,
                    });
                }
            }
            deleted += 1;
        }
        Ok(deleted)
    }
}
