//! Configuration loading via `ortho-config`.

use std::collections::BTreeMap;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;

use crate::naming::DEFAULT_SNAPSHOT_FORMAT;
use crate::payload::{TAKE_NEW_SNAPSHOT, USE_LATEST_SNAPSHOT};
use crate::sanitizer::SanitizerEngine;
use crate::workflow::StateMachineResources;

const CONFIG_FILE: &str = "sanitized-snapshots.toml";
const SECTION: &str = "sanitize";

/// Workflow inputs and deployment resources derived from environment
/// variables, configuration files, and CLI flags.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(prefix = "SANITIZE")]
pub struct SanitizeConfig {
    /// Identifier of the production database instance to copy.
    pub db_identifier: String,
    /// VPC hosting the temporary database.
    pub vpc_id: String,
    /// DB subnet group the temporary database is placed in.
    pub subnet_group_id: String,
    /// Security group attached to the temporary database and the
    /// sanitization tasks.
    pub security_group_id: String,
    /// Whether to take a fresh snapshot or reuse the latest one.
    #[ortho_config(default = USE_LATEST_SNAPSHOT.to_owned())]
    pub new_snapshot: String,
    /// Template of the final snapshot name.
    #[ortho_config(default = DEFAULT_SNAPSHOT_FORMAT.to_owned())]
    pub snapshot_format: String,
    /// KMS key used to re-encrypt the snapshot. Empty keeps the source key.
    #[ortho_config(default = String::new())]
    pub kms: String,
    /// Comma-separated account ids granted restore access.
    #[ortho_config(default = String::new())]
    pub share_accounts: String,
    /// Comma-separated subnets of the sanitization tasks.
    #[ortho_config(default = String::new())]
    pub subnets: String,
    /// Region override. The SDK default chain applies when unset.
    pub region: Option<String>,
    /// SQL executed by the sanitization job.
    #[ortho_config(default = String::new())]
    pub sanitize_sql: String,
    /// ECS cluster running the sanitization tasks.
    pub cluster: Option<String>,
    /// Task definition of the PostgreSQL sanitizer.
    pub postgres_task_definition: Option<String>,
    /// Task definition of the MySQL sanitizer.
    pub mysql_task_definition: Option<String>,
    /// Task definition of the MariaDB sanitizer.
    pub mariadb_task_definition: Option<String>,
    /// ARN of the deployed handler function.
    pub handler_arn: Option<String>,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }
}

impl SanitizeConfig {
    fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "missing {}: set {} or add {} to [{SECTION}] in {CONFIG_FILE}",
                metadata.description, metadata.env_var, metadata.toml_key
            )));
        }
        Ok(())
    }

    /// Loads configuration using the `ortho-config` derive. Values merge
    /// defaults, configuration files, environment variables, and CLI flags in
    /// that order of precedence.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the loader fails to merge sources.
    pub fn load_from_sources() -> Result<Self, ConfigError> {
        Self::load().map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Loads configuration without attempting to parse CLI arguments. Values
    /// still merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("sanitized-snapshots")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation. Error messages name the environment
    /// variable and configuration key supplying each value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty
    /// and [`ConfigError::InvalidValue`] when the snapshot choice is not one
    /// of the two supported values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::require_field(
            &self.db_identifier,
            &FieldMetadata::new(
                "source database identifier",
                "SANITIZE_DB_IDENTIFIER",
                "db_identifier",
            ),
        )?;
        Self::require_field(
            &self.vpc_id,
            &FieldMetadata::new("VPC ID", "SANITIZE_VPC_ID", "vpc_id"),
        )?;
        Self::require_field(
            &self.subnet_group_id,
            &FieldMetadata::new(
                "DB subnet group",
                "SANITIZE_SUBNET_GROUP_ID",
                "subnet_group_id",
            ),
        )?;
        Self::require_field(
            &self.security_group_id,
            &FieldMetadata::new(
                "security group",
                "SANITIZE_SECURITY_GROUP_ID",
                "security_group_id",
            ),
        )?;
        Self::require_field(
            &self.snapshot_format,
            &FieldMetadata::new(
                "snapshot name template",
                "SANITIZE_SNAPSHOT_FORMAT",
                "snapshot_format",
            ),
        )?;
        if self.new_snapshot != TAKE_NEW_SNAPSHOT && self.new_snapshot != USE_LATEST_SNAPSHOT {
            return Err(ConfigError::InvalidValue(format!(
                "new_snapshot must be `{TAKE_NEW_SNAPSHOT}` or `{USE_LATEST_SNAPSHOT}`, got `{}`",
                self.new_snapshot
            )));
        }
        Ok(())
    }

    /// Validates the settings needed to run sanitization jobs on ECS.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] naming the first missing value.
    pub fn validate_jobs(&self) -> Result<(), ConfigError> {
        Self::require_field(
            self.cluster.as_deref().unwrap_or_default(),
            &FieldMetadata::new("ECS cluster", "SANITIZE_CLUSTER", "cluster"),
        )?;
        Self::require_field(
            &self.subnets,
            &FieldMetadata::new("task subnets", "SANITIZE_SUBNETS", "subnets"),
        )?;
        if self.task_definitions().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "missing sanitizer task definition: set SANITIZE_POSTGRES_TASK_DEFINITION \
                 or add postgres_task_definition to [{SECTION}] in {CONFIG_FILE}"
            )));
        }
        Ok(())
    }

    /// Accounts granted restore access, blanks removed.
    #[must_use]
    pub fn share_accounts_list(&self) -> Vec<String> {
        split_list(&self.share_accounts)
    }

    /// Subnets of the sanitization tasks, blanks removed.
    #[must_use]
    pub fn subnets_list(&self) -> Vec<String> {
        split_list(&self.subnets)
    }

    /// Configured task definitions keyed by engine.
    #[must_use]
    pub fn task_definitions(&self) -> BTreeMap<SanitizerEngine, String> {
        [
            (SanitizerEngine::Postgres, &self.postgres_task_definition),
            (SanitizerEngine::MySql, &self.mysql_task_definition),
            (SanitizerEngine::MariaDb, &self.mariadb_task_definition),
        ]
        .into_iter()
        .filter_map(|(engine, arn)| {
            arn.as_deref()
                .filter(|value| !value.trim().is_empty())
                .map(|value| (engine, value.to_owned()))
        })
        .collect()
    }

    /// The input handed to the `Initialize` state.
    #[must_use]
    pub fn initial_payload(&self) -> Value {
        json!({
            "db_identifier": self.db_identifier,
            "vpc_id": self.vpc_id,
            "subnet_group_id": self.subnet_group_id,
            "security_group_id": self.security_group_id,
            "new_snapshot": self.new_snapshot,
            "shared_accounts": self.share_accounts_list(),
            "snapshot_format": self.snapshot_format,
            "kms": self.kms,
        })
    }

    /// Resources of the rendered state machine. Values the configuration
    /// leaves unset stay as template placeholders.
    #[must_use]
    pub fn state_machine_resources(&self) -> StateMachineResources {
        let placeholders = StateMachineResources::placeholders();
        let mut task_definitions = placeholders.task_definitions;
        task_definitions.extend(self.task_definitions());
        let subnets = self.subnets_list();
        StateMachineResources {
            handler_arn: self.handler_arn.clone().unwrap_or(placeholders.handler_arn),
            cluster_arn: self.cluster.clone().unwrap_or(placeholders.cluster_arn),
            task_definitions,
            subnets: if subnets.is_empty() {
                placeholders.subnets
            } else {
                subnets
            },
            security_group_id: self.security_group_id.clone(),
            initial_payload: self.initial_payload(),
        }
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// A field holds a value outside its accepted set.
    #[error("invalid configuration value: {0}")]
    InvalidValue(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
