//! The JSON payload carried through every workflow state.
//!
//! Fields accumulate as the execution progresses: later states read what
//! earlier ones recorded. Every field is defaulted on deserialisation so a
//! partial payload (for example the `{Error, Cause}` document the substrate
//! forwards along a catch edge) still parses. Keys this crate does not know
//! about are preserved verbatim.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Choice value selecting a fresh snapshot of the source database.
pub const TAKE_NEW_SNAPSHOT: &str = "Take new snapshot";

/// Choice value selecting the most recent existing snapshot.
pub const USE_LATEST_SNAPSHOT: &str = "Use latest existing snapshot";

/// Connection parameters of the temporary database.
#[derive(Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct ConnectionDetails {
    /// Endpoint host name.
    pub host: String,
    /// Endpoint port, kept as a string because it is injected verbatim into
    /// the sanitizer environment.
    pub port: String,
    /// Master user name.
    pub user: String,
    /// Temporary master password.
    pub password: String,
    /// Database to connect to.
    pub database: String,
}

impl fmt::Debug for ConnectionDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDetails")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .finish()
    }
}

/// Execution payload shared by all handlers.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct ExecutionPayload {
    /// Identifier of the production database instance.
    #[serde(default)]
    pub db_identifier: String,
    /// VPC hosting the temporary database.
    #[serde(default)]
    pub vpc_id: String,
    /// DB subnet group for the temporary database.
    #[serde(default)]
    pub subnet_group_id: String,
    /// Security group attached to the temporary database.
    #[serde(default)]
    pub security_group_id: String,
    /// Either [`TAKE_NEW_SNAPSHOT`] or [`USE_LATEST_SNAPSHOT`].
    #[serde(default)]
    pub new_snapshot: String,
    /// Accounts granted restore access to the final snapshot.
    #[serde(default)]
    pub shared_accounts: Vec<String>,
    /// Template used to name the final snapshot.
    #[serde(default)]
    pub snapshot_format: String,
    /// KMS key used to re-encrypt the source snapshot; empty disables
    /// re-encryption.
    #[serde(default)]
    pub kms: String,
    /// Engine of the source database, recorded by `Initialize`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine: Option<String>,
    /// Identifier used when a fresh source snapshot is taken.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_snapshot_id: Option<String>,
    /// Identifier of the re-encrypted snapshot copy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_snapshot_id: Option<String>,
    /// Identifier of the temporary database.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_db_id: Option<String>,
    /// Rendered name of the sanitized snapshot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_snapshot_id: Option<String>,
    /// Snapshot the next wait, restore, or share step acts upon.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_id: Option<String>,
    /// Connection details of the temporary database.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db: Option<ConnectionDetails>,
    /// Keys written by the execution substrate, kept untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Errors raised while reading or writing the payload.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum PayloadError {
    /// A field required by the current state has not been recorded.
    #[error("payload field `{0}` is missing")]
    Missing(&'static str),
    /// The payload could not be converted from or to JSON.
    #[error("malformed payload: {0}")]
    Malformed(String),
}

impl ExecutionPayload {
    /// Parses a payload from its JSON representation.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError::Malformed`] when the value is not an object or
    /// a known field has the wrong type.
    pub fn from_value(value: Value) -> Result<Self, PayloadError> {
        serde_json::from_value(value).map_err(|err| PayloadError::Malformed(err.to_string()))
    }

    /// Serialises the payload back into JSON.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError::Malformed`] when serialisation fails.
    pub fn to_value(&self) -> Result<Value, PayloadError> {
        serde_json::to_value(self).map_err(|err| PayloadError::Malformed(err.to_string()))
    }

    /// Returns the source database identifier.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError::Missing`] when the identifier is blank.
    pub fn source_identifier(&self) -> Result<&str, PayloadError> {
        non_blank(Some(&self.db_identifier), "db_identifier")
    }

    /// Returns the identifier of the temporary database.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError::Missing`] when `Initialize` has not run.
    pub fn temp_db(&self) -> Result<&str, PayloadError> {
        non_blank(self.temp_db_id.as_ref(), "temp_db_id")
    }

    /// Returns the snapshot the current step acts upon.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError::Missing`] when no snapshot was chosen yet.
    pub fn current_snapshot(&self) -> Result<&str, PayloadError> {
        non_blank(self.snapshot_id.as_ref(), "snapshot_id")
    }

    /// Returns the identifier reserved for a fresh source snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError::Missing`] when `Initialize` has not run.
    pub fn temp_snapshot(&self) -> Result<&str, PayloadError> {
        non_blank(self.temp_snapshot_id.as_ref(), "temp_snapshot_id")
    }

    /// Returns the identifier reserved for the re-encrypted copy.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError::Missing`] when `Initialize` has not run.
    pub fn encrypted_snapshot(&self) -> Result<&str, PayloadError> {
        non_blank(self.encrypted_snapshot_id.as_ref(), "encrypted_snapshot_id")
    }

    /// Returns the rendered name of the final snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError::Missing`] when `Initialize` has not run.
    pub fn target_snapshot(&self) -> Result<&str, PayloadError> {
        non_blank(self.target_snapshot_id.as_ref(), "target_snapshot_id")
    }
}

fn non_blank<'a>(value: Option<&'a String>, field: &'static str) -> Result<&'a str, PayloadError> {
    value
        .map(|text| text.trim())
        .filter(|text| !text.is_empty())
        .ok_or(PayloadError::Missing(field))
}
