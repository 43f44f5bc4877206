//! State handlers and the table binding them to state names.
//!
//! Every handler receives the execution payload and the execution id, calls
//! the provisioning API, and returns the payload for the next state. Handlers
//! are idempotent: a retried handler re-derives everything from its input and
//! treats "already exists" as success. Work that is still in progress is
//! reported as [`HandlerError::NotReady`], which the retry policies of the
//! waiting states match by name.

mod cleanup;
mod database;
mod initialize;
mod snapshot;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::backend::{ProviderError, RdsApi, TagIndex};
use crate::janitor::JanitorError;
use crate::naming::NamingError;
use crate::payload::{ExecutionPayload, PayloadError};
use crate::workflow::states;

pub use snapshot::latest_snapshot;

/// Error name matched by the retry policy of every waiting state.
pub const NOT_READY: &str = "NotReady";

/// Errors raised by state handlers.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The resource is still transitioning; the state should be retried.
    #[error("{resource} `{id}` is not ready (status `{status}`)")]
    NotReady {
        /// Kind of resource being waited for.
        resource: &'static str,
        /// Resource identifier.
        id: String,
        /// Status reported by the provider.
        status: String,
    },
    /// The resource reached a status it will never recover from.
    #[error("{resource} `{id}` reached unrecoverable status `{status}`")]
    BadStatus {
        /// Kind of resource being waited for.
        resource: &'static str,
        /// Resource identifier.
        id: String,
        /// Status reported by the provider.
        status: String,
    },
    /// The snapshot name template or rendered name is invalid.
    #[error(transparent)]
    Naming(#[from] NamingError),
    /// The payload lacks a field this state needs.
    #[error(transparent)]
    Payload(#[from] PayloadError),
    /// The source database has no snapshot to start from.
    #[error("no snapshots found for database `{db_identifier}`")]
    NoSnapshots {
        /// Source database identifier.
        db_identifier: String,
    },
    /// A provider call failed.
    #[error("{operation} failed: {source}")]
    Provider {
        /// Operation that failed.
        operation: &'static str,
        /// Underlying provider error.
        source: ProviderError,
    },
    /// The temporary database reports no connection endpoint.
    #[error("database `{id}` has no endpoint")]
    MissingEndpoint {
        /// Database identifier.
        id: String,
    },
    /// The cleanup sweep failed.
    #[error(transparent)]
    Cleanup(#[from] JanitorError),
    /// No handler is registered under the requested state name.
    #[error("no handler registered for state `{0}`")]
    UnknownState(String),
}

impl HandlerError {
    /// Name under which the error is reported to the execution substrate.
    #[must_use]
    pub const fn error_name(&self) -> &'static str {
        match self {
            Self::NotReady { .. } => NOT_READY,
            Self::BadStatus { .. } => "BadStatus",
            Self::Naming(_) => "ValidationError",
            Self::Payload(_) => "PayloadError",
            Self::NoSnapshots { .. } => "NoSnapshotsFound",
            Self::Provider { .. } | Self::MissingEndpoint { .. } => "ProviderError",
            Self::Cleanup(_) => "CleanupError",
            Self::UnknownState(_) => "UnknownState",
        }
    }

    /// Returns `true` when the error only signals pending work.
    #[must_use]
    pub const fn is_not_ready(&self) -> bool {
        matches!(self, Self::NotReady { .. })
    }
}

pub(crate) fn provider_error(operation: &'static str) -> impl FnOnce(ProviderError) -> HandlerError {
    move |source| HandlerError::Provider { operation, source }
}

/// Treats "already exists" as success so create calls stay idempotent.
pub(crate) fn tolerate_existing(
    result: Result<(), ProviderError>,
    operation: &'static str,
) -> Result<(), HandlerError> {
    match result {
        Err(err) if err.is_already_exists() => {
            debug!(operation, "resource already exists");
            Ok(())
        }
        other => other.map_err(provider_error(operation)),
    }
}

/// Provider handles injected into every handler.
#[derive(Clone)]
pub struct Clients {
    /// Relational provisioning API.
    pub rds: Arc<dyn RdsApi>,
    /// Tag index used by cleanup.
    pub tag_index: Arc<dyn TagIndex>,
    /// Source of the current time for snapshot-name rendering.
    pub clock: fn() -> DateTime<Utc>,
}

impl Clients {
    /// Bundles the provider handles with the system clock.
    #[must_use]
    pub fn new(rds: Arc<dyn RdsApi>, tag_index: Arc<dyn TagIndex>) -> Self {
        Self {
            rds,
            tag_index,
            clock: Utc::now,
        }
    }

    /// Replaces the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }
}

/// Handler implementations. Several states share one handler.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Handler {
    /// Describes the source and derives identifiers.
    Initialize,
    /// Takes a fresh source snapshot.
    TakeSnapshot,
    /// Selects the newest existing source snapshot.
    FindLatestSnapshot,
    /// Polls the snapshot named by `snapshot_id`.
    WaitForSnapshot,
    /// Copies the snapshot under the configured KMS key.
    Encrypt,
    /// Restores the temporary database.
    CreateTempDatabase,
    /// Polls the temporary database.
    WaitForDatabase,
    /// Rotates the temporary database's master password.
    SetTempPassword,
    /// Snapshots the sanitized database.
    TakeFinalSnapshot,
    /// Shares the sanitized snapshot.
    ShareSnapshot,
    /// Deletes every resource tagged with the execution id.
    Cleanup,
}

/// State name to handler table, duplicates included.
pub const STATE_HANDLERS: &[(&str, Handler)] = &[
    (states::INITIALIZE, Handler::Initialize),
    (states::TAKE_SNAPSHOT, Handler::TakeSnapshot),
    (states::FIND_LATEST_SNAPSHOT, Handler::FindLatestSnapshot),
    (states::WAIT_FOR_SNAPSHOT, Handler::WaitForSnapshot),
    (states::ENCRYPT, Handler::Encrypt),
    (states::WAIT_FOR_ENCRYPT, Handler::WaitForSnapshot),
    (states::CREATE_TEMP_DATABASE, Handler::CreateTempDatabase),
    (states::WAIT_FOR_TEMP_DATABASE, Handler::WaitForDatabase),
    (states::SET_TEMP_PASSWORD, Handler::SetTempPassword),
    (states::WAIT_FOR_PASSWORD, Handler::WaitForDatabase),
    (states::TAKE_FINAL_SNAPSHOT, Handler::TakeFinalSnapshot),
    (states::WAIT_FOR_FINAL_SNAPSHOT, Handler::WaitForSnapshot),
    (states::SHARE_SNAPSHOT, Handler::ShareSnapshot),
    (states::CLEANUP, Handler::Cleanup),
    (states::ERROR_CLEANUP, Handler::Cleanup),
];

/// Looks up the handler registered for `state_name`.
#[must_use]
pub fn handler_for(state_name: &str) -> Option<Handler> {
    STATE_HANDLERS
        .iter()
        .find(|(name, _)| *name == state_name)
        .map(|(_, handler)| *handler)
}

impl Handler {
    /// Runs the handler against `payload` on behalf of execution `uid`.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError`]; [`HandlerError::NotReady`] is the only
    /// variant worth retrying.
    pub async fn run(
        self,
        clients: &Clients,
        payload: ExecutionPayload,
        uid: &str,
    ) -> Result<ExecutionPayload, HandlerError> {
        match self {
            Self::Initialize => initialize::initialize(clients, payload).await,
            Self::TakeSnapshot => snapshot::take_snapshot(clients, payload, uid).await,
            Self::FindLatestSnapshot => snapshot::find_latest_snapshot(clients, payload).await,
            Self::WaitForSnapshot => snapshot::wait_for_snapshot(clients, payload).await,
            Self::Encrypt => snapshot::encrypt(clients, payload, uid).await,
            Self::CreateTempDatabase => database::create_temp_database(clients, payload, uid).await,
            Self::WaitForDatabase => database::wait_for_database(clients, payload).await,
            Self::SetTempPassword => database::set_temp_password(clients, payload).await,
            Self::TakeFinalSnapshot => snapshot::take_final_snapshot(clients, payload).await,
            Self::ShareSnapshot => snapshot::share_snapshot(clients, payload).await,
            Self::Cleanup => cleanup::cleanup(clients, payload, uid).await,
        }
    }
}

/// Event shape delivered by the execution substrate to the handler function.
#[derive(Clone, Debug, Deserialize)]
pub struct HandlerEvent {
    /// Name of the state being executed.
    pub state_name: String,
    /// Current payload.
    #[serde(default)]
    pub state: Value,
    /// Execution id.
    pub uid: String,
}

/// Dispatches state invocations to their handlers.
#[derive(Clone)]
pub struct Registry {
    clients: Clients,
}

impl Registry {
    /// Creates a registry over the injected clients.
    #[must_use]
    pub const fn new(clients: Clients) -> Self {
        Self { clients }
    }

    /// Runs the handler of `state_name` against a JSON payload.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError::UnknownState`] for unregistered names,
    /// [`HandlerError::Payload`] for malformed payloads, and any error the
    /// handler raises.
    pub async fn invoke(
        &self,
        state_name: &str,
        payload: Value,
        uid: &str,
    ) -> Result<Value, HandlerError> {
        let handler =
            handler_for(state_name).ok_or_else(|| HandlerError::UnknownState(state_name.to_owned()))?;
        let parsed = ExecutionPayload::from_value(payload)?;
        info!(state = state_name, uid, "running state handler");
        let result = handler.run(&self.clients, parsed, uid).await?;
        Ok(result.to_value()?)
    }

    /// Runs the handler described by a substrate event.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`Registry::invoke`].
    pub async fn handle_event(&self, event: HandlerEvent) -> Result<Value, HandlerError> {
        let HandlerEvent {
            state_name,
            state,
            uid,
        } = event;
        let payload = if state.is_null() {
            Value::Object(serde_json::Map::new())
        } else {
            state
        };
        self.invoke(&state_name, payload, &uid).await
    }
}
