//! Temporary database handlers.

use tracing::info;

use super::{Clients, HandlerError, provider_error, tolerate_existing};
use crate::backend::{ModifyInstanceRequest, RestoreRequest};
use crate::naming::temporary_password;
use crate::payload::{ConnectionDetails, ExecutionPayload};
use crate::readiness::Readiness;
use crate::sanitizer::SanitizerEngine;
use crate::tags::ephemeral_tags;

pub(super) async fn create_temp_database(
    clients: &Clients,
    payload: ExecutionPayload,
    uid: &str,
) -> Result<ExecutionPayload, HandlerError> {
    let request = RestoreRequest {
        instance_id: payload.temp_db()?.to_owned(),
        snapshot_id: payload.current_snapshot()?.to_owned(),
        security_group_id: payload.security_group_id.clone(),
        subnet_group_name: payload.subnet_group_id.clone(),
        tags: ephemeral_tags(uid),
    };
    tolerate_existing(
        clients.rds.restore_instance(&request).await,
        "restore temporary database",
    )?;
    info!(
        database = %request.instance_id,
        snapshot = %request.snapshot_id,
        "requested temporary database"
    );
    Ok(payload)
}

pub(super) async fn wait_for_database(
    clients: &Clients,
    payload: ExecutionPayload,
) -> Result<ExecutionPayload, HandlerError> {
    let id = payload.temp_db()?;
    let instance = clients
        .rds
        .describe_instance(id)
        .await
        .map_err(provider_error("describe temporary database"))?;
    match Readiness::of_instance(&instance.status, instance.pending_modifications) {
        Readiness::Ready => {
            info!(database = %id, "temporary database available");
            Ok(payload)
        }
        Readiness::Pending => Err(HandlerError::NotReady {
            resource: "database",
            id: id.to_owned(),
            status: instance.status,
        }),
        Readiness::Failed { status } => Err(HandlerError::BadStatus {
            resource: "database",
            id: id.to_owned(),
            status,
        }),
    }
}

pub(super) async fn set_temp_password(
    clients: &Clients,
    mut payload: ExecutionPayload,
) -> Result<ExecutionPayload, HandlerError> {
    let id = payload.temp_db()?.to_owned();
    let instance = clients
        .rds
        .describe_instance(&id)
        .await
        .map_err(provider_error("describe temporary database"))?;
    let endpoint = instance
        .endpoint
        .ok_or_else(|| HandlerError::MissingEndpoint { id: id.clone() })?;

    let engine = payload.engine.as_deref().unwrap_or(&instance.engine);
    let database = instance
        .db_name
        .filter(|name| !name.trim().is_empty())
        .or_else(|| {
            SanitizerEngine::from_engine_name(engine)
                .map(|known| known.default_database().to_owned())
        })
        .unwrap_or_default();

    let password = temporary_password();
    let request = ModifyInstanceRequest {
        instance_id: id.clone(),
        master_password: password.clone(),
        backup_retention_days: 0,
        apply_immediately: true,
    };
    clients
        .rds
        .modify_instance(&request)
        .await
        .map_err(provider_error("modify temporary database"))?;
    info!(database = %id, "rotated temporary master password");

    payload.db = Some(ConnectionDetails {
        host: endpoint.address,
        port: endpoint.port.to_string(),
        user: instance.master_username,
        password,
        database,
    });
    Ok(payload)
}
