//! Entry handler: inspects the source database and derives every identifier
//! the rest of the execution needs.

use tracing::info;

use super::{Clients, HandlerError, provider_error};
use crate::naming::{ephemeral_identifier, snapshot_name};
use crate::payload::ExecutionPayload;

pub(super) async fn initialize(
    clients: &Clients,
    mut payload: ExecutionPayload,
) -> Result<ExecutionPayload, HandlerError> {
    let source = payload.source_identifier()?.to_owned();
    let target = snapshot_name(&payload.snapshot_format, &source, clients.now())?;
    let instance = clients
        .rds
        .describe_instance(&source)
        .await
        .map_err(provider_error("describe source database"))?;

    payload.engine = Some(instance.engine);
    payload.temp_snapshot_id = Some(ephemeral_identifier(&source));
    payload.encrypted_snapshot_id = Some(ephemeral_identifier(&source));
    payload.temp_db_id = Some(ephemeral_identifier(&source));
    payload.target_snapshot_id = Some(target);
    payload
        .shared_accounts
        .retain(|account| !account.trim().is_empty());
    for account in &mut payload.shared_accounts {
        *account = account.trim().to_owned();
    }

    info!(
        source = %source,
        engine = payload.engine.as_deref().unwrap_or_default(),
        target = payload.target_snapshot_id.as_deref().unwrap_or_default(),
        "initialized execution"
    );
    Ok(payload)
}
