//! Snapshot handlers: source snapshot selection, re-encryption, the final
//! snapshot, and sharing.

use tracing::info;

use super::{Clients, HandlerError, provider_error, tolerate_existing};
use crate::backend::{CopySnapshotRequest, DbSnapshot};
use crate::payload::ExecutionPayload;
use crate::readiness::Readiness;
use crate::tags::{ephemeral_tags, product_tags};

/// Returns the snapshot with the latest creation time.
///
/// Snapshots without a creation time are still being created and are
/// ignored. Ties resolve to the later entry in `snapshots`.
#[must_use]
pub fn latest_snapshot(snapshots: &[DbSnapshot]) -> Option<&DbSnapshot> {
    snapshots
        .iter()
        .filter(|snapshot| snapshot.created_at.is_some())
        .max_by_key(|snapshot| snapshot.created_at)
}

pub(super) async fn take_snapshot(
    clients: &Clients,
    mut payload: ExecutionPayload,
    uid: &str,
) -> Result<ExecutionPayload, HandlerError> {
    let source = payload.source_identifier()?.to_owned();
    let snapshot_id = payload.temp_snapshot()?.to_owned();
    let tags = ephemeral_tags(uid);
    tolerate_existing(
        clients
            .rds
            .create_snapshot(&source, &snapshot_id, &tags)
            .await,
        "create source snapshot",
    )?;
    info!(source = %source, snapshot = %snapshot_id, "requested source snapshot");
    payload.snapshot_id = Some(snapshot_id);
    Ok(payload)
}

pub(super) async fn find_latest_snapshot(
    clients: &Clients,
    mut payload: ExecutionPayload,
) -> Result<ExecutionPayload, HandlerError> {
    let source = payload.source_identifier()?.to_owned();
    let snapshots = clients
        .rds
        .list_snapshots(&source)
        .await
        .map_err(provider_error("list snapshots"))?;
    let latest = latest_snapshot(&snapshots).ok_or_else(|| HandlerError::NoSnapshots {
        db_identifier: source.clone(),
    })?;
    info!(source = %source, snapshot = %latest.id, "selected latest snapshot");
    payload.snapshot_id = Some(latest.id.clone());
    Ok(payload)
}

pub(super) async fn wait_for_snapshot(
    clients: &Clients,
    payload: ExecutionPayload,
) -> Result<ExecutionPayload, HandlerError> {
    let snapshot_id = payload.current_snapshot()?;
    let snapshot = clients
        .rds
        .describe_snapshot(snapshot_id)
        .await
        .map_err(provider_error("describe snapshot"))?;
    match Readiness::of_snapshot(&snapshot.status) {
        Readiness::Ready => {
            info!(snapshot = %snapshot_id, "snapshot available");
            Ok(payload)
        }
        Readiness::Pending => Err(HandlerError::NotReady {
            resource: "snapshot",
            id: snapshot_id.to_owned(),
            status: snapshot.status,
        }),
        Readiness::Failed { status } => Err(HandlerError::BadStatus {
            resource: "snapshot",
            id: snapshot_id.to_owned(),
            status,
        }),
    }
}

pub(super) async fn encrypt(
    clients: &Clients,
    mut payload: ExecutionPayload,
    uid: &str,
) -> Result<ExecutionPayload, HandlerError> {
    let request = CopySnapshotRequest {
        source_snapshot_id: payload.current_snapshot()?.to_owned(),
        target_snapshot_id: payload.encrypted_snapshot()?.to_owned(),
        kms_key_id: payload.kms.trim().to_owned(),
        tags: ephemeral_tags(uid),
    };
    tolerate_existing(
        clients.rds.copy_snapshot(&request).await,
        "copy snapshot under kms key",
    )?;
    info!(
        source = %request.source_snapshot_id,
        copy = %request.target_snapshot_id,
        "requested re-encrypted snapshot copy"
    );
    payload.snapshot_id = Some(request.target_snapshot_id);
    Ok(payload)
}

pub(super) async fn take_final_snapshot(
    clients: &Clients,
    mut payload: ExecutionPayload,
) -> Result<ExecutionPayload, HandlerError> {
    let temp_db = payload.temp_db()?.to_owned();
    let target = payload.target_snapshot()?.to_owned();
    tolerate_existing(
        clients
            .rds
            .create_snapshot(&temp_db, &target, &product_tags())
            .await,
        "create sanitized snapshot",
    )?;
    info!(database = %temp_db, snapshot = %target, "requested sanitized snapshot");
    payload.snapshot_id = Some(target);
    Ok(payload)
}

pub(super) async fn share_snapshot(
    clients: &Clients,
    payload: ExecutionPayload,
) -> Result<ExecutionPayload, HandlerError> {
    let accounts: Vec<String> = payload
        .shared_accounts
        .iter()
        .map(|account| account.trim())
        .filter(|account| !account.is_empty())
        .map(str::to_owned)
        .collect();
    if accounts.is_empty() {
        return Ok(payload);
    }
    let snapshot_id = payload.current_snapshot()?;
    clients
        .rds
        .share_snapshot(snapshot_id, &accounts)
        .await
        .map_err(provider_error("share snapshot"))?;
    info!(snapshot = %snapshot_id, accounts = accounts.len(), "shared sanitized snapshot");
    Ok(payload)
}
