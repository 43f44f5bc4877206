//! Shared handler of the `Cleanup` and `ErrorCleanup` states.

use tracing::info;

use super::{Clients, HandlerError};
use crate::janitor::Janitor;
use crate::payload::ExecutionPayload;

pub(super) async fn cleanup(
    clients: &Clients,
    payload: ExecutionPayload,
    uid: &str,
) -> Result<ExecutionPayload, HandlerError> {
    let janitor = Janitor::new(clients.rds.clone(), clients.tag_index.clone());
    let summary = janitor.sweep(uid).await?;
    info!(uid, removed = summary.total(), "cleanup finished");
    Ok(payload)
}
