//! RDS adapter.

use aws_sdk_rds::Client;
use aws_sdk_rds::types::{self as rds, PendingModifiedValues};
use chrono::{DateTime, Utc};
use tracing::debug;

use super::AwsContext;
use super::error::from_sdk;
use crate::backend::{
    BackendFuture, CopySnapshotRequest, DbInstance, DbSnapshot, Endpoint, ModifyInstanceRequest,
    ProviderError, RdsApi, RestoreRequest, Tag,
};

const RESTORE_ATTRIBUTE: &str = "restore";

/// [`RdsApi`] backed by the AWS SDK.
#[derive(Clone, Debug)]
pub struct AwsRds {
    client: Client,
}

impl AwsRds {
    /// Wraps an existing client.
    #[must_use]
    pub const fn new(client: Client) -> Self {
        Self { client }
    }

    /// Creates the adapter from a shared context.
    #[must_use]
    pub fn from_context(ctx: &AwsContext) -> Self {
        Self::new(ctx.rds_client())
    }

    async fn describe_instance_impl(&self, instance_id: &str) -> Result<DbInstance, ProviderError> {
        let output = self
            .client
            .describe_db_instances()
            .db_instance_identifier(instance_id)
            .send()
            .await
            .map_err(|err| from_sdk(&err))?;
        output
            .db_instances()
            .first()
            .map(convert_instance)
            .ok_or_else(|| ProviderError::NotFound {
                message: format!("instance {instance_id} not described"),
            })
    }

    async fn describe_snapshot_impl(&self, snapshot_id: &str) -> Result<DbSnapshot, ProviderError> {
        let output = self
            .client
            .describe_db_snapshots()
            .db_snapshot_identifier(snapshot_id)
            .send()
            .await
            .map_err(|err| from_sdk(&err))?;
        output
            .db_snapshots()
            .first()
            .map(convert_snapshot)
            .ok_or_else(|| ProviderError::NotFound {
                message: format!("snapshot {snapshot_id} not described"),
            })
    }

    async fn list_snapshots_impl(&self, instance_id: &str) -> Result<Vec<DbSnapshot>, ProviderError> {
        let mut snapshots = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let output = self
                .client
                .describe_db_snapshots()
                .db_instance_identifier(instance_id)
                .set_marker(marker.take())
                .send()
                .await
                .map_err(|err| from_sdk(&err))?;
            snapshots.extend(output.db_snapshots().iter().map(convert_snapshot));
            match output.marker() {
                Some(next) if !next.is_empty() => marker = Some(next.to_owned()),
                _ => break,
            }
        }
        debug!(instance_id, count = snapshots.len(), "listed snapshots");
        Ok(snapshots)
    }

    async fn create_snapshot_impl(
        &self,
        instance_id: &str,
        snapshot_id: &str,
        tags: &[Tag],
    ) -> Result<(), ProviderError> {
        self.client
            .create_db_snapshot()
            .db_instance_identifier(instance_id)
            .db_snapshot_identifier(snapshot_id)
            .set_tags(Some(sdk_tags(tags)))
            .send()
            .await
            .map_err(|err| from_sdk(&err))?;
        Ok(())
    }

    async fn copy_snapshot_impl(&self, request: &CopySnapshotRequest) -> Result<(), ProviderError> {
        self.client
            .copy_db_snapshot()
            .source_db_snapshot_identifier(&request.source_snapshot_id)
            .target_db_snapshot_identifier(&request.target_snapshot_id)
            .kms_key_id(&request.kms_key_id)
            .set_tags(Some(sdk_tags(&request.tags)))
            .send()
            .await
            .map_err(|err| from_sdk(&err))?;
        Ok(())
    }

    async fn restore_instance_impl(&self, request: &RestoreRequest) -> Result<(), ProviderError> {
        self.client
            .restore_db_instance_from_db_snapshot()
            .db_instance_identifier(&request.instance_id)
            .db_snapshot_identifier(&request.snapshot_id)
            .vpc_security_group_ids(&request.security_group_id)
            .db_subnet_group_name(&request.subnet_group_name)
            .publicly_accessible(false)
            .auto_minor_version_upgrade(false)
            .set_tags(Some(sdk_tags(&request.tags)))
            .send()
            .await
            .map_err(|err| from_sdk(&err))?;
        Ok(())
    }

    async fn modify_instance_impl(
        &self,
        request: &ModifyInstanceRequest,
    ) -> Result<(), ProviderError> {
        self.client
            .modify_db_instance()
            .db_instance_identifier(&request.instance_id)
            .master_user_password(&request.master_password)
            .backup_retention_period(request.backup_retention_days)
            .apply_immediately(request.apply_immediately)
            .send()
            .await
            .map_err(|err| from_sdk(&err))?;
        Ok(())
    }

    async fn share_snapshot_impl(
        &self,
        snapshot_id: &str,
        accounts: &[String],
    ) -> Result<(), ProviderError> {
        self.client
            .modify_db_snapshot_attribute()
            .db_snapshot_identifier(snapshot_id)
            .attribute_name(RESTORE_ATTRIBUTE)
            .set_values_to_add(Some(accounts.to_vec()))
            .send()
            .await
            .map_err(|err| from_sdk(&err))?;
        Ok(())
    }

    async fn delete_instance_impl(&self, instance_id: &str) -> Result<(), ProviderError> {
        self.client
            .delete_db_instance()
            .db_instance_identifier(instance_id)
            .skip_final_snapshot(true)
            .delete_automated_backups(true)
            .send()
            .await
            .map_err(|err| from_sdk(&err))?;
        Ok(())
    }

    async fn delete_snapshot_impl(&self, snapshot_id: &str) -> Result<(), ProviderError> {
        self.client
            .delete_db_snapshot()
            .db_snapshot_identifier(snapshot_id)
            .send()
            .await
            .map_err(|err| from_sdk(&err))?;
        Ok(())
    }
}

impl RdsApi for AwsRds {
    fn describe_instance<'a>(&'a self, instance_id: &'a str) -> BackendFuture<'a, DbInstance> {
        Box::pin(self.describe_instance_impl(instance_id))
    }

    fn describe_snapshot<'a>(&'a self, snapshot_id: &'a str) -> BackendFuture<'a, DbSnapshot> {
        Box::pin(self.describe_snapshot_impl(snapshot_id))
    }

    fn list_snapshots<'a>(&'a self, instance_id: &'a str) -> BackendFuture<'a, Vec<DbSnapshot>> {
        Box::pin(self.list_snapshots_impl(instance_id))
    }

    fn create_snapshot<'a>(
        &'a self,
        instance_id: &'a str,
        snapshot_id: &'a str,
        tags: &'a [Tag],
    ) -> BackendFuture<'a, ()> {
        Box::pin(self.create_snapshot_impl(instance_id, snapshot_id, tags))
    }

    fn copy_snapshot<'a>(&'a self, request: &'a CopySnapshotRequest) -> BackendFuture<'a, ()> {
        Box::pin(self.copy_snapshot_impl(request))
    }

    fn restore_instance<'a>(&'a self, request: &'a RestoreRequest) -> BackendFuture<'a, ()> {
        Box::pin(self.restore_instance_impl(request))
    }

    fn modify_instance<'a>(
        &'a self,
        request: &'a ModifyInstanceRequest,
    ) -> BackendFuture<'a, ()> {
        Box::pin(self.modify_instance_impl(request))
    }

    fn share_snapshot<'a>(
        &'a self,
        snapshot_id: &'a str,
        accounts: &'a [String],
    ) -> BackendFuture<'a, ()> {
        Box::pin(self.share_snapshot_impl(snapshot_id, accounts))
    }

    fn delete_instance<'a>(&'a self, instance_id: &'a str) -> BackendFuture<'a, ()> {
        Box::pin(self.delete_instance_impl(instance_id))
    }

    fn delete_snapshot<'a>(&'a self, snapshot_id: &'a str) -> BackendFuture<'a, ()> {
        Box::pin(self.delete_snapshot_impl(snapshot_id))
    }
}

fn sdk_tags(tags: &[Tag]) -> Vec<rds::Tag> {
    tags.iter()
        .map(|tag| rds::Tag::builder().key(&tag.key).value(&tag.value).build())
        .collect()
}

fn convert_instance(instance: &rds::DbInstance) -> DbInstance {
    let pending_modifications = instance
        .pending_modified_values()
        .is_some_and(|pending| *pending != PendingModifiedValues::builder().build());
    let endpoint = instance.endpoint().and_then(|endpoint| {
        let address = endpoint.address()?;
        let port = endpoint.port().and_then(|port| u16::try_from(port).ok())?;
        Some(Endpoint {
            address: address.to_owned(),
            port,
        })
    });
    DbInstance {
        id: instance.db_instance_identifier().unwrap_or_default().to_owned(),
        engine: instance.engine().unwrap_or_default().to_owned(),
        status: instance.db_instance_status().unwrap_or_default().to_owned(),
        pending_modifications,
        endpoint,
        master_username: instance.master_username().unwrap_or_default().to_owned(),
        db_name: instance.db_name().map(str::to_owned),
    }
}

fn convert_snapshot(snapshot: &rds::DbSnapshot) -> DbSnapshot {
    let created_at = snapshot.snapshot_create_time().and_then(|time| {
        DateTime::<Utc>::from_timestamp(time.secs(), time.subsec_nanos())
    });
    DbSnapshot {
        id: snapshot.db_snapshot_identifier().unwrap_or_default().to_owned(),
        instance_id: snapshot.db_instance_identifier().unwrap_or_default().to_owned(),
        status: snapshot.status().unwrap_or_default().to_owned(),
        created_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_rds::primitives::DateTime as SdkDateTime;
    use rstest::rstest;

    #[rstest]
    fn instance_conversion_reads_endpoint_and_pending_values() {
        let instance = rds::DbInstance::builder()
            .db_instance_identifier("tmp-1")
            .engine("postgres")
            .db_instance_status("available")
            .master_username("master")
            .endpoint(
                rds::Endpoint::builder()
                    .address("tmp-1.example.rds.amazonaws.com")
                    .port(5432)
                    .build(),
            )
            .pending_modified_values(
                PendingModifiedValues::builder()
                    .master_user_password("****")
                    .build(),
            )
            .build();

        let converted = convert_instance(&instance);

        assert_eq!(converted.id, "tmp-1");
        assert!(converted.pending_modifications);
        assert_eq!(converted.db_name, None);
        assert_eq!(
            converted.endpoint,
            Some(Endpoint {
                address: String::from("tmp-1.example.rds.amazonaws.com"),
                port: 5432,
            })
        );
    }

    #[rstest]
    fn empty_pending_values_are_not_pending() {
        let instance = rds::DbInstance::builder()
            .db_instance_identifier("tmp-1")
            .pending_modified_values(PendingModifiedValues::builder().build())
            .build();

        assert!(!convert_instance(&instance).pending_modifications);
        assert_eq!(convert_instance(&instance).endpoint, None);
    }

    #[rstest]
    fn snapshot_conversion_keeps_creation_time() {
        let snapshot = rds::DbSnapshot::builder()
            .db_snapshot_identifier("snap-1")
            .db_instance_identifier("orders")
            .status("available")
            .snapshot_create_time(SdkDateTime::from_secs(1_710_000_000))
            .build();

        let converted = convert_snapshot(&snapshot);

        assert_eq!(converted.instance_id, "orders");
        assert_eq!(
            converted.created_at.map(|time| time.timestamp()),
            Some(1_710_000_000)
        );
    }
}
