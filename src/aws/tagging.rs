//! Resource groups tagging adapter.

use aws_sdk_resourcegroupstagging::Client;
use aws_sdk_resourcegroupstagging::types::TagFilter;
use tracing::debug;

use super::AwsContext;
use super::error::from_sdk;
use crate::backend::{BackendFuture, ProviderError, ResourceType, Tag, TagIndex};

/// [`TagIndex`] backed by the resource groups tagging API.
#[derive(Clone, Debug)]
pub struct AwsTagIndex {
    client: Client,
}

impl AwsTagIndex {
    /// Wraps an existing client.
    #[must_use]
    pub const fn new(client: Client) -> Self {
        Self { client }
    }

    /// Creates the adapter from a shared context.
    #[must_use]
    pub fn from_context(ctx: &AwsContext) -> Self {
        Self::new(ctx.tagging_client())
    }

    async fn find_tagged_impl(
        &self,
        resource_type: ResourceType,
        tag: &Tag,
    ) -> Result<Vec<String>, ProviderError> {
        let filter = TagFilter::builder()
            .key(&tag.key)
            .values(&tag.value)
            .build();
        let mut arns = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let output = self
                .client
                .get_resources()
                .resource_type_filters(resource_type.filter())
                .tag_filters(filter.clone())
                .set_pagination_token(token.take())
                .send()
                .await
                .map_err(|err| from_sdk(&err))?;
            arns.extend(
                output
                    .resource_tag_mapping_list()
                    .iter()
                    .filter_map(|mapping| mapping.resource_arn())
                    .map(str::to_owned),
            );
            match output.pagination_token() {
                Some(next) if !next.is_empty() => token = Some(next.to_owned()),
                _ => break,
            }
        }
        debug!(%resource_type, key = %tag.key, count = arns.len(), "tag index lookup");
        Ok(arns)
    }
}

impl TagIndex for AwsTagIndex {
    fn find_tagged<'a>(
        &'a self,
        resource_type: ResourceType,
        tag: &'a Tag,
    ) -> BackendFuture<'a, Vec<String>> {
        Box::pin(self.find_tagged_impl(resource_type, tag))
    }
}
