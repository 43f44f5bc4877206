//! AWS implementations of the provider seams.
//!
//! [`AwsContext`] loads the SDK configuration once; the adapters are built
//! from it and implement [`crate::backend::RdsApi`],
//! [`crate::backend::TagIndex`] and [`crate::sanitizer::JobRunner`].

mod ecs;
mod error;
mod rds;
mod tagging;

use std::fmt;
use std::sync::Arc;

use aws_config::{BehaviorVersion, Region, SdkConfig};

pub use ecs::{DEFAULT_MAX_POLLS, DEFAULT_POLL_INTERVAL, EcsJobRunner};
pub use error::{classify_error, from_sdk, is_throttling};
pub use rds::AwsRds;
pub use tagging::AwsTagIndex;

/// Shared SDK configuration for creating service clients.
#[derive(Clone)]
pub struct AwsContext {
    config: Arc<SdkConfig>,
}

impl AwsContext {
    /// Loads credentials and settings from the environment, configuration
    /// files and instance roles. `region` overrides the resolved region.
    pub async fn new(region: Option<&str>) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(name) = region {
            loader = loader.region(Region::new(name.to_owned()));
        }
        Self {
            config: Arc::new(loader.load().await),
        }
    }

    /// Underlying SDK configuration.
    #[must_use]
    pub fn sdk_config(&self) -> &SdkConfig {
        &self.config
    }

    /// Resolved region, when one was found.
    #[must_use]
    pub fn region(&self) -> Option<&str> {
        self.config.region().map(Region::as_ref)
    }

    /// Creates an RDS client.
    #[must_use]
    pub fn rds_client(&self) -> aws_sdk_rds::Client {
        aws_sdk_rds::Client::new(self.sdk_config())
    }

    /// Creates a resource groups tagging client.
    #[must_use]
    pub fn tagging_client(&self) -> aws_sdk_resourcegroupstagging::Client {
        aws_sdk_resourcegroupstagging::Client::new(self.sdk_config())
    }

    /// Creates an ECS client.
    #[must_use]
    pub fn ecs_client(&self) -> aws_sdk_ecs::Client {
        aws_sdk_ecs::Client::new(self.sdk_config())
    }
}

impl fmt::Debug for AwsContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsContext")
            .field("region", &self.region())
            .finish_non_exhaustive()
    }
}
