//! Ownership tags binding ephemeral resources to one execution.
//!
//! | Tag key | Value | Carried by |
//! |---------|-------|------------|
//! | `RDS-sanitized-snapshots` | `yes` | every resource the workflow creates |
//! | `RDS-sanitized-snapshots-temp` | execution id | ephemeral resources only |
//!
//! The final sanitized snapshot only carries the product tag, so cleanup
//! never finds it.

use crate::backend::Tag;

/// Tag key marking any resource created by this system.
pub const PRODUCT_TAG_KEY: &str = "RDS-sanitized-snapshots";

/// Value of the product tag.
pub const PRODUCT_TAG_VALUE: &str = "yes";

/// Tag key whose value is the owning execution id.
pub const OWNERSHIP_TAG_KEY: &str = "RDS-sanitized-snapshots-temp";

/// Returns the ownership tag for an execution.
#[must_use]
pub fn ownership_tag(uid: &str) -> Tag {
    Tag::new(OWNERSHIP_TAG_KEY, uid)
}

/// Tags for deliverables that must survive cleanup.
#[must_use]
pub fn product_tags() -> Vec<Tag> {
    vec![Tag::new(PRODUCT_TAG_KEY, PRODUCT_TAG_VALUE)]
}

/// Tags for ephemeral resources owned by `uid`.
#[must_use]
pub fn ephemeral_tags(uid: &str) -> Vec<Tag> {
    let mut tags = product_tags();
    tags.push(ownership_tag(uid));
    tags
}

/// Extracts the resource identifier (the last `:`-separated component) from
/// an ARN such as `arn:aws:rds:eu-west-1:123456789012:db:orders-tmp`.
#[must_use]
pub fn resource_id_from_arn(arn: &str) -> &str {
    arn.rsplit(':').next().unwrap_or(arn)
}
