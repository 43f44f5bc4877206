//! Shared fixtures and helpers for cleanup BDD scenarios.

use std::sync::Arc;

use rstest::fixture;
use sanitized_snapshots::backend::{DbInstance, DbSnapshot};
use sanitized_snapshots::handlers::{Clients, Registry};
use sanitized_snapshots::tags::{ephemeral_tags, product_tags};
use sanitized_snapshots::test_support::{FAKE_MASTER_USER, FakeProvider, fixed_now};

pub const SOURCE_DB: &str = "orders";
pub const DELIVERED_SNAPSHOT: &str = "orders-sanitized-2024-03-09";

#[derive(Clone, Debug)]
pub enum CleanupOutcome {
    Success,
    Failure(String),
}

#[derive(Clone, Debug)]
pub struct CleanupContext {
    pub provider: FakeProvider,
    pub outcomes: Vec<CleanupOutcome>,
}

#[fixture]
pub fn cleanup_context() -> CleanupContext {
    CleanupContext {
        provider: FakeProvider::new().with_instance(SOURCE_DB, "postgres"),
        outcomes: Vec::new(),
    }
}

impl CleanupContext {
    pub fn registry(&self) -> Registry {
        Registry::new(
            Clients::new(
                Arc::new(self.provider.clone()),
                Arc::new(self.provider.clone()),
            )
            .with_clock(fixed_now),
        )
    }
}

pub fn temp_database_id(uid: &str) -> String {
    format!("{SOURCE_DB}-{uid}-db")
}

pub fn temp_snapshot_id(uid: &str) -> String {
    format!("{SOURCE_DB}-{uid}-snap")
}

pub fn insert_temp_database(provider: &FakeProvider, uid: &str) {
    provider.insert_instance(
        DbInstance {
            id: temp_database_id(uid),
            engine: String::from("postgres"),
            status: String::from("available"),
            pending_modifications: false,
            endpoint: None,
            master_username: String::from(FAKE_MASTER_USER),
            db_name: None,
        },
        &ephemeral_tags(uid),
    );
}

pub fn insert_temp_snapshot(provider: &FakeProvider, uid: &str) {
    provider.insert_snapshot(snapshot(&temp_snapshot_id(uid)), &ephemeral_tags(uid));
}

pub fn insert_delivered_snapshot(provider: &FakeProvider) {
    provider.insert_snapshot(snapshot(DELIVERED_SNAPSHOT), &product_tags());
}

fn snapshot(id: &str) -> DbSnapshot {
    DbSnapshot {
        id: id.to_owned(),
        instance_id: String::from(SOURCE_DB),
        status: String::from("available"),
        created_at: Some(fixed_now()),
    }
}
