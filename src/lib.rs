//! Core library for provisioning sanitized copies of RDS snapshots.
//!
//! The crate describes the provisioning workflow as a declarative
//! [`workflow::Topology`], implements one handler per task state behind the
//! [`backend::RdsApi`] and [`backend::TagIndex`] seams, and tears down every
//! ephemeral resource by tag through the [`janitor`]. The topology renders
//! to Amazon States Language for a durable substrate, and the in-process
//! [`engine::Engine`] interprets the same contract for local runs and tests.

pub mod aws;
pub mod backend;
pub mod config;
pub mod engine;
pub mod handlers;
pub mod janitor;
pub mod naming;
pub mod payload;
pub mod readiness;
pub mod sanitizer;
pub mod tags;
pub mod test_support;
pub mod workflow;

pub use aws::{AwsContext, AwsRds, AwsTagIndex, EcsJobRunner};
pub use backend::{ProviderError, RdsApi, Tag, TagIndex};
pub use config::{ConfigError, SanitizeConfig};
pub use engine::{Engine, EngineError, ExecutionOutcome, ExecutionStatus};
pub use handlers::{Clients, HandlerError, HandlerEvent, Registry, handler_for};
pub use janitor::{Janitor, JanitorError, SweepSummary};
pub use payload::{ConnectionDetails, ExecutionPayload, PayloadError};
pub use sanitizer::{JobOutcome, JobRequest, JobRunner, SanitizerEngine};
pub use workflow::{StateMachineResources, Topology};
