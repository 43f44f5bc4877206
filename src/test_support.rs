//! Test support utilities shared across unit and integration tests.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::env;
use std::ffi::OsString;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};

use crate::backend::{
    BackendFuture, CopySnapshotRequest, DbInstance, DbSnapshot, Endpoint, ModifyInstanceRequest,
    ProviderError, RdsApi, ResourceType, RestoreRequest, Tag, TagIndex,
};
use crate::engine::{Sleeper, SleepFuture};
use crate::sanitizer::{JobOutcome, JobRequest, JobRunner};

/// Region used when building fake ARNs.
pub const FAKE_REGION: &str = "eu-west-1";

/// Account used when building fake ARNs.
pub const FAKE_ACCOUNT: &str = "123456789012";

/// Master user reported for fake instances.
pub const FAKE_MASTER_USER: &str = "master";

/// Fixed clock used by handler tests.
#[must_use]
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 9, 12, 30, 0)
        .single()
        .unwrap_or_default()
}

/// Builds the ARN the fake tag index reports for a resource.
#[must_use]
pub fn fake_arn(resource_type: ResourceType, id: &str) -> String {
    let kind = match resource_type {
        ResourceType::Database => "db",
        ResourceType::Snapshot => "snapshot",
    };
    format!("arn:aws:rds:{FAKE_REGION}:{FAKE_ACCOUNT}:{kind}:{id}")
}

#[derive(Clone, Debug)]
struct FakeInstance {
    instance: DbInstance,
    tags: Vec<Tag>,
    script: VecDeque<String>,
}

#[derive(Clone, Debug)]
struct FakeSnapshot {
    snapshot: DbSnapshot,
    engine: String,
    db_name: Option<String>,
    tags: Vec<Tag>,
    script: VecDeque<String>,
    shared_with: BTreeSet<String>,
}

#[derive(Debug)]
struct FakeState {
    instances: BTreeMap<String, FakeInstance>,
    snapshots: BTreeMap<String, FakeSnapshot>,
    instance_script: Vec<String>,
    snapshot_script: Vec<String>,
    failures: HashMap<String, VecDeque<ProviderError>>,
    job_outcomes: VecDeque<JobOutcome>,
    jobs: Vec<JobRequest>,
    modifications: Vec<ModifyInstanceRequest>,
    calls: Vec<String>,
    ticks: i64,
}

impl Default for FakeState {
    fn default() -> Self {
        Self {
            instances: BTreeMap::new(),
            snapshots: BTreeMap::new(),
            instance_script: vec![String::from("available")],
            snapshot_script: vec![String::from("available")],
            failures: HashMap::new(),
            job_outcomes: VecDeque::new(),
            jobs: Vec::new(),
            modifications: Vec::new(),
            calls: Vec::new(),
            ticks: 0,
        }
    }
}

impl FakeState {
    fn record(&mut self, operation: &str, subject: &str) -> Result<(), ProviderError> {
        self.calls.push(format!("{operation} {subject}"));
        match self.failures.get_mut(operation).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn next_timestamp(&mut self) -> DateTime<Utc> {
        self.ticks += 1;
        fixed_now() + chrono::Duration::minutes(self.ticks)
    }

    fn new_snapshot(
        &mut self,
        id: &str,
        instance_id: &str,
        engine: String,
        db_name: Option<String>,
        tags: &[Tag],
    ) {
        let created_at = Some(self.next_timestamp());
        let script = self.snapshot_script.iter().cloned().collect();
        self.snapshots.insert(
            id.to_owned(),
            FakeSnapshot {
                snapshot: DbSnapshot {
                    id: id.to_owned(),
                    instance_id: instance_id.to_owned(),
                    status: String::from("creating"),
                    created_at,
                },
                engine,
                db_name,
                tags: tags.to_vec(),
                script,
                shared_with: BTreeSet::new(),
            },
        );
    }
}

fn not_found(kind: &str, id: &str) -> ProviderError {
    ProviderError::NotFound {
        message: format!("{kind} {id} not found"),
    }
}

fn already_exists(kind: &str, id: &str) -> ProviderError {
    ProviderError::AlreadyExists {
        message: format!("{kind} {id} already exists"),
    }
}

/// In-memory provider implementing every capability seam.
///
/// Statuses of newly created resources follow a script: each describe call
/// consumes the next scripted status, and the last status sticks. Failures
/// can be queued per operation with [`FakeProvider::fail_next`].
#[derive(Clone, Debug, Default)]
pub struct FakeProvider {
    state: Arc<Mutex<FakeState>>,
}

impl FakeProvider {
    /// Creates an empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds an available source instance.
    #[must_use]
    pub fn with_instance(self, id: &str, engine: &str) -> Self {
        self.insert_instance(
            DbInstance {
                id: id.to_owned(),
                engine: engine.to_owned(),
                status: String::from("available"),
                pending_modifications: false,
                endpoint: Some(Endpoint {
                    address: format!("{id}.fake.rds"),
                    port: 5432,
                }),
                master_username: String::from(FAKE_MASTER_USER),
                db_name: Some(String::from("app")),
            },
            &[],
        );
        self
    }

    /// Adds an available snapshot of `instance_id` created at `created_at`.
    #[must_use]
    pub fn with_snapshot(self, instance_id: &str, id: &str, created_at: DateTime<Utc>) -> Self {
        self.insert_snapshot(
            DbSnapshot {
                id: id.to_owned(),
                instance_id: instance_id.to_owned(),
                status: String::from("available"),
                created_at: Some(created_at),
            },
            &[],
        );
        self
    }

    /// Inserts an instance with the given tags.
    pub fn insert_instance(&self, instance: DbInstance, tags: &[Tag]) {
        self.lock().instances.insert(
            instance.id.clone(),
            FakeInstance {
                instance,
                tags: tags.to_vec(),
                script: VecDeque::new(),
            },
        );
    }

    /// Inserts a snapshot with the given tags.
    pub fn insert_snapshot(&self, snapshot: DbSnapshot, tags: &[Tag]) {
        let mut state = self.lock();
        let (engine, db_name) = state
            .instances
            .get(&snapshot.instance_id)
            .map(|source| (source.instance.engine.clone(), source.instance.db_name.clone()))
            .unwrap_or_else(|| (String::from("postgres"), None));
        state.snapshots.insert(
            snapshot.id.clone(),
            FakeSnapshot {
                snapshot,
                engine,
                db_name,
                tags: tags.to_vec(),
                script: VecDeque::new(),
                shared_with: BTreeSet::new(),
            },
        );
    }

    /// Sets the statuses reported by snapshots created from now on.
    pub fn script_snapshots(&self, statuses: &[&str]) {
        self.lock().snapshot_script = statuses.iter().map(|s| (*s).to_owned()).collect();
    }

    /// Sets the statuses reported by instances restored or modified from now
    /// on.
    pub fn script_instances(&self, statuses: &[&str]) {
        self.lock().instance_script = statuses.iter().map(|s| (*s).to_owned()).collect();
    }

    /// Makes the next call of `operation` fail with `error`.
    pub fn fail_next(&self, operation: &str, error: ProviderError) {
        self.lock()
            .failures
            .entry(operation.to_owned())
            .or_default()
            .push_back(error);
    }

    /// Queues the outcome of the next sanitization job.
    pub fn push_job_outcome(&self, outcome: JobOutcome) {
        self.lock().job_outcomes.push_back(outcome);
    }

    /// Returns every call made so far as `"<operation> <subject>"`.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Returns the calls of a single operation.
    #[must_use]
    pub fn calls_to(&self, operation: &str) -> Vec<String> {
        let prefix = format!("{operation} ");
        self.calls()
            .into_iter()
            .filter_map(|call| call.strip_prefix(&prefix).map(str::to_owned))
            .collect()
    }

    /// Returns the identifiers of every existing instance.
    #[must_use]
    pub fn instance_ids(&self) -> Vec<String> {
        self.lock().instances.keys().cloned().collect()
    }

    /// Returns the identifiers of every existing snapshot.
    #[must_use]
    pub fn snapshot_ids(&self) -> Vec<String> {
        self.lock().snapshots.keys().cloned().collect()
    }

    /// Returns the tags of a snapshot, when it exists.
    #[must_use]
    pub fn snapshot_tags(&self, id: &str) -> Option<Vec<Tag>> {
        self.lock().snapshots.get(id).map(|snap| snap.tags.clone())
    }

    /// Returns the tags of an instance, when it exists.
    #[must_use]
    pub fn instance_tags(&self, id: &str) -> Option<Vec<Tag>> {
        self.lock().instances.get(id).map(|inst| inst.tags.clone())
    }

    /// Returns the accounts a snapshot is shared with.
    #[must_use]
    pub fn shared_with(&self, id: &str) -> Vec<String> {
        self.lock()
            .snapshots
            .get(id)
            .map(|snap| snap.shared_with.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns the sanitization jobs run so far.
    #[must_use]
    pub fn job_requests(&self) -> Vec<JobRequest> {
        self.lock().jobs.clone()
    }

    /// Returns the instance modifications requested so far.
    #[must_use]
    pub fn modifications(&self) -> Vec<ModifyInstanceRequest> {
        self.lock().modifications.clone()
    }

    /// Wraps the provider in the shared handles the workflow expects.
    #[must_use]
    pub fn shared(&self) -> (Arc<dyn RdsApi>, Arc<dyn TagIndex>, Arc<dyn JobRunner>) {
        (
            Arc::new(self.clone()),
            Arc::new(self.clone()),
            Arc::new(self.clone()),
        )
    }
}

impl RdsApi for FakeProvider {
    fn describe_instance<'a>(&'a self, instance_id: &'a str) -> BackendFuture<'a, DbInstance> {
        Box::pin(async move {
            let mut state = self.lock();
            state.record("describe_instance", instance_id)?;
            let entry = state
                .instances
                .get_mut(instance_id)
                .ok_or_else(|| not_found("instance", instance_id))?;
            if let Some(next) = entry.script.pop_front() {
                entry.instance.pending_modifications = false;
                entry.instance.status = next;
            }
            Ok(entry.instance.clone())
        })
    }

    fn describe_snapshot<'a>(&'a self, snapshot_id: &'a str) -> BackendFuture<'a, DbSnapshot> {
        Box::pin(async move {
            let mut state = self.lock();
            state.record("describe_snapshot", snapshot_id)?;
            let entry = state
                .snapshots
                .get_mut(snapshot_id)
                .ok_or_else(|| not_found("snapshot", snapshot_id))?;
            if let Some(next) = entry.script.pop_front() {
                entry.snapshot.status = next;
            }
            Ok(entry.snapshot.clone())
        })
    }

    fn list_snapshots<'a>(&'a self, instance_id: &'a str) -> BackendFuture<'a, Vec<DbSnapshot>> {
        Box::pin(async move {
            let mut state = self.lock();
            state.record("list_snapshots", instance_id)?;
            Ok(state
                .snapshots
                .values()
                .filter(|snap| snap.snapshot.instance_id == instance_id)
                .map(|snap| snap.snapshot.clone())
                .collect())
        })
    }

    fn create_snapshot<'a>(
        &'a self,
        instance_id: &'a str,
        snapshot_id: &'a str,
        tags: &'a [Tag],
    ) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.lock();
            state.record("create_snapshot", snapshot_id)?;
            if state.snapshots.contains_key(snapshot_id) {
                return Err(already_exists("snapshot", snapshot_id));
            }
            let source = state
                .instances
                .get(instance_id)
                .ok_or_else(|| not_found("instance", instance_id))?;
            let engine = source.instance.engine.clone();
            let db_name = source.instance.db_name.clone();
            state.new_snapshot(snapshot_id, instance_id, engine, db_name, tags);
            Ok(())
        })
    }

    fn copy_snapshot<'a>(&'a self, request: &'a CopySnapshotRequest) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.lock();
            state.record("copy_snapshot", &request.target_snapshot_id)?;
            if state.snapshots.contains_key(&request.target_snapshot_id) {
                return Err(already_exists("snapshot", &request.target_snapshot_id));
            }
            let source = state
                .snapshots
                .get(&request.source_snapshot_id)
                .ok_or_else(|| not_found("snapshot", &request.source_snapshot_id))?;
            let instance_id = source.snapshot.instance_id.clone();
            let engine = source.engine.clone();
            let db_name = source.db_name.clone();
            state.new_snapshot(
                &request.target_snapshot_id,
                &instance_id,
                engine,
                db_name,
                &request.tags,
            );
            Ok(())
        })
    }

    fn restore_instance<'a>(&'a self, request: &'a RestoreRequest) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.lock();
            state.record("restore_instance", &request.instance_id)?;
            if state.instances.contains_key(&request.instance_id) {
                return Err(already_exists("instance", &request.instance_id));
            }
            let source = state
                .snapshots
                .get(&request.snapshot_id)
                .ok_or_else(|| not_found("snapshot", &request.snapshot_id))?;
            let instance = DbInstance {
                id: request.instance_id.clone(),
                engine: source.engine.clone(),
                status: String::from("creating"),
                pending_modifications: false,
                endpoint: Some(Endpoint {
                    address: format!("{}.fake.rds", request.instance_id),
                    port: 5432,
                }),
                master_username: String::from(FAKE_MASTER_USER),
                db_name: source.db_name.clone(),
            };
            let script = state.instance_script.iter().cloned().collect();
            state.instances.insert(
                request.instance_id.clone(),
                FakeInstance {
                    instance,
                    tags: request.tags.clone(),
                    script,
                },
            );
            Ok(())
        })
    }

    fn modify_instance<'a>(
        &'a self,
        request: &'a ModifyInstanceRequest,
    ) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.lock();
            state.record("modify_instance", &request.instance_id)?;
            let script: VecDeque<String> = state.instance_script.iter().cloned().collect();
            let entry = state
                .instances
                .get_mut(&request.instance_id)
                .ok_or_else(|| not_found("instance", &request.instance_id))?;
            entry.instance.pending_modifications = true;
            entry.script = script;
            state.modifications.push(request.clone());
            Ok(())
        })
    }

    fn share_snapshot<'a>(
        &'a self,
        snapshot_id: &'a str,
        accounts: &'a [String],
    ) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.lock();
            state.record("share_snapshot", snapshot_id)?;
            let entry = state
                .snapshots
                .get_mut(snapshot_id)
                .ok_or_else(|| not_found("snapshot", snapshot_id))?;
            entry.shared_with.extend(accounts.iter().cloned());
            Ok(())
        })
    }

    fn delete_instance<'a>(&'a self, instance_id: &'a str) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.lock();
            state.record("delete_instance", instance_id)?;
            state
                .instances
                .remove(instance_id)
                .map(|_| ())
                .ok_or_else(|| not_found("instance", instance_id))
        })
    }

    fn delete_snapshot<'a>(&'a self, snapshot_id: &'a str) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.lock();
            state.record("delete_snapshot", snapshot_id)?;
            state
                .snapshots
                .remove(snapshot_id)
                .map(|_| ())
                .ok_or_else(|| not_found("snapshot", snapshot_id))
        })
    }
}

impl TagIndex for FakeProvider {
    fn find_tagged<'a>(
        &'a self,
        resource_type: ResourceType,
        tag: &'a Tag,
    ) -> BackendFuture<'a, Vec<String>> {
        Box::pin(async move {
            let mut state = self.lock();
            state.record("find_tagged", resource_type.filter())?;
            let ids: Vec<&String> = match resource_type {
                ResourceType::Database => state
                    .instances
                    .iter()
                    .filter(|(_, inst)| inst.tags.contains(tag))
                    .map(|(id, _)| id)
                    .collect(),
                ResourceType::Snapshot => state
                    .snapshots
                    .iter()
                    .filter(|(_, snap)| snap.tags.contains(tag))
                    .map(|(id, _)| id)
                    .collect(),
            };
            Ok(ids
                .into_iter()
                .map(|id| fake_arn(resource_type, id))
                .collect())
        })
    }
}

impl JobRunner for FakeProvider {
    fn run_job<'a>(&'a self, request: &'a JobRequest) -> BackendFuture<'a, JobOutcome> {
        Box::pin(async move {
            let mut state = self.lock();
            state.record("run_job", request.definition.engine.engine_name())?;
            state.jobs.push(request.clone());
            let task_number = state.jobs.len();
            Ok(state.job_outcomes.pop_front().unwrap_or_else(|| JobOutcome {
                task_arn: Some(format!(
                    "arn:aws:ecs:{FAKE_REGION}:{FAKE_ACCOUNT}:task/fake/{task_number}"
                )),
                exit_code: Some(0),
                stopped_reason: Some(String::from("Essential container in task exited")),
            }))
        })
    }
}

/// Sleeper that records requested delays without waiting.
#[derive(Clone, Debug, Default)]
pub struct RecordingSleeper {
    delays: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    /// Creates a sleeper with no recorded delays.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every delay requested so far.
    #[must_use]
    pub fn delays(&self) -> Vec<Duration> {
        self.delays
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) -> SleepFuture<'_> {
        self.delays
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(duration);
        Box::pin(async {})
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: AsyncMutex<()> = AsyncMutex::const_new(());

/// Guard that holds the env mutex and restores variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: AsyncMutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets multiple environment variables while holding a global mutex.
    pub async fn set_vars(pairs: &[(&str, &str)]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs.iter().all(|(key, _)| seen.insert(*key))
            },
            "duplicate environment variable keys passed to EnvGuard::set_vars"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::set_var(key, value) };
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
