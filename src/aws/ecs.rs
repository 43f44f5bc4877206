//! Fargate job runner for the sanitization containers.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use aws_sdk_ecs::Client;
use aws_sdk_ecs::types::{
    AssignPublicIp, AwsVpcConfiguration, ContainerOverride, KeyValuePair, LaunchType,
    NetworkConfiguration, Task, TaskOverride,
};
use tracing::{debug, info, warn};

use super::AwsContext;
use super::error::{from_sdk, is_throttling};
use crate::backend::{BackendFuture, ProviderError};
use crate::sanitizer::{JobOutcome, JobRequest, JobRunner, SanitizerEngine};

const STOPPED: &str = "STOPPED";

/// Default delay between task status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15);

/// Default number of status polls before a job is abandoned: two hours at
/// [`DEFAULT_POLL_INTERVAL`].
pub const DEFAULT_MAX_POLLS: u32 = 480;

/// [`JobRunner`] launching one Fargate task per job and polling it until it
/// stops.
#[derive(Clone, Debug)]
pub struct EcsJobRunner {
    client: Client,
    cluster: String,
    task_definitions: BTreeMap<SanitizerEngine, String>,
    subnets: Vec<String>,
    security_groups: Vec<String>,
    poll_interval: Duration,
    max_polls: u32,
}

impl EcsJobRunner {
    /// Creates a runner for `cluster`, launching tasks into `subnets`.
    #[must_use]
    pub fn new(
        client: Client,
        cluster: impl Into<String>,
        task_definitions: BTreeMap<SanitizerEngine, String>,
        subnets: Vec<String>,
        security_groups: Vec<String>,
    ) -> Self {
        Self {
            client,
            cluster: cluster.into(),
            task_definitions,
            subnets,
            security_groups,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_polls: DEFAULT_MAX_POLLS,
        }
    }

    /// Creates the runner from a shared context.
    #[must_use]
    pub fn from_context(
        ctx: &AwsContext,
        cluster: impl Into<String>,
        task_definitions: BTreeMap<SanitizerEngine, String>,
        subnets: Vec<String>,
        security_groups: Vec<String>,
    ) -> Self {
        Self::new(
            ctx.ecs_client(),
            cluster,
            task_definitions,
            subnets,
            security_groups,
        )
    }

    /// Replaces the delay between status polls.
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Replaces the number of status polls before a job is abandoned.
    #[must_use]
    pub const fn with_max_polls(mut self, max_polls: u32) -> Self {
        self.max_polls = max_polls;
        self
    }

    async fn run_job_impl(&self, request: &JobRequest) -> Result<JobOutcome, ProviderError> {
        let engine = request.definition.engine;
        let task_definition = self.task_definitions.get(&engine).ok_or_else(|| {
            ProviderError::api(format!("no task definition configured for {engine}"))
        })?;

        let network = AwsVpcConfiguration::builder()
            .set_subnets(Some(self.subnets.clone()))
            .set_security_groups(Some(self.security_groups.clone()))
            .assign_public_ip(AssignPublicIp::Enabled)
            .build()
            .map_err(|err| ProviderError::api(err.to_string()))?;
        let environment = request
            .environment
            .iter()
            .map(|(name, value)| KeyValuePair::builder().name(name).value(value).build())
            .collect();
        let container = ContainerOverride::builder()
            .name(&request.definition.container_name)
            .set_command(Some(request.definition.command.clone()))
            .set_environment(Some(environment))
            .build();

        let output = self
            .client
            .run_task()
            .cluster(&self.cluster)
            .task_definition(task_definition)
            .launch_type(LaunchType::Fargate)
            .network_configuration(
                NetworkConfiguration::builder()
                    .awsvpc_configuration(network)
                    .build(),
            )
            .overrides(
                TaskOverride::builder()
                    .container_overrides(container)
                    .build(),
            )
            .send()
            .await
            .map_err(|err| from_sdk(&err))?;

        let task_arn = output
            .tasks()
            .first()
            .and_then(Task::task_arn)
            .map(str::to_owned)
            .ok_or_else(|| {
                let reasons: Vec<&str> = output
                    .failures()
                    .iter()
                    .filter_map(|failure| failure.reason())
                    .collect();
                ProviderError::api(format!("task not started: {}", reasons.join(", ")))
            })?;
        info!(%engine, task_arn, "sanitization task started");

        let task = self.wait_until_stopped(&task_arn).await?;
        let exit_code = task
            .containers()
            .iter()
            .find(|container| container.name() == Some(request.definition.container_name.as_str()))
            .and_then(|container| container.exit_code());
        Ok(JobOutcome {
            task_arn: Some(task_arn),
            exit_code,
            stopped_reason: task.stopped_reason().map(str::to_owned),
        })
    }

    async fn wait_until_stopped(&self, task_arn: &str) -> Result<Task, ProviderError> {
        let describe = move || async move {
            let output = self
                .client
                .describe_tasks()
                .cluster(&self.cluster)
                .tasks(task_arn)
                .send()
                .await
                .map_err(|err| from_sdk(&err))?;
            output.tasks().first().cloned().ok_or_else(|| ProviderError::NotFound {
                message: format!("task {task_arn} not described"),
            })
        };
        poll_until_stopped(task_arn, self.max_polls, self.poll_interval, describe).await
    }
}

/// Calls `describe` until the task reports `STOPPED`, at most `max_polls`
/// times. Throttled polls count against the budget but do not fail the job.
async fn poll_until_stopped<F, Fut>(
    task_arn: &str,
    max_polls: u32,
    interval: Duration,
    mut describe: F,
) -> Result<Task, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Task, ProviderError>>,
{
    for poll in 1..=max_polls {
        match describe().await {
            Ok(task) if task.last_status() == Some(STOPPED) => return Ok(task),
            Ok(task) => {
                let status = task.last_status().unwrap_or_default();
                debug!(task_arn, poll, status, "sanitization task still running");
            }
            Err(err) if is_throttling(&err) => {
                warn!(task_arn, poll, error = %err, "task status poll throttled");
            }
            Err(err) => return Err(err),
        }
        tokio::time::sleep(interval).await;
    }
    Err(ProviderError::api(format!(
        "task {task_arn} did not stop within {max_polls} status polls"
    )))
}

impl JobRunner for EcsJobRunner {
    fn run_job<'a>(&'a self, request: &'a JobRequest) -> BackendFuture<'a, JobOutcome> {
        Box::pin(self.run_job_impl(request))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use rstest::rstest;

    use super::*;

    fn task(status: &str) -> Task {
        Task::builder().last_status(status).build()
    }

    fn throttled() -> ProviderError {
        ProviderError::Api {
            code: Some(String::from("ThrottlingException")),
            message: String::from("Rate exceeded"),
        }
    }

    async fn poll(
        script: Vec<Result<Task, ProviderError>>,
        max_polls: u32,
    ) -> (Result<Task, ProviderError>, usize) {
        let mut remaining = VecDeque::from(script);
        let mut calls = 0;
        let result = poll_until_stopped("arn:task/1", max_polls, Duration::ZERO, || {
            calls += 1;
            let next = remaining.pop_front().unwrap_or_else(|| Ok(task("RUNNING")));
            async move { next }
        })
        .await;
        (result, calls)
    }

    #[rstest]
    #[tokio::test]
    async fn throttled_polls_keep_waiting_for_the_task() {
        let (result, calls) = poll(
            vec![Ok(task("PENDING")), Err(throttled()), Ok(task(STOPPED))],
            10,
        )
        .await;

        let stopped = result.expect("task should be reported stopped");
        assert_eq!(stopped.last_status(), Some(STOPPED));
        assert_eq!(calls, 3);
    }

    #[rstest]
    #[tokio::test]
    async fn other_errors_end_the_wait() {
        let (result, calls) = poll(vec![Err(ProviderError::api("access denied"))], 10).await;

        assert_eq!(result.err(), Some(ProviderError::api("access denied")));
        assert_eq!(calls, 1);
    }

    #[rstest]
    #[tokio::test]
    async fn polling_gives_up_after_the_budget() {
        let (result, calls) = poll(Vec::new(), 4).await;

        let err = result.expect_err("a task that never stops is abandoned");
        assert!(err.to_string().contains("within 4 status polls"), "{err}");
        assert_eq!(calls, 4);
    }
}
