//! Amazon States Language rendering of a [`Topology`].

use std::collections::BTreeMap;

use serde_json::{Map, Value, json};

use super::states::INITIALIZE;
use super::{
    CatchPolicy, ChoiceState, RetryPolicy, SANITIZE_RESULT_KEY, STATES_ALL, State, TaskState,
    TaskWork, Topology,
};
use crate::sanitizer::{CONTAINER_NAME, EnvSource, JOB_ENVIRONMENT, SanitizerEngine};

const ECS_RUN_TASK_SYNC: &str = "arn:aws:states:::ecs:runTask.sync";
const EXECUTION_ID_PATH: &str = "$$.Execution.Id";

/// External resources referenced by the rendered state machine.
#[derive(Clone, Debug, PartialEq)]
pub struct StateMachineResources {
    /// ARN of the function running the state handlers.
    pub handler_arn: String,
    /// ARN of the ECS cluster running sanitization jobs.
    pub cluster_arn: String,
    /// Task definition ARN per engine.
    pub task_definitions: BTreeMap<SanitizerEngine, String>,
    /// Subnets of the sanitization tasks.
    pub subnets: Vec<String>,
    /// Security group of the sanitization tasks.
    pub security_group_id: String,
    /// Literal input handed to the `Initialize` state.
    pub initial_payload: Value,
}

impl StateMachineResources {
    /// Resources expressed as `${...}` template substitutions, for embedding
    /// the definition in an infrastructure template.
    #[must_use]
    pub fn placeholders() -> Self {
        Self {
            handler_arn: String::from("${HandlerFunction.Arn}"),
            cluster_arn: String::from("${FargateCluster}"),
            task_definitions: SanitizerEngine::ALL
                .into_iter()
                .map(|engine| (engine, placeholder_task_definition(engine)))
                .collect(),
            subnets: vec![String::from("${SubnetIdsJoined}")],
            security_group_id: String::from("${SecurityGroup}"),
            initial_payload: json!({
                "db_identifier": "${Db}",
                "vpc_id": "${VpcId}",
                "subnet_group_id": "${SubnetGroup}",
                "security_group_id": "${SecurityGroup}",
                "new_snapshot": "${NewSnapshot}",
                "shared_accounts": ["${ShareAccountsJoined}"],
                "snapshot_format": "${SnapshotFormat}",
                "kms": "${KMS}",
            }),
        }
    }

    fn task_definition(&self, engine: SanitizerEngine) -> String {
        self.task_definitions
            .get(&engine)
            .cloned()
            .unwrap_or_else(|| placeholder_task_definition(engine))
    }
}

fn placeholder_task_definition(engine: SanitizerEngine) -> String {
    format!("${{{}TaskDefinition}}", engine.state_name())
}

impl Topology {
    /// Renders the graph as an Amazon States Language document.
    #[must_use]
    pub fn to_state_machine(&self, resources: &StateMachineResources) -> Value {
        let states: Map<String, Value> = self
            .states()
            .map(|(name, state)| (name.to_owned(), render_state(name, state, resources)))
            .collect();
        json!({
            "Comment": "Sanitize and share a copy of an RDS snapshot",
            "StartAt": self.start_at(),
            "States": states,
        })
    }
}

fn render_state(name: &str, state: &State, resources: &StateMachineResources) -> Value {
    match state {
        State::Task(task) => render_task(name, task, resources),
        State::Choice(choice) => render_choice(choice),
        State::Succeed => json!({"Type": "Succeed"}),
        State::Fail => json!({"Type": "Fail"}),
    }
}

fn render_choice(choice: &ChoiceState) -> Value {
    let rules: Vec<Value> = choice
        .choices
        .iter()
        .map(|rule| {
            json!({
                "Variable": format!("$.{}", rule.variable),
                "StringEquals": rule.string_equals,
                "Next": rule.next,
            })
        })
        .collect();
    json!({
        "Type": "Choice",
        "Choices": rules,
        "Default": choice.default,
    })
}

fn render_task(name: &str, task: &TaskState, resources: &StateMachineResources) -> Value {
    let mut body = match task.work {
        TaskWork::Function => function_task(name, resources),
        TaskWork::Sanitize(engine) => sanitize_task(engine, resources),
    };
    body.insert(String::from("Next"), Value::from(task.next));
    if !task.retry.is_empty() {
        body.insert(
            String::from("Retry"),
            Value::Array(task.retry.iter().map(render_retry).collect()),
        );
    }
    if let Some(catch) = &task.catch {
        body.insert(String::from("Catch"), json!([render_catch(catch)]));
    }
    Value::Object(body)
}

fn function_task(name: &str, resources: &StateMachineResources) -> Map<String, Value> {
    let mut parameters = Map::new();
    parameters.insert(String::from("uid.$"), Value::from(EXECUTION_ID_PATH));
    parameters.insert(String::from("state_name"), Value::from(name));
    if name == INITIALIZE {
        parameters.insert(String::from("state"), resources.initial_payload.clone());
    } else {
        parameters.insert(String::from("state.$"), Value::from("$"));
    }

    let mut body = Map::new();
    body.insert(String::from("Type"), Value::from("Task"));
    body.insert(
        String::from("Resource"),
        Value::from(resources.handler_arn.as_str()),
    );
    body.insert(String::from("Parameters"), Value::Object(parameters));
    body
}

fn sanitize_task(engine: SanitizerEngine, resources: &StateMachineResources) -> Map<String, Value> {
    let environment: Vec<Value> = JOB_ENVIRONMENT
        .iter()
        .map(|(name, source)| match source {
            EnvSource::Connection(field) => {
                json!({"Name": name, "Value.$": format!("$.db.{}", field.key())})
            }
            EnvSource::Literal(value) => json!({"Name": name, "Value": value}),
        })
        .collect();

    let parameters = json!({
        "TaskDefinition": resources.task_definition(engine),
        "Cluster": resources.cluster_arn,
        "LaunchType": "FARGATE",
        "NetworkConfiguration": {
            "AwsvpcConfiguration": {
                "AssignPublicIp": "ENABLED",
                "SecurityGroups": [resources.security_group_id],
                "Subnets": resources.subnets,
            }
        },
        "Overrides": {
            "ContainerOverrides": [{
                "Name": CONTAINER_NAME,
                "Environment": environment,
            }]
        }
    });

    let mut body = Map::new();
    body.insert(String::from("Type"), Value::from("Task"));
    body.insert(String::from("Resource"), Value::from(ECS_RUN_TASK_SYNC));
    body.insert(String::from("OutputPath"), Value::from("$"));
    body.insert(
        String::from("ResultPath"),
        Value::from(format!("$.{SANITIZE_RESULT_KEY}")),
    );
    body.insert(String::from("Parameters"), parameters);
    body
}

fn render_retry(policy: &RetryPolicy) -> Value {
    json!({
        "ErrorEquals": [policy.error_equals],
        "IntervalSeconds": policy.interval_seconds,
        "MaxAttempts": policy.max_attempts,
        "BackoffRate": policy.backoff_rate,
    })
}

fn render_catch(catch: &CatchPolicy) -> Value {
    json!({
        "ErrorEquals": [STATES_ALL],
        "Next": catch.next,
    })
}
