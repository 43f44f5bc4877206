//! Unit tests for the workflow topology and its rendering.

use std::time::Duration;

use rstest::{fixture, rstest};
use serde_json::json;

use super::*;
use crate::handlers::handler_for;

#[fixture]
fn topology() -> Topology {
    Topology::standard()
}

#[rstest]
fn standard_topology_is_valid(topology: Topology) {
    assert_eq!(topology.validate(), Ok(()));
    assert_eq!(topology.start_at(), states::INITIALIZE);
}

#[rstest]
fn every_function_task_has_a_registered_handler(topology: Topology) {
    for (name, state) in topology.states() {
        if let State::Task(TaskState {
            work: TaskWork::Function,
            ..
        }) = state
        {
            assert!(handler_for(name).is_some(), "{name} has no handler");
        }
    }
}

#[rstest]
#[case(states::WAIT_FOR_SNAPSHOT)]
#[case(states::WAIT_FOR_ENCRYPT)]
#[case(states::WAIT_FOR_TEMP_DATABASE)]
#[case(states::WAIT_FOR_PASSWORD)]
#[case(states::WAIT_FOR_FINAL_SNAPSHOT)]
fn waiting_states_retry_not_ready(topology: Topology, #[case] name: &str) {
    let Some(State::Task(task)) = topology.state(name) else {
        panic!("{name} should be a task");
    };
    assert_eq!(task.retry, vec![RetryPolicy::readiness()]);
    assert_eq!(
        task.catch,
        Some(CatchPolicy {
            next: states::ERROR_CLEANUP
        })
    );
    assert_eq!(task.retrier_for("NotReady").map(|(index, _)| index), Some(0));
    assert!(task.retrier_for("BadStatus").is_none());
}

#[rstest]
#[case(states::CLEANUP, states::SUCCESS)]
#[case(states::ERROR_CLEANUP, states::FAILURE)]
fn cleanup_states_retry_everything_without_catch(
    topology: Topology,
    #[case] name: &str,
    #[case] next: &str,
) {
    let Some(State::Task(task)) = topology.state(name) else {
        panic!("{name} should be a task");
    };
    assert_eq!(task.next, next);
    assert_eq!(task.catch, None);
    assert!(task.retrier_for("anything").is_some());
}

#[rstest]
#[case(json!({"new_snapshot": "Take new snapshot"}), states::TAKE_SNAPSHOT)]
#[case(json!({"new_snapshot": "Use latest existing snapshot"}), states::FIND_LATEST_SNAPSHOT)]
#[case(json!({"new_snapshot": "take new snapshot"}), states::ERROR_CLEANUP)]
#[case(json!({}), states::ERROR_CLEANUP)]
fn choose_snapshot_uses_exact_equality(
    topology: Topology,
    #[case] payload: Value,
    #[case] expected: &str,
) {
    let Some(State::Choice(choice)) = topology.state(states::CHOOSE_SNAPSHOT) else {
        panic!("ChooseSnapshot should be a choice");
    };
    assert_eq!(choice.evaluate(&payload), expected);
}

#[rstest]
#[case(json!({"kms": ""}), states::CREATE_TEMP_DATABASE)]
#[case(json!({"kms": "alias/shared"}), states::ENCRYPT)]
#[case(json!({}), states::ENCRYPT)]
fn should_encrypt_defaults_to_encryption(
    topology: Topology,
    #[case] payload: Value,
    #[case] expected: &str,
) {
    let Some(State::Choice(choice)) = topology.state(states::SHOULD_ENCRYPT) else {
        panic!("ShouldEncrypt should be a choice");
    };
    assert_eq!(choice.evaluate(&payload), expected);
}

#[rstest]
#[case("postgres", "SanitizePostgres")]
#[case("mysql", "SanitizeMySQL")]
#[case("mariadb", "SanitizeMariaDB")]
#[case("oracle-ee", "ErrorCleanup")]
fn choose_sanitizer_routes_by_engine(
    topology: Topology,
    #[case] engine: &str,
    #[case] expected: &str,
) {
    let Some(State::Choice(choice)) = topology.state(states::CHOOSE_SANITIZER) else {
        panic!("ChooseSanitizer should be a choice");
    };
    assert_eq!(choice.evaluate(&json!({"engine": engine})), expected);
}

#[rstest]
fn retry_delays_follow_the_backoff_rate() {
    let fixed = RetryPolicy::readiness();
    assert_eq!(fixed.delay_for(1), Duration::from_secs(60));
    assert_eq!(fixed.delay_for(300), Duration::from_secs(60));

    let doubling = RetryPolicy {
        backoff_rate: 2.0,
        ..RetryPolicy::cleanup()
    };
    assert_eq!(doubling.delay_for(1), Duration::from_secs(120));
    assert_eq!(doubling.delay_for(3), Duration::from_secs(480));
}

#[rstest]
fn validation_reports_dangling_targets() {
    let topology = Topology::new(
        states::INITIALIZE,
        vec![
            (
                states::INITIALIZE,
                State::Task(TaskState {
                    work: TaskWork::Function,
                    next: "Nowhere",
                    retry: Vec::new(),
                    catch: Some(CatchPolicy {
                        next: states::ERROR_CLEANUP,
                    }),
                }),
            ),
            (states::ERROR_CLEANUP, State::Fail),
        ],
    );

    assert_eq!(
        topology.validate(),
        Err(TopologyError::UnknownTarget {
            from: String::from(states::INITIALIZE),
            target: String::from("Nowhere"),
        })
    );
}

#[rstest]
fn validation_requires_compensation_and_reachability() {
    let uncaught = Topology::new(
        states::INITIALIZE,
        vec![
            (
                states::INITIALIZE,
                State::Task(TaskState {
                    work: TaskWork::Function,
                    next: states::SUCCESS,
                    retry: Vec::new(),
                    catch: None,
                }),
            ),
            (states::SUCCESS, State::Succeed),
        ],
    );
    assert_eq!(
        uncaught.validate(),
        Err(TopologyError::MissingCatch(String::from(states::INITIALIZE)))
    );

    let orphaned = Topology::new(
        states::SUCCESS,
        vec![(states::SUCCESS, State::Succeed), (states::FAILURE, State::Fail)],
    );
    assert_eq!(
        orphaned.validate(),
        Err(TopologyError::Unreachable(String::from(states::FAILURE)))
    );
}

#[rstest]
fn state_machine_lists_every_state(topology: Topology) {
    let document = topology.to_state_machine(&StateMachineResources::placeholders());

    assert_eq!(document["StartAt"], json!("Initialize"));
    let rendered = document["States"].as_object().expect("states object");
    for (name, _) in topology.states() {
        assert!(rendered.contains_key(name), "{name} missing");
    }
    assert_eq!(rendered.len(), topology.states().count());
}

#[rstest]
fn state_machine_renders_handler_parameters(topology: Topology) {
    let document = topology.to_state_machine(&StateMachineResources::placeholders());

    let initialize = &document["States"]["Initialize"];
    assert_eq!(initialize["Parameters"]["uid.$"], json!("$$.Execution.Id"));
    assert_eq!(initialize["Parameters"]["state"]["db_identifier"], json!("${Db}"));
    assert!(initialize["Parameters"].get("state.$").is_none());

    let wait = &document["States"]["WaitForTempDatabase"];
    assert_eq!(wait["Parameters"]["state.$"], json!("$"));
    assert_eq!(
        wait["Retry"],
        json!([{
            "ErrorEquals": ["NotReady"],
            "IntervalSeconds": 60,
            "MaxAttempts": 300,
            "BackoffRate": 1.0,
        }])
    );
    assert_eq!(
        wait["Catch"],
        json!([{"ErrorEquals": ["States.ALL"], "Next": "ErrorCleanup"}])
    );
    assert!(document["States"]["ErrorCleanup"].get("Catch").is_none());
}

#[rstest]
fn state_machine_renders_sanitize_jobs(topology: Topology) {
    let document = topology.to_state_machine(&StateMachineResources::placeholders());

    let job = &document["States"]["SanitizeMariaDB"];
    assert_eq!(job["Resource"], json!("arn:aws:states:::ecs:runTask.sync"));
    assert_eq!(job["ResultPath"], json!("$.SanitizeResult"));
    assert_eq!(job["Parameters"]["LaunchType"], json!("FARGATE"));
    assert_eq!(
        job["Parameters"]["TaskDefinition"],
        json!("${SanitizeMariaDBTaskDefinition}")
    );
    let overrides = &job["Parameters"]["Overrides"]["ContainerOverrides"][0];
    assert_eq!(overrides["Name"], json!("sql"));
    assert!(
        overrides["Environment"]
            .as_array()
            .is_some_and(|env| env.contains(&json!({"Name": "MYSQL_HOST", "Value.$": "$.db.host"})))
    );
}
