//! Unit tests for configuration loading and validation.

use rstest::*;
use sanitized_snapshots::config::{ConfigError, SanitizeConfig};
use sanitized_snapshots::naming::DEFAULT_SNAPSHOT_FORMAT;
use sanitized_snapshots::payload::{TAKE_NEW_SNAPSHOT, USE_LATEST_SNAPSHOT};
use sanitized_snapshots::sanitizer::SanitizerEngine;
use sanitized_snapshots::test_support::EnvGuard;
use serde_json::json;

#[fixture]
fn valid_config() -> SanitizeConfig {
    SanitizeConfig {
        db_identifier: String::from("orders-prod"),
        vpc_id: String::from("vpc-1"),
        subnet_group_id: String::from("private-db"),
        security_group_id: String::from("sg-1"),
        new_snapshot: String::from(USE_LATEST_SNAPSHOT),
        snapshot_format: String::from(DEFAULT_SNAPSHOT_FORMAT),
        kms: String::new(),
        share_accounts: String::from("111111111111, 222222222222,"),
        subnets: String::from("subnet-a,subnet-b"),
        region: Some(String::from("eu-west-1")),
        sanitize_sql: String::from("UPDATE users SET email = 'redacted';"),
        cluster: Some(String::from("sanitizers")),
        postgres_task_definition: Some(String::from("arn:aws:ecs:td/pg")),
        mysql_task_definition: None,
        mariadb_task_definition: Some(String::from("  ")),
        handler_arn: None,
    }
}

#[rstest]
fn valid_config_passes_validation(valid_config: SanitizeConfig) {
    assert_eq!(valid_config.validate(), Ok(()));
    assert_eq!(valid_config.validate_jobs(), Ok(()));
}

/// Verifies that validation produces actionable errors mentioning both the
/// environment variable and configuration file for each required field.
#[rstest]
#[case::db(|cfg: &mut SanitizeConfig| cfg.db_identifier.clear(), "SANITIZE_DB_IDENTIFIER", "db_identifier")]
#[case::vpc(|cfg: &mut SanitizeConfig| cfg.vpc_id.clear(), "SANITIZE_VPC_ID", "vpc_id")]
#[case::subnet_group(|cfg: &mut SanitizeConfig| cfg.subnet_group_id.clear(), "SANITIZE_SUBNET_GROUP_ID", "subnet_group_id")]
#[case::security_group(|cfg: &mut SanitizeConfig| cfg.security_group_id = String::from("  "), "SANITIZE_SECURITY_GROUP_ID", "security_group_id")]
#[case::format(|cfg: &mut SanitizeConfig| cfg.snapshot_format.clear(), "SANITIZE_SNAPSHOT_FORMAT", "snapshot_format")]
fn validation_errors_are_actionable(
    valid_config: SanitizeConfig,
    #[case] mutate: fn(&mut SanitizeConfig),
    #[case] env_var: &str,
    #[case] toml_key: &str,
) {
    let mut cfg = valid_config;
    mutate(&mut cfg);

    let error = cfg.validate().expect_err("validation should fail");
    let ConfigError::MissingField(ref message) = error else {
        panic!("expected MissingField error, got {error:?}");
    };
    assert!(message.contains(env_var), "should mention {env_var}: {message}");
    assert!(message.contains(toml_key), "should mention {toml_key}: {message}");
    assert!(
        message.contains("sanitized-snapshots.toml"),
        "should mention the config file: {message}"
    );
}

#[rstest]
fn snapshot_choice_must_be_exact(valid_config: SanitizeConfig) {
    let cfg = SanitizeConfig {
        new_snapshot: String::from("take new snapshot"),
        ..valid_config
    };

    let error = cfg.validate().expect_err("lowercase choice is rejected");
    assert!(matches!(error, ConfigError::InvalidValue(_)), "{error:?}");
}

#[rstest]
fn job_settings_require_a_cluster(valid_config: SanitizeConfig) {
    let cfg = SanitizeConfig {
        cluster: None,
        ..valid_config
    };

    let error = cfg.validate_jobs().expect_err("cluster is required");
    assert!(error.to_string().contains("SANITIZE_CLUSTER"), "{error}");
}

#[rstest]
fn lists_drop_blank_entries(valid_config: SanitizeConfig) {
    assert_eq!(
        valid_config.share_accounts_list(),
        vec![String::from("111111111111"), String::from("222222222222")]
    );
    assert_eq!(
        valid_config.subnets_list(),
        vec![String::from("subnet-a"), String::from("subnet-b")]
    );
}

#[rstest]
fn blank_task_definitions_are_ignored(valid_config: SanitizeConfig) {
    let definitions = valid_config.task_definitions();

    assert_eq!(definitions.len(), 1);
    assert_eq!(
        definitions.get(&SanitizerEngine::Postgres).map(String::as_str),
        Some("arn:aws:ecs:td/pg")
    );
}

#[rstest]
fn initial_payload_carries_the_workflow_inputs(valid_config: SanitizeConfig) {
    assert_eq!(
        valid_config.initial_payload(),
        json!({
            "db_identifier": "orders-prod",
            "vpc_id": "vpc-1",
            "subnet_group_id": "private-db",
            "security_group_id": "sg-1",
            "new_snapshot": USE_LATEST_SNAPSHOT,
            "shared_accounts": ["111111111111", "222222222222"],
            "snapshot_format": DEFAULT_SNAPSHOT_FORMAT,
            "kms": "",
        })
    );
}

#[rstest]
fn state_machine_resources_fill_configured_values(valid_config: SanitizeConfig) {
    let resources = valid_config.state_machine_resources();

    assert_eq!(resources.cluster_arn, "sanitizers");
    assert_eq!(resources.handler_arn, "${HandlerFunction.Arn}");
    assert_eq!(resources.subnets, vec!["subnet-a", "subnet-b"]);
    assert_eq!(
        resources.task_definitions.get(&SanitizerEngine::Postgres).map(String::as_str),
        Some("arn:aws:ecs:td/pg")
    );
    assert_eq!(
        resources.task_definitions.get(&SanitizerEngine::MySql).map(String::as_str),
        Some("${SanitizeMySQLTaskDefinition}")
    );
}

#[tokio::test]
async fn environment_variables_populate_the_config() {
    let _guard = EnvGuard::set_vars(&[
        ("SANITIZE_DB_IDENTIFIER", "orders-prod"),
        ("SANITIZE_VPC_ID", "vpc-9"),
        ("SANITIZE_SUBNET_GROUP_ID", "private-db"),
        ("SANITIZE_SECURITY_GROUP_ID", "sg-9"),
        ("SANITIZE_NEW_SNAPSHOT", TAKE_NEW_SNAPSHOT),
    ])
    .await;

    let cfg = SanitizeConfig::load_without_cli_args()
        .unwrap_or_else(|err| panic!("config should load: {err}"));

    assert_eq!(cfg.db_identifier, "orders-prod");
    assert_eq!(cfg.security_group_id, "sg-9");
    assert_eq!(cfg.new_snapshot, TAKE_NEW_SNAPSHOT);
    assert_eq!(cfg.snapshot_format, DEFAULT_SNAPSHOT_FORMAT);
    assert_eq!(cfg.kms, "");
    assert_eq!(cfg.validate(), Ok(()));
}
