//! Engine-specific sanitization jobs.
//!
//! Each supported engine runs its SQL client in a container named
//! [`CONTAINER_NAME`] with the temporary database's connection details in
//! the environment. The job runner blocks until the container exits.

use std::fmt;

use serde::Serialize;

use crate::backend::BackendFuture;
use crate::payload::ConnectionDetails;

/// Name of the container that runs the sanitization SQL.
pub const CONTAINER_NAME: &str = "sql";

/// Engines the workflow knows how to sanitize.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SanitizerEngine {
    /// PostgreSQL, sanitized with `psql`.
    Postgres,
    /// MySQL, sanitized with the `mysql` client.
    #[serde(rename = "mysql")]
    MySql,
    /// MariaDB, sanitized with the `mysql` client.
    #[serde(rename = "mariadb")]
    MariaDb,
}

impl SanitizerEngine {
    /// Every supported engine, in branch order.
    pub const ALL: [Self; 3] = [Self::Postgres, Self::MySql, Self::MariaDb];

    /// Engine name as reported by the provider.
    #[must_use]
    pub const fn engine_name(self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::MySql => "mysql",
            Self::MariaDb => "mariadb",
        }
    }

    /// Name of the workflow state running this engine's job.
    #[must_use]
    pub const fn state_name(self) -> &'static str {
        match self {
            Self::Postgres => "SanitizePostgres",
            Self::MySql => "SanitizeMySQL",
            Self::MariaDb => "SanitizeMariaDB",
        }
    }

    /// Looks an engine up by its provider name.
    #[must_use]
    pub fn from_engine_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|engine| engine.engine_name() == name)
    }

    /// Container image for the SQL client.
    #[must_use]
    pub const fn image(self) -> &'static str {
        self.engine_name()
    }

    /// Database used when the instance reports no initial database name.
    #[must_use]
    pub const fn default_database(self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::MySql | Self::MariaDb => "mysql",
        }
    }

    /// Command executing `sql` with this engine's client.
    #[must_use]
    pub fn command(self, sql: &str) -> Vec<String> {
        let (client, flag) = match self {
            Self::Postgres => ("psql", "-c"),
            Self::MySql | Self::MariaDb => ("mysql", "-e"),
        };
        vec![client.to_owned(), flag.to_owned(), sql.to_owned()]
    }

    /// Task definition running `sql` against this engine.
    #[must_use]
    pub fn task_definition(self, sql: &str) -> SanitizationTaskDefinition {
        SanitizationTaskDefinition {
            engine: self,
            container_name: CONTAINER_NAME.to_owned(),
            image: self.image().to_owned(),
            command: self.command(sql),
        }
    }
}

impl fmt::Display for SanitizerEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.engine_name())
    }
}

/// Container specification for one engine's sanitization job.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SanitizationTaskDefinition {
    /// Engine the job targets.
    pub engine: SanitizerEngine,
    /// Container name overridden at run time.
    pub container_name: String,
    /// Container image.
    pub image: String,
    /// Command run inside the container.
    pub command: Vec<String>,
}

/// Field of [`ConnectionDetails`] exposed to the job.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConnectionField {
    /// Endpoint host.
    Host,
    /// Endpoint port.
    Port,
    /// Master user.
    User,
    /// Temporary password.
    Password,
    /// Database name.
    Database,
}

impl ConnectionField {
    /// Payload key of the field below `db`.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Host => "host",
            Self::Port => "port",
            Self::User => "user",
            Self::Password => "password",
            Self::Database => "database",
        }
    }

    fn value(self, details: &ConnectionDetails) -> &str {
        match self {
            Self::Host => &details.host,
            Self::Port => &details.port,
            Self::User => &details.user,
            Self::Password => &details.password,
            Self::Database => &details.database,
        }
    }
}

/// Source of one job environment variable.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EnvSource {
    /// Taken from the payload's connection details.
    Connection(ConnectionField),
    /// Fixed value.
    Literal(&'static str),
}

/// Environment handed to every sanitization container. Both client families
/// are configured so one table serves all engines.
pub const JOB_ENVIRONMENT: &[(&str, EnvSource)] = &[
    ("PGHOST", EnvSource::Connection(ConnectionField::Host)),
    ("PGPORT", EnvSource::Connection(ConnectionField::Port)),
    ("PGUSER", EnvSource::Connection(ConnectionField::User)),
    ("PGPASSWORD", EnvSource::Connection(ConnectionField::Password)),
    ("PGDATABASE", EnvSource::Connection(ConnectionField::Database)),
    ("PGCONNECT_TIMEOUT", EnvSource::Literal("30")),
    ("MYSQL_HOST", EnvSource::Connection(ConnectionField::Host)),
    ("MYSQL_PORT", EnvSource::Connection(ConnectionField::Port)),
    ("MYSQL_USER", EnvSource::Connection(ConnectionField::User)),
    ("MYSQL_PASSWORD", EnvSource::Connection(ConnectionField::Password)),
    ("MYSQL_DATABASE", EnvSource::Connection(ConnectionField::Database)),
];

/// Resolves [`JOB_ENVIRONMENT`] against concrete connection details.
#[must_use]
pub fn job_environment(details: &ConnectionDetails) -> Vec<(String, String)> {
    JOB_ENVIRONMENT
        .iter()
        .map(|(name, source)| {
            let value = match source {
                EnvSource::Connection(field) => field.value(details),
                EnvSource::Literal(value) => value,
            };
            ((*name).to_owned(), value.to_owned())
        })
        .collect()
}

/// One sanitization run.
#[derive(Clone, PartialEq, Eq)]
pub struct JobRequest {
    /// Container to run.
    pub definition: SanitizationTaskDefinition,
    /// Environment injected into the container.
    pub environment: Vec<(String, String)>,
}

impl JobRequest {
    /// Builds the request for `engine` against the given database.
    #[must_use]
    pub fn new(engine: SanitizerEngine, sql: &str, details: &ConnectionDetails) -> Self {
        Self {
            definition: engine.task_definition(sql),
            environment: job_environment(details),
        }
    }
}

impl fmt::Debug for JobRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self
            .environment
            .iter()
            .map(|(name, _)| name.as_str())
            .collect();
        f.debug_struct("JobRequest")
            .field("definition", &self.definition)
            .field("environment", &names)
            .finish()
    }
}

/// Result reported by the job runner once the container stopped.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct JobOutcome {
    /// Provider identifier of the finished task.
    pub task_arn: Option<String>,
    /// Exit code of the SQL container.
    pub exit_code: Option<i32>,
    /// Reason reported by the provider when the task stopped.
    pub stopped_reason: Option<String>,
}

impl JobOutcome {
    /// Returns `true` when the SQL container exited with status zero.
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        matches!(self.exit_code, Some(0))
    }
}

/// Containerised job runner.
pub trait JobRunner: Send + Sync {
    /// Runs the job to completion and reports how it ended.
    fn run_job<'a>(&'a self, request: &'a JobRequest) -> BackendFuture<'a, JobOutcome>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn details() -> ConnectionDetails {
        ConnectionDetails {
            host: String::from("db.internal"),
            port: String::from("5432"),
            user: String::from("master"),
            password: String::from("secret"),
            database: String::from("app"),
        }
    }

    #[rstest]
    #[case("postgres", Some(SanitizerEngine::Postgres))]
    #[case("mysql", Some(SanitizerEngine::MySql))]
    #[case("mariadb", Some(SanitizerEngine::MariaDb))]
    #[case("aurora-postgresql", None)]
    #[case("Postgres", None)]
    fn resolves_engines_by_exact_name(
        #[case] name: &str,
        #[case] expected: Option<SanitizerEngine>,
    ) {
        assert_eq!(SanitizerEngine::from_engine_name(name), expected);
    }

    #[rstest]
    #[case(SanitizerEngine::Postgres, &["psql", "-c", "DELETE FROM users"])]
    #[case(SanitizerEngine::MySql, &["mysql", "-e", "DELETE FROM users"])]
    #[case(SanitizerEngine::MariaDb, &["mysql", "-e", "DELETE FROM users"])]
    fn builds_engine_commands(#[case] engine: SanitizerEngine, #[case] expected: &[&str]) {
        let definition = engine.task_definition("DELETE FROM users");
        assert_eq!(definition.command, expected);
        assert_eq!(definition.container_name, CONTAINER_NAME);
        assert_eq!(definition.image, engine.engine_name());
    }

    #[rstest]
    fn environment_covers_both_client_families() {
        let env = job_environment(&details());
        let lookup = |name: &str| {
            env.iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.as_str())
        };
        assert_eq!(lookup("PGHOST"), Some("db.internal"));
        assert_eq!(lookup("MYSQL_PASSWORD"), Some("secret"));
        assert_eq!(lookup("PGCONNECT_TIMEOUT"), Some("30"));
        assert_eq!(env.len(), JOB_ENVIRONMENT.len());
    }

    #[rstest]
    fn job_request_debug_hides_environment_values() {
        let request = JobRequest::new(SanitizerEngine::Postgres, "SELECT 1", &details());
        let rendered = format!("{request:?}");
        assert!(rendered.contains("PGPASSWORD"));
        assert!(!rendered.contains("secret"));
    }

    #[rstest]
    #[case(Some(0), true)]
    #[case(Some(1), false)]
    #[case(None, false)]
    fn outcome_success_requires_zero_exit(#[case] code: Option<i32>, #[case] ok: bool) {
        let outcome = JobOutcome {
            exit_code: code,
            ..JobOutcome::default()
        };
        assert_eq!(outcome.succeeded(), ok);
    }
}
