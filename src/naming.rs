//! Identifier generation and snapshot-name templates.
//!
//! RDS identifiers are limited to 63 characters, must start with a letter,
//! may only contain letters, digits and hyphens, must not contain two
//! consecutive hyphens and must not end with one.

use std::fmt::Write as _;

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Utc};
use regex::Regex;
use thiserror::Error;
use uuid::Uuid;

/// Longest identifier accepted by the provider.
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// Number of random hex characters appended to ephemeral identifiers.
pub const SUFFIX_LEN: usize = 10;

/// Template used when none is configured.
pub const DEFAULT_SNAPSHOT_FORMAT: &str = "{database_identifier:.42}-sanitized-{date:%Y-%m-%d}";

const IDENTIFIER_PATTERN: &str = "^[a-zA-Z][a-zA-Z0-9-]{1,62}$";
const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";
const PASSWORD_UUIDS: usize = 2;

/// Errors raised while rendering or validating identifiers.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum NamingError {
    /// The rendered identifier breaks the provider naming rules.
    #[error("invalid snapshot identifier `{name}`: {reason}")]
    InvalidIdentifier {
        /// Identifier that failed validation.
        name: String,
        /// Rule that was broken.
        reason: String,
    },
    /// The template itself cannot be rendered.
    #[error("invalid snapshot name template `{template}`: {reason}")]
    InvalidTemplate {
        /// Offending template.
        template: String,
        /// Why rendering failed.
        reason: String,
    },
}

/// Returns a random lowercase hex suffix of [`SUFFIX_LEN`] characters.
#[must_use]
pub fn random_suffix() -> String {
    Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(SUFFIX_LEN)
        .collect()
}

/// Returns a fresh ephemeral identifier derived from `source`.
#[must_use]
pub fn ephemeral_identifier(source: &str) -> String {
    ephemeral_identifier_with_suffix(source, &random_suffix())
}

/// Joins a truncated `source` prefix and `suffix` so the result never exceeds
/// [`MAX_IDENTIFIER_LEN`] and never contains a doubled hyphen at the join.
#[must_use]
pub fn ephemeral_identifier_with_suffix(source: &str, suffix: &str) -> String {
    let budget = MAX_IDENTIFIER_LEN.saturating_sub(suffix.chars().count() + 1);
    let prefix: String = source.chars().take(budget).collect();
    format!("{}-{suffix}", prefix.trim_end_matches('-'))
}

/// Returns a random password of 64 lowercase hex characters.
#[must_use]
pub fn temporary_password() -> String {
    (0..PASSWORD_UUIDS)
        .map(|_| Uuid::new_v4().simple().to_string())
        .collect()
}

/// Renders a snapshot-name template.
///
/// Supported placeholders are `{database_identifier}`,
/// `{database_identifier:.N}` (first `N` characters), `{date}` (ISO date) and
/// `{date:<strftime>}`. `{{` and `}}` produce literal braces.
///
/// # Errors
///
/// Returns [`NamingError::InvalidTemplate`] for unknown placeholders,
/// unbalanced braces, or malformed format specifications.
pub fn render_snapshot_name(
    template: &str,
    database_identifier: &str,
    now: DateTime<Utc>,
) -> Result<String, NamingError> {
    let invalid = |reason: &str| NamingError::InvalidTemplate {
        template: template.to_owned(),
        reason: reason.to_owned(),
    };

    let mut rendered = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                rendered.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                rendered.push('}');
            }
            '}' => return Err(invalid("unmatched `}`")),
            '{' => {
                let mut field = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(inner) => field.push(inner),
                        None => return Err(invalid("unterminated placeholder")),
                    }
                }
                let (name, spec) = match field.split_once(':') {
                    Some((name, spec)) => (name, Some(spec)),
                    None => (field.as_str(), None),
                };
                match name {
                    "database_identifier" => {
                        rendered.push_str(&truncate(database_identifier, spec).map_err(invalid)?);
                    }
                    "date" => {
                        let format = spec.unwrap_or(DEFAULT_DATE_FORMAT);
                        let items = StrftimeItems::new(format).collect::<Vec<_>>();
                        if items.iter().any(|item| matches!(item, Item::Error)) {
                            return Err(invalid("malformed date format"));
                        }
                        write!(rendered, "{}", now.format_with_items(items.into_iter()))
                            .map_err(|_| invalid("date could not be formatted"))?;
                    }
                    _ => return Err(invalid(&format!("unknown placeholder `{name}`"))),
                }
            }
            other => rendered.push(other),
        }
    }
    Ok(rendered)
}

fn truncate(value: &str, format_spec: Option<&str>) -> Result<String, &'static str> {
    let spec = format_spec.unwrap_or_default();
    let precision = spec.strip_suffix('s').unwrap_or(spec);
    if precision.is_empty() {
        return Ok(value.to_owned());
    }
    let width = precision
        .strip_prefix('.')
        .and_then(|digits| digits.parse::<usize>().ok())
        .ok_or("database_identifier only supports a `.N` or `.Ns` precision")?;
    Ok(value.chars().take(width).collect())
}

/// Checks a snapshot identifier against the provider naming rules.
///
/// # Errors
///
/// Returns [`NamingError::InvalidIdentifier`] naming the rule that failed.
pub fn validate_snapshot_identifier(name: &str) -> Result<(), NamingError> {
    let invalid = |reason: &str| NamingError::InvalidIdentifier {
        name: name.to_owned(),
        reason: reason.to_owned(),
    };
    let pattern = Regex::new(IDENTIFIER_PATTERN).map_err(|err| invalid(&err.to_string()))?;
    if !pattern.is_match(name) {
        return Err(invalid(
            "must start with a letter and contain 2-63 letters, digits or hyphens",
        ));
    }
    if name.contains("--") {
        return Err(invalid("must not contain two consecutive hyphens"));
    }
    if name.ends_with('-') {
        return Err(invalid("must not end with a hyphen"));
    }
    Ok(())
}

/// Renders `template` and validates the result in one step.
///
/// # Errors
///
/// Returns [`NamingError`] when rendering or validation fails.
pub fn snapshot_name(
    template: &str,
    database_identifier: &str,
    now: DateTime<Utc>,
) -> Result<String, NamingError> {
    let effective = if template.trim().is_empty() {
        DEFAULT_SNAPSHOT_FORMAT
    } else {
        template
    };
    let name = render_snapshot_name(effective, database_identifier, now)?;
    validate_snapshot_identifier(&name)?;
    Ok(name)
}
