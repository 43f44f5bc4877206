//! Classification of AWS SDK errors into [`ProviderError`].

use aws_sdk_rds::error::ProvideErrorMetadata;

use crate::backend::ProviderError;

const ALREADY_EXISTS_CODES: &[&str] = &["DBSnapshotAlreadyExists", "DBInstanceAlreadyExists"];

const NOT_FOUND_CODES: &[&str] = &["DBInstanceNotFound", "DBSnapshotNotFound"];

const INVALID_INSTANCE_STATE: &str = "InvalidDBInstanceState";

const THROTTLING_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "TooManyRequestsException",
    "RequestLimitExceeded",
];

/// Classifies an error code and message.
///
/// An instance that is already being deleted counts as missing, so repeated
/// cleanup passes stay idempotent.
#[must_use]
pub fn classify_error(code: Option<&str>, message: Option<&str>) -> ProviderError {
    let text = message.unwrap_or("unknown error").to_owned();
    match code {
        Some(c) if ALREADY_EXISTS_CODES.contains(&c) => {
            ProviderError::AlreadyExists { message: text }
        }
        Some(c) if NOT_FOUND_CODES.contains(&c) => ProviderError::NotFound { message: text },
        Some(INVALID_INSTANCE_STATE) if text.contains("being deleted") => {
            ProviderError::NotFound { message: text }
        }
        _ => ProviderError::Api {
            code: code.map(str::to_owned),
            message: text,
        },
    }
}

/// Classifies any SDK error through its error metadata.
///
/// Transport failures carry no code; their display text becomes the message.
#[must_use]
pub fn from_sdk<E>(err: &E) -> ProviderError
where
    E: ProvideErrorMetadata + std::error::Error,
{
    let fallback = err.to_string();
    classify_error(err.code(), Some(err.message().unwrap_or(&fallback)))
}

/// Returns `true` when the provider rejected a call for exceeding its rate
/// limit. The call may succeed when repeated later.
#[must_use]
pub fn is_throttling(err: &ProviderError) -> bool {
    matches!(
        err,
        ProviderError::Api { code: Some(code), .. } if THROTTLING_CODES.contains(&code.as_str())
    )
}
