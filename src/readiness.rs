//! Classifies provider status strings for the waiting states.

/// Status reported by a resource that finished its pending operation.
pub const AVAILABLE: &str = "available";

/// Case-insensitive fragments marking a status that will never recover.
pub const FATAL_STATUS_PATTERNS: [&str; 6] =
    ["stop", "delet", "fail", "incompatible", "inaccessible", "error"];

/// Outcome of inspecting a freshly fetched status.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Readiness {
    /// The resource is usable.
    Ready,
    /// The resource is still transitioning; poll again later.
    Pending,
    /// The resource reached a state it will not leave on its own.
    Failed {
        /// Status that triggered the failure.
        status: String,
    },
}

impl Readiness {
    /// Classifies a snapshot status.
    #[must_use]
    pub fn of_snapshot(status: &str) -> Self {
        if status == AVAILABLE {
            return Self::Ready;
        }
        let lowered = status.to_ascii_lowercase();
        if FATAL_STATUS_PATTERNS
            .iter()
            .any(|pattern| lowered.contains(pattern))
        {
            return Self::Failed {
                status: status.to_owned(),
            };
        }
        Self::Pending
    }

    /// Classifies a database instance status. An available instance with
    /// queued modifications is still pending.
    #[must_use]
    pub fn of_instance(status: &str, pending_modifications: bool) -> Self {
        match Self::of_snapshot(status) {
            Self::Ready if pending_modifications => Self::Pending,
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("available", Readiness::Ready)]
    #[case("creating", Readiness::Pending)]
    #[case("modifying", Readiness::Pending)]
    #[case("backing-up", Readiness::Pending)]
    #[case("copying", Readiness::Pending)]
    #[case("Available", Readiness::Pending)]
    fn non_fatal_statuses(#[case] status: &str, #[case] expected: Readiness) {
        assert_eq!(Readiness::of_snapshot(status), expected);
    }

    #[rstest]
    #[case("stopped")]
    #[case("stopping")]
    #[case("deleting")]
    #[case("deleted")]
    #[case("failed")]
    #[case("FAILED")]
    #[case("incompatible-restore")]
    #[case("inaccessible-encryption-credentials")]
    #[case("storage-config-Error")]
    fn fatal_statuses(#[case] status: &str) {
        assert_eq!(
            Readiness::of_snapshot(status),
            Readiness::Failed {
                status: status.to_owned()
            }
        );
    }

    #[rstest]
    #[case("available", false, Readiness::Ready)]
    #[case("available", true, Readiness::Pending)]
    #[case("modifying", false, Readiness::Pending)]
    fn instance_readiness_accounts_for_pending_modifications(
        #[case] status: &str,
        #[case] pending: bool,
        #[case] expected: Readiness,
    ) {
        assert_eq!(Readiness::of_instance(status, pending), expected);
    }

    #[rstest]
    fn failed_instances_stay_failed_with_pending_modifications() {
        assert!(matches!(
            Readiness::of_instance("failed", true),
            Readiness::Failed { .. }
        ));
    }
}
