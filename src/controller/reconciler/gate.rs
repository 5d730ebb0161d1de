//! # Readiness Gate
//!
//! Tri-state outcome of a single prerequisite check.
//!
//! Each check in the dependency pipeline returns a [`GateOutcome`]. The
//! reconciler converts it with [`GateOutcome::into_result`] so a sequence of
//! checks short-circuits with `?` on the first one that does not proceed.

use std::fmt::Display;

/// Result of one prerequisite check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome<T> {
    /// The prerequisite is satisfied
    Proceed(T),
    /// Not satisfied yet; a watch event will retrigger the reconcile
    Wait { reason: String, detail: String },
    /// Satisfied incorrectly or unreadable; reported as a failure
    Fail { reason: String, cause: String },
}

/// Why the dependency pipeline stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Halt {
    Wait { reason: String, detail: String },
    Fail { reason: String, cause: String },
}

impl<T> GateOutcome<T> {
    pub fn wait(reason: impl Into<String>, detail: impl Into<String>) -> Self {
        GateOutcome::Wait {
            reason: reason.into(),
            detail: detail.into(),
        }
    }

    pub fn fail(reason: impl Into<String>, cause: impl Display) -> Self {
        GateOutcome::Fail {
            reason: reason.into(),
            cause: cause.to_string(),
        }
    }

    #[allow(
        clippy::missing_errors_doc,
        reason = "Error documentation is provided in doc comments"
    )]
    pub fn into_result(self) -> Result<T, Halt> {
        match self {
            GateOutcome::Proceed(value) => Ok(value),
            GateOutcome::Wait { reason, detail } => Err(Halt::Wait { reason, detail }),
            GateOutcome::Fail { reason, cause } => Err(Halt::Fail { reason, cause }),
        }
    }
}

/// Turn a fallible lookup into a gate outcome that fails with `reason`
pub trait OrFail<T> {
    fn or_fail(self, reason: &str) -> GateOutcome<T>;
}

impl<T, E: Display> OrFail<T> for Result<T, E> {
    fn or_fail(self, reason: &str) -> GateOutcome<T> {
        match self {
            Ok(value) => GateOutcome::Proceed(value),
            Err(e) => GateOutcome::fail(reason, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_or_fail_keeps_cause() {
        let outcome: GateOutcome<u8> = Err::<u8, _>("boom").or_fail("Error retrieving tenant key");
        assert_eq!(
            outcome.into_result(),
            Err(Halt::Fail {
                reason: "Error retrieving tenant key".to_string(),
                cause: "boom".to_string(),
            })
        );
    }

    #[test]
    fn test_first_halt_short_circuits() {
        fn pipeline(steps: Vec<GateOutcome<u8>>) -> Result<Vec<u8>, Halt> {
            steps.into_iter().map(GateOutcome::into_result).collect()
        }

        let halted = pipeline(vec![
            GateOutcome::Proceed(1),
            GateOutcome::wait("Waiting for internal manager tls certificate to be available", ""),
            GateOutcome::fail("never reached", "x"),
        ]);
        assert_eq!(
            halted,
            Err(Halt::Wait {
                reason: "Waiting for internal manager tls certificate to be available".to_string(),
                detail: String::new(),
            })
        );
    }
}
