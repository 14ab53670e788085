//! Error types for the medsafe_core library.

use std::fmt;
use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// The individual checks the engine can run.
///
/// Used to tag failures so a caller can tell which part of a composite
/// decision could not be evaluated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CheckKind {
    Interaction,
    Contraindication,
    Duplicate,
    CriticalValues,
    CareGaps,
}

impl CheckKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckKind::Interaction => "interaction",
            CheckKind::Contraindication => "contraindication",
            CheckKind::Duplicate => "duplicate",
            CheckKind::CriticalValues => "critical_values",
            CheckKind::CareGaps => "care_gaps",
        }
    }
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Core error type for medsafe_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Rule table validation error
    #[error("Rule validation error: {0}")]
    RuleValidation(String),

    /// The record store has no data for this patient
    #[error("Patient not found: {0}")]
    PatientNotFound(String),

    /// The record store could not answer a query
    #[error("Record store error: {0}")]
    RecordStore(String),

    /// A sub-check could not be evaluated because its data query failed
    #[error("{check} check failed: {source}")]
    CheckFailed {
        check: CheckKind,
        #[source]
        source: Box<Error>,
    },

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Tag an error with the check it prevented.
    pub fn in_check(self, check: CheckKind) -> Self {
        Error::CheckFailed {
            check,
            source: Box::new(self),
        }
    }

    /// The check that failed, if this error came from one.
    pub fn failed_check(&self) -> Option<CheckKind> {
        match self {
            Error::CheckFailed { check, .. } => Some(*check),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_failed_names_the_check() {
        let err = Error::RecordStore("connection refused".into()).in_check(CheckKind::Duplicate);
        assert_eq!(err.failed_check(), Some(CheckKind::Duplicate));
        let msg = err.to_string();
        assert!(msg.starts_with("duplicate check failed"), "{}", msg);
        assert!(msg.contains("connection refused"));
    }

    #[test]
    fn test_plain_errors_have_no_check() {
        assert_eq!(Error::Other("x".into()).failed_check(), None);
    }
}
