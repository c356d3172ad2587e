//! Error types for matching and mapping registration.

use uuid::Uuid;

/// Errors produced while building or evaluating a matcher.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MatchError {
    #[error("{matcher}: invalid input: {reason}")]
    InvalidInput {
        matcher: &'static str,
        reason: String,
    },
    #[error("{matcher}: invalid pattern: {reason}")]
    InvalidPattern {
        matcher: &'static str,
        reason: String,
    },
    #[error("Unknown matcher kind: {0}")]
    UnknownMatcher(String),
}

impl MatchError {
    pub(crate) fn input(matcher: &'static str, reason: impl ToString) -> Self {
        MatchError::InvalidInput {
            matcher,
            reason: reason.to_string(),
        }
    }

    /// Kind tag of the matcher that raised the error.
    pub fn matcher_name(&self) -> &str {
        match self {
            MatchError::InvalidInput { matcher, .. } | MatchError::InvalidPattern { matcher, .. } => {
                matcher
            }
            MatchError::UnknownMatcher(name) => name,
        }
    }

    pub(crate) fn pattern(matcher: &'static str, reason: impl ToString) -> Self {
        MatchError::InvalidPattern {
            matcher,
            reason: reason.to_string(),
        }
    }
}

/// Errors raised when a mapping is built, registered or looked up.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MappingError {
    #[error("Mapping {0}: a state condition requires a scenario name")]
    StateWithoutScenario(Uuid),
    #[error("Mapping {id}: probability {value} is outside [0, 1]")]
    InvalidProbability { id: Uuid, value: f64 },
    #[error("Mapping {0} not found")]
    NotFound(Uuid),
    #[error("Duplicate mapping id {0} in batch")]
    DuplicateId(Uuid),
    #[error("Invalid mapping id '{0}'")]
    InvalidId(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error(transparent)]
    Matcher(#[from] MatchError),
}
