use crate::models::Axis;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for survey operations
pub type Result<T> = std::result::Result<T, SurveyError>;

/// Failures reported by the survey core
#[derive(Error, Debug)]
pub enum SurveyError {
    /// Tester id is empty or contains non-alphanumeric characters
    #[error("invalid tester id {id:?}: {reason}")]
    InvalidIdentity { id: String, reason: &'static str },

    /// One or more rating axes were left unset at submit time
    #[error("please rate {} before submitting", join_axes(.missing))]
    IncompleteRating { missing: Vec<Axis> },

    /// Submit was attempted after every item of the batch has been scored
    #[error("evaluation already finished for tester {tester_id}")]
    SessionFinished { tester_id: String },

    /// A numeric value or label outside the nine-level scale
    #[error("not a valid score: {0:?}")]
    InvalidScore(String),

    /// A batch source file is unreadable or missing required columns
    #[error("malformed dataset {}: {message}", .path.display())]
    DatasetFormat { path: PathBuf, message: String },

    /// Reading or writing a progress record or result artifact failed
    #[error("failed to {action} {}", .path.display())]
    Persistence {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl SurveyError {
    /// Whether the tester can fix this by correcting their input
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SurveyError::InvalidIdentity { .. }
                | SurveyError::IncompleteRating { .. }
                | SurveyError::SessionFinished { .. }
                | SurveyError::InvalidScore(_)
        )
    }

    pub(crate) fn persistence(
        action: &'static str,
        path: impl Into<PathBuf>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        SurveyError::Persistence {
            action,
            path: path.into(),
            source: source.into(),
        }
    }

    pub(crate) fn dataset(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        SurveyError::DatasetFormat {
            path: path.into(),
            message: message.into(),
        }
    }
}

fn join_axes(axes: &[Axis]) -> String {
    axes.iter()
        .map(|axis| axis.name().to_uppercase())
        .collect::<Vec<_>>()
        .join(", ")
}
