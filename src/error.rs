/*!
Error types of the crate. Each concern owns a small error type; the `Error` enum wraps them so
that the pipeline and the binary can propagate everything with `?`.
*/
use crate::alignment::AlignmentParseError;
use crate::labels::LabelError;
use crate::metrics::ComputationError;
use crate::projection::ProjectionError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type of the fallible operations of this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
/// Two collections that must be parallel (same number of elements) are not.
#[error("Inconsistent length between {left_name} ({left}) and {right_name} ({right})")]
pub struct InconsistentLengthError {
    pub left_name: &'static str,
    pub left: usize,
    pub right_name: &'static str,
    pub right: usize,
}

impl InconsistentLengthError {
    pub(crate) fn new(
        left_name: &'static str,
        left: usize,
        right_name: &'static str,
        right: usize,
    ) -> Self {
        Self {
            left_name,
            left,
            right_name,
            right,
        }
    }

    /// Returns an error if `left != right`.
    pub(crate) fn check(
        left_name: &'static str,
        left: usize,
        right_name: &'static str,
        right: usize,
    ) -> std::result::Result<(), Self> {
        if left == right {
            Ok(())
        } else {
            Err(Self::new(left_name, left, right_name, right))
        }
    }
}

#[derive(Debug, Error)]
/// Loading an externally produced logit artifact failed on every attempt.
#[error("Could not load logits from {} after {attempts} attempts: {last_error}", path.display())]
pub struct ArtifactLoadError {
    pub path: PathBuf,
    pub attempts: usize,
    pub last_error: String,
}

#[derive(Debug, Error)]
/// A record does not have the expected shape.
pub enum RecordError {
    #[error("Record is missing the `{0}` column")]
    MissingField(String),
    #[error("Column `{column}` does not hold {expected}")]
    WrongType {
        column: String,
        expected: &'static str,
    },
}

#[derive(Debug, Error)]
/// Umbrella error of the crate.
pub enum Error {
    #[error(transparent)]
    Alignment(#[from] AlignmentParseError),
    #[error(transparent)]
    InconsistentLength(#[from] InconsistentLengthError),
    #[error(transparent)]
    Projection(#[from] ProjectionError),
    #[error(transparent)]
    ArtifactLoad(#[from] ArtifactLoadError),
    #[error(transparent)]
    Record(#[from] RecordError),
    #[error(transparent)]
    Labels(#[from] LabelError),
    #[error(transparent)]
    Computation(#[from] ComputationError),
    #[error("I/O error while {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON error while {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Ensembling needs the predictions of model 0")]
    MissingFirstModel,
}

impl Error {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn json(context: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Json {
            context: context.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(3, 3, true)]
    #[case(0, 0, true)]
    #[case(2, 3, false)]
    fn test_check_inconsistent_length(#[case] left: usize, #[case] right: usize, #[case] ok: bool) {
        let res = InconsistentLengthError::check("source", left, "target", right);
        assert_eq!(res.is_ok(), ok);
    }

    #[test]
    fn test_inconsistent_length_message() {
        let err = InconsistentLengthError::new("source", 2, "alignment", 3);
        assert_eq!(
            err.to_string(),
            "Inconsistent length between source (2) and alignment (3)"
        );
    }
}
