//! Error kinds of a filtering run.
//!
//! Archive codec internals report `anyhow` errors; the pipeline boxes them
//! into the variant describing which stage failed.

use std::error::Error as StdError;
use thiserror::Error;

pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum ConvertError {
    /// A required setting was not supplied.
    #[error("missing required setting {0}")]
    Configuration(&'static str),

    /// The name pattern does not compile. Recovered by keeping the previous pattern.
    #[error("invalid name pattern {pattern:?}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// The source cannot be opened or its central directory cannot be parsed.
    #[error("cannot open source archive")]
    ArchiveOpen(#[source] BoxError),

    #[error("cancelled before all entries were processed")]
    Cancelled,

    #[error("failed to copy entry {name}")]
    Copy {
        name: String,
        #[source]
        source: BoxError,
    },

    /// Writing the destination central directory or flushing it failed.
    #[error("failed to finalize destination archive")]
    Finalize(#[source] BoxError),

    /// Several failures from one run, in the order they happened.
    #[error("{}", render_joined(.0))]
    Joined(Vec<ConvertError>),
}

impl ConvertError {
    /// Combine a run result with the result of finalizing its destination.
    ///
    /// Neither error is dropped: when both fail the result is [`ConvertError::Joined`].
    pub fn join<T>(
        run: Result<T, ConvertError>,
        finalize: Result<(), ConvertError>,
    ) -> Result<T, ConvertError> {
        match (run, finalize) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(err)) | (Err(err), Ok(())) => Err(err),
            (Err(first), Err(second)) => {
                let mut errors = Vec::new();
                for err in [first, second] {
                    match err {
                        ConvertError::Joined(inner) => errors.extend(inner),
                        other => errors.push(other),
                    }
                }
                Err(ConvertError::Joined(errors))
            }
        }
    }

    /// Whether the run stopped because it was cancelled.
    pub fn is_cancelled(&self) -> bool {
        match self {
            ConvertError::Cancelled => true,
            ConvertError::Joined(errors) => errors.iter().any(ConvertError::is_cancelled),
            _ => false,
        }
    }
}

/// Render an error followed by its sources, separated by `": "`.
pub fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}

fn render_joined(errors: &[ConvertError]) -> String {
    errors
        .iter()
        .map(|err| error_chain(err))
        .collect::<Vec<_>>()
        .join("\n")
}
