use std::path::PathBuf;

use thiserror::Error;

/// Errors returned by the public entry points of this crate.
///
/// `SUCCESS` from the distilled spec's error taxonomy is simply
/// `Result::Ok` everywhere in this crate; every other listed code has a
/// variant here.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("scanning timed out")]
    Timeout,

    #[error("the matches arena ran out of capacity")]
    MatchesLimitExceeded,

    #[error("the user callback returned an error")]
    CallbackError,

    #[error("condition evaluation failed: {0}")]
    ConditionEvaluation(String),

    #[error("could not read rule set file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not deserialize rule set: {0}")]
    Deserialize(#[from] bincode::Error),

    #[error("external variable `{0}` has the wrong type")]
    VariableTypeMismatch(String),
}

pub type Result<T> = std::result::Result<T, ScanError>;
