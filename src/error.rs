use thiserror::Error;

use crate::validation::ValidationError;

/// Errors raised while interpreting a spoken command.
///
/// Handlers turn most of these into a spoken reply; anything else that goes
/// wrong inside a handler is an `anyhow::Error` and is reported by the router.
#[derive(Error, Debug, PartialEq)]
pub enum CommandError {
    #[error("Invalid time format: '{0}'")]
    InvalidTime(String),

    #[error("No time given (expected '... at <time>')")]
    MissingTime,

    #[error("Unsupported media category: '{0}'")]
    UnknownCategory(String),

    #[error("Invalid input: {0}")]
    Invalid(#[from] ValidationError),
}
