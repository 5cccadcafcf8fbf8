//! Error types for position construction and wire-format parsing.

use std::fmt;

/// Error from square notation parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SquareError {
    InvalidNotation { notation: String },
}

impl fmt::Display for SquareError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SquareError::InvalidNotation { notation } => {
                write!(f, "invalid square notation '{notation}'")
            }
        }
    }
}

impl std::error::Error for SquareError {}

/// Error from SFEN parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SfenError {
    /// The board field ran off the 9x9 grid or held an unknown character.
    InvalidBoard { sfen: String },
    /// The side-to-move field was not 'b' or 'w'.
    InvalidTurn { token: String },
    /// The hand field held an unknown character.
    InvalidHand { token: String },
    /// A required field was missing.
    MissingField { field: &'static str },
    /// The assembled position broke a rule (no king, pawn on a dead rank).
    Inconsistent { reason: &'static str },
}

impl fmt::Display for SfenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SfenError::InvalidBoard { sfen } => write!(f, "invalid SFEN board field: {sfen}"),
            SfenError::InvalidTurn { token } => write!(f, "invalid SFEN turn field: {token}"),
            SfenError::InvalidHand { token } => write!(f, "invalid SFEN hand field: {token}"),
            SfenError::MissingField { field } => write!(f, "missing SFEN field: {field}"),
            SfenError::Inconsistent { reason } => write!(f, "inconsistent SFEN position: {reason}"),
        }
    }
}

impl std::error::Error for SfenError {}

/// Error from USI move parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UsiMoveError {
    /// The token is not syntactically a USI move.
    Malformed { token: String },
    /// The move parsed but is not legal in the position.
    Illegal { token: String },
}

impl fmt::Display for UsiMoveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UsiMoveError::Malformed { token } => write!(f, "malformed USI move '{token}'"),
            UsiMoveError::Illegal { token } => write!(f, "illegal move '{token}'"),
        }
    }
}

impl std::error::Error for UsiMoveError {}
