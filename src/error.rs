//! Errors for the integrator core and its function framework

use thiserror::Error;

use crate::{Float, integrator::Phase, options::OptionType};

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Validation and evaluation errors.
///
/// Everything here is fatal for the object that reported it: an integrator
/// whose `init` failed must not be used.
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("wrong number of inputs for the {callback} callback function: expected {expected}, got {got}")]
    InputCount {
        callback: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("wrong number of outputs for the {callback} callback function: expected {expected}, got {got}")]
    OutputCount {
        callback: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("inconsistent dimensions: expecting {what} of shape {expected:?}, but got {got:?} instead")]
    ShapeMismatch {
        what: String,
        expected: (usize, usize),
        got: (usize, usize),
    },
    #[error("sparsity mismatch: {0}")]
    SparsityMismatch(String),
    #[error("{0} must be a column vector")]
    NotColumn(String),
    #[error("function {function} expects {expected} arguments, got {got}")]
    ArgumentCount {
        function: String,
        expected: usize,
        got: usize,
    },
    #[error("free symbol '{0}' is not an input of the function")]
    FreeSymbol(String),
    #[error("input {0} is not purely symbolic")]
    NonSymbolicInput(usize),
    #[error("internal consistency failure: {0}")]
    Internal(String),
    #[error("{operation} is not valid in phase {phase:?}")]
    Lifecycle {
        operation: &'static str,
        phase: Phase,
    },
    #[error("unknown option: {0}")]
    UnknownOption(String),
    #[error("option '{name}' expects type {expected:?}")]
    OptionType { name: String, expected: OptionType },
    #[error("option '{0}' has not been set")]
    OptionNotSet(String),
    #[error("invalid value for option '{name}': {reason}")]
    InvalidOption { name: String, reason: String },
    #[error("singular matrix in solve")]
    SingularMatrix,
    #[error("Newton iteration for the algebraic states did not converge at t = {t} (residual {residual})")]
    NewtonFailure { t: Float, residual: Float },
}
