//! Unified error type for the technician-routing solver.
//!
//! Domain errors from parsing, the external LP/MIP engine and the search
//! layers all convert into [`TrpError`] so they can be handled uniformly at
//! API boundaries. An empty pricing pool is *not* an error: pricing reports
//! it through its return value and the caller treats the vehicle as idle.

use thiserror::Error;

/// Unified error type for all solver operations.
#[derive(Error, Debug)]
pub enum TrpError {
    /// I/O errors (file access, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Instance document malformed: missing keys, inconsistent teams,
    /// windows tighter than durations. Fatal at parse time.
    #[error("malformed instance: {0}")]
    InstanceMalformed(String),

    /// The external LP/MIP engine failed or returned an unusable status.
    #[error("solver error: {0}")]
    Solver(String),

    /// The restricted master problem is infeasible under the current cuts.
    #[error("master problem infeasible: {0}")]
    MasterInfeasible(String),

    /// A wall-clock budget was exhausted.
    #[error("time limit reached: {0}")]
    TimeLimit(String),

    /// An internal invariant was violated (route feasibility, elementarity,
    /// LP monotonicity). Indicates an implementation bug.
    #[error("assertion violated: {0}")]
    Assertion(String),

    /// Generic errors (for wrapping external errors)
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Results using TrpError.
pub type TrpResult<T> = Result<T, TrpError>;

impl From<anyhow::Error> for TrpError {
    fn from(err: anyhow::Error) -> Self {
        TrpError::Other(err.to_string())
    }
}

impl From<String> for TrpError {
    fn from(s: String) -> Self {
        TrpError::Other(s)
    }
}

impl From<&str> for TrpError {
    fn from(s: &str) -> Self {
        TrpError::Other(s.to_string())
    }
}
