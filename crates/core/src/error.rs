//! Error types for rivroute
//!
//! Every error raised while building or running the routing engine names the
//! stage that failed and, where one exists, the offending pixel or input map.
//! Static drainage maps are hand-built from elevation models and the most
//! common failure is a malformed map, so that context is what gets a user to
//! the broken cell quickly.

use std::fmt;
use thiserror::Error;

/// Pipeline stage that raised an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Decoding the flow-direction map into up/downstream lookups
    NetworkBuild,
    /// Topological batching of the network
    OrderPlanning,
    /// Channel geometry, hydraulic coefficients and solver setup
    SolverConstruction,
    /// A per-substep routing call
    Routing,
    /// Reading settings or maps
    Input,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::NetworkBuild => "network build",
            Stage::OrderPlanning => "order planning",
            Stage::SolverConstruction => "solver construction",
            Stage::Routing => "routing",
            Stage::Input => "input",
        };
        f.write_str(name)
    }
}

/// Main error type for rivroute operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid raster dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Index out of bounds: ({row}, {col}) in raster of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Raster size mismatch: expected ({er}, {ec}), got ({ar}, {ac})")]
    SizeMismatch { er: usize, ec: usize, ar: usize, ac: usize },

    #[error("[{stage}] invalid flow direction code {code} at ({row}, {col})")]
    InvalidDirectionCode {
        stage: Stage,
        row: usize,
        col: usize,
        code: f64,
    },

    #[error(
        "[{stage}] cell ({row}, {col}) drains to ({target_row}, {target_col}), outside the grid"
    )]
    DownstreamOutOfBounds {
        stage: Stage,
        row: usize,
        col: usize,
        target_row: isize,
        target_col: isize,
    },

    #[error("[{stage}] cell ({row}, {col}) drains to ({target_row}, {target_col}), outside the mask")]
    DownstreamOutsideMask {
        stage: Stage,
        row: usize,
        col: usize,
        target_row: usize,
        target_col: usize,
    },

    #[error("[{stage}] pixel {pixel} has more than {limit} upstream contributors")]
    TooManyUpstream {
        stage: Stage,
        pixel: usize,
        limit: usize,
    },

    #[error(
        "[{stage}] flow network contains a cycle: {unresolved} pixels never reach an outlet (first: pixel {pixel})"
    )]
    CycleDetected {
        stage: Stage,
        unresolved: usize,
        pixel: usize,
    },

    #[error("[{stage}] invalid {name} at pixel {pixel}: {value} ({reason})")]
    InvalidPixelValue {
        stage: Stage,
        name: &'static str,
        pixel: usize,
        value: f64,
        reason: &'static str,
    },

    #[error("[{stage}] invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        stage: Stage,
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("[{stage}] {name} has {actual} values, expected {expected}")]
    LengthMismatch {
        stage: Stage,
        name: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("[{stage}] floodplain section requested but no floodplain coefficients were configured")]
    MissingFloodplain { stage: Stage },

    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),

    #[error("Thread pool error: {0}")]
    ThreadPool(String),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Stage that raised the error, when the error is stage-specific
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Error::InvalidDirectionCode { stage, .. }
            | Error::DownstreamOutOfBounds { stage, .. }
            | Error::DownstreamOutsideMask { stage, .. }
            | Error::TooManyUpstream { stage, .. }
            | Error::CycleDetected { stage, .. }
            | Error::InvalidPixelValue { stage, .. }
            | Error::InvalidParameter { stage, .. }
            | Error::LengthMismatch { stage, .. }
            | Error::MissingFloodplain { stage } => Some(*stage),
            Error::Settings(_) => Some(Stage::Input),
            _ => None,
        }
    }
}

/// Check that a per-pixel array has exactly `expected` entries.
pub fn check_len(stage: Stage, name: &'static str, expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(Error::LengthMismatch {
            stage,
            name,
            expected,
            actual,
        });
    }
    Ok(())
}

/// Result type alias for rivroute operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_in_message() {
        let err = Error::InvalidPixelValue {
            stage: Stage::SolverConstruction,
            name: "alpha",
            pixel: 17,
            value: -1.0,
            reason: "must be strictly positive",
        };
        let msg = err.to_string();
        assert!(msg.contains("solver construction"), "got: {}", msg);
        assert!(msg.contains("pixel 17"), "got: {}", msg);
        assert_eq!(err.stage(), Some(Stage::SolverConstruction));
    }

    #[test]
    fn test_check_len() {
        assert!(check_len(Stage::Routing, "sideflow", 4, 4).is_ok());
        let err = check_len(Stage::Routing, "sideflow", 4, 3).unwrap_err();
        assert!(matches!(
            err,
            Error::LengthMismatch { expected: 4, actual: 3, .. }
        ));
    }
}
