//! Error types.
//!
//! Library code returns [`TecanError`]; the binary edge converts it into an
//! [`AppError`], which only carries a message and a process exit code.

use std::path::Path;

use thiserror::Error;

/// Result alias for library operations.
pub type Result<T> = std::result::Result<T, TecanError>;

/// The solver could not settle on parameters for one well.
///
/// This is per-well: the pipeline records it in the report and moves on.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("fit did not converge after {iterations} iterations: {reason}")]
pub struct FitFailure {
    pub iterations: usize,
    pub reason: String,
}

/// Everything that can go wrong while reading or reducing a Tecan export.
#[derive(Debug, Error)]
pub enum TecanError {
    /// A table block never collected all of its well/time/mean rows.
    #[error("malformed input at line {line}: {message}")]
    MalformedInput { line: usize, message: String },

    /// A row that must be numeric is not.
    #[error("unexpected format at line {line}: {message}")]
    UnexpectedFormat { line: usize, message: String },

    #[error(transparent)]
    FitFailure(#[from] FitFailure),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{context}: {source}")]
    Csv {
        context: String,
        #[source]
        source: csv::Error,
    },

    #[error("failed to write JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl TecanError {
    pub fn malformed(line: usize, message: impl Into<String>) -> Self {
        Self::MalformedInput {
            line,
            message: message.into(),
        }
    }

    pub fn unexpected(line: usize, message: impl Into<String>) -> Self {
        Self::UnexpectedFormat {
            line,
            message: message.into(),
        }
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Shorthand for I/O failures tied to a path.
    pub fn io_path(action: &str, path: &Path, source: std::io::Error) -> Self {
        Self::io(format!("Failed to {action} '{}'", path.display()), source)
    }

    pub fn csv(context: impl Into<String>, source: csv::Error) -> Self {
        Self::Csv {
            context: context.into(),
            source,
        }
    }
}

/// Error surfaced by the `tecan` binary: a message plus an exit code.
#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    /// Usage problems (missing input, `--info`) exit with status 1.
    pub fn usage(message: impl Into<String>) -> Self {
        Self::new(1, message)
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl From<TecanError> for AppError {
    fn from(err: TecanError) -> Self {
        let code = match err {
            TecanError::FitFailure(_) => 4,
            _ => 2,
        };
        AppError::new(code, err.to_string())
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}
