//! Error taxonomy for the correction and integration pipeline.
//!
//! Every fallible operation returns `Result<T, QyError>`. The binary maps each
//! variant to a process exit code via [`QyError::exit_code`].

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QyError {
    /// Invalid option value, malformed window, or an unsupported scan layout.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A least-squares fit was underdetermined or failed to converge.
    #[error("fit error: {0}")]
    Fit(String),

    /// Two spectra that must share a wavelength grid do not.
    #[error("data alignment error: {0}")]
    DataAlignment(String),

    /// A denominator (photon count, diode signal, LUT value) evaluated to zero.
    #[error("division by zero: {0}")]
    DivideByZero(String),

    #[error("failed to read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}:{line}: {message}", path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("failed to write output: {0}")]
    Output(String),
}

impl QyError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn fit(message: impl Into<String>) -> Self {
        Self::Fit(message.into())
    }

    pub fn alignment(message: impl Into<String>) -> Self {
        Self::DataAlignment(message.into())
    }

    pub fn div_zero(message: impl Into<String>) -> Self {
        Self::DivideByZero(message.into())
    }

    pub fn parse(path: impl Into<PathBuf>, line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            line,
            message: message.into(),
        }
    }

    /// Process exit code for this error.
    ///
    /// - 2: bad input (configuration, unreadable or malformed files)
    /// - 3: inputs that cannot be combined (grid mismatch)
    /// - 4: numerical failure (fits, zero denominators, output)
    pub fn exit_code(&self) -> u8 {
        match self {
            QyError::Configuration(_) | QyError::Io { .. } | QyError::Parse { .. } => 2,
            QyError::DataAlignment(_) => 3,
            QyError::Fit(_) | QyError::DivideByZero(_) | QyError::Output(_) => 4,
        }
    }

    pub fn is_fit(&self) -> bool {
        matches!(self, QyError::Fit(_))
    }
}

impl From<csv::Error> for QyError {
    fn from(value: csv::Error) -> Self {
        QyError::Output(value.to_string())
    }
}

impl From<serde_json::Error> for QyError {
    fn from(value: serde_json::Error) -> Self {
        QyError::Output(value.to_string())
    }
}
