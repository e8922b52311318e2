//! Error handling for SPSS conversion operations.
//!
//! Every failure of a conversion maps onto one [`ConvertError`] variant. The
//! variant's [`ErrorKind`] is the failure descriptor reported to callers and
//! determines the process exit code.

use crate::models::OutputFormat;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("Error reading the .sav file: {reason}")]
    Parse { reason: String },

    #[error(
        "File '{}' already exists. Enable overwrite or rename your output file.",
        .path.display()
    )]
    DestinationExists { path: PathBuf },

    #[error("Error writing the {format} file '{}': {reason}", .path.display())]
    Write {
        format: OutputFormat,
        path: PathBuf,
        reason: String,
    },

    #[error("Cannot read input file '{}': {source}", .path.display())]
    Input {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Conversion interrupted: {reason}")]
    Interrupted { reason: String },

    #[error("Internal error: {reason}")]
    Internal { reason: String },
}

pub type Result<T> = std::result::Result<T, ConvertError>;

/// Failure category of a conversion, independent of the message text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    ParseError,
    DestinationExistsError,
    WriteError,
    InputError,
    ConfigurationError,
    Interrupted,
    InternalError,
}

impl ErrorKind {
    /// Process exit code used by the command-line binary
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorKind::ParseError => 2,
            ErrorKind::DestinationExistsError => 3,
            ErrorKind::WriteError => 4,
            ErrorKind::InputError => 5,
            ErrorKind::ConfigurationError => 6,
            ErrorKind::Interrupted => 130,
            ErrorKind::InternalError => 70,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::ParseError => "ParseError",
            ErrorKind::DestinationExistsError => "DestinationExistsError",
            ErrorKind::WriteError => "WriteError",
            ErrorKind::InputError => "InputError",
            ErrorKind::ConfigurationError => "ConfigurationError",
            ErrorKind::Interrupted => "Interrupted",
            ErrorKind::InternalError => "InternalError",
        };
        f.write_str(name)
    }
}

impl ConvertError {
    /// Create a parse error carrying the reader's diagnostic
    pub fn parse(reason: impl Into<String>) -> Self {
        Self::Parse {
            reason: reason.into(),
        }
    }

    /// Create a destination-exists error
    pub fn destination_exists(path: impl Into<PathBuf>) -> Self {
        Self::DestinationExists { path: path.into() }
    }

    /// Create a write error for the given output
    pub fn write(format: OutputFormat, path: &Path, reason: impl fmt::Display) -> Self {
        Self::Write {
            format,
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }

    /// Create an input error
    pub fn input(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Input {
            path: path.into(),
            source,
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an interrupted error
    pub fn interrupted(reason: impl Into<String>) -> Self {
        Self::Interrupted {
            reason: reason.into(),
        }
    }

    /// Create an internal error for a failure that is not the input's fault
    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal {
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ConvertError::Parse { .. } => ErrorKind::ParseError,
            ConvertError::DestinationExists { .. } => ErrorKind::DestinationExistsError,
            ConvertError::Write { .. } => ErrorKind::WriteError,
            ConvertError::Input { .. } => ErrorKind::InputError,
            ConvertError::Configuration { .. } => ErrorKind::ConfigurationError,
            ConvertError::Interrupted { .. } => ErrorKind::Interrupted,
            ConvertError::Internal { .. } => ErrorKind::InternalError,
        }
    }
}
