//! Configuration error types.

use thiserror::Error;

use gridgate_core::ScheduleError;

/// Startup configuration failures. Any of these aborts the process.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("ELECTRICITY_MAP_API_KEY environment variable is required")]
    MissingApiKey,

    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },

    #[error("failed to read schedule file {path}: {source}")]
    ScheduleFileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse schedule file {path}: {message}")]
    ScheduleFileParse { path: String, message: String },

    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;
