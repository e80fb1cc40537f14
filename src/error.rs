//! Error type for the acquisition shell.
//!
//! `AppError` covers the failures the shell adds around the driver:
//!
//! - **`Config`**: wraps Figment errors (missing file, parse error, wrong types).
//! - **`Configuration`**: semantically invalid values caught by
//!   [`crate::config::TdcConfig::validate`].
//! - **`Driver`**: any [`C775Error`] from the V775 driver.
//! - **`Tracing`**: the subscriber could not be installed.
//! - **`InvalidWord`**: a `decode` argument that is not a 32-bit hex word.
//!
//! Binaries convert to `anyhow::Error` at the top level.

use daq_driver_c775::C775Error;
use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, AppError>;

/// Errors raised by the acquisition shell.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("TDC error: {0}")]
    Driver(#[from] C775Error),

    #[error("Failed to initialize tracing: {0}")]
    Tracing(String),

    #[error("Invalid event word '{0}'")]
    InvalidWord(String),
}

impl From<figment::Error> for AppError {
    fn from(err: figment::Error) -> Self {
        Self::Config(Box::new(err))
    }
}
