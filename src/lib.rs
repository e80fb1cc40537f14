//! # TDC DAQ shell
//!
//! Host-side pieces around the [`daq_driver_c775`] driver:
//!
//! - **`config`**: Figment-based configuration (TOML file + `TDC_DAQ_` environment).
//! - **`tracing_setup`**: `tracing-subscriber` installation from the configuration.
//! - **`session`**: a driver bound to a simulated crate, with polled, block and
//!   interrupt-driven readout helpers used by the `tdc-daq` binary.
//! - **`error`**: the shell's `AppError`.

pub mod config;
pub mod error;
pub mod session;
pub mod tracing_setup;

pub use config::TdcConfig;
pub use error::{AppError, AppResult};
pub use session::Session;
