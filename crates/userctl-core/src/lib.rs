//! # userctl-core
//!
//! Core types shared by the userctl crates.
//!
//! ## Modules
//!
//! - [`error`] - Error taxonomy for directory operations
//! - [`config`] - Connection configuration and bind credentials

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;

// Re-export commonly used types
pub use config::{BindCredentials, DirectoryConfig, TransportSecurity};
pub use error::{Error, Result};
