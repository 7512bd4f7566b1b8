//! Seisflow Core Library
//!
//! Configuration, error classification and the domain models shared by the
//! ingestion worker crates.

pub mod config;
pub mod error;
pub mod models;

pub use config::{BackendConfig, BrokerConfig, Config, EmailConfig, LogFormat, Secret, SmtpTls};
pub use error::{ErrorClass, ErrorMetadata, LogLevel};
