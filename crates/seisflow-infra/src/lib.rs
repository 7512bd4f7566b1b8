//! Seisflow Infrastructure Library
//!
//! Shared infrastructure for the ingestion worker:
//! - Telemetry initialization (text or JSON `tracing` output)
//! - Outbound email and the post-upload notification templates

pub mod notify;
pub mod telemetry;

pub use notify::{
    EmailService, Mailer, NoopMailer, NotificationDispatcher, NotifyError, OutboundEmail,
};
pub use telemetry::init_telemetry;
