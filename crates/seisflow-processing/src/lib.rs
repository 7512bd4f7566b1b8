//! Submission processing
//!
//! Turns the raw zip bytes of one message into a [`SubmissionRecord`](seisflow_core::models::SubmissionRecord):
//! extraction into an isolated [`SubmissionWorkspace`], config-file parsing, and
//! packaging of the processor-ready artifacts that are uploaded alongside the `.sgy` files.

pub mod archive;
pub mod error;
pub mod metadata;
pub mod pipeline;
pub mod workspace;

pub use error::PipelineError;
pub use pipeline::{ArchivePipeline, SubmissionProcessor};
pub use workspace::SubmissionWorkspace;
