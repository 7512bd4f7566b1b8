//! Submission ingestion worker.
//!
//! [`QueueConsumer`] keeps a durable AMQP subscription alive and hands each message
//! body to [`SubmissionHandler`], which runs extract → upload → notify inside an
//! isolated workspace and always reports an outcome instead of an error.

pub mod consumer;
pub mod handler;

pub use consumer::{ConnectionState, ConsumerError, QueueConsumer};
pub use handler::{MessageOutcome, SubmissionHandler};
