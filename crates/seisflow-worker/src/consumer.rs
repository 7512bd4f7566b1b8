//! AMQP connection lifecycle and the consume loop.
//!
//! Disconnected → Connected (connection, channel, durable queue declared) → Consuming.
//! Any broker-level error drops back to Disconnected and reconnects after a fixed
//! backoff. The loop only ends when the shutdown channel fires, and never while a
//! message is being handled.

use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicQosOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{Channel, Connection, ConnectionProperties, Consumer};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use seisflow_core::{BrokerConfig, ErrorClass, ErrorMetadata};

use crate::handler::SubmissionHandler;

const CONSUMER_TAG: &str = "seisflow-worker";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
    Consuming,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connected => "connected",
            ConnectionState::Consuming => "consuming",
        };
        f.write_str(s)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConsumerError {
    #[error("AMQP error: {0}")]
    Amqp(#[from] lapin::Error),

    #[error("Broker connection attempt timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("Broker closed the delivery stream")]
    StreamClosed,
}

impl ErrorMetadata for ConsumerError {
    fn class(&self) -> ErrorClass {
        ErrorClass::Transient
    }

    fn error_code(&self) -> &'static str {
        match self {
            ConsumerError::Amqp(_) => "BROKER_AMQP",
            ConsumerError::ConnectTimeout(_) => "BROKER_CONNECT_TIMEOUT",
            ConsumerError::StreamClosed => "BROKER_STREAM_CLOSED",
        }
    }
}

struct Session {
    connection: Connection,
    channel: Channel,
}

impl Session {
    async fn close(self, reason: &str) {
        if let Err(e) = self.channel.close(200, reason).await {
            tracing::debug!(error = %e, "Channel close failed");
        }
        if let Err(e) = self.connection.close(200, reason).await {
            tracing::debug!(error = %e, "Connection close failed");
        }
    }
}

pub struct QueueConsumer {
    config: BrokerConfig,
    handler: Arc<SubmissionHandler>,
    state: ConnectionState,
    connect_attempts: u64,
}

impl QueueConsumer {
    pub fn new(config: BrokerConfig, handler: Arc<SubmissionHandler>) -> Self {
        Self {
            config,
            handler,
            state: ConnectionState::Disconnected,
            connect_attempts: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Connection attempts made since `run` started, successful or not.
    pub fn connect_attempts(&self) -> u64 {
        self.connect_attempts
    }

    fn transition(&mut self, next: ConnectionState) {
        if self.state != next {
            tracing::info!(from = %self.state, to = %next, "Broker connection state changed");
            self.state = next;
        }
    }

    /// Run until `shutdown_rx` receives a value (or its senders are dropped).
    pub async fn run(&mut self, mut shutdown_rx: mpsc::Receiver<()>) -> Result<(), ConsumerError> {
        tracing::info!(
            broker = %self.config.redacted_uri(),
            queue = %self.config.queue_name,
            prefetch = self.config.prefetch,
            "Queue consumer starting"
        );

        loop {
            self.connect_attempts += 1;
            let connected = tokio::select! {
                _ = shutdown_rx.recv() => break,
                result = self.connect() => result,
            };

            match connected {
                Ok((session, consumer)) => {
                    self.transition(ConnectionState::Connected);
                    self.transition(ConnectionState::Consuming);
                    match self.consume(consumer, &mut shutdown_rx).await {
                        Ok(()) => {
                            session.close("shutdown").await;
                            self.transition(ConnectionState::Disconnected);
                            break;
                        }
                        Err(e) => {
                            tracing::warn!(
                                error = %e,
                                error_code = e.error_code(),
                                "Lost broker connection"
                            );
                            session.close("reconnecting").await;
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        error_code = e.error_code(),
                        attempt = self.connect_attempts,
                        "Failed to connect to broker"
                    );
                }
            }

            self.transition(ConnectionState::Disconnected);
            tracing::info!(
                backoff_secs = self.config.reconnect_backoff.as_secs_f64(),
                "Reconnecting to broker after backoff"
            );
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                _ = tokio::time::sleep(self.config.reconnect_backoff) => {}
            }
        }

        tracing::info!("Queue consumer stopped");
        Ok(())
    }

    async fn connect(&self) -> Result<(Session, Consumer), ConsumerError> {
        let uri = self.config.amqp_uri();
        let connection = tokio::time::timeout(
            self.config.connect_timeout,
            Connection::connect(&uri, ConnectionProperties::default()),
        )
        .await
        .map_err(|_| ConsumerError::ConnectTimeout(self.config.connect_timeout))??;

        let channel = connection.create_channel().await?;
        channel
            .basic_qos(self.config.prefetch, BasicQosOptions::default())
            .await?;
        let queue = channel
            .queue_declare(
                &self.config.queue_name,
                QueueDeclareOptions {
                    durable: true,
                    exclusive: false,
                    auto_delete: false,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await?;
        tracing::info!(
            queue = %self.config.queue_name,
            messages = queue.message_count(),
            consumers = queue.consumer_count(),
            "Queue declared"
        );

        let consumer = channel
            .basic_consume(
                &self.config.queue_name,
                CONSUMER_TAG,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        Ok((
            Session {
                connection,
                channel,
            },
            consumer,
        ))
    }

    /// Handle deliveries one at a time: process, then ack. `Ok` means shutdown was requested.
    async fn consume(
        &self,
        mut consumer: Consumer,
        shutdown_rx: &mut mpsc::Receiver<()>,
    ) -> Result<(), ConsumerError> {
        loop {
            let next = tokio::select! {
                _ = shutdown_rx.recv() => return Ok(()),
                next = consumer.next() => next,
            };

            let mut delivery = match next {
                Some(delivery) => delivery?,
                None => return Err(ConsumerError::StreamClosed),
            };

            tracing::debug!(
                delivery_tag = delivery.delivery_tag,
                redelivered = delivery.redelivered,
                "Received delivery"
            );
            let body = std::mem::take(&mut delivery.data);
            let outcome = self.handler.handle(body).await;

            delivery.acker.ack(BasicAckOptions::default()).await?;
            tracing::debug!(
                delivery_tag = delivery.delivery_tag,
                success = outcome.is_success(),
                "Delivery acknowledged"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use seisflow_api_client::{ProjectUploader, UploadError};
    use seisflow_core::models::{ProjectCreated, SubmissionRecord};
    use seisflow_core::Secret;
    use seisflow_infra::{NoopMailer, NotificationDispatcher};
    use seisflow_processing::ArchivePipeline;
    use std::time::Instant;

    struct RejectingUploader;

    #[async_trait]
    impl ProjectUploader for RejectingUploader {
        async fn upload(&self, _record: &SubmissionRecord) -> Result<ProjectCreated, UploadError> {
            Err(UploadError::Unauthorized)
        }
    }

    fn unreachable_broker(reconnect_backoff: Duration) -> BrokerConfig {
        BrokerConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            virtual_host: "/".to_string(),
            username: "guest".to_string(),
            password: Secret::new("guest"),
            queue_name: "submissions".to_string(),
            connect_timeout: Duration::from_secs(2),
            reconnect_backoff,
            prefetch: 1,
        }
    }

    fn consumer(config: BrokerConfig, work_dir: &std::path::Path) -> QueueConsumer {
        let notifier = Arc::new(NotificationDispatcher::new(
            Arc::new(NoopMailer),
            vec![],
            vec![],
            "http://localhost:8000",
        ));
        let handler = Arc::new(SubmissionHandler::new(
            Arc::new(ArchivePipeline::new()),
            Arc::new(RejectingUploader),
            notifier,
            work_dir,
        ));
        QueueConsumer::new(config, handler)
    }

    #[tokio::test]
    async fn unreachable_broker_backs_off_until_shutdown() {
        let work_dir = tempfile::tempdir().unwrap();
        let mut consumer = consumer(
            unreachable_broker(Duration::from_millis(300)),
            work_dir.path(),
        );
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            let _ = shutdown_tx.send(()).await;
        });

        let started = Instant::now();
        let result = tokio::time::timeout(Duration::from_secs(5), consumer.run(shutdown_rx)).await;
        let elapsed = started.elapsed();

        assert!(matches!(result, Ok(Ok(()))));
        assert!(elapsed >= Duration::from_millis(900));
        assert!(elapsed < Duration::from_secs(3));
        assert_eq!(consumer.state(), ConnectionState::Disconnected);
        // Retries keep happening, but the backoff keeps them from hot-looping.
        assert!(consumer.connect_attempts() >= 2);
        assert!(consumer.connect_attempts() <= 6);
    }

    #[tokio::test]
    async fn dropped_shutdown_sender_stops_run() {
        let work_dir = tempfile::tempdir().unwrap();
        let mut consumer = consumer(
            unreachable_broker(Duration::from_secs(60)),
            work_dir.path(),
        );
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        drop(shutdown_tx);

        let result = tokio::time::timeout(Duration::from_secs(5), consumer.run(shutdown_rx)).await;

        assert!(matches!(result, Ok(Ok(()))));
        assert_eq!(consumer.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn broker_errors_are_transient() {
        let err = ConsumerError::ConnectTimeout(Duration::from_secs(10));
        assert!(err.is_recoverable());
        assert_eq!(err.error_code(), "BROKER_CONNECT_TIMEOUT");
        assert!(ConsumerError::StreamClosed.is_recoverable());
    }

    #[test]
    fn state_display() {
        assert_eq!(ConnectionState::Consuming.to_string(), "consuming");
        assert_eq!(ConnectionState::Disconnected.to_string(), "disconnected");
    }
}
