//! Paced, single-session publisher.

use std::time::Duration;

use pimon_common::PublishMessage;
use thiserror::Error;

use crate::broker::{Broker, BrokerError, PublishErrorKind};

/// Outcome of one publish run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PublishReport {
    /// Messages delivered.
    pub sent: usize,
    /// Messages whose delivery failed (at most one, since a failure aborts the run).
    pub failed: usize,
    /// Messages never attempted.
    pub not_attempted: usize,
}

impl PublishReport {
    /// Report for a run of `planned` messages before anything was sent.
    pub fn pending(planned: usize) -> Self {
        Self {
            sent: 0,
            failed: 0,
            not_attempted: planned,
        }
    }

    /// Total number of planned messages.
    pub fn total(&self) -> usize {
        self.sent + self.failed + self.not_attempted
    }

    /// True when every planned message was delivered.
    pub fn is_complete(&self) -> bool {
        self.failed == 0 && self.not_attempted == 0
    }

    fn record_sent(&mut self) {
        self.sent += 1;
        self.not_attempted -= 1;
    }

    fn record_failed(&mut self) {
        self.failed += 1;
        self.not_attempted -= 1;
    }
}

/// A run that stopped early. Messages already sent are not rolled back.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message} (sent {sent} of {total})", sent = .report.sent, total = .report.total())]
pub struct PublishError {
    pub kind: PublishErrorKind,
    pub message: String,
    /// Progress at the moment of failure.
    pub report: PublishReport,
}

impl PublishError {
    fn new(err: BrokerError, report: PublishReport) -> Self {
        Self {
            kind: err.kind,
            message: err.message,
            report,
        }
    }
}

/// Sends a planned message sequence over one broker session.
///
/// Opens the session once, sends messages strictly in order with a fixed
/// pause between consecutive sends, and always closes the session, even when
/// connecting or sending fails. Nothing is retried.
pub struct Publisher<B> {
    broker: B,
    pacing: Duration,
}

impl<B: Broker> Publisher<B> {
    /// Create a publisher that waits `pacing` between consecutive sends.
    pub fn new(broker: B, pacing: Duration) -> Self {
        Self { broker, pacing }
    }

    /// Get a reference to the underlying broker.
    pub fn broker(&self) -> &B {
        &self.broker
    }

    /// Consume the publisher and return the broker.
    pub fn into_broker(self) -> B {
        self.broker
    }

    /// Publish `messages` in order over a single session.
    pub async fn run(&mut self, messages: &[PublishMessage]) -> Result<PublishReport, PublishError> {
        let mut report = PublishReport::pending(messages.len());

        if let Err(e) = self.broker.connect().await {
            tracing::error!(error = %e, "Failed to open broker session");
            self.close().await;
            return Err(PublishError::new(e, report));
        }

        let mut failure = None;

        for (index, message) in messages.iter().enumerate() {
            if index > 0 && !self.pacing.is_zero() {
                tokio::time::sleep(self.pacing).await;
            }

            match self.broker.send(message).await {
                Ok(()) => {
                    tracing::debug!(
                        kind = %message.kind,
                        topic = %message.topic,
                        qos = message.qos.level(),
                        "Published"
                    );
                    report.record_sent();
                }
                Err(e) => {
                    tracing::warn!(topic = %message.topic, error = %e, "Failed to publish");
                    report.record_failed();
                    failure = Some(e);
                    break;
                }
            }
        }

        self.close().await;

        match failure {
            Some(e) => Err(PublishError::new(e, report)),
            None => Ok(report),
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.broker.disconnect().await {
            tracing::warn!(error = %e, "Error closing broker session");
        }
    }
}
