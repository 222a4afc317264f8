//! Broker session abstraction.

use pimon_common::PublishMessage;
use thiserror::Error;

/// Why a broker operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishErrorKind {
    /// The broker could not be reached or refused the session.
    ConnectFailed,
    /// The broker rejected the configured credentials.
    AuthFailed,
    /// A message could not be delivered.
    SendFailed,
}

impl PublishErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublishErrorKind::ConnectFailed => "connect failed",
            PublishErrorKind::AuthFailed => "authentication failed",
            PublishErrorKind::SendFailed => "send failed",
        }
    }
}

impl std::fmt::Display for PublishErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure reported by a [`Broker`] implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct BrokerError {
    pub kind: PublishErrorKind,
    pub message: String,
}

impl BrokerError {
    pub fn connect(message: impl Into<String>) -> Self {
        Self {
            kind: PublishErrorKind::ConnectFailed,
            message: message.into(),
        }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self {
            kind: PublishErrorKind::AuthFailed,
            message: message.into(),
        }
    }

    pub fn send(message: impl Into<String>) -> Self {
        Self {
            kind: PublishErrorKind::SendFailed,
            message: message.into(),
        }
    }
}

/// One broker session, owned by a single run.
///
/// `send` must only return once the message has left the client (QoS 0) or
/// been acknowledged (QoS 1), so callers can pace sends reliably.
/// `disconnect` must be safe to call when no session is open.
#[allow(async_fn_in_trait)]
pub trait Broker {
    /// Open the session and authenticate.
    async fn connect(&mut self) -> Result<(), BrokerError>;

    /// Deliver a single message.
    async fn send(&mut self, message: &PublishMessage) -> Result<(), BrokerError>;

    /// Close the session.
    async fn disconnect(&mut self) -> Result<(), BrokerError>;
}
