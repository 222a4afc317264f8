use serde::{Deserialize, Serialize};

/// Broker delivery guarantee for a single message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QoS {
    /// Fire and forget (QoS 0).
    AtMostOnce,
    /// Acknowledged delivery (QoS 1).
    AtLeastOnce,
}

impl QoS {
    /// Numeric MQTT level.
    pub fn level(&self) -> u8 {
        match self {
            QoS::AtMostOnce => 0,
            QoS::AtLeastOnce => 1,
        }
    }
}

/// What a planned message carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Sensor discovery document.
    Discovery,
    /// A single metric value.
    Value,
    /// All metric values joined into one body.
    Aggregate,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Discovery => "discovery",
            MessageKind::Value => "value",
            MessageKind::Aggregate => "aggregate",
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single message ready to be sent to the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishMessage {
    /// Message role.
    pub kind: MessageKind,

    /// Full topic the message is published to.
    pub topic: String,

    /// Raw payload bytes.
    pub payload: Vec<u8>,

    /// Delivery guarantee.
    pub qos: QoS,

    /// Whether the broker should retain the message.
    pub retain: bool,
}

impl PublishMessage {
    /// Create a discovery message (QoS 0).
    pub fn discovery(topic: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            kind: MessageKind::Discovery,
            topic: topic.into(),
            payload,
            qos: QoS::AtMostOnce,
            retain: false,
        }
    }

    /// Create a value message (QoS 1).
    pub fn value(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            kind: MessageKind::Value,
            topic: topic.into(),
            payload: payload.into(),
            qos: QoS::AtLeastOnce,
            retain: false,
        }
    }

    /// Create an aggregate message (QoS 1).
    pub fn aggregate(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            kind: MessageKind::Aggregate,
            topic: topic.into(),
            payload: payload.into(),
            qos: QoS::AtLeastOnce,
            retain: false,
        }
    }

    /// Set the retain flag.
    pub fn with_retain(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }

    /// Payload as text, replacing invalid UTF-8.
    pub fn payload_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}
