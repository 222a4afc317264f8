//! pimon Bridge Framework
//!
//! Common abstractions for bridges that publish host telemetry to an MQTT broker
//! in single-pass runs.
//!
//! # Overview
//!
//! This framework provides:
//! - [`BridgeConfig`] trait for configuration loading and validation
//! - [`BridgeArgs`] for common CLI argument parsing
//! - [`Broker`] trait for one broker session, with [`MqttBroker`] as the MQTT implementation
//! - [`Publisher`] for sending a planned message sequence with pacing
//!
//! # Example
//!
//! ```ignore
//! use pimon_bridge_framework::{BridgeArgs, BridgeConfig, MqttBroker, Publisher};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = BridgeArgs::parse_with_default("mybridge.json5");
//!     let config = MyBridgeConfig::load(&args.config)?;
//!
//!     let broker = MqttBroker::new(config.mqtt(), "my-client");
//!     let mut publisher = Publisher::new(broker, std::time::Duration::from_millis(500));
//!
//!     let report = publisher.run(&plan_messages(&config)).await?;
//!     tracing::info!(sent = report.sent, "Done");
//!     Ok(())
//! }
//! ```

mod args;
mod broker;
mod config;
mod error;
mod mqtt;
mod publisher;

pub use args::BridgeArgs;
pub use broker::{Broker, BrokerError, PublishErrorKind};
pub use config::{BridgeConfig, validate_mqtt};
pub use error::{BridgeError, Result};
pub use mqtt::MqttBroker;
pub use publisher::{PublishError, PublishReport, Publisher};

// Re-export commonly used types from pimon-common
pub use pimon_common::{
    LogFormat, LoggingConfig, MessageKind, MqttConfig, PublishMessage, QoS, TopicBuilder,
};
