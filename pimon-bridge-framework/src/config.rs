//! Configuration traits and utilities.

use std::path::Path;

use serde::de::DeserializeOwned;

use crate::error::{BridgeError, Result};
use crate::{LoggingConfig, MqttConfig};

/// Trait for bridge configuration types.
///
/// Implement this trait for your bridge's configuration struct to get
/// automatic loading, validation, and access to common config fields.
///
/// # Example
///
/// ```ignore
/// use serde::Deserialize;
/// use pimon_bridge_framework::{BridgeConfig, MqttConfig, LoggingConfig};
///
/// #[derive(Debug, Deserialize)]
/// pub struct MyBridgeConfig {
///     pub mqtt: MqttConfig,
///     pub logging: LoggingConfig,
/// }
///
/// impl BridgeConfig for MyBridgeConfig {
///     fn mqtt(&self) -> &MqttConfig {
///         &self.mqtt
///     }
///
///     fn logging(&self) -> &LoggingConfig {
///         &self.logging
///     }
/// }
/// ```
pub trait BridgeConfig: Sized + DeserializeOwned {
    /// Get the broker configuration.
    fn mqtt(&self) -> &MqttConfig;

    /// Get the logging configuration.
    fn logging(&self) -> &LoggingConfig;

    /// Validate the configuration.
    ///
    /// Called automatically after loading. Override to add custom validation,
    /// but keep the broker checks by calling [`validate_mqtt`].
    fn validate(&self) -> Result<()> {
        validate_mqtt(self.mqtt())
    }

    /// Load configuration from a file path.
    ///
    /// Supports JSON5 format. Calls [`validate`](Self::validate) after loading.
    fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(BridgeError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path)?;
        let config: Self = json5::from_str(&content)?;

        config.validate()?;

        Ok(config)
    }
}

/// Broker settings every bridge needs before it may connect.
pub fn validate_mqtt(mqtt: &MqttConfig) -> Result<()> {
    if mqtt.host.trim().is_empty() {
        return Err(BridgeError::validation("mqtt.host must not be empty"));
    }
    if mqtt.port == 0 {
        return Err(BridgeError::validation("mqtt.port must be > 0"));
    }
    if mqtt.keep_alive_secs < 5 {
        return Err(BridgeError::validation("mqtt.keep_alive_secs must be >= 5"));
    }
    if mqtt.timeout_secs == 0 {
        return Err(BridgeError::validation("mqtt.timeout_secs must be > 0"));
    }
    if mqtt.password.is_some() && mqtt.username.is_none() {
        return Err(BridgeError::validation(
            "mqtt.password is set but mqtt.username is missing",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::io::Write;

    #[derive(Debug, Deserialize)]
    struct TestConfig {
        #[serde(default)]
        mqtt: MqttConfig,
        #[serde(default)]
        logging: LoggingConfig,
        topic_prefix: String,
    }

    impl BridgeConfig for TestConfig {
        fn mqtt(&self) -> &MqttConfig {
            &self.mqtt
        }

        fn logging(&self) -> &LoggingConfig {
            &self.logging
        }
    }

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_config_not_found() {
        let result = TestConfig::load("/nonexistent/path.json5");
        assert!(matches!(result, Err(BridgeError::ConfigNotFound { .. })));
    }

    #[test]
    fn test_load_valid_config() {
        let file = write_config(r#"{ topic_prefix: "monitor", mqtt: { host: "broker" } }"#);
        let config = TestConfig::load(file.path()).unwrap();
        assert_eq!(config.topic_prefix, "monitor");
        assert_eq!(config.mqtt().host, "broker");
    }

    #[test]
    fn test_load_parse_error() {
        let file = write_config("{ topic_prefix: ");
        let result = TestConfig::load(file.path());
        assert!(matches!(result, Err(BridgeError::ConfigParse(_))));
    }

    #[test]
    fn test_load_runs_validation() {
        let file = write_config(r#"{ topic_prefix: "monitor", mqtt: { host: "" } }"#);
        let result = TestConfig::load(file.path());
        assert!(matches!(result, Err(BridgeError::ConfigValidation(_))));
    }

    #[test]
    fn test_validate_mqtt() {
        assert!(validate_mqtt(&MqttConfig::default()).is_ok());

        let mut mqtt = MqttConfig::default();
        mqtt.keep_alive_secs = 1;
        assert!(validate_mqtt(&mqtt).is_err());

        let mut mqtt = MqttConfig::default();
        mqtt.password = Some("secret".to_string());
        assert!(validate_mqtt(&mqtt).is_err());

        mqtt.username = Some("pi".to_string());
        assert!(validate_mqtt(&mqtt).is_ok());
    }
}
