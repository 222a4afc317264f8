use crate::error::{Error, Result};

/// Default topic prefix for host telemetry.
pub const TOPIC_PREFIX: &str = "rpi-MQTT-monitor";

/// Default Home Assistant discovery prefix.
pub const DISCOVERY_PREFIX: &str = "homeassistant";

/// Builder for the topics a single host publishes to.
///
/// Topics follow the pattern:
/// - values: `<prefix>/<hostname>/<metric>`
/// - aggregate: `<prefix>/<hostname>`
/// - discovery: `<discovery_prefix>/sensor/<prefix>/<hostname>_<metric>/config`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicBuilder {
    prefix: String,
    hostname: String,
    discovery_prefix: String,
}

impl TopicBuilder {
    /// Create a builder for a host, with the default discovery prefix.
    ///
    /// Fails if either part contains an MQTT wildcard or is empty.
    pub fn new(prefix: impl Into<String>, hostname: impl Into<String>) -> Result<Self> {
        Self::with_discovery_prefix(prefix, hostname, DISCOVERY_PREFIX)
    }

    /// Create a builder with a custom discovery prefix.
    pub fn with_discovery_prefix(
        prefix: impl Into<String>,
        hostname: impl Into<String>,
        discovery_prefix: impl Into<String>,
    ) -> Result<Self> {
        let builder = Self {
            prefix: prefix.into(),
            hostname: hostname.into(),
            discovery_prefix: discovery_prefix.into(),
        };

        validate_level("topic prefix", &builder.prefix)?;
        validate_level("hostname", &builder.hostname)?;
        validate_level("discovery prefix", &builder.discovery_prefix)?;
        if builder.hostname.contains('/') {
            return Err(Error::Topic(format!(
                "hostname '{}' must not contain '/'",
                builder.hostname
            )));
        }

        Ok(builder)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Topic a single metric value is published to.
    ///
    /// # Example
    /// ```
    /// use pimon_common::topic::TopicBuilder;
    ///
    /// let topics = TopicBuilder::new("rpi-MQTT-monitor", "pi4").unwrap();
    /// assert_eq!(topics.value_topic("cpuload"), "rpi-MQTT-monitor/pi4/cpuload");
    /// ```
    pub fn value_topic(&self, metric: &str) -> String {
        format!("{}/{}/{}", self.prefix, self.hostname, metric)
    }

    /// Topic the aggregated body is published to.
    ///
    /// # Example
    /// ```
    /// use pimon_common::topic::TopicBuilder;
    ///
    /// let topics = TopicBuilder::new("rpi-MQTT-monitor", "pi4").unwrap();
    /// assert_eq!(topics.aggregate_topic(), "rpi-MQTT-monitor/pi4");
    /// ```
    pub fn aggregate_topic(&self) -> String {
        format!("{}/{}", self.prefix, self.hostname)
    }

    /// Topic a metric's discovery document is published to.
    ///
    /// # Example
    /// ```
    /// use pimon_common::topic::TopicBuilder;
    ///
    /// let topics = TopicBuilder::new("rpi-MQTT-monitor", "pi4").unwrap();
    /// assert_eq!(
    ///     topics.discovery_topic("cputemp"),
    ///     "homeassistant/sensor/rpi-MQTT-monitor/pi4_cputemp/config"
    /// );
    /// ```
    pub fn discovery_topic(&self, metric: &str) -> String {
        format!(
            "{}/sensor/{}/{}_{}/config",
            self.discovery_prefix, self.prefix, self.hostname, metric
        )
    }

    /// Stable unique id for a metric sensor of this host.
    pub fn unique_id(&self, metric: &str) -> String {
        format!("{}_{}", self.hostname, metric)
    }
}

fn validate_level(what: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::Topic(format!("{} must not be empty", what)));
    }
    if value.contains(['+', '#']) {
        return Err(Error::Topic(format!(
            "{} '{}' must not contain MQTT wildcards",
            what, value
        )));
    }
    Ok(())
}
