//! Configuration for the sysinfo bridge.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use pimon_bridge_framework::{
    BridgeConfig, BridgeError, LoggingConfig, MqttConfig, TopicBuilder, validate_mqtt,
};
use pimon_common::{DISCOVERY_PREFIX, TOPIC_PREFIX};

use crate::discovery::DEFAULT_MANUFACTURER;
use crate::metric::MetricKind;

/// Complete bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SysinfoBridgeConfig {
    /// MQTT broker settings.
    #[serde(default)]
    pub mqtt: MqttConfig,

    /// What to collect and how to publish it.
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Bandwidth result cache.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Collection and publishing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// First topic segment (default: "rpi-MQTT-monitor").
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,

    /// Hostname used in topics and discovery documents.
    /// Use "auto" to detect automatically (default).
    #[serde(default = "default_hostname")]
    pub hostname: String,

    /// Publish a discovery document before each value (default: true).
    #[serde(default = "default_true")]
    pub discovery_messages: bool,

    /// Root of the discovery topics (default: "homeassistant").
    #[serde(default = "default_discovery_prefix")]
    pub discovery_prefix: String,

    /// Retain flag for discovery documents (default: false).
    #[serde(default)]
    pub retain_discovery: bool,

    /// Publish all values as one aggregate message (default: false).
    #[serde(default)]
    pub group_messages: bool,

    /// Pause between consecutive sends, in seconds (default: 0.5).
    #[serde(default = "default_publish_delay")]
    pub publish_delay_secs: f64,

    /// Upper bound of the random sleep before collecting, in seconds
    /// (default: 0). Spreads hosts woken by the same scheduler tick.
    #[serde(default)]
    pub max_startup_delay_secs: u64,

    /// Bandwidth test period in minutes (default: 60).
    #[serde(default = "default_speedtest_freq")]
    pub speedtest_freq_mins: u32,

    /// Per-metric switches keyed by metric name. Omitted metrics use their default.
    #[serde(default)]
    pub collect: BTreeMap<String, bool>,

    /// Device description for discovery documents.
    #[serde(default)]
    pub device: DeviceConfig,

    /// Where each metric is read from.
    #[serde(default)]
    pub sources: SourcesConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            topic_prefix: default_topic_prefix(),
            hostname: default_hostname(),
            discovery_messages: true,
            discovery_prefix: default_discovery_prefix(),
            retain_discovery: false,
            group_messages: false,
            publish_delay_secs: default_publish_delay(),
            max_startup_delay_secs: 0,
            speedtest_freq_mins: default_speedtest_freq(),
            collect: BTreeMap::new(),
            device: DeviceConfig::default(),
            sources: SourcesConfig::default(),
        }
    }
}

fn default_topic_prefix() -> String {
    TOPIC_PREFIX.to_string()
}

fn default_hostname() -> String {
    "auto".to_string()
}

fn default_discovery_prefix() -> String {
    DISCOVERY_PREFIX.to_string()
}

fn default_true() -> bool {
    true
}

fn default_publish_delay() -> f64 {
    0.5
}

fn default_speedtest_freq() -> u32 {
    60
}

/// Device block of discovery documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    #[serde(default = "default_manufacturer")]
    pub manufacturer: String,

    /// Board model. "auto" reads it from the host.
    #[serde(default = "default_auto")]
    pub model: String,

    /// Device identifier. "auto" uses the primary MAC address.
    #[serde(default = "default_auto")]
    pub identifier: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            manufacturer: default_manufacturer(),
            model: default_auto(),
            identifier: default_auto(),
        }
    }
}

fn default_manufacturer() -> String {
    DEFAULT_MANUFACTURER.to_string()
}

fn default_auto() -> String {
    "auto".to_string()
}

/// Metric source locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// Mount point whose usage is reported (default: "/").
    #[serde(default = "default_disk_path")]
    pub disk_path: String,

    /// hwmon chip name providing the CPU temperature (default: "cpu_thermal").
    #[serde(default = "default_thermal_chip")]
    pub thermal_chip: String,

    /// Wireless interface for the signal level (default: "wlan0").
    #[serde(default = "default_wifi_interface")]
    pub wifi_interface: String,

    /// Command printing the core voltage.
    #[serde(default = "default_voltage_command")]
    pub voltage_command: Vec<String>,

    /// Command printing a JSON bandwidth report.
    #[serde(default = "default_speedtest_command")]
    pub speedtest_command: Vec<String>,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            disk_path: default_disk_path(),
            thermal_chip: default_thermal_chip(),
            wifi_interface: default_wifi_interface(),
            voltage_command: default_voltage_command(),
            speedtest_command: default_speedtest_command(),
        }
    }
}

fn default_disk_path() -> String {
    "/".to_string()
}

fn default_thermal_chip() -> String {
    "cpu_thermal".to_string()
}

fn default_wifi_interface() -> String {
    "wlan0".to_string()
}

fn default_voltage_command() -> Vec<String> {
    vec!["vcgencmd".to_string(), "measure_volts".to_string()]
}

fn default_speedtest_command() -> Vec<String> {
    vec![
        "speedtest-cli".to_string(),
        "--json".to_string(),
        "--secure".to_string(),
    ]
}

/// Bandwidth cache location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache file. "auto" places it in the user cache directory.
    #[serde(default = "default_auto")]
    pub path: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: default_auto(),
        }
    }
}

impl CacheConfig {
    pub fn resolve_path(&self) -> PathBuf {
        if self.path == "auto" {
            dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("pimon")
                .join("speedtest.json")
        } else {
            PathBuf::from(&self.path)
        }
    }
}

impl BridgeConfig for SysinfoBridgeConfig {
    fn mqtt(&self) -> &MqttConfig {
        &self.mqtt
    }

    fn logging(&self) -> &LoggingConfig {
        &self.logging
    }

    fn validate(&self) -> pimon_bridge_framework::Result<()> {
        validate_mqtt(&self.mqtt)?;

        let monitor = &self.monitor;
        if monitor.speedtest_freq_mins == 0 {
            return Err(BridgeError::validation("speedtest_freq_mins must be > 0"));
        }
        if !monitor.publish_delay_secs.is_finite() || monitor.publish_delay_secs < 0.0 {
            return Err(BridgeError::validation(
                "publish_delay_secs must be a non-negative number",
            ));
        }

        self.enabled_metrics()?;
        Ok(())
    }
}

impl SysinfoBridgeConfig {
    /// Get the hostname to use, resolving "auto" if needed.
    pub fn get_hostname(&self) -> String {
        if self.monitor.hostname == "auto" {
            hostname::get()
                .ok()
                .and_then(|h| h.into_string().ok())
                .unwrap_or_else(|| "unknown".to_string())
        } else {
            self.monitor.hostname.clone()
        }
    }

    /// Resolve the `collect` switches against the per-metric defaults.
    pub fn enabled_metrics(&self) -> Result<BTreeSet<MetricKind>, BridgeError> {
        for name in self.monitor.collect.keys() {
            name.parse::<MetricKind>()?;
        }

        Ok(MetricKind::ALL
            .into_iter()
            .filter(|kind| {
                self.monitor
                    .collect
                    .get(kind.name())
                    .copied()
                    .unwrap_or_else(|| kind.enabled_by_default())
            })
            .collect())
    }
}

/// Everything one run needs, resolved once from the file configuration.
#[derive(Debug, Clone)]
pub struct RunConfiguration {
    pub enabled: BTreeSet<MetricKind>,
    pub topics: TopicBuilder,
    pub discovery: bool,
    pub retain_discovery: bool,
    pub aggregate: bool,
    pub publish_delay: Duration,
    pub max_startup_delay: Duration,
    pub speedtest_freq_mins: u32,
}

impl RunConfiguration {
    pub fn from_config(
        config: &SysinfoBridgeConfig,
        hostname: &str,
    ) -> Result<Self, BridgeError> {
        let monitor = &config.monitor;
        let topics = TopicBuilder::with_discovery_prefix(
            &monitor.topic_prefix,
            hostname,
            &monitor.discovery_prefix,
        )?;
        let publish_delay = Duration::try_from_secs_f64(monitor.publish_delay_secs)
            .map_err(|e| BridgeError::validation(format!("publish_delay_secs: {}", e)))?;

        Ok(Self {
            enabled: config.enabled_metrics()?,
            topics,
            discovery: monitor.discovery_messages,
            retain_discovery: monitor.retain_discovery,
            aggregate: monitor.group_messages,
            publish_delay,
            max_startup_delay: Duration::from_secs(monitor.max_startup_delay_secs),
            speedtest_freq_mins: monitor.speedtest_freq_mins,
        })
    }

    /// Draw the pre-collection sleep, uniform in `0..=max_startup_delay`
    /// at millisecond resolution.
    pub fn startup_delay<R: Rng>(&self, rng: &mut R) -> Duration {
        let max_ms = u64::try_from(self.max_startup_delay.as_millis()).unwrap_or(u64::MAX);
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rng.random_range(0..=max_ms))
    }

    pub fn is_enabled(&self, kind: MetricKind) -> bool {
        self.enabled.contains(&kind)
    }

    /// Enabled metrics in individual-publish order.
    pub fn enabled_in_order(&self) -> impl Iterator<Item = MetricKind> + '_ {
        MetricKind::ALL.into_iter().filter(|k| self.is_enabled(*k))
    }

    pub fn wants_speedtest(&self) -> bool {
        self.enabled.iter().any(|k| k.is_speedtest())
    }
}
