//! Home Assistant discovery documents.

use serde::{Deserialize, Serialize};

use pimon_common::TopicBuilder;

use crate::metric::{MetricKind, UnknownMetric};

/// Default manufacturer reported in discovery documents.
pub const DEFAULT_MANUFACTURER: &str = "Raspberry Pi Foundation";

/// The physical device every sensor of this host belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    /// Stable hardware identifiers (the primary MAC address).
    pub identifiers: Vec<String>,
    pub manufacturer: String,
    pub model: String,
    /// Hostname.
    pub name: String,
}

/// Sensor metadata published so an automation hub can auto-register it.
///
/// Field order is the serialized key order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryDescriptor {
    pub device: DeviceIdentity,
    pub state_topic: String,
    pub icon: String,
    pub name: String,
    pub unique_id: String,
    pub unit_of_measurement: String,
}

/// Fixed presentation of one metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorTemplate {
    pub icon: &'static str,
    pub name_suffix: &'static str,
    pub unit: &'static str,
}

/// Presentation table, one entry per metric kind.
pub fn template(kind: MetricKind) -> SensorTemplate {
    let (icon, name_suffix, unit) = match kind {
        MetricKind::CpuLoad => ("mdi:speedometer", "CPU Usage", "%"),
        MetricKind::CpuTemp => ("hass:thermometer", "CPU Temperature", "°C"),
        MetricKind::DiskUsage => ("mdi:harddisk", "Disk Usage", "%"),
        MetricKind::Voltage => ("mdi:speedometer", "CPU Voltage", "V"),
        MetricKind::Swap => ("mdi:harddisk", "Disk Swap", "%"),
        MetricKind::Memory => ("mdi:memory", "Memory Usage", "%"),
        MetricKind::ClockSpeed => ("mdi:speedometer", "CPU Clock Speed", "MHz"),
        MetricKind::Uptime => ("mdi:timer-outline", "Uptime", ""),
        MetricKind::NetworkUp => ("mdi:upload-network", "Network Upload", "Gb"),
        MetricKind::NetworkDown => ("mdi:download-network", "Network Download", "Gb"),
        MetricKind::WifiRssi => ("mdi:wifi", "Wifi RSSI", "dBm"),
        MetricKind::SpeedtestUp => ("mdi:upload-network-outline", "Upload Speed", "Mbit/s"),
        MetricKind::SpeedtestDown => ("mdi:download-network-outline", "Download Speed", "Mbit/s"),
    };
    SensorTemplate {
        icon,
        name_suffix,
        unit,
    }
}

/// Builds discovery descriptors for one host. Pure: no I/O, and identical
/// inputs always yield identical descriptors.
#[derive(Debug, Clone)]
pub struct DiscoveryPayloadBuilder<'a> {
    topics: &'a TopicBuilder,
    device: &'a DeviceIdentity,
}

impl<'a> DiscoveryPayloadBuilder<'a> {
    pub fn new(topics: &'a TopicBuilder, device: &'a DeviceIdentity) -> Self {
        Self { topics, device }
    }

    /// Build the descriptor for `kind`.
    pub fn build(&self, kind: MetricKind) -> DiscoveryDescriptor {
        let template = template(kind);
        let metric = kind.topic_name();

        DiscoveryDescriptor {
            device: self.device.clone(),
            state_topic: self.topics.value_topic(metric),
            icon: template.icon.to_string(),
            name: format!("{} {}", self.topics.hostname(), template.name_suffix),
            unique_id: self.topics.unique_id(metric),
            unit_of_measurement: template.unit.to_string(),
        }
    }

    /// Build the descriptor for a metric given by configuration name.
    pub fn build_by_name(&self, name: &str) -> Result<DiscoveryDescriptor, UnknownMetric> {
        let kind = name.parse::<MetricKind>()?;
        Ok(self.build(kind))
    }

    /// Build and serialize the descriptor as compact JSON.
    pub fn payload(&self, kind: MetricKind) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(&self.build(kind))
    }
}
