//! Metric kinds, typed values and per-run readings.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use pimon_bridge_framework::BridgeError;
use thiserror::Error;

/// A metric name that matches no [`MetricKind`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown metric '{0}'")]
pub struct UnknownMetric(pub String);

impl From<UnknownMetric> for BridgeError {
    fn from(err: UnknownMetric) -> Self {
        BridgeError::validation(err.to_string())
    }
}

/// The closed set of metrics a host reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MetricKind {
    CpuLoad,
    CpuTemp,
    DiskUsage,
    Voltage,
    Swap,
    Memory,
    ClockSpeed,
    Uptime,
    NetworkUp,
    NetworkDown,
    WifiRssi,
    SpeedtestUp,
    SpeedtestDown,
}

impl MetricKind {
    /// Every kind, in the order individual messages are published.
    pub const ALL: [MetricKind; 13] = [
        MetricKind::CpuLoad,
        MetricKind::CpuTemp,
        MetricKind::DiskUsage,
        MetricKind::Voltage,
        MetricKind::Swap,
        MetricKind::Memory,
        MetricKind::ClockSpeed,
        MetricKind::Uptime,
        MetricKind::NetworkUp,
        MetricKind::NetworkDown,
        MetricKind::WifiRssi,
        MetricKind::SpeedtestUp,
        MetricKind::SpeedtestDown,
    ];

    /// Slot order of the aggregated body. Existing consumers parse this
    /// positionally, so it differs from [`MetricKind::ALL`] around clock speed.
    pub const AGGREGATE_ORDER: [MetricKind; 13] = [
        MetricKind::CpuLoad,
        MetricKind::CpuTemp,
        MetricKind::DiskUsage,
        MetricKind::Voltage,
        MetricKind::ClockSpeed,
        MetricKind::Swap,
        MetricKind::Memory,
        MetricKind::Uptime,
        MetricKind::NetworkUp,
        MetricKind::NetworkDown,
        MetricKind::WifiRssi,
        MetricKind::SpeedtestUp,
        MetricKind::SpeedtestDown,
    ];

    /// Configuration name.
    pub fn name(&self) -> &'static str {
        match self {
            MetricKind::CpuLoad => "cpu_load",
            MetricKind::CpuTemp => "cpu_temp",
            MetricKind::DiskUsage => "disk_usage",
            MetricKind::Voltage => "voltage",
            MetricKind::Swap => "swap",
            MetricKind::Memory => "memory",
            MetricKind::ClockSpeed => "clock_speed",
            MetricKind::Uptime => "uptime",
            MetricKind::NetworkUp => "network_up",
            MetricKind::NetworkDown => "network_down",
            MetricKind::WifiRssi => "wifi_rssi",
            MetricKind::SpeedtestUp => "speedtest_up",
            MetricKind::SpeedtestDown => "speedtest_down",
        }
    }

    /// Last topic level and discovery object id.
    pub fn topic_name(&self) -> &'static str {
        match self {
            MetricKind::CpuLoad => "cpuload",
            MetricKind::CpuTemp => "cputemp",
            MetricKind::DiskUsage => "diskusage",
            MetricKind::Voltage => "voltage",
            MetricKind::Swap => "swap",
            MetricKind::Memory => "memory",
            MetricKind::ClockSpeed => "sys_clock_speed",
            MetricKind::Uptime => "uptime",
            MetricKind::NetworkUp => "network_up",
            MetricKind::NetworkDown => "network_down",
            MetricKind::WifiRssi => "wifi_rssi",
            MetricKind::SpeedtestUp => "speedtest_up",
            MetricKind::SpeedtestDown => "speedtest_down",
        }
    }

    /// Whether the metric is collected when the config does not mention it.
    ///
    /// Voltage, Wi-Fi and bandwidth need extra hardware or tools.
    pub fn enabled_by_default(&self) -> bool {
        !matches!(
            self,
            MetricKind::Voltage
                | MetricKind::WifiRssi
                | MetricKind::SpeedtestUp
                | MetricKind::SpeedtestDown
        )
    }

    pub fn is_speedtest(&self) -> bool {
        matches!(self, MetricKind::SpeedtestUp | MetricKind::SpeedtestDown)
    }

    /// Value reported when the metric is enabled but could not be read.
    pub fn zero_value(&self) -> MetricValue {
        match self {
            MetricKind::CpuLoad | MetricKind::DiskUsage | MetricKind::Swap | MetricKind::Memory => {
                MetricValue::Percentage(0.0)
            }
            MetricKind::CpuTemp => MetricValue::Celsius(0.0),
            MetricKind::Voltage => MetricValue::Volts(0.0),
            MetricKind::ClockSpeed => MetricValue::Megahertz(0),
            MetricKind::Uptime => MetricValue::Uptime(Duration::ZERO),
            MetricKind::NetworkUp | MetricKind::NetworkDown => MetricValue::Gigabytes(0.0),
            MetricKind::WifiRssi => MetricValue::Dbm(0),
            MetricKind::SpeedtestUp | MetricKind::SpeedtestDown => MetricValue::Mbps(0.0),
        }
    }

    /// Aggregate slot text for a disabled metric.
    ///
    /// Temperature and voltage were always coerced to float and clock speed
    /// to int, so their disabled slots read `0.0` and `0`, not `False`.
    pub fn disabled_literal(&self) -> &'static str {
        match self {
            MetricKind::CpuTemp | MetricKind::Voltage => "0.0",
            MetricKind::ClockSpeed => "0",
            _ => "False",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MetricKind {
    type Err = UnknownMetric;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MetricKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| UnknownMetric(s.to_string()))
    }
}

/// A measured value, tagged with its unit.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    Percentage(f64),
    Celsius(f64),
    Volts(f64),
    Megahertz(u64),
    Uptime(Duration),
    Gigabytes(f64),
    Dbm(i32),
    Mbps(f64),
}

impl MetricValue {
    /// Text used inside the aggregated body: numbers as in [`fmt::Display`],
    /// the uptime string single-quoted.
    pub fn literal(&self) -> String {
        match self {
            MetricValue::Uptime(_) => format!("'{}'", self),
            _ => self.to_string(),
        }
    }
}

impl fmt::Display for MetricValue {
    /// Payload of an individual value message.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Percentage(v)
            | MetricValue::Celsius(v)
            | MetricValue::Volts(v)
            | MetricValue::Gigabytes(v)
            | MetricValue::Mbps(v) => f.write_str(&format_float(*v)),
            MetricValue::Megahertz(v) => write!(f, "{}", v),
            MetricValue::Dbm(v) => write!(f, "{}", v),
            MetricValue::Uptime(d) => f.write_str(&format_uptime(*d)),
        }
    }
}

/// Render a float with at least one decimal place (`45.0`, `12.5`).
pub fn format_float(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e16 {
        format!("{:.1}", v)
    } else {
        format!("{}", v)
    }
}

/// Render an uptime as `"{days}d {hours}h {minutes}m"`.
pub fn format_uptime(uptime: Duration) -> String {
    let secs = uptime.as_secs();
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3_600;
    let minutes = (secs % 3_600) / 60;
    format!("{}d {}h {}m", days, hours, minutes)
}

/// Round to `decimals` places.
pub fn round_to(v: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (v * factor).round() / factor
}

/// Values collected for one run.
///
/// Only enabled metrics are ever inserted; an enabled metric that is
/// missing here was unavailable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricReadings {
    values: BTreeMap<MetricKind, MetricValue>,
}

impl MetricReadings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, kind: MetricKind, value: MetricValue) {
        self.values.insert(kind, value);
    }

    pub fn with(mut self, kind: MetricKind, value: MetricValue) -> Self {
        self.insert(kind, value);
        self
    }

    pub fn get(&self, kind: MetricKind) -> Option<&MetricValue> {
        self.values.get(&kind)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
