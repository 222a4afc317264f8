//! Metric sources.
//!
//! [`MetricProvider`] is the seam between the publishing logic and the host:
//! one read per metric kind, each returning a typed value or an error that
//! marks the metric unavailable for this run. [`SystemProvider`] is the real
//! implementation built on `sysinfo`, sysfs/procfs and two external commands.

use std::path::Path;
use std::process::Command;
use std::time::Duration;

use serde::Deserialize;
use sysinfo::{Disks, Networks, System};
use thiserror::Error;

use crate::config::{DeviceConfig, SourcesConfig};
use crate::discovery::DeviceIdentity;
use crate::metric::{MetricKind, MetricValue, round_to};

/// A metric could not be read.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{0} is not supported on this platform")]
    Unsupported(&'static str),

    #[error("{0} not found")]
    NotFound(String),

    #[error("failed to run '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{command}' exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("unexpected {what}: {detail}")]
    Parse { what: String, detail: String },

    #[error("{0}")]
    Unavailable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One read per metric kind.
pub trait MetricProvider {
    /// Global CPU usage, percent.
    fn cpu_load(&mut self) -> Result<f64, ProviderError>;
    /// CPU temperature, °C.
    fn cpu_temp(&mut self) -> Result<f64, ProviderError>;
    /// Used space of the monitored filesystem, percent.
    fn disk_usage(&mut self) -> Result<f64, ProviderError>;
    /// Core voltage, V.
    fn voltage(&mut self) -> Result<f64, ProviderError>;
    /// Swap usage, percent.
    fn swap(&mut self) -> Result<f64, ProviderError>;
    /// Memory usage, percent.
    fn memory(&mut self) -> Result<f64, ProviderError>;
    /// Current CPU clock, MHz.
    fn clock_speed(&mut self) -> Result<u64, ProviderError>;
    /// Time since boot.
    fn uptime(&mut self) -> Result<Duration, ProviderError>;
    /// Total bytes sent over all interfaces, GB.
    fn network_up(&mut self) -> Result<f64, ProviderError>;
    /// Total bytes received over all interfaces, GB.
    fn network_down(&mut self) -> Result<f64, ProviderError>;
    /// Wi-Fi signal strength, dBm.
    fn wifi_rssi(&mut self) -> Result<i32, ProviderError>;
    /// Measured upload bandwidth, Mbit/s.
    fn speedtest_up(&mut self) -> Result<f64, ProviderError>;
    /// Measured download bandwidth, Mbit/s.
    fn speedtest_down(&mut self) -> Result<f64, ProviderError>;
}

/// Read `kind` from `provider`, wrapped in the kind's value representation.
pub fn read_metric<P>(provider: &mut P, kind: MetricKind) -> Result<MetricValue, ProviderError>
where
    P: MetricProvider + ?Sized,
{
    Ok(match kind {
        MetricKind::CpuLoad => MetricValue::Percentage(provider.cpu_load()?),
        MetricKind::CpuTemp => MetricValue::Celsius(provider.cpu_temp()?),
        MetricKind::DiskUsage => MetricValue::Percentage(provider.disk_usage()?),
        MetricKind::Voltage => MetricValue::Volts(provider.voltage()?),
        MetricKind::Swap => MetricValue::Percentage(provider.swap()?),
        MetricKind::Memory => MetricValue::Percentage(provider.memory()?),
        MetricKind::ClockSpeed => MetricValue::Megahertz(provider.clock_speed()?),
        MetricKind::Uptime => MetricValue::Uptime(provider.uptime()?),
        MetricKind::NetworkUp => MetricValue::Gigabytes(provider.network_up()?),
        MetricKind::NetworkDown => MetricValue::Gigabytes(provider.network_down()?),
        MetricKind::WifiRssi => MetricValue::Dbm(provider.wifi_rssi()?),
        MetricKind::SpeedtestUp => MetricValue::Mbps(provider.speedtest_up()?),
        MetricKind::SpeedtestDown => MetricValue::Mbps(provider.speedtest_down()?),
    })
}

/// Raw result of one bandwidth test run, in bits per second.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct SpeedtestResult {
    pub download: f64,
    pub upload: f64,
}

impl SpeedtestResult {
    pub fn download_mbps(&self) -> f64 {
        round_to(self.download / 1024.0 / 1024.0, 0)
    }

    pub fn upload_mbps(&self) -> f64 {
        round_to(self.upload / 1024.0 / 1024.0, 0)
    }
}

/// Metric provider backed by the local system.
pub struct SystemProvider {
    system: System,
    disks: Disks,
    networks: Networks,
    sources: SourcesConfig,
    /// One bandwidth test serves both directions.
    speedtest: Option<Result<SpeedtestResult, String>>,
}

impl SystemProvider {
    pub fn new(sources: SourcesConfig) -> Self {
        Self {
            system: System::new(),
            disks: Disks::new_with_refreshed_list(),
            networks: Networks::new_with_refreshed_list(),
            sources,
            speedtest: None,
        }
    }

    /// Identity of this host for discovery documents.
    ///
    /// Configured values win; otherwise the MAC of the first non-loopback
    /// interface and the board model from `/proc/cpuinfo` are used.
    pub fn device_identity(&self, device: &DeviceConfig, hostname: &str) -> DeviceIdentity {
        let identifier = if device.identifier == "auto" {
            primary_mac(&self.networks).unwrap_or_else(|| {
                tracing::warn!("No MAC address found, using hostname as device identifier");
                hostname.to_string()
            })
        } else {
            device.identifier.clone()
        };

        let model = if device.model == "auto" {
            detect_model().unwrap_or_else(|| "Unknown".to_string())
        } else {
            device.model.clone()
        };

        DeviceIdentity {
            identifiers: vec![identifier],
            manufacturer: device.manufacturer.clone(),
            model,
            name: hostname.to_string(),
        }
    }

    fn run_speedtest(&mut self) -> Result<SpeedtestResult, ProviderError> {
        match &self.speedtest {
            Some(Ok(result)) => return Ok(*result),
            Some(Err(msg)) => return Err(ProviderError::Unavailable(msg.clone())),
            None => {}
        }

        tracing::info!("Running bandwidth test");
        let result = run_command(&self.sources.speedtest_command)
            .and_then(|output| parse_speedtest(&output));

        self.speedtest = Some(match &result {
            Ok(r) => Ok(*r),
            Err(e) => Err(e.to_string()),
        });
        result
    }

    fn network_totals(&mut self) -> (u64, u64) {
        self.networks.refresh(true);
        self.networks
            .list()
            .values()
            .fold((0, 0), |(tx, rx), data| {
                (tx + data.total_transmitted(), rx + data.total_received())
            })
    }
}

impl MetricProvider for SystemProvider {
    fn cpu_load(&mut self) -> Result<f64, ProviderError> {
        // Usage is a delta between two refreshes.
        self.system.refresh_cpu_usage();
        std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
        self.system.refresh_cpu_usage();
        Ok(round_to(self.system.global_cpu_usage() as f64, 1))
    }

    fn cpu_temp(&mut self) -> Result<f64, ProviderError> {
        #[cfg(target_os = "linux")]
        {
            crate::linux::chip_temperature(
                Path::new(crate::linux::HWMON_ROOT),
                &self.sources.thermal_chip,
            )
        }
        #[cfg(not(target_os = "linux"))]
        {
            Err(ProviderError::Unsupported("cpu temperature"))
        }
    }

    fn disk_usage(&mut self) -> Result<f64, ProviderError> {
        self.disks.refresh(true);
        let target = Path::new(&self.sources.disk_path);

        let disk = self
            .disks
            .list()
            .iter()
            .find(|d| d.mount_point() == target)
            .ok_or_else(|| ProviderError::NotFound(format!("mount point '{}'", target.display())))?;

        Ok(round_to(
            usage_percent(
                disk.total_space().saturating_sub(disk.available_space()),
                disk.total_space(),
            ),
            1,
        ))
    }

    fn voltage(&mut self) -> Result<f64, ProviderError> {
        let output = run_command(&self.sources.voltage_command)?;
        parse_voltage(&output)
    }

    fn swap(&mut self) -> Result<f64, ProviderError> {
        self.system.refresh_memory();
        Ok(round_to(
            usage_percent(self.system.used_swap(), self.system.total_swap()),
            1,
        ))
    }

    fn memory(&mut self) -> Result<f64, ProviderError> {
        self.system.refresh_memory();
        let total = self.system.total_memory();
        let used = total.saturating_sub(self.system.available_memory());
        Ok(round_to(usage_percent(used, total), 1))
    }

    fn clock_speed(&mut self) -> Result<u64, ProviderError> {
        self.system.refresh_cpu_frequency();
        self.system
            .cpus()
            .first()
            .map(|cpu| cpu.frequency())
            .ok_or_else(|| ProviderError::NotFound("cpu frequency".to_string()))
    }

    fn uptime(&mut self) -> Result<Duration, ProviderError> {
        Ok(Duration::from_secs(System::uptime()))
    }

    fn network_up(&mut self) -> Result<f64, ProviderError> {
        let (tx, _) = self.network_totals();
        Ok(round_to(tx as f64 * 1e-9, 2))
    }

    fn network_down(&mut self) -> Result<f64, ProviderError> {
        let (_, rx) = self.network_totals();
        Ok(round_to(rx as f64 * 1e-9, 2))
    }

    fn wifi_rssi(&mut self) -> Result<i32, ProviderError> {
        #[cfg(target_os = "linux")]
        {
            crate::linux::wireless_level(
                Path::new(crate::linux::PROC_NET_WIRELESS),
                &self.sources.wifi_interface,
            )
        }
        #[cfg(not(target_os = "linux"))]
        {
            Err(ProviderError::Unsupported("wifi signal level"))
        }
    }

    fn speedtest_up(&mut self) -> Result<f64, ProviderError> {
        Ok(self.run_speedtest()?.upload_mbps())
    }

    fn speedtest_down(&mut self) -> Result<f64, ProviderError> {
        Ok(self.run_speedtest()?.download_mbps())
    }
}

fn usage_percent(used: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        (used as f64 / total as f64) * 100.0
    }
}

fn primary_mac(networks: &Networks) -> Option<String> {
    let mut interfaces: Vec<_> = networks.list().iter().collect();
    interfaces.sort_by(|a, b| a.0.cmp(b.0));

    interfaces
        .into_iter()
        .filter(|(name, _)| name.as_str() != "lo")
        .map(|(_, data)| data.mac_address().to_string())
        .find(|mac| mac != "00:00:00:00:00:00")
}

fn detect_model() -> Option<String> {
    #[cfg(target_os = "linux")]
    {
        crate::linux::device_model(Path::new(crate::linux::PROC_CPUINFO))
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

/// Run `argv` and return its stdout.
fn run_command(argv: &[String]) -> Result<String, ProviderError> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| ProviderError::Unavailable("empty command".to_string()))?;
    let command = argv.join(" ");

    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|source| ProviderError::Spawn {
            command: command.clone(),
            source,
        })?;

    if !output.status.success() {
        return Err(ProviderError::CommandFailed {
            command,
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Parse `vcgencmd measure_volts` output (`volt=0.8563V`).
pub fn parse_voltage(output: &str) -> Result<f64, ProviderError> {
    let trimmed = output.trim();
    let value = match trimmed.strip_prefix("volt=") {
        Some(v) => v.strip_suffix('V').unwrap_or(v),
        None => trimmed,
    };

    let parse_error = |detail: String| ProviderError::Parse {
        what: "voltage output".to_string(),
        detail: format!("'{}': {}", trimmed, detail),
    };

    match value.parse::<f64>() {
        Ok(volts) if volts.is_finite() => Ok(volts),
        Ok(_) => Err(parse_error("not a finite number".to_string())),
        Err(e) => Err(parse_error(e.to_string())),
    }
}

/// Parse the JSON report of the bandwidth test command.
pub fn parse_speedtest(output: &str) -> Result<SpeedtestResult, ProviderError> {
    serde_json::from_str(output.trim()).map_err(|e| ProviderError::Parse {
        what: "speedtest output".to_string(),
        detail: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedProvider;

    impl MetricProvider for FixedProvider {
        fn cpu_load(&mut self) -> Result<f64, ProviderError> {
            Ok(12.5)
        }
        fn cpu_temp(&mut self) -> Result<f64, ProviderError> {
            Ok(48.3)
        }
        fn disk_usage(&mut self) -> Result<f64, ProviderError> {
            Ok(33.0)
        }
        fn voltage(&mut self) -> Result<f64, ProviderError> {
            Err(ProviderError::Unsupported("voltage"))
        }
        fn swap(&mut self) -> Result<f64, ProviderError> {
            Ok(0.0)
        }
        fn memory(&mut self) -> Result<f64, ProviderError> {
            Ok(41.2)
        }
        fn clock_speed(&mut self) -> Result<u64, ProviderError> {
            Ok(1500)
        }
        fn uptime(&mut self) -> Result<Duration, ProviderError> {
            Ok(Duration::from_secs(3_600))
        }
        fn network_up(&mut self) -> Result<f64, ProviderError> {
            Ok(1.25)
        }
        fn network_down(&mut self) -> Result<f64, ProviderError> {
            Ok(7.5)
        }
        fn wifi_rssi(&mut self) -> Result<i32, ProviderError> {
            Ok(-56)
        }
        fn speedtest_up(&mut self) -> Result<f64, ProviderError> {
            Ok(18.0)
        }
        fn speedtest_down(&mut self) -> Result<f64, ProviderError> {
            Ok(94.0)
        }
    }

    #[test]
    fn test_read_metric_wraps_representation() {
        let mut provider = FixedProvider;
        assert_eq!(
            read_metric(&mut provider, MetricKind::CpuLoad).unwrap(),
            MetricValue::Percentage(12.5)
        );
        assert_eq!(
            read_metric(&mut provider, MetricKind::ClockSpeed).unwrap(),
            MetricValue::Megahertz(1500)
        );
        assert_eq!(
            read_metric(&mut provider, MetricKind::WifiRssi).unwrap(),
            MetricValue::Dbm(-56)
        );
        assert_eq!(
            read_metric(&mut provider, MetricKind::Uptime).unwrap(),
            MetricValue::Uptime(Duration::from_secs(3_600))
        );
        assert!(read_metric(&mut provider, MetricKind::Voltage).is_err());
    }

    #[test]
    fn test_parse_voltage() {
        assert_eq!(parse_voltage("volt=0.8563V\n").unwrap(), 0.8563);
        assert_eq!(parse_voltage("volt=1.2000V").unwrap(), 1.2);
        assert_eq!(parse_voltage("0.95").unwrap(), 0.95);
        assert!(matches!(
            parse_voltage("error=1"),
            Err(ProviderError::Parse { .. })
        ));
        assert!(parse_voltage("temp=48.3'C").is_err());
        assert!(parse_voltage("1.2V").is_err());
        assert!(parse_voltage("").is_err());
        assert!(parse_voltage("volt=NaNV").is_err());
    }

    #[test]
    fn test_parse_speedtest() {
        let output = r#"{"download": 98566144.0, "upload": 19398656.5, "ping": 14.2,
            "server": {"name": "Somewhere"}}"#;
        let result = parse_speedtest(output).unwrap();
        assert_eq!(result.download_mbps(), 94.0);
        assert_eq!(result.upload_mbps(), 19.0);

        assert!(parse_speedtest("Cannot retrieve speedtest configuration").is_err());
    }

    #[test]
    fn test_run_command() {
        let output = run_command(&["echo".to_string(), "volt=0.9V".to_string()]).unwrap();
        assert_eq!(parse_voltage(&output).unwrap(), 0.9);

        assert!(matches!(
            run_command(&["/nonexistent/vcgencmd".to_string()]),
            Err(ProviderError::Spawn { .. })
        ));
        assert!(matches!(
            run_command(&["false".to_string()]),
            Err(ProviderError::CommandFailed { .. })
        ));
        assert!(run_command(&[]).is_err());
    }

    #[test]
    fn test_usage_percent() {
        assert_eq!(usage_percent(0, 0), 0.0);
        assert_eq!(usage_percent(25, 100), 25.0);
    }

    #[test]
    fn test_speedtest_runs_once() {
        let sources = SourcesConfig {
            speedtest_command: vec![
                "echo".to_string(),
                r#"{"download": 1048576.0, "upload": 2097152.0}"#.to_string(),
            ],
            ..SourcesConfig::default()
        };
        let mut provider = SystemProvider::new(sources);

        assert_eq!(provider.speedtest_down().unwrap(), 1.0);
        assert_eq!(provider.speedtest_up().unwrap(), 2.0);
        assert!(matches!(provider.speedtest, Some(Ok(_))));
    }

    #[test]
    fn test_speedtest_failure_is_remembered() {
        let sources = SourcesConfig {
            speedtest_command: vec!["false".to_string()],
            ..SourcesConfig::default()
        };
        let mut provider = SystemProvider::new(sources);

        assert!(provider.speedtest_down().is_err());
        assert!(matches!(
            provider.speedtest_up(),
            Err(ProviderError::Unavailable(_))
        ));
    }

    #[test]
    fn test_system_provider_basics() {
        let mut provider = SystemProvider::new(SourcesConfig::default());

        let load = provider.cpu_load().unwrap();
        assert!((0.0..=100.0).contains(&load));
        let memory = provider.memory().unwrap();
        assert!((0.0..=100.0).contains(&memory));
        assert!(provider.network_up().unwrap() >= 0.0);
        assert!(provider.uptime().is_ok());
    }

    #[test]
    fn test_device_identity_overrides() {
        let provider = SystemProvider::new(SourcesConfig::default());
        let device = DeviceConfig {
            manufacturer: "Acme".to_string(),
            model: "Board 3".to_string(),
            identifier: "00:11:22:33:44:55".to_string(),
        };

        let identity = provider.device_identity(&device, "node7");

        assert_eq!(identity.identifiers, vec!["00:11:22:33:44:55"]);
        assert_eq!(identity.manufacturer, "Acme");
        assert_eq!(identity.model, "Board 3");
        assert_eq!(identity.name, "node7");
    }
}
