//! Linux-specific readers: hwmon temperatures, wireless signal level and
//! the board model from `/proc/cpuinfo`.

use std::path::Path;

use procfs::FromRead;
use tracing::warn;

use crate::provider::ProviderError;

/// Default hwmon root.
pub const HWMON_ROOT: &str = "/sys/class/hwmon";

/// Default wireless statistics file.
pub const PROC_NET_WIRELESS: &str = "/proc/net/wireless";

pub const PROC_CPUINFO: &str = "/proc/cpuinfo";

/// Temperature sensor reading.
#[derive(Debug, Clone, PartialEq)]
pub struct Temperature {
    pub chip: String,
    pub sensor: u32,
    pub temp_celsius: f64,
}

/// Collect temperature sensor readings below an hwmon root, sorted by chip
/// then sensor number.
pub fn collect_temperatures(root: &Path) -> Vec<Temperature> {
    let mut temps = Vec::new();

    let Ok(entries) = std::fs::read_dir(root) else {
        return temps;
    };

    for entry in entries.flatten() {
        let hwmon_path = entry.path();

        let chip = std::fs::read_to_string(hwmon_path.join("name"))
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        let Ok(files) = std::fs::read_dir(&hwmon_path) else {
            continue;
        };

        for file in files.flatten() {
            let file_name = file.file_name().to_string_lossy().to_string();

            // temp<N>_input, in millidegrees Celsius
            let Some(sensor) = file_name
                .strip_prefix("temp")
                .and_then(|s| s.strip_suffix("_input"))
                .and_then(|s| s.parse::<u32>().ok())
            else {
                continue;
            };

            let Ok(temp_str) = std::fs::read_to_string(file.path()) else {
                continue;
            };
            let Ok(temp_milli) = temp_str.trim().parse::<i64>() else {
                warn!(path = %file.path().display(), "Unparseable hwmon temperature");
                continue;
            };

            temps.push(Temperature {
                chip: chip.clone(),
                sensor,
                temp_celsius: temp_milli as f64 / 1000.0,
            });
        }
    }

    temps.sort_by(|a, b| a.chip.cmp(&b.chip).then(a.sensor.cmp(&b.sensor)));
    temps
}

/// First sensor reading of the named chip.
pub fn chip_temperature(root: &Path, chip: &str) -> Result<f64, ProviderError> {
    collect_temperatures(root)
        .into_iter()
        .find(|t| t.chip == chip)
        .map(|t| t.temp_celsius)
        .ok_or_else(|| ProviderError::NotFound(format!("hwmon chip '{}'", chip)))
}

/// Signal level in dBm of `interface` from `/proc/net/wireless` contents.
///
/// ```text
/// Inter-| sta-|   Quality        |   Discarded packets               | Missed | WE
///  face | tus | link level noise |  nwid  crypt   frag  retry   misc | beacon | 22
///  wlan0: 0000   54.  -56.  -256        0      0      0      0      0        0
/// ```
pub fn parse_wireless_level(contents: &str, interface: &str) -> Result<i32, ProviderError> {
    let line = contents
        .lines()
        .filter_map(|line| line.trim_start().split_once(':'))
        .find(|(name, _)| name.trim() == interface)
        .map(|(_, rest)| rest)
        .ok_or_else(|| ProviderError::NotFound(format!("wireless interface '{}'", interface)))?;

    // status, link, level, noise, ...
    let level = line.split_whitespace().nth(2).ok_or_else(|| ProviderError::Parse {
        what: "wireless level".to_string(),
        detail: line.trim().to_string(),
    })?;

    level
        .trim_end_matches('.')
        .parse::<f64>()
        .map(|v| v.round() as i32)
        .map_err(|e| ProviderError::Parse {
            what: "wireless level".to_string(),
            detail: format!("'{}': {}", level, e),
        })
}

/// Read the signal level of `interface` from the kernel's wireless statistics.
pub fn wireless_level(path: &Path, interface: &str) -> Result<i32, ProviderError> {
    let contents = std::fs::read_to_string(path)?;
    parse_wireless_level(&contents, interface)
}

/// Board model of the host.
///
/// Raspberry Pi kernels print a `Model` line in a trailer block after the
/// per-CPU blocks, which procfs does not keep, so that line is read
/// directly. Other hosts fall back to the first CPU's `model name`.
pub fn device_model(path: &Path) -> Option<String> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read cpuinfo");
            return None;
        }
    };

    parse_board_model(&contents).or_else(|| cpu_model_name(&contents))
}

/// Value of the `Model` line of cpuinfo text, when present.
pub fn parse_board_model(contents: &str) -> Option<String> {
    contents
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(key, _)| key.trim() == "Model")
        .map(|(_, value)| value.trim().to_string())
        .filter(|model| !model.is_empty())
}

fn cpu_model_name(contents: &str) -> Option<String> {
    let info = procfs::CpuInfo::from_read(contents.as_bytes()).ok()?;
    info.model_name(0).map(|name| name.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const WIRELESS: &str = "Inter-| sta-|   Quality        |   Discarded packets               | Missed | WE
 face | tus | link level noise |  nwid  crypt   frag  retry   misc | beacon | 22
 wlan0: 0000   54.  -56.  -256        0      0      0      0      0        0
  wlan1: 0000   30.  -80.  -256        0      0      0      0      0        0
";

    const PI_CPUINFO: &str = "processor\t: 0
BogoMIPS\t: 108.00
Features\t: fp asimd evtstrm crc32 cpuid
CPU implementer\t: 0x41
CPU architecture: 8
CPU variant\t: 0x0
CPU part\t: 0xd08
CPU revision\t: 3

processor\t: 1
BogoMIPS\t: 108.00
Features\t: fp asimd evtstrm crc32 cpuid
CPU implementer\t: 0x41
CPU architecture: 8
CPU variant\t: 0x0
CPU part\t: 0xd08
CPU revision\t: 3

Hardware\t: BCM2835
Revision\t: c03114
Serial\t\t: 100000002a1b3c4d
Model\t\t: Raspberry Pi 4 Model B Rev 1.4
";

    const X86_CPUINFO: &str = "processor\t: 0
vendor_id\t: GenuineIntel
cpu family\t: 6
model\t\t: 142
model name\t: Intel(R) Core(TM) i5-8250U CPU @ 1.60GHz
stepping\t: 10

";

    fn fake_hwmon(root: &Path, index: u32, chip: &str, sensors: &[(u32, &str)]) {
        let dir = root.join(format!("hwmon{}", index));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("name"), format!("{}\n", chip)).unwrap();
        for (sensor, value) in sensors {
            std::fs::write(dir.join(format!("temp{}_input", sensor)), value).unwrap();
        }
    }

    #[test]
    fn test_collect_fake_hwmon() {
        let root = tempfile::tempdir().unwrap();
        fake_hwmon(root.path(), 0, "rp1_adc", &[(1, "38000\n")]);
        fake_hwmon(root.path(), 1, "cpu_thermal", &[(2, "51000\n"), (1, "48312\n")]);

        let temps = collect_temperatures(root.path());

        assert_eq!(temps.len(), 3);
        assert_eq!(temps[0].chip, "cpu_thermal");
        assert_eq!(temps[0].sensor, 1);
        assert_eq!(chip_temperature(root.path(), "cpu_thermal").unwrap(), 48.312);
        assert_eq!(chip_temperature(root.path(), "rp1_adc").unwrap(), 38.0);
    }

    #[test]
    fn test_missing_chip() {
        let root = tempfile::tempdir().unwrap();
        fake_hwmon(root.path(), 0, "nvme", &[(1, "30000")]);

        assert!(matches!(
            chip_temperature(root.path(), "cpu_thermal"),
            Err(ProviderError::NotFound(_))
        ));
    }

    #[test]
    fn test_skips_garbage_readings() {
        let root = tempfile::tempdir().unwrap();
        fake_hwmon(root.path(), 0, "cpu_thermal", &[(1, "n/a"), (2, "45000")]);

        assert_eq!(chip_temperature(root.path(), "cpu_thermal").unwrap(), 45.0);
    }

    #[test]
    fn test_missing_root() {
        assert!(collect_temperatures(Path::new("/nonexistent/hwmon")).is_empty());
    }

    #[test]
    fn test_parse_wireless_level() {
        assert_eq!(parse_wireless_level(WIRELESS, "wlan0").unwrap(), -56);
        assert_eq!(parse_wireless_level(WIRELESS, "wlan1").unwrap(), -80);
    }

    #[test]
    fn test_parse_wireless_unknown_interface() {
        assert!(matches!(
            parse_wireless_level(WIRELESS, "wlan2"),
            Err(ProviderError::NotFound(_))
        ));
        assert!(parse_wireless_level("", "wlan0").is_err());
    }

    #[test]
    fn test_parse_wireless_truncated_line() {
        assert!(matches!(
            parse_wireless_level(" wlan0: 0000   54.", "wlan0"),
            Err(ProviderError::Parse { .. })
        ));
    }

    #[test]
    fn test_parse_board_model_pi() {
        assert_eq!(
            parse_board_model(PI_CPUINFO).as_deref(),
            Some("Raspberry Pi 4 Model B Rev 1.4")
        );
    }

    #[test]
    fn test_parse_board_model_absent() {
        assert_eq!(parse_board_model(X86_CPUINFO), None);
        assert_eq!(parse_board_model("Model\t\t: \n"), None);
    }

    #[test]
    fn test_device_model_from_file() {
        let dir = tempfile::tempdir().unwrap();

        let pi = dir.path().join("cpuinfo-pi");
        std::fs::write(&pi, PI_CPUINFO).unwrap();
        assert_eq!(
            device_model(&pi).as_deref(),
            Some("Raspberry Pi 4 Model B Rev 1.4")
        );

        let x86 = dir.path().join("cpuinfo-x86");
        std::fs::write(&x86, X86_CPUINFO).unwrap();
        assert_eq!(
            device_model(&x86).as_deref(),
            Some("Intel(R) Core(TM) i5-8250U CPU @ 1.60GHz")
        );

        assert_eq!(device_model(&dir.path().join("missing")), None);
    }
}
