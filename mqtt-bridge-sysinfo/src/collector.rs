//! One collection pass over the enabled metrics.

use chrono::Timelike;
use tracing::{debug, info, warn};

use crate::cache::{BandwidthCache, BandwidthCacheEntry, CacheError};
use crate::config::RunConfiguration;
use crate::metric::{MetricKind, MetricReadings, MetricValue};
use crate::provider::{MetricProvider, read_metric};

/// Reads every enabled metric once.
///
/// Unreadable metrics are logged and left out of the readings; the planner
/// publishes them with their zero value. Bandwidth is measured only on a
/// speedtest-due minute and served from the cache otherwise.
pub struct MetricCollector<'a, P: ?Sized> {
    run: &'a RunConfiguration,
    provider: &'a mut P,
    cache: &'a BandwidthCache,
}

impl<'a, P> MetricCollector<'a, P>
where
    P: MetricProvider + ?Sized,
{
    pub fn new(run: &'a RunConfiguration, provider: &'a mut P, cache: &'a BandwidthCache) -> Self {
        Self {
            run,
            provider,
            cache,
        }
    }

    pub fn collect(&mut self, now: &impl Timelike) -> MetricReadings {
        let run = self.run;
        let mut readings = MetricReadings::new();

        for kind in run.enabled_in_order().filter(|k| !k.is_speedtest()) {
            match read_metric(&mut *self.provider, kind) {
                Ok(value) => {
                    debug!(metric = %kind, value = %value, "Collected metric");
                    readings.insert(kind, value);
                }
                Err(e) => warn!(metric = %kind, error = %e, "Metric unavailable"),
            }
        }

        if run.wants_speedtest() {
            if BandwidthCache::should_refresh(now, run.speedtest_freq_mins) {
                self.measure_bandwidth(&mut readings);
            } else {
                self.cached_bandwidth(&mut readings);
            }
        }

        readings
    }

    fn speedtest_kinds(&self) -> impl Iterator<Item = MetricKind> + '_ {
        [MetricKind::SpeedtestUp, MetricKind::SpeedtestDown]
            .into_iter()
            .filter(|k| self.run.is_enabled(*k))
    }

    fn measure_bandwidth(&mut self, readings: &mut MetricReadings) {
        let mut complete = true;
        let mut entry = BandwidthCacheEntry::default();

        let kinds: Vec<_> = self.speedtest_kinds().collect();
        for kind in kinds {
            match read_metric(&mut *self.provider, kind) {
                Ok(MetricValue::Mbps(mbps)) => {
                    match kind {
                        MetricKind::SpeedtestUp => entry.speed_up = mbps,
                        _ => entry.speed_down = mbps,
                    }
                    readings.insert(kind, MetricValue::Mbps(mbps));
                }
                Ok(other) => {
                    warn!(metric = %kind, value = %other, "Unexpected bandwidth value");
                    complete = false;
                }
                Err(e) => {
                    warn!(metric = %kind, error = %e, "Metric unavailable");
                    complete = false;
                }
            }
        }

        if !complete {
            return;
        }

        match self.cache.store(&entry) {
            Ok(()) => info!(
                path = %self.cache.path().display(),
                down = entry.speed_down,
                up = entry.speed_up,
                "Stored bandwidth result"
            ),
            Err(e) => warn!(error = %e, "Failed to store bandwidth result"),
        }
    }

    fn cached_bandwidth(&self, readings: &mut MetricReadings) {
        let entry = match self.cache.load() {
            Ok(entry) => entry,
            Err(e @ CacheError::Miss { .. }) => {
                warn!(error = %e, "No bandwidth result yet, speedtest metrics unavailable");
                return;
            }
            Err(e) => {
                warn!(error = %e, "Bandwidth cache unreadable, speedtest metrics unavailable");
                return;
            }
        };

        for kind in self.speedtest_kinds() {
            let mbps = match kind {
                MetricKind::SpeedtestUp => entry.speed_up,
                _ => entry.speed_down,
            };
            debug!(metric = %kind, value = mbps, "Using cached bandwidth");
            readings.insert(kind, MetricValue::Mbps(mbps));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SysinfoBridgeConfig;
    use crate::provider::ProviderError;
    use chrono::NaiveTime;
    use std::time::Duration;

    /// Fixed values; voltage always fails. Counts bandwidth reads.
    #[derive(Default)]
    struct FakeProvider {
        speedtest_calls: usize,
        speedtest_fails: bool,
    }

    impl MetricProvider for FakeProvider {
        fn cpu_load(&mut self) -> Result<f64, ProviderError> {
            Ok(23.4)
        }
        fn cpu_temp(&mut self) -> Result<f64, ProviderError> {
            Ok(51.0)
        }
        fn disk_usage(&mut self) -> Result<f64, ProviderError> {
            Ok(40.0)
        }
        fn voltage(&mut self) -> Result<f64, ProviderError> {
            Err(ProviderError::NotFound("vcgencmd".to_string()))
        }
        fn swap(&mut self) -> Result<f64, ProviderError> {
            Ok(0.0)
        }
        fn memory(&mut self) -> Result<f64, ProviderError> {
            Ok(61.5)
        }
        fn clock_speed(&mut self) -> Result<u64, ProviderError> {
            Ok(1800)
        }
        fn uptime(&mut self) -> Result<Duration, ProviderError> {
            Ok(Duration::from_secs(90_061))
        }
        fn network_up(&mut self) -> Result<f64, ProviderError> {
            Ok(0.5)
        }
        fn network_down(&mut self) -> Result<f64, ProviderError> {
            Ok(2.25)
        }
        fn wifi_rssi(&mut self) -> Result<i32, ProviderError> {
            Ok(-60)
        }
        fn speedtest_up(&mut self) -> Result<f64, ProviderError> {
            self.speedtest_calls += 1;
            if self.speedtest_fails {
                Err(ProviderError::Unavailable("no network".to_string()))
            } else {
                Ok(20.0)
            }
        }
        fn speedtest_down(&mut self) -> Result<f64, ProviderError> {
            self.speedtest_calls += 1;
            if self.speedtest_fails {
                Err(ProviderError::Unavailable("no network".to_string()))
            } else {
                Ok(95.0)
            }
        }
    }

    fn run_config(collect: &str) -> RunConfiguration {
        let json = format!(r#"{{ monitor: {{ speedtest_freq_mins: 15, collect: {} }} }}"#, collect);
        let config: SysinfoBridgeConfig = json5::from_str(&json).unwrap();
        RunConfiguration::from_config(&config, "pi").unwrap()
    }

    fn at_minute(minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(10, minute, 0).unwrap()
    }

    #[test]
    fn test_collects_only_enabled() {
        let run = run_config(
            r#"{ cpu_temp: false, disk_usage: false, swap: false, memory: false,
                 clock_speed: false, uptime: false, network_up: false, network_down: false }"#,
        );
        let dir = tempfile::tempdir().unwrap();
        let cache = BandwidthCache::new(dir.path().join("speedtest.json"));
        let mut provider = FakeProvider::default();

        let readings = MetricCollector::new(&run, &mut provider, &cache).collect(&at_minute(1));

        assert_eq!(readings.len(), 1);
        assert_eq!(
            readings.get(MetricKind::CpuLoad),
            Some(&MetricValue::Percentage(23.4))
        );
        assert_eq!(provider.speedtest_calls, 0);
        assert!(!cache.path().exists());
    }

    #[test]
    fn test_unavailable_metric_is_skipped() {
        let run = run_config("{ voltage: true }");
        let dir = tempfile::tempdir().unwrap();
        let cache = BandwidthCache::new(dir.path().join("speedtest.json"));
        let mut provider = FakeProvider::default();

        let readings = MetricCollector::new(&run, &mut provider, &cache).collect(&at_minute(1));

        assert!(run.is_enabled(MetricKind::Voltage));
        assert!(readings.get(MetricKind::Voltage).is_none());
        assert_eq!(
            readings.get(MetricKind::ClockSpeed),
            Some(&MetricValue::Megahertz(1800))
        );
    }

    #[test]
    fn test_due_minute_measures_and_stores() {
        let run = run_config("{ speedtest_up: true, speedtest_down: true }");
        let dir = tempfile::tempdir().unwrap();
        let cache = BandwidthCache::new(dir.path().join("speedtest.json"));
        let mut provider = FakeProvider::default();

        let readings = MetricCollector::new(&run, &mut provider, &cache).collect(&at_minute(30));

        assert_eq!(provider.speedtest_calls, 2);
        assert_eq!(
            readings.get(MetricKind::SpeedtestDown),
            Some(&MetricValue::Mbps(95.0))
        );
        assert_eq!(
            cache.load().unwrap(),
            BandwidthCacheEntry {
                speed_down: 95.0,
                speed_up: 20.0
            }
        );
    }

    #[test]
    fn test_other_minute_uses_cache() {
        let run = run_config("{ speedtest_up: true, speedtest_down: true }");
        let dir = tempfile::tempdir().unwrap();
        let cache = BandwidthCache::new(dir.path().join("speedtest.json"));
        cache
            .store(&BandwidthCacheEntry {
                speed_down: 80.0,
                speed_up: 10.0,
            })
            .unwrap();
        let mut provider = FakeProvider::default();

        let readings = MetricCollector::new(&run, &mut provider, &cache).collect(&at_minute(31));

        assert_eq!(provider.speedtest_calls, 0);
        assert_eq!(
            readings.get(MetricKind::SpeedtestUp),
            Some(&MetricValue::Mbps(10.0))
        );
        assert_eq!(
            readings.get(MetricKind::SpeedtestDown),
            Some(&MetricValue::Mbps(80.0))
        );
    }

    #[test]
    fn test_cache_miss_leaves_speedtest_unavailable() {
        let run = run_config("{ speedtest_down: true }");
        let dir = tempfile::tempdir().unwrap();
        let cache = BandwidthCache::new(dir.path().join("speedtest.json"));
        let mut provider = FakeProvider::default();

        let readings = MetricCollector::new(&run, &mut provider, &cache).collect(&at_minute(7));

        assert!(readings.get(MetricKind::SpeedtestDown).is_none());
        assert!(readings.get(MetricKind::CpuLoad).is_some());
    }

    #[test]
    fn test_single_direction_stores_zero_for_other() {
        let run = run_config("{ speedtest_down: true }");
        let dir = tempfile::tempdir().unwrap();
        let cache = BandwidthCache::new(dir.path().join("speedtest.json"));
        let mut provider = FakeProvider::default();

        MetricCollector::new(&run, &mut provider, &cache).collect(&at_minute(0));

        assert_eq!(provider.speedtest_calls, 1);
        assert_eq!(
            cache.load().unwrap(),
            BandwidthCacheEntry {
                speed_down: 95.0,
                speed_up: 0.0
            }
        );
    }

    #[test]
    fn test_failed_measurement_keeps_previous_cache() {
        let run = run_config("{ speedtest_up: true, speedtest_down: true }");
        let dir = tempfile::tempdir().unwrap();
        let cache = BandwidthCache::new(dir.path().join("speedtest.json"));
        let previous = BandwidthCacheEntry {
            speed_down: 50.0,
            speed_up: 5.0,
        };
        cache.store(&previous).unwrap();
        let mut provider = FakeProvider {
            speedtest_fails: true,
            ..FakeProvider::default()
        };

        let readings = MetricCollector::new(&run, &mut provider, &cache).collect(&at_minute(45));

        assert!(readings.get(MetricKind::SpeedtestUp).is_none());
        assert_eq!(cache.load().unwrap(), previous);
    }
}
