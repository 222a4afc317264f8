//! MQTT bridge for Raspberry Pi host monitoring.
//!
//! Collects local system metrics once, publishes them to an MQTT broker
//! (optionally with Home Assistant discovery documents) and exits.

use anyhow::{Context, Result};
use pimon_bridge_framework::{BridgeArgs, BridgeConfig, MqttBroker, Publisher};
use rand::SeedableRng;
use rand::rngs::SmallRng;

use mqtt_bridge_sysinfo::cache::BandwidthCache;
use mqtt_bridge_sysinfo::collector::MetricCollector;
use mqtt_bridge_sysinfo::config::{RunConfiguration, SysinfoBridgeConfig};
use mqtt_bridge_sysinfo::planner::PublishPlanner;
use mqtt_bridge_sysinfo::provider::SystemProvider;

#[tokio::main]
async fn main() -> Result<()> {
    let args = BridgeArgs::parse_with_default("pimon.json5");

    let config = SysinfoBridgeConfig::load(&args.config)?;
    pimon_common::init_tracing(&args.logging(config.logging()))?;

    let hostname = config.get_hostname();
    let run = RunConfiguration::from_config(&config, &hostname)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        hostname = %hostname,
        metrics = run.enabled.len(),
        aggregate = run.aggregate,
        discovery = run.discovery,
        "Starting pimon run"
    );

    if !args.no_delay {
        let delay = run.startup_delay(&mut SmallRng::from_os_rng());
        if !delay.is_zero() {
            tracing::debug!(delay_ms = delay.as_millis() as u64, "Startup delay");
            tokio::time::sleep(delay).await;
        }
    }

    // Metric reads block (CPU sampling window, external commands).
    let (readings, device) = tokio::task::spawn_blocking({
        let run = run.clone();
        let sources = config.monitor.sources.clone();
        let device = config.monitor.device.clone();
        let cache = BandwidthCache::new(config.cache.resolve_path());
        let hostname = hostname.clone();

        move || {
            let mut provider = SystemProvider::new(sources);
            let device = provider.device_identity(&device, &hostname);
            let now = chrono::Local::now();
            let readings = MetricCollector::new(&run, &mut provider, &cache).collect(&now);
            (readings, device)
        }
    })
    .await
    .context("metric collection task failed")?;

    let messages = PublishPlanner::new(&run, &device).plan(&readings)?;
    tracing::info!(
        collected = readings.len(),
        planned = messages.len(),
        "Planned messages"
    );

    if args.dry_run {
        for message in &messages {
            tracing::info!(
                kind = %message.kind,
                topic = %message.topic,
                qos = message.qos.level(),
                retain = message.retain,
                payload = %message.payload_str(),
                "Dry run"
            );
        }
        return Ok(());
    }

    let broker = MqttBroker::new(&config.mqtt, config.mqtt.resolve_client_id(&hostname));
    let mut publisher = Publisher::new(broker, run.publish_delay);

    match publisher.run(&messages).await {
        Ok(report) => {
            tracing::info!(
                sent = report.sent,
                total = report.total(),
                "Publish complete"
            );
            Ok(())
        }
        Err(e) => {
            tracing::error!(
                kind = %e.kind,
                sent = e.report.sent,
                failed = e.report.failed,
                not_attempted = e.report.not_attempted,
                "Publish aborted"
            );
            Err(e.into())
        }
    }
}
