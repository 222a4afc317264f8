//! MQTT bridge for Raspberry Pi host monitoring.
//!
//! One invocation collects the enabled host metrics, plans the broker
//! messages and publishes them over a single session, then exits. It is
//! meant to be triggered by an external scheduler (cron, systemd timer).
//!
//! # Topics
//!
//! ```text
//! rpi-MQTT-monitor/<hostname>/cpuload                          value
//! rpi-MQTT-monitor/<hostname>                                  aggregate
//! homeassistant/sensor/rpi-MQTT-monitor/<hostname>_cpuload/config   discovery
//! ```

pub mod cache;
pub mod collector;
pub mod config;
pub mod discovery;
#[cfg(target_os = "linux")]
pub mod linux;
pub mod metric;
pub mod planner;
pub mod provider;
