//! Turns one run's readings into the ordered list of broker messages.

use pimon_common::{PublishMessage, Result};

use crate::config::RunConfiguration;
use crate::discovery::{DeviceIdentity, DiscoveryPayloadBuilder};
use crate::metric::{MetricKind, MetricReadings};

/// Plans the messages of one run.
///
/// Disabled metrics produce nothing in individual mode and a fixed
/// placeholder slot in aggregate mode. Enabled metrics missing from the
/// readings are published with their zero value.
pub struct PublishPlanner<'a> {
    run: &'a RunConfiguration,
    device: &'a DeviceIdentity,
}

impl<'a> PublishPlanner<'a> {
    pub fn new(run: &'a RunConfiguration, device: &'a DeviceIdentity) -> Self {
        Self { run, device }
    }

    pub fn plan(&self, readings: &MetricReadings) -> Result<Vec<PublishMessage>> {
        if self.run.aggregate {
            Ok(vec![self.aggregate_message(readings)])
        } else {
            self.individual_messages(readings)
        }
    }

    /// Discovery document (when enabled) then value, per enabled metric.
    fn individual_messages(&self, readings: &MetricReadings) -> Result<Vec<PublishMessage>> {
        let topics = &self.run.topics;
        let discovery = DiscoveryPayloadBuilder::new(topics, self.device);
        let mut messages = Vec::new();

        for kind in self.run.enabled_in_order() {
            let metric = kind.topic_name();

            if self.run.discovery {
                let payload = discovery.payload(kind)?;
                messages.push(
                    PublishMessage::discovery(topics.discovery_topic(metric), payload)
                        .with_retain(self.run.retain_discovery),
                );
            }

            let value = readings
                .get(kind)
                .cloned()
                .unwrap_or_else(|| kind.zero_value());
            messages.push(PublishMessage::value(
                topics.value_topic(metric),
                value.to_string(),
            ));
        }

        Ok(messages)
    }

    fn aggregate_message(&self, readings: &MetricReadings) -> PublishMessage {
        PublishMessage::aggregate(self.run.topics.aggregate_topic(), self.aggregate_body(readings))
    }

    /// Every slot of [`MetricKind::AGGREGATE_ORDER`], joined with `", "`.
    pub fn aggregate_body(&self, readings: &MetricReadings) -> String {
        MetricKind::AGGREGATE_ORDER
            .iter()
            .map(|&kind| {
                if !self.run.is_enabled(kind) {
                    return kind.disabled_literal().to_string();
                }
                match readings.get(kind) {
                    Some(value) => value.literal(),
                    None => kind.zero_value().literal(),
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}
