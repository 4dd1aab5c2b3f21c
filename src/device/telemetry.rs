//! Measurement Publisher module.

use serde::Serialize;

use super::{Fields, payload_text};
use crate::packet::{Publish, QoS};
use crate::runtime::{MAX_PAYLOAD_LEN, MqttModule, PublishOutbox, TopicCollector};

/// Default minimum time between two measurements.
pub const DEFAULT_INTERVAL_MILLIS: u64 = 5000;

/// Test measurement sent on every publish cycle.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Measurement<'a> {
    pub schema: &'a str,
    pub payload: Fields<'a>,
}

impl Measurement<'static> {
    pub const fn test() -> Self {
        Self {
            schema: "test_schema",
            payload: Fields(&[("field0", "value0"), ("field1", "value1")]),
        }
    }
}

pub struct TelemetryPublisher<'a> {
    topic: &'a str,
    interval_millis: u64,
    last_publish_millis: u64,
}

impl<'a> TelemetryPublisher<'a> {
    pub fn new(topic: &'a str) -> Self {
        Self {
            topic,
            interval_millis: DEFAULT_INTERVAL_MILLIS,
            last_publish_millis: 0,
        }
    }

    pub fn with_interval_millis(mut self, interval_millis: u64) -> Self {
        self.interval_millis = interval_millis;
        self
    }

    pub fn last_publish_millis(&self) -> u64 {
        self.last_publish_millis
    }

    /// Queues a measurement when more than the interval has passed since
    /// the last one. Returns whether it fired.
    pub fn maybe_publish(&mut self, now_millis: u64, outbox: &mut dyn PublishOutbox) -> bool {
        if now_millis.wrapping_sub(self.last_publish_millis) <= self.interval_millis {
            return false;
        }
        self.last_publish_millis = now_millis;

        let mut payload = [0u8; MAX_PAYLOAD_LEN];
        match serde_json_core::to_slice(&Measurement::test(), &mut payload) {
            Ok(len) => {
                info!("Publishing measurements with payload: {}", payload_text(&payload[..len]));
                outbox.publish(self.topic, &payload[..len], QoS::AtMostOnce);
            }
            Err(_) => warn!("measurement does not fit the payload buffer"),
        }
        true
    }
}

impl MqttModule for TelemetryPublisher<'_> {
    fn register(&self, _collector: &mut dyn TopicCollector) {}

    fn on_message(&mut self, _msg: &Publish<'_>, _outbox: &mut dyn PublishOutbox) {}

    fn on_tick(&mut self, now_millis: u64, outbox: &mut dyn PublishOutbox) {
        self.maybe_publish(now_millis, outbox);
    }
}
