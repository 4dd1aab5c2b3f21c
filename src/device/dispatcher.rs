//! Command Dispatcher module.

use super::command::{Reply, parse_invoke_topic};
use super::payload_text;
use crate::packet::{Publish, QoS};
use crate::runtime::{MAX_PAYLOAD_LEN, MqttModule, PublishOutbox, TopicCollector};
use crate::topics::{DeviceTopics, INVOKE_TOPIC_FILTER};

/// Answers direct-method invocations and logs cloud-to-device messages.
///
/// Replies go out at QoS 0 on the reply topic of the invocation. The
/// dispatcher keeps no state between messages.
pub struct CommandDispatcher<'a> {
    topics: &'a DeviceTopics,
}

impl<'a> CommandDispatcher<'a> {
    pub fn new(topics: &'a DeviceTopics) -> Self {
        Self { topics }
    }
}

impl MqttModule for CommandDispatcher<'_> {
    fn register(&self, collector: &mut dyn TopicCollector) {
        collector.add(&self.topics.cloud_to_device);
        collector.add(INVOKE_TOPIC_FILTER);
    }

    fn on_message(&mut self, msg: &Publish<'_>, outbox: &mut dyn PublishOutbox) {
        info!("Received [{}]: {}", msg.topic, payload_text(msg.payload));

        let Ok(parsed) = parse_invoke_topic(msg.topic) else {
            return;
        };
        debug!("method: {}, rid: {}", parsed.method, parsed.request_id);

        let reply = Reply::for_command(&parsed);
        let topic = match reply.topic() {
            Ok(topic) => topic,
            Err(_) => {
                warn!("reply topic too long for rid {}", parsed.request_id);
                return;
            }
        };
        let mut payload = [0u8; MAX_PAYLOAD_LEN];
        match reply.write_payload(&mut payload) {
            Ok(len) => outbox.publish(&topic, &payload[..len], QoS::AtMostOnce),
            Err(_) => warn!("reply to {} does not fit the payload buffer", parsed.method),
        }
    }
}
