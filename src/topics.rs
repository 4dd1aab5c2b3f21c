//! Topic naming convention of the IoT hub.

use core::fmt::Write;
use heapless::String;

use crate::runtime::MAX_TOPIC_LEN;

/// Prefix of every direct-method invocation topic.
pub const INVOKE_BASE_TOPIC: &str = "$iothub/methods/POST/";
/// Subscription filter for direct-method invocations.
pub const INVOKE_TOPIC_FILTER: &str = "$iothub/methods/POST/#";
/// Reply topic with `{status_code}` and `{rid}` placeholders.
pub const INVOKE_REPLY_TOPIC_TEMPLATE: &str = "$iothub/methods/res/{status_code}/?$rid={rid}";

pub type Topic = String<MAX_TOPIC_LEN>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TopicTooLong;

/// Per-device topics derived from the device id.
#[derive(Debug, Clone)]
pub struct DeviceTopics {
    /// Telemetry publish topic: `devices/<id>/messages/events/`.
    pub telemetry: Topic,
    /// Cloud-to-device subscription filter: `devices/<id>/messages/devicebound/#`.
    pub cloud_to_device: Topic,
}

impl DeviceTopics {
    pub fn new(device_id: &str) -> Result<Self, TopicTooLong> {
        let mut telemetry = Topic::new();
        write!(telemetry, "devices/{device_id}/messages/events/").map_err(|_| TopicTooLong)?;
        let mut cloud_to_device = Topic::new();
        write!(cloud_to_device, "devices/{device_id}/messages/devicebound/#")
            .map_err(|_| TopicTooLong)?;
        Ok(Self {
            telemetry,
            cloud_to_device,
        })
    }
}

/// Substitutes `{status_code}` and `{rid}` in `template`.
///
/// Every occurrence is replaced and the values are copied verbatim.
pub fn render_reply_topic(template: &str, status_code: &str, rid: &str) -> Result<Topic, TopicTooLong> {
    let mut topic = Topic::new();
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        let (literal, tail) = rest.split_at(start);
        topic.push_str(literal).map_err(|_| TopicTooLong)?;
        let (value, skip) = if tail.starts_with("{status_code}") {
            (status_code, "{status_code}".len())
        } else if tail.starts_with("{rid}") {
            (rid, "{rid}".len())
        } else {
            ("{", 1)
        };
        topic.push_str(value).map_err(|_| TopicTooLong)?;
        rest = &tail[skip..];
    }
    topic.push_str(rest).map_err(|_| TopicTooLong)?;
    Ok(topic)
}
