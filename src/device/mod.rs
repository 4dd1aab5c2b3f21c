//! Device behaviour: remote command handling and periodic telemetry.
//!
//! Both features are [`MqttModule`](crate::runtime::MqttModule)s; compose them
//! with [`ModulePair`](crate::runtime::ModulePair) and hand the pair to the
//! runtime.

use serde::ser::{Serialize, SerializeMap, Serializer};

pub mod command;
pub mod dispatcher;
pub mod telemetry;

pub use command::{Command, ParseError, ParsedCommand, Reply, ReplyBody, StatusCode, parse_invoke_topic};
pub use dispatcher::CommandDispatcher;
pub use telemetry::{Measurement, TelemetryPublisher};

/// A fixed list of string fields, serialized as a flat JSON object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fields<'a>(pub &'a [(&'a str, &'a str)]);

impl Serialize for Fields<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Payload as text for log lines.
pub(crate) fn payload_text(payload: &[u8]) -> &str {
    core::str::from_utf8(payload).unwrap_or("<binary>")
}
