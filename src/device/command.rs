//! Direct-method commands: topic parsing, the dispatch table and replies.

use serde::ser::{Serialize, SerializeMap, Serializer};

use super::Fields;
use crate::topics::{INVOKE_BASE_TOPIC, INVOKE_REPLY_TOPIC_TEMPLATE, Topic, TopicTooLong, render_reply_topic};

/// Example fields returned by `ping_verbose`.
pub const PING_VERBOSE_FIELDS: Fields<'static> = Fields(&[
    ("response_ping_key_0", "response_ping_value_0"),
    ("response_ping_key_1", "response_ping_value_1"),
]);

pub const UNSUPPORTED_COMMAND_MESSAGE: &str = "command not supported by this device";

/// Method name and request id taken from an invocation topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ParsedCommand<'a> {
    pub method: &'a str,
    pub request_id: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ParseError {
    /// The topic does not start with the invocation prefix.
    NotInvokeTopic,
}

/// Splits `$iothub/methods/POST/<method>/?$rid=<rid>`.
///
/// The method runs up to the first `/` after the prefix and the request id
/// is everything after the first `=`. Either one is empty when its delimiter
/// is missing.
pub fn parse_invoke_topic(topic: &str) -> Result<ParsedCommand<'_>, ParseError> {
    let rest = topic
        .strip_prefix(INVOKE_BASE_TOPIC)
        .ok_or(ParseError::NotInvokeTopic)?;
    let method = rest.split_once('/').map_or("", |(method, _)| method);
    let request_id = rest.split_once('=').map_or("", |(_, rid)| rid);
    Ok(ParsedCommand { method, request_id })
}

/// The commands this device understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    Ping,
    PingVerbose,
    Unsupported,
}

impl Command {
    pub fn from_method(method: &str) -> Self {
        match method {
            "ping" => Command::Ping,
            "ping_verbose" => Command::PingVerbose,
            _ => Command::Unsupported,
        }
    }

    pub fn execute(self) -> (StatusCode, ReplyBody) {
        match self {
            Command::Ping => (StatusCode::Ok, ReplyBody::Empty),
            Command::PingVerbose => (StatusCode::Ok, ReplyBody::Fields(PING_VERBOSE_FIELDS)),
            Command::Unsupported => (
                StatusCode::BadRequest,
                ReplyBody::Error(UNSUPPORTED_COMMAND_MESSAGE),
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StatusCode {
    Ok,
    BadRequest,
}

impl StatusCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusCode::Ok => "200",
            StatusCode::BadRequest => "400",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyBody {
    /// Zero-length payload.
    Empty,
    Fields(Fields<'static>),
    /// Serialized as `{"error": <message>}`.
    Error(&'static str),
}

impl Serialize for ReplyBody {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ReplyBody::Empty => serializer.serialize_map(Some(0))?.end(),
            ReplyBody::Fields(fields) => fields.serialize(serializer),
            ReplyBody::Error(message) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("error", message)?;
                map.end()
            }
        }
    }
}

/// Answer to one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reply<'a> {
    pub status: StatusCode,
    pub request_id: &'a str,
    pub body: ReplyBody,
}

impl<'a> Reply<'a> {
    /// Runs the parsed command and wraps its result.
    pub fn for_command(parsed: &ParsedCommand<'a>) -> Self {
        let (status, body) = Command::from_method(parsed.method).execute();
        Self {
            status,
            request_id: parsed.request_id,
            body,
        }
    }

    pub fn topic(&self) -> Result<Topic, TopicTooLong> {
        render_reply_topic(INVOKE_REPLY_TOPIC_TEMPLATE, self.status.as_str(), self.request_id)
    }

    /// Writes the JSON body into `buf` and returns its length.
    pub fn write_payload(&self, buf: &mut [u8]) -> Result<usize, serde_json_core::ser::Error> {
        match self.body {
            ReplyBody::Empty => Ok(0),
            body => serde_json_core::to_slice(&body, buf),
        }
    }
}
