//! MQTT Runtime Module
//!
//! Owns the session and drives device features built as [`MqttModule`]s.
//!
//! # Overview
//!
//! A module:
//! - registers the topic filters it wants, once, when the runtime is built
//! - receives every inbound message
//! - receives a tick with the current time on every loop step
//!
//! The filters are subscribed again by the [`ConnectionSupervisor`] each time
//! a new session is opened, so modules never see a reconnect.
//!
//! # Publishing Pattern
//!
//! Modules never perform async I/O directly. Instead, they use the `PublishOutbox`
//! trait to queue publish requests. The runtime then performs the actual async
//! publishing after the module method returns.

pub(crate) mod event_loop;
pub(crate) mod publisher;
pub(crate) mod registry;
pub(crate) mod supervisor;
pub(crate) mod traits;

pub use event_loop::{MAX_PAYLOAD_LEN, MqttRuntime, OUTBOX_CAPACITY, RuntimeOutbox};
pub use publisher::{BufferedOutbox, OwnedPublishRequest};
pub use registry::{MAX_TOPIC_LEN, TopicRegistry};
pub(crate) use supervisor::duration_ms;
pub use supervisor::{
    ConnectionResult, ConnectionSupervisor, RetryPolicy, SupervisorConfig, WifiLink,
};
pub use traits::{ModulePair, MqttModule, PublishOutbox, TopicCollector};

// Re-export Publish for convenient use in modules
pub use crate::packet::Publish;
