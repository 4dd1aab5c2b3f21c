//! MQTT Module trait and utilities.
//!
//! This module defines the object-safe `MqttModule` trait that device features
//! (command handling, telemetry) implement to plug into the `MqttRuntime`.
//!
//! # Publishing Pattern
//!
//! Modules never perform async I/O directly. Instead, they use the `PublishOutbox`
//! trait to queue publish requests. The runtime then performs the actual async
//! publishing after the module method returns, and only while the session is
//! up; requests queued while disconnected are dropped.

use crate::packet::Publish;
use crate::packet::QoS;

/// Object-safe trait for queuing MQTT publish requests.
///
/// # Example
///
/// ```ignore
/// fn on_tick(&mut self, now_millis: u64, outbox: &mut dyn PublishOutbox) {
///     outbox.publish("devices/dev-1/messages/events/", b"{}", QoS::AtMostOnce);
/// }
/// ```
pub trait PublishOutbox {
    /// Queue a message for publishing.
    ///
    /// This is synchronous and returns immediately. The topic and payload are
    /// copied, so they only need to live for the duration of this call.
    fn publish(&mut self, topic: &str, payload: &[u8], qos: QoS);
}

/// Object-safe trait for collecting topics during registration.
///
/// The runtime provides this to modules during `register()`. Modules
/// call `add()` for each topic filter they want to subscribe to.
pub trait TopicCollector {
    /// Add a topic filter to subscribe to.
    ///
    /// Returns `true` if the topic was added, `false` if the collector is full.
    fn add(&mut self, topic: &str) -> bool;
}

/// Object-safe trait for MQTT modules that handle incoming messages and periodic tasks.
///
/// Key design choices for object safety:
/// - No `async fn` methods (all I/O is done via `PublishOutbox`)
/// - No generic type parameters or lifetimes on methods
/// - Transport-agnostic (modules don't know about TCP, TLS, etc.)
/// - Callback-based topic registration (avoids lifetime issues)
pub trait MqttModule {
    /// Register topic filters that this module wants to subscribe to.
    ///
    /// Called once when the runtime is built. The filters are subscribed again
    /// on every reconnect.
    fn register(&self, collector: &mut dyn TopicCollector);

    /// Handle an incoming MQTT message.
    ///
    /// Called for every incoming publish, on the runtime's own context. The
    /// module checks `msg.topic` and may queue replies into `outbox`.
    fn on_message(&mut self, msg: &Publish<'_>, outbox: &mut dyn PublishOutbox);

    /// Called once per runtime step with the current monotonic time.
    ///
    /// The default implementation does nothing.
    fn on_tick(&mut self, _now_millis: u64, _outbox: &mut dyn PublishOutbox) {}
}

/// A composite module that combines two modules into one.
///
/// Both modules receive all messages and ticks, `first` before `second`.
///
/// # Example
///
/// ```ignore
/// let commands = CommandDispatcher::new(&topics);
/// let telemetry = TelemetryPublisher::new(&topics.telemetry);
/// let device = ModulePair::new(commands, telemetry);
/// ```
pub struct ModulePair<M1, M2> {
    /// First module
    pub first: M1,
    /// Second module
    pub second: M2,
}

impl<M1, M2> ModulePair<M1, M2> {
    /// Create a new combined module from two modules.
    pub fn new(first: M1, second: M2) -> Self {
        Self { first, second }
    }
}

impl<M1, M2> MqttModule for ModulePair<M1, M2>
where
    M1: MqttModule,
    M2: MqttModule,
{
    fn register(&self, collector: &mut dyn TopicCollector) {
        self.first.register(collector);
        self.second.register(collector);
    }

    fn on_message(&mut self, msg: &Publish<'_>, outbox: &mut dyn PublishOutbox) {
        self.first.on_message(msg, outbox);
        self.second.on_message(msg, outbox);
    }

    fn on_tick(&mut self, now_millis: u64, outbox: &mut dyn PublishOutbox) {
        self.first.on_tick(now_millis, outbox);
        self.second.on_tick(now_millis, outbox);
    }
}

/// Blanket implementation for mutable references to trait objects.
///
/// This allows using `&mut dyn MqttModule` wherever `MqttModule` is expected.
impl<M: MqttModule + ?Sized> MqttModule for &mut M {
    fn register(&self, collector: &mut dyn TopicCollector) {
        (**self).register(collector)
    }

    fn on_message(&mut self, msg: &Publish<'_>, outbox: &mut dyn PublishOutbox) {
        (**self).on_message(msg, outbox)
    }

    fn on_tick(&mut self, now_millis: u64, outbox: &mut dyn PublishOutbox) {
        (**self).on_tick(now_millis, outbox)
    }
}
