//! The device's main loop.
//!
//! `MqttRuntime` is the single owner of everything with a lifetime longer
//! than one call: the supervisor (and through it the WiFi link, connector
//! and delay), the MQTT session, the module and its outbox. Each `step` is
//! one pass of the cooperative loop; nothing runs concurrently with it.

use embassy_time::Instant;

use super::publisher::BufferedOutbox;
use super::registry::{MAX_TOPIC_LEN, TopicRegistry};
use super::supervisor::{ConnectionResult, ConnectionSupervisor, WifiLink};
use super::traits::MqttModule;
use crate::client::{MqttClient, MqttEvent};
use crate::transport::Connector;
use embedded_hal_async::delay::DelayNs;

/// Maximum payload a module may queue.
pub const MAX_PAYLOAD_LEN: usize = 256;
/// Publishes a single step may queue before further ones are dropped.
pub const OUTBOX_CAPACITY: usize = 4;

pub type RuntimeOutbox = BufferedOutbox<OUTBOX_CAPACITY, MAX_TOPIC_LEN, MAX_PAYLOAD_LEN>;

pub struct MqttRuntime<'a, W, C, D, M, const MAX_TOPICS: usize, const BUF_SIZE: usize>
where
    C: Connector,
{
    supervisor: ConnectionSupervisor<'a, W, C, D>,
    session: Option<MqttClient<C::Transport, BUF_SIZE>>,
    module: M,
    topics: TopicRegistry<MAX_TOPICS>,
    outbox: RuntimeOutbox,
    blocking_reconnect: bool,
}

impl<'a, W, C, D, M, const MAX_TOPICS: usize, const BUF_SIZE: usize>
    MqttRuntime<'a, W, C, D, M, MAX_TOPICS, BUF_SIZE>
where
    W: WifiLink,
    C: Connector,
    D: DelayNs,
    M: MqttModule,
{
    /// Builds the runtime and collects the module's subscription filters.
    pub fn new(supervisor: ConnectionSupervisor<'a, W, C, D>, module: M) -> Self {
        let mut topics = TopicRegistry::new();
        module.register(&mut topics);
        Self {
            supervisor,
            session: None,
            module,
            topics,
            outbox: RuntimeOutbox::new(),
            blocking_reconnect: true,
        }
    }

    /// Whether a lost session is re-established with the blocking retry
    /// policy (the default) or with a single attempt per step.
    pub fn with_blocking_reconnect(mut self, blocking: bool) -> Self {
        self.blocking_reconnect = blocking;
        self
    }

    pub fn is_connected(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|client| client.is_connected())
    }

    pub fn module(&self) -> &M {
        &self.module
    }

    pub fn topics(&self) -> &TopicRegistry<MAX_TOPICS> {
        &self.topics
    }

    /// First connection after boot: waits for WiFi and retries until the
    /// broker accepts the session.
    pub async fn start(&mut self) -> ConnectionResult {
        self.supervisor.wait_for_wifi(true).await;
        self.supervisor
            .ensure_connected(&mut self.session, &self.topics, true)
            .await
    }

    /// One pass of the main loop.
    ///
    /// While disconnected the pass only reconnects and returns the outcome.
    /// Otherwise it services the session once, ticks the module with
    /// `now_millis` and publishes whatever the module queued.
    pub async fn step(&mut self, now_millis: u64) -> Option<ConnectionResult> {
        if !self.is_connected() {
            let result = self
                .supervisor
                .ensure_connected(&mut self.session, &self.topics, self.blocking_reconnect)
                .await;
            return Some(result);
        }

        self.service_session().await;
        self.module.on_tick(now_millis, &mut self.outbox);
        self.flush_outbox().await;
        None
    }

    /// Runs the device forever.
    pub async fn run(&mut self) -> ! {
        self.start().await;
        loop {
            self.step(Instant::now().as_millis()).await;
        }
    }

    async fn service_session(&mut self) {
        let Some(client) = self.session.as_mut() else {
            return;
        };
        let failure = match client.poll().await {
            Ok(Some(MqttEvent::Message(msg))) => {
                self.module.on_message(&msg, &mut self.outbox);
                None
            }
            Ok(Some(MqttEvent::Subscribed {
                packet_id,
                accepted: false,
            })) => {
                warn!("subscription {} rejected by broker", packet_id);
                None
            }
            Ok(Some(_)) | Ok(None) => None,
            Err(e) => Some(e.as_str()),
        };
        if let Some(reason) = failure {
            if client.is_connected() {
                warn!("MQTT poll failed: {}", reason);
            } else {
                warn!("MQTT session lost: {}", reason);
            }
        }
    }

    /// Publishes queued requests, or drops them when the session is down.
    async fn flush_outbox(&mut self) {
        while let Some(request) = self.outbox.pop() {
            match self.session.as_mut().filter(|client| client.is_connected()) {
                Some(client) => {
                    if let Err(e) = client
                        .publish(&request.topic, &request.payload, request.qos)
                        .await
                    {
                        warn!("publish to {} failed: {}", request.topic.as_str(), e.as_str());
                    }
                }
                None => {
                    debug!("not connected, dropping publish to {}", request.topic.as_str());
                }
            }
        }
    }
}
