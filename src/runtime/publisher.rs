//! Buffered `PublishOutbox` used by the runtime.

use heapless::Deque;

use super::traits::PublishOutbox;
use crate::QoS;

/// An owned publish request with inline storage for topic and payload.
///
/// This allows the outbox to store requests without requiring the caller's
/// data to remain borrowed.
#[derive(Debug, Clone)]
pub struct OwnedPublishRequest<const TOPIC_SIZE: usize, const PAYLOAD_SIZE: usize> {
    pub topic: heapless::String<TOPIC_SIZE>,
    pub payload: heapless::Vec<u8, PAYLOAD_SIZE>,
    pub qos: QoS,
}

/// A FIFO outbox that collects publish requests during module callbacks.
///
/// The runtime drains it after each step. Requests that do not fit (outbox
/// full, topic or payload too large) are dropped with a warning.
///
/// `CAPACITY` bounds the requests held at once; `TOPIC_SIZE` and
/// `PAYLOAD_SIZE` bound each request.
pub struct BufferedOutbox<const CAPACITY: usize, const TOPIC_SIZE: usize, const PAYLOAD_SIZE: usize>
{
    requests: Deque<OwnedPublishRequest<TOPIC_SIZE, PAYLOAD_SIZE>, CAPACITY>,
}

impl<const CAPACITY: usize, const TOPIC_SIZE: usize, const PAYLOAD_SIZE: usize>
    BufferedOutbox<CAPACITY, TOPIC_SIZE, PAYLOAD_SIZE>
{
    pub fn new() -> Self {
        Self {
            requests: Deque::new(),
        }
    }

    /// Take the oldest buffered request.
    pub fn pop(&mut self) -> Option<OwnedPublishRequest<TOPIC_SIZE, PAYLOAD_SIZE>> {
        self.requests.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }
}

impl<const CAPACITY: usize, const TOPIC_SIZE: usize, const PAYLOAD_SIZE: usize> Default
    for BufferedOutbox<CAPACITY, TOPIC_SIZE, PAYLOAD_SIZE>
{
    fn default() -> Self {
        Self::new()
    }
}

impl<const CAPACITY: usize, const TOPIC_SIZE: usize, const PAYLOAD_SIZE: usize> PublishOutbox
    for BufferedOutbox<CAPACITY, TOPIC_SIZE, PAYLOAD_SIZE>
{
    fn publish(&mut self, topic: &str, payload: &[u8], qos: QoS) {
        let mut topic_str = heapless::String::new();
        if topic_str.push_str(topic).is_err() {
            warn!("dropping publish, topic too long: {}", topic);
            return;
        }

        let mut payload_vec = heapless::Vec::new();
        if payload_vec.extend_from_slice(payload).is_err() {
            warn!("dropping publish to {}, payload of {} bytes too large", topic, payload.len());
            return;
        }

        let req = OwnedPublishRequest {
            topic: topic_str,
            payload: payload_vec,
            qos,
        };

        if self.requests.push_back(req).is_err() {
            warn!("dropping publish to {}, outbox full", topic);
        }
    }
}
