//! Subscription filters collected from modules.

use heapless::{String, Vec};

use super::traits::TopicCollector;

/// Longest topic or filter the runtime stores.
pub const MAX_TOPIC_LEN: usize = 128;

/// The filters the supervisor subscribes to after every successful connect,
/// in registration order. Filters are copied in, so modules may register
/// borrowed or formatted strings.
#[derive(Default)]
pub struct TopicRegistry<const MAX_TOPICS: usize> {
    topics: Vec<String<MAX_TOPIC_LEN>, MAX_TOPICS>,
}

impl<const MAX_TOPICS: usize> TopicRegistry<MAX_TOPICS> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false`, after logging, when the filter is longer than
    /// [`MAX_TOPIC_LEN`] or the registry already holds `MAX_TOPICS` filters.
    pub fn add_topic(&mut self, topic: &str) -> bool {
        let mut owned = String::new();
        if owned.push_str(topic).is_err() {
            warn!("topic filter too long, not registered: {}", topic);
            return false;
        }
        if self.topics.push(owned).is_err() {
            warn!("topic registry full, not registered: {}", topic);
            return false;
        }
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.topics.iter().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }
}

impl<const MAX_TOPICS: usize> TopicCollector for TopicRegistry<MAX_TOPICS> {
    fn add(&mut self, topic: &str) -> bool {
        self.add_topic(topic)
    }
}
