//! Which topic's notes are on screen.

use super::cache::{Cached, QueryKey};
use crate::models::Topic;

/// Keep the current selection, otherwise fall back to the first reconciled topic.
///
/// Placeholders cannot be selected: they have no id to key a notes query with.
pub fn default_selection(current: Option<&Topic>, topics: &[Cached<Topic>]) -> Option<Topic> {
    current
        .cloned()
        .or_else(|| topics.iter().find_map(Cached::stored).cloned())
}

/// Currently selected topic, if any.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    topic: Option<Topic>,
}

impl Selection {
    pub fn current(&self) -> Option<&Topic> {
        self.topic.as_ref()
    }

    /// An explicit user choice; sticks until cleared.
    pub fn select(&mut self, topic: Topic) {
        self.topic = Some(topic);
    }

    pub fn clear(&mut self) {
        self.topic = None;
    }

    /// Re-evaluate the default rule against a new topic list.
    pub fn on_topics_changed(&mut self, topics: &[Cached<Topic>]) -> Option<&Topic> {
        self.topic = default_selection(self.topic.as_ref(), topics);
        self.topic.as_ref()
    }

    /// Cache key of the selected topic's notes.
    pub fn notes_key(&self) -> Option<QueryKey> {
        self.topic.as_ref().map(|topic| QueryKey::notes(topic.id.clone()))
    }
}
