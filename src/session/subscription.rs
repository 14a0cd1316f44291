use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::topic::TopicFilter;
use crate::transport::InboundMessage;

/// Invoked for every inbound message whose topic matches the filter it was
/// registered with.
pub type MessageCallback = Arc<dyn Fn(&InboundMessage) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Requested, not yet acknowledged by the broker.
    Pending,
    Confirmed,
}

/// What a subscription acknowledgement turned out to mean.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    Subscribed,
    Unsubscribed,
}

pub struct SubscriptionEntry {
    filter: TopicFilter,
    callback: MessageCallback,
    confirmed: bool,
}

impl SubscriptionEntry {
    pub fn filter(&self) -> &TopicFilter {
        &self.filter
    }

    pub fn state(&self) -> SubscriptionState {
        if self.confirmed {
            SubscriptionState::Confirmed
        } else {
            SubscriptionState::Pending
        }
    }
}

impl fmt::Debug for SubscriptionEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionEntry")
            .field("filter", &self.filter.as_str())
            .field("confirmed", &self.confirmed)
            .finish()
    }
}

/// Subscription filters keyed by their exact string form.
///
/// The same string doubles as the correlation token for subscribe and
/// unsubscribe requests, and the `confirmed` flag tells the two kinds of
/// acknowledgement apart.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    entries: HashMap<String, SubscriptionEntry>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, filter: &str) -> bool {
        self.entries.contains_key(filter)
    }

    pub fn state(&self, filter: &str) -> Option<SubscriptionState> {
        self.entries.get(filter).map(SubscriptionEntry::state)
    }

    pub fn filters(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Adds a pending entry. Returns `false`, leaving the existing entry
    /// untouched, when the filter is already registered.
    pub fn insert(&mut self, filter: TopicFilter, callback: MessageCallback) -> bool {
        let key = filter.as_str().to_string();
        if self.entries.contains_key(&key) {
            return false;
        }
        self.entries.insert(
            key,
            SubscriptionEntry {
                filter,
                callback,
                confirmed: false,
            },
        );
        true
    }

    pub fn remove(&mut self, filter: &str) -> bool {
        self.entries.remove(filter).is_some()
    }

    /// Applies a broker acknowledgement for `filter`.
    ///
    /// A pending entry becomes confirmed; a confirmed entry is removed, since
    /// the only request that can be acknowledged after confirmation is an
    /// unsubscribe. Unknown filters yield `None`.
    pub fn resolve_ack(&mut self, filter: &str) -> Option<AckOutcome> {
        let entry = self.entries.get_mut(filter)?;
        if entry.confirmed {
            self.entries.remove(filter);
            Some(AckOutcome::Unsubscribed)
        } else {
            entry.confirmed = true;
            Some(AckOutcome::Subscribed)
        }
    }

    /// Callbacks of every entry whose filter matches `topic`.
    pub fn matching(&self, topic: &str) -> Vec<MessageCallback> {
        self.entries
            .values()
            .filter(|entry| entry.filter.matches(topic))
            .map(|entry| entry.callback.clone())
            .collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
