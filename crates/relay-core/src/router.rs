//! Topic router for Relay.
//!
//! The router owns the registry of live subscriptions and fans published messages
//! out to them. Every delivery is independent: a slow or full subscriber never
//! delays the publisher or any other subscriber.

use crate::message::Message;
use crate::subscription::{
    Inbox, Subscription, SubscriptionId, DEFAULT_SUBSCRIPTION_CAPACITY,
};
use crate::topic::Topic;
use bytes::Bytes;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, info, trace};

/// How a published message reaches each subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dispatch {
    /// One tokio task per subscriber per message.
    ///
    /// Falls back to [`Dispatch::Inline`] when publishing outside a runtime.
    #[default]
    Spawn,
    /// Deliver on the publisher's thread. Still non-blocking, and keeps each
    /// publisher's order at every subscriber.
    Inline,
}

/// Router configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Inbound queue capacity of every subscription.
    pub subscription_capacity: usize,
    /// Delivery strategy.
    pub dispatch: Dispatch,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            subscription_capacity: DEFAULT_SUBSCRIPTION_CAPACITY,
            dispatch: Dispatch::Spawn,
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    published: AtomicU64,
    unrouted: AtomicU64,
    dispatched: AtomicU64,
    /// Drops recorded by subscriptions that have since left the registry.
    retired_drops: AtomicU64,
}

/// The central message router.
///
/// Share it behind an [`Arc`] between publishers and subscribers. After
/// [`close`](Self::close) the router stays usable but inert: publishing delivers
/// nothing and subscribing returns an already-closed subscription.
pub struct Router<T = Bytes> {
    /// Live subscriptions indexed by topic. A key exists only while its list is non-empty.
    topics: DashMap<Topic, Vec<Arc<Inbox<T>>>>,
    /// Subscription id -> topic, for unsubscribing by id.
    index: DashMap<SubscriptionId, Topic>,
    closed: AtomicBool,
    counters: Counters,
    /// Configuration.
    config: RouterConfig,
}

impl<T: Send + Sync + 'static> Router<T> {
    /// Create a new router with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RouterConfig::default())
    }

    /// Create a new router with custom configuration.
    #[must_use]
    pub fn with_config(config: RouterConfig) -> Self {
        info!("Creating router with config: {:?}", config);
        Self {
            topics: DashMap::new(),
            index: DashMap::new(),
            closed: AtomicBool::new(false),
            counters: Counters::default(),
            config,
        }
    }

    /// Get the router configuration.
    #[must_use]
    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Check whether the router has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Subscribe to a topic.
    ///
    /// The returned subscription receives every message published to `topic`
    /// until it is unsubscribed or the router is closed. On a closed router the
    /// subscription is returned already closed and is never registered.
    pub fn subscribe(&self, topic: &Topic) -> Subscription<T> {
        let subscription =
            Subscription::with_capacity(topic.clone(), self.config.subscription_capacity);

        if self.is_closed() {
            subscription.close();
            debug!(topic = %topic, "Subscribe on closed router");
            return subscription;
        }

        let inbox = subscription.inbox();
        let id = inbox.id().to_string();
        self.index.insert(id.clone(), topic.clone());

        let subscribers = {
            let mut entry = self.topics.entry(topic.clone()).or_insert_with(|| {
                debug!(topic = %topic, "Creating topic");
                Vec::new()
            });
            entry.push(inbox);
            entry.len()
        };

        // A concurrent close may have drained the registry before our insert landed.
        if self.is_closed() {
            self.index.remove(&id);
            self.detach(topic, &id);
            subscription.close();
            debug!(topic = %topic, subscription = %id, "Router closed during subscribe");
            return subscription;
        }

        debug!(
            topic = %topic,
            subscription = %id,
            subscribers,
            "Subscribed"
        );

        subscription
    }

    /// Unsubscribe by subscription id.
    ///
    /// Closes the subscription, so its stream ends once drained. Unknown ids are
    /// ignored: a second unsubscribe, or one racing with [`close`](Self::close),
    /// is not an error.
    pub fn unsubscribe(&self, subscription_id: &str) {
        let Some((_, topic)) = self.index.remove(subscription_id) else {
            trace!(subscription = %subscription_id, "Unsubscribe of unknown subscription");
            return;
        };

        if let Some(inbox) = self.detach(&topic, subscription_id) {
            self.retire(&inbox);
            debug!(
                topic = %topic,
                subscription = %subscription_id,
                subscribers = self.subscriber_count(topic.as_str()),
                "Unsubscribed"
            );
        }
    }

    /// Remove a subscription from its topic's list, dropping the topic when empty.
    fn detach(&self, topic: &Topic, subscription_id: &str) -> Option<Arc<Inbox<T>>> {
        let removed = {
            let mut entry = self.topics.get_mut(topic.as_str())?;
            let position = entry.iter().position(|inbox| inbox.id() == subscription_id)?;
            entry.swap_remove(position)
        };

        // Re-checked under the shard lock so a concurrent subscribe is never lost.
        if self
            .topics
            .remove_if(topic.as_str(), |_, inboxes| inboxes.is_empty())
            .is_some()
        {
            debug!(topic = %topic, "Deleted empty topic");
        }

        Some(removed)
    }

    /// Unregister a subscription its consumer closed or dropped without unsubscribing.
    fn prune(&self, inbox: &Inbox<T>) {
        if self.index.remove(inbox.id()).is_none() {
            // Already unsubscribed, or claimed by a concurrent close.
            return;
        }
        if self.detach(inbox.topic(), inbox.id()).is_some() {
            self.retire(inbox);
            debug!(
                topic = %inbox.topic(),
                subscription = %inbox.id(),
                "Pruned abandoned subscription"
            );
        }
    }

    fn retire(&self, inbox: &Inbox<T>) {
        inbox.close();
        self.counters
            .retired_drops
            .fetch_add(inbox.dropped(), Ordering::Relaxed);
    }

    /// Publish a message to every subscriber of its topic.
    ///
    /// Returns without waiting for delivery. The return value is the number of
    /// subscriptions the message was dispatched to; zero means it was dropped
    /// because the topic had no subscribers or the router is closed.
    pub fn publish(&self, message: Message<T>) -> usize {
        self.counters.published.fetch_add(1, Ordering::Relaxed);

        if self.is_closed() {
            self.counters.unrouted.fetch_add(1, Ordering::Relaxed);
            trace!(topic = %message.topic(), "Publish on closed router");
            return 0;
        }

        // Snapshot under the shard read lock, deliver without it.
        let (targets, abandoned): (Vec<Arc<Inbox<T>>>, Vec<Arc<Inbox<T>>>) =
            match self.topics.get(message.topic().as_str()) {
                Some(entry) => entry.iter().cloned().partition(|inbox| !inbox.is_closed()),
                None => (Vec::new(), Vec::new()),
            };

        for inbox in abandoned {
            self.prune(&inbox);
        }

        if targets.is_empty() {
            self.counters.unrouted.fetch_add(1, Ordering::Relaxed);
            trace!(topic = %message.topic(), "No subscribers, dropping message");
            return 0;
        }

        let recipients = targets.len();
        let handle = match self.config.dispatch {
            Dispatch::Spawn => Handle::try_current().ok(),
            Dispatch::Inline => None,
        };

        match handle {
            Some(handle) => {
                for inbox in targets {
                    let message = message.clone();
                    handle.spawn(async move {
                        inbox.send(message);
                    });
                }
            }
            None => {
                for inbox in targets {
                    inbox.send(message.clone());
                }
            }
        }

        self.counters
            .dispatched
            .fetch_add(recipients as u64, Ordering::Relaxed);
        trace!(
            topic = %message.topic(),
            message = %message.id(),
            recipients,
            "Published message"
        );
        recipients
    }

    /// Publish a payload to a topic.
    pub fn publish_to(&self, topic: &Topic, payload: T) -> usize {
        self.publish(Message::new(topic.clone(), payload))
    }

    /// Close the router.
    ///
    /// Closes every registered subscription, ending their streams, and empties the
    /// registry. Calling it again has no further effect.
    pub fn close(&self) {
        let first = !self.closed.swap(true, Ordering::SeqCst);

        let topics: Vec<Topic> = self.topics.iter().map(|e| e.key().clone()).collect();
        let mut closed = 0usize;
        for topic in topics {
            if let Some((_, inboxes)) = self.topics.remove(topic.as_str()) {
                for inbox in inboxes {
                    self.index.remove(inbox.id());
                    self.retire(&inbox);
                    closed += 1;
                }
            }
        }

        if first {
            info!(subscriptions = closed, "Router closed");
        }
    }

    /// Check if a topic has live subscribers.
    #[must_use]
    pub fn topic_exists(&self, topic: &str) -> bool {
        self.topics.contains_key(topic)
    }

    /// Get the subscriber count for a topic.
    #[must_use]
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics.get(topic).map(|e| e.len()).unwrap_or(0)
    }

    /// Get all topics with live subscribers.
    #[must_use]
    pub fn topic_names(&self) -> Vec<String> {
        self.topics.iter().map(|e| e.key().to_string()).collect()
    }

    /// Get router statistics.
    #[must_use]
    pub fn stats(&self) -> RouterStats {
        let mut subscription_count = 0;
        let mut live_drops = 0;
        for entry in self.topics.iter() {
            subscription_count += entry.len();
            live_drops += entry.iter().map(|inbox| inbox.dropped()).sum::<u64>();
        }

        RouterStats {
            topic_count: self.topics.len(),
            subscription_count,
            messages_published: self.counters.published.load(Ordering::Relaxed),
            messages_unrouted: self.counters.unrouted.load(Ordering::Relaxed),
            deliveries_dispatched: self.counters.dispatched.load(Ordering::Relaxed),
            messages_dropped: live_drops + self.counters.retired_drops.load(Ordering::Relaxed),
        }
    }
}

impl<T: Send + Sync + 'static> Default for Router<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Router statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouterStats {
    /// Number of topics with live subscribers.
    pub topic_count: usize,
    /// Number of live subscriptions.
    pub subscription_count: usize,
    /// Total number of publish calls.
    pub messages_published: u64,
    /// Messages dropped because nobody was subscribed (or the router was closed).
    pub messages_unrouted: u64,
    /// Total per-subscriber deliveries dispatched.
    pub deliveries_dispatched: u64,
    /// Deliveries dropped because a subscriber's queue was full.
    pub messages_dropped: u64,
}
