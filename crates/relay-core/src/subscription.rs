//! Subscriptions for Relay.
//!
//! A subscription is a consumer's private, bounded inbound queue for one topic.
//! The router keeps a shared [`Inbox`] handle to deliver into it; the consumer owns
//! the [`Subscription`] and drains it.
//!
//! Delivery is best-effort: [`Subscription::send`] never blocks. A full queue drops
//! the message and counts the drop, a closed subscription ignores it.

use crate::message::{generate_id, Message};
use crate::topic::Topic;
use bytes::Bytes;
use futures_util::Stream;
use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::SystemTime;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::trace;

pub use tokio::sync::mpsc::error::TryRecvError;

/// Default inbound queue capacity of a subscription.
pub const DEFAULT_SUBSCRIPTION_CAPACITY: usize = 200;

/// A unique subscription identifier.
pub type SubscriptionId = String;

/// Delivery side of a subscription, shared with the router.
///
/// The queue sender doubles as the open/closed state: `None` means closed.
/// Appending and closing both happen under the same lock, so nothing is
/// enqueued once the close has committed.
pub(crate) struct Inbox<T> {
    id: SubscriptionId,
    topic: Topic,
    created_at: SystemTime,
    capacity: usize,
    sender: Mutex<Option<mpsc::Sender<Message<T>>>>,
    dropped: AtomicU64,
}

impl<T> Inbox<T> {
    pub(crate) fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn topic(&self) -> &Topic {
        &self.topic
    }

    pub(crate) fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn lock(&self) -> MutexGuard<'_, Option<mpsc::Sender<Message<T>>>> {
        self.sender.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Offer a message without blocking. Returns `true` if it was enqueued.
    pub(crate) fn send(&self, message: Message<T>) -> bool {
        let mut sender = self.lock();
        let Some(tx) = sender.as_ref() else {
            trace!(subscription = %self.id, "Subscription closed, ignoring message");
            return false;
        };

        match tx.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(message)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                trace!(
                    subscription = %self.id,
                    message = %message.id(),
                    "Queue full, dropping message"
                );
                false
            }
            Err(TrySendError::Closed(_)) => {
                trace!(subscription = %self.id, "Consumer gone, closing subscription");
                *sender = None;
                false
            }
        }
    }

    /// Close the queue. Returns `true` if this call performed the transition.
    pub(crate) fn close(&self) -> bool {
        self.lock().take().is_some()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.lock().is_none()
    }
}

/// A consumer's registration to a topic.
///
/// Messages are yielded in arrival order through [`recv`](Self::recv),
/// [`try_recv`](Self::try_recv), [`blocking_recv`](Self::blocking_recv) or the
/// [`Stream`] implementation. Once the subscription is closed and the buffered
/// messages are drained, every one of them reports end-of-stream.
pub struct Subscription<T = Bytes> {
    inbox: Arc<Inbox<T>>,
    receiver: mpsc::Receiver<Message<T>>,
}

impl<T> Subscription<T> {
    /// Create an open subscription with the default queue capacity.
    #[must_use]
    pub fn new(topic: Topic) -> Self {
        Self::with_capacity(topic, DEFAULT_SUBSCRIPTION_CAPACITY)
    }

    /// Create an open subscription with a specific queue capacity.
    ///
    /// A capacity of zero is raised to one.
    #[must_use]
    pub fn with_capacity(topic: Topic, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        let inbox = Inbox {
            id: generate_id(),
            topic,
            created_at: SystemTime::now(),
            capacity,
            sender: Mutex::new(Some(sender)),
            dropped: AtomicU64::new(0),
        };
        Self {
            inbox: Arc::new(inbox),
            receiver,
        }
    }

    pub(crate) fn inbox(&self) -> Arc<Inbox<T>> {
        Arc::clone(&self.inbox)
    }

    /// Get the subscription id.
    #[must_use]
    pub fn id(&self) -> &str {
        self.inbox.id()
    }

    /// Get the subscribed topic.
    #[must_use]
    pub fn topic(&self) -> &Topic {
        self.inbox.topic()
    }

    /// When the subscription was created.
    #[must_use]
    pub fn created_at(&self) -> SystemTime {
        self.inbox.created_at
    }

    /// Get the queue capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inbox.capacity
    }

    /// Number of messages dropped because the queue was full.
    #[must_use]
    pub fn dropped_count(&self) -> u64 {
        self.inbox.dropped()
    }

    /// Check whether the subscription has been closed.
    ///
    /// Messages buffered before the close can still be received.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inbox.is_closed()
    }

    /// Offer a message to this subscription without blocking.
    ///
    /// Dropped silently if the subscription is closed or its queue is full.
    pub fn send(&self, message: Message<T>) {
        self.inbox.send(message);
    }

    /// Close the subscription. Idempotent.
    pub fn close(&self) {
        self.inbox.close();
    }

    /// Wait for the next message.
    ///
    /// Returns `None` once the subscription is closed and drained.
    pub async fn recv(&mut self) -> Option<Message<T>> {
        self.receiver.recv().await
    }

    /// Take the next message if one is buffered.
    ///
    /// # Errors
    ///
    /// Returns [`TryRecvError::Empty`] if nothing is buffered yet and
    /// [`TryRecvError::Disconnected`] once the subscription is closed and drained.
    pub fn try_recv(&mut self) -> Result<Message<T>, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Blocking variant of [`recv`](Self::recv) for consumers outside async code.
    ///
    /// # Panics
    ///
    /// Panics if called from within an asynchronous execution context.
    pub fn blocking_recv(&mut self) -> Option<Message<T>> {
        self.receiver.blocking_recv()
    }
}

impl<T> Stream for Subscription<T> {
    type Item = Message<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

// A dropped consumer will never read again; the router prunes closed inboxes.
impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.inbox.close();
    }
}

impl<T> fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.inbox.id)
            .field("topic", &self.inbox.topic)
            .field("capacity", &self.inbox.capacity)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use std::time::Duration;
    use tokio::time::timeout;

    fn users() -> Topic {
        Topic::new("users").unwrap()
    }

    #[test]
    fn test_subscription_creation() {
        let sub: Subscription = Subscription::new(users());
        assert_eq!(sub.id().len(), 16);
        assert_eq!(sub.topic().as_str(), "users");
        assert_eq!(sub.capacity(), DEFAULT_SUBSCRIPTION_CAPACITY);
        assert!(!sub.is_closed());
        assert_eq!(sub.dropped_count(), 0);

        let age = SystemTime::now()
            .duration_since(sub.created_at())
            .unwrap_or_default();
        assert!(age < Duration::from_secs(1));

        let other: Subscription = Subscription::new(users());
        assert_ne!(sub.id(), other.id());
    }

    #[tokio::test]
    async fn test_send_and_receive() {
        let mut sub = Subscription::new(users());
        sub.send(Message::new(users(), "test data"));

        let msg = timeout(Duration::from_secs(1), sub.recv())
            .await
            .expect("timed out")
            .expect("stream ended");
        assert_eq!(*msg.payload(), "test data");
    }

    #[test]
    fn test_fifo_order() {
        let mut sub = Subscription::new(users());
        for i in 0..5 {
            sub.send(Message::new(users(), i));
        }
        let received: Vec<i32> = (0..5).map(|_| *sub.try_recv().unwrap().payload()).collect();
        assert_eq!(received, vec![0, 1, 2, 3, 4]);
        assert!(matches!(sub.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn test_full_queue_drops_and_counts() {
        let mut sub = Subscription::with_capacity(users(), 2);
        for i in 0..5 {
            sub.send(Message::new(users(), i));
        }
        assert_eq!(sub.dropped_count(), 3);
        assert_eq!(*sub.try_recv().unwrap().payload(), 0);
        assert_eq!(*sub.try_recv().unwrap().payload(), 1);
        assert!(matches!(sub.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn test_zero_capacity_is_raised() {
        let mut sub = Subscription::with_capacity(users(), 0);
        assert_eq!(sub.capacity(), 1);
        sub.send(Message::new(users(), 1));
        assert!(sub.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_close_ends_stream() {
        let mut sub: Subscription<()> = Subscription::new(users());
        sub.close();
        assert!(sub.is_closed());
        assert!(timeout(Duration::from_secs(1), sub.recv())
            .await
            .expect("timed out")
            .is_none());
    }

    #[test]
    fn test_close_drains_buffer_then_disconnects() {
        let mut sub = Subscription::new(users());
        sub.send(Message::new(users(), "before"));
        sub.close();
        sub.send(Message::new(users(), "after"));

        assert_eq!(*sub.try_recv().unwrap().payload(), "before");
        assert!(matches!(sub.try_recv(), Err(TryRecvError::Disconnected)));
        assert_eq!(sub.dropped_count(), 0);
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut sub: Subscription<()> = Subscription::new(users());
        sub.close();
        sub.close();
        assert!(sub.is_closed());
        assert!(matches!(sub.try_recv(), Err(TryRecvError::Disconnected)));
    }

    #[tokio::test]
    async fn test_close_wakes_blocked_reader() {
        let mut sub: Subscription<()> = Subscription::new(users());
        let inbox = sub.inbox();

        let reader = tokio::spawn(async move { sub.recv().await.is_none() });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(inbox.close());

        let ended = timeout(Duration::from_secs(1), reader)
            .await
            .expect("reader not woken")
            .unwrap();
        assert!(ended);
    }

    #[tokio::test]
    async fn test_stream_yields_until_closed() {
        let sub = Subscription::new(users());
        for i in 0..3 {
            sub.send(Message::new(users(), i));
        }
        sub.close();

        let collected: Vec<i32> = timeout(
            Duration::from_secs(1),
            sub.map(|m| *m.payload()).collect::<Vec<_>>(),
        )
        .await
        .expect("stream did not terminate");
        assert_eq!(collected, vec![0, 1, 2]);
    }

    #[test]
    fn test_drop_closes_subscription() {
        let sub: Subscription<()> = Subscription::new(users());
        let inbox = sub.inbox();
        drop(sub);

        assert!(inbox.is_closed());
        assert!(!inbox.send(Message::new(users(), ())));
        assert_eq!(inbox.dropped(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_no_enqueue_after_close() {
        let mut sub = Subscription::with_capacity(users(), 1024);
        let inbox = sub.inbox();
        let closed = Arc::new(std::sync::atomic::AtomicBool::new(false));

        let senders: Vec<_> = (0..4)
            .map(|_| {
                let inbox = Arc::clone(&inbox);
                let closed = Arc::clone(&closed);
                tokio::spawn(async move {
                    let mut enqueued = 0usize;
                    let mut rejected = false;
                    for i in 0..100 {
                        let close_committed = closed.load(Ordering::SeqCst);
                        let message = Message::new(Topic::new("users").unwrap(), i);
                        let accepted = inbox.send(message);
                        if close_committed {
                            assert!(!accepted, "message enqueued after close");
                        }
                        // Capacity exceeds total sends, so a rejection means closed.
                        if rejected {
                            assert!(!accepted, "subscription reopened after close");
                        }
                        rejected |= !accepted;
                        enqueued += usize::from(accepted);
                        tokio::task::yield_now().await;
                    }
                    enqueued
                })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(inbox.close());
        closed.store(true, Ordering::SeqCst);

        let mut enqueued = 0;
        for handle in senders {
            enqueued += handle.await.unwrap();
        }

        let mut drained = 0;
        while timeout(Duration::from_secs(1), sub.recv())
            .await
            .expect("stream did not terminate")
            .is_some()
        {
            drained += 1;
        }
        assert_eq!(drained, enqueued);
        assert_eq!(sub.dropped_count(), 0);
        assert!(sub.is_closed());
    }
}
