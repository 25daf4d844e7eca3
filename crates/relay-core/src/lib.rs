//! # relay-core
//!
//! In-process publish/subscribe routing for Relay.
//!
//! This crate provides the building blocks:
//!
//! - **Topic** - Validated channel name (`[A-Za-z0-9.-]+`)
//! - **Message** - Immutable envelope with id, topic, payload and timestamp
//! - **Subscription** - A consumer's bounded, closable inbound queue
//! - **Router** - Topic registry and concurrent fan-out delivery
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐  publish  ┌─────────────┐  one task per subscriber  ┌──────────────┐
//! │  Publisher  │──────────▶│   Router    │──────────────────────────▶│ Subscription │
//! └─────────────┘           └─────────────┘                           └──────────────┘
//!                                  │ subscribe / unsubscribe / close         │
//!                                  ▼                                         ▼
//!                           topic -> [inbox]                              consumer
//! ```
//!
//! Delivery is best-effort and never blocks the publisher: a full subscriber
//! queue drops the message, a topic without subscribers drops it too.
//!
//! ## Example
//!
//! ```no_run
//! use relay_core::{Message, Router, Topic};
//!
//! # async fn demo() -> Result<(), relay_core::TopicError> {
//! let router = Router::new();
//! let users = Topic::new("users")?;
//!
//! let mut sub = router.subscribe(&users);
//! router.publish(Message::new(users.clone(), "User Alice created"));
//!
//! if let Some(msg) = sub.recv().await {
//!     println!("{msg}: {}", msg.payload());
//! }
//! router.close();
//! # Ok(())
//! # }
//! ```

pub mod message;
pub mod router;
pub mod subscription;
pub mod topic;

pub use message::{Message, MessageId};
pub use router::{Dispatch, Router, RouterConfig, RouterStats};
pub use subscription::{Subscription, SubscriptionId, TryRecvError, DEFAULT_SUBSCRIPTION_CAPACITY};
pub use topic::{Topic, TopicError};
