//! Demo programs driving the router.
//!
//! `run` is a long-lived broker with a logging subscriber and a publisher per
//! configured topic. `walkthrough` is a short guided tour of fan-out and topic
//! isolation.

use crate::config::Config;
use crate::metrics;
use anyhow::Result;
use futures_util::future::join_all;
use futures_util::StreamExt;
use relay_core::{Message, Router, Subscription, Topic};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Demo payloads are plain text.
pub type DemoRouter = Router<String>;

/// Run the demo broker until publishing finishes or Ctrl+C.
///
/// # Errors
///
/// Returns an error if the configuration lists no topics.
pub async fn run(config: Config) -> Result<()> {
    anyhow::ensure!(!config.demo.topics.is_empty(), "No topics configured");

    let router = Arc::new(DemoRouter::with_config(config.router.clone()));
    let interval = Duration::from_millis(config.demo.publish_interval_ms.max(1));

    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let consumers: Vec<JoinHandle<u64>> = config
        .demo
        .topics
        .iter()
        .map(|topic| {
            let sub = router.subscribe(topic);
            info!(topic = %topic, subscription = %sub.id(), "Subscribed");
            tokio::spawn(consume(sub))
        })
        .collect();

    let publishers: Vec<JoinHandle<()>> = config
        .demo
        .topics
        .iter()
        .cloned()
        .map(|topic| {
            let router = Arc::clone(&router);
            tokio::spawn(publish_loop(router, topic, interval, config.demo.message_count))
        })
        .collect();

    let reporter = tokio::spawn(report_stats(Arc::clone(&router), Duration::from_secs(1)));

    info!("Relay broker is running. Press Ctrl+C to stop.");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Shutting down broker"),
        _ = join_all(publishers) => {
            info!("All messages published");
            // Let in-flight deliveries land before closing.
            tokio::time::sleep(interval).await;
        }
    }

    router.close();
    let received: u64 = join_all(consumers)
        .await
        .into_iter()
        .map(|r| r.unwrap_or(0))
        .sum();
    reporter.abort();

    let stats = router.stats();
    metrics::record_stats(&stats);
    info!(
        published = stats.messages_published,
        received,
        unrouted = stats.messages_unrouted,
        dropped = stats.messages_dropped,
        "Broker stopped"
    );

    Ok(())
}

/// Log every message until the subscription ends. Returns how many were seen.
async fn consume(mut sub: Subscription<String>) -> u64 {
    let mut count = 0;
    while let Some(msg) = sub.next().await {
        count += 1;
        metrics::record_received(msg.topic().as_str());
        info!(subscription = %sub.id(), data = %msg.payload(), "Received {}", msg);
    }
    debug!(subscription = %sub.id(), count, "Subscription ended");
    count
}

async fn publish_loop(router: Arc<DemoRouter>, topic: Topic, interval: Duration, count: u64) {
    let mut ticker = tokio::time::interval(interval);
    let mut sequence = 0u64;

    while count == 0 || sequence < count {
        ticker.tick().await;
        if router.is_closed() {
            break;
        }
        sequence += 1;

        let payload = format!(
            r#"{{"user_id":"user-{sequence}","email":"user{sequence}@example.com"}}"#
        );
        let msg = Message::new(topic.clone(), payload);
        let recipients = router.publish(msg.clone());
        info!(recipients, "Published {}", msg);
    }
}

async fn report_stats(router: Arc<DemoRouter>, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    while !router.is_closed() {
        ticker.tick().await;
        metrics::record_stats(&router.stats());
    }
}

/// What each walkthrough subscriber received.
#[derive(Debug, Default)]
pub struct WalkthroughReport {
    /// Payloads seen by the first `users` subscriber.
    pub users_first: Vec<String>,
    /// Payloads seen by the second `users` subscriber.
    pub users_second: Vec<String>,
    /// Payloads seen by the `orders` subscriber.
    pub orders: Vec<String>,
}

/// Guided example: two subscribers on `users`, one on `orders`.
///
/// # Errors
///
/// Returns an error if a consumer task fails.
pub async fn walkthrough(config: Config) -> Result<WalkthroughReport> {
    println!("=== Relay Walkthrough ===");

    println!("1. Creating router...");
    let router = DemoRouter::with_config(config.router);

    println!("2. Creating topics...");
    let users = Topic::new("users")?;
    let orders = Topic::new("orders")?;

    println!("3. Creating subscribers...");
    let sub1 = router.subscribe(&users);
    let sub2 = router.subscribe(&users);
    let sub3 = router.subscribe(&orders);
    let orders_id = sub3.id().to_string();

    let listeners = [
        tokio::spawn(listen("Subscriber 1", sub1)),
        tokio::spawn(listen("Subscriber 2", sub2)),
        tokio::spawn(listen("Subscriber 3", sub3)),
    ];
    tokio::time::sleep(Duration::from_millis(100)).await;

    println!("\n4. Publishing messages...");
    println!("   Publishing to 'users' topic...");
    router.publish(Message::new(users.clone(), "User Alice created".to_string()));
    tokio::time::sleep(Duration::from_millis(100)).await;
    router.publish(Message::new(users.clone(), "User Bob created".to_string()));
    tokio::time::sleep(Duration::from_millis(100)).await;

    println!("\n   Publishing to 'orders' topic...");
    router.publish(Message::new(orders, "Order #123 placed".to_string()));
    tokio::time::sleep(Duration::from_millis(200)).await;

    println!("\n5. Shutting down...");
    router.unsubscribe(&orders_id);
    router.close();

    let [first, second, third] = listeners;
    let report = WalkthroughReport {
        users_first: first.await?,
        users_second: second.await?,
        orders: third.await?,
    };

    println!("\n=== Walkthrough Complete ===");
    println!("\nObservations:");
    println!(
        "- Subscribers 1 and 2 received {} and {} messages from 'users'",
        report.users_first.len(),
        report.users_second.len()
    );
    println!(
        "- Subscriber 3 only received {} message(s) from 'orders'",
        report.orders.len()
    );
    println!("- Each subscriber got its own copy of every message");

    Ok(report)
}

async fn listen(name: &'static str, mut sub: Subscription<String>) -> Vec<String> {
    println!("   [{name}] Listening to '{}' topic...", sub.topic());
    let mut seen = Vec::new();
    while let Some(msg) = sub.recv().await {
        println!("   [{name}] Received: {msg}");
        seen.push(msg.payload().clone());
    }
    seen
}
