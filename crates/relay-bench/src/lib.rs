//! Shared fixtures for the Relay benchmarks.

use bytes::Bytes;
use relay_core::{Dispatch, Router, RouterConfig, Subscription, Topic};

/// Topic used by every benchmark.
#[must_use]
pub fn bench_topic() -> Topic {
    Topic::new("bench.topic").expect("static topic name is valid")
}

/// A router with `subscribers` live subscriptions on [`bench_topic`].
///
/// The subscriptions are returned so they stay registered for the benchmark.
#[must_use]
pub fn router_with_subscribers(
    subscribers: usize,
    dispatch: Dispatch,
    capacity: usize,
) -> (Router, Vec<Subscription>) {
    let router = Router::with_config(RouterConfig {
        subscription_capacity: capacity,
        dispatch,
    });
    let topic = bench_topic();
    let subs = (0..subscribers).map(|_| router.subscribe(&topic)).collect();
    (router, subs)
}

/// A payload of `size` zero bytes.
#[must_use]
pub fn payload(size: usize) -> Bytes {
    Bytes::from(vec![0u8; size])
}

/// Empty every subscription's queue so the next iteration is not shed as full.
pub fn drain(subs: &mut [Subscription]) {
    for sub in subs {
        while sub.try_recv().is_ok() {}
    }
}
