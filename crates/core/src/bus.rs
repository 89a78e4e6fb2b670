// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Aura Authors

//! Glob-pattern pub/sub event bus (§4.A).
//!
//! The subscription table is guarded by a mutex; `publish` snapshots the
//! matching subscriptions under the lock, releases it, then dispatches.
//! Each matched callback runs on its own `tokio::spawn`'d task so a
//! panicking subscriber can never unwind into the publisher or into a
//! sibling subscriber. A subscription's own callback is serialized against
//! itself (never runs concurrently with itself) via a per-subscription
//! mutex; delivery across distinct subscriptions is concurrent.

use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// An immutable published message.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Event {
    pub id: String,
    pub name: String,
    pub payload: serde_json::Value,
    pub timestamp_ms: u64,
    pub channel: String,
}

impl Event {
    pub fn new(name: impl Into<String>, payload: serde_json::Value, timestamp_ms: u64) -> Self {
        Self {
            id: nanoid::nanoid!(12),
            name: name.into(),
            payload,
            timestamp_ms,
            channel: "*".to_string(),
        }
    }

    pub fn on_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }
}

pub type Callback =
    Arc<dyn Fn(Event) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Opaque handle returned by [`EventBus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

struct Subscription {
    handle: SubscriptionHandle,
    channel: String,
    pattern: glob::Pattern,
    callback: Callback,
    owner: String,
    persistent: bool,
    serializer: Arc<tokio::sync::Mutex<()>>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Diagnostics {
    pub dispatched: u64,
    pub failed: u64,
}

/// Process-wide (or test-scoped) pub/sub bus.
pub struct EventBus {
    subscriptions: Mutex<Vec<Subscription>>,
    next_handle: AtomicU64,
    concurrency: Option<Arc<Semaphore>>,
    dispatched: AtomicU64,
    failed: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_concurrency(None)
    }

    pub fn with_concurrency(max_concurrent: Option<usize>) -> Self {
        Self {
            subscriptions: Mutex::new(Vec::new()),
            next_handle: AtomicU64::new(1),
            concurrency: max_concurrent.map(|n| Arc::new(Semaphore::new(n))),
            dispatched: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// `pattern` supports glob-style `*` (any run) and `?` (one char)
    /// against dot-separated event names.
    pub fn subscribe(
        &self,
        channel: impl Into<String>,
        pattern: &str,
        owner: impl Into<String>,
        persistent: bool,
        callback: Callback,
    ) -> Result<SubscriptionHandle, glob::PatternError> {
        let handle = SubscriptionHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        let sub = Subscription {
            handle,
            channel: channel.into(),
            pattern: glob::Pattern::new(pattern)?,
            callback,
            owner: owner.into(),
            persistent,
            serializer: Arc::new(tokio::sync::Mutex::new(())),
        };
        self.subscriptions.lock().push(sub);
        Ok(handle)
    }

    pub fn unsubscribe(&self, handle: SubscriptionHandle) {
        self.subscriptions.lock().retain(|s| s.handle != handle);
    }

    pub fn clear_non_persistent(&self) {
        self.subscriptions.lock().retain(|s| s.persistent);
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().len()
    }

    pub fn diagnostics(&self) -> Diagnostics {
        Diagnostics {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    /// Fire-and-forget to matching subscribers; never raises. Awaits
    /// completion of every matched callback before returning, with
    /// exception isolation — a callback panic is recorded in
    /// [`EventBus::diagnostics`] and never reaches the caller.
    pub async fn publish(&self, event: Event) {
        tracing::trace!(event = %event.name, channel = %event.channel, "publish");

        let matched: Vec<(Callback, Arc<tokio::sync::Mutex<()>>)> = {
            let subs = self.subscriptions.lock();
            subs.iter()
                .filter(|s| matches(s, &event))
                .map(|s| (s.callback.clone(), s.serializer.clone()))
                .collect()
        };

        let mut tasks = Vec::with_capacity(matched.len());
        for (callback, serializer) in matched {
            let event = event.clone();
            let permit = match &self.concurrency {
                Some(sem) => Some(sem.clone().acquire_owned().await.ok()),
                None => None,
            };
            // `tokio::spawn` gives each handler its own task; a panic
            // inside it surfaces as an `Err` on the JoinHandle instead of
            // unwinding into the publisher or a sibling subscriber.
            tasks.push(tokio::spawn(async move {
                let _guard = serializer.lock().await;
                callback(event).await;
                drop(permit);
            }));
        }

        for task in tasks {
            self.dispatched.fetch_add(1, Ordering::Relaxed);
            if let Err(join_err) = task.await {
                self.failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(error = %join_err, "event subscriber panicked");
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

fn matches(sub: &Subscription, event: &Event) -> bool {
    let channel_ok = sub.channel == "*" || sub.channel == event.channel;
    channel_ok && sub.pattern.matches(&event.name)
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
