//! Replayable, multicast feeds.
//!
//! A [`Feed`] wraps one recurring fetch.  It keeps the latest [`Outcome`] in
//! a replay slot and fans every new outcome out to its subscribers:
//!
//! ```text
//!  refresh() ──► FetchExecutor ──► publish() ──┬──► subscriber A
//!                                    │         ├──► subscriber B
//!                                    ▼         └──► ...
//!                               replay slot ──────► late subscriber (replay)
//! ```
//!
//! ## Ordering guarantees
//!
//! * `publish` stores the new outcome before notifying anyone, so a
//!   subscriber is never told about a value that `current()` does not yet
//!   reflect.
//! * Deliveries (publish fan-out and subscribe replay) go through a
//!   per-feed queue.  Each one is enqueued in the same critical section that
//!   swaps or reads the slot, so they run in slot order.  A subscriber added
//!   while a fan-out is running gets either the previous value followed by
//!   the new one, or only the new one.
//! * No lock is held while a callback runs.  Whichever thread finds the
//!   queue idle drains it; everyone else enqueues and returns.  Callbacks
//!   may therefore subscribe, cancel, or touch other feeds freely, and a
//!   slow callback never blocks `subscribe` or `publish` on other threads.
//! * Cancelling a [`Subscription`] stops delivery immediately, even mid
//!   fan-out, but never cancels a refresh already in flight.
//!
//! Callbacks run on whichever thread is draining the queue, usually the one
//! that completed the fetch.  They should hand the value off (e.g. over a
//! channel) rather than render inline.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::fetch::{FetchError, FetchExecutor, Outcome, RequestDescriptor};

type Callback<T> = dyn Fn(&Outcome<T>) + Send + Sync;
type DescriptorRule<T> = dyn Fn() -> Result<RequestDescriptor<T>, FetchError> + Send + Sync;

struct Listener<T> {
    id: u64,
    active: AtomicBool,
    callback: Box<Callback<T>>,
}

impl<T> Listener<T> {
    fn deliver(&self, outcome: &Outcome<T>) {
        if self.active.load(Ordering::Acquire) {
            (self.callback)(outcome);
        }
    }
}

/// One pending notification: `outcome` for each of `targets`.
struct Delivery<T> {
    outcome: Arc<Outcome<T>>,
    targets: Vec<Arc<Listener<T>>>,
}

struct Slot<T> {
    /// `None` until the first outcome arrives.
    current: Option<Arc<Outcome<T>>>,
    listeners: Vec<Arc<Listener<T>>>,
    next_id: u64,
    queue: VecDeque<Delivery<T>>,
    /// Some thread is inside [`Shared::drain`].
    draining: bool,
}

impl<T> Slot<T> {
    /// Queue `delivery`.  Returns `true` if the caller must drain.
    fn enqueue(&mut self, delivery: Delivery<T>) -> bool {
        self.queue.push_back(delivery);
        !std::mem::replace(&mut self.draining, true)
    }
}

struct Shared<T> {
    name: String,
    slot: Mutex<Slot<T>>,
}

impl<T> Shared<T> {
    /// Run queued deliveries until the queue is empty, without holding the
    /// slot lock across any callback.
    fn drain(&self) {
        let _reset = DrainReset(self);
        loop {
            let delivery = {
                let mut slot = self.slot.lock();
                match slot.queue.pop_front() {
                    Some(delivery) => delivery,
                    None => {
                        slot.draining = false;
                        return;
                    }
                }
            };
            for listener in &delivery.targets {
                listener.deliver(&delivery.outcome);
            }
        }
    }
}

/// Releases the drain role if a callback panics mid-drain.
struct DrainReset<'a, T>(&'a Shared<T>);

impl<T> Drop for DrainReset<'_, T> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.slot.lock().draining = false;
        }
    }
}

/// Removal hook a [`Subscription`] holds without knowing the feed's type.
trait Unsubscribe: Send + Sync {
    fn unsubscribe(&self, id: u64);
}

impl<T: Send + Sync> Unsubscribe for Shared<T> {
    fn unsubscribe(&self, id: u64) {
        let mut slot = self.slot.lock();
        if let Some(pos) = slot.listeners.iter().position(|l| l.id == id) {
            let listener = slot.listeners.remove(pos);
            listener.active.store(false, Ordering::Release);
            debug!(feed = %self.name, subscriber = id, "unsubscribed");
        }
    }
}

/// Handle returned by [`Feed::subscribe`].
///
/// Dropping the handle cancels it.  [`cancel`](Self::cancel) is idempotent
/// and does nothing once the feed itself is gone.
#[must_use = "dropping a Subscription cancels it"]
pub struct Subscription {
    feed: Weak<dyn Unsubscribe>,
    id: u64,
}

impl Subscription {
    pub fn cancel(&self) {
        if let Some(feed) = self.feed.upgrade() {
            feed.unsubscribe(self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

/// A named replay slot fed by one fetch rule.
///
/// Clones share the same slot and subscribers.
pub struct Feed<T> {
    shared: Arc<Shared<T>>,
    executor: FetchExecutor,
    rule: Arc<DescriptorRule<T>>,
}

impl<T> Clone for Feed<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            executor: self.executor.clone(),
            rule: Arc::clone(&self.rule),
        }
    }
}

impl<T> Feed<T>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    /// Create an empty feed.  Nothing is fetched until [`refresh`](Self::refresh).
    ///
    /// `rule` builds the request on every refresh; if it fails, the failure
    /// is published like any other outcome.
    pub fn new<R>(name: impl Into<String>, executor: FetchExecutor, rule: R) -> Self
    where
        R: Fn() -> Result<RequestDescriptor<T>, FetchError> + Send + Sync + 'static,
    {
        Self {
            shared: Arc::new(Shared {
                name: name.into(),
                slot: Mutex::new(Slot {
                    current: None,
                    listeners: Vec::new(),
                    next_id: 0,
                    queue: VecDeque::new(),
                    draining: false,
                }),
            }),
            executor,
            rule: Arc::new(rule),
        }
    }

    /// Create a feed and immediately spawn its first refresh.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start<R>(name: impl Into<String>, executor: FetchExecutor, rule: R) -> Self
    where
        R: Fn() -> Result<RequestDescriptor<T>, FetchError> + Send + Sync + 'static,
    {
        let feed = Self::new(name, executor, rule);
        feed.spawn_refresh();
        feed
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// The replay slot; `None` until the first refresh completes.
    pub fn current(&self) -> Option<Arc<Outcome<T>>> {
        self.shared.slot.lock().current.clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.slot.lock().listeners.len()
    }

    /// Register `callback`.
    ///
    /// If the slot already holds an outcome, it is replayed to `callback`
    /// immediately: before this returns when no other delivery is running,
    /// otherwise right after the running one.  Afterwards `callback`
    /// receives every published outcome until the returned handle is
    /// cancelled or dropped.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Outcome<T>) + Send + Sync + 'static,
    {
        let (id, replay, drain) = {
            let mut slot = self.shared.slot.lock();
            let id = slot.next_id;
            slot.next_id += 1;
            let listener = Arc::new(Listener {
                id,
                active: AtomicBool::new(true),
                callback: Box::new(callback),
            });
            slot.listeners.push(Arc::clone(&listener));

            match slot.current.clone() {
                Some(outcome) => {
                    let drain = slot.enqueue(Delivery {
                        outcome,
                        targets: vec![listener],
                    });
                    (id, true, drain)
                }
                None => (id, false, false),
            }
        };

        debug!(feed = %self.shared.name, subscriber = id, replay, "subscribed");
        if drain {
            self.shared.drain();
        }

        let shared: Weak<Shared<T>> = Arc::downgrade(&self.shared);
        let feed: Weak<dyn Unsubscribe> = shared;
        Subscription { feed, id }
    }

    /// Fetch once and publish the outcome, success or failure.
    pub async fn refresh(&self) {
        let outcome = match (self.rule)() {
            Ok(descriptor) => self.executor.execute(&descriptor).await,
            Err(e) => Err(e),
        };
        self.publish(outcome);
    }

    /// Run [`refresh`](Self::refresh) on the current Tokio runtime.
    pub fn spawn_refresh(&self) -> JoinHandle<()> {
        let feed = self.clone();
        tokio::spawn(async move { feed.refresh().await })
    }

    /// Swap `outcome` into the slot and queue it for every registered
    /// listener, in one step.
    fn publish(&self, outcome: Outcome<T>) {
        let outcome = Arc::new(outcome);
        let (subscribers, drain) = {
            let mut slot = self.shared.slot.lock();
            slot.current = Some(Arc::clone(&outcome));
            let targets = slot.listeners.clone();
            let subscribers = targets.len();
            let drain = slot.enqueue(Delivery {
                outcome: Arc::clone(&outcome),
                targets,
            });
            (subscribers, drain)
        };

        match outcome.as_ref() {
            Ok(_) => info!(feed = %self.shared.name, subscribers, "published update"),
            Err(e) => warn!(feed = %self.shared.name, subscribers, error = %e, "published failure"),
        }

        if drain {
            self.shared.drain();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::stub::StubTransport;
    use crate::model::{MovieResponse, Page};
    use std::sync::{mpsc, Barrier};
    use std::thread;
    use std::time::Duration;

    const ADDRESS: &str = "http://stub.test/movie/popular";

    fn popular_feed(stub: &Arc<StubTransport>) -> Feed<MovieResponse> {
        Feed::new("popular", FetchExecutor::new(stub.clone()), || {
            RequestDescriptor::parse(ADDRESS)
        })
    }

    /// Subscribe and collect everything delivered into a vector.
    fn record(feed: &Feed<MovieResponse>) -> (Subscription, Arc<Mutex<Vec<Outcome<MovieResponse>>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let sub = feed.subscribe(move |o| sink.lock().push(o.clone()));
        (sub, seen)
    }

    fn ids(outcome: &Outcome<MovieResponse>) -> Vec<Option<i64>> {
        outcome
            .as_ref()
            .expect("expected success")
            .results
            .iter()
            .map(|m| m.id)
            .collect()
    }

    // -- replay --------------------------------------------------------------

    #[tokio::test]
    async fn subscribing_before_first_refresh_yields_nothing() {
        let stub = StubTransport::new();
        let feed = popular_feed(&stub);

        let (_sub, seen) = record(&feed);
        assert!(seen.lock().is_empty());
        assert!(feed.current().is_none());
        assert_eq!(stub.calls(), 0);
    }

    #[tokio::test]
    async fn late_subscriber_gets_replay_without_new_request() {
        let stub = StubTransport::new();
        stub.respond("/movie/popular", 200, r#"{"results":[{"id":1}]}"#);
        let feed = popular_feed(&stub);

        feed.refresh().await;
        assert_eq!(stub.calls(), 1);

        let (_sub, seen) = record(&feed);
        let seen = seen.lock();
        assert_eq!(seen.len(), 1, "replay is delivered before subscribe returns");
        assert_eq!(ids(&seen[0]), vec![Some(1)]);
        assert_eq!(stub.calls(), 1);
    }

    #[tokio::test]
    async fn refresh_notifies_all_subscribers() {
        let stub = StubTransport::new();
        stub.respond("/movie/popular", 200, r#"{"results":[{"id":1},{"id":2}]}"#);
        let feed = popular_feed(&stub);

        let (_a, seen_a) = record(&feed);
        let (_b, seen_b) = record(&feed);
        feed.refresh().await;

        assert_eq!(ids(&seen_a.lock()[0]), vec![Some(1), Some(2)]);
        assert_eq!(ids(&seen_b.lock()[0]), vec![Some(1), Some(2)]);
    }

    #[tokio::test]
    async fn failure_overwrites_previous_success() {
        let stub = StubTransport::new();
        stub.respond("/movie/popular", 200, r#"{"results":[{"id":1}]}"#);
        let feed = popular_feed(&stub);
        let (_sub, seen) = record(&feed);

        feed.refresh().await;
        stub.respond("/movie/popular", 500, "");
        feed.refresh().await;

        assert!(matches!(
            feed.current().as_deref(),
            Some(Err(FetchError::UnexpectedStatus(500)))
        ));
        assert_eq!(seen.lock().len(), 2);

        // A failed refresh does not end the feed.
        stub.respond("/movie/popular", 200, r#"{"results":[{"id":3}]}"#);
        feed.refresh().await;
        assert_eq!(ids(&feed.current().unwrap()), vec![Some(3)]);
    }

    #[tokio::test]
    async fn unbuildable_descriptor_is_published_as_failure() {
        let stub = StubTransport::new();
        let feed: Feed<MovieResponse> = Feed::new("no-key", FetchExecutor::new(stub.clone()), || {
            Err(FetchError::InvalidAddress("API key is not configured".into()))
        });
        let (_sub, seen) = record(&feed);

        feed.refresh().await;

        assert!(matches!(seen.lock()[0], Err(FetchError::InvalidAddress(_))));
        assert_eq!(stub.calls(), 0);
    }

    // -- cancellation --------------------------------------------------------

    #[tokio::test]
    async fn cancel_stops_notifications_and_is_idempotent() {
        let stub = StubTransport::new();
        stub.respond("/movie/popular", 200, r#"{"results":[]}"#);
        let feed = popular_feed(&stub);

        let (sub, seen) = record(&feed);
        feed.refresh().await;
        sub.cancel();
        sub.cancel();
        feed.refresh().await;

        assert_eq!(seen.lock().len(), 1);
        assert_eq!(feed.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn dropping_handle_cancels() {
        let stub = StubTransport::new();
        let feed = popular_feed(&stub);
        {
            let (_sub, _seen) = record(&feed);
            assert_eq!(feed.subscriber_count(), 1);
        }
        assert_eq!(feed.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn cancel_after_feed_is_gone_is_noop() {
        let stub = StubTransport::new();
        let feed = popular_feed(&stub);
        let (sub, _seen) = record(&feed);

        drop(feed);
        sub.cancel();
        sub.cancel();
    }

    #[tokio::test]
    async fn cancel_from_inside_a_callback_stops_later_listeners() {
        let stub = StubTransport::new();
        stub.respond("/movie/popular", 200, r#"{"results":[]}"#);
        let feed = popular_feed(&stub);

        let victim: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&victim);
        let _killer = feed.subscribe(move |_| {
            if let Some(sub) = slot.lock().take() {
                sub.cancel();
            }
        });
        let (victim_sub, victim_seen) = record(&feed);
        *victim.lock() = Some(victim_sub);

        feed.refresh().await;
        assert!(victim_seen.lock().is_empty());
    }

    // -- re-entrancy ---------------------------------------------------------

    #[tokio::test]
    async fn subscribing_inside_a_callback_sees_the_new_value() {
        let stub = StubTransport::new();
        stub.respond("/movie/popular", 200, r#"{"results":[{"id":9}]}"#);
        let feed = popular_feed(&stub);

        let nested_seen = Arc::new(Mutex::new(Vec::new()));
        let nested_subs = Arc::new(Mutex::new(Vec::new()));
        let inner_feed = feed.clone();
        let (sink, subs) = (Arc::clone(&nested_seen), Arc::clone(&nested_subs));
        let _outer = feed.subscribe(move |_| {
            let sink = Arc::clone(&sink);
            let sub = inner_feed.subscribe(move |o: &Outcome<MovieResponse>| {
                sink.lock().push(o.clone())
            });
            subs.lock().push(sub);
        });

        feed.refresh().await;

        let seen = nested_seen.lock();
        assert_eq!(seen.len(), 1, "nested subscriber gets exactly one delivery");
        assert_eq!(ids(&seen[0]), vec![Some(9)]);
    }

    #[test]
    fn callbacks_subscribing_across_feeds_do_not_deadlock() {
        let stub = StubTransport::new();
        let first = popular_feed(&stub);
        let second = popular_feed(&stub);
        let both_inside = Arc::new(Barrier::new(2));
        let nested = Arc::new(Mutex::new(Vec::new()));

        // Each feed's callback waits until the other feed is also mid-delivery,
        // then subscribes to it.
        let (seen_first, _sub_a) = cross_subscribe(&first, &second, &both_inside, &nested);
        let (seen_second, _sub_b) = cross_subscribe(&second, &first, &both_inside, &nested);

        let (tx, rx) = mpsc::channel();
        let publishers: Vec<_> = [first.clone(), second.clone()]
            .into_iter()
            .map(|feed| {
                let tx = tx.clone();
                thread::spawn(move || {
                    feed.publish(Ok(Page::default()));
                    let _ = tx.send(());
                })
            })
            .collect();

        for _ in 0..2 {
            rx.recv_timeout(Duration::from_secs(5))
                .expect("publishers should not deadlock");
        }
        for publisher in publishers {
            publisher.join().unwrap();
        }

        assert_eq!(seen_first.lock().len(), 1);
        assert_eq!(seen_second.lock().len(), 1);
        assert_eq!(nested.lock().len(), 2);
    }

    /// Subscribe to `feed`; on delivery, rendezvous on `barrier` and then
    /// subscribe to `other`, recording what the new subscription receives.
    fn cross_subscribe(
        feed: &Feed<MovieResponse>,
        other: &Feed<MovieResponse>,
        barrier: &Arc<Barrier>,
        nested: &Arc<Mutex<Vec<Subscription>>>,
    ) -> (Arc<Mutex<Vec<Outcome<MovieResponse>>>>, Subscription) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (other, barrier, nested, sink) = (
            other.clone(),
            Arc::clone(barrier),
            Arc::clone(nested),
            Arc::clone(&seen),
        );
        let sub = feed.subscribe(move |_| {
            barrier.wait();
            let sink = Arc::clone(&sink);
            let sub = other.subscribe(move |o: &Outcome<MovieResponse>| {
                sink.lock().push(o.clone())
            });
            nested.lock().push(sub);
        });
        (seen, sub)
    }

    #[test]
    fn slow_callback_does_not_block_subscribe_elsewhere() {
        let stub = StubTransport::new();
        let feed = popular_feed(&stub);
        let started = Arc::new(Barrier::new(2));
        let release = Arc::new(Barrier::new(2));

        let (inside, hold) = (Arc::clone(&started), Arc::clone(&release));
        let _slow = feed.subscribe(move |_| {
            inside.wait();
            hold.wait();
        });

        let publisher = {
            let feed = feed.clone();
            thread::spawn(move || feed.publish(Ok(Page::default())))
        };
        started.wait();

        let (tx, rx) = mpsc::channel();
        let subscriber = {
            let feed = feed.clone();
            thread::spawn(move || {
                let (sub, seen) = record(&feed);
                let _ = tx.send(seen.lock().len());
                (sub, seen)
            })
        };
        let delivered_during_slow_callback = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("subscribe should return while another callback runs");
        assert_eq!(delivered_during_slow_callback, 0);

        release.wait();
        publisher.join().unwrap();
        let (_sub, seen) = subscriber.join().unwrap();

        // The replay was handed to the thread already delivering.
        assert_eq!(seen.lock().len(), 1);
        assert!(seen.lock()[0].is_ok());
    }

    // -- construction --------------------------------------------------------

    #[tokio::test]
    async fn start_triggers_one_refresh() {
        let stub = StubTransport::new();
        stub.respond("/movie/popular", 200, r#"{"results":[{"id":5}]}"#);

        let feed: Feed<MovieResponse> = Feed::start("popular", FetchExecutor::new(stub.clone()), || {
            RequestDescriptor::parse(ADDRESS)
        });
        let (tx, rx) = mpsc::channel();
        let _sub = feed.subscribe(move |o| {
            let _ = tx.send(o.clone());
        });

        let outcome = tokio::task::spawn_blocking(move || rx.recv_timeout(Duration::from_secs(5)))
            .await
            .unwrap()
            .expect("first refresh should publish");
        assert_eq!(ids(&outcome), vec![Some(5)]);
        assert_eq!(stub.calls(), 1);
    }

    #[tokio::test]
    async fn concurrent_refreshes_leave_slot_consistent() {
        let stub = StubTransport::new();
        stub.respond("/movie/popular", 200, r#"{"results":[{"id":1}]}"#);
        let feed = popular_feed(&stub);
        let (_sub, seen) = record(&feed);

        let handles: Vec<_> = (0..8).map(|_| feed.spawn_refresh()).collect();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(seen.lock().len(), 8);
        assert_eq!(stub.calls(), 8);
        assert_eq!(ids(&feed.current().unwrap()), vec![Some(1)]);
    }
}
