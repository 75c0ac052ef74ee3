//! Per-job event bus
//!
//! An [`EventBus`] is an ordered, append-only sequence of [`Event`]s with any
//! number of independent [`Subscription`]s. Every subscriber first receives the
//! retained backlog (full replay from the start of the job) and then every
//! event published afterwards, in publish order.
//!
//! Each subscriber owns a bounded queue, and the replay backlog is bounded the
//! same way. When a queue is full the oldest `Log` event in *that* queue is
//! dropped to make room, then progress ticks already superseded by a newer
//! tick of the same item. `NewItem` and terminal events are never dropped,
//! and the latest progress of every item is kept.
//!
//! Exactly one terminal event (`Error` or `Finished`) can be published. It
//! closes the bus: later publishes are rejected and each subscription ends
//! after delivering its queued events.

use crate::types::Event;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

/// Default per-subscriber queue capacity
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 1024;

/// Default number of events retained for replay
pub const DEFAULT_BACKLOG_LIMIT: usize = 10_000;

/// Lock a mutex, recovering the data if a holder panicked
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Push `event` onto a bounded queue, making room when full
///
/// Room is made by evicting the oldest `Log`, then the oldest `Progress`
/// already superseded by a later `Progress` of the same item. A full queue
/// holding neither discards an incoming `Log` and lets an incoming `Progress`
/// replace the current item's latest one. Only `NewItem` and terminal events
/// can grow the queue past `capacity`.
///
/// Returns the number of events lost (evicted or discarded), 0 or 1.
fn push_bounded(queue: &mut VecDeque<Event>, event: Event, capacity: usize) -> u64 {
    let mut lost = 0;
    if queue.len() >= capacity {
        if let Some(pos) = evictable(queue) {
            queue.remove(pos);
            lost = 1;
        } else if event.is_droppable() {
            return 1;
        } else if matches!(event, Event::Progress { .. })
            && let Some(pos) = current_progress(queue)
        {
            queue.remove(pos);
            lost = 1;
        }
    }
    queue.push_back(event);
    lost
}

/// Oldest `Log`, else oldest `Progress` followed by another `Progress` before any `NewItem`
fn evictable(queue: &VecDeque<Event>) -> Option<usize> {
    if let Some(pos) = queue.iter().position(Event::is_droppable) {
        return Some(pos);
    }
    let mut pending = None;
    for (pos, event) in queue.iter().enumerate() {
        match event {
            Event::Progress { .. } if pending.is_some() => return pending,
            Event::Progress { .. } => pending = Some(pos),
            Event::NewItem { .. } => pending = None,
            _ => {}
        }
    }
    None
}

/// Latest `Progress` after the last `NewItem`
fn current_progress(queue: &VecDeque<Event>) -> Option<usize> {
    for (pos, event) in queue.iter().enumerate().rev() {
        match event {
            Event::Progress { .. } => return Some(pos),
            Event::NewItem { .. } => return None,
            _ => {}
        }
    }
    None
}

struct SlotQueue {
    events: VecDeque<Event>,
    closed: bool,
    dropped: u64,
}

/// Receiving end of one subscriber
struct Slot {
    queue: Mutex<SlotQueue>,
    notify: Notify,
}

impl Slot {
    fn deliver(&self, event: Event, capacity: usize) {
        {
            let mut queue = lock(&self.queue);
            if queue.closed {
                return;
            }
            let terminal = event.is_terminal();
            let lost = push_bounded(&mut queue.events, event, capacity);
            queue.dropped += lost;
            if terminal {
                queue.closed = true;
            }
        }
        self.notify.notify_one();
    }

    fn close(&self) {
        lock(&self.queue).closed = true;
        self.notify.notify_one();
    }
}

struct BusState {
    backlog: VecDeque<Event>,
    closed: bool,
    terminal_published: bool,
    subscribers: HashMap<u64, Arc<Slot>>,
    next_subscriber_id: u64,
}

struct BusInner {
    state: Mutex<BusState>,
    subscriber_capacity: usize,
    backlog_limit: usize,
}

/// Multi-consumer broadcast of one job's events
///
/// Cloning an `EventBus` yields another handle to the same bus.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_SUBSCRIBER_CAPACITY, DEFAULT_BACKLOG_LIMIT)
    }
}

impl EventBus {
    /// Create a bus with the given per-subscriber capacity and backlog limit
    pub fn new(subscriber_capacity: usize, backlog_limit: usize) -> Self {
        Self {
            inner: Arc::new(BusInner {
                state: Mutex::new(BusState {
                    backlog: VecDeque::new(),
                    closed: false,
                    terminal_published: false,
                    subscribers: HashMap::new(),
                    next_subscriber_id: 0,
                }),
                subscriber_capacity: subscriber_capacity.max(1),
                backlog_limit: backlog_limit.max(1),
            }),
        }
    }

    /// Append an event and wake every subscriber
    ///
    /// Returns `false` if the bus is closed (a terminal event was already
    /// published or [`close`](Self::close) was called) and the event was discarded.
    pub fn publish(&self, event: Event) -> bool {
        let mut state = lock(&self.inner.state);
        if state.closed {
            tracing::warn!(event = event.name(), "publish on closed event bus ignored");
            return false;
        }

        let terminal = event.is_terminal();
        push_bounded(&mut state.backlog, event.clone(), self.inner.backlog_limit);
        for slot in state.subscribers.values() {
            slot.deliver(event.clone(), self.inner.subscriber_capacity);
        }

        if terminal {
            state.terminal_published = true;
            state.closed = true;
        }
        true
    }

    /// Attach a new subscriber
    ///
    /// The subscription starts with a replay of the retained backlog, followed
    /// by live events. Subscribing to a closed bus replays the backlog and then ends.
    pub fn subscribe(&self) -> Subscription {
        let mut state = lock(&self.inner.state);
        let slot = Arc::new(Slot {
            queue: Mutex::new(SlotQueue {
                events: state.backlog.clone(),
                closed: state.closed,
                dropped: 0,
            }),
            notify: Notify::new(),
        });

        let id = state.next_subscriber_id;
        state.next_subscriber_id += 1;
        state.subscribers.insert(id, slot.clone());

        Subscription {
            bus: Arc::downgrade(&self.inner),
            id,
            slot,
        }
    }

    /// Close the bus and release its replay backlog
    ///
    /// Idempotent. Further publishes are rejected and later subscriptions end
    /// right away; current subscribers drain what they already have queued.
    pub fn close(&self) {
        let mut state = lock(&self.inner.state);
        state.closed = true;
        state.backlog = VecDeque::new();
        for slot in state.subscribers.values() {
            slot.close();
        }
    }

    /// Whether the bus accepts no more events
    pub fn is_closed(&self) -> bool {
        lock(&self.inner.state).closed
    }

    /// Whether a terminal event has been published
    pub fn has_terminated(&self) -> bool {
        lock(&self.inner.state).terminal_published
    }

    /// Number of attached subscribers
    pub fn subscriber_count(&self) -> usize {
        lock(&self.inner.state).subscribers.len()
    }

    /// Number of events retained for replay
    pub fn backlog_len(&self) -> usize {
        lock(&self.inner.state).backlog.len()
    }

    /// Copy of the retained backlog
    pub fn snapshot(&self) -> Vec<Event> {
        lock(&self.inner.state).backlog.iter().cloned().collect()
    }
}

/// One observer's read cursor on an [`EventBus`]
///
/// Dropping the subscription detaches it from the bus; the job is unaffected.
pub struct Subscription {
    bus: std::sync::Weak<BusInner>,
    id: u64,
    slot: Arc<Slot>,
}

impl Subscription {
    /// Wait for the next event
    ///
    /// Returns `None` once the bus is closed and every queued event was
    /// delivered. After a terminal event has been returned, the next call
    /// returns `None`.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            if let Some(next) = self.try_next() {
                return next;
            }
            // notify_one stores a permit, so a publish between the check and
            // this await is not lost
            self.slot.notify.notified().await;
        }
    }

    /// Return the next queued event without waiting
    ///
    /// `None` if nothing is queued right now (or the subscription ended).
    pub fn try_recv(&mut self) -> Option<Event> {
        self.try_next().flatten()
    }

    /// `Some(Some(e))` event ready, `Some(None)` ended, `None` must wait
    fn try_next(&self) -> Option<Option<Event>> {
        let mut queue = lock(&self.slot.queue);
        if let Some(event) = queue.events.pop_front() {
            return Some(Some(event));
        }
        if queue.closed {
            return Some(None);
        }
        None
    }

    /// Number of events lost by this subscriber because it fell behind
    pub fn dropped(&self) -> u64 {
        lock(&self.slot.queue).dropped
    }

    /// Convert into a stream that ends with the subscription
    pub fn into_stream(self) -> impl futures::Stream<Item = Event> + Send + 'static {
        futures::stream::unfold(self, |mut sub| async move {
            sub.recv().await.map(|event| (event, sub))
        })
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            lock(&bus.state).subscribers.remove(&self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ErrorKind;
    use std::time::Duration;

    fn progress(p: f32) -> Event {
        Event::progress(p)
    }

    #[tokio::test]
    async fn test_subscriber_receives_events_in_order() {
        let bus = EventBus::default();
        let mut sub = bus.subscribe();

        bus.publish(Event::log("starting"));
        bus.publish(Event::NewItem {
            title: "first".into(),
        });
        bus.publish(progress(50.0));
        bus.publish(Event::Finished);

        assert_eq!(sub.recv().await, Some(Event::log("starting")));
        assert_eq!(
            sub.recv().await,
            Some(Event::NewItem {
                title: "first".into()
            })
        );
        assert_eq!(sub.recv().await, Some(progress(50.0)));
        assert_eq!(sub.recv().await, Some(Event::Finished));
        assert_eq!(sub.recv().await, None);
    }

    #[tokio::test]
    async fn test_late_subscriber_gets_full_backlog_replay() {
        let bus = EventBus::default();
        bus.publish(Event::log("a"));
        bus.publish(Event::log("b"));

        let mut late = bus.subscribe();
        bus.publish(Event::log("c"));
        bus.publish(Event::Finished);

        let mut seen = Vec::new();
        while let Some(event) = late.recv().await {
            seen.push(event);
        }
        assert_eq!(
            seen,
            vec![
                Event::log("a"),
                Event::log("b"),
                Event::log("c"),
                Event::Finished
            ]
        );
    }

    #[tokio::test]
    async fn test_subscribe_after_terminal_replays_and_ends() {
        let bus = EventBus::default();
        bus.publish(Event::NewItem { title: "x".into() });
        bus.publish(Event::Error {
            message: "boom".into(),
            kind: ErrorKind::Extraction,
        });

        let mut sub = bus.subscribe();
        assert_eq!(sub.recv().await, Some(Event::NewItem { title: "x".into() }));
        assert!(matches!(sub.recv().await, Some(Event::Error { .. })));
        assert_eq!(sub.recv().await, None);
    }

    #[test]
    fn test_only_one_terminal_event_is_accepted() {
        let bus = EventBus::default();
        assert!(bus.publish(Event::Finished));
        assert!(!bus.publish(Event::Error {
            message: "late".into(),
            kind: ErrorKind::Extraction,
        }));
        assert!(!bus.publish(Event::log("after")));
        assert!(bus.has_terminated());
        assert_eq!(bus.snapshot(), vec![Event::Finished]);
    }

    #[tokio::test]
    async fn test_waiting_subscriber_is_woken_promptly() {
        let bus = EventBus::default();
        let mut sub = bus.subscribe();

        let waiter = tokio::spawn(async move { sub.recv().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        bus.publish(Event::log("wake"));

        let received = tokio::time::timeout(Duration::from_millis(500), waiter)
            .await
            .expect("subscriber should be woken without polling")
            .unwrap();
        assert_eq!(received, Some(Event::log("wake")));
    }

    #[tokio::test]
    async fn test_slow_subscriber_drops_logs_then_stale_progress() {
        let bus = EventBus::new(3, 100);
        let mut slow = bus.subscribe();

        bus.publish(Event::NewItem { title: "t".into() });
        bus.publish(Event::log("l1"));
        bus.publish(progress(10.0));
        bus.publish(Event::log("l2")); // evicts l1
        bus.publish(progress(20.0)); // evicts l2
        bus.publish(Event::Finished); // evicts the superseded 10%

        let mut seen = Vec::new();
        while let Some(event) = slow.recv().await {
            seen.push(event);
        }
        assert_eq!(
            seen,
            vec![Event::NewItem { title: "t".into() }, progress(20.0), Event::Finished]
        );
        assert_eq!(slow.dropped(), 3);
    }

    #[tokio::test]
    async fn test_full_queue_keeps_latest_progress_per_item() {
        let bus = EventBus::new(2, 100);
        let mut sub = bus.subscribe();

        bus.publish(Event::NewItem { title: "t".into() });
        bus.publish(progress(1.0));
        bus.publish(Event::log("noise")); // nothing to evict: discarded
        bus.publish(progress(2.0)); // replaces 1%

        assert_eq!(sub.dropped(), 2);
        assert_eq!(sub.try_recv(), Some(Event::NewItem { title: "t".into() }));
        assert_eq!(sub.try_recv(), Some(progress(2.0)));
        assert_eq!(sub.try_recv(), None);
    }

    #[test]
    fn test_progress_flood_stays_within_limits() {
        let bus = EventBus::new(16, 100);
        let mut sub = bus.subscribe();

        bus.publish(Event::NewItem { title: "t".into() });
        for i in 0..10_000 {
            bus.publish(progress(i as f32 / 100.0));
        }
        bus.publish(Event::log("after"));

        assert_eq!(bus.backlog_len(), 100);
        let backlog = bus.snapshot();
        assert_eq!(backlog[0], Event::NewItem { title: "t".into() });
        assert_eq!(backlog[98], progress(99.99));
        assert_eq!(backlog[99], Event::log("after"));

        let mut queued = Vec::new();
        while let Some(event) = sub.try_recv() {
            queued.push(event);
        }
        assert_eq!(queued.len(), 16);
        assert_eq!(queued.last(), Some(&Event::log("after")));
        assert_eq!(sub.dropped(), 9_986);
    }

    #[tokio::test]
    async fn test_slow_subscriber_does_not_affect_fast_one() {
        let bus = EventBus::new(2, 100);
        let mut fast = bus.subscribe();
        let slow = bus.subscribe();

        for i in 0..5 {
            bus.publish(Event::log(format!("line {i}")));
            assert_eq!(fast.recv().await, Some(Event::log(format!("line {i}"))));
        }
        assert_eq!(fast.dropped(), 0);
        assert_eq!(slow.dropped(), 3);
    }

    #[test]
    fn test_backlog_limit_evicts_oldest_logs_first() {
        let bus = EventBus::new(10, 2);
        bus.publish(Event::log("old"));
        bus.publish(Event::NewItem { title: "t".into() });
        bus.publish(progress(5.0));

        assert_eq!(
            bus.snapshot(),
            vec![Event::NewItem { title: "t".into() }, progress(5.0)]
        );
    }

    #[test]
    fn test_drop_detaches_subscription() {
        let bus = EventBus::default();
        let a = bus.subscribe();
        let b = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
        drop(a);
        assert_eq!(bus.subscriber_count(), 1);
        drop(b);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_ends_subscriptions() {
        let bus = EventBus::default();
        let mut sub = bus.subscribe();
        bus.publish(Event::log("queued"));

        bus.close();
        bus.close();

        assert!(bus.is_closed());
        assert!(!bus.has_terminated());
        assert_eq!(bus.backlog_len(), 0);
        assert!(!bus.publish(Event::log("rejected")));
        assert_eq!(sub.recv().await, Some(Event::log("queued")));
        assert_eq!(sub.recv().await, None);

        let mut late = bus.subscribe();
        assert_eq!(late.recv().await, None);
    }

    #[test]
    fn test_close_after_terminal_releases_backlog() {
        let bus = EventBus::default();
        bus.publish(Event::log("a"));
        bus.publish(Event::Finished);
        assert_eq!(bus.backlog_len(), 2);

        bus.close();
        assert!(bus.has_terminated());
        assert_eq!(bus.backlog_len(), 0);
    }

    #[tokio::test]
    async fn test_into_stream_ends_after_terminal() {
        use futures::StreamExt;

        let bus = EventBus::default();
        let sub = bus.subscribe();
        bus.publish(Event::log("one"));
        bus.publish(Event::Finished);

        let events: Vec<Event> = sub.into_stream().collect().await;
        assert_eq!(events, vec![Event::log("one"), Event::Finished]);
    }

    #[test]
    fn test_subscription_outliving_bus_drops_cleanly() {
        let bus = EventBus::default();
        let sub = bus.subscribe();
        drop(bus);
        drop(sub);
    }
}
