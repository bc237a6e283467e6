//! Update bus implementation

use super::types::{AlertEvent, BusEvent, Tick, Topic};
use crate::connection::StateChange;
use crate::telemetry::{self, CounterMetric};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Subscriber callback
type Callback = Arc<dyn Fn(&BusEvent) + Send + Sync>;

/// Receives every published alert before UI subscribers do
pub trait AlertSink: Send + Sync {
    /// Forward an alert; must not block
    fn forward(&self, event: &AlertEvent);
}

struct Subscriber {
    id: u64,
    topic: Topic,
    callback: Callback,
}

#[derive(Default)]
struct DispatchState {
    active: bool,
    queue: VecDeque<BusEvent>,
}

struct Inner {
    subscribers: Mutex<Vec<Subscriber>>,
    snapshot: Mutex<HashMap<String, Tick>>,
    dispatch: Mutex<DispatchState>,
    alert_sink: Option<Arc<dyn AlertSink>>,
    next_id: AtomicU64,
}

/// Fan-out hub for ticks, alerts and connection state
///
/// Cloning is cheap and every clone refers to the same bus. Callbacks run
/// synchronously on the publishing task. A publish made from inside a
/// callback is queued and delivered once the current delivery finishes, so
/// no callback is ever re-entered.
#[derive(Clone)]
pub struct UpdateBus {
    inner: Arc<Inner>,
}

impl UpdateBus {
    /// Create a bus without an alert sink
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Create a bus that forwards every alert to `sink`
    pub fn with_alert_sink(sink: Arc<dyn AlertSink>) -> Self {
        Self::build(Some(sink))
    }

    fn build(alert_sink: Option<Arc<dyn AlertSink>>) -> Self {
        Self {
            inner: Arc::new(Inner {
                subscribers: Mutex::new(Vec::new()),
                snapshot: Mutex::new(HashMap::new()),
                dispatch: Mutex::new(DispatchState::default()),
                alert_sink,
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Register a callback for a topic
    ///
    /// The callback stays registered until the returned handle is dropped or
    /// [`Subscription::unsubscribe`] is called.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe<F>(&self, topic: Topic, callback: F) -> Subscription
    where
        F: Fn(&BusEvent) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(id, ?topic, "Subscriber registered");
        self.inner.subscribers.lock().push(Subscriber {
            id,
            topic,
            callback: Arc::new(callback),
        });
        Subscription {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Number of registered subscribers
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }

    /// Publish a tick batch
    ///
    /// Every symbol in the batch replaces its snapshot entry; symbols not in
    /// the batch keep their last value.
    pub fn publish_ticks(&self, batch: Vec<Tick>) {
        self.dispatch(BusEvent::Ticks(Arc::new(batch)));
    }

    /// Publish an alert to the alert sink and to alert subscribers
    pub fn publish_alert(&self, event: AlertEvent) {
        self.dispatch(BusEvent::Alert(event));
    }

    /// Publish a connection state change
    pub fn publish_state(&self, change: StateChange) {
        self.dispatch(BusEvent::State(change));
    }

    /// Latest known tick per symbol
    pub fn get_snapshot(&self) -> HashMap<String, Tick> {
        self.inner.snapshot.lock().clone()
    }

    /// Latest known tick for one symbol
    pub fn latest(&self, symbol: &str) -> Option<Tick> {
        self.inner.snapshot.lock().get(symbol).cloned()
    }

    fn dispatch(&self, event: BusEvent) {
        {
            let mut state = self.inner.dispatch.lock();
            if state.active {
                state.queue.push_back(event);
                return;
            }
            state.active = true;
        }

        let _reset = DispatchReset(&self.inner);
        let mut event = event;
        loop {
            self.deliver(&event);
            // Pop and release under one lock so a concurrent publisher
            // either lands in the queue or takes over dispatch
            let mut state = self.inner.dispatch.lock();
            match state.queue.pop_front() {
                Some(next) => event = next,
                None => {
                    state.active = false;
                    return;
                }
            }
        }
    }

    fn deliver(&self, event: &BusEvent) {
        match event {
            BusEvent::Ticks(batch) => {
                let mut snapshot = self.inner.snapshot.lock();
                for tick in batch.iter() {
                    snapshot.insert(tick.symbol.clone(), tick.clone());
                }
                drop(snapshot);
                telemetry::increment(CounterMetric::TickBatchesPublished);
            }
            BusEvent::Alert(alert) => {
                if let Some(sink) = &self.inner.alert_sink {
                    sink.forward(alert);
                }
                telemetry::increment(CounterMetric::AlertsPublished);
            }
            BusEvent::State(_) => {}
        }

        // Callbacks run without any bus lock held so they may subscribe,
        // unsubscribe or publish.
        let callbacks: Vec<Callback> = self
            .inner
            .subscribers
            .lock()
            .iter()
            .filter(|s| s.topic.matches(event))
            .map(|s| s.callback.clone())
            .collect();

        for callback in callbacks {
            callback(event);
        }
    }
}

impl Default for UpdateBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Clears the dispatching flag when a callback panics mid-delivery
struct DispatchReset<'a>(&'a Inner);

impl Drop for DispatchReset<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            let mut state = self.0.dispatch.lock();
            state.active = false;
            state.queue.clear();
        }
    }
}

/// Handle for a registered subscriber
pub struct Subscription {
    id: u64,
    inner: Weak<Inner>,
}

impl Subscription {
    /// Remove the subscriber from the bus
    pub fn unsubscribe(self) {
        // Drop does the work
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.subscribers.lock().retain(|s| s.id != self.id);
            tracing::debug!(id = self.id, "Subscriber removed");
        }
    }
}
