use super::state::ReactiveState;
use crate::signal::Watch;
use parking_lot::Mutex;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::trace;

/// What kind of change a subscriber is being told about.
///
/// Field writes, patches and resets are all reported as `Direct`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    Direct,
}

impl MutationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationKind::Direct => "direct",
        }
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Describes the mutation delivered to a subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationInfo {
    pub store_id: String,
    pub kind: MutationKind,
}

pub(crate) type Subscriber = Arc<dyn Fn(&MutationInfo, &Value) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct SubscriptionId(u64);

/// Per-store subscriber list and the single watch that feeds it.
///
/// The watch only exists while at least one subscriber is registered.
pub(crate) struct Subscriptions {
    store_id: String,
    state: ReactiveState,
    inner: Mutex<SubscriptionsInner>,
}

struct SubscriptionsInner {
    next_id: u64,
    subscribers: Vec<(SubscriptionId, Subscriber)>,
    watch: Option<Watch>,
    // A delivery pass is running on this store
    delivering: bool,
    // The state changed again while a pass was running
    redeliver: bool,
}

impl Subscriptions {
    pub(crate) fn new(store_id: impl Into<String>, state: ReactiveState) -> Arc<Self> {
        Arc::new(Self {
            store_id: store_id.into(),
            state,
            inner: Mutex::new(SubscriptionsInner {
                next_id: 1,
                subscribers: Vec::new(),
                watch: None,
                delivering: false,
                redeliver: false,
            }),
        })
    }

    pub(crate) fn subscribe<F>(self: &Arc<Self>, subscriber: F) -> Unsubscribe
    where
        F: Fn(&MutationInfo, &Value) + Send + Sync + 'static,
    {
        let subscriber: Subscriber = Arc::new(subscriber);
        let (id, needs_watch) = {
            let mut inner = self.inner.lock();
            let id = SubscriptionId(inner.next_id);
            inner.next_id += 1;
            inner.subscribers.push((id, subscriber));
            (id, inner.watch.is_none())
        };

        if needs_watch {
            // Built outside the lock: creating the watch reads the state
            let watch = self.install_watch();
            let mut inner = self.inner.lock();
            if inner.watch.is_none() && !inner.subscribers.is_empty() {
                inner.watch = Some(watch);
                trace!(store = %self.store_id, "state watch installed");
            }
        }

        Unsubscribe {
            id,
            subscriptions: Arc::downgrade(self),
            done: Arc::new(AtomicBool::new(false)),
        }
    }

    fn install_watch(self: &Arc<Self>) -> Watch {
        let state = self.state.clone();
        let subscriptions = Arc::downgrade(self);
        Watch::new_in(
            self.state.runtime(),
            move || Value::Object(state.snapshot()),
            move |snapshot| {
                if let Some(subscriptions) = subscriptions.upgrade() {
                    subscriptions.deliver(snapshot);
                }
            },
        )
    }

    /// Deliver `snapshot` to every subscriber, then keep delivering fresh
    /// snapshots for as long as subscribers themselves change the state.
    ///
    /// Writes made by a subscriber do not interrupt the running pass; they
    /// are picked up by the next one, so every subscriber ends on the latest
    /// state.
    fn deliver(&self, snapshot: Value) {
        {
            let mut inner = self.inner.lock();
            if inner.delivering {
                inner.redeliver = true;
                return;
            }
            inner.delivering = true;
        }
        let _pass = DeliveryPass { subscriptions: self };

        let mutation = MutationInfo {
            store_id: self.store_id.clone(),
            kind: MutationKind::Direct,
        };
        let mut snapshot = snapshot;
        loop {
            let subscribers: Vec<Subscriber> = self
                .inner
                .lock()
                .subscribers
                .iter()
                .map(|(_, subscriber)| Arc::clone(subscriber))
                .collect();
            for subscriber in subscribers {
                subscriber(&mutation, &snapshot);
            }

            let again = std::mem::take(&mut self.inner.lock().redeliver);
            if !again {
                break;
            }
            trace!(store = %self.store_id, "state changed during delivery, delivering again");
            snapshot = Value::Object(self.state.snapshot_untracked());
        }
    }

    fn remove(&self, id: SubscriptionId) -> bool {
        let (removed, watch) = {
            let mut inner = self.inner.lock();
            let before = inner.subscribers.len();
            inner.subscribers.retain(|(existing, _)| *existing != id);
            let removed = inner.subscribers.len() != before;
            let watch = if inner.subscribers.is_empty() {
                inner.watch.take()
            } else {
                None
            };
            (removed, watch)
        };

        if watch.is_some() {
            drop(watch);
            trace!(store = %self.store_id, "state watch torn down");
        }
        removed
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.lock().subscribers.len()
    }

    pub(crate) fn is_watching(&self) -> bool {
        self.inner.lock().watch.is_some()
    }
}

/// Ends a delivery pass, also when a subscriber panics.
struct DeliveryPass<'a> {
    subscriptions: &'a Subscriptions,
}

impl Drop for DeliveryPass<'_> {
    fn drop(&mut self) {
        let mut inner = self.subscriptions.inner.lock();
        inner.delivering = false;
        inner.redeliver = false;
    }
}

/// Handle returned by [`Store::subscribe`](crate::Store::subscribe).
///
/// Dropping the handle does not unsubscribe; call [`unsubscribe`](Self::unsubscribe).
#[derive(Clone)]
pub struct Unsubscribe {
    id: SubscriptionId,
    subscriptions: Weak<Subscriptions>,
    done: Arc<AtomicBool>,
}

impl Unsubscribe {
    /// Remove the subscription. Only the first call has any effect; it
    /// returns `true` if a subscriber was removed.
    pub fn unsubscribe(&self) -> bool {
        if self.done.swap(true, Ordering::SeqCst) {
            return false;
        }
        match self.subscriptions.upgrade() {
            Some(subscriptions) => subscriptions.remove(self.id),
            None => false,
        }
    }

    /// Whether `unsubscribe` has not been called yet.
    pub fn is_active(&self) -> bool {
        !self.done.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unsubscribe")
            .field("id", &self.id.0)
            .field("active", &self.is_active())
            .finish()
    }
}
