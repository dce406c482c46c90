use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{trace, warn};

use kindred_types::events::CircleEvent;

type Callback = Arc<dyn Fn(&CircleEvent) + Send + Sync>;

/// In-process pub/sub for circle events. Cloning shares the same registry;
/// create one per process and hand it to whatever needs to publish.
///
/// Delivery is at most once: no backlog, no retry. Late subscribers never
/// see earlier events.
#[derive(Clone, Default)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

#[derive(Default)]
struct DispatcherInner {
    /// channel name -> (subscription id -> callback)
    channels: RwLock<HashMap<String, HashMap<u64, Callback>>>,
    next_id: AtomicU64,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for `channel`. It stays registered until the
    /// returned [`Subscription`] is dropped or unsubscribed.
    pub fn subscribe<F>(&self, channel: &str, callback: F) -> Subscription
    where
        F: Fn(&CircleEvent) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .channels
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(channel.to_string())
            .or_default()
            .insert(id, Arc::new(callback));

        trace!("Subscribed #{} to {}", id, channel);
        Subscription {
            dispatcher: self.clone(),
            channel: channel.to_string(),
            id,
            active: true,
        }
    }

    /// Invoke every callback registered on `channel` and return how many
    /// were called. Callbacks run on a snapshot taken outside the lock, so
    /// they may subscribe or unsubscribe freely. A panicking callback is
    /// logged and skipped.
    pub fn publish(&self, channel: &str, event: &CircleEvent) -> usize {
        let snapshot: Vec<Callback> = {
            let channels = self.inner.channels.read().unwrap_or_else(PoisonError::into_inner);
            match channels.get(channel) {
                Some(subscribers) => subscribers.values().cloned().collect(),
                None => return 0,
            }
        };

        let mut delivered = 0;
        for callback in &snapshot {
            match catch_unwind(AssertUnwindSafe(|| callback(event))) {
                Ok(()) => delivered += 1,
                Err(_) => warn!("Subscriber on {} panicked handling {}", channel, event.name()),
            }
        }
        delivered
    }

    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.inner
            .channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(channel)
            .map_or(0, HashMap::len)
    }

    fn remove(&self, channel: &str, id: u64) {
        let mut channels = self.inner.channels.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(subscribers) = channels.get_mut(channel) {
            subscribers.remove(&id);
            if subscribers.is_empty() {
                channels.remove(channel);
            }
        }
        trace!("Unsubscribed #{} from {}", id, channel);
    }
}

/// Deregistration handle returned by [`Dispatcher::subscribe`].
pub struct Subscription {
    dispatcher: Dispatcher,
    channel: String,
    id: u64,
    active: bool,
}

impl Subscription {
    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.active {
            self.active = false;
            self.dispatcher.remove(&self.channel, self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}
