// Push module - Fire-and-forget fan-out of new records to live subscribers

use crate::error::{LogHubError, Result};
use crate::record::LogRecord;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Channel capacity per subscriber; a consumer that falls this far behind
/// starts missing records
pub const SUBSCRIBER_CHANNEL_CAPACITY: usize = 1024;

/// Handle identifying one live subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

/// Sending half of a subscriber connection, owned by the transport layer
pub type PushSender = mpsc::Sender<Arc<LogRecord>>;

/// Receiving half handed back to the transport on subscribe
pub type PushReceiver = mpsc::Receiver<Arc<LogRecord>>;

#[derive(Default)]
struct Registry {
    by_app: HashMap<String, HashMap<SubscriberId, PushSender>>,
    app_of: HashMap<SubscriberId, String>,
}

/// Live subscriber connections keyed by application code.
///
/// Delivery is fire-and-forget: a full or closed subscriber channel never
/// blocks the submitter or the other subscribers. Slow consumers simply miss
/// records; this is the intended "tail -f" trade-off, not a reliable channel.
pub struct FanOut {
    max_subscribers: usize,
    next_id: AtomicU64,
    registry: RwLock<Registry>,
}

impl FanOut {
    pub fn new(max_subscribers: usize) -> Self {
        Self {
            max_subscribers,
            next_id: AtomicU64::new(1),
            registry: RwLock::new(Registry::default()),
        }
    }

    /// Register a subscriber for one application's records.
    ///
    /// Returns the subscription handle and the receiving end of the
    /// per-subscriber channel. Refused once the connection cap is reached.
    pub fn subscribe(&self, app_code: &str) -> Result<(SubscriberId, PushReceiver)> {
        let mut registry = self.registry.write().unwrap_or_else(|e| e.into_inner());

        if registry.app_of.len() >= self.max_subscribers {
            warn!(app_code = %app_code, "Subscriber limit reached, refusing connection");
            return Err(LogHubError::SubscriberLimit(self.max_subscribers));
        }

        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = mpsc::channel(SUBSCRIBER_CHANNEL_CAPACITY);

        registry
            .by_app
            .entry(app_code.to_string())
            .or_default()
            .insert(id, sender);
        registry.app_of.insert(id, app_code.to_string());

        info!(
            app_code = %app_code,
            subscriber = id.0,
            total = registry.app_of.len(),
            "Subscriber connected"
        );
        Ok((id, receiver))
    }

    /// Remove a subscriber; safe to call for ids that are already gone
    pub fn unsubscribe(&self, id: SubscriberId) {
        let mut registry = self.registry.write().unwrap_or_else(|e| e.into_inner());
        Self::remove_locked(&mut registry, id);
    }

    /// Deliver a record to every live subscriber of its application.
    ///
    /// Called synchronously at submission time. Per-subscriber failures are
    /// isolated: a closed channel drops that subscriber, a full channel drops
    /// the record for that subscriber only.
    pub fn notify(&self, record: &Arc<LogRecord>) {
        let mut dead = Vec::new();

        {
            let registry = self.registry.read().unwrap_or_else(|e| e.into_inner());
            let Some(subscribers) = registry.by_app.get(&record.app_code) else {
                return;
            };

            for (id, sender) in subscribers {
                match sender.try_send(Arc::clone(record)) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        debug!(
                            app_code = %record.app_code,
                            subscriber = id.0,
                            "Subscriber channel full, record missed"
                        );
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        dead.push(*id);
                    }
                }
            }
        }

        if !dead.is_empty() {
            let mut registry = self.registry.write().unwrap_or_else(|e| e.into_inner());
            for id in dead {
                Self::remove_locked(&mut registry, id);
            }
        }
    }

    /// Number of live subscriptions across all applications
    pub fn subscriber_count(&self) -> usize {
        let registry = self.registry.read().unwrap_or_else(|e| e.into_inner());
        registry.app_of.len()
    }

    fn remove_locked(registry: &mut Registry, id: SubscriberId) {
        let Some(app_code) = registry.app_of.remove(&id) else {
            return;
        };

        if let Some(subscribers) = registry.by_app.get_mut(&app_code) {
            subscribers.remove(&id);
            if subscribers.is_empty() {
                registry.by_app.remove(&app_code);
            }
        }
        info!(app_code = %app_code, subscriber = id.0, "Subscriber disconnected");
    }
}
