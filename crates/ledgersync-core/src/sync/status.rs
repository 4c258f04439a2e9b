use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Connectivity state of the sync orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Remote unreachable or never contacted; working from the local cache.
    Offline,
    /// A pull or push is in flight.
    Syncing,
    /// Last operation reached the remote successfully.
    Connected,
    /// Last push failed; the change is kept locally only.
    Error,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncStatus::Offline => write!(f, "offline"),
            SyncStatus::Syncing => write!(f, "syncing"),
            SyncStatus::Connected => write!(f, "connected"),
            SyncStatus::Error => write!(f, "error"),
        }
    }
}

type Handler = Arc<dyn Fn(SyncStatus, &str) + Send + Sync>;

struct Observers {
    next_id: AtomicU64,
    handlers: Mutex<Vec<(u64, Handler)>>,
}

impl Observers {
    fn lock(&self) -> MutexGuard<'_, Vec<(u64, Handler)>> {
        self.handlers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Holds the current status and fans every change out to observers.
///
/// Handlers run synchronously, in registration order, on the task that
/// changed the status, so every observer sees `syncing` before the outcome
/// of the same operation.
pub struct StatusBus {
    observers: Arc<Observers>,
    current: watch::Sender<SyncStatus>,
}

impl StatusBus {
    pub fn new() -> Self {
        let (current, _) = watch::channel(SyncStatus::Offline);
        Self {
            observers: Arc::new(Observers {
                next_id: AtomicU64::new(1),
                handlers: Mutex::new(Vec::new()),
            }),
            current,
        }
    }

    pub fn current(&self) -> SyncStatus {
        *self.current.borrow()
    }

    pub fn watch(&self) -> watch::Receiver<SyncStatus> {
        self.current.subscribe()
    }

    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(SyncStatus, &str) + Send + Sync + 'static,
    {
        let id = self.observers.next_id.fetch_add(1, Ordering::Relaxed);
        self.observers.lock().push((id, Arc::new(handler)));
        Subscription {
            id,
            observers: Arc::downgrade(&self.observers),
            active: true,
        }
    }

    pub fn notify(&self, status: SyncStatus, message: &str) {
        self.current.send_replace(status);
        // Handlers may subscribe or unsubscribe, so call them outside the lock
        let handlers: Vec<Handler> = self.observers.lock().iter().map(|(_, h)| Arc::clone(h)).collect();
        for handler in handlers {
            handler(status, message);
        }
    }

    pub fn observer_count(&self) -> usize {
        self.observers.lock().len()
    }
}

impl Default for StatusBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Registration of one status observer. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes its handler"]
pub struct Subscription {
    id: u64,
    observers: Weak<Observers>,
    active: bool,
}

impl Subscription {
    pub fn unsubscribe(self) {}

    /// Keep the handler registered for as long as the bus lives.
    pub fn detach(mut self) {
        self.active = false;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        if let Some(observers) = self.observers.upgrade() {
            observers.lock().retain(|(id, _)| *id != self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder(bus: &StatusBus) -> (Subscription, Arc<Mutex<Vec<(SyncStatus, String)>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let sub = bus.subscribe(move |status, message| {
            sink.lock().unwrap().push((status, message.to_string()));
        });
        (sub, seen)
    }

    #[test]
    fn test_initial_status_is_offline() {
        assert_eq!(StatusBus::new().current(), SyncStatus::Offline);
    }

    #[test]
    fn test_notify_reaches_observers_in_order() {
        let bus = StatusBus::new();
        let (_sub, seen) = recorder(&bus);

        bus.notify(SyncStatus::Syncing, "Saving data...");
        bus.notify(SyncStatus::Connected, "Data saved");

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                (SyncStatus::Syncing, "Saving data...".to_string()),
                (SyncStatus::Connected, "Data saved".to_string()),
            ]
        );
        assert_eq!(bus.current(), SyncStatus::Connected);
    }

    #[test]
    fn test_unsubscribe() {
        let bus = StatusBus::new();
        let (sub, seen) = recorder(&bus);
        let (other, _) = recorder(&bus);
        assert_eq!(bus.observer_count(), 2);

        sub.unsubscribe();
        drop(other);
        assert_eq!(bus.observer_count(), 0);

        bus.notify(SyncStatus::Error, "boom");
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_detach_keeps_handler() {
        let bus = StatusBus::new();
        let (sub, seen) = recorder(&bus);
        sub.detach();

        bus.notify(SyncStatus::Syncing, "");
        assert_eq!(seen.lock().unwrap().len(), 1);
        assert_eq!(bus.observer_count(), 1);
    }

    #[test]
    fn test_watch_sees_latest() {
        let bus = StatusBus::new();
        let rx = bus.watch();
        bus.notify(SyncStatus::Connected, "");
        assert_eq!(*rx.borrow(), SyncStatus::Connected);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(serde_json::to_value(SyncStatus::Syncing).unwrap(), "syncing");
        assert_eq!(SyncStatus::Error.to_string(), "error");
    }
}
