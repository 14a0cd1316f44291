use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Observer of session lifecycle and subscription outcomes.
///
/// Every method has an empty default so implementors only override what they
/// care about. Methods are called without any session lock held, so they may
/// call back into the session.
pub trait SessionWatcher: Send + Sync {
    fn on_connected(&self) {}

    fn on_disconnected(&self, _info: &str) {}

    fn on_connect_failed(&self, _info: &str) {}

    fn on_subscription_success(&self, _filter: &str) {}

    fn on_unsubscribe_success(&self, _filter: &str) {}

    fn on_subscription_failed(&self, _filter: &str, _info: &str) {}
}

/// Handle returned by registration, used to unregister later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatcherId(u64);

#[derive(Default)]
pub struct SessionWatcherRegistry {
    next_id: u64,
    watchers: HashMap<WatcherId, Arc<dyn SessionWatcher>>,
}

impl SessionWatcherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, watcher: Arc<dyn SessionWatcher>) -> WatcherId {
        self.next_id += 1;
        let id = WatcherId(self.next_id);
        self.watchers.insert(id, watcher);
        id
    }

    pub fn unregister(&mut self, id: WatcherId) -> bool {
        self.watchers.remove(&id).is_some()
    }

    /// Current members, in no particular order. Fan-out iterates this copy so
    /// registrations made by a watcher mid-event take effect from the next
    /// event on.
    pub fn snapshot(&self) -> Vec<Arc<dyn SessionWatcher>> {
        self.watchers.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.watchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watchers.is_empty()
    }
}

impl fmt::Debug for SessionWatcherRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionWatcherRegistry")
            .field("watchers", &self.watchers.len())
            .finish()
    }
}

type Notify = Box<dyn Fn() + Send + Sync>;
type NotifyInfo = Box<dyn Fn(&str) + Send + Sync>;
type NotifyFailure = Box<dyn Fn(&str, &str) + Send + Sync>;

/// A [`SessionWatcher`] assembled from individual closures.
///
/// ```
/// use roverlink::session::CallbackWatcher;
///
/// let watcher = CallbackWatcher::new()
///     .connected(|| println!("up"))
///     .disconnected(|info| println!("down: {info}"));
/// ```
#[derive(Default)]
pub struct CallbackWatcher {
    connected: Option<Notify>,
    disconnected: Option<NotifyInfo>,
    connect_failed: Option<NotifyInfo>,
    subscription_success: Option<NotifyInfo>,
    unsubscribe_success: Option<NotifyInfo>,
    subscription_failed: Option<NotifyFailure>,
}

impl CallbackWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connected(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.connected = Some(Box::new(f));
        self
    }

    pub fn disconnected(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.disconnected = Some(Box::new(f));
        self
    }

    pub fn connect_failed(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.connect_failed = Some(Box::new(f));
        self
    }

    pub fn subscription_success(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.subscription_success = Some(Box::new(f));
        self
    }

    pub fn unsubscribe_success(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.unsubscribe_success = Some(Box::new(f));
        self
    }

    pub fn subscription_failed(mut self, f: impl Fn(&str, &str) + Send + Sync + 'static) -> Self {
        self.subscription_failed = Some(Box::new(f));
        self
    }
}

impl SessionWatcher for CallbackWatcher {
    fn on_connected(&self) {
        if let Some(f) = &self.connected {
            f();
        }
    }

    fn on_disconnected(&self, info: &str) {
        if let Some(f) = &self.disconnected {
            f(info);
        }
    }

    fn on_connect_failed(&self, info: &str) {
        if let Some(f) = &self.connect_failed {
            f(info);
        }
    }

    fn on_subscription_success(&self, filter: &str) {
        if let Some(f) = &self.subscription_success {
            f(filter);
        }
    }

    fn on_unsubscribe_success(&self, filter: &str) {
        if let Some(f) = &self.unsubscribe_success {
            f(filter);
        }
    }

    fn on_subscription_failed(&self, filter: &str, info: &str) {
        if let Some(f) = &self.subscription_failed {
            f(filter, info);
        }
    }
}
