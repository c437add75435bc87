use crypto::Beacon;
use parking_lot::Mutex;
use std::sync::Arc;

/// A callback fired after every successful append, and once more with
/// `closed = true` when the owning handler stops (§4.4).
pub type Callback = Arc<dyn Fn(&Beacon, bool) + Send + Sync>;

/// Registry of fan-out callbacks, keyed by an opaque id so a caller can
/// remove exactly the one it registered. Invocation order follows
/// insertion order, matching the "callbacks invoked in the order beacons
/// are appended" guarantee for a *single* beacon id (§5); ordering across
/// independently-hosted beacon ids is left undefined per §9's open
/// question, resolved in DESIGN.md.
#[derive(Default, Clone)]
pub struct CallbackRegistry {
    inner: Arc<Mutex<Vec<(String, Callback)>>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, id: impl Into<String>, cb: Callback) {
        let mut guard = self.inner.lock();
        let id = id.into();
        guard.retain(|(existing, _)| existing != &id);
        guard.push((id, cb));
    }

    pub fn remove(&self, id: &str) {
        self.inner.lock().retain(|(existing, _)| existing != id);
    }

    /// Invokes every registered callback with `beacon` and `closed`.
    /// Callbacks are expected to be fast and non-blocking (§4.4); a slow
    /// callback is not itself killed here, but a caller enforcing a time
    /// budget should wrap the registration with `tokio::time::timeout`.
    pub fn fire(&self, beacon: &Beacon, closed: bool) {
        let callbacks: Vec<Callback> = {
            let guard = self.inner.lock();
            guard.iter().map(|(_, cb)| cb.clone()).collect()
        };
        for cb in callbacks {
            cb(beacon, closed);
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }
}
