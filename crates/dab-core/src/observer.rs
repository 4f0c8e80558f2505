//! Multi-subscriber callback registry.
//!
//! Subscribers are boxed closures, usually `dyn Fn(..) + Send + Sync`, and
//! are invoked synchronously in attachment order by whoever changed the
//! observed state, after the change has been applied.
//!
//! ```rust
//! use dab_core::observer::Observable;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! let hits = Arc::new(AtomicUsize::new(0));
//! let observable: Observable<dyn Fn(u8) + Send + Sync> = Observable::new();
//! let h = hits.clone();
//! observable.attach(Box::new(move |id| {
//!     h.fetch_add(id as usize, Ordering::SeqCst);
//! }));
//! observable.notify(|f| f(3));
//! assert_eq!(hits.load(Ordering::SeqCst), 3);
//! ```

use std::fmt;
use std::sync::Mutex;

/// Opaque handle returned by [`Observable::attach`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Registry<F: ?Sized> {
    next_id: u64,
    subscribers: Vec<(SubscriptionId, Box<F>)>,
}

/// A list of subscribers of callback type `F`.
pub struct Observable<F: ?Sized> {
    inner: Mutex<Registry<F>>,
}

impl<F: ?Sized> Observable<F> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Registry {
                next_id: 0,
                subscribers: Vec::new(),
            }),
        }
    }

    /// Add a subscriber.
    pub fn attach(&self, callback: Box<F>) -> SubscriptionId {
        let mut inner = self.lock();
        let id = SubscriptionId(inner.next_id);
        inner.next_id += 1;
        inner.subscribers.push((id, callback));
        id
    }

    /// Remove a subscriber. Returns `false` if it was already gone.
    pub fn detach(&self, id: SubscriptionId) -> bool {
        let mut inner = self.lock();
        let before = inner.subscribers.len();
        inner.subscribers.retain(|(sid, _)| *sid != id);
        inner.subscribers.len() != before
    }

    /// Invoke every subscriber through `call`.
    ///
    /// Subscribers must not attach or detach from within the callback.
    pub fn notify(&self, mut call: impl FnMut(&F)) {
        let inner = self.lock();
        for (_, callback) in inner.subscribers.iter() {
            call(callback);
        }
    }

    pub fn len(&self) -> usize {
        self.lock().subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Registry<F>> {
        // A panicking subscriber must not disable notifications for good
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<F: ?Sized> Default for Observable<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: ?Sized> fmt::Debug for Observable<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observable")
            .field("subscribers", &self.len())
            .finish()
    }
}
