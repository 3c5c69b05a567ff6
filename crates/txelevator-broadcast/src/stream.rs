//! Worker-local event stream with RAII listeners.
//!
//! A [`Listener`] is the only handle to a registered callback. Dropping it
//! unregisters the callback and clears its active flag, so a connection that
//! drops its listeners is not called again, even by an `emit` that already
//! copied the callback list.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;
type Registry<T> = Mutex<HashMap<u64, Entry<T>>>;

struct Entry<T> {
    active: Arc<AtomicBool>,
    callback: Callback<T>,
}

impl<T> Clone for Entry<T> {
    fn clone(&self) -> Self {
        Self {
            active: self.active.clone(),
            callback: self.callback.clone(),
        }
    }
}

pub struct EventStream<T> {
    listeners: Arc<Registry<T>>,
    next_id: Arc<AtomicU64>,
}

impl<T> Clone for EventStream<T> {
    fn clone(&self) -> Self {
        Self {
            listeners: self.listeners.clone(),
            next_id: self.next_id.clone(),
        }
    }
}

impl<T> Default for EventStream<T> {
    fn default() -> Self {
        Self {
            listeners: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl<T: 'static> EventStream<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn listen<F>(&self, callback: F) -> Listener<T>
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let active = Arc::new(AtomicBool::new(true));
        self.listeners.lock().insert(
            id,
            Entry {
                active: active.clone(),
                callback: Arc::new(callback),
            },
        );
        Listener {
            id,
            active,
            registry: Arc::downgrade(&self.listeners),
        }
    }

    /// Call every live listener once. Returns how many were called.
    pub fn emit(&self, event: &T) -> usize {
        // snapshot first: callbacks may drop listeners
        let entries: Vec<Entry<T>> = self.listeners.lock().values().cloned().collect();
        let mut called = 0;
        for entry in &entries {
            if entry.active.load(Ordering::Acquire) {
                (entry.callback)(event);
                called += 1;
            }
        }
        called
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }
}

/// Registration handle. Unregisters on drop.
pub struct Listener<T> {
    id: u64,
    active: Arc<AtomicBool>,
    registry: Weak<Registry<T>>,
}

impl<T> Drop for Listener<T> {
    fn drop(&mut self) {
        self.active.store(false, Ordering::Release);
        if let Some(registry) = self.registry.upgrade() {
            registry.lock().remove(&self.id);
        }
    }
}

impl<T> std::fmt::Debug for Listener<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener").field("id", &self.id).finish()
    }
}
