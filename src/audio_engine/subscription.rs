//! Parameter-change listeners.

use std::sync::{Arc, Mutex, PoisonError, Weak};

use crate::audio_engine::params::ParameterSnapshot;

type Callback = Arc<dyn Fn(&ParameterSnapshot) + Send + Sync>;

#[derive(Default)]
struct SubscriberList {
    next_id: u64,
    callbacks: Vec<(u64, Callback)>,
}

/// Registry of callbacks run after every parameter change.
#[derive(Default)]
pub struct Subscribers {
    list: Arc<Mutex<SubscriberList>>,
}

impl Subscribers {
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ParameterSnapshot) + Send + Sync + 'static,
    {
        let mut list = self.list.lock().unwrap_or_else(PoisonError::into_inner);
        let id = list.next_id;
        list.next_id += 1;
        list.callbacks.push((id, Arc::new(callback)));

        Subscription {
            id,
            list: Arc::downgrade(&self.list),
        }
    }

    /// Runs every registered callback with `snapshot`.
    ///
    /// The lock is released before callbacks run, so a callback may subscribe or
    /// unsubscribe without deadlocking.
    pub fn notify(&self, snapshot: &ParameterSnapshot) {
        let callbacks: Vec<Callback> = {
            let list = self.list.lock().unwrap_or_else(PoisonError::into_inner);
            list.callbacks
                .iter()
                .map(|(_, callback)| Arc::clone(callback))
                .collect()
        };

        for callback in callbacks {
            callback(snapshot);
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.list
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .callbacks
            .len()
    }
}

/// Registration returned by [`AudioEngine::subscribe`](crate::audio_engine::AudioEngine::subscribe).
///
/// Dropping it leaves the callback registered for the lifetime of the engine.
#[must_use = "call unsubscribe() to remove the callback"]
pub struct Subscription {
    id: u64,
    list: Weak<Mutex<SubscriberList>>,
}

impl Subscription {
    /// Removes the callback. A no-op once the engine is gone.
    pub fn unsubscribe(self) {
        if let Some(list) = self.list.upgrade() {
            list.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .callbacks
                .retain(|(id, _)| *id != self.id);
        }
    }
}
