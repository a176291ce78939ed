//! Observable state slices.
//!
//! Each slice wraps a `tokio::sync::watch` channel: writers replace or edit the value
//! in one step and every subscriber sees the latest committed value.

use std::fmt;
use tokio::sync::watch;
use tracing::trace;

pub struct StateSlice<T> {
    name: &'static str,
    tx: watch::Sender<T>,
}

impl<T> StateSlice<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(name: &'static str, initial: T) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { name, tx }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Clones the current value.
    pub fn snapshot(&self) -> T {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }

    /// Replaces the whole value and notifies subscribers.
    pub fn replace(&self, value: T) {
        self.tx.send_replace(value);
        trace!(target: "store", slice = self.name, "Slice replaced");
    }

    /// Edits the value in place and notifies subscribers.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut T),
    {
        self.tx.send_modify(f);
        trace!(target: "store", slice = self.name, "Slice updated");
    }

    /// Edits the value in place; subscribers are only notified when `f` returns true.
    pub fn update_if<F>(&self, f: F) -> bool
    where
        F: FnOnce(&mut T) -> bool,
    {
        self.tx.send_if_modified(f)
    }
}

impl<T: fmt::Debug> fmt::Debug for StateSlice<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateSlice")
            .field("name", &self.name)
            .field("value", &*self.tx.borrow())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_observe_transitions() {
        let slice = StateSlice::new("counter", 0u32);
        let mut rx = slice.subscribe();

        slice.replace(1);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), 1);

        slice.update(|v| *v += 1);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), 2);
        assert_eq!(slice.snapshot(), 2);
    }

    #[tokio::test]
    async fn test_update_if_skips_notification() {
        let slice = StateSlice::new("flag", false);
        let rx = slice.subscribe();

        assert!(!slice.update_if(|_| false));
        assert!(!rx.has_changed().unwrap());

        assert!(slice.update_if(|v| {
            *v = true;
            true
        }));
        assert!(rx.has_changed().unwrap());
    }
}
