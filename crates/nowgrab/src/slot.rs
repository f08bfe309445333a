//! Reactive current-item slot.
//!
//! Holds the item being acquired and broadcasts every change, including the
//! change to empty, to an ordered list of listeners. The broadcast is
//! sequential: each listener runs to completion before the next is invoked.

use async_trait::async_trait;
use std::sync::Arc;

/// Reaction to a slot change.
///
/// Errors are not handled by the slot; they propagate out of [`ReactiveSlot::set`]
/// and stop the remaining listeners for that change.
#[async_trait]
pub trait SlotListener<T: Send + Sync>: Send + Sync {
    async fn on_change(&self, value: Option<&T>) -> anyhow::Result<()>;
}

pub struct ReactiveSlot<T: Send + Sync> {
    value: Option<T>,
    listeners: Vec<Arc<dyn SlotListener<T>>>,
}

impl<T: Send + Sync> ReactiveSlot<T> {
    pub fn new() -> Self {
        Self {
            value: None,
            listeners: Vec::new(),
        }
    }

    /// Register a listener at the end of the list. Registering the same
    /// handle twice is a no-op; returns whether it was added.
    pub fn subscribe(&mut self, listener: Arc<dyn SlotListener<T>>) -> bool {
        let ptr = Arc::as_ptr(&listener) as *const ();
        if self
            .listeners
            .iter()
            .any(|l| Arc::as_ptr(l) as *const () == ptr)
        {
            return false;
        }
        self.listeners.push(listener);
        true
    }

    /// Store `value`, then notify every listener in registration order.
    pub async fn set(&mut self, value: Option<T>) -> anyhow::Result<()> {
        self.value = value;
        for listener in &self.listeners {
            listener.on_change(self.value.as_ref()).await?;
        }
        Ok(())
    }

    pub fn current(&self) -> Option<&T> {
        self.value.as_ref()
    }

}

impl<T: Send + Sync> Default for ReactiveSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    struct Recorder {
        name: &'static str,
        delay: Duration,
        journal: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl SlotListener<u32> for Recorder {
        async fn on_change(&self, value: Option<&u32>) -> anyhow::Result<()> {
            self.journal
                .lock()
                .unwrap()
                .push(format!("{}-start:{:?}", self.name, value));
            tokio::time::sleep(self.delay).await;
            self.journal
                .lock()
                .unwrap()
                .push(format!("{}-end", self.name));
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl SlotListener<u32> for Failing {
        async fn on_change(&self, _value: Option<&u32>) -> anyhow::Result<()> {
            anyhow::bail!("listener failed")
        }
    }

    fn recorder(
        name: &'static str,
        delay_ms: u64,
        journal: &Arc<Mutex<Vec<String>>>,
    ) -> Arc<dyn SlotListener<u32>> {
        Arc::new(Recorder {
            name,
            delay: Duration::from_millis(delay_ms),
            journal: Arc::clone(journal),
        })
    }

    #[tokio::test]
    async fn test_listeners_run_sequentially_in_registration_order() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let mut slot = ReactiveSlot::new();
        slot.subscribe(recorder("a", 20, &journal));
        slot.subscribe(recorder("b", 0, &journal));

        slot.set(Some(7)).await.unwrap();

        assert_eq!(
            *journal.lock().unwrap(),
            vec!["a-start:Some(7)", "a-end", "b-start:Some(7)", "b-end"]
        );
        assert_eq!(slot.current(), Some(&7));
    }

    #[tokio::test]
    async fn test_change_to_empty_is_broadcast() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let mut slot = ReactiveSlot::new();
        slot.subscribe(recorder("a", 0, &journal));

        slot.set(Some(1)).await.unwrap();
        slot.set(None).await.unwrap();

        assert!(slot.current().is_none());
        assert_eq!(journal.lock().unwrap()[2], "a-start:None");
    }

    #[tokio::test]
    async fn test_subscribe_is_idempotent_by_identity() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let mut slot = ReactiveSlot::new();
        let listener = recorder("a", 0, &journal);
        assert!(slot.subscribe(Arc::clone(&listener)));
        assert!(!slot.subscribe(listener));
        assert!(slot.subscribe(recorder("b", 0, &journal)));

        slot.set(Some(2)).await.unwrap();
        assert_eq!(
            *journal.lock().unwrap(),
            vec!["a-start:Some(2)", "a-end", "b-start:Some(2)", "b-end"]
        );
    }

    #[tokio::test]
    async fn test_listener_error_propagates_and_stops_broadcast() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let mut slot: ReactiveSlot<u32> = ReactiveSlot::new();
        slot.subscribe(Arc::new(Failing));
        slot.subscribe(recorder("late", 0, &journal));

        assert!(slot.set(Some(3)).await.is_err());
        // value is updated before listeners run
        assert_eq!(slot.current(), Some(&3));
        assert!(journal.lock().unwrap().is_empty());
    }
}
