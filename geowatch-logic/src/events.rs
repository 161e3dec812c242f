use std::sync::{Arc, Mutex, MutexGuard};

use uuid::Uuid;

use crate::prelude::*;

pub type SubscriptionId = Uuid;

type Handler = Arc<dyn Fn() -> Result + Send + Sync>;

#[derive(Clone, Default)]
/// Synchronous, in-process "location updated" notification. Handlers run in
/// subscription order on the thread that publishes.
pub struct UpdateBus {
    handlers: Arc<Mutex<Vec<(SubscriptionId, Handler)>>>,
}

impl UpdateBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(SubscriptionId, Handler)>> {
        self.handlers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn subscribe(
        &self,
        handler: impl Fn() -> Result + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = Uuid::new_v4();
        self.lock().push((id, Arc::new(handler)));
        id
    }

    /// Remove a handler, returns `false` if it was already gone
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.lock();
        let before = handlers.len();
        handlers.retain(|(sub, _)| *sub != id);
        handlers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    /// Invoke every current handler before returning. The first handler error
    /// stops the dispatch and is returned to the publisher.
    pub fn publish(&self) -> Result {
        // Snapshot so handlers may (un)subscribe while being called
        let handlers = self
            .lock()
            .iter()
            .map(|(_, h)| h.clone())
            .collect::<Vec<_>>();

        for handler in handlers {
            handler()?;
        }

        Ok(())
    }
}
