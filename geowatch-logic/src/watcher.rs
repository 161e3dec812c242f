use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, trace};
use serde_json::Value;
use tokio::sync::{
    Mutex as AsyncMutex,
    mpsc::{self, UnboundedReceiver, error::TryRecvError},
};
use tokio_util::sync::CancellationToken;

use crate::{
    events::UpdateBus,
    location::{
        Coordinates, EventPair, LocationRecord, LocationService, PositionError, WatchEvent,
        WatchHandle, WatchOptions, WatchSink,
    },
    prelude::*,
    store::StateStore,
};

type ErrorHook = Box<dyn Fn(&PositionError) + Send + Sync>;

/// Owns the lifecycle of a single platform watch, mirrors every reported
/// position into the [StateStore] under `key` and notifies the [UpdateBus].
///
/// At most one watch is active, starting or stopping twice is a no-op.
pub struct Watcher<L: LocationService> {
    service: L,
    store: Arc<dyn StateStore>,
    key: String,
    options: WatchOptions,
    handle: Mutex<Option<WatchHandle>>,
    sink: WatchSink,
    events: AsyncMutex<UnboundedReceiver<EventPair>>,
    updates: UpdateBus,
    error_hook: Mutex<Option<ErrorHook>>,
    cancel: Mutex<CancellationToken>,
}

impl<L: LocationService> Watcher<L> {
    pub fn new(
        service: L,
        store: Arc<dyn StateStore>,
        key: impl Into<String>,
        options: WatchOptions,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            service,
            store,
            key: key.into(),
            options,
            handle: Mutex::new(None),
            sink: WatchSink::new(tx),
            events: AsyncMutex::new(rx),
            updates: UpdateBus::new(),
            error_hook: Mutex::new(None),
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    fn current(&self) -> MutexGuard<'_, Option<WatchHandle>> {
        self.handle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn updates(&self) -> &UpdateBus {
        &self.updates
    }

    pub fn service(&self) -> &L {
        &self.service
    }

    pub fn is_active(&self) -> bool {
        self.current().is_some()
    }

    pub fn active_handle(&self) -> Option<WatchHandle> {
        *self.current()
    }

    /// Observe position errors. They are still swallowed, the record is left
    /// alone and no update is published.
    pub fn set_error_hook(&self, hook: impl Fn(&PositionError) + Send + Sync + 'static) {
        *self
            .error_hook
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(Box::new(hook));
    }

    /// Begin watching. The location variable gets a placeholder value first (if
    /// the story doesn't already have one) so it can be read before the first
    /// fix arrives.
    pub fn start(&self) -> Result {
        let mut handle = self.current();

        if handle.is_some() {
            return Ok(());
        }

        let placeholder =
            serde_json::to_value(LocationRecord::default()).context("Failed to encode record")?;
        if self.store.set_if_absent(&self.key, placeholder) {
            debug!("Initialised ${} with a placeholder", self.key);
        }

        let new_handle = self
            .service
            .start_watch(self.options, self.sink.clone())
            .context("Failed to start watching the position")?;

        debug!("Started position watch {new_handle}");
        *handle = Some(new_handle);

        Ok(())
    }

    /// Stop watching. The last known position stays in the store.
    pub fn stop(&self) {
        let handle = self.current().take();
        if let Some(handle) = handle {
            self.service.cancel_watch(handle);
            debug!("Stopped position watch {handle}");
        }
    }

    /// Copy the reported fields onto the stored record. Anything else the
    /// story keeps on the variable is left alone.
    fn on_position(&self, coords: Coordinates) -> Result {
        let fields = serde_json::to_value(coords).context("Failed to encode record")?;
        let record = match (self.store.get(&self.key), fields) {
            (Some(Value::Object(mut existing)), Value::Object(fields)) => {
                existing.extend(fields);
                Value::Object(existing)
            }
            (_, fields) => fields,
        };
        self.store.set(&self.key, record);
        trace!(
            "Position update: {}, {} (±{}m)",
            coords.latitude, coords.longitude, coords.accuracy
        );
        self.updates.publish()
    }

    fn on_error(&self, error: PositionError) {
        debug!("Ignoring position error: {error}");
        if let Some(hook) = self
            .error_hook
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
        {
            hook(&error);
        }
    }

    /// Consume one report from the platform. Reports for a watch other than the
    /// active one are dropped.
    pub fn handle_event(&self, handle: WatchHandle, event: WatchEvent) -> Result {
        if self.active_handle() != Some(handle) {
            debug!("Dropping report from retired watch {handle}");
            return Ok(());
        }

        match event {
            WatchEvent::Position(coords) => self.on_position(coords),
            WatchEvent::Error(error) => {
                self.on_error(error);
                Ok(())
            }
        }
    }

    /// Handle every report queued so far, in order, without waiting.
    /// Returns how many were taken off the queue.
    pub fn process_pending(&self) -> Result<usize> {
        // The main loop is draining the queue already
        let Ok(mut events) = self.events.try_lock() else {
            return Ok(0);
        };

        let mut count = 0;
        loop {
            match events.try_recv() {
                Ok((handle, event)) => {
                    count += 1;
                    self.handle_event(handle, event)?;
                }
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break Ok(count),
            }
        }
    }

    fn cancel_token(&self) -> MutexGuard<'_, CancellationToken> {
        self.cancel
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Stop the running [Watcher::main_loop] and the active watch. A later
    /// call to [Watcher::main_loop] runs again until the next quit.
    pub fn quit(&self) {
        self.stop();
        let mut cancel = self.cancel_token();
        cancel.cancel();
        *cancel = CancellationToken::new();
    }

    /// Deliver reports as they arrive until [Watcher::quit] is called or
    /// rendering an update fails. Reports queued behind a failed one stay
    /// queued for the next drain.
    pub async fn main_loop(&self) -> Result {
        let mut events = self.events.lock().await;
        let cancel = self.cancel_token().clone();

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    break Ok(());
                }

                pair = events.recv() => {
                    let Some((handle, event)) = pair else {
                        break Ok(());
                    };
                    self.handle_event(handle, event)?;
                }
            }
        }
    }
}
