use std::{
    collections::HashMap,
    path::Path,
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use geowatch_logic::{
    Coordinates, LocationService, PositionError, WatchHandle, WatchOptions, WatchSink,
};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use crate::prelude::*;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
/// One entry of a recorded track
pub enum TrackStep {
    Failure { error: PositionError },
    Fix(Coordinates),
}

pub fn parse_track(raw: &str) -> Result<Vec<TrackStep>> {
    serde_json::from_str(raw).context("Failed to parse track")
}

pub fn load_track(path: impl AsRef<Path>) -> Result<Vec<TrackStep>> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read track {}", path.display()))?;
    parse_track(&raw)
}

/// Location service that plays a recorded track back, one step per interval
pub struct ReplayLocation {
    track: Vec<TrackStep>,
    interval: Duration,
    available: bool,
    finished: CancellationToken,
    running: Mutex<HashMap<WatchHandle, CancellationToken>>,
}

impl ReplayLocation {
    pub fn new(track: Vec<TrackStep>, interval: Duration) -> Self {
        Self {
            track,
            interval,
            available: true,
            finished: CancellationToken::new(),
            running: Mutex::new(HashMap::new()),
        }
    }

    /// Pretend the platform has no geolocation at all
    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    /// Cancelled once any replay has sent its last step
    pub fn finished(&self) -> CancellationToken {
        self.finished.clone()
    }

    fn running(&self) -> MutexGuard<'_, HashMap<WatchHandle, CancellationToken>> {
        self.running
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn running_count(&self) -> usize {
        self.running().len()
    }
}

impl LocationService for ReplayLocation {
    fn supports_watch(&self) -> bool {
        self.available
    }

    fn start_watch(&self, options: WatchOptions, sink: WatchSink) -> Result<WatchHandle> {
        let runtime = Handle::try_current().context("Replaying a track needs a tokio runtime")?;
        let handle = WatchHandle::new();
        let cancel = CancellationToken::new();

        debug!("Replaying {} steps for {handle} ({options:?})", self.track.len());

        let track = self.track.clone();
        let interval = self.interval;
        let finished = self.finished.clone();
        let stop = cancel.clone();

        runtime.spawn(async move {
            for step in track {
                tokio::select! {
                    biased;

                    _ = stop.cancelled() => {
                        return;
                    }

                    _ = tokio::time::sleep(interval) => {}
                }

                let listening = match step {
                    TrackStep::Fix(coords) => sink.position(handle, coords),
                    TrackStep::Failure { error } => sink.error(handle, error),
                };

                if !listening {
                    return;
                }
            }
            info!("Track finished for {handle}");
            finished.cancel();
        });

        self.running().insert(handle, cancel);

        Ok(handle)
    }

    fn cancel_watch(&self, handle: WatchHandle) {
        if let Some(cancel) = self.running().remove(&handle) {
            cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use geowatch_logic::{LocationRecord, MemoryStore, Watcher, read_typed};

    use super::*;

    const TRACK: &str = r#"[
        { "accuracy": 5, "latitude": 40.0, "longitude": -74.0 },
        { "error": "PermissionDenied" },
        { "accuracy": 3, "latitude": 40.5, "longitude": -73.5, "speed": 1.25, "altitudeAccuracy": 2 }
    ]"#;

    #[test]
    fn parses_fixes_and_failures() {
        let track = parse_track(TRACK).expect("Failed to parse");
        assert_eq!(track.len(), 3);
        assert_eq!(
            track[1],
            TrackStep::Failure {
                error: PositionError::PermissionDenied
            }
        );
        let TrackStep::Fix(last) = track[2] else {
            panic!("Expected a fix");
        };
        assert_eq!(last.speed, Some(1.25));
        assert_eq!(last.altitude_accuracy, Some(2.0));
        assert_eq!(last.heading, None);
    }

    #[test]
    fn start_outside_runtime_fails() {
        let service = ReplayLocation::new(vec![], Duration::from_secs(1));
        let store = Arc::new(MemoryStore::default());
        let watcher = Watcher::new(service, store, "location", WatchOptions::default());
        assert!(watcher.start().is_err());
        assert!(!watcher.is_active());
    }

    mod replay {
        use tokio::test;

        use super::*;

        #[test]
        async fn replays_whole_track_into_store() {
            tokio::time::pause();
            let track = parse_track(TRACK).expect("Failed to parse");
            let service = ReplayLocation::new(track, Duration::from_secs(1));
            let finished = service.finished();
            let store = Arc::new(MemoryStore::default());
            let watcher = Watcher::new(service, store.clone(), "location", WatchOptions::default());

            watcher.start().expect("Failed to start");
            finished.cancelled().await;
            watcher.process_pending().expect("Delivery failed");

            let record: Option<LocationRecord> =
                read_typed(store.as_ref(), "location").expect("Bad record");
            let record = record.expect("No record");
            assert_eq!(record.latitude, 40.5);
            assert_eq!(record.speed, Some(1.25));
        }

        #[test]
        async fn cancel_stops_replay() {
            tokio::time::pause();
            let track = parse_track(TRACK).expect("Failed to parse");
            let service = ReplayLocation::new(track, Duration::from_secs(10));
            let store = Arc::new(MemoryStore::default());
            let watcher = Watcher::new(service, store.clone(), "location", WatchOptions::default());

            watcher.start().expect("Failed to start");
            assert_eq!(watcher.service().running_count(), 1);
            watcher.stop();
            assert_eq!(watcher.service().running_count(), 0);

            tokio::time::sleep(Duration::from_secs(60)).await;
            assert_eq!(watcher.process_pending().expect("Delivery failed"), 0);
            assert!(!watcher.service().finished().is_cancelled());
        }
    }
}
