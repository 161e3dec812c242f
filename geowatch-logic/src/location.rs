use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::prelude::*;

/// A "part" of a location
pub type LocationComponent = f64;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
/// One position report as handed over by the platform geolocation API.
/// Optional parts are `None` when the device can't determine them.
pub struct Coordinates {
    /// Accuracy of latitude and longitude, in meters
    pub accuracy: LocationComponent,
    /// Height above the WGS84 ellipsoid, in meters
    pub altitude: Option<LocationComponent>,
    /// Accuracy of the altitude, in meters
    pub altitude_accuracy: Option<LocationComponent>,
    /// Direction of travel in degrees clockwise from true north
    pub heading: Option<LocationComponent>,
    /// Latitude
    pub latitude: LocationComponent,
    /// Longitude
    pub longitude: LocationComponent,
    /// Ground speed, in meters per second
    pub speed: Option<LocationComponent>,
}

/// The record mirrored into the shared state store. It has exactly the shape of
/// [Coordinates], the default value is the "no fix yet" placeholder.
pub type LocationRecord = Coordinates;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
/// Why the platform failed to produce a position
pub enum PositionError {
    PermissionDenied,
    PositionUnavailable,
    Timeout,
}

impl fmt::Display for PositionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::PermissionDenied => "permission to read the location was denied",
            Self::PositionUnavailable => "the position could not be determined",
            Self::Timeout => "timed out waiting for a position",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for PositionError {}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
/// Options passed to the platform when a watch is registered
pub struct WatchOptions {
    /// Ask for the most accurate results possible, may be slower and drain more power
    pub enable_high_accuracy: bool,
    /// Cached results may not be older than this many milliseconds
    pub maximum_age_ms: u64,
    /// How long the device may take to respond, `None` waits forever
    pub timeout_ms: Option<u64>,
}

impl WatchOptions {
    pub fn maximum_age(&self) -> Duration {
        Duration::from_millis(self.maximum_age_ms)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            enable_high_accuracy: false,
            maximum_age_ms: 0,
            timeout_ms: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// Opaque identifier of a running platform watch
pub struct WatchHandle(Uuid);

impl WatchHandle {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WatchHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
/// Something the platform reported for a watch
pub enum WatchEvent {
    Position(Coordinates),
    Error(PositionError),
}

/// Pair of the issuing watch and what it reported
pub type EventPair = (WatchHandle, WatchEvent);

#[derive(Debug, Clone)]
/// Where a [LocationService] delivers reports for a watch. Reports are queued in
/// order and drained by the watcher one at a time.
pub struct WatchSink(UnboundedSender<EventPair>);

impl WatchSink {
    pub(crate) fn new(tx: UnboundedSender<EventPair>) -> Self {
        Self(tx)
    }

    /// Report a new position for `handle`. Returns `false` once nobody is listening anymore.
    pub fn position(&self, handle: WatchHandle, coords: Coordinates) -> bool {
        self.0.send((handle, WatchEvent::Position(coords))).is_ok()
    }

    /// Report a failure for `handle`. Returns `false` once nobody is listening anymore.
    pub fn error(&self, handle: WatchHandle, error: PositionError) -> bool {
        self.0.send((handle, WatchEvent::Error(error))).is_ok()
    }
}

/// The platform's asynchronous location service
pub trait LocationService: Send + Sync {
    /// Whether the platform can watch the position at all. Checked once when the
    /// plugin is loaded.
    fn supports_watch(&self) -> bool {
        true
    }

    /// Register a watch, reports for it must be delivered to `sink` tagged with
    /// the returned handle.
    fn start_watch(&self, options: WatchOptions, sink: WatchSink) -> Result<WatchHandle>;

    /// Cancel a watch, no reports may be sent for `handle` after this returns.
    fn cancel_watch(&self, handle: WatchHandle);
}
