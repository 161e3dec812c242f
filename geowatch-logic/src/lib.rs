mod config;
mod events;
mod host;
mod location;
mod plugin;
mod render;
mod store;
mod watcher;

pub use config::PluginConfig;
pub use events::{SubscriptionId, UpdateBus};
pub use host::{HostRequirement, HostVersion};
pub use location::{
    Coordinates, EventPair, LocationComponent, LocationRecord, LocationService, PositionError,
    WatchEvent, WatchHandle, WatchOptions, WatchSink,
};
pub use plugin::{Directive, DirectiveSet, LiveDirectives, NoopDirectives, Plugin};
pub use render::{Fragment, LiveFragment, LiveRegion, Node, OutputSlot, TemplateEngine};
pub use store::{MemoryStore, StateStore, read_typed, write_typed};
pub use watcher::Watcher;

pub mod prelude {
    use anyhow::Error as AnyhowError;
    use std::result::Result as StdResult;
    pub type Result<T = (), E = AnyhowError> = StdResult<T, E>;
    pub use anyhow::{Context, bail};
}
