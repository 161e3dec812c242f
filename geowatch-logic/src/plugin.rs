use std::{fmt, str::FromStr, sync::Arc};

use log::info;

use crate::{
    config::PluginConfig,
    events::UpdateBus,
    host::HostVersion,
    location::LocationService,
    prelude::*,
    render::{LiveFragment, OutputSlot, TemplateEngine},
    store::StateStore,
    watcher::Watcher,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// The directives story content can invoke
pub enum Directive {
    /// Begin watching the position
    StartWatch,
    /// Stop watching the position
    StopWatch,
    /// Render the body now and again after every position update
    LiveUpdate,
}

impl Directive {
    pub const ALL: [Directive; 3] = [Self::StartWatch, Self::StopWatch, Self::LiveUpdate];

    pub fn name(&self) -> &'static str {
        match self {
            Self::StartWatch => "start-watch",
            Self::StopWatch => "stop-watch",
            Self::LiveUpdate => "live-update",
        }
    }

    pub fn requires_body(&self) -> bool {
        matches!(self, Self::LiveUpdate)
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Directive {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "start-watch" | "glstart" => Ok(Self::StartWatch),
            "stop-watch" | "glstop" => Ok(Self::StopWatch),
            "live-update" | "glupdate" => Ok(Self::LiveUpdate),
            _ => bail!("No directive named \"{s}\""),
        }
    }
}

/// What the directives do, picked once when the plugin is loaded
pub trait DirectiveSet: Send + Sync {
    fn start_watch(&self) -> Result;

    fn stop_watch(&self);

    fn live_update(&self, body: &str, slot: &OutputSlot) -> Result<Option<LiveFragment>>;

    /// The notification live fragments re-render on, if there is one
    fn updates(&self) -> Option<&UpdateBus> {
        None
    }
}

/// Directives backed by a real platform watch
pub struct LiveDirectives<L: LocationService> {
    watcher: Arc<Watcher<L>>,
    engine: Arc<dyn TemplateEngine>,
    wrapper_class: String,
    debug_view: bool,
}

impl<L: LocationService> DirectiveSet for LiveDirectives<L> {
    fn start_watch(&self) -> Result {
        self.watcher.start()
    }

    fn stop_watch(&self) {
        self.watcher.stop();
    }

    fn live_update(&self, body: &str, slot: &OutputSlot) -> Result<Option<LiveFragment>> {
        LiveFragment::register(
            self.engine.clone(),
            self.watcher.updates(),
            body,
            slot,
            &self.wrapper_class,
            self.debug_view,
        )
        .map(Some)
    }

    fn updates(&self) -> Option<&UpdateBus> {
        Some(self.watcher.updates())
    }
}

/// Stand-in for platforms without geolocation, every directive silently does nothing
pub struct NoopDirectives;

impl DirectiveSet for NoopDirectives {
    fn start_watch(&self) -> Result {
        Ok(())
    }

    fn stop_watch(&self) {}

    fn live_update(&self, _body: &str, _slot: &OutputSlot) -> Result<Option<LiveFragment>> {
        Ok(None)
    }
}

/// The loaded directive set
pub struct Plugin<L: LocationService> {
    directives: Box<dyn DirectiveSet>,
    watcher: Option<Arc<Watcher<L>>>,
}

impl<L: LocationService + 'static> Plugin<L> {
    /// Check the host and pick the directive backend. Fails only when the host
    /// is too old or isn't the expected engine.
    pub fn load(
        host: Option<&HostVersion>,
        config: PluginConfig,
        service: L,
        store: Arc<dyn StateStore>,
        engine: Arc<dyn TemplateEngine>,
    ) -> Result<Self> {
        config.required_host.check(host)?;

        if !service.supports_watch() {
            info!("Geolocation is unavailable, directives will do nothing");
            return Ok(Self {
                directives: Box::new(NoopDirectives),
                watcher: None,
            });
        }

        let watcher = Arc::new(Watcher::new(
            service,
            store,
            config.state_key,
            config.watch,
        ));

        info!("Geolocation directives loaded");

        Ok(Self {
            directives: Box::new(LiveDirectives {
                watcher: watcher.clone(),
                engine,
                wrapper_class: config.wrapper_class,
                debug_view: config.debug,
            }),
            watcher: Some(watcher),
        })
    }
}

impl<L: LocationService> Plugin<L> {
    pub fn is_live(&self) -> bool {
        self.watcher.is_some()
    }

    pub fn watcher(&self) -> Option<&Arc<Watcher<L>>> {
        self.watcher.as_ref()
    }

    pub fn updates(&self) -> Option<&UpdateBus> {
        self.directives.updates()
    }

    pub fn run(
        &self,
        directive: Directive,
        body: Option<&str>,
        slot: &OutputSlot,
    ) -> Result<Option<LiveFragment>> {
        match (directive, body) {
            (Directive::StartWatch, _) => self.directives.start_watch().map(|_| None),
            (Directive::StopWatch, _) => {
                self.directives.stop_watch();
                Ok(None)
            }
            (Directive::LiveUpdate, Some(body)) => self.directives.live_update(body, slot),
            (Directive::LiveUpdate, None) => bail!("<<{directive}>> requires a body"),
        }
    }

    /// Run the directive called `name` as written in story content
    pub fn invoke(
        &self,
        name: &str,
        body: Option<&str>,
        slot: &OutputSlot,
    ) -> Result<Option<LiveFragment>> {
        let directive = name.parse::<Directive>()?;
        self.run(directive, body, slot)
    }

    /// Handle queued position reports without waiting, see [Watcher::process_pending]
    pub fn process_pending(&self) -> Result<usize> {
        match &self.watcher {
            Some(watcher) => watcher.process_pending(),
            None => Ok(0),
        }
    }

    /// Deliver position reports until [Plugin::shutdown], see [Watcher::main_loop]
    pub async fn main_loop(&self) -> Result {
        match &self.watcher {
            Some(watcher) => watcher.main_loop().await,
            None => Ok(()),
        }
    }

    pub fn shutdown(&self) {
        if let Some(watcher) = &self.watcher {
            watcher.quit();
        }
    }
}
