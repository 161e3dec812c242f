use std::sync::{Arc, Mutex, MutexGuard};

use log::trace;

use crate::{
    events::{SubscriptionId, UpdateBus},
    prelude::*,
};

/// The host's template engine. Evaluation appends whatever `body` produces to
/// `target` and may fail with a rendering error.
pub trait TemplateEngine: Send + Sync {
    fn evaluate(&self, body: &str, target: &mut Fragment) -> Result;
}

#[derive(Debug, Clone)]
pub enum Node {
    Text(String),
    Region(LiveRegion),
}

#[derive(Debug, Clone, Default)]
/// A detached piece of rendered output
pub struct Fragment(Vec<Node>);

impl Fragment {
    pub fn push(&mut self, node: Node) {
        self.0.push(node);
    }

    pub fn push_text(&mut self, text: impl Into<String>) {
        self.0.push(Node::Text(text.into()));
    }

    pub fn nodes(&self) -> &[Node] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Text content with all containers stripped
    pub fn text(&self) -> String {
        let mut out = String::new();
        for node in self.0.iter() {
            match node {
                Node::Text(t) => out.push_str(t),
                Node::Region(region) => out.push_str(&region.contents().text()),
            }
        }
        out
    }

    pub fn to_markup(&self) -> String {
        let mut out = String::new();
        for node in self.0.iter() {
            match node {
                Node::Text(t) => out.push_str(t),
                Node::Region(region) => {
                    let mode = if region.block {
                        " data-debug-view=\"block\""
                    } else {
                        ""
                    };
                    out.push_str(&format!(
                        "<span class=\"{}\"{mode}>{}</span>",
                        region.class,
                        region.contents().to_markup()
                    ));
                }
            }
        }
        out
    }
}

#[derive(Debug, Clone)]
/// Container in the document whose children get swapped out wholesale on every re-render
pub struct LiveRegion {
    class: String,
    block: bool,
    contents: Arc<Mutex<Fragment>>,
}

impl LiveRegion {
    fn new(class: impl Into<String>, block: bool) -> Self {
        Self {
            class: class.into(),
            block,
            contents: Arc::default(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Fragment> {
        self.contents
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    /// Whether the story's debug view shows this region as a block
    pub fn is_block(&self) -> bool {
        self.block
    }

    pub fn contents(&self) -> Fragment {
        self.lock().clone()
    }

    fn replace(&self, fragment: Fragment) {
        *self.lock() = fragment;
    }
}

#[derive(Debug, Clone, Default)]
/// A place in the rendered passage that directives write into
pub struct OutputSlot(Arc<Mutex<Fragment>>);

impl OutputSlot {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Fragment> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn append(&self, node: Node) {
        self.lock().push(node);
    }

    pub fn snapshot(&self) -> Fragment {
        self.lock().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn text(&self) -> String {
        self.lock().text()
    }

    pub fn to_markup(&self) -> String {
        self.lock().to_markup()
    }
}

/// A template body bound to a region of an [OutputSlot], re-rendered every
/// time the bound [UpdateBus] publishes.
pub struct LiveFragment {
    bus: UpdateBus,
    subscription: SubscriptionId,
    region: LiveRegion,
}

fn render(engine: &dyn TemplateEngine, body: &str) -> Result<Fragment> {
    let mut fragment = Fragment::default();
    engine.evaluate(body, &mut fragment)?;
    Ok(fragment)
}

impl LiveFragment {
    /// Render `body` into a new region appended to `slot` and re-render it on
    /// every update. A failing re-render leaves the previous output in place
    /// and the error goes back to whoever published.
    ///
    /// With `debug_view` set the region is tagged for block display in the
    /// story's debug view.
    pub fn register(
        engine: Arc<dyn TemplateEngine>,
        bus: &UpdateBus,
        body: impl Into<String>,
        slot: &OutputSlot,
        class: &str,
        debug_view: bool,
    ) -> Result<Self> {
        let body = body.into();
        let region = LiveRegion::new(class, debug_view);

        region.replace(render(engine.as_ref(), &body)?);
        slot.append(Node::Region(region.clone()));

        let subscription = bus.subscribe({
            let region = region.clone();
            move || {
                let fragment = render(engine.as_ref(), &body)?;
                region.replace(fragment);
                trace!("Re-rendered live fragment");
                Ok(())
            }
        });

        Ok(Self {
            bus: bus.clone(),
            subscription,
            region,
        })
    }

    pub fn region(&self) -> &LiveRegion {
        &self.region
    }

    /// Stop re-rendering, the last output stays in the slot
    pub fn detach(self) -> bool {
        self.bus.unsubscribe(self.subscription)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{CountingTemplates, FailingTemplates};

    const CLASS: &str = "macro-live-update";

    #[test]
    fn register_renders_immediately_in_tagged_container() {
        let bus = UpdateBus::new();
        let slot = OutputSlot::new();
        let engine = Arc::new(CountingTemplates::default());

        LiveFragment::register(engine.clone(), &bus, "Here", &slot, CLASS, false)
            .expect("Failed to register");

        assert_eq!(engine.evaluations(), 1);
        assert_eq!(
            slot.to_markup(),
            "<span class=\"macro-live-update\">Here #1</span>"
        );
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[test]
    fn debug_view_tags_region_as_block() {
        let bus = UpdateBus::new();
        let slot = OutputSlot::new();
        let engine = Arc::new(CountingTemplates::default());

        let live = LiveFragment::register(engine, &bus, "Here", &slot, CLASS, true)
            .expect("Failed to register");
        bus.publish().expect("Publish failed");

        assert!(live.region().is_block());
        assert_eq!(
            slot.to_markup(),
            "<span class=\"macro-live-update\" data-debug-view=\"block\">Here #2</span>"
        );
    }

    #[test]
    fn updates_replace_instead_of_accumulate() {
        let bus = UpdateBus::new();
        let slot = OutputSlot::new();
        let engine = Arc::new(CountingTemplates::default());
        LiveFragment::register(engine.clone(), &bus, "Pos", &slot, CLASS, false)
            .expect("Failed to register");

        for _ in 0..4 {
            bus.publish().expect("Publish failed");
        }

        assert_eq!(slot.text(), "Pos #5");
        assert_eq!(slot.snapshot().nodes().len(), 1);
    }

    #[test]
    fn bindings_render_independently() {
        let bus = UpdateBus::new();
        let first = OutputSlot::new();
        let second = OutputSlot::new();
        let engine = Arc::new(CountingTemplates::default());

        LiveFragment::register(engine.clone(), &bus, "A", &first, CLASS, false)
            .expect("Failed to register");
        LiveFragment::register(engine.clone(), &bus, "B", &second, CLASS, false)
            .expect("Failed to register");

        bus.publish().expect("Publish failed");

        assert_eq!(first.text(), "A #3");
        assert_eq!(second.text(), "B #4");
    }

    #[test]
    fn slot_keeps_surrounding_output() {
        let bus = UpdateBus::new();
        let slot = OutputSlot::new();
        slot.append(Node::Text("You are at: ".into()));
        let engine = Arc::new(CountingTemplates::default());

        LiveFragment::register(engine, &bus, "x", &slot, CLASS, false)
            .expect("Failed to register");
        bus.publish().expect("Publish failed");

        assert_eq!(slot.text(), "You are at: x #2");
    }

    #[test]
    fn detach_stops_rerendering() {
        let bus = UpdateBus::new();
        let slot = OutputSlot::new();
        let engine = Arc::new(CountingTemplates::default());
        let live = LiveFragment::register(engine.clone(), &bus, "x", &slot, CLASS, false)
            .expect("Failed to register");

        assert_eq!(live.region().class(), CLASS);
        assert!(live.detach());
        bus.publish().expect("Publish failed");

        assert_eq!(engine.evaluations(), 1);
        assert_eq!(slot.text(), "x #1");
    }

    #[test]
    fn initial_render_error_is_returned() {
        let bus = UpdateBus::new();
        let slot = OutputSlot::new();
        let engine = Arc::new(FailingTemplates::after(0));
        let res = LiveFragment::register(engine, &bus, "x", &slot, CLASS, false);
        assert!(res.is_err());
        assert!(slot.is_empty());
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn failed_rerender_keeps_previous_output() {
        let bus = UpdateBus::new();
        let slot = OutputSlot::new();
        let engine = Arc::new(FailingTemplates::after(1));
        LiveFragment::register(engine, &bus, "ok", &slot, CLASS, false)
            .expect("Failed to register");

        let err = bus.publish().expect_err("Render error was swallowed");
        assert!(err.to_string().contains("ok"));
        assert_eq!(slot.text(), "ok");
    }
}
