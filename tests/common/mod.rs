//! In-memory engine for exercising the runner without a browser
//!
//! A `FakePage` is keyed by locator descriptions: an element "exists" for
//! exactly the locators it was registered under. Clicks and hovers schedule
//! effects, optionally delayed, which are applied lazily on the next query
//! so polling sees state change over time the way it would in a browser.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rfverify::{
    ActionTarget, ElementState, Engine, EngineConfig, Error, Locator, Result, Runner, RunnerConfig, Viewport,
};

/// Engines created through `Engine::new` count themselves here
pub static LIVE: AtomicUsize = AtomicUsize::new(0);

pub const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";

#[derive(Debug, Clone)]
pub struct FakeElement {
    pub count: usize,
    pub visible: bool,
    pub opacity: String,
    pub enabled: bool,
    pub covered_by: Option<String>,
}

impl FakeElement {
    pub fn shown() -> Self {
        Self {
            count: 1,
            visible: true,
            opacity: "1".into(),
            enabled: true,
            covered_by: None,
        }
    }

    pub fn hidden() -> Self {
        Self {
            visible: false,
            opacity: "0".into(),
            ..Self::shown()
        }
    }

    pub fn absent() -> Self {
        Self {
            count: 0,
            ..Self::hidden()
        }
    }
}

#[derive(Debug, Clone)]
pub enum Change {
    Show,
    Hide,
    Opacity(String),
    Remove,
}

#[derive(Debug, Clone)]
pub struct Effect {
    target: String,
    delay: Duration,
    change: Change,
}

impl Effect {
    pub fn show(target: &Locator) -> Self {
        Self::new(target, Change::Show)
    }

    pub fn hide(target: &Locator) -> Self {
        Self::new(target, Change::Hide)
    }

    pub fn fade(target: &Locator, opacity: &str) -> Self {
        Self::new(target, Change::Opacity(opacity.into()))
    }

    pub fn remove(target: &Locator) -> Self {
        Self::new(target, Change::Remove)
    }

    pub fn after(mut self, ms: u64) -> Self {
        self.delay = Duration::from_millis(ms);
        self
    }

    fn new(target: &Locator, change: Change) -> Self {
        Self {
            target: target.to_string(),
            delay: Duration::ZERO,
            change,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakePage {
    elements: Vec<(String, FakeElement)>,
    on_click: HashMap<String, Vec<Effect>>,
    on_hover: HashMap<String, Vec<Effect>>,
    on_unhover: HashMap<String, Vec<Effect>>,
}

impl FakePage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn element(mut self, locator: &Locator, element: FakeElement) -> Self {
        self.elements.push((locator.to_string(), element));
        self
    }

    pub fn visible(self, locator: &Locator) -> Self {
        self.element(locator, FakeElement::shown())
    }

    pub fn hidden(self, locator: &Locator) -> Self {
        self.element(locator, FakeElement::hidden())
    }

    pub fn absent(self, locator: &Locator) -> Self {
        self.element(locator, FakeElement::absent())
    }

    pub fn on_click(mut self, locator: &Locator, effects: Vec<Effect>) -> Self {
        self.on_click.insert(locator.to_string(), effects);
        self
    }

    pub fn on_hover(mut self, locator: &Locator, effects: Vec<Effect>) -> Self {
        self.on_hover.insert(locator.to_string(), effects);
        self
    }

    pub fn on_unhover(mut self, locator: &Locator, effects: Vec<Effect>) -> Self {
        self.on_unhover.insert(locator.to_string(), effects);
        self
    }

    /// The component showcase as the built-in scenarios expect it to behave
    pub fn showcase() -> Self {
        let heading = |name: &str| Locator::role_named("heading", name);
        let button = |name: &str| Locator::role_named("button", name);
        let title = Locator::role_named("heading", "Component Showcase");

        let dialog = Locator::role("dialog");
        let close = dialog.clone().locate(button("Close"));
        let dialog_title = dialog.clone().locate(heading("Dialog Title"));
        let tooltip = Locator::text("This is a tooltip!");
        let toast = Locator::text("Your message has been sent.");
        let trigger = Locator::css(".select-trigger");
        let popover = Locator::css(".select-popover");
        let apple = popover.clone().locate(Locator::text("Apple"));
        let chosen = trigger.clone().locate(Locator::text("Apple"));
        let alert = Locator::css(".alert").first();
        let layout = heading("Layout & Structure")
            .parent()
            .locate(Locator::css(".component-preview"));

        let mut page = FakePage::new();
        for name in [
            "Display",
            "Buttons & Controls",
            "Form Inputs",
            "Overlays & Feedback",
            "Layout & Structure",
            "Button",
            "Accordion",
            "Dialog",
            "Tooltip",
            "Toast",
            "Card",
            "Forms",
            "Advanced Forms & Inputs",
            "Alert",
            "Avatar",
            "Badge",
        ] {
            page = page.visible(&heading(name));
        }
        for css in [".aspect-ratio-16-9", ".separator", ".resizable", ".scroll-area"] {
            page = page.visible(&layout.clone().locate(Locator::css(css)));
        }

        page.visible(&title)
            .visible(&alert)
            .visible(&alert.clone().locate(Locator::role_named("heading", "Alert Title")))
            .visible(&Locator::css(r#"img[alt="User Avatar"]"#))
            .visible(&Locator::text("CN"))
            .visible(&Locator::text("Default"))
            .visible(&Locator::text("Primary"))
            .visible(&layout.clone().locate(Locator::role("table")))
            .visible(
                &Locator::label("Resizable Panel")
                    .parent()
                    .locate(Locator::css(".resizable")),
            )
            .visible(&button("Open Dialog"))
            .visible(&button("Hover me"))
            .visible(&button("Show Toast"))
            .visible(&trigger)
            .absent(&dialog)
            .absent(&close)
            .absent(&dialog_title)
            .hidden(&tooltip)
            .absent(&toast)
            .hidden(&popover)
            .hidden(&apple)
            .absent(&chosen)
            .on_click(
                &button("Open Dialog"),
                vec![Effect::show(&dialog), Effect::show(&dialog_title), Effect::show(&close)],
            )
            .on_click(
                &close,
                vec![Effect::remove(&dialog), Effect::remove(&dialog_title), Effect::remove(&close)],
            )
            .on_hover(&button("Hover me"), vec![Effect::show(&tooltip)])
            .on_unhover(&button("Hover me"), vec![Effect::fade(&tooltip, "0").after(60)])
            .on_click(&button("Show Toast"), vec![Effect::show(&toast)])
            .on_click(&trigger, vec![Effect::show(&popover), Effect::show(&apple)])
            .on_click(&title, vec![Effect::fade(&popover, "0").after(60), Effect::hide(&apple)])
            .on_click(
                &apple,
                vec![Effect::show(&chosen), Effect::fade(&popover, "0").after(60), Effect::hide(&apple)],
            )
    }
}

/// Shared view of what an engine did, for assertions after it is consumed
#[derive(Debug, Clone, Default)]
pub struct Probe {
    pub live: Arc<AtomicUsize>,
    pub calls: Arc<Mutex<Vec<String>>>,
}

impl Probe {
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }
}

pub struct FakeEngine {
    page: FakePage,
    state: Vec<(String, FakeElement)>,
    pending: Vec<(Instant, Effect)>,
    hovered: Option<String>,
    loaded: Option<String>,
    viewport: Viewport,
    probe: Probe,
    counts_globally: bool,
    pub fail_render: bool,
    pub fail_close: bool,
    pub panic_on_query: Option<String>,
}

impl FakeEngine {
    /// An engine over `page`; the probe's live counter includes it until closed
    pub fn with_page(page: FakePage, probe: &Probe) -> Self {
        probe.live.fetch_add(1, Ordering::SeqCst);
        Self {
            state: page.elements.clone(),
            page,
            pending: Vec::new(),
            hovered: None,
            loaded: None,
            viewport: Viewport::default(),
            probe: probe.clone(),
            counts_globally: false,
            fail_render: false,
            fail_close: false,
            panic_on_query: None,
        }
    }

    fn record(&self, call: String) {
        self.probe.calls.lock().unwrap().push(call);
    }

    fn apply_due(&mut self) {
        let now = Instant::now();
        let (due, later): (Vec<_>, Vec<_>) = self.pending.drain(..).partition(|(at, _)| *at <= now);
        self.pending = later;
        for (_, effect) in due {
            if let Some((_, el)) = self.state.iter_mut().find(|(k, _)| *k == effect.target) {
                match effect.change {
                    Change::Show => {
                        el.count = el.count.max(1);
                        el.visible = true;
                        el.opacity = "1".into();
                    }
                    Change::Hide => el.visible = false,
                    Change::Opacity(v) => el.opacity = v,
                    Change::Remove => {
                        el.count = 0;
                        el.visible = false;
                    }
                }
            }
        }
    }

    fn schedule(&mut self, effects: Option<Vec<Effect>>) {
        let now = Instant::now();
        for effect in effects.unwrap_or_default() {
            self.pending.push((now + effect.delay, effect));
        }
    }

    fn lookup(&mut self, locator: &Locator) -> Option<(usize, FakeElement)> {
        self.apply_due();
        if self.loaded.is_none() {
            return None;
        }
        let key = locator.to_string();
        self.state
            .iter()
            .position(|(k, _)| *k == key)
            .map(|i| (i, self.state[i].1.clone()))
            .filter(|(_, el)| el.count > 0)
    }
}

impl Engine for FakeEngine {
    fn new(config: EngineConfig) -> Result<Self> {
        LIVE.fetch_add(1, Ordering::SeqCst);
        let mut engine = Self::with_page(FakePage::showcase(), &Probe::default());
        engine.viewport = config.viewport;
        engine.counts_globally = true;
        Ok(engine)
    }

    fn load_url(&mut self, url: &str) -> Result<()> {
        self.record(format!("load {}", url));
        if !url.ends_with(".html") {
            return Err(Error::NavigationError(format!("{} is not a document", url)));
        }
        self.state = self.page.elements.clone();
        self.pending.clear();
        self.hovered = None;
        self.loaded = Some(url.to_string());
        Ok(())
    }

    fn set_viewport(&mut self, viewport: Viewport) -> Result<()> {
        self.record(format!("viewport {}", viewport));
        self.viewport = viewport;
        Ok(())
    }

    fn query(&mut self, locator: &Locator) -> Result<ElementState> {
        let key = locator.to_string();
        if self.panic_on_query.as_deref() == Some(key.as_str()) {
            panic!("query panicked on {}", key);
        }
        self.record(format!("query {}", key));
        Ok(match self.lookup(locator) {
            Some((_, el)) => ElementState {
                count: el.count,
                visible: el.visible,
            },
            None => ElementState::default(),
        })
    }

    fn computed_style(&mut self, locator: &Locator, property: &str) -> Result<Option<String>> {
        self.record(format!("style {} {}", locator, property));
        Ok(self.lookup(locator).map(|(_, el)| match property {
            "opacity" => el.opacity,
            _ => String::new(),
        }))
    }

    fn action_target(&mut self, locator: &Locator, check_enabled: bool) -> Result<ActionTarget> {
        self.record(format!("target {}", locator));
        Ok(match self.lookup(locator) {
            None => ActionTarget::NotFound,
            Some((_, el)) if !el.visible => ActionTarget::Hidden,
            Some((_, el)) if check_enabled && !el.enabled => ActionTarget::Disabled,
            Some((_, el)) if el.covered_by.is_some() => ActionTarget::Covered {
                by: el.covered_by.unwrap_or_default(),
            },
            Some((i, _)) => ActionTarget::Ready { x: i as f64, y: 0.0 },
        })
    }

    fn click_at(&mut self, x: f64, _y: f64) -> Result<()> {
        let key = self.state[x as usize].0.clone();
        self.record(format!("click {}", key));
        let effects = self.page.on_click.get(&key).cloned();
        self.schedule(effects);
        Ok(())
    }

    fn hover_at(&mut self, x: f64, _y: f64) -> Result<()> {
        let key = self.state[x as usize].0.clone();
        self.record(format!("hover {}", key));
        if self.hovered.as_deref() != Some(key.as_str()) {
            if let Some(previous) = self.hovered.take() {
                let effects = self.page.on_unhover.get(&previous).cloned();
                self.schedule(effects);
            }
            let effects = self.page.on_hover.get(&key).cloned();
            self.schedule(effects);
            self.hovered = Some(key);
        }
        Ok(())
    }

    fn render_png(&mut self, full_page: bool) -> Result<Vec<u8>> {
        self.record(format!("render full_page={}", full_page));
        if self.fail_render {
            return Err(Error::RenderError("capture failed".into()));
        }
        let mut png = PNG_MAGIC.to_vec();
        png.extend_from_slice(self.viewport.to_string().as_bytes());
        Ok(png)
    }

    fn close(self) -> Result<()> {
        self.record("close".to_string());
        self.probe.live.fetch_sub(1, Ordering::SeqCst);
        if self.counts_globally {
            LIVE.fetch_sub(1, Ordering::SeqCst);
        }
        if self.fail_close {
            return Err(Error::InitializationError("close failed".into()));
        }
        Ok(())
    }
}

/// A temporary directory holding an `index.html`
pub fn workspace() -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let doc = dir.path().join("index.html");
    std::fs::write(&doc, "<!DOCTYPE html><h1>Component Showcase</h1>").unwrap();
    (dir, doc)
}

/// A runner with short timeouts writing into `out`
pub fn runner(out: &Path) -> Runner {
    Runner::new(RunnerConfig {
        output_dir: out.to_path_buf(),
        timeout_ms: 400,
        poll_interval_ms: 10,
        jobs: 2,
        ..RunnerConfig::default()
    })
}
