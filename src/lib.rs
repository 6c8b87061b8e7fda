//! RFox Verify
//!
//! Declarative visual verification for static HTML/CSS component pages. A
//! [`Scenario`] loads a document in a headless browser, runs an ordered list
//! of interactions and polling assertions against it, and writes one PNG
//! artifact when every step passes.
//!
//! # Features
//!
//! - **CDP Backend** (default): drives headless Chrome over the DevTools Protocol
//! - **Scenarios as data**: steps and locators are plain values, loadable from YAML
//! - **Polling assertions**: visibility and computed-style checks retry until
//!   they hold or time out, instead of sleeping a fixed amount
//! - **Isolated contexts**: every scenario owns its browser, which is released
//!   on every exit path
//!
//! # Example
//!
//! ```no_run
//! use rfverify::{Locator, Runner, RunnerConfig, Scenario, Step};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let scenario = Scenario::new("dialog", "basecoat-clone-ui/index.html")
//!     .step(Step::click(Locator::role_named("button", "Open Dialog")))
//!     .step(Step::assert_visible(Locator::role("dialog")))
//!     .step(Step::click(Locator::role("dialog").locate(Locator::role_named("button", "Close"))))
//!     .step(Step::assert_not_visible(Locator::role("dialog")));
//!
//! let runner = Runner::new(RunnerConfig::default());
//! let report = runner.run::<rfverify::cdp::CdpEngine>(&scenario)?;
//! println!("wrote {}", report.artifact.path.display());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub mod error;
pub use error::{Error, Result, RunError};

pub mod dom;
pub mod locator;
pub mod runner;
pub mod scenario;
pub mod showcase;
pub mod suite;

#[cfg(feature = "cdp")]
pub mod cdp;

pub use dom::{ActionTarget, ElementState};
pub use locator::Locator;
pub use runner::{Artifact, Phase, Runner, RunnerConfig, ScenarioReport};
pub use scenario::{Action, DocumentRef, Scenario, Step, SuiteFile};
pub use suite::{Suite, SuiteReport};

/// Configuration for the browser backend
///
/// The defaults are conservative: headless, sandboxed, and a viewport that
/// matches common desktop screenshots. Scenarios override the viewport.
///
/// # Examples
///
/// ```
/// let cfg = rfverify::EngineConfig::default();
/// assert!(cfg.headless);
/// assert_eq!(cfg.viewport.width, 1280);
/// ```
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Initial viewport dimensions
    pub viewport: Viewport,
    /// Run the browser without a window
    pub headless: bool,
    /// Keep the browser's process sandbox enabled
    pub sandbox: bool,
    /// Timeout for page loads in milliseconds
    pub timeout_ms: u64,
    /// How long the browser may sit without receiving a command before it
    /// shuts itself down (must exceed the longest `wait` step)
    pub idle_timeout_ms: u64,
    /// Explicit browser executable; auto-detected when `None`
    pub browser_path: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            viewport: Viewport::default(),
            headless: true,
            sandbox: true,
            timeout_ms: 30000,
            idle_timeout_ms: 300000,
            browser_path: None,
        }
    }
}

/// Viewport dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

impl std::fmt::Display for Viewport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A browsing context the runner can drive.
///
/// One engine instance is one isolated context: it is created for a single
/// scenario and closed when that scenario ends. Methods that take a
/// [`Locator`] resolve it against the document as it is at call time and
/// never wait; polling is the runner's job.
pub trait Engine {
    /// Launch a new, isolated browsing context
    fn new(config: EngineConfig) -> Result<Self>
    where
        Self: Sized;

    /// Load a URL and wait for navigation to finish
    fn load_url(&mut self, url: &str) -> Result<()>;

    /// Resize the viewport
    fn set_viewport(&mut self, viewport: Viewport) -> Result<()>;

    /// Count matches and report whether the first one is visible
    fn query(&mut self, locator: &Locator) -> Result<ElementState>;

    /// Computed value of a CSS property on the first match, `None` if nothing matches
    fn computed_style(&mut self, locator: &Locator, property: &str) -> Result<Option<String>>;

    /// Scroll the first match into view and check that it can receive a
    /// pointer action at its centre
    fn action_target(&mut self, locator: &Locator, check_enabled: bool) -> Result<ActionTarget>;

    /// Press and release the primary mouse button at viewport coordinates
    fn click_at(&mut self, x: f64, y: f64) -> Result<()>;

    /// Move the mouse to viewport coordinates
    fn hover_at(&mut self, x: f64, y: f64) -> Result<()>;

    /// Render the current document as a PNG image
    fn render_png(&mut self, full_page: bool) -> Result<Vec<u8>>;

    /// Close the context and release its browser resources
    fn close(self) -> Result<()>;
}

/// Create a new engine instance with the default backend
#[cfg(feature = "cdp")]
pub fn new_engine(config: EngineConfig) -> Result<impl Engine> {
    cdp::CdpEngine::new(config)
}
