//! Declarative scenario definitions
//!
//! A scenario is data: a document, a viewport and an ordered list of steps.
//! Scenarios are built in code (see [`crate::showcase`]) or loaded from YAML:
//!
//! ```yaml
//! name: dialog
//! document: ../basecoat-clone-ui/index.html
//! viewport: { width: 1280, height: 4000 }
//! steps:
//!   - step: act
//!     action: click
//!     target: { by: role, role: button, name: Open Dialog }
//!   - step: assert_visible
//!     target: { by: role, role: dialog }
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::locator::Locator;
use crate::{dom, Error, Result, Viewport};

/// Reference to the document under test: a local path or an explicit URL.
///
/// Relative paths resolve against the directory of the scenario file that
/// named them (or the working directory for scenarios built in code).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentRef(String);

impl DocumentRef {
    pub fn new(reference: impl Into<String>) -> Self {
        DocumentRef(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn is_url(&self) -> bool {
        self.0.contains("://") || self.0.starts_with("data:") || self.0.starts_with("about:")
    }

    /// Resolve to a loadable URL. Local files must exist.
    pub fn resolve(&self, base_dir: &Path) -> Result<Url> {
        if self.is_url() {
            let url = Url::parse(&self.0)
                .map_err(|e| Error::NavigationError(format!("Invalid URL {:?}: {}", self.0, e)))?;
            if url.scheme() == "file" {
                let path = url
                    .to_file_path()
                    .map_err(|_| Error::NavigationError(format!("Invalid file URL {:?}", self.0)))?;
                if !path.is_file() {
                    return Err(Error::NavigationError(format!("{} does not exist", path.display())));
                }
            }
            return Ok(url);
        }

        let path = Path::new(&self.0);
        let path = if path.is_relative() {
            base_dir.join(path)
        } else {
            path.to_path_buf()
        };
        if !path.is_file() {
            return Err(Error::NavigationError(format!("{} does not exist", path.display())));
        }
        let canonical = path.canonicalize()?;
        Url::from_file_path(&canonical)
            .map_err(|_| Error::NavigationError(format!("Cannot build a file URL for {}", canonical.display())))
    }
}

impl fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Pointer interaction performed by an `act` step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Click,
    Hover,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Click => f.write_str("click"),
            Action::Hover => f.write_str("hover"),
        }
    }
}

/// A single step in a scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
    /// Load a document; without `url` the scenario's own document is reloaded
    Navigate {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<DocumentRef>,
    },

    /// Resize the viewport
    SetViewport { width: u32, height: u32 },

    /// Wait until at least one element matches
    Locate {
        target: Locator,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },

    /// Click or hover an element once it is actionable
    Act {
        action: Action,
        target: Locator,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },

    /// Wait until the first match is visible
    AssertVisible {
        target: Locator,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },

    /// Wait until nothing matches or the first match is not visible
    AssertNotVisible {
        target: Locator,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },

    /// Wait until a computed style property equals `expected`
    AssertCss {
        target: Locator,
        property: String,
        expected: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },

    /// Fixed pause, for settling that has nothing to poll on (web fonts).
    /// Must be shorter than the engine's `idle_timeout_ms`.
    Wait { ms: u64 },
}

impl Step {
    pub fn navigate() -> Self {
        Step::Navigate { url: None }
    }

    pub fn set_viewport(width: u32, height: u32) -> Self {
        Step::SetViewport { width, height }
    }

    pub fn locate(target: Locator) -> Self {
        Step::Locate {
            target,
            timeout_ms: None,
        }
    }

    pub fn click(target: Locator) -> Self {
        Step::Act {
            action: Action::Click,
            target,
            timeout_ms: None,
        }
    }

    pub fn hover(target: Locator) -> Self {
        Step::Act {
            action: Action::Hover,
            target,
            timeout_ms: None,
        }
    }

    pub fn assert_visible(target: Locator) -> Self {
        Step::AssertVisible {
            target,
            timeout_ms: None,
        }
    }

    pub fn assert_not_visible(target: Locator) -> Self {
        Step::AssertNotVisible {
            target,
            timeout_ms: None,
        }
    }

    pub fn assert_css(target: Locator, property: impl Into<String>, expected: impl Into<String>) -> Self {
        Step::AssertCss {
            target,
            property: property.into(),
            expected: expected.into(),
            timeout_ms: None,
        }
    }

    pub fn wait(ms: u64) -> Self {
        Step::Wait { ms }
    }

    /// Override the poll timeout of a locator step; other steps are unchanged
    pub fn with_timeout(mut self, ms: u64) -> Self {
        match &mut self {
            Step::Locate { timeout_ms, .. }
            | Step::Act { timeout_ms, .. }
            | Step::AssertVisible { timeout_ms, .. }
            | Step::AssertNotVisible { timeout_ms, .. }
            | Step::AssertCss { timeout_ms, .. } => *timeout_ms = Some(ms),
            _ => {}
        }
        self
    }

    /// The locator this step resolves, if any
    pub fn target(&self) -> Option<&Locator> {
        match self {
            Step::Locate { target, .. }
            | Step::Act { target, .. }
            | Step::AssertVisible { target, .. }
            | Step::AssertNotVisible { target, .. }
            | Step::AssertCss { target, .. } => Some(target),
            _ => None,
        }
    }

    pub fn timeout_ms(&self) -> Option<u64> {
        match self {
            Step::Locate { timeout_ms, .. }
            | Step::Act { timeout_ms, .. }
            | Step::AssertVisible { timeout_ms, .. }
            | Step::AssertNotVisible { timeout_ms, .. }
            | Step::AssertCss { timeout_ms, .. } => *timeout_ms,
            _ => None,
        }
    }

    /// Short label used in logs and error messages
    pub fn label(&self) -> String {
        match self {
            Step::Navigate { url: Some(url) } => format!("navigate {}", url),
            Step::Navigate { url: None } => "navigate".to_string(),
            Step::SetViewport { width, height } => format!("set_viewport {}x{}", width, height),
            Step::Locate { .. } => "locate".to_string(),
            Step::Act { action, .. } => action.to_string(),
            Step::AssertVisible { .. } => "assert_visible".to_string(),
            Step::AssertNotVisible { .. } => "assert_not_visible".to_string(),
            Step::AssertCss { property, expected, .. } => format!("assert_css {}={:?}", property, expected),
            Step::Wait { ms } => format!("wait {}ms", ms),
        }
    }

    fn validate(&self) -> Result<()> {
        if let Some(target) = self.target() {
            target.validate()?;
        }
        match self {
            Step::SetViewport { width, height } if *width == 0 || *height == 0 => Err(Error::ConfigError(
                format!("viewport must be non-empty, got {}x{}", width, height),
            )),
            Step::AssertCss { property, .. } => dom::validate_property(property),
            _ => Ok(()),
        }
    }
}

fn default_viewport() -> Viewport {
    Viewport {
        width: 1280,
        height: 720,
    }
}

fn default_full_page() -> bool {
    true
}

/// One end-to-end verification run producing one artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Unique identifier; also the artifact file stem
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    /// Tags for filtering
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// Document under test
    pub document: DocumentRef,

    #[serde(default = "default_viewport")]
    pub viewport: Viewport,

    /// Capture the whole scrollable document rather than the viewport
    #[serde(default = "default_full_page")]
    pub full_page: bool,

    /// Steps to execute in order
    #[serde(default)]
    pub steps: Vec<Step>,

    /// Directory relative document paths resolve against
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

impl Scenario {
    pub fn new(name: impl Into<String>, document: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            tags: Vec::new(),
            document: DocumentRef::new(document),
            viewport: default_viewport(),
            full_page: true,
            steps: Vec::new(),
            base_dir: None,
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport = Viewport { width, height };
        self
    }

    /// File name of the artifact this scenario writes
    pub fn artifact_file(&self) -> String {
        format!("{}.png", self.name)
    }

    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn steps(mut self, steps: impl IntoIterator<Item = Step>) -> Self {
        self.steps.extend(steps);
        self
    }

    /// Directory relative document references resolve against
    pub fn base_dir(&self) -> PathBuf {
        self.base_dir.clone().unwrap_or_else(|| PathBuf::from("."))
    }

    /// Check the scenario is runnable without touching the browser
    pub fn validate(&self) -> Result<()> {
        if !is_valid_name(&self.name) {
            return Err(Error::ConfigError(format!(
                "scenario name {:?} must be non-empty and use only letters, digits, '.', '_' or '-'",
                self.name
            )));
        }
        if self.viewport.width == 0 || self.viewport.height == 0 {
            return Err(Error::ConfigError(format!(
                "scenario '{}' has an empty viewport {}",
                self.name, self.viewport
            )));
        }
        for (i, step) in self.steps.iter().enumerate() {
            step.validate().map_err(|e| {
                Error::ConfigError(format!("scenario '{}' step {} ({}): {}", self.name, i + 1, step.label(), e))
            })?;
        }
        Ok(())
    }

    /// Parse a single scenario from YAML
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(Error::from)
    }
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

/// Run settings a suite file may carry; command-line flags take precedence
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub poll_interval_ms: Option<u64>,
    #[serde(default)]
    pub jobs: Option<usize>,
}

impl Settings {
    /// Fields set in `other` override fields set in `self`
    pub fn merge(&mut self, other: Settings) {
        if other.output_dir.is_some() {
            self.output_dir = other.output_dir;
        }
        if other.timeout_ms.is_some() {
            self.timeout_ms = other.timeout_ms;
        }
        if other.poll_interval_ms.is_some() {
            self.poll_interval_ms = other.poll_interval_ms;
        }
        if other.jobs.is_some() {
            self.jobs = other.jobs;
        }
    }
}

/// A scenario file: either a bare scenario or `{ settings, scenarios }`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SuiteFile {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub scenarios: Vec<Scenario>,
}

impl SuiteFile {
    /// Parse YAML holding either a suite or a single scenario
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let value: serde_yaml::Value = serde_yaml::from_str(yaml)?;
        let is_suite = value
            .as_mapping()
            .map(|m| m.contains_key("scenarios") || m.contains_key("settings"))
            .unwrap_or(false);
        if is_suite {
            Ok(serde_yaml::from_value(value)?)
        } else {
            let scenario: Scenario = serde_yaml::from_value(value)?;
            Ok(SuiteFile {
                settings: Settings::default(),
                scenarios: vec![scenario],
            })
        }
    }

    /// Load a YAML file; relative documents resolve against its directory
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigError(format!("Failed to read {}: {}", path.display(), e)))?;
        let mut suite = Self::from_yaml(&content)
            .map_err(|e| Error::ConfigError(format!("Failed to parse {}: {}", path.display(), e)))?;
        let dir = path.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
        for scenario in &mut suite.scenarios {
            scenario.base_dir = Some(dir.clone());
        }
        Ok(suite)
    }

    /// Load a file, or every `*.yaml`/`*.yml` below a directory in file-name
    /// order. Settings from later files override earlier ones.
    pub fn load_path(path: &Path) -> Result<Self> {
        if !path.is_dir() {
            return Self::from_file(path);
        }

        let mut merged = SuiteFile::default();
        for entry in walkdir::WalkDir::new(path)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.file_type().is_file()
                    && e.path()
                        .extension()
                        .map(|ext| ext == "yaml" || ext == "yml")
                        .unwrap_or(false)
            })
        {
            let suite = Self::from_file(entry.path())?;
            merged.settings.merge(suite.settings);
            merged.scenarios.extend(suite.scenarios);
        }
        Ok(merged)
    }
}
