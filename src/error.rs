//! Error types for the verification harness

use std::fmt;

use thiserror::Error;

use crate::runner::Phase;

/// Result type alias for engine and runner operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while driving a document
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to launch or attach the browser
    #[error("Engine initialization failed: {0}")]
    InitializationError(String),

    /// The target document could not be found or loaded
    #[error("Failed to load document: {0}")]
    NavigationError(String),

    /// No element matched the locator before the timeout elapsed
    #[error("No element matches {locator} after {timeout_ms}ms")]
    LocatorNotFound { locator: String, timeout_ms: u64 },

    /// An element matched but the expected state was never observed
    #[error("{detail} (gave up after {timeout_ms}ms)")]
    AssertionTimeout { detail: String, timeout_ms: u64 },

    /// A resolved element could not be clicked or hovered
    #[error("Interaction failed: {0}")]
    InteractionError(String),

    /// Failed to capture the document
    #[error("Rendering failed: {0}")]
    RenderError(String),

    /// An in-page script failed or returned something unexpected
    #[error("Script execution failed: {0}")]
    ScriptError(String),

    /// Invalid scenario or runner configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CDP-specific error
    #[cfg(feature = "cdp")]
    #[error("CDP error: {0}")]
    CdpError(String),
}

impl Error {
    /// Short stable name of the error kind, used in reports
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InitializationError(_) => "initialization",
            Error::NavigationError(_) => "navigation",
            Error::LocatorNotFound { .. } => "locator_not_found",
            Error::AssertionTimeout { .. } => "assertion_timeout",
            Error::InteractionError(_) => "interaction",
            Error::RenderError(_) => "render",
            Error::ScriptError(_) => "script",
            Error::ConfigError(_) => "config",
            Error::Io(_) => "io",
            Error::Yaml(_) => "yaml",
            Error::Json(_) => "json",
            #[cfg(feature = "cdp")]
            Error::CdpError(_) => "cdp",
        }
    }
}

/// A scenario failure, carrying enough context to find the failing step.
///
/// `step_index` is 1-based and `None` when the scenario failed before its
/// first step (launch or initial navigation) or while capturing.
#[derive(Debug)]
pub struct RunError {
    pub scenario: String,
    pub step_index: Option<usize>,
    pub step: Option<String>,
    pub locator: Option<String>,
    pub source: Error,
    /// Phases the run went through, always ending in `Released`
    pub phases: Vec<Phase>,
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scenario '{}' failed", self.scenario)?;
        match (self.step_index, &self.step) {
            (Some(i), Some(step)) => write!(f, " at step {} ({})", i, step)?,
            (Some(i), None) => write!(f, " at step {}", i)?,
            (None, _) => {
                let phase = self
                    .phases
                    .iter()
                    .rev()
                    .find(|p| !matches!(p, Phase::Failed | Phase::Released));
                if let Some(phase) = phase {
                    write!(f, " while {}", phase)?;
                }
            }
        }
        if let Some(locator) = &self.locator {
            write!(f, " [{}]", locator)?;
        }
        write!(f, ": {}", self.source)
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}
