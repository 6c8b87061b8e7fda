//! Running many scenarios
//!
//! Each scenario runs on its own worker thread with its own browsing
//! context, so scenarios never share state. A semaphore caps how many run
//! at once; results come back in the order the scenarios were given.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use log::{error, info};
use serde::Serialize;
use tokio::sync::{oneshot, Semaphore};

use crate::runner::{Artifact, Phase, Runner, ScenarioReport};
use crate::{Engine, Error, Result, RunError, Scenario};

/// Result of one scenario within a suite
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioResult {
    pub name: String,
    pub success: bool,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<Artifact>,
    pub phases: Vec<Phase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locator: Option<String>,
}

impl ScenarioResult {
    fn passed(report: ScenarioReport) -> Self {
        Self {
            name: report.name,
            success: true,
            duration_ms: report.duration_ms,
            artifact: Some(report.artifact),
            phases: report.phases,
            error: None,
            error_kind: None,
            step_index: None,
            locator: None,
        }
    }

    fn failed(err: RunError, duration_ms: u64) -> Self {
        Self {
            name: err.scenario.clone(),
            success: false,
            duration_ms,
            artifact: None,
            error: Some(err.to_string()),
            error_kind: Some(err.source.kind().to_string()),
            step_index: err.step_index,
            locator: err.locator,
            phases: err.phases,
        }
    }

    fn crashed(name: &str) -> Self {
        Self {
            name: name.to_string(),
            success: false,
            duration_ms: 0,
            artifact: None,
            phases: vec![Phase::Failed, Phase::Released],
            error: Some(format!("scenario '{}' aborted: worker thread panicked", name)),
            error_kind: Some("panic".to_string()),
            step_index: None,
            locator: None,
        }
    }
}

/// Result of running a suite
#[derive(Debug, Clone, Serialize)]
pub struct SuiteReport {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub results: Vec<ScenarioResult>,
}

impl SuiteReport {
    pub fn success(&self) -> bool {
        self.failed == 0
    }

    /// Write the report as pretty-printed JSON
    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// An ordered set of scenarios and the runner that executes them
#[derive(Debug, Clone)]
pub struct Suite {
    runner: Runner,
    scenarios: Vec<Scenario>,
}

impl Suite {
    pub fn new(runner: Runner, scenarios: Vec<Scenario>) -> Self {
        Self { runner, scenarios }
    }

    pub fn scenarios(&self) -> &[Scenario] {
        &self.scenarios
    }

    /// Keep only the named scenarios, in the suite's order
    pub fn select(mut self, names: &[String]) -> Result<Self> {
        if names.is_empty() {
            return Ok(self);
        }
        let known: HashSet<&str> = self.scenarios.iter().map(|s| s.name.as_str()).collect();
        if let Some(unknown) = names.iter().find(|n| !known.contains(n.as_str())) {
            return Err(Error::ConfigError(format!("no scenario named '{}'", unknown)));
        }
        self.scenarios.retain(|s| names.contains(&s.name));
        Ok(self)
    }

    /// Keep only scenarios carrying `tag`
    pub fn tagged(mut self, tag: &str) -> Self {
        self.scenarios.retain(|s| s.tags.iter().any(|t| t == tag));
        self
    }

    /// Check every scenario, and that names (and so artifact files) are unique
    pub fn validate(&self) -> Result<()> {
        self.runner.config().validate()?;
        let mut names = HashSet::new();
        for scenario in &self.scenarios {
            self.runner.config().validate_scenario(scenario)?;
            if !names.insert(scenario.name.as_str()) {
                return Err(Error::ConfigError(format!("duplicate scenario name '{}'", scenario.name)));
            }
        }
        Ok(())
    }

    /// Run every scenario, at most `jobs` at a time, each in a fresh context
    /// of type `E`. Individual failures are reported, not returned.
    pub async fn run<E: Engine + 'static>(&self) -> Result<SuiteReport> {
        self.validate()?;
        let start = Instant::now();
        let jobs = self.runner.config().jobs;
        info!("Running {} scenario(s), {} at a time", self.scenarios.len(), jobs);

        let semaphore = Arc::new(Semaphore::new(jobs));
        let tasks = self.scenarios.iter().map(|scenario| {
            let semaphore = Arc::clone(&semaphore);
            let runner = self.runner.clone();
            let scenario = scenario.clone();
            async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return ScenarioResult::crashed(&scenario.name),
                };
                let (tx, rx) = oneshot::channel();
                let name = scenario.name.clone();
                thread::spawn(move || {
                    let started = Instant::now();
                    let result = match runner.run::<E>(&scenario) {
                        Ok(report) => ScenarioResult::passed(report),
                        Err(err) => ScenarioResult::failed(err, started.elapsed().as_millis() as u64),
                    };
                    let _ = tx.send(result);
                });
                rx.await.unwrap_or_else(|_| ScenarioResult::crashed(&name))
            }
        });
        let results = futures::future::join_all(tasks).await;

        let passed = results.iter().filter(|r| r.success).count();
        let failed = results.len() - passed;
        for result in &results {
            if result.success {
                info!("✓ {} ({} ms)", result.name, result.duration_ms);
            } else {
                error!("✗ {}", result.error.as_deref().unwrap_or("unknown error"));
            }
        }
        let duration_ms = start.elapsed().as_millis() as u64;
        info!("Results: {} passed, {} failed ({} ms)", passed, failed, duration_ms);

        Ok(SuiteReport {
            total: results.len(),
            passed,
            failed,
            duration_ms,
            results,
        })
    }

    /// [`Suite::run`] on a private runtime
    pub fn run_blocking<E: Engine + 'static>(&self) -> Result<SuiteReport> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(Error::Io)?;
        runtime.block_on(self.run::<E>())
    }
}
