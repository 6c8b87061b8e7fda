//! Scenario execution
//!
//! The runner owns one browsing context per scenario. It loads the
//! document, executes steps strictly in order, polls assertions until they
//! hold or time out, and writes the artifact only after the last step
//! passes. The context is closed on every exit path, including panics.

use std::fmt;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::dom::ActionTarget;
use crate::scenario::{Action, Scenario, Settings, Step};
use crate::{Engine, EngineConfig, Error, Locator, Result, RunError};

/// Lifecycle of a single scenario run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Loading,
    /// Executing the given step (1-based)
    Executing(usize),
    Capturing,
    Captured,
    Failed,
    Released,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Idle => f.write_str("idle"),
            Phase::Loading => f.write_str("loading"),
            Phase::Executing(i) => write!(f, "executing step {}", i),
            Phase::Capturing => f.write_str("capturing"),
            Phase::Captured => f.write_str("captured"),
            Phase::Failed => f.write_str("failed"),
            Phase::Released => f.write_str("released"),
        }
    }
}

/// Runner configuration
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Directory artifacts are written to
    pub output_dir: PathBuf,
    /// Default poll timeout for locator steps
    pub timeout_ms: u64,
    /// Delay between polls
    pub poll_interval_ms: u64,
    /// Scenarios a suite runs at once
    pub jobs: usize,
    /// Browser settings; the viewport is replaced by each scenario's own
    pub engine: EngineConfig,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("verification"),
            timeout_ms: 5000,
            poll_interval_ms: 100,
            jobs: num_cpus::get().max(1),
            engine: EngineConfig::default(),
        }
    }
}

impl RunnerConfig {
    /// Take every value the settings specify
    pub fn apply(&mut self, settings: &Settings) {
        if let Some(dir) = &settings.output_dir {
            self.output_dir = dir.clone();
        }
        if let Some(ms) = settings.timeout_ms {
            self.timeout_ms = ms;
        }
        if let Some(ms) = settings.poll_interval_ms {
            self.poll_interval_ms = ms;
        }
        if let Some(jobs) = settings.jobs {
            self.jobs = jobs;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.timeout_ms == 0 {
            return Err(Error::ConfigError("timeout must be positive".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(Error::ConfigError("poll interval must be positive".into()));
        }
        if self.jobs == 0 {
            return Err(Error::ConfigError("jobs must be at least 1".into()));
        }
        Ok(())
    }

    /// Check `scenario` on its own and against these settings. A `wait` must
    /// end before the browser's idle timeout shuts it down.
    pub fn validate_scenario(&self, scenario: &Scenario) -> Result<()> {
        scenario.validate()?;
        let idle = self.engine.idle_timeout_ms;
        for (i, step) in scenario.steps.iter().enumerate() {
            if let Step::Wait { ms } = step {
                if *ms >= idle {
                    return Err(Error::ConfigError(format!(
                        "scenario '{}' step {}: wait of {}ms reaches the browser idle timeout of {}ms",
                        scenario.name,
                        i + 1,
                        ms,
                        idle
                    )));
                }
            }
        }
        Ok(())
    }
}

/// A screenshot written by a successful scenario
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    pub scenario: String,
    pub path: PathBuf,
    /// Hex SHA-256 of the PNG bytes
    pub sha256: String,
    pub bytes: usize,
}

/// Outcome of a successful scenario
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub name: String,
    pub artifact: Artifact,
    pub phases: Vec<Phase>,
    pub duration_ms: u64,
}

/// Holds the browsing context and closes it when dropped
struct ContextGuard<E: Engine> {
    engine: Option<E>,
    scenario: String,
}

impl<E: Engine> ContextGuard<E> {
    fn new(engine: E, scenario: &str) -> Self {
        Self {
            engine: Some(engine),
            scenario: scenario.to_string(),
        }
    }

    fn engine(&mut self) -> Result<&mut E> {
        self.engine
            .as_mut()
            .ok_or_else(|| Error::InitializationError("browsing context already released".into()))
    }

    fn release(mut self) -> Result<()> {
        match self.engine.take() {
            Some(engine) => engine.close(),
            None => Ok(()),
        }
    }
}

impl<E: Engine> Drop for ContextGuard<E> {
    fn drop(&mut self) {
        if let Some(engine) = self.engine.take() {
            if let Err(e) = engine.close() {
                warn!("[{}] failed to release browsing context: {}", self.scenario, e);
            }
        }
    }
}

/// Failure inside a run, before it is attributed to the scenario
struct Failure {
    step_index: Option<usize>,
    step: Option<String>,
    locator: Option<String>,
    source: Error,
}

impl From<Error> for Failure {
    fn from(source: Error) -> Self {
        Failure {
            step_index: None,
            step: None,
            locator: None,
            source,
        }
    }
}

/// Outcome of one poll
enum Probe<T, S> {
    Done(T),
    Pending(S),
}

/// Executes scenarios against a browser backend
#[derive(Debug, Clone, Default)]
pub struct Runner {
    config: RunnerConfig,
}

impl Runner {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Launch a fresh context of type `E` and run `scenario` in it
    pub fn run<E: Engine>(&self, scenario: &Scenario) -> std::result::Result<ScenarioReport, RunError> {
        let started = Instant::now();
        let mut phases = vec![Phase::Idle];

        if let Err(source) = self.prepare(scenario) {
            return Err(self.fail(scenario, Failure::from(source), phases));
        }

        phases.push(Phase::Loading);
        let mut engine_config = self.config.engine.clone();
        engine_config.viewport = scenario.viewport;
        match E::new(engine_config) {
            Ok(engine) => self.execute(engine, scenario, phases, started),
            Err(source) => Err(self.fail(scenario, Failure::from(source), phases)),
        }
    }

    /// Run `scenario` in an already created context. The context is closed
    /// before this returns, whatever the outcome.
    pub fn run_with<E: Engine>(&self, engine: E, scenario: &Scenario) -> std::result::Result<ScenarioReport, RunError> {
        let started = Instant::now();
        let phases = vec![Phase::Idle];
        let guard = ContextGuard::new(engine, &scenario.name);
        if let Err(source) = self.prepare(scenario) {
            drop(guard);
            return Err(self.fail(scenario, Failure::from(source), phases));
        }
        self.execute_guarded(guard, scenario, phases, started)
    }

    /// Validate and clear any artifact left by an earlier run
    fn prepare(&self, scenario: &Scenario) -> Result<()> {
        self.config.validate()?;
        self.config.validate_scenario(scenario)?;
        let stale = self.artifact_path(scenario);
        match std::fs::remove_file(&stale) {
            Ok(()) => debug!("[{}] removed stale artifact {}", scenario.name, stale.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    fn execute<E: Engine>(
        &self,
        engine: E,
        scenario: &Scenario,
        phases: Vec<Phase>,
        started: Instant,
    ) -> std::result::Result<ScenarioReport, RunError> {
        self.execute_guarded(ContextGuard::new(engine, &scenario.name), scenario, phases, started)
    }

    fn execute_guarded<E: Engine>(
        &self,
        mut guard: ContextGuard<E>,
        scenario: &Scenario,
        mut phases: Vec<Phase>,
        started: Instant,
    ) -> std::result::Result<ScenarioReport, RunError> {
        info!("[{}] starting ({} steps, viewport {})", scenario.name, scenario.steps.len(), scenario.viewport);
        let outcome = self.drive(&mut guard, scenario, &mut phases);
        let released = guard.release();

        match outcome {
            Ok(artifact) => {
                if let Err(e) = released {
                    warn!("[{}] failed to release browsing context: {}", scenario.name, e);
                }
                phases.push(Phase::Released);
                let duration_ms = started.elapsed().as_millis() as u64;
                info!(
                    "[{}] passed in {}ms, wrote {}",
                    scenario.name,
                    duration_ms,
                    artifact.path.display()
                );
                Ok(ScenarioReport {
                    name: scenario.name.clone(),
                    artifact,
                    phases,
                    duration_ms,
                })
            }
            Err(failure) => {
                if let Err(e) = released {
                    warn!("[{}] failed to release browsing context: {}", scenario.name, e);
                }
                Err(self.fail(scenario, failure, phases))
            }
        }
    }

    fn fail(&self, scenario: &Scenario, failure: Failure, mut phases: Vec<Phase>) -> RunError {
        phases.push(Phase::Failed);
        phases.push(Phase::Released);
        let err = RunError {
            scenario: scenario.name.clone(),
            step_index: failure.step_index,
            step: failure.step,
            locator: failure.locator,
            source: failure.source,
            phases,
        };
        debug!("{}", err);
        err
    }

    fn drive<E: Engine>(
        &self,
        guard: &mut ContextGuard<E>,
        scenario: &Scenario,
        phases: &mut Vec<Phase>,
    ) -> std::result::Result<Artifact, Failure> {
        if phases.last() != Some(&Phase::Loading) {
            phases.push(Phase::Loading);
        }
        let engine = guard.engine()?;
        let url = scenario.document.resolve(&scenario.base_dir())?;
        debug!("[{}] loading {}", scenario.name, url);
        engine.set_viewport(scenario.viewport)?;
        engine.load_url(url.as_str())?;

        for (i, step) in scenario.steps.iter().enumerate() {
            let index = i + 1;
            phases.push(Phase::Executing(index));
            debug!("[{}] step {}: {}", scenario.name, index, step.label());
            self.step(engine, scenario, step).map_err(|source| Failure {
                step_index: Some(index),
                step: Some(step.label()),
                locator: step.target().map(Locator::to_string),
                source,
            })?;
        }

        phases.push(Phase::Capturing);
        let png = engine.render_png(scenario.full_page)?;
        if png.is_empty() {
            return Err(Error::RenderError("backend returned an empty image".into()).into());
        }
        let artifact = self.write_artifact(scenario, &png)?;
        phases.push(Phase::Captured);
        Ok(artifact)
    }

    fn step<E: Engine>(&self, engine: &mut E, scenario: &Scenario, step: &Step) -> Result<()> {
        let timeout_ms = step.timeout_ms().unwrap_or(self.config.timeout_ms);
        match step {
            Step::Navigate { url } => {
                let target = url.as_ref().unwrap_or(&scenario.document);
                let url = target.resolve(&scenario.base_dir())?;
                engine.load_url(url.as_str())
            }
            Step::SetViewport { width, height } => engine.set_viewport(crate::Viewport {
                width: *width,
                height: *height,
            }),
            Step::Locate { target, .. } => {
                match self.poll(timeout_ms, || {
                    let state = engine.query(target)?;
                    Ok(if state.count > 0 { Probe::Done(()) } else { Probe::Pending(()) })
                })? {
                    Probe::Done(()) => Ok(()),
                    Probe::Pending(()) => Err(not_found(target, timeout_ms)),
                }
            }
            Step::Act { action, target, .. } => {
                let check_enabled = *action == Action::Click;
                let point = self.poll(timeout_ms, || {
                    Ok(match engine.action_target(target, check_enabled)? {
                        ActionTarget::Ready { x, y } => Probe::Done((x, y)),
                        other => Probe::Pending(other),
                    })
                })?;
                match point {
                    Probe::Done((x, y)) => match action {
                        Action::Click => engine.click_at(x, y),
                        Action::Hover => engine.hover_at(x, y),
                    },
                    Probe::Pending(ActionTarget::NotFound) => Err(not_found(target, timeout_ms)),
                    Probe::Pending(state) => Err(Error::InteractionError(format!(
                        "cannot {} {}: {} after {}ms",
                        action,
                        target,
                        describe_target(&state),
                        timeout_ms
                    ))),
                }
            }
            Step::AssertVisible { target, .. } => {
                match self.poll(timeout_ms, || {
                    let state = engine.query(target)?;
                    Ok(if state.count > 0 && state.visible {
                        Probe::Done(())
                    } else {
                        Probe::Pending(state)
                    })
                })? {
                    Probe::Done(()) => Ok(()),
                    Probe::Pending(state) if state.count == 0 => Err(not_found(target, timeout_ms)),
                    Probe::Pending(_) => Err(Error::AssertionTimeout {
                        detail: format!("{} is not visible", target),
                        timeout_ms,
                    }),
                }
            }
            Step::AssertNotVisible { target, .. } => {
                match self.poll(timeout_ms, || {
                    let state = engine.query(target)?;
                    Ok(if state.count == 0 || !state.visible {
                        Probe::Done(())
                    } else {
                        Probe::Pending(())
                    })
                })? {
                    Probe::Done(()) => Ok(()),
                    Probe::Pending(()) => Err(Error::AssertionTimeout {
                        detail: format!("{} is still visible", target),
                        timeout_ms,
                    }),
                }
            }
            Step::AssertCss {
                target,
                property,
                expected,
                ..
            } => {
                match self.poll(timeout_ms, || {
                    let value = engine.computed_style(target, property)?;
                    Ok(match value {
                        Some(v) if v.trim() == expected.trim() => Probe::Done(()),
                        other => Probe::Pending(other),
                    })
                })? {
                    Probe::Done(()) => Ok(()),
                    Probe::Pending(None) => Err(not_found(target, timeout_ms)),
                    Probe::Pending(Some(actual)) => Err(Error::AssertionTimeout {
                        detail: format!("{} has {}: {:?}, expected {:?}", target, property, actual, expected),
                        timeout_ms,
                    }),
                }
            }
            Step::Wait { ms } => {
                thread::sleep(Duration::from_millis(*ms));
                Ok(())
            }
        }
    }

    /// Call `check` until it reports `Done` or `timeout_ms` elapses. The last
    /// pending state is returned on timeout. Engine errors end the poll.
    fn poll<T, S>(&self, timeout_ms: u64, mut check: impl FnMut() -> Result<Probe<T, S>>) -> Result<Probe<T, S>> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        let interval = Duration::from_millis(self.config.poll_interval_ms);
        loop {
            let state = check()?;
            if let Probe::Done(_) = state {
                return Ok(state);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(state);
            }
            thread::sleep(interval.min(deadline - now));
        }
    }

    fn artifact_path(&self, scenario: &Scenario) -> PathBuf {
        self.config.output_dir.join(scenario.artifact_file())
    }

    /// Write through a temporary file so a partial artifact is never visible
    fn write_artifact(&self, scenario: &Scenario, png: &[u8]) -> Result<Artifact> {
        std::fs::create_dir_all(&self.config.output_dir)?;
        let path = self.artifact_path(scenario);
        let tmp = temp_path(&path);
        if let Err(e) = std::fs::write(&tmp, png).and_then(|_| std::fs::rename(&tmp, &path)) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(Artifact {
            scenario: scenario.name.clone(),
            path,
            sha256: hex::encode(Sha256::digest(png)),
            bytes: png.len(),
        })
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.tmp", name))
}

fn not_found(target: &Locator, timeout_ms: u64) -> Error {
    Error::LocatorNotFound {
        locator: target.to_string(),
        timeout_ms,
    }
}

fn describe_target(state: &ActionTarget) -> String {
    match state {
        ActionTarget::NotFound => "no element matches".to_string(),
        ActionTarget::Hidden => "element is not visible".to_string(),
        ActionTarget::Disabled => "element is disabled".to_string(),
        ActionTarget::Covered { by } => format!("element is covered by {}", by),
        ActionTarget::Ready { .. } => "element is ready".to_string(),
    }
}
