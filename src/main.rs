//! rfverify: run visual verification scenarios against a static page

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use log::LevelFilter;

use rfverify::cdp::CdpEngine;
use rfverify::scenario::Settings;
use rfverify::{showcase, Error, Runner, RunnerConfig, Scenario, Suite, SuiteFile};

#[derive(Parser)]
#[command(name = "rfverify", about = "Declarative visual verification for component pages")]
#[command(version, long_about = None)]
struct Cli {
    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run scenarios and write one screenshot per passing scenario
    Run {
        #[command(flatten)]
        source: Source,

        /// Directory artifacts are written to
        #[arg(long, short)]
        output_dir: Option<PathBuf>,

        /// Default poll timeout for locator steps, in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Delay between polls, in milliseconds
        #[arg(long)]
        poll_ms: Option<u64>,

        /// Scenarios to run at once
        #[arg(long, short)]
        jobs: Option<usize>,

        /// Write a JSON report here
        #[arg(long)]
        report: Option<PathBuf>,

        /// Show the browser window
        #[arg(long)]
        headful: bool,

        /// Disable Chrome's sandbox (needed in some containers)
        #[arg(long)]
        no_sandbox: bool,

        /// Chrome or Chromium executable
        #[arg(long)]
        chrome: Option<PathBuf>,
    },

    /// List the scenarios that would run
    List {
        #[command(flatten)]
        source: Source,
    },

    /// Validate scenarios without launching a browser
    Check {
        #[command(flatten)]
        source: Source,
    },
}

#[derive(Args)]
struct Source {
    /// Scenario files or directories of `*.yaml` files
    paths: Vec<PathBuf>,

    /// Include the built-in showcase scenarios
    #[arg(long)]
    builtin: bool,

    /// Showcase document the built-in scenarios load
    #[arg(long, default_value = showcase::DEFAULT_DOCUMENT)]
    document: String,

    /// Only run the named scenario (repeatable)
    #[arg(long = "scenario", short = 's')]
    names: Vec<String>,

    /// Only run scenarios with this tag
    #[arg(long)]
    tag: Option<String>,
}

impl Source {
    fn load(&self) -> Result<(Vec<Scenario>, Settings), Error> {
        if self.paths.is_empty() && !self.builtin {
            return Err(Error::ConfigError(
                "nothing to run: pass scenario files or --builtin".into(),
            ));
        }

        let mut scenarios = Vec::new();
        let mut settings = Settings::default();
        if self.builtin {
            scenarios.extend(showcase::scenarios(&self.document));
        }
        for path in &self.paths {
            let file = SuiteFile::load_path(path)?;
            settings.merge(file.settings);
            scenarios.extend(file.scenarios);
        }
        Ok((scenarios, settings))
    }

    fn suite(&self, runner: Runner, scenarios: Vec<Scenario>) -> Result<Suite, Error> {
        let mut suite = Suite::new(runner, scenarios).select(&self.names)?;
        if let Some(tag) = &self.tag {
            suite = suite.tagged(tag);
        }
        suite.validate()?;
        Ok(suite)
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => LevelFilter::Error,
        (false, 0) => LevelFilter::Info,
        (false, 1) => LevelFilter::Debug,
        (false, _) => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp_millis()
        .format_target(false)
        .init();
}

/// 2: usage or configuration problem, nothing ran
fn config_failure(err: Error) -> ExitCode {
    eprintln!("Error: {}", err);
    ExitCode::from(2)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Command::List { source } => {
            let suite = match source.load().and_then(|(s, _)| source.suite(Runner::default(), s)) {
                Ok(suite) => suite,
                Err(e) => return config_failure(e),
            };
            for scenario in suite.scenarios() {
                println!(
                    "{:<22} {:>3} steps  {:<10} {}",
                    scenario.name,
                    scenario.steps.len(),
                    scenario.viewport.to_string(),
                    scenario.description
                );
            }
            ExitCode::SUCCESS
        }

        Command::Check { source } => {
            match source.load().and_then(|(s, _)| source.suite(Runner::default(), s)) {
                Ok(suite) => {
                    println!("{} scenario(s) OK", suite.scenarios().len());
                    ExitCode::SUCCESS
                }
                Err(e) => config_failure(e),
            }
        }

        Command::Run {
            source,
            output_dir,
            timeout_ms,
            poll_ms,
            jobs,
            report,
            headful,
            no_sandbox,
            chrome,
        } => {
            let (scenarios, settings) = match source.load() {
                Ok(loaded) => loaded,
                Err(e) => return config_failure(e),
            };

            let mut config = RunnerConfig::default();
            config.apply(&settings);
            config.apply(&Settings {
                output_dir,
                timeout_ms,
                poll_interval_ms: poll_ms,
                jobs,
            });
            config.engine.headless = !headful;
            config.engine.sandbox = !no_sandbox;
            config.engine.browser_path = chrome;

            let suite = match source.suite(Runner::new(config), scenarios) {
                Ok(suite) => suite,
                Err(e) => return config_failure(e),
            };
            if suite.scenarios().is_empty() {
                return config_failure(Error::ConfigError("no scenarios match the filters".into()));
            }

            let result = match suite.run_blocking::<CdpEngine>() {
                Ok(result) => result,
                Err(e) => return config_failure(e),
            };

            if let Some(path) = report {
                if let Err(e) = result.write_json(&path) {
                    eprintln!("Error: failed to write report {}: {}", path.display(), e);
                    return ExitCode::FAILURE;
                }
            }

            for failed in result.results.iter().filter(|r| !r.success) {
                eprintln!("FAILED {}", failed.error.as_deref().unwrap_or(&failed.name));
            }
            println!("{} passed, {} failed", result.passed, result.failed);

            if result.success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
    }
}
