use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::path::Path;
use std::process::ExitCode;

mod batch;
mod classify;
mod cli;
mod config;
mod engine;
mod error;
mod execute;
mod logging;
mod notify;
mod orchestrator;
mod outcome;
mod policy;
mod recipe;
mod report;
mod trust;

use batch::{build_recipes, resolve_entries, BatchDriver};
use cli::RootArgs;
use config::{EnvSnapshot, RunnerConfig};
use engine::AutopkgCli;
use notify::{Notifier, TeamsNotifier};
use orchestrator::Orchestrator;
use policy::PolicyLists;

/// Exit code for configuration and input resolution errors.
const EXIT_CONFIG: u8 = 1;

fn main() -> ExitCode {
    let args = RootArgs::parse();
    let config = match RunnerConfig::resolve(args, EnvSnapshot::capture()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {err:#}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    if let Err(err) = logging::init_logging(&config.log_file, config.debug) {
        eprintln!("error: {err:#}");
        return ExitCode::from(EXIT_CONFIG);
    }

    match run(&config) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            tracing::error!("{err:#}");
            ExitCode::from(EXIT_CONFIG)
        }
    }
}

fn run(config: &RunnerConfig) -> Result<u8> {
    let entries = resolve_entries(&config.source)?;
    let policies = PolicyLists::load(
        config.cleanup_list.as_deref(),
        config.promote_list.as_deref(),
    )?;
    tracing::info!(
        recipes = entries.len(),
        verify_trust = config.verify_trust,
        debug = config.debug,
        autopkg = %config.autopkg.display(),
        "starting batch"
    );

    let engine = AutopkgCli::new(config.autopkg.clone(), config.debug);
    let notifier = config.teams_webhook.clone().map(|webhook| {
        TeamsNotifier::new(
            webhook,
            policies.cleanup_configured(),
            policies.promote_configured(),
        )
    });
    let orchestrator = Orchestrator::new(
        &engine,
        &policies,
        &config.report_path,
        config.verify_trust,
    );
    let driver = BatchDriver::new(
        orchestrator,
        notifier.as_ref().map(|notifier| notifier as &dyn Notifier),
        config.debug,
        config.verify_trust,
    );

    let summary = driver.run(build_recipes(&entries, config.overrides_dir.as_deref()));
    if let Some(out) = &config.out {
        write_json(out, &summary)
            .with_context(|| format!("write batch summary {}", out.display()))?;
    }

    let code = summary.exit_code(config.strict);
    tracing::info!(
        recipes = summary.outcomes.len(),
        failures = summary.failures.len(),
        exit_code = code,
        "batch complete"
    );
    Ok(code)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json)?;
    Ok(())
}
