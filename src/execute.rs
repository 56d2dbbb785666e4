//! Execution adapter: policy-driven `autopkg run` plus report interpretation.
use crate::engine::{PostProcessor, RecipeEngine, RunRequest, RunStatus};
use crate::error::OrchestrationError;
use crate::policy::{PolicyLists, PolicyLookup};
use crate::recipe::Recipe;
use crate::report::{parse_report, Report};
use std::fs::OpenOptions;
use std::path::Path;

/// Post-processors configured for a recipe display name.
pub fn select_post_processors(policies: &PolicyLists, name: &str) -> Vec<PostProcessor> {
    let mut selected = Vec::new();
    match policies.cleanup_for(name) {
        PolicyLookup::Apply(policy) => selected.push(PostProcessor::Cleanup {
            keep_count: policy.keep_count,
        }),
        PolicyLookup::Skipped => {
            tracing::info!("Skipping cleanup for {name}, not in cleanup list");
        }
        PolicyLookup::NotConfigured => {}
    }
    match policies.promotion_for(name) {
        PolicyLookup::Apply(()) => selected.push(PostProcessor::Promote),
        PolicyLookup::Skipped => {
            tracing::info!("Skipping promotion for {name}, not in promote list");
        }
        PolicyLookup::NotConfigured => {}
    }
    selected
}

/// Create the report file, truncating anything left by a previous recipe.
pub fn prepare_report_file(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)?;
    Ok(())
}

/// Mark an untrusted recipe as failed without invoking the engine.
pub fn block_untrusted(recipe: &mut Recipe) {
    recipe.error = true;
    recipe.results = Report::default();
}

/// Run a recipe whose trust state permits execution.
///
/// Process failures only set `recipe.error`; whatever report exists is still
/// interpreted because a pipeline can fail after importing.
pub fn execute<E: RecipeEngine + ?Sized>(
    engine: &E,
    policies: &PolicyLists,
    report_path: &Path,
    recipe: &mut Recipe,
) -> Result<(), OrchestrationError> {
    if !recipe.trust.permits_execution() {
        block_untrusted(recipe);
        return Ok(());
    }

    prepare_report_file(report_path).map_err(|source| OrchestrationError::ReportFile {
        path: report_path.to_path_buf(),
        source,
    })?;

    let post_processors = select_post_processors(policies, recipe.name());
    let request = RunRequest {
        identifier: recipe.identifier(),
        report_path,
        post_processors: &post_processors,
    };
    if let RunStatus::Failed { detail } = engine.run(&request) {
        tracing::error!(recipe = recipe.name(), detail = %detail, "autopkg run failed");
        recipe.error = true;
    }
    recipe.has_run = true;

    recipe.results = match parse_report(report_path) {
        Ok(report) => {
            if report.is_empty() {
                tracing::debug!(recipe = recipe.name(), "report has no summary rows");
            }
            report
        }
        Err(err) => {
            tracing::warn!(
                recipe = recipe.name(),
                error = %format!("{err:#}"),
                "report could not be parsed"
            );
            recipe.error = true;
            Report::default()
        }
    };
    Ok(())
}
