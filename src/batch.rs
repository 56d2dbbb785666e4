//! Batch driver: resolve the run list, process recipes in order, dispatch
//! outcomes and collect failures.
use crate::config::RecipeSource;
use crate::engine::RecipeEngine;
use crate::notify::Notifier;
use crate::orchestrator::Orchestrator;
use crate::outcome::OutcomeRecord;
use crate::recipe::{Recipe, TrustState};
use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::path::Path;

const RECIPE_EXTENSION: &str = "recipe";

/// Expand the configured source into ordered run-list entries.
pub fn resolve_entries(source: &RecipeSource) -> Result<Vec<String>> {
    match source {
        RecipeSource::Override(entries) => Ok(entries
            .iter()
            .map(|entry| with_recipe_extension(entry))
            .collect()),
        RecipeSource::List(path) => read_run_list(path),
    }
}

fn with_recipe_extension(entry: &str) -> String {
    match Path::new(entry).extension() {
        Some(ext) if ext == RECIPE_EXTENSION => entry.to_string(),
        _ => format!("{entry}.{RECIPE_EXTENSION}"),
    }
}

fn read_run_list(path: &Path) -> Result<Vec<String>> {
    let ext = path
        .extension()
        .map(|ext| ext.to_string_lossy().into_owned())
        .unwrap_or_default();
    match ext.as_str() {
        "json" => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("read run list {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("parse run list {}", path.display()))
        }
        "plist" => plist::from_file(path)
            .with_context(|| format!("parse run list {}", path.display())),
        _ => Err(anyhow!(
            "Invalid run list extension \".{ext}\" (expected plist or json)"
        )),
    }
}

/// Build one recipe per entry; order and duplicates are kept.
pub fn build_recipes(entries: &[String], overrides_dir: Option<&Path>) -> Vec<Recipe> {
    entries
        .iter()
        .map(|entry| Recipe::new(entry, overrides_dir))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Untrusted,
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchFailure {
    pub recipe: String,
    pub kind: FailureKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct BatchSummary {
    pub outcomes: Vec<OutcomeRecord>,
    pub failures: Vec<BatchFailure>,
}

impl BatchSummary {
    pub fn aborted(&self) -> usize {
        self.failures
            .iter()
            .filter(|failure| failure.kind == FailureKind::Aborted)
            .count()
    }

    pub fn errored(&self) -> usize {
        self.outcomes.iter().filter(|outcome| outcome.errored).count()
    }

    /// 0 when clean, 2 when a recipe aborted. With `strict`, any failure-list
    /// entry or errored run is also 2.
    pub fn exit_code(&self, strict: bool) -> u8 {
        let strict_failure = !self.failures.is_empty() || self.errored() > 0;
        if self.aborted() > 0 || (strict && strict_failure) {
            2
        } else {
            0
        }
    }
}

pub struct BatchDriver<'a, E: RecipeEngine + ?Sized> {
    orchestrator: Orchestrator<'a, E>,
    notifier: Option<&'a dyn Notifier>,
    debug: bool,
    verify_trust: bool,
}

impl<'a, E: RecipeEngine + ?Sized> BatchDriver<'a, E> {
    pub fn new(
        orchestrator: Orchestrator<'a, E>,
        notifier: Option<&'a dyn Notifier>,
        debug: bool,
        verify_trust: bool,
    ) -> Self {
        Self {
            orchestrator,
            notifier,
            debug,
            verify_trust,
        }
    }

    /// Process every recipe to a terminal state, one at a time.
    pub fn run(&self, recipes: Vec<Recipe>) -> BatchSummary {
        let mut summary = BatchSummary::default();
        let total = recipes.len();
        for (index, mut recipe) in recipes.into_iter().enumerate() {
            tracing::info!(
                recipe = %recipe.path().display(),
                position = index + 1,
                total,
                "processing recipe"
            );
            if let Err(err) = self.orchestrator.process(&mut recipe) {
                tracing::error!(recipe = %recipe.label(), error = %err, "recipe aborted");
            }

            let outcome = OutcomeRecord::from_recipe(&recipe);
            self.dispatch(&outcome);
            if let Some(failure) = self.failure_for(&outcome) {
                summary.failures.push(failure);
            }
            summary.outcomes.push(outcome);
        }
        log_failures(&summary.failures);
        summary
    }

    fn dispatch(&self, outcome: &OutcomeRecord) {
        if self.debug {
            tracing::debug!("Skipping Teams notification - debug is enabled!");
            return;
        }
        let Some(notifier) = self.notifier else {
            tracing::info!("Skipping Teams notification - webhook url is missing!");
            return;
        };
        if let Err(err) = notifier.notify(outcome) {
            tracing::error!(
                recipe = %outcome.recipe_name,
                error = %format!("{err:#}"),
                "notification failed"
            );
        }
    }

    fn failure_for(&self, outcome: &OutcomeRecord) -> Option<BatchFailure> {
        let kind = if outcome.aborted() {
            FailureKind::Aborted
        } else if self.verify_trust && outcome.verified != TrustState::Verified {
            FailureKind::Untrusted
        } else {
            return None;
        };
        Some(BatchFailure {
            recipe: outcome.recipe_name.clone(),
            kind,
            message: outcome.failure_message.clone(),
        })
    }
}

fn log_failures(failures: &[BatchFailure]) {
    if failures.is_empty() {
        tracing::info!("all recipes passed verification");
        return;
    }
    tracing::warn!(count = failures.len(), "recipes needing attention");
    for failure in failures {
        tracing::warn!(
            recipe = %failure.recipe,
            kind = ?failure.kind,
            message = failure.message.as_deref().unwrap_or_default(),
            "batch failure"
        );
    }
}
