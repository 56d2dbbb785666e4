//! Per-recipe state machine.
//!
//! `Init -> TrustChecked -> (Repaired) -> Executed -> Classified`, or
//! `Aborted` when the definition, the report file or a trust repair fails.
//! A recipe that fails verification is repaired but never executed in the
//! same pass.
use crate::classify::classify;
use crate::engine::RecipeEngine;
use crate::error::OrchestrationError;
use crate::execute::{block_untrusted, execute};
use crate::policy::PolicyLists;
use crate::recipe::{Recipe, TrustState};
use crate::trust;
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipeStage {
    Init,
    TrustChecked,
    Repaired,
    Executed,
    Classified,
    Aborted,
}

pub struct Orchestrator<'a, E: RecipeEngine + ?Sized> {
    engine: &'a E,
    policies: &'a PolicyLists,
    report_path: &'a Path,
    verify_trust: bool,
}

impl<'a, E: RecipeEngine + ?Sized> Orchestrator<'a, E> {
    pub fn new(
        engine: &'a E,
        policies: &'a PolicyLists,
        report_path: &'a Path,
        verify_trust: bool,
    ) -> Self {
        Self {
            engine,
            policies,
            report_path,
            verify_trust,
        }
    }

    /// Drive one recipe to `Classified`, or mark it `Aborted` and return why.
    pub fn process(&self, recipe: &mut Recipe) -> Result<(), OrchestrationError> {
        let result = self.advance(recipe);
        if let Err(err) = &result {
            recipe.stage = RecipeStage::Aborted;
            recipe.abort_reason = Some(err.to_string());
        }
        result
    }

    fn advance(&self, recipe: &mut Recipe) -> Result<(), OrchestrationError> {
        recipe.load_definition()?;

        if self.verify_trust {
            trust::verify(self.engine, recipe);
        }
        recipe.stage = RecipeStage::TrustChecked;

        if recipe.trust == TrustState::Failed {
            trust::repair(self.engine, recipe)?;
            recipe.stage = RecipeStage::Repaired;
            block_untrusted(recipe);
        } else {
            execute(self.engine, self.policies, self.report_path, recipe)?;
            recipe.stage = RecipeStage::Executed;
        }

        classify(recipe);
        recipe.stage = RecipeStage::Classified;
        Ok(())
    }
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
