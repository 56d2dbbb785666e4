//! Trust gate: verify a recipe's trust info, and repair it for the next run.
use crate::engine::{RecipeEngine, TrustCheck};
use crate::error::OrchestrationError;
use crate::recipe::{Recipe, TrustState};

pub fn verify<E: RecipeEngine + ?Sized>(engine: &E, recipe: &mut Recipe) -> TrustState {
    match engine.verify_trust(recipe.identifier()) {
        TrustCheck::Trusted => {
            recipe.trust = TrustState::Verified;
        }
        TrustCheck::Untrusted { diagnostic } => {
            tracing::warn!(
                recipe = recipe.name(),
                identifier = recipe.identifier(),
                "trust verification failed"
            );
            recipe.trust = TrustState::Failed;
            recipe.trust_diagnostic = Some(diagnostic);
        }
    }
    recipe.trust
}

/// Update trust info after a failed verification.
///
/// Does not re-verify and leaves `recipe.trust` untouched: a repaired recipe
/// runs on the next batch, not this one.
pub fn repair<E: RecipeEngine + ?Sized>(
    engine: &E,
    recipe: &Recipe,
) -> Result<(), OrchestrationError> {
    engine.update_trust(recipe.identifier()).map_err(|err| {
        tracing::error!(
            recipe = recipe.name(),
            identifier = recipe.identifier(),
            error = %format!("{err:#}"),
            "trust repair failed"
        );
        OrchestrationError::TrustRepair {
            identifier: recipe.identifier().to_string(),
            detail: format!("{err:#}"),
        }
    })?;
    tracing::info!(
        recipe = recipe.name(),
        "trust info updated; recipe will run on the next batch"
    );
    Ok(())
}
