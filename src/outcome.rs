//! Immutable per-recipe summary handed to notifications and the batch report.
use crate::classify::removed_count;
use crate::orchestrator::RecipeStage;
use crate::recipe::{Recipe, TrustState};
use crate::report::field_text;
use serde::Serialize;

const UNKNOWN_ERROR: &str = "Unknown error";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutcomeRecord {
    pub recipe_name: String,
    pub identifier: String,
    pub verified: TrustState,
    pub errored: bool,
    /// Whether the engine's run command was invoked.
    pub ran: bool,
    pub stage: RecipeStage,
    pub updated: bool,
    pub removed: bool,
    pub promoted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removed_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promoted_versions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub import: Option<ImportDetails>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removal: Option<RemovalDetails>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promotion: Option<PromotionDetails>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportDetails {
    pub name: Option<String>,
    pub intune_app_id: Option<String>,
    pub content_version_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RemovalDetails {
    pub removed_count: Option<String>,
    pub removed_versions: Option<String>,
    pub keep_count: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PromotionDetails {
    pub promotions: Option<String>,
    pub blacklisted_versions: Option<String>,
}

impl OutcomeRecord {
    pub fn from_recipe(recipe: &Recipe) -> Self {
        let results = &recipe.results;
        let import = results
            .imported
            .first()
            .filter(|_| recipe.updated)
            .map(|row| ImportDetails {
                name: field_text(row, "name"),
                intune_app_id: field_text(row, "intune_app_id"),
                content_version_id: field_text(row, "content_version_id"),
            });
        let removal = results
            .removed
            .first()
            .filter(|_| recipe.removed)
            .map(|row| RemovalDetails {
                removed_count: field_text(row, "removed count"),
                removed_versions: field_text(row, "removed versions"),
                keep_count: field_text(row, "keep count"),
            });
        let promotion = results
            .promoted
            .first()
            .filter(|_| recipe.promoted)
            .map(|row| PromotionDetails {
                promotions: field_text(row, "promotions"),
                blacklisted_versions: field_text(row, "blacklisted versions"),
            });

        Self {
            recipe_name: recipe.label(),
            identifier: recipe.identifier().to_string(),
            verified: recipe.trust,
            errored: recipe.error || recipe.stage == RecipeStage::Aborted,
            ran: recipe.has_run,
            stage: recipe.stage,
            updated: recipe.updated,
            removed: recipe.removed,
            promoted: recipe.promoted,
            updated_version: recipe.updated_version().filter(|_| recipe.updated),
            removed_count: removed_count(results).filter(|_| recipe.removed),
            promoted_versions: promotion
                .as_ref()
                .and_then(|details| details.promotions.clone()),
            failure_message: failure_message(recipe),
            import,
            removal,
            promotion,
        }
    }

    pub fn trust_failed(&self) -> bool {
        self.verified == TrustState::Failed
    }

    pub fn aborted(&self) -> bool {
        self.stage == RecipeStage::Aborted
    }
}

fn failure_message(recipe: &Recipe) -> Option<String> {
    if let Some(reason) = &recipe.abort_reason {
        return Some(reason.clone());
    }
    if recipe.trust == TrustState::Failed {
        return Some(
            recipe
                .trust_diagnostic
                .as_deref()
                .map(str::trim)
                .filter(|text| !text.is_empty())
                .unwrap_or("trust verification failed")
                .to_string(),
        );
    }
    if recipe.error {
        return Some(
            recipe
                .results
                .failed
                .first()
                .and_then(|row| field_text(row, "message"))
                .unwrap_or_else(|| UNKNOWN_ERROR.to_string()),
        );
    }
    None
}
