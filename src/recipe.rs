//! A single batch entry and its mutable execution state.
use crate::error::OrchestrationError;
use crate::orchestrator::RecipeStage;
use crate::report::Report;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Display name used when a definition has no `Input.NAME`.
pub const DEFAULT_RECIPE_NAME: &str = "Recipe";

/// Outcome of the trust gate for one recipe.
///
/// `Unchecked` is what a recipe keeps when verification is disabled; it
/// permits execution exactly like `Verified`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustState {
    #[default]
    Unchecked,
    Verified,
    Failed,
}

impl TrustState {
    pub fn permits_execution(self) -> bool {
        !matches!(self, TrustState::Failed)
    }
}

/// Fields read from a recipe override plist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipeDefinition {
    pub name: String,
    pub identifier: String,
}

#[derive(Deserialize)]
struct RawDefinition {
    #[serde(rename = "Identifier", default)]
    identifier: Option<String>,
    #[serde(rename = "Input", default)]
    input: Option<RawInput>,
}

#[derive(Deserialize)]
struct RawInput {
    #[serde(rename = "NAME", default)]
    name: Option<String>,
}

impl RecipeDefinition {
    pub fn load(path: &Path) -> Result<Self, OrchestrationError> {
        let raw: RawDefinition =
            plist::from_file(path).map_err(|source| OrchestrationError::Definition {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self {
            name: raw
                .input
                .and_then(|input| input.name)
                .unwrap_or_else(|| DEFAULT_RECIPE_NAME.to_string()),
            identifier: raw.identifier.unwrap_or_default(),
        })
    }
}

#[derive(Debug)]
pub struct Recipe {
    path: PathBuf,
    definition: Option<RecipeDefinition>,
    pub trust: TrustState,
    /// Diagnostic output captured from a failed trust verification.
    pub trust_diagnostic: Option<String>,
    pub error: bool,
    pub has_run: bool,
    pub results: Report,
    pub updated: bool,
    pub removed: bool,
    pub promoted: bool,
    pub stage: RecipeStage,
    pub abort_reason: Option<String>,
}

impl Recipe {
    /// Build a recipe for a run-list entry. No I/O happens here.
    pub fn new(entry: &str, overrides_dir: Option<&Path>) -> Self {
        let path = match overrides_dir {
            Some(dir) => dir.join(entry),
            None => PathBuf::from(entry),
        };
        Self {
            path,
            definition: None,
            trust: TrustState::Unchecked,
            trust_diagnostic: None,
            error: false,
            has_run: false,
            results: Report::default(),
            updated: false,
            removed: false,
            promoted: false,
            stage: RecipeStage::Init,
            abort_reason: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the definition file once; later calls reuse the cached values.
    pub fn load_definition(&mut self) -> Result<&RecipeDefinition, OrchestrationError> {
        let definition = match self.definition.take() {
            Some(cached) => cached,
            None => RecipeDefinition::load(&self.path)?,
        };
        Ok(self.definition.insert(definition))
    }

    pub fn is_loaded(&self) -> bool {
        self.definition.is_some()
    }

    pub fn name(&self) -> &str {
        self.definition
            .as_ref()
            .map(|definition| definition.name.as_str())
            .unwrap_or(DEFAULT_RECIPE_NAME)
    }

    pub fn identifier(&self) -> &str {
        self.definition
            .as_ref()
            .map(|definition| definition.identifier.as_str())
            .unwrap_or_default()
    }

    /// Normalized version of the first imported row, if any.
    pub fn updated_version(&self) -> Option<String> {
        crate::classify::updated_version(&self.results)
    }

    /// Label for log lines: the display name once loaded, else the file path.
    pub fn label(&self) -> String {
        if self.is_loaded() {
            self.name().to_string()
        } else {
            self.path.display().to_string()
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::write_definition;
    use super::*;

    #[test]
    fn definition_supplies_name_and_identifier() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_definition(
            dir.path(),
            "Firefox.recipe",
            Some("Firefox"),
            Some("local.intune.Firefox"),
        );
        let mut recipe = Recipe::new("Firefox.recipe", Some(dir.path()));
        assert!(!recipe.is_loaded());

        let definition = recipe.load_definition().expect("load").clone();
        assert_eq!(definition.name, "Firefox");
        assert_eq!(definition.identifier, "local.intune.Firefox");
        assert_eq!(recipe.name(), "Firefox");
        assert_eq!(recipe.identifier(), "local.intune.Firefox");
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_definition(dir.path(), "Bare.recipe", None, None);
        let mut recipe = Recipe::new("Bare.recipe", Some(dir.path()));
        recipe.load_definition().expect("load");
        assert_eq!(recipe.name(), DEFAULT_RECIPE_NAME);
        assert_eq!(recipe.identifier(), "");
    }

    #[test]
    fn definition_is_read_only_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_definition(dir.path(), "Once.recipe", Some("Once"), Some("id.once"));
        let mut recipe = Recipe::new("Once.recipe", Some(dir.path()));
        recipe.load_definition().expect("first load");

        std::fs::remove_file(&path).expect("remove definition");
        let definition = recipe.load_definition().expect("cached load");
        assert_eq!(definition.name, "Once");
    }

    #[test]
    fn missing_definition_is_reported_with_its_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut recipe = Recipe::new("Missing.recipe", Some(dir.path()));
        let err = recipe.load_definition().unwrap_err();
        assert!(err.to_string().contains("Missing.recipe"));
        assert_eq!(recipe.label(), dir.path().join("Missing.recipe").display().to_string());
    }

    #[test]
    fn entries_without_overrides_dir_are_used_as_given() {
        let recipe = Recipe::new("relative/Thing.recipe", None);
        assert_eq!(recipe.path(), Path::new("relative/Thing.recipe"));
    }

    #[test]
    fn only_failed_trust_blocks_execution() {
        assert!(TrustState::Unchecked.permits_execution());
        assert!(TrustState::Verified.permits_execution());
        assert!(!TrustState::Failed.permits_execution());
    }
}
