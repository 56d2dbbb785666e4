//! Cleanup and promotion lists, keyed by recipe display name.
//!
//! Matching is exact and case-sensitive.
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum KeepCount {
    Number(u64),
    Text(String),
}

impl KeepCount {
    /// Value for `keep_version_count`, or `None` when the engine default applies.
    pub fn effective(&self) -> Option<String> {
        match self {
            KeepCount::Number(0) => None,
            KeepCount::Number(count) => Some(count.to_string()),
            KeepCount::Text(text) => {
                let text = text.trim();
                (!text.is_empty()).then(|| text.to_string())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CleanupEntry {
    pub name: String,
    #[serde(default)]
    pub keep_count: Option<KeepCount>,
}

/// Result of looking a recipe up in one policy list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyLookup<T> {
    /// No list was supplied for this policy.
    NotConfigured,
    /// A list was supplied but does not name the recipe.
    Skipped,
    Apply(T),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupPolicy {
    pub keep_count: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PolicyLists {
    cleanup: Option<Vec<CleanupEntry>>,
    promote: Option<Vec<String>>,
}

impl PolicyLists {
    #[cfg(test)]
    pub fn new(cleanup: Option<Vec<CleanupEntry>>, promote: Option<Vec<String>>) -> Self {
        Self { cleanup, promote }
    }

    pub fn load(cleanup_path: Option<&Path>, promote_path: Option<&Path>) -> Result<Self> {
        let cleanup = cleanup_path
            .map(|path| read_json_list(path, "cleanup"))
            .transpose()?;
        let promote = promote_path
            .map(|path| read_json_list(path, "promote"))
            .transpose()?;
        Ok(Self { cleanup, promote })
    }

    pub fn cleanup_configured(&self) -> bool {
        self.cleanup.is_some()
    }

    pub fn promote_configured(&self) -> bool {
        self.promote.is_some()
    }

    pub fn cleanup_for(&self, name: &str) -> PolicyLookup<CleanupPolicy> {
        let Some(entries) = &self.cleanup else {
            return PolicyLookup::NotConfigured;
        };
        match entries.iter().find(|entry| entry.name == name) {
            Some(entry) => PolicyLookup::Apply(CleanupPolicy {
                keep_count: entry.keep_count.as_ref().and_then(KeepCount::effective),
            }),
            None => PolicyLookup::Skipped,
        }
    }

    pub fn promotion_for(&self, name: &str) -> PolicyLookup<()> {
        let Some(names) = &self.promote else {
            return PolicyLookup::NotConfigured;
        };
        if names.iter().any(|candidate| candidate == name) {
            PolicyLookup::Apply(())
        } else {
            PolicyLookup::Skipped
        }
    }
}

fn read_json_list<T: serde::de::DeserializeOwned>(path: &Path, label: &str) -> Result<Vec<T>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("read {label} list {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("parse {label} list {}", path.display()))
}
