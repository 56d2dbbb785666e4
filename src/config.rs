//! Run configuration assembled once at start-up.
//!
//! Flags win over environment variables; nothing below `main` reads the
//! process environment again.
use crate::cli::{RootArgs, DEFAULT_AUTOPKG_PATH};
use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};

/// Where the batch gets its recipe entries from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecipeSource {
    /// Explicit entries from the `RECIPE` variable.
    Override(Vec<String>),
    /// A JSON or plist run list on disk.
    List(PathBuf),
}

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub debug: bool,
    pub verify_trust: bool,
    pub source: RecipeSource,
    pub overrides_dir: Option<PathBuf>,
    pub cleanup_list: Option<PathBuf>,
    pub promote_list: Option<PathBuf>,
    pub autopkg: PathBuf,
    pub report_path: PathBuf,
    pub log_file: PathBuf,
    pub teams_webhook: Option<String>,
    pub out: Option<PathBuf>,
    pub strict: bool,
}

/// Snapshot of the environment variables the runner understands.
#[derive(Debug, Clone, Default)]
pub struct EnvSnapshot {
    pub debug: Option<String>,
    pub overrides_dir: Option<String>,
    pub recipe: Option<String>,
    pub teams_webhook: Option<String>,
}

impl EnvSnapshot {
    pub fn capture() -> Self {
        Self {
            debug: non_empty_var("DEBUG"),
            overrides_dir: non_empty_var("OVERRIDES_DIR"),
            recipe: non_empty_var("RECIPE"),
            teams_webhook: non_empty_var("TEAMS_WEBHOOK"),
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

impl RunnerConfig {
    pub fn resolve(args: RootArgs, env: EnvSnapshot) -> Result<Self> {
        let debug = args.debug || env.debug.as_deref().is_some_and(is_truthy);

        let source = match (env.recipe.as_deref(), args.list) {
            (Some(raw), _) => RecipeSource::Override(split_recipe_override(raw)),
            (None, Some(list)) => RecipeSource::List(list),
            (None, None) => return Err(anyhow!("recipe --list or RECIPE not provided")),
        };
        if let RecipeSource::Override(entries) = &source {
            if entries.is_empty() {
                return Err(anyhow!("RECIPE is set but names no recipes"));
            }
        }

        let overrides_dir = args
            .overrides_dir
            .or_else(|| env.overrides_dir.map(PathBuf::from));

        Ok(Self {
            debug,
            verify_trust: !args.disable_verification,
            source,
            overrides_dir,
            cleanup_list: args.cleanup_list,
            promote_list: args.promote_list,
            autopkg: resolve_autopkg(&args.autopkg),
            report_path: args.report_path,
            log_file: args.log_file,
            teams_webhook: env.teams_webhook,
            out: args.out,
            strict: args.strict,
        })
    }
}

fn is_truthy(raw: &str) -> bool {
    let value = raw.trim();
    !(value.is_empty() || value == "0" || value.eq_ignore_ascii_case("false"))
}

/// Split `RECIPE` on commas, dropping blanks.
pub fn split_recipe_override(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}

/// Keep explicit paths as given; fall back to `PATH` only for the stock location.
fn resolve_autopkg(requested: &Path) -> PathBuf {
    if requested.exists() || requested != Path::new(DEFAULT_AUTOPKG_PATH) {
        return requested.to_path_buf();
    }
    match which::which("autopkg") {
        Ok(found) => found,
        Err(_) => requested.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn args(argv: &[&str]) -> RootArgs {
        let mut full = vec!["autopkg-runner"];
        full.extend_from_slice(argv);
        RootArgs::try_parse_from(full).expect("parse args")
    }

    #[test]
    fn recipe_override_takes_precedence_over_list() {
        let env = EnvSnapshot {
            recipe: Some("Firefox, GoogleChrome.recipe".to_string()),
            ..EnvSnapshot::default()
        };
        let config = RunnerConfig::resolve(args(&["--list", "list.json"]), env).expect("config");
        assert_eq!(
            config.source,
            RecipeSource::Override(vec![
                "Firefox".to_string(),
                "GoogleChrome.recipe".to_string()
            ])
        );
    }

    #[test]
    fn missing_list_and_override_is_an_error() {
        let err = RunnerConfig::resolve(args(&[]), EnvSnapshot::default()).unwrap_err();
        assert!(err.to_string().contains("not provided"));
    }

    #[test]
    fn debug_comes_from_flag_or_truthy_env() {
        let from_env = EnvSnapshot {
            debug: Some("1".to_string()),
            ..EnvSnapshot::default()
        };
        let config = RunnerConfig::resolve(args(&["-l", "x.json"]), from_env).expect("config");
        assert!(config.debug);

        let falsy = EnvSnapshot {
            debug: Some("false".to_string()),
            ..EnvSnapshot::default()
        };
        let config = RunnerConfig::resolve(args(&["-l", "x.json"]), falsy).expect("config");
        assert!(!config.debug);

        let config =
            RunnerConfig::resolve(args(&["-l", "x.json", "-d"]), EnvSnapshot::default())
                .expect("config");
        assert!(config.debug);
    }

    #[test]
    fn overrides_dir_flag_beats_environment() {
        let env = EnvSnapshot {
            overrides_dir: Some("/env/overrides".to_string()),
            ..EnvSnapshot::default()
        };
        let config = RunnerConfig::resolve(
            args(&["-l", "x.json", "--overrides-dir", "/flag/overrides"]),
            env,
        )
        .expect("config");
        assert_eq!(config.overrides_dir, Some(PathBuf::from("/flag/overrides")));
    }

    #[test]
    fn explicit_autopkg_path_is_kept_even_when_missing() {
        let config = RunnerConfig::resolve(
            args(&["-l", "x.json", "--autopkg", "/nonexistent/autopkg"]),
            EnvSnapshot::default(),
        )
        .expect("config");
        assert_eq!(config.autopkg, PathBuf::from("/nonexistent/autopkg"));
    }
}
