//! Layered configuration: built-in defaults, user config, workspace config, then env.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use dirs_next::config_dir;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::app::apply::ApplyOptions;

static DEFAULT_CONFIG: Lazy<&'static str> =
    Lazy::new(|| include_str!("../../assets/default-config.toml"));
static DEFAULT_WORKSPACE_CONFIG_PATH: &str = ".patchmark/config.toml";

const ENV_LANGUAGE: &str = "PATCHMARK_LANGUAGE";
const ENV_HIGHLIGHT: &str = "PATCHMARK_HIGHLIGHT";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub apply: Apply,
    #[serde(default)]
    pub prompt: Prompt,
    #[serde(default)]
    pub output: Output,
}

/// `[apply]`: how proposals are written into documents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Apply {
    #[serde(default)]
    highlight: Option<bool>,
    #[serde(default)]
    window_before: Option<usize>,
    #[serde(default)]
    window_after: Option<usize>,
}

impl Apply {
    pub fn highlight(&self) -> bool {
        self.highlight
            .unwrap_or_else(|| ApplyOptions::default().highlight)
    }

    pub fn window_before(&self) -> usize {
        self.window_before
            .unwrap_or_else(|| ApplyOptions::default().window_before)
    }

    pub fn window_after(&self) -> usize {
        self.window_after
            .unwrap_or_else(|| ApplyOptions::default().window_after)
    }
}

/// `[prompt]`: rendering of generation prompts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    template: Option<String>,
}

impl Prompt {
    fn default_language() -> &'static str {
        "en"
    }

    fn default_template() -> &'static str {
        "edit"
    }

    pub fn language(&self) -> String {
        self.language
            .clone()
            .unwrap_or_else(|| Self::default_language().to_owned())
    }

    pub fn template(&self) -> String {
        self.template
            .clone()
            .unwrap_or_else(|| Self::default_template().to_owned())
    }
}

/// `[output]`: structured output of the CLI.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    #[serde(default)]
    format: Option<String>,
}

impl Output {
    pub fn format(&self) -> String {
        self.format.clone().unwrap_or_else(|| "json".to_owned())
    }
}

/// Environment overrides for a handful of settings.
#[derive(Debug, Default, Clone)]
pub struct EnvOverrides {
    language: Option<String>,
    highlight: Option<String>,
}

impl EnvOverrides {
    fn from_env() -> Self {
        Self {
            language: env::var(ENV_LANGUAGE).ok(),
            highlight: env::var(ENV_HIGHLIGHT).ok(),
        }
    }

    #[cfg(test)]
    fn for_tests(language: &str, highlight: &str) -> Self {
        Self {
            language: Some(language.to_owned()),
            highlight: Some(highlight.to_owned()),
        }
    }
}

impl Config {
    /// Load configuration from defaults, user config, workspace config, and env overrides.
    pub fn load() -> Result<Self> {
        let env = EnvOverrides::from_env();
        let global = global_config_path();
        let workspace = workspace_config_path()?;
        Self::load_with_layers(global, workspace, env)
    }

    fn load_with_layers(
        global: Option<PathBuf>,
        workspace: Option<PathBuf>,
        env_overrides: EnvOverrides,
    ) -> Result<Self> {
        let mut layers: Vec<Config> = Vec::new();

        layers.push(Self::from_str(&DEFAULT_CONFIG)?);

        if let Some(global_path) = global.filter(|path| path.exists()) {
            tracing::debug!(path = %global_path.display(), "loading user config");
            layers.push(Self::from_file(&global_path)?);
        }

        if let Some(workspace_path) = workspace.filter(|path| path.exists()) {
            tracing::debug!(path = %workspace_path.display(), "loading workspace config");
            layers.push(Self::from_file(&workspace_path)?);
        }

        let merged = layers.into_iter().reduce(Config::merge).unwrap_or_default();
        Ok(apply_env_overrides(merged, env_overrides))
    }

    fn from_file(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        Self::from_str(&data)
            .with_context(|| format!("invalid config file: {}", path.display()))
    }

    fn from_str(contents: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(contents).with_context(|| "failed to parse TOML config".to_string())?;
        Ok(config)
    }

    fn merge(self, other: Self) -> Self {
        Self {
            apply: merge_apply(self.apply, other.apply),
            prompt: merge_prompt(self.prompt, other.prompt),
            output: Output {
                format: other.output.format.or(self.output.format),
            },
        }
    }

    /// Options handed to the applicator.
    pub fn apply_options(&self) -> ApplyOptions {
        ApplyOptions {
            highlight: self.apply.highlight(),
            window_before: self.apply.window_before(),
            window_after: self.apply.window_after(),
        }
    }
}

fn merge_apply(mut base: Apply, overlay: Apply) -> Apply {
    if let Some(value) = overlay.highlight {
        base.highlight = Some(value);
    }
    if let Some(value) = overlay.window_before {
        base.window_before = Some(value);
    }
    if let Some(value) = overlay.window_after {
        base.window_after = Some(value);
    }
    base
}

fn merge_prompt(mut base: Prompt, overlay: Prompt) -> Prompt {
    if let Some(value) = overlay.language {
        base.language = Some(value);
    }
    if let Some(value) = overlay.template {
        base.template = Some(value);
    }
    base
}

fn global_config_path() -> Option<PathBuf> {
    config_dir().map(|base| base.join("patchmark/config.toml"))
}

fn workspace_config_path() -> Result<Option<PathBuf>> {
    let cwd = env::current_dir()?;
    let root = find_repo_root(&cwd).unwrap_or(cwd);
    Ok(Some(root.join(DEFAULT_WORKSPACE_CONFIG_PATH)))
}

fn find_repo_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(".git").exists())
        .map(Path::to_path_buf)
}

fn apply_env_overrides(mut config: Config, env: EnvOverrides) -> Config {
    if let Some(language) = env.language.filter(|value| !value.trim().is_empty()) {
        config.prompt.language = Some(language);
    }
    if let Some(raw) = env.highlight {
        match parse_flag(&raw) {
            Some(value) => config.apply.highlight = Some(value),
            None => tracing::warn!(value = %raw, "ignoring invalid {ENV_HIGHLIGHT}"),
        }
    }
    config
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
