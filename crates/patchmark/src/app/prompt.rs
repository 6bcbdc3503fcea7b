//! Prompt rendering for generation requests.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use minijinja::{Environment, context};
use serde::Serialize;

use crate::app::session::GenerationRequest;

const SYSTEM_TEMPLATE: &str = include_str!("../../assets/prompts/system.j2");
const EDIT_TEMPLATE: &str = include_str!("../../assets/prompts/edit.j2");

/// Name of the built-in system template.
pub const SYSTEM: &str = "system";
/// Name of the built-in user template.
pub const EDIT: &str = "edit";

/// Messages sent to a generation service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

/// Renders [`Prompt`]s from built-in templates or a template file.
pub struct PromptBuilder {
    env: Environment<'static>,
    template: String,
}

impl PromptBuilder {
    /// Builder rendering the user message with the built-in `edit` template.
    pub fn new() -> Result<Self> {
        Self::with_template(EDIT)
    }

    /// `template` is a built-in name or a path to a template file.
    pub fn with_template(template: impl Into<String>) -> Result<Self> {
        Ok(Self {
            env: default_environment()?,
            template: template.into(),
        })
    }

    pub fn render(&self, request: &GenerationRequest) -> Result<Prompt> {
        let system = self
            .env
            .get_template(SYSTEM)
            .and_then(|template| template.render(context! {}))
            .map_err(|err| anyhow!("failed to render system prompt: {err}"))?;
        let user = self.render_user(request)?;
        Ok(Prompt { system, user })
    }

    fn render_user(&self, request: &GenerationRequest) -> Result<String> {
        let name = self.template.as_str();
        if let Ok(template) = self.env.get_template(name) {
            return template
                .render(request)
                .map_err(|err| anyhow!("failed to render template '{name}': {err}"));
        }

        let path = Path::new(name);
        if !path.exists() {
            return Err(anyhow!("template '{name}' not found (built-in or filesystem)"));
        }

        let source = fs::read_to_string(path)
            .with_context(|| format!("failed to load template from path {}", path.display()))?;
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.render_str(&source, request)
            .map_err(|err| anyhow!("failed to render template '{name}': {err}"))
    }
}

fn default_environment() -> Result<Environment<'static>> {
    let mut env = Environment::new();
    env.set_trim_blocks(true);
    env.set_lstrip_blocks(true);
    env.add_template(SYSTEM, SYSTEM_TEMPLATE)
        .map_err(|err| anyhow!("failed to register system template: {err}"))?;
    env.add_template(EDIT, EDIT_TEMPLATE)
        .map_err(|err| anyhow!("failed to register edit template: {err}"))?;
    Ok(env)
}
