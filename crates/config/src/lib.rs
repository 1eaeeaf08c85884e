//! Configuration for the AgentField gateway session client.
//!
//! Discovery order: `agentfield.{toml,yaml,yml,json}` in the working
//! directory, then the same names in the user config directory. Environment
//! variables (optionally from `.env`) override file values.

use std::path::{Path, PathBuf};

use {secrecy::Secret, tracing::{debug, warn}};

pub mod error;
pub mod schema;

pub use {
    error::{Error, Result},
    schema::{
        AuthConfig, ClientIdentityConfig, GatewayClientConfig, ReconnectConfig, TenantConfig,
    },
};

const CONFIG_STEM: &str = "agentfield";
const CONFIG_EXTENSIONS: &[&str] = &["toml", "yaml", "yml", "json"];

pub const ENV_GATEWAY_URL: &str = "AGENTFIELD_GATEWAY_URL";
pub const ENV_TOKEN: &str = "AGENTFIELD_TOKEN";
pub const ENV_PASSWORD: &str = "AGENTFIELD_PASSWORD";
pub const ENV_ORG: &str = "AGENTFIELD_ORG";
pub const ENV_PROJECT: &str = "AGENTFIELD_PROJECT";
pub const ENV_ENVIRONMENT: &str = "AGENTFIELD_ENV";

/// Load the first config file found, apply environment overrides, and fall
/// back to defaults when nothing usable exists.
pub fn discover_and_load() -> GatewayClientConfig {
    let _ = dotenvy::dotenv();

    let mut config = match find_config_file() {
        Some(path) => match load(&path) {
            Ok(config) => {
                debug!(path = %path.display(), "loaded gateway client config");
                config
            },
            Err(e) => {
                warn!(path = %path.display(), "failed to load config: {e}, using defaults");
                GatewayClientConfig::default()
            },
        },
        None => GatewayClientConfig::default(),
    };
    apply_env(&mut config);
    config
}

/// Parse a config file, picking the format from its extension.
pub fn load(path: &Path) -> Result<GatewayClientConfig> {
    let raw = std::fs::read_to_string(path)?;
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    let config = match ext.as_deref() {
        Some("toml") => toml::from_str(&raw)?,
        Some("yaml" | "yml") => serde_yaml::from_str(&raw)?,
        Some("json") => serde_json::from_str(&raw)?,
        _ => return Err(Error::UnsupportedFormat(path.to_path_buf())),
    };
    Ok(config)
}

/// Search the working directory, then the user config directory.
pub fn find_config_file() -> Option<PathBuf> {
    let mut dirs = vec![PathBuf::from(".")];
    if let Some(project) = directories::ProjectDirs::from("", "", CONFIG_STEM) {
        dirs.push(project.config_dir().to_path_buf());
    }
    dirs.iter().find_map(|dir| find_in_dir(dir))
}

fn find_in_dir(dir: &Path) -> Option<PathBuf> {
    CONFIG_EXTENSIONS
        .iter()
        .map(|ext| dir.join(format!("{CONFIG_STEM}.{ext}")))
        .find(|p| p.is_file())
}

/// Apply `AGENTFIELD_*` overrides from the process environment.
pub fn apply_env(config: &mut GatewayClientConfig) {
    apply_env_from(config, |key| std::env::var(key).ok());
}

/// Apply overrides using an arbitrary variable lookup.
pub fn apply_env_from(config: &mut GatewayClientConfig, lookup: impl Fn(&str) -> Option<String>) {
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(url) = get(ENV_GATEWAY_URL) {
        config.url = url;
    }
    if let Some(token) = get(ENV_TOKEN) {
        config.auth.token = Some(Secret::new(token));
    }
    if let Some(password) = get(ENV_PASSWORD) {
        config.auth.password = Some(Secret::new(password));
    }
    if let Some(org) = get(ENV_ORG) {
        config.tenant.org_id = Some(org);
    }
    if let Some(project) = get(ENV_PROJECT) {
        config.tenant.project_id = Some(project);
    }
    if let Some(env) = get(ENV_ENVIRONMENT) {
        config.tenant.environment = Some(env);
    }
}
