/// `load_config` module: reads the YAML config for the CLI and injects the
/// credentials from the environment.
///
/// The YAML file never holds a password. It names the definitions document,
/// the project directory and, optionally, the username and network options:
///
/// ```yaml
/// definitions: https://example.edu/submit/course.xml   # or a local path
/// project: ./lab1
/// username: alice                                      # optional
/// transport:                                           # optional
///   timeout_secs: 30
/// ```
///
/// `SUBMITTER_USERNAME` overrides `username`; `SUBMITTER_PASSWORD` supplies the
/// password. Relative paths are taken relative to the config file.
///
/// # Errors
/// Every failure is an `anyhow::Error` with the offending path or variable in
/// its message, surfaced unchanged at the CLI boundary.
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use submitter_core::config::TransportConfig;
use tracing::{debug, error, info, warn};
use url::Url;

pub const USERNAME_ENV: &str = "SUBMITTER_USERNAME";
pub const PASSWORD_ENV: &str = "SUBMITTER_PASSWORD";

const URL_SCHEMES: [&str; 3] = ["http", "https", "file"];

#[derive(Debug, Deserialize)]
struct RawConfig {
    definitions: String,
    project: PathBuf,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    transport: TransportConfig,
}

/// Fully resolved CLI configuration.
#[derive(Clone)]
pub struct CliConfig {
    pub definitions: Url,
    pub project: PathBuf,
    pub username: String,
    pub password: String,
    pub transport: TransportConfig,
}

impl std::fmt::Debug for CliConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CliConfig")
            .field("definitions", &self.definitions.as_str())
            .field("project", &self.project)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("transport", &self.transport)
            .finish()
    }
}

impl CliConfig {
    pub fn trace_loaded(&self) {
        info!(
            definitions = %self.definitions,
            project = %self.project.display(),
            username = %self.username,
            has_password = !self.password.is_empty(),
            "Loaded CliConfig"
        );
        self.transport.trace_loaded();
    }
}

/// Loads the YAML config at `path` and merges in the credentials from the
/// environment.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow!("Failed to read config file {:?}: {}", path_ref, e));
        }
    };

    let raw: RawConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            debug!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    let base = absolute(path_ref.parent().unwrap_or(Path::new("")))?;

    let username = match env::var(USERNAME_ENV) {
        Ok(name) if !name.is_empty() => name,
        _ => raw.username.filter(|name| !name.is_empty()).ok_or_else(|| {
            anyhow!("No username: set 'username' in the config file or the {USERNAME_ENV} environment variable")
        })?,
    };
    let password = env::var(PASSWORD_ENV).unwrap_or_else(|_| {
        warn!("{PASSWORD_ENV} is not set; submitting with an empty password");
        String::new()
    });

    let config = CliConfig {
        definitions: definitions_url(&raw.definitions, &base)?,
        project: base.join(&raw.project),
        username,
        password,
        transport: raw.transport,
    };
    config.trace_loaded();
    Ok(config)
}

/// A URL with a supported scheme is used as is; anything else is a path
/// relative to `base`.
pub fn definitions_url(value: &str, base: &Path) -> Result<Url> {
    if let Ok(url) = Url::parse(value) {
        if URL_SCHEMES.contains(&url.scheme()) {
            return Ok(url);
        }
    }
    let path = base.join(value);
    Url::from_file_path(&path).map_err(|_| anyhow!("Invalid definitions path {:?}", path))
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = env::current_dir().context("Failed to read the current directory")?;
    Ok(cwd.join(path))
}
