//! envsecret configuration
//!
//! Loaded from `~/.config/envsecret/config.toml` (or `--config`) when present.
//! Command-line flags override file values. The GCP access token is never read
//! from the file.

use std::path::{Path, PathBuf};

use anyhow::Context;
use envsecret::{GcpConfig, ResolverConfig};
use serde::{Deserialize, Serialize};

const DEFAULT_SECRETS_DIR: &str = "/run/secrets";

/// Where secret references are fetched from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Google Cloud Secret Manager
    #[default]
    Gcp,
    /// One file per secret under a directory
    File,
}

/// File backend settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// Directory holding the secret files (`~` is expanded)
    pub root: String,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            root: DEFAULT_SECRETS_DIR.to_string(),
        }
    }
}

/// Full CLI configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub backend: Backend,
    pub resolver: ResolverConfig,
    pub gcp: GcpConfig,
    pub file: FileConfig,
}

/// Values given on the command line
#[derive(Debug, Default)]
pub struct Overrides {
    pub prefix: Option<String>,
    pub backend: Option<Backend>,
    pub secrets_dir: Option<String>,
}

impl CliConfig {
    /// Get the default config directory path
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("envsecret")
    }

    /// Get the default config file path
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Load configuration from a specific path
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Load `path` if given, else the default file if it exists, else defaults
    pub fn load_or_default(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let default_path = Self::default_path();
                if default_path.exists() {
                    tracing::debug!(path = %default_path.display(), "Loading configuration");
                    Self::load(&default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(prefix) = overrides.prefix {
            self.resolver.secret_prefix = prefix;
        }
        if let Some(backend) = overrides.backend {
            self.backend = backend;
        }
        if let Some(root) = overrides.secrets_dir {
            self.file.root = root;
        }
    }

    /// Secrets directory with `~` expanded
    pub fn secrets_root(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.file.root).into_owned())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.resolver.secret_prefix.is_empty() {
            errors.push("Secret prefix must not be empty".to_string());
        }

        match self.backend {
            Backend::Gcp => {
                if self.gcp.endpoint.is_empty() {
                    errors.push("GCP endpoint is required".to_string());
                }
                if self.gcp.timeout_secs == 0 {
                    errors.push("GCP timeout must be at least one second".to_string());
                }
            }
            Backend::File => {
                if self.file.root.is_empty() {
                    errors.push("Secrets directory is required for the file backend".to_string());
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
