//! File backend
//!
//! Reads secrets from a directory laid out one file per secret, as produced by
//! mounted secret volumes. The reference is the path relative to the root.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;

use crate::context::ResolveContext;
use crate::error::SecretError;
use crate::fetcher::SecretFetcher;

/// Fetch secrets from files under a root directory
#[derive(Debug, Clone)]
pub struct FileFetcher {
    root: PathBuf,
}

impl FileFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the file holding `reference`. Only plain relative paths that
    /// stay under the root are accepted.
    pub fn secret_path(&self, reference: &str) -> Result<PathBuf, SecretError> {
        if reference.is_empty() {
            return Err(SecretError::invalid_reference(
                reference,
                "file reference must name a file",
            ));
        }

        let relative = Path::new(reference);
        let plain = relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)));

        if !plain {
            return Err(SecretError::invalid_reference(
                reference,
                "file reference must be a relative path without '..'",
            ));
        }

        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl SecretFetcher for FileFetcher {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn get_secret_value(
        &self,
        _ctx: &ResolveContext,
        reference: &str,
    ) -> Result<String, SecretError> {
        let path = self.secret_path(reference)?;

        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| SecretError::FileError {
                path: path.clone(),
                message: e.to_string(),
            })?;

        Ok(trim_trailing_newline(content))
    }
}

fn trim_trailing_newline(mut content: String) -> String {
    if content.ends_with('\n') {
        content.pop();
        if content.ends_with('\r') {
            content.pop();
        }
    }
    content
}
