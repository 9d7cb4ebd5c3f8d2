//! Rewrites secret references in the environment with their values

use std::sync::Arc;

use crate::config::ResolverConfig;
use crate::context::ResolveContext;
use crate::environment::{Environment, ProcessEnvironment};
use crate::error::{ResolutionError, SecretError};
use crate::fetcher::SecretFetcher;

/// An environment variable whose value is a secret reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretBinding {
    pub key: String,
    pub reference: String,
}

/// Replaces every environment value that starts with the configured prefix
/// with the secret it refers to.
pub struct Resolver {
    fetcher: Arc<dyn SecretFetcher>,
    environment: Arc<dyn Environment>,
    config: ResolverConfig,
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("fetcher", &self.fetcher.name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Resolver {
    /// Resolver over the process environment with the default prefix
    pub fn new(fetcher: Arc<dyn SecretFetcher>) -> Self {
        Self::with_config(fetcher, ResolverConfig::default())
    }

    pub fn with_config(fetcher: Arc<dyn SecretFetcher>, config: ResolverConfig) -> Self {
        Self {
            fetcher,
            environment: Arc::new(ProcessEnvironment),
            config,
        }
    }

    /// Operate on `environment` instead of the process environment
    pub fn with_environment(mut self, environment: Arc<dyn Environment>) -> Self {
        self.environment = environment;
        self
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Bindings a [`resolve`](Self::resolve) pass would fetch, sorted by key
    pub fn references(&self) -> Vec<SecretBinding> {
        find_references(self.environment.as_ref(), &self.config)
    }

    /// Resolve every secret reference in the environment.
    ///
    /// Bindings are fetched and written one at a time. The first failure
    /// aborts the pass; bindings already rewritten stay rewritten.
    pub async fn resolve(&self, ctx: &ResolveContext) -> Result<(), ResolutionError> {
        let mut resolved = 0usize;

        for (key, value) in self.environment.vars() {
            let Some(reference) = self.config.strip_prefix(&value) else {
                continue;
            };

            tracing::debug!(
                key = %key,
                fetcher = self.fetcher.name(),
                "Resolving secret reference"
            );

            let secret = self
                .fetch(ctx, reference)
                .await
                .map_err(|e| ResolutionError::new(&key, e))?;

            self.environment
                .set_var(&key, &secret)
                .map_err(|e| ResolutionError::new(&key, e))?;
            resolved += 1;
        }

        tracing::debug!(resolved, "Secret references resolved");
        Ok(())
    }

    async fn fetch(&self, ctx: &ResolveContext, reference: &str) -> Result<String, SecretError> {
        ctx.check()?;

        tokio::select! {
            biased;
            err = ctx.done() => Err(err),
            result = self.fetcher.get_secret_value(ctx, reference) => result,
        }
    }
}

/// Bindings in `environment` whose value starts with the configured prefix,
/// sorted by key. Nothing is fetched.
pub fn find_references(
    environment: &dyn Environment,
    config: &ResolverConfig,
) -> Vec<SecretBinding> {
    let mut bindings: Vec<SecretBinding> = environment
        .vars()
        .into_iter()
        .filter_map(|(key, value)| {
            config.strip_prefix(&value).map(|reference| SecretBinding {
                reference: reference.to_string(),
                key,
            })
        })
        .collect();
    bindings.sort_by(|a, b| a.key.cmp(&b.key));
    bindings
}
