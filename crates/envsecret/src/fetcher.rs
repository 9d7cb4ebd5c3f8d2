//! The capability a resolver delegates secret lookups to

use std::future::Future;

use async_trait::async_trait;

use crate::context::ResolveContext;
use crate::error::SecretError;

/// Fetches the value a secret reference points at.
///
/// Implementations must be safe to call concurrently; a single resolver calls
/// its fetcher sequentially, but callers may share one fetcher between
/// resolvers. Any caching or retrying is up to the implementation.
#[async_trait]
pub trait SecretFetcher: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &'static str {
        "custom"
    }

    async fn get_secret_value(
        &self,
        ctx: &ResolveContext,
        reference: &str,
    ) -> Result<String, SecretError>;
}

/// Fetcher backed by an async closure, see [`from_fn`]
#[derive(Clone)]
pub struct FnFetcher<F> {
    f: F,
}

impl<F> std::fmt::Debug for FnFetcher<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnFetcher").finish_non_exhaustive()
    }
}

/// Wrap an async closure taking the reference as a [`SecretFetcher`]
///
/// ```rust,ignore
/// let fetcher = envsecret::from_fn(|reference| async move {
///     Ok(format!("value-for-{reference}"))
/// });
/// ```
pub fn from_fn<F, Fut>(f: F) -> FnFetcher<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<String, SecretError>> + Send + 'static,
{
    FnFetcher { f }
}

#[async_trait]
impl<F, Fut> SecretFetcher for FnFetcher<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<String, SecretError>> + Send + 'static,
{
    fn name(&self) -> &'static str {
        "fn"
    }

    async fn get_secret_value(
        &self,
        _ctx: &ResolveContext,
        reference: &str,
    ) -> Result<String, SecretError> {
        (self.f)(reference.to_string()).await
    }
}
