//! In-memory fetcher for tests

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::context::ResolveContext;
use crate::error::SecretError;
use crate::fetcher::SecretFetcher;

/// Fetcher backed by a map from reference to value.
///
/// Unknown references resolve to an empty string instead of an error. That is
/// a convenience for tests; real fetchers report missing secrets as
/// [`SecretError::NotFound`].
#[derive(Debug, Default)]
pub struct MemoryFetcher {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_secret_value(&self, reference: impl Into<String>, value: impl Into<String>) {
        self.values.write().insert(reference.into(), value.into());
    }
}

impl<K, V> FromIterator<(K, V)> for MemoryFetcher
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let values = iter
            .into_iter()
            .map(|(reference, value)| (reference.into(), value.into()))
            .collect();

        Self {
            values: RwLock::new(values),
        }
    }
}

#[async_trait]
impl SecretFetcher for MemoryFetcher {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get_secret_value(
        &self,
        _ctx: &ResolveContext,
        reference: &str,
    ) -> Result<String, SecretError> {
        Ok(self.values.read().get(reference).cloned().unwrap_or_default())
    }
}
