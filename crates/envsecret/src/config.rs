use serde::{Deserialize, Serialize};

/// Prefix that marks an environment value as a secret reference
pub const DEFAULT_SECRET_PREFIX: &str = "secret://";

/// Resolver settings, fixed at construction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Values starting with this prefix are resolved. Matching is exact and
    /// case-sensitive. An empty prefix matches every value.
    pub secret_prefix: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            secret_prefix: DEFAULT_SECRET_PREFIX.to_string(),
        }
    }
}

impl ResolverConfig {
    pub fn with_secret_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.secret_prefix = prefix.into();
        self
    }

    /// The reference carried by `value`, or `None` if it lacks the prefix
    pub fn strip_prefix<'a>(&self, value: &'a str) -> Option<&'a str> {
        value.strip_prefix(self.secret_prefix.as_str())
    }
}
