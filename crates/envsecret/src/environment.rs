//! Access to the set of environment bindings a resolver rewrites
//!
//! [`ProcessEnvironment`] is the real process environment. It is global state
//! with no locking of its own: run a resolution pass early during startup,
//! before other threads read or write the environment, or serialize access
//! yourself. [`MemoryEnvironment`] keeps bindings in a map so tests never touch
//! the process environment.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::error::SecretError;

/// Enumerate and overwrite environment bindings
pub trait Environment: Send + Sync {
    /// Snapshot of every binding with a usable name and a Unicode value
    fn vars(&self) -> Vec<(String, String)>;

    /// Set `key` to `value`, replacing any existing value
    fn set_var(&self, key: &str, value: &str) -> Result<(), SecretError>;
}

/// The environment of the current process
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnvironment;

impl ProcessEnvironment {
    pub fn new() -> Self {
        Self
    }
}

impl Environment for ProcessEnvironment {
    fn vars(&self) -> Vec<(String, String)> {
        std::env::vars_os()
            .filter_map(|(key, value)| {
                let (key, value) = match (key.into_string(), value.into_string()) {
                    (Ok(key), Ok(value)) => (key, value),
                    (key, _) => {
                        tracing::trace!(key = ?key, "Skipping non-unicode environment entry");
                        return None;
                    }
                };

                // vars_os splits `=X=v` into key `=X`, which set_var rejects
                if !is_valid_key(&key) {
                    tracing::trace!(key = ?key, "Skipping environment entry with invalid name");
                    return None;
                }

                Some((key, value))
            })
            .collect()
    }

    fn set_var(&self, key: &str, value: &str) -> Result<(), SecretError> {
        check_binding(key, value)?;
        std::env::set_var(key, value);
        Ok(())
    }
}

/// In-memory environment, iterated in key order
#[derive(Debug, Default)]
pub struct MemoryEnvironment {
    vars: RwLock<BTreeMap<String, String>>,
}

impl MemoryEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from raw `KEY=VALUE` entries. Entries without `=` or with an
    /// empty name are skipped.
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let vars = entries
            .into_iter()
            .filter_map(|entry| {
                let parsed = split_entry(entry.as_ref());
                if parsed.is_none() {
                    tracing::trace!("Skipping malformed environment entry");
                }
                parsed.map(|(key, value)| (key.to_string(), value.to_string()))
            })
            .collect();

        Self {
            vars: RwLock::new(vars),
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.vars.read().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.vars.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.read().is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for MemoryEnvironment
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let vars = iter
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();

        Self {
            vars: RwLock::new(vars),
        }
    }
}

impl Environment for MemoryEnvironment {
    fn vars(&self) -> Vec<(String, String)> {
        self.vars
            .read()
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    fn set_var(&self, key: &str, value: &str) -> Result<(), SecretError> {
        check_binding(key, value)?;
        self.vars.write().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Split a raw `KEY=VALUE` entry on the first `=`
///
/// Returns `None` when there is no `=` or the name before it is empty.
pub fn split_entry(entry: &str) -> Option<(&str, &str)> {
    entry.split_once('=').filter(|(key, _)| !key.is_empty())
}

/// Whether `key` can name an environment variable
pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty() && !key.contains(['=', '\0'])
}

fn check_binding(key: &str, value: &str) -> Result<(), SecretError> {
    if !is_valid_key(key) {
        return Err(SecretError::InvalidKey(key.to_string()));
    }
    if value.contains('\0') {
        return Err(SecretError::InvalidValue(
            "value contains a NUL byte".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_entry_uses_first_equals() {
        assert_eq!(split_entry("KEY=a=b"), Some(("KEY", "a=b")));
        assert_eq!(split_entry("KEY="), Some(("KEY", "")));
        assert_eq!(split_entry("KEY"), None);
        assert_eq!(split_entry("=X=secret://abc"), None);
    }

    #[test]
    fn test_valid_keys() {
        assert!(is_valid_key("DB_PASSWORD"));
        assert!(!is_valid_key(""));
        assert!(!is_valid_key("=X"));
        assert!(!is_valid_key("A\0B"));
    }

    #[test]
    fn test_from_entries_skips_malformed() {
        let env = MemoryEnvironment::from_entries(["A=1", "garbage", "B=x=y", "=C=z"]);
        assert_eq!(env.len(), 2);
        assert_eq!(env.get("A").as_deref(), Some("1"));
        assert_eq!(env.get("B").as_deref(), Some("x=y"));
    }

    #[test]
    fn test_memory_set_var_overwrites() {
        let env: MemoryEnvironment = [("KEY", "old")].into_iter().collect();
        env.set_var("KEY", "new").unwrap();
        assert_eq!(env.vars(), vec![("KEY".to_string(), "new".to_string())]);
    }

    #[test]
    fn test_process_environment_round_trip() {
        let env = ProcessEnvironment::new();
        env.set_var("ENVSECRET_TEST_PROCESS_ENV", "value").unwrap();

        let found = env
            .vars()
            .into_iter()
            .find(|(key, _)| key == "ENVSECRET_TEST_PROCESS_ENV");
        assert_eq!(found.map(|(_, value)| value).as_deref(), Some("value"));

        std::env::remove_var("ENVSECRET_TEST_PROCESS_ENV");
    }

    #[test]
    fn test_process_set_var_rejects_invalid_binding() {
        let env = ProcessEnvironment::new();

        assert!(matches!(
            env.set_var("=X", "v"),
            Err(SecretError::InvalidKey(key)) if key == "=X"
        ));
        assert!(matches!(env.set_var("", "v"), Err(SecretError::InvalidKey(_))));
        assert!(matches!(
            env.set_var("ENVSECRET_TEST_NUL_VALUE", "a\0b"),
            Err(SecretError::InvalidValue(_))
        ));
        assert!(std::env::var_os("ENVSECRET_TEST_NUL_VALUE").is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_environment_skips_non_unicode_value() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        use crate::config::ResolverConfig;
        use crate::context::ResolveContext;
        use crate::fetcher::from_fn;
        use crate::resolver::Resolver;

        const KEY: &str = "ENVSECRET_TEST_NON_UNICODE";
        let raw = OsStr::from_bytes(b"envsecret-non-unicode://\xff");
        std::env::set_var(KEY, raw);

        let listed = ProcessEnvironment::new()
            .vars()
            .into_iter()
            .any(|(key, _)| key == KEY);
        assert!(!listed);

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let fetcher = from_fn(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, SecretError>("resolved".to_string()) }
        });
        let resolver = Resolver::with_config(
            Arc::new(fetcher),
            ResolverConfig::default().with_secret_prefix("envsecret-non-unicode://"),
        );

        resolver.resolve(&ResolveContext::new()).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(std::env::var_os(KEY).as_deref(), Some(raw));

        std::env::remove_var(KEY);
    }
}
