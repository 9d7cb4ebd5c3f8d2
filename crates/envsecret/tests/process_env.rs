//! Resolution against the real process environment
//!
//! Tests in this file share one process environment and run in parallel, so
//! each uses its own prefix and variable names.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use envsecret::{
    from_fn, Environment, MemoryFetcher, ProcessEnvironment, ResolveContext, Resolver,
    ResolverConfig, SecretError,
};

fn resolver_with_prefix(fetcher: Arc<MemoryFetcher>, prefix: &str) -> Resolver {
    Resolver::with_config(fetcher, ResolverConfig::default().with_secret_prefix(prefix))
}

struct EnvGuard(Vec<&'static str>);

impl EnvGuard {
    fn set(vars: &[(&'static str, &str)]) -> Self {
        for (key, value) in vars {
            std::env::set_var(key, value);
        }
        Self(vars.iter().map(|(key, _)| *key).collect())
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for key in &self.0 {
            std::env::remove_var(key);
        }
    }
}

#[tokio::test]
async fn test_resolves_process_environment() {
    let _guard = EnvGuard::set(&[
        ("ENVSECRET_IT_SECRET", "it-resolve://projects/p/secrets/s/versions/1"),
        ("ENVSECRET_IT_PLAIN", "plain-value"),
    ]);

    let fetcher = Arc::new(MemoryFetcher::new());
    fetcher.set_secret_value("projects/p/secrets/s/versions/1", "resolved-value");

    resolver_with_prefix(fetcher, "it-resolve://")
        .resolve(&ResolveContext::new())
        .await
        .expect("resolution should succeed");

    assert_eq!(std::env::var("ENVSECRET_IT_SECRET").unwrap(), "resolved-value");
    assert_eq!(std::env::var("ENVSECRET_IT_PLAIN").unwrap(), "plain-value");
}

#[tokio::test]
async fn test_references_do_not_fetch() {
    let _guard = EnvGuard::set(&[("ENVSECRET_IT_LISTED", "it-list://db")]);

    let resolver = resolver_with_prefix(Arc::new(MemoryFetcher::new()), "it-list://");
    let refs = resolver.references();

    assert_eq!(refs.len(), 1);
    assert_eq!(refs[0].key, "ENVSECRET_IT_LISTED");
    assert_eq!(refs[0].reference, "db");
    assert_eq!(std::env::var("ENVSECRET_IT_LISTED").unwrap(), "it-list://db");
}

#[tokio::test]
async fn test_failure_leaves_variable_untouched() {
    let _guard = EnvGuard::set(&[("ENVSECRET_IT_BROKEN", "it-fail://missing")]);

    let fetcher = from_fn(|reference| async move {
        Err::<String, _>(SecretError::NotFound(reference))
    });
    let resolver = Resolver::with_config(
        Arc::new(fetcher),
        ResolverConfig::default().with_secret_prefix("it-fail://"),
    );

    let err = resolver
        .resolve(&ResolveContext::new())
        .await
        .expect_err("missing secret must fail");

    assert_eq!(err.key(), "ENVSECRET_IT_BROKEN");
    assert!(matches!(err.secret_error(), SecretError::NotFound(r) if r == "missing"));
    assert_eq!(
        std::env::var("ENVSECRET_IT_BROKEN").unwrap(),
        "it-fail://missing"
    );
}

const INVALID_KEY_CHILD: &str = "ENVSECRET_IT_INVALID_KEY_CHILD";

/// A raw entry `=X=...` cannot be created with `set_var`, so this test re-runs
/// itself in a child process that inherits one.
#[tokio::test]
async fn test_skips_entry_with_invalid_name() {
    if std::env::var_os(INVALID_KEY_CHILD).is_some() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let fetcher = from_fn(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, SecretError>("v".to_string()) }
        });

        assert!(!ProcessEnvironment::new()
            .vars()
            .iter()
            .any(|(key, _)| key.starts_with('=')));

        Resolver::with_config(
            Arc::new(fetcher),
            ResolverConfig::default().with_secret_prefix("it-invalid://"),
        )
        .resolve(&ResolveContext::new())
        .await
        .expect("entry with an invalid name must be skipped");

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        return;
    }

    let output = tokio::process::Command::new(std::env::current_exe().unwrap())
        .args(["--exact", "test_skips_entry_with_invalid_name", "--nocapture"])
        .env(INVALID_KEY_CHILD, "1")
        .env("=X", "it-invalid://abc")
        .output()
        .await
        .unwrap();

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "child failed:\n{stdout}");
    assert!(stdout.contains("1 passed"), "child ran no test:\n{stdout}");
}
