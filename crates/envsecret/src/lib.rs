//! Resolve secret references stored in environment variables
//!
//! Environment values that start with a prefix (default `secret://`) are
//! treated as references to secrets held elsewhere. A [`Resolver`] fetches each
//! one through a [`SecretFetcher`] and overwrites the variable with the secret
//! value, so the rest of the program reads plain environment variables.
//!
//! ```text
//! DB_PASSWORD=secret://projects/my-project/secrets/db-password/versions/3
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use envsecret::{GcpConfig, GcpSecretManager, ResolveContext, Resolver};
//!
//! let fetcher = GcpSecretManager::from_env(&GcpConfig::default())?;
//! let resolver = Resolver::new(Arc::new(fetcher));
//! resolver.resolve(&ResolveContext::new()).await?;
//!
//! let password = std::env::var("DB_PASSWORD")?;
//! ```
//!
//! A pass stops at the first failed fetch. Variables rewritten before the
//! failure keep their resolved values.
//!
//! The process environment is shared, unsynchronized state. Resolve once during
//! startup, before other threads touch the environment.
//!
//! # Features
//!
//! - `gcp` (default): Google Cloud Secret Manager fetcher
//! - `file` (default): fetcher reading one file per secret from a directory

mod backends;
mod config;
mod context;
mod environment;
mod error;
mod fetcher;
mod resolver;

pub use backends::memory::MemoryFetcher;
pub use config::{ResolverConfig, DEFAULT_SECRET_PREFIX};
pub use context::ResolveContext;
pub use environment::{
    is_valid_key, split_entry, Environment, MemoryEnvironment, ProcessEnvironment,
};
pub use error::{ResolutionError, SecretError};
pub use fetcher::{from_fn, FnFetcher, SecretFetcher};
pub use resolver::{find_references, Resolver, SecretBinding};

#[cfg(feature = "file")]
pub use backends::file::FileFetcher;

#[cfg(feature = "gcp")]
pub use backends::gcp::{GcpConfig, GcpSecretManager, SecretVersionName, ACCESS_TOKEN_VARS};

// Re-exported so callers can build a context without depending on tokio-util
pub use tokio_util::sync::CancellationToken;
