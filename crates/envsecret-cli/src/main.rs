use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use envsecret::{
    find_references, FileFetcher, GcpSecretManager, ProcessEnvironment, ResolveContext, Resolver,
    SecretFetcher, ACCESS_TOKEN_VARS,
};
use tracing_subscriber::EnvFilter;

mod config;
mod diagnostics;

use config::{Backend, CliConfig, Overrides};

/// envsecret - run commands with secret references resolved
#[derive(Parser, Debug)]
#[command(name = "envsecret")]
#[command(about = "Replace secret references in environment variables with their values")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: ~/.config/envsecret/config.toml, if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Prefix marking a value as a secret reference (default: secret://)
    #[arg(long, global = true)]
    prefix: Option<String>,

    /// Secret backend
    #[arg(long, value_enum, global = true)]
    backend: Option<Backend>,

    /// Directory holding one file per secret (file backend)
    #[arg(long, global = true)]
    secrets_dir: Option<String>,

    /// Give up resolving after this many seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Resolve secrets, then run a command with the resolved environment.
    ///
    /// With the gcp backend the access token variables are not passed on.
    Exec {
        /// Command and arguments to run
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// List variables holding secret references without fetching them
    Check,
}

// Single-threaded so no worker thread reads the environment while it is rewritten
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("envsecret=info".parse()?)
                .add_directive("envsecret_cli=info".parse()?),
        )
        .init();

    let config = match load_config(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            std::process::exit(2);
        }
    };

    match cli.command {
        Commands::Check => run_check(&config),
        Commands::Exec { command } => {
            let fetcher = build_fetcher(&config)?;
            let resolver = Resolver::with_config(fetcher, config.resolver.clone());

            let mut ctx = ResolveContext::new();
            if let Some(secs) = cli.timeout {
                ctx = ctx.with_timeout(Duration::from_secs(secs));
            }

            let code = run_exec(&resolver, ctx, &command, scrubbed_vars(&config)).await?;
            std::process::exit(code);
        }
    }
}

fn load_config(cli: &Cli) -> Result<CliConfig> {
    let mut config = CliConfig::load_or_default(cli.config.as_deref())?;

    config.apply(Overrides {
        prefix: cli.prefix.clone(),
        backend: cli.backend,
        secrets_dir: cli.secrets_dir.clone(),
    });

    if let Err(errors) = config.validate() {
        anyhow::bail!(errors.join("; "));
    }

    Ok(config)
}

fn build_fetcher(config: &CliConfig) -> Result<Arc<dyn SecretFetcher>> {
    match config.backend {
        Backend::Gcp => {
            let manager = GcpSecretManager::from_env(&config.gcp)
                .context("Failed to set up Secret Manager client")?;
            Ok(Arc::new(manager))
        }
        Backend::File => Ok(Arc::new(FileFetcher::new(config.secrets_root()))),
    }
}

/// Variables the child process must not inherit
fn scrubbed_vars(config: &CliConfig) -> &'static [&'static str] {
    match config.backend {
        Backend::Gcp => &ACCESS_TOKEN_VARS,
        Backend::File => &[],
    }
}

fn child_command(program: &str, args: &[String], scrub: &[&str]) -> tokio::process::Command {
    let mut command = tokio::process::Command::new(program);
    command.args(args);
    for var in scrub {
        command.env_remove(var);
    }
    command
}

// Needs no fetcher, so no backend credentials
fn run_check(config: &CliConfig) -> Result<()> {
    let bindings = find_references(&ProcessEnvironment, &config.resolver);

    if bindings.is_empty() {
        println!(
            "No variables start with {:?}",
            config.resolver.secret_prefix
        );
        return Ok(());
    }

    for binding in &bindings {
        println!("{}\t{}", binding.key, binding.reference);
    }

    tracing::info!(count = bindings.len(), "Secret references found");
    Ok(())
}

async fn run_exec(
    resolver: &Resolver,
    ctx: ResolveContext,
    command: &[String],
    scrub: &[&str],
) -> Result<i32> {
    let (program, args) = command
        .split_first()
        .context("No command given to exec")?;

    let pending = resolver.references().len();
    tracing::info!(count = pending, "Resolving secret references...");

    let token = ctx.cancellation_token().clone();
    let signal_task = tokio::spawn(async move {
        shutdown_signal().await;
        tracing::warn!("Shutdown signal received, cancelling resolution");
        token.cancel();
    });

    let result = resolver.resolve(&ctx).await;
    signal_task.abort();

    if let Err(e) = result {
        tracing::error!(key = e.key(), "Secret resolution failed");
        let diagnostic = diagnostics::analyze_resolution_error(&e);
        diagnostics::display_diagnostic(diagnostic.as_ref());
        return Ok(1);
    }

    tracing::info!(count = pending, "Secrets resolved successfully");

    let status = child_command(program, args, scrub)
        .status()
        .await
        .with_context(|| format!("Failed to run {}", program))?;

    Ok(exit_code(status))
}

#[cfg(unix)]
fn exit_code(status: std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;

    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or(1)
}

#[cfg(not(unix))]
fn exit_code(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(1)
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_exec_keeps_command_flags() {
        let cli = Cli::parse_from([
            "envsecret",
            "--prefix",
            "s://",
            "exec",
            "--",
            "printenv",
            "-0",
        ]);

        assert_eq!(cli.prefix.as_deref(), Some("s://"));
        match cli.command {
            Commands::Exec { command } => assert_eq!(command, vec!["printenv", "-0"]),
            Commands::Check => panic!("expected exec"),
        }
    }

    #[test]
    fn test_backend_flag() {
        let cli = Cli::parse_from(["envsecret", "check", "--backend", "file"]);
        assert_eq!(cli.backend, Some(Backend::File));
    }

    #[test]
    fn test_load_config_applies_flags() {
        let cli = Cli::parse_from([
            "envsecret",
            "--config",
            "/definitely/not/here.toml",
            "check",
        ]);
        assert!(load_config(&cli).is_err());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "backend = \"gcp\"\n").unwrap();

        let path = path.display().to_string();
        let secrets_dir = dir.path().display().to_string();
        let cli = Cli::parse_from([
            "envsecret",
            "--config",
            path.as_str(),
            "--backend",
            "file",
            "--secrets-dir",
            secrets_dir.as_str(),
            "check",
        ]);
        let config = load_config(&cli).unwrap();
        assert_eq!(config.backend, Backend::File);
        assert_eq!(config.secrets_root(), PathBuf::from(secrets_dir));
    }

    #[test]
    fn test_check_needs_no_credentials() {
        for var in ACCESS_TOKEN_VARS {
            std::env::remove_var(var);
        }

        let config = CliConfig::default();
        assert_eq!(config.backend, Backend::Gcp);
        assert!(build_fetcher(&config).is_err());
        assert!(run_check(&config).is_ok());
    }

    #[test]
    fn test_child_command_drops_token_vars() {
        let removed = |config: &CliConfig| -> Vec<String> {
            let command = child_command("true", &[], scrubbed_vars(config));
            command
                .as_std()
                .get_envs()
                .filter(|(_, value)| value.is_none())
                .map(|(key, _)| key.to_string_lossy().into_owned())
                .collect()
        };

        let mut removed_gcp = removed(&CliConfig::default());
        removed_gcp.sort();
        assert_eq!(
            removed_gcp,
            vec!["ENVSECRET_GCP_ACCESS_TOKEN", "GOOGLE_OAUTH_ACCESS_TOKEN"]
        );

        let mut config = CliConfig::default();
        config.apply(Overrides {
            backend: Some(Backend::File),
            ..Overrides::default()
        });
        assert!(removed(&config).is_empty());
    }

    #[test]
    fn test_file_backend_needs_no_token() {
        let mut config = CliConfig::default();
        config.apply(Overrides {
            backend: Some(Backend::File),
            ..Overrides::default()
        });
        assert!(build_fetcher(&config).is_ok());
    }
}
