//! User-facing reports for resolution failures

use envsecret::{ResolutionError, SecretError};

/// Reference in a variable is malformed
#[derive(Debug, miette::Diagnostic, thiserror::Error)]
#[error("Could not resolve {key}: {cause}")]
#[diagnostic(code(envsecret::invalid_reference), severity(error))]
struct InvalidReferenceDiagnostic {
    key: String,
    cause: String,
    #[help]
    help: String,
}

/// Secret or version does not exist
#[derive(Debug, miette::Diagnostic, thiserror::Error)]
#[error("Could not resolve {key}: {cause}")]
#[diagnostic(code(envsecret::not_found), severity(error))]
struct NotFoundDiagnostic {
    key: String,
    cause: String,
    #[help]
    help: String,
}

/// Credentials cannot read the secret
#[derive(Debug, miette::Diagnostic, thiserror::Error)]
#[error("Could not resolve {key}: {cause}")]
#[diagnostic(code(envsecret::access_denied), severity(error))]
struct AccessDeniedDiagnostic {
    key: String,
    cause: String,
    #[help]
    help: String,
}

/// Secret file missing or unreadable
#[derive(Debug, miette::Diagnostic, thiserror::Error)]
#[error("Could not resolve {key}: {cause}")]
#[diagnostic(code(envsecret::file), severity(error))]
struct FileDiagnostic {
    key: String,
    cause: String,
    #[help]
    help: String,
}

/// Secret or variable name cannot be written to the environment
#[derive(Debug, miette::Diagnostic, thiserror::Error)]
#[error("Could not resolve {key}: {cause}")]
#[diagnostic(code(envsecret::invalid_value), severity(error))]
struct InvalidValueDiagnostic {
    key: String,
    cause: String,
    #[help]
    help: String,
}

/// Interrupted by a signal
#[derive(Debug, miette::Diagnostic, thiserror::Error)]
#[error("Could not resolve {key}: {cause}")]
#[diagnostic(code(envsecret::cancelled), severity(error))]
struct CancelledDiagnostic {
    key: String,
    cause: String,
    #[help]
    help: String,
}

/// --timeout ran out
#[derive(Debug, miette::Diagnostic, thiserror::Error)]
#[error("Could not resolve {key}: {cause}")]
#[diagnostic(code(envsecret::timeout), severity(error))]
struct TimeoutDiagnostic {
    key: String,
    cause: String,
    #[help]
    help: String,
}

/// Generic backend failure
#[derive(Debug, miette::Diagnostic, thiserror::Error)]
#[error("Could not resolve {key}: {cause}")]
#[diagnostic(code(envsecret::backend), severity(error))]
struct BackendDiagnostic {
    key: String,
    cause: String,
    #[help]
    help: String,
}

/// Pick a diagnostic with a fix-it hint for a failed resolution
pub fn analyze_resolution_error(
    err: &ResolutionError,
) -> Box<dyn miette::Diagnostic + Send + Sync> {
    let key = err.key().to_string();
    let cause = err.secret_error().to_string();

    match err.secret_error() {
        SecretError::InvalidReference { .. } => Box::new(InvalidReferenceDiagnostic {
            key,
            cause,
            help: "Fix the reference in this variable. Secret Manager references look like \
                   secret://projects/<project>/secrets/<secret>/versions/<version>."
                .to_string(),
        }),
        SecretError::NotFound(_) => Box::new(NotFoundDiagnostic {
            key,
            cause,
            help: "Check that the secret and version exist and that the name is spelled correctly."
                .to_string(),
        }),
        SecretError::AccessDenied(_) => Box::new(AccessDeniedDiagnostic {
            key,
            cause,
            help: "The credentials in use cannot read this secret. Grant \
                   roles/secretmanager.secretAccessor or refresh the access token."
                .to_string(),
        }),
        SecretError::FileError { path, .. } => Box::new(FileDiagnostic {
            key,
            cause,
            help: format!(
                "Make sure {} exists and is readable, or pass --secrets-dir.",
                path.display()
            ),
        }),
        SecretError::InvalidValue(_) => Box::new(InvalidValueDiagnostic {
            key,
            cause,
            help: "The secret value cannot be stored in an environment variable.".to_string(),
        }),
        SecretError::InvalidKey(_) => Box::new(InvalidValueDiagnostic {
            key,
            cause,
            help: "Rename the variable; names must be non-empty and contain no '=' or NUL."
                .to_string(),
        }),
        SecretError::Cancelled => Box::new(CancelledDiagnostic {
            key,
            cause,
            help: "Resolution was interrupted; no command was started.".to_string(),
        }),
        SecretError::DeadlineExceeded => Box::new(TimeoutDiagnostic {
            key,
            cause,
            help: "The secret store did not answer in time. Raise --timeout or check connectivity."
                .to_string(),
        }),
        SecretError::BackendError { backend, .. } => Box::new(BackendDiagnostic {
            key,
            cause,
            help: format!(
                "The {backend} backend failed. Check its configuration and availability."
            ),
        }),
    }
}

/// Print a diagnostic to stderr
pub fn display_diagnostic(diagnostic: &dyn miette::Diagnostic) {
    let mut output = String::new();

    output.push('\n');
    output.push_str("  × Secret resolution failed\n\n");

    if let Some(code) = diagnostic.code() {
        output.push_str(&format!("  Error: {}\n", code));
    }

    output.push_str(&format!("  {}\n", diagnostic));

    if let Some(help) = diagnostic.help() {
        output.push_str(&format!("\n  help: {}\n", help));
    }

    output.push_str("\n  Variables resolved before this failure keep their resolved values.\n");

    eprintln!("{}", output);
}
