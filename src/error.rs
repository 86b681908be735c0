use thiserror::Error;

/// Structured failures of a provisioning run.
///
/// Step actions themselves return `anyhow::Result`; these variants are the
/// points where the sequencer or the runners need to name what went wrong.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("step `{step}` failed")]
    StepFailed {
        step: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    #[error("`{command}` exited with {status}{}", stderr_suffix(.stderr))]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("no supported package manager found (apt-get, dnf, pacman, apk)")]
    NoPackageManager,

    #[error("cannot run commands as `{0}`: no runuser or sudo, and not root")]
    NoImpersonation(String),

    #[error("target account already selected as `{0}`")]
    TargetAlreadySelected(String),

    #[error("no target account has been selected yet")]
    NoTargetAccount,

    #[error("account `{0}` does not exist")]
    UnknownAccount(String),

    #[error("answers file has no value for `{0}`")]
    MissingAnswer(String),

    #[error("invalid answer for `{key}`: {reason}")]
    InvalidInput { key: String, reason: String },
}

fn stderr_suffix(stderr: &str) -> String {
    let stderr = stderr.trim();
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {stderr}")
    }
}
