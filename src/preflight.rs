use crate::exec::has_command;
use crate::sequencer::{Session, StepOutcome};
use anyhow::{bail, Result};
use tracing::{info, warn};

/// Tools every run relies on before anything is installed.
const REQUIRED_TOOLS: [&str; 1] = ["getent"];

/// Record what was detected and refuse to start on a host the workflow
/// cannot drive.
pub fn run(s: &Session) -> Result<StepOutcome> {
    let platform = &s.ctx.platform;
    let distro = if platform.distro.is_empty() {
        "unknown"
    } else {
        platform.distro.as_str()
    };
    info!("Platform: {} {} (distribution: {distro})", platform.os, platform.arch);
    info!(
        "Invoked by {} (uid {}){}",
        s.ctx.invoker.name,
        s.ctx.invoker.uid,
        if s.ctx.is_root { " with root privileges" } else { "" }
    );

    check_tools(s)?;

    let mut warnings = Vec::new();
    if !platform.is_linux() {
        warnings.push(format!(
            "{} is not Linux; distribution-specific steps will fail or skip",
            platform.os
        ));
    }
    if !s.ctx.is_root && !has_command(s.exec, "sudo")? {
        warnings.push(
            "not running as root and sudo is unavailable; privileged steps will fail".to_string(),
        );
    }

    if warnings.is_empty() {
        return Ok(StepOutcome::Done);
    }
    for warning in &warnings {
        warn!("{warning}");
    }
    Ok(StepOutcome::Warned(warnings.join("; ")))
}

fn check_tools(s: &Session) -> Result<()> {
    let mut missing = Vec::new();
    for tool in REQUIRED_TOOLS {
        if !has_command(s.exec, tool)? {
            missing.push(tool);
        }
    }

    if !missing.is_empty() {
        bail!("Missing required tools: {}", missing.join(", "));
    }
    Ok(())
}
