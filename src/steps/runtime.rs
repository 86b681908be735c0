use crate::exec::Cmd;
use crate::sequencer::{Session, StepOutcome};
use crate::system::RuntimeArch;
use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const RUNTIME_ENV: &str = "py12";
const RUNTIME_PYTHON: &str = "python=3.12";
const TOS_CHANNELS: [&str; 2] = [
    "https://repo.anaconda.com/pkgs/main",
    "https://repo.anaconda.com/pkgs/r",
];

/// `~/toolchain/miniconda3`
pub fn runtime_prefix(home: &Path) -> PathBuf {
    home.join("toolchain").join("miniconda3")
}

pub fn installer_url(arch: RuntimeArch) -> String {
    format!(
        "https://repo.anaconda.com/miniconda/Miniconda3-latest-Linux-{}.sh",
        arch.installer_suffix()
    )
}

/// Installed and the named environment exists.
pub fn satisfied(s: &Session) -> Result<bool> {
    let account = s.ctx.account()?;
    let prefix = runtime_prefix(&account.home);
    Ok(s.exists_as(account, &prefix.join("bin/conda"))?
        && s.exists_as(account, &prefix.join("envs").join(RUNTIME_ENV))?)
}

pub fn run(s: &Session) -> Result<StepOutcome> {
    let platform = &s.ctx.platform;
    let arch = match RuntimeArch::from_machine(&platform.arch) {
        Some(arch) if platform.is_linux() => arch,
        _ => {
            let reason = format!("no runtime installer for {} on {}", platform.arch, platform.os);
            warn!("{reason}; skipping runtime install");
            return Ok(StepOutcome::Warned(reason));
        }
    };

    let account = s.ctx.account()?;
    let home = account.home.as_path();
    let prefix = runtime_prefix(home);
    let conda = prefix.join("bin/conda").to_string_lossy().into_owned();

    if s.exists_as(account, &prefix.join("bin/conda"))? {
        info!("Runtime already installed at {}", prefix.display());
    } else {
        s.ensure_package("curl")?;
        let temp = home.join("temp");
        s.ensure_dir(&temp, 0o755, account)?;
        s.ensure_dir(&home.join("toolchain"), 0o755, account)?;

        let url = installer_url(arch);
        let installer = temp
            .join(format!("Miniconda3-latest-Linux-{}.sh", arch.installer_suffix()))
            .to_string_lossy()
            .into_owned();
        info!("Downloading {url}");
        s.exec
            .run_as(
                account,
                &Cmd::new("curl").args(["-fsSL", "-o", installer.as_str(), url.as_str()]),
            )?
            .check()?;
        info!("Installing runtime into {}", prefix.display());
        let prefix_arg = prefix.to_string_lossy().into_owned();
        s.exec
            .run_as(
                account,
                &Cmd::new("bash").args([installer.as_str(), "-b", "-p", prefix_arg.as_str()]),
            )?
            .check()?;
        s.exec.run_as(account, &Cmd::new("rm").args(["-f", installer.as_str()]))?;
    }

    s.exec
        .run_as(
            account,
            &Cmd::new(conda.as_str()).args(["config", "--set", "auto_activate_base", "false"]),
        )?
        .check()?;

    if s.exists_as(account, &prefix.join("envs").join(RUNTIME_ENV))? {
        info!("Environment {RUNTIME_ENV} already exists");
        return Ok(StepOutcome::Done);
    }

    if !s.prompt.confirm(
        "runtime.accept_tos",
        true,
        "Accept the Anaconda terms of service for the repo.anaconda.com channels?",
    )? {
        let reason =
            format!("terms of service not accepted; environment {RUNTIME_ENV} not created");
        warn!("{reason}");
        return Ok(StepOutcome::Warned(reason));
    }
    for channel in TOS_CHANNELS {
        s.exec
            .run_as(
                account,
                &Cmd::new(conda.as_str()).args([
                    "tos",
                    "accept",
                    "--override-channels",
                    "--channel",
                    channel,
                ]),
            )?
            .check()?;
    }

    info!("Creating environment {RUNTIME_ENV} ({RUNTIME_PYTHON})");
    s.exec
        .run_as(
            account,
            &Cmd::new(conda.as_str())
                .args(["create", "-y", "-n", RUNTIME_ENV, RUNTIME_PYTHON])
                .passthrough(),
        )?
        .check()?;
    Ok(StepOutcome::Done)
}
