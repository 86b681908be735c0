use crate::context::Account;
use crate::exec::Cmd;
use crate::sequencer::{Session, StepOutcome};
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::Path;
use tracing::{info, warn};

/// Working directories created under the target's home.
pub const HOME_DIRS: [&str; 3] = ["toolchain", "temp", "workspace"];

/// SSH access, working directories and an optional system upgrade for the
/// target account.
pub fn run(s: &Session) -> Result<StepOutcome> {
    let target = s.ctx.target()?;
    let account = &target.account;
    let home = account.home.as_path();
    let mut warnings = Vec::new();

    let ssh_dir = home.join(".ssh");
    let keys = ssh_dir.join("authorized_keys");
    s.ensure_dir(&ssh_dir, 0o700, account)?;
    s.ensure_file(&keys, 0o600, account)?;

    if target.created
        && s.prompt.confirm(
            "ssh.copy_root_keys",
            true,
            "Copy root's authorized keys to the new account?",
        )?
    {
        if let Err(reason) = copy_root_keys(s, &keys, account)? {
            warn!("{reason}");
            warnings.push(reason);
        }
    }

    if s.prompt.confirm("ssh.paste_key", false, "Paste a public key to authorize?")? {
        let key = s.prompt.ask("ssh.public_key", "Public key")?;
        if key.is_empty() {
            info!("No key given");
        } else {
            s.append_text(&keys, &format!("{key}\n"), account)?;
            info!("Added pasted key");
        }
    }

    if s.prompt.confirm("ssh.github_import", false, "Import public keys from a GitHub account?")? {
        let user = s.prompt.ask("ssh.github_user", "GitHub username")?;
        if user.is_empty() {
            info!("No GitHub username given");
        } else if let Err(reason) = import_github_keys(s, &user, &keys, account)? {
            warn!("{reason}");
            warnings.push(reason);
        }
    }

    // Appends through tee may have touched the file as root.
    s.ensure_file(&keys, 0o600, account)?;

    for dir in HOME_DIRS {
        s.ensure_dir(&home.join(dir), 0o755, account)?;
    }

    if s.prompt.confirm("system.upgrade", false, "Run a full system package upgrade?")? {
        s.refresh_packages()?;
        info!("Upgrading system packages...");
        s.exec.run(&s.package_manager()?.upgrade_command())?.check()?;
    }

    if warnings.is_empty() {
        Ok(StepOutcome::Done)
    } else {
        Ok(StepOutcome::Warned(warnings.join("; ")))
    }
}

/// `Ok(Err(reason))` when there was nothing to copy.
fn copy_root_keys(s: &Session, keys: &Path, account: &Account) -> Result<Result<(), String>> {
    let root_keys = s.ctx.system_path("/root/.ssh/authorized_keys");
    let Some(content) = s.read_text(&root_keys, &Account::root())? else {
        return Ok(Err("root has no authorized_keys to copy".to_string()));
    };
    let existing = s.read_text(keys, account)?.unwrap_or_default();
    let fresh = new_keys(&existing, content.lines());
    if fresh.is_empty() {
        info!("Root keys already present");
    } else {
        s.append_text(keys, &(fresh.join("\n") + "\n"), account)?;
        info!("Copied {} root key(s)", fresh.len());
    }
    Ok(Ok(()))
}

fn import_github_keys(
    s: &Session,
    user: &str,
    keys: &Path,
    account: &Account,
) -> Result<Result<(), String>> {
    s.ensure_package("curl")?;
    let url = format!("https://github.com/{user}.keys");
    let out = s
        .exec
        .query(&Cmd::new("curl").args(["-fsSL", "--max-time", "10", url.as_str()]))
        .with_context(|| format!("Failed to fetch {url}"))?;
    if !out.success() {
        return Ok(Err(format!("could not fetch keys for GitHub user '{user}'")));
    }
    if out.stdout.trim().is_empty() {
        return Ok(Err(format!("GitHub user '{user}' has no public keys")));
    }

    let existing = s.read_text(keys, account)?.unwrap_or_default();
    let fresh = new_keys(&existing, out.stdout.lines());
    if fresh.is_empty() {
        info!("All keys for GitHub user '{user}' are already present");
        return Ok(Ok(()));
    }
    let mut block = format!("# GitHub keys for {user}\n");
    for key in &fresh {
        block.push_str(key);
        block.push('\n');
    }
    s.append_text(keys, &block, account)?;
    info!("Added {} key(s) for GitHub user '{user}'", fresh.len());
    Ok(Ok(()))
}

/// Candidate key lines not already in `existing`, blank lines and comments
/// ignored, in order and without repeats.
pub fn new_keys<'a>(existing: &str, candidates: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    let mut seen: HashSet<&str> = existing
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .collect();
    candidates
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .filter(|l| seen.insert(*l))
        .collect()
}
