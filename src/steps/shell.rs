use crate::color::DEFAULT_OS_ICON_COLOR;
use crate::exec::{lookup_account, Cmd};
use crate::sequencer::{Session, StepOutcome};
use crate::steps::runtime::{runtime_prefix, RUNTIME_ENV};
use crate::steps::theme::current_os_icon_color;
use crate::template::ShellVars;
use anyhow::Result;
use tracing::{info, warn};

/// Plugin repositories cloned into `~/.zsh/<name>`; the flag asks for a
/// shallow clone.
pub const PLUGINS: [(&str, &str, bool); 3] = [
    ("powerlevel10k", "https://github.com/romkatv/powerlevel10k.git", true),
    ("zsh-autosuggestions", "https://github.com/zsh-users/zsh-autosuggestions", false),
    ("zsh-syntax-highlighting", "https://github.com/zsh-users/zsh-syntax-highlighting.git", false),
];

pub fn run(s: &Session) -> Result<StepOutcome> {
    let account = s.ctx.account()?;
    let home = account.home.as_path();

    s.ensure_package("git")?;
    s.ensure_package("zsh")?;

    let plugin_dir = home.join(".zsh");
    s.ensure_dir(&plugin_dir, 0o755, account)?;
    for (name, url, shallow) in PLUGINS {
        s.ensure_clone(url, &plugin_dir.join(name), account, shallow)?;
    }

    let zshrc = s.templates.render_zshrc(&ShellVars {
        plugin_dir: plugin_dir.to_string_lossy().into_owned(),
        runtime_prefix: runtime_prefix(home).to_string_lossy().into_owned(),
        runtime_env: RUNTIME_ENV.to_string(),
    })?;
    s.write_file(&home.join(".zshrc"), &zshrc, 0o644, account)?;

    // Keep a color chosen on an earlier run.
    let p10k_path = home.join(".p10k.zsh");
    let color = s
        .read_text(&p10k_path, account)?
        .and_then(|c| current_os_icon_color(&c).ok().flatten())
        .unwrap_or(DEFAULT_OS_ICON_COLOR);
    let p10k = s.templates.render_p10k(color)?;
    s.write_file(&p10k_path, &p10k, 0o644, account)?;

    match set_login_shell(s)? {
        Some(reason) => {
            warn!("{reason}");
            Ok(StepOutcome::Warned(reason))
        }
        None => Ok(StepOutcome::Done),
    }
}

/// `Some(reason)` when the login shell could not be changed.
fn set_login_shell(s: &Session) -> Result<Option<String>> {
    let account = s.ctx.account()?;
    let out = s.exec.query(&Cmd::new("sh").args(["-c", "command -v zsh"]))?;
    let zsh = out.stdout.trim();
    if !out.success() || zsh.is_empty() {
        return Ok(Some("zsh not found on PATH; login shell unchanged".to_string()));
    }

    let shell = lookup_account(s.exec, &account.name)?
        .map(|a| a.shell)
        .unwrap_or_else(|| account.shell.clone());
    if shell == zsh {
        info!("Login shell is already {zsh}");
        return Ok(None);
    }

    let chsh = s.exec.run(&Cmd::new("chsh").args(["-s", zsh, account.name.as_str()]))?;
    if !chsh.success() {
        return Ok(Some(format!("could not change login shell of {} to {zsh}", account.name)));
    }
    info!("Login shell of {} set to {zsh}", account.name);
    Ok(None)
}
