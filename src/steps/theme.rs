use crate::color::{palette_table, ColorError, ColorId, DEFAULT_OS_ICON_COLOR};
use crate::error::ProvisionError;
use crate::sequencer::{Session, StepOutcome};
use anyhow::Result;
use regex::Regex;
use tracing::info;

const OS_ICON_LINE: &str =
    r"(?m)^([ \t]*typeset[ \t]+-g[ \t]+POWERLEVEL9K_OS_ICON_FOREGROUND[ \t]*=[ \t]*)(\d+)([ \t]*)$";

pub fn run(s: &Session) -> Result<StepOutcome> {
    if !s.prompt.confirm("theme.customize", false, "Customize the prompt OS icon color?")? {
        return Ok(StepOutcome::Skipped("declined".to_string()));
    }

    let account = s.ctx.account()?;
    let p10k = account.home.join(".p10k.zsh");
    let current = s.read_text(&p10k, account)?;
    let default = current
        .as_deref()
        .and_then(|c| current_os_icon_color(c).ok().flatten())
        .unwrap_or(DEFAULT_OS_ICON_COLOR);

    if s.prompt.interactive() {
        print!("{}", palette_table());
    }
    let color = ask_color(s, default)?;

    let patched = patch_os_icon_color(current.as_deref().unwrap_or(""), color)?;
    s.write_file(&p10k, &patched, 0o644, account)?;
    info!("OS icon color set to {color}");
    Ok(StepOutcome::Done)
}

fn ask_color(s: &Session, default: ColorId) -> Result<ColorId> {
    loop {
        let input = s
            .prompt
            .ask("theme.color", &format!("Color id for the OS icon [0-255] (default {default})"))?;
        if input.is_empty() {
            return Ok(default);
        }
        match input.parse::<ColorId>() {
            Ok(color) => return Ok(color),
            Err(e) if s.prompt.interactive() => println!("{e}"),
            Err(e) => return Err(invalid(e).into()),
        }
    }
}

fn invalid(e: ColorError) -> ProvisionError {
    ProvisionError::InvalidInput {
        key: "theme.color".to_string(),
        reason: e.to_string(),
    }
}

/// The OS icon color a prompt-theme file currently sets, if any.
pub fn current_os_icon_color(content: &str) -> Result<Option<ColorId>> {
    let line = Regex::new(OS_ICON_LINE)?;
    Ok(line
        .captures(content)
        .and_then(|caps| caps[2].parse().ok()))
}

/// Rewrite the first OS icon color line and nothing else. A file without one
/// gets the line appended.
pub fn patch_os_icon_color(content: &str, color: ColorId) -> Result<String> {
    let line = Regex::new(OS_ICON_LINE)?;
    if line.is_match(content) {
        let replacement = format!("${{1}}{color}${{3}}");
        return Ok(line.replacen(content, 1, replacement.as_str()).into_owned());
    }

    let mut out = content.to_string();
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(&format!("typeset -g POWERLEVEL9K_OS_ICON_FOREGROUND={color}\n"));
    Ok(out)
}
