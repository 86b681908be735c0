use crate::exec::Cmd;
use crate::sequencer::{Session, StepOutcome};
use anyhow::Result;
use tracing::info;

pub fn run(s: &Session) -> Result<StepOutcome> {
    if !s.prompt.confirm("git.configure", true, "Configure git identity?")? {
        return Ok(StepOutcome::Skipped("declined".to_string()));
    }
    s.ensure_package("git")?;

    let account = s.ctx.account()?;
    let name = s.prompt.ask("git.name", "git user.name (blank to skip)")?;
    let email = s.prompt.ask("git.email", "git user.email (blank to skip)")?;
    if name.is_empty() && email.is_empty() {
        return Ok(StepOutcome::Skipped("no identity given".to_string()));
    }

    for (key, value) in [("user.name", &name), ("user.email", &email)] {
        if value.is_empty() {
            continue;
        }
        s.exec
            .run_as(account, &Cmd::new("git").args(["config", "--global", key, value.as_str()]))?
            .check()?;
        info!("git {key} set for {}", account.name);
    }
    Ok(StepOutcome::Done)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::TemplateEngine;
    use crate::testing::{self, Mode, RecordingExecutor, ScriptedPrompter};
    use pretty_assertions::assert_eq;

    #[test]
    fn sets_identity_as_target() {
        let (_dir, ctx) = testing::context_with_target(false);
        let exec = RecordingExecutor::new();
        let prompt = ScriptedPrompter::new(&["y", "Jane Doe", "jane@example.com"]);
        let templates = TemplateEngine::embedded().unwrap();
        let s = Session::new(&ctx, &exec, &prompt, &templates);

        assert_eq!(run(&s).unwrap(), StepOutcome::Done);
        let configs: Vec<_> = exec
            .calls()
            .into_iter()
            .filter(|c| c.cmd.program == "git")
            .collect();
        assert_eq!(configs.len(), 2);
        assert!(configs.iter().all(|c| c.mode == Mode::As("alice".into())));
        assert_eq!(configs[0].line(), "git config --global user.name 'Jane Doe'");
        assert_eq!(configs[0].cmd.args.last().map(String::as_str), Some("Jane Doe"));
        assert_eq!(configs[1].line(), "git config --global user.email jane@example.com");
    }

    #[test]
    fn blank_fields_are_skipped() {
        let (_dir, ctx) = testing::context_with_target(false);
        let exec = RecordingExecutor::new();
        let prompt = ScriptedPrompter::new(&["y", "", "jane@example.com"]);
        let templates = TemplateEngine::embedded().unwrap();
        let s = Session::new(&ctx, &exec, &prompt, &templates);

        run(&s).unwrap();
        let lines = exec.lines();
        assert!(!lines.iter().any(|l| l.contains("user.name")));
        assert!(lines.contains(&"git config --global user.email jane@example.com".to_string()));
    }

    #[test]
    fn nothing_given_skips() {
        let (_dir, ctx) = testing::context_with_target(false);
        let exec = RecordingExecutor::new();
        let prompt = ScriptedPrompter::new(&["y", "", ""]);
        let templates = TemplateEngine::embedded().unwrap();
        let s = Session::new(&ctx, &exec, &prompt, &templates);

        assert_eq!(run(&s).unwrap(), StepOutcome::Skipped("no identity given".into()));
    }
}
