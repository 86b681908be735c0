use crate::context::Account;
use crate::exec::{has_command, Cmd};
use crate::sequencer::{Session, StepOutcome};
use crate::system::current_hostname;
use anyhow::Result;
use regex::Regex;
use tracing::{info, warn};

const LOOPBACK_ALIAS: &str = "127.0.1.1";
/// Kernel limit on the node name, shorter than the 253 DNS allows.
const HOST_NAME_MAX: usize = 64;

pub fn run(s: &Session) -> Result<StepOutcome> {
    let current = current_hostname();
    info!("Current hostname: {current}");

    let question = format!("Change hostname (currently {current})?");
    if !s.prompt.confirm("hostname.change", false, &question)? {
        return Ok(StepOutcome::Skipped("declined".to_string()));
    }

    let name = s.prompt.ask("hostname.name", "New hostname")?;
    if name.is_empty() {
        return Ok(StepOutcome::Skipped("empty hostname".to_string()));
    }
    if !is_valid_hostname(&name)? {
        warn!("'{name}' is not a valid hostname; leaving it unchanged");
        return Ok(StepOutcome::Warned(format!("invalid hostname '{name}'")));
    }
    if name == current {
        info!("Hostname is already {name}");
    } else {
        set_hostname(s, &name)?;
    }

    let root = Account::root();
    let hosts_path = s.ctx.system_path("/etc/hosts");
    let hosts = s.read_text(&hosts_path, &root)?.unwrap_or_default();
    s.write_file(&hosts_path, &patch_hosts(&hosts, &name), 0o644, &root)?;
    Ok(StepOutcome::Done)
}

fn set_hostname(s: &Session, name: &str) -> Result<()> {
    if has_command(s.exec, "hostnamectl")? {
        let out = s.exec.run(&Cmd::new("hostnamectl").args(["set-hostname", name]))?;
        if out.success() {
            info!("Hostname set to {name}");
            return Ok(());
        }
        // No systemd running (containers, chroots): fall back to the plain files.
        warn!("hostnamectl failed, writing /etc/hostname instead");
    }
    let root = Account::root();
    s.write_file(&s.ctx.system_path("/etc/hostname"), &format!("{name}\n"), 0o644, &root)?;
    s.exec.run(&Cmd::new("hostname").arg(name))?.check()?;
    info!("Hostname set to {name}");
    Ok(())
}

fn is_valid_hostname(name: &str) -> Result<bool> {
    let label = Regex::new(r"^[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?$")?;
    Ok(name.len() <= HOST_NAME_MAX && name.split('.').all(|part| label.is_match(part)))
}

/// Leave exactly one `127.0.1.1 <name>` line in a hosts file.
///
/// The first existing `127.0.1.1` line is replaced in place and any others are
/// dropped. Without one, the entry goes right after the first `127.0.0.1` line,
/// or at the end.
pub fn patch_hosts(content: &str, name: &str) -> String {
    let entry = format!("{LOOPBACK_ALIAS} {name}");
    let address = |line: &str| line.split_whitespace().next().map(str::to_owned);

    let mut lines: Vec<String> = Vec::new();
    let mut placed = false;
    for line in content.lines() {
        if address(line).as_deref() == Some(LOOPBACK_ALIAS) {
            if !placed {
                lines.push(entry.clone());
                placed = true;
            }
            continue;
        }
        lines.push(line.to_string());
    }

    if !placed {
        match lines.iter().position(|l| address(l).as_deref() == Some("127.0.0.1")) {
            Some(i) => lines.insert(i + 1, entry),
            None => lines.push(entry),
        }
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::TemplateEngine;
    use crate::testing::{self, RecordingExecutor, ScriptedPrompter};
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use std::fs;

    fn alias_lines(hosts: &str) -> Vec<&str> {
        hosts.lines().filter(|l| l.starts_with(LOOPBACK_ALIAS)).collect()
    }

    #[test]
    fn exactly_one_alias_line_whatever_the_input() {
        let inputs = [
            "",
            "127.0.0.1 localhost\n",
            "127.0.0.1 localhost\n127.0.1.1 old\n::1 localhost\n",
            "127.0.1.1 a\n127.0.0.1 localhost\n127.0.1.1\tb c\n",
            "# comment only",
            "::1 ip6-localhost\n",
        ];
        for input in inputs {
            let patched = patch_hosts(input, "web-01");
            assert_eq!(alias_lines(&patched), vec!["127.0.1.1 web-01"], "{input:?}");
        }
    }

    #[test]
    fn inserts_after_localhost() {
        let hosts = indoc! {"
            127.0.0.1 localhost
            ::1 localhost ip6-localhost
        "};
        assert_eq!(
            patch_hosts(hosts, "web-01"),
            indoc! {"
                127.0.0.1 localhost
                127.0.1.1 web-01
                ::1 localhost ip6-localhost
            "}
        );
    }

    #[test]
    fn replaces_in_place_and_keeps_other_lines() {
        let hosts = indoc! {"
            # static entries
            127.0.0.1 localhost
            127.0.1.1 old-name.example old-name
            10.0.0.5 db
            127.0.1.1 stale
        "};
        assert_eq!(
            patch_hosts(hosts, "web-01"),
            indoc! {"
                # static entries
                127.0.0.1 localhost
                127.0.1.1 web-01
                10.0.0.5 db
            "}
        );
    }

    #[test]
    fn patching_twice_is_stable() {
        let once = patch_hosts("127.0.0.1 localhost\n", "web-01");
        assert_eq!(patch_hosts(&once, "web-01"), once);
    }

    #[test]
    fn hostname_validation() {
        let one_label_63 = "a".repeat(63);
        let one_label_64 = "a".repeat(64);
        let dotted_64 = format!("{}.{}", "a".repeat(32), "b".repeat(31));
        let dotted_65 = format!("{}.{}", "a".repeat(32), "b".repeat(32));
        let dotted_81 = format!("{}.{}", "a".repeat(40), "b".repeat(40));
        let cases = [
            ("web-01", true),
            ("web-01.example.com", true),
            ("-web", false),
            ("web_01", false),
            ("a..b", false),
            ("has space", false),
            (one_label_63.as_str(), true),
            (one_label_64.as_str(), false),
            (dotted_64.as_str(), true),
            (dotted_65.as_str(), false),
            (dotted_81.as_str(), false),
        ];
        for (name, expected) in cases {
            assert_eq!(is_valid_hostname(name).unwrap(), expected, "{name}");
        }
    }

    #[test]
    fn changes_hostname_and_hosts() {
        let (_dir, ctx) = testing::context_with_target(false);
        fs::create_dir_all(ctx.system_path("/etc")).unwrap();
        fs::write(ctx.system_path("/etc/hosts"), "127.0.0.1 localhost\n127.0.1.1 old\n").unwrap();
        let exec = RecordingExecutor::emulating_files();
        let prompt = ScriptedPrompter::new(&["y", "web-01"]);
        let templates = TemplateEngine::embedded().unwrap();
        let s = Session::new(&ctx, &exec, &prompt, &templates);

        assert_eq!(run(&s).unwrap(), StepOutcome::Done);
        let hosts = fs::read_to_string(ctx.system_path("/etc/hosts")).unwrap();
        assert_eq!(hosts, "127.0.0.1 localhost\n127.0.1.1 web-01\n");
        assert!(exec.lines().contains(&"hostnamectl set-hostname web-01".to_string()));
    }

    #[test]
    fn falls_back_when_hostnamectl_fails() {
        let (_dir, ctx) = testing::context_with_target(false);
        fs::create_dir_all(ctx.system_path("/etc")).unwrap();
        let exec = RecordingExecutor::with_handler(|call| {
            if call.cmd.program == "hostnamectl" {
                return call.exit(false);
            }
            call.exit(true)
        });
        let prompt = ScriptedPrompter::new(&["y", "web-01"]);
        let templates = TemplateEngine::embedded().unwrap();
        let s = Session::new(&ctx, &exec, &prompt, &templates);

        run(&s).unwrap();
        assert!(exec.lines().contains(&"hostname web-01".to_string()));
    }

    #[test]
    fn declining_touches_nothing() {
        let (_dir, ctx) = testing::context_with_target(false);
        let exec = RecordingExecutor::new();
        let prompt = ScriptedPrompter::new(&["n"]);
        let templates = TemplateEngine::embedded().unwrap();
        let s = Session::new(&ctx, &exec, &prompt, &templates);

        assert_eq!(run(&s).unwrap(), StepOutcome::Skipped("declined".into()));
        assert!(exec.lines().is_empty());
    }
}
