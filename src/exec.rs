use crate::context::Account;
use crate::error::ProvisionError;
use anyhow::{Context, Result};
use std::io::Write;
use std::os::unix::process::CommandExt;
use std::process::{Command, Stdio};
use tracing::{debug, trace};

/// A command line to run, kept as an argument vector so nothing is ever
/// re-quoted through a shell.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cmd {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub stdin: Option<String>,
    /// Let the child talk to the terminal (long installs, upgrades).
    pub passthrough: bool,
}

impl Cmd {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn passthrough(mut self) -> Self {
        self.passthrough = true;
        self
    }

    /// Human-readable command line for logs. Stdin is never shown.
    pub fn display(&self) -> String {
        let mut parts: Vec<String> = self.env.iter().map(|(k, v)| format!("{k}={v}")).collect();
        parts.push(self.program.clone());
        parts.extend(self.args.iter().map(|a| {
            if a.is_empty() || a.contains(char::is_whitespace) {
                format!("'{a}'")
            } else {
                a.clone()
            }
        }));
        parts.join(" ")
    }

    /// Put `prefix` in front of this command, moving environment overrides
    /// into an `env` invocation so they survive wrappers that reset them.
    fn wrapped(&self, prefix: &[&str]) -> Self {
        let mut full: Vec<String> = prefix[1..].iter().map(|s| s.to_string()).collect();
        if !self.env.is_empty() {
            full.push("env".to_string());
            full.extend(self.env.iter().map(|(k, v)| format!("{k}={v}")));
        }
        full.push(self.program.clone());
        full.extend(self.args.iter().cloned());
        Self {
            program: prefix[0].to_string(),
            args: full,
            env: Vec::new(),
            stdin: self.stdin.clone(),
            passthrough: self.passthrough,
        }
    }
}

/// What a finished command left behind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outcome {
    pub command: String,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl Outcome {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Turn a non-zero exit into an error; callers that tolerate failure
    /// inspect `success()` instead.
    pub fn check(self) -> Result<Self, ProvisionError> {
        if self.success() {
            return Ok(self);
        }
        Err(ProvisionError::CommandFailed {
            status: match self.code {
                Some(code) => format!("exit status {code}"),
                None => "a signal".to_string(),
            },
            command: self.command,
            stderr: self.stderr,
        })
    }
}

/// The seam between steps and the machine. Steps only ever reach the system
/// through one of these three doors.
pub trait Executor {
    /// Run as the invoking process, unprivileged: probes and lookups.
    fn query(&self, cmd: &Cmd) -> Result<Outcome>;

    /// Run with elevated privilege, directly when already root.
    fn run(&self, cmd: &Cmd) -> Result<Outcome>;

    /// Run as `account`, with `HOME` pointing at its home directory.
    fn run_as(&self, account: &Account, cmd: &Cmd) -> Result<Outcome>;
}

/// How to become another account, probed once at start-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Impersonation {
    Runuser,
    Sudo,
    /// Switch uid/gid on the child directly; only possible as root.
    Setuid,
    Unavailable,
}

impl Impersonation {
    pub fn select(is_root: bool, has_runuser: bool, has_sudo: bool) -> Self {
        if is_root && has_runuser {
            Self::Runuser
        } else if has_sudo {
            Self::Sudo
        } else if is_root {
            Self::Setuid
        } else {
            Self::Unavailable
        }
    }
}

/// Runs commands on the real host.
#[derive(Debug)]
pub struct SystemExecutor {
    invoker_uid: u32,
    is_root: bool,
    impersonation: Impersonation,
}

impl SystemExecutor {
    pub fn new(invoker_uid: u32, is_root: bool, impersonation: Impersonation) -> Self {
        Self {
            invoker_uid,
            is_root,
            impersonation,
        }
    }

    pub fn detect(invoker: &Account, is_root: bool) -> Self {
        let impersonation =
            Impersonation::select(is_root, command_exists("runuser"), command_exists("sudo"));
        debug!(?impersonation, "selected impersonation method");
        Self::new(invoker.uid, is_root, impersonation)
    }

    /// `sudo` changes into the working directory as the invoker, before it
    /// switches user, so a foreign home (often 0750) is off limits there.
    fn can_enter_home(&self, account: &Account) -> bool {
        account.uid == self.invoker_uid
            || self.is_root
            || self.impersonation == Impersonation::Setuid
    }

    fn spawn(&self, cmd: &Cmd, setup: impl FnOnce(&mut Command)) -> Result<Outcome> {
        let line = cmd.display();
        debug!("$ {line}");

        let mut command = Command::new(&cmd.program);
        command.args(&cmd.args);
        for (key, value) in &cmd.env {
            command.env(key, value);
        }
        setup(&mut command);

        if cmd.stdin.is_some() {
            command.stdin(Stdio::piped());
        } else if !cmd.passthrough {
            command.stdin(Stdio::null());
        }
        if !cmd.passthrough {
            command.stdout(Stdio::piped()).stderr(Stdio::piped());
        }

        let mut child = command
            .spawn()
            .with_context(|| format!("Failed to run: {line}"))?;

        if let Some(input) = &cmd.stdin {
            if let Some(mut stdin) = child.stdin.take() {
                stdin
                    .write_all(input.as_bytes())
                    .with_context(|| format!("Failed to write stdin of: {line}"))?;
            }
        }

        let output = child
            .wait_with_output()
            .with_context(|| format!("Failed to wait for: {line}"))?;

        let outcome = Outcome {
            command: line,
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        debug!(code = ?outcome.code, "finished: {}", outcome.command);
        if !outcome.stdout.is_empty() {
            trace!("stdout: {}", outcome.stdout.trim_end());
        }
        if !outcome.stderr.is_empty() {
            debug!("stderr: {}", outcome.stderr.trim_end());
        }
        Ok(outcome)
    }
}

impl Executor for SystemExecutor {
    fn query(&self, cmd: &Cmd) -> Result<Outcome> {
        self.spawn(cmd, |_| {})
    }

    fn run(&self, cmd: &Cmd) -> Result<Outcome> {
        if self.is_root {
            self.spawn(cmd, |_| {})
        } else {
            self.spawn(&cmd.wrapped(&["sudo", "--"]), |_| {})
        }
    }

    fn run_as(&self, account: &Account, cmd: &Cmd) -> Result<Outcome> {
        let home = account.home.clone();
        let enter_home = self.can_enter_home(account);
        let set_home = |c: &mut Command| {
            c.env("HOME", &home).env("USER", &account.name);
            if enter_home && home.is_dir() {
                c.current_dir(&home);
            } else {
                c.current_dir("/");
            }
        };

        if account.uid == self.invoker_uid {
            return self.spawn(cmd, set_home);
        }

        match self.impersonation {
            Impersonation::Runuser => {
                let name = account.name.as_str();
                self.spawn(&cmd.wrapped(&["runuser", "-u", name, "--"]), set_home)
            }
            Impersonation::Sudo => {
                let name = account.name.as_str();
                self.spawn(&cmd.wrapped(&["sudo", "-u", name, "-H", "--"]), set_home)
            }
            Impersonation::Setuid => {
                let (uid, gid) = (account.uid, account.gid);
                self.spawn(cmd, |c| {
                    set_home(c);
                    c.uid(uid).gid(gid);
                })
            }
            Impersonation::Unavailable => {
                Err(ProvisionError::NoImpersonation(account.name.clone()).into())
            }
        }
    }
}

/// `command -v <tool>` through `sh`, the same probe the shell would use.
pub fn command_exists(tool: &str) -> bool {
    Command::new("sh")
        .arg("-c")
        .arg(format!("command -v {tool}"))
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Same probe as `command_exists`, routed through an executor so steps stay
/// testable.
pub fn has_command(exec: &dyn Executor, tool: &str) -> Result<bool> {
    let out = exec.query(&Cmd::new("sh").arg("-c").arg(format!("command -v {tool}")))?;
    Ok(out.success())
}

/// Resolve an account record through `getent passwd`.
pub fn lookup_account(exec: &dyn Executor, name: &str) -> Result<Option<Account>> {
    let out = exec.query(&Cmd::new("getent").args(["passwd", name]))?;
    if !out.success() {
        return Ok(None);
    }
    Ok(out.stdout.lines().find_map(Account::from_passwd_line))
}
