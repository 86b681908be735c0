//! Test doubles for the executor and prompter seams, plus throwaway contexts
//! rooted in a temporary directory.

use crate::context::{Account, RunContext, Target};
use crate::exec::{Cmd, Executor, Outcome};
use crate::prompt::{interpret_answer, Prompter};
use crate::system::Platform;
use anyhow::Result;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use tempfile::TempDir;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Query,
    Privileged,
    As(String),
}

#[derive(Debug, Clone)]
pub struct Call {
    pub mode: Mode,
    pub cmd: Cmd,
}

impl Call {
    pub fn line(&self) -> String {
        self.cmd.display()
    }

    pub fn exit(&self, ok: bool) -> Outcome {
        Outcome {
            command: self.line(),
            code: Some(if ok { 0 } else { 1 }),
            ..Outcome::default()
        }
    }

    pub fn stdout(&self, stdout: &str) -> Outcome {
        Outcome {
            stdout: stdout.to_string(),
            ..self.exit(true)
        }
    }
}

type Handler = Box<dyn Fn(&Call) -> Outcome>;

/// Records every command and answers with a scripted outcome.
pub struct RecordingExecutor {
    calls: RefCell<Vec<Call>>,
    handler: Handler,
}

impl RecordingExecutor {
    /// Every command succeeds with no output.
    pub fn new() -> Self {
        Self::with_handler(|call| call.exit(true))
    }

    pub fn with_handler(handler: impl Fn(&Call) -> Outcome + 'static) -> Self {
        Self {
            calls: RefCell::new(Vec::new()),
            handler: Box::new(handler),
        }
    }

    /// Applies the file commands the escalated guard paths use against the
    /// real filesystem; everything else succeeds.
    pub fn emulating_files() -> Self {
        Self::with_handler(emulate_files)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn lines(&self) -> Vec<String> {
        self.calls.borrow().iter().map(Call::line).collect()
    }

    fn record(&self, mode: Mode, cmd: &Cmd) -> Result<Outcome> {
        let call = Call { mode, cmd: cmd.clone() };
        let outcome = (self.handler)(&call);
        self.calls.borrow_mut().push(call);
        Ok(outcome)
    }
}

impl Executor for RecordingExecutor {
    fn query(&self, cmd: &Cmd) -> Result<Outcome> {
        self.record(Mode::Query, cmd)
    }

    fn run(&self, cmd: &Cmd) -> Result<Outcome> {
        self.record(Mode::Privileged, cmd)
    }

    fn run_as(&self, account: &Account, cmd: &Cmd) -> Result<Outcome> {
        self.record(Mode::As(account.name.clone()), cmd)
    }
}

/// Outcome of `call` with `install`, `test -e`, `cat` and `tee -a` applied to
/// the real filesystem.
pub fn emulate_files(call: &Call) -> Outcome {
    let args = &call.cmd.args;
    let last = args.last().map(PathBuf::from);
    match (call.cmd.program.as_str(), last) {
        ("test", Some(path)) => call.exit(path.exists()),
        ("cat", Some(path)) => match fs::read_to_string(&path) {
            Ok(content) => call.stdout(&content),
            Err(_) => call.exit(false),
        },
        ("tee", Some(path)) => {
            let appended = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .and_then(|mut f| f.write_all(call.cmd.stdin.as_deref().unwrap_or("").as_bytes()));
            call.exit(appended.is_ok())
        }
        ("install", Some(dest)) => {
            let mut operands = Vec::new();
            let mut directory = false;
            let mut iter = args.iter();
            while let Some(arg) = iter.next() {
                match arg.as_str() {
                    "-d" => directory = true,
                    "-m" | "-o" | "-g" => {
                        iter.next();
                    }
                    _ => operands.push(arg.clone()),
                }
            }
            if directory {
                return call.exit(fs::create_dir_all(&dest).is_ok());
            }
            let copied = match operands.first().map(String::as_str) {
                Some("/dev/null") | None => fs::write(&dest, ""),
                Some(src) => fs::copy(src, &dest).map(|_| ()),
            };
            call.exit(copied.is_ok())
        }
        _ => call.exit(true),
    }
}

/// Hands out prepared answers in order and remembers which keys were asked.
pub struct ScriptedPrompter {
    answers: RefCell<VecDeque<String>>,
    asked: RefCell<Vec<String>>,
}

impl ScriptedPrompter {
    pub fn new(answers: &[&str]) -> Self {
        Self {
            answers: RefCell::new(answers.iter().map(|a| a.to_string()).collect()),
            asked: RefCell::new(Vec::new()),
        }
    }

    pub fn asked(&self) -> Vec<String> {
        self.asked.borrow().clone()
    }

    pub fn remaining(&self) -> usize {
        self.answers.borrow().len()
    }

    fn next(&self, key: &str) -> String {
        self.asked.borrow_mut().push(key.to_string());
        self.answers
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| panic!("no scripted answer left for `{key}`"))
    }
}

impl Prompter for ScriptedPrompter {
    fn confirm(&self, key: &str, default: bool, _message: &str) -> Result<bool> {
        loop {
            if let Some(answer) = interpret_answer(&self.next(key), default) {
                return Ok(answer);
            }
        }
    }

    fn ask(&self, key: &str, _message: &str) -> Result<String> {
        Ok(self.next(key).trim().to_string())
    }

    fn ask_secret(&self, key: &str, _message: &str) -> Result<String> {
        Ok(self.next(key))
    }
}

/// An account owned by the user running the tests.
pub fn account(name: &str, home: PathBuf) -> Account {
    Account {
        name: name.to_string(),
        uid: nix::unistd::Uid::effective().as_raw(),
        gid: nix::unistd::Gid::effective().as_raw(),
        home,
        shell: "/bin/bash".to_string(),
    }
}

/// An account the test process can only reach through the executor.
pub fn foreign_account(name: &str, home: PathBuf) -> Account {
    Account {
        name: name.to_string(),
        uid: 4242,
        gid: 4242,
        home,
        shell: "/bin/bash".to_string(),
    }
}

/// Unprivileged Debian context rooted in a fresh temporary directory.
pub fn context_without_target() -> (TempDir, RunContext) {
    let dir = tempfile::tempdir().expect("tempdir");
    let sysroot = dir.path().to_path_buf();
    let invoker = account("operator", sysroot.join("home/operator"));
    let platform = Platform {
        os: "Linux".to_string(),
        arch: "x86_64".to_string(),
        distro: "debian".to_string(),
    };
    let log_path = sysroot.join("server-init.log");
    let ctx = RunContext::new(platform, invoker, false, sysroot, log_path);
    (dir, ctx)
}

/// Same as `context_without_target`, with `alice` selected and her home present.
pub fn context_with_target(created: bool) -> (TempDir, RunContext) {
    let (dir, ctx) = context_without_target();
    let home = ctx.sysroot.join("home/alice");
    fs::create_dir_all(&home).expect("home");
    ctx.select_target(Target {
        account: account("alice", home),
        created,
    })
    .expect("target");
    (dir, ctx)
}
