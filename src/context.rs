use crate::error::ProvisionError;
use crate::system::Platform;
use anyhow::{Context, Result};
use std::cell::OnceCell;
use std::path::{Path, PathBuf};

/// An operating-system account as `getent passwd` reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
    pub home: PathBuf,
    pub shell: String,
}

impl Account {
    /// Parse one `name:passwd:uid:gid:gecos:home:shell` record.
    pub fn from_passwd_line(line: &str) -> Option<Self> {
        let fields: Vec<&str> = line.trim_end().split(':').collect();
        if fields.len() < 7 || fields[0].is_empty() {
            return None;
        }
        Some(Self {
            name: fields[0].to_string(),
            uid: fields[2].parse().ok()?,
            gid: fields[3].parse().ok()?,
            home: PathBuf::from(fields[5]),
            shell: fields[6].to_string(),
        })
    }

    /// `uid:gid`, the numeric form `chown` and `install` both accept.
    pub fn owner_spec(&self) -> String {
        format!("{}:{}", self.uid, self.gid)
    }

    pub fn root() -> Self {
        Self {
            name: "root".to_string(),
            uid: 0,
            gid: 0,
            home: PathBuf::from("/root"),
            shell: "/bin/sh".to_string(),
        }
    }
}

/// The account the workflow configures, fixed once chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub account: Account,
    pub created: bool,
}

/// Everything detected at start-up plus the target account, which is set
/// exactly once by the account step and read-only afterwards.
#[derive(Debug)]
pub struct RunContext {
    pub platform: Platform,
    pub invoker: Account,
    pub is_root: bool,
    pub sysroot: PathBuf,
    pub log_path: PathBuf,
    target: OnceCell<Target>,
}

impl RunContext {
    pub fn new(
        platform: Platform,
        invoker: Account,
        is_root: bool,
        sysroot: PathBuf,
        log_path: PathBuf,
    ) -> Self {
        Self {
            platform,
            invoker,
            is_root,
            sysroot,
            log_path,
            target: OnceCell::new(),
        }
    }

    /// Build the context for the running process. System files are read and
    /// written under `sysroot`, normally `/`.
    pub fn detect(sysroot: PathBuf, log_path: PathBuf) -> Result<Self> {
        let platform = Platform::detect(&sysroot);
        let euid = nix::unistd::Uid::effective();
        let user = nix::unistd::User::from_uid(euid)
            .context("Failed to look up the invoking account")?
            .with_context(|| format!("No passwd entry for uid {euid}"))?;

        let home = if user.dir.as_os_str().is_empty() {
            home::home_dir().context("Could not determine home directory")?
        } else {
            user.dir.clone()
        };

        let invoker = Account {
            name: user.name,
            uid: user.uid.as_raw(),
            gid: user.gid.as_raw(),
            home,
            shell: user.shell.to_string_lossy().into_owned(),
        };

        Ok(Self::new(platform, invoker, euid.is_root(), sysroot, log_path))
    }

    /// Resolve an absolute system path (`/etc/hosts`) under the system root.
    pub fn system_path(&self, absolute: &str) -> PathBuf {
        self.sysroot.join(absolute.trim_start_matches('/'))
    }

    pub fn select_target(&self, target: Target) -> Result<&Target, ProvisionError> {
        if let Some(existing) = self.target.get() {
            return Err(ProvisionError::TargetAlreadySelected(existing.account.name.clone()));
        }
        let _ = self.target.set(target);
        self.target.get().ok_or(ProvisionError::NoTargetAccount)
    }

    pub fn target(&self) -> Result<&Target, ProvisionError> {
        self.target.get().ok_or(ProvisionError::NoTargetAccount)
    }

    pub fn account(&self) -> Result<&Account, ProvisionError> {
        self.target().map(|t| &t.account)
    }

    pub fn home(&self) -> Result<&Path, ProvisionError> {
        self.account().map(|a| a.home.as_path())
    }

    /// The process can touch files owned by `owner` without help.
    pub fn writes_directly_as(&self, owner: &Account) -> bool {
        self.is_root || owner.uid == self.invoker.uid
    }
}
