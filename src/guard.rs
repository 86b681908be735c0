//! Existence checks wrapped around every mutation, so a second run leaves
//! already-satisfied state alone.
//!
//! The checks are existence probes, not content or version comparisons: an
//! installed package or a cloned plugin counts as satisfied whatever its
//! version. `write_file` is the one helper that compares content, because the
//! files it writes are fully owned by this tool.
//!
//! When the process may write as the owning account (it is root, or it is that
//! account) files are touched directly. Otherwise the mutation is staged and
//! applied through the privilege runner with `install`, `tee`, `chmod` and
//! `chown`.

use crate::context::Account;
use crate::exec::Cmd;
use crate::sequencer::Session;
use anyhow::{Context, Result};
use std::fs::{self, OpenOptions, Permissions};
use nix::errno::Errno;
use std::io::{self, Write};
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::Path;
use tracing::{debug, info};

/// Renaming over a bind-mounted file (`/etc/hosts` in a container) fails
/// with EBUSY.
fn is_busy_mount(err: &io::Error) -> bool {
    err.raw_os_error() == Some(Errno::EBUSY as i32)
}

fn rewrite_in_place(path: &Path, content: &str, mode: u32) -> Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .truncate(true)
        .open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    file.write_all(content.as_bytes())
        .with_context(|| format!("Failed to write {}", path.display()))?;
    file.set_permissions(Permissions::from_mode(mode))?;
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Changed,
    Unchanged,
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn mode_arg(mode: u32) -> String {
    format!("{mode:04o}")
}

impl Session<'_> {
    pub fn exists_as(&self, owner: &Account, path: &Path) -> Result<bool> {
        if self.ctx.writes_directly_as(owner) {
            return Ok(path.exists());
        }
        Ok(self.exec.run(&Cmd::new("test").arg("-e").arg(path_arg(path)))?.success())
    }

    /// Contents of `path`, or `None` when it does not exist.
    pub fn read_text(&self, path: &Path, owner: &Account) -> Result<Option<String>> {
        if self.ctx.writes_directly_as(owner) {
            if !path.exists() {
                return Ok(None);
            }
            return fs::read_to_string(path)
                .map(Some)
                .with_context(|| format!("Failed to read {}", path.display()));
        }
        let out = self.exec.run(&Cmd::new("cat").arg(path_arg(path)))?;
        Ok(out.success().then_some(out.stdout))
    }

    /// Directory exists with `mode`, owned by `owner`.
    pub fn ensure_dir(&self, path: &Path, mode: u32, owner: &Account) -> Result<Applied> {
        if self.ctx.writes_directly_as(owner) {
            let existed = path.is_dir();
            if !existed {
                fs::create_dir_all(path)
                    .with_context(|| format!("Failed to create {}", path.display()))?;
            }
            self.enforce_local(path, mode, owner)?;
            return Ok(report(path, existed, "directory"));
        }

        let existed = self.exists_as(owner, path)?;
        self.exec
            .run(&Cmd::new("install").args([
                "-d".to_string(),
                "-m".to_string(),
                mode_arg(mode),
                "-o".to_string(),
                owner.uid.to_string(),
                "-g".to_string(),
                owner.gid.to_string(),
                path_arg(path),
            ]))?
            .check()?;
        Ok(report(path, existed, "directory"))
    }

    /// File exists (empty when created here), and is left at `mode` owned by
    /// `owner` whether or not it already existed.
    pub fn ensure_file(&self, path: &Path, mode: u32, owner: &Account) -> Result<Applied> {
        if self.ctx.writes_directly_as(owner) {
            let existed = path.exists();
            if !existed {
                OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .with_context(|| format!("Failed to create {}", path.display()))?;
            }
            self.enforce_local(path, mode, owner)?;
            return Ok(report(path, existed, "file"));
        }

        let existed = self.exists_as(owner, path)?;
        if !existed {
            self.exec
                .run(&Cmd::new("install").args([
                    "-m".to_string(),
                    mode_arg(mode),
                    "-o".to_string(),
                    owner.uid.to_string(),
                    "-g".to_string(),
                    owner.gid.to_string(),
                    "/dev/null".to_string(),
                    path_arg(path),
                ]))?
                .check()?;
        } else {
            self.exec.run(&Cmd::new("chmod").args([mode_arg(mode), path_arg(path)]))?.check()?;
            self.exec
                .run(&Cmd::new("chown").args([owner.owner_spec(), path_arg(path)]))?
                .check()?;
        }
        Ok(report(path, existed, "file"))
    }

    /// Replace `path` with `content`. Identical content and mode is a no-op.
    pub fn write_file(
        &self,
        path: &Path,
        content: &str,
        mode: u32,
        owner: &Account,
    ) -> Result<Applied> {
        if self.ctx.writes_directly_as(owner) {
            let unchanged = fs::read_to_string(path).map(|c| c == content).unwrap_or(false)
                && fs::metadata(path).map(|m| m.mode() & 0o7777 == mode).unwrap_or(false);
            if unchanged {
                debug!("{} is up to date", path.display());
                self.enforce_local(path, mode, owner)?;
                return Ok(Applied::Unchanged);
            }

            // Write beside the target and rename over it.
            let parent = path.parent().unwrap_or_else(|| Path::new("."));
            let mut staged = tempfile::NamedTempFile::new_in(parent)
                .with_context(|| format!("Failed to stage {}", path.display()))?;
            staged.write_all(content.as_bytes())?;
            staged
                .as_file()
                .set_permissions(Permissions::from_mode(mode))?;
            if let Err(e) = staged.persist(path) {
                if !is_busy_mount(&e.error) {
                    return Err(e.error)
                        .with_context(|| format!("Failed to replace {}", path.display()));
                }
                debug!("{} is a mount point, rewriting in place", path.display());
                rewrite_in_place(path, content, mode)?;
            }
            self.enforce_local(path, mode, owner)?;
            info!("Wrote {}", path.display());
            return Ok(Applied::Changed);
        }

        if self.read_text(path, owner)?.as_deref() == Some(content) {
            debug!("{} is up to date", path.display());
            return Ok(Applied::Unchanged);
        }

        let mut staged = tempfile::NamedTempFile::new().context("Failed to stage file content")?;
        staged.write_all(content.as_bytes())?;
        staged.flush()?;
        self.exec
            .run(&Cmd::new("install").args([
                "-m".to_string(),
                mode_arg(mode),
                "-o".to_string(),
                owner.uid.to_string(),
                "-g".to_string(),
                owner.gid.to_string(),
                path_arg(staged.path()),
                path_arg(path),
            ]))?
            .check()?;
        info!("Wrote {}", path.display());
        Ok(Applied::Changed)
    }

    /// Append `text` verbatim. Ownership and mode are left as they were.
    pub fn append_text(&self, path: &Path, text: &str, owner: &Account) -> Result<()> {
        if self.ctx.writes_directly_as(owner) {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open {}", path.display()))?;
            file.write_all(text.as_bytes())?;
            return Ok(());
        }
        self.exec
            .run(&Cmd::new("tee").args(["-a".to_string(), path_arg(path)]).stdin(text))?
            .check()?;
        Ok(())
    }

    /// Package installed, refreshing the catalog first when needed.
    pub fn ensure_package(&self, package: &str) -> Result<Applied> {
        let pm = self.package_manager()?;
        if pm.is_installed(self.exec, package)? {
            debug!("{package} is already installed");
            return Ok(Applied::Unchanged);
        }
        self.refresh_packages()?;
        info!("Installing {package}...");
        self.exec.run(&pm.install_command(&[package]))?.check()?;
        Ok(Applied::Changed)
    }

    /// Repository cloned into `dest` unless `dest` already exists.
    pub fn ensure_clone(
        &self,
        url: &str,
        dest: &Path,
        owner: &Account,
        shallow: bool,
    ) -> Result<Applied> {
        if self.exists_as(owner, dest)? {
            debug!("{} already present", dest.display());
            return Ok(Applied::Unchanged);
        }
        let mut clone = Cmd::new("git").arg("clone");
        if shallow {
            clone = clone.arg("--depth=1");
        }
        info!("Cloning {url}");
        self.exec
            .run_as(owner, &clone.arg(url).arg(path_arg(dest)))?
            .check()?;
        Ok(Applied::Changed)
    }

    fn enforce_local(&self, path: &Path, mode: u32, owner: &Account) -> Result<()> {
        let meta =
            fs::metadata(path).with_context(|| format!("Failed to stat {}", path.display()))?;
        if meta.mode() & 0o7777 != mode {
            fs::set_permissions(path, Permissions::from_mode(mode))
                .with_context(|| format!("Failed to chmod {}", path.display()))?;
        }
        if self.ctx.is_root && (meta.uid() != owner.uid || meta.gid() != owner.gid) {
            self.exec
                .run(&Cmd::new("chown").args([owner.owner_spec(), path_arg(path)]))?
                .check()?;
        }
        Ok(())
    }
}

fn report(path: &Path, existed: bool, kind: &str) -> Applied {
    if existed {
        debug!("{kind} {} already present", path.display());
        Applied::Unchanged
    } else {
        info!("Created {kind} {}", path.display());
        Applied::Changed
    }
}
