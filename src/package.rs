//! Package manager families, probed in a fixed order.

use crate::error::ProvisionError;
use crate::exec::{has_command, Cmd, Executor};
use anyhow::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Apt,
    Dnf,
    Pacman,
    Apk,
}

impl PackageManager {
    const PROBE_ORDER: [(Self, &'static str); 4] = [
        (Self::Apt, "apt-get"),
        (Self::Dnf, "dnf"),
        (Self::Pacman, "pacman"),
        (Self::Apk, "apk"),
    ];

    /// First family whose binary is on `PATH`.
    pub fn detect(exec: &dyn Executor) -> Result<Self> {
        for (pm, binary) in Self::PROBE_ORDER {
            if has_command(exec, binary)? {
                return Ok(pm);
            }
        }
        Err(ProvisionError::NoPackageManager.into())
    }

    /// Catalog refresh, or `None` where installs refresh on their own.
    pub fn refresh_command(self) -> Option<Cmd> {
        match self {
            Self::Apt => Some(
                Cmd::new("apt-get")
                    .args(["update", "-qq"])
                    .env("DEBIAN_FRONTEND", "noninteractive"),
            ),
            Self::Dnf => None,
            Self::Pacman => Some(Cmd::new("pacman").args(["-Sy", "--noconfirm"])),
            Self::Apk => Some(Cmd::new("apk").arg("update")),
        }
    }

    pub fn install_command(self, packages: &[&str]) -> Cmd {
        let cmd = match self {
            Self::Apt => Cmd::new("apt-get")
                .args(["install", "-y", "-qq"])
                .env("DEBIAN_FRONTEND", "noninteractive"),
            Self::Dnf => Cmd::new("dnf").args(["install", "-y", "-q"]),
            Self::Pacman => Cmd::new("pacman").args(["-S", "--needed", "--noconfirm"]),
            Self::Apk => Cmd::new("apk").args(["add", "--no-cache"]),
        };
        cmd.args(packages.iter().copied())
    }

    /// A command that exits 0 exactly when `package` is installed.
    pub fn query_command(self, package: &str) -> Cmd {
        match self {
            Self::Apt => Cmd::new("dpkg").args(["-s", package]),
            Self::Dnf => Cmd::new("rpm").args(["-q", package]),
            Self::Pacman => Cmd::new("pacman").args(["-Qi", package]),
            Self::Apk => Cmd::new("apk").args(["info", "-e", package]),
        }
    }

    pub fn upgrade_command(self) -> Cmd {
        match self {
            Self::Apt => Cmd::new("apt-get")
                .args(["upgrade", "-y"])
                .env("DEBIAN_FRONTEND", "noninteractive"),
            Self::Dnf => Cmd::new("dnf").args(["upgrade", "-y"]),
            Self::Pacman => Cmd::new("pacman").args(["-Syu", "--noconfirm"]),
            Self::Apk => Cmd::new("apk").arg("upgrade"),
        }
        .passthrough()
    }

    pub fn is_installed(self, exec: &dyn Executor, package: &str) -> Result<bool> {
        Ok(exec.query(&self.query_command(package))?.success())
    }

    /// Group whose members may escalate with sudo.
    pub fn admin_group(self) -> &'static str {
        match self {
            Self::Apt => "sudo",
            Self::Dnf | Self::Pacman | Self::Apk => "wheel",
        }
    }
}
