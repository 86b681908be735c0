use std::fs;
use std::path::Path;

/// What the host reports about itself. Unknown values are empty strings and
/// downstream steps treat them as "skip distro-specific logic".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Platform {
    pub os: String,
    pub arch: String,
    pub distro: String,
}

impl Platform {
    /// Read kernel name and machine from `uname(2)` and, on Linux, the
    /// distribution id from `<sysroot>/etc/os-release`.
    pub fn detect(sysroot: &Path) -> Self {
        let (os, arch) = match nix::sys::utsname::uname() {
            Ok(uts) => (
                uts.sysname().to_string_lossy().into_owned(),
                uts.machine().to_string_lossy().into_owned(),
            ),
            Err(_) => (String::new(), String::new()),
        };

        let distro = if os == "Linux" {
            fs::read_to_string(sysroot.join("etc/os-release"))
                .ok()
                .and_then(|content| os_release_id(&content))
                .unwrap_or_default()
        } else {
            String::new()
        };

        Self { os, arch, distro }
    }

    pub fn is_linux(&self) -> bool {
        self.os == "Linux"
    }
}

/// Pull `ID=` out of an os-release document, unquoted and lowercased.
pub fn os_release_id(content: &str) -> Option<String> {
    content.lines().find_map(|line| {
        let value = line.trim().strip_prefix("ID=")?;
        let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
        if value.is_empty() {
            None
        } else {
            Some(value.to_ascii_lowercase())
        }
    })
}

/// Current hostname, or an empty string when it cannot be read.
pub fn current_hostname() -> String {
    nix::unistd::gethostname()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// The runtime installer flavours we know how to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeArch {
    X86_64,
    Aarch64,
}

impl RuntimeArch {
    /// Map a `uname -m` style string onto a supported class. Anything else is
    /// unsupported and the runtime step skips itself.
    pub fn from_machine(machine: &str) -> Option<Self> {
        match machine {
            "x86_64" | "amd64" => Some(Self::X86_64),
            "aarch64" | "arm64" => Some(Self::Aarch64),
            _ => None,
        }
    }

    pub fn installer_suffix(self) -> &'static str {
        match self {
            Self::X86_64 => "x86_64",
            Self::Aarch64 => "aarch64",
        }
    }
}
