//! Build metadata embedded by `build.rs`.

use std::fmt;

/// Package version from Cargo.toml.
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

const UNKNOWN: &str = "unknown";

/// Where and from what this binary was built.
///
/// Fields fall back to `"unknown"` when the build ran outside a git
/// checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildInfo {
    pub version: &'static str,
    pub branch: &'static str,
    pub sha: &'static str,
    pub dirty: bool,
    pub target: &'static str,
    pub built_at: &'static str,
}

impl BuildInfo {
    pub fn current() -> Self {
        Self {
            version: PKG_VERSION,
            branch: or_unknown(option_env!("VERGEN_GIT_BRANCH")),
            sha: or_unknown(option_env!("VERGEN_GIT_SHA")),
            dirty: option_env!("VERGEN_GIT_DIRTY") == Some("true"),
            target: or_unknown(option_env!("VERGEN_CARGO_TARGET_TRIPLE")),
            built_at: or_unknown(option_env!("VERGEN_BUILD_TIMESTAMP")),
        }
    }

    /// Abbreviated commit, at most seven characters.
    pub fn short_sha(&self) -> &'static str {
        &self.sha[..self.sha.len().min(7)]
    }
}

const fn or_unknown(value: Option<&'static str>) -> &'static str {
    match value {
        Some(v) => v,
        None => UNKNOWN,
    }
}

/// `{version}+{branch}.{sha}[.dirty]`, e.g. `0.1.0+main.abc1234`.
impl fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{}.{}", self.version, self.branch, self.short_sha())?;
        if self.dirty {
            f.write_str(".dirty")?;
        }
        Ok(())
    }
}

/// Full version string for `--version` output and startup logs.
pub fn version_string() -> String {
    BuildInfo::current().to_string()
}
