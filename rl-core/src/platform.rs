//! Platform-specific directory lookup.

use std::path::PathBuf;

use crate::constants::APP_NAME;
use crate::error::{RlError, RlResult};

/// Detected operating system platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    MacOs,
    Linux,
}

impl Platform {
    /// Detect the current platform at compile time.
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else {
            Platform::Linux
        }
    }

    /// Application data directory (logs live here).
    ///
    /// - Windows: `%APPDATA%/RocketLink`
    /// - macOS: `~/Library/Application Support/RocketLink`
    /// - Linux: `~/.local/share/RocketLink`
    pub fn data_dir() -> RlResult<PathBuf> {
        let base = dirs::data_dir()
            .ok_or_else(|| RlError::Config("could not determine data directory".into()))?;
        Ok(base.join(APP_NAME))
    }

    /// Application configuration directory.
    ///
    /// - Linux: `~/.config/RocketLink`
    pub fn config_dir() -> RlResult<PathBuf> {
        let base = dirs::config_dir()
            .ok_or_else(|| RlError::Config("could not determine config directory".into()))?;
        Ok(base.join(APP_NAME))
    }

    /// Human-readable platform name.
    pub fn name(&self) -> &'static str {
        match self {
            Platform::Windows => "Windows",
            Platform::MacOs => "macOS",
            Platform::Linux => "Linux",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_detection() {
        let p = Platform::current();
        assert!(matches!(p, Platform::Windows | Platform::MacOs | Platform::Linux));
    }

    #[test]
    fn test_dirs_are_namespaced() {
        if let Ok(dir) = Platform::config_dir() {
            assert!(dir.ends_with(APP_NAME));
        }
    }
}
