//! On-demand package installation.

use std::path::Path;
use std::process::{Command, Stdio};
use tracing::info;

/// Installs a missing package into the project.
pub trait Installer: Send + Sync {
    /// Install `package` as a development dependency of `project_root`.
    fn install(&self, package: &str, project_root: &Path) -> Result<(), String>;
}

/// Runs `npm install <package> --save-dev`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NpmInstaller;

impl Installer for NpmInstaller {
    fn install(&self, package: &str, project_root: &Path) -> Result<(), String> {
        let npm = which::which("npm").map_err(|e| format!("npm not found: {e}"))?;
        info!(package, "Installing");

        let output = Command::new(npm)
            .args(["install", package, "--save-dev"])
            .current_dir(project_root)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| format!("failed to run npm: {e}"))?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(format!("npm install {package} failed: {}", stderr.trim()))
        }
    }
}

/// Refuses every installation; used with `--offline` and in tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoInstall;

impl Installer for NoInstall {
    fn install(&self, package: &str, _project_root: &Path) -> Result<(), String> {
        Err(format!("{package} is not installed and installation is disabled"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_install_always_fails() {
        let err = NoInstall.install("gulp-x", Path::new("/")).unwrap_err();
        assert!(err.contains("gulp-x"));
    }
}
