//! Capability lookup shared by transforms, presets and plugins.
//!
//! Callers consult their built-in catalog first. Whatever it lacks is looked
//! up as an executable installed under `node_modules/.bin`, then installed on
//! demand and looked up once more. Failure of every strategy is a resolution
//! error.

use crate::error::{CapabilityKind, Error, Result};
use crate::external::bin_path;
use crate::install::Installer;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

pub struct CapabilityRegistry {
    project_root: PathBuf,
    installer: Arc<dyn Installer>,
}

impl CapabilityRegistry {
    pub fn new(project_root: impl Into<PathBuf>, installer: Arc<dyn Installer>) -> Self {
        Self {
            project_root: project_root.into(),
            installer,
        }
    }

    #[must_use]
    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// npm package providing `name`. Presets follow babel's naming.
    #[must_use]
    pub fn package_name(kind: CapabilityKind, name: &str) -> String {
        match kind {
            CapabilityKind::Preset if !name.starts_with("babel-preset-") => {
                format!("babel-preset-{name}")
            }
            _ => name.to_string(),
        }
    }

    /// Path of the executable providing `name`, installing it if needed.
    pub fn locate(&self, kind: CapabilityKind, name: &str) -> Result<PathBuf> {
        let package = Self::package_name(kind, name);
        let bin = bin_path(&self.project_root, &package);
        if bin.is_file() {
            debug!(kind = %kind, name, bin = %bin.display(), "found installed executable");
            return Ok(bin);
        }

        self.installer
            .install(&package, &self.project_root)
            .map_err(|reason| Error::resolution(kind, name, reason))?;

        if bin.is_file() {
            Ok(bin)
        } else {
            Err(Error::resolution(
                kind,
                name,
                format!(
                    "{package} installed, but it ships no command-line filter ({} not found); \
                     only packages with a stdin-to-stdout executable can be used here",
                    bin.display()
                ),
            ))
        }
    }
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("project_root", &self.project_root)
            .finish_non_exhaustive()
    }
}
