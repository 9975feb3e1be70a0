pub mod build;
pub mod plan;
pub mod watch;

use serde::Serialize;
use sluice_core::{
    BuildConfiguration, CapabilityRegistry, Error, Installer, NoInstall, NpmInstaller,
    PluginRegistry, ReloadChannel, Session,
};
use std::path::PathBuf;
use std::sync::Arc;

/// Settings shared by every command.
#[derive(Debug, Clone)]
pub struct Project {
    pub cwd: PathBuf,
    pub config: Option<PathBuf>,
    pub environment: String,
    pub offline: bool,
}

impl Project {
    pub fn load(&self) -> Result<BuildConfiguration, Error> {
        BuildConfiguration::load(&self.cwd, self.config.as_deref(), &self.environment)
    }

    pub fn capabilities(&self) -> CapabilityRegistry {
        let installer: Arc<dyn Installer> = if self.offline {
            Arc::new(NoInstall)
        } else {
            Arc::new(NpmInstaller)
        };
        CapabilityRegistry::new(&self.cwd, installer)
    }

    /// Load the configuration and resolve everything a cycle needs.
    pub fn prepare(&self, reload: ReloadChannel) -> Result<Session, Error> {
        let config = self.load()?;
        let capabilities = self.capabilities();
        let registry = PluginRegistry::new(&capabilities);
        Session::prepare(config, &registry, reload)
    }
}

/// Error shape for `--json` output.
#[derive(Serialize)]
pub struct ErrorJson {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl From<&Error> for ErrorJson {
    fn from(err: &Error) -> Self {
        let code = match err {
            Error::Build(build) => build.code,
            Error::ConfigRead { .. }
            | Error::ConfigParse { .. }
            | Error::UnknownEnvironment { .. }
            | Error::Config(_) => "CONFIG_ERROR",
            Error::Resolution { .. } => "RESOLUTION_ERROR",
            Error::Watch(_) => "WATCH_ERROR",
            Error::Io { .. } => "IO_ERROR",
        };
        let (message, path) = match err {
            Error::Build(build) => (build.message.clone(), build.path.clone()),
            Error::Io { path, source } => (source.to_string(), Some(path.display().to_string())),
            other => (other.to_string(), None),
        };
        Self {
            code: code.to_string(),
            message,
            path,
        }
    }
}

#[derive(Serialize)]
struct FailureJson {
    ok: bool,
    error: ErrorJson,
}

/// Print `err` and exit with status 1.
pub fn fail(err: &Error, json: bool) -> ! {
    if json {
        let failure = FailureJson {
            ok: false,
            error: ErrorJson::from(err),
        };
        println!("{}", serde_json::to_string(&failure).unwrap_or_default());
    } else {
        eprintln!("error: {err}");
    }
    std::process::exit(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_core::error::{codes, CapabilityKind};
    use sluice_core::BuildError;

    #[test]
    fn build_errors_keep_their_code_and_path() {
        let err = Error::from(
            BuildError::new(codes::BUILD_ENTRY_NOT_FOUND, "Entry not found").at("/p/src/js/main.js"),
        );
        let json = ErrorJson::from(&err);
        assert_eq!(json.code, "BUILD_ENTRY_NOT_FOUND");
        assert_eq!(json.message, "Entry not found");
        assert_eq!(json.path.as_deref(), Some("/p/src/js/main.js"));
    }

    #[test]
    fn startup_errors_map_to_categories() {
        let err = Error::resolution(CapabilityKind::Plugin, "gulp-x", "not installed");
        assert_eq!(ErrorJson::from(&err).code, "RESOLUTION_ERROR");
        assert_eq!(ErrorJson::from(&Error::config("bad")).code, "CONFIG_ERROR");
    }

    #[test]
    fn offline_projects_never_install() {
        let project = Project {
            cwd: PathBuf::from("/nonexistent"),
            config: None,
            environment: "development".to_string(),
            offline: true,
        };
        let err = project
            .capabilities()
            .locate(CapabilityKind::Plugin, "gulp-x")
            .unwrap_err();
        assert!(err.to_string().contains("installation is disabled"), "{err}");
    }
}
