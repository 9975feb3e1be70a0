//! Post-bundle plugins.
//!
//! A plugin name resolves to a [`ProcessorFactory`]; the factory is called
//! once with that plugin's own options to produce the [`Processor`] the
//! pipeline runs on every cycle.
//!
//! ## Example
//!
//! ```ignore
//! use sluice_core::plugin::{PluginRegistry, Processor};
//!
//! let registry = PluginRegistry::new(&capabilities);
//! let factory = registry.resolve("gulp-concat")?;
//! let concat = factory.instantiate(Some(&json!({"name": "all.js"})))?;
//! let artifact = concat.process(artifact)?;
//! ```

mod builtin;

use crate::artifact::Artifact;
use crate::error::{codes, BuildError, CapabilityKind, Result};
use crate::external::ExternalFilter;
use crate::registry::CapabilityRegistry;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// A configured post-bundle stage.
pub trait Processor: Send + Sync {
    /// Plugin name for logs and error messages.
    fn name(&self) -> &str;

    /// Transform the artifact.
    ///
    /// Inside a sourcemap context `artifact.map` holds the decoded map and
    /// processors that move lines must keep it aligned.
    fn process(&self, artifact: Artifact) -> std::result::Result<Artifact, BuildError>;
}

/// Creates processors from a plugin's options.
pub trait ProcessorFactory: Send + Sync {
    /// `None` means the plugin is invoked with no arguments.
    fn instantiate(&self, options: Option<&Value>) -> Result<Box<dyn Processor>>;
}

impl<F> ProcessorFactory for F
where
    F: Fn(Option<&Value>) -> Result<Box<dyn Processor>> + Send + Sync,
{
    fn instantiate(&self, options: Option<&Value>) -> Result<Box<dyn Processor>> {
        self(options)
    }
}

/// Resolves plugin names to factories.
///
/// Lookup order: explicitly registered factories, the built-in catalog,
/// then an executable located (or installed) through the capability
/// registry.
pub struct PluginRegistry<'a> {
    capabilities: &'a CapabilityRegistry,
    registered: HashMap<String, Arc<dyn ProcessorFactory>>,
}

impl<'a> PluginRegistry<'a> {
    pub fn new(capabilities: &'a CapabilityRegistry) -> Self {
        Self {
            capabilities,
            registered: HashMap::new(),
        }
    }

    #[must_use]
    pub fn capabilities(&self) -> &'a CapabilityRegistry {
        self.capabilities
    }

    /// Register a factory under `name`, shadowing any built-in.
    pub fn register(&mut self, name: impl Into<String>, factory: Arc<dyn ProcessorFactory>) {
        self.registered.insert(name.into(), factory);
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn ProcessorFactory>> {
        if let Some(factory) = self.registered.get(name) {
            return Ok(Arc::clone(factory));
        }
        if let Some(factory) = builtin::factory(name) {
            debug!(plugin = name, "using built-in plugin");
            return Ok(factory);
        }

        let bin = self.capabilities.locate(CapabilityKind::Plugin, name)?;
        debug!(plugin = name, bin = %bin.display(), "using external plugin");
        Ok(Arc::new(ExternalFactory {
            name: name.to_string(),
            filter: ExternalFilter::new(bin, self.capabilities.project_root()),
        }))
    }
}

/// Plugin backed by an installed executable.
///
/// The code is piped through the program; options, when present, are passed
/// as a single JSON argument.
struct ExternalFactory {
    name: String,
    filter: ExternalFilter,
}

impl ProcessorFactory for ExternalFactory {
    fn instantiate(&self, options: Option<&Value>) -> Result<Box<dyn Processor>> {
        let mut filter = self.filter.clone();
        if let Some(options) = options {
            filter = filter.arg(options.to_string());
        }
        Ok(Box::new(ExternalProcessor {
            name: self.name.clone(),
            filter,
        }))
    }
}

struct ExternalProcessor {
    name: String,
    filter: ExternalFilter,
}

impl Processor for ExternalProcessor {
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&self, mut artifact: Artifact) -> std::result::Result<Artifact, BuildError> {
        artifact.code = self
            .filter
            .run(&artifact.code, &[])
            .map_err(|msg| BuildError::new(codes::PLUGIN_ERROR, format!("{}: {msg}", self.name)))?;
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::install::NoInstall;
    use serde_json::json;

    struct Tag(String);

    impl Processor for Tag {
        fn name(&self) -> &str {
            "tag"
        }

        fn process(&self, mut artifact: Artifact) -> std::result::Result<Artifact, BuildError> {
            artifact.code.push_str(&self.0);
            Ok(artifact)
        }
    }

    fn capabilities() -> CapabilityRegistry {
        CapabilityRegistry::new("/nonexistent", Arc::new(NoInstall))
    }

    #[test]
    fn registered_factories_shadow_builtins() {
        let capabilities = capabilities();
        let mut registry = PluginRegistry::new(&capabilities);
        let factory = |options: Option<&Value>| -> Result<Box<dyn Processor>> {
            Ok(Box::new(Tag(options.map_or_else(String::new, Value::to_string))))
        };
        registry.register("gulp-concat", Arc::new(factory));

        let processor = registry
            .resolve("gulp-concat")
            .unwrap()
            .instantiate(Some(&json!({"name": "x"})))
            .unwrap();
        let out = processor.process(Artifact::new("a.js", "")).unwrap();
        assert_eq!(out.code, r#"{"name":"x"}"#);
    }

    #[test]
    fn builtins_resolve_without_installing() {
        let capabilities = capabilities();
        let registry = PluginRegistry::new(&capabilities);
        for name in [
            "gulp-concat",
            "gulp-rename",
            "gulp-uglify",
            "gulp-header",
            "gulp-footer",
            "gulp-replace",
            "gulp-strip-debug",
        ] {
            assert!(registry.resolve(name).is_ok(), "{name}");
        }
    }

    #[test]
    fn unknown_plugin_is_resolution_error() {
        let capabilities = capabilities();
        let registry = PluginRegistry::new(&capabilities);
        let err = registry.resolve("gulp-imaginary").err().unwrap();
        assert!(matches!(err, Error::Resolution { kind: CapabilityKind::Plugin, .. }));
    }

    #[cfg(unix)]
    #[test]
    fn external_plugin_receives_options_as_json() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let bin = crate::external::bin_path(dir.path(), "gulp-echo");
        std::fs::create_dir_all(bin.parent().unwrap()).unwrap();
        std::fs::write(&bin, "#!/bin/sh\ncat\nprintf '%s' \"$1\"\n").unwrap();
        std::fs::set_permissions(&bin, std::fs::Permissions::from_mode(0o755)).unwrap();

        let capabilities = CapabilityRegistry::new(dir.path(), Arc::new(NoInstall));
        let registry = PluginRegistry::new(&capabilities);
        let factory = registry.resolve("gulp-echo").unwrap();

        let with = factory.instantiate(Some(&json!({"level": 2}))).unwrap();
        let out = with.process(Artifact::new("a.js", "code;")).unwrap();
        assert_eq!(out.code, r#"code;{"level":2}"#);

        let without = factory.instantiate(None).unwrap();
        let out = without.process(Artifact::new("a.js", "code;")).unwrap();
        assert_eq!(out.code, "code;");
    }
}
