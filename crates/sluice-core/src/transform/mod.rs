//! Per-module source transforms.
//!
//! Transform ids from the configuration are resolved once at startup into a
//! [`TransformChain`]. The bundler applies the chain to every JavaScript
//! module it reads, in configuration order, before scanning for `require`
//! calls.
//!
//! The `babelify` id is special: it is composed from the configured preset
//! list, each preset resolved on its own.

mod builtin;

pub use builtin::{Envify, Es2015Preset, StrictPreset};

use crate::error::{codes, BuildError, CapabilityKind, Result};
use crate::external::ExternalFilter;
use crate::registry::CapabilityRegistry;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Name of the composite transform built from presets.
pub const BABELIFY: &str = "babelify";

/// A source-to-source transform applied to one module.
pub trait Transform: Send + Sync {
    fn name(&self) -> &str;

    /// Transform `source`, read from `path`.
    fn apply(&self, source: &str, path: &Path) -> std::result::Result<String, BuildError>;
}

/// Ordered composition of transforms.
#[derive(Default)]
pub struct TransformChain {
    transforms: Vec<Box<dyn Transform>>,
}

impl TransformChain {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a transform; it runs after every transform already present.
    pub fn push(&mut self, transform: Box<dyn Transform>) {
        self.transforms.push(transform);
    }

    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.transforms.iter().map(|t| t.name()).collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    /// Run every transform in order. Errors are tagged with `path`.
    pub fn apply(&self, source: &str, path: &Path) -> std::result::Result<String, BuildError> {
        let mut current = source.to_string();
        for transform in &self.transforms {
            current = transform.apply(&current, path).map_err(|mut e| {
                if e.path.is_none() {
                    e.path = Some(path.display().to_string());
                }
                e
            })?;
        }
        Ok(current)
    }
}

impl std::fmt::Debug for TransformChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// `babelify`: the configured presets, applied in list order.
struct Babelify {
    presets: Vec<Box<dyn Transform>>,
}

impl Transform for Babelify {
    fn name(&self) -> &str {
        BABELIFY
    }

    fn apply(&self, source: &str, path: &Path) -> std::result::Result<String, BuildError> {
        let mut current = source.to_string();
        for preset in &self.presets {
            current = preset.apply(&current, path)?;
        }
        Ok(current)
    }
}

/// A transform or preset backed by an installed executable.
///
/// The module source is written to stdin and the module path passed as the
/// only argument.
struct ExternalTransform {
    name: String,
    filter: ExternalFilter,
}

impl Transform for ExternalTransform {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, source: &str, path: &Path) -> std::result::Result<String, BuildError> {
        let path_arg = path.display().to_string();
        self.filter.run(source, &[&path_arg]).map_err(|msg| {
            BuildError::new(codes::BUILD_TRANSFORM_ERROR, format!("{}: {msg}", self.name))
        })
    }
}

/// Resolves transform and preset ids to configured transforms.
pub struct TransformResolver<'a> {
    registry: &'a CapabilityRegistry,
    variables: BTreeMap<String, String>,
}

impl<'a> TransformResolver<'a> {
    /// A resolver whose `envify` sees the process environment, with
    /// `NODE_ENV` forced to `environment`.
    pub fn new(registry: &'a CapabilityRegistry, environment: &str) -> Self {
        let mut variables: BTreeMap<String, String> = std::env::vars().collect();
        variables.insert(crate::config::ENVIRONMENT_VAR.to_string(), environment.to_string());
        Self {
            registry,
            variables,
        }
    }

    /// Replace the variables visible to `envify`.
    #[must_use]
    pub fn with_variables(mut self, variables: BTreeMap<String, String>) -> Self {
        self.variables = variables;
        self
    }

    /// Resolve one transform id. `presets` is only consulted for `babelify`.
    pub fn resolve(&self, id: &str, presets: &[String]) -> Result<Box<dyn Transform>> {
        if id == BABELIFY {
            let presets = presets
                .iter()
                .map(|preset| self.resolve_preset(preset))
                .collect::<Result<Vec<_>>>()?;
            return Ok(Box::new(Babelify { presets }));
        }

        if let Some(transform) = builtin::transform(id, &self.variables) {
            return Ok(transform);
        }
        let bin = self.registry.locate(CapabilityKind::Transform, id)?;
        Ok(self.external(id, bin))
    }

    fn resolve_preset(&self, id: &str) -> Result<Box<dyn Transform>> {
        if let Some(preset) = builtin::preset(id) {
            return Ok(preset);
        }
        let bin = self.registry.locate(CapabilityKind::Preset, id)?;
        Ok(self.external(id, bin))
    }

    fn external(&self, id: &str, bin: std::path::PathBuf) -> Box<dyn Transform> {
        debug!(transform = id, bin = %bin.display(), "external transform");
        Box::new(ExternalTransform {
            name: id.to_string(),
            filter: ExternalFilter::new(bin, self.registry.project_root()),
        })
    }
}

/// Composes the configured transform list into one [`TransformChain`].
pub struct TransformChainBuilder<'a> {
    resolver: TransformResolver<'a>,
}

impl<'a> TransformChainBuilder<'a> {
    pub fn new(resolver: TransformResolver<'a>) -> Self {
        Self { resolver }
    }

    /// Resolve every id in order. The first failure aborts the build.
    pub fn build(&self, transforms: &[String], presets: &[String]) -> Result<TransformChain> {
        let mut chain = TransformChain::new();
        for id in transforms {
            chain.push(self.resolver.resolve(id, presets)?);
        }
        debug!(chain = ?chain, "transform chain ready");
        Ok(chain)
    }
}
