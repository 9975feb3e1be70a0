//! Post-bundle plugin pipeline.
//!
//! With source maps enabled the configured plugins are split in two: those
//! that cannot carry a source map run first, in their original order, then
//! the sourcemap context opens, the compatible plugins run in their original
//! order, and the context closes.
//!
//! ```text
//! plugins:    [Y, X, Z]          (X compatible)
//! no maps:    Y, X, Z
//! with maps:  Y, Z, <open>, X, <close>
//! ```

use crate::artifact::Artifact;
use crate::config::PluginSpec;
use crate::error::{BuildError, Result};
use crate::plugin::{PluginRegistry, Processor};
use crate::sourcemap::SourceMap;
use tracing::{debug, info};

/// Plugins known to work inside a sourcemap context.
pub const SOURCEMAP_COMPATIBLE: [&str; 28] = [
    "gulp-concat",
    "gulp-group-concat",
    "gulp-rename",
    "gulp-babel",
    "gulp-amd-optimizer",
    "amd-optimize",
    "gulp-cjsx",
    "gulp-coffee",
    "gulp-dereserve",
    "gulp-es6-module-transpiler",
    "gulp-esnext",
    "gulp-espower",
    "gulp-gorilla",
    "gulp-jspm",
    "gulp-ng-annotate",
    "gulp-pure-cjs",
    "gulp-strip-ng-log",
    "gulp-sweetjs",
    "gulp-traceur",
    "gulp-transform-js-ast",
    "gulp-type",
    "gulp-uglify",
    "gulp-cirru-script",
    "gulp-typescript",
    "gulp-react",
    "gulp-regenerator",
    "gulp-requirejs-optimize",
    "gulp-wrap-js",
];

#[must_use]
pub fn is_sourcemap_compatible(name: &str) -> bool {
    SOURCEMAP_COMPATIBLE.contains(&name)
}

/// One planned pipeline step.
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Plugin(PluginSpec),
    SourcemapOpen,
    SourcemapClose,
}

impl Stage {
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::Plugin(spec) => &spec.name,
            Self::SourcemapOpen => "sourcemap-open",
            Self::SourcemapClose => "sourcemap-close",
        }
    }
}

/// Order `plugins` for execution.
#[must_use]
pub fn plan(plugins: &[PluginSpec], sourcemaps: bool) -> Vec<Stage> {
    if !sourcemaps {
        return plugins.iter().cloned().map(Stage::Plugin).collect();
    }

    let (compatible, incompatible): (Vec<_>, Vec<_>) = plugins
        .iter()
        .cloned()
        .partition(|spec| is_sourcemap_compatible(&spec.name));

    let mut stages = Vec::with_capacity(plugins.len() + 2);
    stages.extend(incompatible.into_iter().map(Stage::Plugin));
    stages.push(Stage::SourcemapOpen);
    stages.extend(compatible.into_iter().map(Stage::Plugin));
    stages.push(Stage::SourcemapClose);
    stages
}

enum Step {
    Plugin {
        spec: PluginSpec,
        processor: Box<dyn Processor>,
    },
    Open,
    Close,
}

/// Resolved, ready-to-run pipeline.
///
/// Every plugin is resolved and instantiated when the pipeline is built, so
/// a missing plugin fails before any artifact is processed.
pub struct PluginPipeline {
    steps: Vec<Step>,
}

impl PluginPipeline {
    pub fn new(plugins: &[PluginSpec], sourcemaps: bool, registry: &PluginRegistry<'_>) -> Result<Self> {
        let mut steps = Vec::new();
        for stage in plan(plugins, sourcemaps) {
            let step = match stage {
                Stage::Plugin(spec) => {
                    let factory = registry.resolve(&spec.name)?;
                    let processor = factory.instantiate(spec.options.as_ref())?;
                    Step::Plugin { spec, processor }
                }
                Stage::SourcemapOpen => Step::Open,
                Stage::SourcemapClose => Step::Close,
            };
            steps.push(step);
        }
        debug!(stages = steps.len(), "plugin pipeline ready");
        Ok(Self { steps })
    }

    /// The execution order.
    #[must_use]
    pub fn plan(&self) -> Vec<Stage> {
        self.steps
            .iter()
            .map(|step| match step {
                Step::Plugin { spec, .. } => Stage::Plugin(spec.clone()),
                Step::Open => Stage::SourcemapOpen,
                Step::Close => Stage::SourcemapClose,
            })
            .collect()
    }

    /// Run every stage over `artifact`, stopping at the first failure.
    pub fn run(&self, mut artifact: Artifact) -> std::result::Result<Artifact, BuildError> {
        for step in &self.steps {
            artifact = match step {
                Step::Plugin { spec, processor } => {
                    info!("Running {}", spec.name);
                    processor.process(artifact)?
                }
                Step::Open => {
                    info!("Running sourcemaps");
                    open_sourcemaps(artifact)?
                }
                Step::Close => close_sourcemaps(artifact),
            };
        }
        Ok(artifact)
    }
}

/// Move the inline map into `artifact.map`, starting an empty map when the
/// code carries none.
fn open_sourcemaps(mut artifact: Artifact) -> std::result::Result<Artifact, BuildError> {
    let (code, map) = SourceMap::extract_inline(&artifact.code)?;
    artifact.code = code;
    artifact.map = Some(map.unwrap_or_else(|| SourceMap::new(artifact.name.clone())));
    Ok(artifact)
}

/// Re-encode `artifact.map` as a trailing inline comment.
fn close_sourcemaps(mut artifact: Artifact) -> Artifact {
    if let Some(mut map) = artifact.map.take() {
        map.file.clone_from(&artifact.name);
        if !artifact.code.is_empty() && !artifact.code.ends_with('\n') {
            artifact.code.push('\n');
        }
        artifact.code.push_str(&map.to_inline_comment());
        artifact.code.push('\n');
    }
    artifact
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::install::NoInstall;
    use crate::registry::CapabilityRegistry;
    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn labels(stages: &[Stage]) -> Vec<&str> {
        stages.iter().map(Stage::label).collect()
    }

    fn specs(names: &[&str]) -> Vec<PluginSpec> {
        names.iter().map(|n| PluginSpec::named(*n)).collect()
    }

    #[test]
    fn compatible_set_has_28_distinct_names() {
        let unique: HashSet<_> = SOURCEMAP_COMPATIBLE.iter().collect();
        assert_eq!(unique.len(), 28);
        assert!(is_sourcemap_compatible("gulp-uglify"));
        assert!(!is_sourcemap_compatible("gulp-header"));
    }

    #[test]
    fn plan_without_sourcemaps_keeps_order() {
        let plugins = specs(&["gulp-header", "gulp-uglify", "gulp-replace"]);
        assert_eq!(
            labels(&plan(&plugins, false)),
            vec!["gulp-header", "gulp-uglify", "gulp-replace"]
        );
    }

    #[test]
    fn plan_with_sourcemaps_partitions_stably() {
        let plugins = specs(&["gulp-header", "gulp-uglify", "gulp-replace", "gulp-rename"]);
        assert_eq!(
            labels(&plan(&plugins, true)),
            vec![
                "gulp-header",
                "gulp-replace",
                "sourcemap-open",
                "gulp-uglify",
                "gulp-rename",
                "sourcemap-close"
            ]
        );
    }

    #[test]
    fn plan_with_sourcemaps_and_no_plugins_still_opens_and_closes() {
        assert_eq!(
            labels(&plan(&[], true)),
            vec!["sourcemap-open", "sourcemap-close"]
        );
        assert!(plan(&[], false).is_empty());
    }

    #[test]
    fn plan_keeps_options_with_their_plugin() {
        let plugins = vec![
            PluginSpec::with_options("gulp-header", json!({"text": "// a\n"})),
            PluginSpec::with_options("gulp-concat", json!({"name": "out.js"})),
        ];
        let stages = plan(&plugins, true);
        assert_eq!(stages[0], Stage::Plugin(plugins[0].clone()));
        assert_eq!(stages[2], Stage::Plugin(plugins[1].clone()));
    }

    fn mapped_artifact() -> Artifact {
        let mut map = SourceMap::new("main.js");
        let src = map.add_source("src/js/main.js", "a();\nb();\n");
        map.map_line(1, src, 0);
        map.map_line(3, src, 1);
        let code = format!("(prelude)\n  a();\n// note\n  b();\n{}\n", map.to_inline_comment());
        Artifact::new("main.js", code)
    }

    #[test]
    fn sourcemap_context_round_trips_through_compatible_plugins() {
        let capabilities = CapabilityRegistry::new("/nonexistent", Arc::new(NoInstall));
        let registry = PluginRegistry::new(&capabilities);
        let plugins = vec![
            PluginSpec::named("gulp-uglify"),
            PluginSpec::with_options("gulp-concat", json!({"name": "bundle.js"})),
        ];
        let pipeline = PluginPipeline::new(&plugins, true, &registry).unwrap();

        let out = pipeline.run(mapped_artifact()).unwrap();
        assert_eq!(out.name, "bundle.js");
        assert!(out.map.is_none());

        let (body, map) = SourceMap::extract_inline(&out.code).unwrap();
        assert_eq!(body, "(prelude)\na();\nb();\n");
        let map = map.unwrap();
        assert_eq!(map.file, "bundle.js");
        assert_eq!(map.lines[0], None);
        assert_eq!(map.lines[1].unwrap().source_line, 0);
        assert_eq!(map.lines[2].unwrap().source_line, 1);
    }

    #[test]
    fn open_without_inline_map_starts_empty_map() {
        let artifact = open_sourcemaps(Artifact::new("main.js", "x();\n")).unwrap();
        assert_eq!(artifact.code, "x();\n");
        assert_eq!(artifact.map, Some(SourceMap::new("main.js")));

        let closed = close_sourcemaps(artifact);
        assert!(closed.code.starts_with("x();\n//# sourceMappingURL="));
        assert!(closed.code.ends_with('\n'));
    }

    #[test]
    fn unknown_plugin_fails_before_running() {
        let capabilities = CapabilityRegistry::new("/nonexistent", Arc::new(NoInstall));
        let registry = PluginRegistry::new(&capabilities);
        let plugins = specs(&["gulp-uglify", "gulp-does-not-exist"]);
        assert!(PluginPipeline::new(&plugins, false, &registry).is_err());
    }
}
