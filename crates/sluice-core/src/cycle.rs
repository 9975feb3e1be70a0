//! One build cycle: bundle, run plugins, write, announce.

use crate::artifact::Artifact;
use crate::bundler::Bundler;
use crate::config::BuildConfiguration;
use crate::error::{Error, Result};
use crate::pipeline::PluginPipeline;
use crate::plugin::PluginRegistry;
use crate::reload::{ReloadChannel, ReloadMessage};
use crate::transform::{TransformChain, TransformChainBuilder, TransformResolver};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

/// Result of one cycle as seen by the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Built {
        path: PathBuf,
        bytes: usize,
        /// blake3 of the written artifact.
        hash: String,
        duration: Duration,
    },
    Failed {
        message: String,
    },
}

impl CycleOutcome {
    #[must_use]
    pub fn is_built(&self) -> bool {
        matches!(self, Self::Built { .. })
    }
}

/// Everything resolved at startup that a cycle needs.
///
/// Built once per process; each cycle reads sources afresh.
pub struct Session {
    config: Arc<BuildConfiguration>,
    chain: TransformChain,
    pipeline: PluginPipeline,
    reload: ReloadChannel,
}

impl Session {
    /// Resolve the transform chain and plugin pipeline for `config`.
    ///
    /// Fails on the first transform, preset or plugin that cannot be
    /// obtained.
    pub fn prepare(
        config: BuildConfiguration,
        plugins: &PluginRegistry<'_>,
        reload: ReloadChannel,
    ) -> Result<Self> {
        let resolver = TransformResolver::new(plugins.capabilities(), &config.environment);
        let chain = TransformChainBuilder::new(resolver).build(&config.transforms, &config.presets)?;
        let pipeline = PluginPipeline::new(&config.plugins, config.sourcemaps, plugins)?;
        Ok(Self::new(config, chain, pipeline, reload))
    }

    #[must_use]
    pub fn new(
        config: BuildConfiguration,
        chain: TransformChain,
        pipeline: PluginPipeline,
        reload: ReloadChannel,
    ) -> Self {
        Self {
            config: Arc::new(config),
            chain,
            pipeline,
            reload,
        }
    }

    #[must_use]
    pub fn config(&self) -> &BuildConfiguration {
        &self.config
    }

    #[must_use]
    pub fn chain(&self) -> &TransformChain {
        &self.chain
    }

    #[must_use]
    pub fn pipeline(&self) -> &PluginPipeline {
        &self.pipeline
    }

    #[must_use]
    pub fn reload(&self) -> &ReloadChannel {
        &self.reload
    }

    /// Bundle the entry and run the plugin pipeline, without writing.
    pub fn produce(&self) -> Result<Artifact> {
        let bundled = Bundler::new(&self.chain)
            .sourcemaps(self.config.sourcemaps)
            .relative_to(&self.config.project_root)
            .bundle(&self.config.entry_path())?;
        Ok(self.pipeline.run(bundled)?)
    }

    /// Run one full cycle.
    ///
    /// Nothing is written unless every stage succeeds. `Reload` is broadcast
    /// only after the artifact is on disk.
    pub fn cycle(&self) -> Result<CycleOutcome> {
        let start = Instant::now();
        let artifact = self.produce()?;

        let path = self.config.output_dir().join(&artifact.name);
        let bytes = artifact.code.as_bytes();
        sluice_util::fs::write_artifact(&path, bytes).map_err(|e| Error::io(&path, e))?;
        let hash = sluice_util::hash::fingerprint(bytes);
        let duration = start.elapsed();

        info!(
            path = %path.display(),
            bytes = bytes.len(),
            hash = %sluice_util::hash::short_fingerprint(bytes),
            duration_ms = duration.as_millis() as u64,
            "Built"
        );
        self.reload.send(ReloadMessage::Reload { path: path.clone() });

        Ok(CycleOutcome::Built {
            path,
            bytes: bytes.len(),
            hash,
            duration,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PluginSpec;
    use crate::install::NoInstall;
    use crate::registry::CapabilityRegistry;
    use serde_json::json;
    use std::fs;

    fn project() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let js = dir.path().join("src/js");
        fs::create_dir_all(&js).unwrap();
        fs::write(js.join("main.js"), "var m = require('./m');\nm();\n").unwrap();
        fs::write(js.join("m.js"), "module.exports = function () {};\n").unwrap();
        dir
    }

    fn session(config: BuildConfiguration) -> Session {
        let capabilities = CapabilityRegistry::new(&config.project_root, Arc::new(NoInstall));
        let registry = PluginRegistry::new(&capabilities);
        Session::prepare(config, &registry, ReloadChannel::new()).unwrap()
    }

    #[tokio::test]
    async fn cycle_writes_artifact_then_broadcasts() {
        let dir = project();
        let session = session(BuildConfiguration::new(dir.path(), "main.js"));
        let mut rx = session.reload().subscribe();

        let outcome = session.cycle().unwrap();
        let CycleOutcome::Built { path, bytes, hash, .. } = outcome else {
            panic!("expected a built outcome");
        };
        assert_eq!(path, dir.path().join("dist/js/main.js"));
        let written = fs::read(&path).unwrap();
        assert_eq!(written.len(), bytes);
        assert_eq!(hash, sluice_util::hash::fingerprint(&written));
        assert_eq!(rx.recv().await.unwrap(), ReloadMessage::Reload { path });
    }

    #[test]
    fn renamed_artifact_is_written_under_new_name() {
        let dir = project();
        let config = BuildConfiguration::new(dir.path(), "main.js").with_plugins(vec![
            PluginSpec::with_options("gulp-rename", json!({"suffix": ".min"})),
        ]);
        let outcome = session(config).cycle().unwrap();
        assert!(matches!(
            outcome,
            CycleOutcome::Built { ref path, .. } if path.ends_with("dist/js/main.min.js")
        ));
    }

    #[test]
    fn configured_environment_and_presets_reach_the_chain() {
        let dir = project();
        fs::write(
            dir.path().join("src/js/main.js"),
            "const mode = process.env.NODE_ENV;\nlet m = require('./m');\n",
        )
        .unwrap();
        let config = BuildConfiguration::new(dir.path(), "main.js")
            .with_environment("production")
            .with_transforms(vec!["babelify".to_string(), "envify".to_string()])
            .with_presets(vec!["es2015".to_string()]);

        let outcome = session(config).cycle().unwrap();
        assert!(outcome.is_built());
        let code = fs::read_to_string(dir.path().join("dist/js/main.js")).unwrap();
        assert!(code.contains("var mode = \"production\";"), "{code}");
        assert!(code.contains("var m = require('./m');"), "{code}");
    }

    #[test]
    fn failed_cycle_writes_nothing() {
        let dir = project();
        let session = session(BuildConfiguration::new(dir.path(), "main.js"));
        fs::write(dir.path().join("src/js/main.js"), "require('./missing');\n").unwrap();

        let err = session.cycle().unwrap_err();
        assert!(err.is_recoverable());
        assert!(!dir.path().join("dist").exists());
    }

    #[test]
    fn unresolvable_transform_fails_prepare() {
        let dir = project();
        let config = BuildConfiguration::new(dir.path(), "main.js")
            .with_transforms(vec!["coffeeify".to_string()]);
        let capabilities = CapabilityRegistry::new(dir.path(), Arc::new(NoInstall));
        let registry = PluginRegistry::new(&capabilities);
        let err = Session::prepare(config, &registry, ReloadChannel::new()).err().unwrap();
        assert!(!err.is_recoverable());
    }
}
