//! Build configuration.
//!
//! The configuration file is a YAML mapping keyed by environment name. Only
//! the selected environment is deserialized; the result is an immutable
//! [`BuildConfiguration`] shared by reference with every component.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Default configuration file name, looked up in the project root.
pub const CONFIG_FILE: &str = "sluice.yml";

/// Environment variable consulted when no `--env` flag is given.
pub const ENVIRONMENT_VAR: &str = "NODE_ENV";

/// Environment used when neither the flag nor the variable is set.
pub const DEFAULT_ENVIRONMENT: &str = "development";

/// Pick the environment name: explicit flag, then variable, then default.
///
/// Empty values count as unset.
pub fn resolve_environment(
    flag: Option<&str>,
    lookup: impl Fn(&str) -> Option<String>,
) -> String {
    flag.filter(|f| !f.is_empty())
        .map(str::to_string)
        .or_else(|| lookup(ENVIRONMENT_VAR).filter(|v| !v.is_empty()))
        .unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string())
}

/// [`resolve_environment`] against the process environment.
#[must_use]
pub fn environment_from_process(flag: Option<&str>) -> String {
    resolve_environment(flag, |key| std::env::var(key).ok())
}

/// A configured post-bundle plugin: a name and at most one options mapping.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawPluginSpec")]
pub struct PluginSpec {
    pub name: String,
    pub options: Option<serde_json::Value>,
}

impl PluginSpec {
    /// A plugin invoked with no arguments.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: None,
        }
    }

    /// A plugin invoked with exactly `options`.
    pub fn with_options(name: impl Into<String>, options: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            options: Some(options),
        }
    }
}

/// YAML shape of a plugin entry: `- gulp-uglify` or `- gulp-concat: { name: out.js }`.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawPluginSpec {
    Name(String),
    Mapping(BTreeMap<String, serde_json::Value>),
}

impl TryFrom<RawPluginSpec> for PluginSpec {
    type Error = String;

    fn try_from(raw: RawPluginSpec) -> std::result::Result<Self, Self::Error> {
        match raw {
            RawPluginSpec::Name(name) if name.trim().is_empty() => {
                Err("plugin name must not be empty".to_string())
            }
            RawPluginSpec::Name(name) => Ok(Self::named(name)),
            RawPluginSpec::Mapping(map) => {
                let keys: Vec<_> = map.keys().cloned().collect();
                let mut entries = map.into_iter();
                let (Some((name, options)), None) = (entries.next(), entries.next()) else {
                    return Err(format!(
                        "plugin entry must have exactly one name, found [{}]",
                        keys.join(", ")
                    ));
                };
                // `- gulp-uglify:` (null options) means "call with no arguments".
                let options = (!options.is_null()).then_some(options);
                Ok(Self { name, options })
            }
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnvironmentSection {
    directory_structure: DirectoryStructure,
    script_options: ScriptOptions,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DirectoryStructure {
    source_root: PathBuf,
    distribution_root: PathBuf,
    scripts_folder: String,
    #[serde(default)]
    styles_folder: Option<String>,
    #[serde(default)]
    images_folder: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ScriptOptions {
    browserify: BrowserifyOptions,
    #[serde(default)]
    babelify: BabelifyOptions,
    #[serde(default)]
    plugins: Vec<PluginSpec>,
    #[serde(default)]
    sourcemaps: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BrowserifyOptions {
    entry_file: String,
    #[serde(default)]
    transform: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct BabelifyOptions {
    #[serde(default)]
    presets: Vec<String>,
}

/// Resolved, immutable configuration for one process run.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildConfiguration {
    /// Selected environment name.
    pub environment: String,
    /// Directory that relative roots are resolved against.
    pub project_root: PathBuf,
    pub source_root: PathBuf,
    pub distribution_root: PathBuf,
    pub scripts_folder: String,
    pub styles_folder: Option<String>,
    pub images_folder: Option<String>,
    /// Entry module, relative to `source_root/scripts_folder`.
    pub entry_file: String,
    /// Ordered per-module transforms.
    pub transforms: Vec<String>,
    /// Ordered presets for the `babelify` transform.
    pub presets: Vec<String>,
    /// Ordered post-bundle plugins.
    pub plugins: Vec<PluginSpec>,
    pub sourcemaps: bool,
}

impl BuildConfiguration {
    /// A configuration with the conventional `src`/`dist`/`js` layout.
    pub fn new(project_root: impl Into<PathBuf>, entry_file: impl Into<String>) -> Self {
        let project_root = project_root.into();
        Self {
            environment: DEFAULT_ENVIRONMENT.to_string(),
            source_root: project_root.join("src"),
            distribution_root: project_root.join("dist"),
            project_root,
            scripts_folder: "js".to_string(),
            styles_folder: None,
            images_folder: None,
            entry_file: entry_file.into(),
            transforms: Vec::new(),
            presets: Vec::new(),
            plugins: Vec::new(),
            sourcemaps: false,
        }
    }

    #[must_use]
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    #[must_use]
    pub fn with_transforms(mut self, transforms: Vec<String>) -> Self {
        self.transforms = transforms;
        self
    }

    #[must_use]
    pub fn with_presets(mut self, presets: Vec<String>) -> Self {
        self.presets = presets;
        self
    }

    #[must_use]
    pub fn with_plugins(mut self, plugins: Vec<PluginSpec>) -> Self {
        self.plugins = plugins;
        self
    }

    #[must_use]
    pub fn with_sourcemaps(mut self, sourcemaps: bool) -> Self {
        self.sourcemaps = sourcemaps;
        self
    }

    /// Load the section for `environment` from `config_path`, or from
    /// [`CONFIG_FILE`] in `project_root` when no path is given.
    pub fn load(project_root: &Path, config_path: Option<&Path>, environment: &str) -> Result<Self> {
        let path = config_path.map_or_else(|| project_root.join(CONFIG_FILE), |p| project_root.join(p));
        let text = std::fs::read_to_string(&path).map_err(|source| Error::ConfigRead {
            path: path.clone(),
            source,
        })?;
        Self::from_yaml_str(&text, environment, project_root, &path)
    }

    /// Parse configuration text. `origin` is only used in error messages.
    pub fn from_yaml_str(
        text: &str,
        environment: &str,
        project_root: &Path,
        origin: &Path,
    ) -> Result<Self> {
        let parse_err = |source| Error::ConfigParse {
            path: origin.to_path_buf(),
            source,
        };

        let mut document: BTreeMap<String, serde_yaml::Value> =
            serde_yaml::from_str(text).map_err(parse_err)?;
        let section = document
            .remove(environment)
            .ok_or_else(|| Error::UnknownEnvironment {
                env: environment.to_string(),
                path: origin.to_path_buf(),
            })?;
        let section: EnvironmentSection = serde_yaml::from_value(section).map_err(parse_err)?;

        let dirs = section.directory_structure;
        let scripts = section.script_options;

        if dirs.scripts_folder.trim().is_empty() {
            return Err(Error::config("directoryStructure.scriptsFolder must not be empty"));
        }
        if scripts.browserify.entry_file.trim().is_empty() {
            return Err(Error::config("scriptOptions.browserify.entryFile must not be empty"));
        }

        Ok(Self {
            environment: environment.to_string(),
            project_root: project_root.to_path_buf(),
            source_root: project_root.join(dirs.source_root),
            distribution_root: project_root.join(dirs.distribution_root),
            scripts_folder: dirs.scripts_folder,
            styles_folder: dirs.styles_folder,
            images_folder: dirs.images_folder,
            entry_file: scripts.browserify.entry_file,
            transforms: scripts.browserify.transform,
            presets: scripts.babelify.presets,
            plugins: scripts.plugins,
            sourcemaps: scripts.sourcemaps,
        })
    }

    /// Directory holding script sources; this is what watch mode observes.
    #[must_use]
    pub fn scripts_dir(&self) -> PathBuf {
        self.source_root.join(&self.scripts_folder)
    }

    /// `source_root/scripts_folder/entry_file`.
    #[must_use]
    pub fn entry_path(&self) -> PathBuf {
        self.scripts_dir().join(&self.entry_file)
    }

    /// `distribution_root/scripts_folder`.
    #[must_use]
    pub fn output_dir(&self) -> PathBuf {
        self.distribution_root.join(&self.scripts_folder)
    }

    /// Initial artifact name: the basename of the entry file.
    #[must_use]
    pub fn artifact_name(&self) -> String {
        Path::new(&self.entry_file)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&self.entry_file)
            .to_string()
    }

    /// Output path before any plugin renames the artifact.
    #[must_use]
    pub fn output_path(&self) -> PathBuf {
        self.output_dir().join(self.artifact_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SAMPLE: &str = r#"
development:
  directoryStructure:
    sourceRoot: src
    distributionRoot: dist
    scriptsFolder: js
    stylesFolder: css
    imagesFolder: img
  scriptOptions:
    browserify:
      entryFile: app/main.js
      transform: [babelify, envify]
    babelify:
      presets: [es2015]
    plugins:
      - gulp-uglify
      - gulp-concat:
          name: out.js
      - gulp-strip-debug:
    sourcemaps: true
production:
  directoryStructure:
    sourceRoot: src
    distributionRoot: build
    scriptsFolder: scripts
  scriptOptions:
    browserify:
      entryFile: main.js
"#;

    fn load(env: &str) -> Result<BuildConfiguration> {
        BuildConfiguration::from_yaml_str(SAMPLE, env, Path::new("/proj"), Path::new("sluice.yml"))
    }

    #[test]
    fn environment_defaults_to_development() {
        assert_eq!(resolve_environment(None, |_| None), "development");
    }

    #[test]
    fn environment_flag_beats_variable() {
        let lookup = |_: &str| Some("test".to_string());
        assert_eq!(resolve_environment(Some("production"), lookup), "production");
        assert_eq!(resolve_environment(None, lookup), "test");
    }

    #[test]
    #[serial_test::serial]
    fn process_environment_selection() {
        let saved = std::env::var(ENVIRONMENT_VAR).ok();

        std::env::remove_var(ENVIRONMENT_VAR);
        assert_eq!(environment_from_process(None), "development");
        std::env::set_var(ENVIRONMENT_VAR, "production");
        assert_eq!(environment_from_process(None), "production");
        assert_eq!(environment_from_process(Some("test")), "test");

        match saved {
            Some(value) => std::env::set_var(ENVIRONMENT_VAR, value),
            None => std::env::remove_var(ENVIRONMENT_VAR),
        }
    }

    #[test]
    fn empty_environment_values_are_unset() {
        assert_eq!(resolve_environment(Some(""), |_| Some(String::new())), "development");
    }

    #[test]
    fn loads_full_section() {
        let config = load("development").unwrap();
        assert_eq!(config.source_root, PathBuf::from("/proj/src"));
        assert_eq!(config.entry_path(), PathBuf::from("/proj/src/js/app/main.js"));
        assert_eq!(config.output_dir(), PathBuf::from("/proj/dist/js"));
        assert_eq!(config.artifact_name(), "main.js");
        assert_eq!(config.output_path(), PathBuf::from("/proj/dist/js/main.js"));
        assert_eq!(config.transforms, vec!["babelify", "envify"]);
        assert_eq!(config.presets, vec!["es2015"]);
        assert_eq!(config.styles_folder.as_deref(), Some("css"));
        assert!(config.sourcemaps);
        assert_eq!(
            config.plugins,
            vec![
                PluginSpec::named("gulp-uglify"),
                PluginSpec::with_options("gulp-concat", json!({"name": "out.js"})),
                PluginSpec::named("gulp-strip-debug"),
            ]
        );
    }

    #[test]
    fn optional_script_options_default_to_empty() {
        let config = load("production").unwrap();
        assert!(config.transforms.is_empty());
        assert!(config.presets.is_empty());
        assert!(config.plugins.is_empty());
        assert!(!config.sourcemaps);
        assert_eq!(config.output_dir(), PathBuf::from("/proj/build/scripts"));
    }

    #[test]
    fn unknown_environment_is_config_error() {
        let err = load("staging").unwrap_err();
        assert!(matches!(err, Error::UnknownEnvironment { ref env, .. } if env == "staging"));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn plugin_mapping_with_two_names_is_rejected() {
        let text = r"
development:
  directoryStructure: { sourceRoot: src, distributionRoot: dist, scriptsFolder: js }
  scriptOptions:
    browserify: { entryFile: main.js }
    plugins:
      - { gulp-a: {}, gulp-b: {} }
";
        let err = BuildConfiguration::from_yaml_str(
            text,
            "development",
            Path::new("/p"),
            Path::new("sluice.yml"),
        )
        .unwrap_err();
        assert!(matches!(err, Error::ConfigParse { .. }));
    }

    #[test]
    fn missing_entry_file_is_rejected() {
        let text = r"
development:
  directoryStructure: { sourceRoot: src, distributionRoot: dist, scriptsFolder: js }
  scriptOptions:
    browserify: { entryFile: '' }
";
        let err = BuildConfiguration::from_yaml_str(
            text,
            "development",
            Path::new("/p"),
            Path::new("sluice.yml"),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = BuildConfiguration::load(dir.path(), None, "development").unwrap_err();
        assert!(matches!(err, Error::ConfigRead { .. }));
    }
}
