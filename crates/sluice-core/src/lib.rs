#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::return_self_not_must_use)]

pub mod artifact;
pub mod bundler;
pub mod config;
pub mod cycle;
pub mod error;
pub mod external;
pub mod install;
pub mod pipeline;
pub mod plugin;
pub mod registry;
pub mod reload;
pub mod resolve;
pub mod scan;
pub mod sink;
pub mod sourcemap;
pub mod transform;
pub mod watch;

pub use artifact::Artifact;
pub use bundler::Bundler;
pub use config::{BuildConfiguration, PluginSpec};
pub use cycle::{CycleOutcome, Session};
pub use error::{BuildError, Error, Result};
pub use install::{Installer, NoInstall, NpmInstaller};
pub use pipeline::{plan, PluginPipeline, Stage, SOURCEMAP_COMPATIBLE};
pub use plugin::{PluginRegistry, Processor, ProcessorFactory};
pub use registry::CapabilityRegistry;
pub use reload::{ReloadChannel, ReloadMessage};
pub use sink::{ErrorSink, Notifier, QuietNotifier, TerminalNotifier};
pub use transform::{Transform, TransformChain, TransformChainBuilder, TransformResolver};
pub use watch::{watch_scripts, ChangeBatch, State, WatchController};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
