//! `sluice plan` command implementation.
//!
//! Resolves the configuration exactly as `build` would and prints the
//! transform chain and the order plugins will run in.

use super::{fail, Project};
use miette::Result;
use serde::Serialize;
use serde_json::Value;
use sluice_core::{ReloadChannel, Stage};

#[derive(Serialize)]
struct PlanJson {
    ok: bool,
    environment: String,
    entry: String,
    output: String,
    sourcemaps: bool,
    transforms: Vec<String>,
    stages: Vec<StageJson>,
}

#[derive(Serialize)]
struct StageJson {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<Value>,
}

pub fn run(project: &Project, json: bool) -> Result<()> {
    let session = project
        .prepare(ReloadChannel::new())
        .unwrap_or_else(|err| fail(&err, json));
    let config = session.config();
    let transforms: Vec<String> = session.chain().names().into_iter().map(String::from).collect();
    let stages = session.pipeline().plan();

    if json {
        let plan = PlanJson {
            ok: true,
            environment: config.environment.clone(),
            entry: config.entry_path().display().to_string(),
            output: config.output_path().display().to_string(),
            sourcemaps: config.sourcemaps,
            transforms,
            stages: stages
                .iter()
                .map(|stage| StageJson {
                    name: stage.label().to_string(),
                    options: match stage {
                        Stage::Plugin(spec) => spec.options.clone(),
                        _ => None,
                    },
                })
                .collect(),
        };
        println!("{}", serde_json::to_string(&plan).unwrap_or_default());
        return Ok(());
    }

    println!("  environment: {}", config.environment);
    println!("  entry:       {}", config.entry_path().display());
    println!("  output:      {}", config.output_path().display());
    if transforms.is_empty() {
        println!("  transforms:  (none)");
    } else {
        println!("  transforms:  {}", transforms.join(" -> "));
    }
    if stages.is_empty() {
        println!("  plugins:     (none)");
    } else {
        println!("  plugins:");
        for (index, stage) in stages.iter().enumerate() {
            match stage {
                Stage::Plugin(spec) => match &spec.options {
                    Some(options) => println!("    {}. {} {options}", index + 1, spec.name),
                    None => println!("    {}. {}", index + 1, spec.name),
                },
                Stage::SourcemapOpen | Stage::SourcemapClose => {
                    println!("    {}. [{}]", index + 1, stage.label());
                }
            }
        }
    }
    Ok(())
}
