//! `schemaforge`: SQL DDL in, server projects out.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use schemaforge::assembler::Scaffolding;
use schemaforge::config::ProfileSet;
use schemaforge::error::Diagnostic;
use schemaforge::generator::{EmitterRegistry, FeatureToggles};
use schemaforge::infer::infer;
use schemaforge::mapping::TargetKey;
use schemaforge::pipeline::{GenerationRequest, Pipeline};
use schemaforge::report;
use schemaforge::sql::{Dialect, extract};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "schemaforge", version, about = "Generate server projects from SQL DDL")]
struct Cli {
    /// Replacement target profile file (TOML).
    #[arg(long, global = true)]
    profiles: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate projects for one or more targets.
    Generate {
        /// DDL script.
        ddl: PathBuf,
        /// Target as language/framework, e.g. rust/axum. Repeatable.
        #[arg(short = 't', long = "target", required = true)]
        targets: Vec<TargetKey>,
        /// Project name; module paths and packages derive from it.
        #[arg(long, default_value = "app")]
        name: String,
        /// Turn a feature on (auth, rate_limit, caching, validation,
        /// pagination, soft_delete). Repeatable.
        #[arg(long = "feature")]
        features: Vec<String>,
        /// Turn a feature off. Repeatable.
        #[arg(long = "no-feature")]
        no_features: Vec<String>,
        #[arg(long, default_value = "auto")]
        dialect: Dialect,
        /// Write the assembled tree here.
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// Static files to merge in; `targets/<lang>-<fw>/` is per target.
        #[arg(long)]
        scaffold: Option<PathBuf>,
        /// Print file sets and diagnostics as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List registered targets with their features and dependency pins.
    Targets,

    /// Show tables, relationships and generation order.
    Inspect {
        ddl: PathBuf,
        #[arg(long, default_value = "auto")]
        dialect: Dialect,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let profiles = match &cli.profiles {
        Some(path) => ProfileSet::load(path)?,
        None => ProfileSet::builtin()?,
    };
    let pipeline = Pipeline::new(profiles, EmitterRegistry::builtin());

    match cli.command {
        Commands::Generate {
            ddl,
            targets,
            name,
            features,
            no_features,
            dialect,
            out,
            scaffold,
            json,
        } => {
            let mut toggles = FeatureToggles::new();
            for feature in features {
                toggles.set(feature, true);
            }
            for feature in no_features {
                toggles.set(feature, false);
            }
            let request = GenerationRequest {
                ddl: read(&ddl)?,
                targets,
                project: name,
                toggles,
                dialect,
            };
            generate(&pipeline, &request, out.as_deref(), scaffold.as_deref(), json)
        }
        Commands::Targets => {
            print!(
                "{}",
                report::targets(pipeline.targets().filter_map(|k| pipeline.profiles().get(k)))
            );
            Ok(())
        }
        Commands::Inspect { ddl, dialect } => {
            let extraction = extract(&read(&ddl)?, dialect);
            let mut diagnostics: Vec<Diagnostic> =
                extraction.errors.into_iter().map(Diagnostic::from).collect();
            diagnostics.extend(extraction.unresolved.into_iter().map(Diagnostic::from));
            let schema = infer(extraction.catalog);
            print!("{}", report::schema(&schema));
            if !diagnostics.is_empty() {
                eprint!("{}", report::diagnostics(&diagnostics));
            }
            Ok(())
        }
    }
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn generate(
    pipeline: &Pipeline,
    request: &GenerationRequest,
    out: Option<&Path>,
    scaffold: Option<&Path>,
    json: bool,
) -> Result<()> {
    let output = pipeline.run(request)?;
    if !output.diagnostics.is_empty() {
        eprint!("{}", report::diagnostics(&output.diagnostics));
    }
    if output.file_sets.is_empty() {
        bail!("no target was generated");
    }

    if json {
        println!("{}", output.to_json()?);
    }

    let scaffolding = match scaffold {
        Some(dir) => Scaffolding::load(dir)
            .with_context(|| format!("failed to read scaffolding {}", dir.display()))?,
        None => Scaffolding::new(),
    };
    let archive = output.assemble(&scaffolding)?;

    match out {
        Some(dir) => {
            archive
                .write_to(dir)
                .with_context(|| format!("failed to write {}", dir.display()))?;
            info!(dir = %dir.display(), files = archive.len(), "project written");
            if !json {
                print!("{}", report::manifest(archive.manifest()));
            }
        }
        None if !json => print!("{}", report::manifest(archive.manifest())),
        None => {}
    }
    Ok(())
}
