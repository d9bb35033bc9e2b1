//! Request orchestration: extract, infer, then run every requested target
//! over the shared schema.
//!
//! Only [`GenerateError`] aborts a request. Everything else that went wrong
//! (a bad statement, a cycle, an unknown target, an emitter failure) ends up
//! in [`GenerationOutput::diagnostics`] and the remaining work continues.

use crate::assembler::{self, Archive, Scaffolding};
use crate::config::ProfileSet;
use crate::error::{Diagnostic, GenerateError, GenerationError, Severity, UnsupportedTargetError};
use crate::generator::{Emitter, EmitterRegistry, FeatureToggles, FileSet, Generated, generate};
use crate::infer::infer;
use crate::ir::Schema;
use crate::mapping::{TargetKey, TargetProfile};
use crate::sql::{Dialect, extract};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::thread;
use tracing::{debug, info, warn};

/// One generation request. Discarded once the output is produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub ddl: String,
    pub targets: Vec<TargetKey>,
    /// Base naming scope: project name, module path and package root
    /// derive from it.
    pub project: String,
    #[serde(default)]
    pub toggles: FeatureToggles,
    #[serde(default)]
    pub dialect: Dialect,
}

impl GenerationRequest {
    pub fn new(ddl: impl Into<String>, project: impl Into<String>) -> Self {
        Self {
            ddl: ddl.into(),
            project: project.into(),
            ..Self::default()
        }
    }

    pub fn target(mut self, key: TargetKey) -> Self {
        self.targets.push(key);
        self
    }

    pub fn toggles(mut self, toggles: FeatureToggles) -> Self {
        self.toggles = toggles;
        self
    }

    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }
}

#[derive(Debug, Clone)]
pub struct GenerationOutput {
    pub schema: Schema,
    /// Successfully generated targets only.
    pub file_sets: BTreeMap<TargetKey, FileSet>,
    /// Version pins of every generated target, for build-file scaffolding.
    pub dependencies: BTreeMap<TargetKey, BTreeMap<String, String>>,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Serialize)]
struct JsonOutput<'a> {
    targets: BTreeMap<String, &'a FileSet>,
    dependencies: BTreeMap<String, &'a BTreeMap<String, String>>,
    diagnostics: &'a [Diagnostic],
}

impl GenerationOutput {
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity() == Severity::Error)
    }

    /// Place the file sets under their target prefixes next to the
    /// scaffolding.
    pub fn assemble(&self, scaffolding: &Scaffolding) -> Result<Archive, GenerateError> {
        Ok(assembler::assemble(&self.file_sets, scaffolding)?)
    }

    /// File sets keyed by `lang/fw`, pins and diagnostics as one JSON
    /// document.
    pub fn to_json(&self) -> serde_json::Result<String> {
        let view = JsonOutput {
            targets: self
                .file_sets
                .iter()
                .map(|(key, files)| (key.to_string(), files))
                .collect(),
            dependencies: self
                .dependencies
                .iter()
                .map(|(key, pins)| (key.to_string(), pins))
                .collect(),
            diagnostics: &self.diagnostics,
        };
        serde_json::to_string_pretty(&view)
    }
}

/// Profiles and emitters, built once and reused across requests.
pub struct Pipeline {
    profiles: ProfileSet,
    registry: EmitterRegistry,
}

impl Pipeline {
    pub fn new(profiles: ProfileSet, registry: EmitterRegistry) -> Self {
        Self { profiles, registry }
    }

    pub fn profiles(&self) -> &ProfileSet {
        &self.profiles
    }

    pub fn registry(&self) -> &EmitterRegistry {
        &self.registry
    }

    /// Keys that have both a profile and an emitter.
    pub fn targets(&self) -> impl Iterator<Item = &TargetKey> {
        self.registry
            .keys()
            .filter(|key| self.profiles.get(key).is_some())
    }

    pub fn dependencies(&self, key: &TargetKey) -> Option<&BTreeMap<String, String>> {
        self.profiles.get(key).map(|p| &p.dependencies)
    }

    pub fn run(&self, request: &GenerationRequest) -> Result<GenerationOutput, GenerateError> {
        let extraction = extract(&request.ddl, request.dialect);
        if extraction.catalog.tables.is_empty() {
            return Err(GenerateError::NoTables {
                errors: extraction.errors,
            });
        }

        let mut diagnostics: Vec<Diagnostic> = extraction
            .errors
            .into_iter()
            .map(Diagnostic::from)
            .chain(extraction.unresolved.into_iter().map(Diagnostic::from))
            .collect();

        let schema = infer(extraction.catalog);
        diagnostics.extend(schema.cycles.iter().cloned().map(Diagnostic::from));
        diagnostics.extend(schema.unresolved.iter().cloned().map(Diagnostic::from));

        for name in request.toggles.unknown() {
            debug!(feature = name, "ignoring unknown feature toggle");
        }

        let jobs = self.resolve_targets(&request.targets, &mut diagnostics);
        let results = run_targets(&jobs, &schema, request);

        let mut file_sets = BTreeMap::new();
        let mut dependencies = BTreeMap::new();
        for (key, result) in results {
            match result {
                Ok(generated) => {
                    for warning in &generated.warnings {
                        warn!(%warning, "unmapped type");
                    }
                    diagnostics.extend(generated.warnings.into_iter().map(Diagnostic::from));
                    if let Some(pins) = self.dependencies(key) {
                        dependencies.insert(key.clone(), pins.clone());
                    }
                    file_sets.insert(key.clone(), generated.files);
                }
                Err(message) => {
                    warn!(key = %key, %message, "target failed");
                    diagnostics.push(Diagnostic::Generation {
                        target: key.to_string(),
                        message,
                    });
                }
            }
        }

        info!(
            tables = schema.tables.len(),
            relationships = schema.relationships.len(),
            targets = file_sets.len(),
            diagnostics = diagnostics.len(),
            "generation finished"
        );
        Ok(GenerationOutput {
            schema,
            file_sets,
            dependencies,
            diagnostics,
        })
    }

    fn resolve_targets<'a>(
        &'a self,
        requested: &'a [TargetKey],
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Vec<Job<'a>> {
        let mut seen = BTreeSet::new();
        let mut jobs = Vec::new();
        for key in requested {
            if !seen.insert(key) {
                continue;
            }
            let reason = match (self.profiles.get(key), self.registry.get(key)) {
                (Some(profile), Some(emitter)) => {
                    jobs.push(Job {
                        key,
                        profile,
                        emitter,
                    });
                    continue;
                }
                (None, _) => "no target profile",
                (Some(_), None) => "no registered emitter",
            };
            let error = UnsupportedTargetError {
                target: key.to_string(),
                reason: reason.to_string(),
            };
            warn!(%error, "skipping target");
            diagnostics.push(error.into());
        }
        jobs
    }
}

struct Job<'a> {
    key: &'a TargetKey,
    profile: &'a TargetProfile,
    emitter: &'a dyn Emitter,
}

/// One scoped thread per target. A failing or panicking emitter only loses
/// its own target.
fn run_targets<'a>(
    jobs: &[Job<'a>],
    schema: &Schema,
    request: &GenerationRequest,
) -> Vec<(&'a TargetKey, Result<Generated, String>)> {
    thread::scope(|scope| {
        let handles: Vec<_> = jobs
            .iter()
            .map(|job| {
                let handle = scope.spawn(move || {
                    generate(
                        job.emitter,
                        schema,
                        job.profile,
                        &request.toggles,
                        &request.project,
                    )
                });
                (job.key, handle)
            })
            .collect();

        handles
            .into_iter()
            .map(|(key, handle)| {
                let result = match handle.join() {
                    Ok(result) => result.map_err(|e: GenerationError| e.to_string()),
                    Err(_) => Err("emitter panicked".to_string()),
                };
                (key, result)
            })
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::{EmitContext, EntityModel};
    use pretty_assertions::assert_eq;

    const DDL: &str = r#"
        CREATE TABLE authors (id SERIAL PRIMARY KEY, name VARCHAR(80) NOT NULL);
        CREATE TABLE posts (
            id SERIAL PRIMARY KEY,
            author_id INTEGER NOT NULL REFERENCES authors(id),
            title TEXT NOT NULL
        );
    "#;

    fn pipeline() -> Pipeline {
        Pipeline::new(ProfileSet::builtin().unwrap(), EmitterRegistry::builtin())
    }

    struct Failing;

    impl Emitter for Failing {
        fn emit_entity(
            &self,
            _ctx: &EmitContext<'_>,
            _entity: &EntityModel<'_>,
            _out: &mut FileSet,
        ) -> Result<(), GenerationError> {
            Err(GenerationError::Format(std::fmt::Error))
        }

        fn emit_shared(
            &self,
            _ctx: &EmitContext<'_>,
            _out: &mut FileSet,
        ) -> Result<(), GenerationError> {
            Ok(())
        }
    }

    #[test]
    fn test_run_two_targets() {
        let request = GenerationRequest::new(DDL, "blog")
            .target(TargetKey::new("rust", "axum"))
            .target(TargetKey::new("go", "gin"));
        let output = pipeline().run(&request).unwrap();

        assert_eq!(
            output.file_sets.keys().map(|k| k.to_string()).collect::<Vec<_>>(),
            vec!["go/gin", "rust/axum"]
        );
        assert_eq!(output.schema.generation_order, vec!["authors", "posts"]);
        assert!(output.diagnostics.is_empty());
        assert!(output.dependencies[&TargetKey::new("go", "gin")].contains_key("gorm.io/gorm"));
    }

    #[test]
    fn test_duplicate_target_runs_once() {
        let key = TargetKey::new("python", "fastapi");
        let request = GenerationRequest::new(DDL, "blog")
            .target(key.clone())
            .target(key);
        let output = pipeline().run(&request).unwrap();
        assert_eq!(output.file_sets.len(), 1);
    }

    #[test]
    fn test_missing_emitter_is_unsupported() {
        let pipeline = Pipeline::new(ProfileSet::builtin().unwrap(), EmitterRegistry::empty());
        let request = GenerationRequest::new(DDL, "blog").target(TargetKey::new("rust", "axum"));
        let output = pipeline.run(&request).unwrap();

        assert!(output.file_sets.is_empty());
        assert_eq!(
            output.diagnostics,
            vec![Diagnostic::UnsupportedTarget(UnsupportedTargetError {
                target: "rust/axum".to_string(),
                reason: "no registered emitter".to_string(),
            })]
        );
        assert_eq!(pipeline.targets().count(), 0);
    }

    #[test]
    fn test_failing_emitter_reports_generation_error() {
        let mut registry = EmitterRegistry::builtin();
        registry.register(TargetKey::new("go", "echo"), Failing);
        let pipeline = Pipeline::new(ProfileSet::builtin().unwrap(), registry);
        let request = GenerationRequest::new(DDL, "blog")
            .target(TargetKey::new("go", "echo"))
            .target(TargetKey::new("java", "spring"));
        let output = pipeline.run(&request).unwrap();

        assert_eq!(output.file_sets.len(), 1);
        assert!(output.file_sets.contains_key(&TargetKey::new("java", "spring")));
        assert_eq!(output.diagnostics.len(), 1);
        assert!(matches!(
            &output.diagnostics[0],
            Diagnostic::Generation { target, message }
                if target == "go/echo" && message.starts_with("formatting failed")
        ));
        assert!(output.has_errors());
    }

    #[test]
    fn test_no_tables_is_fatal() {
        let request = GenerationRequest::new("CREATE INDEX idx ON nothing (x);", "blog");
        match pipeline().run(&request) {
            Err(GenerateError::NoTables { .. }) => {}
            other => panic!("expected NoTables, got {:?}", other.map(|o| o.diagnostics)),
        }
    }

    #[test]
    fn test_json_output_keys_by_target() {
        let request = GenerationRequest::new(DDL, "blog").target(TargetKey::new("rust", "axum"));
        let output = pipeline().run(&request).unwrap();
        let json: serde_json::Value = serde_json::from_str(&output.to_json().unwrap()).unwrap();

        assert!(json["targets"]["rust/axum"].is_object());
        assert!(json["dependencies"]["rust/axum"]["axum"].is_string());
        assert_eq!(json["diagnostics"], serde_json::json!([]));
        assert!(output.diagnostics.iter().all(|d| d.severity() != Severity::Error));
    }
}
