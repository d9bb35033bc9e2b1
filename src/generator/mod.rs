//! Per-target code emission.
//!
//! An [`EmitterRegistry`] maps each [`TargetKey`] to one [`Emitter`]. The
//! emitter sees only prepared [`EntityModel`] views, never the DDL, and
//! writes into a [`FileSet`]. Entities are emitted in generation order, so
//! output is a pure function of schema, profile and toggles.

mod go;
mod java;
mod model;
mod python;
mod query;
mod rust;
mod typescript;

pub use model::{EntityModel, EntityNames, FieldModel, JunctionLink, NameTable, RelationModel};

use crate::error::{GenerationError, UnmappedTypeWarning};
use crate::ir::Schema;
use crate::mapping::{TargetKey, TargetProfile};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Relative path -> file content for one target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FileSet {
    files: BTreeMap<String, String>,
}

impl FileSet {
    /// Add a file; a path may only be written once.
    pub fn add(
        &mut self,
        target: &TargetKey,
        path: impl Into<String>,
        content: String,
    ) -> Result<(), GenerationError> {
        let path = path.into();
        if self.files.contains_key(&path) {
            return Err(GenerationError::DuplicatePath {
                target: target.to_string(),
                path,
            });
        }
        self.files.insert(path, content);
        Ok(())
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.files.iter().map(|(p, c)| (p.as_str(), c.as_str()))
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Known toggles and their defaults.
pub const FEATURE_DEFAULTS: [(&str, bool); 6] = [
    ("auth", false),
    ("rate_limit", false),
    ("caching", false),
    ("validation", true),
    ("pagination", true),
    ("soft_delete", false),
];

/// Named feature switches as requested. Names outside
/// [`FEATURE_DEFAULTS`] are kept but have no effect.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureToggles {
    overrides: BTreeMap<String, bool>,
}

impl FeatureToggles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, enabled: bool) -> &mut Self {
        self.overrides.insert(name.into(), enabled);
        self
    }

    pub fn with(mut self, name: impl Into<String>, enabled: bool) -> Self {
        self.set(name, enabled);
        self
    }

    /// Requested state, falling back to the documented default.
    pub fn requested(&self, name: &str) -> bool {
        self.overrides.get(name).copied().unwrap_or_else(|| {
            FEATURE_DEFAULTS
                .iter()
                .find(|(n, _)| *n == name)
                .is_some_and(|(_, on)| *on)
        })
    }

    /// Requested names that no emitter understands.
    pub fn unknown(&self) -> impl Iterator<Item = &str> {
        self.overrides
            .keys()
            .map(String::as_str)
            .filter(|name| !FEATURE_DEFAULTS.iter().any(|(known, _)| known == name))
    }
}

/// Toggles in effect for one target: requested and supported by its profile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Features {
    pub auth: bool,
    pub rate_limit: bool,
    pub caching: bool,
    pub validation: bool,
    pub pagination: bool,
    pub soft_delete: bool,
}

impl Features {
    pub fn resolve(toggles: &FeatureToggles, profile: &TargetProfile) -> Self {
        let on = |name: &str| toggles.requested(name) && profile.supports(name);
        Self {
            auth: on("auth"),
            rate_limit: on("rate_limit"),
            caching: on("caching"),
            validation: on("validation"),
            pagination: on("pagination"),
            soft_delete: on("soft_delete"),
        }
    }
}

/// Everything an emitter may read.
pub struct EmitContext<'a> {
    pub schema: &'a Schema,
    pub profile: &'a TargetProfile,
    pub features: Features,
    /// Project name, used for package and module roots.
    pub project: &'a str,
    /// Entity views in generation order.
    pub entities: &'a [EntityModel<'a>],
}

impl<'a> EmitContext<'a> {
    pub fn key(&self) -> &TargetKey {
        &self.profile.key
    }

    pub fn entity(&self, table: &str) -> Option<&EntityModel<'a>> {
        self.entities.iter().find(|e| e.table.name == table)
    }

    /// The same relationship as seen from its other end.
    pub fn counterpart(
        &self,
        entity: &EntityModel<'_>,
        relation: &RelationModel,
    ) -> Option<&RelationModel> {
        let junction = |r: &RelationModel| r.via.as_ref().map(|v| v.table.clone());
        self.entity(&relation.target_table)?
            .relations
            .iter()
            .find(|other| {
                other.target_table == entity.table.name
                    && other.inverse != relation.inverse
                    && junction(other) == junction(relation)
                    && other.local_columns == relation.remote_columns
                    && other.remote_columns == relation.local_columns
            })
    }

    /// Member name of a target entity's column.
    pub fn field_name(&self, table: &str, column: &str) -> String {
        self.entity(table)
            .and_then(|e| e.field(column))
            .map(|f| f.name.clone())
            .unwrap_or_else(|| column.to_string())
    }
}

/// One language/framework code generator.
pub trait Emitter: Send + Sync {
    /// Model, transfer object, data access, service and route files for one entity.
    fn emit_entity(
        &self,
        ctx: &EmitContext<'_>,
        entity: &EntityModel<'_>,
        out: &mut FileSet,
    ) -> Result<(), GenerationError>;

    /// Files shared by all entities: module index, router registration,
    /// feature-gated scaffolding.
    fn emit_shared(&self, ctx: &EmitContext<'_>, out: &mut FileSet)
    -> Result<(), GenerationError>;
}

/// Output of one target.
#[derive(Debug, Clone, Default)]
pub struct Generated {
    pub files: FileSet,
    pub warnings: Vec<UnmappedTypeWarning>,
}

/// Run one emitter over the schema.
pub fn generate(
    emitter: &dyn Emitter,
    schema: &Schema,
    profile: &TargetProfile,
    toggles: &FeatureToggles,
    project: &str,
) -> Result<Generated, GenerationError> {
    let features = Features::resolve(toggles, profile);
    let names = NameTable::assign(schema, profile);
    let mut warnings = Vec::new();
    let entities: Vec<EntityModel<'_>> = schema
        .ordered_entities()
        .map(|table| {
            let (model, unmapped) = EntityModel::build_with(schema, table, profile, &names);
            warnings.extend(unmapped);
            model
        })
        .collect();

    let ctx = EmitContext {
        schema,
        profile,
        features,
        project,
        entities: &entities,
    };

    let mut files = FileSet::default();
    for entity in &entities {
        emitter.emit_entity(&ctx, entity, &mut files)?;
    }
    emitter.emit_shared(&ctx, &mut files)?;

    debug!(key = %profile.key, files = files.len(), "emitted target");
    Ok(Generated { files, warnings })
}

/// Emitters by target key.
pub struct EmitterRegistry {
    emitters: BTreeMap<TargetKey, Box<dyn Emitter>>,
}

impl EmitterRegistry {
    pub fn empty() -> Self {
        Self {
            emitters: BTreeMap::new(),
        }
    }

    /// The nine built-in targets.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(
            TargetKey::new("rust", "axum"),
            rust::RustEmitter::new(rust::Framework::Axum),
        );
        registry.register(
            TargetKey::new("rust", "actix"),
            rust::RustEmitter::new(rust::Framework::Actix),
        );
        registry.register(
            TargetKey::new("typescript", "express"),
            typescript::TypeScriptEmitter::new(typescript::Framework::Express),
        );
        registry.register(
            TargetKey::new("typescript", "nestjs"),
            typescript::TypeScriptEmitter::new(typescript::Framework::Nest),
        );
        registry.register(
            TargetKey::new("python", "fastapi"),
            python::PythonEmitter::new(python::Framework::FastApi),
        );
        registry.register(
            TargetKey::new("python", "flask"),
            python::PythonEmitter::new(python::Framework::Flask),
        );
        registry.register(
            TargetKey::new("go", "gin"),
            go::GoEmitter::new(go::Framework::Gin),
        );
        registry.register(
            TargetKey::new("go", "echo"),
            go::GoEmitter::new(go::Framework::Echo),
        );
        registry.register(TargetKey::new("java", "spring"), java::SpringEmitter);
        registry
    }

    pub fn register(&mut self, key: TargetKey, emitter: impl Emitter + 'static) {
        self.emitters.insert(key, Box::new(emitter));
    }

    pub fn get(&self, key: &TargetKey) -> Option<&dyn Emitter> {
        self.emitters.get(key).map(|e| e.as_ref())
    }

    pub fn keys(&self) -> impl Iterator<Item = &TargetKey> {
        self.emitters.keys()
    }

    pub fn contains(&self, key: &TargetKey) -> bool {
        self.emitters.contains_key(key)
    }
}

impl Default for EmitterRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Shared text helpers for emitters.
pub(crate) mod text {
    /// Indent every non-empty line by `n` spaces.
    pub fn indent(s: &str, n: usize) -> String {
        let pad = " ".repeat(n);
        s.lines()
            .map(|l| {
                if l.is_empty() {
                    String::new()
                } else {
                    format!("{}{}", pad, l)
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Escape for a double-quoted string literal.
    pub fn quote(s: &str) -> String {
        format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProfileSet;
    use crate::infer::infer;
    use crate::sql::{Dialect, extract};

    fn schema() -> Schema {
        let sql = r#"
            CREATE TABLE categories (id SERIAL PRIMARY KEY, name TEXT NOT NULL, parent_id INT REFERENCES categories(id));
            CREATE TABLE products (
                id SERIAL PRIMARY KEY,
                category_id INT NOT NULL REFERENCES categories(id),
                name VARCHAR(120) NOT NULL,
                price NUMERIC(10, 2) NOT NULL,
                location GEOMETRY
            );
            CREATE TABLE tags (id SERIAL PRIMARY KEY, label TEXT NOT NULL UNIQUE);
            CREATE TABLE product_tags (
                product_id INT REFERENCES products(id),
                tag_id INT REFERENCES tags(id),
                PRIMARY KEY (product_id, tag_id)
            );
        "#;
        infer(extract(sql, Dialect::Auto).catalog)
    }

    #[test]
    fn test_toggle_defaults_and_unknown() {
        let toggles = FeatureToggles::new().with("auth", true).with("telemetry", true);

        assert!(toggles.requested("auth"));
        assert!(toggles.requested("validation"));
        assert!(!toggles.requested("caching"));
        assert!(toggles.requested("telemetry"));
    }

    #[test]
    fn test_unsupported_toggle_is_off() {
        let profiles = ProfileSet::builtin().unwrap();
        let actix = profiles.get(&TargetKey::new("rust", "actix")).unwrap();
        let toggles = FeatureToggles::new().with("rate_limit", true).with("auth", true);

        let features = Features::resolve(&toggles, actix);
        assert!(features.auth);
        assert!(!features.rate_limit);
    }

    #[test]
    fn test_every_builtin_target_generates() {
        let schema = schema();
        let profiles = ProfileSet::builtin().unwrap();
        let registry = EmitterRegistry::builtin();
        let toggles = FeatureToggles::new()
            .with("auth", true)
            .with("rate_limit", true)
            .with("caching", true)
            .with("soft_delete", true);

        assert_eq!(registry.keys().count(), 9);
        for key in registry.keys() {
            let profile = profiles.get(key).unwrap();
            let emitter = registry.get(key).unwrap();
            let generated = generate(emitter, &schema, profile, &toggles, "shop").unwrap();

            assert!(generated.files.len() >= 15, "{} produced {}", key, generated.files.len());
            assert_eq!(generated.warnings.len(), 1, "{}", key);
            assert_eq!(generated.warnings[0].column, "location");
            // Junction tables never become their own files
            assert!(
                generated.files.paths().all(|p| !p.contains("product_tag")),
                "{}",
                key
            );
        }
    }

    #[test]
    fn test_unknown_toggle_is_noop() {
        let schema = schema();
        let profiles = ProfileSet::builtin().unwrap();
        let registry = EmitterRegistry::builtin();

        for key in registry.keys() {
            let profile = profiles.get(key).unwrap();
            let emitter = registry.get(key).unwrap();
            let plain = generate(emitter, &schema, profile, &FeatureToggles::new(), "shop").unwrap();
            let extra = generate(
                emitter,
                &schema,
                profile,
                &FeatureToggles::new().with("hologram", true),
                "shop",
            )
            .unwrap();
            assert_eq!(plain.files, extra.files, "{}", key);
        }
    }

    #[test]
    fn test_duplicate_path_is_rejected() {
        let key = TargetKey::new("rust", "axum");
        let mut files = FileSet::default();
        files.add(&key, "a.rs", String::new()).unwrap();
        assert!(matches!(
            files.add(&key, "a.rs", String::new()),
            Err(GenerationError::DuplicatePath { .. })
        ));
    }
}
