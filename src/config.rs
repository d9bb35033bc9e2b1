//! Target profile configuration.
//!
//! Profiles are read from TOML: one `[languages.<name>]` table per language
//! (types, naming, nullability) and one `[[targets]]` entry per framework
//! (supported features, dependency pins). The built-in file is embedded at
//! compile time.

use crate::ast::SqlType;
use crate::mapping::{Casing, DecimalRepr, Nullability, Role, TargetKey, TargetProfile};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

const BUILTIN_PROFILES: &str = include_str!("../profiles/targets.toml");

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid profile file: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("target {target} uses undefined language '{language}'")]
    UnknownLanguage { target: String, language: String },
    #[error("language '{language}' has no mapping for SQL type '{sql_type}'")]
    MissingType { language: String, sql_type: String },
    #[error("language '{language}': unknown role '{role}'")]
    UnknownRole { language: String, role: String },
    #[error("language '{language}': {field} template '{template}' has no {{}} placeholder")]
    BadTemplate {
        language: String,
        field: &'static str,
        template: String,
    },
    #[error("target {0} is declared more than once")]
    DuplicateTarget(String),
}

#[derive(Debug, Deserialize)]
struct RawProfiles {
    languages: BTreeMap<String, RawLanguage>,
    #[serde(default)]
    targets: Vec<RawTarget>,
}

#[derive(Debug, Deserialize)]
struct RawLanguage {
    extension: String,
    fallback: String,
    array: String,
    decimal: DecimalRepr,
    nullable: Nullability,
    naming: BTreeMap<String, Casing>,
    #[serde(default)]
    plural: Vec<String>,
    types: BTreeMap<String, String>,
    #[serde(default)]
    unsupported: BTreeSet<String>,
    #[serde(default)]
    imports: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct RawTarget {
    language: String,
    framework: String,
    #[serde(default)]
    features: BTreeSet<String>,
    #[serde(default)]
    dependencies: BTreeMap<String, String>,
}

/// All loaded target profiles, keyed by target.
#[derive(Debug, Clone, Default)]
pub struct ProfileSet {
    profiles: BTreeMap<TargetKey, TargetProfile>,
}

impl ProfileSet {
    /// Profiles shipped with the crate.
    pub fn builtin() -> Result<Self, ConfigError> {
        Self::from_toml(BUILTIN_PROFILES)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let raw: RawProfiles = toml::from_str(content)?;

        for (name, language) in &raw.languages {
            validate_language(name, language)?;
        }

        let mut profiles = BTreeMap::new();
        for target in raw.targets {
            let key = TargetKey::new(&target.language, &target.framework);
            let language =
                raw.languages
                    .get(&target.language)
                    .ok_or_else(|| ConfigError::UnknownLanguage {
                        target: key.to_string(),
                        language: target.language.clone(),
                    })?;
            if profiles.contains_key(&key) {
                return Err(ConfigError::DuplicateTarget(key.to_string()));
            }

            let profile = TargetProfile {
                key: key.clone(),
                extension: language.extension.clone(),
                types: language.types.clone(),
                unsupported: language.unsupported.clone(),
                fallback: language.fallback.clone(),
                array: language.array.clone(),
                decimal: language.decimal,
                nullable: language.nullable.clone(),
                naming: parse_naming(&target.language, &language.naming)?,
                plural: parse_roles(&target.language, &language.plural)?,
                imports: language.imports.clone(),
                features: target.features,
                dependencies: target.dependencies,
            };
            profiles.insert(key, profile);
        }

        debug!(targets = profiles.len(), "loaded target profiles");
        Ok(Self { profiles })
    }

    pub fn get(&self, key: &TargetKey) -> Option<&TargetProfile> {
        self.profiles.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &TargetKey> {
        self.profiles.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TargetProfile> {
        self.profiles.values()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

/// The type table must be total over every scalar the extractor produces.
fn validate_language(name: &str, language: &RawLanguage) -> Result<(), ConfigError> {
    for key in SqlType::SCALAR_KEYS {
        if !language.types.contains_key(key) && !language.unsupported.contains(key) {
            return Err(ConfigError::MissingType {
                language: name.to_string(),
                sql_type: key.to_string(),
            });
        }
    }

    let templates = [("array", &language.array)];
    let nullable = match &language.nullable {
        Nullability::Template(t) => Some(("nullable", t)),
        Nullability::Boxed(_) => None,
    };
    for (field, template) in templates.into_iter().chain(nullable) {
        if !template.contains("{}") {
            return Err(ConfigError::BadTemplate {
                language: name.to_string(),
                field,
                template: template.clone(),
            });
        }
    }
    Ok(())
}

fn parse_role(language: &str, role: &str) -> Result<Role, ConfigError> {
    match role {
        "entity" => Ok(Role::Entity),
        "field" => Ok(Role::Field),
        "route" => Ok(Role::Route),
        "file" => Ok(Role::File),
        "table" => Ok(Role::Table),
        "constant" => Ok(Role::Constant),
        other => Err(ConfigError::UnknownRole {
            language: language.to_string(),
            role: other.to_string(),
        }),
    }
}

fn parse_naming(
    language: &str,
    naming: &BTreeMap<String, Casing>,
) -> Result<BTreeMap<Role, Casing>, ConfigError> {
    naming
        .iter()
        .map(|(role, casing)| Ok((parse_role(language, role)?, *casing)))
        .collect()
}

fn parse_roles(language: &str, roles: &[String]) -> Result<BTreeSet<Role>, ConfigError> {
    roles.iter().map(|r| parse_role(language, r)).collect()
}
