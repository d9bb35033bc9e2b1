use heck::{ToKebabCase, ToLowerCamelCase, ToShoutySnakeCase, ToSnakeCase, ToUpperCamelCase};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Exact `(language, framework)` pair identifying a target.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TargetKey {
    pub language: String,
    pub framework: String,
}

impl TargetKey {
    pub fn new(language: impl Into<String>, framework: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            framework: framework.into(),
        }
    }

    /// Directory prefix in an assembled archive, e.g. `rust-axum`.
    pub fn prefix(&self) -> String {
        format!("{}-{}", self.language, self.framework)
    }
}

impl fmt::Display for TargetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.language, self.framework)
    }
}

impl FromStr for TargetKey {
    type Err = String;

    /// Accepts `language/framework` or `language-framework`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        match s.split_once(['/', '-', ':']) {
            Some((lang, fw)) if !lang.is_empty() && !fw.is_empty() => Ok(Self::new(lang, fw)),
            _ => Err(format!("target '{}' is not of the form language/framework", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Casing {
    Snake,
    Camel,
    Pascal,
    Kebab,
    ScreamingSnake,
    /// Keep the identifier as written.
    Preserve,
}

impl Casing {
    pub fn apply(self, s: &str) -> String {
        match self {
            Self::Snake => s.to_snake_case(),
            Self::Camel => s.to_lower_camel_case(),
            Self::Pascal => s.to_upper_camel_case(),
            Self::Kebab => s.to_kebab_case(),
            Self::ScreamingSnake => s.to_shouty_snake_case(),
            Self::Preserve => s.to_string(),
        }
    }
}

/// What an identifier is used as in generated code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Type name of a generated entity (singular).
    Entity,
    /// Member / field / property.
    Field,
    /// URL path segment.
    Route,
    /// File or module name.
    File,
    /// Database table name as referenced from generated code.
    Table,
    /// Constant or enum member.
    Constant,
}

impl Role {
    pub const ALL: [Role; 6] = [
        Role::Entity,
        Role::Field,
        Role::Route,
        Role::File,
        Role::Table,
        Role::Constant,
    ];
}

/// How a target represents SQL decimals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecimalRepr {
    /// A real fixed-point type; precision and scale are carried.
    Fixed,
    Float,
    String,
}

/// How a nullable column type is spelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Nullability {
    /// `{}` is replaced by the type: `Option<{}>` wraps, `{} | null` suffixes.
    Template(String),
    /// Types listed here are swapped for their boxed form (`int` -> `Integer`);
    /// anything else is already nullable.
    Boxed(BTreeMap<String, String>),
}

impl Nullability {
    pub fn apply(&self, ty: &str) -> String {
        match self {
            Self::Template(t) => t.replace("{}", ty),
            Self::Boxed(table) => table.get(ty).cloned().unwrap_or_else(|| ty.to_string()),
        }
    }
}

/// Everything a target needs to turn the abstract schema into its own types
/// and identifiers. Loaded once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetProfile {
    pub key: TargetKey,
    /// Source file extension without the dot.
    pub extension: String,
    /// Canonical SQL type key -> target type. Covers every scalar key not in `unsupported`.
    pub types: BTreeMap<String, String>,
    /// Scalar keys this target has no representation for; they map to `fallback`.
    pub unsupported: BTreeSet<String>,
    pub fallback: String,
    /// Array template, e.g. `Vec<{}>`.
    pub array: String,
    pub decimal: DecimalRepr,
    pub nullable: Nullability,
    pub naming: BTreeMap<Role, Casing>,
    pub plural: BTreeSet<Role>,
    /// Qualifier or type name -> import path.
    pub imports: BTreeMap<String, String>,
    /// Feature toggles this target can honour.
    pub features: BTreeSet<String>,
    /// Dependency name -> version pin.
    pub dependencies: BTreeMap<String, String>,
}

impl TargetProfile {
    pub fn casing(&self, role: Role) -> Casing {
        self.naming.get(&role).copied().unwrap_or(Casing::Preserve)
    }

    pub fn supports(&self, feature: &str) -> bool {
        self.features.contains(feature)
    }

    /// Import path needed to use `base_type`, looked up by full name first,
    /// then by qualifier (`time.Time` -> `time`).
    pub fn import_for(&self, base_type: &str) -> Option<&str> {
        if let Some(path) = self.imports.get(base_type) {
            return Some(path);
        }
        let qualifier = base_type
            .rsplit_once("::")
            .or_else(|| base_type.rsplit_once('.'))
            .map(|(q, _)| q)?;
        self.imports.get(qualifier).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_key_parse() {
        assert_eq!(
            "rust/axum".parse::<TargetKey>(),
            Ok(TargetKey::new("rust", "axum"))
        );
        assert_eq!(
            "Go-Gin".parse::<TargetKey>(),
            Ok(TargetKey::new("go", "gin"))
        );
        assert!("rust".parse::<TargetKey>().is_err());
        assert_eq!(TargetKey::new("java", "spring").prefix(), "java-spring");
    }

    #[test]
    fn test_casing() {
        assert_eq!(Casing::Pascal.apply("order_item"), "OrderItem");
        assert_eq!(Casing::Camel.apply("order_item"), "orderItem");
        assert_eq!(Casing::Kebab.apply("order_item"), "order-item");
        assert_eq!(Casing::ScreamingSnake.apply("orderItem"), "ORDER_ITEM");
        assert_eq!(Casing::Snake.apply("OrderItem"), "order_item");
    }

    #[test]
    fn test_nullability() {
        let wrap = Nullability::Template("Option<{}>".to_string());
        assert_eq!(wrap.apply("i32"), "Option<i32>");

        let suffix = Nullability::Template("{} | null".to_string());
        assert_eq!(suffix.apply("string"), "string | null");

        let boxed = Nullability::Boxed(BTreeMap::from([(
            "int".to_string(),
            "Integer".to_string(),
        )]));
        assert_eq!(boxed.apply("int"), "Integer");
        assert_eq!(boxed.apply("String"), "String");
    }
}
