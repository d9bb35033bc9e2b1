//! Structural model produced by the SQL extractor.
//!
//! Everything here is a direct reading of the DDL. Derived facts
//! (relationships, junction classification, ordering) live in [`crate::ir`].
//!
//! Table and column lookups ignore ASCII case, as SQL does for unquoted
//! names. Names keep the spelling of their declaration.

use serde::Serialize;
use std::fmt;

/// Result of extraction: every table, sequence and enum type in the DDL.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Catalog {
    pub tables: Vec<Table>,
    pub sequences: Vec<Sequence>,
    pub enums: Vec<EnumType>,
}

impl Catalog {
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name.eq_ignore_ascii_case(name))
    }

    pub fn table_mut(&mut self, name: &str) -> Option<&mut Table> {
        self.tables
            .iter_mut()
            .find(|t| t.name.eq_ignore_ascii_case(name))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table {
    pub name: String,
    /// Declaration order is preserved.
    pub columns: Vec<Column>,
    pub primary_key: Vec<String>,
    pub foreign_keys: Vec<ForeignKey>,
    pub uniques: Vec<UniqueConstraint>,
    pub indexes: Vec<Index>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            primary_key: Vec::new(),
            foreign_keys: Vec::new(),
            uniques: Vec::new(),
            indexes: Vec::new(),
        }
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// `names` spelled as declared; the first unknown name is the error.
    pub fn declared_columns<'n>(&self, names: &'n [String]) -> Result<Vec<String>, &'n str> {
        names
            .iter()
            .map(|name| {
                self.column(name)
                    .map(|c| c.name.clone())
                    .ok_or(name.as_str())
            })
            .collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Columns that take part in at least one foreign key.
    pub fn foreign_key_columns(&self) -> Vec<&str> {
        let mut cols: Vec<&str> = Vec::new();
        for fk in &self.foreign_keys {
            for c in &fk.columns {
                if !cols.contains(&c.as_str()) {
                    cols.push(c);
                }
            }
        }
        cols
    }

    pub fn is_foreign_key_column(&self, column: &str) -> bool {
        self.foreign_keys
            .iter()
            .any(|fk| fk.columns.iter().any(|c| c == column))
    }

    pub fn is_primary_key_column(&self, column: &str) -> bool {
        self.primary_key.iter().any(|c| c == column)
    }

    /// Whether exactly this column set (in any order) is declared unique by a
    /// column flag, a UNIQUE constraint, a unique index or the primary key.
    pub fn is_unique_set(&self, columns: &[String]) -> bool {
        let same = |other: &[String]| {
            other.len() == columns.len() && other.iter().all(|c| columns.contains(c))
        };
        let flagged = match columns {
            [single] => self.column(single).is_some_and(|c| c.unique),
            _ => false,
        };
        flagged
            || (!self.primary_key.is_empty() && same(&self.primary_key))
            || self.uniques.iter().any(|u| same(&u.columns))
            || self.indexes.iter().any(|i| i.unique && same(&i.columns))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    pub name: String,
    /// Type text exactly as declared, e.g. `VARCHAR(255)`.
    pub declared_type: String,
    pub data_type: SqlType,
    pub nullable: bool,
    pub primary_key: bool,
    pub unique: bool,
    pub auto_increment: bool,
    pub default: Option<String>,
    pub length: Option<u32>,
    pub precision: Option<u32>,
    pub scale: Option<u32>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForeignKey {
    pub name: Option<String>,
    pub columns: Vec<String>,
    pub target_table: String,
    pub target_columns: Vec<String>,
    pub on_delete: ReferentialAction,
    pub on_update: ReferentialAction,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UniqueConstraint {
    pub name: Option<String>,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Index {
    pub name: Option<String>,
    pub columns: Vec<String>,
    pub unique: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sequence {
    pub name: String,
    pub start: Option<i64>,
    pub increment: Option<i64>,
    /// `table.column` from `OWNED BY`.
    pub owned_by: Option<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnumType {
    pub name: String,
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ReferentialAction {
    #[default]
    NoAction,
    Restrict,
    Cascade,
    SetNull,
    SetDefault,
}

impl fmt::Display for ReferentialAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NoAction => "NO ACTION",
            Self::Restrict => "RESTRICT",
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
            Self::SetDefault => "SET DEFAULT",
        };
        f.write_str(s)
    }
}

/// Canonical SQL type. Every column the extractor produces carries one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SqlType {
    SmallInt,
    Integer,
    BigInt,
    Decimal,
    Real,
    Double,
    Boolean,
    Char,
    Varchar,
    Text,
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Interval,
    Uuid,
    Json,
    Binary,
    /// Named enum type (`CREATE TYPE ... AS ENUM`) or inline MySQL `ENUM(...)`.
    Enum(String),
    Array(Box<SqlType>),
    /// Anything the extractor could not canonicalize; keeps the base name.
    Unknown(String),
}

impl SqlType {
    /// Every scalar kind, in table order. Profiles must map all of them.
    pub const SCALAR_KEYS: [&'static str; 19] = [
        "smallint",
        "integer",
        "bigint",
        "decimal",
        "real",
        "double",
        "boolean",
        "char",
        "varchar",
        "text",
        "date",
        "time",
        "timestamp",
        "timestamptz",
        "interval",
        "uuid",
        "json",
        "binary",
        "enum",
    ];

    /// Lookup key into a profile's type table.
    pub fn key(&self) -> &str {
        match self {
            Self::SmallInt => "smallint",
            Self::Integer => "integer",
            Self::BigInt => "bigint",
            Self::Decimal => "decimal",
            Self::Real => "real",
            Self::Double => "double",
            Self::Boolean => "boolean",
            Self::Char => "char",
            Self::Varchar => "varchar",
            Self::Text => "text",
            Self::Date => "date",
            Self::Time => "time",
            Self::Timestamp => "timestamp",
            Self::TimestampTz => "timestamptz",
            Self::Interval => "interval",
            Self::Uuid => "uuid",
            Self::Json => "json",
            Self::Binary => "binary",
            Self::Enum(_) => "enum",
            Self::Array(_) => "array",
            Self::Unknown(name) => name,
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Self::SmallInt | Self::Integer | Self::BigInt)
    }

    pub fn is_textual(&self) -> bool {
        matches!(self, Self::Char | Self::Varchar | Self::Text)
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enum(name) => write!(f, "enum {}", name),
            Self::Array(inner) => write!(f, "{}[]", inner),
            other => f.write_str(other.key()),
        }
    }
}
