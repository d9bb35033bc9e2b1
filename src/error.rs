//! Error and diagnostic taxonomy shared by every pipeline stage.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// A single DDL statement could not be parsed. Other statements still are.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("statement {statement}: {reason} (near `{snippet}`)")]
pub struct ParseError {
    /// 1-based position of the statement in the script.
    pub statement: usize,
    pub snippet: String,
    pub reason: String,
}

/// Tables whose foreign keys form a cycle; they were ordered by declaration.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("foreign-key cycle between {}", tables.join(", "))]
pub struct CycleWarning {
    pub tables: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("unsupported target '{target}': {reason}")]
pub struct UnsupportedTargetError {
    pub target: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{target}: {table}.{column} has type '{sql_type}', using '{fallback}'")]
pub struct UnmappedTypeWarning {
    pub target: String,
    pub table: String,
    pub column: String,
    pub sql_type: String,
    pub fallback: String,
}

/// A foreign key that points at something that cannot carry a relationship.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{table}({}) references {target}: {reason}", columns.join(", "))]
pub struct UnresolvedReference {
    pub table: String,
    pub columns: Vec<String>,
    pub target: String,
    pub reason: String,
}

/// Generated output and external scaffolding claim the same path.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("path conflict at '{path}': generated by {generated_by}, also supplied as scaffolding")]
pub struct PathConflictError {
    pub path: String,
    pub generated_by: String,
}

/// Emission failed for one target.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("formatting failed: {0}")]
    Format(#[from] fmt::Error),
    #[error("emitter for {target} produced '{path}' twice")]
    DuplicatePath { target: String, path: String },
}

/// Conditions that abort the whole request.
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("no parsable tables in input ({} statement error(s))", errors.len())]
    NoTables { errors: Vec<ParseError> },
    #[error(transparent)]
    PathConflict(#[from] PathConflictError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Warning => "warning",
            Self::Error => "error",
        })
    }
}

/// Everything the caller should be able to show an end user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    Parse(ParseError),
    Cycle(CycleWarning),
    UnsupportedTarget(UnsupportedTargetError),
    UnmappedType(UnmappedTypeWarning),
    UnresolvedReference(UnresolvedReference),
    Generation { target: String, message: String },
}

impl Diagnostic {
    pub fn severity(&self) -> Severity {
        match self {
            Self::Parse(_) | Self::UnsupportedTarget(_) | Self::Generation { .. } => {
                Severity::Error
            }
            Self::Cycle(_) | Self::UnmappedType(_) | Self::UnresolvedReference(_) => {
                Severity::Warning
            }
        }
    }

    /// Short machine-friendly label, e.g. for report tables.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Parse(_) => "parse",
            Self::Cycle(_) => "cycle",
            Self::UnsupportedTarget(_) => "unsupported-target",
            Self::UnmappedType(_) => "unmapped-type",
            Self::UnresolvedReference(_) => "unresolved-reference",
            Self::Generation { .. } => "generation",
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(e) => e.fmt(f),
            Self::Cycle(w) => w.fmt(f),
            Self::UnsupportedTarget(e) => e.fmt(f),
            Self::UnmappedType(w) => w.fmt(f),
            Self::UnresolvedReference(w) => w.fmt(f),
            Self::Generation { target, message } => write!(f, "{}: {}", target, message),
        }
    }
}

impl From<ParseError> for Diagnostic {
    fn from(e: ParseError) -> Self {
        Self::Parse(e)
    }
}

impl From<CycleWarning> for Diagnostic {
    fn from(w: CycleWarning) -> Self {
        Self::Cycle(w)
    }
}

impl From<UnsupportedTargetError> for Diagnostic {
    fn from(e: UnsupportedTargetError) -> Self {
        Self::UnsupportedTarget(e)
    }
}

impl From<UnmappedTypeWarning> for Diagnostic {
    fn from(w: UnmappedTypeWarning) -> Self {
        Self::UnmappedType(w)
    }
}

impl From<UnresolvedReference> for Diagnostic {
    fn from(w: UnresolvedReference) -> Self {
        Self::UnresolvedReference(w)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity() {
        let parse = Diagnostic::from(ParseError {
            statement: 2,
            snippet: "CREATE TABLE".to_string(),
            reason: "expected table name".to_string(),
        });
        let cycle = Diagnostic::from(CycleWarning {
            tables: vec!["a".to_string(), "b".to_string()],
        });

        assert_eq!(parse.severity(), Severity::Error);
        assert_eq!(cycle.severity(), Severity::Warning);
        assert_eq!(cycle.to_string(), "foreign-key cycle between a, b");
    }

    #[test]
    fn test_serialized_kind_tag() {
        let d = Diagnostic::from(CycleWarning {
            tables: vec!["a".to_string()],
        });
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["kind"], "cycle");
        assert_eq!(json["tables"][0], "a");
    }
}
