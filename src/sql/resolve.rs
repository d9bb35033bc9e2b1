//! Second pass over parsed statements: applies ALTER TABLE and CREATE INDEX,
//! resolves enum column types and forward foreign-key references.

use super::parser::{AlterAction, ParsedColumn, PendingForeignKey, Statement, mark_primary_key};
use crate::ast::{Catalog, ForeignKey, SqlType, Table};
use crate::error::{ParseError, UnresolvedReference};
use tracing::debug;

/// Everything the extractor read from one script.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub catalog: Catalog,
    pub errors: Vec<ParseError>,
    pub unresolved: Vec<UnresolvedReference>,
}

/// Where a statement came from, for error reporting.
#[derive(Debug, Clone)]
pub(super) struct Origin {
    pub number: usize,
    pub snippet: String,
}

impl Origin {
    fn error(&self, reason: impl Into<String>) -> ParseError {
        ParseError {
            statement: self.number,
            snippet: self.snippet.clone(),
            reason: reason.into(),
        }
    }
}

#[derive(Default)]
pub(super) struct Resolver {
    extraction: Extraction,
    pending: Vec<(String, PendingForeignKey)>,
    deferred: Vec<(Origin, Statement)>,
}

impl Resolver {
    pub fn error(&mut self, error: ParseError) {
        self.extraction.errors.push(error);
    }

    /// First pass: collect definitions, defer statements that modify tables.
    pub fn add(&mut self, origin: Origin, statement: Statement) {
        match statement {
            Statement::CreateTable {
                table,
                foreign_keys,
                inline_enums,
                if_not_exists,
            } => {
                if self.extraction.catalog.table(&table.name).is_some() {
                    if !if_not_exists {
                        let reason = format!("table `{}` is declared more than once", table.name);
                        self.error(origin.error(reason));
                    }
                    return;
                }
                debug!(table = %table.name, columns = table.columns.len(), "parsed table");
                for fk in foreign_keys {
                    self.pending.push((table.name.clone(), fk));
                }
                for e in inline_enums {
                    self.add_enum(e);
                }
                self.extraction.catalog.tables.push(table);
            }
            Statement::CreateSequence(sequence) => {
                let catalog = &mut self.extraction.catalog;
                if !catalog.sequences.iter().any(|s| s.name == sequence.name) {
                    catalog.sequences.push(sequence);
                }
            }
            Statement::CreateEnum(e) => self.add_enum(e),
            statement @ (Statement::AlterTable { .. } | Statement::CreateIndex { .. }) => {
                self.deferred.push((origin, statement));
            }
            Statement::Skipped => {}
        }
    }

    fn add_enum(&mut self, e: crate::ast::EnumType) {
        let enums = &mut self.extraction.catalog.enums;
        if !enums.iter().any(|x| x.name == e.name) {
            enums.push(e);
        }
    }

    /// Second pass.
    pub fn finish(mut self) -> Extraction {
        for (origin, statement) in std::mem::take(&mut self.deferred) {
            if let Err(reason) = self.apply(statement) {
                self.error(origin.error(reason));
            }
        }

        self.resolve_enum_columns();

        for (table, fk) in std::mem::take(&mut self.pending) {
            self.resolve_foreign_key(&table, fk);
        }

        self.extraction
    }

    fn apply(&mut self, statement: Statement) -> Result<(), String> {
        let (table_name, actions) = match statement {
            Statement::AlterTable { table, actions } => (table, actions),
            Statement::CreateIndex { table, index } => {
                let target = self.table_mut(&table)?;
                if let Some(mut index) = index {
                    index.columns = require_columns(target, &index.columns, "CREATE INDEX")?;
                    target.indexes.push(index);
                }
                return Ok(());
            }
            _ => return Ok(()),
        };

        // Validate the whole statement before touching the table.
        let mut staged = self.table_mut(&table_name)?.clone();
        let mut new_fks = Vec::new();
        let mut new_enums = Vec::new();

        for action in actions {
            match action {
                AlterAction::AddColumn(ParsedColumn {
                    column,
                    foreign_key,
                    inline_enum,
                }) => {
                    if staged.has_column(&column.name) {
                        return Err(format!("column `{}` already exists", column.name));
                    }
                    staged.columns.push(column);
                    new_fks.extend(foreign_key);
                    new_enums.extend(inline_enum);
                }
                AlterAction::AddForeignKey(mut fk) => {
                    fk.columns = require_columns(&staged, &fk.columns, "FOREIGN KEY")?;
                    new_fks.push(fk);
                }
                AlterAction::AddUnique(mut unique) => {
                    unique.columns = require_columns(&staged, &unique.columns, "UNIQUE")?;
                    staged.uniques.push(unique);
                }
                AlterAction::AddPrimaryKey(cols) => {
                    let cols = require_columns(&staged, &cols, "PRIMARY KEY")?;
                    if !staged.primary_key.is_empty() && staged.primary_key != cols {
                        return Err(format!(
                            "table `{}` declares more than one primary key",
                            staged.name
                        ));
                    }
                    staged.primary_key = cols;
                    mark_primary_key(&mut staged);
                }
                AlterAction::AddIndex(mut index) => {
                    index.columns = require_columns(&staged, &index.columns, "INDEX")?;
                    staged.indexes.push(index);
                }
                AlterAction::SetDefault { column, expr } => {
                    let col = staged
                        .columns
                        .iter_mut()
                        .find(|c| c.name.eq_ignore_ascii_case(&column))
                        .ok_or_else(|| format!("unknown column `{}` in ALTER COLUMN", column))?;
                    if expr.to_lowercase().contains("nextval(") {
                        col.auto_increment = true;
                    }
                    col.default = Some(expr);
                }
            }
        }

        let owner = staged.name.clone();
        *self.table_mut(&table_name)? = staged;
        for fk in new_fks {
            self.pending.push((owner.clone(), fk));
        }
        for e in new_enums {
            self.add_enum(e);
        }
        Ok(())
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut Table, String> {
        self.extraction
            .catalog
            .table_mut(name)
            .ok_or_else(|| format!("unknown table `{}`", name))
    }

    /// Columns declared with a `CREATE TYPE ... AS ENUM` name become enums.
    fn resolve_enum_columns(&mut self) {
        let catalog = &mut self.extraction.catalog;
        let names: Vec<String> = catalog.enums.iter().map(|e| e.name.clone()).collect();
        for table in &mut catalog.tables {
            for column in &mut table.columns {
                resolve_enum_type(&mut column.data_type, &names);
            }
        }
    }

    fn resolve_foreign_key(&mut self, table: &str, fk: PendingForeignKey) {
        let unresolved = |reason: String| UnresolvedReference {
            table: table.to_string(),
            columns: fk.columns.clone(),
            target: fk.target_table.clone(),
            reason,
        };

        let target = match self.extraction.catalog.table(&fk.target_table) {
            None => Err(unresolved("table is not declared".to_string())),
            Some(target) => {
                let cols = fk
                    .target_columns
                    .clone()
                    .unwrap_or_else(|| target.primary_key.clone());
                if cols.is_empty() {
                    Err(unresolved("referenced table has no primary key".to_string()))
                } else if cols.len() != fk.columns.len() {
                    Err(unresolved(format!(
                        "{} column(s) reference {} column(s)",
                        fk.columns.len(),
                        cols.len()
                    )))
                } else {
                    target
                        .declared_columns(&cols)
                        .map(|cols| (target.name.clone(), cols))
                        .map_err(|missing| unresolved(format!("unknown column `{}`", missing)))
                }
            }
        };

        match target {
            Ok((target_table, target_columns)) => {
                if let Some(owner) = self.extraction.catalog.table_mut(table) {
                    owner.foreign_keys.push(ForeignKey {
                        name: fk.name,
                        columns: fk.columns,
                        target_table,
                        target_columns,
                        on_delete: fk.on_delete,
                        on_update: fk.on_update,
                    });
                }
            }
            Err(reference) => {
                debug!(%reference, "dropping foreign key");
                self.extraction.unresolved.push(reference);
            }
        }
    }
}

fn resolve_enum_type(data_type: &mut SqlType, enums: &[String]) {
    match data_type {
        SqlType::Array(inner) => resolve_enum_type(inner, enums),
        SqlType::Unknown(name) => {
            if let Some(found) = enums.iter().find(|e| e.eq_ignore_ascii_case(name)) {
                *data_type = SqlType::Enum(found.clone());
            }
        }
        _ => {}
    }
}

fn require_columns(
    table: &Table,
    columns: &[String],
    context: &str,
) -> Result<Vec<String>, String> {
    table
        .declared_columns(columns)
        .map_err(|column| format!("unknown column `{}` in {}", column, context))
}
