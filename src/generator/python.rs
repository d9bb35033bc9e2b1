//! Python server projects on SQLAlchemy 2.0: FastAPI with pydantic, or
//! Flask with flask-sqlalchemy and marshmallow.

use super::model::{EntityModel, FieldModel, RelationModel};
use super::{EmitContext, Emitter, FileSet};
use crate::ast::SqlType;
use crate::error::GenerationError;
use crate::ir::RelationKind;
use crate::mapping::{TargetType, map_type};
use std::collections::BTreeSet;
use std::fmt::{self, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framework {
    FastApi,
    Flask,
}

pub struct PythonEmitter {
    framework: Framework,
}

impl PythonEmitter {
    pub fn new(framework: Framework) -> Self {
        Self { framework }
    }

    /// Declarative base expression and the module providing it.
    fn base(&self) -> (&'static str, &'static str) {
        match self.framework {
            Framework::FastApi => ("Base", "from app.database import Base"),
            Framework::Flask => ("db.Model", "from app.extensions import db"),
        }
    }

    fn metadata(&self) -> &'static str {
        match self.framework {
            Framework::FastApi => "Base.metadata",
            Framework::Flask => "db.metadata",
        }
    }
}

const KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global", "if",
    "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try",
    "while", "with", "yield",
];

/// Member or module name; keywords get a trailing underscore (PEP 8).
fn ident(name: &str) -> String {
    if KEYWORDS.contains(&name) {
        format!("{}_", name)
    } else {
        name.to_string()
    }
}

/// Importable module stem of an entity.
fn module(entity: &EntityModel<'_>) -> String {
    ident(&entity.names.file)
}

fn py_str(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

/// SQLAlchemy column type and the names it needs from `sqlalchemy`.
fn column_type(sql: &SqlType, ty: &TargetType, imports: &mut BTreeSet<String>) -> String {
    let (name, rendered) = match sql {
        SqlType::SmallInt => ("SmallInteger", "SmallInteger".to_string()),
        SqlType::Integer => ("Integer", "Integer".to_string()),
        SqlType::BigInt => ("BigInteger", "BigInteger".to_string()),
        SqlType::Decimal => match (ty.precision, ty.scale) {
            (Some(p), Some(s)) => ("Numeric", format!("Numeric({}, {})", p, s)),
            (Some(p), None) => ("Numeric", format!("Numeric({})", p)),
            _ => ("Numeric", "Numeric".to_string()),
        },
        SqlType::Real => ("Float", "Float".to_string()),
        SqlType::Double => ("Double", "Double".to_string()),
        SqlType::Boolean => ("Boolean", "Boolean".to_string()),
        SqlType::Char | SqlType::Varchar => match ty.length {
            Some(n) => ("String", format!("String({})", n)),
            None => ("String", "String".to_string()),
        },
        SqlType::Text => ("Text", "Text".to_string()),
        SqlType::Date => ("Date", "Date".to_string()),
        SqlType::Time => ("Time", "Time".to_string()),
        SqlType::Timestamp => ("DateTime", "DateTime".to_string()),
        SqlType::TimestampTz => ("DateTime", "DateTime(timezone=True)".to_string()),
        SqlType::Interval => ("Interval", "Interval".to_string()),
        SqlType::Uuid => ("Uuid", "Uuid".to_string()),
        SqlType::Json => ("JSON", "JSON".to_string()),
        SqlType::Binary => ("LargeBinary", "LargeBinary".to_string()),
        SqlType::Enum(_) | SqlType::Unknown(_) => ("String", "String".to_string()),
        SqlType::Array(inner) => {
            imports.insert("ARRAY".to_string());
            return format!("ARRAY({})", column_type(inner, ty, imports));
        }
    };
    imports.insert(name.to_string());
    rendered
}

/// `import x` lines for the annotation types of a set of fields.
fn type_imports<'f>(
    ctx: &EmitContext<'_>,
    fields: impl Iterator<Item = &'f FieldModel>,
) -> BTreeSet<String> {
    fields
        .filter_map(|f| ctx.profile.import_for(&f.ty.base))
        .map(|module| format!("import {}", module))
        .collect()
}

fn uses_optional<'f>(mut fields: impl Iterator<Item = &'f FieldModel>) -> bool {
    fields.any(|f| f.ty.nullable)
}

fn key_params(entity: &EntityModel<'_>) -> String {
    entity
        .key_fields()
        .iter()
        .map(|f| format!("{}: {}", ident(&f.name), f.ty.inner))
        .collect::<Vec<_>>()
        .join(", ")
}

fn key_args(entity: &EntityModel<'_>) -> String {
    entity
        .key_fields()
        .iter()
        .map(|f| ident(&f.name))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Identity for `Session.get`: a scalar or a tuple for composite keys.
fn identity(entity: &EntityModel<'_>) -> String {
    match entity.key_fields().as_slice() {
        [single] => ident(&single.name),
        many => format!(
            "({},)",
            many.iter().map(|f| ident(&f.name)).collect::<Vec<_>>().join(", ")
        ),
    }
}

impl Emitter for PythonEmitter {
    fn emit_entity(
        &self,
        ctx: &EmitContext<'_>,
        entity: &EntityModel<'_>,
        out: &mut FileSet,
    ) -> Result<(), GenerationError> {
        let key = ctx.key();
        let file = &module(entity);
        out.add(key, format!("app/models/{}.py", file), self.model(ctx, entity)?)?;
        let schema = match self.framework {
            Framework::FastApi => pydantic_schema(ctx, entity)?,
            Framework::Flask => marshmallow_schema(ctx, entity)?,
        };
        out.add(key, format!("app/schemas/{}.py", file), schema)?;
        out.add(
            key,
            format!("app/repositories/{}.py", file),
            self.repository(ctx, entity)?,
        )?;
        out.add(key, format!("app/services/{}.py", file), self.service(ctx, entity)?)?;
        let routes = match self.framework {
            Framework::FastApi => fastapi_router(ctx, entity)?,
            Framework::Flask => flask_blueprint(ctx, entity)?,
        };
        out.add(key, format!("app/routes/{}.py", file), routes)?;
        Ok(())
    }

    fn emit_shared(&self, ctx: &EmitContext<'_>, out: &mut FileSet) -> Result<(), GenerationError> {
        let key = ctx.key();
        out.add(key, "app/__init__.py", String::new())?;

        let mut models = String::new();
        writeln!(models, "from app.models.associations import *  # noqa: F401,F403")?;
        for entity in ctx.entities {
            writeln!(
                models,
                "from app.models.{} import {}",
                module(entity),
                entity.names.entity
            )?;
        }
        writeln!(models)?;
        let names: Vec<String> = ctx.entities.iter().map(|e| py_str(&e.names.entity)).collect();
        writeln!(models, "__all__ = [{}]", names.join(", "))?;
        out.add(key, "app/models/__init__.py", models)?;
        out.add(key, "app/models/associations.py", self.associations(ctx)?)?;
        for package in ["schemas", "repositories", "services"] {
            out.add(key, format!("app/{}/__init__.py", package), String::new())?;
        }

        match self.framework {
            Framework::FastApi => fastapi_shared(ctx, out)?,
            Framework::Flask => flask_shared(ctx, out)?,
        }
        Ok(())
    }
}

impl PythonEmitter {
    fn model(&self, ctx: &EmitContext<'_>, entity: &EntityModel<'_>) -> Result<String, fmt::Error> {
        let (base, base_import) = self.base();
        let mut sa: BTreeSet<String> = BTreeSet::new();
        let mut columns = String::new();

        for field in &entity.fields {
            let ty = column_type(&field.sql_type, &field.ty, &mut sa);
            let mut args = vec![py_str(&field.column), ty];
            if let Some(fk) = entity
                .table
                .foreign_keys
                .iter()
                .find(|fk| fk.columns == [field.column.clone()])
            {
                sa.insert("ForeignKey".to_string());
                let target = fk.target_columns.first().cloned().unwrap_or_default();
                let cyclic = ctx.schema.is_deferred(&entity.table.name)
                    && ctx.schema.is_deferred(&fk.target_table);
                let alter = if cyclic { ", use_alter=True" } else { "" };
                args.push(format!(
                    "ForeignKey({}{})",
                    py_str(&format!("{}.{}", fk.target_table, target)),
                    alter
                ));
            }
            if field.primary_key {
                args.push("primary_key=True".to_string());
            }
            if field.auto_increment {
                args.push("autoincrement=True".to_string());
            }
            if field.unique && !field.primary_key {
                args.push("unique=True".to_string());
            }
            if field.ty.nullable {
                args.push("nullable=True".to_string());
            }
            if let Some(default) = &field.default {
                sa.insert("text".to_string());
                args.push(format!("server_default=text({})", py_str(default)));
            }
            if let Some(comment) = &field.comment {
                args.push(format!("comment={}", py_str(comment)));
            }
            writeln!(
                columns,
                "    {}: Mapped[{}] = mapped_column({})",
                ident(&field.name),
                field.ty.name,
                args.join(", ")
            )?;
        }

        let mut relations = String::new();
        for relation in &entity.relations {
            writeln!(relations, "    {}", self.relationship(ctx, entity, relation))?;
        }

        let mut out = String::new();
        writeln!(out, "from __future__ import annotations")?;
        writeln!(out)?;
        let std_imports = type_imports(ctx, entity.fields.iter());
        for line in &std_imports {
            writeln!(out, "{}", line)?;
        }
        let mut typing = vec!["TYPE_CHECKING"];
        if uses_optional(entity.fields.iter())
            || entity.relations.iter().any(|r| !r.kind.is_collection())
        {
            typing.push("Optional");
        }
        writeln!(out, "from typing import {}", typing.join(", "))?;
        writeln!(out)?;
        let plain: Vec<&str> = sa.iter().map(String::as_str).filter(|n| *n != "ARRAY").collect();
        if !plain.is_empty() {
            writeln!(out, "from sqlalchemy import {}", plain.join(", "))?;
        }
        if sa.contains("ARRAY") {
            writeln!(out, "from sqlalchemy.dialects.postgresql import ARRAY")?;
        }
        let orm = if entity.relations.is_empty() {
            "Mapped, mapped_column"
        } else {
            "Mapped, mapped_column, relationship"
        };
        writeln!(out, "from sqlalchemy.orm import {}", orm)?;
        writeln!(out)?;
        writeln!(out, "{}", base_import)?;

        let mut targets: Vec<(&str, &str)> = entity
            .relations
            .iter()
            .filter(|r| r.target_entity != entity.names.entity)
            .map(|r| (r.target_file.as_str(), r.target_entity.as_str()))
            .collect();
        targets.sort();
        targets.dedup();
        if !targets.is_empty() {
            // Annotation-only imports; mappers resolve classes by name
            writeln!(out)?;
            writeln!(out, "if TYPE_CHECKING:")?;
            for (file, name) in targets {
                writeln!(out, "    from app.models.{} import {}", ident(file), name)?;
            }
        }
        writeln!(out)?;
        writeln!(out)?;
        writeln!(out, "class {}({}):", entity.names.entity, base)?;
        writeln!(out, "    __tablename__ = {}", py_str(&entity.table.name))?;
        writeln!(out)?;
        out.push_str(&columns);
        if !relations.is_empty() {
            writeln!(out)?;
            out.push_str(&relations);
        }
        Ok(out)
    }

    fn relationship(
        &self,
        ctx: &EmitContext<'_>,
        entity: &EntityModel<'_>,
        relation: &RelationModel,
    ) -> String {
        let target = &relation.target_entity;
        let annotation = if relation.kind.is_collection() {
            format!("list[{}]", target)
        } else {
            format!("Optional[{}]", target)
        };
        let mut args = vec![py_str(target)];
        if let Some(other) = ctx.counterpart(entity, relation) {
            args.push(format!("back_populates={}", py_str(&ident(&other.name))));
        }
        match (&relation.via, relation.inverse) {
            (Some(junction), _) => args.push(format!("secondary={}", py_str(&junction.table))),
            (None, false) => {
                let cols: Vec<String> = relation
                    .local_columns
                    .iter()
                    .map(|c| format!("{}.{}", entity.names.entity, ident(&ctx.field_name(&entity.table.name, c))))
                    .collect();
                args.push(format!("foreign_keys={}", py_str(&format!("[{}]", cols.join(", ")))));
                if relation.target_table == entity.table.name {
                    let remote: Vec<String> = relation
                        .remote_columns
                        .iter()
                        .map(|c| format!("{}.{}", target, ident(&ctx.field_name(&relation.target_table, c))))
                        .collect();
                    args.push(format!("remote_side={}", py_str(&format!("[{}]", remote.join(", ")))));
                }
            }
            (None, true) => {
                let cols: Vec<String> = relation
                    .remote_columns
                    .iter()
                    .map(|c| format!("{}.{}", target, ident(&ctx.field_name(&relation.target_table, c))))
                    .collect();
                args.push(format!("foreign_keys={}", py_str(&format!("[{}]", cols.join(", ")))));
            }
        }
        if relation.kind == RelationKind::OneToOne {
            args.push("uselist=False".to_string());
        }
        format!(
            "{}: Mapped[{}] = relationship({})",
            ident(&relation.name),
            annotation,
            args.join(", ")
        )
    }

    /// Junction tables as plain `Table` objects so `secondary=` resolves.
    fn associations(&self, ctx: &EmitContext<'_>) -> Result<String, fmt::Error> {
        let junctions: Vec<_> = ctx
            .schema
            .tables
            .iter()
            .filter(|t| ctx.schema.is_junction(&t.name))
            .collect();
        let mut sa: BTreeSet<String> = ["Column", "ForeignKey", "Table"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let mut body = String::new();
        for table in &junctions {
            writeln!(body)?;
            writeln!(body, "{} = Table(", table.name)?;
            writeln!(body, "    {},", py_str(&table.name))?;
            writeln!(body, "    {},", self.metadata())?;
            for column in &table.columns {
                let ty = column_type(&column.data_type, &map_type(column, ctx.profile), &mut sa);
                let fk = table
                    .foreign_keys
                    .iter()
                    .find(|fk| fk.columns.contains(&column.name))
                    .and_then(|fk| {
                        let i = fk.columns.iter().position(|c| c == &column.name)?;
                        let target = fk.target_columns.get(i)?;
                        Some(format!(
                            ", ForeignKey({}, ondelete={})",
                            py_str(&format!("{}.{}", fk.target_table, target)),
                            py_str(&fk.on_delete.to_string())
                        ))
                    })
                    .unwrap_or_default();
                let pk = if table.is_primary_key_column(&column.name) {
                    ", primary_key=True"
                } else {
                    ""
                };
                writeln!(body, "    Column({}, {}{}{}),", py_str(&column.name), ty, fk, pk)?;
            }
            writeln!(body, ")")?;
        }

        let mut out = String::new();
        writeln!(out, "\"\"\"Many-to-many link tables.\"\"\"")?;
        writeln!(out)?;
        let plain: Vec<&str> = sa.iter().map(String::as_str).filter(|n| *n != "ARRAY").collect();
        writeln!(out, "from sqlalchemy import {}", plain.join(", "))?;
        if sa.contains("ARRAY") {
            writeln!(out, "from sqlalchemy.dialects.postgresql import ARRAY")?;
        }
        writeln!(out)?;
        writeln!(out, "{}", self.base().1)?;
        writeln!(out)?;
        let names: Vec<String> = junctions.iter().map(|t| py_str(&t.name)).collect();
        writeln!(out, "__all__ = [{}]", names.join(", "))?;
        out.push_str(&body);
        Ok(out)
    }

    fn repository(&self, ctx: &EmitContext<'_>, entity: &EntityModel<'_>) -> Result<String, fmt::Error> {
        let name = &entity.names.entity;
        let soft = entity
            .soft_delete_column()
            .filter(|_| ctx.features.soft_delete);
        let flask = self.framework == Framework::Flask;
        let mut out = String::new();

        writeln!(out, "from __future__ import annotations")?;
        writeln!(out)?;
        if soft.is_some() {
            writeln!(out, "import datetime")?;
        }
        for line in type_imports(ctx, entity.key_fields().into_iter()) {
            if soft.is_none() || line != "import datetime" {
                writeln!(out, "{}", line)?;
            }
        }
        writeln!(out, "from typing import Optional")?;
        writeln!(out)?;
        writeln!(out, "from sqlalchemy import func, select")?;
        if !flask {
            writeln!(out, "from sqlalchemy.orm import Session")?;
        }
        writeln!(out)?;
        if flask {
            writeln!(out, "from app.extensions import db")?;
        }
        writeln!(out, "from app.models.{} import {}", module(entity), name)?;
        writeln!(out)?;
        writeln!(out)?;
        writeln!(out, "class {}Repository:", name)?;
        if flask {
            writeln!(out, "    def __init__(self) -> None:")?;
            writeln!(out, "        self.session = db.session")?;
        } else {
            writeln!(out, "    def __init__(self, session: Session) -> None:")?;
            writeln!(out, "        self.session = session")?;
        }
        writeln!(out)?;

        let live = soft
            .map(|f| format!(".where({}.{}.is_(None))", name, ident(&f.name)))
            .unwrap_or_default();
        let order: Vec<String> = entity
            .key_fields()
            .iter()
            .map(|f| format!("{}.{}", name, ident(&f.name)))
            .collect();
        let order = if order.is_empty() {
            String::new()
        } else {
            format!(".order_by({})", order.join(", "))
        };
        writeln!(
            out,
            "    def list(self, offset: int = 0, limit: Optional[int] = None) -> list[{}]:",
            name
        )?;
        writeln!(out, "        stmt = select({}){}{}.offset(offset)", name, live, order)?;
        writeln!(out, "        if limit is not None:")?;
        writeln!(out, "            stmt = stmt.limit(limit)")?;
        writeln!(out, "        return list(self.session.scalars(stmt))")?;
        writeln!(out)?;
        writeln!(out, "    def count(self) -> int:")?;
        writeln!(
            out,
            "        return self.session.scalar(select(func.count()).select_from({}){}) or 0",
            name, live
        )?;

        if !entity.key_fields().is_empty() {
            writeln!(out)?;
            writeln!(out, "    def get(self, {}) -> Optional[{}]:", key_params(entity), name)?;
            writeln!(out, "        row = self.session.get({}, {})", name, identity(entity))?;
            if let Some(column) = soft {
                writeln!(
                    out,
                    "        if row is not None and row.{} is not None:",
                    ident(&column.name)
                )?;
                writeln!(out, "            return None")?;
            }
            writeln!(out, "        return row")?;
        }

        writeln!(out)?;
        writeln!(out, "    def save(self, row: {0}) -> {0}:", name)?;
        writeln!(out, "        self.session.add(row)")?;
        writeln!(out, "        self.session.commit()")?;
        writeln!(out, "        self.session.refresh(row)")?;
        writeln!(out, "        return row")?;
        writeln!(out)?;
        writeln!(out, "    def delete(self, row: {}) -> None:", name)?;
        match soft {
            Some(column) => writeln!(
                out,
                "        row.{} = datetime.datetime.now(datetime.timezone.utc)",
                ident(&column.name)
            )?,
            None => writeln!(out, "        self.session.delete(row)")?,
        }
        writeln!(out, "        self.session.commit()")?;
        Ok(out)
    }

    fn service(&self, ctx: &EmitContext<'_>, entity: &EntityModel<'_>) -> Result<String, fmt::Error> {
        let name = &entity.names.entity;
        let file = &module(entity);
        let caching = ctx.features.caching && !entity.key_fields().is_empty();
        let flask = self.framework == Framework::Flask;
        let mut out = String::new();

        writeln!(out, "from __future__ import annotations")?;
        writeln!(out)?;
        for line in type_imports(ctx, entity.key_fields().into_iter()) {
            writeln!(out, "{}", line)?;
        }
        writeln!(out, "from typing import Any, Optional")?;
        writeln!(out)?;
        if flask {
            writeln!(out, "from werkzeug.exceptions import NotFound")?;
        } else {
            writeln!(out, "from fastapi import HTTPException, status")?;
            writeln!(out, "from sqlalchemy.orm import Session")?;
        }
        writeln!(out)?;
        if caching {
            writeln!(out, "from app.cache import TTLCache")?;
        }
        writeln!(out, "from app.models.{} import {}", file, name)?;
        writeln!(out, "from app.repositories.{} import {}Repository", file, name)?;
        if caching {
            writeln!(out)?;
            writeln!(out, "_cache: TTLCache[{}] = TTLCache(ttl=60)", name)?;
        }
        writeln!(out)?;
        writeln!(out)?;
        writeln!(out, "class {}Service:", name)?;
        if flask {
            writeln!(out, "    def __init__(self) -> None:")?;
            writeln!(out, "        self.repository = {}Repository()", name)?;
        } else {
            writeln!(out, "    def __init__(self, session: Session) -> None:")?;
            writeln!(out, "        self.repository = {}Repository(session)", name)?;
        }
        writeln!(out)?;
        writeln!(
            out,
            "    def list(self, offset: int = 0, limit: Optional[int] = None) -> tuple[list[{}], int]:",
            name
        )?;
        writeln!(
            out,
            "        return self.repository.list(offset, limit), self.repository.count()"
        )?;

        if !entity.key_fields().is_empty() {
            let not_found = if flask {
                format!("raise NotFound({})", py_str(&format!("{} not found", name)))
            } else {
                format!(
                    "raise HTTPException(status.HTTP_404_NOT_FOUND, {})",
                    py_str(&format!("{} not found", name))
                )
            };
            let cache_key = format!("({},)", key_args(entity));
            writeln!(out)?;
            writeln!(out, "    def get(self, {}) -> {}:", key_params(entity), name)?;
            if caching {
                writeln!(out, "        cached = _cache.get({})", cache_key)?;
                writeln!(out, "        if cached is not None:")?;
                writeln!(out, "            return cached")?;
            }
            writeln!(out, "        row = self.repository.get({})", key_args(entity))?;
            writeln!(out, "        if row is None:")?;
            writeln!(out, "            {}", not_found)?;
            if caching {
                writeln!(out, "        _cache.put({}, row)", cache_key)?;
            }
            writeln!(out, "        return row")?;
            writeln!(out)?;
            writeln!(
                out,
                "    def update(self, {}, data: dict[str, Any]) -> {}:",
                key_params(entity),
                name
            )?;
            writeln!(out, "        row = self.get({})", key_args(entity))?;
            writeln!(out, "        for key, value in data.items():")?;
            writeln!(out, "            setattr(row, key, value)")?;
            if caching {
                writeln!(out, "        _cache.evict({})", cache_key)?;
            }
            writeln!(out, "        return self.repository.save(row)")?;
            writeln!(out)?;
            writeln!(out, "    def delete(self, {}) -> None:", key_params(entity))?;
            writeln!(out, "        row = self.get({})", key_args(entity))?;
            if caching {
                writeln!(out, "        _cache.evict({})", cache_key)?;
            }
            writeln!(out, "        self.repository.delete(row)")?;
        }
        writeln!(out)?;
        writeln!(out, "    def create(self, data: dict[str, Any]) -> {}:", name)?;
        writeln!(out, "        return self.repository.save({}(**data))", name)?;
        Ok(out)
    }
}

/// A keyword member is exposed under its plain name.
fn alias(field: &FieldModel, kind: &str) -> Option<String> {
    (ident(&field.name) != field.name).then(|| format!("{}={}", kind, py_str(&field.name)))
}

fn pydantic_schema(ctx: &EmitContext<'_>, entity: &EntityModel<'_>) -> Result<String, fmt::Error> {
    let name = &entity.names.entity;
    let validation = ctx.features.validation;
    let mut out = String::new();
    writeln!(out, "from __future__ import annotations")?;
    writeln!(out)?;
    for line in type_imports(ctx, entity.fields.iter()) {
        writeln!(out, "{}", line)?;
    }
    writeln!(out, "from typing import Optional")?;
    writeln!(out)?;
    writeln!(out, "from pydantic import BaseModel, ConfigDict, Field")?;
    writeln!(out)?;
    writeln!(out)?;

    let constraint = |field: &FieldModel| -> Option<String> {
        if !validation {
            return None;
        }
        match (field.ty.length, field.sql_type.is_textual()) {
            (Some(n), true) => Some(format!("max_length={}", n)),
            _ => None,
        }
    };

    writeln!(out, "class {}Create(BaseModel):", name)?;
    let inputs: Vec<&FieldModel> = entity.input_fields().collect();
    if inputs.is_empty() {
        writeln!(out, "    pass")?;
    }
    for field in &inputs {
        let default = if field.is_required_input() { None } else { Some("None") };
        let mut args: Vec<String> = Vec::new();
        if let Some(d) = default {
            args.push(format!("default={}", d));
        }
        args.extend(constraint(field));
        args.extend(alias(field, "validation_alias"));
        let ty = if field.is_required_input() || field.ty.nullable {
            field.ty.name.clone()
        } else {
            format!("Optional[{}]", field.ty.inner)
        };
        let member = ident(&field.name);
        if args.is_empty() {
            writeln!(out, "    {}: {}", member, ty)?;
        } else {
            writeln!(out, "    {}: {} = Field({})", member, ty, args.join(", "))?;
        }
    }
    writeln!(out)?;
    writeln!(out)?;
    writeln!(out, "class {}Update(BaseModel):", name)?;
    if inputs.is_empty() {
        writeln!(out, "    pass")?;
    }
    for field in &inputs {
        let mut args = vec!["default=None".to_string()];
        args.extend(constraint(field));
        args.extend(alias(field, "validation_alias"));
        writeln!(
            out,
            "    {}: Optional[{}] = Field({})",
            ident(&field.name),
            field.ty.inner,
            args.join(", ")
        )?;
    }
    writeln!(out)?;
    writeln!(out)?;
    writeln!(out, "class {}Read(BaseModel):", name)?;
    writeln!(out, "    model_config = ConfigDict(from_attributes=True)")?;
    writeln!(out)?;
    for field in &entity.fields {
        match alias(field, "serialization_alias") {
            Some(arg) => writeln!(
                out,
                "    {}: {} = Field({})",
                ident(&field.name),
                field.ty.name,
                arg
            )?,
            None => writeln!(out, "    {}: {}", field.name, field.ty.name)?,
        }
    }
    Ok(out)
}

fn marshmallow_field(field: &FieldModel, validation: bool) -> String {
    let kind = match &field.sql_type {
        SqlType::SmallInt | SqlType::Integer | SqlType::BigInt => "Integer",
        SqlType::Decimal => "Decimal",
        SqlType::Real | SqlType::Double => "Float",
        SqlType::Boolean => "Boolean",
        SqlType::Date => "Date",
        SqlType::Time => "Time",
        SqlType::Timestamp | SqlType::TimestampTz => "DateTime",
        SqlType::Interval => "TimeDelta",
        SqlType::Uuid => "UUID",
        SqlType::Json => "Raw",
        SqlType::Array(_) => "List",
        _ => "String",
    };
    let mut args: Vec<String> = Vec::new();
    if kind == "List" {
        args.push("fields.Raw()".to_string());
    }
    if field.is_generated() {
        args.push("dump_only=True".to_string());
    } else if field.is_required_input() {
        args.push("required=True".to_string());
    }
    if field.ty.nullable {
        args.push("allow_none=True".to_string());
    }
    if let (Some(n), true, true) = (field.ty.length, field.sql_type.is_textual(), validation) {
        args.push(format!("validate=validate.Length(max={})", n));
    }
    if ident(&field.name) != field.column {
        args.push(format!("data_key={}", py_str(&field.column)));
    }
    format!("fields.{}({})", kind, args.join(", "))
}

fn marshmallow_schema(ctx: &EmitContext<'_>, entity: &EntityModel<'_>) -> Result<String, fmt::Error> {
    let name = &entity.names.entity;
    let validation = ctx.features.validation;
    let mut out = String::new();
    if validation {
        writeln!(out, "from marshmallow import Schema, fields, validate")?;
    } else {
        writeln!(out, "from marshmallow import Schema, fields")?;
    }
    writeln!(out)?;
    writeln!(out)?;
    writeln!(out, "class {}Schema(Schema):", name)?;
    for field in &entity.fields {
        writeln!(
            out,
            "    {} = {}",
            ident(&field.name),
            marshmallow_field(field, validation)
        )?;
    }
    writeln!(out)?;
    writeln!(out)?;
    writeln!(out, "{}_schema = {}Schema()", entity.names.variable, name)?;
    writeln!(out, "{}_schema = {}Schema(many=True)", entity.names.collection, name)?;
    writeln!(
        out,
        "{}_update_schema = {}Schema(partial=True)",
        entity.names.variable, name
    )?;
    Ok(out)
}

fn key_path(entity: &EntityModel<'_>, flask: bool) -> String {
    entity
        .key_fields()
        .iter()
        .map(|f| {
            if flask {
                let converter = if f.ty.inner == "int" { "int:" } else { "" };
                format!("/<{}{}>", converter, ident(&f.name))
            } else {
                format!("/{{{}}}", ident(&f.name))
            }
        })
        .collect()
}

fn fastapi_router(ctx: &EmitContext<'_>, entity: &EntityModel<'_>) -> Result<String, fmt::Error> {
    let name = &entity.names.entity;
    let file = &module(entity);
    let has_key = !entity.key_fields().is_empty();
    let mut out = String::new();

    writeln!(out, "from __future__ import annotations")?;
    writeln!(out)?;
    for line in type_imports(ctx, entity.key_fields().into_iter()) {
        writeln!(out, "{}", line)?;
    }
    writeln!(out)?;
    writeln!(out, "from fastapi import APIRouter, Depends, status")?;
    writeln!(out, "from sqlalchemy.orm import Session")?;
    writeln!(out)?;
    writeln!(out, "from app.database import get_session")?;
    if ctx.features.pagination {
        writeln!(out, "from app.pagination import Page, PageParams")?;
    }
    writeln!(
        out,
        "from app.schemas.{} import {}Create, {1}Read, {1}Update",
        file, name
    )?;
    writeln!(out, "from app.services.{} import {}Service", file, name)?;
    writeln!(out)?;
    writeln!(
        out,
        "router = APIRouter(prefix=\"/{}\", tags=[{}])",
        entity.names.route,
        py_str(&entity.names.route)
    )?;
    writeln!(out)?;
    writeln!(out)?;
    writeln!(
        out,
        "def get_service(session: Session = Depends(get_session)) -> {}Service:",
        name
    )?;
    writeln!(out, "    return {}Service(session)", name)?;
    writeln!(out)?;
    writeln!(out)?;
    if ctx.features.pagination {
        writeln!(out, "@router.get(\"\", response_model=Page[{}Read])", name)?;
        writeln!(out, "def list_{}(", entity.names.collection)?;
        writeln!(out, "    params: PageParams = Depends(),")?;
        writeln!(out, "    service: {}Service = Depends(get_service),", name)?;
        writeln!(out, ") -> Page[{}Read]:", name)?;
        writeln!(out, "    items, total = service.list(params.offset, params.per_page)")?;
        writeln!(out, "    return Page.build(items, total, params)")?;
    } else {
        writeln!(out, "@router.get(\"\", response_model=list[{}Read])", name)?;
        writeln!(
            out,
            "def list_{}(service: {}Service = Depends(get_service)) -> list[{1}Read]:",
            entity.names.collection, name
        )?;
        writeln!(out, "    items, _ = service.list()")?;
        writeln!(out, "    return items")?;
    }
    writeln!(out)?;
    writeln!(out)?;
    writeln!(
        out,
        "@router.post(\"\", response_model={}Read, status_code=status.HTTP_201_CREATED)",
        name
    )?;
    writeln!(
        out,
        "def create_{}(body: {}Create, service: {1}Service = Depends(get_service)) -> {1}Read:",
        entity.names.variable, name
    )?;
    writeln!(out, "    return service.create(body.model_dump())")?;

    if has_key {
        let path = key_path(entity, false);
        writeln!(out)?;
        writeln!(out)?;
        writeln!(out, "@router.get(\"{}\", response_model={}Read)", path, name)?;
        writeln!(
            out,
            "def get_{}({}, service: {}Service = Depends(get_service)) -> {2}Read:",
            entity.names.variable,
            key_params(entity),
            name
        )?;
        writeln!(out, "    return service.get({})", key_args(entity))?;
        writeln!(out)?;
        writeln!(out)?;
        writeln!(out, "@router.put(\"{}\", response_model={}Read)", path, name)?;
        writeln!(out, "def update_{}(", entity.names.variable)?;
        writeln!(out, "    {},", key_params(entity))?;
        writeln!(out, "    body: {}Update,", name)?;
        writeln!(out, "    service: {}Service = Depends(get_service),", name)?;
        writeln!(out, ") -> {}Read:", name)?;
        writeln!(
            out,
            "    return service.update({}, body.model_dump(exclude_unset=True))",
            key_args(entity)
        )?;
        writeln!(out)?;
        writeln!(out)?;
        writeln!(
            out,
            "@router.delete(\"{}\", status_code=status.HTTP_204_NO_CONTENT)",
            path
        )?;
        writeln!(
            out,
            "def delete_{}({}, service: {}Service = Depends(get_service)) -> None:",
            entity.names.variable,
            key_params(entity),
            name
        )?;
        writeln!(out, "    service.delete({})", key_args(entity))?;
    }
    Ok(out)
}

fn flask_blueprint(ctx: &EmitContext<'_>, entity: &EntityModel<'_>) -> Result<String, fmt::Error> {
    let name = &entity.names.entity;
    let file = &module(entity);
    let var = &entity.names.variable;
    let many = &entity.names.collection;
    let mut out = String::new();

    writeln!(out, "from flask import Blueprint, jsonify, request")?;
    writeln!(out)?;
    if ctx.features.pagination {
        writeln!(out, "from app.pagination import page_params")?;
    }
    writeln!(
        out,
        "from app.schemas.{} import {}_schema, {}_schema, {1}_update_schema",
        file, var, many
    )?;
    writeln!(out, "from app.services.{} import {}Service", file, name)?;
    writeln!(out)?;
    writeln!(
        out,
        "bp = Blueprint({}, __name__, url_prefix=\"/{}\")",
        py_str(many),
        entity.names.route
    )?;
    writeln!(out)?;
    writeln!(out)?;
    writeln!(out, "@bp.get(\"\")")?;
    writeln!(out, "def list_{}():", many)?;
    if ctx.features.pagination {
        writeln!(out, "    page, per_page = page_params(request.args)")?;
        writeln!(
            out,
            "    items, total = {}Service().list((page - 1) * per_page, per_page)",
            name
        )?;
        writeln!(
            out,
            "    return jsonify(items={}_schema.dump(items), total=total, page=page, per_page=per_page)",
            many
        )?;
    } else {
        writeln!(out, "    items, _ = {}Service().list()", name)?;
        writeln!(out, "    return jsonify({}_schema.dump(items))", many)?;
    }
    writeln!(out)?;
    writeln!(out)?;
    writeln!(out, "@bp.post(\"\")")?;
    writeln!(out, "def create_{}():", var)?;
    writeln!(out, "    data = {}_schema.load(request.get_json() or {{}})", var)?;
    writeln!(out, "    row = {}Service().create(data)", name)?;
    writeln!(out, "    return jsonify({}_schema.dump(row)), 201", var)?;

    if !entity.key_fields().is_empty() {
        let path = key_path(entity, true);
        let params = key_args(entity);
        writeln!(out)?;
        writeln!(out)?;
        writeln!(out, "@bp.get(\"{}\")", path)?;
        writeln!(out, "def get_{}({}):", var, params)?;
        writeln!(
            out,
            "    return jsonify({}_schema.dump({}Service().get({})))",
            var, name, params
        )?;
        writeln!(out)?;
        writeln!(out)?;
        writeln!(out, "@bp.put(\"{}\")", path)?;
        writeln!(out, "def update_{}({}):", var, params)?;
        writeln!(
            out,
            "    data = {}_update_schema.load(request.get_json() or {{}})",
            var
        )?;
        writeln!(
            out,
            "    return jsonify({}_schema.dump({}Service().update({}, data)))",
            var, name, params
        )?;
        writeln!(out)?;
        writeln!(out)?;
        writeln!(out, "@bp.delete(\"{}\")", path)?;
        writeln!(out, "def delete_{}({}):", var, params)?;
        writeln!(out, "    {}Service().delete({})", name, params)?;
        writeln!(out, "    return \"\", 204")?;
    }
    Ok(out)
}

fn fastapi_shared(ctx: &EmitContext<'_>, out: &mut FileSet) -> Result<(), GenerationError> {
    let key = ctx.key();
    let mut main = String::new();
    writeln!(main, "from fastapi import Depends, FastAPI")?;
    writeln!(main)?;
    if ctx.features.auth {
        writeln!(main, "from app.auth import require_user")?;
    }
    if ctx.features.rate_limit {
        writeln!(main, "from app.rate_limit import install_rate_limit")?;
    }
    let modules: Vec<String> = ctx.entities.iter().map(module).collect();
    writeln!(main, "from app.routes import {}", modules.join(", "))?;
    writeln!(main)?;
    writeln!(main, "app = FastAPI(title={})", py_str(ctx.project))?;
    if ctx.features.rate_limit {
        writeln!(main, "install_rate_limit(app)")?;
    }
    let deps = if ctx.features.auth {
        ", dependencies=[Depends(require_user)]"
    } else {
        ""
    };
    writeln!(main)?;
    for module in &modules {
        writeln!(main, "app.include_router({}.router, prefix=\"/api\"{})", module, deps)?;
    }
    out.add(key, "app/main.py", main)?;
    out.add(key, "app/routes/__init__.py", String::new())?;
    out.add(key, "app/database.py", FASTAPI_DATABASE.to_string())?;
    if ctx.features.pagination {
        out.add(key, "app/pagination.py", FASTAPI_PAGINATION.to_string())?;
    }
    if ctx.features.auth {
        out.add(key, "app/auth.py", FASTAPI_AUTH.to_string())?;
    }
    if ctx.features.rate_limit {
        out.add(key, "app/rate_limit.py", FASTAPI_RATE_LIMIT.to_string())?;
    }
    if ctx.features.caching {
        out.add(key, "app/cache.py", CACHE.to_string())?;
    }
    Ok(())
}

fn flask_shared(ctx: &EmitContext<'_>, out: &mut FileSet) -> Result<(), GenerationError> {
    let key = ctx.key();
    let mut factory = String::new();
    writeln!(factory, "import os")?;
    writeln!(factory)?;
    writeln!(factory, "from flask import Blueprint, Flask")?;
    if ctx.features.validation {
        writeln!(factory, "from marshmallow import ValidationError")?;
    }
    writeln!(factory)?;
    if ctx.features.auth {
        writeln!(factory, "from app.auth import require_user")?;
    }
    writeln!(factory, "from app.extensions import db")?;
    if ctx.features.rate_limit {
        writeln!(factory, "from app.extensions import limiter")?;
    }
    let modules: Vec<String> = ctx.entities.iter().map(module).collect();
    writeln!(factory, "from app.routes import {}", modules.join(", "))?;
    writeln!(factory)?;
    writeln!(factory)?;
    writeln!(factory, "def create_app() -> Flask:")?;
    writeln!(factory, "    app = Flask({})", py_str(ctx.project))?;
    writeln!(
        factory,
        "    app.config[\"SQLALCHEMY_DATABASE_URI\"] = os.environ[\"DATABASE_URL\"]"
    )?;
    writeln!(factory, "    db.init_app(app)")?;
    if ctx.features.rate_limit {
        writeln!(factory, "    limiter.init_app(app)")?;
    }
    writeln!(factory)?;
    writeln!(factory, "    api = Blueprint(\"api\", __name__, url_prefix=\"/api\")")?;
    if ctx.features.auth {
        writeln!(factory, "    api.before_request(require_user)")?;
    }
    for module in &modules {
        writeln!(factory, "    api.register_blueprint({}.bp)", module)?;
    }
    writeln!(factory, "    app.register_blueprint(api)")?;
    if ctx.features.validation {
        writeln!(factory)?;
        writeln!(factory, "    @app.errorhandler(ValidationError)")?;
        writeln!(factory, "    def invalid(err: ValidationError):")?;
        writeln!(factory, "        return {{\"error\": err.messages}}, 422")?;
    }
    writeln!(factory)?;
    writeln!(factory, "    return app")?;
    out.add(key, "app/factory.py", factory)?;
    out.add(key, "app/routes/__init__.py", String::new())?;

    let mut extensions = String::new();
    writeln!(extensions, "from flask_sqlalchemy import SQLAlchemy")?;
    if ctx.features.rate_limit {
        writeln!(extensions, "from flask_limiter import Limiter")?;
        writeln!(extensions, "from flask_limiter.util import get_remote_address")?;
    }
    writeln!(extensions)?;
    writeln!(extensions, "db = SQLAlchemy()")?;
    if ctx.features.rate_limit {
        writeln!(
            extensions,
            "limiter = Limiter(get_remote_address, default_limits=[\"120 per minute\"])"
        )?;
    }
    out.add(key, "app/extensions.py", extensions)?;

    if ctx.features.pagination {
        out.add(key, "app/pagination.py", FLASK_PAGINATION.to_string())?;
    }
    if ctx.features.auth {
        out.add(key, "app/auth.py", FLASK_AUTH.to_string())?;
    }
    Ok(())
}

const FASTAPI_DATABASE: &str = r#"import os
from collections.abc import Iterator

from sqlalchemy import create_engine
from sqlalchemy.orm import DeclarativeBase, Session, sessionmaker

engine = create_engine(os.environ["DATABASE_URL"], pool_pre_ping=True)
SessionLocal = sessionmaker(bind=engine, expire_on_commit=False)


class Base(DeclarativeBase):
    pass


def get_session() -> Iterator[Session]:
    with SessionLocal() as session:
        yield session
"#;

const FASTAPI_PAGINATION: &str = r#"from typing import Generic, TypeVar

from fastapi import Query
from pydantic import BaseModel

T = TypeVar("T")


class PageParams:
    def __init__(
        self,
        page: int = Query(1, ge=1),
        per_page: int = Query(20, ge=1, le=100),
    ) -> None:
        self.page = page
        self.per_page = per_page

    @property
    def offset(self) -> int:
        return (self.page - 1) * self.per_page


class Page(BaseModel, Generic[T]):
    items: list[T]
    total: int
    page: int
    per_page: int

    @classmethod
    def build(cls, items, total: int, params: PageParams) -> "Page[T]":
        return cls(items=items, total=total, page=params.page, per_page=params.per_page)
"#;

const FASTAPI_AUTH: &str = r#"import os

import jwt
from fastapi import Depends, HTTPException, status
from fastapi.security import HTTPAuthorizationCredentials, HTTPBearer

bearer = HTTPBearer()


def require_user(credentials: HTTPAuthorizationCredentials = Depends(bearer)) -> dict:
    try:
        return jwt.decode(credentials.credentials, os.environ["JWT_SECRET"], algorithms=["HS256"])
    except jwt.PyJWTError as exc:
        raise HTTPException(status.HTTP_401_UNAUTHORIZED, "unauthorized") from exc
"#;

const FASTAPI_RATE_LIMIT: &str = r#"from fastapi import FastAPI
from slowapi import Limiter, _rate_limit_exceeded_handler
from slowapi.errors import RateLimitExceeded
from slowapi.middleware import SlowAPIMiddleware
from slowapi.util import get_remote_address

limiter = Limiter(key_func=get_remote_address, default_limits=["120/minute"])


def install_rate_limit(app: FastAPI) -> None:
    app.state.limiter = limiter
    app.add_exception_handler(RateLimitExceeded, _rate_limit_exceeded_handler)
    app.add_middleware(SlowAPIMiddleware)
"#;

const CACHE: &str = r#"import threading
import time
from typing import Generic, Hashable, Optional, TypeVar

T = TypeVar("T")


class TTLCache(Generic[T]):
    """Process-local read-through cache for single rows."""

    def __init__(self, ttl: float) -> None:
        self.ttl = ttl
        self._entries: dict[Hashable, tuple[float, T]] = {}
        self._lock = threading.Lock()

    def get(self, key: Hashable) -> Optional[T]:
        with self._lock:
            entry = self._entries.get(key)
        if entry is None or time.monotonic() - entry[0] > self.ttl:
            return None
        return entry[1]

    def put(self, key: Hashable, value: T) -> None:
        with self._lock:
            self._entries[key] = (time.monotonic(), value)

    def evict(self, key: Hashable) -> None:
        with self._lock:
            self._entries.pop(key, None)
"#;

const FLASK_PAGINATION: &str = r#"MAX_PER_PAGE = 100


def page_params(args) -> tuple[int, int]:
    page = max(1, args.get("page", 1, type=int))
    per_page = min(MAX_PER_PAGE, max(1, args.get("per_page", 20, type=int)))
    return page, per_page
"#;

const FLASK_AUTH: &str = r#"import os

import jwt
from flask import g, request


def require_user():
    header = request.headers.get("Authorization", "")
    if not header.startswith("Bearer "):
        return {"error": "unauthorized"}, 401
    try:
        g.claims = jwt.decode(header[7:], os.environ["JWT_SECRET"], algorithms=["HS256"])
    except jwt.PyJWTError:
        return {"error": "unauthorized"}, 401
    return None
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProfileSet;
    use crate::generator::{FeatureToggles, generate};
    use crate::infer::infer;
    use crate::ir::Schema;
    use crate::mapping::TargetKey;
    use crate::sql::{Dialect, extract};

    fn schema() -> Schema {
        infer(
            extract(
                "CREATE TABLE teams (id SERIAL PRIMARY KEY, name VARCHAR(50) NOT NULL, founded DATE);
                 CREATE TABLE players (
                     id UUID PRIMARY KEY,
                     team_id INT REFERENCES teams(id),
                     rating NUMERIC(4, 1),
                     deleted_at TIMESTAMP
                 );
                 CREATE TABLE skills (id SERIAL PRIMARY KEY, label TEXT NOT NULL);
                 CREATE TABLE player_skills (
                     player_id UUID REFERENCES players(id),
                     skill_id INT REFERENCES skills(id),
                     PRIMARY KEY (player_id, skill_id)
                 );",
                Dialect::Postgres,
            )
            .catalog,
        )
    }

    fn files(framework: Framework, fw: &str, toggles: FeatureToggles) -> FileSet {
        let profiles = ProfileSet::builtin().unwrap();
        let profile = profiles.get(&TargetKey::new("python", fw)).unwrap();
        generate(&PythonEmitter::new(framework), &schema(), profile, &toggles, "league")
            .unwrap()
            .files
    }

    #[test]
    fn test_sqlalchemy_model() {
        let files = files(Framework::FastApi, "fastapi", FeatureToggles::new());
        let player = files.get("app/models/player.py").unwrap();
        assert!(player.contains("import decimal"));
        assert!(player.contains("import uuid"));
        assert!(player.contains(
            "team_id: Mapped[Optional[int]] = mapped_column(\"team_id\", Integer, ForeignKey(\"teams.id\"), nullable=True)"
        ));
        assert!(player.contains("rating: Mapped[Optional[decimal.Decimal]] = mapped_column(\"rating\", Numeric(4, 1), nullable=True)"));
        assert!(player.contains(
            "team: Mapped[Optional[Team]] = relationship(\"Team\", back_populates=\"players\", foreign_keys=\"[Player.team_id]\")"
        ));
        assert!(player.contains("skills: Mapped[list[Skill]] = relationship(\"Skill\", back_populates=\"players\", secondary=\"player_skills\")"));
    }

    #[test]
    fn test_association_table() {
        let files = files(Framework::Flask, "flask", FeatureToggles::new());
        let links = files.get("app/models/associations.py").unwrap();
        assert!(links.contains("player_skills = Table("));
        assert!(links.contains("    db.metadata,"));
        assert!(links.contains("Column(\"skill_id\", Integer, ForeignKey(\"skills.id\", ondelete=\"NO ACTION\"), primary_key=True),"));
    }

    #[test]
    fn test_soft_delete_repository() {
        let files = files(Framework::FastApi, "fastapi", FeatureToggles::new().with("soft_delete", true));
        let repo = files.get("app/repositories/player.py").unwrap();
        assert!(repo.contains("row.deleted_at = datetime.datetime.now(datetime.timezone.utc)"));
        assert!(repo.contains(".where(Player.deleted_at.is_(None))"));
        let teams = files.get("app/repositories/team.py").unwrap();
        assert!(teams.contains("self.session.delete(row)"));
    }

    #[test]
    fn test_flask_routes() {
        let files = files(Framework::Flask, "flask", FeatureToggles::new().with("auth", true));
        let routes = files.get("app/routes/team.py").unwrap();
        assert!(routes.contains("@bp.get(\"/<int:id>\")"));
        let factory = files.get("app/factory.py").unwrap();
        assert!(factory.contains("api.before_request(require_user)"));
        assert!(files.get("app/cache.py").is_none());
    }

    #[test]
    fn test_keywords_are_escaped() {
        let schema = infer(
            extract(
                "CREATE TABLE classes (
                     id SERIAL PRIMARY KEY,
                     class TEXT,
                     import TEXT NOT NULL,
                     from_ TEXT
                 );",
                Dialect::Postgres,
            )
            .catalog,
        );
        let profiles = ProfileSet::builtin().unwrap();
        let run = |framework: Framework, fw: &str| {
            let profile = profiles.get(&TargetKey::new("python", fw)).unwrap();
            generate(&PythonEmitter::new(framework), &schema, profile, &FeatureToggles::new(), "school")
                .unwrap()
                .files
        };

        let fastapi = run(Framework::FastApi, "fastapi");
        let model = fastapi.get("app/models/class_.py").unwrap();
        assert!(model.contains("    class_: Mapped[Optional[str]] = mapped_column(\"class\", Text, nullable=True)"));
        assert!(model.contains("    import_: Mapped[str] = mapped_column(\"import\", Text)"));
        assert!(model.contains("    from_: Mapped[Optional[str]] = mapped_column(\"from_\", Text, nullable=True)"));
        let dto = fastapi.get("app/schemas/class_.py").unwrap();
        assert!(dto.contains("    class_: Optional[str] = Field(default=None, validation_alias=\"class\")"));
        assert!(dto.contains("    import_: str = Field(serialization_alias=\"import\")"));
        let main = fastapi.get("app/main.py").unwrap();
        assert!(main.contains("from app.routes import class_"));
        assert!(main.contains("app.include_router(class_.router"));

        let flask = run(Framework::Flask, "flask");
        let dto = flask.get("app/schemas/class_.py").unwrap();
        assert!(dto.contains("    class_ = fields.String(allow_none=True, data_key=\"class\")"));
        assert!(dto.contains("    import_ = fields.String(required=True, data_key=\"import\")"));
    }

    #[test]
    fn test_pydantic_constraints() {
        let files = files(Framework::FastApi, "fastapi", FeatureToggles::new());
        let schema = files.get("app/schemas/team.py").unwrap();
        assert!(schema.contains("    name: str = Field(max_length=50)"));
        assert!(schema.contains("    founded: Optional[datetime.date] = Field(default=None)"));
    }
}
