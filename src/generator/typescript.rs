//! TypeScript server projects: Express over node-postgres with zod, or
//! NestJS over TypeORM with class-validator.

use super::model::{EntityModel, FieldModel, RelationModel};
use super::query::{self, Statements};
use super::text::quote;
use super::{EmitContext, Emitter, FileSet};
use crate::error::GenerationError;
use crate::ir::RelationKind;
use std::fmt::{self, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framework {
    Express,
    Nest,
}

pub struct TypeScriptEmitter {
    framework: Framework,
}

impl TypeScriptEmitter {
    pub fn new(framework: Framework) -> Self {
        Self { framework }
    }
}

impl Emitter for TypeScriptEmitter {
    fn emit_entity(
        &self,
        ctx: &EmitContext<'_>,
        entity: &EntityModel<'_>,
        out: &mut FileSet,
    ) -> Result<(), GenerationError> {
        let key = ctx.key();
        let file = &entity.names.file;
        match self.framework {
            Framework::Express => {
                out.add(key, format!("src/models/{}.ts", file), express::model(entity)?)?;
                out.add(key, format!("src/dto/{}.dto.ts", file), express::dto(ctx, entity)?)?;
                out.add(
                    key,
                    format!("src/repositories/{}.repository.ts", file),
                    express::repository(ctx, entity)?,
                )?;
                out.add(
                    key,
                    format!("src/services/{}.service.ts", file),
                    express::service(ctx, entity)?,
                )?;
                out.add(
                    key,
                    format!("src/routes/{}.routes.ts", file),
                    express::routes(ctx, entity)?,
                )?;
            }
            Framework::Nest => {
                let dir = format!("src/{}", file);
                out.add(key, format!("{}/{}.entity.ts", dir, file), nest::entity(ctx, entity)?)?;
                out.add(key, format!("{}/dto/{}.dto.ts", dir, file), nest::dto(ctx, entity)?)?;
                out.add(
                    key,
                    format!("{}/{}.repository.ts", dir, file),
                    nest::repository(ctx, entity)?,
                )?;
                out.add(key, format!("{}/{}.service.ts", dir, file), nest::service(ctx, entity)?)?;
                out.add(
                    key,
                    format!("{}/{}.controller.ts", dir, file),
                    nest::controller(ctx, entity)?,
                )?;
                out.add(key, format!("{}/{}.module.ts", dir, file), nest::module(entity)?)?;
            }
        }
        Ok(())
    }

    fn emit_shared(&self, ctx: &EmitContext<'_>, out: &mut FileSet) -> Result<(), GenerationError> {
        match self.framework {
            Framework::Express => express::shared(ctx, out),
            Framework::Nest => nest::shared(ctx, out),
        }
    }
}

/// Route parameter conversion for one key field.
fn parse_param(field: &FieldModel, source: &str) -> String {
    if field.ty.inner == "number" {
        format!("Number({})", source)
    } else {
        source.to_string()
    }
}

fn single_quote(s: &str) -> String {
    format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'"))
}

fn relation_type(relation: &RelationModel) -> String {
    if relation.kind.is_collection() {
        format!("{}[]", relation.target_entity)
    } else {
        relation.target_entity.clone()
    }
}

mod express {
    use super::*;

    pub fn model(entity: &EntityModel<'_>) -> Result<String, fmt::Error> {
        let mut out = String::new();
        let mut imports: Vec<(&str, &str)> = entity
            .relations
            .iter()
            .filter(|r| r.target_entity != entity.names.entity)
            .map(|r| (r.target_file.as_str(), r.target_entity.as_str()))
            .collect();
        imports.sort();
        imports.dedup();
        // Type-only imports keep cyclic modules free of runtime edges
        for (file, name) in &imports {
            writeln!(out, "import type {{ {} }} from './{}';", name, file)?;
        }
        if !imports.is_empty() {
            writeln!(out)?;
        }

        writeln!(
            out,
            "export const {}_TABLE = {};",
            entity.names.constant,
            single_quote(&entity.table.name)
        )?;
        writeln!(out)?;
        writeln!(out, "export interface {} {{", entity.names.entity)?;
        for field in &entity.fields {
            if let Some(comment) = &field.comment {
                writeln!(out, "  /** {} */", comment)?;
            }
            writeln!(out, "  {}: {};", field.name, field.ty.name)?;
        }
        for relation in &entity.relations {
            writeln!(out, "  {}?: {};", relation.name, relation_type(relation))?;
        }
        writeln!(out, "}}")?;
        writeln!(out)?;

        writeln!(
            out,
            "export function to{0}(row: Record<string, unknown>): {0} {{",
            entity.names.entity
        )?;
        writeln!(out, "  return {{")?;
        for field in &entity.fields {
            writeln!(
                out,
                "    {}: row[{}] as {},",
                field.name,
                single_quote(&field.column),
                field.ty.name
            )?;
        }
        writeln!(out, "  }};")?;
        writeln!(out, "}}")?;
        Ok(out)
    }

    fn zod(field: &FieldModel) -> String {
        let mut schema = match field.ty.inner.as_str() {
            "number" if field.sql_type.is_integer() => "z.number().int()".to_string(),
            "number" => "z.number()".to_string(),
            "boolean" => "z.boolean()".to_string(),
            "Date" => "z.coerce.date()".to_string(),
            "unknown" => "z.unknown()".to_string(),
            "Buffer" => "z.instanceof(Buffer)".to_string(),
            "string" if matches!(field.sql_type, crate::ast::SqlType::Uuid) => {
                "z.string().uuid()".to_string()
            }
            "string" => match field.ty.length {
                Some(max) if field.sql_type.is_textual() => format!("z.string().max({})", max),
                _ => "z.string()".to_string(),
            },
            other if other.ends_with("[]") => "z.array(z.unknown())".to_string(),
            _ => "z.unknown()".to_string(),
        };
        if field.ty.nullable {
            schema.push_str(".nullable()");
        }
        if !field.is_required_input() {
            schema.push_str(".optional()");
        }
        schema
    }

    pub fn dto(ctx: &EmitContext<'_>, entity: &EntityModel<'_>) -> Result<String, fmt::Error> {
        let name = &entity.names.entity;
        let mut out = String::new();
        if ctx.features.validation {
            writeln!(out, "import {{ z }} from 'zod';")?;
            writeln!(out)?;
            writeln!(out, "export const create{}Schema = z.object({{", name)?;
            for field in entity.input_fields() {
                writeln!(out, "  {}: {},", field.name, zod(field))?;
            }
            writeln!(out, "}});")?;
            writeln!(out)?;
            writeln!(
                out,
                "export const update{0}Schema = create{0}Schema.partial();",
                name
            )?;
            writeln!(out)?;
            writeln!(out, "export type Create{0}Dto = z.infer<typeof create{0}Schema>;", name)?;
            writeln!(out, "export type Update{0}Dto = z.infer<typeof update{0}Schema>;", name)?;
        } else {
            writeln!(out, "export interface Create{}Dto {{", name)?;
            for field in entity.input_fields() {
                let optional = if field.is_required_input() { "" } else { "?" };
                writeln!(out, "  {}{}: {};", field.name, optional, field.ty.name)?;
            }
            writeln!(out, "}}")?;
            writeln!(out)?;
            writeln!(out, "export type Update{0}Dto = Partial<Create{0}Dto>;", name)?;
        }
        Ok(out)
    }

    fn key_params(entity: &EntityModel<'_>) -> String {
        entity
            .key_fields()
            .iter()
            .map(|f| format!("{}: {}", f.name, f.ty.inner))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn key_args(entity: &EntityModel<'_>) -> String {
        entity
            .key_fields()
            .iter()
            .map(|f| f.name.clone())
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn repository(ctx: &EmitContext<'_>, entity: &EntityModel<'_>) -> Result<String, fmt::Error> {
        let stmts = Statements::new(entity, ctx.features.pagination, ctx.features.soft_delete);
        let name = &entity.names.entity;
        let file = &entity.names.file;
        let mut out = String::new();

        writeln!(out, "import {{ pool }} from '../db';")?;
        writeln!(out, "import {{ Create{0}Dto, Update{0}Dto }} from '../dto/{1}.dto';", name, file)?;
        writeln!(out, "import {{ {0}, to{0} }} from '../models/{1}';", name, file)?;
        let mut targets: Vec<(&str, &str)> = entity
            .relations
            .iter()
            .filter(|r| r.target_entity != *name)
            .map(|r| (r.target_file.as_str(), r.target_entity.as_str()))
            .collect();
        targets.sort();
        targets.dedup();
        for (target_file, target) in targets {
            writeln!(out, "import {{ {0}, to{0} }} from '../models/{1}';", target, target_file)?;
        }
        writeln!(out)?;

        writeln!(out, "export class {}Repository {{", name)?;
        if ctx.features.pagination {
            writeln!(out, "  async list(limit: number, offset: number): Promise<{}[]> {{", name)?;
            writeln!(
                out,
                "    const {{ rows }} = await pool.query({}, [limit, offset]);",
                quote(&stmts.list)
            )?;
        } else {
            writeln!(out, "  async list(): Promise<{}[]> {{", name)?;
            writeln!(out, "    const {{ rows }} = await pool.query({});", quote(&stmts.list))?;
        }
        writeln!(out, "    return rows.map(to{});", name)?;
        writeln!(out, "  }}")?;
        writeln!(out)?;

        writeln!(out, "  async count(): Promise<number> {{")?;
        writeln!(out, "    const {{ rows }} = await pool.query({});", quote(&stmts.count))?;
        writeln!(out, "    return Number(rows[0].count);")?;
        writeln!(out, "  }}")?;

        if let Some(find) = &stmts.find {
            writeln!(out)?;
            writeln!(
                out,
                "  async find({}): Promise<{} | undefined> {{",
                key_params(entity),
                name
            )?;
            writeln!(
                out,
                "    const {{ rows }} = await pool.query({}, [{}]);",
                quote(find),
                key_args(entity)
            )?;
            writeln!(out, "    return rows[0] ? to{}(rows[0]) : undefined;", name)?;
            writeln!(out, "  }}")?;
        }

        let input_values: Vec<String> = entity
            .input_fields()
            .map(|f| format!("input.{} ?? null", f.name))
            .collect();
        writeln!(out)?;
        writeln!(out, "  async create(input: Create{0}Dto): Promise<{0}> {{", name)?;
        writeln!(
            out,
            "    const {{ rows }} = await pool.query({}, [{}]);",
            quote(&stmts.insert),
            input_values.join(", ")
        )?;
        writeln!(out, "    return to{}(rows[0]);", name)?;
        writeln!(out, "  }}")?;

        if let Some(update) = &stmts.update {
            let mut values = input_values.clone();
            values.extend(entity.key_fields().iter().map(|f| f.name.clone()));
            writeln!(out)?;
            writeln!(
                out,
                "  async update({}, input: Update{}Dto): Promise<{1} | undefined> {{",
                key_params(entity),
                name
            )?;
            writeln!(
                out,
                "    const {{ rows }} = await pool.query({}, [{}]);",
                quote(update),
                values.join(", ")
            )?;
            writeln!(out, "    return rows[0] ? to{}(rows[0]) : undefined;", name)?;
            writeln!(out, "  }}")?;
        }

        if let Some(delete) = &stmts.delete {
            writeln!(out)?;
            writeln!(out, "  async delete({}): Promise<boolean> {{", key_params(entity))?;
            writeln!(
                out,
                "    const result = await pool.query({}, [{}]);",
                quote(delete),
                key_args(entity)
            )?;
            writeln!(out, "    return (result.rowCount ?? 0) > 0;")?;
            writeln!(out, "  }}")?;
        }

        for relation in &entity.relations {
            let args: Vec<String> = relation
                .local_columns
                .iter()
                .filter_map(|c| entity.field(c))
                .map(|f| format!("row.{}", f.name))
                .collect();
            let returns = if relation.kind.is_collection() {
                format!("{}[]", relation.target_entity)
            } else {
                format!("{} | undefined", relation.target_entity)
            };
            writeln!(out)?;
            writeln!(
                out,
                "  async {}(row: {}): Promise<{}> {{",
                relation.name, name, returns
            )?;
            writeln!(
                out,
                "    const {{ rows }} = await pool.query({}, [{}]);",
                quote(&query::related(relation)),
                args.join(", ")
            )?;
            if relation.kind.is_collection() {
                writeln!(out, "    return rows.map(to{});", relation.target_entity)?;
            } else {
                writeln!(
                    out,
                    "    return rows[0] ? to{}(rows[0]) : undefined;",
                    relation.target_entity
                )?;
            }
            writeln!(out, "  }}")?;
        }
        writeln!(out, "}}")?;
        Ok(out)
    }

    pub fn service(ctx: &EmitContext<'_>, entity: &EntityModel<'_>) -> Result<String, fmt::Error> {
        let name = &entity.names.entity;
        let file = &entity.names.file;
        let has_key = !entity.key_fields().is_empty();
        let mut out = String::new();

        writeln!(out, "import {{ Create{0}Dto, Update{0}Dto }} from '../dto/{1}.dto';", name, file)?;
        writeln!(out, "import {{ NotFoundError }} from '../middleware/error';")?;
        writeln!(out, "import {{ {} }} from '../models/{}';", name, file)?;
        if ctx.features.pagination {
            writeln!(out, "import {{ Page, PageParams }} from '../pagination';")?;
        }
        writeln!(out, "import {{ {0}Repository }} from '../repositories/{1}.repository';", name, file)?;
        writeln!(out)?;
        writeln!(out, "export class {}Service {{", name)?;
        writeln!(
            out,
            "  constructor(private readonly repository = new {}Repository()) {{}}",
            name
        )?;
        writeln!(out)?;
        if ctx.features.pagination {
            writeln!(out, "  async list(params: PageParams): Promise<Page<{}>> {{", name)?;
            writeln!(out, "    const [items, total] = await Promise.all([")?;
            writeln!(out, "      this.repository.list(params.limit, params.offset),")?;
            writeln!(out, "      this.repository.count(),")?;
            writeln!(out, "    ]);")?;
            writeln!(out, "    return {{ items, total, page: params.page, perPage: params.limit }};")?;
        } else {
            writeln!(out, "  list(): Promise<{}[]> {{", name)?;
            writeln!(out, "    return this.repository.list();")?;
        }
        writeln!(out, "  }}")?;

        if has_key {
            writeln!(out)?;
            writeln!(out, "  async get({}): Promise<{}> {{", key_params(entity), name)?;
            writeln!(out, "    const row = await this.repository.find({});", key_args(entity))?;
            writeln!(out, "    if (!row) throw new NotFoundError({});", single_quote(name))?;
            writeln!(out, "    return row;")?;
            writeln!(out, "  }}")?;
        }

        writeln!(out)?;
        writeln!(out, "  create(input: Create{0}Dto): Promise<{0}> {{", name)?;
        writeln!(out, "    return this.repository.create(input);")?;
        writeln!(out, "  }}")?;

        if has_key && entity.input_fields().next().is_some() {
            writeln!(out)?;
            writeln!(
                out,
                "  async update({}, input: Update{}Dto): Promise<{1}> {{",
                key_params(entity),
                name
            )?;
            writeln!(
                out,
                "    const row = await this.repository.update({}, input);",
                key_args(entity)
            )?;
            writeln!(out, "    if (!row) throw new NotFoundError({});", single_quote(name))?;
            writeln!(out, "    return row;")?;
            writeln!(out, "  }}")?;
        }

        if has_key {
            writeln!(out)?;
            writeln!(out, "  async delete({}): Promise<void> {{", key_params(entity))?;
            writeln!(
                out,
                "    if (!(await this.repository.delete({}))) throw new NotFoundError({});",
                key_args(entity),
                single_quote(name)
            )?;
            writeln!(out, "  }}")?;
        }
        writeln!(out, "}}")?;
        Ok(out)
    }

    pub fn routes(ctx: &EmitContext<'_>, entity: &EntityModel<'_>) -> Result<String, fmt::Error> {
        let name = &entity.names.entity;
        let file = &entity.names.file;
        let keys = entity.key_fields();
        let mut out = String::new();

        writeln!(out, "import {{ Router }} from 'express';")?;
        if ctx.features.validation {
            writeln!(
                out,
                "import {{ create{0}Schema, update{0}Schema }} from '../dto/{1}.dto';",
                name, file
            )?;
        }
        if ctx.features.pagination {
            writeln!(out, "import {{ pageParams }} from '../pagination';")?;
        }
        writeln!(out, "import {{ {0}Service }} from '../services/{1}.service';", name, file)?;
        writeln!(out)?;
        writeln!(out, "const service = new {}Service();", name)?;
        writeln!(out)?;
        writeln!(out, "export const {}Router = Router();", entity.names.variable)?;
        writeln!(out)?;

        let base = format!("/{}", entity.names.route);
        let item: String = keys.iter().map(|f| format!("/:{}", f.name)).collect();
        let params: Vec<String> = keys
            .iter()
            .map(|f| parse_param(f, &format!("req.params.{}", f.name)))
            .collect();
        let parse = |schema: &str| {
            if ctx.features.validation {
                format!("{}.parse(req.body)", schema)
            } else {
                "req.body".to_string()
            }
        };

        writeln!(
            out,
            "{}Router.get({}, async (req, res) => {{",
            entity.names.variable,
            single_quote(&base)
        )?;
        if ctx.features.pagination {
            writeln!(out, "  res.json(await service.list(pageParams(req.query)));")?;
        } else {
            writeln!(out, "  res.json(await service.list());")?;
        }
        writeln!(out, "}});")?;
        writeln!(out)?;

        writeln!(
            out,
            "{}Router.post({}, async (req, res) => {{",
            entity.names.variable,
            single_quote(&base)
        )?;
        writeln!(
            out,
            "  res.status(201).json(await service.create({}));",
            parse(&format!("create{}Schema", name))
        )?;
        writeln!(out, "}});")?;

        if !keys.is_empty() {
            let path = single_quote(&format!("{}{}", base, item));
            writeln!(out)?;
            writeln!(out, "{}Router.get({}, async (req, res) => {{", entity.names.variable, path)?;
            writeln!(out, "  res.json(await service.get({}));", params.join(", "))?;
            writeln!(out, "}});")?;

            if entity.input_fields().next().is_some() {
                writeln!(out)?;
                writeln!(out, "{}Router.put({}, async (req, res) => {{", entity.names.variable, path)?;
                writeln!(
                    out,
                    "  res.json(await service.update({}, {}));",
                    params.join(", "),
                    parse(&format!("update{}Schema", name))
                )?;
                writeln!(out, "}});")?;
            }

            writeln!(out)?;
            writeln!(out, "{}Router.delete({}, async (req, res) => {{", entity.names.variable, path)?;
            writeln!(out, "  await service.delete({});", params.join(", "))?;
            writeln!(out, "  res.status(204).end();")?;
            writeln!(out, "}});")?;
        }
        Ok(out)
    }

    pub fn shared(ctx: &EmitContext<'_>, out: &mut FileSet) -> Result<(), GenerationError> {
        let key = ctx.key();

        let mut index = String::new();
        writeln!(index, "import {{ Router }} from 'express';")?;
        for entity in ctx.entities {
            writeln!(
                index,
                "import {{ {}Router }} from './{}.routes';",
                entity.names.variable, entity.names.file
            )?;
        }
        writeln!(index)?;
        writeln!(index, "export const api = Router();")?;
        for entity in ctx.entities {
            writeln!(index, "api.use({}Router);", entity.names.variable)?;
        }
        out.add(key, "src/routes/index.ts", index)?;

        let mut app = String::new();
        writeln!(app, "import express from 'express';")?;
        if ctx.features.auth {
            writeln!(app, "import {{ requireAuth }} from './middleware/auth';")?;
        }
        writeln!(app, "import {{ errorHandler }} from './middleware/error';")?;
        if ctx.features.rate_limit {
            writeln!(app, "import {{ rateLimiter }} from './middleware/rate-limit';")?;
        }
        writeln!(app, "import {{ api }} from './routes';")?;
        writeln!(app)?;
        writeln!(app, "export const app = express();")?;
        writeln!(app)?;
        writeln!(app, "app.use(express.json());")?;
        if ctx.features.rate_limit {
            writeln!(app, "app.use(rateLimiter);")?;
        }
        if ctx.features.auth {
            writeln!(app, "app.use('/api', requireAuth, api);")?;
        } else {
            writeln!(app, "app.use('/api', api);")?;
        }
        writeln!(app, "app.use(errorHandler);")?;
        out.add(key, "src/app.ts", app)?;

        let mut server = String::new();
        writeln!(server, "import {{ app }} from './app';")?;
        writeln!(server)?;
        writeln!(server, "const port = Number(process.env.PORT ?? 3000);")?;
        writeln!(server)?;
        writeln!(server, "app.listen(port, () => {{")?;
        writeln!(server, "  console.log(`{} listening on ${{port}}`);", ctx.project)?;
        writeln!(server, "}});")?;
        out.add(key, "src/server.ts", server)?;

        out.add(key, "src/db.ts", DB.to_string())?;
        out.add(key, "src/middleware/error.ts", error(ctx)?)?;
        if ctx.features.pagination {
            out.add(key, "src/pagination.ts", PAGINATION.to_string())?;
        }
        if ctx.features.auth {
            out.add(key, "src/middleware/auth.ts", AUTH.to_string())?;
        }
        if ctx.features.rate_limit {
            out.add(key, "src/middleware/rate-limit.ts", RATE_LIMIT.to_string())?;
        }
        Ok(())
    }

    fn error(ctx: &EmitContext<'_>) -> Result<String, fmt::Error> {
        let mut out = String::new();
        writeln!(out, "import {{ NextFunction, Request, Response }} from 'express';")?;
        if ctx.features.validation {
            writeln!(out, "import {{ ZodError }} from 'zod';")?;
        }
        writeln!(out)?;
        writeln!(out, "export class NotFoundError extends Error {{")?;
        writeln!(out, "  constructor(entity: string) {{")?;
        writeln!(out, "    super(`${{entity}} not found`);")?;
        writeln!(out, "  }}")?;
        writeln!(out, "}}")?;
        writeln!(out)?;
        writeln!(
            out,
            "export function errorHandler(err: unknown, _req: Request, res: Response, _next: NextFunction) {{"
        )?;
        writeln!(out, "  if (err instanceof NotFoundError) {{")?;
        writeln!(out, "    res.status(404).json({{ error: err.message }});")?;
        writeln!(out, "    return;")?;
        writeln!(out, "  }}")?;
        if ctx.features.validation {
            writeln!(out, "  if (err instanceof ZodError) {{")?;
            writeln!(out, "    res.status(422).json({{ error: err.issues }});")?;
            writeln!(out, "    return;")?;
            writeln!(out, "  }}")?;
        }
        writeln!(out, "  res.status(500).json({{ error: 'internal error' }});")?;
        writeln!(out, "}}")?;
        Ok(out)
    }

    const DB: &str = "import { Pool } from 'pg';

export const pool = new Pool({ connectionString: process.env.DATABASE_URL });
";

    const PAGINATION: &str = "export interface PageParams {
  page: number;
  limit: number;
  offset: number;
}

export interface Page<T> {
  items: T[];
  total: number;
  page: number;
  perPage: number;
}

const MAX_PER_PAGE = 100;

export function pageParams(query: Record<string, unknown>): PageParams {
  const page = Math.max(1, Number(query.page ?? 1) || 1);
  const limit = Math.min(MAX_PER_PAGE, Math.max(1, Number(query.perPage ?? 20) || 20));
  return { page, limit, offset: (page - 1) * limit };
}
";

    const AUTH: &str = "import { NextFunction, Request, Response } from 'express';
import jwt from 'jsonwebtoken';

export function requireAuth(req: Request, res: Response, next: NextFunction) {
  const header = req.headers.authorization ?? '';
  const token = header.startsWith('Bearer ') ? header.slice(7) : undefined;
  if (!token) {
    res.status(401).json({ error: 'unauthorized' });
    return;
  }
  try {
    res.locals.claims = jwt.verify(token, process.env.JWT_SECRET ?? '');
    next();
  } catch {
    res.status(401).json({ error: 'unauthorized' });
  }
}
";

    const RATE_LIMIT: &str = "import rateLimit from 'express-rate-limit';

export const rateLimiter = rateLimit({
  windowMs: 60_000,
  limit: 120,
  standardHeaders: 'draft-7',
  legacyHeaders: false,
});
";
}

mod nest {
    use super::*;
    use heck::ToLowerCamelCase;

    fn column_decorator(field: &FieldModel) -> String {
        if field.primary_key && field.auto_increment {
            return format!("@PrimaryGeneratedColumn({{ name: {} }})", single_quote(&field.column));
        }
        if field.primary_key {
            return format!("@PrimaryColumn({{ name: {} }})", single_quote(&field.column));
        }
        let mut options = vec![format!("name: {}", single_quote(&field.column))];
        if field.ty.nullable {
            options.push("nullable: true".to_string());
        }
        if field.unique {
            options.push("unique: true".to_string());
        }
        if let (Some(length), true) = (field.ty.length, field.sql_type.is_textual()) {
            options.push(format!("length: {}", length));
        }
        format!("@Column({{ {} }})", options.join(", "))
    }

    fn relation_decorator(
        ctx: &EmitContext<'_>,
        entity: &EntityModel<'_>,
        relation: &RelationModel,
    ) -> Vec<String> {
        let target = &relation.target_entity;
        let back = inverse_name(ctx, entity, relation);
        let lazy = format!("() => {}", target);
        match (relation.kind, relation.inverse) {
            (RelationKind::ManyToOne, _) => {
                let join: Vec<String> = relation
                    .local_columns
                    .iter()
                    .zip(&relation.remote_columns)
                    .map(|(l, r)| {
                        format!(
                            "{{ name: {}, referencedColumnName: {} }}",
                            single_quote(l),
                            single_quote(&remote_field(r))
                        )
                    })
                    .collect();
                vec![
                    format!("@ManyToOne({})", lazy),
                    format!("@JoinColumn([{}])", join.join(", ")),
                ]
            }
            (RelationKind::OneToMany, _) => {
                vec![format!("@OneToMany({}, (other) => other.{})", lazy, back)]
            }
            (RelationKind::OneToOne, false) => {
                let join: Vec<String> = relation
                    .local_columns
                    .iter()
                    .zip(&relation.remote_columns)
                    .map(|(l, r)| {
                        format!(
                            "{{ name: {}, referencedColumnName: {} }}",
                            single_quote(l),
                            single_quote(&remote_field(r))
                        )
                    })
                    .collect();
                vec![
                    format!("@OneToOne({}, (other) => other.{})", lazy, back),
                    format!("@JoinColumn([{}])", join.join(", ")),
                ]
            }
            (RelationKind::OneToOne, true) => {
                vec![format!("@OneToOne({}, (other) => other.{})", lazy, back)]
            }
            (RelationKind::ManyToMany, inverse) => {
                let mut lines = vec![format!("@ManyToMany({}, (other) => other.{})", lazy, back)];
                if let (Some(junction), false) = (&relation.via, inverse) {
                    let side = |cols: &[String], refs: &[String]| {
                        cols.iter()
                            .zip(refs)
                            .map(|(c, r)| {
                                format!(
                                    "{{ name: {}, referencedColumnName: {} }}",
                                    single_quote(c),
                                    single_quote(&remote_field(r))
                                )
                            })
                            .collect::<Vec<_>>()
                            .join(", ")
                    };
                    lines.push(format!(
                        "@JoinTable({{ name: {}, joinColumns: [{}], inverseJoinColumns: [{}] }})",
                        single_quote(&junction.table),
                        side(&junction.local_columns, &relation.local_columns),
                        side(&junction.remote_columns, &relation.remote_columns)
                    ));
                }
                lines
            }
        }
    }

    /// TypeORM references properties, not columns.
    fn remote_field(column: &str) -> String {
        column.to_lower_camel_case()
    }

    /// Property name of the same relationship on the other entity.
    fn inverse_name(ctx: &EmitContext<'_>, entity: &EntityModel<'_>, relation: &RelationModel) -> String {
        ctx.counterpart(entity, relation)
            .map(|other| other.name.clone())
            .unwrap_or_else(|| entity.names.collection.clone())
    }

    pub fn entity(ctx: &EmitContext<'_>, entity: &EntityModel<'_>) -> Result<String, fmt::Error> {
        let mut out = String::new();
        let mut decorators = vec!["Entity"];
        let fields = &entity.fields;
        if fields.iter().any(|f| f.primary_key && f.auto_increment) {
            decorators.push("PrimaryGeneratedColumn");
        }
        if fields.iter().any(|f| f.primary_key && !f.auto_increment) {
            decorators.push("PrimaryColumn");
        }
        if fields.iter().any(|f| !f.primary_key) {
            decorators.push("Column");
        }
        for relation in &entity.relations {
            let names: &[&str] = match (relation.kind, relation.inverse) {
                (RelationKind::ManyToOne, _) => &["ManyToOne", "JoinColumn"],
                (RelationKind::OneToMany, _) => &["OneToMany"],
                (RelationKind::OneToOne, false) => &["OneToOne", "JoinColumn"],
                (RelationKind::OneToOne, true) => &["OneToOne"],
                (RelationKind::ManyToMany, false) => &["ManyToMany", "JoinTable"],
                (RelationKind::ManyToMany, true) => &["ManyToMany"],
            };
            decorators.extend(names);
        }
        if entity.relations.iter().any(|r| r.deferred) {
            decorators.push("Relation");
        }
        decorators.sort();
        decorators.dedup();
        writeln!(out, "import {{ {} }} from 'typeorm';", decorators.join(", "))?;

        let mut targets: Vec<(&str, &str)> = entity
            .relations
            .iter()
            .filter(|r| r.target_entity != entity.names.entity)
            .map(|r| (r.target_file.as_str(), r.target_entity.as_str()))
            .collect();
        targets.sort();
        targets.dedup();
        for (file, name) in targets {
            writeln!(out, "import {{ {} }} from '../{}/{}.entity';", name, file, file)?;
        }
        writeln!(out)?;

        writeln!(out, "@Entity({{ name: {} }})", single_quote(&entity.table.name))?;
        writeln!(out, "export class {} {{", entity.names.entity)?;
        for field in fields {
            writeln!(out, "  {}", column_decorator(field))?;
            writeln!(out, "  {}!: {};", field.name, field.ty.name)?;
            writeln!(out)?;
        }
        for (i, relation) in entity.relations.iter().enumerate() {
            for decorator in relation_decorator(ctx, entity, relation) {
                writeln!(out, "  {}", decorator)?;
            }
            // Relation<> defers type resolution across circular imports
            let ty = if relation.deferred {
                format!("Relation<{}>", relation_type(relation))
            } else {
                relation_type(relation)
            };
            writeln!(out, "  {}?: {};", relation.name, ty)?;
            if i + 1 < entity.relations.len() {
                writeln!(out)?;
            }
        }
        writeln!(out, "}}")?;
        Ok(out)
    }

    fn validators(field: &FieldModel) -> Vec<String> {
        let mut v = Vec::new();
        if !field.is_required_input() {
            v.push("IsOptional()".to_string());
        }
        let kind = match field.ty.inner.as_str() {
            "number" if field.sql_type.is_integer() => "IsInt()",
            "number" => "IsNumber()",
            "boolean" => "IsBoolean()",
            "Date" => "IsDate()",
            "string" if matches!(field.sql_type, crate::ast::SqlType::Uuid) => "IsUUID()",
            "string" => "IsString()",
            _ => "",
        };
        if !kind.is_empty() {
            v.push(kind.to_string());
        }
        if let (Some(max), true) = (field.ty.length, field.sql_type.is_textual()) {
            v.push(format!("MaxLength({})", max));
        }
        v
    }

    pub fn dto(ctx: &EmitContext<'_>, entity: &EntityModel<'_>) -> Result<String, fmt::Error> {
        let name = &entity.names.entity;
        let mut out = String::new();
        let mut used: Vec<String> = Vec::new();
        if ctx.features.validation {
            for field in entity.input_fields() {
                for v in validators(field) {
                    let ident = v.split('(').next().unwrap_or_default().to_string();
                    used.push(ident);
                }
            }
            if entity.input_fields().any(|f| f.ty.inner == "Date") {
                used.push("Type".to_string());
            }
            used.sort();
            used.dedup();
        }
        writeln!(out, "import {{ PartialType }} from '@nestjs/mapped-types';")?;
        let transformer = used.iter().any(|u| u == "Type");
        let validator: Vec<&str> = used.iter().map(String::as_str).filter(|u| *u != "Type").collect();
        if transformer {
            writeln!(out, "import {{ Type }} from 'class-transformer';")?;
        }
        if !validator.is_empty() {
            writeln!(out, "import {{ {} }} from 'class-validator';", validator.join(", "))?;
        }
        writeln!(out)?;
        writeln!(out, "export class Create{}Dto {{", name)?;
        for field in entity.input_fields() {
            if ctx.features.validation {
                if field.ty.inner == "Date" {
                    writeln!(out, "  @Type(() => Date)")?;
                }
                for v in validators(field) {
                    writeln!(out, "  @{}", v)?;
                }
            }
            let mark = if field.is_required_input() { "!" } else { "?" };
            writeln!(out, "  {}{}: {};", field.name, mark, field.ty.name)?;
        }
        writeln!(out, "}}")?;
        writeln!(out)?;
        writeln!(
            out,
            "export class Update{0}Dto extends PartialType(Create{0}Dto) {{}}",
            name
        )?;
        Ok(out)
    }

    fn key_params(entity: &EntityModel<'_>) -> String {
        entity
            .key_fields()
            .iter()
            .map(|f| format!("{}: {}", f.name, f.ty.inner))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn key_where(entity: &EntityModel<'_>) -> String {
        entity
            .key_fields()
            .iter()
            .map(|f| f.name.clone())
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn repository(ctx: &EmitContext<'_>, entity: &EntityModel<'_>) -> Result<String, fmt::Error> {
        let name = &entity.names.entity;
        let file = &entity.names.file;
        let soft = ctx.features.soft_delete && entity.soft_delete_column().is_some();
        let mut out = String::new();
        writeln!(out, "import {{ Injectable }} from '@nestjs/common';")?;
        writeln!(out, "import {{ InjectRepository }} from '@nestjs/typeorm';")?;
        writeln!(out, "import {{ IsNull, Repository }} from 'typeorm';")?;
        writeln!(out, "import {{ {} }} from './{}.entity';", name, file)?;
        writeln!(out)?;
        writeln!(out, "@Injectable()")?;
        writeln!(out, "export class {}Repository {{", name)?;
        writeln!(out, "  constructor(")?;
        writeln!(
            out,
            "    @InjectRepository({0}) private readonly rows: Repository<{0}>,",
            name
        )?;
        writeln!(out, "  ) {{}}")?;
        writeln!(out)?;
        let live = match entity.soft_delete_column() {
            Some(column) if soft => format!("{{ {}: IsNull() }}", column.name),
            _ => "{}".to_string(),
        };
        let relations: Vec<String> = entity
            .relations
            .iter()
            .filter(|r| !r.deferred)
            .map(|r| single_quote(&r.name))
            .collect();
        writeln!(
            out,
            "  findPage(skip: number, take: number): Promise<[{}[], number]> {{",
            name
        )?;
        writeln!(
            out,
            "    return this.rows.findAndCount({{ where: {}, skip, take, relations: [{}] }});",
            live,
            relations.join(", ")
        )?;
        writeln!(out, "  }}")?;
        writeln!(out)?;
        writeln!(out, "  findAll(): Promise<{}[]> {{", name)?;
        writeln!(out, "    return this.rows.find({{ where: {} }});", live)?;
        writeln!(out, "  }}")?;
        if !entity.key_fields().is_empty() {
            writeln!(out)?;
            writeln!(out, "  findOne({}): Promise<{} | null> {{", key_params(entity), name)?;
            let filter = if soft {
                format!("{{ {}, ...{} }}", key_where(entity), live)
            } else {
                format!("{{ {} }}", key_where(entity))
            };
            writeln!(out, "    return this.rows.findOne({{ where: {} }});", filter)?;
            writeln!(out, "  }}")?;
            writeln!(out)?;
            writeln!(out, "  async remove({}): Promise<boolean> {{", key_params(entity))?;
            match entity.soft_delete_column().filter(|_| soft) {
                Some(column) => writeln!(
                    out,
                    "    const result = await this.rows.update({{ {} }}, {{ {}: new Date() }});",
                    key_where(entity),
                    column.name
                )?,
                None => writeln!(
                    out,
                    "    const result = await this.rows.delete({{ {} }});",
                    key_where(entity)
                )?,
            }
            writeln!(out, "    return (result.affected ?? 0) > 0;")?;
            writeln!(out, "  }}")?;
        }
        writeln!(out)?;
        writeln!(out, "  save(row: Partial<{0}>): Promise<{0}> {{", name)?;
        writeln!(out, "    return this.rows.save(this.rows.create(row));")?;
        writeln!(out, "  }}")?;
        writeln!(out, "}}")?;
        Ok(out)
    }

    pub fn service(ctx: &EmitContext<'_>, entity: &EntityModel<'_>) -> Result<String, fmt::Error> {
        let name = &entity.names.entity;
        let file = &entity.names.file;
        let has_key = !entity.key_fields().is_empty();
        let mut out = String::new();
        writeln!(out, "import {{ Injectable, NotFoundException }} from '@nestjs/common';")?;
        if ctx.features.pagination {
            writeln!(out, "import {{ Page, PageQuery }} from '../common/pagination';")?;
        }
        writeln!(out, "import {{ Create{0}Dto, Update{0}Dto }} from './dto/{1}.dto';", name, file)?;
        writeln!(out, "import {{ {} }} from './{}.entity';", name, file)?;
        writeln!(out, "import {{ {}Repository }} from './{}.repository';", name, file)?;
        writeln!(out)?;
        writeln!(out, "@Injectable()")?;
        writeln!(out, "export class {}Service {{", name)?;
        writeln!(
            out,
            "  constructor(private readonly repository: {}Repository) {{}}",
            name
        )?;
        writeln!(out)?;
        if ctx.features.pagination {
            writeln!(out, "  async list(query: PageQuery): Promise<Page<{}>> {{", name)?;
            writeln!(
                out,
                "    const [items, total] = await this.repository.findPage(query.skip, query.take);"
            )?;
            writeln!(
                out,
                "    return {{ items, total, page: query.page, perPage: query.take }};"
            )?;
        } else {
            writeln!(out, "  list(): Promise<{}[]> {{", name)?;
            writeln!(out, "    return this.repository.findAll();")?;
        }
        writeln!(out, "  }}")?;
        writeln!(out)?;
        writeln!(out, "  create(input: Create{0}Dto): Promise<{0}> {{", name)?;
        writeln!(out, "    return this.repository.save(input);")?;
        writeln!(out, "  }}")?;
        if has_key {
            writeln!(out)?;
            writeln!(out, "  async get({}): Promise<{}> {{", key_params(entity), name)?;
            writeln!(
                out,
                "    const row = await this.repository.findOne({});",
                key_where(entity)
            )?;
            writeln!(
                out,
                "    if (!row) throw new NotFoundException({});",
                single_quote(&format!("{} not found", name))
            )?;
            writeln!(out, "    return row;")?;
            writeln!(out, "  }}")?;
            writeln!(out)?;
            writeln!(
                out,
                "  async update({}, input: Update{}Dto): Promise<{1}> {{",
                key_params(entity),
                name
            )?;
            writeln!(out, "    const row = await this.get({});", key_where(entity))?;
            writeln!(out, "    return this.repository.save({{ ...row, ...input }});")?;
            writeln!(out, "  }}")?;
            writeln!(out)?;
            writeln!(out, "  async remove({}): Promise<void> {{", key_params(entity))?;
            writeln!(
                out,
                "    if (!(await this.repository.remove({}))) {{",
                key_where(entity)
            )?;
            writeln!(
                out,
                "      throw new NotFoundException({});",
                single_quote(&format!("{} not found", name))
            )?;
            writeln!(out, "    }}")?;
            writeln!(out, "  }}")?;
        }
        writeln!(out, "}}")?;
        Ok(out)
    }

    pub fn controller(ctx: &EmitContext<'_>, entity: &EntityModel<'_>) -> Result<String, fmt::Error> {
        let name = &entity.names.entity;
        let file = &entity.names.file;
        let keys = entity.key_fields();
        let mut out = String::new();

        let mut common = vec!["Body", "Controller", "Get", "Post"];
        if !keys.is_empty() {
            common.extend(["Delete", "HttpCode", "Param", "Put"]);
        }
        if ctx.features.pagination {
            common.push("Query");
        }
        if ctx.features.auth {
            common.push("UseGuards");
        }
        if ctx.features.caching {
            common.push("UseInterceptors");
        }
        common.sort();
        writeln!(out, "import {{ {} }} from '@nestjs/common';", common.join(", "))?;
        if ctx.features.caching {
            writeln!(out, "import {{ CacheInterceptor }} from '@nestjs/cache-manager';")?;
        }
        if ctx.features.auth {
            writeln!(out, "import {{ JwtGuard }} from '../common/jwt.guard';")?;
        }
        if ctx.features.pagination {
            writeln!(out, "import {{ PageQuery }} from '../common/pagination';")?;
        }
        writeln!(out, "import {{ Create{0}Dto, Update{0}Dto }} from './dto/{1}.dto';", name, file)?;
        writeln!(out, "import {{ {}Service }} from './{}.service';", name, file)?;
        writeln!(out)?;
        writeln!(out, "@Controller({})", single_quote(&entity.names.route))?;
        if ctx.features.auth {
            writeln!(out, "@UseGuards(JwtGuard)")?;
        }
        if ctx.features.caching {
            writeln!(out, "@UseInterceptors(CacheInterceptor)")?;
        }
        writeln!(out, "export class {}Controller {{", name)?;
        writeln!(out, "  constructor(private readonly service: {}Service) {{}}", name)?;
        writeln!(out)?;
        writeln!(out, "  @Get()")?;
        if ctx.features.pagination {
            writeln!(out, "  list(@Query() query: PageQuery) {{")?;
            writeln!(out, "    return this.service.list(query);")?;
        } else {
            writeln!(out, "  list() {{")?;
            writeln!(out, "    return this.service.list();")?;
        }
        writeln!(out, "  }}")?;
        writeln!(out)?;
        writeln!(out, "  @Post()")?;
        writeln!(out, "  create(@Body() input: Create{}Dto) {{", name)?;
        writeln!(out, "    return this.service.create(input);")?;
        writeln!(out, "  }}")?;

        if !keys.is_empty() {
            let path: Vec<String> = keys.iter().map(|f| format!(":{}", f.name)).collect();
            let path = single_quote(&path.join("/"));
            let params: Vec<String> = keys
                .iter()
                .map(|f| {
                    format!(
                        "@Param({}) {}: string",
                        single_quote(&f.name),
                        f.name
                    )
                })
                .collect();
            let args: Vec<String> = keys.iter().map(|f| parse_param(f, &f.name)).collect();
            writeln!(out)?;
            writeln!(out, "  @Get({})", path)?;
            writeln!(out, "  get({}) {{", params.join(", "))?;
            writeln!(out, "    return this.service.get({});", args.join(", "))?;
            writeln!(out, "  }}")?;
            writeln!(out)?;
            writeln!(out, "  @Put({})", path)?;
            writeln!(
                out,
                "  update({}, @Body() input: Update{}Dto) {{",
                params.join(", "),
                name
            )?;
            writeln!(out, "    return this.service.update({}, input);", args.join(", "))?;
            writeln!(out, "  }}")?;
            writeln!(out)?;
            writeln!(out, "  @Delete({})", path)?;
            writeln!(out, "  @HttpCode(204)")?;
            writeln!(out, "  remove({}) {{", params.join(", "))?;
            writeln!(out, "    return this.service.remove({});", args.join(", "))?;
            writeln!(out, "  }}")?;
        }
        writeln!(out, "}}")?;
        Ok(out)
    }

    pub fn module(entity: &EntityModel<'_>) -> Result<String, fmt::Error> {
        let name = &entity.names.entity;
        let file = &entity.names.file;
        let mut out = String::new();
        writeln!(out, "import {{ Module }} from '@nestjs/common';")?;
        writeln!(out, "import {{ TypeOrmModule }} from '@nestjs/typeorm';")?;
        writeln!(out, "import {{ {}Controller }} from './{}.controller';", name, file)?;
        writeln!(out, "import {{ {} }} from './{}.entity';", name, file)?;
        writeln!(out, "import {{ {}Repository }} from './{}.repository';", name, file)?;
        writeln!(out, "import {{ {}Service }} from './{}.service';", name, file)?;
        writeln!(out)?;
        writeln!(out, "@Module({{")?;
        writeln!(out, "  imports: [TypeOrmModule.forFeature([{}])],", name)?;
        writeln!(out, "  controllers: [{}Controller],", name)?;
        writeln!(out, "  providers: [{0}Repository, {0}Service],", name)?;
        writeln!(out, "  exports: [{}Service],", name)?;
        writeln!(out, "}})")?;
        writeln!(out, "export class {}Module {{}}", name)?;
        Ok(out)
    }

    pub fn shared(ctx: &EmitContext<'_>, out: &mut FileSet) -> Result<(), GenerationError> {
        let key = ctx.key();
        let mut app = String::new();
        writeln!(app, "import {{ Module }} from '@nestjs/common';")?;
        if ctx.features.caching {
            writeln!(app, "import {{ CacheModule }} from '@nestjs/cache-manager';")?;
        }
        if ctx.features.rate_limit {
            writeln!(app, "import {{ APP_GUARD }} from '@nestjs/core';")?;
            writeln!(app, "import {{ ThrottlerGuard, ThrottlerModule }} from '@nestjs/throttler';")?;
        }
        writeln!(app, "import {{ TypeOrmModule }} from '@nestjs/typeorm';")?;
        for entity in ctx.entities {
            writeln!(
                app,
                "import {{ {}Module }} from './{}/{}.module';",
                entity.names.entity, entity.names.file, entity.names.file
            )?;
        }
        writeln!(app)?;
        writeln!(app, "@Module({{")?;
        writeln!(app, "  imports: [")?;
        writeln!(app, "    TypeOrmModule.forRoot({{")?;
        writeln!(app, "      type: 'postgres',")?;
        writeln!(app, "      url: process.env.DATABASE_URL,")?;
        writeln!(app, "      autoLoadEntities: true,")?;
        writeln!(app, "    }}),")?;
        if ctx.features.caching {
            writeln!(app, "    CacheModule.register({{ ttl: 60_000 }}),")?;
        }
        if ctx.features.rate_limit {
            writeln!(app, "    ThrottlerModule.forRoot([{{ ttl: 60_000, limit: 120 }}]),")?;
        }
        for entity in ctx.entities {
            writeln!(app, "    {}Module,", entity.names.entity)?;
        }
        writeln!(app, "  ],")?;
        if ctx.features.rate_limit {
            writeln!(app, "  providers: [{{ provide: APP_GUARD, useClass: ThrottlerGuard }}],")?;
        }
        writeln!(app, "}})")?;
        writeln!(app, "export class AppModule {{}}")?;
        out.add(key, "src/app.module.ts", app)?;

        let mut main = String::new();
        if ctx.features.validation {
            writeln!(main, "import {{ ValidationPipe }} from '@nestjs/common';")?;
        }
        writeln!(main, "import {{ NestFactory }} from '@nestjs/core';")?;
        writeln!(main, "import {{ AppModule }} from './app.module';")?;
        writeln!(main)?;
        writeln!(main, "async function bootstrap() {{")?;
        writeln!(main, "  const app = await NestFactory.create(AppModule);")?;
        writeln!(main, "  app.setGlobalPrefix('api');")?;
        if ctx.features.validation {
            writeln!(
                main,
                "  app.useGlobalPipes(new ValidationPipe({{ whitelist: true, transform: true }}));"
            )?;
        }
        writeln!(main, "  await app.listen(process.env.PORT ?? 3000);")?;
        writeln!(main, "}}")?;
        writeln!(main)?;
        writeln!(main, "void bootstrap();")?;
        out.add(key, "src/main.ts", main)?;

        if ctx.features.pagination {
            out.add(key, "src/common/pagination.ts", PAGINATION.to_string())?;
        }
        if ctx.features.auth {
            out.add(key, "src/common/jwt.guard.ts", JWT_GUARD.to_string())?;
        }
        Ok(())
    }

    const PAGINATION: &str = "import { Type } from 'class-transformer';
import { IsInt, IsOptional, Max, Min } from 'class-validator';

export class PageQuery {
  @IsOptional()
  @Type(() => Number)
  @IsInt()
  @Min(1)
  page = 1;

  @IsOptional()
  @Type(() => Number)
  @IsInt()
  @Min(1)
  @Max(100)
  perPage = 20;

  get take(): number {
    return this.perPage;
  }

  get skip(): number {
    return (this.page - 1) * this.perPage;
  }
}

export interface Page<T> {
  items: T[];
  total: number;
  page: number;
  perPage: number;
}
";

    const JWT_GUARD: &str = "import { CanActivate, ExecutionContext, Injectable, UnauthorizedException } from '@nestjs/common';
import { verify } from 'jsonwebtoken';

@Injectable()
export class JwtGuard implements CanActivate {
  canActivate(context: ExecutionContext): boolean {
    const request = context.switchToHttp().getRequest();
    const header: string = request.headers.authorization ?? '';
    if (!header.startsWith('Bearer ')) throw new UnauthorizedException();
    try {
      request.user = verify(header.slice(7), process.env.JWT_SECRET ?? '');
      return true;
    } catch {
      throw new UnauthorizedException();
    }
  }
}
";
}

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
                "CREATE TABLE authors (id SERIAL PRIMARY KEY, full_name VARCHAR(80) NOT NULL, mentor_id INT REFERENCES books(id));
                 CREATE TABLE books (id SERIAL PRIMARY KEY, author_id INT NOT NULL REFERENCES authors(id), published_at TIMESTAMP);",
                Dialect::Postgres,
            )
            .catalog,
        )
    }

    fn files(framework: Framework, fw: &str, toggles: FeatureToggles) -> FileSet {
        let profiles = ProfileSet::builtin().unwrap();
        let profile = profiles.get(&TargetKey::new("typescript", fw)).unwrap();
        generate(&TypeScriptEmitter::new(framework), &schema(), profile, &toggles, "library")
            .unwrap()
            .files
    }

    #[test]
    fn test_express_models_use_type_imports() {
        let files = files(Framework::Express, "express", FeatureToggles::new());
        let author = files.get("src/models/author.ts").unwrap();
        assert!(author.contains("import type { Book } from './book';"));
        assert!(author.contains("  fullName: string;"));
        assert!(author.contains("  mentorId: number | null;"));
        assert!(author.contains("fullName: row['full_name'] as string,"));
    }

    #[test]
    fn test_express_validation_schema() {
        let files = files(Framework::Express, "express", FeatureToggles::new());
        let dto = files.get("src/dto/author.dto.ts").unwrap();
        assert!(dto.contains("fullName: z.string().max(80),"));
        assert!(dto.contains("mentorId: z.number().int().nullable().optional(),"));
    }

    #[test]
    fn test_nest_cycle_uses_relation_wrapper() {
        let files = files(Framework::Nest, "nestjs", FeatureToggles::new());
        let book = files.get("src/book/book.entity.ts").unwrap();
        assert!(book.contains("@ManyToOne(() => Author"));
        assert!(book.contains("author?: Relation<Author>;"));
        assert!(files.get("src/book/book.module.ts").is_some());
        assert!(files.get("src/app.module.ts").unwrap().contains("BookModule,"));
    }

    #[test]
    fn test_express_skips_caching() {
        let files = files(Framework::Express, "express", FeatureToggles::new().with("caching", true));
        assert!(files.paths().all(|p| !p.contains("cache")));
    }
}
