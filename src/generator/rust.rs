//! Rust server projects on sqlx + Postgres, served by axum or actix-web.

use super::model::{EntityModel, FieldModel, RelationModel};
use super::query::{self, Statements};
use super::{EmitContext, Emitter, FileSet};
use crate::error::GenerationError;
use std::fmt::{self, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framework {
    Axum,
    Actix,
}

pub struct RustEmitter {
    framework: Framework,
}

impl RustEmitter {
    pub fn new(framework: Framework) -> Self {
        Self { framework }
    }
}

const KEYWORDS: &[&str] = &[
    "as", "async", "await", "break", "const", "continue", "crate", "dyn", "else", "enum",
    "extern", "false", "fn", "for", "if", "impl", "in", "let", "loop", "match", "mod", "move",
    "mut", "pub", "ref", "return", "static", "struct", "super", "trait", "true", "type",
    "unsafe", "use", "where", "while", "gen", "yield", "abstract", "final", "override", "macro",
    "priv", "try", "typeof", "virtual",
];

fn ident(name: &str) -> String {
    if KEYWORDS.contains(&name) {
        format!("r#{}", name)
    } else {
        name.to_string()
    }
}

/// Sqlx needs the raw column name when the member name differs.
fn rename_attr(field: &FieldModel) -> Option<String> {
    (field.name != field.column).then(|| format!("    #[sqlx(rename = \"{}\")]", field.column))
}

fn raw(sql: &str) -> String {
    format!("r#\"{}\"#", sql)
}

/// `(name: T, ...)` parameters and `.bind(name)` calls for the primary key.
struct Key<'a> {
    fields: Vec<&'a FieldModel>,
}

impl<'a> Key<'a> {
    fn params(&self) -> String {
        self.fields
            .iter()
            .map(|f| format!("{}: {}", ident(&f.name), f.ty.inner))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn args(&self) -> String {
        self.fields
            .iter()
            .map(|f| ident(&f.name))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn binds(&self) -> String {
        self.fields
            .iter()
            .map(|f| format!(".bind({})", ident(&f.name)))
            .collect()
    }

    fn tuple_type(&self) -> String {
        match self.fields.as_slice() {
            [single] => single.ty.inner.clone(),
            many => format!(
                "({})",
                many.iter()
                    .map(|f| f.ty.inner.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
    }

    fn tuple_pattern(&self) -> String {
        match self.fields.as_slice() {
            [single] => ident(&single.name),
            many => format!("({})", many.iter().map(|f| ident(&f.name)).collect::<Vec<_>>().join(", ")),
        }
    }

    fn cache_key(&self) -> String {
        let parts: Vec<String> = self.fields.iter().map(|_| "{}".to_string()).collect();
        format!("format!(\"{}\", {})", parts.join("/"), self.args())
    }
}

impl Emitter for RustEmitter {
    fn emit_entity(
        &self,
        ctx: &EmitContext<'_>,
        entity: &EntityModel<'_>,
        out: &mut FileSet,
    ) -> Result<(), GenerationError> {
        let file = &entity.names.file;
        let key = ctx.key();
        out.add(key, format!("src/models/{}.rs", file), model(entity)?)?;
        out.add(key, format!("src/dto/{}.rs", file), dto(ctx, entity)?)?;
        out.add(key, format!("src/repositories/{}.rs", file), repository(ctx, entity)?)?;
        out.add(key, format!("src/services/{}.rs", file), service(ctx, entity)?)?;
        let routes = match self.framework {
            Framework::Axum => axum_routes(ctx, entity)?,
            Framework::Actix => actix_routes(ctx, entity)?,
        };
        out.add(key, format!("src/routes/{}.rs", file), routes)?;
        Ok(())
    }

    fn emit_shared(&self, ctx: &EmitContext<'_>, out: &mut FileSet) -> Result<(), GenerationError> {
        let key = ctx.key();
        for dir in ["models", "dto", "repositories", "services", "routes"] {
            let mut index = String::new();
            for entity in ctx.entities {
                writeln!(index, "pub mod {};", entity.names.file)?;
            }
            if dir == "routes" {
                writeln!(index)?;
                match self.framework {
                    Framework::Axum => axum_router(&mut index, ctx)?,
                    Framework::Actix => actix_config(&mut index, ctx)?,
                }
            }
            out.add(key, format!("src/{}/mod.rs", dir), index)?;
        }

        out.add(key, "src/state.rs", state(ctx)?)?;
        out.add(key, "src/error.rs", error(self.framework, ctx)?)?;
        out.add(key, "src/main.rs", main(self.framework, ctx)?)?;
        if ctx.features.pagination {
            out.add(key, "src/pagination.rs", PAGINATION.to_string())?;
        }
        if ctx.features.auth {
            let auth = match self.framework {
                Framework::Axum => AXUM_AUTH,
                Framework::Actix => ACTIX_AUTH,
            };
            out.add(key, "src/auth.rs", auth.to_string())?;
        }
        if ctx.features.rate_limit {
            out.add(key, "src/rate_limit.rs", AXUM_RATE_LIMIT.to_string())?;
        }
        if ctx.features.caching {
            out.add(key, "src/cache.rs", CACHE.to_string())?;
        }
        Ok(())
    }
}

fn model(entity: &EntityModel<'_>) -> Result<String, fmt::Error> {
    let mut out = String::new();
    writeln!(out, "use serde::{{Deserialize, Serialize}};")?;
    writeln!(out)?;
    writeln!(
        out,
        "pub const {}_TABLE: &str = \"{}\";",
        entity.names.constant, entity.table.name
    )?;
    writeln!(out)?;
    if entity.deferred {
        writeln!(out, "/// Part of a reference cycle: related rows are loaded on demand.")?;
    }
    writeln!(out, "#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]")?;
    writeln!(out, "pub struct {} {{", entity.names.entity)?;
    for field in &entity.fields {
        if let Some(comment) = &field.comment {
            writeln!(out, "    /// {}", comment)?;
        }
        if let Some(attr) = rename_attr(field) {
            writeln!(out, "{}", attr)?;
        }
        writeln!(out, "    pub {}: {},", ident(&field.name), field.ty.name)?;
    }
    writeln!(out, "}}")?;
    Ok(out)
}

fn dto(ctx: &EmitContext<'_>, entity: &EntityModel<'_>) -> Result<String, fmt::Error> {
    let validation = ctx.features.validation;
    let name = &entity.names.entity;
    let mut out = String::new();
    writeln!(out, "use serde::Deserialize;")?;
    if validation {
        writeln!(out, "use validator::Validate;")?;
    }
    writeln!(out)?;

    let derive = if validation {
        "#[derive(Debug, Clone, Deserialize, Validate)]"
    } else {
        "#[derive(Debug, Clone, Deserialize)]"
    };
    writeln!(out, "{}", derive)?;
    writeln!(out, "pub struct Create{} {{", name)?;
    for field in entity.input_fields() {
        if validation {
            write_validation(&mut out, field)?;
        }
        let ty = if field.is_required_input() || field.ty.nullable {
            field.ty.name.clone()
        } else {
            format!("Option<{}>", field.ty.inner)
        };
        if !field.is_required_input() {
            writeln!(out, "    #[serde(default)]")?;
        }
        writeln!(out, "    pub {}: {},", ident(&field.name), ty)?;
    }
    writeln!(out, "}}")?;
    writeln!(out)?;

    writeln!(out, "{}", derive)?;
    writeln!(out, "pub struct Update{} {{", name)?;
    for field in entity.input_fields() {
        if validation {
            write_validation(&mut out, field)?;
        }
        writeln!(out, "    #[serde(default)]")?;
        writeln!(out, "    pub {}: Option<{}>,", ident(&field.name), field.ty.inner)?;
    }
    writeln!(out, "}}")?;
    Ok(out)
}

fn write_validation(out: &mut String, field: &FieldModel) -> fmt::Result {
    if let (Some(max), true) = (field.ty.length, field.sql_type.is_textual()) {
        writeln!(out, "    #[validate(length(max = {}))]", max)?;
    } else if field.sql_type.is_textual() && field.is_required_input() {
        writeln!(out, "    #[validate(length(min = 1))]")?;
    }
    Ok(())
}

fn repository(ctx: &EmitContext<'_>, entity: &EntityModel<'_>) -> Result<String, fmt::Error> {
    let stmts = Statements::new(entity, ctx.features.pagination, ctx.features.soft_delete);
    let name = &entity.names.entity;
    let key = Key {
        fields: entity.key_fields(),
    };
    let mut out = String::new();

    writeln!(out, "use sqlx::PgPool;")?;
    writeln!(out)?;
    writeln!(out, "use crate::dto::{}::{{Create{1}, Update{1}}};", entity.names.file, name)?;
    writeln!(out, "use crate::models::{}::{};", entity.names.file, name)?;
    for target in related_imports(entity) {
        writeln!(out, "use crate::models::{}::{};", target.0, target.1)?;
    }
    writeln!(out)?;
    writeln!(out, "#[derive(Clone)]")?;
    writeln!(out, "pub struct {}Repository {{", name)?;
    writeln!(out, "    pool: PgPool,")?;
    writeln!(out, "}}")?;
    writeln!(out)?;
    writeln!(out, "impl {}Repository {{", name)?;
    writeln!(out, "    pub fn new(pool: PgPool) -> Self {{")?;
    writeln!(out, "        Self {{ pool }}")?;
    writeln!(out, "    }}")?;
    writeln!(out)?;

    if ctx.features.pagination {
        writeln!(
            out,
            "    pub async fn list(&self, limit: i64, offset: i64) -> Result<Vec<{}>, sqlx::Error> {{",
            name
        )?;
        writeln!(out, "        sqlx::query_as::<_, {}>({})", name, raw(&stmts.list))?;
        writeln!(out, "            .bind(limit)")?;
        writeln!(out, "            .bind(offset)")?;
    } else {
        writeln!(out, "    pub async fn list(&self) -> Result<Vec<{}>, sqlx::Error> {{", name)?;
        writeln!(out, "        sqlx::query_as::<_, {}>({})", name, raw(&stmts.list))?;
    }
    writeln!(out, "            .fetch_all(&self.pool)")?;
    writeln!(out, "            .await")?;
    writeln!(out, "    }}")?;
    writeln!(out)?;

    writeln!(out, "    pub async fn count(&self) -> Result<i64, sqlx::Error> {{")?;
    writeln!(out, "        sqlx::query_scalar({})", raw(&stmts.count))?;
    writeln!(out, "            .fetch_one(&self.pool)")?;
    writeln!(out, "            .await")?;
    writeln!(out, "    }}")?;
    writeln!(out)?;

    if let Some(find) = &stmts.find {
        writeln!(
            out,
            "    pub async fn find(&self, {}) -> Result<Option<{}>, sqlx::Error> {{",
            key.params(),
            name
        )?;
        writeln!(out, "        sqlx::query_as::<_, {}>({})", name, raw(find))?;
        writeln!(out, "            {}", key.binds())?;
        writeln!(out, "            .fetch_optional(&self.pool)")?;
        writeln!(out, "            .await")?;
        writeln!(out, "    }}")?;
        writeln!(out)?;
    }

    writeln!(
        out,
        "    pub async fn create(&self, input: &Create{0}) -> Result<{0}, sqlx::Error> {{",
        name
    )?;
    writeln!(out, "        sqlx::query_as::<_, {}>({})", name, raw(&stmts.insert))?;
    for field in entity.input_fields() {
        writeln!(out, "            .bind(&input.{})", ident(&field.name))?;
    }
    writeln!(out, "            .fetch_one(&self.pool)")?;
    writeln!(out, "            .await")?;
    writeln!(out, "    }}")?;

    if let Some(update) = &stmts.update {
        writeln!(out)?;
        writeln!(
            out,
            "    pub async fn update(&self, {}, input: &Update{}) -> Result<Option<{1}>, sqlx::Error> {{",
            key.params(),
            name
        )?;
        writeln!(out, "        sqlx::query_as::<_, {}>({})", name, raw(update))?;
        for field in entity.input_fields() {
            writeln!(out, "            .bind(&input.{})", ident(&field.name))?;
        }
        writeln!(out, "            {}", key.binds())?;
        writeln!(out, "            .fetch_optional(&self.pool)")?;
        writeln!(out, "            .await")?;
        writeln!(out, "    }}")?;
    }

    if let Some(delete) = &stmts.delete {
        writeln!(out)?;
        writeln!(
            out,
            "    pub async fn delete(&self, {}) -> Result<bool, sqlx::Error> {{",
            key.params()
        )?;
        writeln!(out, "        let result = sqlx::query({})", raw(delete))?;
        writeln!(out, "            {}", key.binds())?;
        writeln!(out, "            .execute(&self.pool)")?;
        writeln!(out, "            .await?;")?;
        writeln!(out, "        Ok(result.rows_affected() > 0)")?;
        writeln!(out, "    }}")?;
    }

    for relation in &entity.relations {
        writeln!(out)?;
        relation_loader(&mut out, entity, relation)?;
    }
    writeln!(out, "}}")?;
    Ok(out)
}

fn related_imports<'e>(entity: &'e EntityModel<'_>) -> Vec<(&'e str, &'e str)> {
    let mut targets: Vec<(&str, &str)> = entity
        .relations
        .iter()
        .filter(|r| r.target_entity != entity.names.entity)
        .map(|r| (r.target_file.as_str(), r.target_entity.as_str()))
        .collect();
    targets.sort();
    targets.dedup();
    targets
}

fn relation_loader(
    out: &mut String,
    entity: &EntityModel<'_>,
    relation: &RelationModel,
) -> fmt::Result {
    let returns = if relation.kind.is_collection() {
        format!("Vec<{}>", relation.target_entity)
    } else {
        format!("Option<{}>", relation.target_entity)
    };
    if relation.deferred {
        writeln!(out, "    /// Loaded on demand; `{}` is generated later.", relation.target_table)?;
    }
    writeln!(
        out,
        "    pub async fn {}(&self, row: &{}) -> Result<{}, sqlx::Error> {{",
        ident(&relation.name),
        entity.names.entity,
        returns
    )?;
    writeln!(
        out,
        "        sqlx::query_as::<_, {}>({})",
        relation.target_entity,
        raw(&query::related(relation))
    )?;
    for column in &relation.local_columns {
        if let Some(field) = entity.field(column) {
            writeln!(out, "            .bind(&row.{})", ident(&field.name))?;
        }
    }
    let fetch = if relation.kind.is_collection() {
        "fetch_all"
    } else {
        "fetch_optional"
    };
    writeln!(out, "            .{}(&self.pool)", fetch)?;
    writeln!(out, "            .await")?;
    writeln!(out, "    }}")
}

fn service(ctx: &EmitContext<'_>, entity: &EntityModel<'_>) -> Result<String, fmt::Error> {
    let name = &entity.names.entity;
    let file = &entity.names.file;
    let key = Key {
        fields: entity.key_fields(),
    };
    let has_key = !key.fields.is_empty();
    let caching = ctx.features.caching && has_key;
    let mut out = String::new();

    if caching {
        writeln!(out, "use crate::cache::Cache;")?;
    }
    writeln!(out, "use crate::dto::{}::{{Create{1}, Update{1}}};", file, name)?;
    writeln!(out, "use crate::error::ApiError;")?;
    writeln!(out, "use crate::models::{}::{};", file, name)?;
    if ctx.features.pagination {
        writeln!(out, "use crate::pagination::{{Page, PageParams}};")?;
    }
    writeln!(out, "use crate::repositories::{}::{}Repository;", file, name)?;
    writeln!(out, "use sqlx::PgPool;")?;
    writeln!(out)?;
    writeln!(out, "#[derive(Clone)]")?;
    writeln!(out, "pub struct {}Service {{", name)?;
    writeln!(out, "    repository: {}Repository,", name)?;
    if caching {
        writeln!(out, "    cache: Cache<{}>,", name)?;
    }
    writeln!(out, "}}")?;
    writeln!(out)?;
    writeln!(out, "impl {}Service {{", name)?;
    writeln!(out, "    pub fn new(pool: PgPool) -> Self {{")?;
    writeln!(out, "        Self {{")?;
    writeln!(out, "            repository: {}Repository::new(pool),", name)?;
    if caching {
        writeln!(out, "            cache: Cache::default(),")?;
    }
    writeln!(out, "        }}")?;
    writeln!(out, "    }}")?;
    writeln!(out)?;

    writeln!(out, "    pub fn repository(&self) -> &{}Repository {{", name)?;
    writeln!(out, "        &self.repository")?;
    writeln!(out, "    }}")?;
    writeln!(out)?;

    if ctx.features.pagination {
        writeln!(
            out,
            "    pub async fn list(&self, params: PageParams) -> Result<Page<{}>, ApiError> {{",
            name
        )?;
        writeln!(
            out,
            "        let items = self.repository.list(params.limit(), params.offset()).await?;"
        )?;
        writeln!(out, "        let total = self.repository.count().await?;")?;
        writeln!(out, "        Ok(Page::new(items, total, &params))")?;
    } else {
        writeln!(out, "    pub async fn list(&self) -> Result<Vec<{}>, ApiError> {{", name)?;
        writeln!(out, "        Ok(self.repository.list().await?)")?;
    }
    writeln!(out, "    }}")?;
    writeln!(out)?;

    if has_key {
        writeln!(out, "    pub async fn get(&self, {}) -> Result<{}, ApiError> {{", key.params(), name)?;
        if caching {
            writeln!(out, "        let key = {};", key.cache_key())?;
            writeln!(out, "        if let Some(hit) = self.cache.get(&key) {{")?;
            writeln!(out, "            return Ok(hit);")?;
            writeln!(out, "        }}")?;
        }
        writeln!(out, "        let row = self")?;
        writeln!(out, "            .repository")?;
        writeln!(out, "            .find({})", key.args())?;
        writeln!(out, "            .await?")?;
        writeln!(out, "            .ok_or(ApiError::NotFound)?;")?;
        if caching {
            writeln!(out, "        self.cache.put(key, row.clone());")?;
        }
        writeln!(out, "        Ok(row)")?;
        writeln!(out, "    }}")?;
        writeln!(out)?;
    }

    writeln!(out, "    pub async fn create(&self, input: Create{0}) -> Result<{0}, ApiError> {{", name)?;
    writeln!(out, "        Ok(self.repository.create(&input).await?)")?;
    writeln!(out, "    }}")?;

    if has_key && entity.input_fields().next().is_some() {
        writeln!(out)?;
        writeln!(
            out,
            "    pub async fn update(&self, {}, input: Update{}) -> Result<{1}, ApiError> {{",
            key.params(),
            name
        )?;
        if caching {
            writeln!(out, "        self.cache.evict(&{});", key.cache_key())?;
        }
        writeln!(out, "        self.repository")?;
        writeln!(out, "            .update({}, &input)", key.args())?;
        writeln!(out, "            .await?")?;
        writeln!(out, "            .ok_or(ApiError::NotFound)")?;
        writeln!(out, "    }}")?;
    }

    if has_key {
        writeln!(out)?;
        writeln!(out, "    pub async fn delete(&self, {}) -> Result<(), ApiError> {{", key.params())?;
        if caching {
            writeln!(out, "        self.cache.evict(&{});", key.cache_key())?;
        }
        writeln!(out, "        if self.repository.delete({}).await? {{", key.args())?;
        writeln!(out, "            Ok(())")?;
        writeln!(out, "        }} else {{")?;
        writeln!(out, "            Err(ApiError::NotFound)")?;
        writeln!(out, "        }}")?;
        writeln!(out, "    }}")?;
    }
    writeln!(out, "}}")?;
    Ok(out)
}

fn route_imports(
    out: &mut String,
    ctx: &EmitContext<'_>,
    entity: &EntityModel<'_>,
) -> fmt::Result {
    let file = &entity.names.file;
    let name = &entity.names.entity;
    writeln!(out, "use crate::dto::{}::{{Create{1}, Update{1}}};", file, name)?;
    writeln!(out, "use crate::error::ApiError;")?;
    writeln!(out, "use crate::models::{}::{};", file, name)?;
    if ctx.features.pagination {
        writeln!(out, "use crate::pagination::{{Page, PageParams}};")?;
    }
    writeln!(out, "use crate::state::AppState;")?;
    if ctx.features.validation {
        writeln!(out, "use validator::Validate;")?;
    }
    Ok(())
}

fn axum_routes(ctx: &EmitContext<'_>, entity: &EntityModel<'_>) -> Result<String, fmt::Error> {
    let name = &entity.names.entity;
    let service = &entity.names.collection;
    let key = Key {
        fields: entity.key_fields(),
    };
    let has_key = !key.fields.is_empty();
    let updatable = has_key && entity.input_fields().next().is_some();
    let mut out = String::new();

    writeln!(out, "use axum::extract::{{Path, Query, State}};")?;
    writeln!(out, "use axum::http::StatusCode;")?;
    writeln!(out, "use axum::routing::get;")?;
    writeln!(out, "use axum::{{Json, Router}};")?;
    writeln!(out)?;
    route_imports(&mut out, ctx, entity)?;
    writeln!(out)?;

    let base = format!("/{}", entity.names.route);
    let item: String = key
        .fields
        .iter()
        .map(|f| format!("/:{}", f.name))
        .collect();
    writeln!(out, "pub fn router() -> Router<AppState> {{")?;
    writeln!(out, "    Router::new()")?;
    writeln!(out, "        .route(\"{}\", get(list).post(create))", base)?;
    if has_key {
        let update = if updatable { ".put(update)" } else { "" };
        writeln!(
            out,
            "        .route(\"{}{}\", get(find){}.delete(remove))",
            base, item, update
        )?;
    }
    writeln!(out, "}}")?;
    writeln!(out)?;

    if ctx.features.pagination {
        writeln!(out, "async fn list(")?;
        writeln!(out, "    State(state): State<AppState>,")?;
        writeln!(out, "    Query(params): Query<PageParams>,")?;
        writeln!(out, ") -> Result<Json<Page<{}>>, ApiError> {{", name)?;
        writeln!(out, "    Ok(Json(state.{}.list(params).await?))", service)?;
    } else {
        writeln!(
            out,
            "async fn list(State(state): State<AppState>) -> Result<Json<Vec<{}>>, ApiError> {{",
            name
        )?;
        writeln!(out, "    Ok(Json(state.{}.list().await?))", service)?;
    }
    writeln!(out, "}}")?;
    writeln!(out)?;

    writeln!(out, "async fn create(")?;
    writeln!(out, "    State(state): State<AppState>,")?;
    writeln!(out, "    Json(input): Json<Create{}>,", name)?;
    writeln!(out, ") -> Result<(StatusCode, Json<{}>), ApiError> {{", name)?;
    if ctx.features.validation {
        writeln!(out, "    input.validate()?;")?;
    }
    writeln!(
        out,
        "    Ok((StatusCode::CREATED, Json(state.{}.create(input).await?)))",
        service
    )?;
    writeln!(out, "}}")?;

    if has_key {
        let extract = format!(
            "    Path({}): Path<{}>,",
            key.tuple_pattern(),
            key.tuple_type()
        );
        writeln!(out)?;
        writeln!(out, "async fn find(")?;
        writeln!(out, "    State(state): State<AppState>,")?;
        writeln!(out, "{}", extract)?;
        writeln!(out, ") -> Result<Json<{}>, ApiError> {{", name)?;
        writeln!(out, "    Ok(Json(state.{}.get({}).await?))", service, key.args())?;
        writeln!(out, "}}")?;

        if updatable {
            writeln!(out)?;
            writeln!(out, "async fn update(")?;
            writeln!(out, "    State(state): State<AppState>,")?;
            writeln!(out, "{}", extract)?;
            writeln!(out, "    Json(input): Json<Update{}>,", name)?;
            writeln!(out, ") -> Result<Json<{}>, ApiError> {{", name)?;
            if ctx.features.validation {
                writeln!(out, "    input.validate()?;")?;
            }
            writeln!(
                out,
                "    Ok(Json(state.{}.update({}, input).await?))",
                service,
                key.args()
            )?;
            writeln!(out, "}}")?;
        }

        writeln!(out)?;
        writeln!(out, "async fn remove(")?;
        writeln!(out, "    State(state): State<AppState>,")?;
        writeln!(out, "{}", extract)?;
        writeln!(out, ") -> Result<StatusCode, ApiError> {{")?;
        writeln!(out, "    state.{}.delete({}).await?;", service, key.args())?;
        writeln!(out, "    Ok(StatusCode::NO_CONTENT)")?;
        writeln!(out, "}}")?;
    }
    Ok(out)
}

fn actix_routes(ctx: &EmitContext<'_>, entity: &EntityModel<'_>) -> Result<String, fmt::Error> {
    let name = &entity.names.entity;
    let service = &entity.names.collection;
    let key = Key {
        fields: entity.key_fields(),
    };
    let has_key = !key.fields.is_empty();
    let updatable = has_key && entity.input_fields().next().is_some();
    let mut out = String::new();

    writeln!(out, "use actix_web::{{HttpResponse, web}};")?;
    writeln!(out)?;
    route_imports(&mut out, ctx, entity)?;
    writeln!(out)?;

    let base = format!("/{}", entity.names.route);
    let item: String = key.fields.iter().map(|f| format!("/{{{}}}", f.name)).collect();
    writeln!(out, "pub fn configure(cfg: &mut web::ServiceConfig) {{")?;
    writeln!(out, "    cfg.service(")?;
    writeln!(out, "        web::resource(\"{}\")", base)?;
    writeln!(out, "            .route(web::get().to(list))")?;
    writeln!(out, "            .route(web::post().to(create)),")?;
    writeln!(out, "    );")?;
    if has_key {
        writeln!(out, "    cfg.service(")?;
        writeln!(out, "        web::resource(\"{}{}\")", base, item)?;
        writeln!(out, "            .route(web::get().to(find))")?;
        if updatable {
            writeln!(out, "            .route(web::put().to(update))")?;
        }
        writeln!(out, "            .route(web::delete().to(remove)),")?;
        writeln!(out, "    );")?;
    }
    writeln!(out, "}}")?;
    writeln!(out)?;

    if ctx.features.pagination {
        writeln!(out, "async fn list(")?;
        writeln!(out, "    state: web::Data<AppState>,")?;
        writeln!(out, "    params: web::Query<PageParams>,")?;
        writeln!(out, ") -> Result<web::Json<Page<{}>>, ApiError> {{", name)?;
        writeln!(
            out,
            "    Ok(web::Json(state.{}.list(params.into_inner()).await?))",
            service
        )?;
    } else {
        writeln!(
            out,
            "async fn list(state: web::Data<AppState>) -> Result<web::Json<Vec<{}>>, ApiError> {{",
            name
        )?;
        writeln!(out, "    Ok(web::Json(state.{}.list().await?))", service)?;
    }
    writeln!(out, "}}")?;
    writeln!(out)?;

    writeln!(out, "async fn create(")?;
    writeln!(out, "    state: web::Data<AppState>,")?;
    writeln!(out, "    input: web::Json<Create{}>,", name)?;
    writeln!(out, ") -> Result<HttpResponse, ApiError> {{")?;
    writeln!(out, "    let input = input.into_inner();")?;
    if ctx.features.validation {
        writeln!(out, "    input.validate()?;")?;
    }
    writeln!(out, "    let created = state.{}.create(input).await?;", service)?;
    writeln!(out, "    Ok(HttpResponse::Created().json(created))")?;
    writeln!(out, "}}")?;

    if has_key {
        let extract = format!("    path: web::Path<{}>,", key.tuple_type());
        let unpack = format!("    let {} = path.into_inner();", key.tuple_pattern());
        writeln!(out)?;
        writeln!(out, "async fn find(")?;
        writeln!(out, "    state: web::Data<AppState>,")?;
        writeln!(out, "{}", extract)?;
        writeln!(out, ") -> Result<web::Json<{}>, ApiError> {{", name)?;
        writeln!(out, "{}", unpack)?;
        writeln!(out, "    Ok(web::Json(state.{}.get({}).await?))", service, key.args())?;
        writeln!(out, "}}")?;

        if updatable {
            writeln!(out)?;
            writeln!(out, "async fn update(")?;
            writeln!(out, "    state: web::Data<AppState>,")?;
            writeln!(out, "{}", extract)?;
            writeln!(out, "    input: web::Json<Update{}>,", name)?;
            writeln!(out, ") -> Result<web::Json<{}>, ApiError> {{", name)?;
            writeln!(out, "{}", unpack)?;
            writeln!(out, "    let input = input.into_inner();")?;
            if ctx.features.validation {
                writeln!(out, "    input.validate()?;")?;
            }
            writeln!(
                out,
                "    Ok(web::Json(state.{}.update({}, input).await?))",
                service,
                key.args()
            )?;
            writeln!(out, "}}")?;
        }

        writeln!(out)?;
        writeln!(out, "async fn remove(")?;
        writeln!(out, "    state: web::Data<AppState>,")?;
        writeln!(out, "{}", extract)?;
        writeln!(out, ") -> Result<HttpResponse, ApiError> {{")?;
        writeln!(out, "{}", unpack)?;
        writeln!(out, "    state.{}.delete({}).await?;", service, key.args())?;
        writeln!(out, "    Ok(HttpResponse::NoContent().finish())")?;
        writeln!(out, "}}")?;
    }
    Ok(out)
}

fn axum_router(out: &mut String, ctx: &EmitContext<'_>) -> fmt::Result {
    writeln!(out, "use axum::Router;")?;
    if ctx.features.auth {
        writeln!(out, "use axum::middleware;")?;
    }
    writeln!(out)?;
    writeln!(out, "use crate::state::AppState;")?;
    writeln!(out)?;
    writeln!(out, "pub fn router(state: AppState) -> Router {{")?;
    let mut chain: Vec<String> = ctx
        .entities
        .iter()
        .map(|e| format!(".merge({}::router())", e.names.file))
        .collect();
    if ctx.features.auth {
        chain.push(".layer(middleware::from_fn(crate::auth::require_auth))".to_string());
    }
    if ctx.features.rate_limit {
        chain.push(".layer(crate::rate_limit::layer())".to_string());
    }
    writeln!(out, "    let api = Router::new()")?;
    for link in &chain {
        writeln!(out, "        {}", link)?;
    }
    writeln!(out, "        .route(\"/health\", axum::routing::get(|| async {{ \"ok\" }}));")?;
    writeln!(out, "    Router::new().nest(\"/api\", api).with_state(state)")?;
    writeln!(out, "}}")
}

fn actix_config(out: &mut String, ctx: &EmitContext<'_>) -> fmt::Result {
    writeln!(out, "use actix_web::web;")?;
    writeln!(out)?;
    writeln!(out, "pub fn configure(cfg: &mut web::ServiceConfig) {{")?;
    for entity in ctx.entities {
        writeln!(out, "    {}::configure(cfg);", entity.names.file)?;
    }
    writeln!(out, "}}")
}

fn state(ctx: &EmitContext<'_>) -> Result<String, fmt::Error> {
    let mut out = String::new();
    for entity in ctx.entities {
        writeln!(
            out,
            "use crate::services::{}::{}Service;",
            entity.names.file, entity.names.entity
        )?;
    }
    writeln!(out, "use sqlx::PgPool;")?;
    writeln!(out)?;
    writeln!(out, "#[derive(Clone)]")?;
    writeln!(out, "pub struct AppState {{")?;
    for entity in ctx.entities {
        writeln!(
            out,
            "    pub {}: {}Service,",
            ident(&entity.names.collection),
            entity.names.entity
        )?;
    }
    writeln!(out, "}}")?;
    writeln!(out)?;
    writeln!(out, "impl AppState {{")?;
    writeln!(out, "    pub fn new(pool: PgPool) -> Self {{")?;
    writeln!(out, "        Self {{")?;
    for entity in ctx.entities {
        writeln!(
            out,
            "            {}: {}Service::new(pool.clone()),",
            ident(&entity.names.collection),
            entity.names.entity
        )?;
    }
    writeln!(out, "        }}")?;
    writeln!(out, "    }}")?;
    writeln!(out, "}}")?;
    Ok(out)
}

fn error(framework: Framework, ctx: &EmitContext<'_>) -> Result<String, fmt::Error> {
    let mut out = String::new();
    match framework {
        Framework::Axum => {
            writeln!(out, "use axum::Json;")?;
            writeln!(out, "use axum::http::StatusCode;")?;
            writeln!(out, "use axum::response::{{IntoResponse, Response}};")?;
        }
        Framework::Actix => {
            writeln!(out, "use actix_web::http::StatusCode;")?;
            writeln!(out, "use actix_web::{{HttpResponse, ResponseError}};")?;
        }
    }
    writeln!(out, "use serde_json::json;")?;
    writeln!(out)?;
    writeln!(out, "#[derive(Debug)]")?;
    writeln!(out, "pub enum ApiError {{")?;
    writeln!(out, "    NotFound,")?;
    writeln!(out, "    Unauthorized,")?;
    if ctx.features.validation {
        writeln!(out, "    Invalid(validator::ValidationErrors),")?;
    }
    writeln!(out, "    Database(sqlx::Error),")?;
    writeln!(out, "}}")?;
    writeln!(out)?;
    writeln!(out, "impl ApiError {{")?;
    writeln!(out, "    fn status(&self) -> StatusCode {{")?;
    writeln!(out, "        match self {{")?;
    writeln!(out, "            Self::NotFound => StatusCode::NOT_FOUND,")?;
    writeln!(out, "            Self::Unauthorized => StatusCode::UNAUTHORIZED,")?;
    if ctx.features.validation {
        writeln!(out, "            Self::Invalid(_) => StatusCode::UNPROCESSABLE_ENTITY,")?;
    }
    writeln!(out, "            Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,")?;
    writeln!(out, "        }}")?;
    writeln!(out, "    }}")?;
    writeln!(out, "}}")?;
    writeln!(out)?;
    writeln!(out, "impl std::fmt::Display for ApiError {{")?;
    writeln!(out, "    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {{")?;
    writeln!(out, "        match self {{")?;
    writeln!(out, "            Self::NotFound => f.write_str(\"not found\"),")?;
    writeln!(out, "            Self::Unauthorized => f.write_str(\"unauthorized\"),")?;
    if ctx.features.validation {
        writeln!(out, "            Self::Invalid(e) => write!(f, \"{{}}\", e),")?;
    }
    writeln!(out, "            Self::Database(_) => f.write_str(\"database error\"),")?;
    writeln!(out, "        }}")?;
    writeln!(out, "    }}")?;
    writeln!(out, "}}")?;
    writeln!(out)?;
    writeln!(out, "impl From<sqlx::Error> for ApiError {{")?;
    writeln!(out, "    fn from(e: sqlx::Error) -> Self {{")?;
    writeln!(out, "        Self::Database(e)")?;
    writeln!(out, "    }}")?;
    writeln!(out, "}}")?;
    if ctx.features.validation {
        writeln!(out)?;
        writeln!(out, "impl From<validator::ValidationErrors> for ApiError {{")?;
        writeln!(out, "    fn from(e: validator::ValidationErrors) -> Self {{")?;
        writeln!(out, "        Self::Invalid(e)")?;
        writeln!(out, "    }}")?;
        writeln!(out, "}}")?;
    }
    writeln!(out)?;
    match framework {
        Framework::Axum => {
            writeln!(out, "impl IntoResponse for ApiError {{")?;
            writeln!(out, "    fn into_response(self) -> Response {{")?;
            writeln!(
                out,
                "        (self.status(), Json(json!({{ \"error\": self.to_string() }}))).into_response()"
            )?;
            writeln!(out, "    }}")?;
            writeln!(out, "}}")?;
        }
        Framework::Actix => {
            writeln!(out, "impl ResponseError for ApiError {{")?;
            writeln!(out, "    fn status_code(&self) -> StatusCode {{")?;
            writeln!(out, "        self.status()")?;
            writeln!(out, "    }}")?;
            writeln!(out)?;
            writeln!(out, "    fn error_response(&self) -> HttpResponse {{")?;
            writeln!(
                out,
                "        HttpResponse::build(self.status()).json(json!({{ \"error\": self.to_string() }}))"
            )?;
            writeln!(out, "    }}")?;
            writeln!(out, "}}")?;
        }
    }
    Ok(out)
}

fn main(framework: Framework, ctx: &EmitContext<'_>) -> Result<String, fmt::Error> {
    let mut out = String::new();
    let mut modules = vec!["dto", "error", "models", "repositories", "routes", "services", "state"];
    if ctx.features.auth {
        modules.push("auth");
    }
    if ctx.features.caching {
        modules.push("cache");
    }
    if ctx.features.pagination {
        modules.push("pagination");
    }
    if ctx.features.rate_limit {
        modules.push("rate_limit");
    }
    modules.sort();
    writeln!(out, "//! {} API server.", ctx.project)?;
    writeln!(out)?;
    for module in modules {
        writeln!(out, "mod {};", module)?;
    }
    writeln!(out)?;
    writeln!(out, "use sqlx::postgres::PgPoolOptions;")?;
    writeln!(out, "use state::AppState;")?;
    writeln!(out)?;
    match framework {
        Framework::Axum => {
            writeln!(out, "#[tokio::main]")?;
            writeln!(out, "async fn main() -> Result<(), Box<dyn std::error::Error>> {{")?;
        }
        Framework::Actix => {
            writeln!(out, "use actix_web::{{App, HttpServer, web}};")?;
            writeln!(out)?;
            writeln!(out, "#[actix_web::main]")?;
            writeln!(out, "async fn main() -> Result<(), Box<dyn std::error::Error>> {{")?;
        }
    }
    writeln!(out, "    let url = std::env::var(\"DATABASE_URL\")?;")?;
    writeln!(out, "    let pool = PgPoolOptions::new().max_connections(10).connect(&url).await?;")?;
    writeln!(out, "    let state = AppState::new(pool);")?;
    writeln!(
        out,
        "    let addr = std::env::var(\"BIND_ADDR\").unwrap_or_else(|_| \"0.0.0.0:8080\".to_string());"
    )?;
    match framework {
        Framework::Axum => {
            writeln!(out, "    let listener = tokio::net::TcpListener::bind(&addr).await?;")?;
            if ctx.features.rate_limit {
                writeln!(out, "    let app = routes::router(state)")?;
                writeln!(
                    out,
                    "        .into_make_service_with_connect_info::<std::net::SocketAddr>();"
                )?;
                writeln!(out, "    axum::serve(listener, app).await?;")?;
            } else {
                writeln!(out, "    axum::serve(listener, routes::router(state)).await?;")?;
            }
        }
        Framework::Actix => {
            writeln!(out, "    HttpServer::new(move || {{")?;
            writeln!(out, "        App::new()")?;
            writeln!(out, "            .app_data(web::Data::new(state.clone()))")?;
            if ctx.features.auth {
                writeln!(
                    out,
                    "            .service(web::scope(\"/api\").wrap(actix_web::middleware::from_fn(auth::require_auth)).configure(routes::configure))"
                )?;
            } else {
                writeln!(
                    out,
                    "            .service(web::scope(\"/api\").configure(routes::configure))"
                )?;
            }
            writeln!(out, "    }})")?;
            writeln!(out, "    .bind(&addr)?")?;
            writeln!(out, "    .run()")?;
            writeln!(out, "    .await?;")?;
        }
    }
    writeln!(out, "    Ok(())")?;
    writeln!(out, "}}")?;
    Ok(out)
}

const PAGINATION: &str = r#"use serde::{Deserialize, Serialize};

const MAX_PER_PAGE: i64 = 100;

#[derive(Debug, Clone, Deserialize)]
pub struct PageParams {
    #[serde(default = "first_page")]
    pub page: i64,
    #[serde(default = "default_per_page")]
    pub per_page: i64,
}

fn first_page() -> i64 {
    1
}

fn default_per_page() -> i64 {
    20
}

impl PageParams {
    pub fn limit(&self) -> i64 {
        self.per_page.clamp(1, MAX_PER_PAGE)
    }

    pub fn offset(&self) -> i64 {
        (self.page.max(1) - 1) * self.limit()
    }
}

#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: i64, params: &PageParams) -> Self {
        Self {
            items,
            total,
            page: params.page.max(1),
            per_page: params.limit(),
        }
    }
}
"#;

const CACHE: &str = r#"use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

const TTL: Duration = Duration::from_secs(60);

/// Read-through cache for single rows.
pub struct Cache<T> {
    entries: Arc<RwLock<HashMap<String, (Instant, T)>>>,
}

impl<T> Clone for Cache<T> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<T> Default for Cache<T> {
    fn default() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl<T: Clone> Cache<T> {
    pub fn get(&self, key: &str) -> Option<T> {
        let entries = self.entries.read().ok()?;
        let (stored, value) = entries.get(key)?;
        (stored.elapsed() < TTL).then(|| value.clone())
    }

    pub fn put(&self, key: String, value: T) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(key, (Instant::now(), value));
        }
    }

    pub fn evict(&self, key: &str) {
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(key);
        }
    }
}
"#;

const AXUM_AUTH: &str = r#"use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::Deserialize;

use crate::error::ApiError;

#[derive(Debug, Clone, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

pub async fn require_auth(mut request: Request, next: Next) -> Result<Response, ApiError> {
    let token = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?;
    let secret = std::env::var("JWT_SECRET").map_err(|_| ApiError::Unauthorized)?;
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| ApiError::Unauthorized)?;
    request.extensions_mut().insert(data.claims);
    Ok(next.run(request).await)
}
"#;

const ACTIX_AUTH: &str = r#"use actix_web::body::MessageBody;
use actix_web::dev::{ServiceRequest, ServiceResponse};
use actix_web::middleware::Next;
use actix_web::{Error, HttpMessage};
use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::Deserialize;

use crate::error::ApiError;

#[derive(Debug, Clone, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

pub async fn require_auth(
    request: ServiceRequest,
    next: Next<impl MessageBody>,
) -> Result<ServiceResponse<impl MessageBody>, Error> {
    let token = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?
        .to_string();
    let secret = std::env::var("JWT_SECRET").map_err(|_| ApiError::Unauthorized)?;
    let data = decode::<Claims>(
        &token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| ApiError::Unauthorized)?;
    request.extensions_mut().insert(data.claims);
    next.call(request).await
}
"#;

const AXUM_RATE_LIMIT: &str = r#"use std::sync::Arc;

use governor::middleware::NoOpMiddleware;
use tower_governor::GovernorLayer;
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::key_extractor::PeerIpKeyExtractor;

/// Two requests per second per client, bursts of up to fifty.
pub fn layer() -> GovernorLayer<PeerIpKeyExtractor, NoOpMiddleware> {
    let config = GovernorConfigBuilder::default()
        .per_second(2)
        .burst_size(50)
        .finish()
        .expect("valid rate limit configuration");
    GovernorLayer {
        config: Arc::new(config),
    }
}
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
                "CREATE TABLE users (id BIGSERIAL PRIMARY KEY, email VARCHAR(255) NOT NULL UNIQUE, type TEXT);
                 CREATE TABLE posts (id SERIAL PRIMARY KEY, user_id BIGINT NOT NULL REFERENCES users(id), body TEXT);",
                Dialect::Postgres,
            )
            .catalog,
        )
    }

    fn files(framework: Framework, toggles: FeatureToggles) -> FileSet {
        let profiles = ProfileSet::builtin().unwrap();
        let fw = match framework {
            Framework::Axum => "axum",
            Framework::Actix => "actix",
        };
        let profile = profiles.get(&TargetKey::new("rust", fw)).unwrap();
        generate(&RustEmitter::new(framework), &schema(), profile, &toggles, "blog")
            .unwrap()
            .files
    }

    #[test]
    fn test_axum_layout() {
        let files = files(Framework::Axum, FeatureToggles::new());
        let paths: Vec<&str> = files.paths().collect();
        assert!(paths.contains(&"src/models/user.rs"));
        assert!(paths.contains(&"src/routes/post.rs"));
        assert!(paths.contains(&"src/pagination.rs"));
        assert!(!paths.contains(&"src/auth.rs"));

        let model = files.get("src/models/user.rs").unwrap();
        assert!(model.contains("pub struct User {"));
        assert!(model.contains("pub id: i64,"));
        assert!(model.contains("pub r#type: Option<String>,"));

        let routes = files.get("src/routes/post.rs").unwrap();
        assert!(routes.contains(".route(\"/posts/:id\", get(find).put(update).delete(remove))"));
    }

    #[test]
    fn test_relation_loaders() {
        let files = files(Framework::Axum, FeatureToggles::new());
        let repo = files.get("src/repositories/post.rs").unwrap();
        assert!(repo.contains("pub async fn user(&self, row: &Post) -> Result<Option<User>, sqlx::Error>"));
        let repo = files.get("src/repositories/user.rs").unwrap();
        assert!(repo.contains("pub async fn posts(&self, row: &User) -> Result<Vec<Post>, sqlx::Error>"));
    }

    #[test]
    fn test_validation_attributes() {
        let files = files(Framework::Actix, FeatureToggles::new());
        let dto = files.get("src/dto/user.rs").unwrap();
        assert!(dto.contains("#[validate(length(max = 255))]"));

        let plain = self::files(Framework::Actix, FeatureToggles::new().with("validation", false));
        assert!(!plain.get("src/dto/user.rs").unwrap().contains("Validate"));
    }

    #[test]
    fn test_actix_ignores_rate_limit() {
        let files = files(Framework::Actix, FeatureToggles::new().with("rate_limit", true));
        assert!(files.get("src/rate_limit.rs").is_none());
        assert!(files.get("src/main.rs").unwrap().contains("#[actix_web::main]"));
    }
}
