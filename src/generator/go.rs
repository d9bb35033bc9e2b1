//! Go server projects on gorm, served by gin or echo.

use super::model::{EntityModel, FieldModel, RelationModel};
use super::{EmitContext, Emitter, FileSet};
use crate::error::GenerationError;
use crate::ir::RelationKind;
use heck::{ToKebabCase, ToLowerCamelCase, ToSnakeCase};
use std::collections::BTreeSet;
use std::fmt::{self, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framework {
    Gin,
    Echo,
}

pub struct GoEmitter {
    framework: Framework,
}

impl GoEmitter {
    pub fn new(framework: Framework) -> Self {
        Self { framework }
    }
}

const KEYWORDS: [&str; 25] = [
    "break",
    "case",
    "chan",
    "const",
    "continue",
    "default",
    "defer",
    "else",
    "fallthrough",
    "for",
    "func",
    "go",
    "goto",
    "if",
    "import",
    "interface",
    "map",
    "package",
    "range",
    "return",
    "select",
    "struct",
    "switch",
    "type",
    "var",
];

/// Locals the generated handlers and services already use.
const TAKEN: [&str; 8] = ["c", "h", "s", "r", "err", "ctx", "row", "req"];

fn param(column: &str) -> String {
    let name = column.to_lower_camel_case();
    if KEYWORDS.contains(&name.as_str()) || TAKEN.contains(&name.as_str()) {
        format!("{}Key", name)
    } else {
        name
    }
}

fn module(ctx: &EmitContext<'_>) -> String {
    ctx.project.to_kebab_case()
}

/// One `.go` source: package clause, grouped imports, body.
struct Source {
    package: &'static str,
    imports: BTreeSet<String>,
    body: String,
}

impl Source {
    fn new(package: &'static str) -> Self {
        Self {
            package,
            imports: BTreeSet::new(),
            body: String::new(),
        }
    }

    fn import(&mut self, path: impl Into<String>) {
        self.imports.insert(path.into());
    }

    fn render(self, module: &str) -> Result<String, fmt::Error> {
        let local = format!("{}/", module);
        let (std, rest): (Vec<&String>, Vec<&String>) = self
            .imports
            .iter()
            .partition(|p| !p.starts_with(&local) && !p.split('/').next().is_some_and(|h| h.contains('.')));
        let (internal, external): (Vec<&String>, Vec<&String>) =
            rest.into_iter().partition(|p| p.starts_with(&local));

        let mut out = String::new();
        writeln!(out, "package {}", self.package)?;
        writeln!(out)?;
        let groups: Vec<&Vec<&String>> = [&std, &external, &internal]
            .into_iter()
            .filter(|g| !g.is_empty())
            .collect();
        if !groups.is_empty() {
            writeln!(out, "import (")?;
            for (i, group) in groups.iter().enumerate() {
                if i > 0 {
                    writeln!(out)?;
                }
                for path in group.iter() {
                    writeln!(out, "\t\"{}\"", path)?;
                }
            }
            writeln!(out, ")")?;
            writeln!(out)?;
        }
        out.push_str(&self.body);
        Ok(out)
    }
}

/// Key columns as Go parameters.
struct Key<'f> {
    fields: Vec<&'f FieldModel>,
}

impl<'f> Key<'f> {
    fn of(entity: &'f EntityModel<'_>) -> Self {
        Self {
            fields: entity.key_fields(),
        }
    }

    fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// `id int32, slug string`
    fn params(&self) -> String {
        self.fields
            .iter()
            .map(|f| format!("{} {}", param(&f.column), f.ty.inner))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn args(&self) -> String {
        self.fields
            .iter()
            .map(|f| param(&f.column))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// gorm condition with placeholders followed by the values.
    fn condition(&self) -> String {
        let clause = self
            .fields
            .iter()
            .map(|f| format!("{} = ?", f.column))
            .collect::<Vec<_>>()
            .join(" AND ");
        format!("\"{}\", {}", clause, self.args())
    }

    fn path(&self) -> String {
        self.fields.iter().map(|f| format!("/:{}", f.column)).collect()
    }

    fn cache_key(&self) -> String {
        match self.fields.as_slice() {
            [single] => format!("fmt.Sprint({})", param(&single.column)),
            _ => format!(
                "fmt.Sprint({})",
                self.fields
                    .iter()
                    .map(|f| param(&f.column))
                    .collect::<Vec<_>>()
                    .join(", \"/\", ")
            ),
        }
    }
}

fn type_imports<'f>(
    ctx: &EmitContext<'_>,
    fields: impl Iterator<Item = &'f FieldModel>,
    src: &mut Source,
) {
    for field in fields {
        if let Some(path) = ctx.profile.import_for(&field.ty.base) {
            src.import(path);
        }
    }
}

fn gorm_tag(field: &FieldModel) -> String {
    let mut parts = vec![format!("column:{}", field.column)];
    if field.primary_key {
        parts.push("primaryKey".to_string());
    }
    if field.auto_increment {
        parts.push("autoIncrement".to_string());
    }
    if let (Some(p), Some(s)) = (field.ty.precision, field.ty.scale) {
        parts.push(format!("type:numeric({},{})", p, s));
    }
    if !field.ty.nullable && !field.primary_key {
        parts.push("not null".to_string());
    }
    if field.unique && !field.primary_key {
        parts.push("unique".to_string());
    }
    if let Some(default) = &field.default {
        parts.push(format!("default:{}", default.replace(';', "\\;")));
    }
    parts.join(";")
}

/// Go field names of `columns` on the entity owning them.
fn field_names(ctx: &EmitContext<'_>, table: &str, columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| ctx.field_name(table, c))
        .collect::<Vec<_>>()
        .join(",")
}

fn relation_field(
    ctx: &EmitContext<'_>,
    entity: &EntityModel<'_>,
    relation: &RelationModel,
) -> String {
    let here = &entity.table.name;
    let there = &relation.target_table;
    let (ty, tag) = match &relation.via {
        Some(junction) => (
            format!("[]{}", relation.target_entity),
            format!(
                "many2many:{};foreignKey:{};joinForeignKey:{};references:{};joinReferences:{}",
                junction.table,
                field_names(ctx, here, &relation.local_columns),
                junction.local_columns.join(","),
                field_names(ctx, there, &relation.remote_columns),
                junction.remote_columns.join(","),
            ),
        ),
        None if !relation.inverse => (
            format!("*{}", relation.target_entity),
            format!(
                "foreignKey:{};references:{}",
                field_names(ctx, here, &relation.local_columns),
                field_names(ctx, there, &relation.remote_columns)
            ),
        ),
        None => {
            let ty = if relation.kind == RelationKind::OneToOne {
                format!("*{}", relation.target_entity)
            } else {
                format!("[]{}", relation.target_entity)
            };
            let tag = format!(
                "foreignKey:{};references:{}",
                field_names(ctx, there, &relation.remote_columns),
                field_names(ctx, here, &relation.local_columns)
            );
            (ty, tag)
        }
    };
    format!(
        "\t{} {} `gorm:\"{}\" json:\"{},omitempty\"`",
        relation.name,
        ty,
        tag,
        relation.name.to_snake_case()
    )
}

/// Framework-specific handler spellings.
impl GoEmitter {
    fn web_import(&self) -> &'static str {
        match self.framework {
            Framework::Gin => "github.com/gin-gonic/gin",
            Framework::Echo => "github.com/labstack/echo/v4",
        }
    }

    fn handler_sig(&self) -> &'static str {
        match self.framework {
            Framework::Gin => "c *gin.Context",
            Framework::Echo => "c echo.Context) error",
        }
    }

    fn request_ctx(&self) -> &'static str {
        match self.framework {
            Framework::Gin => "c.Request.Context()",
            Framework::Echo => "c.Request().Context()",
        }
    }

    fn query(&self, name: &str) -> String {
        match self.framework {
            Framework::Gin => format!("c.Query(\"{}\")", name),
            Framework::Echo => format!("c.QueryParam(\"{}\")", name),
        }
    }

    /// Lines handling a service error.
    fn fail(&self) -> &'static str {
        match self.framework {
            Framework::Gin => "\t\trespondError(c, err)\n\t\treturn\n",
            Framework::Echo => "\t\treturn toHTTPError(err)\n",
        }
    }

    fn bad(&self, status: &str, message: &str) -> String {
        match self.framework {
            Framework::Gin => format!(
                "\t\tc.JSON({}, gin.H{{\"error\": {}}})\n\t\treturn\n",
                status, message
            ),
            Framework::Echo => format!("\t\treturn echo.NewHTTPError({}, {})\n", status, message),
        }
    }

    fn reply(&self, status: &str, body: &str) -> String {
        match self.framework {
            Framework::Gin => format!("\tc.JSON({}, {})\n", status, body),
            Framework::Echo => format!("\treturn c.JSON({}, {})\n", status, body),
        }
    }

    fn no_content(&self) -> &'static str {
        match self.framework {
            Framework::Gin => "\tc.Status(http.StatusNoContent)\n",
            Framework::Echo => "\treturn c.NoContent(http.StatusNoContent)\n",
        }
    }

    fn group_type(&self) -> &'static str {
        match self.framework {
            Framework::Gin => "*gin.RouterGroup",
            Framework::Echo => "*echo.Group",
        }
    }

    fn validate_tag(&self) -> &'static str {
        match self.framework {
            Framework::Gin => "binding",
            Framework::Echo => "validate",
        }
    }
}

impl Emitter for GoEmitter {
    fn emit_entity(
        &self,
        ctx: &EmitContext<'_>,
        entity: &EntityModel<'_>,
        out: &mut FileSet,
    ) -> Result<(), GenerationError> {
        let key = ctx.key();
        let file = &entity.names.file;
        out.add(key, format!("internal/models/{}.go", file), model(ctx, entity)?)?;
        out.add(key, format!("internal/dto/{}.go", file), self.dto(ctx, entity)?)?;
        out.add(
            key,
            format!("internal/repository/{}.go", file),
            repository(ctx, entity)?,
        )?;
        out.add(
            key,
            format!("internal/service/{}.go", file),
            self.service(ctx, entity)?,
        )?;
        out.add(
            key,
            format!("internal/handler/{}.go", file),
            self.handler(ctx, entity)?,
        )?;
        Ok(())
    }

    fn emit_shared(&self, ctx: &EmitContext<'_>, out: &mut FileSet) -> Result<(), GenerationError> {
        let key = ctx.key();
        let module = module(ctx);
        out.add(key, "cmd/server/main.go", self.main(ctx)?)?;
        out.add(key, "internal/router/router.go", self.router(ctx)?)?;
        out.add(key, "internal/database/database.go", DATABASE.to_string())?;
        out.add(
            key,
            "internal/service/errors.go",
            "package service\n\nimport \"errors\"\n\nvar ErrNotFound = errors.New(\"not found\")\n"
                .to_string(),
        )?;
        let errors = match self.framework {
            Framework::Gin => GIN_ERRORS,
            Framework::Echo => ECHO_ERRORS,
        };
        out.add(
            key,
            "internal/handler/errors.go",
            errors.replace("{module}", &module),
        )?;
        if self.framework == Framework::Echo && ctx.features.validation {
            out.add(key, "internal/handler/validator.go", ECHO_VALIDATOR.to_string())?;
        }
        if ctx.features.pagination {
            out.add(key, "internal/pagination/pagination.go", PAGINATION.to_string())?;
        }
        if ctx.features.auth {
            let auth = match self.framework {
                Framework::Gin => GIN_AUTH,
                Framework::Echo => ECHO_AUTH,
            };
            out.add(key, "internal/middleware/auth.go", auth.to_string())?;
        }
        if ctx.features.rate_limit && self.framework == Framework::Gin {
            out.add(key, "internal/middleware/rate_limit.go", GIN_RATE_LIMIT.to_string())?;
        }
        if ctx.features.caching {
            out.add(key, "internal/cache/cache.go", CACHE.to_string())?;
        }
        Ok(())
    }
}

fn model(ctx: &EmitContext<'_>, entity: &EntityModel<'_>) -> Result<String, fmt::Error> {
    let mut src = Source::new("models");
    type_imports(ctx, entity.fields.iter(), &mut src);
    let name = &entity.names.entity;
    let body = &mut src.body;

    writeln!(body, "type {} struct {{", name)?;
    for field in &entity.fields {
        if let Some(comment) = &field.comment {
            writeln!(body, "\t// {}", comment)?;
        }
        writeln!(
            body,
            "\t{} {} `gorm:\"{}\" json:\"{}\"`",
            field.name,
            field.ty.name,
            gorm_tag(field),
            field.column
        )?;
    }
    if !entity.relations.is_empty() {
        writeln!(body)?;
        for relation in &entity.relations {
            writeln!(body, "{}", relation_field(ctx, entity, relation))?;
        }
    }
    writeln!(body, "}}")?;
    writeln!(body)?;
    writeln!(body, "func ({}) TableName() string {{", name)?;
    writeln!(body, "\treturn \"{}\"", entity.table.name)?;
    writeln!(body, "}}")?;
    src.render(&module(ctx))
}

impl GoEmitter {
    fn dto(&self, ctx: &EmitContext<'_>, entity: &EntityModel<'_>) -> Result<String, fmt::Error> {
        let mut src = Source::new("dto");
        type_imports(ctx, entity.input_fields(), &mut src);
        let name = &entity.names.entity;
        let tag = self.validate_tag();
        let max = |field: &FieldModel| {
            field
                .ty
                .length
                .filter(|_| ctx.features.validation && field.sql_type.is_textual())
                .map(|n| format!("max={}", n))
        };
        let body = &mut src.body;

        writeln!(body, "type Create{}Request struct {{", name)?;
        for field in entity.input_fields() {
            let (ty, mut rules) = if field.is_required_input() {
                (field.ty.name.clone(), vec!["required".to_string()])
            } else if field.ty.nullable {
                (field.ty.name.clone(), vec!["omitempty".to_string()])
            } else {
                (format!("*{}", field.ty.inner), vec!["omitempty".to_string()])
            };
            rules.extend(max(field));
            let validation = if ctx.features.validation && (rules.len() > 1 || rules[0] == "required") {
                format!(" {}:\"{}\"", tag, rules.join(","))
            } else {
                String::new()
            };
            writeln!(
                body,
                "\t{} {} `json:\"{}\"{}`",
                field.name, ty, field.column, validation
            )?;
        }
        writeln!(body, "}}")?;
        writeln!(body)?;
        writeln!(body, "type Update{}Request struct {{", name)?;
        for field in entity.input_fields() {
            let validation = match max(field) {
                Some(rule) => format!(" {}:\"omitempty,{}\"", tag, rule),
                None => String::new(),
            };
            writeln!(
                body,
                "\t{} *{} `json:\"{},omitempty\"{}`",
                field.name, field.ty.inner, field.column, validation
            )?;
        }
        writeln!(body, "}}")?;
        src.render(&module(ctx))
    }
}

fn repository(ctx: &EmitContext<'_>, entity: &EntityModel<'_>) -> Result<String, fmt::Error> {
    let module = module(ctx);
    let mut src = Source::new("repository");
    src.import("context");
    src.import("gorm.io/gorm");
    src.import("gorm.io/gorm/clause");
    src.import(format!("{}/internal/models", module));
    let key = Key::of(entity);
    type_imports(ctx, key.fields.iter().copied(), &mut src);
    let soft = entity
        .soft_delete_column()
        .filter(|_| ctx.features.soft_delete);
    if soft.is_some() {
        src.import("time");
    }

    let name = &entity.names.entity;
    let repo = format!("{}Repository", name);
    let live = soft
        .map(|f| format!(".Where(\"{} IS NULL\")", f.column))
        .unwrap_or_default();
    let order = if key.is_empty() {
        String::new()
    } else {
        let cols: Vec<&str> = key.fields.iter().map(|f| f.column.as_str()).collect();
        format!(".Order(\"{}\")", cols.join(", "))
    };
    let body = &mut src.body;

    writeln!(body, "type {} struct {{", repo)?;
    writeln!(body, "\tdb *gorm.DB")?;
    writeln!(body, "}}")?;
    writeln!(body)?;
    writeln!(body, "func New{0}(db *gorm.DB) *{0} {{", repo)?;
    writeln!(body, "\treturn &{}{{db: db}}", repo)?;
    writeln!(body, "}}")?;
    writeln!(body)?;
    writeln!(
        body,
        "func (r *{}) List(ctx context.Context, offset, limit int) ([]models.{}, int64, error) {{",
        repo, name
    )?;
    writeln!(body, "\tvar rows []models.{}", name)?;
    writeln!(body, "\tvar total int64")?;
    writeln!(
        body,
        "\tquery := r.db.WithContext(ctx).Model(&models.{}{{}}){}",
        name, live
    )?;
    writeln!(body, "\tif err := query.Count(&total).Error; err != nil {{")?;
    writeln!(body, "\t\treturn nil, 0, err")?;
    writeln!(body, "\t}}")?;
    writeln!(body, "\tif limit > 0 {{")?;
    writeln!(body, "\t\tquery = query.Offset(offset).Limit(limit)")?;
    writeln!(body, "\t}}")?;
    writeln!(body, "\terr := query{}.Find(&rows).Error", order)?;
    writeln!(body, "\treturn rows, total, err")?;
    writeln!(body, "}}")?;

    if !key.is_empty() {
        let preload: String = entity
            .relations
            .iter()
            .map(|r| format!(".Preload(\"{}\")", r.name))
            .collect();
        writeln!(body)?;
        writeln!(
            body,
            "func (r *{}) Get(ctx context.Context, {}) (*models.{}, error) {{",
            repo,
            key.params(),
            name
        )?;
        writeln!(body, "\tvar row models.{}", name)?;
        writeln!(
            body,
            "\terr := r.db.WithContext(ctx){}{}.Where({}).First(&row).Error",
            preload,
            live,
            key.condition()
        )?;
        writeln!(body, "\tif err != nil {{")?;
        writeln!(body, "\t\treturn nil, err")?;
        writeln!(body, "\t}}")?;
        writeln!(body, "\treturn &row, nil")?;
        writeln!(body, "}}")?;
    }

    writeln!(body)?;
    writeln!(
        body,
        "func (r *{}) Create(ctx context.Context, row *models.{}) error {{",
        repo, name
    )?;
    writeln!(body, "\treturn r.db.WithContext(ctx).Create(row).Error")?;
    writeln!(body, "}}")?;
    writeln!(body)?;
    writeln!(
        body,
        "func (r *{}) Save(ctx context.Context, row *models.{}) error {{",
        repo, name
    )?;
    writeln!(body, "\treturn r.db.WithContext(ctx).Omit(clause.Associations).Save(row).Error")?;
    writeln!(body, "}}")?;
    writeln!(body)?;
    writeln!(
        body,
        "func (r *{}) Delete(ctx context.Context, row *models.{}) error {{",
        repo, name
    )?;
    match soft {
        Some(column) => writeln!(
            body,
            "\treturn r.db.WithContext(ctx).Model(row).Update(\"{}\", time.Now()).Error",
            column.column
        )?,
        None => writeln!(body, "\treturn r.db.WithContext(ctx).Delete(row).Error")?,
    }
    writeln!(body, "}}")?;
    src.render(&module)
}

impl GoEmitter {
    fn service(&self, ctx: &EmitContext<'_>, entity: &EntityModel<'_>) -> Result<String, fmt::Error> {
        let module = module(ctx);
        let key = Key::of(entity);
        let caching = ctx.features.caching && !key.is_empty();
        let mut src = Source::new("service");
        src.import("context");
        src.import(format!("{}/internal/dto", module));
        src.import(format!("{}/internal/models", module));
        src.import(format!("{}/internal/repository", module));
        type_imports(ctx, key.fields.iter().copied(), &mut src);
        if !key.is_empty() {
            src.import("errors");
            src.import("gorm.io/gorm");
        }
        if caching {
            src.import("fmt");
            src.import("time");
            src.import(format!("{}/internal/cache", module));
        }

        let name = &entity.names.entity;
        let service = format!("{}Service", name);
        let body = &mut src.body;

        writeln!(body, "type {} struct {{", service)?;
        writeln!(body, "\trepo *repository.{}Repository", name)?;
        if caching {
            writeln!(body, "\tcache *cache.Cache[models.{}]", name)?;
        }
        writeln!(body, "}}")?;
        writeln!(body)?;
        writeln!(
            body,
            "func New{}(repo *repository.{}Repository) *{0} {{",
            service, name
        )?;
        if caching {
            writeln!(
                body,
                "\treturn &{}{{repo: repo, cache: cache.New[models.{}](time.Minute)}}",
                service, name
            )?;
        } else {
            writeln!(body, "\treturn &{}{{repo: repo}}", service)?;
        }
        writeln!(body, "}}")?;
        writeln!(body)?;
        writeln!(
            body,
            "func (s *{}) List(ctx context.Context, offset, limit int) ([]models.{}, int64, error) {{",
            service, name
        )?;
        writeln!(body, "\treturn s.repo.List(ctx, offset, limit)")?;
        writeln!(body, "}}")?;
        writeln!(body)?;

        writeln!(
            body,
            "func (s *{}) Create(ctx context.Context, req dto.Create{}Request) (*models.{1}, error) {{",
            service, name
        )?;
        let (direct, optional): (Vec<&FieldModel>, Vec<&FieldModel>) = entity
            .input_fields()
            .partition(|f| f.is_required_input() || f.ty.nullable);
        if direct.is_empty() {
            writeln!(body, "\trow := models.{}{{}}", name)?;
        } else {
            writeln!(body, "\trow := models.{}{{", name)?;
            for field in &direct {
                writeln!(body, "\t\t{0}: req.{0},", field.name)?;
            }
            writeln!(body, "\t}}")?;
        }
        for field in &optional {
            writeln!(body, "\tif req.{} != nil {{", field.name)?;
            writeln!(body, "\t\trow.{0} = *req.{0}", field.name)?;
            writeln!(body, "\t}}")?;
        }
        writeln!(body, "\tif err := s.repo.Create(ctx, &row); err != nil {{")?;
        writeln!(body, "\t\treturn nil, err")?;
        writeln!(body, "\t}}")?;
        writeln!(body, "\treturn &row, nil")?;
        writeln!(body, "}}")?;

        if !key.is_empty() {
            writeln!(body)?;
            writeln!(
                body,
                "func (s *{}) Get(ctx context.Context, {}) (*models.{}, error) {{",
                service,
                key.params(),
                name
            )?;
            if caching {
                writeln!(body, "\tif cached, ok := s.cache.Get({}); ok {{", key.cache_key())?;
                writeln!(body, "\t\treturn &cached, nil")?;
                writeln!(body, "\t}}")?;
            }
            writeln!(body, "\trow, err := s.repo.Get(ctx, {})", key.args())?;
            writeln!(body, "\tif errors.Is(err, gorm.ErrRecordNotFound) {{")?;
            writeln!(body, "\t\treturn nil, ErrNotFound")?;
            writeln!(body, "\t}}")?;
            writeln!(body, "\tif err != nil {{")?;
            writeln!(body, "\t\treturn nil, err")?;
            writeln!(body, "\t}}")?;
            if caching {
                writeln!(body, "\ts.cache.Put({}, *row)", key.cache_key())?;
            }
            writeln!(body, "\treturn row, nil")?;
            writeln!(body, "}}")?;
            writeln!(body)?;

            writeln!(
                body,
                "func (s *{}) Update(ctx context.Context, {}, req dto.Update{}Request) (*models.{2}, error) {{",
                service,
                key.params(),
                name
            )?;
            writeln!(body, "\trow, err := s.Get(ctx, {})", key.args())?;
            writeln!(body, "\tif err != nil {{")?;
            writeln!(body, "\t\treturn nil, err")?;
            writeln!(body, "\t}}")?;
            for field in entity.input_fields() {
                writeln!(body, "\tif req.{} != nil {{", field.name)?;
                if field.ty.nullable {
                    writeln!(body, "\t\trow.{0} = req.{0}", field.name)?;
                } else {
                    writeln!(body, "\t\trow.{0} = *req.{0}", field.name)?;
                }
                writeln!(body, "\t}}")?;
            }
            writeln!(body, "\tif err := s.repo.Save(ctx, row); err != nil {{")?;
            writeln!(body, "\t\treturn nil, err")?;
            writeln!(body, "\t}}")?;
            if caching {
                writeln!(body, "\ts.cache.Evict({})", key.cache_key())?;
            }
            writeln!(body, "\treturn row, nil")?;
            writeln!(body, "}}")?;
            writeln!(body)?;

            writeln!(
                body,
                "func (s *{}) Delete(ctx context.Context, {}) error {{",
                service,
                key.params()
            )?;
            writeln!(body, "\trow, err := s.Get(ctx, {})", key.args())?;
            writeln!(body, "\tif err != nil {{")?;
            writeln!(body, "\t\treturn err")?;
            writeln!(body, "\t}}")?;
            if caching {
                writeln!(body, "\ts.cache.Evict({})", key.cache_key())?;
            }
            writeln!(body, "\treturn s.repo.Delete(ctx, row)")?;
            writeln!(body, "}}")?;
        }
        src.render(&module)
    }

    /// Parse path parameters into typed key locals.
    fn parse_key(&self, key: &Key<'_>, src: &mut Source) -> Result<String, fmt::Error> {
        let mut out = String::new();
        for field in &key.fields {
            let local = param(&field.column);
            let raw = format!("c.Param(\"{}\")", field.column);
            let bad = self.bad("http.StatusBadRequest", &format!("\"invalid {}\"", field.column));
            match field.ty.inner.as_str() {
                "int64" => {
                    src.import("strconv");
                    writeln!(out, "\t{}, err := strconv.ParseInt({}, 10, 64)", local, raw)?;
                    write!(out, "\tif err != nil {{\n{}\t}}\n", bad)?;
                }
                bits @ ("int16" | "int32") => {
                    src.import("strconv");
                    let size = &bits[3..];
                    writeln!(
                        out,
                        "\t{}Value, err := strconv.ParseInt({}, 10, {})",
                        local, raw, size
                    )?;
                    write!(out, "\tif err != nil {{\n{}\t}}\n", bad)?;
                    writeln!(out, "\t{} := {}({}Value)", local, bits, local)?;
                }
                "uuid.UUID" => {
                    src.import("github.com/google/uuid");
                    writeln!(out, "\t{}, err := uuid.Parse({})", local, raw)?;
                    write!(out, "\tif err != nil {{\n{}\t}}\n", bad)?;
                }
                _ => writeln!(out, "\t{} := {}", local, raw)?,
            }
        }
        Ok(out)
    }

    fn handler(&self, ctx: &EmitContext<'_>, entity: &EntityModel<'_>) -> Result<String, fmt::Error> {
        let module = module(ctx);
        let key = Key::of(entity);
        let mut src = Source::new("handler");
        src.import("net/http");
        src.import(self.web_import());
        src.import(format!("{}/internal/dto", module));
        src.import(format!("{}/internal/service", module));
        if ctx.features.pagination {
            src.import(format!("{}/internal/pagination", module));
        }
        let parse = self.parse_key(&key, &mut src)?;

        let name = &entity.names.entity;
        let handler = format!("{}Handler", name);
        let sig = self.handler_sig();
        let open = |method: &str| match self.framework {
            Framework::Gin => format!("func (h *{}) {}({}) {{", handler, method, sig),
            Framework::Echo => format!("func (h *{}) {}({} {{", handler, method, sig),
        };
        let rctx = self.request_ctx();
        let body = &mut src.body;

        writeln!(body, "type {} struct {{", handler)?;
        writeln!(body, "\tservice *service.{}Service", name)?;
        writeln!(body, "}}")?;
        writeln!(body)?;
        writeln!(
            body,
            "func New{}(s *service.{}Service) *{0} {{",
            handler, name
        )?;
        writeln!(body, "\treturn &{}{{service: s}}", handler)?;
        writeln!(body, "}}")?;
        writeln!(body)?;
        writeln!(
            body,
            "func (h *{}) Register(group {}) {{",
            handler,
            self.group_type()
        )?;
        writeln!(body, "\troutes := group.Group(\"/{}\")", entity.names.route)?;
        writeln!(body, "\troutes.GET(\"\", h.List)")?;
        writeln!(body, "\troutes.POST(\"\", h.Create)")?;
        if !key.is_empty() {
            let path = key.path();
            writeln!(body, "\troutes.GET(\"{}\", h.Get)", path)?;
            writeln!(body, "\troutes.PUT(\"{}\", h.Update)", path)?;
            writeln!(body, "\troutes.DELETE(\"{}\", h.Delete)", path)?;
        }
        writeln!(body, "}}")?;
        writeln!(body)?;

        writeln!(body, "{}", open("List"))?;
        if ctx.features.pagination {
            writeln!(
                body,
                "\tparams := pagination.Parse({}, {})",
                self.query("page"),
                self.query("per_page")
            )?;
            writeln!(
                body,
                "\trows, total, err := h.service.List({}, params.Offset(), params.PerPage)",
                rctx
            )?;
            write!(body, "\tif err != nil {{\n{}\t}}\n", self.fail())?;
            body.push_str(&self.reply(
                "http.StatusOK",
                "pagination.NewPage(rows, total, params)",
            ));
        } else {
            writeln!(body, "\trows, _, err := h.service.List({}, 0, 0)", rctx)?;
            write!(body, "\tif err != nil {{\n{}\t}}\n", self.fail())?;
            body.push_str(&self.reply("http.StatusOK", "rows"));
        }
        writeln!(body, "}}")?;
        writeln!(body)?;

        writeln!(body, "{}", open("Create"))?;
        writeln!(body, "\tvar req dto.Create{}Request", name)?;
        self.bind(body, ctx.features.validation)?;
        writeln!(body, "\trow, err := h.service.Create({}, req)", rctx)?;
        write!(body, "\tif err != nil {{\n{}\t}}\n", self.fail())?;
        body.push_str(&self.reply("http.StatusCreated", "row"));
        writeln!(body, "}}")?;

        if !key.is_empty() {
            writeln!(body)?;
            writeln!(body, "{}", open("Get"))?;
            body.push_str(&parse);
            writeln!(body, "\trow, err := h.service.Get({}, {})", rctx, key.args())?;
            write!(body, "\tif err != nil {{\n{}\t}}\n", self.fail())?;
            body.push_str(&self.reply("http.StatusOK", "row"));
            writeln!(body, "}}")?;
            writeln!(body)?;

            writeln!(body, "{}", open("Update"))?;
            body.push_str(&parse);
            writeln!(body, "\tvar req dto.Update{}Request", name)?;
            self.bind(body, ctx.features.validation)?;
            writeln!(
                body,
                "\trow, err := h.service.Update({}, {}, req)",
                rctx,
                key.args()
            )?;
            write!(body, "\tif err != nil {{\n{}\t}}\n", self.fail())?;
            body.push_str(&self.reply("http.StatusOK", "row"));
            writeln!(body, "}}")?;
            writeln!(body)?;

            writeln!(body, "{}", open("Delete"))?;
            body.push_str(&parse);
            writeln!(body, "\tif err := h.service.Delete({}, {}); err != nil {{", rctx, key.args())?;
            body.push_str(self.fail());
            writeln!(body, "\t}}")?;
            body.push_str(self.no_content());
            writeln!(body, "}}")?;
        }
        src.render(&module)
    }

    fn bind(&self, body: &mut String, validation: bool) -> fmt::Result {
        match self.framework {
            Framework::Gin => {
                writeln!(body, "\tif err := c.ShouldBindJSON(&req); err != nil {{")?;
                body.push_str(&self.bad("http.StatusUnprocessableEntity", "err.Error()"));
                writeln!(body, "\t}}")?;
            }
            Framework::Echo => {
                writeln!(body, "\tif err := c.Bind(&req); err != nil {{")?;
                body.push_str(&self.bad("http.StatusBadRequest", "err.Error()"));
                writeln!(body, "\t}}")?;
                if validation {
                    writeln!(body, "\tif err := c.Validate(&req); err != nil {{")?;
                    body.push_str(&self.bad("http.StatusUnprocessableEntity", "err.Error()"));
                    writeln!(body, "\t}}")?;
                }
            }
        }
        Ok(())
    }

    fn router(&self, ctx: &EmitContext<'_>) -> Result<String, fmt::Error> {
        let module = module(ctx);
        let mut src = Source::new("router");
        src.import("net/http");
        src.import("gorm.io/gorm");
        src.import(self.web_import());
        src.import(format!("{}/internal/handler", module));
        src.import(format!("{}/internal/repository", module));
        src.import(format!("{}/internal/service", module));
        if ctx.features.auth {
            src.import("os");
            src.import(format!("{}/internal/middleware", module));
        }
        if ctx.features.rate_limit {
            src.import("golang.org/x/time/rate");
            match self.framework {
                Framework::Gin => src.import(format!("{}/internal/middleware", module)),
                Framework::Echo => src.import("github.com/labstack/echo/v4/middleware"),
            }
        }

        let body = &mut src.body;
        match self.framework {
            Framework::Gin => {
                writeln!(body, "func New(db *gorm.DB) *gin.Engine {{")?;
                writeln!(body, "\tr := gin.Default()")?;
                writeln!(body, "\tr.GET(\"/health\", func(c *gin.Context) {{")?;
                writeln!(body, "\t\tc.JSON(http.StatusOK, gin.H{{\"status\": \"ok\"}})")?;
                writeln!(body, "\t}})")?;
                writeln!(body)?;
                writeln!(body, "\tapi := r.Group(\"/api\")")?;
                if ctx.features.rate_limit {
                    writeln!(body, "\tapi.Use(middleware.RateLimit(rate.Limit(10), 20))")?;
                }
            }
            Framework::Echo => {
                writeln!(body, "func New(db *gorm.DB) *echo.Echo {{")?;
                writeln!(body, "\te := echo.New()")?;
                if ctx.features.validation {
                    writeln!(body, "\te.Validator = handler.NewValidator()")?;
                }
                writeln!(body, "\te.GET(\"/health\", func(c echo.Context) error {{")?;
                writeln!(
                    body,
                    "\t\treturn c.JSON(http.StatusOK, map[string]string{{\"status\": \"ok\"}})"
                )?;
                writeln!(body, "\t}})")?;
                writeln!(body)?;
                writeln!(body, "\tapi := e.Group(\"/api\")")?;
                if ctx.features.rate_limit {
                    writeln!(
                        body,
                        "\tapi.Use(middleware.RateLimiter(middleware.NewRateLimiterMemoryStore(rate.Limit(10))))"
                    )?;
                }
            }
        }
        if ctx.features.auth {
            // echo's own middleware package shadows ours under rate limiting
            let package = if self.framework == Framework::Echo && ctx.features.rate_limit {
                "auth"
            } else {
                "middleware"
            };
            writeln!(body, "\tapi.Use({}.Auth(os.Getenv(\"JWT_SECRET\")))", package)?;
        }
        writeln!(body)?;
        for entity in ctx.entities {
            let name = &entity.names.entity;
            writeln!(
                body,
                "\thandler.New{0}Handler(service.New{0}Service(repository.New{0}Repository(db))).Register(api)",
                name
            )?;
        }
        let engine = match self.framework {
            Framework::Gin => "r",
            Framework::Echo => "e",
        };
        writeln!(body, "\treturn {}", engine)?;
        writeln!(body, "}}")?;

        let mut rendered = src.render(&module)?;
        if self.framework == Framework::Echo && ctx.features.auth && ctx.features.rate_limit {
            rendered = rendered.replace(
                &format!("\t\"{}/internal/middleware\"", module),
                &format!("\tauth \"{}/internal/middleware\"", module),
            );
        }
        Ok(rendered)
    }

    fn main(&self, ctx: &EmitContext<'_>) -> Result<String, fmt::Error> {
        let module = module(ctx);
        let mut src = Source::new("main");
        src.import("log");
        src.import("os");
        src.import(format!("{}/internal/database", module));
        src.import(format!("{}/internal/router", module));
        let serve = match self.framework {
            Framework::Gin => "Run",
            Framework::Echo => "Start",
        };
        let body = &mut src.body;
        writeln!(body, "func main() {{")?;
        writeln!(body, "\tdb, err := database.Open(os.Getenv(\"DATABASE_URL\"))")?;
        writeln!(body, "\tif err != nil {{")?;
        writeln!(body, "\t\tlog.Fatal(err)")?;
        writeln!(body, "\t}}")?;
        writeln!(body, "\tlog.Fatal(router.New(db).{}(\":8080\"))", serve)?;
        writeln!(body, "}}")?;
        src.render(&module)
    }
}

const DATABASE: &str = r#"package database

import (
	"gorm.io/driver/postgres"
	"gorm.io/gorm"
)

func Open(dsn string) (*gorm.DB, error) {
	return gorm.Open(postgres.Open(dsn), &gorm.Config{})
}
"#;

const GIN_ERRORS: &str = r#"package handler

import (
	"errors"
	"net/http"

	"github.com/gin-gonic/gin"

	"{module}/internal/service"
)

func respondError(c *gin.Context, err error) {
	if errors.Is(err, service.ErrNotFound) {
		c.JSON(http.StatusNotFound, gin.H{"error": err.Error()})
		return
	}
	c.JSON(http.StatusInternalServerError, gin.H{"error": "internal error"})
}
"#;

const ECHO_ERRORS: &str = r#"package handler

import (
	"errors"
	"net/http"

	"github.com/labstack/echo/v4"

	"{module}/internal/service"
)

func toHTTPError(err error) error {
	if errors.Is(err, service.ErrNotFound) {
		return echo.NewHTTPError(http.StatusNotFound, err.Error())
	}
	return err
}
"#;

const ECHO_VALIDATOR: &str = r#"package handler

import "github.com/go-playground/validator/v10"

type Validator struct {
	validate *validator.Validate
}

func NewValidator() *Validator {
	return &Validator{validate: validator.New()}
}

func (v *Validator) Validate(i any) error {
	return v.validate.Struct(i)
}
"#;

const PAGINATION: &str = r#"package pagination

import "strconv"

const maxPerPage = 100

type Params struct {
	Page    int
	PerPage int
}

func Parse(page, perPage string) Params {
	p := Params{Page: 1, PerPage: 20}
	if n, err := strconv.Atoi(page); err == nil && n > 0 {
		p.Page = n
	}
	if n, err := strconv.Atoi(perPage); err == nil && n > 0 {
		p.PerPage = min(n, maxPerPage)
	}
	return p
}

func (p Params) Offset() int {
	return (p.Page - 1) * p.PerPage
}

type Page[T any] struct {
	Items   []T   `json:"items"`
	Total   int64 `json:"total"`
	Page    int   `json:"page"`
	PerPage int   `json:"per_page"`
}

func NewPage[T any](items []T, total int64, p Params) Page[T] {
	return Page[T]{Items: items, Total: total, Page: p.Page, PerPage: p.PerPage}
}
"#;

const GIN_AUTH: &str = r#"package middleware

import (
	"net/http"
	"strings"

	"github.com/gin-gonic/gin"
	"github.com/golang-jwt/jwt/v5"
)

func Auth(secret string) gin.HandlerFunc {
	return func(c *gin.Context) {
		raw, ok := strings.CutPrefix(c.GetHeader("Authorization"), "Bearer ")
		if !ok {
			c.AbortWithStatusJSON(http.StatusUnauthorized, gin.H{"error": "unauthorized"})
			return
		}
		token, err := jwt.Parse(raw, func(*jwt.Token) (any, error) {
			return []byte(secret), nil
		}, jwt.WithValidMethods([]string{"HS256"}))
		if err != nil || !token.Valid {
			c.AbortWithStatusJSON(http.StatusUnauthorized, gin.H{"error": "unauthorized"})
			return
		}
		c.Set("claims", token.Claims)
		c.Next()
	}
}
"#;

const ECHO_AUTH: &str = r#"package middleware

import (
	"net/http"
	"strings"

	"github.com/golang-jwt/jwt/v5"
	"github.com/labstack/echo/v4"
)

func Auth(secret string) echo.MiddlewareFunc {
	return func(next echo.HandlerFunc) echo.HandlerFunc {
		return func(c echo.Context) error {
			raw, ok := strings.CutPrefix(c.Request().Header.Get("Authorization"), "Bearer ")
			if !ok {
				return echo.NewHTTPError(http.StatusUnauthorized, "unauthorized")
			}
			token, err := jwt.Parse(raw, func(*jwt.Token) (any, error) {
				return []byte(secret), nil
			}, jwt.WithValidMethods([]string{"HS256"}))
			if err != nil || !token.Valid {
				return echo.NewHTTPError(http.StatusUnauthorized, "unauthorized")
			}
			c.Set("claims", token.Claims)
			return next(c)
		}
	}
}
"#;

const GIN_RATE_LIMIT: &str = r#"package middleware

import (
	"net/http"
	"sync"

	"github.com/gin-gonic/gin"
	"golang.org/x/time/rate"
)

// RateLimit keeps one token bucket per client address.
func RateLimit(perSecond rate.Limit, burst int) gin.HandlerFunc {
	var mu sync.Mutex
	limiters := map[string]*rate.Limiter{}
	return func(c *gin.Context) {
		mu.Lock()
		limiter, ok := limiters[c.ClientIP()]
		if !ok {
			limiter = rate.NewLimiter(perSecond, burst)
			limiters[c.ClientIP()] = limiter
		}
		mu.Unlock()
		if !limiter.Allow() {
			c.AbortWithStatusJSON(http.StatusTooManyRequests, gin.H{"error": "too many requests"})
			return
		}
		c.Next()
	}
}
"#;

const CACHE: &str = r#"package cache

import (
	"sync"
	"time"
)

type entry[T any] struct {
	value   T
	expires time.Time
}

type Cache[T any] struct {
	mu      sync.Mutex
	ttl     time.Duration
	entries map[string]entry[T]
}

func New[T any](ttl time.Duration) *Cache[T] {
	return &Cache[T]{ttl: ttl, entries: map[string]entry[T]{}}
}

func (c *Cache[T]) Get(key string) (T, bool) {
	c.mu.Lock()
	defer c.mu.Unlock()
	e, ok := c.entries[key]
	if !ok || time.Now().After(e.expires) {
		var zero T
		return zero, false
	}
	return e.value, true
}

func (c *Cache[T]) Put(key string, value T) {
	c.mu.Lock()
	defer c.mu.Unlock()
	c.entries[key] = entry[T]{value: value, expires: time.Now().Add(c.ttl)}
}

func (c *Cache[T]) Evict(key string) {
	c.mu.Lock()
	defer c.mu.Unlock()
	delete(c.entries, key)
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
                "CREATE TABLE authors (id BIGSERIAL PRIMARY KEY, name VARCHAR(80) NOT NULL);
                 CREATE TABLE posts (
                     id SERIAL PRIMARY KEY,
                     author_id BIGINT NOT NULL REFERENCES authors(id),
                     body TEXT,
                     published_at TIMESTAMPTZ
                 );",
                Dialect::Postgres,
            )
            .catalog,
        )
    }

    fn files(framework: Framework, fw: &str, toggles: FeatureToggles) -> FileSet {
        let profiles = ProfileSet::builtin().unwrap();
        let profile = profiles.get(&TargetKey::new("go", fw)).unwrap();
        generate(&GoEmitter::new(framework), &schema(), profile, &toggles, "Blog Api")
            .unwrap()
            .files
    }

    #[test]
    fn test_gorm_model() {
        let files = files(Framework::Gin, "gin", FeatureToggles::new());
        let post = files.get("internal/models/post.go").unwrap();
        assert!(post.starts_with("package models\n\nimport (\n\t\"time\"\n)\n"));
        assert!(post.contains("\tAuthorId int64 `gorm:\"column:author_id;not null\" json:\"author_id\"`"));
        assert!(post.contains("\tPublishedAt *time.Time `gorm:\"column:published_at\" json:\"published_at\"`"));
        assert!(post.contains(
            "\tAuthor *Author `gorm:\"foreignKey:AuthorId;references:Id\" json:\"author,omitempty\"`"
        ));
        let author = files.get("internal/models/author.go").unwrap();
        assert!(author.contains("\tPosts []Post `gorm:\"foreignKey:AuthorId;references:Id\" json:\"posts,omitempty\"`"));
        assert!(author.contains("func (Author) TableName() string {\n\treturn \"authors\"\n}"));
    }

    #[test]
    fn test_module_path_and_key_parsing() {
        let files = files(Framework::Gin, "gin", FeatureToggles::new());
        let handler = files.get("internal/handler/post.go").unwrap();
        assert!(handler.contains("\t\"blog-api/internal/service\""));
        assert!(handler.contains("\tidValue, err := strconv.ParseInt(c.Param(\"id\"), 10, 32)"));
        assert!(handler.contains("\tid := int32(idValue)"));
        assert!(handler.contains("\troutes := group.Group(\"/posts\")"));
    }

    #[test]
    fn test_gin_binding_tags() {
        let files = files(Framework::Gin, "gin", FeatureToggles::new());
        let dto = files.get("internal/dto/author.go").unwrap();
        assert!(dto.contains("\tName string `json:\"name\" binding:\"required,max=80\"`"));
        assert!(dto.contains("\tName *string `json:\"name,omitempty\" binding:\"omitempty,max=80\"`"));
    }

    #[test]
    fn test_echo_handlers_return_errors() {
        let files = files(
            Framework::Echo,
            "echo",
            FeatureToggles::new().with("caching", true).with("rate_limit", true),
        );
        let handler = files.get("internal/handler/author.go").unwrap();
        assert!(handler.contains("func (h *AuthorHandler) Get(c echo.Context) error {"));
        assert!(handler.contains("\t\treturn toHTTPError(err)\n"));
        assert!(files.get("internal/handler/validator.go").is_some());
        assert!(files.get("internal/cache/cache.go").is_none());
        let router = files.get("internal/router/router.go").unwrap();
        assert!(router.contains("middleware.NewRateLimiterMemoryStore"));
    }

    #[test]
    fn test_gin_cache_in_service() {
        let files = files(Framework::Gin, "gin", FeatureToggles::new().with("caching", true));
        let service = files.get("internal/service/author.go").unwrap();
        assert!(service.contains("\tif cached, ok := s.cache.Get(fmt.Sprint(id)); ok {"));
        assert!(files.get("internal/cache/cache.go").is_some());
    }
}
