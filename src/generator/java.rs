//! Spring Boot projects on Spring Data JPA.

use super::model::{EntityModel, FieldModel, RelationModel};
use super::{EmitContext, Emitter, FileSet};
use crate::error::GenerationError;
use crate::ir::RelationKind;
use heck::ToUpperCamelCase;
use std::collections::BTreeSet;
use std::fmt::{self, Write};

pub struct SpringEmitter;

const KEYWORDS: [&str; 52] = [
    "abstract", "assert", "boolean", "break", "byte", "case", "catch", "char", "class", "const",
    "continue", "default", "do", "double", "else", "enum", "extends", "final", "finally",
    "float", "for", "goto", "if", "implements", "import", "instanceof", "int", "interface",
    "long", "native", "new", "package", "private", "protected", "public", "return", "short",
    "static", "strictfp", "super", "switch", "synchronized", "this", "throw", "throws",
    "transient", "try", "void", "volatile", "while", "true", "false",
];

fn ident(name: &str) -> String {
    if KEYWORDS.contains(&name) {
        format!("{}_", name)
    } else {
        name.to_string()
    }
}

/// Bean accessor suffix: `unitPrice` -> `UnitPrice`.
fn accessor(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn java_str(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Root package, e.g. `com.shopapi`.
fn base_package(ctx: &EmitContext<'_>) -> String {
    let stem: String = ctx
        .project
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_lowercase();
    match stem.chars().next() {
        Some(c) if c.is_ascii_digit() => format!("com.app{}", stem),
        Some(_) => format!("com.{}", stem),
        None => "com.app".to_string(),
    }
}

fn source_path(ctx: &EmitContext<'_>, package: &str, class: &str) -> String {
    let mut path = format!("src/main/java/{}", base_package(ctx).replace('.', "/"));
    if !package.is_empty() {
        path.push('/');
        path.push_str(package);
    }
    format!("{}/{}.java", path, class)
}

/// One `.java` compilation unit.
struct Unit {
    package: String,
    imports: BTreeSet<String>,
    body: String,
}

impl Unit {
    fn new(ctx: &EmitContext<'_>, package: &str) -> Self {
        let base = base_package(ctx);
        Self {
            package: if package.is_empty() {
                base
            } else {
                format!("{}.{}", base, package)
            },
            imports: BTreeSet::new(),
            body: String::new(),
        }
    }

    fn import(&mut self, path: impl Into<String>) {
        self.imports.insert(path.into());
    }

    fn render(self) -> Result<String, fmt::Error> {
        let mut out = String::new();
        writeln!(out, "package {};", self.package)?;
        writeln!(out)?;
        if !self.imports.is_empty() {
            for import in &self.imports {
                writeln!(out, "import {};", import)?;
            }
            writeln!(out)?;
        }
        out.push_str(&self.body);
        Ok(out)
    }
}

fn type_imports<'f>(ctx: &EmitContext<'_>, fields: impl Iterator<Item = &'f FieldModel>, unit: &mut Unit) {
    for field in fields {
        if let Some(path) = ctx.profile.import_for(&field.ty.base) {
            unit.import(path);
        }
    }
}

/// Reference type for a field: primitives are boxed.
fn boxed(ctx: &EmitContext<'_>, field: &FieldModel) -> String {
    ctx.profile.nullable.apply(&field.ty.inner)
}

/// Identity of an entity: single key column, an `@IdClass` over the
/// composite key, or over all columns when no key is declared.
enum Identity<'f> {
    Single(&'f FieldModel),
    Composite(Vec<&'f FieldModel>),
}

impl<'f> Identity<'f> {
    fn of(entity: &'f EntityModel<'_>) -> Self {
        match entity.key_fields().as_slice() {
            [single] => Self::Single(*single),
            [] => Self::Composite(entity.fields.iter().collect()),
            many => Self::Composite(many.to_vec()),
        }
    }

    fn fields(&self) -> Vec<&'f FieldModel> {
        match self {
            Self::Single(f) => vec![*f],
            Self::Composite(fs) => fs.clone(),
        }
    }

    fn type_name(&self, ctx: &EmitContext<'_>, entity: &EntityModel<'_>) -> String {
        match self {
            Self::Single(f) => boxed(ctx, f),
            Self::Composite(_) => format!("{}Id", entity.names.entity),
        }
    }
}

impl Emitter for SpringEmitter {
    fn emit_entity(
        &self,
        ctx: &EmitContext<'_>,
        entity: &EntityModel<'_>,
        out: &mut FileSet,
    ) -> Result<(), GenerationError> {
        let key = ctx.key();
        let name = &entity.names.entity;
        out.add(key, source_path(ctx, "entity", name), jpa_entity(ctx, entity)?)?;
        if let Identity::Composite(fields) = Identity::of(entity) {
            out.add(
                key,
                source_path(ctx, "entity", &format!("{}Id", name)),
                id_class(ctx, entity, &fields)?,
            )?;
        }
        out.add(
            key,
            source_path(ctx, "dto", &format!("{}Request", name)),
            request(ctx, entity)?,
        )?;
        out.add(
            key,
            source_path(ctx, "repository", &format!("{}Repository", name)),
            repository(ctx, entity)?,
        )?;
        out.add(
            key,
            source_path(ctx, "service", &format!("{}Service", name)),
            service(ctx, entity)?,
        )?;
        out.add(
            key,
            source_path(ctx, "controller", &format!("{}Controller", name)),
            controller(ctx, entity)?,
        )?;
        Ok(())
    }

    fn emit_shared(&self, ctx: &EmitContext<'_>, out: &mut FileSet) -> Result<(), GenerationError> {
        let key = ctx.key();
        let base = base_package(ctx);
        let app = format!("{}Application", ctx.project.to_upper_camel_case());

        let mut unit = Unit::new(ctx, "");
        unit.import("org.springframework.boot.SpringApplication");
        unit.import("org.springframework.boot.autoconfigure.SpringBootApplication");
        if ctx.features.caching {
            unit.import("org.springframework.cache.annotation.EnableCaching");
        }
        let body = &mut unit.body;
        writeln!(body, "@SpringBootApplication")?;
        if ctx.features.caching {
            writeln!(body, "@EnableCaching")?;
        }
        writeln!(body, "public class {} {{", app)?;
        writeln!(body)?;
        writeln!(body, "    public static void main(String[] args) {{")?;
        writeln!(body, "        SpringApplication.run({}.class, args);", app)?;
        writeln!(body, "    }}")?;
        writeln!(body, "}}")?;
        out.add(key, source_path(ctx, "", &app), unit.render()?)?;

        let fill = |template: &str| template.replace("{package}", &base);
        out.add(
            key,
            source_path(ctx, "exception", "NotFoundException"),
            fill(NOT_FOUND),
        )?;
        out.add(
            key,
            source_path(ctx, "exception", "GlobalExceptionHandler"),
            fill(EXCEPTION_HANDLER),
        )?;
        out.add(
            key,
            source_path(ctx, "controller", "HealthController"),
            fill(HEALTH),
        )?;
        if ctx.features.validation {
            out.add(key, source_path(ctx, "dto", "OnCreate"), fill(ON_CREATE))?;
        }
        if ctx.features.pagination {
            out.add(key, source_path(ctx, "dto", "PageResponse"), fill(PAGE_RESPONSE))?;
        }
        if ctx.features.auth {
            out.add(key, source_path(ctx, "config", "SecurityConfig"), fill(SECURITY))?;
        }
        if ctx.features.rate_limit {
            out.add(key, source_path(ctx, "config", "RateLimitFilter"), fill(RATE_LIMIT))?;
        }

        let mut props = String::new();
        writeln!(props, "spring.application.name={}", ctx.project)?;
        writeln!(props, "spring.datasource.url=${{DATABASE_URL}}")?;
        writeln!(props, "spring.jpa.hibernate.ddl-auto=validate")?;
        writeln!(props, "spring.jpa.open-in-view=false")?;
        if ctx.features.caching {
            writeln!(props, "spring.cache.type=simple")?;
        }
        if ctx.features.auth {
            writeln!(props, "app.jwt.secret=${{JWT_SECRET}}")?;
        }
        out.add(key, "src/main/resources/application.properties", props)?;
        Ok(())
    }
}

fn column_annotation(field: &FieldModel) -> String {
    let mut args = vec![format!("name = {}", java_str(&field.column))];
    if !field.ty.nullable && !field.primary_key {
        args.push("nullable = false".to_string());
    }
    if field.unique && !field.primary_key {
        args.push("unique = true".to_string());
    }
    if let (Some(n), true) = (field.ty.length, field.sql_type.is_textual()) {
        args.push(format!("length = {}", n));
    }
    if let Some(p) = field.ty.precision {
        args.push(format!("precision = {}", p));
    }
    if let Some(s) = field.ty.scale {
        args.push(format!("scale = {}", s));
    }
    if field.is_generated() {
        args.push("insertable = false".to_string());
        args.push("updatable = false".to_string());
    }
    format!("@Column({})", args.join(", "))
}

fn join_columns(local: &[String], remote: &[String], read_only: bool) -> String {
    let flags = if read_only {
        ", insertable = false, updatable = false"
    } else {
        ""
    };
    let each: Vec<String> = local
        .iter()
        .zip(remote)
        .map(|(l, r)| {
            format!(
                "@JoinColumn(name = {}, referencedColumnName = {}{})",
                java_str(l),
                java_str(r),
                flags
            )
        })
        .collect();
    match each.as_slice() {
        [single] => single.clone(),
        many => format!("@JoinColumns({{{}}})", many.join(", ")),
    }
}

fn junction_columns(columns: &[String]) -> String {
    let each: Vec<String> = columns
        .iter()
        .map(|c| format!("@JoinColumn(name = {})", java_str(c)))
        .collect();
    match each.as_slice() {
        [single] => single.clone(),
        many => format!("{{{}}}", many.join(", ")),
    }
}

/// Annotation lines and Java type of a relation member.
fn relation_mapping(
    ctx: &EmitContext<'_>,
    entity: &EntityModel<'_>,
    relation: &RelationModel,
) -> (Vec<String>, String) {
    let target = &relation.target_entity;
    let mapped_by = ctx
        .counterpart(entity, relation)
        .map(|other| format!("mappedBy = {}", java_str(&ident(&other.name))));
    let list = format!("List<{}>", target);

    match (relation.kind, relation.inverse, &relation.via) {
        (RelationKind::ManyToMany, false, Some(junction)) => (
            vec![
                "@ManyToMany".to_string(),
                format!(
                    "@JoinTable(name = {}, joinColumns = {}, inverseJoinColumns = {})",
                    java_str(&junction.table),
                    junction_columns(&junction.local_columns),
                    junction_columns(&junction.remote_columns)
                ),
            ],
            list,
        ),
        (RelationKind::ManyToMany, true, _) => (
            vec![match mapped_by {
                Some(m) => format!("@ManyToMany({})", m),
                None => "@ManyToMany".to_string(),
            }],
            list,
        ),
        (RelationKind::ManyToOne, _, _) | (RelationKind::OneToOne, false, _) => {
            let annotation = if relation.kind == RelationKind::ManyToOne {
                "@ManyToOne(fetch = FetchType.LAZY)"
            } else {
                "@OneToOne(fetch = FetchType.LAZY)"
            };
            (
                vec![
                    annotation.to_string(),
                    join_columns(&relation.local_columns, &relation.remote_columns, true),
                ],
                target.clone(),
            )
        }
        (RelationKind::OneToOne, true, _) => (
            vec![match mapped_by {
                Some(m) => format!("@OneToOne({}, fetch = FetchType.LAZY)", m),
                None => "@OneToOne(fetch = FetchType.LAZY)".to_string(),
            }],
            target.clone(),
        ),
        _ => (
            vec![match mapped_by {
                Some(m) => format!("@OneToMany({})", m),
                None => "@OneToMany".to_string(),
            }],
            list,
        ),
    }
}

fn accessors(body: &mut String, ty: &str, name: &str) -> fmt::Result {
    let suffix = accessor(name);
    writeln!(body)?;
    writeln!(body, "    public {} get{}() {{", ty, suffix)?;
    writeln!(body, "        return {};", name)?;
    writeln!(body, "    }}")?;
    writeln!(body)?;
    writeln!(body, "    public void set{}({} {}) {{", suffix, ty, name)?;
    writeln!(body, "        this.{0} = {0};", name)?;
    writeln!(body, "    }}")
}

fn jpa_entity(ctx: &EmitContext<'_>, entity: &EntityModel<'_>) -> Result<String, fmt::Error> {
    let mut unit = Unit::new(ctx, "entity");
    unit.import("jakarta.persistence.*");
    type_imports(ctx, entity.fields.iter(), &mut unit);
    let name = &entity.names.entity;
    let identity = Identity::of(entity);
    let id_columns: Vec<&str> = identity.fields().iter().map(|f| f.column.as_str()).collect();
    let soft = entity
        .soft_delete_column()
        .filter(|_| ctx.features.soft_delete && !entity.key_fields().is_empty());

    let mut head = String::new();
    writeln!(head, "@Entity")?;
    writeln!(head, "@Table(name = {})", java_str(&entity.table.name))?;
    if let Identity::Composite(_) = identity {
        writeln!(head, "@IdClass({}Id.class)", name)?;
    }
    if let Some(column) = soft {
        unit.import("org.hibernate.annotations.SQLDelete");
        unit.import("org.hibernate.annotations.SQLRestriction");
        let predicate: Vec<String> = id_columns.iter().map(|c| format!("{} = ?", c)).collect();
        writeln!(
            head,
            "@SQLDelete(sql = {})",
            java_str(&format!(
                "UPDATE {} SET {} = now() WHERE {}",
                entity.table.name,
                column.column,
                predicate.join(" AND ")
            ))
        )?;
        writeln!(
            head,
            "@SQLRestriction({})",
            java_str(&format!("{} IS NULL", column.column))
        )?;
    }

    let mut members = String::new();
    let mut methods = String::new();
    for field in &entity.fields {
        let member = ident(&field.name);
        let ty = if field.is_generated() {
            boxed(ctx, field)
        } else {
            field.ty.name.clone()
        };
        writeln!(members)?;
        if id_columns.contains(&field.column.as_str()) {
            writeln!(members, "    @Id")?;
        }
        if field.primary_key && field.auto_increment && entity.key_fields().len() == 1 {
            writeln!(members, "    @GeneratedValue(strategy = GenerationType.IDENTITY)")?;
        }
        writeln!(members, "    {}", column_annotation(field))?;
        if let Some(comment) = &field.comment {
            unit.import("org.hibernate.annotations.Comment");
            writeln!(members, "    @Comment({})", java_str(comment))?;
        }
        writeln!(members, "    private {} {};", ty, member)?;
        accessors(&mut methods, &ty, &member)?;
    }

    for relation in &entity.relations {
        unit.import("com.fasterxml.jackson.annotation.JsonIgnore");
        let member = ident(&relation.name);
        let (annotations, ty) = relation_mapping(ctx, entity, relation);
        writeln!(members)?;
        for annotation in annotations {
            writeln!(members, "    {}", annotation)?;
        }
        writeln!(members, "    @JsonIgnore")?;
        if relation.kind.is_collection() {
            unit.import("java.util.ArrayList");
            unit.import("java.util.List");
            writeln!(members, "    private {} {} = new ArrayList<>();", ty, member)?;
        } else {
            writeln!(members, "    private {} {};", ty, member)?;
        }
        accessors(&mut methods, &ty, &member)?;
    }

    let body = &mut unit.body;
    body.push_str(&head);
    writeln!(body, "public class {} {{", name)?;
    body.push_str(&members);
    body.push_str(&methods);
    writeln!(body, "}}")?;
    unit.render()
}

fn id_class(
    ctx: &EmitContext<'_>,
    entity: &EntityModel<'_>,
    fields: &[&FieldModel],
) -> Result<String, fmt::Error> {
    let mut unit = Unit::new(ctx, "entity");
    unit.import("java.io.Serializable");
    unit.import("java.util.Objects");
    type_imports(ctx, fields.iter().copied(), &mut unit);
    let class = format!("{}Id", entity.names.entity);
    let members: Vec<(String, String)> = fields
        .iter()
        .map(|f| (f.ty.name.clone(), ident(&f.name)))
        .collect();

    let body = &mut unit.body;
    writeln!(body, "public class {} implements Serializable {{", class)?;
    writeln!(body)?;
    for (ty, name) in &members {
        writeln!(body, "    private {} {};", ty, name)?;
    }
    writeln!(body)?;
    writeln!(body, "    public {}() {{", class)?;
    writeln!(body, "    }}")?;
    writeln!(body)?;
    let params: Vec<String> = members.iter().map(|(t, n)| format!("{} {}", t, n)).collect();
    writeln!(body, "    public {}({}) {{", class, params.join(", "))?;
    for (_, name) in &members {
        writeln!(body, "        this.{0} = {0};", name)?;
    }
    writeln!(body, "    }}")?;
    writeln!(body)?;
    writeln!(body, "    @Override")?;
    writeln!(body, "    public boolean equals(Object o) {{")?;
    writeln!(body, "        if (this == o) return true;")?;
    writeln!(body, "        if (!(o instanceof {} other)) return false;", class)?;
    let eq: Vec<String> = members
        .iter()
        .map(|(_, n)| format!("Objects.equals({0}, other.{0})", n))
        .collect();
    writeln!(body, "        return {};", eq.join(" && "))?;
    writeln!(body, "    }}")?;
    writeln!(body)?;
    writeln!(body, "    @Override")?;
    writeln!(body, "    public int hashCode() {{")?;
    let names: Vec<&str> = members.iter().map(|(_, n)| n.as_str()).collect();
    writeln!(body, "        return Objects.hash({});", names.join(", "))?;
    writeln!(body, "    }}")?;
    writeln!(body, "}}")?;
    unit.render()
}

fn request(ctx: &EmitContext<'_>, entity: &EntityModel<'_>) -> Result<String, fmt::Error> {
    let mut unit = Unit::new(ctx, "dto");
    type_imports(ctx, entity.input_fields(), &mut unit);
    let class = format!("{}Request", entity.names.entity);
    let mut members = String::new();
    let mut methods = String::new();
    for field in entity.input_fields() {
        let member = ident(&field.name);
        let ty = boxed(ctx, field);
        writeln!(members)?;
        if ctx.features.validation {
            if field.is_required_input() {
                unit.import("jakarta.validation.constraints.NotNull");
                writeln!(members, "    @NotNull(groups = OnCreate.class)")?;
            }
            if let (Some(n), true) = (field.ty.length, field.sql_type.is_textual()) {
                unit.import("jakarta.validation.constraints.Size");
                writeln!(members, "    @Size(max = {})", n)?;
            }
        }
        writeln!(members, "    private {} {};", ty, member)?;
        accessors(&mut methods, &ty, &member)?;
    }
    let body = &mut unit.body;
    writeln!(body, "/** Create and update payload; absent members are left unchanged on update. */")?;
    writeln!(body, "public class {} {{", class)?;
    body.push_str(&members);
    body.push_str(&methods);
    writeln!(body, "}}")?;
    unit.render()
}

fn repository(ctx: &EmitContext<'_>, entity: &EntityModel<'_>) -> Result<String, fmt::Error> {
    let base = base_package(ctx);
    let mut unit = Unit::new(ctx, "repository");
    let name = &entity.names.entity;
    let identity = Identity::of(entity);
    unit.import(format!("{}.entity.{}", base, name));
    match identity {
        Identity::Single(field) => type_imports(ctx, std::iter::once(field), &mut unit),
        Identity::Composite(_) => unit.import(format!("{}.entity.{}Id", base, name)),
    }
    unit.import("org.springframework.data.jpa.repository.JpaRepository");
    let body = &mut unit.body;
    writeln!(
        body,
        "public interface {}Repository extends JpaRepository<{}, {}> {{",
        name,
        name,
        identity.type_name(ctx, entity)
    )?;
    writeln!(body, "}}")?;
    unit.render()
}

/// Key parameters as Java declarations and the expression building the id.
fn key_params(ctx: &EmitContext<'_>, entity: &EntityModel<'_>) -> (String, String) {
    let keys = entity.key_fields();
    let params: Vec<String> = keys
        .iter()
        .map(|f| format!("{} {}", boxed(ctx, f), ident(&f.name)))
        .collect();
    let args: Vec<String> = keys.iter().map(|f| ident(&f.name)).collect();
    let id = match keys.as_slice() {
        [single] => ident(&single.name),
        _ => format!("new {}Id({})", entity.names.entity, args.join(", ")),
    };
    (params.join(", "), id)
}

fn service(ctx: &EmitContext<'_>, entity: &EntityModel<'_>) -> Result<String, fmt::Error> {
    let base = base_package(ctx);
    let mut unit = Unit::new(ctx, "service");
    let name = &entity.names.entity;
    let has_key = !entity.key_fields().is_empty();
    let caching = ctx.features.caching && has_key;
    let cache = java_str(&entity.names.table);
    unit.import(format!("{}.dto.{}Request", base, name));
    unit.import(format!("{}.entity.{}", base, name));
    unit.import(format!("{}.repository.{}Repository", base, name));
    unit.import("org.springframework.stereotype.Service");
    unit.import("org.springframework.transaction.annotation.Transactional");
    if ctx.features.pagination {
        unit.import("org.springframework.data.domain.Page");
        unit.import("org.springframework.data.domain.Pageable");
    } else {
        unit.import("java.util.List");
    }
    if has_key {
        unit.import(format!("{}.exception.NotFoundException", base));
        type_imports(ctx, entity.key_fields().into_iter(), &mut unit);
        if entity.key_fields().len() > 1 {
            unit.import(format!("{}.entity.{}Id", base, name));
        }
    }
    if caching {
        unit.import("org.springframework.cache.annotation.CacheEvict");
        unit.import("org.springframework.cache.annotation.CachePut");
        unit.import("org.springframework.cache.annotation.Cacheable");
    }
    let (params, id) = key_params(ctx, entity);
    let cache_key = {
        let parts: Vec<String> = entity
            .key_fields()
            .iter()
            .map(|f| format!("#{}", ident(&f.name)))
            .collect();
        java_str(&parts.join(" + '/' + "))
    };

    let body = &mut unit.body;
    writeln!(body, "@Service")?;
    writeln!(body, "@Transactional")?;
    writeln!(body, "public class {}Service {{", name)?;
    writeln!(body)?;
    writeln!(body, "    private final {}Repository repository;", name)?;
    writeln!(body)?;
    writeln!(body, "    public {0}Service({0}Repository repository) {{", name)?;
    writeln!(body, "        this.repository = repository;")?;
    writeln!(body, "    }}")?;
    writeln!(body)?;
    writeln!(body, "    @Transactional(readOnly = true)")?;
    if ctx.features.pagination {
        writeln!(body, "    public Page<{}> list(Pageable pageable) {{", name)?;
        writeln!(body, "        return repository.findAll(pageable);")?;
    } else {
        writeln!(body, "    public List<{}> list() {{", name)?;
        writeln!(body, "        return repository.findAll();")?;
    }
    writeln!(body, "    }}")?;

    if has_key {
        writeln!(body)?;
        if caching {
            writeln!(body, "    @Cacheable(cacheNames = {}, key = {})", cache, cache_key)?;
        }
        writeln!(body, "    @Transactional(readOnly = true)")?;
        writeln!(body, "    public {} get({}) {{", name, params)?;
        writeln!(body, "        return find({});", id)?;
        writeln!(body, "    }}")?;
    }

    writeln!(body)?;
    writeln!(body, "    public {0} create({0}Request request) {{", name)?;
    writeln!(body, "        {0} entity = new {0}();", name)?;
    writeln!(body, "        apply(entity, request);")?;
    writeln!(body, "        return repository.save(entity);")?;
    writeln!(body, "    }}")?;

    if has_key {
        writeln!(body)?;
        if caching {
            writeln!(body, "    @CachePut(cacheNames = {}, key = {})", cache, cache_key)?;
        }
        writeln!(body, "    public {} update({}, {}Request request) {{", name, params, name)?;
        writeln!(body, "        {} entity = find({});", name, id)?;
        writeln!(body, "        apply(entity, request);")?;
        writeln!(body, "        return repository.save(entity);")?;
        writeln!(body, "    }}")?;
        writeln!(body)?;
        if caching {
            writeln!(body, "    @CacheEvict(cacheNames = {}, key = {})", cache, cache_key)?;
        }
        writeln!(body, "    public void delete({}) {{", params)?;
        writeln!(body, "        repository.delete(find({}));", id)?;
        writeln!(body, "    }}")?;
        writeln!(body)?;
        let id_type = Identity::of(entity).type_name(ctx, entity);
        writeln!(body, "    private {} find({} id) {{", name, id_type)?;
        writeln!(body, "        return repository.findById(id)")?;
        writeln!(
            body,
            "                .orElseThrow(() -> new NotFoundException({}, id));",
            java_str(name)
        )?;
        writeln!(body, "    }}")?;
    }

    writeln!(body)?;
    writeln!(body, "    private void apply({0} entity, {0}Request request) {{", name)?;
    for field in entity.input_fields() {
        let suffix = accessor(&ident(&field.name));
        writeln!(body, "        if (request.get{}() != null) {{", suffix)?;
        writeln!(body, "            entity.set{0}(request.get{0}());", suffix)?;
        writeln!(body, "        }}")?;
    }
    writeln!(body, "    }}")?;
    writeln!(body, "}}")?;
    unit.render()
}

fn controller(ctx: &EmitContext<'_>, entity: &EntityModel<'_>) -> Result<String, fmt::Error> {
    let base = base_package(ctx);
    let mut unit = Unit::new(ctx, "controller");
    let name = &entity.names.entity;
    let keys = entity.key_fields();
    unit.import(format!("{}.dto.{}Request", base, name));
    unit.import(format!("{}.entity.{}", base, name));
    unit.import(format!("{}.service.{}Service", base, name));
    unit.import("org.springframework.http.HttpStatus");
    unit.import("org.springframework.web.bind.annotation.*");
    type_imports(ctx, keys.iter().copied(), &mut unit);
    if ctx.features.pagination {
        unit.import(format!("{}.dto.PageResponse", base));
        unit.import("org.springframework.data.domain.PageRequest");
        if !keys.is_empty() {
            unit.import("org.springframework.data.domain.Sort");
        }
    } else {
        unit.import("java.util.List");
    }
    if ctx.features.validation {
        unit.import(format!("{}.dto.OnCreate", base));
        unit.import("jakarta.validation.groups.Default");
        unit.import("org.springframework.validation.annotation.Validated");
    }

    let path: String = keys.iter().map(|f| format!("/{{{}}}", f.column)).collect();
    let path_params: Vec<String> = keys
        .iter()
        .map(|f| {
            format!(
                "@PathVariable({}) {} {}",
                java_str(&f.column),
                boxed(ctx, f),
                ident(&f.name)
            )
        })
        .collect();
    let args: Vec<String> = keys.iter().map(|f| ident(&f.name)).collect();
    let (create_body, update_body) = if ctx.features.validation {
        (
            "@Validated({OnCreate.class, Default.class}) @RequestBody",
            "@Validated @RequestBody",
        )
    } else {
        ("@RequestBody", "@RequestBody")
    };

    let body = &mut unit.body;
    writeln!(body, "@RestController")?;
    writeln!(body, "@RequestMapping(\"/api/{}\")", entity.names.route)?;
    writeln!(body, "public class {}Controller {{", name)?;
    writeln!(body)?;
    writeln!(body, "    private final {}Service service;", name)?;
    writeln!(body)?;
    writeln!(body, "    public {0}Controller({0}Service service) {{", name)?;
    writeln!(body, "        this.service = service;")?;
    writeln!(body, "    }}")?;
    writeln!(body)?;
    writeln!(body, "    @GetMapping")?;
    if ctx.features.pagination {
        writeln!(body, "    public PageResponse<{}> list(", name)?;
        writeln!(body, "            @RequestParam(defaultValue = \"1\") int page,")?;
        writeln!(
            body,
            "            @RequestParam(name = \"per_page\", defaultValue = \"20\") int perPage) {{"
        )?;
        let sort = if keys.is_empty() {
            String::new()
        } else {
            let props: Vec<String> = keys.iter().map(|f| java_str(&ident(&f.name))).collect();
            format!(", Sort.by({})", props.join(", "))
        };
        writeln!(
            body,
            "        PageRequest request = PageRequest.of(Math.max(page, 1) - 1, Math.min(Math.max(perPage, 1), 100){});",
            sort
        )?;
        writeln!(body, "        return PageResponse.of(service.list(request));")?;
    } else {
        writeln!(body, "    public List<{}> list() {{", name)?;
        writeln!(body, "        return service.list();")?;
    }
    writeln!(body, "    }}")?;

    if !keys.is_empty() {
        writeln!(body)?;
        writeln!(body, "    @GetMapping(\"{}\")", path)?;
        writeln!(body, "    public {} get({}) {{", name, path_params.join(", "))?;
        writeln!(body, "        return service.get({});", args.join(", "))?;
        writeln!(body, "    }}")?;
    }

    writeln!(body)?;
    writeln!(body, "    @PostMapping")?;
    writeln!(body, "    @ResponseStatus(HttpStatus.CREATED)")?;
    writeln!(
        body,
        "    public {} create({} {}Request request) {{",
        name, create_body, name
    )?;
    writeln!(body, "        return service.create(request);")?;
    writeln!(body, "    }}")?;

    if !keys.is_empty() {
        writeln!(body)?;
        writeln!(body, "    @PutMapping(\"{}\")", path)?;
        writeln!(
            body,
            "    public {} update({}, {} {}Request request) {{",
            name,
            path_params.join(", "),
            update_body,
            name
        )?;
        writeln!(body, "        return service.update({}, request);", args.join(", "))?;
        writeln!(body, "    }}")?;
        writeln!(body)?;
        writeln!(body, "    @DeleteMapping(\"{}\")", path)?;
        writeln!(body, "    @ResponseStatus(HttpStatus.NO_CONTENT)")?;
        writeln!(body, "    public void delete({}) {{", path_params.join(", "))?;
        writeln!(body, "        service.delete({});", args.join(", "))?;
        writeln!(body, "    }}")?;
    }
    writeln!(body, "}}")?;
    unit.render()
}

const NOT_FOUND: &str = r#"package {package}.exception;

public class NotFoundException extends RuntimeException {

    public NotFoundException(String entity, Object id) {
        super(entity + " " + id + " not found");
    }
}
"#;

const EXCEPTION_HANDLER: &str = r#"package {package}.exception;

import java.util.Map;
import org.springframework.http.HttpStatus;
import org.springframework.web.bind.MethodArgumentNotValidException;
import org.springframework.web.bind.annotation.ExceptionHandler;
import org.springframework.web.bind.annotation.ResponseStatus;
import org.springframework.web.bind.annotation.RestControllerAdvice;

@RestControllerAdvice
public class GlobalExceptionHandler {

    @ExceptionHandler(NotFoundException.class)
    @ResponseStatus(HttpStatus.NOT_FOUND)
    public Map<String, String> notFound(NotFoundException e) {
        return Map.of("error", e.getMessage());
    }

    @ExceptionHandler(MethodArgumentNotValidException.class)
    @ResponseStatus(HttpStatus.UNPROCESSABLE_ENTITY)
    public Map<String, Object> invalid(MethodArgumentNotValidException e) {
        return Map.of("error", e.getBindingResult().getFieldErrors().stream()
                .map(f -> f.getField() + ": " + f.getDefaultMessage())
                .toList());
    }
}
"#;

const HEALTH: &str = r#"package {package}.controller;

import java.util.Map;
import org.springframework.web.bind.annotation.GetMapping;
import org.springframework.web.bind.annotation.RestController;

@RestController
public class HealthController {

    @GetMapping("/health")
    public Map<String, String> health() {
        return Map.of("status", "ok");
    }
}
"#;

const ON_CREATE: &str = r#"package {package}.dto;

/** Validation group for constraints that only apply on create. */
public interface OnCreate {
}
"#;

const PAGE_RESPONSE: &str = r#"package {package}.dto;

import java.util.List;
import org.springframework.data.domain.Page;

public record PageResponse<T>(List<T> items, long total, int page, int perPage) {

    public static <T> PageResponse<T> of(Page<T> page) {
        return new PageResponse<>(page.getContent(), page.getTotalElements(), page.getNumber() + 1, page.getSize());
    }
}
"#;

const SECURITY: &str = r#"package {package}.config;

import java.nio.charset.StandardCharsets;
import javax.crypto.spec.SecretKeySpec;
import org.springframework.beans.factory.annotation.Value;
import org.springframework.context.annotation.Bean;
import org.springframework.context.annotation.Configuration;
import org.springframework.security.config.Customizer;
import org.springframework.security.config.annotation.web.builders.HttpSecurity;
import org.springframework.security.config.annotation.web.configuration.EnableWebSecurity;
import org.springframework.security.config.http.SessionCreationPolicy;
import org.springframework.security.oauth2.jwt.JwtDecoder;
import org.springframework.security.oauth2.jwt.NimbusJwtDecoder;
import org.springframework.security.web.SecurityFilterChain;

@Configuration
@EnableWebSecurity
public class SecurityConfig {

    @Bean
    SecurityFilterChain filterChain(HttpSecurity http) throws Exception {
        http.csrf(csrf -> csrf.disable())
                .sessionManagement(s -> s.sessionCreationPolicy(SessionCreationPolicy.STATELESS))
                .authorizeHttpRequests(auth -> auth
                        .requestMatchers("/health").permitAll()
                        .anyRequest().authenticated())
                .oauth2ResourceServer(oauth -> oauth.jwt(Customizer.withDefaults()));
        return http.build();
    }

    @Bean
    JwtDecoder jwtDecoder(@Value("${app.jwt.secret}") String secret) {
        SecretKeySpec key = new SecretKeySpec(secret.getBytes(StandardCharsets.UTF_8), "HmacSHA256");
        return NimbusJwtDecoder.withSecretKey(key).build();
    }
}
"#;

const RATE_LIMIT: &str = r#"package {package}.config;

import io.github.bucket4j.Bandwidth;
import io.github.bucket4j.Bucket;
import jakarta.servlet.FilterChain;
import jakarta.servlet.ServletException;
import jakarta.servlet.http.HttpServletRequest;
import jakarta.servlet.http.HttpServletResponse;
import java.io.IOException;
import java.time.Duration;
import java.util.Map;
import java.util.concurrent.ConcurrentHashMap;
import org.springframework.http.HttpStatus;
import org.springframework.stereotype.Component;
import org.springframework.web.filter.OncePerRequestFilter;

/** One token bucket per client address. */
@Component
public class RateLimitFilter extends OncePerRequestFilter {

    private final Map<String, Bucket> buckets = new ConcurrentHashMap<>();

    private static Bucket newBucket() {
        return Bucket.builder()
                .addLimit(Bandwidth.builder().capacity(120).refillGreedy(120, Duration.ofMinutes(1)).build())
                .build();
    }

    @Override
    protected void doFilterInternal(HttpServletRequest request, HttpServletResponse response, FilterChain chain)
            throws ServletException, IOException {
        Bucket bucket = buckets.computeIfAbsent(request.getRemoteAddr(), k -> newBucket());
        if (bucket.tryConsume(1)) {
            chain.doFilter(request, response);
        } else {
            response.setStatus(HttpStatus.TOO_MANY_REQUESTS.value());
        }
    }
}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProfileSet;
    use crate::generator::{FeatureToggles, generate};
    use crate::infer::infer;
    use crate::mapping::TargetKey;
    use crate::sql::{Dialect, extract};

    fn files(sql: &str, toggles: FeatureToggles) -> FileSet {
        let schema = infer(extract(sql, Dialect::Postgres).catalog);
        let profiles = ProfileSet::builtin().unwrap();
        let profile = profiles.get(&TargetKey::new("java", "spring")).unwrap();
        generate(&SpringEmitter, &schema, profile, &toggles, "shop-api")
            .unwrap()
            .files
    }

    const SHOP: &str = "
        CREATE TABLE customers (id BIGSERIAL PRIMARY KEY, email VARCHAR(200) NOT NULL UNIQUE, deleted_at TIMESTAMP);
        CREATE TABLE orders (
            id BIGSERIAL PRIMARY KEY,
            customer_id BIGINT NOT NULL REFERENCES customers(id),
            total NUMERIC(12, 2) NOT NULL
        );
        CREATE TABLE order_lines (
            order_id BIGINT REFERENCES orders(id),
            line_no INT,
            sku TEXT NOT NULL,
            PRIMARY KEY (order_id, line_no)
        );";

    #[test]
    fn test_jpa_entity() {
        let files = files(SHOP, FeatureToggles::new());
        let order = files
            .get("src/main/java/com/shopapi/entity/Order.java")
            .unwrap();
        assert!(order.starts_with("package com.shopapi.entity;\n"));
        assert!(order.contains("import java.math.BigDecimal;"));
        assert!(order.contains("    @Id\n    @GeneratedValue(strategy = GenerationType.IDENTITY)\n"));
        assert!(order.contains("    private Long id;"));
        assert!(order.contains("@Column(name = \"total\", nullable = false, precision = 12, scale = 2)"));
        assert!(order.contains(
            "    @ManyToOne(fetch = FetchType.LAZY)\n    @JoinColumn(name = \"customer_id\", referencedColumnName = \"id\", insertable = false, updatable = false)\n"
        ));
        let customer = files
            .get("src/main/java/com/shopapi/entity/Customer.java")
            .unwrap();
        assert!(customer.contains("    @OneToMany(mappedBy = \"customer\")"));
        assert!(customer.contains("    private List<Order> orders = new ArrayList<>();"));
    }

    #[test]
    fn test_composite_key_id_class() {
        let files = files(SHOP, FeatureToggles::new());
        let line = files
            .get("src/main/java/com/shopapi/entity/OrderLine.java")
            .unwrap();
        assert!(line.contains("@IdClass(OrderLineId.class)"));
        let id = files
            .get("src/main/java/com/shopapi/entity/OrderLineId.java")
            .unwrap();
        assert!(id.contains("    public OrderLineId(long orderId, int lineNo) {"));
        let repo = files
            .get("src/main/java/com/shopapi/repository/OrderLineRepository.java")
            .unwrap();
        assert!(repo.contains("extends JpaRepository<OrderLine, OrderLineId>"));
        let controller = files
            .get("src/main/java/com/shopapi/controller/OrderLineController.java")
            .unwrap();
        assert!(controller.contains("    @GetMapping(\"/{order_id}/{line_no}\")"));
    }

    #[test]
    fn test_soft_delete_and_cache() {
        let files = files(
            SHOP,
            FeatureToggles::new().with("soft_delete", true).with("caching", true),
        );
        let customer = files
            .get("src/main/java/com/shopapi/entity/Customer.java")
            .unwrap();
        assert!(customer.contains("@SQLDelete(sql = \"UPDATE customers SET deleted_at = now() WHERE id = ?\")"));
        assert!(customer.contains("@SQLRestriction(\"deleted_at IS NULL\")"));
        let service = files
            .get("src/main/java/com/shopapi/service/CustomerService.java")
            .unwrap();
        assert!(service.contains("    @Cacheable(cacheNames = \"customers\", key = \"#id\")"));
        let app = files
            .get("src/main/java/com/shopapi/ShopApiApplication.java")
            .unwrap();
        assert!(app.contains("@EnableCaching"));
    }

    #[test]
    fn test_request_validation_groups() {
        let files = files(SHOP, FeatureToggles::new());
        let request = files
            .get("src/main/java/com/shopapi/dto/CustomerRequest.java")
            .unwrap();
        assert!(request.contains("    @NotNull(groups = OnCreate.class)\n    @Size(max = 200)\n    private String email;"));
        assert!(request.contains("import java.time.LocalDateTime;"));
        assert!(request.contains("\n    private LocalDateTime deletedAt;"));
    }
}
