use pretty_assertions::assert_eq;
use schemaforge::assembler::Scaffolding;
use schemaforge::config::ProfileSet;
use schemaforge::error::{CycleWarning, Diagnostic, GenerateError, UnsupportedTargetError};
use schemaforge::generator::{EmitterRegistry, EntityModel, FeatureToggles};
use schemaforge::ir::{RelationKind, Schema, TableKind};
use schemaforge::mapping::TargetKey;
use schemaforge::pipeline::{GenerationOutput, GenerationRequest, Pipeline};
use schemaforge::sql::Dialect;

const SHOP: &str = r#"
    CREATE TABLE categories (
        id SERIAL PRIMARY KEY,
        name VARCHAR(100) NOT NULL
    );
    CREATE TABLE products (
        id SERIAL PRIMARY KEY,
        category_id INTEGER NOT NULL REFERENCES categories(id),
        name VARCHAR(200) NOT NULL,
        price DECIMAL(10, 2) NOT NULL
    );
    CREATE TABLE tags (
        id SERIAL PRIMARY KEY,
        label VARCHAR(50) NOT NULL UNIQUE
    );
    CREATE TABLE product_tags (
        product_id INTEGER NOT NULL REFERENCES products(id) ON DELETE CASCADE,
        tag_id INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
        PRIMARY KEY (product_id, tag_id)
    );
"#;

fn pipeline() -> Pipeline {
    Pipeline::new(ProfileSet::builtin().unwrap(), EmitterRegistry::builtin())
}

fn all_targets() -> Vec<TargetKey> {
    EmitterRegistry::builtin().keys().cloned().collect()
}

fn run(ddl: &str, targets: &[&str]) -> GenerationOutput {
    let mut request = GenerationRequest::new(ddl, "shop").dialect(Dialect::Postgres);
    for t in targets {
        request = request.target(t.parse().unwrap());
    }
    pipeline().run(&request).unwrap()
}

fn run_all(ddl: &str) -> GenerationOutput {
    let mut request = GenerationRequest::new(ddl, "shop");
    request.targets = all_targets();
    pipeline().run(&request).unwrap()
}

fn relation_summary(schema: &Schema) -> Vec<(RelationKind, String, String, Option<String>)> {
    let mut summary: Vec<_> = schema
        .relationships
        .iter()
        .map(|r| (r.kind, r.owner.clone(), r.target.clone(), r.via.clone()))
        .collect();
    summary.sort();
    summary
}

fn generation_errors(output: &GenerationOutput) -> Vec<&Diagnostic> {
    output
        .diagnostics
        .iter()
        .filter(|d| matches!(d, Diagnostic::Generation { .. }))
        .collect()
}

#[test]
fn test_shop_scenario() {
    let output = run(SHOP, &["rust/axum"]);
    let schema = &output.schema;

    assert_eq!(schema.kind("product_tags"), Some(TableKind::Junction));
    assert_eq!(schema.generation_order, vec!["categories", "products", "tags"]);
    assert!(schema.cycles.is_empty());

    assert_eq!(schema.relationships.len(), 2);
    let belongs = &schema.relationships[0];
    assert_eq!(belongs.kind, RelationKind::ManyToOne);
    assert_eq!((belongs.owner.as_str(), belongs.target.as_str()), ("products", "categories"));
    assert_eq!(belongs.columns, vec!["category_id"]);
    let tagged = &schema.relationships[1];
    assert_eq!(tagged.kind, RelationKind::ManyToMany);
    assert_eq!((tagged.owner.as_str(), tagged.target.as_str()), ("products", "tags"));
    assert_eq!(tagged.via.as_deref(), Some("product_tags"));
    assert_eq!(tagged.columns, vec!["product_id"]);
    assert_eq!(tagged.target_columns, vec!["tag_id"]);

    let files = &output.file_sets[&TargetKey::new("rust", "axum")];
    for model in ["category", "product", "tag"] {
        assert!(files.get(&format!("src/models/{}.rs", model)).is_some(), "{}", model);
    }
    assert!(files.get("src/models/product_tag.rs").is_none());

    let products = files.get("src/repositories/product.rs").unwrap();
    assert!(products.contains(
        "pub async fn category(&self, row: &Product) -> Result<Option<Category>, sqlx::Error>"
    ));
    assert!(products.contains("pub async fn tags(&self, row: &Product) -> Result<Vec<Tag>, sqlx::Error>"));
    let tags = files.get("src/repositories/tag.rs").unwrap();
    assert!(tags.contains("pub async fn products(&self, row: &Tag) -> Result<Vec<Product>, sqlx::Error>"));
    assert!(output.diagnostics.is_empty());
}

#[test]
fn test_output_is_deterministic() {
    let first = run_all(SHOP);
    let second = run_all(SHOP);

    assert_eq!(first.file_sets.len(), 9);
    assert_eq!(first.file_sets, second.file_sets);
    assert_eq!(first.to_json().unwrap(), second.to_json().unwrap());
    assert!(generation_errors(&first).is_empty());
}

#[test]
fn test_extra_column_makes_link_an_entity() {
    let ddl = SHOP.replace(
        "tag_id INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,",
        "tag_id INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,\n        added_at TIMESTAMP,",
    );
    let output = run(&ddl, &["rust/axum"]);
    let schema = &output.schema;

    assert_eq!(schema.kind("product_tags"), Some(TableKind::Entity));
    assert!(schema.relationships.iter().all(|r| r.kind != RelationKind::ManyToMany));
    assert_eq!(
        relation_summary(schema)
            .into_iter()
            .filter(|(_, owner, _, _)| owner == "product_tags")
            .count(),
        2
    );
    assert_eq!(schema.generation_order.last().map(String::as_str), Some("product_tags"));
    assert!(
        output.file_sets[&TargetKey::new("rust", "axum")]
            .get("src/models/product_tag.rs")
            .is_some()
    );
}

#[test]
fn test_self_reference_is_not_a_cycle() {
    let output = run_all(
        "CREATE TABLE employees (
            id SERIAL PRIMARY KEY,
            name TEXT NOT NULL,
            manager_id INTEGER REFERENCES employees(id)
        );",
    );

    assert!(output.schema.cycles.is_empty());
    assert_eq!(output.schema.generation_order, vec!["employees"]);
    assert!(output.schema.relationships[0].is_self_reference());
    assert!(output.diagnostics.is_empty(), "{:?}", output.diagnostics);
    assert_eq!(output.file_sets.len(), 9);
}

#[test]
fn test_cycle_is_tolerated() {
    let output = run_all(
        "CREATE TABLE departments (id INTEGER PRIMARY KEY, name TEXT, head_id INTEGER);
         CREATE TABLE staff (id INTEGER PRIMARY KEY, department_id INTEGER REFERENCES departments(id));
         ALTER TABLE departments ADD CONSTRAINT fk_head FOREIGN KEY (head_id) REFERENCES staff(id);",
    );

    assert_eq!(output.schema.generation_order, vec!["departments", "staff"]);
    let cycle = CycleWarning {
        tables: vec!["departments".to_string(), "staff".to_string()],
    };
    assert_eq!(output.schema.cycles, vec![cycle.clone()]);
    assert!(output.diagnostics.contains(&Diagnostic::Cycle(cycle)));
    assert!(generation_errors(&output).is_empty());
    assert_eq!(output.file_sets.len(), 9);
}

#[test]
fn test_declaration_order_does_not_change_relationships() {
    let reversed = r#"
        CREATE TABLE product_tags (
            product_id INTEGER NOT NULL REFERENCES products(id) ON DELETE CASCADE,
            tag_id INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
            PRIMARY KEY (product_id, tag_id)
        );
        CREATE TABLE tags (id SERIAL PRIMARY KEY, label VARCHAR(50) NOT NULL UNIQUE);
        CREATE TABLE products (
            id SERIAL PRIMARY KEY,
            category_id INTEGER NOT NULL REFERENCES categories(id),
            name VARCHAR(200) NOT NULL,
            price DECIMAL(10, 2) NOT NULL
        );
        CREATE TABLE categories (id SERIAL PRIMARY KEY, name VARCHAR(100) NOT NULL);
    "#;
    let forward = run(SHOP, &[]);
    let backward = run(reversed, &[]);

    assert!(backward.diagnostics.is_empty(), "{:?}", backward.diagnostics);
    assert_eq!(relation_summary(&forward.schema), relation_summary(&backward.schema));

    let order = &backward.schema.generation_order;
    let position = |name: &str| order.iter().position(|t| t == name).unwrap();
    assert!(position("categories") < position("products"));
    assert_eq!(order.len(), 3);
}

#[test]
fn test_every_column_type_maps_for_every_target() {
    let ddl = r#"
        CREATE TYPE mood AS ENUM ('ok', 'meh');
        CREATE TABLE samples (
            id BIGSERIAL PRIMARY KEY,
            a SMALLINT, b INTEGER, c BIGINT, d NUMERIC(10, 2), e REAL,
            f DOUBLE PRECISION, g BOOLEAN, h CHAR(3), i VARCHAR(20), j TEXT,
            k DATE, l TIME, m TIMESTAMP, n TIMESTAMPTZ, o INTERVAL, p UUID,
            q JSONB, r BYTEA, s mood, t INTEGER[], u GEOMETRY
        );
    "#;
    let output = run_all(ddl);
    assert!(generation_errors(&output).is_empty(), "{:?}", output.diagnostics);
    assert_eq!(output.file_sets.len(), 9);

    let profiles = ProfileSet::builtin().unwrap();
    let table = output.schema.table("samples").unwrap();
    for profile in profiles.iter() {
        let (model, warnings) = EntityModel::build(&output.schema, table, profile);
        assert_eq!(model.fields.len(), table.columns.len());
        for field in &model.fields {
            assert!(!field.ty.name.is_empty(), "{} {}", profile.key, field.column);
        }
        assert!(
            warnings.iter().any(|w| w.column == "u"),
            "{} did not flag the unknown type",
            profile.key
        );
    }
    assert!(output.diagnostics.iter().any(|d| matches!(d, Diagnostic::UnmappedType(w) if w.column == "u")));
}

#[test]
fn test_unsupported_target_does_not_affect_others() {
    let output = run(SHOP, &["rust/axum", "cobol/cics", "go/gin"]);

    assert_eq!(
        output.file_sets.keys().map(ToString::to_string).collect::<Vec<_>>(),
        vec!["go/gin", "rust/axum"]
    );
    assert_eq!(
        output.diagnostics,
        vec![Diagnostic::UnsupportedTarget(UnsupportedTargetError {
            target: "cobol/cics".to_string(),
            reason: "no target profile".to_string(),
        })]
    );
    assert!(output.has_errors());

    let alone = run(SHOP, &["rust/axum"]);
    assert_eq!(
        alone.file_sets[&TargetKey::new("rust", "axum")],
        output.file_sets[&TargetKey::new("rust", "axum")]
    );
}

#[test]
fn test_scaffolding_path_conflict() {
    let output = run(SHOP, &["python/fastapi"]);

    let mut clean = Scaffolding::new();
    clean
        .per_target
        .entry(TargetKey::new("python", "fastapi"))
        .or_default()
        .insert("requirements.txt".to_string(), b"fastapi\n".to_vec());
    let archive = output.assemble(&clean).unwrap();
    assert!(archive.get("python-fastapi/requirements.txt").is_some());
    assert!(archive.get("python-fastapi/app/main.py").is_some());

    let mut clashing = Scaffolding::new();
    clashing
        .shared
        .insert("python-fastapi/app/main.py".to_string(), Vec::new());
    match output.assemble(&clashing) {
        Err(GenerateError::PathConflict(conflict)) => {
            assert_eq!(conflict.path, "python-fastapi/app/main.py");
            assert_eq!(conflict.generated_by, "python/fastapi");
        }
        other => panic!("expected a path conflict, got {:?}", other.map(|a| a.len())),
    }
}

#[test]
fn test_unknown_toggle_is_ignored() {
    let plain = run(SHOP, &["typescript/express", "java/spring"]);

    let mut request = GenerationRequest::new(SHOP, "shop")
        .dialect(Dialect::Postgres)
        .toggles(FeatureToggles::new().with("telemetry", true));
    request.targets = vec![
        TargetKey::new("typescript", "express"),
        TargetKey::new("java", "spring"),
    ];
    let toggled = pipeline().run(&request).unwrap();

    assert_eq!(plain.file_sets, toggled.file_sets);
    assert_eq!(plain.diagnostics, toggled.diagnostics);
}

#[test]
fn test_parse_errors_are_statement_scoped() {
    let ddl = "CREATE TABLE a (id INT PRIMARY KEY);\n\
               CREATE TABLE broken (id INT PRIMARY KEY, FOREIGN KEY (nope) REFERENCES a(id));\n\
               CREATE TABLE b (id INT PRIMARY KEY, a_id INT REFERENCES a(id));";
    let output = run(ddl, &["go/echo"]);

    assert_eq!(output.schema.tables.len(), 2);
    match output.diagnostics.as_slice() {
        [Diagnostic::Parse(error)] => assert_eq!(error.statement, 2),
        other => panic!("unexpected diagnostics {:?}", other),
    }
    let files = &output.file_sets[&TargetKey::new("go", "echo")];
    assert!(files.get("internal/models/a.go").is_some());
    assert!(files.get("internal/models/b.go").is_some());
}

#[test]
fn test_only_script_without_tables_fails() {
    let request = GenerationRequest::new("CREATE TABLE (;", "shop").target(TargetKey::new("rust", "axum"));
    match pipeline().run(&request) {
        Err(GenerateError::NoTables { errors }) => assert!(!errors.is_empty()),
        other => panic!("expected NoTables, got {:?}", other.map(|o| o.file_sets.len())),
    }
}

#[test]
fn test_one_to_one_needs_exact_unique_match() {
    let output = run(
        "CREATE TABLE users (id SERIAL PRIMARY KEY);
         CREATE TABLE profiles (id SERIAL PRIMARY KEY, user_id INTEGER NOT NULL UNIQUE REFERENCES users(id));
         CREATE TABLE badges (
             id SERIAL PRIMARY KEY,
             user_id INTEGER NOT NULL REFERENCES users(id),
             kind TEXT NOT NULL,
             UNIQUE (user_id, kind)
         );",
        &[],
    );

    assert_eq!(
        relation_summary(&output.schema),
        vec![
            (RelationKind::ManyToOne, "badges".to_string(), "users".to_string(), None),
            (RelationKind::OneToOne, "profiles".to_string(), "users".to_string(), None),
        ]
    );
}

#[test]
fn test_missing_reference_target_is_reported() {
    let output = run(
        "CREATE TABLE notes (id SERIAL PRIMARY KEY, owner_id INTEGER REFERENCES ghosts(id));",
        &["rust/actix"],
    );

    assert!(output.schema.relationships.is_empty());
    assert!(matches!(
        output.diagnostics.as_slice(),
        [Diagnostic::UnresolvedReference(r)] if r.target == "ghosts"
    ));
    assert_eq!(output.file_sets.len(), 1);
}

#[test]
fn test_tables_folding_to_one_name_are_disambiguated() {
    let ddl = "
        CREATE TABLE user (id SERIAL PRIMARY KEY, name TEXT);
        CREATE TABLE users (id SERIAL PRIMARY KEY, email TEXT);
        CREATE TABLE orders (id SERIAL PRIMARY KEY, user_id INTEGER REFERENCES users(id));
    ";
    let targets = [
        "rust/axum",
        "python/fastapi",
        "go/gin",
        "java/spring",
        "typescript/express",
    ];
    let output = run(ddl, &targets);

    assert_eq!(generation_errors(&output), Vec::<&Diagnostic>::new());
    assert_eq!(output.file_sets.len(), targets.len());

    let rust = &output.file_sets[&TargetKey::new("rust", "axum")];
    assert!(rust.get("src/models/user.rs").is_some());
    let users = rust.get("src/models/user_2.rs").unwrap();
    assert!(users.contains("pub struct User2"));
    let orders = rust.get("src/repositories/order.rs").unwrap();
    assert!(orders.contains("Option<User2>"));

    let python = &output.file_sets[&TargetKey::new("python", "fastapi")];
    assert!(python.get("app/models/user.py").is_some());
    assert!(python.get("app/models/user_2.py").is_some());
}
