//! Per-entity views handed to emitters: names, mapped fields and relations,
//! all resolved against one target profile.

use crate::ast::{SqlType, Table};
use crate::error::UnmappedTypeWarning;
use crate::ir::{RelationKind, RelationView, Schema};
use crate::mapping::{
    Role, TargetProfile, TargetType, map_name, map_type, on_last_word, pluralize, singularize,
};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub struct EntityNames {
    /// Type name, singular: `OrderItem`.
    pub entity: String,
    /// File / module stem: `order_item`.
    pub file: String,
    /// URL segment: `order-items`.
    pub route: String,
    /// Table name as referenced from code.
    pub table: String,
    pub constant: String,
    /// Singular member name: `order_item` / `orderItem`.
    pub variable: String,
    /// Plural member name: `order_items` / `orderItems`.
    pub collection: String,
}

impl EntityNames {
    pub fn new(table: &str, profile: &TargetProfile) -> Self {
        let singular = singular_snake(table);
        Self {
            entity: map_name(table, profile, Role::Entity),
            file: map_name(table, profile, Role::File),
            route: map_name(table, profile, Role::Route),
            table: map_name(table, profile, Role::Table),
            constant: map_name(&singular, profile, Role::Constant),
            variable: map_name(&singular, profile, Role::Field),
            collection: map_name(&plural_snake(table), profile, Role::Field),
        }
    }

    /// Names for a table whose plain names are already taken: `users_2`
    /// gives `Users2`, `users_2`, `users-2`.
    fn numbered(table: &str, n: usize, profile: &TargetProfile) -> Self {
        use heck::ToSnakeCase;
        Self {
            table: map_name(table, profile, Role::Table),
            ..Self::new(&format!("{}_{}", table.to_snake_case(), n), profile)
        }
    }

    fn clashes(&self, other: &Self) -> bool {
        self.entity == other.entity
            || self.file == other.file
            || self.route == other.route
            || self.constant == other.constant
            || self.variable == other.variable
            || self.collection == other.collection
    }
}

/// Entity names for every generated table of a schema, unique per target.
///
/// Singularizing can fold two tables onto one name (`user` and `users`).
/// Tables are named in generation order; a later table that clashes with
/// an earlier one gets a numeric suffix.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NameTable {
    names: BTreeMap<String, EntityNames>,
}

impl NameTable {
    pub fn assign(schema: &Schema, profile: &TargetProfile) -> Self {
        let mut taken: Vec<EntityNames> = Vec::new();
        let mut names = BTreeMap::new();
        for table in schema.ordered_entities() {
            let mut candidate = EntityNames::new(&table.name, profile);
            let mut n = 2;
            while taken.iter().any(|t| t.clashes(&candidate)) {
                candidate = EntityNames::numbered(&table.name, n, profile);
                n += 1;
            }
            taken.push(candidate.clone());
            names.insert(table.name.clone(), candidate);
        }
        Self { names }
    }

    pub fn get(&self, table: &str) -> Option<&EntityNames> {
        self.names.get(table)
    }

    /// Assigned names, or the plain names for a table outside the schema.
    pub fn resolve(&self, table: &str, profile: &TargetProfile) -> EntityNames {
        self.get(table)
            .cloned()
            .unwrap_or_else(|| EntityNames::new(table, profile))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldModel {
    /// Column name in the database.
    pub column: String,
    /// Member name in the target.
    pub name: String,
    pub ty: TargetType,
    pub sql_type: SqlType,
    pub primary_key: bool,
    pub auto_increment: bool,
    pub unique: bool,
    pub default: Option<String>,
    /// Target table when this column is part of a foreign key.
    pub references: Option<String>,
    pub comment: Option<String>,
}

impl FieldModel {
    /// Filled in by the database; not part of create payloads.
    pub fn is_generated(&self) -> bool {
        self.auto_increment
    }

    /// Must be supplied on create.
    pub fn is_required_input(&self) -> bool {
        !self.is_generated() && !self.ty.nullable && self.default.is_none()
    }
}

/// How a many-to-many pair is stored.
#[derive(Debug, Clone, PartialEq)]
pub struct JunctionLink {
    pub table: String,
    /// Junction columns referencing this entity.
    pub local_columns: Vec<String>,
    /// Junction columns referencing the target entity.
    pub remote_columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelationModel {
    /// Kind as seen from this entity (inverse many-to-one is one-to-many).
    pub kind: RelationKind,
    /// Member name, already cased for the target.
    pub name: String,
    pub target_table: String,
    pub target_entity: String,
    pub target_file: String,
    /// Columns of this entity taking part in the join.
    pub local_columns: Vec<String>,
    /// Columns of the target entity taking part in the join.
    pub remote_columns: Vec<String>,
    /// Junction table for many-to-many.
    pub via: Option<JunctionLink>,
    /// This entity is not the stored owner.
    pub inverse: bool,
    /// The other side is not generated earlier; wire it as a forward reference.
    pub deferred: bool,
}

impl RelationModel {
    /// Whether this side holds the foreign key.
    pub fn holds_key(&self) -> bool {
        !self.inverse && matches!(self.kind, RelationKind::ManyToOne | RelationKind::OneToOne)
    }
}

#[derive(Debug, Clone)]
pub struct EntityModel<'a> {
    pub table: &'a Table,
    pub names: EntityNames,
    pub fields: Vec<FieldModel>,
    pub relations: Vec<RelationModel>,
    /// The table sits on a foreign-key cycle.
    pub deferred: bool,
}

impl<'a> EntityModel<'a> {
    /// View of one table with names assigned across the whole schema.
    pub fn build(
        schema: &'a Schema,
        table: &'a Table,
        profile: &TargetProfile,
    ) -> (Self, Vec<UnmappedTypeWarning>) {
        Self::build_with(schema, table, profile, &NameTable::assign(schema, profile))
    }

    pub fn build_with(
        schema: &'a Schema,
        table: &'a Table,
        profile: &TargetProfile,
        names: &NameTable,
    ) -> (Self, Vec<UnmappedTypeWarning>) {
        let mut warnings = Vec::new();
        let fields: Vec<FieldModel> = table
            .columns
            .iter()
            .map(|column| {
                let ty = map_type(column, profile);
                if ty.fallback {
                    warnings.push(UnmappedTypeWarning {
                        target: profile.key.to_string(),
                        table: table.name.clone(),
                        column: column.name.clone(),
                        sql_type: column.data_type.to_string(),
                        fallback: profile.fallback.clone(),
                    });
                }
                FieldModel {
                    column: column.name.clone(),
                    name: map_name(&column.name, profile, Role::Field),
                    ty,
                    sql_type: column.data_type.clone(),
                    primary_key: column.primary_key,
                    auto_increment: column.auto_increment,
                    unique: column.unique,
                    default: column.default.clone(),
                    references: table
                        .foreign_keys
                        .iter()
                        .find(|fk| fk.columns.contains(&column.name))
                        .map(|fk| fk.target_table.clone()),
                    comment: column.comment.clone(),
                }
            })
            .collect();

        let mut used: Vec<String> = fields.iter().map(|f| f.name.clone()).collect();
        let relations = schema
            .relations_of(&table.name)
            .into_iter()
            .filter(|view| !schema.is_junction(view.to))
            .map(|view| relation(schema, view, profile, names, &mut used))
            .collect();

        let model = Self {
            table,
            names: names.resolve(&table.name, profile),
            fields,
            relations,
            deferred: schema.is_deferred(&table.name),
        };
        (model, warnings)
    }

    pub fn key_fields(&self) -> Vec<&FieldModel> {
        self.fields.iter().filter(|f| f.primary_key).collect()
    }

    /// Fields accepted on create.
    pub fn input_fields(&self) -> impl Iterator<Item = &FieldModel> {
        self.fields.iter().filter(|f| !f.is_generated())
    }

    pub fn field(&self, column: &str) -> Option<&FieldModel> {
        self.fields.iter().find(|f| f.column == column)
    }

    /// Whether a column exists that soft delete can use.
    pub fn soft_delete_column(&self) -> Option<&FieldModel> {
        self.fields
            .iter()
            .find(|f| f.column == "deleted_at" && f.ty.nullable)
    }
}

fn relation(
    schema: &Schema,
    view: RelationView<'_>,
    profile: &TargetProfile,
    names: &NameTable,
    used: &mut Vec<String>,
) -> RelationModel {
    let rel = view.relationship;
    let (near, far) = if view.inverse {
        (&rel.target_columns, &rel.columns)
    } else {
        (&rel.columns, &rel.target_columns)
    };
    let (local_columns, remote_columns, via) = match &rel.via {
        Some(junction) => (
            referenced(schema, junction, near),
            referenced(schema, junction, far),
            Some(JunctionLink {
                table: junction.clone(),
                local_columns: near.clone(),
                remote_columns: far.clone(),
            }),
        ),
        None => (near.clone(), far.clone(), None),
    };

    let base = match (view.kind, view.inverse) {
        (RelationKind::ManyToOne | RelationKind::OneToOne, false) => key_stem(&rel.columns)
            .unwrap_or_else(|| singular_snake(view.to)),
        (RelationKind::OneToOne, true) => singular_snake(view.to),
        _ => plural_snake(view.to),
    };

    let mut name = map_name(&base, profile, Role::Field);
    if used.contains(&name) {
        let hint = key_stem(&rel.columns).unwrap_or_else(|| rel.columns.join("_"));
        name = map_name(&format!("{}_by_{}", base, hint), profile, Role::Field);
    }
    let mut n = 2;
    let stem = name.clone();
    while used.contains(&name) {
        name = map_name(&format!("{}_{}", stem, n), profile, Role::Field);
        n += 1;
    }
    used.push(name.clone());

    let position = |t: &str| schema.generation_order.iter().position(|x| x == t);
    let deferred = view.from == view.to
        || (schema.is_deferred(view.from) && schema.is_deferred(view.to))
        || position(view.to) > position(view.from);

    let target = names.resolve(view.to, profile);
    RelationModel {
        kind: view.kind,
        name,
        target_table: view.to.to_string(),
        target_entity: target.entity,
        target_file: target.file,
        local_columns,
        remote_columns,
        via,
        inverse: view.inverse,
        deferred,
    }
}

/// Columns a junction foreign key points at.
fn referenced(schema: &Schema, junction: &str, columns: &[String]) -> Vec<String> {
    schema
        .table(junction)
        .and_then(|t| t.foreign_keys.iter().find(|fk| fk.columns == columns))
        .map(|fk| fk.target_columns.clone())
        .unwrap_or_default()
}

/// `category_id` -> `category`.
fn key_stem(columns: &[String]) -> Option<String> {
    let [single] = columns else {
        return None;
    };
    let lower = single.to_lowercase();
    ["_id", "_fk", "_key", "id"]
        .iter()
        .find_map(|suffix| lower.strip_suffix(suffix))
        .map(|s| s.trim_end_matches('_').to_string())
        .filter(|s| !s.is_empty())
}

fn singular_snake(name: &str) -> String {
    use heck::ToSnakeCase;
    on_last_word(&name.to_snake_case(), singularize)
}

fn plural_snake(name: &str) -> String {
    on_last_word(&singular_snake(name), pluralize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProfileSet;
    use crate::infer::infer;
    use crate::mapping::TargetKey;
    use crate::sql::{Dialect, extract};

    fn build(sql: &str, table: &str, lang: &str, fw: &str) -> (Vec<String>, Vec<RelationModel>, EntityNames) {
        let schema = infer(extract(sql, Dialect::Generic).catalog);
        let profiles = ProfileSet::builtin().unwrap();
        let profile = profiles.get(&TargetKey::new(lang, fw)).unwrap();
        let t = schema.table(table).unwrap();
        let (model, _) = EntityModel::build(&schema, t, profile);
        (
            model.fields.iter().map(|f| f.name.clone()).collect(),
            model.relations.clone(),
            model.names.clone(),
        )
    }

    const SHOP: &str = "
        CREATE TABLE categories (id INT PRIMARY KEY, parent_id INT REFERENCES categories(id));
        CREATE TABLE products (id INT PRIMARY KEY, category_id INT NOT NULL REFERENCES categories(id));
        CREATE TABLE tags (id INT PRIMARY KEY);
        CREATE TABLE product_tags (
            product_id INT REFERENCES products(id),
            tag_id INT REFERENCES tags(id),
            PRIMARY KEY (product_id, tag_id)
        );";

    #[test]
    fn test_entity_names() {
        let (_, _, names) = build(SHOP, "categories", "typescript", "express");
        assert_eq!(names.entity, "Category");
        assert_eq!(names.file, "category");
        assert_eq!(names.route, "categories");
        assert_eq!(names.variable, "category");
        assert_eq!(names.collection, "categories");
    }

    #[test]
    fn test_relation_names() {
        let (_, rels, _) = build(SHOP, "products", "rust", "axum");
        let names: Vec<&str> = rels.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["category", "tags"]);
        assert!(rels[0].holds_key());
        let via = rels[1].via.as_ref().unwrap();
        assert_eq!(via.table, "product_tags");
        assert_eq!(via.local_columns, vec!["product_id"]);
        assert_eq!(via.remote_columns, vec!["tag_id"]);
        assert_eq!(rels[1].local_columns, vec!["id"]);
        assert_eq!(rels[1].remote_columns, vec!["id"]);
    }

    #[test]
    fn test_inverse_relations() {
        let (_, rels, _) = build(SHOP, "categories", "java", "spring");
        let summary: Vec<(RelationKind, &str)> =
            rels.iter().map(|r| (r.kind, r.name.as_str())).collect();
        assert_eq!(
            summary,
            vec![
                (RelationKind::ManyToOne, "parent"),
                (RelationKind::OneToMany, "categories"),
                (RelationKind::OneToMany, "products"),
            ]
        );
        assert!(rels[0].deferred);
        assert!(rels[2].deferred);
        assert_eq!(rels[2].remote_columns, vec!["category_id"]);
    }

    #[test]
    fn test_name_table_suffixes_clashes() {
        let schema = infer(
            extract(
                "CREATE TABLE user (id INT PRIMARY KEY);
                 CREATE TABLE users (id INT PRIMARY KEY);
                 CREATE TABLE user_2 (id INT PRIMARY KEY);",
                Dialect::Generic,
            )
            .catalog,
        );
        let profiles = ProfileSet::builtin().unwrap();
        let profile = profiles.get(&TargetKey::new("go", "gin")).unwrap();
        let names = NameTable::assign(&schema, profile);

        let files: Vec<&str> = ["user", "users", "user_2"]
            .iter()
            .map(|t| names.get(t).unwrap().file.as_str())
            .collect();
        assert_eq!(files, vec!["user", "user_2", "user_2_2"]);
        assert_eq!(names.get("users").unwrap().table, "users");
    }

    #[test]
    fn test_key_stem() {
        assert_eq!(key_stem(&["category_id".to_string()]), Some("category".to_string()));
        assert_eq!(key_stem(&["ownerId".to_string()]), Some("owner".to_string()));
        assert_eq!(key_stem(&["id".to_string()]), None);
        assert_eq!(key_stem(&["a".to_string(), "b".to_string()]), None);
    }
}
