//! Postgres statement text for targets that issue raw SQL.

use super::model::{EntityModel, RelationModel};

fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn list(columns: &[&str]) -> String {
    columns.iter().map(|c| quote(c)).collect::<Vec<_>>().join(", ")
}

/// `"a" = $n AND "b" = $n+1`, numbering from `first`.
fn predicate(columns: &[String], first: usize, alias: Option<&str>) -> String {
    columns
        .iter()
        .enumerate()
        .map(|(i, c)| match alias {
            Some(a) => format!("{}.{} = ${}", a, quote(c), first + i),
            None => format!("{} = ${}", quote(c), first + i),
        })
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// CRUD statements for one entity. Statements addressing a single row are
/// `None` when the table has no primary key.
#[derive(Debug, Clone, PartialEq)]
pub struct Statements {
    pub list: String,
    pub count: String,
    pub find: Option<String>,
    pub insert: String,
    /// Parameters: input columns in order, then key columns.
    pub update: Option<String>,
    pub delete: Option<String>,
}

impl Statements {
    pub fn new(entity: &EntityModel<'_>, paginate: bool, soft_delete: bool) -> Self {
        let table = quote(&entity.table.name);
        let all: Vec<&str> = entity.fields.iter().map(|f| f.column.as_str()).collect();
        let inputs: Vec<&str> = entity.input_fields().map(|f| f.column.as_str()).collect();
        let keys: Vec<String> = entity.key_fields().iter().map(|f| f.column.clone()).collect();
        let returning = list(&all);

        let live = soft_delete
            .then(|| entity.soft_delete_column())
            .flatten()
            .map(|f| format!("{} IS NULL", quote(&f.column)));
        let live_where = live
            .as_ref()
            .map(|c| format!(" WHERE {}", c))
            .unwrap_or_default();
        let live_and = live
            .as_ref()
            .map(|c| format!(" AND {}", c))
            .unwrap_or_default();

        let order = if keys.is_empty() {
            String::new()
        } else {
            let cols: Vec<&str> = keys.iter().map(String::as_str).collect();
            format!(" ORDER BY {}", list(&cols))
        };
        let page = if paginate { " LIMIT $1 OFFSET $2" } else { "" };

        let insert = if inputs.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES RETURNING {}", table, returning)
        } else {
            let params: Vec<String> = (1..=inputs.len()).map(|i| format!("${}", i)).collect();
            format!(
                "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
                table,
                list(&inputs),
                params.join(", "),
                returning
            )
        };

        let (find, update, delete) = if keys.is_empty() {
            (None, None, None)
        } else {
            let find = format!(
                "SELECT {} FROM {} WHERE {}{}",
                returning,
                table,
                predicate(&keys, 1, None),
                live_and
            );
            let update = (!inputs.is_empty()).then(|| {
                let sets: Vec<String> = inputs
                    .iter()
                    .enumerate()
                    .map(|(i, c)| format!("{0} = COALESCE(${1}, {0})", quote(c), i + 1))
                    .collect();
                format!(
                    "UPDATE {} SET {} WHERE {}{} RETURNING {}",
                    table,
                    sets.join(", "),
                    predicate(&keys, inputs.len() + 1, None),
                    live_and,
                    returning
                )
            });
            let delete = match entity.soft_delete_column().filter(|_| soft_delete) {
                Some(column) => format!(
                    "UPDATE {} SET {} = now() WHERE {}{}",
                    table,
                    quote(&column.column),
                    predicate(&keys, 1, None),
                    live_and
                ),
                None => format!("DELETE FROM {} WHERE {}", table, predicate(&keys, 1, None)),
            };
            (Some(find), update, Some(delete))
        };

        Self {
            list: format!("SELECT {} FROM {}{}{}{}", returning, table, live_where, order, page),
            count: format!("SELECT COUNT(*) FROM {}{}", table, live_where),
            find,
            insert,
            update,
            delete,
        }
    }
}

/// Load the other side of a relationship. Parameters are this entity's
/// `local_columns` values.
pub fn related(relation: &RelationModel) -> String {
    let target = quote(&relation.target_table);
    match &relation.via {
        Some(junction) => {
            let on: Vec<String> = junction
                .remote_columns
                .iter()
                .zip(&relation.remote_columns)
                .map(|(j, t)| format!("j.{} = t.{}", quote(j), quote(t)))
                .collect();
            format!(
                "SELECT t.* FROM {} t JOIN {} j ON {} WHERE {}",
                target,
                quote(&junction.table),
                on.join(" AND "),
                predicate(&junction.local_columns, 1, Some("j"))
            )
        }
        None => format!(
            "SELECT t.* FROM {} t WHERE {}",
            target,
            predicate(&relation.remote_columns, 1, Some("t"))
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProfileSet;
    use crate::infer::infer;
    use crate::mapping::TargetKey;
    use crate::sql::{Dialect, extract};

    const SQL: &str = "
        CREATE TABLE posts (id SERIAL PRIMARY KEY, title TEXT NOT NULL, deleted_at TIMESTAMP);
        CREATE TABLE labels (id SERIAL PRIMARY KEY);
        CREATE TABLE post_labels (
            post_id INT REFERENCES posts(id),
            label_id INT REFERENCES labels(id),
            PRIMARY KEY (post_id, label_id)
        );";

    #[test]
    fn test_crud_statements() {
        let schema = infer(extract(SQL, Dialect::Postgres).catalog);
        let profiles = ProfileSet::builtin().unwrap();
        let profile = profiles.get(&TargetKey::new("rust", "axum")).unwrap();
        let (posts, _) = EntityModel::build(&schema, schema.table("posts").unwrap(), profile);

        let hard = Statements::new(&posts, true, false);
        assert_eq!(
            hard.list,
            r#"SELECT "id", "title", "deleted_at" FROM "posts" ORDER BY "id" LIMIT $1 OFFSET $2"#
        );
        assert_eq!(
            hard.insert,
            r#"INSERT INTO "posts" ("title", "deleted_at") VALUES ($1, $2) RETURNING "id", "title", "deleted_at""#
        );
        assert_eq!(hard.delete.as_deref(), Some(r#"DELETE FROM "posts" WHERE "id" = $1"#));

        let soft = Statements::new(&posts, false, true);
        assert_eq!(
            soft.list,
            r#"SELECT "id", "title", "deleted_at" FROM "posts" WHERE "deleted_at" IS NULL ORDER BY "id""#
        );
        assert_eq!(
            soft.delete.as_deref(),
            Some(r#"UPDATE "posts" SET "deleted_at" = now() WHERE "id" = $1 AND "deleted_at" IS NULL"#)
        );
        assert!(soft.update.unwrap().contains(r#""title" = COALESCE($1, "title")"#));
    }

    #[test]
    fn test_many_to_many_join() {
        let schema = infer(extract(SQL, Dialect::Postgres).catalog);
        let profiles = ProfileSet::builtin().unwrap();
        let profile = profiles.get(&TargetKey::new("rust", "axum")).unwrap();
        let (labels, _) = EntityModel::build(&schema, schema.table("labels").unwrap(), profile);

        assert_eq!(
            related(&labels.relations[0]),
            r#"SELECT t.* FROM "posts" t JOIN "post_labels" j ON j."post_id" = t."id" WHERE j."label_id" = $1"#
        );
    }
}
