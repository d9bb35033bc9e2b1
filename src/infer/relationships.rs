use super::junction::distinct_targets;
use crate::ast::Table;
use crate::error::UnresolvedReference;
use crate::ir::{RelationKind, Relationship, TableKind};

/// Derive relationships in table declaration order, then foreign-key order.
pub fn derive(
    tables: &[Table],
    kinds: &[TableKind],
) -> (Vec<Relationship>, Vec<UnresolvedReference>) {
    let is_junction = |name: &str| {
        tables
            .iter()
            .zip(kinds)
            .any(|(t, k)| t.name == name && *k == TableKind::Junction)
    };

    let mut relationships = Vec::new();
    let mut unresolved = Vec::new();

    for (table, kind) in tables.iter().zip(kinds) {
        match kind {
            TableKind::Junction => {
                let targets = distinct_targets(table);
                if let [owner, target] = targets.as_slice() {
                    relationships.push(Relationship {
                        kind: RelationKind::ManyToMany,
                        owner: owner.target_table.clone(),
                        target: target.target_table.clone(),
                        columns: owner.columns.clone(),
                        target_columns: target.columns.clone(),
                        via: Some(table.name.clone()),
                        on_delete: owner.on_delete,
                    });
                }
            }
            TableKind::Entity => {
                for fk in &table.foreign_keys {
                    if is_junction(&fk.target_table) {
                        unresolved.push(UnresolvedReference {
                            table: table.name.clone(),
                            columns: fk.columns.clone(),
                            target: fk.target_table.clone(),
                            reason: "target is a junction table".to_string(),
                        });
                        continue;
                    }

                    let kind = if table.is_unique_set(&fk.columns) {
                        RelationKind::OneToOne
                    } else {
                        RelationKind::ManyToOne
                    };
                    relationships.push(Relationship {
                        kind,
                        owner: table.name.clone(),
                        target: fk.target_table.clone(),
                        columns: fk.columns.clone(),
                        target_columns: fk.target_columns.clone(),
                        via: None,
                        on_delete: fk.on_delete,
                    });
                }
            }
        }
    }

    (relationships, unresolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infer::infer;
    use crate::sql::{Dialect, extract};

    fn relationships(sql: &str) -> Vec<Relationship> {
        let ex = extract(sql, Dialect::Generic);
        assert!(ex.errors.is_empty(), "{:?}", ex.errors);
        infer(ex.catalog).relationships
    }

    const USERS: &str = "CREATE TABLE users (id INT PRIMARY KEY);";

    #[test]
    fn test_unique_column_is_one_to_one() {
        let sql = format!(
            "{} CREATE TABLE profiles (id INT PRIMARY KEY, user_id INT UNIQUE REFERENCES users(id));",
            USERS
        );
        let rels = relationships(&sql);
        assert_eq!(rels[0].kind, RelationKind::OneToOne);
    }

    #[test]
    fn test_primary_key_reference_is_one_to_one() {
        let sql = format!(
            "{} CREATE TABLE settings (user_id INT PRIMARY KEY REFERENCES users(id), theme TEXT);",
            USERS
        );
        assert_eq!(relationships(&sql)[0].kind, RelationKind::OneToOne);
    }

    #[test]
    fn test_exact_unique_index_is_one_to_one() {
        let sql = format!(
            "{} CREATE TABLE avatars (id INT PRIMARY KEY, user_id INT REFERENCES users(id));
               CREATE UNIQUE INDEX ux_avatar_user ON avatars (user_id);",
            USERS
        );
        assert_eq!(relationships(&sql)[0].kind, RelationKind::OneToOne);
    }

    #[test]
    fn test_partial_unique_stays_many_to_one() {
        let sql = format!(
            "{} CREATE TABLE posts (
                id INT PRIMARY KEY,
                user_id INT REFERENCES users(id),
                slug TEXT,
                UNIQUE (user_id, slug)
            );",
            USERS
        );
        assert_eq!(relationships(&sql)[0].kind, RelationKind::ManyToOne);
    }

    #[test]
    fn test_reference_to_junction_is_unresolved() {
        let sql = "CREATE TABLE a (id INT PRIMARY KEY);
                   CREATE TABLE b (id INT PRIMARY KEY);
                   CREATE TABLE ab (
                       a_id INT REFERENCES a(id),
                       b_id INT REFERENCES b(id),
                       PRIMARY KEY (a_id, b_id)
                   );
                   CREATE TABLE notes (
                       id INT PRIMARY KEY,
                       a_id INT, b_id INT,
                       FOREIGN KEY (a_id, b_id) REFERENCES ab (a_id, b_id)
                   );";
        let ex = extract(sql, Dialect::Generic);
        let schema = infer(ex.catalog);

        assert_eq!(schema.relationships.len(), 1);
        assert_eq!(schema.relationships[0].kind, RelationKind::ManyToMany);
        assert_eq!(schema.unresolved.len(), 1);
        assert_eq!(schema.unresolved[0].table, "notes");
    }
}
