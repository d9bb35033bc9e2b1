//! Relationship and dependency inference over an extracted catalog.

mod junction;
mod order;
mod relationships;

pub use junction::is_junction;
pub use order::{Ordering, generation_order};

use crate::ast::Catalog;
use crate::ir::{Schema, TableKind};
use tracing::{debug, warn};

/// Classify tables, derive relationships and compute the generation order.
pub fn infer(catalog: Catalog) -> Schema {
    let Catalog {
        tables,
        sequences,
        enums,
    } = catalog;

    let kinds: Vec<TableKind> = tables
        .iter()
        .map(|t| {
            if is_junction(t) {
                TableKind::Junction
            } else {
                TableKind::Entity
            }
        })
        .collect();

    let (relationships, unresolved) = relationships::derive(&tables, &kinds);

    let entities: Vec<&str> = tables
        .iter()
        .zip(&kinds)
        .filter(|(_, k)| **k == TableKind::Entity)
        .map(|(t, _)| t.name.as_str())
        .collect();
    let Ordering { order, cycles } = generation_order(&entities, &relationships);

    for cycle in &cycles {
        warn!(%cycle, "ordering cyclic tables by declaration");
    }
    for reference in &unresolved {
        warn!(%reference, "foreign key yields no relationship");
    }
    debug!(
        entities = entities.len(),
        junctions = tables.len() - entities.len(),
        relationships = relationships.len(),
        "inference finished"
    );

    Schema {
        tables,
        kinds,
        relationships,
        generation_order: order,
        cycles,
        enums,
        sequences,
        unresolved,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::RelationKind;
    use crate::sql::{Dialect, extract};

    #[test]
    fn test_shop_scenario() {
        let sql = r#"
            CREATE TABLE categories (id INT PRIMARY KEY, name TEXT NOT NULL);
            CREATE TABLE products (
                id INT PRIMARY KEY,
                category_id INT NOT NULL REFERENCES categories(id)
            );
            CREATE TABLE tags (id INT PRIMARY KEY);
            CREATE TABLE product_tags (
                product_id INT REFERENCES products(id),
                tag_id INT REFERENCES tags(id),
                PRIMARY KEY (product_id, tag_id)
            );
        "#;
        let schema = infer(extract(sql, Dialect::Auto).catalog);

        let entities: Vec<_> = schema.entity_tables().map(|t| t.name.as_str()).collect();
        assert_eq!(entities, vec!["categories", "products", "tags"]);
        assert!(schema.is_junction("product_tags"));

        assert_eq!(schema.relationships.len(), 2);
        assert_eq!(schema.relationships[0].kind, RelationKind::ManyToOne);
        assert_eq!(schema.relationships[0].owner, "products");
        assert_eq!(schema.relationships[1].kind, RelationKind::ManyToMany);
        assert_eq!(schema.relationships[1].owner, "products");
        assert_eq!(schema.relationships[1].target, "tags");
        assert_eq!(schema.relationships[1].via.as_deref(), Some("product_tags"));

        let pos = |n: &str| schema.generation_order.iter().position(|t| t == n);
        assert!(pos("categories") < pos("products"));
        assert_eq!(pos("product_tags"), None);
    }

    #[test]
    fn test_mutual_references_warn() {
        let sql = r#"
            CREATE TABLE a (id INT PRIMARY KEY, b_id INT REFERENCES b(id));
            CREATE TABLE b (id INT PRIMARY KEY, a_id INT REFERENCES a(id));
        "#;
        let schema = infer(extract(sql, Dialect::Auto).catalog);

        assert_eq!(schema.generation_order, vec!["a", "b"]);
        assert_eq!(schema.cycles.len(), 1);
        assert!(schema.is_deferred("a"));
        assert!(schema.is_deferred("b"));
    }
}
