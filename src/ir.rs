//! Enriched schema: tables plus derived relationships, classification and
//! generation order. Built once by [`crate::infer`], read-only afterwards.

use crate::ast::{EnumType, ReferentialAction, Sequence, Table};
use crate::error::{CycleWarning, UnresolvedReference};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    Entity,
    Junction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationKind {
    ManyToOne,
    OneToOne,
    ManyToMany,
    /// Only produced by inverse views; never stored.
    OneToMany,
}

impl RelationKind {
    /// Kind as seen from the target side.
    pub fn inverse(self) -> Self {
        match self {
            Self::ManyToOne => Self::OneToMany,
            Self::OneToMany => Self::ManyToOne,
            other => other,
        }
    }

    /// Whether the side holding this view sees a collection.
    pub fn is_collection(self) -> bool {
        matches!(self, Self::ManyToMany | Self::OneToMany)
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ManyToOne => "many-to-one",
            Self::OneToOne => "one-to-one",
            Self::ManyToMany => "many-to-many",
            Self::OneToMany => "one-to-many",
        })
    }
}

/// A stored relationship edge.
///
/// For `ManyToOne` / `OneToOne`, `columns` are the owner's foreign-key
/// columns and `target_columns` the referenced target columns. For
/// `ManyToMany`, `via` names the junction table and both column lists are
/// junction columns: `columns` point at the owner, `target_columns` at the
/// target.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Relationship {
    pub kind: RelationKind,
    pub owner: String,
    pub target: String,
    pub columns: Vec<String>,
    pub target_columns: Vec<String>,
    pub via: Option<String>,
    pub on_delete: ReferentialAction,
}

impl Relationship {
    pub fn is_self_reference(&self) -> bool {
        self.owner == self.target
    }
}

/// A relationship seen from one of its endpoints.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelationView<'a> {
    pub kind: RelationKind,
    /// The table this view belongs to.
    pub from: &'a str,
    /// The table on the other end.
    pub to: &'a str,
    pub relationship: &'a Relationship,
    /// `true` when `from` is the stored target.
    pub inverse: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Schema {
    /// Every table, in declaration order.
    pub tables: Vec<Table>,
    pub kinds: Vec<TableKind>,
    pub relationships: Vec<Relationship>,
    /// Entity tables only, dependencies first.
    pub generation_order: Vec<String>,
    pub cycles: Vec<CycleWarning>,
    pub enums: Vec<EnumType>,
    pub sequences: Vec<Sequence>,
    /// Foreign keys that could not become relationships.
    pub unresolved: Vec<UnresolvedReference>,
}

impl Schema {
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn kind(&self, name: &str) -> Option<TableKind> {
        self.tables
            .iter()
            .position(|t| t.name == name)
            .and_then(|i| self.kinds.get(i).copied())
    }

    pub fn is_junction(&self, name: &str) -> bool {
        self.kind(name) == Some(TableKind::Junction)
    }

    /// Entity tables in declaration order.
    pub fn entity_tables(&self) -> impl Iterator<Item = &Table> {
        self.tables
            .iter()
            .zip(&self.kinds)
            .filter(|(_, k)| **k == TableKind::Entity)
            .map(|(t, _)| t)
    }

    /// Entity tables in generation order.
    pub fn ordered_entities(&self) -> impl Iterator<Item = &Table> {
        self.generation_order
            .iter()
            .filter_map(|name| self.table(name))
    }

    /// Whether the table sits on a foreign-key cycle.
    pub fn is_deferred(&self, name: &str) -> bool {
        self.cycles
            .iter()
            .any(|c| c.tables.iter().any(|t| t == name))
    }

    /// Stored relationships owned by `name`.
    pub fn outgoing<'a>(&'a self, name: &'a str) -> impl Iterator<Item = RelationView<'a>> {
        self.relationships
            .iter()
            .filter(move |r| r.owner == name)
            .map(|r| RelationView {
                kind: r.kind,
                from: &r.owner,
                to: &r.target,
                relationship: r,
                inverse: false,
            })
    }

    /// Inverse views of relationships that target `name`.
    pub fn incoming<'a>(&'a self, name: &'a str) -> impl Iterator<Item = RelationView<'a>> {
        self.relationships
            .iter()
            .filter(move |r| r.target == name)
            .map(|r| RelationView {
                kind: r.kind.inverse(),
                from: &r.target,
                to: &r.owner,
                relationship: r,
                inverse: true,
            })
    }

    /// Outgoing then incoming views for one table.
    pub fn relations_of<'a>(&'a self, name: &'a str) -> Vec<RelationView<'a>> {
        self.outgoing(name).chain(self.incoming(name)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rel(kind: RelationKind, owner: &str, target: &str) -> Relationship {
        Relationship {
            kind,
            owner: owner.to_string(),
            target: target.to_string(),
            columns: vec![format!("{}_id", target)],
            target_columns: vec!["id".to_string()],
            via: None,
            on_delete: ReferentialAction::NoAction,
        }
    }

    fn schema() -> Schema {
        Schema {
            tables: vec![Table::new("categories"), Table::new("products"), Table::new("links")],
            kinds: vec![TableKind::Entity, TableKind::Entity, TableKind::Junction],
            relationships: vec![
                rel(RelationKind::ManyToOne, "products", "categories"),
                rel(RelationKind::ManyToOne, "categories", "categories"),
            ],
            generation_order: vec!["categories".to_string(), "products".to_string()],
            ..Schema::default()
        }
    }

    #[test]
    fn test_inverse_view() {
        let schema = schema();
        let incoming: Vec<_> = schema.incoming("categories").collect();

        assert_eq!(incoming.len(), 2);
        assert_eq!(incoming[0].kind, RelationKind::OneToMany);
        assert_eq!(incoming[0].to, "products");
        assert!(incoming[0].inverse);
        assert!(incoming[1].relationship.is_self_reference());
    }

    #[test]
    fn test_classification_queries() {
        let schema = schema();

        assert!(schema.is_junction("links"));
        assert!(!schema.is_junction("products"));
        assert_eq!(schema.kind("missing"), None);
        let entities: Vec<_> = schema.entity_tables().map(|t| t.name.as_str()).collect();
        assert_eq!(entities, vec!["categories", "products"]);
        assert_eq!(schema.relations_of("products").len(), 1);
    }

    #[test]
    fn test_kind_inverse() {
        assert_eq!(RelationKind::ManyToOne.inverse(), RelationKind::OneToMany);
        assert_eq!(RelationKind::OneToOne.inverse(), RelationKind::OneToOne);
        assert!(RelationKind::ManyToMany.is_collection());
        assert!(!RelationKind::OneToOne.is_collection());
    }
}
