use crate::ast::{ForeignKey, Table};

/// A table is a junction when it only realizes a many-to-many link:
/// a composite primary key made entirely of foreign-key columns, foreign
/// keys to exactly two distinct other tables, and no other columns.
pub fn is_junction(table: &Table) -> bool {
    if table.primary_key.len() < 2 {
        return false;
    }
    if !table
        .primary_key
        .iter()
        .all(|c| table.is_foreign_key_column(c))
    {
        return false;
    }

    let targets = distinct_targets(table);
    if targets.len() != 2 || targets.iter().any(|t| t.target_table == table.name) {
        return false;
    }

    table
        .columns
        .iter()
        .all(|c| table.is_primary_key_column(&c.name) || table.is_foreign_key_column(&c.name))
}

/// First foreign key to each distinct target, in declaration order.
pub fn distinct_targets(table: &Table) -> Vec<&ForeignKey> {
    let mut seen: Vec<&ForeignKey> = Vec::new();
    for fk in &table.foreign_keys {
        if !seen.iter().any(|s| s.target_table == fk.target_table) {
            seen.push(fk);
        }
    }
    seen
}
