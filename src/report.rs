//! Plain-text tables for the terminal: diagnostics, archive manifests,
//! registered targets and schema inspection.
//!
//! Cell widths are display widths, so CJK identifiers line up.

use crate::assembler::{ArchiveManifest, Origin};
use crate::error::Diagnostic;
use crate::ir::{Schema, TableKind};
use crate::mapping::TargetProfile;
use std::fmt::Write;
use unicode_width::UnicodeWidthStr;

const GAP: usize = 2;

pub fn text_width(text: &str) -> usize {
    UnicodeWidthStr::width(text)
}

/// Left-aligned columns; the last column is never padded.
#[derive(Debug, Clone, Default)]
pub struct TextTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl TextTable {
    pub fn new<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn row<I, S>(&mut self, cells: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rows.push(cells.into_iter().map(Into::into).collect());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn widths(&self) -> Vec<usize> {
        let mut widths: Vec<usize> = self.headers.iter().map(|h| text_width(h)).collect();
        for row in &self.rows {
            for (i, cell) in row.iter().enumerate() {
                let w = text_width(cell);
                match widths.get_mut(i) {
                    Some(current) => *current = (*current).max(w),
                    None => widths.push(w),
                }
            }
        }
        widths
    }

    pub fn render(&self) -> String {
        let widths = self.widths();
        let mut out = String::new();
        for line in std::iter::once(&self.headers).chain(&self.rows) {
            let last = line.len().saturating_sub(1);
            for (i, cell) in line.iter().enumerate() {
                out.push_str(cell);
                if i < last {
                    let pad = widths[i] - text_width(cell) + GAP;
                    out.extend(std::iter::repeat_n(' ', pad));
                }
            }
            out.truncate(out.trim_end_matches(' ').len());
            out.push('\n');
        }
        out
    }
}

pub fn diagnostics(diagnostics: &[Diagnostic]) -> String {
    if diagnostics.is_empty() {
        return "no diagnostics\n".to_string();
    }
    let mut table = TextTable::new(["SEVERITY", "KIND", "MESSAGE"]);
    for d in diagnostics {
        table.row([d.severity().to_string(), d.code().to_string(), d.to_string()]);
    }
    table.render()
}

pub fn manifest(manifest: &ArchiveManifest) -> String {
    let mut table = TextTable::new(["PATH", "ORIGIN", "BYTES"]);
    for entry in &manifest.entries {
        let origin = match entry.origin {
            Origin::Generated => "generated",
            Origin::Scaffolding => "scaffolding",
        };
        table.row([entry.path.clone(), origin.to_string(), entry.size.to_string()]);
    }
    let mut out = table.render();
    let _ = writeln!(
        out,
        "{} file(s), {} byte(s)",
        manifest.entries.len(),
        manifest.total_size()
    );
    out
}

pub fn targets<'a>(profiles: impl IntoIterator<Item = &'a TargetProfile>) -> String {
    let mut table = TextTable::new(["TARGET", "EXT", "FEATURES", "DEPENDENCIES"]);
    for profile in profiles {
        let features = profile.features.iter().cloned().collect::<Vec<_>>().join(",");
        let pins = profile
            .dependencies
            .iter()
            .map(|(name, version)| format!("{}@{}", name, version))
            .collect::<Vec<_>>()
            .join(" ");
        table.row([
            profile.key.to_string(),
            profile.extension.clone(),
            features,
            pins,
        ]);
    }
    table.render()
}

/// Tables, relationships and generation order of an inferred schema.
pub fn schema(schema: &Schema) -> String {
    let mut tables = TextTable::new(["TABLE", "KIND", "COLUMNS", "PRIMARY KEY"]);
    for (table, kind) in schema.tables.iter().zip(&schema.kinds) {
        let mut kind = match kind {
            TableKind::Entity => "entity".to_string(),
            TableKind::Junction => "junction".to_string(),
        };
        if schema.is_deferred(&table.name) {
            kind.push_str(" (deferred)");
        }
        tables.row([
            table.name.clone(),
            kind,
            table.columns.len().to_string(),
            table.primary_key.join(", "),
        ]);
    }

    let mut relations = TextTable::new(["OWNER", "KIND", "TARGET", "COLUMNS", "VIA"]);
    for r in &schema.relationships {
        relations.row([
            r.owner.clone(),
            r.kind.to_string(),
            r.target.clone(),
            r.columns.join(", "),
            r.via.clone().unwrap_or_default(),
        ]);
    }

    let mut out = tables.render();
    out.push('\n');
    if relations.is_empty() {
        out.push_str("no relationships\n");
    } else {
        out.push_str(&relations.render());
    }
    let _ = writeln!(out, "\norder: {}", schema.generation_order.join(" -> "));
    for cycle in &schema.cycles {
        let _ = writeln!(out, "cycle: {}", cycle.tables.join(" <-> "));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::ManifestEntry;
    use crate::error::CycleWarning;
    use crate::infer::infer;
    use crate::sql::{Dialect, extract};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_ascii_width() {
        assert_eq!(text_width("User"), 4);
    }

    #[test]
    fn test_unicode_width() {
        // 全角文字は幅2
        assert_eq!(text_width("ユーザー"), 8);
        assert_eq!(text_width("Userテスト"), 10);
    }

    #[test]
    fn test_wide_cells_align() {
        let mut table = TextTable::new(["NAME", "KIND"]);
        table.row(["ユーザー", "entity"]).row(["id", "int"]);
        assert_eq!(
            table.render(),
            "NAME      KIND\nユーザー  entity\nid        int\n"
        );
    }

    #[test]
    fn test_diagnostics_table() {
        let rendered = diagnostics(&[Diagnostic::Cycle(CycleWarning {
            tables: vec!["a".to_string(), "b".to_string()],
        })]);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("SEVERITY  KIND"));
        assert!(lines[1].starts_with("warning"));
        assert!(lines[1].ends_with("foreign-key cycle between a, b"));
        assert_eq!(diagnostics(&[]), "no diagnostics\n");
    }

    #[test]
    fn test_manifest_footer() {
        let entries = ArchiveManifest {
            entries: vec![ManifestEntry {
                path: "README.md".to_string(),
                size: 7,
                origin: Origin::Scaffolding,
                target: None,
            }],
        };
        let rendered = manifest(&entries);
        assert!(rendered.contains("README.md  scaffolding  7\n"));
        assert!(rendered.ends_with("1 file(s), 7 byte(s)\n"));
    }

    #[test]
    fn test_schema_summary() {
        let extraction = extract(
            "CREATE TABLE users (id INT PRIMARY KEY);
             CREATE TABLE posts (id INT PRIMARY KEY, user_id INT REFERENCES users(id));",
            Dialect::Generic,
        );
        let rendered = schema(&infer(extraction.catalog));
        assert!(rendered.contains("posts  many-to-one  users   user_id"));
        assert!(rendered.contains("order: users -> posts"));
    }
}
