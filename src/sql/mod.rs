//! SQL DDL extraction.
//!
//! `extract` turns a DDL script into a [`Catalog`](crate::ast::Catalog).
//! Statements are parsed independently, so one malformed statement is
//! reported and the rest still contribute.

mod dialect;
mod lexer;
mod parser;
mod resolve;
mod types;

pub use dialect::Dialect;
pub use parser::SqlParseError;
pub use resolve::Extraction;

use crate::error::ParseError;
use lexer::{Lexer, Spanned, Token};
use parser::StatementParser;
use resolve::{Origin, Resolver};
use tracing::{debug, warn};

const SNIPPET_LEN: usize = 60;

/// Extract tables, sequences and enum types from a DDL script.
pub fn extract(input: &str, dialect: Dialect) -> Extraction {
    let dialect = dialect.resolve(input);
    let tokens = Lexer::new(input).tokenize();
    debug!(%dialect, tokens = tokens.len(), "tokenized DDL");

    let mut resolver = Resolver::default();
    for (idx, statement) in split_statements(&tokens).into_iter().enumerate() {
        let origin = Origin {
            number: idx + 1,
            snippet: snippet(input, statement),
        };
        match StatementParser::new(statement, dialect).parse() {
            Ok(parsed) => resolver.add(origin, parsed),
            Err(e) => {
                let error = ParseError {
                    statement: origin.number,
                    snippet: origin.snippet,
                    reason: e.to_string(),
                };
                warn!(%error, "skipping statement");
                resolver.error(error);
            }
        }
    }

    let extraction = resolver.finish();
    debug!(
        tables = extraction.catalog.tables.len(),
        errors = extraction.errors.len(),
        unresolved = extraction.unresolved.len(),
        "extraction finished"
    );
    extraction
}

/// Split at `;`, dropping empty statements and the trailing `Eof`.
fn split_statements(tokens: &[Spanned]) -> Vec<&[Spanned]> {
    tokens
        .split(|s| matches!(s.token, Token::Semicolon | Token::Eof))
        .filter(|stmt| !stmt.is_empty())
        .collect()
}

/// Single-line excerpt of a statement's source text.
fn snippet(input: &str, statement: &[Spanned]) -> String {
    let (Some(first), Some(last)) = (statement.first(), statement.last()) else {
        return String::new();
    };
    let text = input
        .get(first.start..last.end)
        .unwrap_or_default()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    if text.chars().count() > SNIPPET_LEN {
        let cut: String = text.chars().take(SNIPPET_LEN).collect();
        format!("{}...", cut)
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ReferentialAction, SqlType};

    #[test]
    fn test_forward_reference_resolves() {
        let sql = r#"
            CREATE TABLE orders (
                id SERIAL PRIMARY KEY,
                customer_id INT NOT NULL REFERENCES customers
            );
            CREATE TABLE customers (id SERIAL PRIMARY KEY, name TEXT);
        "#;
        let ex = extract(sql, Dialect::Auto);

        assert!(ex.errors.is_empty());
        assert!(ex.unresolved.is_empty());
        let orders = ex.catalog.table("orders").unwrap();
        assert_eq!(orders.foreign_keys.len(), 1);
        assert_eq!(orders.foreign_keys[0].target_table, "customers");
        assert_eq!(orders.foreign_keys[0].target_columns, vec!["id"]);
    }

    #[test]
    fn test_bad_statement_does_not_abort() {
        let sql = "CREATE TABLE a (id INT PRIMARY KEY);\n\
                   CREATE TABLE broken (id INT PRIMARY KEY, FOREIGN KEY (nope) REFERENCES a(id));\n\
                   CREATE TABLE b (id INT PRIMARY KEY);";
        let ex = extract(sql, Dialect::Generic);

        assert_eq!(ex.catalog.tables.len(), 2);
        assert_eq!(ex.errors.len(), 1);
        assert_eq!(ex.errors[0].statement, 2);
        assert!(ex.errors[0].reason.contains("nope"));
        assert!(ex.errors[0].snippet.starts_with("CREATE TABLE broken"));
        assert!(ex.errors[0].snippet.ends_with("..."));
    }

    #[test]
    fn test_references_ignore_identifier_case() {
        let sql = "
            CREATE TABLE Users (Id INT PRIMARY KEY, Email TEXT);
            CREATE TABLE orders (
                id INT PRIMARY KEY,
                user_id INT REFERENCES users(id),
                UNIQUE (USER_ID)
            );
            ALTER TABLE ORDERS ADD CONSTRAINT fk_owner FOREIGN KEY (User_Id) REFERENCES USERS;
            CREATE INDEX users_email ON users (email);
        ";
        let ex = extract(sql, Dialect::Postgres);

        assert!(ex.errors.is_empty(), "{:?}", ex.errors);
        assert!(ex.unresolved.is_empty(), "{:?}", ex.unresolved);
        let orders = ex.catalog.table("orders").unwrap();
        assert_eq!(orders.foreign_keys.len(), 2);
        for fk in &orders.foreign_keys {
            assert_eq!(fk.columns, vec!["user_id"]);
            assert_eq!(fk.target_table, "Users");
            assert_eq!(fk.target_columns, vec!["Id"]);
        }
        assert_eq!(orders.uniques[0].columns, vec!["user_id"]);
        assert_eq!(ex.catalog.table("USERS").unwrap().indexes[0].columns, vec!["Email"]);
    }

    #[test]
    fn test_missing_target_is_unresolved() {
        let sql = "CREATE TABLE a (id INT PRIMARY KEY, ghost_id INT REFERENCES ghosts(id));";
        let ex = extract(sql, Dialect::Generic);

        assert!(ex.errors.is_empty());
        assert!(ex.catalog.tables[0].foreign_keys.is_empty());
        assert_eq!(ex.unresolved.len(), 1);
        assert_eq!(ex.unresolved[0].target, "ghosts");
    }

    #[test]
    fn test_pg_dump_style_alters() {
        let sql = r#"
            -- PostgreSQL database dump
            CREATE TYPE public.status AS ENUM ('draft', 'live');
            CREATE TABLE public.posts (
                id integer NOT NULL,
                author_id integer,
                state public.status NOT NULL
            );
            CREATE TABLE public.authors (id integer NOT NULL, email text);
            CREATE SEQUENCE public.posts_id_seq START WITH 1 INCREMENT BY 1;
            ALTER TABLE ONLY public.posts ALTER COLUMN id SET DEFAULT nextval('public.posts_id_seq'::regclass);
            ALTER TABLE ONLY public.posts ADD CONSTRAINT posts_pkey PRIMARY KEY (id);
            ALTER TABLE ONLY public.authors ADD CONSTRAINT authors_pkey PRIMARY KEY (id);
            CREATE UNIQUE INDEX authors_email_key ON public.authors USING btree (email);
            ALTER TABLE ONLY public.posts
                ADD CONSTRAINT posts_author_fk FOREIGN KEY (author_id) REFERENCES public.authors(id) ON DELETE SET NULL;
        "#;
        let ex = extract(sql, Dialect::Auto);

        assert!(ex.errors.is_empty(), "{:?}", ex.errors);
        let posts = ex.catalog.table("posts").unwrap();
        assert_eq!(posts.primary_key, vec!["id"]);
        assert!(posts.columns[0].auto_increment);
        assert!(!posts.columns[0].nullable);
        assert_eq!(posts.columns[2].data_type, SqlType::Enum("status".to_string()));
        assert_eq!(posts.foreign_keys[0].on_delete, ReferentialAction::SetNull);

        let authors = ex.catalog.table("authors").unwrap();
        assert!(authors.indexes[0].unique);
        assert_eq!(ex.catalog.sequences.len(), 1);
        assert_eq!(ex.catalog.enums[0].labels, vec!["draft", "live"]);
    }

    #[test]
    fn test_alter_on_unknown_table_is_error() {
        let sql = "CREATE TABLE a (id INT);\nALTER TABLE missing ADD PRIMARY KEY (id);";
        let ex = extract(sql, Dialect::Generic);

        assert_eq!(ex.errors.len(), 1);
        assert_eq!(ex.errors[0].statement, 2);
        assert!(ex.errors[0].reason.contains("missing"));
    }

    #[test]
    fn test_duplicate_table() {
        let sql = "CREATE TABLE a (id INT);\nCREATE TABLE IF NOT EXISTS a (id INT);\nCREATE TABLE a (x INT);";
        let ex = extract(sql, Dialect::Generic);

        assert_eq!(ex.catalog.tables.len(), 1);
        assert_eq!(ex.errors.len(), 1);
        assert_eq!(ex.errors[0].statement, 3);
    }

    #[test]
    fn test_skips_non_ddl() {
        let sql = "SET search_path = public;\nINSERT INTO t VALUES (1);\nCREATE TABLE t (id INT);\n;;";
        let ex = extract(sql, Dialect::Generic);

        assert!(ex.errors.is_empty());
        assert_eq!(ex.catalog.tables.len(), 1);
    }
}
