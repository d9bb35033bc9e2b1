//! Statement parser for DDL scripts.
//!
//! Each statement is parsed on its own token slice; cross-statement facts
//! (foreign-key targets, ALTER TABLE, CREATE INDEX) are applied later by
//! [`super::resolve`].

use super::dialect::Dialect;
use super::lexer::{Spanned, Token};
use super::types::{canonicalize, classify_params};
use crate::ast::{
    Column, EnumType, Index, ReferentialAction, Sequence, SqlType, Table, UniqueConstraint,
};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SqlParseError {
    #[error("unexpected token `{0}`")]
    UnexpectedToken(Token),
    #[error("expected {expected}, found `{found}`")]
    Expected { expected: &'static str, found: Token },
    #[error("unexpected end of statement")]
    UnexpectedEof,
    #[error("unknown column `{column}` in {context}")]
    UnknownColumn {
        column: String,
        context: &'static str,
    },
    #[error("column `{0}` has no type")]
    MissingType(String),
    #[error("column `{0}` is declared more than once")]
    DuplicateColumn(String),
    #[error("table `{0}` declares more than one primary key")]
    MultiplePrimaryKeys(String),
    #[error("table `{0}` has no columns")]
    NoColumns(String),
    #[error("invalid number `{0}`")]
    InvalidNumber(String),
    #[error("empty column list")]
    EmptyColumnList,
}

type Result<T> = std::result::Result<T, SqlParseError>;

/// A foreign key whose target may not be declared yet.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingForeignKey {
    pub name: Option<String>,
    pub columns: Vec<String>,
    pub target_table: String,
    /// `None` when the reference has no column list; resolves to the target's primary key.
    pub target_columns: Option<Vec<String>>,
    pub on_delete: ReferentialAction,
    pub on_update: ReferentialAction,
}

/// A column definition with the facts that belong to other collections.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedColumn {
    pub column: Column,
    pub foreign_key: Option<PendingForeignKey>,
    pub inline_enum: Option<EnumType>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AlterAction {
    AddColumn(ParsedColumn),
    AddForeignKey(PendingForeignKey),
    AddUnique(UniqueConstraint),
    AddPrimaryKey(Vec<String>),
    AddIndex(Index),
    SetDefault { column: String, expr: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    CreateTable {
        table: Table,
        foreign_keys: Vec<PendingForeignKey>,
        inline_enums: Vec<EnumType>,
        if_not_exists: bool,
    },
    /// `index` is `None` for expression indexes, which carry no column set.
    CreateIndex { table: String, index: Option<Index> },
    AlterTable {
        table: String,
        actions: Vec<AlterAction>,
    },
    CreateSequence(Sequence),
    CreateEnum(EnumType),
    Skipped,
}

enum TableConstraint {
    PrimaryKey(Vec<String>),
    Unique(UniqueConstraint),
    ForeignKey(PendingForeignKey),
    Index(Index),
    Ignored,
}

/// Words that may continue a multi-word type name.
const TYPE_CONTINUATIONS: &[&str] = &[
    "precision", "varying", "with", "without", "time", "zone", "unsigned", "signed",
    "zerofill",
];

static EOF: Token = Token::Eof;

pub struct StatementParser<'a> {
    tokens: &'a [Spanned],
    pos: usize,
    dialect: Dialect,
}

impl<'a> StatementParser<'a> {
    pub fn new(tokens: &'a [Spanned], dialect: Dialect) -> Self {
        Self {
            tokens,
            pos: 0,
            dialect,
        }
    }

    fn current(&self) -> &'a Token {
        self.peek(0)
    }

    fn peek(&self, n: usize) -> &'a Token {
        self.tokens
            .get(self.pos + n)
            .map(|s| &s.token)
            .unwrap_or(&EOF)
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn expect(&mut self, token: Token, expected: &'static str) -> Result<()> {
        if self.current() == &token {
            self.advance();
            Ok(())
        } else {
            Err(self.expected(expected))
        }
    }

    fn expect_word(&mut self, word: &str, expected: &'static str) -> Result<()> {
        if self.current().is_word(word) {
            self.advance();
            Ok(())
        } else {
            Err(self.expected(expected))
        }
    }

    fn expected(&self, expected: &'static str) -> SqlParseError {
        match self.current() {
            Token::Eof => SqlParseError::UnexpectedEof,
            found => SqlParseError::Expected {
                expected,
                found: found.clone(),
            },
        }
    }

    pub fn parse(mut self) -> Result<Statement> {
        match self.current() {
            Token::Create => {
                self.advance();
                self.parse_create()
            }
            Token::Alter => {
                self.advance();
                self.parse_alter()
            }
            _ => Ok(Statement::Skipped),
        }
    }

    fn parse_create(&mut self) -> Result<Statement> {
        // CREATE [OR REPLACE] [GLOBAL | LOCAL] [TEMP | TEMPORARY | UNLOGGED]
        while ["OR", "REPLACE", "GLOBAL", "LOCAL", "TEMP", "TEMPORARY", "UNLOGGED"]
            .iter()
            .any(|w| self.current().is_word(w))
        {
            self.advance();
        }

        match self.current() {
            Token::Table => {
                self.advance();
                self.parse_create_table()
            }
            Token::Unique => {
                self.advance();
                self.expect(Token::Index, "INDEX")?;
                self.parse_create_index(true)
            }
            Token::Index => {
                self.advance();
                self.parse_create_index(false)
            }
            Token::Sequence => {
                self.advance();
                self.parse_create_sequence()
            }
            t if t.is_word("TYPE") => {
                self.advance();
                self.parse_create_type()
            }
            _ => Ok(Statement::Skipped),
        }
    }

    /// Consumes `IF NOT EXISTS` / `IF EXISTS`; returns whether it was there.
    fn skip_if_exists(&mut self) -> Result<bool> {
        if self.current() != &Token::If {
            return Ok(false);
        }
        self.advance();
        if self.current() == &Token::Not {
            self.advance();
        }
        self.expect(Token::Exists, "EXISTS")?;
        Ok(true)
    }

    fn take_name(&mut self, expected: &'static str) -> Result<String> {
        let name = match self.current() {
            Token::Ident(s) => s.clone(),
            tok if is_keyword(tok) => tok.to_string().to_lowercase(),
            _ => return Err(self.expected(expected)),
        };
        self.advance();
        Ok(name)
    }

    fn take_name_parts(&mut self, expected: &'static str) -> Result<Vec<String>> {
        let mut parts = vec![self.take_name(expected)?];
        while self.current() == &Token::Dot {
            self.advance();
            parts.push(self.take_name(expected)?);
        }
        Ok(parts)
    }

    /// `schema.name` keeps the last segment.
    fn take_qualified_name(&mut self, expected: &'static str) -> Result<String> {
        let mut parts = self.take_name_parts(expected)?;
        Ok(parts.pop().unwrap_or_default())
    }

    fn take_integer(&mut self) -> Result<i64> {
        match self.current() {
            Token::Num(n) => {
                let value = n
                    .parse::<i64>()
                    .map_err(|_| SqlParseError::InvalidNumber(n.clone()))?;
                self.advance();
                Ok(value)
            }
            _ => Err(self.expected("number")),
        }
    }

    fn parse_create_table(&mut self) -> Result<Statement> {
        let if_not_exists = self.skip_if_exists()?;
        let name = self.take_qualified_name("table name")?;

        if self.current() != &Token::LParen {
            // CREATE TABLE ... AS SELECT, PARTITION OF, ...
            return Ok(Statement::Skipped);
        }
        self.advance();

        let mut table = Table::new(&name);
        let mut foreign_keys = Vec::new();
        let mut inline_enums = Vec::new();
        let mut constraints = Vec::new();

        loop {
            match self.current() {
                Token::RParen => {
                    self.advance();
                    break;
                }
                Token::Eof => return Err(SqlParseError::UnexpectedEof),
                Token::Comma => {
                    self.advance();
                }
                Token::Constraint => {
                    self.advance();
                    let constraint_name = self.take_name("constraint name")?;
                    constraints.push(self.parse_table_constraint(Some(constraint_name))?);
                }
                Token::Primary | Token::Unique | Token::Foreign | Token::Check => {
                    constraints.push(self.parse_table_constraint(None)?);
                }
                Token::Index | Token::Key if self.looks_like_index_def() => {
                    self.advance();
                    constraints.push(TableConstraint::Index(self.parse_index_body(false)?));
                }
                t if ["FULLTEXT", "SPATIAL", "EXCLUDE", "LIKE", "PERIOD"]
                    .iter()
                    .any(|w| t.is_word(w)) =>
                {
                    self.skip_element();
                }
                _ => {
                    let parsed = self.parse_column(&name)?;
                    if table.has_column(&parsed.column.name) {
                        return Err(SqlParseError::DuplicateColumn(parsed.column.name));
                    }
                    foreign_keys.extend(parsed.foreign_key);
                    inline_enums.extend(parsed.inline_enum);
                    table.columns.push(parsed.column);
                }
            }
        }

        if table.columns.is_empty() {
            return Err(SqlParseError::NoColumns(name));
        }

        let inline_pk: Vec<String> = table
            .columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.clone())
            .collect();
        if inline_pk.len() > 1 {
            return Err(SqlParseError::MultiplePrimaryKeys(name));
        }
        table.primary_key = inline_pk;

        // Table-level constraints see every column of the statement.
        for constraint in constraints {
            match constraint {
                TableConstraint::PrimaryKey(cols) => {
                    let cols = require_columns(&table, &cols, "PRIMARY KEY")?;
                    if !table.primary_key.is_empty() {
                        return Err(SqlParseError::MultiplePrimaryKeys(name));
                    }
                    table.primary_key = cols;
                }
                TableConstraint::Unique(mut unique) => {
                    unique.columns = require_columns(&table, &unique.columns, "UNIQUE")?;
                    table.uniques.push(unique);
                }
                TableConstraint::ForeignKey(mut fk) => {
                    fk.columns = require_columns(&table, &fk.columns, "FOREIGN KEY")?;
                    foreign_keys.push(fk);
                }
                TableConstraint::Index(mut index) => {
                    index.columns = require_columns(&table, &index.columns, "INDEX")?;
                    table.indexes.push(index);
                }
                TableConstraint::Ignored => {}
            }
        }

        mark_primary_key(&mut table);

        Ok(Statement::CreateTable {
            table,
            foreign_keys,
            inline_enums,
            if_not_exists,
        })
    }

    /// MySQL `KEY name (cols)` versus a column that happens to be called `key`.
    fn looks_like_index_def(&self) -> bool {
        match (self.peek(1), self.peek(2), self.peek(3)) {
            (Token::LParen, _, _) => true,
            (Token::Ident(_), Token::LParen, Token::Ident(_)) => true,
            (Token::Ident(_), t, _) if t.is_word("USING") => true,
            _ => false,
        }
    }

    fn parse_table_constraint(&mut self, name: Option<String>) -> Result<TableConstraint> {
        match self.current() {
            Token::Primary => {
                self.advance();
                self.expect(Token::Key, "KEY")?;
                Ok(TableConstraint::PrimaryKey(self.parse_column_list()?))
            }
            Token::Unique => {
                self.advance();
                if matches!(self.current(), Token::Key | Token::Index) {
                    self.advance();
                }
                // MySQL: UNIQUE KEY uk_name (cols)
                let index_name = match (self.current(), self.peek(1)) {
                    (Token::Ident(n), Token::LParen) => {
                        let n = n.clone();
                        self.advance();
                        Some(n)
                    }
                    _ => None,
                };
                let columns = self.parse_column_list()?;
                self.skip_constraint_tail();
                Ok(TableConstraint::Unique(UniqueConstraint {
                    name: name.or(index_name),
                    columns,
                }))
            }
            Token::Foreign => {
                self.advance();
                self.expect(Token::Key, "KEY")?;
                // MySQL allows an index name here
                let index_name = match self.current() {
                    Token::Ident(n) => {
                        let n = n.clone();
                        self.advance();
                        Some(n)
                    }
                    _ => None,
                };
                let columns = self.parse_column_list()?;
                self.expect(Token::References, "REFERENCES")?;
                let fk = self.parse_reference(columns, name.or(index_name))?;
                Ok(TableConstraint::ForeignKey(fk))
            }
            Token::Check => {
                self.advance();
                self.skip_parenthesized()?;
                self.skip_constraint_tail();
                Ok(TableConstraint::Ignored)
            }
            Token::Index | Token::Key => {
                self.advance();
                Ok(TableConstraint::Index(self.parse_index_body(false)?))
            }
            t if t.is_word("EXCLUDE") => {
                self.skip_element();
                Ok(TableConstraint::Ignored)
            }
            _ => Err(self.expected("constraint")),
        }
    }

    /// `[name] [USING method] (cols)` after `INDEX` / `KEY`.
    fn parse_index_body(&mut self, unique: bool) -> Result<Index> {
        let name = match self.current() {
            Token::Ident(n) if !n.eq_ignore_ascii_case("USING") => {
                let n = n.clone();
                self.advance();
                Some(n)
            }
            _ => None,
        };
        if self.current().is_word("USING") {
            self.advance();
            self.take_name("index method")?;
        }
        let columns = self.parse_column_list()?;
        Ok(Index {
            name,
            columns,
            unique,
        })
    }

    fn parse_column(&mut self, table: &str) -> Result<ParsedColumn> {
        let name = self.take_name("column name")?;
        let parsed_type = self.parse_type(table, &name)?;
        let params = classify_params(&parsed_type.data_type, &parsed_type.args);

        let mut column = Column {
            name: name.clone(),
            declared_type: parsed_type.declared,
            data_type: parsed_type.data_type,
            nullable: true,
            primary_key: false,
            unique: false,
            auto_increment: parsed_type.auto_increment,
            default: None,
            length: params.length,
            precision: params.precision,
            scale: params.scale,
            comment: None,
        };
        let mut foreign_key = None;

        loop {
            match self.current() {
                Token::Comma | Token::RParen | Token::Eof => break,
                Token::Primary => {
                    self.advance();
                    self.expect(Token::Key, "KEY")?;
                    column.primary_key = true;
                    column.nullable = false;
                }
                Token::Not => {
                    self.advance();
                    match self.current() {
                        Token::Null => {
                            self.advance();
                            column.nullable = false;
                        }
                        t if t.is_word("DEFERRABLE") => self.advance(),
                        _ => return Err(self.expected("NULL")),
                    }
                }
                Token::Null => {
                    self.advance();
                    column.nullable = true;
                }
                Token::Unique => {
                    self.advance();
                    if self.current() == &Token::Key {
                        self.advance();
                    }
                    column.unique = true;
                }
                Token::Default => {
                    self.advance();
                    let expr = self.parse_default_expr()?;
                    if expr.to_lowercase().contains("nextval(") {
                        column.auto_increment = true;
                    }
                    column.default = Some(expr);
                }
                Token::References => {
                    self.advance();
                    foreign_key = Some(self.parse_reference(vec![name.clone()], None)?);
                }
                Token::Check => {
                    self.advance();
                    self.skip_parenthesized()?;
                }
                Token::Collate => {
                    self.advance();
                    self.take_qualified_name("collation")?;
                }
                Token::Comment => {
                    self.advance();
                    if let Token::Str(s) = self.current() {
                        column.comment = Some(s.clone());
                        self.advance();
                    }
                }
                Token::Increment => {
                    self.advance();
                    column.auto_increment = true;
                }
                Token::Constraint => {
                    self.advance();
                    self.take_name("constraint name")?;
                }
                Token::On => {
                    // MySQL: ON UPDATE CURRENT_TIMESTAMP
                    self.advance();
                    if matches!(self.current(), Token::Update | Token::Delete) {
                        self.advance();
                    }
                    self.advance();
                    if self.current() == &Token::LParen {
                        self.skip_parenthesized()?;
                    }
                }
                Token::LParen => self.skip_parenthesized()?,
                t if t.is_word("IDENTITY") => {
                    self.advance();
                    column.auto_increment = true;
                }
                _ => self.advance(),
            }
        }

        Ok(ParsedColumn {
            column,
            foreign_key,
            inline_enum: parsed_type.inline_enum,
        })
    }

    fn parse_type(&mut self, table: &str, column: &str) -> Result<ParsedType> {
        let mut first = match self.current() {
            Token::Ident(s) | Token::Serial(s) => s.clone(),
            _ => return Err(SqlParseError::MissingType(column.to_string())),
        };
        self.advance();
        while self.current() == &Token::Dot {
            self.advance();
            first = self.take_name("type name")?;
        }

        let mut words = vec![first.to_lowercase()];
        let mut declared = first;
        let mut args: Vec<u32> = Vec::new();
        let mut labels: Vec<String> = Vec::new();
        let mut array_depth = 0;

        loop {
            match self.current() {
                Token::LParen => {
                    self.advance();
                    let mut raw = Vec::new();
                    loop {
                        match self.current() {
                            Token::RParen => {
                                self.advance();
                                break;
                            }
                            Token::Eof => return Err(SqlParseError::UnexpectedEof),
                            Token::Num(n) => {
                                let value = n
                                    .parse::<u32>()
                                    .map_err(|_| SqlParseError::InvalidNumber(n.clone()))?;
                                args.push(value);
                                raw.push(n.clone());
                            }
                            Token::Str(s) => {
                                labels.push(s.clone());
                                raw.push(Token::Str(s.clone()).to_string());
                            }
                            Token::Comma => {}
                            other => raw.push(other.to_string()),
                        }
                        self.advance();
                    }
                    declared.push_str(&format!("({})", raw.join(",")));
                }
                Token::Ident(w) if TYPE_CONTINUATIONS.contains(&w.to_lowercase().as_str()) => {
                    words.push(w.to_lowercase());
                    declared.push(' ');
                    declared.push_str(w);
                    self.advance();
                }
                Token::Brackets => {
                    array_depth += 1;
                    declared.push_str("[]");
                    self.advance();
                }
                _ => break,
            }
        }

        let base = words.join(" ");
        let (mut data_type, auto_increment, inline_enum) =
            if (base == "enum" || base == "set") && !labels.is_empty() {
                let enum_name = format!("{}_{}", table, column);
                let inline = EnumType {
                    name: enum_name.clone(),
                    labels,
                };
                (SqlType::Enum(enum_name), false, Some(inline))
            } else {
                let canonical = canonicalize(&base, &args, self.dialect);
                (canonical.data_type, canonical.auto_increment, None)
            };
        for _ in 0..array_depth {
            data_type = SqlType::Array(Box::new(data_type));
        }

        Ok(ParsedType {
            declared,
            data_type,
            args,
            auto_increment,
            inline_enum,
        })
    }

    fn parse_default_expr(&mut self) -> Result<String> {
        let mut parts: Vec<Token> = Vec::new();
        let mut depth = 0usize;

        loop {
            let tok = self.current();
            match tok {
                Token::Eof => break,
                Token::Comma | Token::RParen if depth == 0 => break,
                Token::LParen => depth += 1,
                Token::RParen => depth -= 1,
                t if depth == 0 && !parts.is_empty() && ends_default(t) => break,
                _ => {}
            }
            parts.push(tok.clone());
            self.advance();
        }

        if parts.is_empty() {
            return Err(self.expected("default value"));
        }
        Ok(render_tokens(&parts))
    }

    fn parse_reference(
        &mut self,
        columns: Vec<String>,
        name: Option<String>,
    ) -> Result<PendingForeignKey> {
        let target_table = self.take_qualified_name("referenced table")?;
        let target_columns = if self.current() == &Token::LParen {
            Some(self.parse_column_list()?)
        } else {
            None
        };
        let (on_delete, on_update) = self.parse_referential_actions()?;

        Ok(PendingForeignKey {
            name,
            columns,
            target_table,
            target_columns,
            on_delete,
            on_update,
        })
    }

    fn parse_referential_actions(&mut self) -> Result<(ReferentialAction, ReferentialAction)> {
        let mut on_delete = ReferentialAction::default();
        let mut on_update = ReferentialAction::default();

        loop {
            match self.current() {
                Token::On => {
                    self.advance();
                    let is_delete = match self.current() {
                        Token::Delete => true,
                        Token::Update => false,
                        _ => return Err(self.expected("DELETE or UPDATE")),
                    };
                    self.advance();
                    let action = self.parse_action()?;
                    if is_delete {
                        on_delete = action;
                    } else {
                        on_update = action;
                    }
                }
                t if t.is_word("MATCH") => {
                    self.advance();
                    self.advance();
                }
                t if t.is_word("DEFERRABLE") || t.is_word("INITIALLY") => {
                    self.advance();
                    if self.current().is_word("DEFERRED") || self.current().is_word("IMMEDIATE")
                    {
                        self.advance();
                    }
                }
                Token::Not if self.peek(1).is_word("DEFERRABLE") => {
                    self.advance();
                    self.advance();
                }
                _ => break,
            }
        }

        Ok((on_delete, on_update))
    }

    fn parse_action(&mut self) -> Result<ReferentialAction> {
        let action = match self.current() {
            Token::Cascade => ReferentialAction::Cascade,
            Token::Restrict => ReferentialAction::Restrict,
            t if t.is_word("SET") => {
                self.advance();
                match self.current() {
                    Token::Null => ReferentialAction::SetNull,
                    Token::Default => ReferentialAction::SetDefault,
                    _ => return Err(self.expected("NULL or DEFAULT")),
                }
            }
            t if t.is_word("NO") => {
                self.advance();
                if !self.current().is_word("ACTION") {
                    return Err(self.expected("ACTION"));
                }
                ReferentialAction::NoAction
            }
            _ => return Err(self.expected("referential action")),
        };
        self.advance();
        Ok(action)
    }

    fn parse_column_list(&mut self) -> Result<Vec<String>> {
        self.expect(Token::LParen, "column list")?;
        let mut cols = Vec::new();

        loop {
            match self.current() {
                Token::RParen => {
                    self.advance();
                    break;
                }
                Token::Eof => return Err(SqlParseError::UnexpectedEof),
                Token::Comma => self.advance(),
                _ => {
                    cols.push(self.take_name("column name")?);
                    // MySQL prefix length, ASC / DESC, NULLS FIRST
                    loop {
                        match self.current() {
                            Token::LParen => self.skip_parenthesized()?,
                            Token::Ident(w) if is_sort_word(w) => self.advance(),
                            _ => break,
                        }
                    }
                }
            }
        }

        if cols.is_empty() {
            return Err(SqlParseError::EmptyColumnList);
        }
        Ok(cols)
    }

    fn parse_create_index(&mut self, unique: bool) -> Result<Statement> {
        if self.current().is_word("CONCURRENTLY") {
            self.advance();
        }
        self.skip_if_exists()?;
        let name = if self.current() != &Token::On {
            Some(self.take_qualified_name("index name")?)
        } else {
            None
        };
        self.expect(Token::On, "ON")?;
        if self.current() == &Token::Only {
            self.advance();
        }
        let table = self.take_qualified_name("table name")?;
        if self.current().is_word("USING") {
            self.advance();
            self.take_name("index method")?;
        }
        self.expect(Token::LParen, "index column list")?;

        let mut columns = Vec::new();
        let mut expression = false;
        loop {
            match self.current() {
                Token::RParen => {
                    self.advance();
                    break;
                }
                Token::Eof => return Err(SqlParseError::UnexpectedEof),
                Token::Comma => self.advance(),
                Token::LParen => {
                    expression = true;
                    self.skip_parenthesized()?;
                }
                _ => {
                    let column = self.take_name("index column")?;
                    if self.current() == &Token::LParen {
                        // name(10) is a prefix length; lower(email) is an expression
                        if !matches!(self.peek(1), Token::Num(_)) {
                            expression = true;
                        }
                        self.skip_parenthesized()?;
                    }
                    columns.push(column);
                    while !matches!(self.current(), Token::Comma | Token::RParen | Token::Eof) {
                        if self.current() == &Token::LParen {
                            self.skip_parenthesized()?;
                        } else {
                            self.advance();
                        }
                    }
                }
            }
        }

        if columns.is_empty() && !expression {
            return Err(SqlParseError::EmptyColumnList);
        }

        Ok(Statement::CreateIndex {
            table,
            index: (!expression).then_some(Index {
                name,
                columns,
                unique,
            }),
        })
    }

    fn parse_create_sequence(&mut self) -> Result<Statement> {
        self.skip_if_exists()?;
        let name = self.take_qualified_name("sequence name")?;
        let mut sequence = Sequence {
            name,
            start: None,
            increment: None,
            owned_by: None,
        };

        loop {
            match self.current() {
                Token::Eof => break,
                Token::Increment => {
                    self.advance();
                    if self.current().is_word("BY") {
                        self.advance();
                    }
                    sequence.increment = Some(self.take_integer()?);
                }
                t if t.is_word("START") => {
                    self.advance();
                    if self.current().is_word("WITH") {
                        self.advance();
                    }
                    sequence.start = Some(self.take_integer()?);
                }
                t if t.is_word("OWNED") => {
                    self.advance();
                    self.expect_word("BY", "BY")?;
                    if self.current().is_word("NONE") {
                        self.advance();
                    } else {
                        let mut parts = self.take_name_parts("owning column")?;
                        if parts.len() < 2 {
                            return Err(self.expected("table.column"));
                        }
                        let column = parts.pop().unwrap_or_default();
                        let table = parts.pop().unwrap_or_default();
                        sequence.owned_by = Some((table, column));
                    }
                }
                _ => self.advance(),
            }
        }

        Ok(Statement::CreateSequence(sequence))
    }

    fn parse_create_type(&mut self) -> Result<Statement> {
        let name = self.take_qualified_name("type name")?;
        if !self.current().is_word("AS") {
            return Ok(Statement::Skipped);
        }
        self.advance();
        if !self.current().is_word("ENUM") {
            // Composite and range types carry no column type information we use
            return Ok(Statement::Skipped);
        }
        self.advance();
        self.expect(Token::LParen, "enum label list")?;

        let mut labels = Vec::new();
        loop {
            match self.current() {
                Token::RParen => {
                    self.advance();
                    break;
                }
                Token::Str(s) => {
                    labels.push(s.clone());
                    self.advance();
                }
                Token::Comma => self.advance(),
                _ => return Err(self.expected("enum label")),
            }
        }

        Ok(Statement::CreateEnum(EnumType { name, labels }))
    }

    fn parse_alter(&mut self) -> Result<Statement> {
        if self.current() != &Token::Table {
            // ALTER SEQUENCE, ALTER TYPE, ...
            return Ok(Statement::Skipped);
        }
        self.advance();
        self.skip_if_exists()?;
        if self.current() == &Token::Only {
            self.advance();
        }
        let table = self.take_qualified_name("table name")?;

        let mut actions = Vec::new();
        loop {
            match self.current() {
                Token::Eof => break,
                Token::Comma | Token::RParen => self.advance(),
                Token::Add => {
                    self.advance();
                    if let Some(action) = self.parse_alter_add(&table)? {
                        actions.push(action);
                    }
                }
                Token::Alter => {
                    self.advance();
                    if self.current().is_word("COLUMN") {
                        self.advance();
                    }
                    let column = self.take_name("column name")?;
                    if self.current().is_word("SET") && self.peek(1) == &Token::Default {
                        self.advance();
                        self.advance();
                        let expr = self.parse_default_expr()?;
                        actions.push(AlterAction::SetDefault { column, expr });
                    } else {
                        self.skip_element();
                    }
                }
                _ => self.skip_element(),
            }
        }

        Ok(Statement::AlterTable { table, actions })
    }

    fn parse_alter_add(&mut self, table: &str) -> Result<Option<AlterAction>> {
        let name = if self.current() == &Token::Constraint {
            self.advance();
            Some(self.take_name("constraint name")?)
        } else {
            None
        };

        match self.current() {
            Token::Primary | Token::Unique | Token::Foreign | Token::Check => {
                let action = match self.parse_table_constraint(name)? {
                    TableConstraint::PrimaryKey(cols) => Some(AlterAction::AddPrimaryKey(cols)),
                    TableConstraint::Unique(u) => Some(AlterAction::AddUnique(u)),
                    TableConstraint::ForeignKey(fk) => Some(AlterAction::AddForeignKey(fk)),
                    TableConstraint::Index(i) => Some(AlterAction::AddIndex(i)),
                    TableConstraint::Ignored => None,
                };
                Ok(action)
            }
            Token::Index | Token::Key => {
                self.advance();
                Ok(Some(AlterAction::AddIndex(self.parse_index_body(false)?)))
            }
            _ => {
                if self.current().is_word("COLUMN") {
                    self.advance();
                }
                self.skip_if_exists()?;
                Ok(Some(AlterAction::AddColumn(self.parse_column(table)?)))
            }
        }
    }

    fn skip_parenthesized(&mut self) -> Result<()> {
        if self.current() != &Token::LParen {
            return Err(self.expected("("));
        }
        self.advance();
        let mut depth = 1;
        while depth > 0 {
            match self.current() {
                Token::LParen => depth += 1,
                Token::RParen => depth -= 1,
                Token::Eof => return Err(SqlParseError::UnexpectedEof),
                _ => {}
            }
            self.advance();
        }
        Ok(())
    }

    /// Skip to the next top-level `,` or `)`.
    fn skip_element(&mut self) {
        let mut depth = 0usize;
        loop {
            match self.current() {
                Token::Eof => break,
                Token::Comma | Token::RParen if depth == 0 => break,
                Token::LParen => depth += 1,
                Token::RParen => depth -= 1,
                _ => {}
            }
            self.advance();
        }
    }

    /// `USING INDEX TABLESPACE`, `NOT VALID`, `NO INHERIT`, ...
    fn skip_constraint_tail(&mut self) {
        self.skip_element();
    }
}

struct ParsedType {
    declared: String,
    data_type: SqlType,
    args: Vec<u32>,
    auto_increment: bool,
    inline_enum: Option<EnumType>,
}

fn require_columns(
    table: &Table,
    columns: &[String],
    context: &'static str,
) -> Result<Vec<String>> {
    table
        .declared_columns(columns)
        .map_err(|column| SqlParseError::UnknownColumn {
            column: column.to_string(),
            context,
        })
}

/// Flag primary-key columns and make them NOT NULL.
pub(crate) fn mark_primary_key(table: &mut Table) {
    let pk = table.primary_key.clone();
    for column in &mut table.columns {
        if pk.contains(&column.name) {
            column.primary_key = true;
            column.nullable = false;
        }
    }
}

fn is_keyword(tok: &Token) -> bool {
    !matches!(
        tok,
        Token::Ident(_)
            | Token::Str(_)
            | Token::Num(_)
            | Token::LParen
            | Token::RParen
            | Token::Comma
            | Token::Semicolon
            | Token::Dot
            | Token::DoubleColon
            | Token::Brackets
            | Token::Op(_)
            | Token::Eof
    )
}

fn is_sort_word(word: &str) -> bool {
    ["ASC", "DESC", "NULLS", "FIRST", "LAST"]
        .iter()
        .any(|w| word.eq_ignore_ascii_case(w))
}

fn ends_default(tok: &Token) -> bool {
    matches!(
        tok,
        Token::Not
            | Token::Null
            | Token::Primary
            | Token::Unique
            | Token::References
            | Token::Check
            | Token::Constraint
            | Token::Collate
            | Token::Comment
            | Token::Increment
            | Token::On
    ) || tok.is_word("GENERATED")
}

/// Render tokens back into compact SQL text.
pub(crate) fn render_tokens(tokens: &[Token]) -> String {
    let mut out = String::new();
    let mut prev: Option<&Token> = None;

    for tok in tokens {
        let space = match (prev, tok) {
            (None, _) => false,
            (_, Token::RParen | Token::Comma | Token::DoubleColon | Token::Brackets | Token::Dot) => {
                false
            }
            (Some(Token::LParen | Token::DoubleColon | Token::Dot), _) => false,
            (Some(Token::Ident(_)), Token::LParen) => false,
            _ => true,
        };
        if space {
            out.push(' ');
        }
        out.push_str(&tok.to_string());
        prev = Some(tok);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::lexer::Lexer;

    fn parse(sql: &str) -> Result<Statement> {
        let tokens: Vec<Spanned> = Lexer::new(sql)
            .tokenize()
            .into_iter()
            .filter(|s| !matches!(s.token, Token::Semicolon | Token::Eof))
            .collect();
        StatementParser::new(&tokens, Dialect::Postgres).parse()
    }

    fn create_table(sql: &str) -> (Table, Vec<PendingForeignKey>) {
        match parse(sql).unwrap() {
            Statement::CreateTable {
                table,
                foreign_keys,
                ..
            } => (table, foreign_keys),
            other => panic!("expected CREATE TABLE, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_simple_table() {
        let (users, _) = create_table(
            "CREATE TABLE users (
                id INT PRIMARY KEY,
                email VARCHAR(255) NOT NULL UNIQUE
            )",
        );

        assert_eq!(users.name, "users");
        assert_eq!(users.columns.len(), 2);
        assert_eq!(users.primary_key, vec!["id"]);

        let id = &users.columns[0];
        assert!(id.primary_key);
        assert!(!id.nullable);

        let email = &users.columns[1];
        assert_eq!(email.declared_type, "VARCHAR(255)");
        assert_eq!(email.data_type, SqlType::Varchar);
        assert_eq!(email.length, Some(255));
        assert!(!email.nullable);
        assert!(email.unique);
    }

    #[test]
    fn test_parse_inline_reference() {
        let (orders, fks) = create_table(
            "CREATE TABLE orders (
                id INT PRIMARY KEY,
                user_id INT REFERENCES users(id) ON DELETE CASCADE NOT NULL
            )",
        );

        assert!(!orders.columns[1].nullable);
        assert_eq!(fks.len(), 1);
        assert_eq!(fks[0].columns, vec!["user_id"]);
        assert_eq!(fks[0].target_table, "users");
        assert_eq!(fks[0].target_columns, Some(vec!["id".to_string()]));
        assert_eq!(fks[0].on_delete, ReferentialAction::Cascade);
    }

    #[test]
    fn test_parse_table_constraints() {
        let (t, fks) = create_table(
            "CREATE TABLE public.product_tags (
                product_id BIGINT NOT NULL,
                tag_id BIGINT NOT NULL,
                CONSTRAINT pk_product_tags PRIMARY KEY (product_id, tag_id),
                CONSTRAINT fk_product FOREIGN KEY (product_id) REFERENCES products (id) ON DELETE SET NULL,
                FOREIGN KEY (tag_id) REFERENCES tags,
                UNIQUE (tag_id, product_id)
            )",
        );

        assert_eq!(t.name, "product_tags");
        assert_eq!(t.primary_key, vec!["product_id", "tag_id"]);
        assert!(t.columns.iter().all(|c| c.primary_key));
        assert_eq!(fks.len(), 2);
        assert_eq!(fks[0].name.as_deref(), Some("fk_product"));
        assert_eq!(fks[0].on_delete, ReferentialAction::SetNull);
        assert_eq!(fks[1].target_columns, None);
        assert_eq!(t.uniques[0].columns, vec!["tag_id", "product_id"]);
    }

    #[test]
    fn test_parse_decimal_and_default() {
        let (t, _) = create_table(
            "CREATE TABLE prices (
                amount NUMERIC(10, 2) DEFAULT 0.00 NOT NULL,
                created_at TIMESTAMP WITH TIME ZONE DEFAULT now(),
                label TEXT DEFAULT 'none'::text
            )",
        );

        let amount = &t.columns[0];
        assert_eq!(amount.data_type, SqlType::Decimal);
        assert_eq!(amount.precision, Some(10));
        assert_eq!(amount.scale, Some(2));
        assert_eq!(amount.default.as_deref(), Some("0.00"));
        assert!(!amount.nullable);

        assert_eq!(t.columns[1].data_type, SqlType::TimestampTz);
        assert_eq!(t.columns[1].default.as_deref(), Some("now()"));
        assert_eq!(t.columns[2].default.as_deref(), Some("'none'::text"));
    }

    #[test]
    fn test_parse_serial_and_identity() {
        let (t, _) = create_table(
            "CREATE TABLE t (
                id BIGSERIAL PRIMARY KEY,
                n INT GENERATED ALWAYS AS IDENTITY,
                seq INT DEFAULT nextval('t_seq_seq'::regclass)
            )",
        );

        assert_eq!(t.columns[0].data_type, SqlType::BigInt);
        assert!(t.columns.iter().all(|c| c.auto_increment));
    }

    #[test]
    fn test_parse_mysql_table() {
        let (t, fks) = create_table(
            "CREATE TABLE `orders` (
                `id` INT UNSIGNED NOT NULL AUTO_INCREMENT,
                `key` VARCHAR(20) NOT NULL COMMENT 'external key',
                `status` ENUM('new', 'paid') NOT NULL DEFAULT 'new',
                `user_id` INT NOT NULL,
                PRIMARY KEY (`id`),
                UNIQUE KEY `uk_key` (`key`),
                KEY `idx_user` (`user_id`),
                CONSTRAINT `fk_user` FOREIGN KEY (`user_id`) REFERENCES `users` (`id`)
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4",
        );

        assert_eq!(t.columns.len(), 4);
        assert!(t.columns[0].auto_increment);
        assert_eq!(t.columns[1].comment.as_deref(), Some("external key"));
        assert_eq!(t.columns[2].data_type, SqlType::Enum("orders_status".to_string()));
        assert_eq!(t.uniques[0].name.as_deref(), Some("uk_key"));
        assert_eq!(t.indexes[0].columns, vec!["user_id"]);
        assert_eq!(fks[0].name.as_deref(), Some("fk_user"));
    }

    #[test]
    fn test_parse_array_type() {
        let (t, _) = create_table("CREATE TABLE t (tags TEXT[] NOT NULL)");
        assert_eq!(
            t.columns[0].data_type,
            SqlType::Array(Box::new(SqlType::Text))
        );
    }

    #[test]
    fn test_unknown_column_in_constraint() {
        let err = parse("CREATE TABLE t (a INT, PRIMARY KEY (b))").unwrap_err();
        assert_eq!(
            err,
            SqlParseError::UnknownColumn {
                column: "b".to_string(),
                context: "PRIMARY KEY"
            }
        );
    }

    #[test]
    fn test_malformed_statements() {
        assert_eq!(
            parse("CREATE TABLE t (a INT").unwrap_err(),
            SqlParseError::UnexpectedEof
        );
        assert_eq!(
            parse("CREATE TABLE t (a, b INT)").unwrap_err(),
            SqlParseError::MissingType("a".to_string())
        );
        assert!(matches!(
            parse("CREATE TABLE t (a INT REFERENCES u(id) ON DELETE EXPLODE)").unwrap_err(),
            SqlParseError::Expected { .. }
        ));
        assert_eq!(
            parse("CREATE TABLE t (a INT PRIMARY KEY, b INT PRIMARY KEY)").unwrap_err(),
            SqlParseError::MultiplePrimaryKeys("t".to_string())
        );
    }

    #[test]
    fn test_parse_create_index() {
        match parse("CREATE UNIQUE INDEX IF NOT EXISTS ux_users_email ON public.users USING btree (email DESC)").unwrap() {
            Statement::CreateIndex { table, index } => {
                assert_eq!(table, "users");
                let index = index.unwrap();
                assert!(index.unique);
                assert_eq!(index.columns, vec!["email"]);
                assert_eq!(index.name.as_deref(), Some("ux_users_email"));
            }
            other => panic!("unexpected {:?}", other),
        }

        match parse("CREATE INDEX ON users (lower(email))").unwrap() {
            Statement::CreateIndex { index, .. } => assert!(index.is_none()),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_alter_table() {
        match parse(
            "ALTER TABLE ONLY public.orders
                ADD CONSTRAINT orders_user_fk FOREIGN KEY (user_id) REFERENCES public.users(id) ON UPDATE CASCADE",
        )
        .unwrap()
        {
            Statement::AlterTable { table, actions } => {
                assert_eq!(table, "orders");
                match &actions[0] {
                    AlterAction::AddForeignKey(fk) => {
                        assert_eq!(fk.target_table, "users");
                        assert_eq!(fk.on_update, ReferentialAction::Cascade);
                        assert_eq!(fk.name.as_deref(), Some("orders_user_fk"));
                    }
                    other => panic!("unexpected {:?}", other),
                }
            }
            other => panic!("unexpected {:?}", other),
        }

        match parse("ALTER TABLE ONLY t ALTER COLUMN id SET DEFAULT nextval('t_id_seq'::regclass)")
            .unwrap()
        {
            Statement::AlterTable { actions, .. } => assert_eq!(
                actions,
                vec![AlterAction::SetDefault {
                    column: "id".to_string(),
                    expr: "nextval('t_id_seq'::regclass)".to_string()
                }]
            ),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_sequence_and_enum() {
        match parse("CREATE SEQUENCE public.t_id_seq START WITH 10 INCREMENT BY 5 OWNED BY public.t.id").unwrap() {
            Statement::CreateSequence(seq) => {
                assert_eq!(seq.name, "t_id_seq");
                assert_eq!(seq.start, Some(10));
                assert_eq!(seq.increment, Some(5));
                assert_eq!(seq.owned_by, Some(("t".to_string(), "id".to_string())));
            }
            other => panic!("unexpected {:?}", other),
        }

        match parse("CREATE TYPE mood AS ENUM ('sad', 'ok')").unwrap() {
            Statement::CreateEnum(e) => assert_eq!(e.labels, vec!["sad", "ok"]),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_other_statements_are_skipped() {
        assert_eq!(parse("INSERT INTO t VALUES (1)").unwrap(), Statement::Skipped);
        assert_eq!(parse("CREATE VIEW v AS SELECT 1").unwrap(), Statement::Skipped);
        assert_eq!(parse("ALTER SEQUENCE s OWNED BY t.id").unwrap(), Statement::Skipped);
    }
}
