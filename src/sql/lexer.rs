//! SQL lexer for tokenizing DDL scripts.

use std::fmt;
use std::iter::Peekable;
use std::str::CharIndices;

/// SQL token types.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Keywords
    Create,
    Alter,
    Add,
    Table,
    Only,
    Primary,
    Key,
    Foreign,
    References,
    Not,
    Null,
    Unique,
    Default,
    On,
    Delete,
    Update,
    Cascade,
    Restrict,
    Constraint,
    Index,
    Sequence,
    If,
    Exists,
    Increment, // AUTO_INCREMENT, INCREMENT BY
    Serial(String), // PostgreSQL SERIAL / BIGSERIAL / SMALLSERIAL
    Check,
    Collate,
    Comment,

    // Identifiers and literals
    Ident(String),
    Str(String),
    Num(String),

    // Symbols
    LParen,
    RParen,
    Comma,
    Semicolon,
    Dot,
    DoubleColon,
    /// `[]` array suffix.
    Brackets,
    Op(char),

    // End of input
    Eof,
}

impl Token {
    /// Case-insensitive match against a bare word that has no keyword variant.
    pub fn is_word(&self, word: &str) -> bool {
        matches!(self, Token::Ident(s) if s.eq_ignore_ascii_case(word))
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Token::Create => "CREATE",
            Token::Alter => "ALTER",
            Token::Add => "ADD",
            Token::Table => "TABLE",
            Token::Only => "ONLY",
            Token::Primary => "PRIMARY",
            Token::Key => "KEY",
            Token::Foreign => "FOREIGN",
            Token::References => "REFERENCES",
            Token::Not => "NOT",
            Token::Null => "NULL",
            Token::Unique => "UNIQUE",
            Token::Default => "DEFAULT",
            Token::On => "ON",
            Token::Delete => "DELETE",
            Token::Update => "UPDATE",
            Token::Cascade => "CASCADE",
            Token::Restrict => "RESTRICT",
            Token::Constraint => "CONSTRAINT",
            Token::Index => "INDEX",
            Token::Sequence => "SEQUENCE",
            Token::If => "IF",
            Token::Exists => "EXISTS",
            Token::Increment => "INCREMENT",
            Token::Check => "CHECK",
            Token::Collate => "COLLATE",
            Token::Comment => "COMMENT",
            Token::Ident(s) | Token::Num(s) | Token::Serial(s) => return f.write_str(s),
            Token::Str(s) => return write!(f, "'{}'", s.replace('\'', "''")),
            Token::LParen => "(",
            Token::RParen => ")",
            Token::Comma => ",",
            Token::Semicolon => ";",
            Token::Dot => ".",
            Token::DoubleColon => "::",
            Token::Brackets => "[]",
            Token::Op(c) => return write!(f, "{}", c),
            Token::Eof => "end of input",
        };
        f.write_str(s)
    }
}

/// A token with the byte range it was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub start: usize,
    pub end: usize,
}

/// SQL lexer.
pub struct Lexer<'a> {
    input: &'a str,
    chars: Peekable<CharIndices<'a>>,
    current: Option<(usize, char)>,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        let mut chars = input.char_indices().peekable();
        let current = chars.next();
        Self {
            input,
            chars,
            current,
        }
    }

    fn current_char(&self) -> Option<char> {
        self.current.map(|(_, c)| c)
    }

    fn offset(&self) -> usize {
        self.current.map(|(i, _)| i).unwrap_or(self.input.len())
    }

    fn advance(&mut self) {
        self.current = self.chars.next();
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|&(_, c)| c)
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.current_char() {
            if c.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn skip_line_comment(&mut self) {
        while let Some(c) = self.current_char() {
            self.advance();
            if c == '\n' {
                break;
            }
        }
    }

    fn skip_block_comment(&mut self) {
        self.advance(); // skip *
        while let Some(c) = self.current_char() {
            self.advance();
            if c == '*' && self.current_char() == Some('/') {
                self.advance();
                break;
            }
        }
    }

    fn read_identifier(&mut self) -> String {
        let mut ident = String::new();
        while let Some(c) = self.current_char() {
            if c.is_alphanumeric() || c == '_' || c == '$' {
                ident.push(c);
                self.advance();
            } else {
                break;
            }
        }
        ident
    }

    /// Reads `"x"` or `` `x` ``; a doubled quote is an escaped quote.
    fn read_quoted(&mut self, quote: char) -> String {
        self.advance(); // skip opening quote
        let mut s = String::new();
        while let Some(c) = self.current_char() {
            if c == quote {
                if self.peek() == Some(quote) {
                    s.push(c);
                    self.advance();
                    self.advance();
                } else {
                    self.advance(); // skip closing quote
                    break;
                }
            } else {
                s.push(c);
                self.advance();
            }
        }
        s
    }

    fn read_string(&mut self) -> String {
        self.advance(); // skip opening quote
        let mut s = String::new();
        while let Some(c) = self.current_char() {
            if c == '\'' {
                if self.peek() == Some('\'') {
                    s.push(c);
                    self.advance();
                    self.advance();
                } else {
                    self.advance();
                    break;
                }
            } else if c == '\\' {
                self.advance();
                if let Some(escaped) = self.current_char() {
                    match escaped {
                        'n' => s.push('\n'),
                        't' => s.push('\t'),
                        'r' => s.push('\r'),
                        _ => s.push(escaped),
                    }
                    self.advance();
                }
            } else {
                s.push(c);
                self.advance();
            }
        }
        s
    }

    /// Reads a `$tag$ ... $tag$` body. `None` for a lone `$` (e.g. `$1`).
    fn read_dollar_quoted(&mut self) -> Option<String> {
        self.advance(); // skip opening $
        let mut tag = String::new();
        while let Some(c) = self.current_char() {
            if c.is_alphanumeric() || c == '_' {
                tag.push(c);
                self.advance();
            } else {
                break;
            }
        }
        if self.current_char() != Some('$') {
            return None;
        }
        self.advance();

        let delimiter = format!("${}$", tag);
        let body_start = self.offset();
        let rest = &self.input[body_start..];
        let (body, resume) = match rest.find(&delimiter) {
            Some(idx) => (&rest[..idx], body_start + idx + delimiter.len()),
            None => (rest, self.input.len()),
        };
        let body = body.to_string();
        while self.current.is_some() && self.offset() < resume {
            self.advance();
        }
        Some(body)
    }

    fn read_number(&mut self) -> String {
        let mut num = String::new();
        let mut has_dot = false;

        if self.current_char() == Some('-') {
            num.push('-');
            self.advance();
        }

        while let Some(c) = self.current_char() {
            if c.is_ascii_digit() {
                num.push(c);
                self.advance();
            } else if c == '.' && !has_dot {
                has_dot = true;
                num.push(c);
                self.advance();
            } else {
                break;
            }
        }
        num
    }

    fn keyword_or_ident(s: &str) -> Token {
        let upper = s.to_uppercase();
        match upper.as_str() {
            "CREATE" => Token::Create,
            "ALTER" => Token::Alter,
            "ADD" => Token::Add,
            "TABLE" => Token::Table,
            "ONLY" => Token::Only,
            "PRIMARY" => Token::Primary,
            "KEY" => Token::Key,
            "FOREIGN" => Token::Foreign,
            "REFERENCES" => Token::References,
            "NOT" => Token::Not,
            "NULL" => Token::Null,
            "UNIQUE" => Token::Unique,
            "DEFAULT" => Token::Default,
            "ON" => Token::On,
            "DELETE" => Token::Delete,
            "UPDATE" => Token::Update,
            "CASCADE" => Token::Cascade,
            "RESTRICT" => Token::Restrict,
            "CONSTRAINT" => Token::Constraint,
            "INDEX" => Token::Index,
            "SEQUENCE" => Token::Sequence,
            "IF" => Token::If,
            "EXISTS" => Token::Exists,
            "AUTO_INCREMENT" | "AUTOINCREMENT" | "INCREMENT" => Token::Increment,
            "SERIAL" | "BIGSERIAL" | "SMALLSERIAL" => Token::Serial(upper),
            "CHECK" => Token::Check,
            "COLLATE" => Token::Collate,
            "COMMENT" => Token::Comment,
            _ => Token::Ident(s.to_string()),
        }
    }

    pub fn next_token(&mut self) -> Spanned {
        loop {
            self.skip_whitespace();
            let start = self.offset();

            let token = match self.current_char() {
                None => Token::Eof,

                Some('-') => {
                    if self.peek() == Some('-') {
                        self.skip_line_comment();
                        continue;
                    } else if self.peek().is_some_and(|c| c.is_ascii_digit()) {
                        Token::Num(self.read_number())
                    } else {
                        self.advance();
                        Token::Op('-')
                    }
                }

                Some('/') => {
                    self.advance();
                    if self.current_char() == Some('*') {
                        self.skip_block_comment();
                        continue;
                    }
                    Token::Op('/')
                }

                Some('#') => {
                    self.skip_line_comment();
                    continue;
                }

                Some(':') => {
                    self.advance();
                    if self.current_char() == Some(':') {
                        self.advance();
                        Token::DoubleColon
                    } else {
                        continue;
                    }
                }

                Some('(') => {
                    self.advance();
                    Token::LParen
                }
                Some(')') => {
                    self.advance();
                    Token::RParen
                }
                Some(',') => {
                    self.advance();
                    Token::Comma
                }
                Some(';') => {
                    self.advance();
                    Token::Semicolon
                }
                Some('.') => {
                    self.advance();
                    Token::Dot
                }

                Some('"') => Token::Ident(self.read_quoted('"')),
                Some('`') => Token::Ident(self.read_quoted('`')),
                Some('[') => {
                    self.advance();
                    if self.current_char() == Some(']') {
                        self.advance();
                        Token::Brackets
                    } else {
                        // SQL Server style [identifier]
                        let mut ident = String::new();
                        while let Some(c) = self.current_char() {
                            self.advance();
                            if c == ']' {
                                break;
                            }
                            ident.push(c);
                        }
                        Token::Ident(ident)
                    }
                }

                Some('\'') => Token::Str(self.read_string()),
                Some('$') => match self.read_dollar_quoted() {
                    Some(body) => Token::Str(body),
                    None => continue,
                },

                Some(c) if c.is_ascii_digit() => Token::Num(self.read_number()),

                Some(c) if c.is_alphabetic() || c == '_' => {
                    let ident = self.read_identifier();
                    Self::keyword_or_ident(&ident)
                }

                Some(c @ ('=' | '+' | '*' | '<' | '>' | '!' | '|' | '%' | '&')) => {
                    self.advance();
                    Token::Op(c)
                }

                Some(_) => {
                    // Skip unknown characters
                    self.advance();
                    continue;
                }
            };

            return Spanned {
                token,
                start,
                end: self.offset(),
            };
        }
    }

    /// Collect all tokens, ending with `Eof`.
    pub fn tokenize(&mut self) -> Vec<Spanned> {
        let mut tokens = Vec::new();
        loop {
            let spanned = self.next_token();
            let done = spanned.token == Token::Eof;
            tokens.push(spanned);
            if done {
                break;
            }
        }
        tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(sql: &str) -> Vec<Token> {
        Lexer::new(sql).tokenize().into_iter().map(|s| s.token).collect()
    }

    #[test]
    fn test_simple_create_table() {
        let tokens = tokens("CREATE TABLE users (id INT);");

        assert_eq!(tokens[0], Token::Create);
        assert_eq!(tokens[1], Token::Table);
        assert_eq!(tokens[2], Token::Ident("users".to_string()));
        assert_eq!(tokens[3], Token::LParen);
        assert_eq!(tokens[4], Token::Ident("id".to_string()));
        assert_eq!(tokens[5], Token::Ident("INT".to_string()));
        assert_eq!(tokens[6], Token::RParen);
        assert_eq!(tokens[7], Token::Semicolon);
        assert_eq!(tokens[8], Token::Eof);
    }

    #[test]
    fn test_quoted_identifiers() {
        let tokens = tokens(r#"CREATE TABLE "User Table" (`column name` INT, [other] INT);"#);

        assert_eq!(tokens[2], Token::Ident("User Table".to_string()));
        assert_eq!(tokens[4], Token::Ident("column name".to_string()));
        assert_eq!(tokens[7], Token::Ident("other".to_string()));
    }

    #[test]
    fn test_comments() {
        let tokens = tokens("-- comment\nCREATE /* block */ TABLE t (id INT); # mysql");

        assert_eq!(tokens[0], Token::Create);
        assert_eq!(tokens[1], Token::Table);
        assert_eq!(tokens.last(), Some(&Token::Eof));
    }

    #[test]
    fn test_array_suffix_and_cast() {
        let tokens = tokens("tags text[] DEFAULT '{}'::text[]");

        assert_eq!(tokens[2], Token::Brackets);
        assert_eq!(tokens[4], Token::Str("{}".to_string()));
        assert_eq!(tokens[5], Token::DoubleColon);
    }

    #[test]
    fn test_spans_cover_source() {
        let sql = "CREATE TABLE t (id INT);";
        let spanned = Lexer::new(sql).tokenize();

        assert_eq!(&sql[spanned[0].start..spanned[0].end], "CREATE");
        assert_eq!(&sql[spanned[2].start..spanned[2].end], "t");
        let eof = spanned.last().unwrap();
        assert_eq!(eof.start, sql.len());
    }

    #[test]
    fn test_dollar_quoted_body() {
        let tokens = tokens("CREATE FUNCTION f() AS $fn$ BEGIN; END; $fn$; CREATE");

        let semicolons = tokens.iter().filter(|t| **t == Token::Semicolon).count();
        assert_eq!(semicolons, 1);
        assert!(tokens.contains(&Token::Str(" BEGIN; END; ".to_string())));
        assert_eq!(tokens[tokens.len() - 2], Token::Create);
    }

    #[test]
    fn test_serial_keyword() {
        let tokens = tokens("id bigserial");
        assert_eq!(tokens[1], Token::Serial("BIGSERIAL".to_string()));
    }
}
