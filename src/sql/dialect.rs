//! SQL dialect detection.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// SQL dialect variants. Only type canonicalization depends on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// Auto-detect from script content
    #[default]
    Auto,
    Generic,
    Postgres,
    MySql,
}

impl FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "generic" | "ansi" => Ok(Self::Generic),
            "postgres" | "postgresql" | "pg" => Ok(Self::Postgres),
            "mysql" | "mariadb" => Ok(Self::MySql),
            other => Err(format!("unknown dialect '{}'", other)),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Auto => "auto",
            Self::Generic => "generic",
            Self::Postgres => "postgres",
            Self::MySql => "mysql",
        })
    }
}

impl Dialect {
    /// Detect dialect from DDL content.
    pub fn detect(content: &str) -> Self {
        let lower = content.to_lowercase();

        // Dump headers win over keyword sniffing
        if lower.contains("postgresql database dump") || lower.contains("pg_dump") {
            return Self::Postgres;
        }
        if lower.contains("mysql dump") || lower.contains("mysqldump") {
            return Self::MySql;
        }

        let postgres_hits = [
            "serial", "text[]", "::", "timestamptz", "jsonb", "bytea", "nextval(",
            "as enum",
        ]
        .iter()
        .filter(|kw| lower.contains(*kw))
        .count();
        let mysql_hits = [
            "auto_increment", "tinyint", "engine=", "unsigned", "`", "datetime",
            "longtext",
        ]
        .iter()
        .filter(|kw| lower.contains(*kw))
        .count();

        match postgres_hits.cmp(&mysql_hits) {
            std::cmp::Ordering::Greater => Self::Postgres,
            std::cmp::Ordering::Less => Self::MySql,
            std::cmp::Ordering::Equal => Self::Generic,
        }
    }

    /// Resolve Auto to a concrete dialect.
    pub fn resolve(self, content: &str) -> Self {
        match self {
            Self::Auto => Self::detect(content),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_postgres() {
        let sql = "-- PostgreSQL database dump\nCREATE TABLE users (id SERIAL);";
        assert_eq!(Dialect::detect(sql), Dialect::Postgres);
        assert_eq!(Dialect::detect("CREATE TABLE t (d jsonb, ts timestamptz);"), Dialect::Postgres);
    }

    #[test]
    fn test_detect_mysql() {
        let sql = "CREATE TABLE `users` (id INT AUTO_INCREMENT) ENGINE=InnoDB;";
        assert_eq!(Dialect::detect(sql), Dialect::MySql);
    }

    #[test]
    fn test_detect_generic() {
        let sql = "CREATE TABLE users (id INTEGER PRIMARY KEY);";
        assert_eq!(Dialect::detect(sql), Dialect::Generic);
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("PostgreSQL".parse::<Dialect>(), Ok(Dialect::Postgres));
        assert_eq!("mariadb".parse::<Dialect>(), Ok(Dialect::MySql));
        assert!("oracle".parse::<Dialect>().is_err());
        assert_eq!(Dialect::Auto.resolve("id bigserial"), Dialect::Postgres);
    }
}
