//! SQL type canonicalization.

use super::Dialect;
use crate::ast::SqlType;

/// Canonical type plus facts the type name itself implies.
#[derive(Debug, Clone, PartialEq)]
pub struct Canonical {
    pub data_type: SqlType,
    /// SERIAL-family names imply a generated key.
    pub auto_increment: bool,
}

/// Size parameters attached to a column, read from `(a[, b])`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TypeParams {
    pub length: Option<u32>,
    pub precision: Option<u32>,
    pub scale: Option<u32>,
}

/// Map a declared base type name (lowercase words, no parameters) to a
/// canonical type. `args` are the numeric parameters, used only where
/// they change meaning (MySQL `TINYINT(1)`).
pub fn canonicalize(base: &str, args: &[u32], dialect: Dialect) -> Canonical {
    let words: Vec<&str> = base
        .split_whitespace()
        .filter(|w| !matches!(*w, "unsigned" | "signed" | "zerofill"))
        .collect();
    let base = words.join(" ");

    let serial = |t: SqlType| Canonical {
        data_type: t,
        auto_increment: true,
    };
    let plain = |t: SqlType| Canonical {
        data_type: t,
        auto_increment: false,
    };

    match base.as_str() {
        "serial" | "serial4" => serial(SqlType::Integer),
        "bigserial" | "serial8" => serial(SqlType::BigInt),
        "smallserial" | "serial2" => serial(SqlType::SmallInt),

        "tinyint" if dialect == Dialect::MySql && args == [1] => plain(SqlType::Boolean),
        "tinyint" | "smallint" | "int2" => plain(SqlType::SmallInt),
        "int" | "integer" | "int4" | "mediumint" => plain(SqlType::Integer),
        "bigint" | "int8" => plain(SqlType::BigInt),

        "decimal" | "numeric" | "dec" | "money" | "smallmoney" => plain(SqlType::Decimal),
        "real" | "float4" => plain(SqlType::Real),
        // FLOAT(p) with p <= 24 is single precision in both Postgres and MySQL
        "float" => match args.first() {
            Some(p) if *p <= 24 => plain(SqlType::Real),
            Some(_) => plain(SqlType::Double),
            None if dialect == Dialect::MySql => plain(SqlType::Real),
            None => plain(SqlType::Double),
        },
        "double" | "double precision" | "float8" => plain(SqlType::Double),

        "boolean" | "bool" | "bit" => plain(SqlType::Boolean),

        "char" | "character" | "nchar" | "bpchar" => plain(SqlType::Char),
        "varchar" | "character varying" | "nvarchar" | "varchar2" | "citext" => {
            plain(SqlType::Varchar)
        }
        "text" | "tinytext" | "mediumtext" | "longtext" | "ntext" | "clob" => {
            plain(SqlType::Text)
        }

        "date" => plain(SqlType::Date),
        "time" | "time without time zone" | "timetz" | "time with time zone" => {
            plain(SqlType::Time)
        }
        "timestamp" | "timestamp without time zone" | "datetime" | "datetime2"
        | "smalldatetime" => {
            // MySQL TIMESTAMP is stored as UTC
            if dialect == Dialect::MySql && base == "timestamp" {
                plain(SqlType::TimestampTz)
            } else {
                plain(SqlType::Timestamp)
            }
        }
        "timestamptz" | "timestamp with time zone" | "datetimeoffset" => {
            plain(SqlType::TimestampTz)
        }
        "interval" => plain(SqlType::Interval),
        "year" => plain(SqlType::SmallInt),

        "uuid" | "uniqueidentifier" => plain(SqlType::Uuid),
        "json" | "jsonb" => plain(SqlType::Json),

        "bytea" | "blob" | "tinyblob" | "mediumblob" | "longblob" | "binary" | "varbinary"
        | "image" => plain(SqlType::Binary),

        other => plain(SqlType::Unknown(other.to_string())),
    }
}

/// Attribute numeric type parameters to length or precision/scale.
pub fn classify_params(data_type: &SqlType, args: &[u32]) -> TypeParams {
    let first = args.first().copied();
    match data_type {
        SqlType::Char | SqlType::Varchar | SqlType::Binary => TypeParams {
            length: first,
            ..TypeParams::default()
        },
        SqlType::Decimal => TypeParams {
            precision: first,
            scale: args.get(1).copied(),
            ..TypeParams::default()
        },
        SqlType::Real
        | SqlType::Double
        | SqlType::Time
        | SqlType::Timestamp
        | SqlType::TimestampTz => TypeParams {
            precision: first,
            ..TypeParams::default()
        },
        _ => TypeParams::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ty(base: &str, dialect: Dialect) -> SqlType {
        canonicalize(base, &[], dialect).data_type
    }

    #[test]
    fn test_postgres_types() {
        let c = canonicalize("serial", &[], Dialect::Postgres);
        assert_eq!(c.data_type, SqlType::Integer);
        assert!(c.auto_increment);
        assert_eq!(ty("character varying", Dialect::Postgres), SqlType::Varchar);
        assert_eq!(ty("timestamp with time zone", Dialect::Postgres), SqlType::TimestampTz);
        assert_eq!(ty("jsonb", Dialect::Postgres), SqlType::Json);
        assert_eq!(ty("double precision", Dialect::Postgres), SqlType::Double);
    }

    #[test]
    fn test_mysql_types() {
        assert_eq!(ty("int unsigned", Dialect::MySql), SqlType::Integer);
        assert_eq!(
            canonicalize("tinyint", &[1], Dialect::MySql).data_type,
            SqlType::Boolean
        );
        assert_eq!(
            canonicalize("tinyint", &[4], Dialect::MySql).data_type,
            SqlType::SmallInt
        );
        assert_eq!(ty("datetime", Dialect::MySql), SqlType::Timestamp);
        assert_eq!(ty("longblob", Dialect::MySql), SqlType::Binary);
    }

    #[test]
    fn test_unknown_keeps_name() {
        assert_eq!(
            ty("geometry", Dialect::Generic),
            SqlType::Unknown("geometry".to_string())
        );
    }

    #[test]
    fn test_classify_params() {
        let p = classify_params(&SqlType::Decimal, &[10, 2]);
        assert_eq!(p.precision, Some(10));
        assert_eq!(p.scale, Some(2));
        assert_eq!(p.length, None);

        let p = classify_params(&SqlType::Varchar, &[255]);
        assert_eq!(p.length, Some(255));

        assert_eq!(classify_params(&SqlType::Integer, &[11]), TypeParams::default());
    }
}
