use super::profile::{DecimalRepr, TargetProfile};
use crate::ast::{Column, SqlType};
use serde::Serialize;

/// A column's type in one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetType {
    /// Full spelling, including array and nullability wrapping.
    pub name: String,
    /// Spelling without nullability.
    pub inner: String,
    /// Scalar element type, used for import lookup.
    pub base: String,
    pub nullable: bool,
    pub array: bool,
    pub length: Option<u32>,
    /// Only carried when the target has a fixed-point decimal.
    pub precision: Option<u32>,
    pub scale: Option<u32>,
    /// The SQL type had no mapping and the profile fallback was used.
    pub fallback: bool,
}

/// Map a column onto a target type. Total: unknown and unsupported types
/// resolve to the profile fallback with `fallback` set.
pub fn map_type(column: &Column, profile: &TargetProfile) -> TargetType {
    let (inner, base, fallback) = render(&column.data_type, profile);
    let nullable = column.nullable && !column.primary_key;
    let name = if nullable {
        profile.nullable.apply(&inner)
    } else {
        inner.clone()
    };

    let fixed_decimal =
        column.data_type == SqlType::Decimal && profile.decimal == DecimalRepr::Fixed;

    TargetType {
        name,
        inner,
        base,
        nullable,
        array: matches!(column.data_type, SqlType::Array(_)),
        length: column.length,
        precision: if fixed_decimal { column.precision } else { None },
        scale: if fixed_decimal { column.scale } else { None },
        fallback,
    }
}

/// Returns `(spelling, scalar base, fallback)`.
fn render(sql: &SqlType, profile: &TargetProfile) -> (String, String, bool) {
    match sql {
        SqlType::Array(element) => {
            let (inner, base, fallback) = render(element, profile);
            (profile.array.replace("{}", &inner), base, fallback)
        }
        other => {
            let key = other.key();
            match profile.types.get(key) {
                Some(ty) if !profile.unsupported.contains(key) => (ty.clone(), ty.clone(), false),
                _ => (profile.fallback.clone(), profile.fallback.clone(), true),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProfileSet;
    use crate::mapping::TargetKey;

    fn column(data_type: SqlType, nullable: bool) -> Column {
        Column {
            name: "c".to_string(),
            declared_type: data_type.to_string(),
            data_type,
            nullable,
            primary_key: false,
            unique: false,
            auto_increment: false,
            default: None,
            length: None,
            precision: Some(12),
            scale: Some(4),
            comment: None,
        }
    }

    fn profile(lang: &str, fw: &str) -> TargetProfile {
        ProfileSet::builtin()
            .unwrap()
            .get(&TargetKey::new(lang, fw))
            .cloned()
            .unwrap()
    }

    #[test]
    fn test_every_type_maps_on_every_profile() {
        let profiles = ProfileSet::builtin().unwrap();
        let mut types: Vec<SqlType> = vec![
            SqlType::SmallInt,
            SqlType::Integer,
            SqlType::BigInt,
            SqlType::Decimal,
            SqlType::Real,
            SqlType::Double,
            SqlType::Boolean,
            SqlType::Char,
            SqlType::Varchar,
            SqlType::Text,
            SqlType::Date,
            SqlType::Time,
            SqlType::Timestamp,
            SqlType::TimestampTz,
            SqlType::Interval,
            SqlType::Uuid,
            SqlType::Json,
            SqlType::Binary,
            SqlType::Enum("mood".to_string()),
            SqlType::Unknown("geometry".to_string()),
        ];
        types.push(SqlType::Array(Box::new(SqlType::Text)));

        for profile in profiles.iter() {
            for ty in &types {
                for nullable in [false, true] {
                    let mapped = map_type(&column(ty.clone(), nullable), profile);
                    assert!(!mapped.name.is_empty(), "{} {:?}", profile.key, ty);
                }
            }
        }
    }

    #[test]
    fn test_unknown_uses_fallback() {
        let p = profile("rust", "axum");
        let mapped = map_type(&column(SqlType::Unknown("geometry".into()), false), &p);
        assert!(mapped.fallback);
        assert_eq!(mapped.name, p.fallback);
    }

    #[test]
    fn test_decimal_precision_only_when_fixed() {
        let rust = map_type(&column(SqlType::Decimal, false), &profile("rust", "axum"));
        assert_eq!(rust.precision, Some(12));
        assert_eq!(rust.scale, Some(4));

        let ts = map_type(&column(SqlType::Decimal, false), &profile("typescript", "express"));
        assert_eq!(ts.precision, None);
        assert_eq!(ts.name, "string");
    }

    #[test]
    fn test_nullable_wrapping() {
        let rust = map_type(&column(SqlType::Integer, true), &profile("rust", "axum"));
        assert_eq!(rust.name, "Option<i32>");
        assert_eq!(rust.inner, "i32");

        let java = map_type(&column(SqlType::Integer, true), &profile("java", "spring"));
        assert_eq!(java.name, "Integer");

        let go = map_type(&column(SqlType::Text, true), &profile("go", "gin"));
        assert_eq!(go.name, "*string");

        let arr = map_type(
            &column(SqlType::Array(Box::new(SqlType::Text)), false),
            &profile("python", "fastapi"),
        );
        assert_eq!(arr.name, "list[str]");
        assert!(arr.array);
    }
}
