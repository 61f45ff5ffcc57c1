//! Text rendering rules for exported values.
//!
//! Rows are fetched in the server's text result format, so every value
//! arrives as the server's canonical text for its type. The rules below fix
//! what is written to the delimited file for each kind of value:
//!
//! | Kind       | Rendering                                        |
//! |------------|--------------------------------------------------|
//! | NULL       | empty field (every kind)                         |
//! | `Boolean`  | `true` / `false`                                 |
//! | `Integer`  | server decimal text (`oid`, `int2`..`int8`)      |
//! | `Float`    | server text, including `NaN` and `Infinity`      |
//! | `Numeric`  | server decimal text, scale preserved             |
//! | `Temporal` | ISO 8601 server text (`DateStyle` is ISO)        |
//! | `Binary`   | server hex text, `\x` prefixed                   |
//! | `Text`     | server text (strings, arrays, json, name, ...)   |

use std::borrow::Cow;

/// Rendering class of a result column, derived from its server type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// `bool`
    Boolean,
    /// Fixed-width integers and object identifiers
    Integer,
    /// `float4` / `float8`
    Float,
    /// Arbitrary precision `numeric` and `money`
    Numeric,
    /// Dates, times, timestamps, and intervals
    Temporal,
    /// `bytea`
    Binary,
    /// Anything else
    Text,
}

impl ValueKind {
    /// Classifies a server type name as reported by sqlx (e.g. `INT4`,
    /// `TIMESTAMPTZ`, `TEXT[]`). Array types always render as text.
    pub fn from_type_name(type_name: &str) -> Self {
        let upper = type_name.to_ascii_uppercase();
        if upper.ends_with("[]") || upper.starts_with('_') {
            return Self::Text;
        }

        match upper.as_str() {
            "BOOL" | "BOOLEAN" => Self::Boolean,
            "INT2" | "INT4" | "INT8" | "SMALLINT" | "INTEGER" | "BIGINT" | "OID" | "XID"
            | "XID8" | "CID" => Self::Integer,
            "FLOAT4" | "FLOAT8" | "REAL" | "DOUBLE PRECISION" => Self::Float,
            "NUMERIC" | "DECIMAL" | "MONEY" => Self::Numeric,
            "DATE" | "TIME" | "TIMETZ" | "TIMESTAMP" | "TIMESTAMPTZ" | "INTERVAL" => {
                Self::Temporal
            }
            "BYTEA" => Self::Binary,
            _ => Self::Text,
        }
    }
}

/// Renders one raw server value as a delimited-file field.
pub fn render_value(kind: ValueKind, raw: Option<&str>) -> Cow<'_, str> {
    let Some(raw) = raw else {
        return Cow::Borrowed("");
    };

    match kind {
        ValueKind::Boolean => match raw {
            "t" | "true" => Cow::Borrowed("true"),
            "f" | "false" => Cow::Borrowed("false"),
            other => Cow::Borrowed(other),
        },
        ValueKind::Integer
        | ValueKind::Float
        | ValueKind::Numeric
        | ValueKind::Temporal
        | ValueKind::Binary
        | ValueKind::Text => Cow::Borrowed(raw),
    }
}
