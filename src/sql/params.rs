//! Convert serde_json::Value to a bindable text parameter. Placeholders carry the column cast.

use serde_json::Value;
use sqlx::encode::{Encode, IsNull};
use sqlx::postgres::{PgTypeInfo, Postgres};
use sqlx::Database;

/// A text (or NULL) parameter; the SQL side casts it with `$n::type`.
#[derive(Clone, Debug, PartialEq)]
pub enum PgBindValue {
    Null,
    Text(String),
}

impl PgBindValue {
    pub fn from_json(v: &Value) -> Self {
        match v {
            Value::Null => PgBindValue::Null,
            Value::String(s) => PgBindValue::Text(s.clone()),
            Value::Bool(b) => PgBindValue::Text(b.to_string()),
            Value::Number(n) => PgBindValue::Text(n.to_string()),
            Value::Array(_) | Value::Object(_) => PgBindValue::Text(v.to_string()),
        }
    }
}

impl<'q> Encode<'q, Postgres> for PgBindValue {
    fn encode_by_ref(
        &self,
        buf: &mut <Postgres as Database>::ArgumentBuffer<'q>,
    ) -> Result<IsNull, Box<dyn std::error::Error + Send + Sync>> {
        Ok(match self {
            PgBindValue::Null => <Option<&str> as Encode<Postgres>>::encode_by_ref(&None, buf)?,
            PgBindValue::Text(s) => <&str as Encode<Postgres>>::encode_by_ref(&s.as_str(), buf)?,
        })
    }
}

impl sqlx::Type<Postgres> for PgBindValue {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_name("TEXT")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalars_become_text() {
        assert_eq!(PgBindValue::from_json(&json!(5)), PgBindValue::Text("5".into()));
        assert_eq!(PgBindValue::from_json(&json!(true)), PgBindValue::Text("true".into()));
        assert_eq!(PgBindValue::from_json(&json!({"a": 1})), PgBindValue::Text("{\"a\":1}".into()));
        assert_eq!(PgBindValue::from_json(&Value::Null), PgBindValue::Null);
    }
}
