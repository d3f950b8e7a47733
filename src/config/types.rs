//! Declaration types: fields, entities and links, as written in a models file or built in code.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Language-level type of a field value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Uuid,
    String,
    Int,
    BigInt,
    Float,
    Bool,
    DateTime,
    Json,
}

impl ValueType {
    /// Rust type used in generated schemas.
    pub fn rust_type(self) -> &'static str {
        match self {
            ValueType::Uuid => "uuid::Uuid",
            ValueType::String => "String",
            ValueType::Int => "i32",
            ValueType::BigInt => "i64",
            ValueType::Float => "f64",
            ValueType::Bool => "bool",
            ValueType::DateTime => "chrono::DateTime<chrono::Utc>",
            ValueType::Json => "serde_json::Value",
        }
    }
}

/// Backing-store column type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageType {
    Uuid,
    Varchar(u32),
    Text,
    Integer,
    BigInt,
    Double,
    Boolean,
    Timestamptz,
    Jsonb,
}

impl StorageType {
    /// PostgreSQL column type.
    pub fn sql(self) -> String {
        match self {
            StorageType::Uuid => "UUID".into(),
            StorageType::Varchar(n) => format!("VARCHAR({})", n),
            StorageType::Text => "TEXT".into(),
            StorageType::Integer => "INTEGER".into(),
            StorageType::BigInt => "BIGINT".into(),
            StorageType::Double => "DOUBLE PRECISION".into(),
            StorageType::Boolean => "BOOLEAN".into(),
            StorageType::Timestamptz => "TIMESTAMPTZ".into(),
            StorageType::Jsonb => "JSONB".into(),
        }
    }

    /// Cast applied to placeholders; every value is bound as text and cast to the column type.
    pub fn pg_cast(self) -> &'static str {
        match self {
            StorageType::Uuid => "uuid",
            StorageType::Varchar(_) => "varchar",
            StorageType::Text => "text",
            StorageType::Integer => "integer",
            StorageType::BigInt => "bigint",
            StorageType::Double => "double precision",
            StorageType::Boolean => "boolean",
            StorageType::Timestamptz => "timestamptz",
            StorageType::Jsonb => "jsonb",
        }
    }
}

/// Value generated at insert time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultFactory {
    NewUuid,
    Now,
}

impl DefaultFactory {
    pub fn sql(self) -> &'static str {
        match self {
            DefaultFactory::NewUuid => "gen_random_uuid()",
            DefaultFactory::Now => "NOW()",
        }
    }
}

/// Column default: a literal value or a factory, never both.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldDefault {
    Value(serde_json::Value),
    Factory(DefaultFactory),
}

impl FieldDefault {
    /// SQL expression for the DDL `DEFAULT` clause.
    pub fn sql(&self) -> String {
        match self {
            FieldDefault::Factory(f) => f.sql().to_string(),
            FieldDefault::Value(serde_json::Value::String(s)) => format!("'{}'", s.replace('\'', "''")),
            FieldDefault::Value(serde_json::Value::Null) => "NULL".into(),
            FieldDefault::Value(v @ serde_json::Value::Array(_))
            | FieldDefault::Value(v @ serde_json::Value::Object(_)) => {
                format!("'{}'::jsonb", v.to_string().replace('\'', "''"))
            }
            FieldDefault::Value(v) => v.to_string(),
        }
    }
}

/// Raw field as written in a models file. Converted to [`FieldSpec`] through `TryFrom`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FieldConfig {
    pub name: String,
    pub value_type: ValueType,
    pub storage_type: StorageType,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub default: Option<serde_json::Value>,
    #[serde(default)]
    pub default_factory: Option<DefaultFactory>,
}

/// One declared field. Immutable after creation.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldSpec {
    name: String,
    value_type: ValueType,
    storage_type: StorageType,
    primary_key: bool,
    optional: bool,
    default: Option<FieldDefault>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, value_type: ValueType, storage_type: StorageType) -> Self {
        FieldSpec {
            name: name.into(),
            value_type,
            storage_type,
            primary_key: false,
            optional: false,
            default: None,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn default_value(mut self, value: serde_json::Value) -> Self {
        self.default = Some(FieldDefault::Value(value));
        self
    }

    pub fn default_factory(mut self, factory: DefaultFactory) -> Self {
        self.default = Some(FieldDefault::Factory(factory));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    pub fn storage_type(&self) -> StorageType {
        self.storage_type
    }

    pub fn is_primary_key(&self) -> bool {
        self.primary_key
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    pub fn default(&self) -> Option<&FieldDefault> {
        self.default.as_ref()
    }

    /// Whether a create request may omit this field.
    pub fn may_be_omitted(&self) -> bool {
        self.optional || self.default.is_some()
    }
}

impl TryFrom<FieldConfig> for FieldSpec {
    type Error = ConfigError;

    fn try_from(raw: FieldConfig) -> Result<Self, Self::Error> {
        let default = match (raw.default, raw.default_factory) {
            (Some(_), Some(_)) => {
                return Err(ConfigError::InvalidField {
                    entity: String::new(),
                    field: raw.name,
                    reason: "default and default_factory can not both exist".into(),
                })
            }
            (Some(v), None) => Some(FieldDefault::Value(v)),
            (None, Some(f)) => Some(FieldDefault::Factory(f)),
            (None, None) => None,
        };
        Ok(FieldSpec {
            name: raw.name,
            value_type: raw.value_type,
            storage_type: raw.storage_type,
            primary_key: raw.primary_key,
            optional: raw.optional,
            default,
        })
    }
}

/// Declared association between two entities, by name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LinkDeclaration {
    OneToMany { one: String, many: String },
    ManyToMany { left: String, right: String },
}

impl LinkDeclaration {
    pub fn one_to_many(one: impl Into<String>, many: impl Into<String>) -> Self {
        LinkDeclaration::OneToMany {
            one: one.into(),
            many: many.into(),
        }
    }

    pub fn many_to_many(left: impl Into<String>, right: impl Into<String>) -> Self {
        LinkDeclaration::ManyToMany {
            left: left.into(),
            right: right.into(),
        }
    }

    /// (source, target) of the directed declaration edge.
    pub fn two_sides(&self) -> (&str, &str) {
        match self {
            LinkDeclaration::OneToMany { one, many } => (one, many),
            LinkDeclaration::ManyToMany { left, right } => (left, right),
        }
    }

    pub fn label(&self) -> String {
        match self {
            LinkDeclaration::OneToMany { one, many } => format!("OneToMany({}, {})", one, many),
            LinkDeclaration::ManyToMany { left, right } => format!("ManyToMany({}, {})", left, right),
        }
    }
}

/// Raw entity as written in a models file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EntityConfig {
    pub name: String,
    #[serde(default)]
    pub title: Option<String>,
    pub fields: Vec<FieldConfig>,
    #[serde(default)]
    pub links: Vec<LinkDeclaration>,
}

/// Entity declaration handed to the registry.
#[derive(Clone, Debug, PartialEq)]
pub struct EntityDecl {
    pub name: String,
    pub title: Option<String>,
    pub fields: Vec<FieldSpec>,
    pub links: Vec<LinkDeclaration>,
}

impl EntityDecl {
    pub fn new(name: impl Into<String>) -> Self {
        EntityDecl {
            name: name.into(),
            title: None,
            fields: Vec::new(),
            links: Vec::new(),
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    pub fn link(mut self, link: LinkDeclaration) -> Self {
        self.links.push(link);
        self
    }
}

impl TryFrom<EntityConfig> for EntityDecl {
    type Error = ConfigError;

    fn try_from(raw: EntityConfig) -> Result<Self, Self::Error> {
        let mut fields = Vec::with_capacity(raw.fields.len());
        for f in raw.fields {
            let spec = FieldSpec::try_from(f).map_err(|e| match e {
                ConfigError::InvalidField { field, reason, .. } => ConfigError::InvalidField {
                    entity: raw.name.clone(),
                    field,
                    reason,
                },
                other => other,
            })?;
            fields.push(spec);
        }
        Ok(EntityDecl {
            name: raw.name,
            title: raw.title,
            fields,
            links: raw.links,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_and_factory_are_exclusive() {
        let raw: EntityConfig = serde_json::from_value(serde_json::json!({
            "name": "Video",
            "fields": [{
                "name": "id",
                "value_type": "uuid",
                "storage_type": "uuid",
                "primary_key": true,
                "default": "x",
                "default_factory": "new_uuid"
            }]
        }))
        .unwrap();
        let err = EntityDecl::try_from(raw).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidField { ref entity, ref field, .. } if entity == "Video" && field == "id"));
    }

    #[test]
    fn parses_links_and_varchar() {
        let raw: EntityConfig = serde_json::from_value(serde_json::json!({
            "name": "Video",
            "fields": [
                { "name": "id", "value_type": "uuid", "storage_type": "uuid", "primary_key": true, "default_factory": "new_uuid" },
                { "name": "name", "value_type": "string", "storage_type": { "varchar": 255 }, "default": "" }
            ],
            "links": [{ "kind": "one_to_many", "one": "Video", "many": "Sentence" }]
        }))
        .unwrap();
        let decl = EntityDecl::try_from(raw).unwrap();
        assert_eq!(decl.fields[1].storage_type().sql(), "VARCHAR(255)");
        assert_eq!(decl.fields[1].default().map(FieldDefault::sql), Some("''".to_string()));
        assert_eq!(decl.links[0], LinkDeclaration::one_to_many("Video", "Sentence"));
    }

    #[test]
    fn default_sql_rendering() {
        assert_eq!(FieldDefault::Factory(DefaultFactory::Now).sql(), "NOW()");
        assert_eq!(FieldDefault::Value(serde_json::json!(0)).sql(), "0");
        assert_eq!(FieldDefault::Value(serde_json::json!("it's")).sql(), "'it''s'");
    }
}
