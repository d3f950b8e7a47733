//! Table definitions for the resolved model: one table per entity plus one per link table.

use crate::config::{EntitySpec, LinkTable, ResolvedModel};
use crate::error::ConfigError;
use crate::sql::builder::{columns, qualified_table, quoted};
use serde::Serialize;

/// One `CREATE TABLE IF NOT EXISTS` statement, kept as parts so templates can lay it out.
#[derive(Clone, Debug, Serialize)]
pub struct TableDef {
    pub name: String,
    pub qualified_name: String,
    /// Column and constraint lines, commas included.
    pub lines: Vec<String>,
}

impl TableDef {
    fn new(schema: &str, name: String, parts: Vec<String>) -> Self {
        let n = parts.len();
        let lines = parts
            .into_iter()
            .enumerate()
            .map(|(i, p)| if i + 1 < n { format!("{},", p) } else { p })
            .collect();
        TableDef {
            qualified_name: qualified_table(schema, &name),
            name,
            lines,
        }
    }

    pub fn to_sql(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
            self.qualified_name,
            self.lines.join("\n    ")
        )
    }
}

fn entity_table(model: &ResolvedModel, entity: &EntitySpec, schema: &str) -> Result<TableDef, ConfigError> {
    let pk = entity.require_one_pk()?;
    let mut parts = Vec::new();
    for c in columns(entity) {
        let storage = if let Some(f) = entity.field(&c.name) {
            f.storage_type().sql()
        } else if let Some(fk) = entity.fk(&c.name) {
            fk.references.storage_type().sql()
        } else {
            // created_at / updated_at
            "TIMESTAMPTZ".to_string()
        };
        let mut line = format!("{} {}", quoted(&c.name), storage);
        if !c.nullable {
            line.push_str(" NOT NULL");
        }
        match entity.field(&c.name).and_then(|f| f.default()) {
            Some(d) => line.push_str(&format!(" DEFAULT {}", d.sql())),
            None if c.has_default => line.push_str(" DEFAULT NOW()"),
            None => {}
        }
        parts.push(line);
    }
    parts.push(format!("PRIMARY KEY ({})", quoted(pk.name())));
    for (name, fk) in &entity.fk {
        let owner = model
            .entity(&fk.owner)
            .ok_or_else(|| ConfigError::Validation(format!("fk {} references unknown entity {}", name, fk.owner)))?;
        parts.push(format!(
            "FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE SET NULL",
            quoted(name),
            qualified_table(schema, &owner.table_name()),
            quoted(fk.references.name())
        ));
    }
    Ok(TableDef::new(schema, entity.table_name(), parts))
}

fn link_table(model: &ResolvedModel, link: &LinkTable, schema: &str) -> Result<TableDef, ConfigError> {
    let mut parts = Vec::new();
    let sides = [
        (&link.left, link.left_column(), &link.left_pk),
        (&link.right, link.right_column(), &link.right_pk),
    ];
    for (_, col, pk) in &sides {
        parts.push(format!("{} {} NOT NULL", quoted(col), pk.storage_type().sql()));
    }
    parts.push(format!(
        "PRIMARY KEY ({}, {})",
        quoted(&link.left_column()),
        quoted(&link.right_column())
    ));
    for (entity, col, pk) in &sides {
        let target = model
            .entity(entity)
            .ok_or_else(|| ConfigError::Validation(format!("link table {} references unknown entity {}", link.name(), entity)))?;
        parts.push(format!(
            "FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE CASCADE",
            quoted(col),
            qualified_table(schema, &target.table_name()),
            quoted(pk.name())
        ));
    }
    Ok(TableDef::new(schema, link.name(), parts))
}

/// Entity tables ordered so every FK target precedes its referrer, then link tables.
pub fn table_defs(model: &ResolvedModel, schema: &str) -> Result<Vec<TableDef>, ConfigError> {
    let mut emitted: Vec<&str> = Vec::new();
    let mut out = Vec::new();
    while emitted.len() < model.entities.len() {
        let before = emitted.len();
        for e in &model.entities {
            if emitted.contains(&e.name.as_str()) {
                continue;
            }
            let ready = e
                .fk
                .iter()
                .all(|(_, fk)| fk.owner == e.name || emitted.contains(&fk.owner.as_str()));
            if ready {
                out.push(entity_table(model, e, schema)?);
                emitted.push(&e.name);
            }
        }
        if emitted.len() == before {
            return Err(ConfigError::Validation("foreign keys form a cycle".into()));
        }
    }
    for lt in &model.link_tables {
        out.push(link_table(model, lt, schema)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{resolve, DefaultFactory, EntityDecl, FieldSpec, LinkDeclaration, ModelRegistry, StorageType, ValueType};

    fn id() -> FieldSpec {
        FieldSpec::new("id", ValueType::Uuid, StorageType::Uuid)
            .primary_key()
            .default_factory(DefaultFactory::NewUuid)
    }

    #[test]
    fn fk_targets_are_created_first() {
        // Sentence is registered before the Video it references.
        let registry = ModelRegistry::from_decls([
            EntityDecl::new("Sentence").field(id()),
            EntityDecl::new("Video")
                .field(id())
                .link(LinkDeclaration::one_to_many("Video", "Sentence")),
            EntityDecl::new("VideoStudy")
                .field(id())
                .link(LinkDeclaration::many_to_many("VideoStudy", "Video")),
        ])
        .unwrap();
        let model = resolve(&registry).unwrap();
        let defs = table_defs(&model, "public").unwrap();
        let names: Vec<&str> = defs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "__table_name_video",
                "__table_name_video_study",
                "__table_name_sentence",
                "link_table__video_study__and__video"
            ]
        );

        let sentence = defs[2].to_sql();
        assert!(sentence.starts_with("CREATE TABLE IF NOT EXISTS \"public\".\"__table_name_sentence\" ("));
        assert!(sentence.contains("\"id\" UUID NOT NULL DEFAULT gen_random_uuid(),"));
        assert!(sentence.contains("\"__fk__video_id\" UUID,"));
        assert!(sentence.contains("\"created_at\" TIMESTAMPTZ NOT NULL DEFAULT NOW(),"));
        assert!(sentence.contains(
            "FOREIGN KEY (\"__fk__video_id\") REFERENCES \"public\".\"__table_name_video\" (\"id\") ON DELETE SET NULL"
        ));

        let link = defs[3].to_sql();
        assert!(link.contains("PRIMARY KEY (\"video_study_id\", \"video_id\"),"));
        assert!(link.trim_end().ends_with("ON DELETE CASCADE\n)"));
    }
}
