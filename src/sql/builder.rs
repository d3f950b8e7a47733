//! Builds parameterized INSERT, SELECT, UPDATE, DELETE and link statements from resolved entities.

use crate::config::{EntitySpec, FkDescriptor, RelationshipEdge, RelationshipSide};
use crate::error::ConfigError;
use serde_json::Value;
use std::collections::HashMap;

/// Quote identifier for PostgreSQL (safe: only from declarations).
pub(crate) fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Full qualified table name.
pub(crate) fn qualified_table(schema: &str, table: &str) -> String {
    format!("{}.{}", quoted(schema), quoted(table))
}

pub const CREATED_AT: &str = "created_at";
pub const UPDATED_AT: &str = "updated_at";

pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    /// Push a parameter and return its `$n::cast` placeholder.
    fn push_param(&mut self, v: Value, cast: &str) -> String {
        self.params.push(v);
        format!("${}::{}", self.params.len(), cast)
    }
}

/// One physical column of an entity table.
#[derive(Clone, Debug, PartialEq)]
pub struct Column {
    pub name: String,
    pub cast: &'static str,
    pub primary_key: bool,
    pub nullable: bool,
    pub has_default: bool,
}

/// Declared fields, then FK columns, then the timestamp columns when not declared.
pub fn columns(entity: &EntitySpec) -> Vec<Column> {
    let mut cols: Vec<Column> = entity
        .fields
        .iter()
        .map(|f| Column {
            name: f.name().to_string(),
            cast: f.storage_type().pg_cast(),
            primary_key: f.is_primary_key(),
            nullable: f.is_optional() && !f.is_primary_key(),
            has_default: f.default().is_some(),
        })
        .collect();
    for (name, fk) in &entity.fk {
        cols.push(Column {
            name: name.clone(),
            cast: fk.references.storage_type().pg_cast(),
            primary_key: false,
            nullable: true,
            has_default: false,
        });
    }
    for ts in [CREATED_AT, UPDATED_AT] {
        if entity.field(ts).is_none() {
            cols.push(Column {
                name: ts.to_string(),
                cast: "timestamptz",
                primary_key: false,
                nullable: false,
                has_default: true,
            });
        }
    }
    cols
}

fn select_column_list(entity: &EntitySpec, alias: Option<&str>) -> String {
    columns(entity)
        .iter()
        .map(|c| match alias {
            Some(a) => format!("{}.{}", a, quoted(&c.name)),
            None => quoted(&c.name),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn pk_column(entity: &EntitySpec) -> Result<(String, &'static str), ConfigError> {
    let pk = entity.require_one_pk()?;
    Ok((pk.name().to_string(), pk.storage_type().pg_cast()))
}

fn limit_offset(limit: u32, offset: u32) -> String {
    format!(" LIMIT {} OFFSET {}", limit.min(1000), offset)
}

/// SELECT by primary key. Caller's id becomes the sole param.
pub fn select_by_id(entity: &EntitySpec, schema: &str, id: &Value) -> Result<QueryBuf, ConfigError> {
    let mut q = QueryBuf::new();
    let (pk, cast) = pk_column(entity)?;
    let ph = q.push_param(id.clone(), cast);
    q.sql = format!(
        "SELECT {} FROM {} WHERE {} = {}",
        select_column_list(entity, None),
        qualified_table(schema, &entity.table_name()),
        quoted(&pk),
        ph
    );
    Ok(q)
}

/// SELECT page ordered by primary key.
pub fn select_list(entity: &EntitySpec, schema: &str, limit: u32, offset: u32) -> Result<QueryBuf, ConfigError> {
    let mut q = QueryBuf::new();
    let (pk, _) = pk_column(entity)?;
    q.sql = format!(
        "SELECT {} FROM {} ORDER BY {}{}",
        select_column_list(entity, None),
        qualified_table(schema, &entity.table_name()),
        quoted(&pk),
        limit_offset(limit, offset)
    );
    Ok(q)
}

/// One relation embedded into a query route response.
pub struct RelationSelect<'a> {
    pub edge: &'a RelationshipEdge,
    pub target: &'a EntitySpec,
}

const MAIN_ALIAS: &str = "main";

/// Scalar subquery for one relation, correlated with the `main` alias: `row_to_json` for the one
/// side, `json_agg` for the many side and for link-table relations.
fn relation_subquery(entity: &EntitySpec, rel: &RelationSelect<'_>, schema: &str) -> Result<String, ConfigError> {
    let target = rel.target;
    let target_table = qualified_table(schema, &target.table_name());
    let (our_pk, _) = pk_column(entity)?;
    let (their_pk, _) = pk_column(target)?;
    let sub = match rel.edge.side {
        RelationshipSide::One => {
            let our_fk = FkDescriptor::fk_name(&target.name, &their_pk);
            return Ok(format!(
                "(SELECT row_to_json(sub) FROM (SELECT {} FROM {} WHERE {} = {}.{}) sub)",
                select_column_list(target, None),
                target_table,
                quoted(&their_pk),
                MAIN_ALIAS,
                quoted(&our_fk)
            ));
        }
        RelationshipSide::Many => {
            let their_fk = FkDescriptor::fk_name(&entity.name, &our_pk);
            format!(
                "SELECT {} FROM {} WHERE {} = {}.{} ORDER BY {}",
                select_column_list(target, None),
                target_table,
                quoted(&their_fk),
                MAIN_ALIAS,
                quoted(&our_pk),
                quoted(&their_pk)
            )
        }
        RelationshipSide::Both => {
            let link = rel
                .edge
                .link_table
                .as_ref()
                .ok_or_else(|| ConfigError::Validation(format!("relation {} -> {} has no link table", entity.name, target.name)))?;
            let (our_col, their_col) = link.columns_for(&entity.name);
            format!(
                "SELECT {} FROM {} t JOIN {} l ON l.{} = t.{} WHERE l.{} = {}.{} ORDER BY t.{}",
                select_column_list(target, Some("t")),
                target_table,
                qualified_table(schema, &link.name()),
                quoted(&their_col),
                quoted(&their_pk),
                quoted(&our_col),
                MAIN_ALIAS,
                quoted(&our_pk),
                quoted(&their_pk)
            )
        }
    };
    Ok(format!(
        "(SELECT COALESCE(json_agg(row_to_json(sub)), '[]'::json) FROM ({}) sub)",
        sub
    ))
}

/// SELECT with related rows embedded under each relation's include key.
/// `id` selects one row; otherwise a page ordered by primary key.
pub fn select_with_relations(
    entity: &EntitySpec,
    schema: &str,
    relations: &[RelationSelect<'_>],
    id: Option<&Value>,
    limit: u32,
    offset: u32,
) -> Result<QueryBuf, ConfigError> {
    let mut q = QueryBuf::new();
    let (pk, cast) = pk_column(entity)?;
    let mut select_parts = vec![select_column_list(entity, Some(MAIN_ALIAS))];
    for rel in relations {
        select_parts.push(format!(
            "{} AS {}",
            relation_subquery(entity, rel, schema)?,
            quoted(&rel.edge.include_key())
        ));
    }
    let tail = match id {
        Some(id) => {
            let ph = q.push_param(id.clone(), cast);
            format!(" WHERE {}.{} = {}", MAIN_ALIAS, quoted(&pk), ph)
        }
        None => format!(" ORDER BY {}.{}{}", MAIN_ALIAS, quoted(&pk), limit_offset(limit, offset)),
    };
    q.sql = format!(
        "SELECT {} FROM {} {}{}",
        select_parts.join(", "),
        qualified_table(schema, &entity.table_name()),
        MAIN_ALIAS,
        tail
    );
    Ok(q)
}

/// INSERT: only known columns present in body; omitted columns fall back to their DB default.
pub fn insert(entity: &EntitySpec, schema: &str, body: &HashMap<String, Value>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut cols = Vec::new();
    let mut placeholders = Vec::new();
    for c in columns(entity) {
        let Some(val) = body.get(&c.name) else { continue };
        if val.is_null() && c.has_default {
            continue;
        }
        placeholders.push(q.push_param(val.clone(), c.cast));
        cols.push(quoted(&c.name));
    }
    let table = qualified_table(schema, &entity.table_name());
    let returning = select_column_list(entity, None);
    q.sql = if cols.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES RETURNING {}", table, returning)
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
            table,
            cols.join(", "),
            placeholders.join(", "),
            returning
        )
    };
    q
}

/// UPDATE by id: SET only known non-key columns present in body; `updated_at` is refreshed.
pub fn update(entity: &EntitySpec, schema: &str, id: &Value, body: &HashMap<String, Value>) -> Result<QueryBuf, ConfigError> {
    let mut q = QueryBuf::new();
    let (pk, pk_cast) = pk_column(entity)?;
    let mut sets = Vec::new();
    // Column order keeps the SQL stable regardless of body key order.
    for c in columns(entity) {
        if c.primary_key || c.name == UPDATED_AT {
            continue;
        }
        let Some(v) = body.get(&c.name) else { continue };
        let ph = q.push_param(v.clone(), c.cast);
        sets.push(format!("{} = {}", quoted(&c.name), ph));
    }
    sets.push(format!("{} = NOW()", quoted(UPDATED_AT)));
    let id_ph = q.push_param(id.clone(), pk_cast);
    q.sql = format!(
        "UPDATE {} SET {} WHERE {} = {} RETURNING {}",
        qualified_table(schema, &entity.table_name()),
        sets.join(", "),
        quoted(&pk),
        id_ph,
        select_column_list(entity, None)
    );
    Ok(q)
}

/// DELETE by id.
pub fn delete_by_id(entity: &EntitySpec, schema: &str, id: &Value) -> Result<QueryBuf, ConfigError> {
    let mut q = QueryBuf::new();
    let (pk, cast) = pk_column(entity)?;
    let ph = q.push_param(id.clone(), cast);
    q.sql = format!(
        "DELETE FROM {} WHERE {} = {} RETURNING {}",
        qualified_table(schema, &entity.table_name()),
        quoted(&pk),
        ph,
        select_column_list(entity, None)
    );
    Ok(q)
}

/// DELETE every row.
pub fn delete_all(entity: &EntitySpec, schema: &str) -> QueryBuf {
    let mut q = QueryBuf::new();
    q.sql = format!("DELETE FROM {}", qualified_table(schema, &entity.table_name()));
    q
}

/// Link or unlink `id` (of `entity`) and `target_id` (of `target`) along `edge`.
/// One/many edges set or clear the FK on the many side; link-table edges insert or delete a row.
pub fn link(
    entity: &EntitySpec,
    target: &EntitySpec,
    edge: &RelationshipEdge,
    schema: &str,
    id: &Value,
    target_id: &Value,
    unlink: bool,
) -> Result<QueryBuf, ConfigError> {
    let mut q = QueryBuf::new();
    let (our_pk, our_cast) = pk_column(entity)?;
    let (their_pk, their_cast) = pk_column(target)?;
    q.sql = match edge.side {
        // We hold the FK to the target.
        RelationshipSide::One => {
            let fk = FkDescriptor::fk_name(&target.name, &their_pk);
            let value = if unlink { Value::Null } else { target_id.clone() };
            let set = q.push_param(value, their_cast);
            let who = q.push_param(id.clone(), our_cast);
            let mut sql = format!(
                "UPDATE {} SET {} = {}, {} = NOW() WHERE {} = {}",
                qualified_table(schema, &entity.table_name()),
                quoted(&fk),
                set,
                quoted(UPDATED_AT),
                quoted(&our_pk),
                who
            );
            if unlink {
                let only = q.push_param(target_id.clone(), their_cast);
                sql.push_str(&format!(" AND {} = {}", quoted(&fk), only));
            }
            sql
        }
        // The target holds the FK to us.
        RelationshipSide::Many => {
            let fk = FkDescriptor::fk_name(&entity.name, &our_pk);
            let value = if unlink { Value::Null } else { id.clone() };
            let set = q.push_param(value, our_cast);
            let who = q.push_param(target_id.clone(), their_cast);
            let mut sql = format!(
                "UPDATE {} SET {} = {}, {} = NOW() WHERE {} = {}",
                qualified_table(schema, &target.table_name()),
                quoted(&fk),
                set,
                quoted(UPDATED_AT),
                quoted(&their_pk),
                who
            );
            if unlink {
                let only = q.push_param(id.clone(), our_cast);
                sql.push_str(&format!(" AND {} = {}", quoted(&fk), only));
            }
            sql
        }
        RelationshipSide::Both => {
            let lt = edge
                .link_table
                .as_ref()
                .ok_or_else(|| ConfigError::Validation(format!("relation {} -> {} has no link table", entity.name, target.name)))?;
            let (our_col, their_col) = lt.columns_for(&entity.name);
            let ours = q.push_param(id.clone(), our_cast);
            let theirs = q.push_param(target_id.clone(), their_cast);
            let table = qualified_table(schema, &lt.name());
            if unlink {
                format!(
                    "DELETE FROM {} WHERE {} = {} AND {} = {}",
                    table,
                    quoted(&our_col),
                    ours,
                    quoted(&their_col),
                    theirs
                )
            } else {
                format!(
                    "INSERT INTO {} ({}, {}) VALUES ({}, {}) ON CONFLICT DO NOTHING",
                    table,
                    quoted(&our_col),
                    quoted(&their_col),
                    ours,
                    theirs
                )
            }
        }
    };
    Ok(q)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{resolve, DefaultFactory, EntityDecl, FieldSpec, LinkDeclaration, ModelRegistry, ResolvedModel, StorageType, ValueType};
    use serde_json::json;

    fn model() -> ResolvedModel {
        let id = || {
            FieldSpec::new("id", ValueType::Uuid, StorageType::Uuid)
                .primary_key()
                .default_factory(DefaultFactory::NewUuid)
        };
        let registry = ModelRegistry::from_decls([
            EntityDecl::new("VideoStudy")
                .field(id())
                .link(LinkDeclaration::many_to_many("VideoStudy", "Video")),
            EntityDecl::new("Video")
                .field(id())
                .field(FieldSpec::new("name", ValueType::String, StorageType::Varchar(255)).default_value(json!("")))
                .link(LinkDeclaration::one_to_many("Video", "Sentence")),
            EntityDecl::new("Sentence")
                .field(id())
                .field(FieldSpec::new("index", ValueType::Int, StorageType::Integer).default_value(json!(0))),
        ])
        .unwrap();
        resolve(&registry).unwrap()
    }

    #[test]
    fn columns_include_fk_and_timestamps() {
        let m = model();
        let names: Vec<String> = columns(m.entity("Sentence").unwrap()).into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["id", "index", "__fk__video_id", "created_at", "updated_at"]);
    }

    #[test]
    fn insert_casts_placeholders_and_skips_unknown() {
        let m = model();
        let body: HashMap<String, Value> = [("index".to_string(), json!(3)), ("bogus".to_string(), json!(1))].into();
        let q = insert(m.entity("Sentence").unwrap(), "public", &body);
        assert!(q.sql.starts_with("INSERT INTO \"public\".\"__table_name_sentence\" (\"index\") VALUES ($1::integer)"));
        assert_eq!(q.params, vec![json!(3)]);
    }

    #[test]
    fn update_refreshes_updated_at_and_binds_id_last() {
        let m = model();
        let body: HashMap<String, Value> = [("name".to_string(), json!("x")), ("id".to_string(), json!("ignored"))].into();
        let q = update(m.entity("Video").unwrap(), "public", &json!("abc"), &body).unwrap();
        assert!(q.sql.contains("SET \"name\" = $1::varchar, \"updated_at\" = NOW() WHERE \"id\" = $2::uuid"));
        assert_eq!(q.params, vec![json!("x"), json!("abc")]);
    }

    #[test]
    fn relation_subqueries_by_side() {
        let m = model();
        let video = m.entity("Video").unwrap();
        let rels: Vec<RelationSelect<'_>> = video
            .relationships
            .iter()
            .map(|edge| RelationSelect {
                edge,
                target: m.entity(&edge.target).unwrap(),
            })
            .collect();
        let q = select_with_relations(video, "public", &rels, None, 10, 0).unwrap();
        assert!(q.sql.contains("JOIN \"public\".\"link_table__video_study__and__video\" l ON l.\"video_study_id\" = t.\"id\" WHERE l.\"video_id\" = main.\"id\""));
        assert!(q.sql.contains("WHERE \"__fk__video_id\" = main.\"id\""));
        assert!(q.sql.contains("AS \"video_studies\""));
        assert!(q.sql.contains("AS \"sentences\""));
        assert!(q.sql.ends_with("ORDER BY main.\"id\" LIMIT 10 OFFSET 0"));

        let sentence = m.entity("Sentence").unwrap();
        let rel = RelationSelect {
            edge: &sentence.relationships[0],
            target: video,
        };
        let q = select_with_relations(sentence, "public", &[rel], Some(&json!("s1")), 100, 0).unwrap();
        assert!(q.sql.contains("(SELECT row_to_json(sub) FROM (SELECT"));
        assert!(q.sql.contains("WHERE \"id\" = main.\"__fk__video_id\") sub) AS \"video\""));
        assert!(q.sql.ends_with("WHERE main.\"id\" = $1::uuid"));
    }

    #[test]
    fn link_statements_by_side() {
        let m = model();
        let video = m.entity("Video").unwrap();
        let sentence = m.entity("Sentence").unwrap();
        let study = m.entity("VideoStudy").unwrap();

        let q = link(video, sentence, &video.relationships[1], "public", &json!("v"), &json!("s"), false).unwrap();
        assert!(q.sql.starts_with("UPDATE \"public\".\"__table_name_sentence\" SET \"__fk__video_id\" = $1::uuid"));
        assert_eq!(q.params, vec![json!("v"), json!("s")]);

        let q = link(sentence, video, &sentence.relationships[0], "public", &json!("s"), &json!("v"), true).unwrap();
        assert_eq!(q.params, vec![Value::Null, json!("s"), json!("v")]);

        let q = link(video, study, &video.relationships[0], "public", &json!("v"), &json!("vs"), false).unwrap();
        assert!(q.sql.starts_with("INSERT INTO \"public\".\"link_table__video_study__and__video\" (\"video_id\", \"video_study_id\")"));
        assert!(q.sql.ends_with("ON CONFLICT DO NOTHING"));
    }
}
