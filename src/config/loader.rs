//! Load model declarations from a JSON file and resolve a registry into the relationship graph.

use crate::config::registry::{DeclaredLink, ModelRegistry};
use crate::config::resolved::{EntitySpec, FkDescriptor, ForeignKeys, LinkTable, RelationshipEdge, RelationshipSide, ResolvedModel};
use crate::config::types::{EntityConfig, EntityDecl, FieldSpec, LinkDeclaration};
use crate::config::validate;
use crate::error::ConfigError;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Build the resolved model from a registry (validates first). The registry is left untouched,
/// so every call starts from a fresh graph.
pub fn resolve(registry: &ModelRegistry) -> Result<ResolvedModel, ConfigError> {
    validate(registry)?;

    let mut entities: Vec<EntitySpec> = registry
        .entities()
        .iter()
        .map(|d| EntitySpec {
            name: d.name.clone(),
            title: d.title.clone(),
            fields: d.fields.clone(),
            relationships: Vec::new(),
            fk: ForeignKeys::default(),
        })
        .collect();
    let index: HashMap<String, usize> = entities.iter().enumerate().map(|(i, e)| (e.name.clone(), i)).collect();
    let mut link_tables = Vec::new();

    for DeclaredLink { declared_by, link } in registry.links() {
        match link {
            LinkDeclaration::OneToMany { one, many } => {
                let pk = single_pk(&entities[index[one]], true)?;
                let fk_name = FkDescriptor::fk_name(one, pk.name());
                tracing::debug!(declared_by = %declared_by, one = %one, many = %many, fk = %fk_name, "resolved one-to-many");
                entities[index[many]].fk.insert(
                    many,
                    fk_name,
                    FkDescriptor {
                        references: pk,
                        owner: one.clone(),
                    },
                )?;
                entities[index[one]].relationships.push(RelationshipEdge {
                    target: many.clone(),
                    side: RelationshipSide::Many,
                    link_table: None,
                });
                entities[index[many]].relationships.push(RelationshipEdge {
                    target: one.clone(),
                    side: RelationshipSide::One,
                    link_table: None,
                });
            }
            LinkDeclaration::ManyToMany { left, right } => {
                let left_pk = single_pk(&entities[index[left]], false)?;
                let right_pk = single_pk(&entities[index[right]], false)?;
                let table = Arc::new(LinkTable {
                    left: left.clone(),
                    right: right.clone(),
                    left_pk,
                    right_pk,
                });
                tracing::debug!(declared_by = %declared_by, left = %left, right = %right, table = %table.name(), "resolved many-to-many");
                entities[index[left]].relationships.push(RelationshipEdge {
                    target: right.clone(),
                    side: RelationshipSide::Both,
                    link_table: Some(Arc::clone(&table)),
                });
                entities[index[right]].relationships.push(RelationshipEdge {
                    target: left.clone(),
                    side: RelationshipSide::Both,
                    link_table: Some(Arc::clone(&table)),
                });
                link_tables.push(table);
            }
        }
    }

    tracing::info!(
        entities = entities.len(),
        links = registry.links().len(),
        link_tables = link_tables.len(),
        "resolved model"
    );
    Ok(ResolvedModel::new(entities, link_tables))
}

/// The one primary key of a link endpoint. The one-side of a one-to-many link reports extra keys
/// as `MultiplePrimaryKeys`; every other shape mismatch is `UnsupportedKeyShape`.
fn single_pk(entity: &EntitySpec, one_side: bool) -> Result<FieldSpec, ConfigError> {
    let pks = entity.primary_keys();
    match pks.len() {
        1 => Ok(pks[0].clone()),
        n if n > 1 && one_side => Err(ConfigError::MultiplePrimaryKeys {
            entity: entity.name.clone(),
            count: n,
        }),
        n => Err(ConfigError::UnsupportedKeyShape {
            entity: entity.name.clone(),
            count: n,
        }),
    }
}

/// Read entity declarations from a JSON file holding an array of entities.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<Vec<EntityDecl>, ConfigError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
    let configs: Vec<EntityConfig> =
        serde_json::from_str(&raw).map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
    tracing::debug!(path = %path.display(), entities = configs.len(), "loaded model declarations");
    configs.into_iter().map(EntityDecl::try_from).collect()
}

/// Load and register every declaration from a JSON models file.
pub fn load_registry(path: impl AsRef<Path>) -> Result<ModelRegistry, ConfigError> {
    ModelRegistry::from_decls(load_from_path(path)?)
}
