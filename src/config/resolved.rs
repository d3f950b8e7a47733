//! Resolved entity model: declarations with relationships, foreign keys and link tables attached.

use crate::case::{plural, to_snake_case};
use crate::config::types::{FieldSpec, ValueType};
use crate::error::ConfigError;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Which side of a link the owning entity sees the target on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipSide {
    /// Target is the one side (we hold the FK).
    One,
    /// Target is the many side (they hold an FK to us).
    Many,
    /// Many-to-many through a link table.
    Both,
}

/// Join table backing one many-to-many declaration. Shared by both endpoint edges.
#[derive(Clone, Debug, PartialEq)]
pub struct LinkTable {
    pub left: String,
    pub right: String,
    pub left_pk: FieldSpec,
    pub right_pk: FieldSpec,
}

impl LinkTable {
    pub fn name(&self) -> String {
        format!(
            "link_table__{}__and__{}",
            to_snake_case(&self.left),
            to_snake_case(&self.right)
        )
    }

    pub fn left_column(&self) -> String {
        format!("{}_{}", to_snake_case(&self.left), self.left_pk.name())
    }

    pub fn right_column(&self) -> String {
        format!("{}_{}", to_snake_case(&self.right), self.right_pk.name())
    }

    /// (our column, their column) as seen from `entity`.
    pub fn columns_for(&self, entity: &str) -> (String, String) {
        if entity == self.left {
            (self.left_column(), self.right_column())
        } else {
            (self.right_column(), self.left_column())
        }
    }
}

/// Resolved, directional view of one link from the owning entity.
#[derive(Clone, Debug, PartialEq)]
pub struct RelationshipEdge {
    pub target: String,
    pub side: RelationshipSide,
    pub link_table: Option<Arc<LinkTable>>,
}

impl RelationshipEdge {
    pub fn target_snake(&self) -> String {
        to_snake_case(&self.target)
    }

    /// Key under which related rows are embedded in query responses.
    pub fn include_key(&self) -> String {
        match self.side {
            RelationshipSide::One => to_snake_case(&self.target),
            RelationshipSide::Many | RelationshipSide::Both => plural(&to_snake_case(&self.target)),
        }
    }
}

/// Foreign key placed on the many side of a one-to-many link.
#[derive(Clone, Debug, PartialEq)]
pub struct FkDescriptor {
    pub references: FieldSpec,
    pub owner: String,
}

impl FkDescriptor {
    pub fn fk_name(owner: &str, pk_name: &str) -> String {
        format!("__fk__{}_{}", to_snake_case(owner), pk_name)
    }
}

/// Foreign keys of one entity, keyed by fk name (also the column name), in link declaration order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ForeignKeys {
    entries: Vec<(String, FkDescriptor)>,
}

impl ForeignKeys {
    /// Fails when `name` is already taken.
    pub fn insert(&mut self, entity: &str, name: String, fk: FkDescriptor) -> Result<(), ConfigError> {
        if self.get(&name).is_some() {
            return Err(ConfigError::DuplicateForeignKey {
                entity: entity.to_string(),
                fk: name,
            });
        }
        self.entries.push((name, fk));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&FkDescriptor> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, d)| d)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, (String, FkDescriptor)> {
        self.entries.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> IntoIterator for &'a ForeignKeys {
    type Item = &'a (String, FkDescriptor);
    type IntoIter = std::slice::Iter<'a, (String, FkDescriptor)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Primary key type for parsing path/query/body ids.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PkType {
    Uuid,
    BigInt,
    Int,
    Text,
}

impl From<ValueType> for PkType {
    fn from(v: ValueType) -> Self {
        match v {
            ValueType::Uuid => PkType::Uuid,
            ValueType::BigInt => PkType::BigInt,
            ValueType::Int => PkType::Int,
            _ => PkType::Text,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct EntitySpec {
    pub name: String,
    pub title: Option<String>,
    pub fields: Vec<FieldSpec>,
    /// Appended in link declaration order during resolution.
    pub relationships: Vec<RelationshipEdge>,
    pub fk: ForeignKeys,
}

impl EntitySpec {
    pub fn snake_name(&self) -> String {
        to_snake_case(&self.name)
    }

    pub fn plural_name(&self) -> String {
        plural(&self.name)
    }

    pub fn snake_plural_name(&self) -> String {
        plural(&self.snake_name())
    }

    pub fn table_name(&self) -> String {
        format!("__table_name_{}", self.snake_name())
    }

    pub fn base_schema_name(&self) -> String {
        format!("{}Schema", self.name)
    }

    pub fn primary_keys(&self) -> Vec<&FieldSpec> {
        self.fields.iter().filter(|f| f.is_primary_key()).collect()
    }

    /// The single primary key. Fails with `UnsupportedKeyShape` for none or several.
    pub fn require_one_pk(&self) -> Result<&FieldSpec, ConfigError> {
        match self.primary_keys().as_slice() {
            [pk] => Ok(pk),
            other => Err(ConfigError::UnsupportedKeyShape {
                entity: self.name.clone(),
                count: other.len(),
            }),
        }
    }

    pub fn pk_type(&self) -> Result<PkType, ConfigError> {
        Ok(PkType::from(self.require_one_pk()?.value_type()))
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name() == name)
    }

    pub fn fk(&self, name: &str) -> Option<&FkDescriptor> {
        self.fk.get(name)
    }

    pub fn relationship_to(&self, target: &str) -> Option<&RelationshipEdge> {
        self.relationships.iter().find(|r| r.target == target)
    }
}

#[derive(Clone, Debug)]
pub struct ResolvedModel {
    pub entities: Vec<EntitySpec>,
    pub link_tables: Vec<Arc<LinkTable>>,
    pub(crate) entity_by_name: HashMap<String, usize>,
    pub(crate) entity_by_snake: HashMap<String, usize>,
}

impl ResolvedModel {
    pub(crate) fn new(entities: Vec<EntitySpec>, link_tables: Vec<Arc<LinkTable>>) -> Self {
        let entity_by_name = entities.iter().enumerate().map(|(i, e)| (e.name.clone(), i)).collect();
        let entity_by_snake = entities.iter().enumerate().map(|(i, e)| (e.snake_name(), i)).collect();
        ResolvedModel {
            entities,
            link_tables,
            entity_by_name,
            entity_by_snake,
        }
    }

    pub fn entity(&self, name: &str) -> Option<&EntitySpec> {
        self.entity_by_name.get(name).map(|&i| &self.entities[i])
    }

    /// Lookup by snake_case name, as used in URL prefixes.
    pub fn entity_by_snake(&self, snake: &str) -> Option<&EntitySpec> {
        self.entity_by_snake.get(snake).map(|&i| &self.entities[i])
    }
}
