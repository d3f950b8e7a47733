//! Model registry: declared entities and links, in registration order.
//! An explicit context object; build it once at startup, then hand it to `resolve`.

use crate::config::types::{EntityDecl, LinkDeclaration};
use crate::error::ConfigError;
use crate::case::to_snake_case;
use std::collections::HashMap;

/// Names that generated code cannot use as fields or modules, not even as raw identifiers.
const RESERVED_IDENTIFIERS: &[&str] = &["self", "Self", "super", "crate", "_"];

/// Position of a registered entity in the registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EntityHandle(usize);

impl EntityHandle {
    pub fn index(self) -> usize {
        self.0
    }
}

/// One declared link together with the entity that declared it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeclaredLink {
    pub declared_by: String,
    pub link: LinkDeclaration,
}

#[derive(Clone, Debug, Default)]
pub struct ModelRegistry {
    entities: Vec<EntityDecl>,
    by_name: HashMap<String, usize>,
    links: Vec<DeclaredLink>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        ModelRegistry::default()
    }

    /// Build a registry from declarations in order. Fails on the first rejected declaration.
    pub fn from_decls(decls: impl IntoIterator<Item = EntityDecl>) -> Result<Self, ConfigError> {
        let mut registry = ModelRegistry::new();
        for decl in decls {
            registry.register(decl)?;
        }
        Ok(registry)
    }

    /// Register one entity. Names must be unique; a second declaration of the same name is rejected.
    pub fn register(&mut self, decl: EntityDecl) -> Result<EntityHandle, ConfigError> {
        if decl.name.is_empty() {
            return Err(ConfigError::Validation("entity name must not be empty".into()));
        }
        if self.by_name.contains_key(&decl.name) {
            return Err(ConfigError::DuplicateEntity(decl.name));
        }
        let snake = to_snake_case(&decl.name);
        if RESERVED_IDENTIFIERS.contains(&snake.as_str()) {
            return Err(ConfigError::Validation(format!(
                "entity {} maps to reserved identifier {}",
                decl.name, snake
            )));
        }
        let mut seen = std::collections::HashSet::new();
        for f in &decl.fields {
            if RESERVED_IDENTIFIERS.contains(&f.name()) {
                return Err(ConfigError::InvalidField {
                    entity: decl.name.clone(),
                    field: f.name().to_string(),
                    reason: "reserved identifier".into(),
                });
            }
            if !seen.insert(f.name()) {
                return Err(ConfigError::InvalidField {
                    entity: decl.name.clone(),
                    field: f.name().to_string(),
                    reason: "declared twice".into(),
                });
            }
        }
        for link in &decl.links {
            self.links.push(DeclaredLink {
                declared_by: decl.name.clone(),
                link: link.clone(),
            });
        }
        let idx = self.entities.len();
        tracing::debug!(entity = %decl.name, fields = decl.fields.len(), links = decl.links.len(), "registered entity");
        self.by_name.insert(decl.name.clone(), idx);
        self.entities.push(decl);
        Ok(EntityHandle(idx))
    }

    pub fn entity(&self, name: &str) -> Option<&EntityDecl> {
        self.by_name.get(name).map(|&i| &self.entities[i])
    }

    pub fn get(&self, handle: EntityHandle) -> Option<&EntityDecl> {
        self.entities.get(handle.0)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Entities in registration order.
    pub fn entities(&self) -> &[EntityDecl] {
        &self.entities
    }

    /// All declared links: entity registration order, then declaration order within the entity.
    pub fn links(&self) -> &[DeclaredLink] {
        &self.links
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::{FieldSpec, StorageType, ValueType};

    #[test]
    fn rejects_duplicate_entity() {
        let mut r = ModelRegistry::new();
        r.register(EntityDecl::new("Video")).unwrap();
        let err = r.register(EntityDecl::new("Video")).unwrap_err();
        assert_eq!(err, ConfigError::DuplicateEntity("Video".into()));
        assert_eq!(r.len(), 1);
    }

    #[test]
    fn rejects_duplicate_field() {
        let decl = EntityDecl::new("Video")
            .field(FieldSpec::new("id", ValueType::Uuid, StorageType::Uuid))
            .field(FieldSpec::new("id", ValueType::Uuid, StorageType::Uuid));
        assert!(matches!(
            ModelRegistry::new().register(decl),
            Err(ConfigError::InvalidField { .. })
        ));
    }

    #[test]
    fn keeps_link_declaration_order() {
        let r = ModelRegistry::from_decls([
            EntityDecl::new("A").link(LinkDeclaration::one_to_many("A", "B")),
            EntityDecl::new("B").link(LinkDeclaration::many_to_many("B", "C")),
            EntityDecl::new("C"),
        ])
        .unwrap();
        let sides: Vec<_> = r.links().iter().map(|l| l.link.two_sides()).collect();
        assert_eq!(sides, vec![("A", "B"), ("B", "C")]);
        assert_eq!(r.links()[1].declared_by, "B");
        let h = EntityHandle(2);
        assert_eq!(r.get(h).map(|d| d.name.as_str()), Some("C"));
    }

    #[test]
    fn rejects_names_that_cannot_be_identifiers() {
        let mut r = ModelRegistry::new();
        for name in ["self", "super", "crate", "Self"] {
            let err = r
                .register(EntityDecl::new("Video").field(FieldSpec::new(name, ValueType::String, StorageType::Text)))
                .unwrap_err();
            assert_eq!(
                err,
                ConfigError::InvalidField {
                    entity: "Video".into(),
                    field: name.into(),
                    reason: "reserved identifier".into()
                }
            );
        }
        assert!(matches!(r.register(EntityDecl::new("Crate")), Err(ConfigError::Validation(_))));
        assert!(r.register(EntityDecl::new("Video").field(FieldSpec::new("true", ValueType::Bool, StorageType::Boolean))).is_ok());
        assert_eq!(r.len(), 1);
    }
}
