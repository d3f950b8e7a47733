//! Route metadata: the complete route set of one resolved entity.

use crate::config::{EntitySpec, RelationshipEdge, ResolvedModel};
use crate::error::ConfigError;
use crate::metadata::combination::{combinations, Combination};
use serde::Serialize;
use std::collections::HashMap;

/// Upper bound on relationships per entity; query routes grow as `2^n`.
pub const MAX_RELATIONSHIPS: usize = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RouteMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl RouteMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            RouteMethod::Get => "GET",
            RouteMethod::Post => "POST",
            RouteMethod::Put => "PUT",
            RouteMethod::Delete => "DELETE",
        }
    }

    /// axum routing function name, used by generated routers.
    pub fn axum_fn(self) -> &'static str {
        match self {
            RouteMethod::Get => "get",
            RouteMethod::Post => "post",
            RouteMethod::Put => "put",
            RouteMethod::Delete => "delete",
        }
    }
}

impl std::fmt::Display for RouteMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum RouteKind {
    Create,
    Update,
    Query {
        is_all: bool,
        /// Relationships embedded in the response; empty for the plain routes.
        relations: Vec<RelationshipEdge>,
    },
    Delete {
        is_all: bool,
    },
    Relation {
        relation: RelationshipEdge,
        is_unlink: bool,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct RouteDescriptor {
    pub kind: RouteKind,
    pub name: String,
    pub url: String,
    pub method: RouteMethod,
    /// Response schema suffix for query routes with relations, e.g. `WithSentenceAndVideoRecord`.
    pub schema_suffix: Option<String>,
}

impl RouteDescriptor {
    fn fixed(kind: RouteKind, name: &str, method: RouteMethod) -> Self {
        RouteDescriptor {
            kind,
            name: name.to_string(),
            url: format!("/{}", name),
            method,
            schema_suffix: None,
        }
    }

    pub fn create() -> Self {
        Self::fixed(RouteKind::Create, "create_one", RouteMethod::Post)
    }

    pub fn update() -> Self {
        Self::fixed(RouteKind::Update, "update_one", RouteMethod::Put)
    }

    pub fn delete(is_all: bool) -> Self {
        let name = if is_all { "delete_all" } else { "delete_one" };
        Self::fixed(RouteKind::Delete { is_all }, name, RouteMethod::Delete)
    }

    pub fn query(is_all: bool, with: Option<&Combination>) -> Self {
        let mut name = if is_all { "get_all" } else { "get_one" }.to_string();
        let mut schema_suffix = None;
        let relations = match with {
            Some(c) => {
                let snakes: Vec<String> = c.edges.iter().map(|e| e.target_snake()).collect();
                name.push_str("_with_");
                name.push_str(&snakes.join("_"));
                schema_suffix = Some(format!("With{}", c.name));
                c.edges.clone()
            }
            None => Vec::new(),
        };
        RouteDescriptor {
            kind: RouteKind::Query { is_all, relations },
            url: format!("/{}", name),
            name,
            method: RouteMethod::Get,
            schema_suffix,
        }
    }

    pub fn relation(relation: &RelationshipEdge, is_unlink: bool) -> Self {
        let prefix = if is_unlink { "unlink_to_" } else { "link_to_" };
        let name = format!("{}{}", prefix, relation.target_snake());
        RouteDescriptor {
            kind: RouteKind::Relation {
                relation: relation.clone(),
                is_unlink,
            },
            url: format!("/{}", name),
            name,
            method: RouteMethod::Post,
            schema_suffix: None,
        }
    }

    pub fn is_query(&self) -> bool {
        matches!(self.kind, RouteKind::Query { .. })
    }

    /// What produced this route: the combination name for query routes with relations,
    /// the target for link/unlink routes, otherwise the route name.
    fn origin(&self) -> String {
        match (&self.kind, &self.schema_suffix) {
            (RouteKind::Query { .. }, Some(suffix)) => suffix.trim_start_matches("With").to_string(),
            (RouteKind::Relation { relation, .. }, _) => relation.target.clone(),
            _ => self.name.clone(),
        }
    }
}

/// Route names (and so urls) must be unique within an entity.
fn check_unique_routes(entity: &str, routes: &[RouteDescriptor]) -> Result<(), ConfigError> {
    let mut seen: HashMap<&str, &RouteDescriptor> = HashMap::new();
    for r in routes {
        if let Some(first) = seen.insert(r.name.as_str(), r) {
            return Err(ConfigError::DuplicateRoute {
                entity: entity.to_string(),
                route: r.name.clone(),
                first: first.origin(),
                second: r.origin(),
            });
        }
    }
    Ok(())
}

/// Route set of one entity, in construction order.
#[derive(Clone, Debug)]
pub struct RouterMetadata {
    pub entity: String,
    pub snake_name: String,
    pub combinations: Vec<Combination>,
    pub routes: Vec<RouteDescriptor>,
}

impl RouterMetadata {
    /// Fixed CRUD routes, then link/unlink per relationship, then a get_one/get_all pair per
    /// relationship combination: `6 + 2n + 2(2^n - 1)` routes.
    pub fn new(entity: &EntitySpec) -> Result<Self, ConfigError> {
        entity.require_one_pk()?;
        let n = entity.relationships.len();
        if n > MAX_RELATIONSHIPS {
            return Err(ConfigError::TooManyRelationships {
                entity: entity.name.clone(),
                count: n,
                max: MAX_RELATIONSHIPS,
            });
        }
        let combos = combinations(&entity.relationships);
        let mut routes = Vec::with_capacity(6 + 2 * n + 2 * combos.len());
        routes.push(RouteDescriptor::create());
        routes.push(RouteDescriptor::update());
        routes.push(RouteDescriptor::query(false, None));
        routes.push(RouteDescriptor::query(true, None));
        routes.push(RouteDescriptor::delete(false));
        routes.push(RouteDescriptor::delete(true));
        for rel in &entity.relationships {
            routes.push(RouteDescriptor::relation(rel, false));
            routes.push(RouteDescriptor::relation(rel, true));
        }
        for c in &combos {
            routes.push(RouteDescriptor::query(false, Some(c)));
            routes.push(RouteDescriptor::query(true, Some(c)));
        }
        check_unique_routes(&entity.name, &routes)?;
        tracing::debug!(entity = %entity.name, routes = routes.len(), combinations = combos.len(), "built route metadata");
        Ok(RouterMetadata {
            entity: entity.name.clone(),
            snake_name: entity.snake_name(),
            combinations: combos,
            routes,
        })
    }

    fn filtered(&self, pred: impl Fn(&RouteKind) -> bool) -> Vec<&RouteDescriptor> {
        self.routes.iter().filter(|r| pred(&r.kind)).collect()
    }

    pub fn query_routes(&self) -> Vec<&RouteDescriptor> {
        self.filtered(|k| matches!(k, RouteKind::Query { .. }))
    }

    pub fn create_routes(&self) -> Vec<&RouteDescriptor> {
        self.filtered(|k| matches!(k, RouteKind::Create))
    }

    pub fn update_routes(&self) -> Vec<&RouteDescriptor> {
        self.filtered(|k| matches!(k, RouteKind::Update))
    }

    pub fn delete_routes(&self) -> Vec<&RouteDescriptor> {
        self.filtered(|k| matches!(k, RouteKind::Delete { .. }))
    }

    pub fn relation_routes(&self) -> Vec<&RouteDescriptor> {
        self.filtered(|k| matches!(k, RouteKind::Relation { .. }))
    }

    pub fn route(&self, name: &str) -> Option<&RouteDescriptor> {
        self.routes.iter().find(|r| r.name == name)
    }
}

impl ResolvedModel {
    /// Route metadata for every entity, in registration order.
    pub fn router_metadata(&self) -> Result<Vec<RouterMetadata>, ConfigError> {
        self.entities.iter().map(RouterMetadata::new).collect()
    }
}
