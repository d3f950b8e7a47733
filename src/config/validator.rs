//! Link validation: referential integrity, then cycle detection over the declared link graph.

use crate::config::registry::{DeclaredLink, ModelRegistry};
use crate::error::ConfigError;
use std::collections::HashMap;

/// Every link side must name a registered entity. Runs before the cycle check.
pub fn check_link_targets(registry: &ModelRegistry) -> Result<(), ConfigError> {
    for DeclaredLink { link, .. } in registry.links() {
        let (a, b) = link.two_sides();
        for side in [a, b] {
            if !registry.contains(side) {
                return Err(ConfigError::UnknownEntity {
                    link: link.label(),
                    missing: side.to_string(),
                });
            }
        }
    }
    Ok(())
}

/// Follow each declared link to its target and keep following outgoing links; fail when the
/// link's source entity is reached again. The chain lists entities in traversal order.
pub fn check_circular_links(registry: &ModelRegistry) -> Result<(), ConfigError> {
    let links = registry.links();
    for l in links {
        let (origin, _) = l.link.two_sides();
        let mut chain = vec![origin.to_string()];
        if let Some(cycle) = find_cycle(links, origin, l, &mut chain) {
            return Err(ConfigError::CircularLink { chain: cycle });
        }
    }
    Ok(())
}

fn find_cycle(
    links: &[DeclaredLink],
    origin: &str,
    via: &DeclaredLink,
    chain: &mut Vec<String>,
) -> Option<Vec<String>> {
    let (_, next) = via.link.two_sides();
    if next == origin {
        let mut cycle = chain.clone();
        cycle.push(next.to_string());
        return Some(cycle);
    }
    // A cycle that does not pass through `origin` is reported from its own links.
    if chain.iter().any(|c| c == next) {
        return None;
    }
    chain.push(next.to_string());
    for l in links.iter().filter(|l| l.link.two_sides().0 == next) {
        if let Some(cycle) = find_cycle(links, origin, l, chain) {
            return Some(cycle);
        }
    }
    chain.pop();
    None
}

/// At most one link per pair of entities, whichever side declares it and in whichever order.
pub fn check_duplicate_links(registry: &ModelRegistry) -> Result<(), ConfigError> {
    let mut seen: HashMap<(&str, &str), &DeclaredLink> = HashMap::new();
    for l in registry.links() {
        let (a, b) = l.link.two_sides();
        let pair = if a <= b { (a, b) } else { (b, a) };
        if let Some(first) = seen.insert(pair, l) {
            return Err(ConfigError::DuplicateLink {
                link: l.link.label(),
                first: first.declared_by.clone(),
                second: l.declared_by.clone(),
            });
        }
    }
    Ok(())
}

pub fn validate(registry: &ModelRegistry) -> Result<(), ConfigError> {
    check_link_targets(registry)?;
    check_circular_links(registry)?;
    check_duplicate_links(registry)?;
    Ok(())
}
