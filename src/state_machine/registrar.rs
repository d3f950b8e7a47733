//! Transition registrar: explicit `(from, to)` edges, each guarded by the item's current state.

use crate::auth::{Dependencies, Guard};
use crate::error::{AppError, ConfigError};
use crate::response::TransitionOutcome;
use crate::state_machine::store::{StateItem, StateStore};
use crate::state_machine::{state_name, validate_states, StateEnum};
use chrono::Utc;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Applies transition parameters (request body minus `id`) to an item already moved to the target state.
pub type ApplyFn = Arc<dyn Fn(&mut StateItem, Value) -> Result<(), AppError> + Send + Sync>;

fn typed_apply<P, F>(f: F) -> ApplyFn
where
    P: DeserializeOwned + 'static,
    F: Fn(&mut StateItem, P) -> Result<(), AppError> + Send + Sync + 'static,
{
    Arc::new(move |item: &mut StateItem, raw: Value| -> Result<(), AppError> {
        let params: P = serde_json::from_value(raw).map_err(|e| AppError::Validation(e.to_string()))?;
        f(item, params)
    })
}

/// Builder for one transition edge.
pub struct Transition<E: StateEnum> {
    from: E,
    to: E,
    display_name: Option<String>,
    dependencies: Dependencies,
    params_type: &'static str,
    apply: ApplyFn,
}

impl<E: StateEnum> Transition<E> {
    /// A transition that only moves the state and ignores any parameters.
    pub fn new(from: E, to: E) -> Self {
        Transition {
            from,
            to,
            display_name: None,
            dependencies: Vec::new(),
            params_type: "()",
            apply: typed_apply(|_: &mut StateItem, _: IgnoredAny| Ok(())),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Guard run before the transition endpoint executes.
    pub fn dependency(mut self, guard: impl Guard + 'static) -> Self {
        self.dependencies.push(Arc::new(guard));
        self
    }

    /// Behavior applied after the state moves; `P` is the request parameter schema.
    pub fn apply<P, F>(mut self, f: F) -> Self
    where
        P: DeserializeOwned + 'static,
        F: Fn(&mut StateItem, P) -> Result<(), AppError> + Send + Sync + 'static,
    {
        self.params_type = std::any::type_name::<P>();
        self.apply = typed_apply(f);
        self
    }
}

/// A registered transition.
#[derive(Clone)]
pub struct TransitionInfo<E: StateEnum> {
    pub from: E,
    pub to: E,
    pub display_name: String,
    pub dependencies: Dependencies,
    pub params_type: &'static str,
    pub apply: ApplyFn,
}

impl<E: StateEnum> TransitionInfo<E> {
    /// Route path segment, `/transition/{From}-to-{To}`.
    pub fn path(&self) -> String {
        format!("/transition/{}-to-{}", self.from.name(), self.to.name())
    }

    pub fn summary(&self) -> TransitionSummary {
        TransitionSummary {
            from: self.from.value(),
            from_name: self.from.name().to_string(),
            to: self.to.value(),
            to_name: self.to.name().to_string(),
            display_name: self.display_name.clone(),
            params_type: self.params_type.to_string(),
            path: self.path(),
            guarded: !self.dependencies.is_empty(),
        }
    }
}

/// Serializable view of a transition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TransitionSummary {
    pub from: i64,
    pub from_name: String,
    pub to: i64,
    pub to_name: String,
    pub display_name: String,
    pub params_type: String,
    pub path: String,
    pub guarded: bool,
}

/// The transition map of one state enum. Built at startup, then shared read-only.
pub struct Registrar<E: StateEnum> {
    transitions: BTreeMap<(i64, i64), TransitionInfo<E>>,
}

impl<E: StateEnum> std::fmt::Debug for Registrar<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registrar")
            .field("transitions", &self.transitions.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<E: StateEnum> Registrar<E> {
    pub fn new() -> Result<Self, ConfigError> {
        validate_states::<E>()?;
        Ok(Registrar {
            transitions: BTreeMap::new(),
        })
    }

    pub fn register(&mut self, t: Transition<E>) -> Result<&mut Self, ConfigError> {
        if t.from == t.to {
            return Err(ConfigError::Validation(format!(
                "transition from {} to itself",
                t.from.name()
            )));
        }
        let key = (t.from.value(), t.to.value());
        if self.transitions.contains_key(&key) {
            return Err(ConfigError::DuplicateTransition {
                from: t.from.name().to_string(),
                to: t.to.name().to_string(),
            });
        }
        let display_name = t
            .display_name
            .unwrap_or_else(|| format!("{}_to_{}", t.from.name(), t.to.name()).to_lowercase());
        tracing::debug!(from = t.from.name(), to = t.to.name(), name = %display_name, "register transition");
        self.transitions.insert(
            key,
            TransitionInfo {
                from: t.from,
                to: t.to,
                display_name,
                dependencies: t.dependencies,
                params_type: t.params_type,
                apply: t.apply,
            },
        );
        Ok(self)
    }

    pub fn get(&self, from: E, to: E) -> Option<&TransitionInfo<E>> {
        self.transitions.get(&(from.value(), to.value()))
    }

    /// Registered transitions ordered by `(from, to)` value.
    pub fn iter(&self) -> impl Iterator<Item = &TransitionInfo<E>> {
        self.transitions.values()
    }

    pub fn transitions(&self) -> BTreeMap<(i64, i64), TransitionSummary> {
        self.transitions.iter().map(|(k, v)| (*k, v.summary())).collect()
    }

    /// States appearing on either side of a registered transition.
    pub fn get_states(&self) -> Vec<E> {
        let states: BTreeSet<E> = self.transitions.values().flat_map(|t| [t.from, t.to]).collect();
        states.into_iter().collect()
    }

    /// Graphviz DOT rendering of the transition map.
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph states {\n");
        for t in self.transitions.values() {
            out.push_str(&format!(
                "    \"{}\" -> \"{}\" [label=\"{}\"];\n",
                t.from.name(),
                t.to.name(),
                t.display_name
            ));
        }
        out.push('}');
        out.push('\n');
        out
    }

    /// Runs the `(from, to)` transition on item `id` inside one store transaction.
    pub async fn execute(
        &self,
        store: &dyn StateStore,
        id: i64,
        from: E,
        to: E,
        params: Value,
    ) -> Result<TransitionOutcome, AppError> {
        let info = self.get(from, to).ok_or_else(|| {
            AppError::NotFound(format!("transition {} -> {}", from.name(), to.name()))
        })?;
        let apply = Arc::clone(&info.apply);
        let display_name = info.display_name.clone();
        let guard_name = display_name.clone();
        let result = store
            .transition(
                id,
                Box::new(move |item: &mut StateItem| -> Result<(), AppError> {
                    if item.state != from.value() {
                        return Err(AppError::InvalidTransition {
                            transition: guard_name,
                            current: state_name::<E>(item.state),
                            expected: from.name().to_string(),
                            target: to.name().to_string(),
                        });
                    }
                    item.state = to.value();
                    item.updated_time = Utc::now();
                    apply(item, params)
                }),
            )
            .await;
        match result {
            Ok(_) => {
                tracing::info!(id, transition = %display_name, from = from.name(), to = to.name(), "transition applied");
                Ok(TransitionOutcome::ok(format!(
                    "{} moved from {} to {}",
                    id,
                    from.name(),
                    to.name()
                )))
            }
            Err(e) => {
                tracing::warn!(id, transition = %display_name, error = %e, "transition rejected");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::MemoryStateStore;
    use serde::Deserialize;
    use serde_json::{json, Map};

    crate::state_enum! {
        enum Door { Closed = 1, Open = 2, Locked = 3 }
    }

    #[derive(Deserialize)]
    struct LockParams {
        key: String,
    }

    fn registrar() -> Registrar<Door> {
        let mut r = Registrar::new().unwrap();
        r.register(Transition::new(Door::Closed, Door::Open).name("open")).unwrap();
        r.register(Transition::new(Door::Open, Door::Closed).name("close")).unwrap();
        r.register(
            Transition::new(Door::Closed, Door::Locked)
                .name("lock")
                .apply(|item: &mut StateItem, p: LockParams| {
                    item.payload.insert("key".into(), Value::String(p.key));
                    Ok(())
                }),
        )
        .unwrap();
        r
    }

    #[test]
    fn duplicate_and_self_transitions_fail() {
        let mut r = registrar();
        assert_eq!(
            r.register(Transition::new(Door::Closed, Door::Open)).err(),
            Some(ConfigError::DuplicateTransition {
                from: "Closed".into(),
                to: "Open".into()
            })
        );
        assert!(matches!(
            r.register(Transition::new(Door::Open, Door::Open)),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn introspection() {
        let r = registrar();
        assert_eq!(r.get_states(), vec![Door::Closed, Door::Open, Door::Locked]);
        let map = r.transitions();
        assert_eq!(map.len(), 3);
        assert_eq!(map[&(1, 3)].path, "/transition/Closed-to-Locked");
        assert!(map[&(1, 3)].params_type.ends_with("LockParams"));
        assert!(r.to_dot().contains("\"Closed\" -> \"Locked\" [label=\"lock\"];"));
    }

    #[tokio::test]
    async fn guard_blocks_wrong_source_state() {
        let r = registrar();
        let store = MemoryStateStore::new();
        let item = store.create(Door::Open.value(), Map::new()).await.unwrap();
        let err = r
            .execute(&store, item.id, Door::Closed, Door::Locked, json!({"key": "k"}))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Current state is \"Open\", not \"Closed\", cannot use \"lock\" to transit to \"Locked\""
        );
        let stored = store.get_one(item.id).await.unwrap().unwrap();
        assert_eq!(stored.state, Door::Open.value());
        assert_eq!(stored.updated_time, item.updated_time);
    }

    #[tokio::test]
    async fn transition_moves_state_and_applies_params() {
        let r = registrar();
        let store = MemoryStateStore::new();
        let item = store.create(Door::Closed.value(), Map::new()).await.unwrap();
        let bad = r.execute(&store, item.id, Door::Closed, Door::Locked, json!({})).await;
        assert!(matches!(bad, Err(AppError::Validation(_))));
        let rolled_back = store.get_one(item.id).await.unwrap().unwrap();
        assert_eq!(rolled_back.state, Door::Closed.value());
        assert_eq!(rolled_back.updated_time, item.updated_time);

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        let outcome = r
            .execute(&store, item.id, Door::Closed, Door::Locked, json!({"key": "k1"}))
            .await
            .unwrap();
        assert_eq!(outcome.code, 200);
        let stored = store.get_one(item.id).await.unwrap().unwrap();
        assert_eq!(stored.state, Door::Locked.value());
        assert_eq!(stored.payload["key"], "k1");
        assert!(stored.updated_time > item.updated_time);
        assert_eq!(stored.created_time, item.created_time);
    }
}
