//! State-machine backed items: state enums, transition registrar, persistence and router.

mod registrar;
mod router;
mod store;

pub use registrar::{ApplyFn, Registrar, Transition, TransitionInfo, TransitionSummary};
pub use router::{RouteToggles, StateItemRouter};
pub use store::{MemoryStateStore, MutateFn, PgStateStore, StateItem, StateStore};

use crate::error::ConfigError;
use std::collections::HashMap;
use std::fmt::Debug;

/// Finite set of named integral states.
pub trait StateEnum: Copy + Eq + Ord + Debug + Send + Sync + 'static {
    fn value(self) -> i64;
    fn name(self) -> &'static str;
    /// Every state in declaration order; the first one is the initial state of new items.
    fn all() -> &'static [Self];

    fn initial() -> Self {
        Self::all()[0]
    }

    fn from_value(value: i64) -> Option<Self> {
        Self::all().iter().copied().find(|s| s.value() == value)
    }

    fn from_name(name: &str) -> Option<Self> {
        Self::all().iter().copied().find(|s| s.name() == name)
    }
}

/// Name of a raw state value, `unknown(<v>)` when it is not a declared state.
pub fn state_name<E: StateEnum>(value: i64) -> String {
    E::from_value(value)
        .map(|s| s.name().to_string())
        .unwrap_or_else(|| format!("unknown({})", value))
}

/// Rejects two states sharing one value.
pub fn validate_states<E: StateEnum>() -> Result<(), ConfigError> {
    let mut seen: HashMap<i64, E> = HashMap::new();
    for &s in E::all() {
        if let Some(first) = seen.insert(s.value(), s) {
            return Err(ConfigError::DuplicateState {
                value: s.value(),
                first: first.name().to_string(),
                second: s.name().to_string(),
            });
        }
    }
    Ok(())
}

/// Declares a state enum and its `StateEnum` impl.
///
/// ```
/// scaffold_sdk::state_enum! {
///     pub enum Light { Red = 1, Green = 2 }
/// }
/// use scaffold_sdk::state_machine::StateEnum;
/// assert_eq!(Light::Green.value(), 2);
/// assert_eq!(Light::initial(), Light::Red);
/// ```
#[macro_export]
macro_rules! state_enum {
    ($(#[$meta:meta])* $vis:vis enum $name:ident { $($variant:ident = $value:expr),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
        $vis enum $name {
            $($variant),+
        }

        impl $crate::state_machine::StateEnum for $name {
            fn value(self) -> i64 {
                match self {
                    $($name::$variant => $value),+
                }
            }

            fn name(self) -> &'static str {
                match self {
                    $($name::$variant => stringify!($variant)),+
                }
            }

            fn all() -> &'static [Self] {
                &[$($name::$variant),+]
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    crate::state_enum! {
        enum Clashing { First = 1, Second = 2, Third = 1 }
    }

    crate::state_enum! {
        enum Fine { A = 10, B = 20 }
    }

    #[test]
    fn duplicate_values_are_rejected() {
        assert_eq!(
            validate_states::<Clashing>(),
            Err(ConfigError::DuplicateState {
                value: 1,
                first: "First".into(),
                second: "Third".into(),
            })
        );
        assert!(validate_states::<Fine>().is_ok());
    }

    #[test]
    fn lookups_by_value_and_name() {
        assert_eq!(Fine::from_value(20), Some(Fine::B));
        assert_eq!(Fine::from_name("A"), Some(Fine::A));
        assert_eq!(Fine::from_value(3), None);
        assert_eq!(state_name::<Fine>(3), "unknown(3)");
        assert_eq!(Fine::initial(), Fine::A);
    }
}
