//! The zone alphabet and the irreversibility lattice derived from it.

use serde::{Deserialize, Serialize};

/// A qualitative category of an action's effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Zone {
    SensitiveData,
    EgressCapable,
    Privileged,
    Destructive,
    NetworkMutation,
}

/// Irreversibility level, totally ordered `Safe < Elevated < Guarded < Sensitive < Critical`.
///
/// A trace's level only ever increases; see [`Irreversibility::max`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Irreversibility {
    Safe,
    Elevated,
    Guarded,
    Sensitive,
    Critical,
}

impl Default for Irreversibility {
    fn default() -> Self {
        Irreversibility::Safe
    }
}

impl Irreversibility {
    /// The larger of `self` and `other`; irreversibility never decreases.
    pub fn max(self, other: Self) -> Self {
        if other > self {
            other
        } else {
            self
        }
    }

    /// The tier (0..=3) used by the policy evaluator's zone/tier floor.
    pub fn tier(self) -> u8 {
        match self {
            Irreversibility::Safe => 0,
            Irreversibility::Elevated => 1,
            Irreversibility::Guarded | Irreversibility::Sensitive => 2,
            Irreversibility::Critical => 3,
        }
    }
}
