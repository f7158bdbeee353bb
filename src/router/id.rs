//! Scoped Id generation.
//!
//! WAMP identifiers are drawn from independent scopes (global, router,
//! session); each scope tracks its own set of currently live values and
//! supplies it to the generator on every draw so collisions are rejected.

use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::ID;

/// Exclusive upper bound so every drawn value fits the 53-bit range WAMP
/// Ids must stay within to round-trip through an IEEE-754 double.
const ID_UPPER_BOUND: ID = 1u64 << 53;

/// Draws pseudo-random Ids within `[1, 2^53 - 1]`, resampling on collision
/// against a caller-supplied live set. The generator itself tracks no
/// liveness; callers own that bookkeeping and pass it in on each call.
pub struct ScopeGenerator {
    rng: StdRng,
}

impl ScopeGenerator {
    pub fn new() -> ScopeGenerator {
        ScopeGenerator {
            rng: StdRng::from_entropy(),
        }
    }

    /// Draw the next Id in this scope, excluding every value in `excludes`.
    pub fn next(&mut self, excludes: &HashSet<ID>) -> ID {
        loop {
            let candidate = self.rng.gen_range(1..ID_UPPER_BOUND);
            if !excludes.contains(&candidate) {
                return candidate;
            }
        }
    }
}

impl Default for ScopeGenerator {
    fn default() -> Self {
        Self::new()
    }
}
