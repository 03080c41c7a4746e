//! Operation generator for deterministic simulation testing.
//!
//! Produces random but reproducible sequences of tree operations over a
//! small key space, so that inserts, replacements and deletes of the same
//! keys keep colliding.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::types::ObjectRef;

/// Relative weights of each operation kind.
#[derive(Debug, Clone)]
pub struct OpGenConfig {
    /// Keys are drawn from `0..key_space`.
    pub key_space: u32,
    pub set_weight: u32,
    pub insert_weight: u32,
    pub remove_weight: u32,
    pub get_weight: u32,
    pub range_weight: u32,
    pub bound_weight: u32,
    pub commit_weight: u32,
    pub abort_weight: u32,
    pub release_weight: u32,
}

impl Default for OpGenConfig {
    fn default() -> Self {
        Self {
            key_space: 500,
            set_weight: 30,
            insert_weight: 10,
            remove_weight: 25,
            get_weight: 10,
            range_weight: 5,
            bound_weight: 5,
            commit_weight: 5,
            abort_weight: 1,
            release_weight: 1,
        }
    }
}

impl OpGenConfig {
    const fn total_weight(&self) -> u32 {
        self.set_weight
            + self.insert_weight
            + self.remove_weight
            + self.get_weight
            + self.range_weight
            + self.bound_weight
            + self.commit_weight
            + self.abort_weight
            + self.release_weight
    }
}

/// One simulated operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    /// Insert or replace.
    Set(u32, ObjectRef),
    /// Insert without overwriting.
    Insert(u32, ObjectRef),
    Remove(u32),
    Get(u32),
    /// Scan `start..end`.
    Range(u32, u32),
    /// `min_key` and `max_key` around a bound.
    Bounds(u32),
    Commit,
    Abort,
    ReleaseClean,
}

impl Op {
    /// Whether the operation changes the tree contents.
    #[must_use]
    pub const fn is_mutation(&self) -> bool {
        matches!(self, Self::Set(..) | Self::Insert(..) | Self::Remove(_))
    }
}

/// Generator for random [`Op`] sequences.
pub struct OpGenerator {
    rng: StdRng,
    config: OpGenConfig,
    next_value: u64,
}

impl OpGenerator {
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self::with_config(seed, OpGenConfig::default())
    }

    #[must_use]
    pub fn with_config(seed: u64, config: OpGenConfig) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            config,
            next_value: 1,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &OpGenConfig {
        &self.config
    }

    fn key(&mut self) -> u32 {
        self.rng.random_range(0..self.config.key_space.max(1))
    }

    /// Every generated value is distinct, so a stale read is never mistaken
    /// for a fresh one.
    const fn value(&mut self) -> ObjectRef {
        let value = ObjectRef(self.next_value);
        self.next_value += 1;
        value
    }

    /// Generate the next operation.
    pub fn next_op(&mut self) -> Op {
        let c = &self.config;
        let mut pick = self.rng.random_range(0..c.total_weight().max(1));
        let weights = [
            c.set_weight,
            c.insert_weight,
            c.remove_weight,
            c.get_weight,
            c.range_weight,
            c.bound_weight,
            c.commit_weight,
            c.abort_weight,
            c.release_weight,
        ];
        let mut kind = 0;
        for (i, weight) in weights.iter().enumerate() {
            if pick < *weight {
                kind = i;
                break;
            }
            pick -= weight;
        }

        match kind {
            0 => {
                let key = self.key();
                Op::Set(key, self.value())
            }
            1 => {
                let key = self.key();
                Op::Insert(key, self.value())
            }
            2 => Op::Remove(self.key()),
            3 => Op::Get(self.key()),
            4 => {
                let a = self.key();
                let b = self.key();
                Op::Range(a.min(b), a.max(b))
            }
            5 => Op::Bounds(self.key()),
            6 => Op::Commit,
            7 => Op::Abort,
            _ => Op::ReleaseClean,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generator_deterministic() {
        let mut a = OpGenerator::new(42);
        let mut b = OpGenerator::new(42);
        for _ in 0..200 {
            assert_eq!(a.next_op(), b.next_op());
        }
    }

    #[test]
    fn test_generator_respects_key_space() {
        let config = OpGenConfig {
            key_space: 10,
            ..Default::default()
        };
        let mut generator = OpGenerator::with_config(7, config);
        for _ in 0..500 {
            match generator.next_op() {
                Op::Set(k, _) | Op::Insert(k, _) | Op::Remove(k) | Op::Get(k) | Op::Bounds(k) => {
                    assert!(k < 10);
                }
                Op::Range(a, b) => assert!(a <= b && b < 10),
                Op::Commit | Op::Abort | Op::ReleaseClean => {}
            }
        }
    }

    #[test]
    fn test_generator_only_picks_weighted_ops() {
        let config = OpGenConfig {
            set_weight: 1,
            insert_weight: 0,
            remove_weight: 0,
            get_weight: 0,
            range_weight: 0,
            bound_weight: 0,
            commit_weight: 0,
            abort_weight: 0,
            release_weight: 0,
            ..Default::default()
        };
        let mut generator = OpGenerator::with_config(3, config);
        for _ in 0..50 {
            assert!(matches!(generator.next_op(), Op::Set(..)));
        }
    }

    #[test]
    fn test_values_are_distinct() {
        let config = OpGenConfig {
            set_weight: 1,
            insert_weight: 1,
            remove_weight: 0,
            get_weight: 0,
            range_weight: 0,
            bound_weight: 0,
            commit_weight: 0,
            abort_weight: 0,
            release_weight: 0,
            ..Default::default()
        };
        let mut generator = OpGenerator::with_config(5, config);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..100 {
            if let Op::Set(_, v) | Op::Insert(_, v) = generator.next_op() {
                assert!(seen.insert(v));
            }
        }
    }
}
