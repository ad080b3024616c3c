//! Step identity: deterministic hashing of user-supplied step ids, with
//! collision disambiguation. See spec §4.1.

use std::collections::HashMap;

use sha1::{Digest, Sha1};

/// Hash a user-supplied step id to its hex-encoded SHA1 digest.
pub fn hash_step_id(user_id: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(user_id.as_bytes());
    hex::encode(hasher.finalize())
}

/// Tracks how many times each raw user id has been seen within a single
/// run, so repeated ids are disambiguated as `id`, `id:1`, `id:2`, ... before
/// hashing. Stable across replays as long as the handler takes the same
/// code path: the N-th occurrence of a given id always gets the same
/// rewritten id, and thus the same hash.
#[derive(Debug, Default, Clone)]
pub struct StepIdAllocator {
    occurrences: HashMap<String, u32>,
}

impl StepIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next hashed id for `user_id`, rewriting it with a
    /// `:N` suffix on repeat occurrences (1-based). Returns the rewritten
    /// raw id (the one observable in `OutgoingOp.opts.id`) and its hash.
    pub fn allocate(&mut self, user_id: &str) -> (String, String) {
        let count = self.occurrences.entry(user_id.to_string()).or_insert(0);
        let rewritten = if *count == 0 {
            user_id.to_string()
        } else {
            format!("{}:{}", user_id, count)
        };
        *count += 1;
        let hash = hash_step_id(&rewritten);
        (rewritten, hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable_hex_sha1() {
        let expected = {
            let mut hasher = Sha1::new();
            hasher.update(b"a");
            hex::encode(hasher.finalize())
        };
        assert_eq!(hash_step_id("a"), expected);
    }

    #[test]
    fn collision_sequence_matches_spec_contract() {
        // Given ["a", "b", "a", "a"], hashed ids are
        // [H("a"), H("b"), H("a:1"), H("a:2")].
        let mut alloc = StepIdAllocator::new();
        let (id_a0, hash_a0) = alloc.allocate("a");
        let (id_b0, hash_b0) = alloc.allocate("b");
        let (id_a1, hash_a1) = alloc.allocate("a");
        let (id_a2, hash_a2) = alloc.allocate("a");

        assert_eq!(id_a0, "a");
        assert_eq!(id_b0, "b");
        assert_eq!(id_a1, "a:1");
        assert_eq!(id_a2, "a:2");

        assert_eq!(hash_a0, hash_step_id("a"));
        assert_eq!(hash_b0, hash_step_id("b"));
        assert_eq!(hash_a1, hash_step_id("a:1"));
        assert_eq!(hash_a2, hash_step_id("a:2"));
    }

    #[test]
    fn replay_produces_identical_sequence() {
        let run = || {
            let mut alloc = StepIdAllocator::new();
            vec![
                alloc.allocate("x").1,
                alloc.allocate("x").1,
                alloc.allocate("y").1,
            ]
        };
        assert_eq!(run(), run());
    }
}
