//! Consistent-hash ring over broker endpoints, with virtual nodes for
//! distribution smoothing.

use sha2::{Digest, Sha256};

/// Hash `s` with SHA-256 and take the first four bytes as a big-endian
/// `u32`. Any cryptographic hash suffices (spec §9); SHA-256 is stable
/// across process restarts, which is all the contract requires.
fn hash32(s: &str) -> u32 {
    let digest = Sha256::digest(s.as_bytes());
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

/// An immutable consistent-hash ring. Rebuilding on a broker-set change
/// means constructing a new `Ring` and atomically swapping the owning
/// pointer (see [`super::topology::Topology`]); the ring itself never
/// mutates in place.
#[derive(Debug, Clone)]
pub struct Ring {
    /// `(position, endpoint)` pairs sorted by position.
    positions: Vec<(u32, String)>,
}

impl Ring {
    /// Build a ring over `endpoints`, placing `virtual_nodes` positions per
    /// endpoint at `hash(endpoint + ":" + i)`.
    #[must_use]
    pub fn build(endpoints: &[String], virtual_nodes: u32) -> Self {
        let mut positions = Vec::with_capacity(endpoints.len() * virtual_nodes as usize);
        for endpoint in endpoints {
            for i in 0..virtual_nodes {
                let position = hash32(&format!("{endpoint}:{i}"));
                positions.push((position, endpoint.clone()));
            }
        }
        positions.sort_unstable_by_key(|(position, _)| *position);
        Self { positions }
    }

    /// The number of distinct endpoints this ring knows about.
    #[must_use]
    pub fn endpoint_count(&self) -> usize {
        self.positions
            .iter()
            .map(|(_, e)| e.as_str())
            .collect::<std::collections::HashSet<_>>()
            .len()
    }

    /// Look up the endpoint owning `key`: the first position at or after
    /// `hash(key)`, wrapping to the first ring position if `hash(key)`
    /// exceeds every position.
    #[must_use]
    pub fn lookup(&self, key: &str) -> Option<&str> {
        if self.positions.is_empty() {
            return None;
        }
        let target = hash32(key);
        let idx = self.positions.partition_point(|(position, _)| *position < target);
        let idx = if idx == self.positions.len() { 0 } else { idx };
        Some(self.positions[idx].1.as_str())
    }
}

/// The routing key for a produce/consume/ack request: `<topic>-partition-<index>`.
#[must_use]
pub fn partition_key(topic: &str, partition: u32) -> String {
    format!("{topic}-partition-{partition}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn endpoints(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("http://broker-{i}:8080")).collect()
    }

    #[test]
    fn lookup_is_consistent_across_calls() {
        let ring = Ring::build(&endpoints(3), 150);
        let key = "events-partition-2";
        assert_eq!(ring.lookup(key), ring.lookup(key));
    }

    #[test]
    fn adding_a_broker_moves_a_bounded_fraction_of_keys() {
        let before = Ring::build(&endpoints(3), 150);
        let after = Ring::build(&endpoints(4), 150);

        let keys: Vec<String> = (0..1000).map(|i| format!("topic-partition-{i}")).collect();
        let moved = keys
            .iter()
            .filter(|k| before.lookup(k) != after.lookup(k))
            .count();

        // Theoretical bound for adding the (k+1)th broker is ~1/(k+1) of keys;
        // allow a factor-of-2 empirical tolerance per spec P5.
        let bound = keys.len() / 4 * 2; // 2 * (1/4)
        assert!(
            moved <= bound,
            "moved {moved} of {} keys, expected at most {bound}",
            keys.len()
        );
    }

    #[test]
    fn removing_a_broker_only_reassigns_its_own_keys() {
        let before = Ring::build(&endpoints(4), 150);
        let after = Ring::build(&endpoints(3), 150); // drop broker-3

        let keys: Vec<String> = (0..2000).map(|i| format!("topic-partition-{i}")).collect();
        let mut moved_from_removed = 0;
        let mut moved_from_others = 0;
        for key in &keys {
            let b = before.lookup(key).unwrap();
            let a = after.lookup(key).unwrap();
            if b != a {
                if b == "http://broker-3:8080" {
                    moved_from_removed += 1;
                } else {
                    moved_from_others += 1;
                }
            }
        }
        // Only keys owned by the removed broker should move.
        assert_eq!(moved_from_others, 0);
        assert!(moved_from_removed > 0);
    }

    #[test]
    fn two_lookups_for_same_key_return_same_broker() {
        let ring = Ring::build(&endpoints(5), 150);
        let mut seen: HashMap<String, String> = HashMap::new();
        for i in 0..200 {
            let key = partition_key("events", i);
            let owner = ring.lookup(&key).unwrap().to_string();
            if let Some(prev) = seen.insert(key, owner.clone()) {
                assert_eq!(prev, owner);
            }
        }
    }
}
