//! Consistent-hash ring
//!
//! Each server contributes a fixed number of md5-derived virtual points
//! on a u64 ring; a key is assigned to the first point clockwise from its
//! own hash. Adding or removing one server only remaps the keys that fell
//! on that server's points, unlike modulo routing which remaps almost the
//! whole keyspace.

use std::collections::BTreeMap;

/// Virtual points per server. More points smooth the key distribution.
const VIRTUAL_NODES: usize = 160;

/// Ring positions mapped to indexes into the shard set.
#[derive(Debug, Clone)]
pub struct HashRing {
    points: BTreeMap<u64, usize>,
}

impl HashRing {
    /// Build a ring over the ordered shard set.
    pub fn new<S: AsRef<str>>(servers: &[S]) -> Self {
        let mut points = BTreeMap::new();
        for (index, server) in servers.iter().enumerate() {
            for vnode in 0..VIRTUAL_NODES {
                points.insert(hash_point(&format!("{}-{vnode}", server.as_ref())), index);
            }
        }
        HashRing { points }
    }

    /// Index of the server owning `key`, or `None` for an empty ring.
    pub fn route(&self, key: &str) -> Option<usize> {
        let hash = hash_point(key);
        self.points
            .range(hash..)
            .next()
            .or_else(|| self.points.iter().next())
            .map(|(_, &index)| index)
    }
}

/// First eight digest bytes as a big-endian ring position.
fn hash_point(input: &str) -> u64 {
    let digest = md5::compute(input.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest.0[..8]);
    u64::from_be_bytes(prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn servers(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("10.0.0.{i}:11211")).collect()
    }

    #[test]
    fn test_route_deterministic() {
        let ring = HashRing::new(&servers(3));
        for key in ["alpha", "beta", "gamma", ""] {
            assert_eq!(ring.route(key), ring.route(key));
        }
    }

    #[test]
    fn test_single_server_owns_everything() {
        let ring = HashRing::new(&servers(1));
        for i in 0..100 {
            assert_eq!(ring.route(&format!("key{i}")), Some(0));
        }
    }

    #[test]
    fn test_empty_ring() {
        let ring = HashRing::new(&servers(0));
        assert_eq!(ring.route("key"), None);
    }

    #[test]
    fn test_all_servers_reachable() {
        let ring = HashRing::new(&servers(3));
        let mut seen = [false; 3];
        for i in 0..1000 {
            seen[ring.route(&format!("key{i}")).unwrap()] = true;
        }
        assert_eq!(seen, [true, true, true]);
    }

    #[test]
    fn test_bounded_remapping() {
        // growing the shard set must leave most keys where they were
        let three = HashRing::new(&servers(3));
        let four = HashRing::new(&servers(4));
        let moved = (0..1000)
            .filter(|i| {
                let key = format!("key{i}");
                three.route(&key) != four.route(&key)
            })
            .count();
        // expectation is ~1/4 of keys; far below a full remap
        assert!(moved < 500, "remapped {moved} of 1000 keys");
    }
}
