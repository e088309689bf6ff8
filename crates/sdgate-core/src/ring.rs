//! Weighted rendezvous placement ring.
//!
//! Every location gets a score per key; the `n` highest scores win. The
//! score is `-weight / ln(u)` where `u` in (0, 1) is derived from the hash of
//! the key combined with the location id, so a location's share of keys is
//! proportional to its weight and removing a location only moves the keys
//! it owned.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use parking_lot::RwLock;
use sdgate_proto::hash::{sd_hash, sd_hash_combine};
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};

/// Health of the ring as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingState {
    /// All configured locations are healthy.
    Normal,
    /// At least one location was marked unhealthy.
    Degraded,
    /// No healthy location is left.
    Failed,
}

impl fmt::Display for RingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RingState::Normal => "normal",
            RingState::Degraded => "degraded",
            RingState::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug)]
struct Topology {
    weights: BTreeMap<String, u64>,
    healthy: BTreeSet<String>,
    state: RingState,
}

/// Placement ring mapping keys to distinct, healthy, weighted locations.
#[derive(Debug)]
pub struct PlacementRing {
    min_replicas: usize,
    inner: RwLock<Topology>,
}

/// Map a 64-bit hash into the open interval (0, 1).
#[inline]
fn unit_interval(hash: u64) -> f64 {
    ((hash >> 11) as f64 + 0.5) / (1u64 << 53) as f64
}

#[inline]
fn score(key_hash: u64, location: &str, weight: u64) -> f64 {
    let u = unit_interval(sd_hash_combine(key_hash, sd_hash(location.as_bytes())));
    -(weight as f64) / u.ln()
}

/// Rank the healthy locations of `topo` for `key` and keep the best `n`.
fn pick(topo: &Topology, key: &str, n: usize) -> StoreResult<Vec<String>> {
    if topo.healthy.len() < n {
        return Err(StoreError::PlacementExhausted {
            wanted: n,
            healthy: topo.healthy.len(),
        });
    }
    let key_hash = sd_hash(key.as_bytes());
    let mut scored: Vec<(f64, &String)> = topo
        .healthy
        .iter()
        .map(|loc| (score(key_hash, loc, topo.weights[loc]), loc))
        .collect();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(b.1)));
    Ok(scored.into_iter().take(n).map(|(_, loc)| loc.clone()).collect())
}

impl PlacementRing {
    /// Create an empty ring; `configure` must be called before `select`.
    pub fn new(min_replicas: usize) -> Self {
        Self {
            min_replicas,
            inner: RwLock::new(Topology {
                weights: BTreeMap::new(),
                healthy: BTreeSet::new(),
                state: RingState::Normal,
            }),
        }
    }

    /// Replace the full topology.
    ///
    /// Zero weights are dropped. Every remaining location becomes healthy
    /// and the state returns to `Normal`.
    pub fn configure(&self, weights: BTreeMap<String, u64>) -> StoreResult<()> {
        let weights: BTreeMap<String, u64> =
            weights.into_iter().filter(|(_, w)| *w > 0).collect();
        if weights.len() < self.min_replicas {
            return Err(StoreError::Config(format!(
                "{} weighted locations configured, at least {} required",
                weights.len(),
                self.min_replicas
            )));
        }

        let healthy = weights.keys().cloned().collect();
        let mut topo = self.inner.write();
        info!("ring: configured {} locations", weights.len());
        *topo = Topology {
            weights,
            healthy,
            state: RingState::Normal,
        };
        Ok(())
    }

    /// Select `n` distinct healthy locations for `key`, best first.
    pub fn select(&self, key: &str, n: usize) -> StoreResult<Vec<String>> {
        {
            let topo = self.inner.read();
            if !topo.healthy.is_empty() {
                return pick(&topo, key, n);
            }
        }

        let mut topo = self.inner.write();
        // a configure may have landed since the read guard was dropped
        if !topo.healthy.is_empty() {
            return pick(&topo, key, n);
        }
        if topo.state != RingState::Failed {
            warn!("ring: no healthy locations left, ring failed");
            topo.state = RingState::Failed;
        }
        Err(StoreError::PlacementExhausted {
            wanted: n,
            healthy: 0,
        })
    }

    /// Remove `location` from the healthy set.
    ///
    /// Returns false if the location is unknown or already unhealthy.
    pub fn mark_unhealthy(&self, location: &str) -> bool {
        let mut topo = self.inner.write();
        if !topo.healthy.remove(location) {
            return false;
        }
        let next = if topo.healthy.is_empty() {
            RingState::Failed
        } else if topo.state == RingState::Normal {
            RingState::Degraded
        } else {
            topo.state
        };
        if next != topo.state {
            warn!("ring: {} -> {} after losing {}", topo.state, next, location);
        } else {
            debug!("ring: location {} marked unhealthy", location);
        }
        topo.state = next;
        true
    }

    pub fn state(&self) -> RingState {
        self.inner.read().state
    }

    /// All configured locations, healthy or not.
    pub fn locations(&self) -> Vec<String> {
        self.inner.read().weights.keys().cloned().collect()
    }

    /// Locations not marked unhealthy since the last `configure`.
    pub fn healthy_locations(&self) -> Vec<String> {
        self.inner.read().healthy.iter().cloned().collect()
    }

    pub fn healthy_count(&self) -> usize {
        self.inner.read().healthy.len()
    }

    pub fn min_replicas(&self) -> usize {
        self.min_replicas
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weights(entries: &[(&str, u64)]) -> BTreeMap<String, u64> {
        entries.iter().map(|(k, w)| (k.to_string(), *w)).collect()
    }

    fn ring3() -> PlacementRing {
        let ring = PlacementRing::new(2);
        ring.configure(weights(&[("/a", 10), ("/b", 10), ("/c", 10)]))
            .unwrap();
        ring
    }

    #[test]
    fn test_select_is_deterministic() {
        let ring = ring3();
        let first = ring.select("0000002a00000001", 2).unwrap();
        for _ in 0..10 {
            assert_eq!(ring.select("0000002a00000001", 2).unwrap(), first);
        }
    }

    #[test]
    fn test_select_distinct() {
        let ring = ring3();
        for i in 0..200 {
            let locs = ring.select(&format!("{:016x}", i), 3).unwrap();
            let set: BTreeSet<_> = locs.iter().collect();
            assert_eq!(set.len(), 3);
        }
    }

    #[test]
    fn test_select_prefix_stable() {
        let ring = ring3();
        let two = ring.select("key", 2).unwrap();
        let three = ring.select("key", 3).unwrap();
        assert_eq!(&three[..2], &two[..]);
    }

    #[test]
    fn test_select_is_weighted() {
        let ring = PlacementRing::new(1);
        ring.configure(weights(&[("/big", 9), ("/small", 1)])).unwrap();
        let big = (0..2000)
            .filter(|i| ring.select(&format!("obj-{}", i), 1).unwrap()[0] == "/big")
            .count();
        // expected share is 90%
        assert!(big > 1500, "big location won only {} of 2000", big);
    }

    #[test]
    fn test_select_exhausted() {
        let ring = ring3();
        assert_eq!(
            ring.select("key", 4),
            Err(StoreError::PlacementExhausted { wanted: 4, healthy: 3 })
        );
        // too few healthy does not change the state by itself
        assert_eq!(ring.state(), RingState::Normal);
    }

    #[test]
    fn test_configure_requires_min_replicas() {
        let ring = PlacementRing::new(2);
        let err = ring
            .configure(weights(&[("/a", 10), ("/b", 0)]))
            .unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));
        assert!(ring.locations().is_empty());
    }

    #[test]
    fn test_zero_weight_is_excluded() {
        let ring = PlacementRing::new(1);
        ring.configure(weights(&[("/a", 10), ("/b", 0)])).unwrap();
        assert_eq!(ring.locations(), vec!["/a".to_string()]);
        assert!(ring.select("key", 2).is_err());
    }

    #[test]
    fn test_state_transitions() {
        let ring = ring3();
        assert_eq!(ring.state(), RingState::Normal);

        assert!(ring.mark_unhealthy("/a"));
        assert_eq!(ring.state(), RingState::Degraded);
        assert!(!ring.mark_unhealthy("/a"));
        assert!(!ring.mark_unhealthy("/unknown"));

        // surviving locations still serve selections
        for i in 0..50 {
            let locs = ring.select(&format!("k{}", i), 2).unwrap();
            assert!(!locs.contains(&"/a".to_string()));
        }

        ring.mark_unhealthy("/b");
        assert_eq!(ring.state(), RingState::Degraded);
        ring.mark_unhealthy("/c");
        assert_eq!(ring.state(), RingState::Failed);
        assert_eq!(ring.healthy_count(), 0);
        assert!(matches!(
            ring.select("key", 1),
            Err(StoreError::PlacementExhausted { healthy: 0, .. })
        ));
    }

    #[test]
    fn test_configure_resets_state() {
        let ring = ring3();
        ring.mark_unhealthy("/a");
        ring.mark_unhealthy("/b");
        ring.mark_unhealthy("/c");
        assert_eq!(ring.state(), RingState::Failed);

        ring.configure(weights(&[("/a", 10), ("/b", 10)])).unwrap();
        assert_eq!(ring.state(), RingState::Normal);
        assert_eq!(ring.healthy_count(), 2);
    }

    #[test]
    fn test_select_on_unconfigured_ring_fails() {
        let ring = PlacementRing::new(1);
        assert!(ring.select("key", 1).is_err());
        assert_eq!(ring.state(), RingState::Failed);
    }

    #[test]
    fn test_select_racing_configure_never_fails_healthy_ring() {
        for _ in 0..200 {
            let ring = std::sync::Arc::new(PlacementRing::new(1));
            let selector = {
                let ring = ring.clone();
                std::thread::spawn(move || {
                    let _ = ring.select("key", 1);
                })
            };
            ring.configure(weights(&[("/a", 10)])).unwrap();
            selector.join().unwrap();

            assert_eq!(ring.healthy_count(), 1);
            assert_eq!(ring.state(), RingState::Normal);
        }
    }

    #[test]
    fn test_unit_interval_bounds() {
        assert!(unit_interval(0) > 0.0);
        assert!(unit_interval(u64::MAX) < 1.0);
    }
}
