//! LRU cache for evicted regions
//!
//! Regions that leave the active neighborhood are parked here instead of
//! being destroyed, so walking back to them is a cache hit rather than a
//! reload. When the cache is full, the least recently touched region is
//! handed back to the caller for retirement.

use std::collections::{HashMap, VecDeque};

use crate::streaming::coord::RegionCoord;

/// LRU cache keyed by region coordinate
///
/// Lookups go through a `HashMap`. Recency is a queue of `(coord, stamp)`
/// pairs; promoting an entry pushes a new pair and leaves the old one to be
/// skipped lazily, keeping every operation amortized O(1).
pub struct RecentRegionCache<V> {
    /// Map of coordinates to values and their latest stamp
    entries: HashMap<RegionCoord, (V, u64)>,
    /// Access order: oldest first, may contain stale pairs
    recency: VecDeque<(RegionCoord, u64)>,
    /// Next stamp to hand out
    clock: u64,
    /// Maximum number of regions to keep
    capacity: usize,
}

impl<V> RecentRegionCache<V> {
    /// Create a cache holding at most `capacity` regions
    ///
    /// # Arguments
    /// * `capacity` - Maximum number of regions kept
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
            recency: VecDeque::with_capacity(capacity * 2),
            clock: 0,
            capacity,
        }
    }

    /// Look up a region and mark it most recently used
    ///
    /// # Arguments
    /// * `coord` - Region coordinate
    ///
    /// # Returns
    /// Mutable reference to the cached value if present
    pub fn try_get_region(&mut self, coord: RegionCoord) -> Option<&mut V> {
        if !self.entries.contains_key(&coord) {
            return None;
        }
        let stamp = self.touch(coord);
        if let Some(entry) = self.entries.get_mut(&coord) {
            entry.1 = stamp;
        }
        self.compact();
        self.entries.get_mut(&coord).map(|(value, _)| value)
    }

    /// Remove and return a region (cache hit on the load path)
    pub fn take_region(&mut self, coord: RegionCoord) -> Option<V> {
        self.remove_region(coord)
    }

    /// Insert a region, or refresh it if already cached
    ///
    /// # Arguments
    /// * `coord` - Region coordinate
    /// * `value` - Region to park
    ///
    /// # Returns
    /// The displaced entry: the previous value at `coord`, or the least
    /// recently used region when the insert pushed the cache past capacity
    pub fn cache_region(&mut self, coord: RegionCoord, value: V) -> Option<(RegionCoord, V)> {
        let stamp = self.touch(coord);
        let displaced = match self.entries.insert(coord, (value, stamp)) {
            Some((previous, _)) => Some((coord, previous)),
            None if self.entries.len() > self.capacity => self.evict_oldest(),
            None => None,
        };
        self.compact();
        displaced
    }

    /// Remove a region from both the map and the recency order
    pub fn remove_region(&mut self, coord: RegionCoord) -> Option<V> {
        let (value, _) = self.entries.remove(&coord)?;
        self.compact();
        Some(value)
    }

    /// Evict the least recently used region
    ///
    /// # Returns
    /// The evicted coordinate and value, if any
    pub fn evict_oldest(&mut self) -> Option<(RegionCoord, V)> {
        while let Some((coord, stamp)) = self.recency.pop_front() {
            let live = self.entries.get(&coord).is_some_and(|(_, s)| *s == stamp);
            if live {
                return self.entries.remove(&coord).map(|(value, _)| (coord, value));
            }
        }
        None
    }

    pub fn contains(&self, coord: RegionCoord) -> bool {
        self.entries.contains_key(&coord)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Cached coordinates, least recently used first
    pub fn coords(&self) -> Vec<RegionCoord> {
        let mut coords: Vec<_> = self.entries.iter().map(|(c, (_, stamp))| (*stamp, *c)).collect();
        coords.sort_unstable_by_key(|(stamp, _)| *stamp);
        coords.into_iter().map(|(_, c)| c).collect()
    }

    /// Iterate over all cached values in no particular order
    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut V> {
        self.entries.values_mut().map(|(v, _)| v)
    }

    /// Remove everything, oldest first
    pub fn drain(&mut self) -> Vec<(RegionCoord, V)> {
        let order = self.coords();
        let drained = order
            .into_iter()
            .filter_map(|c| self.entries.remove(&c).map(|(v, _)| (c, v)))
            .collect();
        self.recency.clear();
        drained
    }

    fn touch(&mut self, coord: RegionCoord) -> u64 {
        self.clock += 1;
        self.recency.push_back((coord, self.clock));
        self.clock
    }

    /// Drop stale recency pairs once they outnumber live entries
    fn compact(&mut self) {
        if self.recency.len() <= self.entries.len() * 2 + 16 {
            return;
        }
        let entries = &self.entries;
        self.recency
            .retain(|(coord, stamp)| entries.get(coord).is_some_and(|(_, s)| s == stamp));
    }
}
