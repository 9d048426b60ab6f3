//! Bounded object cache with move-to-front recency.
//!
//! Keeps expensive, rebuildable resources (resolved fonts) alive across
//! operators. Lookups scan linearly and promote hits to the front; inserts
//! at capacity evict and drop the least recently used entry. Capacities are
//! expected to be small (tens of entries), so the linear scan is cheaper in
//! practice than maintaining an index.

/// A fixed-capacity key -> item cache with least-recently-used eviction.
///
/// The cache owns both keys and items. `lookup` returns a borrowed
/// reference; the item is dropped only when it is evicted, the cache is
/// cleared, or the cache itself is dropped. Inserting the same logical key
/// twice is a caller error: entries are not deduplicated.
pub struct BoundedCache<K, V> {
    capacity: usize,
    /// Most recently used first.
    entries: Vec<(K, V)>,
}

impl<K: PartialEq, V> BoundedCache<K, V> {
    /// Create a cache holding at most `capacity` entries.
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "cache capacity must be at least 1");
        BoundedCache {
            capacity,
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Look up an item by key.
    ///
    /// On a hit the entry is promoted to the most-recently-used position
    /// before a reference to its item is returned.
    pub fn lookup(&mut self, key: &K) -> Option<&V> {
        let pos = self.entries.iter().position(|(k, _)| k == key)?;
        // Rotate instead of remove+insert: one pass, keeps relative order
        // of the entries in front of the hit.
        self.entries[..=pos].rotate_right(1);
        Some(&self.entries[0].1)
    }

    /// Insert a key/item pair at the most-recently-used position.
    ///
    /// If the cache is full, the least-recently-used entry is evicted and
    /// dropped first.
    pub fn put(&mut self, key: K, item: V) {
        if self.entries.len() == self.capacity {
            self.entries.pop();
        }
        self.entries.insert(0, (key, item));
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The fixed capacity set at construction.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every entry, keeping the capacity.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
