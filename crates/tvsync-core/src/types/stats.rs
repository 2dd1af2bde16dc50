//! Cache statistics

/// Statistics for cache operations
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Number of cache hits
    pub hits: u64,
    /// Number of cache misses
    pub misses: u64,
    /// Number of stale hits (served stale while revalidating)
    pub stale_hits: u64,
    /// Number of write operations
    pub writes: u64,
    /// Number of delete operations
    pub deletes: u64,
    /// Entries dropped because they could not be decoded
    pub purges: u64,
    /// Entries recovered through lenient re-coercion
    pub migrations: u64,
    /// Current number of entries
    pub size: usize,
    /// Approximate memory usage in bytes
    pub memory_bytes: usize,
}

impl CacheStats {
    /// Calculate hit ratio (0.0 to 1.0)
    pub fn hit_ratio(&self) -> f64 {
        let total = self.total_requests();
        if total == 0 {
            0.0
        } else {
            (self.hits + self.stale_hits) as f64 / total as f64
        }
    }

    /// Calculate miss ratio (0.0 to 1.0)
    pub fn miss_ratio(&self) -> f64 {
        1.0 - self.hit_ratio()
    }

    /// Total requests (hits + stale hits + misses)
    pub fn total_requests(&self) -> u64 {
        self.hits + self.stale_hits + self.misses
    }

    /// Merge stats from another instance
    pub fn merge(&mut self, other: &CacheStats) {
        self.hits += other.hits;
        self.misses += other.misses;
        self.stale_hits += other.stale_hits;
        self.writes += other.writes;
        self.deletes += other.deletes;
        self.purges += other.purges;
        self.migrations += other.migrations;
        self.size = other.size; // Use latest size
        self.memory_bytes = other.memory_bytes;
    }
}
