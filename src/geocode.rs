//! Coordinate resolution for orders that arrive as addresses.
//!
//! Resolution is an ordered list of strategies with one uniform contract:
//! the cache answers first and is authoritative; live backends are only
//! consulted on a miss, and their answers are written back. Batch
//! resolution fans out within a batch and cools down between batches to
//! respect upstream rate limits.

use std::collections::HashMap;
use std::sync::RwLock;
use std::thread;
use std::time::Duration;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::domain::Location;
use crate::traits::CoordinateResolver;

/// In-memory coordinate cache, also usable as a standalone resolver for
/// preloaded lookup tables.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, Location>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, query: &str, location: Location) {
        self.entries
            .write()
            .expect("cache lock poisoned")
            .insert(query.to_string(), location);
    }

    pub fn get(&self, query: &str) -> Option<Location> {
        self.entries
            .read()
            .expect("cache lock poisoned")
            .get(query)
            .copied()
    }

    pub fn len(&self) -> usize {
        self.entries.read().expect("cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CoordinateResolver for MemoryCache {
    fn name(&self) -> &str {
        "memory-cache"
    }

    fn resolve(&self, query: &str) -> Option<Location> {
        self.get(query)
    }
}

/// Ordered resolver strategies behind a shared cache.
pub struct ResolverChain {
    cache: MemoryCache,
    resolvers: Vec<Box<dyn CoordinateResolver>>,
}

impl ResolverChain {
    pub fn new() -> Self {
        Self {
            cache: MemoryCache::new(),
            resolvers: Vec::new(),
        }
    }

    /// Appends a live backend; earlier backends are asked first.
    pub fn with_resolver(mut self, resolver: Box<dyn CoordinateResolver>) -> Self {
        self.resolvers.push(resolver);
        self
    }

    /// Seeds the cache with known coordinates (e.g. previously persisted
    /// geocoding results).
    pub fn preload(&self, entries: impl IntoIterator<Item = (String, Location)>) {
        for (query, location) in entries {
            self.cache.insert(&query, location);
        }
    }

    /// Cache first, then each backend in order. A live answer is written
    /// back so repeat queries never hit the network again.
    pub fn resolve(&self, query: &str) -> Option<Location> {
        if let Some(hit) = self.cache.get(query) {
            debug!("resolved '{query}' from cache");
            return Some(hit);
        }
        for resolver in &self.resolvers {
            if let Some(location) = resolver.resolve(query) {
                if !location.is_valid() {
                    warn!(
                        "resolver '{}' returned invalid coordinates for '{query}'",
                        resolver.name()
                    );
                    continue;
                }
                debug!("resolved '{query}' via '{}'", resolver.name());
                self.cache.insert(query, location);
                return Some(location);
            }
        }
        warn!("no resolver could answer '{query}'");
        None
    }

    /// Resolves many queries in bounded batches. Queries within a batch
    /// are independent and run concurrently; a cooldown separates batches.
    pub fn resolve_batch(
        &self,
        queries: &[String],
        batch_size: usize,
        cooldown: Duration,
    ) -> Vec<Option<Location>> {
        let batch_size = batch_size.max(1);
        let mut results = Vec::with_capacity(queries.len());
        let chunks: Vec<&[String]> = queries.chunks(batch_size).collect();
        let total = chunks.len();
        for (i, chunk) in chunks.into_iter().enumerate() {
            let resolved: Vec<Option<Location>> =
                chunk.par_iter().map(|q| self.resolve(q)).collect();
            results.extend(resolved);
            if i + 1 < total && !cooldown.is_zero() {
                thread::sleep(cooldown);
            }
        }
        let hits = results.iter().filter(|r| r.is_some()).count();
        info!("resolved {hits}/{} queries", queries.len());
        results
    }
}

impl Default for ResolverChain {
    fn default() -> Self {
        Self::new()
    }
}
