//! Sharded concurrent hash map.
//!
//! Writers take a single bucket-shard lock, so insert-or-update is atomic
//! per key while unrelated keys proceed in parallel. This is the accessor
//! pattern the runtime's profile tables are built on.

use std::hash::{BuildHasher, Hash};

use ahash::{AHashMap, RandomState};
use parking_lot::RwLock;

const DEFAULT_SHARDS: usize = 16;

pub struct ShardedMap<K, V> {
    shards: Box<[RwLock<AHashMap<K, V>>]>,
    hasher: RandomState,
}

impl<K: Hash + Eq, V> ShardedMap<K, V> {
    pub fn new() -> Self {
        Self::with_shards(DEFAULT_SHARDS)
    }

    pub fn with_shards(count: usize) -> Self {
        let count = count.max(1);
        let shards = (0..count)
            .map(|_| RwLock::new(AHashMap::new()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            shards,
            hasher: RandomState::new(),
        }
    }

    fn shard(&self, key: &K) -> &RwLock<AHashMap<K, V>> {
        let hash = self.hasher.hash_one(key) as usize;
        &self.shards[hash % self.shards.len()]
    }

    pub fn get(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        self.shard(key).read().get(key).cloned()
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.shard(key).read().contains_key(key)
    }

    /// Insert `value` unless the key is already present. Returns the value
    /// now in the map and whether this call inserted it.
    pub fn insert_if_absent(&self, key: K, value: V) -> (V, bool)
    where
        V: Clone,
    {
        let mut shard = self.shard(&key).write();
        match shard.entry(key) {
            std::collections::hash_map::Entry::Occupied(e) => (e.get().clone(), false),
            std::collections::hash_map::Entry::Vacant(e) => (e.insert(value).clone(), true),
        }
    }

    /// Run `f` on the entry for `key`, inserting `default()` first if the
    /// key is absent. The shard lock is held for the duration of `f`.
    pub fn update<R>(&self, key: K, default: impl FnOnce() -> V, f: impl FnOnce(&mut V) -> R) -> R {
        let mut shard = self.shard(&key).write();
        let slot = shard.entry(key).or_insert_with(default);
        f(slot)
    }

    pub fn for_each(&self, mut f: impl FnMut(&K, &V)) {
        for shard in self.shards.iter() {
            let guard = shard.read();
            for (k, v) in guard.iter() {
                f(k, v);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<(K, V)>
    where
        K: Clone,
        V: Clone,
    {
        let mut out = Vec::with_capacity(self.len());
        self.for_each(|k, v| out.push((k.clone(), v.clone())));
        out
    }
}

impl<K: Hash + Eq, V> Default for ShardedMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}
