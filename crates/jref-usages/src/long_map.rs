use std::borrow::Borrow;
use std::collections::hash_map::DefaultHasher;
use std::hash::{BuildHasher, BuildHasherDefault, Hash};

const DEFAULT_CAPACITY: usize = 16;
const DEFAULT_LOAD_FACTOR: f32 = 0.75;
const MAX_CAPACITY: usize = 1 << 30;

/// Hash map from `K` to a primitive `i64`, chained buckets with a
/// power-of-two table that doubles once `len` exceeds `capacity * load_factor`.
///
/// Values are stored unboxed next to their key.
#[derive(Clone, Debug)]
pub struct LongHashMap<K> {
    buckets: Vec<Vec<(K, i64)>>,
    len: usize,
    threshold: usize,
    load_factor: f32,
    hasher: BuildHasherDefault<DefaultHasher>,
}

impl<K: Hash + Eq> Default for LongHashMap<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Hash + Eq> LongHashMap<K> {
    pub fn new() -> Self {
        Self::with_capacity_and_load_factor(DEFAULT_CAPACITY, DEFAULT_LOAD_FACTOR)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_load_factor(capacity, DEFAULT_LOAD_FACTOR)
    }

    /// Non-positive or NaN load factors fall back to the default.
    pub fn with_capacity_and_load_factor(capacity: usize, load_factor: f32) -> Self {
        let load_factor = if load_factor.is_finite() && load_factor > 0.0 {
            load_factor
        } else {
            DEFAULT_LOAD_FACTOR
        };
        let capacity = capacity.clamp(1, MAX_CAPACITY).next_power_of_two();
        let mut buckets = Vec::with_capacity(capacity);
        buckets.resize_with(capacity, Vec::new);
        Self {
            buckets,
            len: 0,
            threshold: threshold(capacity, load_factor),
            load_factor,
            hasher: BuildHasherDefault::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.buckets.len()
    }

    pub fn get<Q>(&self, key: &Q) -> Option<i64>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let idx = self.bucket_of(key);
        self.buckets[idx]
            .iter()
            .find(|(k, _)| k.borrow() == key)
            .map(|(_, v)| *v)
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.get(key).is_some()
    }

    /// Inserts `value`, returning the previous value for `key`.
    pub fn put(&mut self, key: K, value: i64) -> Option<i64> {
        let idx = self.bucket_of(&key);
        if let Some(slot) = self.buckets[idx].iter_mut().find(|(k, _)| *k == key) {
            return Some(std::mem::replace(&mut slot.1, value));
        }
        self.buckets[idx].push((key, value));
        self.len += 1;
        if self.len > self.threshold {
            self.resize(self.buckets.len() * 2);
        }
        None
    }

    pub fn remove<Q>(&mut self, key: &Q) -> Option<i64>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let idx = self.bucket_of(key);
        let bucket = &mut self.buckets[idx];
        let pos = bucket.iter().position(|(k, _)| k.borrow() == key)?;
        self.len -= 1;
        Some(bucket.swap_remove(pos).1)
    }

    pub fn clear(&mut self) {
        for bucket in &mut self.buckets {
            bucket.clear();
        }
        self.len = 0;
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.iter().map(|(k, _)| k)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, i64)> {
        self.buckets
            .iter()
            .flat_map(|bucket| bucket.iter().map(|(k, v)| (k, *v)))
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&K, i64) -> bool) {
        for bucket in &mut self.buckets {
            bucket.retain(|(k, v)| keep(k, *v));
        }
        self.len = self.buckets.iter().map(Vec::len).sum();
    }

    fn bucket_of<Q: ?Sized + Hash>(&self, key: &Q) -> usize {
        (self.hasher.hash_one(key) as usize) & (self.buckets.len() - 1)
    }

    fn resize(&mut self, new_capacity: usize) {
        if self.buckets.len() >= MAX_CAPACITY {
            self.threshold = usize::MAX;
            return;
        }
        let mut buckets: Vec<Vec<(K, i64)>> = Vec::with_capacity(new_capacity);
        buckets.resize_with(new_capacity, Vec::new);
        let old = std::mem::replace(&mut self.buckets, buckets);
        for (key, value) in old.into_iter().flatten() {
            let idx = self.bucket_of(&key);
            self.buckets[idx].push((key, value));
        }
        self.threshold = threshold(new_capacity, self.load_factor);
    }
}

fn threshold(capacity: usize, load_factor: f32) -> usize {
    ((capacity as f64) * f64::from(load_factor)) as usize
}

impl<K: Hash + Eq> FromIterator<(K, i64)> for LongHashMap<K> {
    fn from_iter<I: IntoIterator<Item = (K, i64)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (k, v) in iter {
            map.put(k, v);
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_returns_previous_value() {
        let mut map = LongHashMap::new();
        assert_eq!(map.put("a".to_string(), 1), None);
        assert_eq!(map.put("a".to_string(), 2), Some(1));
        assert_eq!(map.get(&"a".to_string()), Some(2));
        assert_eq!(map.get(&"b".to_string()), None);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn string_keys_are_found_by_str() {
        let mut map = LongHashMap::new();
        for i in 0..64 {
            map.put(format!("p/C{i}.class"), i);
        }
        assert_eq!(map.get("p/C17.class"), Some(17));
        assert!(map.contains_key("p/C63.class"));
        assert!(!map.contains_key("p/C64.class"));
        assert_eq!(map.remove("p/C17.class"), Some(17));
        assert_eq!(map.get("p/C17.class"), None);
        assert_eq!(map.len(), 63);
    }

    #[test]
    fn grows_by_doubling_past_the_load_factor() {
        let mut map = LongHashMap::with_capacity(4);
        assert_eq!(map.capacity(), 4);
        for i in 0..4 {
            map.put(i, i64::from(i) * 10);
        }
        assert_eq!(map.capacity(), 8);
        for i in 4..1000 {
            map.put(i, i64::from(i) * 10);
        }
        assert!(map.capacity().is_power_of_two());
        assert!(map.len() as f32 <= map.capacity() as f32 * 0.75);
        assert!((0..1000).all(|i| map.get(&i) == Some(i64::from(i) * 10)));
    }

    #[test]
    fn remove_and_retain() {
        let mut map: LongHashMap<u32> = (0..10).map(|i| (i, i64::from(i))).collect();
        assert_eq!(map.remove(&3), Some(3));
        assert_eq!(map.remove(&3), None);
        map.retain(|_, v| v % 2 == 0);
        let mut keys: Vec<_> = map.keys().copied().collect();
        keys.sort();
        assert_eq!(keys, vec![0, 2, 4, 6, 8]);
        assert_eq!(map.len(), 5);
        map.clear();
        assert!(map.is_empty());
    }
}
