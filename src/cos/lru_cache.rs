// COS Transfer Library for S3-compatible Object Storage
// Copyright 2025 cos-transfer contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Bounded least-recently-used cache
//!
//! A hash map from key to slot plus a doubly-linked recency list threaded
//! through a slab of slots, so every operation is O(1). The whole structure
//! sits behind one mutex and is shared by reference between callers.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("key not found in cache")]
    NotFound,
}

#[derive(Debug)]
struct Node<K, V> {
    key: K,
    value: V,
    prev: Option<usize>,
    next: Option<usize>,
}

#[derive(Debug)]
struct Inner<K, V> {
    capacity: usize,
    map: HashMap<K, usize>,
    slots: Vec<Node<K, V>>,
    /// most recently used
    head: Option<usize>,
    /// least recently used
    tail: Option<usize>,
}

impl<K: Eq + Hash + Clone, V> Inner<K, V> {
    fn unlink(&mut self, idx: usize) {
        let (prev, next) = (self.slots[idx].prev, self.slots[idx].next);
        match prev {
            Some(p) => self.slots[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.slots[n].prev = prev,
            None => self.tail = prev,
        }
        self.slots[idx].prev = None;
        self.slots[idx].next = None;
    }

    fn push_front(&mut self, idx: usize) {
        self.slots[idx].prev = None;
        self.slots[idx].next = self.head;
        if let Some(h) = self.head {
            self.slots[h].prev = Some(idx);
        }
        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }

    fn touch(&mut self, idx: usize) {
        if self.head != Some(idx) {
            self.unlink(idx);
            self.push_front(idx);
        }
    }

    fn put(&mut self, key: K, value: V) {
        if let Some(&idx) = self.map.get(&key) {
            self.slots[idx].value = value;
            self.touch(idx);
            return;
        }

        if self.map.len() >= self.capacity
            && let Some(lru) = self.tail
        {
            // Reuse the evicted slot for the new entry.
            self.unlink(lru);
            self.map.remove(&self.slots[lru].key);
            self.slots[lru].key = key.clone();
            self.slots[lru].value = value;
            self.map.insert(key, lru);
            self.push_front(lru);
            return;
        }

        let idx = self.slots.len();
        self.slots.push(Node {
            key: key.clone(),
            value,
            prev: None,
            next: None,
        });
        self.map.insert(key, idx);
        self.push_front(idx);
    }
}

/// Fixed-capacity cache evicting the least-recently-used entry.
#[derive(Debug)]
pub struct LruCache<K, V> {
    inner: Mutex<Inner<K, V>>,
}

impl<K: Eq + Hash + Clone, V: Clone> LruCache<K, V> {
    /// Creates a cache holding at most `capacity` entries (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(Inner {
                capacity,
                map: HashMap::with_capacity(capacity),
                slots: Vec::with_capacity(capacity),
                head: None,
                tail: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<K, V>> {
        // A panic while holding the lock cannot leave the list half-linked
        // in a way later calls would observe as unsound; keep serving.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts or refreshes an entry, evicting the least recently used one when full.
    pub fn put(&self, key: K, value: V) {
        self.lock().put(key, value);
    }

    /// Returns the value for `key` and marks it most recently used.
    pub fn get(&self, key: &K) -> Result<V, CacheError> {
        let mut inner = self.lock();
        let idx = *inner.map.get(key).ok_or(CacheError::NotFound)?;
        inner.touch(idx);
        Ok(inner.slots[idx].value.clone())
    }

    /// Membership check that leaves recency untouched.
    pub fn exist(&self, key: &K) -> bool {
        self.lock().map.contains_key(key)
    }

    pub fn size(&self) -> usize {
        self.lock().map.len()
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity
    }
}
