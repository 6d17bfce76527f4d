//! Metadata store — the content-addressed table backing every cache entry.
//!
//! `HashedBlackboard` put secondary indices and a content-addressed primary
//! map side by side behind `DashMap`; the metadata store keeps that shape
//! (primary `id -> CacheEntry`, secondary `promptHash -> id`) and adds what
//! the blackboard never needed: TTL expiry and bounded capacity. Eviction
//! order is tracked with an intrusive, arena-indexed doubly-linked list
//! behind a single `parking_lot::RwLock`, so `touch`/`evict` are O(1)
//! without the cycles an owning `Rc<RefCell<Node>>` list would need.

use dashmap::DashMap;
use parking_lot::RwLock;

use crate::entry::CacheEntry;

struct LruNode {
    id: String,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Doubly-linked list of arena slots, most-recently-used at `head`.
#[derive(Default)]
struct LruList {
    arena: Vec<Option<LruNode>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl LruList {
    fn push_front(&mut self, id: String) -> usize {
        let slot = if let Some(slot) = self.free.pop() {
            self.arena[slot] = Some(LruNode { id, prev: None, next: self.head });
            slot
        } else {
            self.arena.push(Some(LruNode { id, prev: None, next: self.head }));
            self.arena.len() - 1
        };

        if let Some(old_head) = self.head {
            self.arena[old_head].as_mut().unwrap().prev = Some(slot);
        }
        self.head = Some(slot);
        if self.tail.is_none() {
            self.tail = Some(slot);
        }
        slot
    }

    fn unlink(&mut self, slot: usize) {
        let (prev, next) = match &self.arena[slot] {
            Some(node) => (node.prev, node.next),
            None => return,
        };
        match prev {
            Some(p) => self.arena[p].as_mut().unwrap().next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.arena[n].as_mut().unwrap().prev = prev,
            None => self.tail = prev,
        }
        self.arena[slot] = None;
        self.free.push(slot);
    }

    /// Move an existing slot to the front (most-recently-used).
    fn touch(&mut self, slot: usize) {
        if self.head == Some(slot) {
            return;
        }
        let id = match &self.arena[slot] {
            Some(node) => node.id.clone(),
            None => return,
        };
        self.unlink(slot);
        let new_slot = self.push_front(id);
        debug_assert_eq!(new_slot, slot, "push_front must reuse the slot it was just freed into");
    }

    fn pop_back(&mut self) -> Option<String> {
        let tail = self.tail?;
        let id = self.arena[tail].as_ref().unwrap().id.clone();
        self.unlink(tail);
        Some(id)
    }
}

/// In-memory, TTL- and capacity-bounded table of [`CacheEntry`].
pub struct MetadataStore {
    capacity: usize,
    entries: DashMap<String, CacheEntry>,
    by_prompt_hash: DashMap<String, String>,
    slots: DashMap<String, usize>,
    lru: RwLock<LruList>,
}

impl MetadataStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: DashMap::new(),
            by_prompt_hash: DashMap::new(),
            slots: DashMap::new(),
            lru: RwLock::new(LruList::default()),
        }
    }

    /// Insert or overwrite `entry`. This is the cancellation-safety commit
    /// point: callers must have already written the vector index and
    /// compressed payload before calling `set`, since from this point the
    /// entry is visible to `get`/`find_by_prompt_hash`.
    ///
    /// If inserting a brand-new id would exceed capacity, the
    /// least-recently-used entry is evicted first and returned.
    pub fn set(&self, entry: CacheEntry) -> Option<CacheEntry> {
        let id = entry.id.clone();
        let prompt_hash = entry.prompt_hash.clone();
        let is_new = !self.entries.contains_key(&id);

        let evicted = if is_new && self.capacity > 0 && self.entries.len() >= self.capacity {
            self.evict_lru()
        } else {
            None
        };

        if let Some(slot) = self.slots.get(&id).map(|r| *r) {
            self.lru.write().touch(slot);
        } else {
            let slot = self.lru.write().push_front(id.clone());
            self.slots.insert(id.clone(), slot);
        }

        self.by_prompt_hash.insert(prompt_hash, id.clone());
        self.entries.insert(id, entry);
        evicted
    }

    /// Fetch by id, touching recency and applying TTL expiry. An expired
    /// entry is removed and `None` is returned, exactly like a miss.
    pub fn get(&self, id: &str, now_ms: i64) -> Option<CacheEntry> {
        let expired = self.entries.get(id).map(|e| e.is_expired(now_ms))?;
        if expired {
            self.remove(id);
            return None;
        }

        if let Some(mut e) = self.entries.get_mut(id) {
            e.record_hit(now_ms);
        }
        if let Some(slot) = self.slots.get(id).map(|r| *r) {
            self.lru.write().touch(slot);
        }
        self.entries.get(id).map(|e| e.clone())
    }

    /// Fetch by normalized-prompt fingerprint, the exact-match fast path.
    pub fn find_by_prompt_hash(&self, prompt_hash: &str, now_ms: i64) -> Option<CacheEntry> {
        let id = self.by_prompt_hash.get(prompt_hash).map(|e| e.clone())?;
        self.get(&id, now_ms)
    }

    /// Remove whatever entry is currently indexed under `prompt_hash`,
    /// regardless of its id. Used by `insert` to enforce at-most-one-entry-
    /// per-fingerprint even when the new insert is assigned a different id
    /// than the one it supersedes (the graph backend's auto-increment ids
    /// never repeat, unlike tree-forest's fingerprint-as-id scheme).
    pub fn remove_by_prompt_hash(&self, prompt_hash: &str) -> Option<CacheEntry> {
        let id = self.by_prompt_hash.get(prompt_hash).map(|e| e.clone())?;
        self.remove(&id)
    }

    pub fn remove(&self, id: &str) -> Option<CacheEntry> {
        let (_, entry) = self.entries.remove(id)?;
        self.by_prompt_hash.remove(&entry.prompt_hash);
        if let Some((_, slot)) = self.slots.remove(id) {
            self.lru.write().unlink(slot);
        }
        Some(entry)
    }

    fn evict_lru(&self) -> Option<CacheEntry> {
        let id = self.lru.write().pop_back()?;
        self.slots.remove(&id);
        let (_, entry) = self.entries.remove(&id)?;
        self.by_prompt_hash.remove(&entry.prompt_hash);
        Some(entry)
    }

    pub fn clear(&self) {
        self.entries.clear();
        self.by_prompt_hash.clear();
        self.slots.clear();
        *self.lru.write() = LruList::default();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter_entries(&self) -> Vec<CacheEntry> {
        self.entries.iter().map(|e| e.value().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::MetricHint;

    fn entry(id: &str, created_at: i64, expires_at: Option<i64>) -> CacheEntry {
        CacheEntry {
            id: id.to_string(),
            vector_id: id.parse().unwrap_or(0),
            prompt_hash: format!("hash-{id}"),
            normalized_prompt: format!("prompt {id}"),
            compressed_prompt: vec![],
            compressed_response: vec![],
            original_prompt_size: 0,
            original_response_size: 0,
            compressed_prompt_size: 0,
            compressed_response_size: 0,
            created_at,
            last_accessed: created_at,
            access_count: 0,
            expires_at,
            vector_metric_hint: MetricHint::Cosine,
        }
    }

    #[test]
    fn get_returns_none_for_unknown_id() {
        let store = MetadataStore::new(10);
        assert!(store.get("missing", 0).is_none());
    }

    #[test]
    fn set_then_get_round_trips() {
        let store = MetadataStore::new(10);
        store.set(entry("1", 0, None));
        let got = store.get("1", 0).unwrap();
        assert_eq!(got.id, "1");
        assert_eq!(got.access_count, 1, "get must record a hit");
    }

    #[test]
    fn find_by_prompt_hash_resolves_through_secondary_index() {
        let store = MetadataStore::new(10);
        store.set(entry("1", 0, None));
        let got = store.find_by_prompt_hash("hash-1", 0).unwrap();
        assert_eq!(got.id, "1");
    }

    #[test]
    fn expired_entry_is_evicted_on_get() {
        let store = MetadataStore::new(10);
        store.set(entry("1", 0, Some(1_000)));
        assert!(store.get("1", 1_000).is_none());
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn capacity_overflow_evicts_least_recently_used() {
        let store = MetadataStore::new(2);
        store.set(entry("1", 0, None));
        store.set(entry("2", 0, None));
        // touch "1" so "2" becomes the LRU victim
        store.get("1", 0);
        let evicted = store.set(entry("3", 0, None));
        assert_eq!(evicted.unwrap().id, "2");
        assert!(store.get("2", 0).is_none());
        assert!(store.get("1", 0).is_some());
        assert!(store.get("3", 0).is_some());
    }

    #[test]
    fn overwriting_existing_id_does_not_evict() {
        let store = MetadataStore::new(1);
        store.set(entry("1", 0, None));
        let evicted = store.set(entry("1", 5, None));
        assert!(evicted.is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn remove_clears_both_indices() {
        let store = MetadataStore::new(10);
        store.set(entry("1", 0, None));
        store.remove("1");
        assert!(store.get("1", 0).is_none());
        assert!(store.find_by_prompt_hash("hash-1", 0).is_none());
    }

    #[test]
    fn clear_empties_everything() {
        let store = MetadataStore::new(10);
        store.set(entry("1", 0, None));
        store.set(entry("2", 0, None));
        store.clear();
        assert_eq!(store.len(), 0);
        assert!(store.find_by_prompt_hash("hash-1", 0).is_none());
    }
}
