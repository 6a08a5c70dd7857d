//! Open-addressed hash table (spec §4.2), keyed by interned strings.
//!
//! Used for both the string-intern set (`Table<()>`) and the global-name
//! environment's name→index map (`Table<usize>`, see [`crate::globals`]).
//! Capacity doubles on growth; load factor threshold is 0.75; probing is
//! linear. A slot is one of three states — empty, tombstone, or occupied —
//! modeled directly as an enum rather than clox's `key == NULL` + sentinel
//! value trick, since Rust lets us say what we mean.

use crate::object::ObjRef;

const INITIAL_CAPACITY: usize = 8;
const MAX_LOAD_FACTOR: f64 = 0.75;

enum Slot<V> {
    Empty,
    Tombstone,
    Occupied { key: ObjRef, value: V },
}

/// An open-addressed `ObjRef(String) -> V` map with linear probing and
/// tombstone deletion.
pub struct Table<V> {
    entries: Vec<Slot<V>>,
    /// occupied + tombstone count; tombstones count toward the load factor
    /// so a delete-heavy table still gets rehashed instead of probing
    /// forever (matches clox's `table->count` bookkeeping).
    count: usize,
}

impl<V> Default for Table<V> {
    fn default() -> Self {
        Table { entries: Vec::new(), count: 0 }
    }
}

impl<V> Table<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries
            .iter()
            .filter(|s| matches!(s, Slot::Occupied { .. }))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Locate the slot a `(hash)` probe sequence would land `key` in: the
    /// first empty slot, or the exact occupied slot matching `key`, or (for
    /// deletion bookkeeping) the first tombstone encountered along the way.
    fn find_slot(entries: &[Slot<V>], key: ObjRef) -> usize {
        let capacity = entries.len();
        let hash = key.as_string().hash;
        let mut index = hash as usize % capacity;
        let mut first_tombstone: Option<usize> = None;
        loop {
            match &entries[index] {
                Slot::Empty => return first_tombstone.unwrap_or(index),
                Slot::Tombstone => {
                    if first_tombstone.is_none() {
                        first_tombstone = Some(index);
                    }
                }
                Slot::Occupied { key: k, .. } if *k == key => return index,
                Slot::Occupied { .. } => {}
            }
            index = (index + 1) % capacity;
        }
    }

    fn grow(&mut self, new_capacity: usize) {
        let mut new_entries: Vec<Slot<V>> = (0..new_capacity).map(|_| Slot::Empty).collect();
        let mut new_count = 0;
        for slot in std::mem::take(&mut self.entries) {
            if let Slot::Occupied { key, value } = slot {
                let index = Self::find_slot(&new_entries, key);
                new_entries[index] = Slot::Occupied { key, value };
                new_count += 1;
            }
        }
        self.entries = new_entries;
        self.count = new_count;
    }

    fn ensure_capacity(&mut self) {
        if self.entries.is_empty() {
            self.grow(INITIAL_CAPACITY);
            return;
        }
        if (self.count + 1) as f64 > self.capacity() as f64 * MAX_LOAD_FACTOR {
            self.grow(self.capacity() * 2);
        }
    }

    pub fn get(&self, key: ObjRef) -> Option<&V> {
        if self.entries.is_empty() {
            return None;
        }
        match &self.entries[Self::find_slot(&self.entries, key)] {
            Slot::Occupied { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, key: ObjRef) -> Option<&mut V> {
        if self.entries.is_empty() {
            return None;
        }
        let index = Self::find_slot(&self.entries, key);
        match &mut self.entries[index] {
            Slot::Occupied { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Returns `true` if this inserted a brand-new key.
    pub fn set(&mut self, key: ObjRef, value: V) -> bool {
        self.ensure_capacity();
        let index = Self::find_slot(&self.entries, key);
        let is_new = !matches!(self.entries[index], Slot::Occupied { .. });
        if is_new && !matches!(self.entries[index], Slot::Tombstone) {
            self.count += 1;
        }
        self.entries[index] = Slot::Occupied { key, value };
        is_new
    }

    pub fn delete(&mut self, key: ObjRef) -> bool {
        if self.entries.is_empty() {
            return false;
        }
        let index = Self::find_slot(&self.entries, key);
        if matches!(self.entries[index], Slot::Occupied { .. }) {
            self.entries[index] = Slot::Tombstone;
            true
        } else {
            false
        }
    }

    pub fn contains(&self, key: ObjRef) -> bool {
        self.get(key).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjRef, &V)> {
        self.entries.iter().filter_map(|s| match s {
            Slot::Occupied { key, value } => Some((*key, value)),
            _ => None,
        })
    }
}

impl<V> Table<V> {
    /// Probe by raw bytes rather than by an already-interned `ObjRef`; this
    /// is what lets the interner check "does an equal string already exist"
    /// without allocating a candidate object first (spec §4.2).
    pub fn find_string(&self, chars: &str, hash: u32) -> Option<ObjRef> {
        if self.entries.is_empty() {
            return None;
        }
        let capacity = self.entries.len();
        let mut index = hash as usize % capacity;
        loop {
            match &self.entries[index] {
                Slot::Empty => return None,
                Slot::Occupied { key, .. } => {
                    let s = key.as_string();
                    if s.hash == hash && s.chars == chars {
                        return Some(*key);
                    }
                }
                Slot::Tombstone => {}
            }
            index = (index + 1) % capacity;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gc::Heap;
    use proptest::prelude::*;

    #[test]
    fn insert_get_delete_roundtrip() {
        let mut heap = Heap::new();
        let mut table: Table<i32> = Table::new();
        let a = heap.intern_str("alpha");
        let b = heap.intern_str("beta");
        assert!(table.set(a, 1));
        assert!(table.set(b, 2));
        assert!(!table.set(a, 10));
        assert_eq!(table.get(a), Some(&10));
        assert_eq!(table.get(b), Some(&2));
        assert!(table.delete(a));
        assert_eq!(table.get(a), None);
        assert_eq!(table.get(b), Some(&2));
    }

    #[test]
    fn grows_past_load_factor_without_losing_entries() {
        let mut heap = Heap::new();
        let mut table: Table<usize> = Table::new();
        let names: Vec<_> = (0..64)
            .map(|i| heap.intern_str(&format!("name{i}")))
            .collect();
        for (i, &n) in names.iter().enumerate() {
            table.set(n, i);
        }
        for (i, &n) in names.iter().enumerate() {
            assert_eq!(table.get(n), Some(&i));
        }
    }

    proptest! {
        /// Spec probe invariant: for every occupied slot, the probe sequence
        /// `find_slot` computes from scratch lands back on that same index.
        /// Holds after any mix of inserts/deletes/grows, since `set`,
        /// `delete`, and `grow` all place entries through `find_slot` itself.
        #[test]
        fn every_occupied_slot_is_where_find_slot_would_relocate_it(
            ops in prop::collection::vec((0usize..10, any::<bool>()), 1..80)
        ) {
            let mut heap = Heap::new();
            let keys: Vec<ObjRef> = (0..10).map(|i| heap.intern_str(&format!("key{i}"))).collect();
            let mut table: Table<u32> = Table::new();

            for (i, (key_index, insert)) in ops.iter().enumerate() {
                let key = keys[*key_index];
                if *insert {
                    table.set(key, i as u32);
                } else {
                    table.delete(key);
                }
            }

            for (index, slot) in table.entries.iter().enumerate() {
                if let Slot::Occupied { key, .. } = slot {
                    prop_assert_eq!(Table::<u32>::find_slot(&table.entries, *key), index);
                }
            }
        }
    }
}
