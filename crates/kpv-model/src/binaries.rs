//! Entry attachments: a sorted shrouded-binary map and a deduplicating
//! positional set.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use kpv_core::{KpvError, KpvResult};
use kpv_crypto::ShroudedBytes;

use crate::name::FieldName;

/// Attachment map from case-insensitive name to shrouded bytes, iterated in
/// case-folded key order.
#[derive(Debug, Clone, Default)]
pub struct KpSortedBinaryMap {
    entries: BTreeMap<FieldName, ShroudedBytes>,
}

impl KpSortedBinaryMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert only when the name is vacant. Returns whether the value was
    /// stored.
    pub fn add(&mut self, name: &str, value: ShroudedBytes) -> bool {
        match self.entries.entry(FieldName::new(name)) {
            Entry::Occupied(_) => false,
            Entry::Vacant(e) => {
                e.insert(value);
                true
            }
        }
    }

    /// Insert or overwrite.
    pub fn set(&mut self, name: &str, value: ShroudedBytes) {
        self.entries.insert(FieldName::new(name), value);
    }

    pub fn remove(&mut self, name: &str) -> bool {
        self.entries.remove(&FieldName::new(name)).is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&FieldName::new(name))
    }

    pub fn try_get(&self, name: &str) -> Option<&ShroudedBytes> {
        self.entries.get(&FieldName::new(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FieldName, &ShroudedBytes)> {
        self.entries.iter()
    }
}

impl PartialEq for KpSortedBinaryMap {
    /// Size plus every shrouded pairing, compared by content hash; nothing
    /// is decrypted.
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl Eq for KpSortedBinaryMap {}

/// Append-only positional list of shrouded binaries with dedup-on-add.
///
/// Membership rides on shrouded-value equality (content hash), so adding
/// bytes already present is a no-op that reports the existing position.
#[derive(Debug, Clone, Default)]
pub struct KpBinarySet {
    items: Vec<ShroudedBytes>,
}

impl KpBinarySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Append unless an equal value is already present; either way, returns
    /// the index the value lives at.
    pub fn add(&mut self, value: ShroudedBytes) -> usize {
        if let Some(existing) = self.items.iter().position(|v| *v == value) {
            return existing;
        }
        self.items.push(value);
        self.items.len() - 1
    }

    pub fn get(&self, index: usize) -> Option<&ShroudedBytes> {
        self.items.get(index)
    }

    /// Replace in range; an index equal to the current length appends;
    /// anything beyond is a range error.
    pub fn set(&mut self, index: usize, value: ShroudedBytes) -> KpvResult<()> {
        match index.cmp(&self.items.len()) {
            std::cmp::Ordering::Less => {
                self.items[index] = value;
                Ok(())
            }
            std::cmp::Ordering::Equal => {
                self.items.push(value);
                Ok(())
            }
            std::cmp::Ordering::Greater => Err(KpvError::Range {
                index,
                len: self.items.len(),
            }),
        }
    }

    pub fn position_of(&self, value: &ShroudedBytes) -> Option<usize> {
        self.items.iter().position(|v| v == value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ShroudedBytes> {
        self.items.iter()
    }
}
