//! Information store - per-node map of item id to decaying record.
//!
//! Energy is a `NonZeroU64`, so an exhausted item cannot be represented:
//! anything that would reach zero is removed instead of retained.

use std::collections::BTreeMap;
use std::num::NonZeroU64;

use robust_protocol::{Hops, ItemSummary};

/// Where an item came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Provenance {
    /// Injected locally (reported as `"self"`)
    Local,
    /// Received from the peer with this id
    Peer(String),
}

impl std::fmt::Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => f.write_str("self"),
            Self::Peer(id) => f.write_str(id),
        }
    }
}

/// A held information item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InformationItem {
    /// Opaque payload
    pub content: String,
    /// Remaining propagation budget
    pub energy: NonZeroU64,
    /// Hops travelled to reach this node
    pub hops: Hops,
    /// Originating peer
    pub provenance: Provenance,
}

/// Outcome of offering an item to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// New item stored
    Stored,
    /// Id already held; nothing changed
    AlreadyHeld,
    /// Offered with zero energy; nothing stored
    Exhausted,
}

/// Map of `info_id` to [`InformationItem`].
#[derive(Debug, Clone, Default)]
pub struct InformationStore {
    items: BTreeMap<String, InformationItem>,
}

impl InformationStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of held items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether `info_id` is held.
    pub fn contains(&self, info_id: &str) -> bool {
        self.items.contains_key(info_id)
    }

    /// Look up a held item.
    pub fn get(&self, info_id: &str) -> Option<&InformationItem> {
        self.items.get(info_id)
    }

    /// Held items in id order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &InformationItem)> {
        self.items.iter()
    }

    /// Store a new item unless the id is already held or `energy` is zero.
    ///
    /// An existing item is never overwritten, so re-delivery is a no-op.
    pub fn admit(
        &mut self,
        info_id: &str,
        content: &str,
        energy: u64,
        hops: Hops,
        provenance: Provenance,
    ) -> Admission {
        if self.items.contains_key(info_id) {
            return Admission::AlreadyHeld;
        }
        let Some(energy) = NonZeroU64::new(energy) else {
            return Admission::Exhausted;
        };
        self.items.insert(
            info_id.to_string(),
            InformationItem {
                content: content.to_string(),
                energy,
                hops,
                provenance,
            },
        );
        Admission::Stored
    }

    /// Decrement every item's energy by one and drop those that reach zero.
    ///
    /// Returns the ids that were removed.
    pub fn decay(&mut self) -> Vec<String> {
        let mut expired = Vec::new();
        self.items.retain(|info_id, item| match NonZeroU64::new(item.energy.get() - 1) {
            Some(energy) => {
                item.energy = energy;
                true
            }
            None => {
                expired.push(info_id.clone());
                false
            }
        });
        expired
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Energy and hop count per held item.
    pub fn summaries(&self) -> BTreeMap<String, ItemSummary> {
        self.items
            .iter()
            .map(|(id, item)| {
                (
                    id.clone(),
                    ItemSummary {
                        energy: item.energy.get(),
                        hops: item.hops,
                    },
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admit_and_lookup() {
        let mut store = InformationStore::new();
        assert_eq!(
            store.admit("a", "alpha", 5, 1, Provenance::Peer("node_0_0".into())),
            Admission::Stored
        );
        let item = store.get("a").unwrap();
        assert_eq!(item.energy.get(), 5);
        assert_eq!(item.hops, 1);
        assert_eq!(item.content, "alpha");
        assert_eq!(item.provenance.to_string(), "node_0_0");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn readmit_is_noop() {
        let mut store = InformationStore::new();
        store.admit("a", "first", 5, 1, Provenance::Local);
        assert_eq!(
            store.admit("a", "second", 9, 0, Provenance::Peer("x".into())),
            Admission::AlreadyHeld
        );
        let item = store.get("a").unwrap();
        assert_eq!(item.energy.get(), 5);
        assert_eq!(item.hops, 1);
        assert_eq!(item.content, "first");
        assert_eq!(item.provenance, Provenance::Local);
    }

    #[test]
    fn zero_energy_never_stored() {
        let mut store = InformationStore::new();
        assert_eq!(store.admit("a", "", 0, 0, Provenance::Local), Admission::Exhausted);
        assert!(store.is_empty());
    }

    #[test]
    fn decay_removes_exhausted_items() {
        let mut store = InformationStore::new();
        store.admit("short", "", 1, 0, Provenance::Local);
        store.admit("long", "", 3, 0, Provenance::Local);

        assert_eq!(store.decay(), vec!["short".to_string()]);
        assert_eq!(store.get("long").unwrap().energy.get(), 2);

        assert!(store.decay().is_empty());
        assert_eq!(store.decay(), vec!["long".to_string()]);
        assert!(store.is_empty());
    }

    #[test]
    fn item_lives_exactly_energy_decays() {
        let mut store = InformationStore::new();
        store.admit("x", "", 4, 0, Provenance::Local);
        let mut survived = 0;
        while store.contains("x") {
            store.decay();
            survived += 1;
        }
        assert_eq!(survived, 4);
    }

    #[test]
    fn summaries_are_sorted_by_id() {
        let mut store = InformationStore::new();
        store.admit("b", "", 2, 3, Provenance::Local);
        store.admit("a", "", 7, 1, Provenance::Local);
        let summaries = store.summaries();
        let ids: Vec<_> = summaries.keys().cloned().collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(summaries["a"], ItemSummary { energy: 7, hops: 1 });
    }

    #[test]
    fn clear_empties() {
        let mut store = InformationStore::new();
        store.admit("a", "", 2, 0, Provenance::Local);
        store.clear();
        assert!(store.is_empty());
        assert!(!store.contains("a"));
    }

    #[test]
    fn local_provenance_displays_as_self() {
        assert_eq!(Provenance::Local.to_string(), "self");
    }
}
