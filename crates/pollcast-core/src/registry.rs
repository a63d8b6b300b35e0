// ── Subscription registry ──
//
// Item name → live subscription. Owned by the adapter event loop; no
// interior locking. A subscription is either active (visible to scans and
// publishes) or reserved (a `VoteOption` whose snapshot read is still in
// flight). Every insert gets a fresh generation so a late snapshot result
// can tell whether its reservation still stands.

use std::collections::{BTreeMap, HashMap};

use crate::error::CoreError;
use crate::item::{Item, ItemKind};

/// One live subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub item: Item,
    pub active: bool,
    pub generation: u64,
}

impl Subscription {
    pub fn kind(&self) -> ItemKind {
        self.item.kind()
    }

    pub fn entity_id(&self) -> Option<&str> {
        self.item.entity_id()
    }
}

#[derive(Debug, Default)]
pub struct Registry {
    subs: HashMap<String, Subscription>,
    next_generation: u64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `name` and store a subscription for it, replacing any previous
    /// one under the same name. Vote options start out reserved until their
    /// snapshot has been read; everything else is active at once.
    pub fn subscribe(&mut self, name: &str) -> Result<&Subscription, CoreError> {
        let item = Item::parse(name)?;
        let active = item.kind() != ItemKind::VoteOption;
        Ok(self.insert(item, active))
    }

    /// Store an already parsed item, replacing any previous subscription.
    pub fn insert(&mut self, item: Item, active: bool) -> &Subscription {
        self.next_generation += 1;
        let sub = Subscription {
            item,
            active,
            generation: self.next_generation,
        };
        self.subs
            .entry(sub.item.to_string())
            .insert_entry(sub)
            .into_mut()
    }

    /// Flip a reservation to active. Fails if the subscription was removed
    /// or replaced since `generation` was handed out.
    pub fn activate(&mut self, name: &str, generation: u64) -> bool {
        match self.subs.get_mut(name) {
            Some(sub) if sub.generation == generation => {
                sub.active = true;
                true
            }
            _ => false,
        }
    }

    /// Drop a reservation, but only if it is still the one for `generation`.
    pub fn discard(&mut self, name: &str, generation: u64) -> bool {
        if self
            .subs
            .get(name)
            .is_some_and(|sub| sub.generation == generation)
        {
            self.subs.remove(name);
            return true;
        }
        false
    }

    /// Remove the subscription for `name`. Unknown names are a no-op.
    pub fn unregister(&mut self, name: &str) -> Option<Subscription> {
        self.subs.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&Subscription> {
        self.subs.get(name)
    }

    pub fn is_active(&self, name: &str) -> bool {
        self.subs.get(name).is_some_and(|sub| sub.active)
    }

    /// Point-in-time copy of all active vote options: entity id →
    /// generation of the subscription.
    pub fn active_vote_options(&self) -> BTreeMap<String, u64> {
        self.subs
            .values()
            .filter(|sub| sub.active)
            .filter_map(|sub| Some((sub.entity_id()?.to_owned(), sub.generation)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.subs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subs.is_empty()
    }
}
