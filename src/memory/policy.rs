//! List placement rules for the list-ordered memory caches.
//!
//! Every list policy inserts at the head and frees from the tail; they only
//! differ in what an access does to the accessed node.

use super::list::{DescriptorList, SlotId};
use crate::config::EvictionPolicyKind;

pub trait ListPolicy: Send + Sync + 'static {
    const KIND: EvictionPolicyKind;
    /// Type name reported in statistics.
    const NAME: &'static str;

    fn place_on_update<T>(list: &mut DescriptorList<T>, value: T) -> SlotId {
        list.push_front(value)
    }

    fn adjust_on_get<T>(list: &mut DescriptorList<T>, id: SlotId);
}

/// Accesses never reorder; the oldest insert is freed first.
pub struct Fifo;

impl ListPolicy for Fifo {
    const KIND: EvictionPolicyKind = EvictionPolicyKind::Fifo;
    const NAME: &'static str = "FIFO Memory Cache";

    fn adjust_on_get<T>(_list: &mut DescriptorList<T>, _id: SlotId) {}
}

/// Accessed nodes move to the head; the least recently used is freed first.
pub struct Lru;

impl ListPolicy for Lru {
    const KIND: EvictionPolicyKind = EvictionPolicyKind::Lru;
    const NAME: &'static str = "LRU Memory Cache";

    fn adjust_on_get<T>(list: &mut DescriptorList<T>, id: SlotId) {
        list.move_to_front(id);
    }
}

/// Accessed nodes move to the tail, so the most recently used is freed first.
pub struct Mru;

impl ListPolicy for Mru {
    const KIND: EvictionPolicyKind = EvictionPolicyKind::Mru;
    const NAME: &'static str = "MRU Memory Cache";

    fn adjust_on_get<T>(list: &mut DescriptorList<T>, id: SlotId) {
        list.move_to_back(id);
    }
}
