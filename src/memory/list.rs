// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Arena-backed doubly linked list of descriptors.
//!
//! Nodes live in a slot vector and link to each other by [`SlotId`]. A
//! handle stays valid until its node is removed, so a key map can hold
//! handles while the list reorders itself in O(1).
//!
//! ```text
//!   slots: Vec<Option<Node<T>>>          free: [3, 5]
//!
//!   head ─► [0] ◄──► [4] ◄──► [1] ◄── tail
//!          newest            oldest
//! ```

use std::collections::HashSet;

/// Stable handle to a node in a [`DescriptorList`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(usize);

impl SlotId {
    #[must_use]
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Debug)]
struct Node<T> {
    value: T,
    prev: Option<SlotId>,
    next: Option<SlotId>,
}

#[derive(Debug)]
pub struct DescriptorList<T> {
    slots: Vec<Option<Node<T>>>,
    free: Vec<usize>,
    head: Option<SlotId>,
    tail: Option<SlotId>,
    len: usize,
}

impl<T> DescriptorList<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            head: None,
            tail: None,
            len: 0,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub fn contains(&self, id: SlotId) -> bool {
        self.node(id).is_some()
    }

    #[must_use]
    pub fn front_id(&self) -> Option<SlotId> {
        self.head
    }

    #[must_use]
    pub fn back_id(&self) -> Option<SlotId> {
        self.tail
    }

    #[must_use]
    pub fn front(&self) -> Option<&T> {
        self.head.and_then(|id| self.get(id))
    }

    #[must_use]
    pub fn back(&self) -> Option<&T> {
        self.tail.and_then(|id| self.get(id))
    }

    #[must_use]
    pub fn get(&self, id: SlotId) -> Option<&T> {
        self.node(id).map(|n| &n.value)
    }

    pub fn get_mut(&mut self, id: SlotId) -> Option<&mut T> {
        self.node_mut(id).map(|n| &mut n.value)
    }

    pub fn push_front(&mut self, value: T) -> SlotId {
        let id = self.alloc(value);
        self.attach_front(id);
        id
    }

    pub fn push_back(&mut self, value: T) -> SlotId {
        let id = self.alloc(value);
        self.attach_back(id);
        id
    }

    pub fn pop_front(&mut self) -> Option<T> {
        let id = self.head?;
        self.remove(id)
    }

    pub fn pop_back(&mut self) -> Option<T> {
        let id = self.tail?;
        self.remove(id)
    }

    /// Unlink a node and free its slot.
    pub fn remove(&mut self, id: SlotId) -> Option<T> {
        self.detach(id)?;
        let node = self.slots.get_mut(id.0)?.take()?;
        self.free.push(id.0);
        self.len -= 1;
        Some(node.value)
    }

    /// Returns false if `id` is not in the list.
    pub fn move_to_front(&mut self, id: SlotId) -> bool {
        if !self.contains(id) {
            return false;
        }
        if self.head != Some(id) {
            self.detach(id);
            self.attach_front(id);
        }
        true
    }

    /// Returns false if `id` is not in the list.
    pub fn move_to_back(&mut self, id: SlotId) -> bool {
        if !self.contains(id) {
            return false;
        }
        if self.tail != Some(id) {
            self.detach(id);
            self.attach_back(id);
        }
        true
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.head = None;
        self.tail = None;
        self.len = 0;
    }

    /// Values from front (newest) to back.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.iter_ids().filter_map(move |id| self.get(id))
    }

    pub fn iter_ids(&self) -> IdIter<'_, T> {
        IdIter {
            list: self,
            current: self.head,
        }
    }

    /// Walk the links and check them against the slot table.
    pub fn validate(&self) -> Result<(), String> {
        if self.head.is_none() || self.tail.is_none() {
            if self.head.is_some() || self.tail.is_some() || self.len != 0 {
                return Err(format!(
                    "half-empty list: head={:?} tail={:?} len={}",
                    self.head, self.tail, self.len
                ));
            }
            return Ok(());
        }

        let mut seen = HashSet::with_capacity(self.len);
        let mut prev = None;
        let mut current = self.head;
        while let Some(id) = current {
            if !seen.insert(id) {
                return Err(format!("cycle at slot {}", id.0));
            }
            let node = self.node(id).ok_or_else(|| format!("dangling link to slot {}", id.0))?;
            if node.prev != prev {
                return Err(format!("slot {} has prev {:?}, expected {:?}", id.0, node.prev, prev));
            }
            if node.next.is_none() && self.tail != Some(id) {
                return Err(format!("slot {} ends the chain but tail is {:?}", id.0, self.tail));
            }
            prev = Some(id);
            current = node.next;
        }

        let occupied = self.slots.iter().filter(|s| s.is_some()).count();
        if seen.len() != self.len || occupied != self.len {
            return Err(format!(
                "length mismatch: linked={} occupied={} len={}",
                seen.len(),
                occupied,
                self.len
            ));
        }
        Ok(())
    }

    fn node(&self, id: SlotId) -> Option<&Node<T>> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    fn node_mut(&mut self, id: SlotId) -> Option<&mut Node<T>> {
        self.slots.get_mut(id.0).and_then(Option::as_mut)
    }

    fn alloc(&mut self, value: T) -> SlotId {
        let node = Node { value, prev: None, next: None };
        self.len += 1;
        if let Some(index) = self.free.pop() {
            self.slots[index] = Some(node);
            SlotId(index)
        } else {
            self.slots.push(Some(node));
            SlotId(self.slots.len() - 1)
        }
    }

    fn detach(&mut self, id: SlotId) -> Option<()> {
        let (prev, next) = {
            let node = self.node(id)?;
            (node.prev, node.next)
        };

        match prev {
            Some(p) => {
                if let Some(n) = self.node_mut(p) {
                    n.next = next;
                }
            }
            None => self.head = next,
        }
        match next {
            Some(nx) => {
                if let Some(n) = self.node_mut(nx) {
                    n.prev = prev;
                }
            }
            None => self.tail = prev,
        }

        if let Some(n) = self.node_mut(id) {
            n.prev = None;
            n.next = None;
        }
        Some(())
    }

    fn attach_front(&mut self, id: SlotId) {
        let old_head = self.head;
        if let Some(n) = self.node_mut(id) {
            n.prev = None;
            n.next = old_head;
        }
        match old_head {
            Some(h) => {
                if let Some(n) = self.node_mut(h) {
                    n.prev = Some(id);
                }
            }
            None => self.tail = Some(id),
        }
        self.head = Some(id);
    }

    fn attach_back(&mut self, id: SlotId) {
        let old_tail = self.tail;
        if let Some(n) = self.node_mut(id) {
            n.next = None;
            n.prev = old_tail;
        }
        match old_tail {
            Some(t) => {
                if let Some(n) = self.node_mut(t) {
                    n.next = Some(id);
                }
            }
            None => self.head = Some(id),
        }
        self.tail = Some(id);
    }
}

impl<T> Default for DescriptorList<T> {
    fn default() -> Self {
        Self::new()
    }
}

pub struct IdIter<'a, T> {
    list: &'a DescriptorList<T>,
    current: Option<SlotId>,
}

impl<'a, T> Iterator for IdIter<'a, T> {
    type Item = SlotId;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.current?;
        self.current = self.list.node(id).and_then(|n| n.next);
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(list: &DescriptorList<u32>) -> Vec<u32> {
        list.iter().copied().collect()
    }

    #[test]
    fn test_push_front_and_back() {
        let mut list = DescriptorList::new();
        list.push_front(2);
        list.push_front(1);
        list.push_back(3);
        assert_eq!(values(&list), vec![1, 2, 3]);
        assert_eq!(list.front(), Some(&1));
        assert_eq!(list.back(), Some(&3));
        list.validate().unwrap();
    }

    #[test]
    fn test_pop_back_is_oldest_front_insert() {
        let mut list = DescriptorList::new();
        for i in 0..4 {
            list.push_front(i);
        }
        assert_eq!(list.pop_back(), Some(0));
        assert_eq!(list.pop_back(), Some(1));
        assert_eq!(list.pop_front(), Some(3));
        assert_eq!(list.len(), 1);
        list.validate().unwrap();
    }

    #[test]
    fn test_remove_middle_and_reuse_slot() {
        let mut list = DescriptorList::new();
        let _a = list.push_back(1);
        let b = list.push_back(2);
        let _c = list.push_back(3);

        assert_eq!(list.remove(b), Some(2));
        assert_eq!(list.remove(b), None);
        assert!(!list.contains(b));
        assert_eq!(values(&list), vec![1, 3]);

        let d = list.push_front(4);
        assert_eq!(d.index(), b.index());
        assert_eq!(values(&list), vec![4, 1, 3]);
        list.validate().unwrap();
    }

    #[test]
    fn test_move_to_front_and_back() {
        let mut list = DescriptorList::new();
        let a = list.push_back(1);
        let b = list.push_back(2);
        let c = list.push_back(3);

        assert!(list.move_to_front(c));
        assert_eq!(values(&list), vec![3, 1, 2]);
        assert!(list.move_to_back(a));
        assert_eq!(values(&list), vec![3, 2, 1]);
        assert!(list.move_to_back(a));
        assert_eq!(values(&list), vec![3, 2, 1]);

        list.remove(b);
        assert!(!list.move_to_front(b));
        list.validate().unwrap();
    }

    #[test]
    fn test_single_element_moves() {
        let mut list = DescriptorList::new();
        let a = list.push_front(9);
        assert!(list.move_to_back(a));
        assert!(list.move_to_front(a));
        assert_eq!(list.front_id(), Some(a));
        assert_eq!(list.back_id(), Some(a));
        list.validate().unwrap();
    }

    #[test]
    fn test_clear() {
        let mut list = DescriptorList::new();
        for i in 0..10 {
            list.push_back(i);
        }
        list.clear();
        assert!(list.is_empty());
        assert_eq!(list.iter().count(), 0);
        list.validate().unwrap();
    }
}
