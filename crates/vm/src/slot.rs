//! Variable slots: static fields, locals and arguments.

use crate::error::{VmError, VmResult};
use crate::reference_counter::ReferenceCounter;
use crate::stack_item::StackItem;
use std::cell::RefCell;
use std::rc::Rc;

/// A fixed-size array of items. Slot entries count as stack references so
/// values stored in locals stay live.
#[derive(Debug)]
pub struct Slot {
    items: Vec<StackItem>,
    counter: Rc<RefCell<ReferenceCounter>>,
}

impl Slot {
    /// Creates a slot of `count` nulls.
    pub fn new(count: usize, counter: Rc<RefCell<ReferenceCounter>>) -> Self {
        let items = vec![StackItem::Null; count];
        {
            let mut c = counter.borrow_mut();
            for item in &items {
                c.add_stack_reference(item);
            }
        }
        Self { items, counter }
    }

    /// Creates a slot holding `items` (used for arguments).
    pub fn with_items(items: Vec<StackItem>, counter: Rc<RefCell<ReferenceCounter>>) -> Self {
        {
            let mut c = counter.borrow_mut();
            for item in &items {
                c.add_stack_reference(item);
            }
        }
        Self { items, counter }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the slot has no entries.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Reads the entry at `index`.
    pub fn get(&self, index: usize) -> VmResult<StackItem> {
        self.items
            .get(index)
            .cloned()
            .ok_or_else(|| VmError::InvalidOperand(format!("slot index {index} out of range")))
    }

    /// Replaces the entry at `index`.
    pub fn set(&mut self, index: usize, item: StackItem) -> VmResult<()> {
        if index >= self.items.len() {
            return Err(VmError::InvalidOperand(format!(
                "slot index {index} out of range"
            )));
        }
        let mut counter = self.counter.borrow_mut();
        counter.remove_stack_reference(&self.items[index]);
        counter.add_stack_reference(&item);
        drop(counter);
        self.items[index] = item;
        Ok(())
    }
}

impl Drop for Slot {
    fn drop(&mut self) {
        let mut counter = self.counter.borrow_mut();
        for item in &self.items {
            counter.remove_stack_reference(item);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_slot_holds_nulls() {
        let counter = Rc::new(RefCell::new(ReferenceCounter::new()));
        let slot = Slot::new(3, counter.clone());
        assert_eq!(slot.len(), 3);
        assert!(slot.get(0).unwrap().is_null());
        assert!(slot.get(3).is_err());
        assert_eq!(counter.borrow().count(), 3);
    }

    #[test]
    fn set_swaps_references() {
        let counter = Rc::new(RefCell::new(ReferenceCounter::new()));
        let mut slot = Slot::new(1, counter.clone());
        slot.set(0, StackItem::from_int(7)).unwrap();
        assert_eq!(counter.borrow().count(), 1);
        assert_eq!(slot.get(0).unwrap().get_integer(32).unwrap(), 7.into());
    }

    #[test]
    fn drop_releases_references() {
        let counter = Rc::new(RefCell::new(ReferenceCounter::new()));
        {
            let _slot = Slot::with_items(
                vec![StackItem::from_int(1), StackItem::from_int(2)],
                counter.clone(),
            );
            assert_eq!(counter.borrow().count(), 2);
        }
        assert_eq!(counter.borrow().count(), 0);
    }
}
