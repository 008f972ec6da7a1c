// Node arena with a free list.
//
// Tree and list nodes refer to each other through `NodeId` handles instead
// of pointers. Freed slots are recycled before the arena grows, so a pool
// that has reached its working size stops allocating.

/// Handle to a slot of a [`NodePool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

impl NodeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Arena of `T` slots with O(1) allocate and free.
#[derive(Debug, Clone)]
pub struct NodePool<T> {
    slots: Vec<T>,
    free: Vec<NodeId>,
}

impl<T> Default for NodePool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> NodePool<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    /// Store `value`, reusing a freed slot when one is available.
    pub fn allocate(&mut self, value: T) -> NodeId {
        match self.free.pop() {
            Some(id) => {
                self.slots[id.index()] = value;
                id
            }
            None => {
                let id = NodeId(self.slots.len() as u32);
                self.slots.push(value);
                id
            }
        }
    }

    /// Return a slot to the free list. The slot's value stays in place
    /// until it is reallocated.
    #[inline]
    pub fn free(&mut self, id: NodeId) {
        debug_assert!(id.index() < self.slots.len());
        self.free.push(id);
    }

    #[inline]
    pub fn get(&self, id: NodeId) -> &T {
        &self.slots[id.index()]
    }

    #[inline]
    pub fn get_mut(&mut self, id: NodeId) -> &mut T {
        &mut self.slots[id.index()]
    }

    /// Number of allocated (not freed) slots.
    #[inline]
    pub fn live(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Number of slots ever created.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Drop every slot.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn freed_slots_are_reused() {
        let mut pool = NodePool::new();
        let a = pool.allocate(1u32);
        let b = pool.allocate(2u32);
        assert_eq!(pool.live(), 2);

        pool.free(a);
        assert_eq!(pool.live(), 1);
        let c = pool.allocate(3);
        assert_eq!(c, a);
        assert_eq!(*pool.get(c), 3);
        assert_eq!(*pool.get(b), 2);
        assert_eq!(pool.capacity(), 2);
    }

    #[test]
    fn get_mut_updates_in_place() {
        let mut pool = NodePool::new();
        let id = pool.allocate(String::from("left"));
        pool.get_mut(id).push_str("-right");
        assert_eq!(pool.get(id), "left-right");
    }

    #[test]
    fn clear_resets_everything() {
        let mut pool = NodePool::new();
        for i in 0..10u8 {
            pool.allocate(i);
        }
        pool.clear();
        assert_eq!(pool.live(), 0);
        assert_eq!(pool.capacity(), 0);
    }
}
