// Interval index over the older window's target.
//
// Each node maps a half-open range `[offset, limit)` of the older target to
// the position in the combined target where those bytes have already been
// produced. Nodes sit in a splay tree keyed by `offset` and, at the same
// time, in a doubly linked list in offset order. Live nodes never overlap.
//
// The tree is splayed so that the root is the node with the largest
// `offset <= key`, or the leftmost node when every offset is above the key.
// Queries then walk forward along the list from the root, and insertions
// only ever touch the root, its right subtree and its successor.

use std::mem;

use super::pool::{NodeId, NodePool};

/// A resolved range in the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeTreeNode {
    pub offset: u32,
    pub limit: u32,
    pub target_offset: u32,
    left: Option<NodeId>,
    right: Option<NodeId>,
    prev: Option<NodeId>,
    next: Option<NodeId>,
}

impl RangeTreeNode {
    fn new(offset: u32, limit: u32, target_offset: u32) -> Self {
        Self {
            offset,
            limit,
            target_offset,
            left: None,
            right: None,
            prev: None,
            next: None,
        }
    }

    #[inline]
    pub fn len(&self) -> u32 {
        self.limit - self.offset
    }
}

/// Where the bytes of a queried sub-range come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeKind {
    /// Not resolved yet: read the older window's target.
    FromSource,
    /// Already present in the combined target at `target_offset`.
    FromTarget,
}

/// One piece of a query result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeListNode {
    pub kind: RangeKind,
    pub offset: u32,
    pub limit: u32,
    /// Meaningful for [`RangeKind::FromTarget`] only.
    pub target_offset: u32,
    next: Option<NodeId>,
}

/// Result of [`RangeIndex::query`]. Hand it back with
/// [`RangeIndex::release`] once consumed.
#[derive(Debug, Default)]
pub struct RangeList {
    head: Option<NodeId>,
    tail: Option<NodeId>,
    len: usize,
}

impl RangeList {
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn head(&self) -> Option<NodeId> {
        self.head
    }
}

/// Splay-tree interval map with pooled nodes.
#[derive(Debug, Default)]
pub struct RangeIndex {
    tree: NodePool<RangeTreeNode>,
    lists: NodePool<RangeListNode>,
    root: Option<NodeId>,
    len: usize,
    stack: Vec<NodeId>,
}

impl RangeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live tree nodes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Tree node pool statistics: `(live, capacity)`.
    pub fn pool_stats(&self) -> (usize, usize) {
        (self.tree.live(), self.tree.capacity())
    }

    #[inline]
    fn node(&self, id: NodeId) -> &RangeTreeNode {
        self.tree.get(id)
    }

    #[inline]
    fn node_mut(&mut self, id: NodeId) -> &mut RangeTreeNode {
        self.tree.get_mut(id)
    }

    #[inline]
    pub fn list_node(&self, id: NodeId) -> &RangeListNode {
        self.lists.get(id)
    }

    // -----------------------------------------------------------------------
    // Splaying
    // -----------------------------------------------------------------------

    /// Whether the root already satisfies the post-splay condition for `key`.
    fn is_splayed_for(&self, root: NodeId, key: u32) -> bool {
        let n = self.node(root);
        if key >= n.offset {
            n.next.is_none_or(|s| self.node(s).offset > key)
        } else {
            n.prev.is_none()
        }
    }

    /// Reorganize the tree so the root is the node with the largest
    /// `offset <= key`. If there is none, the root ends up as the leftmost
    /// node (no left child, no predecessor).
    pub fn splay(&mut self, key: u32) {
        let Some(mut t) = self.root else {
            return;
        };
        if self.is_splayed_for(t, key) {
            return;
        }

        // Top-down splay. The scratch header's right child collects the
        // left tree, its left child the right tree; `None` stands for the
        // header itself.
        let mut header_left: Option<NodeId> = None;
        let mut header_right: Option<NodeId> = None;
        let mut left_max: Option<NodeId> = None;
        let mut right_min: Option<NodeId> = None;

        loop {
            let offset = self.node(t).offset;
            if key < offset {
                if let Some(l) = self.node(t).left
                    && key < self.node(l).offset
                {
                    let lr = self.node(l).right;
                    self.node_mut(t).left = lr;
                    self.node_mut(l).right = Some(t);
                    t = l;
                }
                let Some(down) = self.node(t).left else {
                    break;
                };
                match right_min {
                    None => header_left = Some(t),
                    Some(r) => self.node_mut(r).left = Some(t),
                }
                right_min = Some(t);
                t = down;
            } else if key > offset {
                if let Some(r) = self.node(t).right
                    && key > self.node(r).offset
                {
                    let rl = self.node(r).left;
                    self.node_mut(t).right = rl;
                    self.node_mut(r).left = Some(t);
                    t = r;
                }
                let Some(down) = self.node(t).right else {
                    break;
                };
                match left_max {
                    None => header_right = Some(t),
                    Some(l) => self.node_mut(l).right = Some(t),
                }
                left_max = Some(t);
                t = down;
            } else {
                break;
            }
        }

        let (tl, tr) = (self.node(t).left, self.node(t).right);
        match left_max {
            None => header_right = tl,
            Some(l) => self.node_mut(l).right = tl,
        }
        match right_min {
            None => header_left = tr,
            Some(r) => self.node_mut(r).left = tr,
        }
        self.node_mut(t).left = header_right;
        self.node_mut(t).right = header_left;

        // Turn the tree around so the root does not start past the key.
        if key < self.node(t).offset
            && let Some(l) = self.node(t).left
        {
            if self.node(l).right.is_none() {
                self.node_mut(t).left = None;
                self.node_mut(l).right = Some(t);
                t = l;
            } else {
                let mut parent = l;
                let mut max = l;
                while let Some(r) = self.node(max).right {
                    parent = max;
                    max = r;
                }
                let max_left = self.node(max).left;
                self.node_mut(parent).right = max_left;
                self.node_mut(t).left = None;
                self.node_mut(max).left = Some(l);
                self.node_mut(max).right = Some(t);
                t = max;
            }
        }

        debug_assert!(key >= self.node(t).offset || self.node(t).prev.is_none());
        self.root = Some(t);
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Split `[start, end)` into ordered sub-ranges that are either already
    /// resolved (`FromTarget`) or not (`FromSource`). The pieces tile the
    /// query exactly.
    pub fn query(&mut self, start: u32, end: u32) -> RangeList {
        self.splay(start);

        let mut list = RangeList::default();
        let mut offset = start;
        let mut cursor = self.root;
        while offset < end {
            let Some(id) = cursor else {
                self.push_range(&mut list, RangeKind::FromSource, offset, end, 0);
                break;
            };
            let n = *self.node(id);
            if offset < n.offset {
                let limit = end.min(n.offset);
                self.push_range(&mut list, RangeKind::FromSource, offset, limit, 0);
                offset = limit;
            } else if offset >= n.limit {
                cursor = n.next;
            } else {
                let limit = end.min(n.limit);
                let target_offset = n.target_offset + (offset - n.offset);
                self.push_range(&mut list, RangeKind::FromTarget, offset, limit, target_offset);
                offset = limit;
                cursor = n.next;
            }
        }
        list
    }

    fn push_range(
        &mut self,
        list: &mut RangeList,
        kind: RangeKind,
        offset: u32,
        limit: u32,
        target_offset: u32,
    ) {
        let id = self.lists.allocate(RangeListNode {
            kind,
            offset,
            limit,
            target_offset,
            next: None,
        });
        match list.tail {
            Some(tail) => self.lists.get_mut(tail).next = Some(id),
            None => list.head = Some(id),
        }
        list.tail = Some(id);
        list.len += 1;
    }

    /// Iterate the pieces of a query result.
    pub fn iter_list<'a>(&'a self, list: &RangeList) -> RangeListIter<'a> {
        RangeListIter {
            lists: &self.lists,
            cursor: list.head,
        }
    }

    /// Return a query result's nodes to the pool.
    pub fn release(&mut self, list: RangeList) {
        let mut cursor = list.head;
        while let Some(id) = cursor {
            cursor = self.lists.get(id).next;
            self.lists.free(id);
        }
    }

    // -----------------------------------------------------------------------
    // Insertion
    // -----------------------------------------------------------------------

    /// Record that `[offset, limit)` of the older target now lives at
    /// `target_offset` in the combined target.
    ///
    /// Ranges already covered are ignored; nodes the new range covers are
    /// removed and a partially covered neighbour is trimmed.
    pub fn insert(&mut self, offset: u32, limit: u32, target_offset: u32) {
        if offset >= limit {
            return;
        }
        self.splay(offset);

        let Some(root) = self.root else {
            let id = self.tree.allocate(RangeTreeNode::new(offset, limit, target_offset));
            self.root = Some(id);
            self.len = 1;
            return;
        };

        let r = *self.node(root);
        let new_root = if offset == r.offset {
            if limit <= r.limit {
                return;
            }
            let n = self.node_mut(root);
            n.limit = limit;
            n.target_offset = target_offset;
            root
        } else if offset > r.offset {
            if limit <= r.limit {
                return;
            }
            // Covered by the root and an adjacent successor.
            if let Some(s) = r.next {
                let s = self.node(s);
                if s.offset <= r.limit && limit <= s.limit {
                    return;
                }
            }
            if r.limit > offset {
                self.node_mut(root).limit = offset;
            }

            let mut node = RangeTreeNode::new(offset, limit, target_offset);
            node.left = Some(root);
            node.right = r.right;
            node.prev = Some(root);
            node.next = r.next;
            let id = self.tree.allocate(node);
            if let Some(s) = r.next {
                self.node_mut(s).prev = Some(id);
            }
            let rn = self.node_mut(root);
            rn.next = Some(id);
            rn.right = None;
            self.len += 1;
            id
        } else {
            // The root is the leftmost node.
            debug_assert!(r.left.is_none() && r.prev.is_none());
            let mut node = RangeTreeNode::new(offset, limit, target_offset);
            node.right = Some(root);
            node.next = Some(root);
            let id = self.tree.allocate(node);
            self.node_mut(root).prev = Some(id);
            self.len += 1;
            id
        };

        self.root = Some(new_root);
        self.clean_tree(new_root, limit);
        self.trim_successor(new_root, limit);
        log::trace!(
            "range index: [{offset}, {limit}) -> {target_offset}, {} nodes",
            self.len
        );
    }

    /// Remove every node right of `root` that ends at or before `limit`.
    fn clean_tree(&mut self, root: NodeId, limit: u32) {
        let mut parent = root;
        let mut via_left = false;
        let mut cursor = self.node(root).right;

        while let Some(id) = cursor {
            let n = *self.node(id);
            if n.limit <= limit {
                // Its left subtree lies between the root and `n`, so it is
                // covered too.
                if via_left {
                    self.node_mut(parent).left = n.right;
                } else {
                    self.node_mut(parent).right = n.right;
                }
                self.node_mut(id).right = None;
                self.delete_subtree(id);
                cursor = n.right;
            } else {
                parent = id;
                via_left = true;
                cursor = n.left;
            }
        }
    }

    /// Shift the start of the root's successor to `limit` if it overlaps.
    fn trim_successor(&mut self, root: NodeId, limit: u32) {
        let Some(s) = self.node(root).next else {
            return;
        };
        let n = self.node_mut(s);
        if n.offset < limit {
            debug_assert!(n.limit > limit);
            n.target_offset += limit - n.offset;
            n.offset = limit;
        }
    }

    /// Free `id` and its whole subtree, unlinking each node from the list.
    fn delete_subtree(&mut self, id: NodeId) {
        let mut stack = mem::take(&mut self.stack);
        stack.push(id);
        while let Some(id) = stack.pop() {
            let n = *self.node(id);
            stack.extend(n.left);
            stack.extend(n.right);
            if let Some(next) = n.next {
                self.node_mut(next).prev = n.prev;
            }
            if let Some(prev) = n.prev {
                self.node_mut(prev).next = n.next;
            }
            self.tree.free(id);
            self.len -= 1;
        }
        self.stack = stack;
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Return every tree node to the pool and empty the index.
    pub fn dispose(&mut self) {
        let mut stack = mem::take(&mut self.stack);
        stack.extend(self.root.take());
        while let Some(id) = stack.pop() {
            let n = self.node(id);
            stack.extend(n.left);
            stack.extend(n.right);
            self.tree.free(id);
        }
        self.stack = stack;
        self.len = 0;
    }

    /// Live ranges in offset order.
    pub fn ranges(&self) -> RangeIter<'_> {
        let mut head = self.root;
        while let Some(prev) = head.and_then(|id| self.node(id).prev) {
            head = Some(prev);
        }
        RangeIter {
            index: self,
            cursor: head,
        }
    }
}

/// Iterator over a [`RangeList`].
pub struct RangeListIter<'a> {
    lists: &'a NodePool<RangeListNode>,
    cursor: Option<NodeId>,
}

impl<'a> Iterator for RangeListIter<'a> {
    type Item = &'a RangeListNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.lists.get(self.cursor?);
        self.cursor = node.next;
        Some(node)
    }
}

/// Iterator over the live ranges of a [`RangeIndex`].
pub struct RangeIter<'a> {
    index: &'a RangeIndex,
    cursor: Option<NodeId>,
}

impl<'a> Iterator for RangeIter<'a> {
    type Item = &'a RangeTreeNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.index.node(self.cursor?);
        self.cursor = node.next;
        Some(node)
    }
}
