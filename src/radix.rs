//! Size-indexed free-block index: a binary trie over the bits of a 63-bit
//! key, additionally kept in min-heap order on that key (`parent.key <=
//! child.key`). The heap property lets `find_geq` stop descending as soon as
//! it can prove no smaller-but-still->=-key answer exists further down, by
//! remembering the best key seen so far and the last right subtree skipped.
//!
//! Nodes are embedded in the records that own them (a free [`crate::boundary_tag`]
//! block); the tree itself only ever holds non-owning `parent`/`child`/
//! `parent_to_self_ptr` pointers into that memory. An embedding record sets
//! `owner` once at construction so `find_geq`/iteration can recover it.
//!
//! Every [`RadixTree`] must stay at a fixed address for as long as it holds
//! any node: the root node's `parent_to_self_ptr` points directly at
//! `tree.root`. Embed the tree in a heap-boxed container and never move it
//! once nodes are inserted.

use std::ptr;

pub const MAX_KEY_BITS: u32 = 63;

pub struct RadixNode {
    next: *mut RadixNode,
    prev: *mut RadixNode,
    child: [*mut RadixNode; 2],
    parent_to_self_ptr: *mut *mut RadixNode,
    parent: *mut RadixNode,
    key: u64,
    owner: *mut (),
}

impl RadixNode {
    /// A freshly constructed node, detached from any tree. `owner` is the
    /// address of the record embedding this node (a [`crate::boundary_tag::Block`]);
    /// `find_geq` and iteration hand it back via [`RadixNode::owner`].
    /// `next`/`prev` are left null; [`RadixTree::insert`] initializes the
    /// sibling list once the node is at its final, stable address (it must
    /// not be done here, before the caller has placed `self` in a `Box`).
    pub fn new<T>(owner: *mut T) -> Self {
        RadixNode {
            next: ptr::null_mut(),
            prev: ptr::null_mut(),
            child: [ptr::null_mut(), ptr::null_mut()],
            parent_to_self_ptr: ptr::null_mut(),
            parent: ptr::null_mut(),
            key: 0,
            owner: owner as *mut (),
        }
    }

    pub fn key(&self) -> u64 {
        self.key
    }

    /// Recover the owning record. Safety: caller must pass the same `T` the
    /// node was constructed with.
    pub unsafe fn owner<T>(&self) -> *mut T {
        self.owner as *mut T
    }

    fn list_init(node: *mut RadixNode) {
        unsafe {
            (*node).next = node;
            (*node).prev = node;
        }
    }

    fn list_insert(node: *mut RadixNode, head: *mut RadixNode) {
        unsafe {
            let prev = (*head).prev;
            (*prev).next = node;
            (*node).prev = prev;
            (*head).prev = node;
            (*node).next = head;
        }
    }

    fn list_remove(node: *mut RadixNode) {
        unsafe {
            let next = (*node).next;
            let prev = (*node).prev;
            (*next).prev = prev;
            (*prev).next = next;
        }
    }

    fn list_empty(node: *mut RadixNode) -> bool {
        unsafe { (*node).next == node }
    }
}

pub struct RadixTree {
    root: *mut RadixNode,
    key_bits: u32,
}

fn is_bit_set(key: u64, bit: u32) -> bool {
    (key & (1u64 << bit)) != 0
}

fn smaller_child(node: *mut RadixNode) -> *mut RadixNode {
    unsafe {
        if !(*node).child[0].is_null() {
            (*node).child[0]
        } else {
            (*node).child[1]
        }
    }
}

fn smaller_node(a: *mut RadixNode, b: *mut RadixNode) -> *mut RadixNode {
    if b.is_null() {
        return a;
    }
    unsafe {
        if (*a).key < (*b).key {
            a
        } else {
            b
        }
    }
}

impl RadixTree {
    pub fn new(key_bits: u32) -> Self {
        assert!(key_bits > 0 && key_bits <= 64);
        RadixTree { root: ptr::null_mut(), key_bits }
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_null()
    }

    /// Only valid when `repl` is currently detached from the tree's
    /// parent/child links (a freshly removed sibling, or a wholly new node).
    fn replace_node(orig: *mut RadixNode, repl: *mut RadixNode) {
        unsafe {
            debug_assert!((*repl).child[0].is_null());
            debug_assert!((*repl).child[1].is_null());
            debug_assert!((*repl).parent.is_null());
            debug_assert!((*repl).parent_to_self_ptr.is_null());

            (*repl).parent_to_self_ptr = (*orig).parent_to_self_ptr;
            (*repl).parent = (*orig).parent;

            for i in 0..2 {
                (*repl).child[i] = (*orig).child[i];
                if !(*repl).child[i].is_null() {
                    let slot: *mut *mut RadixNode = &mut (*repl).child[i];
                    (*(*repl).child[i]).parent_to_self_ptr = slot;
                    (*(*repl).child[i]).parent = repl;
                }
            }

            *((*repl).parent_to_self_ptr) = repl;
        }
    }

    /// Swap `old_child` into `old_parent`'s tree slot, pushing `old_parent`
    /// one level down as `old_child`'s child. Used by `remove` to push an
    /// interior node toward a leaf without disturbing heap order elsewhere.
    fn swap_parent_with_child(old_parent: *mut RadixNode, old_child: *mut RadixNode) {
        unsafe {
            debug_assert_eq!((*old_child).parent, old_parent);

            let child_number = ((*old_parent).child[1] == old_child) as usize;
            let other_child_number = 1 - child_number;
            let swap_parent_to_self_ptr = (*old_parent).parent_to_self_ptr;
            let old_child_children = (*old_child).child;

            let slot: *mut *mut RadixNode = &mut (*old_child).child[child_number];
            (*old_parent).parent_to_self_ptr = slot;
            *((*old_parent).parent_to_self_ptr) = old_parent;

            (*old_child).child[other_child_number] = (*old_parent).child[other_child_number];
            if !(*old_child).child[other_child_number].is_null() {
                let slot: *mut *mut RadixNode = &mut (*old_child).child[other_child_number];
                (*(*old_child).child[other_child_number]).parent = old_child;
                (*(*old_child).child[other_child_number]).parent_to_self_ptr = slot;
            }

            (*old_child).parent_to_self_ptr = swap_parent_to_self_ptr;
            *((*old_child).parent_to_self_ptr) = old_child;

            let swap_parent = (*old_parent).parent;
            (*old_parent).parent = old_child;
            (*old_child).parent = swap_parent;

            for i in 0..2 {
                (*old_parent).child[i] = old_child_children[i];
                if !(*old_parent).child[i].is_null() {
                    let slot: *mut *mut RadixNode = &mut (*old_parent).child[i];
                    (*(*old_parent).child[i]).parent_to_self_ptr = slot;
                    (*(*old_parent).child[i]).parent = old_parent;
                }
            }
        }
    }

    /// Insert `node` (caller-owned, never aliased elsewhere) under `key`.
    pub fn insert(&mut self, node: *mut RadixNode, key: u64) {
        assert!(self.key_bits == 64 || (!((1u64 << self.key_bits) - 1) & key) == 0);

        unsafe {
            let mut node = node;
            (*node).next = ptr::null_mut();
            (*node).prev = ptr::null_mut();
            (*node).child = [ptr::null_mut(), ptr::null_mut()];
            (*node).parent_to_self_ptr = ptr::null_mut();
            (*node).parent = ptr::null_mut();
            (*node).key = key;
            RadixNode::list_init(node);

            let mut parent: *mut RadixNode = ptr::null_mut();
            let mut parent_to_self_ptr: *mut *mut RadixNode = &mut self.root;
            let mut cur_key_bit = self.key_bits;

            while !(*parent_to_self_ptr).is_null() && (*(*parent_to_self_ptr)).key != key {
                let mut cur = *parent_to_self_ptr;

                if (*node).key < (*cur).key {
                    Self::replace_node(cur, node);

                    let swap_node = cur;
                    cur = node;
                    node = swap_node;

                    (*node).child = [ptr::null_mut(), ptr::null_mut()];
                    (*node).parent = ptr::null_mut();
                    (*node).parent_to_self_ptr = ptr::null_mut();
                }

                parent = cur;
                debug_assert!(cur_key_bit > 0);
                cur_key_bit -= 1;
                let child_to_take = is_bit_set((*node).key, cur_key_bit) as usize;
                parent_to_self_ptr = &mut (*cur).child[child_to_take];
            }

            if !(*parent_to_self_ptr).is_null() {
                RadixNode::list_insert(node, *parent_to_self_ptr);
            } else {
                (*node).parent_to_self_ptr = parent_to_self_ptr;
                *((*node).parent_to_self_ptr) = node;
                (*node).parent = parent;
            }
        }
    }

    pub fn find_geq(&self, key: u64) -> Option<*mut RadixNode> {
        let mut node = self.root;
        let mut found: *mut RadixNode = ptr::null_mut();
        let mut gt_tree: *mut RadixNode = ptr::null_mut();
        let mut cur_key_bit = self.key_bits;

        unsafe {
            while !node.is_null() {
                if (*node).key == key {
                    return Some(node);
                }
                if (*node).key > key {
                    found = smaller_node(node, found);
                }

                cur_key_bit -= 1;
                let child_to_take = is_bit_set(key, cur_key_bit) as usize;

                if child_to_take == 0 && !(*node).child[1].is_null() {
                    gt_tree = (*node).child[1];
                }
                node = (*node).child[child_to_take];
            }
        }

        if found.is_null() {
            found = gt_tree;
        }
        if found.is_null() {
            None
        } else {
            Some(found)
        }
    }

    /// Remove `node` from whatever tree it is currently in. `node` must
    /// actually be live in a tree (inserted and not yet removed).
    pub fn remove(node: *mut RadixNode) {
        unsafe {
            if RadixNode::list_empty(node) {
                let least_child = smaller_child(node);
                if least_child.is_null() {
                    *((*node).parent_to_self_ptr) = ptr::null_mut();
                } else {
                    Self::swap_parent_with_child(node, least_child);
                    Self::remove(node);
                }
            } else {
                if !(*node).parent_to_self_ptr.is_null() {
                    Self::replace_node(node, (*node).next);
                    (*node).parent_to_self_ptr = ptr::null_mut();
                }
                RadixNode::list_remove(node);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leak(owner: u64, key: u64) -> *mut RadixNode {
        let b = Box::new(RadixNode::new(Box::into_raw(Box::new(owner))));
        let raw = Box::into_raw(b);
        unsafe { (*raw).key = key };
        raw
    }

    unsafe fn owner_val(n: *mut RadixNode) -> u64 {
        *((*n).owner::<u64>())
    }

    #[test]
    fn insert_and_find_geq_exact_and_successor() {
        let mut tree = RadixTree::new(MAX_KEY_BITS);
        let sizes = [16u64, 32, 64, 128, 256];
        let mut nodes = Vec::new();
        for &s in &sizes {
            let n = leak(s, s);
            tree.insert(n, s);
            nodes.push(n);
        }

        unsafe {
            assert_eq!(owner_val(tree.find_geq(64).unwrap()), 64);
            assert_eq!(owner_val(tree.find_geq(65).unwrap()), 128);
            assert_eq!(owner_val(tree.find_geq(200).unwrap()), 256);
            assert!(tree.find_geq(257).is_none());
            assert_eq!(owner_val(tree.find_geq(1).unwrap()), 16);
        }

        for n in nodes {
            RadixTree::remove(n);
            unsafe {
                drop(Box::from_raw((*n).owner::<u64>()));
                drop(Box::from_raw(n));
            }
        }
        assert!(tree.is_empty());
    }

    #[test]
    fn equal_keys_share_a_slot() {
        let mut tree = RadixTree::new(MAX_KEY_BITS);
        let a = leak(1, 100);
        let b = leak(2, 100);
        let c = leak(3, 100);
        tree.insert(a, 100);
        tree.insert(b, 100);
        tree.insert(c, 100);

        let found = tree.find_geq(50).unwrap();
        assert_eq!(unsafe { (*found).key() }, 100);

        RadixTree::remove(a);
        RadixTree::remove(b);
        let still = tree.find_geq(100).unwrap();
        assert_eq!(unsafe { owner_val(still) }, 3);
        RadixTree::remove(c);
        assert!(tree.is_empty());

        for n in [a, b, c] {
            unsafe {
                drop(Box::from_raw((*n).owner::<u64>()));
                drop(Box::from_raw(n));
            }
        }
    }

    #[test]
    fn remove_interior_node_preserves_heap_order() {
        let mut tree = RadixTree::new(MAX_KEY_BITS);
        let keys = [40u64, 10, 70, 5, 20, 60, 90, 1, 3];
        let mut nodes = Vec::new();
        for &k in &keys {
            let n = leak(k, k);
            tree.insert(n, k);
            nodes.push(n);
        }

        // Remove a handful of interior nodes and make sure GEQ queries still
        // see every remaining key.
        for &k in &[40u64, 10, 70] {
            let idx = nodes.iter().position(|&n| unsafe { (*n).key() } == k).unwrap();
            RadixTree::remove(nodes[idx]);
            unsafe {
                drop(Box::from_raw((*nodes[idx]).owner::<u64>()));
                drop(Box::from_raw(nodes[idx]));
            }
            nodes.remove(idx);
        }

        let mut remaining: Vec<u64> = nodes.iter().map(|&n| unsafe { (*n).key() }).collect();
        remaining.sort_unstable();
        for &k in &remaining {
            let found = tree.find_geq(k).unwrap();
            assert_eq!(unsafe { (*found).key() }, k);
        }

        for n in nodes {
            RadixTree::remove(n);
            unsafe {
                drop(Box::from_raw((*n).owner::<u64>()));
                drop(Box::from_raw(n));
            }
        }
        assert!(tree.is_empty());
    }
}
