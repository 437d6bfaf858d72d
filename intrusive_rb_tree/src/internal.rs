//! The actual red-black tree implementation.
//!
//! This implementation has no generics, works only with trait objects, and
//! therefore does no monomorphization. While the `pub struct RbTree<T>`
//! users' API does use generics for ergonomics, it immediately erases types
//! by converting them to trait objects before calling into this `internal`
//! implementation. By erasing generic types, we keep code size small, so it
//! doesn't make sense to let any of the `internal` methods working with
//! trait objects be inlined, or else all our work would be undone.

use crate::node::{Color, Node};
use alloc::boxed::Box;
use core::cmp;
use core::ptr;

/// Internal trait for anything that can be compared to a `Node`.
pub trait CompareToNode<'a> {
    /// Compare `self` to the value containing the given `Node`.
    ///
    /// # Safety
    ///
    /// Unsafe because implementers rely on only being called with nodes
    /// contained within the element type they are expecting; given a node
    /// embedded in some other type, calling this leads to unsafety.
    unsafe fn compare_to_node(&self, node: &'a Node<'a>) -> cmp::Ordering;
}

/// The sentinel is heap-allocated so that its address survives moves of the
/// tree value itself: the root's parent pointer and the one-past-the-end
/// position both reference it.
///
/// * `sentinel.parent` is the root (null when the tree is empty).
/// * `sentinel.left` is the leftmost node, `sentinel.right` the rightmost;
///   both point back at the sentinel when the tree is empty.
#[derive(Debug)]
pub struct RbTree<'a> {
    sentinel: Box<Node<'a>>,
}

impl<'a> Default for RbTree<'a> {
    fn default() -> RbTree<'a> {
        let tree = RbTree {
            sentinel: Box::new(Node::default()),
        };
        let sentinel = tree.sentinel_ptr();
        tree.sentinel.set_color(Color::Black);
        tree.sentinel.set_left(sentinel);
        tree.sentinel.set_right(sentinel);
        tree
    }
}

impl<'a> RbTree<'a> {
    #[inline]
    pub fn sentinel_ptr(&self) -> *const Node<'a> {
        &*self.sentinel as *const Node<'a>
    }

    #[inline]
    pub fn root(&self) -> *const Node<'a> {
        self.sentinel.parent()
    }

    #[inline]
    fn set_root(&self, root: *const Node<'a>) {
        self.sentinel.set_parent(root);
    }

    #[inline]
    pub fn leftmost(&self) -> *const Node<'a> {
        self.sentinel.left()
    }

    #[inline]
    fn set_leftmost(&self, node: *const Node<'a>) {
        self.sentinel.set_left(node);
    }

    #[inline]
    pub fn rightmost(&self) -> *const Node<'a> {
        self.sentinel.right()
    }

    #[inline]
    fn set_rightmost(&self, node: *const Node<'a>) {
        self.sentinel.set_right(node);
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.leftmost() == self.sentinel_ptr()
    }

    #[inline(never)]
    pub unsafe fn insert(&mut self, key: &dyn CompareToNode<'a>, node: &'a Node<'a>) {
        debug_assert!(
            !node.is_linked() && node.left().is_null() && node.right().is_null(),
            "inserted node must be detached"
        );

        let sentinel = self.sentinel_ptr();
        let mut parent = sentinel;
        let mut cur = self.root();

        // On a tie the descent goes right, so equal keys are ordered by
        // insertion and later duplicates come after earlier ones.
        let mut smaller = false;
        while !cur.is_null() {
            parent = cur;
            smaller = key.compare_to_node(&*cur) == cmp::Ordering::Less;
            cur = if smaller { (*cur).left() } else { (*cur).right() };
        }

        let new = node as *const Node<'a>;
        if parent == sentinel {
            self.set_root(new);
            self.set_leftmost(new);
            self.set_rightmost(new);
        } else {
            if parent == self.leftmost() && smaller {
                self.set_leftmost(new);
            } else if parent == self.rightmost() && !smaller {
                self.set_rightmost(new);
            }
            if smaller {
                (*parent).set_left(new);
            } else {
                (*parent).set_right(new);
            }
        }
        node.set_parent(parent);
        node.set_color(Color::Red);

        self.insert_fixup(new);
        debug_assert!(node.is_linked());
        self.validate_extra();
    }

    #[inline(never)]
    pub unsafe fn remove(&mut self, node: &'a Node<'a>) {
        debug_assert!(node.is_linked(), "removed node must be in the tree");

        let node_ptr = node as *const Node<'a>;

        // The node to splice out, or the successor that will replace `node`.
        let candidate: *const Node<'a> = if node.left().is_null() || node.right().is_null() {
            node_ptr
        } else {
            node.successor()
        };
        let child = if !(*candidate).left().is_null() {
            (*candidate).left()
        } else {
            (*candidate).right()
        };

        if candidate == self.rightmost() {
            self.set_rightmost((*candidate).predecessor());
        }
        if candidate == self.leftmost() {
            self.set_leftmost((*candidate).successor());
        }

        // Reparent the child.
        if !child.is_null() && candidate != node.right() {
            (*child).set_parent((*candidate).parent());
        }
        let mut child_parent = (*candidate).parent();
        let is_root = node_ptr == self.root();

        if candidate == self.root() {
            self.set_root(child);
        } else {
            if is_root {
                self.set_root(candidate);
            }
            if candidate == (*(*candidate).parent()).left() {
                (*(*candidate).parent()).set_left(child);
            } else if candidate != node.right() {
                (*(*candidate).parent()).set_right(child);
            }
        }

        let candidate_color = (*candidate).color();
        // `node` has two children: move the successor into its place.
        if candidate != node_ptr {
            (*candidate).set_left(node.left());
            if candidate != node.right() {
                (*candidate).set_right(node.right());
                (*node.right()).set_parent(candidate);
            } else {
                child_parent = candidate;
            }
            (*candidate).set_parent(node.parent());
            (*candidate).set_color(node.color());
            (*node.left()).set_parent(candidate);

            if !is_root {
                if node_ptr == (*node.parent()).left() {
                    (*node.parent()).set_left(candidate);
                } else {
                    (*node.parent()).set_right(candidate);
                }
            }
        }
        if candidate_color == Color::Black {
            self.remove_fixup(child, child_parent);
        }
        node.reset();
        self.validate_extra();
    }

    #[inline(never)]
    pub unsafe fn lower_bound(&self, key: &dyn CompareToNode<'a>) -> *const Node<'a> {
        let mut res = ptr::null();
        let mut cur = self.root();
        while !cur.is_null() {
            if key.compare_to_node(&*cur) == cmp::Ordering::Greater {
                cur = (*cur).right();
            } else {
                res = cur;
                cur = (*cur).left();
            }
        }
        if res.is_null() {
            self.sentinel_ptr()
        } else {
            res
        }
    }

    #[inline(never)]
    pub unsafe fn find(&self, key: &dyn CompareToNode<'a>) -> *const Node<'a> {
        let mut cur = self.root();
        while !cur.is_null() {
            match key.compare_to_node(&*cur) {
                cmp::Ordering::Greater => cur = (*cur).right(),
                cmp::Ordering::Less => cur = (*cur).left(),
                cmp::Ordering::Equal => return cur,
            }
        }
        self.sentinel_ptr()
    }

    unsafe fn insert_fixup(&self, mut cur: *const Node<'a>) {
        while (*(*cur).parent()).color() == Color::Red {
            debug_assert_eq!((*cur).color(), Color::Red);
            let mut parent = (*cur).parent();
            let mut grandparent = (*parent).parent();
            if parent == (*grandparent).left() {
                let uncle = (*grandparent).right();
                if !uncle.is_null() && (*uncle).color() == Color::Red {
                    (*parent).set_color(Color::Black);
                    (*uncle).set_color(Color::Black);
                    (*grandparent).set_color(Color::Red);
                    cur = grandparent;
                } else {
                    if cur == (*parent).right() {
                        cur = parent;
                        self.left_rotate(cur);
                        parent = (*cur).parent();
                        grandparent = (*parent).parent();
                    }
                    (*parent).set_color(Color::Black);
                    (*grandparent).set_color(Color::Red);
                    self.right_rotate(grandparent);
                }
            } else {
                let uncle = (*grandparent).left();
                if !uncle.is_null() && (*uncle).color() == Color::Red {
                    (*parent).set_color(Color::Black);
                    (*uncle).set_color(Color::Black);
                    (*grandparent).set_color(Color::Red);
                    cur = grandparent;
                } else {
                    if cur == (*parent).left() {
                        cur = parent;
                        self.right_rotate(cur);
                        parent = (*cur).parent();
                        grandparent = (*parent).parent();
                    }
                    (*parent).set_color(Color::Black);
                    (*grandparent).set_color(Color::Red);
                    self.left_rotate(grandparent);
                }
            }
        }
        (*self.root()).set_color(Color::Black);
    }

    unsafe fn remove_fixup(&self, mut cur: *const Node<'a>, mut parent: *const Node<'a>) {
        while cur != self.root() && (cur.is_null() || (*cur).color() == Color::Black) {
            if cur == (*parent).left() {
                let mut sibling = (*parent).right();
                debug_assert!(!sibling.is_null());
                if (*sibling).color() == Color::Red {
                    (*sibling).set_color(Color::Black);
                    (*parent).set_color(Color::Red);
                    self.left_rotate(parent);
                    sibling = (*parent).right();
                }
                if ((*sibling).left().is_null()
                    || (*(*sibling).left()).color() == Color::Black)
                    && ((*sibling).right().is_null()
                        || (*(*sibling).right()).color() == Color::Black)
                {
                    (*sibling).set_color(Color::Red);
                    cur = parent;
                    parent = (*cur).parent();
                } else {
                    if (*sibling).right().is_null()
                        || (*(*sibling).right()).color() == Color::Black
                    {
                        if !(*sibling).left().is_null() {
                            (*(*sibling).left()).set_color(Color::Black);
                        }
                        (*sibling).set_color(Color::Red);
                        self.right_rotate(sibling);
                        sibling = (*parent).right();
                    }
                    (*sibling).set_color((*parent).color());
                    (*parent).set_color(Color::Black);
                    if !(*sibling).right().is_null() {
                        (*(*sibling).right()).set_color(Color::Black);
                    }
                    self.left_rotate(parent);
                    cur = self.root();
                }
            } else {
                let mut sibling = (*parent).left();
                debug_assert!(!sibling.is_null());
                if (*sibling).color() == Color::Red {
                    (*sibling).set_color(Color::Black);
                    (*parent).set_color(Color::Red);
                    self.right_rotate(parent);
                    sibling = (*parent).left();
                }
                if ((*sibling).left().is_null()
                    || (*(*sibling).left()).color() == Color::Black)
                    && ((*sibling).right().is_null()
                        || (*(*sibling).right()).color() == Color::Black)
                {
                    (*sibling).set_color(Color::Red);
                    cur = parent;
                    parent = (*cur).parent();
                } else {
                    if (*sibling).left().is_null()
                        || (*(*sibling).left()).color() == Color::Black
                    {
                        if !(*sibling).right().is_null() {
                            (*(*sibling).right()).set_color(Color::Black);
                        }
                        (*sibling).set_color(Color::Red);
                        self.left_rotate(sibling);
                        sibling = (*parent).left();
                    }
                    (*sibling).set_color((*parent).color());
                    (*parent).set_color(Color::Black);
                    if !(*sibling).left().is_null() {
                        (*(*sibling).left()).set_color(Color::Black);
                    }
                    self.right_rotate(parent);
                    cur = self.root();
                }
            }
        }
        if !cur.is_null() {
            (*cur).set_color(Color::Black);
        }
    }

    unsafe fn left_rotate(&self, node: *const Node<'a>) {
        let right = (*node).right();
        if right.is_null() {
            return;
        }

        (*node).set_right((*right).left());
        if !(*right).left().is_null() {
            (*(*right).left()).set_parent(node);
        }
        (*right).set_parent((*node).parent());
        if self.root() != node {
            if node == (*(*node).parent()).left() {
                (*(*node).parent()).set_left(right);
            } else {
                (*(*node).parent()).set_right(right);
            }
        } else {
            self.set_root(right);
        }
        (*node).set_parent(right);
        (*right).set_left(node);
    }

    unsafe fn right_rotate(&self, node: *const Node<'a>) {
        let left = (*node).left();
        if left.is_null() {
            return;
        }

        (*node).set_left((*left).right());
        if !(*left).right().is_null() {
            (*(*left).right()).set_parent(node);
        }
        (*left).set_parent((*node).parent());
        if self.root() != node {
            if node == (*(*node).parent()).left() {
                (*(*node).parent()).set_left(left);
            } else {
                (*(*node).parent()).set_right(left);
            }
        } else {
            self.set_root(left);
        }
        (*node).set_parent(left);
        (*left).set_right(node);
    }

    /// Walk the whole structure and assert the red-black invariants: the
    /// root is black and hangs off the sentinel, parent links are
    /// consistent, and every path carries the same number of black nodes.
    pub fn validate(&self) {
        unsafe {
            let root = self.root();
            if !root.is_null() {
                assert_eq!((*root).color(), Color::Black, "root must be black");
                assert_eq!((*root).parent(), self.sentinel_ptr());
            }
            self.validate_node(root);
        }
    }

    unsafe fn validate_node(&self, node: *const Node<'a>) -> usize {
        if node.is_null() {
            return 0;
        }

        if !(*node).left().is_null() {
            assert_eq!((*(*node).left()).parent(), node);
        }
        if !(*node).right().is_null() {
            assert_eq!((*(*node).right()).parent(), node);
        }
        let left_black_height = self.validate_node((*node).left());
        let right_black_height = self.validate_node((*node).right());
        assert_eq!(
            left_black_height, right_black_height,
            "black heights must match on both sides"
        );
        left_black_height + ((*node).color() == Color::Black) as usize
    }

    #[cfg(feature = "extra_assertions")]
    fn validate_extra(&self) {
        self.validate();
    }

    #[cfg(not(feature = "extra_assertions"))]
    #[inline(always)]
    fn validate_extra(&self) {}
}
