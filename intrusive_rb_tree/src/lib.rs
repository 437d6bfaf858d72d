#![deny(missing_docs)]
#![deny(missing_debug_implementations)]
#![no_std]

//! An intrusive, ordered red-black tree multiset.
//!
//! The tree keeps its elements in comparator order with the classic
//! red-black balancing scheme: *O(log n)* insertion, removal, and bounded
//! search, and *O(1)* access to the smallest and largest elements.
//!
//! ## Implementation and Goals
//!
//! * **Intrusive:** The space for the parent/left/right links is stored
//! *inside* the element type. In non-intrusive trees, a node type contains
//! the subtree pointers and either points at the element or the element is
//! moved into the node. The intrusive design inverts the relationship, so
//! that the elements hold the link words within themselves.
//!
//! * **Freedom from per-element allocations and moves:** Since the space
//! for the links already exists in the element, inserting is just a handful
//! of pointer writes; elements are never moved or copied. This makes the
//! tree usable for bookkeeping structures that live inside raw memory, such
//! as the block headers of a memory allocator.
//!
//! * **Sentinel node:** The tree owns a distinguished sentinel node that
//! serves simultaneously as the parent of the root and as the
//! one-past-the-end cursor position. Its `left` and `right` links cache the
//! leftmost and rightmost elements, so the extrema are *O(1)* and boundary
//! handling needs no special cases. The sentinel is boxed, giving it a
//! stable address: the tree value itself may be freely moved.
//!
//! * **Multiset semantics:** Elements that compare equal are all kept;
//! a later insert of an equal key lands after the earlier ones.
//!
//! * **Small code size:** The implementation uses trait objects internally
//! to avoid the code bloat induced by monomorphization, in the same way as
//! the allocator this crate was built to serve.
//!
//! ## Constraints
//!
//! * **Elements within a tree must all have the same lifetime**, so
//! allocate them in an arena, in static data, or in a raw region whose
//! lifetime outlives the tree.
//!
//! * **Elements in intrusive collections are inherently shared.** The tree
//! only ever holds shared references to its elements, so per-element
//! mutability must go through `Cell`-style interior mutability.
//!
//! ## Example
//!
//! ```
//! #[macro_use]
//! extern crate intrusive_rb_tree;
//!
//! use intrusive_rb_tree::RbTree;
//! use std::cmp::Ordering;
//!
//! // Extents that we want to query by length, shortest first.
//! #[derive(Debug, Default)]
//! struct Extent<'a> {
//!     len: usize,
//!     by_len_node: intrusive_rb_tree::Node<'a>,
//! }
//!
//! struct ExtentsByLen;
//!
//! impl_intrusive_node! {
//!     impl<'a> IntrusiveNode<'a> for ExtentsByLen
//!     where
//!         type Elem = Extent<'a>,
//!         node = by_len_node;
//! }
//!
//! impl<'a> intrusive_rb_tree::TreeOrd<'a, ExtentsByLen> for Extent<'a> {
//!     fn tree_cmp(&self, rhs: &Extent<'a>) -> Ordering {
//!         self.len.cmp(&rhs.len)
//!     }
//! }
//!
//! // Also allow querying by a bare length, without building an `Extent`.
//! impl<'a> intrusive_rb_tree::TreeOrd<'a, ExtentsByLen> for usize {
//!     fn tree_cmp(&self, rhs: &Extent<'a>) -> Ordering {
//!         self.cmp(&rhs.len)
//!     }
//! }
//!
//! fn main() {
//!     let extents = [
//!         Extent { len: 32, ..Default::default() },
//!         Extent { len: 8, ..Default::default() },
//!         Extent { len: 96, ..Default::default() },
//!     ];
//!
//!     let mut by_len = RbTree::<ExtentsByLen>::default();
//!     for e in extents.iter() {
//!         by_len.insert(e);
//!     }
//!
//!     assert_eq!(by_len.first().unwrap().len, 8);
//!     assert_eq!(by_len.last().unwrap().len, 96);
//!
//!     // Smallest extent of at least 16 bytes.
//!     let c = by_len.lower_bound(&16usize);
//!     assert_eq!(c.get().unwrap().len, 32);
//! }
//! ```

extern crate alloc;

mod internal;
mod node;

pub use node::Node;

use core::cmp;
use core::fmt;
use core::iter;
use core::marker::PhantomData;

/// Defines how to get the intrusive node from a particular kind of
/// `RbTree`'s element type.
///
/// Don't implement this by hand -- doing so is both boring and dangerous!
/// Instead, use the `impl_intrusive_node!` macro.
///
/// # Safety
///
/// `node_to_elem` must be the exact inverse of `elem_to_node`; implementing
/// it with anything but the real field offset leads to memory unsafety.
pub unsafe trait IntrusiveNode<'a>
where
    Self: Sized,
{
    /// The element struct type that contains a node for this tree.
    type Elem: TreeOrd<'a, Self>;

    /// Get the node for this tree from the given element.
    fn elem_to_node(elem: &'a Self::Elem) -> &'a Node<'a>;

    /// Get the element for this node (by essentially doing `offsetof` the
    /// node's field).
    ///
    /// # Safety
    ///
    /// Given a node inside a different element type, or a node for a
    /// different tree within the same element type, this method will result
    /// in memory unsafety.
    unsafe fn node_to_elem(node: &'a Node<'a>) -> &'a Self::Elem;
}

/// Implement `IntrusiveNode` for a particular kind of `RbTree` and its
/// element type.
#[macro_export]
macro_rules! impl_intrusive_node {
    (
        impl< $($typarams:tt),* >
            IntrusiveNode<$intrusive_node_lifetime:tt>
            for $tree:ty
        where
            type Elem = $elem:ty ,
            node = $node:ident ;
    ) => {
        unsafe impl< $( $typarams )* > $crate::IntrusiveNode<$intrusive_node_lifetime> for $tree {
            type Elem = $elem;

            fn elem_to_node(
                elem: & $intrusive_node_lifetime Self::Elem
            ) -> & $intrusive_node_lifetime $crate::Node< $intrusive_node_lifetime > {
                &elem. $node
            }

            unsafe fn node_to_elem(
                node: & $intrusive_node_lifetime $crate::Node< $intrusive_node_lifetime >
            ) -> & $intrusive_node_lifetime Self::Elem {
                // `offsetof` the node field without materializing an element.
                let uninit = ::core::mem::MaybeUninit::<Self::Elem>::uninit();
                let base = uninit.as_ptr();
                let field = ::core::ptr::addr_of!((*base). $node);

                // Annotate with explicit types here so that compilation will
                // fail if someone uses this macro with a non-Node field of
                // `Self::Elem`.
                let field: *const $crate::Node = field;
                let offset = field as usize - base as usize;

                let node = node as *const _ as *const u8;
                let elem = node.sub(offset) as *const Self::Elem;
                &*elem
            }
        }
    }
}

/// A total ordering between the `Self` type and the tree's element type
/// `T::Elem`.
///
/// Different from `Ord` in that it allows `Self` and `T::Elem` to be
/// distinct types, so that you can query a tree without fully constructing
/// its element type -- for example, searching a tree of sized blocks with a
/// bare `usize`.
pub trait TreeOrd<'a, T: IntrusiveNode<'a>> {
    /// What is the ordering relationship between `self` and the given tree
    /// element?
    fn tree_cmp(&self, elem: &'a T::Elem) -> cmp::Ordering;
}

struct Query<'a, 'b, K, T>
where
    T: 'a + IntrusiveNode<'a>,
    K: 'b + ?Sized + TreeOrd<'a, T>,
{
    key: &'b K,
    _phantom: PhantomData<&'a T>,
}

impl<'a, 'b, K, T> Query<'a, 'b, K, T>
where
    T: IntrusiveNode<'a>,
    K: 'b + ?Sized + TreeOrd<'a, T>,
{
    #[inline]
    fn new(key: &'b K) -> Query<'a, 'b, K, T> {
        Query {
            key,
            _phantom: PhantomData,
        }
    }
}

impl<'a, 'b, K, T> internal::CompareToNode<'a> for Query<'a, 'b, K, T>
where
    T: 'a + IntrusiveNode<'a>,
    T::Elem: 'a,
    K: 'b + ?Sized + TreeOrd<'a, T>,
{
    #[inline]
    unsafe fn compare_to_node(&self, node: &'a Node<'a>) -> cmp::Ordering {
        let val = T::node_to_elem(node);
        self.key.tree_cmp(val)
    }
}

/// An intrusive red-black tree.
///
/// The tree is parameterized by some marker type `T` whose `IntrusiveNode`
/// implementation defines:
///
/// * the element type contained in this tree: `T::Elem`,
/// * how to get the intrusive node for this tree within an element,
/// * and how to get the containing element from a given intrusive node for
/// this tree.
pub struct RbTree<'a, T>
where
    T: IntrusiveNode<'a>,
    T::Elem: 'a,
{
    tree: internal::RbTree<'a>,
    _phantom: PhantomData<&'a T::Elem>,
}

impl<'a, T> Default for RbTree<'a, T>
where
    T: 'a + IntrusiveNode<'a>,
    T::Elem: 'a,
{
    #[inline]
    fn default() -> RbTree<'a, T> {
        RbTree {
            tree: internal::RbTree::default(),
            _phantom: PhantomData,
        }
    }
}

impl<'a, T> fmt::Debug for RbTree<'a, T>
where
    T: 'a + IntrusiveNode<'a>,
    T::Elem: 'a + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl<'a, T> Extend<&'a T::Elem> for RbTree<'a, T>
where
    T: 'a + IntrusiveNode<'a>,
{
    #[inline]
    fn extend<I: IntoIterator<Item = &'a T::Elem>>(&mut self, iter: I) {
        for x in iter {
            self.insert(x);
        }
    }
}

impl<'a, T> iter::FromIterator<&'a T::Elem> for RbTree<'a, T>
where
    T: 'a + IntrusiveNode<'a>,
{
    #[inline]
    fn from_iter<I: IntoIterator<Item = &'a T::Elem>>(iter: I) -> Self {
        let mut me = RbTree::default();
        me.extend(iter);
        me
    }
}

impl<'a, T> RbTree<'a, T>
where
    T: 'a + IntrusiveNode<'a>,
{
    /// Is this tree empty?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Get the smallest element, if any exists. *O(1)*.
    pub fn first(&self) -> Option<&'a T::Elem> {
        if self.is_empty() {
            None
        } else {
            Some(unsafe { T::node_to_elem(&*self.tree.leftmost()) })
        }
    }

    /// Get the largest element, if any exists. *O(1)*.
    pub fn last(&self) -> Option<&'a T::Elem> {
        if self.is_empty() {
            None
        } else {
            Some(unsafe { T::node_to_elem(&*self.tree.rightmost()) })
        }
    }

    /// Insert a new element into this tree.
    ///
    /// The element must be detached (its node links all null). Equal
    /// elements are allowed; a later insert is ordered after the equal
    /// elements already present.
    ///
    /// ## Panics
    ///
    /// If `debug_assertions` are enabled, then this function may panic if
    /// `elem` is already in a `T` tree. If `debug_assertions` are not
    /// defined, the behavior is safe, but unspecified.
    #[inline]
    pub fn insert(&mut self, elem: &'a T::Elem) {
        unsafe {
            let query: Query<_, T> = Query::new(elem);
            let node = T::elem_to_node(elem);
            self.tree.insert(&query, node);
        }
    }

    /// Remove the given element from the tree.
    ///
    /// This does not search: the element's own links identify its position,
    /// so removal is *O(log n)* regardless of duplicates. Afterwards the
    /// element is detached and may be inserted again.
    ///
    /// ## Panics
    ///
    /// If `debug_assertions` are enabled, then this function may panic if
    /// `elem` is not currently in a `T` tree. If `debug_assertions` are not
    /// defined, the behavior is unspecified.
    #[inline]
    pub fn remove(&mut self, elem: &'a T::Elem) {
        unsafe {
            let node = T::elem_to_node(elem);
            self.tree.remove(node);
        }
    }

    /// Position a cursor at the first element that is not less than `key`,
    /// or at the end position if every element is less than `key`.
    ///
    /// The `key` may be of any type that implements `TreeOrd` for this
    /// tree's `T` type, so the tree can be searched without constructing a
    /// full element.
    #[inline]
    pub fn lower_bound<K>(&self, key: &K) -> Cursor<'_, 'a, T>
    where
        K: ?Sized + TreeOrd<'a, T>,
    {
        let query: Query<_, T> = Query::new(key);
        let node = unsafe { self.tree.lower_bound(&query) };
        Cursor {
            tree: &self.tree,
            node,
            _phantom: PhantomData,
        }
    }

    /// Position a cursor at some element equal to `key`, or at the end
    /// position if there is none.
    #[inline]
    pub fn find<K>(&self, key: &K) -> Cursor<'_, 'a, T>
    where
        K: ?Sized + TreeOrd<'a, T>,
    {
        let query: Query<_, T> = Query::new(key);
        let node = unsafe { self.tree.find(&query) };
        Cursor {
            tree: &self.tree,
            node,
            _phantom: PhantomData,
        }
    }

    /// Iterate over the elements in comparator order.
    #[inline]
    pub fn iter(&self) -> Iter<'_, 'a, T> {
        Iter {
            tree: &self.tree,
            node: self.tree.leftmost(),
            _phantom: PhantomData,
        }
    }

    /// Walk the whole tree and assert the red-black structural invariants.
    ///
    /// This is *O(n)* and intended for tests; with the `extra_assertions`
    /// feature enabled it also runs automatically after every mutation.
    pub fn validate(&self) {
        self.tree.validate();
    }
}

/// A position within a tree: either at an element, or one past the largest
/// element (the end position).
pub struct Cursor<'t, 'a, T>
where
    T: IntrusiveNode<'a>,
    T::Elem: 'a,
{
    tree: &'t internal::RbTree<'a>,
    node: *const Node<'a>,
    _phantom: PhantomData<&'a T::Elem>,
}

impl<'t, 'a, T> Clone for Cursor<'t, 'a, T>
where
    T: IntrusiveNode<'a>,
{
    fn clone(&self) -> Self {
        Cursor {
            tree: self.tree,
            node: self.node,
            _phantom: PhantomData,
        }
    }
}

impl<'t, 'a, T> fmt::Debug for Cursor<'t, 'a, T>
where
    T: IntrusiveNode<'a>,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Cursor").finish()
    }
}

impl<'t, 'a, T> Cursor<'t, 'a, T>
where
    T: 'a + IntrusiveNode<'a>,
{
    /// The element under the cursor, or `None` at the end position.
    #[inline]
    pub fn get(&self) -> Option<&'a T::Elem> {
        if self.node == self.tree.sentinel_ptr() {
            None
        } else {
            Some(unsafe { T::node_to_elem(&*self.node) })
        }
    }

    /// Is this cursor at the end position?
    #[inline]
    pub fn is_end(&self) -> bool {
        self.node == self.tree.sentinel_ptr()
    }

    /// Advance to the next element in order. Moving past the largest
    /// element lands on the end position; advancing from the end position
    /// is a logic error (checked in debug builds).
    #[inline]
    pub fn move_next(&mut self) {
        debug_assert!(!self.is_end());
        self.node = unsafe { (*self.node).successor() };
    }

    /// Step back to the previous element in order. Stepping back from the
    /// end position lands on the largest element; stepping back from the
    /// smallest element is a logic error (checked in debug builds).
    #[inline]
    pub fn move_prev(&mut self) {
        debug_assert!(!self.tree.is_empty());
        self.node = if self.is_end() {
            self.tree.rightmost()
        } else {
            unsafe { (*self.node).predecessor() }
        };
    }
}

/// An in-order iterator over the elements of an `RbTree`.
pub struct Iter<'t, 'a, T>
where
    T: IntrusiveNode<'a>,
    T::Elem: 'a,
{
    tree: &'t internal::RbTree<'a>,
    node: *const Node<'a>,
    _phantom: PhantomData<&'a T::Elem>,
}

impl<'t, 'a, T> fmt::Debug for Iter<'t, 'a, T>
where
    T: IntrusiveNode<'a>,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Iter").finish()
    }
}

impl<'t, 'a, T> Iterator for Iter<'t, 'a, T>
where
    T: 'a + IntrusiveNode<'a>,
{
    type Item = &'a T::Elem;

    fn next(&mut self) -> Option<&'a T::Elem> {
        if self.node == self.tree.sentinel_ptr() {
            return None;
        }
        unsafe {
            let elem = T::node_to_elem(&*self.node);
            self.node = (*self.node).successor();
            Some(elem)
        }
    }
}
