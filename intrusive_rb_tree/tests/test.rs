mod single;

use intrusive_rb_tree::RbTree;
use single::{Single, SingleTree};
use std::iter::FromIterator;
use std::panic;

#[test]
fn empty_tree() {
    let tree = RbTree::<SingleTree>::default();
    assert!(tree.is_empty());
    assert!(tree.first().is_none());
    assert!(tree.last().is_none());
    assert!(tree.lower_bound(&0usize).is_end());
    assert!(tree.find(&0usize).is_end());
    assert_eq!(tree.iter().count(), 0);
    tree.validate();
}

#[test]
fn in_order_iteration() {
    let arena = typed_arena::Arena::new();
    let elems = arena.alloc_extend([3usize, 1, 4, 1, 5, 9, 2, 6].iter().map(|&x| Single::new(x)));

    let tree = RbTree::<SingleTree>::from_iter(elems.iter());
    let values: Vec<usize> = tree.iter().map(|s| s.value).collect();
    assert_eq!(values, vec![1, 1, 2, 3, 4, 5, 6, 9]);
    tree.validate();
}

#[test]
fn extrema_are_constant_time_accessors() {
    let arena = typed_arena::Arena::new();
    let elems = arena.alloc_extend([7usize, 2, 9, 4].iter().map(|&x| Single::new(x)));

    let mut tree = RbTree::<SingleTree>::from_iter(elems.iter());
    assert_eq!(tree.first().unwrap().value, 2);
    assert_eq!(tree.last().unwrap().value, 9);

    tree.remove(tree.first().unwrap());
    tree.remove(tree.last().unwrap());
    assert_eq!(tree.first().unwrap().value, 4);
    assert_eq!(tree.last().unwrap().value, 7);
    tree.validate();
}

#[test]
fn duplicates_keep_insertion_order() {
    let arena = typed_arena::Arena::new();
    let a = arena.alloc(Single::new(5));
    let b = arena.alloc(Single::new(5));
    let c = arena.alloc(Single::new(5));

    let mut tree = RbTree::<SingleTree>::default();
    tree.insert(a);
    tree.insert(b);
    tree.insert(c);

    let in_order: Vec<*const Single> = tree.iter().map(|s| s as *const Single).collect();
    assert_eq!(
        in_order,
        vec![
            a as *const Single,
            b as *const Single,
            c as *const Single
        ]
    );
    tree.validate();
}

#[test]
fn lower_bound_lands_on_first_not_less() {
    let arena = typed_arena::Arena::new();
    let elems = arena.alloc_extend([10usize, 20, 20, 30].iter().map(|&x| Single::new(x)));

    let tree = RbTree::<SingleTree>::from_iter(elems.iter());

    assert_eq!(tree.lower_bound(&5usize).get().unwrap().value, 10);
    assert_eq!(tree.lower_bound(&20usize).get().unwrap().value, 20);
    assert_eq!(tree.lower_bound(&21usize).get().unwrap().value, 30);
    assert!(tree.lower_bound(&31usize).is_end());
}

#[test]
fn find_hits_and_misses() {
    let arena = typed_arena::Arena::new();
    let elems = arena.alloc_extend([10usize, 20, 30].iter().map(|&x| Single::new(x)));

    let tree = RbTree::<SingleTree>::from_iter(elems.iter());
    assert_eq!(tree.find(&20usize).get().unwrap().value, 20);
    assert!(tree.find(&25usize).is_end());
}

#[test]
fn cursor_walks_both_directions() {
    let arena = typed_arena::Arena::new();
    let elems = arena.alloc_extend([1usize, 2, 3].iter().map(|&x| Single::new(x)));

    let tree = RbTree::<SingleTree>::from_iter(elems.iter());

    let mut c = tree.lower_bound(&0usize);
    assert_eq!(c.get().unwrap().value, 1);
    c.move_next();
    assert_eq!(c.get().unwrap().value, 2);
    c.move_next();
    assert_eq!(c.get().unwrap().value, 3);
    c.move_next();
    assert!(c.is_end());

    // Stepping back from the end position lands on the largest element.
    c.move_prev();
    assert_eq!(c.get().unwrap().value, 3);
    c.move_prev();
    assert_eq!(c.get().unwrap().value, 2);
    c.move_prev();
    assert_eq!(c.get().unwrap().value, 1);
}

#[test]
fn removed_elements_can_be_reinserted() {
    let arena = typed_arena::Arena::new();
    let elems = arena.alloc_extend([4usize, 8, 15].iter().map(|&x| Single::new(x)));

    let mut tree = RbTree::<SingleTree>::from_iter(elems.iter());
    let eight = tree.find(&8usize).get().unwrap();
    tree.remove(eight);
    assert!(tree.find(&8usize).is_end());

    tree.insert(eight);
    assert_eq!(tree.find(&8usize).get().unwrap().value, 8);
    assert_eq!(tree.iter().count(), 3);
    tree.validate();
}

#[test]
#[cfg(debug_assertions)]
fn inserting_already_inserted_panics_in_debug() {
    let result = panic::catch_unwind(panic::AssertUnwindSafe(move || {
        let arena = typed_arena::Arena::new();
        let mut tree = RbTree::<SingleTree>::default();
        let elems = arena.alloc_extend((0..3).map(Single::new));

        for e in elems.iter() {
            tree.insert(e);
        }
        for e in elems.iter() {
            tree.insert(e);
        }
    }));
    assert!(result.is_err());
}

#[test]
fn trees_are_movable_values() {
    let arena = typed_arena::Arena::new();
    let elems = arena.alloc_extend([2usize, 1, 3].iter().map(|&x| Single::new(x)));

    let mut tree = RbTree::<SingleTree>::default();
    for e in elems.iter() {
        tree.insert(e);
    }

    // The sentinel has a stable address, so moving the tree value must not
    // disturb the structure.
    let moved = tree;
    let values: Vec<usize> = moved.iter().map(|s| s.value).collect();
    assert_eq!(values, vec![1, 2, 3]);
    moved.validate();
}
