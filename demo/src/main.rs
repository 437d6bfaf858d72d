//! End-to-end smoke test: every allocator in the toolkit, exercised
//! against one 10 MiB heap buffer, plus a randomized churn of the
//! red-black tree that the large allocator is built on.

use carve_alloc::{
    AlignedAllocator, BoundedAllocator, FreeList, LargeAllocator, RawAlloc, SegregatedAllocator,
    MAX_NATURAL_ALIGNMENT,
};
use intrusive_rb_tree::{impl_intrusive_node, Node, RbTree, TreeOrd};
use memory_units::Bytes;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::cmp::Ordering;
use std::marker::PhantomData;

const REGION: usize = 10 * 1024 * 1024;

fn main() {
    let mut buf = vec![0u8; REGION];

    large_allocator_demo(&mut buf);
    tree_churn_demo();
    free_list_demo(&mut buf);
    segregated_demo();

    println!("all components OK");
}

fn large_allocator_demo(buf: &mut [u8]) {
    let mut large = LargeAllocator::new(buf, Bytes(0));
    let region_len = large.aligned_region_len();

    let p = unsafe { large.malloc(Bytes(1024 * 1024), MAX_NATURAL_ALIGNMENT) }
        .expect("a fresh 10 MiB region fits a 1 MiB request");
    unsafe { large.free(p.as_ptr()) };
    large.validate();
    assert_eq!(
        large.block_spans().collect::<Vec<_>>(),
        vec![(region_len, true)]
    );
    println!("large allocator: 1 MiB round trip leaves one free block");

    // A 16-aligned, overrun-checked object through the whole wrapper
    // stack.
    let mut bounded = BoundedAllocator::new(&mut large);
    let mut aligned = AlignedAllocator::new(&mut bounded);
    let s = unsafe { aligned.malloc(Bytes(40), Bytes(16)) }.expect("wrapper stack allocation");
    assert_eq!(s.as_ptr() as usize % 16, 0);
    unsafe { std::ptr::write_bytes(s.as_ptr(), 1, 40) };
    unsafe { aligned.free(s.as_ptr()) };

    large.validate();
    println!("wrapper stack: aligned(bounded(large)) round trip, canary intact");
}

#[derive(Debug, Default)]
struct Foo<'a> {
    size: i32,
    node: Node<'a>,
}

struct FoosBySize<'a>(PhantomData<&'a Foo<'a>>);

impl_intrusive_node! {
    impl<'a> IntrusiveNode<'a> for FoosBySize<'a>
    where
        type Elem = Foo<'a>,
        node = node;
}

impl<'a> TreeOrd<'a, FoosBySize<'a>> for Foo<'a> {
    fn tree_cmp(&self, rhs: &Foo<'a>) -> Ordering {
        self.size.cmp(&rhs.size)
    }
}

fn tree_churn_demo() {
    const N: usize = 45_120;
    let mut rng = StdRng::seed_from_u64(0xA110C);

    let arena = typed_arena::Arena::with_capacity(N);
    let foos = arena.alloc_extend((0..N).map(|_| Foo {
        size: rng.gen_range(0..100),
        ..Default::default()
    }));

    let mut tree = RbTree::<FoosBySize>::default();
    for foo in foos.iter() {
        tree.insert(foo);
    }
    tree.validate();

    let mut expected: Vec<i32> = foos.iter().map(|f| f.size).collect();
    expected.sort();
    assert_eq!(tree.iter().map(|f| f.size).collect::<Vec<_>>(), expected);

    let mut order: Vec<usize> = (0..N).collect();
    order.shuffle(&mut rng);
    for idx in order {
        tree.remove(&foos[idx]);
    }
    assert!(tree.is_empty());
    tree.validate();
    println!("red-black tree: {} keys in, sorted iteration, all removed", N);
}

fn free_list_demo(buf: &mut [u8]) {
    let range = buf.as_mut_ptr_range();
    let list = unsafe { FreeList::new(range.start, range.end, Bytes(12)) };
    let p = list.malloc().expect("a 10 MiB range holds at least one slot");
    unsafe { list.free(p) };
    assert_eq!(list.malloc(), Some(p));
    println!("free list: malloc/free/malloc hands back the same slot");
}

fn segregated_demo() {
    let mut allocator = SegregatedAllocator::<1>::new(Bytes(8), Bytes(8));
    let p = unsafe { allocator.malloc(Bytes(7), Bytes(8)) }.expect("an 8-byte slot");
    unsafe { allocator.free(p.as_ptr()) };
    assert!(
        unsafe { allocator.malloc(Bytes(9), Bytes(8)) }.is_err(),
        "9 bytes is out of bins"
    );
    println!("segregated allocator: in-bin request served, out-of-bin rejected");
}
