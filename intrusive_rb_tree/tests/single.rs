use intrusive_rb_tree::{impl_intrusive_node, Node, TreeOrd};
use std::cmp::Ordering;
use std::marker::PhantomData;

#[derive(Debug, Default)]
pub struct Single<'a> {
    pub value: usize,
    node: Node<'a>,
}

impl<'a> Single<'a> {
    pub fn new(x: usize) -> Single<'a> {
        Single {
            value: x,
            node: Default::default(),
        }
    }
}

pub struct SingleTree<'a>(PhantomData<&'a Single<'a>>);

impl_intrusive_node! {
    impl<'a> IntrusiveNode<'a> for SingleTree<'a>
    where
        type Elem = Single<'a>,
        node = node;
}

impl<'a> TreeOrd<'a, SingleTree<'a>> for Single<'a> {
    fn tree_cmp(&self, rhs: &Single<'a>) -> Ordering {
        self.value.cmp(&rhs.value)
    }
}

impl<'a> TreeOrd<'a, SingleTree<'a>> for usize {
    fn tree_cmp(&self, rhs: &Single<'a>) -> Ordering {
        self.cmp(&rhs.value)
    }
}
