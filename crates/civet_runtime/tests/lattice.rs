//! Lattice construction scenarios on local hierarchies.

use std::sync::Arc;

use civet_runtime::bespoke::{Layout, LayoutHierarchy, LayoutIndex};

struct TestLayout {
    index: LayoutIndex,
    name: String,
    liveable: bool,
}

impl Layout for TestLayout {
    fn index(&self) -> LayoutIndex {
        self.index
    }

    fn describe(&self) -> &str {
        &self.name
    }

    fn is_liveable(&self) -> bool {
        self.liveable
    }
}

fn add(h: &mut LayoutHierarchy, name: &str, parents: &[LayoutIndex], liveable: bool) -> LayoutIndex {
    let index = h.reserve_indices(1);
    h.register(
        Arc::new(TestLayout {
            index,
            name: name.to_owned(),
            liveable,
        }),
        parents,
    );
    index
}

#[test]
#[should_panic(expected = "liveable parent")]
fn non_liveable_child_of_two_liveable_parents_fails() {
    // Top; A, B liveable children of Top; C concrete-style non-liveable
    // child of both. C's least liveable ancestor would be ambiguous, so
    // construction must fail.
    let mut h = LayoutHierarchy::new();
    let top = add(&mut h, "Top", &[], true);
    let a = add(&mut h, "A", &[top], true);
    let b = add(&mut h, "B", &[top], true);
    let _ = add(&mut h, "C", &[a, b], false);
}

#[test]
fn sole_parent_fixes_liveable_ancestor() {
    let mut h = LayoutHierarchy::new();
    let top = add(&mut h, "Top", &[], true);
    let a = add(&mut h, "A", &[top], true);
    let b = add(&mut h, "B", &[top], true);
    let c = add(&mut h, "C", &[a], false);
    h.finalize();

    assert!(h.le(c, a));
    assert!(!h.le(c, b));
    assert_eq!(h.join(a, b), top);
    assert_eq!(h.meet(a, b), None);
    assert_eq!(h.liveable_ancestor(c), a);
}

#[test]
fn reserve_indices_returns_aligned_blocks() {
    let mut h = LayoutHierarchy::new();
    let _top = h.reserve_indices(1);
    let i1 = h.reserve_indices(8);
    let i2 = h.reserve_indices(8);
    assert_eq!(i1.raw() % 8, 0);
    assert_eq!(i2.raw() % 8, 0);
    assert_eq!(i2.raw() - i1.raw(), 8);
}

#[test]
#[should_panic(expected = "exhausted")]
fn reserving_past_the_index_space_fails() {
    let mut h = LayoutHierarchy::new();
    let _ = h.reserve_indices(1 << 14);
    let _ = h.reserve_indices(1 << 14);
    let _ = h.reserve_indices(1);
}

#[test]
fn liveable_ancestor_walks_past_non_liveable_chain() {
    let mut h = LayoutHierarchy::new();
    let top = add(&mut h, "Top", &[], true);
    let live = add(&mut h, "Live", &[top], true);
    let mid = add(&mut h, "Mid", &[live], false);
    let leaf = add(&mut h, "Leaf", &[mid], false);
    h.finalize();

    assert_eq!(h.liveable_ancestor(leaf), live);
    assert_eq!(h.liveable_ancestor(mid), live);
    assert_eq!(h.liveable_ancestor(top), top);
}
