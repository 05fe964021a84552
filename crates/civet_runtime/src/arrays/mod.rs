//! Array values.
//!
//! `ArrayData` is the runtime's associative-array header. A vanilla array
//! carries the canonical store inline; a bespoke array carries a
//! layout-specific store plus its 15-bit layout index (with the high bit of
//! the 16-bit field set, so "non-vanilla" folds into one masked compare).
//! The free functions at the bottom are the runtime's generic entry points:
//! they serve vanilla arrays directly and route everything else through the
//! owning layout's operation vtable.

pub mod vanilla;

use std::any::Any;
use std::sync::Arc;

use crate::bespoke::{self, LayoutIndex};
use crate::value::{StringVal, TypedValue};

pub use vanilla::VanillaStore;

pub type ArrayRef = Arc<ArrayData>;

/// Array kinds. Even values are vanilla, odd values the bespoke flavor of
/// the kind below them, so `kind / 2` names the logical shape.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[repr(u8)]
pub enum ArrayKind {
    Vec = 0,
    BespokeVec = 1,
    Dict = 2,
    BespokeDict = 3,
    Keyset = 4,
    BespokeKeyset = 5,
}

impl ArrayKind {
    /// Number of logical shapes (the `kind / 2` slots).
    pub const NUM_SHAPES: usize = 3;

    pub fn is_vanilla(self) -> bool {
        (self as u8) & 1 == 0
    }

    /// The bespoke flavor of this kind.
    pub fn bespoke(self) -> ArrayKind {
        match self {
            ArrayKind::Vec | ArrayKind::BespokeVec => ArrayKind::BespokeVec,
            ArrayKind::Dict | ArrayKind::BespokeDict => ArrayKind::BespokeDict,
            ArrayKind::Keyset | ArrayKind::BespokeKeyset => ArrayKind::BespokeKeyset,
        }
    }

    /// Histogram slot; pairs of kinds share one.
    pub fn shape_slot(self) -> usize {
        (self as u8 / 2) as usize
    }

    pub fn shape_name(slot: usize) -> &'static str {
        match slot {
            0 => "Vec",
            1 => "Dict",
            2 => "Keyset",
            _ => "<bad kind>",
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SortFunction {
    Sort,
    KeySort,
    AssocSort,
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum ArrayKey {
    Int(i64),
    Str(StringVal),
}

/// An lvalue into an array: the (possibly copied) array plus the position of
/// the addressed element. `pos == end` is the missing-element null base.
pub struct Lval {
    pub arr: ArrayRef,
    pub pos: usize,
}

/// GC scan sink: collects the counted values reachable from an array.
#[derive(Default)]
pub struct Scanner {
    counted: Vec<TypedValue>,
}

impl Scanner {
    pub fn new() -> Scanner {
        Scanner::default()
    }

    pub fn scan_value(&mut self, val: &TypedValue) {
        match val {
            TypedValue::Str(s) if !s.is_static() => self.counted.push(val.clone()),
            TypedValue::Arr(_) => self.counted.push(val.clone()),
            _ => {}
        }
    }

    pub fn scan_str(&mut self, s: &StringVal) {
        if !s.is_static() {
            self.counted.push(TypedValue::Str(s.clone()));
        }
    }

    pub fn counted(&self) -> &[TypedValue] {
        &self.counted
    }
}

/// Layout-specific storage of a bespoke array.
pub trait BespokeStore: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn clone_box(&self) -> Box<dyn BespokeStore>;
}

impl Clone for Box<dyn BespokeStore> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

#[derive(Clone)]
enum Store {
    Vanilla(VanillaStore),
    Bespoke(Box<dyn BespokeStore>),
}

#[derive(Clone)]
pub struct ArrayData {
    kind: ArrayKind,
    /// 0 for vanilla arrays; `LayoutIndex::to_extra` otherwise.
    extra: u16,
    sampled: bool,
    pub(crate) legacy: bool,
    store: Store,
}

impl ArrayData {
    fn from_store(kind: ArrayKind, store: VanillaStore) -> ArrayRef {
        debug_assert!(kind.is_vanilla());
        Arc::new(ArrayData {
            kind,
            extra: 0,
            sampled: false,
            legacy: false,
            store: Store::Vanilla(store),
        })
    }

    pub fn new_vec(vals: Vec<TypedValue>) -> ArrayRef {
        let mut store = VanillaStore::default();
        for val in vals {
            store.append(val);
        }
        Self::from_store(ArrayKind::Vec, store)
    }

    pub fn new_dict(pairs: Vec<(ArrayKey, TypedValue)>) -> ArrayRef {
        let mut store = VanillaStore::default();
        for (key, val) in pairs {
            store.set(key, val);
        }
        Self::from_store(ArrayKind::Dict, store)
    }

    pub fn new_keyset(keys: Vec<ArrayKey>) -> ArrayRef {
        let mut store = VanillaStore::default();
        for key in keys {
            let val = match &key {
                ArrayKey::Int(i) => TypedValue::Int(*i),
                ArrayKey::Str(s) => TypedValue::Str(s.clone()),
            };
            store.set(key, val);
        }
        Self::from_store(ArrayKind::Keyset, store)
    }

    /// Header for a bespoke array owned by `layout`.
    pub fn new_bespoke(
        kind: ArrayKind,
        layout: LayoutIndex,
        store: Box<dyn BespokeStore>,
    ) -> ArrayRef {
        debug_assert!(!kind.is_vanilla());
        Arc::new(ArrayData {
            kind,
            extra: layout.to_extra(),
            sampled: false,
            legacy: false,
            store: Store::Bespoke(store),
        })
    }

    /// Vanilla copy flagged as sampled, for sites whose allocations are
    /// counted but not logged.
    pub fn to_sampled(ad: &ArrayRef) -> ArrayRef {
        let mut out = (**ad).clone();
        out.sampled = true;
        Arc::new(out)
    }

    pub fn kind(&self) -> ArrayKind {
        self.kind
    }

    pub fn extra(&self) -> u16 {
        self.extra
    }

    pub fn is_vanilla(&self) -> bool {
        matches!(self.store, Store::Vanilla(_))
    }

    pub fn layout_index(&self) -> Option<LayoutIndex> {
        LayoutIndex::from_extra(self.extra)
    }

    pub fn is_sampled(&self) -> bool {
        self.sampled
    }

    pub fn is_legacy(&self) -> bool {
        self.legacy
    }

    pub fn vanilla_store(&self) -> &VanillaStore {
        match &self.store {
            Store::Vanilla(store) => store,
            Store::Bespoke(_) => panic!("vanilla access to bespoke array"),
        }
    }

    pub(crate) fn vanilla_store_mut(&mut self) -> &mut VanillaStore {
        match &mut self.store {
            Store::Vanilla(store) => store,
            Store::Bespoke(_) => panic!("vanilla access to bespoke array"),
        }
    }

    pub fn bespoke_store<T: Any>(&self) -> Option<&T> {
        match &self.store {
            Store::Vanilla(_) => None,
            Store::Bespoke(store) => store.as_any().downcast_ref::<T>(),
        }
    }

    pub fn size(&self) -> usize {
        size(self)
    }
}

//////////////////////////////////////////////////////////////////////////////
// Generic dispatch.

fn vtable(ad: &ArrayData) -> &'static bespoke::LayoutFunctions {
    bespoke::vtable_for(ad)
}

pub fn size(ad: &ArrayData) -> usize {
    if ad.is_vanilla() {
        ad.vanilla_store().size()
    } else {
        (vtable(ad).size)(ad)
    }
}

pub fn heap_size(ad: &ArrayData) -> usize {
    if ad.is_vanilla() {
        ad.vanilla_store().heap_size()
    } else {
        (vtable(ad).heap_size)(ad)
    }
}

pub fn is_vector_data(ad: &ArrayData) -> bool {
    if ad.is_vanilla() {
        ad.vanilla_store().is_vector_data()
    } else {
        (vtable(ad).is_vector_data)(ad)
    }
}

pub fn scan(ad: &ArrayData, scanner: &mut Scanner) {
    if ad.is_vanilla() {
        vanilla::scan(ad, scanner)
    } else {
        (vtable(ad).scan)(ad, scanner)
    }
}

pub fn escalate_to_vanilla(ad: &ArrayRef, reason: &'static str) -> ArrayRef {
    if ad.is_vanilla() {
        ad.clone()
    } else {
        (vtable(ad).escalate_to_vanilla)(ad, reason)
    }
}

pub fn convert_to_uncounted(ad: &ArrayRef) -> ArrayRef {
    if ad.is_vanilla() {
        vanilla::to_uncounted(ad)
    } else {
        (vtable(ad).convert_to_uncounted)(ad)
    }
}

pub fn release_uncounted(ad: &ArrayData) {
    if !ad.is_vanilla() {
        (vtable(ad).release_uncounted)(ad)
    }
}

pub fn release(ad: ArrayRef) {
    if !ad.is_vanilla() {
        (vtable(&ad).release)(ad)
    }
}

pub fn get_int(ad: &ArrayData, k: i64) -> TypedValue {
    if ad.is_vanilla() {
        vanilla::get_int(ad, k)
    } else {
        (vtable(ad).get_int)(ad, k)
    }
}

pub fn get_str(ad: &ArrayData, k: &StringVal) -> TypedValue {
    if ad.is_vanilla() {
        vanilla::get_str(ad, k)
    } else {
        (vtable(ad).get_str)(ad, k)
    }
}

pub fn get_key(ad: &ArrayData, pos: usize) -> TypedValue {
    if ad.is_vanilla() {
        vanilla::get_key(ad, pos)
    } else {
        (vtable(ad).get_key)(ad, pos)
    }
}

pub fn get_val(ad: &ArrayData, pos: usize) -> TypedValue {
    if ad.is_vanilla() {
        vanilla::get_val(ad, pos)
    } else {
        (vtable(ad).get_val)(ad, pos)
    }
}

pub fn get_int_pos(ad: &ArrayData, k: i64) -> usize {
    if ad.is_vanilla() {
        vanilla::get_int_pos(ad, k)
    } else {
        (vtable(ad).get_int_pos)(ad, k)
    }
}

pub fn get_str_pos(ad: &ArrayData, k: &StringVal) -> usize {
    if ad.is_vanilla() {
        vanilla::get_str_pos(ad, k)
    } else {
        (vtable(ad).get_str_pos)(ad, k)
    }
}

pub fn iter_begin(ad: &ArrayData) -> usize {
    if ad.is_vanilla() {
        ad.vanilla_store().first_pos()
    } else {
        (vtable(ad).iter_begin)(ad)
    }
}

pub fn iter_last(ad: &ArrayData) -> usize {
    if ad.is_vanilla() {
        ad.vanilla_store().last_pos()
    } else {
        (vtable(ad).iter_last)(ad)
    }
}

pub fn iter_end(ad: &ArrayData) -> usize {
    if ad.is_vanilla() {
        ad.vanilla_store().end_pos()
    } else {
        (vtable(ad).iter_end)(ad)
    }
}

pub fn iter_advance(ad: &ArrayData, pos: usize) -> usize {
    if ad.is_vanilla() {
        ad.vanilla_store().advance(pos)
    } else {
        (vtable(ad).iter_advance)(ad, pos)
    }
}

pub fn iter_rewind(ad: &ArrayData, pos: usize) -> usize {
    if ad.is_vanilla() {
        ad.vanilla_store().rewind(pos)
    } else {
        (vtable(ad).iter_rewind)(ad, pos)
    }
}

pub fn lval_int(ad: &ArrayRef, k: i64) -> Lval {
    if ad.is_vanilla() {
        vanilla::lval(ad, ArrayKey::Int(k))
    } else {
        (vtable(ad).lval_int)(ad, k)
    }
}

pub fn lval_str(ad: &ArrayRef, k: &StringVal) -> Lval {
    if ad.is_vanilla() {
        vanilla::lval(ad, ArrayKey::Str(k.clone()))
    } else {
        (vtable(ad).lval_str)(ad, k)
    }
}

pub fn elem_int(ad: &ArrayRef, k: i64, throw_on_missing: bool) -> Option<Lval> {
    if ad.is_vanilla() {
        vanilla::elem(ad, ArrayKey::Int(k), throw_on_missing)
    } else {
        (vtable(ad).elem_int)(ad, k, throw_on_missing)
    }
}

pub fn elem_str(ad: &ArrayRef, k: &StringVal, throw_on_missing: bool) -> Option<Lval> {
    if ad.is_vanilla() {
        vanilla::elem(ad, ArrayKey::Str(k.clone()), throw_on_missing)
    } else {
        (vtable(ad).elem_str)(ad, k, throw_on_missing)
    }
}

pub fn set_int(ad: &ArrayRef, k: i64, v: TypedValue) -> ArrayRef {
    if ad.is_vanilla() {
        vanilla::set(ad, ArrayKey::Int(k), v)
    } else {
        (vtable(ad).set_int)(ad, k, v)
    }
}

pub fn set_str(ad: &ArrayRef, k: StringVal, v: TypedValue) -> ArrayRef {
    if ad.is_vanilla() {
        vanilla::set(ad, ArrayKey::Str(k), v)
    } else {
        (vtable(ad).set_str)(ad, k, v)
    }
}

pub fn set_int_move(ad: ArrayRef, k: i64, v: TypedValue) -> ArrayRef {
    if ad.is_vanilla() {
        vanilla::set_move(ad, ArrayKey::Int(k), v)
    } else {
        (vtable(&ad).set_int_move)(ad, k, v)
    }
}

pub fn set_str_move(ad: ArrayRef, k: StringVal, v: TypedValue) -> ArrayRef {
    if ad.is_vanilla() {
        vanilla::set_move(ad, ArrayKey::Str(k), v)
    } else {
        (vtable(&ad).set_str_move)(ad, k, v)
    }
}

pub fn remove_int(ad: &ArrayRef, k: i64) -> ArrayRef {
    if ad.is_vanilla() {
        vanilla::remove(ad, &ArrayKey::Int(k))
    } else {
        (vtable(ad).remove_int)(ad, k)
    }
}

pub fn remove_str(ad: &ArrayRef, k: &StringVal) -> ArrayRef {
    if ad.is_vanilla() {
        vanilla::remove(ad, &ArrayKey::Str(k.clone()))
    } else {
        (vtable(ad).remove_str)(ad, k)
    }
}

pub fn append(ad: &ArrayRef, v: TypedValue) -> ArrayRef {
    if ad.is_vanilla() {
        vanilla::append(ad, v)
    } else {
        (vtable(ad).append)(ad, v)
    }
}

pub fn append_move(ad: ArrayRef, v: TypedValue) -> ArrayRef {
    if ad.is_vanilla() {
        vanilla::append_move(ad, v)
    } else {
        (vtable(&ad).append_move)(ad, v)
    }
}

pub fn pop(ad: &ArrayRef) -> (ArrayRef, TypedValue) {
    if ad.is_vanilla() {
        vanilla::pop(ad)
    } else {
        (vtable(ad).pop)(ad)
    }
}

pub fn pre_sort(ad: &ArrayRef, sf: SortFunction) -> ArrayRef {
    if ad.is_vanilla() {
        ad.clone()
    } else {
        (vtable(ad).pre_sort)(ad, sf)
    }
}

pub fn post_sort(ad: &ArrayRef, vad: ArrayRef) -> ArrayRef {
    if ad.is_vanilla() {
        vad
    } else {
        (vtable(ad).post_sort)(ad, vad)
    }
}

pub fn set_legacy(ad: &ArrayRef, legacy: bool) -> ArrayRef {
    if ad.is_vanilla() {
        vanilla::set_legacy(ad, legacy)
    } else {
        (vtable(ad).set_legacy)(ad, legacy)
    }
}

/// Full sort: pre-sort to a vanilla array, sort it, hand it back to the
/// original layout.
pub fn sort(ad: &ArrayRef, sf: SortFunction) -> ArrayRef {
    let vad = pre_sort(ad, sf);
    let sorted = vanilla::sort(&vad, sf);
    post_sort(ad, sorted)
}
