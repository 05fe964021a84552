//! Per-layout operation vtables.
//!
//! `LayoutFunctions` is the contract between the runtime's generic array
//! entry points and a concrete bespoke layout: one function pointer per
//! operation, each taking the generic array type. A layout implements the
//! typed side of the contract ([`BespokeArrayImpl`]) and gets its table from
//! [`LayoutFunctions::for_impl`]. Debug builds route every slot through a
//! wrapper that runs the layout's `cast` validator (which must panic on a
//! mismatched array) and logs the dispatch; release builds install the typed
//! functions directly.

use crate::arrays::{ArrayData, ArrayRef, Lval, Scanner, SortFunction};
use crate::value::{StringVal, TypedValue};

/// Function-pointer table for the 35 array operations.
pub struct LayoutFunctions {
    pub heap_size: fn(&ArrayData) -> usize,
    pub scan: fn(&ArrayData, &mut Scanner),
    pub escalate_to_vanilla: fn(&ArrayRef, &'static str) -> ArrayRef,
    pub convert_to_uncounted: fn(&ArrayRef) -> ArrayRef,
    pub release_uncounted: fn(&ArrayData),
    pub release: fn(ArrayRef),
    pub is_vector_data: fn(&ArrayData) -> bool,
    pub size: fn(&ArrayData) -> usize,
    pub get_int: fn(&ArrayData, i64) -> TypedValue,
    pub get_str: fn(&ArrayData, &StringVal) -> TypedValue,
    pub get_key: fn(&ArrayData, usize) -> TypedValue,
    pub get_val: fn(&ArrayData, usize) -> TypedValue,
    pub get_int_pos: fn(&ArrayData, i64) -> usize,
    pub get_str_pos: fn(&ArrayData, &StringVal) -> usize,
    pub iter_begin: fn(&ArrayData) -> usize,
    pub iter_last: fn(&ArrayData) -> usize,
    pub iter_end: fn(&ArrayData) -> usize,
    pub iter_advance: fn(&ArrayData, usize) -> usize,
    pub iter_rewind: fn(&ArrayData, usize) -> usize,
    pub lval_int: fn(&ArrayRef, i64) -> Lval,
    pub lval_str: fn(&ArrayRef, &StringVal) -> Lval,
    pub elem_int: fn(&ArrayRef, i64, bool) -> Option<Lval>,
    pub elem_str: fn(&ArrayRef, &StringVal, bool) -> Option<Lval>,
    pub set_int: fn(&ArrayRef, i64, TypedValue) -> ArrayRef,
    pub set_str: fn(&ArrayRef, StringVal, TypedValue) -> ArrayRef,
    pub set_int_move: fn(ArrayRef, i64, TypedValue) -> ArrayRef,
    pub set_str_move: fn(ArrayRef, StringVal, TypedValue) -> ArrayRef,
    pub remove_int: fn(&ArrayRef, i64) -> ArrayRef,
    pub remove_str: fn(&ArrayRef, &StringVal) -> ArrayRef,
    pub append: fn(&ArrayRef, TypedValue) -> ArrayRef,
    pub append_move: fn(ArrayRef, TypedValue) -> ArrayRef,
    pub pop: fn(&ArrayRef) -> (ArrayRef, TypedValue),
    pub pre_sort: fn(&ArrayRef, SortFunction) -> ArrayRef,
    pub post_sort: fn(&ArrayRef, ArrayRef) -> ArrayRef,
    pub set_legacy: fn(&ArrayRef, bool) -> ArrayRef,
}

/// The typed side of the vtable contract. `cast` converts the generic array
/// to this layout's store, performing whatever invariant checking the layout
/// wants; it must panic when handed an array of a different layout. Any
/// operation a layout cannot serve in place escalates to vanilla and lets
/// the runtime retry.
pub trait BespokeArrayImpl: Sized + Send + Sync + 'static {
    fn cast(ad: &ArrayData) -> &Self;

    fn heap_size(ad: &ArrayData) -> usize;
    fn scan(ad: &ArrayData, scanner: &mut Scanner);
    fn escalate_to_vanilla(ad: &ArrayRef, reason: &'static str) -> ArrayRef;
    fn convert_to_uncounted(ad: &ArrayRef) -> ArrayRef;
    fn release_uncounted(ad: &ArrayData);
    fn release(ad: ArrayRef);
    fn is_vector_data(ad: &ArrayData) -> bool;
    fn size(ad: &ArrayData) -> usize;
    fn get_int(ad: &ArrayData, k: i64) -> TypedValue;
    fn get_str(ad: &ArrayData, k: &StringVal) -> TypedValue;
    fn get_key(ad: &ArrayData, pos: usize) -> TypedValue;
    fn get_val(ad: &ArrayData, pos: usize) -> TypedValue;
    fn get_int_pos(ad: &ArrayData, k: i64) -> usize;
    fn get_str_pos(ad: &ArrayData, k: &StringVal) -> usize;
    fn iter_begin(ad: &ArrayData) -> usize;
    fn iter_last(ad: &ArrayData) -> usize;
    fn iter_end(ad: &ArrayData) -> usize;
    fn iter_advance(ad: &ArrayData, pos: usize) -> usize;
    fn iter_rewind(ad: &ArrayData, pos: usize) -> usize;
    fn lval_int(ad: &ArrayRef, k: i64) -> Lval;
    fn lval_str(ad: &ArrayRef, k: &StringVal) -> Lval;
    fn elem_int(ad: &ArrayRef, k: i64, throw_on_missing: bool) -> Option<Lval>;
    fn elem_str(ad: &ArrayRef, k: &StringVal, throw_on_missing: bool) -> Option<Lval>;
    fn set_int(ad: &ArrayRef, k: i64, v: TypedValue) -> ArrayRef;
    fn set_str(ad: &ArrayRef, k: StringVal, v: TypedValue) -> ArrayRef;
    fn set_int_move(ad: ArrayRef, k: i64, v: TypedValue) -> ArrayRef;
    fn set_str_move(ad: ArrayRef, k: StringVal, v: TypedValue) -> ArrayRef;
    fn remove_int(ad: &ArrayRef, k: i64) -> ArrayRef;
    fn remove_str(ad: &ArrayRef, k: &StringVal) -> ArrayRef;
    fn append(ad: &ArrayRef, v: TypedValue) -> ArrayRef;
    fn append_move(ad: ArrayRef, v: TypedValue) -> ArrayRef;
    fn pop(ad: &ArrayRef) -> (ArrayRef, TypedValue);
    fn pre_sort(ad: &ArrayRef, sf: SortFunction) -> ArrayRef;
    fn post_sort(ad: &ArrayRef, vad: ArrayRef) -> ArrayRef;
    fn set_legacy(ad: &ArrayRef, legacy: bool) -> ArrayRef;
}

pub fn log_bespoke_dispatch(ad: &ArrayData, func: &'static str) {
    tracing::trace!(extra = ad.extra(), func, "bespoke dispatch");
}

/// Debug-mode dispatchers: validate through the layout's `cast` before
/// handing off to the typed function.
#[cfg(debug_assertions)]
mod checked {
    use super::*;

    fn validate<A: BespokeArrayImpl>(ad: &ArrayData, func: &'static str) {
        log_bespoke_dispatch(ad, func);
        let _ = A::cast(ad);
    }

    pub fn scan<A: BespokeArrayImpl>(ad: &ArrayData, scanner: &mut Scanner) {
        validate::<A>(ad, "scan");
        A::scan(ad, scanner)
    }

    pub fn escalate_to_vanilla<A: BespokeArrayImpl>(
        ad: &ArrayRef,
        reason: &'static str,
    ) -> ArrayRef {
        validate::<A>(ad, "escalate_to_vanilla");
        A::escalate_to_vanilla(ad, reason)
    }

    pub fn convert_to_uncounted<A: BespokeArrayImpl>(ad: &ArrayRef) -> ArrayRef {
        validate::<A>(ad, "convert_to_uncounted");
        A::convert_to_uncounted(ad)
    }

    pub fn release_uncounted<A: BespokeArrayImpl>(ad: &ArrayData) {
        validate::<A>(ad, "release_uncounted");
        A::release_uncounted(ad)
    }

    pub fn release<A: BespokeArrayImpl>(ad: ArrayRef) {
        validate::<A>(&ad, "release");
        A::release(ad)
    }

    pub fn is_vector_data<A: BespokeArrayImpl>(ad: &ArrayData) -> bool {
        validate::<A>(ad, "is_vector_data");
        A::is_vector_data(ad)
    }

    pub fn size<A: BespokeArrayImpl>(ad: &ArrayData) -> usize {
        validate::<A>(ad, "size");
        A::size(ad)
    }

    pub fn get_int<A: BespokeArrayImpl>(ad: &ArrayData, k: i64) -> TypedValue {
        validate::<A>(ad, "get_int");
        A::get_int(ad, k)
    }

    pub fn get_str<A: BespokeArrayImpl>(ad: &ArrayData, k: &StringVal) -> TypedValue {
        validate::<A>(ad, "get_str");
        A::get_str(ad, k)
    }

    pub fn get_key<A: BespokeArrayImpl>(ad: &ArrayData, pos: usize) -> TypedValue {
        validate::<A>(ad, "get_key");
        A::get_key(ad, pos)
    }

    pub fn get_val<A: BespokeArrayImpl>(ad: &ArrayData, pos: usize) -> TypedValue {
        validate::<A>(ad, "get_val");
        A::get_val(ad, pos)
    }

    pub fn get_int_pos<A: BespokeArrayImpl>(ad: &ArrayData, k: i64) -> usize {
        validate::<A>(ad, "get_int_pos");
        A::get_int_pos(ad, k)
    }

    pub fn get_str_pos<A: BespokeArrayImpl>(ad: &ArrayData, k: &StringVal) -> usize {
        validate::<A>(ad, "get_str_pos");
        A::get_str_pos(ad, k)
    }

    pub fn iter_begin<A: BespokeArrayImpl>(ad: &ArrayData) -> usize {
        validate::<A>(ad, "iter_begin");
        A::iter_begin(ad)
    }

    pub fn iter_last<A: BespokeArrayImpl>(ad: &ArrayData) -> usize {
        validate::<A>(ad, "iter_last");
        A::iter_last(ad)
    }

    pub fn iter_end<A: BespokeArrayImpl>(ad: &ArrayData) -> usize {
        validate::<A>(ad, "iter_end");
        A::iter_end(ad)
    }

    pub fn iter_advance<A: BespokeArrayImpl>(ad: &ArrayData, pos: usize) -> usize {
        validate::<A>(ad, "iter_advance");
        A::iter_advance(ad, pos)
    }

    pub fn iter_rewind<A: BespokeArrayImpl>(ad: &ArrayData, pos: usize) -> usize {
        validate::<A>(ad, "iter_rewind");
        A::iter_rewind(ad, pos)
    }

    pub fn lval_int<A: BespokeArrayImpl>(ad: &ArrayRef, k: i64) -> Lval {
        validate::<A>(ad, "lval_int");
        A::lval_int(ad, k)
    }

    pub fn lval_str<A: BespokeArrayImpl>(ad: &ArrayRef, k: &StringVal) -> Lval {
        validate::<A>(ad, "lval_str");
        A::lval_str(ad, k)
    }

    pub fn elem_int<A: BespokeArrayImpl>(ad: &ArrayRef, k: i64, throw: bool) -> Option<Lval> {
        validate::<A>(ad, "elem_int");
        A::elem_int(ad, k, throw)
    }

    pub fn elem_str<A: BespokeArrayImpl>(
        ad: &ArrayRef,
        k: &StringVal,
        throw: bool,
    ) -> Option<Lval> {
        validate::<A>(ad, "elem_str");
        A::elem_str(ad, k, throw)
    }

    pub fn set_int<A: BespokeArrayImpl>(ad: &ArrayRef, k: i64, v: TypedValue) -> ArrayRef {
        validate::<A>(ad, "set_int");
        A::set_int(ad, k, v)
    }

    pub fn set_str<A: BespokeArrayImpl>(ad: &ArrayRef, k: StringVal, v: TypedValue) -> ArrayRef {
        validate::<A>(ad, "set_str");
        A::set_str(ad, k, v)
    }

    pub fn set_int_move<A: BespokeArrayImpl>(ad: ArrayRef, k: i64, v: TypedValue) -> ArrayRef {
        validate::<A>(&ad, "set_int_move");
        A::set_int_move(ad, k, v)
    }

    pub fn set_str_move<A: BespokeArrayImpl>(
        ad: ArrayRef,
        k: StringVal,
        v: TypedValue,
    ) -> ArrayRef {
        validate::<A>(&ad, "set_str_move");
        A::set_str_move(ad, k, v)
    }

    pub fn remove_int<A: BespokeArrayImpl>(ad: &ArrayRef, k: i64) -> ArrayRef {
        validate::<A>(ad, "remove_int");
        A::remove_int(ad, k)
    }

    pub fn remove_str<A: BespokeArrayImpl>(ad: &ArrayRef, k: &StringVal) -> ArrayRef {
        validate::<A>(ad, "remove_str");
        A::remove_str(ad, k)
    }

    pub fn append<A: BespokeArrayImpl>(ad: &ArrayRef, v: TypedValue) -> ArrayRef {
        validate::<A>(ad, "append");
        A::append(ad, v)
    }

    pub fn append_move<A: BespokeArrayImpl>(ad: ArrayRef, v: TypedValue) -> ArrayRef {
        validate::<A>(&ad, "append_move");
        A::append_move(ad, v)
    }

    pub fn pop<A: BespokeArrayImpl>(ad: &ArrayRef) -> (ArrayRef, TypedValue) {
        validate::<A>(ad, "pop");
        A::pop(ad)
    }

    pub fn pre_sort<A: BespokeArrayImpl>(ad: &ArrayRef, sf: SortFunction) -> ArrayRef {
        validate::<A>(ad, "pre_sort");
        A::pre_sort(ad, sf)
    }

    pub fn post_sort<A: BespokeArrayImpl>(ad: &ArrayRef, vad: ArrayRef) -> ArrayRef {
        validate::<A>(ad, "post_sort");
        A::post_sort(ad, vad)
    }

    pub fn set_legacy<A: BespokeArrayImpl>(ad: &ArrayRef, legacy: bool) -> ArrayRef {
        validate::<A>(ad, "set_legacy");
        A::set_legacy(ad, legacy)
    }
}

impl LayoutFunctions {
    /// Build the vtable for one typed implementation. `heap_size` skips the
    /// checked wrapper even in debug builds: the GC may ask for it while
    /// values the validator would inspect are already gone.
    #[cfg(debug_assertions)]
    pub fn for_impl<A: BespokeArrayImpl>() -> LayoutFunctions {
        LayoutFunctions {
            heap_size: A::heap_size,
            scan: checked::scan::<A>,
            escalate_to_vanilla: checked::escalate_to_vanilla::<A>,
            convert_to_uncounted: checked::convert_to_uncounted::<A>,
            release_uncounted: checked::release_uncounted::<A>,
            release: checked::release::<A>,
            is_vector_data: checked::is_vector_data::<A>,
            size: checked::size::<A>,
            get_int: checked::get_int::<A>,
            get_str: checked::get_str::<A>,
            get_key: checked::get_key::<A>,
            get_val: checked::get_val::<A>,
            get_int_pos: checked::get_int_pos::<A>,
            get_str_pos: checked::get_str_pos::<A>,
            iter_begin: checked::iter_begin::<A>,
            iter_last: checked::iter_last::<A>,
            iter_end: checked::iter_end::<A>,
            iter_advance: checked::iter_advance::<A>,
            iter_rewind: checked::iter_rewind::<A>,
            lval_int: checked::lval_int::<A>,
            lval_str: checked::lval_str::<A>,
            elem_int: checked::elem_int::<A>,
            elem_str: checked::elem_str::<A>,
            set_int: checked::set_int::<A>,
            set_str: checked::set_str::<A>,
            set_int_move: checked::set_int_move::<A>,
            set_str_move: checked::set_str_move::<A>,
            remove_int: checked::remove_int::<A>,
            remove_str: checked::remove_str::<A>,
            append: checked::append::<A>,
            append_move: checked::append_move::<A>,
            pop: checked::pop::<A>,
            pre_sort: checked::pre_sort::<A>,
            post_sort: checked::post_sort::<A>,
            set_legacy: checked::set_legacy::<A>,
        }
    }

    #[cfg(not(debug_assertions))]
    pub fn for_impl<A: BespokeArrayImpl>() -> LayoutFunctions {
        LayoutFunctions {
            heap_size: A::heap_size,
            scan: A::scan,
            escalate_to_vanilla: A::escalate_to_vanilla,
            convert_to_uncounted: A::convert_to_uncounted,
            release_uncounted: A::release_uncounted,
            release: A::release,
            is_vector_data: A::is_vector_data,
            size: A::size,
            get_int: A::get_int,
            get_str: A::get_str,
            get_key: A::get_key,
            get_val: A::get_val,
            get_int_pos: A::get_int_pos,
            get_str_pos: A::get_str_pos,
            iter_begin: A::iter_begin,
            iter_last: A::iter_last,
            iter_end: A::iter_end,
            iter_advance: A::iter_advance,
            iter_rewind: A::iter_rewind,
            lval_int: A::lval_int,
            lval_str: A::lval_str,
            elem_int: A::elem_int,
            elem_str: A::elem_str,
            set_int: A::set_int,
            set_str: A::set_str,
            set_int_move: A::set_int_move,
            set_str_move: A::set_str_move,
            remove_int: A::remove_int,
            remove_str: A::remove_str,
            append: A::append,
            append_move: A::append_move,
            pop: A::pop,
            pre_sort: A::pre_sort,
            post_sort: A::post_sort,
            set_legacy: A::set_legacy,
        }
    }
}
