//! The logging shim layout: a concrete bespoke layout whose arrays forward
//! every operation to a wrapped vanilla delegate while recording the
//! operation in the owning source profile.

use std::any::Any;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::arrays::{self, vanilla, ArrayData, ArrayKey, ArrayRef, BespokeStore, Lval, Scanner, SortFunction};
use crate::value::{EntryTypes, SrcKey, StringVal, TypedValue};

use super::event_key::ArrayOp;
use super::layout::{Layout, LayoutIndex};
use super::logging_profile::{get_logging_profile, LoggingProfile};
use super::vtable::{BespokeArrayImpl, LayoutFunctions};

/// Store of one logging array.
pub struct LoggingArray {
    wrapped: ArrayRef,
    profile: Arc<LoggingProfile>,
    entry_types: EntryTypes,
}

impl BespokeStore for LoggingArray {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn clone_box(&self) -> Box<dyn BespokeStore> {
        Box::new(LoggingArray {
            wrapped: self.wrapped.clone(),
            profile: Arc::clone(&self.profile),
            entry_types: self.entry_types,
        })
    }
}

fn entry_types_of(arr: &ArrayRef) -> EntryTypes {
    let mut et = EntryTypes::empty();
    for (key, val) in arr.vanilla_store().iter_live() {
        et = match key {
            ArrayKey::Int(_) => et.observe_int_key(),
            ArrayKey::Str(s) => et.observe_str_key(s.is_static()),
        };
        et = et.observe_value(val.datatype());
    }
    et
}

impl LoggingArray {
    pub fn layout_index() -> LayoutIndex {
        super::logging_layout_index()
    }

    /// The cast validator for the dispatch layer: panics when the array does
    /// not belong to the logging layout.
    pub fn as_logging(ad: &ArrayData) -> &LoggingArray {
        match ad.bespoke_store::<LoggingArray>() {
            Some(store) if ad.layout_index() == Some(Self::layout_index()) => store,
            _ => panic!(
                "logging layout dispatch on a foreign array (kind {:?}, extra {:#06x})",
                ad.kind(),
                ad.extra()
            ),
        }
    }

    /// Wrap a vanilla array for the given source profile.
    pub fn wrap(arr: ArrayRef, profile: Arc<LoggingProfile>) -> ArrayRef {
        assert!(arr.is_vanilla(), "logging arrays wrap vanilla arrays");
        let entry_types = entry_types_of(&arr);
        let kind = arr.kind().bespoke();
        ArrayData::new_bespoke(
            kind,
            Self::layout_index(),
            Box::new(LoggingArray {
                wrapped: arr,
                profile,
                entry_types,
            }),
        )
    }

    /// Template for a literal source; retained by the profile.
    pub fn wrap_static(arr: &ArrayRef, profile: Arc<LoggingProfile>) -> ArrayRef {
        Self::wrap(arr.clone(), profile)
    }

    fn rewrap(&self, wrapped: ArrayRef, entry_types: EntryTypes) -> ArrayRef {
        ArrayData::new_bespoke(
            wrapped.kind().bespoke(),
            Self::layout_index(),
            Box::new(LoggingArray {
                wrapped,
                profile: Arc::clone(&self.profile),
                entry_types,
            }),
        )
    }

    pub fn wrapped(&self) -> &ArrayRef {
        &self.wrapped
    }

    pub fn profile(&self) -> &Arc<LoggingProfile> {
        &self.profile
    }

    pub fn entry_types(&self) -> EntryTypes {
        self.entry_types
    }

    fn mutate(&self, after: EntryTypes, wrapped: ArrayRef) -> ArrayRef {
        self.profile.log_entry_types(self.entry_types, after);
        self.rewrap(wrapped, after)
    }
}

impl BespokeArrayImpl for LoggingArray {
    fn cast(ad: &ArrayData) -> &Self {
        Self::as_logging(ad)
    }

    fn heap_size(ad: &ArrayData) -> usize {
        // Callable from the GC without invariant checks.
        match ad.bespoke_store::<LoggingArray>() {
            Some(lad) => std::mem::size_of::<ArrayData>() + arrays::heap_size(&lad.wrapped),
            None => std::mem::size_of::<ArrayData>(),
        }
    }

    fn scan(ad: &ArrayData, scanner: &mut Scanner) {
        let lad = Self::as_logging(ad);
        lad.profile.log_event(ArrayOp::Scan);
        arrays::scan(&lad.wrapped, scanner)
    }

    fn escalate_to_vanilla(ad: &ArrayRef, reason: &'static str) -> ArrayRef {
        let lad = Self::as_logging(ad);
        lad.profile.log_event(ArrayOp::EscalateToVanilla);
        tracing::trace!(reason, "escalating logging array");
        lad.wrapped.clone()
    }

    fn convert_to_uncounted(ad: &ArrayRef) -> ArrayRef {
        let lad = Self::as_logging(ad);
        lad.profile.log_event(ArrayOp::ConvertToUncounted);
        let uncounted = arrays::convert_to_uncounted(&lad.wrapped);
        lad.rewrap(uncounted, lad.entry_types)
    }

    fn release_uncounted(ad: &ArrayData) {
        Self::as_logging(ad).profile.log_event(ArrayOp::ReleaseUncounted);
    }

    fn release(ad: ArrayRef) {
        Self::as_logging(&ad).profile.log_event(ArrayOp::Release);
        drop(ad);
    }

    fn is_vector_data(ad: &ArrayData) -> bool {
        let lad = Self::as_logging(ad);
        lad.profile.log_event(ArrayOp::IsVectorData);
        arrays::is_vector_data(&lad.wrapped)
    }

    fn size(ad: &ArrayData) -> usize {
        let lad = Self::as_logging(ad);
        lad.profile.log_event(ArrayOp::Size);
        arrays::size(&lad.wrapped)
    }

    fn get_int(ad: &ArrayData, k: i64) -> TypedValue {
        let lad = Self::as_logging(ad);
        lad.profile.log_event_int(ArrayOp::Get, k);
        arrays::get_int(&lad.wrapped, k)
    }

    fn get_str(ad: &ArrayData, k: &StringVal) -> TypedValue {
        let lad = Self::as_logging(ad);
        lad.profile.log_event_str(ArrayOp::Get, k);
        arrays::get_str(&lad.wrapped, k)
    }

    fn get_key(ad: &ArrayData, pos: usize) -> TypedValue {
        let lad = Self::as_logging(ad);
        lad.profile.log_event(ArrayOp::GetKey);
        arrays::get_key(&lad.wrapped, pos)
    }

    fn get_val(ad: &ArrayData, pos: usize) -> TypedValue {
        let lad = Self::as_logging(ad);
        lad.profile.log_event(ArrayOp::GetVal);
        arrays::get_val(&lad.wrapped, pos)
    }

    fn get_int_pos(ad: &ArrayData, k: i64) -> usize {
        let lad = Self::as_logging(ad);
        lad.profile.log_event_int(ArrayOp::GetPos, k);
        arrays::get_int_pos(&lad.wrapped, k)
    }

    fn get_str_pos(ad: &ArrayData, k: &StringVal) -> usize {
        let lad = Self::as_logging(ad);
        lad.profile.log_event_str(ArrayOp::GetPos, k);
        arrays::get_str_pos(&lad.wrapped, k)
    }

    fn iter_begin(ad: &ArrayData) -> usize {
        let lad = Self::as_logging(ad);
        lad.profile.log_event(ArrayOp::IterBegin);
        arrays::iter_begin(&lad.wrapped)
    }

    fn iter_last(ad: &ArrayData) -> usize {
        let lad = Self::as_logging(ad);
        lad.profile.log_event(ArrayOp::IterLast);
        arrays::iter_last(&lad.wrapped)
    }

    fn iter_end(ad: &ArrayData) -> usize {
        let lad = Self::as_logging(ad);
        lad.profile.log_event(ArrayOp::IterEnd);
        arrays::iter_end(&lad.wrapped)
    }

    fn iter_advance(ad: &ArrayData, pos: usize) -> usize {
        let lad = Self::as_logging(ad);
        lad.profile.log_event(ArrayOp::IterAdvance);
        arrays::iter_advance(&lad.wrapped, pos)
    }

    fn iter_rewind(ad: &ArrayData, pos: usize) -> usize {
        let lad = Self::as_logging(ad);
        lad.profile.log_event(ArrayOp::IterRewind);
        arrays::iter_rewind(&lad.wrapped, pos)
    }

    fn lval_int(ad: &ArrayRef, k: i64) -> Lval {
        let lad = Self::as_logging(ad);
        lad.profile.log_event_int(ArrayOp::Lval, k);
        // Handing out an interior pointer forfeits logging; the lval
        // addresses the vanilla delegate.
        arrays::lval_int(&lad.wrapped, k)
    }

    fn lval_str(ad: &ArrayRef, k: &StringVal) -> Lval {
        let lad = Self::as_logging(ad);
        lad.profile.log_event_str(ArrayOp::Lval, k);
        arrays::lval_str(&lad.wrapped, k)
    }

    fn elem_int(ad: &ArrayRef, k: i64, throw_on_missing: bool) -> Option<Lval> {
        let lad = Self::as_logging(ad);
        lad.profile.log_event_int(ArrayOp::Elem, k);
        arrays::elem_int(&lad.wrapped, k, throw_on_missing)
    }

    fn elem_str(ad: &ArrayRef, k: &StringVal, throw_on_missing: bool) -> Option<Lval> {
        let lad = Self::as_logging(ad);
        lad.profile.log_event_str(ArrayOp::Elem, k);
        arrays::elem_str(&lad.wrapped, k, throw_on_missing)
    }

    fn set_int(ad: &ArrayRef, k: i64, v: TypedValue) -> ArrayRef {
        let lad = Self::as_logging(ad);
        lad.profile.log_event_int_val(ArrayOp::Set, k, &v);
        let after = lad.entry_types.observe_int_key().observe_value(v.datatype());
        lad.mutate(after, arrays::set_int(&lad.wrapped, k, v))
    }

    fn set_str(ad: &ArrayRef, k: StringVal, v: TypedValue) -> ArrayRef {
        let lad = Self::as_logging(ad);
        lad.profile.log_event_str_val(ArrayOp::Set, &k, &v);
        let after = lad
            .entry_types
            .observe_str_key(k.is_static())
            .observe_value(v.datatype());
        lad.mutate(after, arrays::set_str(&lad.wrapped, k, v))
    }

    fn set_int_move(ad: ArrayRef, k: i64, v: TypedValue) -> ArrayRef {
        let lad = Self::as_logging(&ad);
        lad.profile.log_event_int_val(ArrayOp::SetMove, k, &v);
        let after = lad.entry_types.observe_int_key().observe_value(v.datatype());
        lad.mutate(after, arrays::set_int(&lad.wrapped, k, v))
    }

    fn set_str_move(ad: ArrayRef, k: StringVal, v: TypedValue) -> ArrayRef {
        let lad = Self::as_logging(&ad);
        lad.profile.log_event_str_val(ArrayOp::SetMove, &k, &v);
        let after = lad
            .entry_types
            .observe_str_key(k.is_static())
            .observe_value(v.datatype());
        lad.mutate(after, arrays::set_str(&lad.wrapped, k, v))
    }

    fn remove_int(ad: &ArrayRef, k: i64) -> ArrayRef {
        let lad = Self::as_logging(ad);
        lad.profile.log_event_int(ArrayOp::Remove, k);
        lad.rewrap(arrays::remove_int(&lad.wrapped, k), lad.entry_types)
    }

    fn remove_str(ad: &ArrayRef, k: &StringVal) -> ArrayRef {
        let lad = Self::as_logging(ad);
        lad.profile.log_event_str(ArrayOp::Remove, k);
        lad.rewrap(arrays::remove_str(&lad.wrapped, k), lad.entry_types)
    }

    fn append(ad: &ArrayRef, v: TypedValue) -> ArrayRef {
        let lad = Self::as_logging(ad);
        lad.profile.log_event_val(ArrayOp::Append, &v);
        let after = lad.entry_types.observe_int_key().observe_value(v.datatype());
        lad.mutate(after, arrays::append(&lad.wrapped, v))
    }

    fn append_move(ad: ArrayRef, v: TypedValue) -> ArrayRef {
        let lad = Self::as_logging(&ad);
        lad.profile.log_event_val(ArrayOp::AppendMove, &v);
        let after = lad.entry_types.observe_int_key().observe_value(v.datatype());
        lad.mutate(after, arrays::append(&lad.wrapped, v))
    }

    fn pop(ad: &ArrayRef) -> (ArrayRef, TypedValue) {
        let lad = Self::as_logging(ad);
        lad.profile.log_event(ArrayOp::Pop);
        let (wrapped, val) = arrays::pop(&lad.wrapped);
        (lad.rewrap(wrapped, lad.entry_types), val)
    }

    fn pre_sort(ad: &ArrayRef, _sf: SortFunction) -> ArrayRef {
        let lad = Self::as_logging(ad);
        lad.profile.log_event(ArrayOp::PreSort);
        lad.wrapped.clone()
    }

    fn post_sort(ad: &ArrayRef, vad: ArrayRef) -> ArrayRef {
        let lad = Self::as_logging(ad);
        lad.profile.log_event(ArrayOp::PostSort);
        let entry_types = entry_types_of(&vad);
        lad.rewrap(vad, entry_types)
    }

    fn set_legacy(ad: &ArrayRef, legacy: bool) -> ArrayRef {
        let lad = Self::as_logging(ad);
        lad.profile.log_event(ArrayOp::SetLegacy);
        lad.rewrap(vanilla::set_legacy(&lad.wrapped, legacy), lad.entry_types)
    }
}

static LOGGING_VTABLE: Lazy<LayoutFunctions> = Lazy::new(LayoutFunctions::for_impl::<LoggingArray>);

/// The concrete layout node for logging arrays.
pub struct LoggingLayout {
    index: LayoutIndex,
}

impl LoggingLayout {
    pub fn new(index: LayoutIndex) -> LoggingLayout {
        LoggingLayout { index }
    }
}

impl Layout for LoggingLayout {
    fn index(&self) -> LayoutIndex {
        self.index
    }

    fn describe(&self) -> &str {
        "Logging"
    }

    fn is_liveable(&self) -> bool {
        true
    }

    fn vtable(&self) -> Option<&'static LayoutFunctions> {
        Some(&LOGGING_VTABLE)
    }
}

/// Allocation-site hook: count the allocation against the source's profile
/// and wrap one in N as a logging array.
pub fn maybe_make_logging_array(ad: ArrayRef, sk: SrcKey) -> ArrayRef {
    let options = civet_config::options();
    if !options.bespoke_enabled || !ad.is_vanilla() {
        return ad;
    }
    let Some(profile) = get_logging_profile(sk) else {
        return ad;
    };

    let seen = profile.sample_count.fetch_add(1, Ordering::Relaxed);
    let rate = options.logging_array_sample_rate.max(1) as u64;
    if seen % rate != 0 {
        // Not chosen for logging; literal sites still hand out the
        // sampled-flagged template so sinks can track the ratio.
        if let Some(sampled) = profile.static_sampled_array() {
            return sampled;
        }
        return ad;
    }

    profile.logging_arrays_emitted.fetch_add(1, Ordering::Relaxed);
    if let Some(logging) = profile.static_logging_array() {
        return logging;
    }
    LoggingArray::wrap(ad, profile)
}
