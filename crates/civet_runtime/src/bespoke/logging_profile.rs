//! Per-source logging profiles and the export gate.
//!
//! Every mutation of the profile tables holds the read side of the export
//! gate and checks the started flag under it, so once the exporter has held
//! the write side no mutation can still be in flight. After the flag flips,
//! lookups of existing profiles still succeed but nothing new is created and
//! no event is recorded.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock, RwLockReadGuard};

use civet_utils::ShardedMap;

use crate::arrays::{ArrayData, ArrayRef};
use crate::value::{EntryTypes, OpCode, SrcKey, StringVal, TypedValue};
use crate::vm;

use super::event_key::{ArrayOp, EventKey};
use super::logging_array::LoggingArray;

//////////////////////////////////////////////////////////////////////////////
// Export gate.

static EXPORT_GATE: Lazy<RwLock<()>> = Lazy::new(|| RwLock::new(()));
static EXPORT_STARTED: AtomicBool = AtomicBool::new(false);

/// Take the read side of the gate; `None` once export has started. Hold the
/// guard for the duration of the mutation.
pub(crate) fn acquire_read_gate() -> Option<RwLockReadGuard<'static, ()>> {
    let guard = EXPORT_GATE.read();
    if EXPORT_STARTED.load(Ordering::Relaxed) {
        return None;
    }
    Some(guard)
}

/// Flip the started flag under the write lock. Returns false if export had
/// already begun. Once the write lock has been held, no writer can still be
/// inside its critical section.
pub(crate) fn begin_export() -> bool {
    let _guard = EXPORT_GATE.write();
    !EXPORT_STARTED.swap(true, Ordering::Relaxed)
}

pub(crate) fn export_started() -> bool {
    EXPORT_STARTED.load(Ordering::Relaxed)
}

//////////////////////////////////////////////////////////////////////////////

/// Profile of one array-allocation source.
pub struct LoggingProfile {
    pub source: SrcKey,
    /// (sink, packed event key) -> count.
    pub events: ShardedMap<(SrcKey, u64), u64>,
    /// (entry types before, after) -> count.
    pub entry_type_events: ShardedMap<(u16, u16), u64>,
    /// Logging arrays handed out for this source.
    pub logging_arrays_emitted: AtomicU64,
    /// Allocations observed at this source, sampled or not.
    pub sample_count: AtomicU64,
    /// Retained templates for literal sources. Mutexes so a lost insert race
    /// can tear them down again.
    pub static_logging_array: Mutex<Option<ArrayRef>>,
    pub static_sampled_array: Mutex<Option<ArrayRef>>,
}

impl LoggingProfile {
    pub fn new(source: SrcKey) -> LoggingProfile {
        LoggingProfile {
            source,
            events: ShardedMap::new(),
            entry_type_events: ShardedMap::new(),
            logging_arrays_emitted: AtomicU64::new(0),
            sample_count: AtomicU64::new(0),
            static_logging_array: Mutex::new(None),
            static_sampled_array: Mutex::new(None),
        }
    }

    pub fn total_events(&self) -> u64 {
        let mut total = 0;
        self.events.for_each(|_, count| total += count);
        total
    }

    pub fn sample_count_multiplier(&self) -> f64 {
        let emitted = self.logging_arrays_emitted.load(Ordering::Relaxed);
        if emitted == 0 {
            return 0.0;
        }
        self.sample_count.load(Ordering::Relaxed) as f64 / emitted as f64
    }

    /// How much signal this source carries: observed events scaled back up
    /// by the sampling ratio.
    pub fn profile_weight(&self) -> f64 {
        self.total_events() as f64 * self.sample_count_multiplier()
    }

    pub fn log_event(&self, op: ArrayOp) {
        self.log_event_impl(EventKey::new(op));
    }

    pub fn log_event_int(&self, op: ArrayOp, k: i64) {
        self.log_event_impl(EventKey::with_int_key(op, k));
    }

    pub fn log_event_str(&self, op: ArrayOp, k: &StringVal) {
        self.log_event_impl(EventKey::with_str_key(op, k));
    }

    pub fn log_event_val(&self, op: ArrayOp, v: &TypedValue) {
        self.log_event_impl(EventKey::with_val(op, v));
    }

    pub fn log_event_int_val(&self, op: ArrayOp, k: i64, v: &TypedValue) {
        self.log_event_impl(EventKey::with_int_key_val(op, k, v));
    }

    pub fn log_event_str_val(&self, op: ArrayOp, k: &StringVal, v: &TypedValue) {
        self.log_event_impl(EventKey::with_str_key_val(op, k, v));
    }

    fn log_event_impl(&self, event: EventKey) {
        let Some(_gate) = acquire_read_gate() else {
            return;
        };

        // Uncounted release can run outside any frame; attribute it to the
        // empty sink rather than whatever the anchor happens to hold.
        let sink = if event.op() == ArrayOp::ReleaseUncounted {
            SrcKey::empty()
        } else {
            vm::current_srckey()
        };

        let count = self.events.update((sink, event.to_bits()), || 0, |c| {
            *c += 1;
            *c
        });
        tracing::trace!(
            source = %self.source.symbol(),
            event = %event.render(),
            count,
            "array event"
        );
    }

    pub fn log_entry_types(&self, before: EntryTypes, after: EntryTypes) {
        let Some(_gate) = acquire_read_gate() else {
            return;
        };
        let count = self
            .entry_type_events
            .update((before.as_u16(), after.as_u16()), || 0, |c| {
                *c += 1;
                *c
            });
        tracing::trace!(%before, %after, count, "entry type transition");
    }

    fn release_static_arrays(&self) {
        // Reverse construction order, kind to a bump allocator.
        let sampled = self.static_sampled_array.lock().take();
        drop(sampled);
        let logging = self.static_logging_array.lock().take();
        drop(logging);
    }

    pub fn static_logging_array(&self) -> Option<ArrayRef> {
        self.static_logging_array.lock().clone()
    }

    pub fn static_sampled_array(&self) -> Option<ArrayRef> {
        self.static_sampled_array.lock().clone()
    }
}

//////////////////////////////////////////////////////////////////////////////

static PROFILES: Lazy<ShardedMap<SrcKey, Arc<LoggingProfile>>> = Lazy::new(ShardedMap::new);

fn should_log_at_srckey(sk: SrcKey) -> bool {
    if !sk.valid() {
        tracing::trace!("skipping profile for invalid source key");
        return false;
    }
    // Array literals consumed by a type-structure test never benefit from a
    // bespoke layout; the test is a datatype check on the value.
    if let Some(op) = sk.op() {
        if op.is_array_literal() && sk.advanced().op() == Some(OpCode::IsTypeStruct) {
            tracing::trace!("skipping literal used for a type-structure test");
            return false;
        }
    }
    true
}

/// The profile for `sk`, created on first use. Returns `None` for sources
/// that should not be logged and for new sources once export has started.
pub fn get_logging_profile(sk: SrcKey) -> Option<Arc<LoggingProfile>> {
    if !should_log_at_srckey(sk) {
        return None;
    }
    let sk = sk.canonical();

    if let Some(profile) = PROFILES.get(&sk) {
        return Some(profile);
    }

    let _gate = acquire_read_gate()?;

    let profile = Arc::new(LoggingProfile::new(sk));
    if let Some(literal) = vm::literal_at(sk) {
        let logging = LoggingArray::wrap_static(&literal, Arc::clone(&profile));
        *profile.static_logging_array.lock() = Some(logging);
        *profile.static_sampled_array.lock() = Some(ArrayData::to_sampled(&literal));
    }

    let (winner, won) = PROFILES.insert_if_absent(sk, Arc::clone(&profile));
    if !won {
        profile.release_static_arrays();
    }
    Some(winner)
}

/// Profile already registered for `sk`, without creating one.
pub fn peek_logging_profile(sk: SrcKey) -> Option<Arc<LoggingProfile>> {
    PROFILES.get(&sk.canonical())
}

pub(crate) fn profiles_snapshot() -> Vec<(SrcKey, Arc<LoggingProfile>)> {
    PROFILES.snapshot()
}
