//! Per-sink profiles: what kinds of arrays a consuming bytecode site sees.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use once_cell::sync::Lazy;

use civet_utils::ShardedMap;

use crate::arrays::{ArrayData, ArrayKind};
use crate::value::{DataType, KeyTypes, SrcKey, ValueTypes};

use super::logging_array::LoggingArray;
use super::logging_profile::acquire_read_gate;

pub type TransId = u32;

/// A sink is a (translation, canonical source key) pair: the same bytecode
/// can behave differently across retranslations.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct SinkKey {
    pub trans: TransId,
    pub sk: SrcKey,
}

/// Value-type histogram slots: one per base datatype (monotype arrays),
/// plus Empty and Any.
pub const NO_VAL_SLOT: usize = DataType::NUM_BASE;
pub const ANY_VAL_SLOT: usize = DataType::NUM_BASE + 1;
pub const NUM_VAL_SLOTS: usize = DataType::NUM_BASE + 2;

pub fn val_slot_name(slot: usize) -> &'static str {
    match slot {
        NO_VAL_SLOT => "Empty",
        ANY_VAL_SLOT => "Any",
        _ => DataType::from_raw(slot as u8).name(),
    }
}

pub struct SinkProfile {
    pub sink: SinkKey,
    pub arr_counts: [AtomicU64; ArrayKind::NUM_SHAPES],
    pub key_counts: [AtomicU64; KeyTypes::COUNT],
    pub val_counts: [AtomicU64; NUM_VAL_SLOTS],
    /// Contributing sources, at source-key granularity.
    pub sources: ShardedMap<SrcKey, u64>,
    pub sampled_count: AtomicU64,
    pub unsampled_count: AtomicU64,
}

impl SinkProfile {
    pub fn new(sink: SinkKey) -> SinkProfile {
        SinkProfile {
            sink,
            arr_counts: std::array::from_fn(|_| AtomicU64::new(0)),
            key_counts: std::array::from_fn(|_| AtomicU64::new(0)),
            val_counts: std::array::from_fn(|_| AtomicU64::new(0)),
            sources: ShardedMap::new(),
            sampled_count: AtomicU64::new(0),
            unsampled_count: AtomicU64::new(0),
        }
    }

    /// Record one observed array.
    pub fn update(&self, ad: &ArrayData) {
        let Some(_gate) = acquire_read_gate() else {
            return;
        };

        // Bespoke arrays that are not the logging shim already won
        // specialization; count the shape and move on.
        let lad = if ad.is_vanilla() {
            None
        } else if ad.layout_index() == Some(LoggingArray::layout_index()) {
            Some(LoggingArray::as_logging(ad))
        } else {
            self.unsampled_count.fetch_add(1, Ordering::Relaxed);
            self.arr_counts[ad.kind().shape_slot()].fetch_add(1, Ordering::Relaxed);
            return;
        };

        if lad.is_some() || ad.is_sampled() {
            self.sampled_count.fetch_add(1, Ordering::Relaxed);
        } else {
            self.unsampled_count.fetch_add(1, Ordering::Relaxed);
        }
        self.arr_counts[ad.kind().shape_slot()].fetch_add(1, Ordering::Relaxed);

        let Some(lad) = lad else {
            return;
        };

        let et = lad.entry_types();
        let key_slot = et.key_types as usize;
        let val_slot = match et.value_types {
            ValueTypes::Empty => NO_VAL_SLOT,
            ValueTypes::Monotype => et.value_datatype.base_index(),
            ValueTypes::Any => ANY_VAL_SLOT,
        };
        self.key_counts[key_slot].fetch_add(1, Ordering::Relaxed);
        self.val_counts[val_slot].fetch_add(1, Ordering::Relaxed);

        self.sources.update(lad.profile().source, || 0, |c| *c += 1);
    }

    /// Merge a per-thread profile into this one before export.
    pub fn reduce(&self, other: &SinkProfile) {
        for (mine, theirs) in self.arr_counts.iter().zip(other.arr_counts.iter()) {
            mine.fetch_add(theirs.load(Ordering::Relaxed), Ordering::Relaxed);
        }
        for (mine, theirs) in self.key_counts.iter().zip(other.key_counts.iter()) {
            mine.fetch_add(theirs.load(Ordering::Relaxed), Ordering::Relaxed);
        }
        for (mine, theirs) in self.val_counts.iter().zip(other.val_counts.iter()) {
            mine.fetch_add(theirs.load(Ordering::Relaxed), Ordering::Relaxed);
        }
        self.sampled_count
            .fetch_add(other.sampled_count.load(Ordering::Relaxed), Ordering::Relaxed);
        self.unsampled_count
            .fetch_add(other.unsampled_count.load(Ordering::Relaxed), Ordering::Relaxed);
        other
            .sources
            .for_each(|sk, count| self.sources.update(*sk, || 0, |c| *c += count));
    }

    pub fn weight(&self) -> u64 {
        self.sampled_count.load(Ordering::Relaxed) + self.unsampled_count.load(Ordering::Relaxed)
    }
}

//////////////////////////////////////////////////////////////////////////////

static SINKS: Lazy<ShardedMap<SinkKey, Arc<SinkProfile>>> = Lazy::new(ShardedMap::new);

/// The sink profile for (`trans`, `sk`), created on first use. Returns
/// `None` for invalid keys and for new sinks once export has started.
pub fn get_sink_profile(trans: TransId, sk: SrcKey) -> Option<Arc<SinkProfile>> {
    if !sk.valid() {
        return None;
    }
    let key = SinkKey {
        trans,
        sk: sk.canonical(),
    };

    if let Some(profile) = SINKS.get(&key) {
        return Some(profile);
    }

    let _gate = acquire_read_gate()?;
    let (winner, _) = SINKS.insert_if_absent(key, Arc::new(SinkProfile::new(key)));
    Some(winner)
}

pub(crate) fn sinks_snapshot() -> Vec<(SinkKey, Arc<SinkProfile>)> {
    SINKS.snapshot()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrays::ArrayData;
    use crate::value::{register_func, OpCode, ResumeMode, TypedValue};

    #[test]
    fn test_reduce_merges_counts() {
        let func = register_func("sink_reduce", vec![OpCode::GetElem]);
        let key = SinkKey {
            trans: 1,
            sk: SrcKey::new(func, 0, ResumeMode::None),
        };
        let a = SinkProfile::new(key);
        let b = SinkProfile::new(key);

        let vanilla = ArrayData::new_vec(vec![TypedValue::Int(1)]);
        for _ in 0..3 {
            a.update(&vanilla);
        }
        for _ in 0..5 {
            b.update(&vanilla);
        }
        b.sources.update(key.sk, || 0, |c| *c += 2);

        a.reduce(&b);
        assert_eq!(a.unsampled_count.load(Ordering::Relaxed), 8);
        assert_eq!(a.sampled_count.load(Ordering::Relaxed), 0);
        assert_eq!(
            a.arr_counts[ArrayKind::Vec.shape_slot()].load(Ordering::Relaxed),
            8
        );
        assert_eq!(a.sources.get(&key.sk), Some(2));
        assert_eq!(a.weight(), 8);
    }

    #[test]
    fn test_sampled_flag_counts_as_sampled() {
        let func = register_func("sink_sampled", vec![OpCode::GetElem]);
        let key = SinkKey {
            trans: 2,
            sk: SrcKey::new(func, 0, ResumeMode::None),
        };
        let profile = SinkProfile::new(key);

        let vanilla = ArrayData::new_vec(vec![TypedValue::Int(1)]);
        let sampled = ArrayData::to_sampled(&vanilla);
        profile.update(&sampled);
        profile.update(&vanilla);

        assert_eq!(profile.sampled_count.load(Ordering::Relaxed), 1);
        assert_eq!(profile.unsampled_count.load(Ordering::Relaxed), 1);
    }
}
