//! Profile export.
//!
//! Flips the export gate, then sorts and writes the report on a dedicated
//! worker thread. The gate write-lock handshake guarantees no profile
//! mutation is still in flight when the worker starts; the worker itself
//! iterates the frozen tables without holding any lock.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::sync::Arc;
use std::thread::JoinHandle;

use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::arrays::ArrayKind;
use crate::value::{EntryTypes, KeyTypes, SrcKey};

use super::event_key::{ArrayOp, EventKey};
use super::logging_profile::{begin_export, export_started, profiles_snapshot, LoggingProfile};
use super::sink_profile::{sinks_snapshot, val_slot_name, SinkProfile, NUM_VAL_SLOTS};

const RULE: &str =
    "========================================================================";

struct EventOutput {
    event: EventKey,
    count: u64,
}

struct OperationOutput {
    op: ArrayOp,
    total: u64,
    events: Vec<EventOutput>,
}

struct EscalationOutput {
    before: EntryTypes,
    after: EntryTypes,
    count: u64,
}

struct UseOutput {
    state: EntryTypes,
    count: u64,
}

struct SourceOutput {
    profile: Arc<LoggingProfile>,
    read_ops: Vec<OperationOutput>,
    write_ops: Vec<OperationOutput>,
    read_count: u64,
    write_count: u64,
    distinct_sinks: usize,
    escalations: Vec<EscalationOutput>,
    uses: Vec<UseOutput>,
    weight: f64,
}

fn collect_source(profile: Arc<LoggingProfile>) -> SourceOutput {
    // Aggregate events over sinks, and sinks over events.
    let mut event_counts: BTreeMap<u64, u64> = BTreeMap::new();
    let mut sink_counts: BTreeMap<SrcKey, u64> = BTreeMap::new();
    profile.events.for_each(|key, count| {
        let (sink, bits) = *key;
        *event_counts.entry(bits).or_default() += count;
        *sink_counts.entry(sink).or_default() += count;
    });

    // Group by operation, most frequent events first.
    let mut by_op: BTreeMap<ArrayOp, OperationOutput> = BTreeMap::new();
    for (bits, count) in event_counts {
        let event = EventKey::from_bits(bits);
        let entry = by_op.entry(event.op()).or_insert_with(|| OperationOutput {
            op: event.op(),
            total: 0,
            events: Vec::new(),
        });
        entry.total += count;
        entry.events.push(EventOutput { event, count });
    }

    let mut operations: Vec<OperationOutput> = by_op.into_values().collect();
    for operation in &mut operations {
        operation.events.sort_by(|a, b| b.count.cmp(&a.count));
    }
    operations.sort_by(|a, b| b.total.cmp(&a.total));

    let mut read_ops = Vec::new();
    let mut write_ops = Vec::new();
    let mut read_count = 0;
    let mut write_count = 0;
    for operation in operations {
        if operation.op.is_read() {
            read_count += operation.total;
            read_ops.push(operation);
        } else {
            write_count += operation.total;
            write_ops.push(operation);
        }
    }

    // Entry-type transitions: post-image sums are "uses", changed pairs are
    // escalations.
    let mut escalations = Vec::new();
    let mut use_counts: BTreeMap<u16, u64> = BTreeMap::new();
    profile.entry_type_events.for_each(|key, count| {
        let (before, after) = *key;
        if before != after {
            escalations.push(EscalationOutput {
                before: EntryTypes::from_u16(before),
                after: EntryTypes::from_u16(after),
                count: *count,
            });
        }
        *use_counts.entry(after).or_default() += count;
    });
    escalations.sort_by(|a, b| b.count.cmp(&a.count));

    let mut uses: Vec<UseOutput> = use_counts
        .into_iter()
        .map(|(state, count)| UseOutput {
            state: EntryTypes::from_u16(state),
            count,
        })
        .collect();
    uses.sort_by(|a, b| b.count.cmp(&a.count));

    let weight = profile.profile_weight();
    SourceOutput {
        profile,
        read_ops,
        write_ops,
        read_count,
        write_count,
        distinct_sinks: sink_counts.len(),
        escalations,
        uses,
        weight,
    }
}

fn collect_sources() -> Vec<SourceOutput> {
    let mut sources: Vec<SourceOutput> = profiles_snapshot()
        .into_iter()
        .map(|(_, profile)| collect_source(profile))
        .collect();
    sources.sort_by(|a, b| b.weight.total_cmp(&a.weight));
    sources
}

struct TypeCount {
    name: &'static str,
    count: u64,
}

struct SinkOutput {
    profile: Arc<SinkProfile>,
    arr_counts: Vec<TypeCount>,
    key_counts: Vec<TypeCount>,
    val_counts: Vec<TypeCount>,
    sampled: u64,
    weight: u64,
}

fn sorted_counts(
    counts: &[std::sync::atomic::AtomicU64],
    name: impl Fn(usize) -> &'static str,
) -> Vec<TypeCount> {
    let mut out: Vec<TypeCount> = counts
        .iter()
        .enumerate()
        .filter_map(|(slot, count)| {
            let count = count.load(std::sync::atomic::Ordering::Relaxed);
            (count != 0).then(|| TypeCount {
                name: name(slot),
                count,
            })
        })
        .collect();
    out.sort_by(|a, b| b.count.cmp(&a.count));
    out
}

fn collect_sinks() -> Vec<SinkOutput> {
    let mut sinks: Vec<SinkOutput> = sinks_snapshot()
        .into_iter()
        .map(|(_, profile)| {
            let arr_counts = sorted_counts(&profile.arr_counts, ArrayKind::shape_name);
            let key_counts = sorted_counts(&profile.key_counts, |slot| {
                KeyTypes::from_index(slot).map_or("<bad key type>", KeyTypes::name)
            });
            debug_assert_eq!(profile.val_counts.len(), NUM_VAL_SLOTS);
            let val_counts = sorted_counts(&profile.val_counts, val_slot_name);
            let sampled = profile
                .sampled_count
                .load(std::sync::atomic::Ordering::Relaxed);
            let weight = profile.weight();
            SinkOutput {
                profile,
                arr_counts,
                key_counts,
                val_counts,
                sampled,
                weight,
            }
        })
        .collect();
    sinks.sort_by(|a, b| b.weight.cmp(&a.weight));
    sinks
}

fn write_operation_set(w: &mut impl Write, operations: &[OperationOutput]) -> io::Result<()> {
    for operation in operations {
        if let [only] = operation.events.as_slice() {
            // One distinct event for this op; print it at this level.
            writeln!(w, "  {:>6}x {}", only.count, only.event.render())?;
            continue;
        }
        writeln!(w, "  {:>6}x {}", operation.total, operation.op.name())?;
        for event in &operation.events {
            writeln!(w, "        {:>6}x {}", event.count, event.event.render())?;
        }
    }
    Ok(())
}

fn write_type_counts(w: &mut impl Write, label: &str, counts: &[TypeCount]) -> io::Result<()> {
    writeln!(w, "  {label} Type Counts:")?;
    for count in counts {
        writeln!(w, "  {:>6}x {}", count.count, count.name)?;
    }
    Ok(())
}

fn write_sources(w: &mut impl Write, sources: &[SourceOutput]) -> io::Result<()> {
    writeln!(w, "{RULE}")?;
    writeln!(w, "Sources:")?;
    writeln!(w)?;

    for source in sources {
        let profile = &source.profile;
        writeln!(
            w,
            "{} [{}/{} sampled, {:.2} weight]",
            profile.source.symbol(),
            profile
                .logging_arrays_emitted
                .load(std::sync::atomic::Ordering::Relaxed),
            profile.sample_count.load(std::sync::atomic::Ordering::Relaxed),
            source.weight
        )?;
        writeln!(w, "  {}", profile.source.show_inst())?;
        writeln!(
            w,
            "  {} reads, {} writes, {} distinct sinks",
            source.read_count, source.write_count, source.distinct_sinks
        )?;

        writeln!(w, "  Read operations:")?;
        write_operation_set(w, &source.read_ops)?;

        writeln!(w, "  Write operations:")?;
        write_operation_set(w, &source.write_ops)?;

        writeln!(w, "  Entry Type Escalations:")?;
        for esc in &source.escalations {
            writeln!(w, "  {:>6}x {} -> {}", esc.count, esc.before, esc.after)?;
        }

        writeln!(w, "  Entry Type Operations:")?;
        for state_use in &source.uses {
            writeln!(w, "  {:>6}x {}", state_use.count, state_use.state)?;
        }

        writeln!(w)?;
    }
    Ok(())
}

fn write_sinks(w: &mut impl Write, sinks: &[SinkOutput]) -> io::Result<()> {
    writeln!(w, "{RULE}")?;
    writeln!(w, "Sinks:")?;
    writeln!(w)?;

    for sink in sinks {
        let sk = sink.profile.sink.sk;
        writeln!(w, "{} [{}/{} sampled]", sk.symbol(), sink.sampled, sink.weight)?;
        writeln!(w, "  {}", sk.show_inst())?;

        write_type_counts(w, "Array", &sink.arr_counts)?;
        write_type_counts(w, "Key", &sink.key_counts)?;
        write_type_counts(w, "Value", &sink.val_counts)?;

        writeln!(w)?;
    }
    Ok(())
}

fn write_report(path: &str) -> io::Result<()> {
    let sources = collect_sources();
    let sinks = collect_sinks();

    let file = File::create(path)?;
    let mut w = BufWriter::new(file);
    write_sources(&mut w, &sources)?;
    write_sinks(&mut w, &sinks)?;
    w.flush()
}

static EXPORT_THREAD: Lazy<Mutex<Option<JoinHandle<()>>>> = Lazy::new(|| Mutex::new(None));

/// Seal the profile tables and write the report on a dedicated worker.
/// A no-op unless an export path is configured; one-way once it runs.
pub fn export_profiles() {
    let path = civet_config::options().export_logging_array_data_path;
    if path.is_empty() {
        return;
    }

    if !begin_export() {
        return;
    }

    let handle = std::thread::spawn(move || {
        // The runtime is past its reporting window if this fails; there is
        // nobody left to tell.
        if let Err(err) = write_report(&path) {
            tracing::debug!(%err, path, "logging array profile export failed");
        }
    });
    *EXPORT_THREAD.lock() = Some(handle);
}

/// Join the export worker if it was launched.
pub fn wait_on_export_profiles() {
    if !export_started() {
        return;
    }
    let handle = EXPORT_THREAD.lock().take();
    if let Some(handle) = handle {
        let _ = handle.join();
    }
}
