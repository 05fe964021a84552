//! End-to-end: profiles fill up, the hierarchy finalizes, export freezes the
//! tables and writes the report. One test function: export is one-way, so
//! ordering matters.

use std::any::Any;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use civet_config::update_options;
use civet_runtime::arrays::{ArrayData, ArrayKey, ArrayKind, BespokeStore};
use civet_runtime::bespoke::{
    self, export_profiles, get_logging_profile, get_sink_profile, maybe_make_logging_array,
    wait_on_export_profiles, ArrayOp, Layout, LayoutIndex,
};
use civet_runtime::jit::BespokeLayout;
use civet_runtime::value::{register_func, OpCode, ResumeMode, SrcKey, StringVal, TypedValue};

struct OtherLayout {
    index: LayoutIndex,
}

impl Layout for OtherLayout {
    fn index(&self) -> LayoutIndex {
        self.index
    }

    fn describe(&self) -> &str {
        "OtherBespoke"
    }

    fn is_liveable(&self) -> bool {
        true
    }
}

struct OtherStore;

impl BespokeStore for OtherStore {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn clone_box(&self) -> Box<dyn BespokeStore> {
        Box::new(OtherStore)
    }
}

#[test]
fn export_freezes_sorts_and_writes() {
    civet_utils::logger::init_logging();

    let report_path = std::env::temp_dir().join(format!(
        "civet-logging-array-report-{}.txt",
        std::process::id()
    ));
    update_options(|options| {
        options.logging_array_sample_rate = 1;
        options.export_logging_array_data_path = report_path.display().to_string();
    });

    // A layout that already won specialization, registered before the
    // hierarchy seals.
    let top_index = bespoke::top_layout_index();
    let other_index = bespoke::reserve_indices(1);
    bespoke::register_layout(Arc::new(OtherLayout { index: other_index }), &[top_index]);
    bespoke::finalize_hierarchy();

    // The JIT-facing handle agrees with the sealed lattice.
    let top = BespokeLayout::top();
    let logging = BespokeLayout::logging();
    let other = BespokeLayout::from_index(other_index).unwrap();
    assert!(logging.le(&top));
    assert!(!top.le(&logging));
    assert_eq!(logging.join(&other), top);
    assert_eq!(logging.meet(&top), Some(logging.clone()));
    assert_eq!(logging.liveable_ancestor(), logging);

    // S4: one source, 1000 Get events from 10 threads.
    let src_func = register_func("s4_source", vec![OpCode::NewDict, OpCode::Ret]);
    let src_key = SrcKey::new(src_func, 0, ResumeMode::None);
    let profile = get_logging_profile(src_key).expect("profiling enabled");
    let mut handles = Vec::new();
    for _ in 0..10 {
        let profile = Arc::clone(&profile);
        handles.push(std::thread::spawn(move || {
            for _ in 0..100 {
                profile.log_event_int(ArrayOp::Get, 1);
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(profile.total_events(), 1000);

    // S6: one sink seeing 300 vanilla arrays, 200 logging shims with int
    // keys and string values, and 100 arrays of the other bespoke layout.
    let sink_func = register_func("s6_sink", vec![OpCode::GetElem]);
    let sink_key = SrcKey::new(sink_func, 0, ResumeMode::None);
    let sink = get_sink_profile(7, sink_key).expect("sink profiling enabled");

    let vanilla = ArrayData::new_dict(vec![(ArrayKey::Int(0), TypedValue::Int(1))]);
    for _ in 0..300 {
        sink.update(&vanilla);
    }

    let alloc_func = register_func("s6_alloc", vec![OpCode::NewDict]);
    let alloc_key = SrcKey::new(alloc_func, 0, ResumeMode::None);
    let shim_delegate = ArrayData::new_dict(vec![(
        ArrayKey::Int(0),
        TypedValue::Str(StringVal::new_static("v")),
    )]);
    let shim = maybe_make_logging_array(shim_delegate, alloc_key);
    assert!(!shim.is_vanilla(), "sample rate 1 wraps every allocation");
    for _ in 0..200 {
        sink.update(&shim);
    }

    let foreign = ArrayData::new_bespoke(ArrayKind::BespokeDict, other_index, Box::new(OtherStore));
    for _ in 0..100 {
        sink.update(&foreign);
    }

    assert_eq!(sink.sampled_count.load(Ordering::Relaxed), 200);
    assert_eq!(sink.unsampled_count.load(Ordering::Relaxed), 400);
    // All 600 arrays share the Dict shape; only the shims contribute key and
    // value histograms.
    let dict_slot = ArrayKind::Dict.shape_slot();
    assert_eq!(sink.arr_counts[dict_slot].load(Ordering::Relaxed), 600);
    let ints_slot = civet_runtime::value::KeyTypes::Ints as usize;
    assert_eq!(sink.key_counts[ints_slot].load(Ordering::Relaxed), 200);
    let str_slot = civet_runtime::value::DataType::STR.base_index();
    assert_eq!(sink.val_counts[str_slot].load(Ordering::Relaxed), 200);
    assert_eq!(sink.sources.len(), 1);

    // Freeze and export.
    export_profiles();
    wait_on_export_profiles();

    // S5: no new profiles after the gate flips; existing ones stop counting.
    let late_func = register_func("too_late", vec![OpCode::NewVec]);
    let late_key = SrcKey::new(late_func, 0, ResumeMode::None);
    assert!(get_logging_profile(late_key).is_none());
    assert!(bespoke::peek_logging_profile(late_key).is_none());
    assert!(get_sink_profile(9, late_key).is_none());

    profile.log_event_int(ArrayOp::Get, 1);
    assert_eq!(profile.total_events(), 1000);
    sink.update(&vanilla);
    assert_eq!(sink.unsampled_count.load(Ordering::Relaxed), 400);

    // The report holds what the spec promises.
    let report = std::fs::read_to_string(&report_path).expect("report written");
    assert!(report.contains("Sources:"));
    assert!(report.contains("Sinks:"));
    assert!(report.contains("s4_source() @ 0"));
    assert!(report.contains("1000x Get key=[i8:1]"));
    assert!(report.contains("bc 0: NewDict"));
    assert!(report.contains("1000 reads, 0 writes, 1 distinct sinks"));
    assert!(report.contains("s6_sink() @ 0 [200/600 sampled]"));
    assert!(report.contains("600x Dict"));
    assert!(report.contains("200x Ints"));
    assert!(report.contains("200x Str"));

    // Counts are six-column right-aligned.
    assert!(report.contains("    1000x Get key=[i8:1]"));
    assert!(report.contains("     600x Dict"));

    let _ = std::fs::remove_file(&report_path);
}
