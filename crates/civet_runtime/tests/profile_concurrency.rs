//! Concurrency properties of the source profile table.

use std::sync::Arc;

use civet_runtime::bespoke::{get_logging_profile, ArrayOp, EventKey};
use civet_runtime::value::{register_func, OpCode, ResumeMode, SrcKey};

const THREADS: usize = 10;
const EVENTS_PER_THREAD: usize = 2000;

#[test]
fn concurrent_log_events_lose_nothing() {
    civet_utils::logger::init_logging();

    let func = register_func("hot_loop", vec![OpCode::NewDict, OpCode::GetElem, OpCode::Ret]);
    let sk = SrcKey::new(func, 0, ResumeMode::None);
    let profile = get_logging_profile(sk).expect("profiling enabled");

    // A finite universe of (op, key) pairs.
    let ops = [ArrayOp::Get, ArrayOp::Set, ArrayOp::Remove];
    let keys = 0..8i64;

    let mut handles = Vec::new();
    for t in 0..THREADS {
        let profile = Arc::clone(&profile);
        handles.push(std::thread::spawn(move || {
            let mut state = (t as u64 + 1) * 0x9e3779b97f4a7c15;
            for _ in 0..EVENTS_PER_THREAD {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                let op = ops[(state % 3) as usize];
                let k = ((state >> 8) % 8) as i64;
                match op {
                    ArrayOp::Set => {
                        profile.log_event_int_val(op, k, &civet_runtime::TypedValue::Int(1))
                    }
                    _ => profile.log_event_int(op, k),
                }
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    // No event was dropped or double counted.
    let mut total = 0u64;
    profile.events.for_each(|_, count| total += count);
    assert_eq!(total, (THREADS * EVENTS_PER_THREAD) as u64);

    // Every key in the table decodes back into the universe.
    profile.events.for_each(|(sink, bits), _| {
        assert!(!sink.valid(), "no VM frame was live");
        let event = EventKey::from_bits(*bits);
        assert!(ops.contains(&event.op()));
        let rendered = event.render();
        let in_universe = keys
            .clone()
            .any(|k| rendered.contains(&format!("key=[i8:{k}]")));
        assert!(in_universe, "unexpected event {rendered}");
    });
}

#[test]
fn same_source_resolves_to_one_profile() {
    let func = register_func("one_profile", vec![OpCode::NewVec]);
    let sk = SrcKey::new(func, 0, ResumeMode::None);

    let mut handles = Vec::new();
    for _ in 0..8 {
        handles.push(std::thread::spawn(move || {
            get_logging_profile(sk).map(|p| Arc::as_ptr(&p) as usize)
        }));
    }
    let ptrs: Vec<usize> = handles
        .into_iter()
        .map(|h| h.join().unwrap().expect("profile created"))
        .collect();
    assert!(ptrs.windows(2).all(|w| w[0] == w[1]));

    // Generator and plain resume modes canonicalize to the same profile.
    let resumed = SrcKey::new(func, 0, ResumeMode::GenIter);
    let a = get_logging_profile(resumed).unwrap();
    assert_eq!(Arc::as_ptr(&a) as usize, ptrs[0]);
}
