//! VM register anchor and literal pools.
//!
//! The interpreter keeps the current source key in a thread-local register;
//! event logging reads it to attribute an operation to its sink. Outside any
//! frame the anchor degrades to the empty key.

use std::cell::Cell;

use ahash::AHashMap;
use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::arrays::ArrayRef;
use crate::value::SrcKey;

thread_local! {
    static CURRENT_PC: Cell<Option<SrcKey>> = const { Cell::new(None) };
}

/// Point the anchor at `sk` (or clear it with `None`).
pub fn set_current_pc(sk: Option<SrcKey>) {
    CURRENT_PC.with(|pc| pc.set(sk));
}

/// The canonical source key of the executing instruction, or the empty key
/// when no frame is live.
pub fn current_srckey() -> SrcKey {
    CURRENT_PC.with(|pc| pc.get()).map_or_else(SrcKey::empty, SrcKey::canonical)
}

static LITERALS: Lazy<RwLock<AHashMap<SrcKey, ArrayRef>>> =
    Lazy::new(|| RwLock::new(AHashMap::new()));

/// Attach the literal array materialized by the instruction at `sk`.
pub fn register_literal(sk: SrcKey, literal: ArrayRef) {
    LITERALS.write().insert(sk.canonical(), literal);
}

pub fn literal_at(sk: SrcKey) -> Option<ArrayRef> {
    LITERALS.read().get(&sk.canonical()).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{register_func, OpCode, ResumeMode};

    #[test]
    fn test_anchor_round_trip() {
        assert!(!current_srckey().valid());
        let func = register_func("anchor", vec![OpCode::GetElem]);
        let sk = SrcKey::new(func, 0, ResumeMode::Async);
        set_current_pc(Some(sk));
        // The anchor hands out canonical keys.
        assert_eq!(current_srckey(), sk.canonical());
        set_current_pc(None);
        assert!(!current_srckey().valid());
    }
}
