//! JIT integration: the IR contract the layout emitters target and the
//! layout handle the translator manipulates.

pub mod ir;

use std::fmt;
use std::sync::Arc;

use crate::bespoke::{self, Layout, LayoutIndex};

pub use ir::{punt, EmitResult, IrBlock, IrConst, IrGen, IrInstr, IrType, IrValue, Punt};

/// A cheap handle on one bespoke layout, as the JIT's type system sees it.
#[derive(Clone)]
pub struct BespokeLayout {
    layout: Arc<dyn Layout>,
}

impl BespokeLayout {
    pub fn from_index(index: LayoutIndex) -> Option<BespokeLayout> {
        bespoke::from_index(index).map(|layout| BespokeLayout { layout })
    }

    pub fn top() -> BespokeLayout {
        Self::from_index(bespoke::top_layout_index()).expect("top layout registered at startup")
    }

    pub fn logging() -> BespokeLayout {
        Self::from_index(bespoke::logging_layout_index())
            .expect("logging layout registered at startup")
    }

    pub fn index(&self) -> LayoutIndex {
        self.layout.index()
    }

    pub fn describe(&self) -> String {
        self.layout.describe().to_owned()
    }

    pub fn is_concrete(&self) -> bool {
        self.layout.is_concrete()
    }

    pub fn le(&self, other: &BespokeLayout) -> bool {
        bespoke::layout_le(self.index(), other.index())
    }

    pub fn join(&self, other: &BespokeLayout) -> BespokeLayout {
        let index = bespoke::layout_join(self.index(), other.index());
        Self::from_index(index).expect("join of registered layouts is registered")
    }

    pub fn meet(&self, other: &BespokeLayout) -> Option<BespokeLayout> {
        let index = bespoke::layout_meet(self.index(), other.index())?;
        Self::from_index(index)
    }

    pub fn liveable_ancestor(&self) -> BespokeLayout {
        let index = bespoke::liveable_ancestor(self.index());
        Self::from_index(index).expect("liveable ancestor is registered")
    }

    //////////////////////////////////////////////////////////////////////
    // Emission surface. `arr` is guaranteed by the JIT's guards to belong
    // to this layout's class, and `key` to fit the array's shape.

    pub fn emit_get(
        &self,
        gen: &mut IrGen,
        arr: IrValue,
        key: IrValue,
        taken: IrBlock,
    ) -> EmitResult {
        self.layout.emit_get(gen, arr, key, taken)
    }

    pub fn emit_elem(
        &self,
        gen: &mut IrGen,
        lval: IrValue,
        key: IrValue,
        throw_on_missing: bool,
    ) -> EmitResult {
        self.layout.emit_elem(gen, lval, key, throw_on_missing)
    }

    pub fn emit_set(
        &self,
        gen: &mut IrGen,
        arr: IrValue,
        key: IrValue,
        val: IrValue,
    ) -> EmitResult {
        self.layout.emit_set(gen, arr, key, val)
    }

    pub fn emit_append(&self, gen: &mut IrGen, arr: IrValue, val: IrValue) -> EmitResult {
        self.layout.emit_append(gen, arr, val)
    }

    pub fn emit_escalate_to_vanilla(
        &self,
        gen: &mut IrGen,
        arr: IrValue,
        reason: &'static str,
    ) -> EmitResult {
        self.layout.emit_escalate_to_vanilla(gen, arr, reason)
    }

    pub fn emit_iter_first_pos(&self, gen: &mut IrGen, arr: IrValue) -> EmitResult {
        self.layout.emit_iter_first_pos(gen, arr)
    }

    pub fn emit_iter_last_pos(&self, gen: &mut IrGen, arr: IrValue) -> EmitResult {
        self.layout.emit_iter_last_pos(gen, arr)
    }

    pub fn emit_iter_pos(&self, gen: &mut IrGen, arr: IrValue, idx: IrValue) -> EmitResult {
        self.layout.emit_iter_pos(gen, arr, idx)
    }

    pub fn emit_iter_advance_pos(&self, gen: &mut IrGen, arr: IrValue, pos: IrValue) -> EmitResult {
        self.layout.emit_iter_advance_pos(gen, arr, pos)
    }

    pub fn emit_iter_elm(&self, gen: &mut IrGen, arr: IrValue, pos: IrValue) -> EmitResult {
        self.layout.emit_iter_elm(gen, arr, pos)
    }

    pub fn emit_iter_get_key(&self, gen: &mut IrGen, arr: IrValue, elm: IrValue) -> EmitResult {
        self.layout.emit_iter_get_key(gen, arr, elm)
    }

    pub fn emit_iter_get_val(&self, gen: &mut IrGen, arr: IrValue, elm: IrValue) -> EmitResult {
        self.layout.emit_iter_get_val(gen, arr, elm)
    }
}

impl PartialEq for BespokeLayout {
    fn eq(&self, other: &Self) -> bool {
        self.index() == other.index()
    }
}

impl Eq for BespokeLayout {}

impl fmt::Debug for BespokeLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BespokeLayout({})", self.layout.describe())
    }
}
