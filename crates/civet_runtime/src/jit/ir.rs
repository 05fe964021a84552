//! The slice of the JIT IR builder the layout emitters program against.
//!
//! Layout emission hooks receive an `IrGen` and SSA value handles; they
//! append instructions and hand back the result value, or punt to send the
//! translator down the generic path.

use std::fmt;

use crate::bespoke::{ArrayOp, LayoutIndex};

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct IrValue(pub u32);

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct IrBlock(pub u32);

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum IrType {
    /// A generic value cell.
    Cell,
    Int,
    Str,
    Arr,
    /// An iterator position or element handle.
    Pos,
    Bool,
}

#[derive(Clone, PartialEq, Debug)]
pub enum IrConst {
    Int(i64),
    Bool(bool),
    Str(&'static str),
}

#[derive(Clone, PartialEq, Debug)]
pub enum IrInstr {
    LdConst {
        dst: IrValue,
        value: IrConst,
    },
    /// Non-virtual call to one layout's vtable entry.
    CallLayoutDirect {
        dst: IrValue,
        layout: LayoutIndex,
        op: ArrayOp,
        args: Vec<IrValue>,
        taken: Option<IrBlock>,
    },
    /// Dispatch through the vtable the array carries at runtime.
    CallLayoutVirtual {
        dst: IrValue,
        op: ArrayOp,
        args: Vec<IrValue>,
        taken: Option<IrBlock>,
    },
    /// Masked compare of the array's 16-bit layout field against an aligned
    /// index block; branches to `taken` on mismatch.
    CheckLayoutBlock {
        arr: IrValue,
        base: u16,
        mask: u16,
        taken: IrBlock,
    },
}

/// Emission declined; the translator falls back to the generic path.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Punt {
    reason: &'static str,
}

impl Punt {
    pub fn reason(&self) -> &'static str {
        self.reason
    }
}

impl fmt::Display for Punt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "punt: {}", self.reason)
    }
}

pub type EmitResult = Result<IrValue, Punt>;

pub fn punt<T>(reason: &'static str) -> Result<T, Punt> {
    Err(Punt { reason })
}

/// Accumulates emitted instructions for one translation region.
#[derive(Default)]
pub struct IrGen {
    instrs: Vec<IrInstr>,
    types: Vec<IrType>,
    blocks: u32,
}

impl IrGen {
    pub fn new() -> IrGen {
        IrGen::default()
    }

    fn alloc(&mut self, ty: IrType) -> IrValue {
        let value = IrValue(self.types.len() as u32);
        self.types.push(ty);
        value
    }

    /// A value defined outside the emitted region (e.g. a guarded array).
    pub fn param(&mut self, ty: IrType) -> IrValue {
        self.alloc(ty)
    }

    pub fn block(&mut self) -> IrBlock {
        let block = IrBlock(self.blocks);
        self.blocks += 1;
        block
    }

    pub fn type_of(&self, value: IrValue) -> IrType {
        self.types[value.0 as usize]
    }

    pub fn cns_int(&mut self, value: i64) -> IrValue {
        let dst = self.alloc(IrType::Int);
        self.instrs.push(IrInstr::LdConst {
            dst,
            value: IrConst::Int(value),
        });
        dst
    }

    pub fn cns_bool(&mut self, value: bool) -> IrValue {
        let dst = self.alloc(IrType::Bool);
        self.instrs.push(IrInstr::LdConst {
            dst,
            value: IrConst::Bool(value),
        });
        dst
    }

    pub fn cns_str(&mut self, value: &'static str) -> IrValue {
        let dst = self.alloc(IrType::Str);
        self.instrs.push(IrInstr::LdConst {
            dst,
            value: IrConst::Str(value),
        });
        dst
    }

    pub fn call_layout_direct(
        &mut self,
        layout: LayoutIndex,
        op: ArrayOp,
        args: &[IrValue],
        taken: Option<IrBlock>,
        ret: IrType,
    ) -> IrValue {
        let dst = self.alloc(ret);
        self.instrs.push(IrInstr::CallLayoutDirect {
            dst,
            layout,
            op,
            args: args.to_vec(),
            taken,
        });
        dst
    }

    pub fn call_layout_virtual(
        &mut self,
        op: ArrayOp,
        args: &[IrValue],
        taken: Option<IrBlock>,
        ret: IrType,
    ) -> IrValue {
        let dst = self.alloc(ret);
        self.instrs.push(IrInstr::CallLayoutVirtual {
            dst,
            op,
            args: args.to_vec(),
            taken,
        });
        dst
    }

    /// Type check against every layout in the aligned block starting at
    /// `base`. With power-of-two blocks this is one masked compare.
    pub fn check_layout_block(
        &mut self,
        arr: IrValue,
        base: LayoutIndex,
        block_size: u16,
        taken: IrBlock,
    ) {
        self.instrs.push(IrInstr::CheckLayoutBlock {
            arr,
            base: base.to_extra(),
            mask: crate::bespoke::layout::block_mask(block_size),
            taken,
        });
    }

    pub fn instrs(&self) -> &[IrInstr] {
        &self.instrs
    }
}
