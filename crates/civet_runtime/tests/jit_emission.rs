//! Emission defaults: concrete layouts call their vtable entries directly,
//! abstract layouts dispatch through the array's runtime vtable, and the
//! mutating hooks punt unless a layout overrides them.

use civet_runtime::bespoke::ArrayOp;
use civet_runtime::jit::{BespokeLayout, IrConst, IrGen, IrInstr, IrType};

#[test]
fn concrete_layout_emits_direct_get() {
    let logging = BespokeLayout::logging();
    let mut gen = IrGen::new();
    let arr = gen.param(IrType::Arr);
    let key = gen.param(IrType::Int);
    let taken = gen.block();

    let result = logging.emit_get(&mut gen, arr, key, taken).unwrap();

    match gen.instrs() {
        [IrInstr::CallLayoutDirect {
            dst,
            layout,
            op,
            args,
            taken: Some(t),
        }] => {
            assert_eq!(*dst, result);
            assert_eq!(*layout, logging.index());
            assert_eq!(*op, ArrayOp::Get);
            assert_eq!(args.as_slice(), &[arr, key]);
            assert_eq!(*t, taken);
        }
        other => panic!("unexpected ir: {other:?}"),
    }
}

#[test]
fn abstract_layout_emits_virtual_get() {
    let top = BespokeLayout::top();
    let mut gen = IrGen::new();
    let arr = gen.param(IrType::Arr);
    let key = gen.param(IrType::Str);
    let taken = gen.block();

    let _ = top.emit_get(&mut gen, arr, key, taken).unwrap();

    assert!(matches!(
        gen.instrs(),
        [IrInstr::CallLayoutVirtual {
            op: ArrayOp::Get,
            ..
        }]
    ));
}

#[test]
fn untyped_key_punts() {
    let logging = BespokeLayout::logging();
    let mut gen = IrGen::new();
    let arr = gen.param(IrType::Arr);
    let key = gen.param(IrType::Cell);
    let taken = gen.block();

    let punt = logging.emit_get(&mut gen, arr, key, taken).unwrap_err();
    assert!(punt.reason().contains("key"));
    assert!(gen.instrs().is_empty());
}

#[test]
fn set_and_append_punt_by_default() {
    let logging = BespokeLayout::logging();
    let top = BespokeLayout::top();
    let mut gen = IrGen::new();
    let arr = gen.param(IrType::Arr);
    let key = gen.param(IrType::Int);
    let val = gen.param(IrType::Cell);

    assert!(logging.emit_set(&mut gen, arr, key, val).is_err());
    assert!(top.emit_set(&mut gen, arr, key, val).is_err());
    assert!(logging.emit_append(&mut gen, arr, val).is_err());
    assert!(logging.emit_iter_pos(&mut gen, arr, key).is_err());
    assert!(gen.instrs().is_empty());
}

#[test]
fn elem_emits_throw_flag_constant() {
    let logging = BespokeLayout::logging();
    let mut gen = IrGen::new();
    let lval = gen.param(IrType::Arr);
    let key = gen.param(IrType::Int);

    let _ = logging.emit_elem(&mut gen, lval, key, true).unwrap();

    match gen.instrs() {
        [IrInstr::LdConst {
            dst,
            value: IrConst::Bool(true),
        }, IrInstr::CallLayoutDirect {
            op: ArrayOp::Elem,
            args,
            taken: None,
            ..
        }] => {
            assert_eq!(args.as_slice(), &[lval, key, *dst]);
        }
        other => panic!("unexpected ir: {other:?}"),
    }
}

#[test]
fn escalate_emits_reason_constant() {
    let logging = BespokeLayout::logging();
    let mut gen = IrGen::new();
    let arr = gen.param(IrType::Arr);

    let _ = logging
        .emit_escalate_to_vanilla(&mut gen, arr, "guard failed")
        .unwrap();

    match gen.instrs() {
        [IrInstr::LdConst {
            dst,
            value: IrConst::Str("guard failed"),
        }, IrInstr::CallLayoutDirect {
            op: ArrayOp::EscalateToVanilla,
            args,
            ..
        }] => {
            assert_eq!(args.as_slice(), &[arr, *dst]);
        }
        other => panic!("unexpected ir: {other:?}"),
    }
}

#[test]
fn iter_elm_is_identity_by_default() {
    let logging = BespokeLayout::logging();
    let mut gen = IrGen::new();
    let arr = gen.param(IrType::Arr);
    let pos = gen.param(IrType::Pos);

    let elm = logging.emit_iter_elm(&mut gen, arr, pos).unwrap();
    assert_eq!(elm, pos);
    assert!(gen.instrs().is_empty());

    let first = logging.emit_iter_first_pos(&mut gen, arr).unwrap();
    assert!(matches!(
        gen.instrs(),
        [IrInstr::CallLayoutDirect {
            op: ArrayOp::IterBegin,
            ..
        }]
    ));
    let advanced = logging.emit_iter_advance_pos(&mut gen, arr, first).unwrap();
    assert_ne!(advanced, first);
}

#[test]
fn layout_checks_compile_to_masked_compares() {
    let logging = BespokeLayout::logging();
    let mut gen = IrGen::new();
    let arr = gen.param(IrType::Arr);
    let taken = gen.block();

    let base = civet_runtime::LayoutIndex::new(16);
    gen.check_layout_block(arr, base, 8, taken);

    match gen.instrs() {
        [IrInstr::CheckLayoutBlock { base: b, mask, .. }] => {
            assert_eq!(*b, base.to_extra());
            // One compare covers the whole aligned block.
            for offset in 0..8u16 {
                let extra = civet_runtime::LayoutIndex::new(16 + offset).to_extra();
                assert_eq!(extra & mask, *b);
            }
            let outside = civet_runtime::LayoutIndex::new(24).to_extra();
            assert_ne!(outside & mask, *b);
        }
        other => panic!("unexpected ir: {other:?}"),
    }

    // The logging layout's own index never aliases into that block.
    assert_ne!(logging.index(), base);
}
