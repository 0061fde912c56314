#![cfg(test)]
#![allow(clippy::arithmetic_side_effects, clippy::unwrap_used)]

use dexcheck_bytecode::{
    AccessFlags, CodeBuilder, Constant, Instruction, LabelId, Method, MethodBody, Opcode, Proto,
    TypeDesc,
};
use dexcheck_types::{ClassPool, RegType, TypeLattice, TypeTable};
use proptest::prelude::*;

use crate::{
    InstructionIndex, RegisterError, RegisterState, ResultKind, VerifyErrorKind, normalize,
    shape::{Regs, arith, check_structure, shape},
};

fn with_lattice(f: impl FnOnce(&TypeLattice<'_>)) {
    let table = TypeTable::new();
    let pool = ClassPool::new();
    f(&TypeLattice::new(&table, &pool));
}

#[test]
fn test_set_scalar_rejects_wide_halves() {
    with_lattice(|l| {
        let mut s = RegisterState::new(2, 0);
        assert_eq!(
            s.set_scalar(l, 0, RegType::LONG_LO),
            Err(RegisterError::HalfWrite(0))
        );
        assert_eq!(
            s.set_scalar(l, 1, RegType::DOUBLE_HI),
            Err(RegisterError::HalfWrite(1))
        );
        assert_eq!(s.get(0).unwrap(), RegType::UNDEFINED);
    });
}

#[test]
fn test_wide_pair_integrity() {
    with_lattice(|l| {
        let mut s = RegisterState::new(2, 2);
        // The pair straddles locals and parameters.
        s.set_wide(l, 1, RegType::LONG_LO, RegType::LONG_HI).unwrap();
        assert_eq!(s.get(1).unwrap(), RegType::LONG_LO);
        assert_eq!(s.get(2).unwrap(), RegType::LONG_HI);
        assert!(s.verify_wide(l, 1, RegType::LONG_LO).unwrap());
        assert!(!s.verify_wide(l, 2, RegType::LONG_LO).unwrap());
        assert!(!s.verify_wide(l, 1, RegType::DOUBLE_LO).unwrap());

        let before = s.clone();
        assert_eq!(
            s.set_wide(l, 3, RegType::LONG_LO, RegType::LONG_HI),
            Err(RegisterError::OutOfRange { reg: 4, count: 4 })
        );
        assert_eq!(
            s.set_wide(l, 0, RegType::LONG_LO, RegType::DOUBLE_HI),
            Err(RegisterError::BadWidePair(0))
        );
        assert_eq!(s, before);

        s.set(l, 0, RegType::DOUBLE_LO).unwrap();
        assert_eq!(s.get(1).unwrap(), RegType::DOUBLE_HI);
    });
}

#[test]
fn test_merge_reports_changes() {
    with_lattice(|l| {
        let mut a = RegisterState::new(2, 0);
        let mut b = RegisterState::new(2, 0);
        a.set_scalar(l, 0, RegType::INTEGER).unwrap();
        b.set_scalar(l, 0, RegType::INTEGER).unwrap();
        a.set_scalar(l, 1, RegType::INTEGER).unwrap();
        b.set_scalar(l, 1, RegType::FLOAT).unwrap();

        assert!(a.merge(l, &b));
        assert_eq!(a.get(0).unwrap(), RegType::INTEGER);
        assert_eq!(a.get(1).unwrap(), RegType::CONFLICT);
        assert!(!a.merge(l, &b));
    });
}

#[test]
fn test_merge_this_and_monitors() {
    with_lattice(|l| {
        let mut a = RegisterState::new(1, 0);
        let mut b = RegisterState::new(1, 0);
        b.set_this_initialized(false);
        b.monitor_enter();

        assert!(a.merge(l, &b));
        assert!(!a.this_initialized());
        assert_eq!(a.monitor_depth(), None);
        assert!(!a.merge(l, &b));
    });
}

#[test]
fn test_monitor_depth() {
    let mut s = RegisterState::new(0, 0);
    assert!(!s.monitor_exit());
    s.monitor_enter();
    s.monitor_enter();
    assert_eq!(s.monitor_depth(), Some(2));
    assert!(s.monitor_exit());
    assert_eq!(s.monitor_depth(), Some(1));
}

#[test]
fn test_consume_result() {
    with_lattice(|l| {
        let mut s = RegisterState::new(3, 0);
        assert_eq!(
            s.consume_result(l, 0, ResultKind::Scalar),
            Err(RegisterError::NoResult)
        );

        s.set_result(l, RegType::INTEGER);
        assert!(matches!(
            s.consume_result(l, 0, ResultKind::Object),
            Err(RegisterError::ResultMismatch(_))
        ));
        assert_eq!(
            s.consume_result(l, 0, ResultKind::Scalar),
            Ok(RegType::INTEGER)
        );
        assert_eq!(s.result(), [RegType::UNDEFINED; 2]);

        s.set_result(l, RegType::DOUBLE_LO);
        assert!(s.consume_result(l, 0, ResultKind::Scalar).is_err());
        s.consume_result(l, 1, ResultKind::Wide).unwrap();
        assert_eq!(s.get(2).unwrap(), RegType::DOUBLE_HI);

        s.set_result(l, l.string());
        s.consume_result(l, 0, ResultKind::Object).unwrap();
        assert_eq!(s.get(0).unwrap(), l.string());
    });
}

#[test]
fn test_initialization_marks_every_copy() {
    with_lattice(|l| {
        let mut s = RegisterState::new(3, 1);
        let obj = l.reference(&TypeDesc::object(), false);
        let uninit = l.uninitialized(obj, 7);
        s.set_scalar(l, 0, uninit).unwrap();
        s.set_scalar(l, 2, uninit).unwrap();
        s.set_scalar(l, 1, RegType::INTEGER).unwrap();

        s.mark_refs_as_initialized(l, uninit);
        let init = l.reference(&TypeDesc::object(), true);
        assert_eq!(s.get(0).unwrap(), init);
        assert_eq!(s.get(2).unwrap(), init);
        assert_eq!(s.get(1).unwrap(), RegType::INTEGER);

        let this = l.uninitialized_this(obj);
        s.set_scalar(l, 3, this).unwrap();
        s.set_this_initialized(false);
        s.mark_refs_as_initialized(l, this);
        assert!(s.this_initialized());
        assert_eq!(s.get(3).unwrap(), obj);
    });
}

#[test]
fn test_invalidate_refs() {
    with_lattice(|l| {
        let mut s = RegisterState::new(2, 0);
        let uninit = l.uninitialized(l.string(), 4);
        s.set_scalar(l, 0, uninit).unwrap();
        s.set_scalar(l, 1, l.string()).unwrap();
        s.invalidate_refs(uninit);
        assert_eq!(s.get(0).unwrap(), RegType::CONFLICT);
        assert_eq!(s.get(1).unwrap(), l.string());
    });
}

#[test]
fn test_normalize_collapses_adjacent_labels() {
    let mut b = CodeBuilder::new();
    let a = b.here();
    let c = b.here();
    b.op(Opcode::Nop, &[]);
    b.goto(c);
    b.goto(a);
    let body = normalize(&b.finish().unwrap()).unwrap();

    assert_eq!(body.label_count, 1);
    assert_eq!(body.instructions, vec![
        Instruction::Label(LabelId(0)),
        Instruction::simple(Opcode::Nop, &[]),
        Instruction::target(Opcode::Goto, &[], LabelId(0)),
        Instruction::target(Opcode::Goto, &[], LabelId(0)),
    ]);
}

#[test]
fn test_normalize_inserts_entry_label() {
    let mut b = CodeBuilder::new();
    b.op(Opcode::Nop, &[]);
    let l = b.here();
    b.line(l, 42);
    b.op(Opcode::ReturnVoid, &[]);
    let body = normalize(&b.finish().unwrap()).unwrap();

    assert_eq!(body.instructions.first(), Some(&Instruction::Label(LabelId(0))));
    assert_eq!(body.instructions.get(2), Some(&Instruction::Label(LabelId(1))));
    assert_eq!(body.line_numbers[0].label, LabelId(1));
    assert_eq!(body.line_numbers[0].line, 42);
}

#[test]
fn test_normalize_rewrites_try_ranges() {
    let mut b = CodeBuilder::new();
    let start = b.here();
    let inner = b.here();
    b.op(Opcode::Nop, &[]);
    let end = b.here();
    b.op(Opcode::ReturnVoid, &[]);
    let handler = b.here();
    b.op(Opcode::ReturnVoid, &[]);
    b.try_range(start, end, &[(TypeDesc::new("Ljava/lang/Exception;"), handler)], None);
    b.branch(Opcode::IfEqz, &[0], inner);
    let body = normalize(&b.finish().unwrap()).unwrap();

    let range = &body.try_ranges[0];
    assert_eq!(range.start, LabelId(0));
    assert_eq!(range.end, LabelId(1));
    assert_eq!(range.handlers[0].label, LabelId(2));
    assert!(body.instructions.contains(&Instruction::target(
        Opcode::IfEqz,
        &[0],
        LabelId(0)
    )));
}

#[test]
#[cfg(debug_assertions)]
#[should_panic(expected = "referenced label must be placed")]
fn test_normalize_unplaced_label_is_a_bug() {
    let mut b = CodeBuilder::new();
    let nowhere = b.new_label();
    b.goto(nowhere);
    let _ = normalize(&b.finish_unchecked());
}

#[test]
#[cfg(debug_assertions)]
#[should_panic(expected = "label placed more than once")]
fn test_normalize_duplicate_label_is_a_bug() {
    let mut b = CodeBuilder::new();
    let l = b.here();
    b.op(Opcode::Nop, &[]);
    b.place(l);
    let _ = normalize(&b.finish_unchecked());
}

/// A body of labels, nops and gotos back to already placed labels.
fn arb_body() -> impl Strategy<Value = MethodBody> {
    prop::collection::vec(0u8..3, 0..24).prop_map(|shape| {
        let mut b = CodeBuilder::new();
        let mut placed = Vec::new();
        for s in shape {
            match s {
                0 => placed.push(b.here()),
                1 => {
                    b.op(Opcode::Nop, &[]);
                }
                _ => {
                    if let Some(l) = placed.last() {
                        b.goto(*l);
                    }
                }
            }
        }
        b.op(Opcode::ReturnVoid, &[]);
        b.finish_unchecked()
    })
}

proptest! {
    #[test]
    fn proptest_normalize_idempotent(body in arb_body()) {
        let once = normalize(&body).unwrap();
        let twice = normalize(&once).unwrap();
        prop_assert_eq!(&once, &twice);
        prop_assert_eq!(once.op_count(), body.op_count());

        // No two labels are adjacent.
        let adjacent = once
            .instructions
            .windows(2)
            .any(|w| w[0].as_label().is_some() && w[1].as_label().is_some());
        prop_assert!(!adjacent);
    }
}

#[test]
fn test_range_opcodes_take_consecutive_registers() {
    for &op in Opcode::ALL {
        let is_range = op.name().ends_with("/range");
        assert_eq!(shape(op).regs == Regs::Range, is_range, "{op}");
        if arith(op).is_some() {
            assert!(op.can_continue(), "{op}");
        }
    }
}

#[test]
fn test_index_marks_targets_and_tries() {
    let mut b = CodeBuilder::new();
    let start = b.new_label();
    let end = b.new_label();
    let handler = b.new_label();
    let all = b.new_label();
    let join = b.new_label();
    b.const_int(0, 0);
    b.place(start);
    b.branch(Opcode::IfEqz, &[0], join);
    b.op(Opcode::Nop, &[]);
    b.place(join);
    b.op(Opcode::Nop, &[]);
    b.place(end);
    b.op(Opcode::ReturnVoid, &[]);
    b.place(handler);
    b.op(Opcode::MoveException, &[0]);
    b.op(Opcode::ReturnVoid, &[]);
    b.place(all);
    b.op(Opcode::ReturnVoid, &[]);
    b.try_range(
        start,
        end,
        &[(TypeDesc::new("Ljava/lang/Exception;"), handler)],
        Some(all),
    );
    let body = normalize(&b.finish().unwrap()).unwrap();
    let index = InstructionIndex::build(&body).unwrap();

    let targets: Vec<usize> = index
        .iter()
        .enumerate()
        .filter(|(_, i)| i.is_branch_target)
        .map(|(idx, _)| idx)
        .collect();
    // entry, join, handler, catch-all
    assert_eq!(targets.len(), 4);
    assert!(targets.iter().all(|&t| body.instructions[t].as_label().is_some()));

    let h = index.label_index(LabelId(4)).unwrap();
    assert!(index.info(h).unwrap().is_handler());
    assert_eq!(index.info(h).unwrap().catches, vec![Some(TypeDesc::new(
        "Ljava/lang/Exception;"
    ))]);

    let branch = body
        .instructions
        .iter()
        .position(|i| i.opcode() == Some(Opcode::IfEqz))
        .unwrap();
    assert!(index.info(branch).unwrap().in_try);
    assert!(!index.info(0).unwrap().in_try);
    assert_eq!(index.handlers_covering(branch).count(), 2);
    assert_eq!(index.handlers_covering(0).count(), 0);
}

fn method(locals: u16, body: MethodBody) -> Method {
    Method::new(
        "LFoo;",
        "run",
        Proto::new(["I"], "V"),
        AccessFlags::STATIC,
        locals,
        body,
    )
}

fn structure_error(body: MethodBody) -> String {
    let m = method(2, body);
    let err = check_structure(&m, &normalize(&m.body).unwrap()).unwrap_err();
    assert_eq!(err.kind, VerifyErrorKind::BadClassHard);
    err.message
}

#[test]
fn test_check_structure() {
    let mut b = CodeBuilder::new();
    b.op(Opcode::Move, &[0]);
    assert!(structure_error(b.finish_unchecked()).contains("takes 2 registers"));

    let mut b = CodeBuilder::new();
    b.op(Opcode::Move, &[0, 3]);
    assert!(structure_error(b.finish_unchecked()).contains("out of range"));

    let mut b = CodeBuilder::new();
    b.const_wide(2, 1);
    assert!(structure_error(b.finish_unchecked()).contains("v3 out of range"));

    let mut b = CodeBuilder::new();
    b.op_const(Opcode::AddIntLit8, &[0, 1], Constant::Int(200));
    assert!(structure_error(b.finish_unchecked()).contains("literal 200"));

    let mut b = CodeBuilder::new();
    b.op_const(Opcode::Const, &[0], Constant::Wide(1));
    assert!(structure_error(b.finish_unchecked()).contains("malformed"));

    let mut b = CodeBuilder::new();
    let l = b.new_label();
    b.switch(Opcode::PackedSwitch, 0, &[(1, l), (3, l)]);
    b.place(l);
    assert!(structure_error(b.finish_unchecked()).contains("not consecutive"));

    let mut b = CodeBuilder::new();
    b.op_type(Opcode::FilledNewArrayRange, &[0, 2], "[I");
    assert!(structure_error(b.finish_unchecked()).contains("not consecutive"));

    let mut m = method(2, MethodBody::new());
    m.ins = 2;
    let err = check_structure(&m, &normalize(&m.body).unwrap()).unwrap_err();
    assert!(err.message.contains("prototype"));
}
