#![cfg(test)]
#![allow(clippy::unwrap_used)]

use alloc::vec;

use proptest::prelude::*;

use crate::{
    AccessFlags, BuildError, CodeBuilder, DescKind, DescriptorError, Instruction, LabelId,
    Method, MethodRef, Opcode, Proto, TypeDesc,
};

#[test]
fn test_descriptor_kinds() {
    let cases = [
        ("V", Some(DescKind::Void)),
        ("I", Some(DescKind::Int)),
        ("J", Some(DescKind::Long)),
        ("Ljava/lang/Object;", Some(DescKind::Class)),
        ("[I", Some(DescKind::Array)),
        ("[[Ljava/lang/String;", Some(DescKind::Array)),
        ("[V", None),
        ("L;", None),
        ("Ljava//Object;", None),
        ("Ljava/lang/Object", None),
        ("II", None),
        ("Q", None),
        ("", None),
    ];
    for (text, want) in cases {
        assert_eq!(TypeDesc::new(text).kind(), want, "{text}");
    }
}

#[test]
fn test_descriptor_parse_errors() {
    assert_eq!(TypeDesc::parse(""), Err(DescriptorError::Empty));
    assert!(matches!(
        TypeDesc::parse("Lfoo"),
        Err(DescriptorError::Malformed(_))
    ));
    let deep = "[".repeat(256) + "I";
    assert!(matches!(
        TypeDesc::parse(&deep),
        Err(DescriptorError::TooManyDimensions(_))
    ));
    assert!(TypeDesc::parse(&("[".repeat(255) + "I")).is_ok());
}

#[test]
fn test_descriptor_component() {
    let t = TypeDesc::new("[[I");
    assert_eq!(t.dimensions(), 2);
    assert_eq!(t.component(), Some(TypeDesc::new("[I")));
    assert_eq!(TypeDesc::new("I").component(), None);
    assert_eq!(TypeDesc::new("I").array_of(), TypeDesc::new("[I"));
    assert_eq!(TypeDesc::class("a/B"), TypeDesc::new("La/B;"));
}

#[test]
fn test_proto_slots() {
    let p = Proto::new(["I", "J", "Ljava/lang/Object;", "D"], "V");
    assert_eq!(p.arg_slots(), 6);
    assert_eq!(p.to_string(), "(IJLjava/lang/Object;D)V");
}

#[test]
fn test_method_ins() {
    let p = Proto::new(["J"], "V");
    let m = Method::new("LFoo;", "bar", p.clone(), AccessFlags::PUBLIC, 3, Default::default());
    assert_eq!(m.ins, 3);
    assert_eq!(m.registers(), 6);
    let s = Method::new("LFoo;", "bar", p, AccessFlags::STATIC, 0, Default::default());
    assert_eq!(s.ins, 2);
    assert!(!s.is_constructor());
}

#[test]
fn test_opcode_flags() {
    assert!(Opcode::Goto.can_branch());
    assert!(!Opcode::Goto.can_continue());
    assert!(Opcode::IfEq.can_branch() && Opcode::IfEq.can_continue());
    assert!(Opcode::PackedSwitch.can_switch());
    assert!(Opcode::InvokeStatic.has_result());
    assert!(Opcode::FilledNewArray.has_result());
    assert!(!Opcode::ReturnVoid.can_continue());
    assert!(Opcode::Throw.can_throw() && !Opcode::Throw.can_continue());
    assert!(Opcode::DivInt.can_throw());
    assert!(!Opcode::AddInt.can_throw());
    assert_eq!(Opcode::AddIntLit8.to_string(), "add-int/lit8");
}

#[test]
fn test_opcode_names_unique() {
    let mut names: alloc::vec::Vec<_> = Opcode::ALL.iter().map(|op| op.name()).collect();
    names.sort_unstable();
    let len = names.len();
    names.dedup();
    assert_eq!(names.len(), len);
}

#[test]
fn test_builder_rejects_unplaced_label() {
    let mut b = CodeBuilder::new();
    let l = b.new_label();
    b.goto(l);
    assert_eq!(b.finish(), Err(BuildError::UnplacedLabel(l)));
}

#[test]
fn test_builder_rejects_duplicate_label() {
    let mut b = CodeBuilder::new();
    let l = b.new_label();
    b.place(l);
    b.place(l);
    assert_eq!(b.finish(), Err(BuildError::DuplicateLabel(l)));
}

#[test]
fn test_builder_layout() {
    let mut b = CodeBuilder::new();
    let start = b.here();
    b.invoke(
        Opcode::InvokeStatic,
        &[],
        MethodRef::new(
            "LFoo;",
            "f",
            Proto {
                params: vec![],
                ret: TypeDesc::new("V"),
            },
        ),
    );
    let end = b.here();
    b.op(Opcode::ReturnVoid, &[]);
    let handler = b.here();
    b.op(Opcode::ReturnVoid, &[]);
    b.try_range(start, end, &[], Some(handler));
    let body = b.finish().unwrap();
    assert_eq!(body.label_count, 3);
    assert_eq!(body.instructions[0], Instruction::Label(LabelId(0)));
    assert_eq!(
        body.try_ranges[0].handler_labels().collect::<alloc::vec::Vec<_>>(),
        vec![handler]
    );
}

#[test]
fn test_instruction_display() {
    let i = Instruction::simple(Opcode::AddInt, &[0, 1, 2]);
    assert_eq!(i.to_string(), "add-int v0, v1, v2");
    let i = Instruction::target(Opcode::IfEqz, &[3], LabelId(7));
    assert_eq!(i.to_string(), "if-eqz v3, :L7");
}

proptest! {
    #[test]
    fn proptest_class_descriptor(name in "[a-z]{1,8}(/[A-Za-z0-9_$]{1,8}){0,3}") {
        let t = TypeDesc::class(&name);
        prop_assert_eq!(t.kind(), Some(DescKind::Class));
        prop_assert_eq!(t.array_of().component(), Some(t));
    }
}
