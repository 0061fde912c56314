#![cfg(test)]
#![allow(clippy::arithmetic_side_effects, clippy::unwrap_used)]

use dexcheck_bytecode::{AccessFlags, Proto, TypeDesc};
use proptest::prelude::*;

use crate::{
    ClassDef, ClassId, ClassPool, ProgramModel, RegType, RegTypeKind, ResolutionKind,
    TypeLattice, TypeTable,
};

fn pool() -> ClassPool {
    ClassPool::new()
        .with(ClassDef::interface("LPet;"))
        .with(ClassDef::new("LAnimal;", Some(TypeDesc::object())))
        .with(
            ClassDef::new("LDog;", Some("LAnimal;".into()))
                .field("name", "Ljava/lang/String;", AccessFlags::PUBLIC)
                .method(
                    "bark",
                    Proto::new(["I"], "V"),
                    AccessFlags::PUBLIC,
                ),
        )
        .with(ClassDef::new("LPuppy;", Some("LDog;".into())))
        .with(ClassDef::new("LCat;", Some("LAnimal;".into())).implements("LPet;"))
}

const DESCS: &[&str] = &[
    "Ljava/lang/Object;",
    "Ljava/lang/String;",
    "LAnimal;",
    "LDog;",
    "LPuppy;",
    "LCat;",
    "LPet;",
    "LMissing;",
    "[I",
    "[J",
    "[LDog;",
    "[LCat;",
    "[[LPuppy;",
];

#[test]
fn test_fixed_handles() {
    let table = TypeTable::new();
    for (i, kind) in RegType::FIXED.iter().enumerate() {
        assert_eq!(table.intern(*kind).index(), i);
    }
    assert_eq!(table.kind(RegType::ZERO), RegTypeKind::Constant {
        lo: 0,
        hi: 0,
        precise: true
    });
    assert_eq!(table.class_id(&TypeDesc::object()), ClassId::OBJECT);
    assert_eq!(
        table.class_id(&TypeDesc::new("Ljava/lang/Throwable;")),
        ClassId::THROWABLE
    );
    let before = table.len();
    let a = table.intern(RegTypeKind::Constant {
        lo: 5,
        hi: 9,
        precise: false,
    });
    let b = table.intern(RegTypeKind::Constant {
        lo: 5,
        hi: 9,
        precise: false,
    });
    assert_eq!(a, b);
    assert_eq!(table.len(), before + 1);
}

#[test]
fn test_from_descriptor() {
    let table = TypeTable::new();
    let pool = pool();
    let l = TypeLattice::new(&table, &pool);
    assert_eq!(l.from_descriptor(&"I".into(), true), RegType::INTEGER);
    assert_eq!(l.from_descriptor(&"J".into(), true), RegType::LONG_LO);
    assert_eq!(l.from_descriptor(&"Z".into(), true), RegType::BOOLEAN);
    assert_eq!(l.from_descriptor(&"V".into(), true), RegType::CONFLICT);
    assert_eq!(l.from_descriptor(&"Lbad".into(), true), RegType::CONFLICT);
    assert!(matches!(
        l.kind(l.from_descriptor(&"LDog;".into(), false)),
        RegTypeKind::Reference { precise: false, .. }
    ));
    assert!(matches!(
        l.kind(l.from_descriptor(&"LMissing;".into(), false)),
        RegTypeKind::Unresolved { .. }
    ));
    assert!(matches!(
        l.kind(l.from_descriptor(&"[[I".into(), false)),
        RegTypeKind::Reference { .. }
    ));
    assert!(matches!(
        l.kind(l.from_descriptor(&"[LMissing;".into(), false)),
        RegTypeKind::Unresolved { .. }
    ));
}

#[test]
fn test_integral_merges() {
    let table = TypeTable::new();
    let pool = pool();
    let l = TypeLattice::new(&table, &pool);
    let c = |v| l.constant(v, true);
    assert_eq!(l.merge(RegType::BOOLEAN, c(1)), RegType::BOOLEAN);
    assert_eq!(l.merge(RegType::BOOLEAN, c(100)), RegType::BYTE);
    assert_eq!(l.merge(RegType::BYTE, c(1000)), RegType::SHORT);
    assert_eq!(l.merge(RegType::BYTE, RegType::CHAR), RegType::INTEGER);
    assert_eq!(l.merge(RegType::CHAR, c(60000)), RegType::CHAR);
    assert_eq!(l.merge(RegType::SHORT, RegType::CHAR), RegType::INTEGER);
    assert_eq!(l.merge(RegType::FLOAT, c(3)), RegType::FLOAT);
    assert_eq!(l.merge(RegType::FLOAT, RegType::INTEGER), RegType::CONFLICT);
    assert_eq!(
        l.kind(l.merge(c(-4), c(7))),
        RegTypeKind::Constant {
            lo: -4,
            hi: 7,
            precise: false
        }
    );
    assert_eq!(l.merge(RegType::LONG_LO, RegType::CONSTANT_LO), RegType::LONG_LO);
    assert_eq!(l.merge(RegType::DOUBLE_HI, RegType::CONSTANT_HI), RegType::DOUBLE_HI);
    assert_eq!(l.merge(RegType::LONG_LO, RegType::DOUBLE_LO), RegType::CONFLICT);
    assert_eq!(l.merge(RegType::UNDEFINED, RegType::INTEGER), RegType::CONFLICT);
}

#[test]
fn test_reference_merges() {
    let table = TypeTable::new();
    let pool = pool();
    let l = TypeLattice::new(&table, &pool);
    let r = |d: &str| l.reference(&d.into(), false);
    let animal = r("LAnimal;");
    assert_eq!(l.merge(r("LDog;"), r("LCat;")), animal);
    assert_eq!(l.merge(r("LPuppy;"), r("LCat;")), animal);
    assert_eq!(l.merge(r("LPuppy;"), r("LDog;")), r("LDog;"));
    assert_eq!(l.merge(r("LCat;"), r("LPet;")), r("LPet;"));
    assert_eq!(l.merge(r("LDog;"), r("LPet;")), l.object());
    assert_eq!(l.merge(r("[LDog;"), r("[LCat;")), r("[LAnimal;"));
    assert_eq!(l.merge(r("[I"), r("[J")), l.object());
    assert_eq!(l.merge(RegType::ZERO, r("LDog;")), r("LDog;"));
    assert_eq!(l.merge(r("LDog;"), r("LMissing;")), RegType::UNRESOLVED_MERGED);
    assert_eq!(l.merge(r("LDog;"), RegType::INTEGER), RegType::CONFLICT);

    let precise = l.reference(&"LDog;".into(), true);
    assert_eq!(l.merge(precise, r("LDog;")), r("LDog;"));

    let u1 = l.uninitialized(r("LDog;"), 1);
    let u2 = l.uninitialized(r("LDog;"), 2);
    assert_eq!(l.merge(u1, u2), RegType::CONFLICT);
    assert_eq!(l.merge(u1, r("LDog;")), RegType::CONFLICT);
    assert_eq!(l.merge(u1, u1), u1);
    assert_eq!(l.merge(RegType::ZERO, u1), RegType::CONFLICT);
    assert_eq!(l.merge(u1, RegType::ZERO), RegType::CONFLICT);
    let this = l.uninitialized_this(r("LDog;"));
    assert_eq!(l.merge(RegType::ZERO, this), RegType::CONFLICT);
}

#[test]
fn test_assignability() {
    let table = TypeTable::new();
    let pool = pool();
    let l = TypeLattice::new(&table, &pool);
    let r = |d: &str| l.reference(&d.into(), false);
    assert!(l.is_assignable_from(r("LAnimal;"), r("LPuppy;")));
    assert!(!l.is_assignable_from(r("LDog;"), r("LAnimal;")));
    assert!(l.is_assignable_from(r("LPet;"), r("LDog;")));
    assert!(l.is_assignable_from(r("Ljava/lang/Object;"), r("[I")));
    assert!(l.is_assignable_from(r("[LAnimal;"), r("[LDog;")));
    assert!(!l.is_assignable_from(r("[I"), r("[J")));
    assert!(l.is_assignable_from(r("LDog;"), r("LMissing;")));
    assert!(l.is_assignable_from(r("LDog;"), RegType::ZERO));
    assert!(!l.is_assignable_from(r("LDog;"), RegType::INTEGER));
    let u = l.uninitialized(r("LDog;"), 0);
    assert!(!l.is_assignable_from(r("LDog;"), u));
    assert!(l.is_assignable_from(RegType::INTEGER, RegType::CHAR));
    assert!(!l.is_assignable_from(RegType::CHAR, RegType::SHORT));
    assert!(l.is_assignable_from(RegType::BYTE, l.constant(-128, true)));
    assert!(!l.is_assignable_from(RegType::BYTE, l.constant(128, true)));
    assert!(!l.is_assignable_from(RegType::INTEGER, RegType::FLOAT));
}

#[test]
fn test_initialization_and_components() {
    let table = TypeTable::new();
    let pool = pool();
    let l = TypeLattice::new(&table, &pool);
    let dog = l.reference(&"LDog;".into(), false);
    let u = l.uninitialized(dog, 4);
    assert!(l.kind(u).is_uninitialized_types());
    assert_eq!(l.initialized(u), l.reference(&"LDog;".into(), true));
    let this = l.uninitialized_this(dog);
    assert_eq!(l.initialized(this), dog);

    let arr = l.reference(&"[[LPuppy;".into(), false);
    assert!(l.is_array_types(arr));
    assert!(l.is_object_array_types(arr));
    assert_eq!(
        l.component_type(arr),
        l.reference(&"[LPuppy;".into(), false)
    );
    assert_eq!(
        l.component_type(l.reference(&"[D".into(), false)),
        RegType::DOUBLE_LO
    );
    assert_eq!(l.component_type(dog), RegType::CONFLICT);

    assert!(l.check_wide_pair(RegType::LONG_LO, RegType::LONG_HI));
    assert!(!l.check_wide_pair(RegType::LONG_LO, RegType::DOUBLE_HI));
    assert_eq!(l.high_half(RegType::CONSTANT_LO), Some(RegType::CONSTANT_HI));
    assert_eq!(l.high_half(RegType::INTEGER), None);
}

#[test]
fn test_resolution() {
    let pool = pool();
    let bark = Proto::new(["I"], "V");
    let m = pool
        .resolve_method(&"LPuppy;".into(), "bark", &bark, ResolutionKind::Virtual)
        .unwrap();
    assert_eq!(m.owner, TypeDesc::new("LDog;"));
    assert!(
        pool.resolve_method(&"LPuppy;".into(), "bark", &Proto::new(["J"], "V"), ResolutionKind::Virtual)
            .is_none()
    );
    let hash = Proto::new(Vec::<TypeDesc>::new(), "I");
    assert!(
        pool.resolve_method(&"LPet;".into(), "hashCode", &hash, ResolutionKind::Interface)
            .is_some()
    );
    let f = pool
        .resolve_field(&"LPuppy;".into(), "name", &"Ljava/lang/String;".into())
        .unwrap();
    assert_eq!(f.owner, TypeDesc::new("LDog;"));
    assert!(pool.is_subclass_of(&"LCat;".into(), &"LPet;".into()));
    assert!(!pool.is_subclass_of(&"LDog;".into(), &"LPet;".into()));
}

#[test]
fn test_cyclic_hierarchy_terminates() {
    let pool = ClassPool::new()
        .with(ClassDef::new("LA;", Some("LB;".into())))
        .with(ClassDef::new("LB;", Some("LA;".into())));
    assert!(!pool.is_subclass_of(&"LA;".into(), &"LC;".into()));
    assert!(pool.superclasses(&"LA;".into()).len() <= crate::MAX_HIERARCHY_DEPTH);
}

#[test]
fn test_display() {
    let table = TypeTable::new();
    let pool = pool();
    let l = TypeLattice::new(&table, &pool);
    assert_eq!(l.display(RegType::LONG_HI).to_string(), "Long (High Half)");
    assert_eq!(
        l.display(l.reference(&"LDog;".into(), true)).to_string(),
        "Precise Reference: LDog;"
    );
    assert_eq!(
        l.display(l.merge(l.constant(1, true), l.constant(3, true)))
            .to_string(),
        "Constant: 1..=3"
    );
}

#[derive(Clone, Debug)]
enum Sample {
    Fixed(usize),
    Constant(i32, i32),
    Reference(usize, bool),
    Uninit(usize, u32),
    UninitThis(usize),
}

fn sample() -> impl Strategy<Value = Sample> {
    prop_oneof![
        (0..RegType::FIXED.len()).prop_map(Sample::Fixed),
        (-300i32..300, 0i32..300).prop_map(|(lo, span)| Sample::Constant(lo, lo + span)),
        (0..DESCS.len(), any::<bool>()).prop_map(|(i, p)| Sample::Reference(i, p)),
        (0..DESCS.len(), 0u32..3).prop_map(|(i, pc)| Sample::Uninit(i, pc)),
        (0..DESCS.len()).prop_map(Sample::UninitThis),
    ]
}

fn materialize(l: &TypeLattice<'_>, s: &Sample) -> RegType {
    match *s {
        Sample::Fixed(i) => l.intern(RegType::FIXED[i]),
        Sample::Constant(lo, hi) => l.intern(RegTypeKind::Constant {
            lo,
            hi,
            precise: lo == hi,
        }),
        Sample::Reference(i, precise) => l.reference(&DESCS[i].into(), precise),
        Sample::Uninit(i, pc) => l.uninitialized(l.reference(&DESCS[i].into(), false), pc),
        Sample::UninitThis(i) => l.uninitialized_this(l.reference(&DESCS[i].into(), false)),
    }
}

proptest! {
    #[test]
    fn proptest_merge_commutes(a in sample(), b in sample()) {
        let table = TypeTable::new();
        let pool = pool();
        let l = TypeLattice::new(&table, &pool);
        let (a, b) = (materialize(&l, &a), materialize(&l, &b));
        prop_assert_eq!(l.merge(a, b), l.merge(b, a));
    }

    #[test]
    fn proptest_merge_idempotent_and_conflict_absorbs(a in sample()) {
        let table = TypeTable::new();
        let pool = pool();
        let l = TypeLattice::new(&table, &pool);
        let a = materialize(&l, &a);
        prop_assert_eq!(l.merge(a, a), a);
        prop_assert_eq!(l.merge(a, RegType::CONFLICT), RegType::CONFLICT);
        prop_assert_eq!(l.merge(RegType::CONFLICT, a), RegType::CONFLICT);
    }

    #[test]
    fn proptest_merge_is_upper_bound(a in sample(), b in sample()) {
        let table = TypeTable::new();
        let pool = pool();
        let l = TypeLattice::new(&table, &pool);
        let (a, b) = (materialize(&l, &a), materialize(&l, &b));
        let m = l.merge(a, b);
        if m != RegType::CONFLICT {
            prop_assert!(l.is_assignable_from(m, a), "{} !<- {}", l.display(m), l.display(a));
            prop_assert!(l.is_assignable_from(m, b), "{} !<- {}", l.display(m), l.display(b));
        }
    }
}
