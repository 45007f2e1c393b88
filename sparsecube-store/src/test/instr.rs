use sparsecube_base::{ErrorKind, NO_ID};
use test_log::test;

use crate::{
    codec::compare_double,
    instr::{max_record_len, ElemWidth, Instr, ValueWidth, INSTR_LEN, JUMP, NOP},
};

#[test]
fn test_value_width_selection() {
    assert_eq!(ValueWidth::select(3.0, true), ValueWidth::U8);
    assert_eq!(ValueWidth::select(255.0, true), ValueWidth::U8);
    assert_eq!(ValueWidth::select(256.0, true), ValueWidth::I32);
    assert_eq!(ValueWidth::select(-3.0, true), ValueWidth::I32);
    assert_eq!(ValueWidth::select(0.5, true), ValueWidth::F32);
    assert_eq!(ValueWidth::select(0.1, true), ValueWidth::F64);
    assert_eq!(ValueWidth::select(1e300, true), ValueWidth::F64);
    assert_eq!(ValueWidth::select(3.0, false), ValueWidth::F64);
}

#[test]
fn test_elem_width_selection() {
    assert_eq!(ElemWidth::select(NO_ID, 0), ElemWidth::Implicit);
    assert_eq!(ElemWidth::select(NO_ID, 1), ElemWidth::W8);
    assert_eq!(ElemWidth::select(4, 5), ElemWidth::Implicit);
    assert_eq!(ElemWidth::select(4, 300), ElemWidth::W16);
    assert_eq!(ElemWidth::select(4, 70_000), ElemWidth::W32);
}

#[test]
fn test_instruction_shapes() {
    let elems = [
        (ElemWidth::Implicit, 0_u32, 0_usize),
        (ElemWidth::W8, 200, 1),
        (ElemWidth::W16, 40_000, 2),
        (ElemWidth::W32, 3_000_000_000, 4),
    ];
    let values = [
        (ValueWidth::U8, 7.0, 1_usize),
        (ValueWidth::I32, -123_456.0, 4),
        (ValueWidth::F32, 0.25, 4),
        (ValueWidth::F64, 0.1, 8),
    ];
    let mut buf = Vec::new();
    for &(elem, id, elen) in &elems {
        let prev = if elem == ElemWidth::Implicit { NO_ID } else { 17 };
        for &(width, val, vlen) in &values {
            buf.clear();
            Instr::encode(&mut buf, elem, id, None, width, val);
            assert_eq!(buf.len(), 1 + elen + vlen);
            assert_eq!(INSTR_LEN[buf[0] as usize] as usize, buf.len());
            let ins = Instr::decode(&buf, prev).unwrap();
            assert_eq!((ins.len, ins.id, ins.jump, ins.value), (buf.len(), id, None, Some(val)));
        }
        buf.clear();
        Instr::encode(&mut buf, elem, id, Some(0x0102_0304), ValueWidth::None, 0.0);
        assert_eq!(buf.len(), 1 + elen + 4);
        assert_eq!(Instr::jump_field_offset(buf[0]), 1 + elen);
        let ins = Instr::decode(&buf, prev).unwrap();
        assert_eq!((ins.id, ins.jump, ins.value), (id, Some(0x0102_0304), None));
    }
}

#[test]
fn test_implicit_ids_follow_previous_sibling() {
    let mut buf = Vec::new();
    Instr::encode(&mut buf, ElemWidth::Implicit, 6, None, ValueWidth::U8, 1.0);
    assert_eq!(Instr::decode(&buf, 5).unwrap().id, 6);
    assert_eq!(Instr::decode(&buf, 99).unwrap().id, 100);
    assert_eq!(Instr::decode(&buf, NO_ID).unwrap().id, 0);
}

#[test]
fn test_bad_instructions() {
    let e = Instr::decode(&[NOP], 0).unwrap_err();
    assert_eq!(e.kind(), ErrorKind::Internal);
    // bits 6-7 set
    assert!(Instr::decode(&[0xc0, 0, 0, 0, 0], 0).is_err());
    // value width 5 does not exist
    assert!(Instr::decode(&[5 << 3, 0, 0, 0, 0, 0, 0, 0, 0], 0).is_err());
    // truncated: W32 id with jump, only 3 bytes present
    assert!(Instr::decode(&[(3 << 1) | JUMP, 1, 2], 0).is_err());
    assert!(Instr::decode(&[], 0).is_err());
}

#[test]
fn test_max_record_len() {
    assert_eq!(max_record_len(1), 13);
    assert_eq!(max_record_len(3), 31);
}

#[test]
fn test_compare_double() {
    assert!(compare_double(1.0, 1.0));
    assert!(compare_double(1.0, 1.0 + f64::EPSILON));
    assert!(compare_double(1.0, f64::from_bits(1.0_f64.to_bits() + 7)));
    assert!(!compare_double(1.0, f64::from_bits(1.0_f64.to_bits() + 8)));
    assert!(compare_double(1.0, 1.0 + 1e-15));
    assert!(compare_double(-1.0, f64::from_bits((-1.0_f64).to_bits() + 3)));
    assert!(compare_double(0.0, -0.0));
    assert!(!compare_double(2.0, -2.0));
    assert!(!compare_double(1.0, 1.001));
}
