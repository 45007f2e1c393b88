use sparsecube_base::{err, Id, Result};

// Instruction byte layout, low bit first:
//
//   bit 0     JUMP: a 4-byte little-endian jump field follows the element id
//   bits 1-2  element id width: 0 implicit (previous sibling + 1), 1, 2 or 4 bytes
//   bits 3-5  value width: none, u8, i32, f64, f32
//   bits 6-7  always zero
//
// 0xFF is the NOP filler byte and is never a valid instruction. The body
// order is [instr][element id][jump][value].

pub(crate) const JUMP: u8 = 0x01;
pub(crate) const NOP: u8 = 0xFF;

const ELEM_SHIFT: u8 = 1;
const VALUE_SHIFT: u8 = 3;

const ELEM_LEN: [u8; 4] = [0, 1, 2, 4];
const VALUE_LEN: [u8; 5] = [0, 1, 4, 8, 4];

#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub(crate) enum ElemWidth {
    Implicit = 0,
    W8 = 1,
    W16 = 2,
    W32 = 3,
}

impl ElemWidth {
    pub(crate) fn select(prev: Id, id: Id) -> ElemWidth {
        if prev.wrapping_add(1) == id {
            ElemWidth::Implicit
        } else if id <= 0xff {
            ElemWidth::W8
        } else if id <= 0xffff {
            ElemWidth::W16
        } else {
            ElemWidth::W32
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub(crate) enum ValueWidth {
    None = 0,
    U8 = 1,
    I32 = 2,
    F64 = 3,
    F32 = 4,
}

fn same_bits(a: f64, b: f64) -> bool {
    a.to_bits() == b.to_bits()
}

impl ValueWidth {
    /// The narrowest width that reproduces `val` bit for bit, trying u8,
    /// i32 and f32 in that order. Without `compress` always f64.
    pub(crate) fn select(val: f64, compress: bool) -> ValueWidth {
        if compress {
            if same_bits((val as u8) as f64, val) {
                return ValueWidth::U8;
            }
            if same_bits((val as i32) as f64, val) {
                return ValueWidth::I32;
            }
            if same_bits((val as f32) as f64, val) {
                return ValueWidth::F32;
            }
        }
        ValueWidth::F64
    }
}

const fn build_instr_lens() -> [u8; 256] {
    let mut lens = [0_u8; 256];
    let mut i = 0;
    while i < 256 {
        let b = i as u8;
        let value = ((b >> VALUE_SHIFT) & 7) as usize;
        if b != NOP && b & 0xc0 == 0 && value < VALUE_LEN.len() {
            let elem = ((b >> ELEM_SHIFT) & 3) as usize;
            let jump = if b & JUMP != 0 { 4 } else { 0 };
            lens[i] = 1 + ELEM_LEN[elem] + jump + VALUE_LEN[value];
        }
        i += 1;
    }
    lens
}

/// Total encoded length for each instruction byte, 0 for bytes that are
/// not instructions.
pub(crate) static INSTR_LEN: [u8; 256] = build_instr_lens();

/// Longest record a cube with `dims` dimensions can produce: every
/// interior level with a 4-byte id and a jump, the leaf with a 4-byte id
/// and an f64.
pub(crate) fn max_record_len(dims: usize) -> usize {
    if dims == 0 {
        return 0;
    }
    (dims - 1) * (1 + 4 + 4) + (1 + 4 + 8)
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub(crate) struct Instr {
    pub(crate) len: usize,
    pub(crate) id: Id,
    /// Raw jump field, still possibly a long-jump table reference.
    pub(crate) jump: Option<u32>,
    pub(crate) value: Option<f64>,
}

impl Instr {
    /// Byte offset of the jump field within the instruction.
    pub(crate) fn jump_field_offset(code: u8) -> usize {
        1 + ELEM_LEN[((code >> ELEM_SHIFT) & 3) as usize] as usize
    }

    /// Decodes the instruction at the start of `buf`; `prev` is the id of the
    /// preceding sibling, or `NO_ID` for the first child of a parent.
    pub(crate) fn decode(buf: &[u8], prev: Id) -> Result<Instr> {
        let code = match buf.first() {
            Some(c) => *c,
            None => return Err(err("instruction offset past end of page")),
        };
        let len = INSTR_LEN[code as usize] as usize;
        if len == 0 {
            if code != NOP && code & 0xc0 == 0 {
                return Err(err(format!("unknown value type in instruction {:#04x}", code)));
            }
            return Err(err(format!("unknown instruction {:#04x}", code)));
        }
        if buf.len() < len {
            return Err(err("instruction runs past end of page"));
        }
        let mut p = 1;
        let id = match (code >> ELEM_SHIFT) & 3 {
            0 => prev.wrapping_add(1),
            1 => buf[1] as Id,
            2 => u16::from_le_bytes([buf[1], buf[2]]) as Id,
            _ => u32::from_le_bytes([buf[1], buf[2], buf[3], buf[4]]),
        };
        p += ELEM_LEN[((code >> ELEM_SHIFT) & 3) as usize] as usize;
        let jump = if code & JUMP != 0 {
            let j = u32::from_le_bytes([buf[p], buf[p + 1], buf[p + 2], buf[p + 3]]);
            p += 4;
            Some(j)
        } else {
            None
        };
        let value = match (code >> VALUE_SHIFT) & 7 {
            0 => None,
            1 => Some(buf[p] as f64),
            2 => Some(i32::from_le_bytes([buf[p], buf[p + 1], buf[p + 2], buf[p + 3]]) as f64),
            3 => {
                let mut b = [0_u8; 8];
                b.copy_from_slice(&buf[p..p + 8]);
                Some(f64::from_le_bytes(b))
            }
            _ => Some(f32::from_le_bytes([buf[p], buf[p + 1], buf[p + 2], buf[p + 3]]) as f64),
        };
        Ok(Instr { len, id, jump, value })
    }

    /// Appends one instruction. `jump` is the raw jump field.
    pub(crate) fn encode(
        out: &mut Vec<u8>,
        elem: ElemWidth,
        id: Id,
        jump: Option<u32>,
        value: ValueWidth,
        val: f64,
    ) {
        let mut code = (elem as u8) << ELEM_SHIFT | (value as u8) << VALUE_SHIFT;
        if jump.is_some() {
            code |= JUMP;
        }
        out.push(code);
        match elem {
            ElemWidth::Implicit => {}
            ElemWidth::W8 => out.push(id as u8),
            ElemWidth::W16 => out.extend_from_slice(&(id as u16).to_le_bytes()),
            ElemWidth::W32 => out.extend_from_slice(&id.to_le_bytes()),
        }
        if let Some(j) = jump {
            out.extend_from_slice(&j.to_le_bytes());
        }
        match value {
            ValueWidth::None => {}
            ValueWidth::U8 => out.push(val as u8),
            ValueWidth::I32 => out.extend_from_slice(&(val as i32).to_le_bytes()),
            ValueWidth::F64 => out.extend_from_slice(&val.to_le_bytes()),
            ValueWidth::F32 => out.extend_from_slice(&(val as f32).to_le_bytes()),
        }
    }
}
