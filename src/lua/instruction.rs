//! Instruction word decoding
//!
//! Layout of a 32-bit instruction, low bits first:
//!
//! ```text
//! iABC:  op(6) | A(8) | C(9) | B(9)
//! iABx:  op(6) | A(8) | Bx(18)
//! iAsBx: op(6) | A(8) | sBx(18), biased by MAXARG_SBX
//! iAx:   op(6) | Ax(26)
//! ```

use super::opcodes::{OpCode, OpInfo, OPCODES};

pub const MAXARG_BX: i32 = (1 << 18) - 1;
pub const MAXARG_SBX: i32 = MAXARG_BX >> 1;

/// Bit flag marking an RK operand as a constant index
pub const BITRK: u32 = 1 << 8;

/// Number of list items flushed by one SETLIST
pub const LFIELDS_PER_FLUSH: i64 = 50;

/// A single VM instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction(pub u32);

impl Instruction {
    /// Raw opcode field
    pub fn opcode(self) -> u8 {
        (self.0 & 0x3F) as u8
    }

    /// Metadata for this instruction's opcode
    pub fn info(self) -> Option<&'static OpInfo> {
        OPCODES.get(self.opcode() as usize)
    }

    pub fn op(self) -> Option<OpCode> {
        self.info().map(|info| info.code)
    }

    pub fn abc(self) -> (usize, usize, usize) {
        let a = (self.0 >> 6) & 0xFF;
        let c = (self.0 >> 14) & 0x1FF;
        let b = (self.0 >> 23) & 0x1FF;
        (a as usize, b as usize, c as usize)
    }

    pub fn abx(self) -> (usize, usize) {
        let a = (self.0 >> 6) & 0xFF;
        let bx = self.0 >> 14;
        (a as usize, bx as usize)
    }

    pub fn asbx(self) -> (usize, i32) {
        let (a, bx) = self.abx();
        (a, bx as i32 - MAXARG_SBX)
    }

    pub fn ax(self) -> usize {
        (self.0 >> 6) as usize
    }

    /// Encode an iABC instruction
    pub fn encode_abc(op: OpCode, a: u32, b: u32, c: u32) -> Self {
        Instruction((op as u32) | (a & 0xFF) << 6 | (c & 0x1FF) << 14 | (b & 0x1FF) << 23)
    }

    /// Encode an iABx instruction
    pub fn encode_abx(op: OpCode, a: u32, bx: u32) -> Self {
        Instruction((op as u32) | (a & 0xFF) << 6 | (bx & 0x3FFFF) << 14)
    }

    /// Encode an iAsBx instruction
    pub fn encode_asbx(op: OpCode, a: u32, sbx: i32) -> Self {
        Self::encode_abx(op, a, (sbx + MAXARG_SBX) as u32)
    }

    /// Encode an iAx instruction
    pub fn encode_ax(op: OpCode, ax: u32) -> Self {
        Instruction((op as u32) | ax << 6)
    }
}

/// Whether an RK operand names a constant
pub fn is_k(rk: usize) -> bool {
    rk as u32 & BITRK != 0
}

/// RK operand naming constant `idx`
pub fn rk_as_k(idx: u32) -> u32 {
    idx | BITRK
}

/// Decode a "floating point byte" `eeeeexxx` into an integer
pub fn fb2int(x: usize) -> usize {
    if x < 8 {
        x
    } else {
        ((x & 7) + 8) << ((x >> 3) - 1)
    }
}

/// Encode an integer as a "floating point byte", rounding up
pub fn int2fb(mut x: usize) -> usize {
    let mut e = 0;
    if x < 8 {
        return x;
    }
    while x >= (8 << 4) {
        x = (x + 0xF) >> 4;
        e += 4;
    }
    while x >= (8 << 1) {
        x = (x + 1) >> 1;
        e += 1;
    }
    ((e + 1) << 3) | (x - 8)
}
