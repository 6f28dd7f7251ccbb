//! Opcode table
//!
//! One entry per Lua 5.3 opcode, indexed by the 6-bit opcode field. Each
//! entry carries the operand metadata and the handler the dispatch loop
//! calls.

use std::fmt;

use crate::error::LuaResult;

use super::instruction::Instruction;
use super::state::LuaState;

/// Handler executed for an opcode
pub type Action = fn(&mut LuaState, Instruction) -> LuaResult<()>;

/// Lua 5.3 opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    Move = 0,
    LoadK,
    LoadKX,
    LoadBool,
    LoadNil,
    GetUpval,
    GetTabUp,
    GetTable,
    SetTabUp,
    SetUpval,
    SetTable,
    NewTable,
    SelfOp,
    Add,
    Sub,
    Mul,
    Mod,
    Pow,
    Div,
    IDiv,
    BAnd,
    BOr,
    BXor,
    Shl,
    Shr,
    Unm,
    BNot,
    Not,
    Len,
    Concat,
    Jmp,
    Eq,
    Lt,
    Le,
    Test,
    TestSet,
    Call,
    TailCall,
    Return,
    ForLoop,
    ForPrep,
    TForCall,
    TForLoop,
    SetList,
    Closure,
    VarArg,
    ExtraArg,
}

impl OpCode {
    pub fn from_u8(op: u8) -> Option<OpCode> {
        OPCODES.get(op as usize).map(|info| info.code)
    }

    pub fn info(self) -> &'static OpInfo {
        &OPCODES[self as usize]
    }

    pub fn name(self) -> &'static str {
        self.info().name
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Instruction encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpMode {
    ABC,
    ABx,
    AsBx,
    Ax,
}

/// How an operand is used
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpArgMode {
    /// Not used
    N,
    /// Used, but neither a register nor a constant
    U,
    /// Register or jump offset
    R,
    /// Constant or register/constant
    K,
}

/// Opcode metadata
pub struct OpInfo {
    pub code: OpCode,
    pub name: &'static str,
    /// Instruction is a test: the next one is a jump
    pub test_flag: bool,
    /// Instruction writes register A
    pub set_a_flag: bool,
    pub arg_b_mode: OpArgMode,
    pub arg_c_mode: OpArgMode,
    pub mode: OpMode,
    pub action: Option<Action>,
}

impl fmt::Debug for OpInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpInfo")
            .field("name", &self.name)
            .field("mode", &self.mode)
            .field("test_flag", &self.test_flag)
            .field("set_a_flag", &self.set_a_flag)
            .finish()
    }
}

#[allow(clippy::too_many_arguments)]
const fn op(
    code: OpCode,
    name: &'static str,
    test_flag: bool,
    set_a_flag: bool,
    arg_b_mode: OpArgMode,
    arg_c_mode: OpArgMode,
    mode: OpMode,
    action: Option<Action>,
) -> OpInfo {
    OpInfo { code, name, test_flag, set_a_flag, arg_b_mode, arg_c_mode, mode, action }
}

use OpArgMode::{K, N, R, U};
use OpMode::{ABx, AsBx, Ax, ABC};

pub static OPCODES: [OpInfo; 47] = [
    op(OpCode::Move, "MOVE", false, true, R, N, ABC, Some(LuaState::op_move)),
    op(OpCode::LoadK, "LOADK", false, true, K, N, ABx, Some(LuaState::op_loadk)),
    op(OpCode::LoadKX, "LOADKX", false, true, N, N, ABx, Some(LuaState::op_loadkx)),
    op(OpCode::LoadBool, "LOADBOOL", false, true, U, U, ABC, Some(LuaState::op_loadbool)),
    op(OpCode::LoadNil, "LOADNIL", false, true, U, N, ABC, Some(LuaState::op_loadnil)),
    op(OpCode::GetUpval, "GETUPVAL", false, true, U, N, ABC, Some(LuaState::op_getupval)),
    op(OpCode::GetTabUp, "GETTABUP", false, true, U, K, ABC, Some(LuaState::op_gettabup)),
    op(OpCode::GetTable, "GETTABLE", false, true, R, K, ABC, Some(LuaState::op_gettable)),
    op(OpCode::SetTabUp, "SETTABUP", false, false, K, K, ABC, Some(LuaState::op_settabup)),
    op(OpCode::SetUpval, "SETUPVAL", false, false, U, N, ABC, Some(LuaState::op_setupval)),
    op(OpCode::SetTable, "SETTABLE", false, false, K, K, ABC, Some(LuaState::op_settable)),
    op(OpCode::NewTable, "NEWTABLE", false, true, U, U, ABC, Some(LuaState::op_newtable)),
    op(OpCode::SelfOp, "SELF", false, true, R, K, ABC, Some(LuaState::op_self)),
    op(OpCode::Add, "ADD", false, true, K, K, ABC, Some(LuaState::op_add)),
    op(OpCode::Sub, "SUB", false, true, K, K, ABC, Some(LuaState::op_sub)),
    op(OpCode::Mul, "MUL", false, true, K, K, ABC, Some(LuaState::op_mul)),
    op(OpCode::Mod, "MOD", false, true, K, K, ABC, Some(LuaState::op_mod)),
    op(OpCode::Pow, "POW", false, true, K, K, ABC, Some(LuaState::op_pow)),
    op(OpCode::Div, "DIV", false, true, K, K, ABC, Some(LuaState::op_div)),
    op(OpCode::IDiv, "IDIV", false, true, K, K, ABC, Some(LuaState::op_idiv)),
    op(OpCode::BAnd, "BAND", false, true, K, K, ABC, Some(LuaState::op_band)),
    op(OpCode::BOr, "BOR", false, true, K, K, ABC, Some(LuaState::op_bor)),
    op(OpCode::BXor, "BXOR", false, true, K, K, ABC, Some(LuaState::op_bxor)),
    op(OpCode::Shl, "SHL", false, true, K, K, ABC, Some(LuaState::op_shl)),
    op(OpCode::Shr, "SHR", false, true, K, K, ABC, Some(LuaState::op_shr)),
    op(OpCode::Unm, "UNM", false, true, R, N, ABC, Some(LuaState::op_unm)),
    op(OpCode::BNot, "BNOT", false, true, R, N, ABC, Some(LuaState::op_bnot)),
    op(OpCode::Not, "NOT", false, true, R, N, ABC, Some(LuaState::op_not)),
    op(OpCode::Len, "LEN", false, true, R, N, ABC, Some(LuaState::op_len)),
    op(OpCode::Concat, "CONCAT", false, true, R, R, ABC, Some(LuaState::op_concat)),
    op(OpCode::Jmp, "JMP", false, false, R, N, AsBx, Some(LuaState::op_jmp)),
    op(OpCode::Eq, "EQ", true, false, K, K, ABC, Some(LuaState::op_eq)),
    op(OpCode::Lt, "LT", true, false, K, K, ABC, Some(LuaState::op_lt)),
    op(OpCode::Le, "LE", true, false, K, K, ABC, Some(LuaState::op_le)),
    op(OpCode::Test, "TEST", true, false, N, U, ABC, Some(LuaState::op_test)),
    op(OpCode::TestSet, "TESTSET", true, true, R, U, ABC, Some(LuaState::op_testset)),
    op(OpCode::Call, "CALL", false, true, U, U, ABC, Some(LuaState::op_call)),
    op(OpCode::TailCall, "TAILCALL", false, true, U, U, ABC, Some(LuaState::op_tailcall)),
    op(OpCode::Return, "RETURN", false, false, U, N, ABC, Some(LuaState::op_return)),
    op(OpCode::ForLoop, "FORLOOP", false, true, R, N, AsBx, Some(LuaState::op_forloop)),
    op(OpCode::ForPrep, "FORPREP", false, true, R, N, AsBx, Some(LuaState::op_forprep)),
    op(OpCode::TForCall, "TFORCALL", false, false, N, U, ABC, Some(LuaState::op_tforcall)),
    op(OpCode::TForLoop, "TFORLOOP", false, true, R, N, AsBx, Some(LuaState::op_tforloop)),
    op(OpCode::SetList, "SETLIST", false, false, U, U, ABC, Some(LuaState::op_setlist)),
    op(OpCode::Closure, "CLOSURE", false, true, U, N, ABx, Some(LuaState::op_closure)),
    op(OpCode::VarArg, "VARARG", false, true, U, N, ABC, Some(LuaState::op_vararg)),
    op(OpCode::ExtraArg, "EXTRAARG", false, false, U, U, Ax, None),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_is_indexed_by_opcode() {
        for (i, info) in OPCODES.iter().enumerate() {
            assert_eq!(info.code as usize, i, "{} out of place", info.name);
        }
        assert_eq!(OpCode::from_u8(46), Some(OpCode::ExtraArg));
        assert_eq!(OpCode::from_u8(47), None);
    }

    #[test]
    fn test_metadata() {
        assert_eq!(OpCode::SetList.name(), "SETLIST");
        assert_eq!(OpCode::Jmp.info().mode, OpMode::AsBx);
        assert!(OpCode::Eq.info().test_flag);
        assert!(OpCode::ExtraArg.info().action.is_none());
        assert_eq!(OpCode::Add.info().arg_b_mode, OpArgMode::K);
        assert_eq!(OpCode::Closure.to_string(), "CLOSURE");
    }
}
