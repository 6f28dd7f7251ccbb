//! Binary chunk format
//!
//! Decoding and encoding of precompiled Lua 5.3 chunks. A chunk is a fixed
//! header followed by the main function prototype, which recursively holds
//! its nested prototypes.

mod cache;
mod listing;
mod reader;
mod writer;

use std::rc::Rc;

pub use cache::{ChunkCache, DEFAULT_CHUNK_CACHE_SIZE};
pub use listing::listing;
pub use reader::undump;
pub use writer::dump;

use crate::lua::value::LuaString;

/// "\x1bLua"
pub const LUA_SIGNATURE: &[u8; 4] = b"\x1bLua";
pub const LUAC_VERSION: u8 = 0x53;
pub const LUAC_FORMAT: u8 = 0;
/// "\x19\x93\r\n\x1a\n"
pub const LUAC_DATA: &[u8; 6] = b"\x19\x93\r\n\x1a\n";
pub const CINT_SIZE: u8 = 4;
pub const CSIZET_SIZE: u8 = 8;
pub const INSTRUCTION_SIZE: u8 = 4;
pub const LUA_INTEGER_SIZE: u8 = 8;
pub const LUA_NUMBER_SIZE: u8 = 8;
pub const LUAC_INT: i64 = 0x5678;
pub const LUAC_NUM: f64 = 370.5;

/// Deepest function nesting the decoder accepts
pub const MAX_PROTO_DEPTH: usize = 200;

pub const TAG_NIL: u8 = 0x00;
pub const TAG_BOOLEAN: u8 = 0x01;
pub const TAG_NUMBER: u8 = 0x03;
pub const TAG_INTEGER: u8 = 0x13;
pub const TAG_SHORT_STR: u8 = 0x04;
pub const TAG_LONG_STR: u8 = 0x14;

/// Errors raised while decoding a chunk
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ChunkError {
    #[error("not a precompiled chunk")]
    NotAChunk,

    #[error("version mismatch: expected 0x53, got {0:#04x}")]
    VersionMismatch(u8),

    #[error("format mismatch: expected 0, got {0}")]
    FormatMismatch(u8),

    #[error("corrupted chunk")]
    Corrupted,

    #[error("{field} size mismatch: expected {expected}, got {got}")]
    SizeMismatch { field: &'static str, expected: u8, got: u8 },

    #[error("endianness mismatch")]
    IntegerFormat,

    #[error("float format mismatch")]
    FloatFormat,

    #[error("truncated chunk at offset {0}")]
    UnexpectedEof(usize),

    #[error("unknown constant tag {tag:#04x} at offset {offset}")]
    UnknownConstantTag { tag: u8, offset: usize },

    #[error("length {0} does not fit in memory")]
    LengthOverflow(u64),

    #[error("functions nested deeper than {0} levels")]
    NestingTooDeep(usize),
}

/// Entry of a prototype's constant pool
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Nil,
    Boolean(bool),
    Integer(i64),
    Number(f64),
    String(LuaString),
}

/// Upvalue descriptor of a prototype
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpvalueDesc {
    /// Captures a register of the enclosing function when true,
    /// otherwise one of the enclosing closure's upvalues
    pub in_stack: bool,

    /// Register or upvalue index in the enclosing function
    pub index: u8,
}

/// Local variable debug record
#[derive(Debug, Clone, PartialEq)]
pub struct LocVar {
    pub name: String,
    pub start_pc: u32,
    pub end_pc: u32,
}

/// Immutable function prototype decoded from a chunk
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Prototype {
    /// Source name; nested prototypes inherit their parent's
    pub source: String,

    pub line_defined: u32,
    pub last_line_defined: u32,

    /// Number of fixed parameters
    pub num_params: u8,

    pub is_vararg: bool,

    /// Number of registers the function needs
    pub max_stack_size: u8,

    /// Instruction words
    pub code: Vec<u32>,

    pub constants: Vec<Constant>,

    pub upvalues: Vec<UpvalueDesc>,

    /// Nested function prototypes
    pub protos: Vec<Rc<Prototype>>,

    /// Source line per instruction
    pub line_info: Vec<u32>,

    pub loc_vars: Vec<LocVar>,

    pub upvalue_names: Vec<String>,
}

/// Check whether a buffer starts with the binary chunk signature
pub fn is_binary_chunk(data: &[u8]) -> bool {
    data.starts_with(LUA_SIGNATURE)
}
