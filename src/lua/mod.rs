//! Lua 5.3 virtual machine
//!
//! Executes precompiled chunks. Host code drives the interpreter through
//! the stack API on [`LuaState`]: push values, load a chunk, call it and
//! read the results back from the stack.

mod api;
mod auxlib;
mod call;
pub mod closure;
pub mod frame;
pub mod instruction;
pub mod metamethod;
pub(crate) mod number;
pub mod opcodes;
pub mod operators;
pub mod state;
pub mod stdlib;
pub mod table;
mod table_api;
pub mod value;
mod vm;

pub use self::closure::{Closure, NativeFunction};
pub use self::instruction::Instruction;
pub use self::metamethod::MetamethodType;
pub use self::opcodes::OpCode;
pub use self::operators::{ArithOp, CompareOp};
pub use self::state::{upvalue_index, LuaState, MULTRET, REGISTRY_INDEX};
pub use self::stdlib::open_base;
pub use self::table::{Table, TableRef};
pub use self::value::{LuaString, LuaType, Value};
