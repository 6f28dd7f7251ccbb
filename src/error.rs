//! Error types for the VM
//!
//! Every fallible operation in the crate returns [`LuaResult`]. Errors unwind
//! through `?` until a protected call converts them into a [`Status`] plus a
//! single error value on the stack.

use crate::chunk::ChunkError;
use crate::lua::value::Value;

/// Result type for VM operations
pub type LuaResult<T> = std::result::Result<T, LuaError>;

/// Errors raised while loading or running a chunk
#[derive(Debug, Clone, thiserror::Error)]
pub enum LuaError {
    /// Malformed or mismatched binary chunk
    #[error("{0}")]
    Chunk(#[from] ChunkError),

    /// A value raised by `error` or by host code
    #[error("{0}")]
    Runtime(Value),

    /// Operation applied to an incompatible value with no metamethod
    #[error("{0}")]
    TypeError(String),

    /// Integer division or modulo by zero, or a float with no integer value
    #[error("{0}")]
    ArithmeticError(String),

    /// Frame slot array exhausted
    #[error("stack overflow")]
    StackOverflow,

    /// Pop below the bottom of a frame
    #[error("stack underflow")]
    StackUnderflow,

    /// Access through an invalid stack index
    #[error("invalid stack index {0}")]
    InvalidIndex(i32),

    /// Too many nested calls
    #[error("call depth limit of {0} exceeded")]
    CallDepthExceeded(usize),

    /// Host function argument contract violation
    #[error("bad argument #{arg} ({msg})")]
    BadArgument { arg: i32, msg: String },

    /// Opcode with no handler
    #[error("invalid opcode {0}")]
    InvalidOpcode(u8),

    /// Program counter ran past the end of the code
    #[error("invalid program counter {0}")]
    InvalidProgramCounter(usize),

    /// Constant index out of range
    #[error("invalid constant index {0}")]
    InvalidConstant(usize),

    /// File could not be read
    #[error("{0}")]
    Io(String),
}

impl LuaError {
    /// Build a type error from a message
    pub fn type_error(msg: impl Into<String>) -> Self {
        LuaError::TypeError(msg.into())
    }

    /// The value a protected call leaves on the stack for this error
    pub fn into_value(self) -> Value {
        match self {
            LuaError::Runtime(value) => value,
            other => Value::from(other.to_string()),
        }
    }

    /// Status code reported for this error by protected calls
    pub fn status(&self) -> Status {
        match self {
            LuaError::Chunk(_) => Status::SyntaxError,
            LuaError::Io(_) => Status::FileError,
            _ => Status::RuntimeError,
        }
    }
}

/// Status codes returned by protected calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Call completed normally
    Ok,
    /// An error was raised while running
    RuntimeError,
    /// The chunk could not be decoded
    SyntaxError,
    /// The chunk file could not be read
    FileError,
}

impl Status {
    /// Whether the status reports success
    pub fn is_ok(self) -> bool {
        self == Status::Ok
    }
}
