//! luavm library
//!
//! An embeddable interpreter for Lua 5.3 binary chunks.

pub mod chunk;
pub mod config;
pub mod error;
pub mod lua;

// Re-export commonly used types
pub use chunk::{ChunkError, Prototype};
pub use config::VmConfig;
pub use error::{LuaError, LuaResult, Status};
pub use lua::{open_base, LuaState, LuaType, Value, MULTRET};
