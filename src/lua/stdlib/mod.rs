//! Standard library
//!
//! Only the base library is provided; hosts register further functions
//! with [`LuaState::register`](crate::lua::LuaState::register).

pub mod base;

pub use self::base::open_base;
