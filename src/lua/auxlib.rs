//! Argument checking helpers for native functions

use crate::error::{LuaError, LuaResult};

use super::state::LuaState;
use super::value::{LuaString, LuaType};

impl LuaState {
    /// Error for argument `arg` of the running native function
    pub fn arg_error(&self, arg: i32, msg: impl Into<String>) -> LuaError {
        LuaError::BadArgument { arg, msg: msg.into() }
    }

    fn type_mismatch(&self, arg: i32, expected: &str) -> LuaError {
        let got = self.type_of(arg).name();
        self.arg_error(arg, format!("{} expected, got {}", expected, got))
    }

    /// Fail unless argument `arg` is present (nil counts)
    pub fn check_any(&self, arg: i32) -> LuaResult<()> {
        if self.is_none(arg) {
            return Err(self.arg_error(arg, "value expected"));
        }
        Ok(())
    }

    pub fn check_type(&self, arg: i32, tp: LuaType) -> LuaResult<()> {
        if self.type_of(arg) != tp {
            return Err(self.type_mismatch(arg, tp.name()));
        }
        Ok(())
    }

    pub fn check_integer(&self, arg: i32) -> LuaResult<i64> {
        match self.to_integerx(arg) {
            Some(n) => Ok(n),
            None if self.is_number(arg) => Err(self.arg_error(arg, "number has no integer representation")),
            None => Err(self.type_mismatch(arg, "number")),
        }
    }

    pub fn check_number(&self, arg: i32) -> LuaResult<f64> {
        self.to_numberx(arg).ok_or_else(|| self.type_mismatch(arg, "number"))
    }

    pub fn check_string(&mut self, arg: i32) -> LuaResult<LuaString> {
        match self.to_stringx(arg)? {
            Some(s) => Ok(s),
            None => Err(self.type_mismatch(arg, "string")),
        }
    }

    /// Integer argument, `default` when absent or nil
    pub fn opt_integer(&self, arg: i32, default: i64) -> LuaResult<i64> {
        if self.is_none_or_nil(arg) {
            Ok(default)
        } else {
            self.check_integer(arg)
        }
    }
}
