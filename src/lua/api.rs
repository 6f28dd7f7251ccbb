//! Access and push functions of the host API

use std::rc::Rc;

use crate::error::{LuaError, LuaResult};

use super::closure::{Closure, NativeFunction};
use super::state::{LuaState, RIDX_GLOBALS};
use super::value::{LuaString, LuaType, Value};

impl LuaState {
    // Access functions (stack -> host)

    /// Type of the value at `idx`; `LuaType::None` for invalid indices
    pub fn type_of(&self, idx: i32) -> LuaType {
        if self.is_valid(idx) {
            self.index_value(idx).type_of()
        } else {
            LuaType::None
        }
    }

    pub fn type_name(&self, tp: LuaType) -> &'static str {
        tp.name()
    }

    /// Whether `idx` refers to an acceptable stack slot or pseudo-index
    pub fn is_valid(&self, idx: i32) -> bool {
        if idx == super::state::REGISTRY_INDEX {
            return true;
        }
        if idx < super::state::REGISTRY_INDEX {
            let n = (super::state::REGISTRY_INDEX - idx) as usize;
            return self.stack.closure.as_ref().map_or(false, |c| n <= c.upvalue_count());
        }
        self.stack.is_valid(idx)
    }

    pub fn is_none(&self, idx: i32) -> bool {
        self.type_of(idx) == LuaType::None
    }

    pub fn is_nil(&self, idx: i32) -> bool {
        self.type_of(idx) == LuaType::Nil
    }

    pub fn is_none_or_nil(&self, idx: i32) -> bool {
        matches!(self.type_of(idx), LuaType::None | LuaType::Nil)
    }

    pub fn is_boolean(&self, idx: i32) -> bool {
        self.type_of(idx) == LuaType::Boolean
    }

    pub fn is_table(&self, idx: i32) -> bool {
        self.type_of(idx) == LuaType::Table
    }

    pub fn is_function(&self, idx: i32) -> bool {
        self.type_of(idx) == LuaType::Function
    }

    pub fn is_native_function(&self, idx: i32) -> bool {
        matches!(self.index_value(idx), Value::Function(c) if c.is_native())
    }

    /// True for strings and numbers, which convert to strings
    pub fn is_string(&self, idx: i32) -> bool {
        matches!(self.type_of(idx), LuaType::String | LuaType::Number)
    }

    /// True for numbers and numeric strings
    pub fn is_number(&self, idx: i32) -> bool {
        self.to_numberx(idx).is_some()
    }

    /// True only for values of the integer subtype
    pub fn is_integer(&self, idx: i32) -> bool {
        matches!(self.index_value(idx), Value::Integer(_))
    }

    pub fn to_boolean(&self, idx: i32) -> bool {
        self.index_value(idx).to_boolean()
    }

    pub fn to_number(&self, idx: i32) -> f64 {
        self.to_numberx(idx).unwrap_or(0.0)
    }

    pub fn to_numberx(&self, idx: i32) -> Option<f64> {
        self.index_value(idx).to_number()
    }

    pub fn to_integer(&self, idx: i32) -> i64 {
        self.to_integerx(idx).unwrap_or(0)
    }

    pub fn to_integerx(&self, idx: i32) -> Option<i64> {
        self.index_value(idx).to_integer()
    }

    /// String form of the value; numbers are converted in place
    pub fn to_stringx(&mut self, idx: i32) -> LuaResult<Option<LuaString>> {
        let value = self.index_value(idx);
        match value {
            Value::String(s) => Ok(Some(s)),
            Value::Integer(_) | Value::Number(_) => {
                let s = value.to_lua_string().unwrap_or_else(|| LuaString::from(""));
                self.set_index_value(idx, Value::String(s.clone()))?;
                Ok(Some(s))
            }
            _ => Ok(None),
        }
    }

    pub fn to_string(&mut self, idx: i32) -> LuaResult<String> {
        Ok(self.to_stringx(idx)?.map(|s| s.to_str_lossy().into_owned()).unwrap_or_default())
    }

    // Push functions (host -> stack)

    pub fn push_nil(&mut self) -> LuaResult<()> {
        self.push(Value::Nil)
    }

    pub fn push_boolean(&mut self, b: bool) -> LuaResult<()> {
        self.push(Value::Boolean(b))
    }

    pub fn push_integer(&mut self, n: i64) -> LuaResult<()> {
        self.push(Value::Integer(n))
    }

    pub fn push_number(&mut self, n: f64) -> LuaResult<()> {
        self.push(Value::Number(n))
    }

    pub fn push_string(&mut self, s: impl AsRef<[u8]>) -> LuaResult<()> {
        self.push(Value::String(LuaString::from(s.as_ref())))
    }

    pub fn push_native_function(&mut self, f: NativeFunction) -> LuaResult<()> {
        self.push_native_closure(f, 0)
    }

    /// Push a native closure capturing the top `n` values as its upvalues
    pub fn push_native_closure(&mut self, f: NativeFunction, n: usize) -> LuaResult<()> {
        let upvalues = self.stack.pop_n(n)?;
        self.push(Value::Function(Rc::new(Closure::new_native(f, upvalues))))
    }

    pub fn push_global_table(&mut self) -> LuaResult<()> {
        let globals = self.globals();
        self.push(globals)
    }

    /// The globals table
    pub fn globals(&self) -> Value {
        self.registry.borrow().get_int(RIDX_GLOBALS)
    }

    /// Pop the top value as an error to raise: `return Err(state.error())`
    pub fn error(&mut self) -> LuaError {
        match self.stack.pop() {
            Ok(value) => LuaError::Runtime(value),
            Err(err) => err,
        }
    }
}
