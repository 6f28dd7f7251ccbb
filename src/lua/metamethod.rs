//! Metamethod Support for Lua VM
//!
//! Metatables come from the table itself or, for every other type, from a
//! per-type slot in the registry. Handlers are invoked through the normal
//! call path and produce a single result.

use std::fmt;

use crate::error::{LuaError, LuaResult};

use super::state::{LuaState, MULTRET};
use super::table::TableRef;
use super::value::Value;

/// Types of metamethods supported by Lua
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetamethodType {
    /// __index - table indexing
    Index,

    /// __newindex - table assignment
    NewIndex,

    /// __call - function call
    Call,

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

    /// __concat - concatenation
    Concat,

    /// __len - length operator
    Len,

    Eq,
    Lt,
    Le,

    /// __tostring - string conversion by `tostring` and `print`
    ToString,
}

impl MetamethodType {
    /// Get the string name of the metamethod
    pub fn name(&self) -> &'static str {
        match self {
            MetamethodType::Index => "__index",
            MetamethodType::NewIndex => "__newindex",
            MetamethodType::Call => "__call",
            MetamethodType::Add => "__add",
            MetamethodType::Sub => "__sub",
            MetamethodType::Mul => "__mul",
            MetamethodType::Mod => "__mod",
            MetamethodType::Pow => "__pow",
            MetamethodType::Div => "__div",
            MetamethodType::IDiv => "__idiv",
            MetamethodType::BAnd => "__band",
            MetamethodType::BOr => "__bor",
            MetamethodType::BXor => "__bxor",
            MetamethodType::Shl => "__shl",
            MetamethodType::Shr => "__shr",
            MetamethodType::Unm => "__unm",
            MetamethodType::BNot => "__bnot",
            MetamethodType::Concat => "__concat",
            MetamethodType::Len => "__len",
            MetamethodType::Eq => "__eq",
            MetamethodType::Lt => "__lt",
            MetamethodType::Le => "__le",
            MetamethodType::ToString => "__tostring",
        }
    }

    /// Check if this metamethod is a comparison metamethod
    pub fn is_comparison(&self) -> bool {
        matches!(self, MetamethodType::Eq | MetamethodType::Lt | MetamethodType::Le)
    }

    /// Check if this metamethod is a bitwise metamethod
    pub fn is_bitwise(&self) -> bool {
        matches!(
            self,
            MetamethodType::BAnd
                | MetamethodType::BOr
                | MetamethodType::BXor
                | MetamethodType::Shl
                | MetamethodType::Shr
                | MetamethodType::BNot
        )
    }
}

impl fmt::Display for MetamethodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Registry key of the shared metatable for a non-table type
fn type_metatable_key(value: &Value) -> String {
    format!("_MT{}", value.type_name())
}

impl LuaState {
    /// Metatable of any value
    pub(crate) fn metatable_of(&self, value: &Value) -> Option<TableRef> {
        match value {
            Value::Table(t) => t.borrow().metatable(),
            other => match self.registry.borrow().get_str(&type_metatable_key(other)) {
                Value::Table(mt) => Some(mt),
                _ => None,
            },
        }
    }

    pub(crate) fn set_metatable_of(&mut self, value: &Value, mt: Option<TableRef>) -> LuaResult<()> {
        match value {
            Value::Table(t) => {
                t.borrow_mut().set_metatable(mt);
                Ok(())
            }
            other => {
                let mt = mt.map(Value::Table).unwrap_or_default();
                self.registry.borrow_mut().set_str(&type_metatable_key(other), mt)
            }
        }
    }

    /// Non-nil metatable field of a value
    pub(crate) fn get_metafield(&self, value: &Value, event: MetamethodType) -> Option<Value> {
        let mt = self.metatable_of(value)?;
        let field = mt.borrow().get_str(event.name());
        if field.is_nil() {
            None
        } else {
            Some(field)
        }
    }

    /// Call `handler` with `args`, keeping exactly one result
    pub(crate) fn call_metamethod(&mut self, handler: Value, args: &[Value]) -> LuaResult<Value> {
        let mut results = self.call_metamethod_n(handler, args, 1)?;
        Ok(results.pop().unwrap_or_default())
    }

    /// Call `handler` with `args`, returning `n_results` values
    /// (all of them for `MULTRET`)
    pub(crate) fn call_metamethod_n(&mut self, handler: Value, args: &[Value], n_results: i32) -> LuaResult<Vec<Value>> {
        if !self.check_stack(args.len() + 1) {
            return Err(LuaError::StackOverflow);
        }
        let base = self.get_top();
        self.push(handler)?;
        for arg in args {
            self.push(arg.clone())?;
        }
        self.call(args.len(), n_results)?;
        let n = if n_results == MULTRET { self.get_top() - base } else { n_results };
        self.stack.pop_n(n as usize)
    }

    /// Try the left operand's handler, then the right's
    pub(crate) fn try_binary_metamethod(&mut self, a: &Value, b: &Value, event: MetamethodType) -> LuaResult<Option<Value>> {
        let handler = match self.get_metafield(a, event).or_else(|| self.get_metafield(b, event)) {
            Some(handler) => handler,
            None => return Ok(None),
        };
        self.call_metamethod(handler, &[a.clone(), b.clone()]).map(Some)
    }
}
