//! Lua value types
//!
//! Tables and closures are reference types shared through `Rc`. Strings are
//! immutable byte buffers, cheap to clone.

use std::fmt;
use std::rc::Rc;

use super::closure::ClosureRef;
use super::number;
use super::table::{Table, TableRef};

/// Immutable Lua string, a shared byte buffer
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LuaString(Rc<[u8]>);

impl LuaString {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// UTF-8 view of the bytes, replacing invalid sequences
    pub fn to_str_lossy(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.0)
    }

    /// Numeric value of the string, integer first then float
    pub fn parse_number(&self) -> Option<Value> {
        let s = std::str::from_utf8(&self.0).ok()?;
        number::parse_integer(s)
            .map(Value::Integer)
            .or_else(|| number::parse_float(s).map(Value::Number))
    }
}

impl From<&str> for LuaString {
    fn from(s: &str) -> Self {
        LuaString(Rc::from(s.as_bytes()))
    }
}

impl From<String> for LuaString {
    fn from(s: String) -> Self {
        LuaString(Rc::from(s.into_bytes()))
    }
}

impl From<&[u8]> for LuaString {
    fn from(b: &[u8]) -> Self {
        LuaString(Rc::from(b))
    }
}

impl From<Vec<u8>> for LuaString {
    fn from(b: Vec<u8>) -> Self {
        LuaString(Rc::from(b))
    }
}

impl fmt::Debug for LuaString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.to_str_lossy())
    }
}

impl fmt::Display for LuaString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_str_lossy())
    }
}

/// Basic type tags, as reported by `type`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LuaType {
    /// Invalid stack index
    None,
    Nil,
    Boolean,
    Number,
    String,
    Table,
    Function,
}

impl LuaType {
    pub fn name(self) -> &'static str {
        match self {
            LuaType::None => "no value",
            LuaType::Nil => "nil",
            LuaType::Boolean => "boolean",
            LuaType::Number => "number",
            LuaType::String => "string",
            LuaType::Table => "table",
            LuaType::Function => "function",
        }
    }
}

impl fmt::Display for LuaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Main Lua value type
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Nil,
    Boolean(bool),
    Integer(i64),
    Number(f64),
    String(LuaString),
    Table(TableRef),
    Function(ClosureRef),
}

impl Value {
    /// Create a value holding a fresh empty table
    pub fn new_table() -> Self {
        Value::Table(Table::new_ref(0, 0))
    }

    pub fn type_of(&self) -> LuaType {
        match self {
            Value::Nil => LuaType::Nil,
            Value::Boolean(_) => LuaType::Boolean,
            Value::Integer(_) | Value::Number(_) => LuaType::Number,
            Value::String(_) => LuaType::String,
            Value::Table(_) => LuaType::Table,
            Value::Function(_) => LuaType::Function,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_of().name()
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Only nil and false are falsy
    pub fn is_falsy(&self) -> bool {
        matches!(self, Value::Nil | Value::Boolean(false))
    }

    pub fn to_boolean(&self) -> bool {
        !self.is_falsy()
    }

    /// Numeric value, converting strings; integers stay integers
    pub fn to_numeric(&self) -> Option<Value> {
        match self {
            Value::Integer(_) | Value::Number(_) => Some(self.clone()),
            Value::String(s) => s.parse_number(),
            _ => None,
        }
    }

    pub fn to_number(&self) -> Option<f64> {
        match self.to_numeric()? {
            Value::Integer(i) => Some(i as f64),
            Value::Number(n) => Some(n),
            _ => None,
        }
    }

    /// Integer value when the number has an exact integer representation
    pub fn to_integer(&self) -> Option<i64> {
        match self.to_numeric()? {
            Value::Integer(i) => Some(i),
            Value::Number(n) => number::float_to_integer(n),
            _ => None,
        }
    }

    /// String value, formatting numbers
    pub fn to_lua_string(&self) -> Option<LuaString> {
        match self {
            Value::String(s) => Some(s.clone()),
            Value::Integer(i) => Some(LuaString::from(i.to_string())),
            Value::Number(n) => Some(LuaString::from(number::format_float(*n))),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&TableRef> {
        match self {
            Value::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&ClosureRef> {
        match self {
            Value::Function(c) => Some(c),
            _ => None,
        }
    }

    /// Identity of reference values, for display and hashing
    pub(crate) fn ref_ptr(&self) -> Option<*const ()> {
        match self {
            Value::Table(t) => Some(Rc::as_ptr(t) as *const ()),
            Value::Function(c) => Some(Rc::as_ptr(c) as *const ()),
            _ => None,
        }
    }

    /// Primitive equality, without `__eq`
    pub fn raw_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Integer(i), Value::Number(n)) | (Value::Number(n), Value::Integer(i)) => {
                number::float_to_integer(*n) == Some(*i)
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Table(a), Value::Table(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Structural equality: numbers compare by subtype and value, references by
/// identity. Use [`Value::raw_equals`] for Lua's `rawequal`.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Integer(_), Value::Number(_)) | (Value::Number(_), Value::Integer(_)) => false,
            _ => self.raw_equals(other),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "Nil"),
            Value::Boolean(b) => f.debug_tuple("Boolean").field(b).finish(),
            Value::Integer(i) => f.debug_tuple("Integer").field(i).finish(),
            Value::Number(n) => f.debug_tuple("Number").field(n).finish(),
            Value::String(s) => f.debug_tuple("String").field(s).finish(),
            Value::Table(t) => write!(f, "Table({:p})", Rc::as_ptr(t)),
            Value::Function(c) => write!(f, "Function({:p})", Rc::as_ptr(c)),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Number(n) => f.write_str(&number::format_float(*n)),
            Value::String(s) => write!(f, "{}", s),
            Value::Table(t) => write!(f, "table: {:p}", Rc::as_ptr(t)),
            Value::Function(c) if c.is_native() => write!(f, "function: builtin: {:p}", Rc::as_ptr(c)),
            Value::Function(c) => write!(f, "function: {:p}", Rc::as_ptr(c)),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(LuaString::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(LuaString::from(s))
    }
}

impl From<LuaString> for Value {
    fn from(s: LuaString) -> Self {
        Value::String(s)
    }
}
