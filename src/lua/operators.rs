//! Arithmetic, comparison, length and concatenation
//!
//! Each operator first tries the primitive operation and then falls back to
//! the operands' metamethods. With no handler the operation is a type error.

use crate::error::{LuaError, LuaResult};

use super::metamethod::MetamethodType;
use super::number;
use super::state::LuaState;
use super::value::{LuaString, Value};

/// Arithmetic and bitwise operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
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
}

impl ArithOp {
    fn event(self) -> MetamethodType {
        match self {
            ArithOp::Add => MetamethodType::Add,
            ArithOp::Sub => MetamethodType::Sub,
            ArithOp::Mul => MetamethodType::Mul,
            ArithOp::Mod => MetamethodType::Mod,
            ArithOp::Pow => MetamethodType::Pow,
            ArithOp::Div => MetamethodType::Div,
            ArithOp::IDiv => MetamethodType::IDiv,
            ArithOp::BAnd => MetamethodType::BAnd,
            ArithOp::BOr => MetamethodType::BOr,
            ArithOp::BXor => MetamethodType::BXor,
            ArithOp::Shl => MetamethodType::Shl,
            ArithOp::Shr => MetamethodType::Shr,
            ArithOp::Unm => MetamethodType::Unm,
            ArithOp::BNot => MetamethodType::BNot,
        }
    }

    pub fn is_unary(self) -> bool {
        matches!(self, ArithOp::Unm | ArithOp::BNot)
    }

    pub fn is_bitwise(self) -> bool {
        self.event().is_bitwise()
    }

    fn integer_op(self, a: i64, b: i64) -> LuaResult<Option<i64>> {
        let result = match self {
            ArithOp::Add => a.wrapping_add(b),
            ArithOp::Sub => a.wrapping_sub(b),
            ArithOp::Mul => a.wrapping_mul(b),
            ArithOp::Mod => {
                if b == 0 {
                    return Err(LuaError::ArithmeticError("attempt to perform 'n%0'".to_string()));
                }
                number::int_floor_mod(a, b)
            }
            ArithOp::IDiv => {
                if b == 0 {
                    return Err(LuaError::ArithmeticError("attempt to perform 'n//0'".to_string()));
                }
                number::int_floor_div(a, b)
            }
            ArithOp::BAnd => a & b,
            ArithOp::BOr => a | b,
            ArithOp::BXor => a ^ b,
            ArithOp::Shl => number::shift_left(a, b),
            ArithOp::Shr => number::shift_right(a, b),
            ArithOp::Unm => a.wrapping_neg(),
            ArithOp::BNot => !a,
            ArithOp::Pow | ArithOp::Div => return Ok(None),
        };
        Ok(Some(result))
    }

    fn float_op(self, a: f64, b: f64) -> f64 {
        match self {
            ArithOp::Add => a + b,
            ArithOp::Sub => a - b,
            ArithOp::Mul => a * b,
            ArithOp::Mod => number::float_floor_mod(a, b),
            ArithOp::Pow => a.powf(b),
            ArithOp::Div => a / b,
            ArithOp::IDiv => number::float_floor_div(a, b),
            ArithOp::Unm => -a,
            // Bitwise operators never reach the float path
            ArithOp::BAnd | ArithOp::BOr | ArithOp::BXor | ArithOp::Shl | ArithOp::Shr | ArithOp::BNot => f64::NAN,
        }
    }
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Lt,
    Le,
}

/// Primitive arithmetic; `None` when the operands need a metamethod
fn raw_arith(op: ArithOp, a: &Value, b: &Value) -> LuaResult<Option<Value>> {
    if op.is_bitwise() {
        return match (a.to_integer(), b.to_integer()) {
            (Some(x), Some(y)) => Ok(op.integer_op(x, y)?.map(Value::Integer)),
            _ => Ok(None),
        };
    }

    let (Some(x), Some(y)) = (a.to_numeric(), b.to_numeric()) else {
        return Ok(None);
    };
    if let (Value::Integer(i), Value::Integer(j)) = (&x, &y) {
        if let Some(result) = op.integer_op(*i, *j)? {
            return Ok(Some(Value::Integer(result)));
        }
    }
    match (x.to_number(), y.to_number()) {
        (Some(fx), Some(fy)) => Ok(Some(Value::Number(op.float_op(fx, fy)))),
        _ => Ok(None),
    }
}

impl LuaState {
    /// Apply `op` to two values (the second is ignored by unary operators)
    pub(crate) fn arith_values(&mut self, op: ArithOp, a: &Value, b: &Value) -> LuaResult<Value> {
        let b = if op.is_unary() { a } else { b };
        if let Some(result) = raw_arith(op, a, b)? {
            return Ok(result);
        }
        if let Some(result) = self.try_binary_metamethod(a, b, op.event())? {
            return Ok(result);
        }

        if op.is_bitwise() {
            let culprit = if a.to_number().is_none() { a } else { b };
            if culprit.to_number().is_some() {
                return Err(LuaError::ArithmeticError("number has no integer representation".to_string()));
            }
            return Err(LuaError::type_error(format!(
                "attempt to perform bitwise operation on a {} value",
                culprit.type_name()
            )));
        }
        let culprit = if a.to_number().is_none() { a } else { b };
        Err(LuaError::type_error(format!(
            "attempt to perform arithmetic on a {} value",
            culprit.type_name()
        )))
    }

    /// Equality with `__eq` for distinct tables
    pub(crate) fn values_equal(&mut self, a: &Value, b: &Value) -> LuaResult<bool> {
        match (a, b) {
            (Value::Table(x), Value::Table(y)) if !std::rc::Rc::ptr_eq(x, y) => {
                match self.try_binary_metamethod(a, b, MetamethodType::Eq)? {
                    Some(result) => Ok(result.to_boolean()),
                    None => Ok(false),
                }
            }
            _ => Ok(a.raw_equals(b)),
        }
    }

    pub(crate) fn less_than(&mut self, a: &Value, b: &Value) -> LuaResult<bool> {
        if let Some(result) = primitive_order(a, b, false) {
            return Ok(result);
        }
        match self.try_binary_metamethod(a, b, MetamethodType::Lt)? {
            Some(result) => Ok(result.to_boolean()),
            None => Err(compare_error(a, b)),
        }
    }

    pub(crate) fn less_equal(&mut self, a: &Value, b: &Value) -> LuaResult<bool> {
        if let Some(result) = primitive_order(a, b, true) {
            return Ok(result);
        }
        if let Some(result) = self.try_binary_metamethod(a, b, MetamethodType::Le)? {
            return Ok(result.to_boolean());
        }
        // a <= b is not (b < a)
        match self.try_binary_metamethod(b, a, MetamethodType::Lt)? {
            Some(result) => Ok(!result.to_boolean()),
            None => Err(compare_error(a, b)),
        }
    }

    pub(crate) fn compare_values(&mut self, a: &Value, b: &Value, op: CompareOp) -> LuaResult<bool> {
        match op {
            CompareOp::Eq => self.values_equal(a, b),
            CompareOp::Lt => self.less_than(a, b),
            CompareOp::Le => self.less_equal(a, b),
        }
    }

    /// Length operator: string size, `__len`, or table border
    pub(crate) fn len_of(&mut self, value: &Value) -> LuaResult<Value> {
        if let Value::String(s) = value {
            return Ok(Value::Integer(s.len() as i64));
        }
        if let Some(handler) = self.get_metafield(value, MetamethodType::Len) {
            return self.call_metamethod(handler, &[value.clone(), value.clone()]);
        }
        match value {
            Value::Table(t) => Ok(Value::Integer(t.borrow().len() as i64)),
            other => Err(LuaError::type_error(format!(
                "attempt to get length of a {} value",
                other.type_name()
            ))),
        }
    }

    /// `a .. b`
    pub(crate) fn concat_values(&mut self, a: &Value, b: &Value) -> LuaResult<Value> {
        if let (Some(x), Some(y)) = (a.to_lua_string(), b.to_lua_string()) {
            let mut bytes = Vec::with_capacity(x.len() + y.len());
            bytes.extend_from_slice(x.as_bytes());
            bytes.extend_from_slice(y.as_bytes());
            return Ok(Value::String(LuaString::from(bytes)));
        }
        if let Some(result) = self.try_binary_metamethod(a, b, MetamethodType::Concat)? {
            return Ok(result);
        }
        let culprit = if a.to_lua_string().is_none() { a } else { b };
        Err(LuaError::type_error(format!(
            "attempt to concatenate a {} value",
            culprit.type_name()
        )))
    }

    /// String form used by `tostring`, honouring `__tostring`
    pub(crate) fn tostring_value(&mut self, value: &Value) -> LuaResult<LuaString> {
        if let Some(handler) = self.get_metafield(value, MetamethodType::ToString) {
            return match self.call_metamethod(handler, &[value.clone()])? {
                Value::String(s) => Ok(s),
                _ => Err(LuaError::type_error("'__tostring' must return a string")),
            };
        }
        Ok(value.to_lua_string().unwrap_or_else(|| LuaString::from(value.to_string())))
    }

    // Stack API versions

    /// Pop the operands (one for unary operators) and push the result
    pub fn arith(&mut self, op: ArithOp) -> LuaResult<()> {
        let b = self.pop_value()?;
        let a = if op.is_unary() { b.clone() } else { self.pop_value()? };
        let result = self.arith_values(op, &a, &b)?;
        self.push(result)
    }

    /// Compare the values at two indices; false when either is invalid
    pub fn compare(&mut self, idx1: i32, idx2: i32, op: CompareOp) -> LuaResult<bool> {
        if !self.is_valid(idx1) || !self.is_valid(idx2) {
            return Ok(false);
        }
        let a = self.index_value(idx1);
        let b = self.index_value(idx2);
        self.compare_values(&a, &b, op)
    }

    /// Push the length of the value at `idx`
    pub fn len(&mut self, idx: i32) -> LuaResult<()> {
        let value = self.index_value(idx);
        let length = self.len_of(&value)?;
        self.push(length)
    }

    /// Pop `n` values and push their concatenation
    pub fn concat(&mut self, n: usize) -> LuaResult<()> {
        if n == 0 {
            return self.push_string("");
        }
        let mut values = self.stack.pop_n(n)?;
        let mut acc = values.pop().unwrap_or_default();
        while let Some(left) = values.pop() {
            acc = self.concat_values(&left, &acc)?;
        }
        self.push(acc)
    }
}

fn primitive_order(a: &Value, b: &Value, or_equal: bool) -> Option<bool> {
    let ordering = match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => x.partial_cmp(y),
        (Value::Integer(x), Value::Number(y)) => number::cmp_int_float(*x, *y),
        (Value::Number(x), Value::Integer(y)) => number::cmp_int_float(*y, *x).map(std::cmp::Ordering::reverse),
        (Value::Number(x), Value::Number(y)) => x.partial_cmp(y),
        (Value::String(x), Value::String(y)) => x.as_bytes().partial_cmp(y.as_bytes()),
        _ => return None,
    };
    // NaN compares false
    Some(match ordering {
        Some(std::cmp::Ordering::Less) => true,
        Some(std::cmp::Ordering::Equal) => or_equal,
        _ => false,
    })
}

fn compare_error(a: &Value, b: &Value) -> LuaError {
    let (ta, tb) = (a.type_name(), b.type_name());
    if ta == tb {
        LuaError::type_error(format!("attempt to compare two {} values", ta))
    } else {
        LuaError::type_error(format!("attempt to compare {} with {}", ta, tb))
    }
}
