//! Base library
//!
//! The functions every chunk expects in its global environment.

use crate::error::{LuaError, LuaResult};
use crate::lua::closure::NativeFunction;
use crate::lua::number;
use crate::lua::state::{LuaState, MULTRET};
use crate::lua::value::{LuaType, Value};

const BASE_FUNCTIONS: &[(&str, NativeFunction)] = &[
    ("assert", base_assert),
    ("error", base_error),
    ("getmetatable", base_getmetatable),
    ("ipairs", base_ipairs),
    ("next", base_next),
    ("pairs", base_pairs),
    ("pcall", base_pcall),
    ("print", base_print),
    ("rawequal", base_rawequal),
    ("rawget", base_rawget),
    ("rawlen", base_rawlen),
    ("rawset", base_rawset),
    ("select", base_select),
    ("setmetatable", base_setmetatable),
    ("tonumber", base_tonumber),
    ("tostring", base_tostring),
    ("type", base_type),
];

/// Register the base library in the globals table
pub fn open_base(state: &mut LuaState) -> LuaResult<()> {
    for &(name, f) in BASE_FUNCTIONS {
        state.register(name, f)?;
    }
    state.push_global_table()?;
    state.set_global("_G")?;
    state.push_string("Lua 5.3")?;
    state.set_global("_VERSION")?;

    tracing::debug!(target: "luavm::call", functions = BASE_FUNCTIONS.len(), "base library opened");
    Ok(())
}

/// print(...)
fn base_print(state: &mut LuaState) -> LuaResult<usize> {
    let n = state.get_top();
    let mut line = Vec::new();
    for i in 1..=n {
        if i > 1 {
            line.push(b'\t');
        }
        let value = state.index_value(i);
        line.extend_from_slice(state.tostring_value(&value)?.as_bytes());
    }
    println!("{}", String::from_utf8_lossy(&line));
    Ok(0)
}

/// type(v)
fn base_type(state: &mut LuaState) -> LuaResult<usize> {
    state.check_any(1)?;
    let name = state.type_of(1).name();
    state.push_string(name)?;
    Ok(1)
}

/// tostring(v)
fn base_tostring(state: &mut LuaState) -> LuaResult<usize> {
    state.check_any(1)?;
    let value = state.index_value(1);
    let s = state.tostring_value(&value)?;
    state.push(Value::String(s))?;
    Ok(1)
}

/// tonumber(v [, base])
fn base_tonumber(state: &mut LuaState) -> LuaResult<usize> {
    if state.is_none_or_nil(2) {
        state.check_any(1)?;
        let converted = match state.index_value(1) {
            n @ (Value::Integer(_) | Value::Number(_)) => n,
            Value::String(s) => s.parse_number().unwrap_or_default(),
            _ => Value::Nil,
        };
        state.push(converted)?;
        return Ok(1);
    }

    let base = state.check_integer(2)?;
    state.check_type(1, LuaType::String)?;
    if !(2..=36).contains(&base) {
        return Err(state.arg_error(2, "base out of range"));
    }
    let s = state.check_string(1)?;
    let converted = std::str::from_utf8(s.as_bytes())
        .ok()
        .and_then(|s| number::parse_integer_base(s, base as u32));
    match converted {
        Some(n) => state.push_integer(n)?,
        None => state.push_nil()?,
    }
    Ok(1)
}

/// error(message)
fn base_error(state: &mut LuaState) -> LuaResult<usize> {
    Err(LuaError::Runtime(state.index_value(1)))
}

/// assert(v [, message])
fn base_assert(state: &mut LuaState) -> LuaResult<usize> {
    state.check_any(1)?;
    if state.to_boolean(1) {
        return Ok(state.get_top() as usize);
    }
    if state.is_none_or_nil(2) {
        return Err(LuaError::Runtime(Value::from("assertion failed!")));
    }
    Err(LuaError::Runtime(state.index_value(2)))
}

/// pcall(f, ...)
fn base_pcall(state: &mut LuaState) -> LuaResult<usize> {
    state.check_any(1)?;
    let n_args = state.get_top() as usize - 1;
    // Status slot goes below the function so the results can fill the frame
    state.push_boolean(true)?;
    state.insert(1)?;
    if !state.pcall(n_args, MULTRET).is_ok() {
        state.push_boolean(false)?;
        state.replace(1)?;
    }
    Ok(state.get_top() as usize)
}

/// select(n, ...) or select('#', ...)
fn base_select(state: &mut LuaState) -> LuaResult<usize> {
    let top = state.get_top() as i64;
    if let Value::String(s) = state.index_value(1) {
        if s.as_bytes() == b"#" {
            state.push_integer(top - 1)?;
            return Ok(1);
        }
    }
    let n = state.check_integer(1)?;
    let n = if n < 0 { top + n } else { n.min(top) };
    if n < 1 {
        return Err(state.arg_error(1, "index out of range"));
    }
    Ok((top - n) as usize)
}

/// next(t [, k])
fn base_next(state: &mut LuaState) -> LuaResult<usize> {
    state.check_type(1, LuaType::Table)?;
    state.set_top(2)?;
    if state.next(1)? {
        Ok(2)
    } else {
        state.push_nil()?;
        Ok(1)
    }
}

/// pairs(t)
fn base_pairs(state: &mut LuaState) -> LuaResult<usize> {
    state.check_any(1)?;
    state.push_native_function(base_next)?;
    state.push_value(1)?;
    state.push_nil()?;
    Ok(3)
}

fn ipairs_step(state: &mut LuaState) -> LuaResult<usize> {
    let i = state.check_integer(2)?.wrapping_add(1);
    state.push_integer(i)?;
    if state.get_i(1, i)? == LuaType::Nil {
        Ok(1)
    } else {
        Ok(2)
    }
}

/// ipairs(t)
fn base_ipairs(state: &mut LuaState) -> LuaResult<usize> {
    state.check_any(1)?;
    state.push_native_function(ipairs_step)?;
    state.push_value(1)?;
    state.push_integer(0)?;
    Ok(3)
}

/// rawget(t, k)
fn base_rawget(state: &mut LuaState) -> LuaResult<usize> {
    state.check_type(1, LuaType::Table)?;
    state.check_any(2)?;
    state.set_top(2)?;
    state.raw_get(1)?;
    Ok(1)
}

/// rawset(t, k, v)
fn base_rawset(state: &mut LuaState) -> LuaResult<usize> {
    state.check_type(1, LuaType::Table)?;
    state.check_any(2)?;
    state.check_any(3)?;
    state.set_top(3)?;
    state.raw_set(1)?;
    Ok(1)
}

/// rawequal(a, b)
fn base_rawequal(state: &mut LuaState) -> LuaResult<usize> {
    state.check_any(1)?;
    state.check_any(2)?;
    let equal = state.raw_equal(1, 2);
    state.push_boolean(equal)?;
    Ok(1)
}

/// rawlen(v)
fn base_rawlen(state: &mut LuaState) -> LuaResult<usize> {
    if !matches!(state.type_of(1), LuaType::Table | LuaType::String) {
        return Err(state.arg_error(1, "table or string expected"));
    }
    let n = state.raw_len(1);
    state.push_integer(n as i64)?;
    Ok(1)
}

/// Push the `__metatable` guard of the value at `idx`; false when unguarded
fn push_guard(state: &mut LuaState, idx: i32) -> LuaResult<bool> {
    if !state.get_metatable(idx)? {
        return Ok(false);
    }
    state.push_string("__metatable")?;
    if state.raw_get(-2)? == LuaType::Nil {
        state.pop(2)?;
        return Ok(false);
    }
    state.remove(-2)?;
    Ok(true)
}

/// getmetatable(v)
fn base_getmetatable(state: &mut LuaState) -> LuaResult<usize> {
    state.check_any(1)?;
    if push_guard(state, 1)? {
        return Ok(1);
    }
    if !state.get_metatable(1)? {
        state.push_nil()?;
    }
    Ok(1)
}

/// setmetatable(t, mt)
fn base_setmetatable(state: &mut LuaState) -> LuaResult<usize> {
    state.check_type(1, LuaType::Table)?;
    if !matches!(state.type_of(2), LuaType::Nil | LuaType::Table) {
        return Err(state.arg_error(2, "nil or table expected"));
    }
    if push_guard(state, 1)? {
        return Err(LuaError::Runtime(Value::from("cannot change a protected metatable")));
    }
    state.set_top(2)?;
    state.set_metatable(1)?;
    Ok(1)
}
