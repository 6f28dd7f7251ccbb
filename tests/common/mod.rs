//! Bytecode assembly helpers shared by the integration tests

#![allow(dead_code)]

use luavm::chunk::{dump, Constant, Prototype, UpvalueDesc};
use luavm::lua::instruction::{rk_as_k, Instruction};
use luavm::lua::OpCode;
use luavm::{open_base, LuaResult, LuaState, Value, MULTRET};

pub fn abc(op: OpCode, a: u32, b: u32, c: u32) -> u32 {
    Instruction::encode_abc(op, a, b, c).0
}

pub fn abx(op: OpCode, a: u32, bx: u32) -> u32 {
    Instruction::encode_abx(op, a, bx).0
}

pub fn asbx(op: OpCode, a: u32, sbx: i32) -> u32 {
    Instruction::encode_asbx(op, a, sbx).0
}

pub fn ax(op: OpCode, ax: u32) -> u32 {
    Instruction::encode_ax(op, ax).0
}

/// RK operand naming constant `i`
pub fn k(i: u32) -> u32 {
    rk_as_k(i)
}

pub fn int(n: i64) -> Constant {
    Constant::Integer(n)
}

pub fn float(n: f64) -> Constant {
    Constant::Number(n)
}

pub fn string(s: &str) -> Constant {
    Constant::String(s.into())
}

/// A main chunk: vararg, with `_ENV` as its only upvalue
pub fn main_proto(code: Vec<u32>, constants: Vec<Constant>, max_stack_size: u8) -> Prototype {
    Prototype {
        source: "=test".to_string(),
        is_vararg: true,
        max_stack_size,
        code,
        constants,
        upvalues: vec![UpvalueDesc { in_stack: true, index: 0 }],
        ..Prototype::default()
    }
}

/// A nested function
pub fn function_proto(
    num_params: u8,
    code: Vec<u32>,
    constants: Vec<Constant>,
    max_stack_size: u8,
    upvalues: Vec<UpvalueDesc>,
) -> Prototype {
    Prototype {
        num_params,
        max_stack_size,
        code,
        constants,
        upvalues,
        ..Prototype::default()
    }
}

pub fn in_stack(index: u8) -> UpvalueDesc {
    UpvalueDesc { in_stack: true, index }
}

pub fn enclosing(index: u8) -> UpvalueDesc {
    UpvalueDesc { in_stack: false, index }
}

/// A state with the base library and test logging
pub fn new_state() -> LuaState {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let mut state = LuaState::new();
    open_base(&mut state).expect("base library");
    state
}

/// Serialise `proto`, load it and call it, collecting every result
pub fn run(state: &mut LuaState, proto: &Prototype) -> LuaResult<Vec<Value>> {
    let base = state.get_top();
    state.load(&dump(proto), "test")?;
    state.call(0, MULTRET)?;
    let results = (base + 1..=state.get_top()).map(|i| value_at(state, i)).collect();
    state.set_top(base)?;
    Ok(results)
}

/// Copy of the value at `idx`
pub fn value_at(state: &mut LuaState, idx: i32) -> Value {
    state.push_value(idx).expect("push");
    state.pop_value().expect("pop")
}
