//! Operators executed through bytecode

mod common;

use common::*;
use luavm::lua::OpCode;
use luavm::{LuaError, LuaResult, LuaState, Value};

#[test]
fn test_division_flavours() {
    let mut state = new_state();
    let proto = main_proto(
        vec![
            abx(OpCode::LoadK, 0, 0),
            abx(OpCode::LoadK, 1, 1),
            abc(OpCode::Div, 2, 0, 1),
            abc(OpCode::IDiv, 3, 0, 1),
            abc(OpCode::Mod, 4, k(2), 0),
            abc(OpCode::Pow, 5, 1, 1),
            abc(OpCode::Return, 2, 5, 0),
        ],
        vec![int(3), int(2), int(-7)],
        6,
    );
    let results = run(&mut state, &proto).unwrap();
    assert_eq!(
        results,
        vec![Value::Number(1.5), Value::Integer(1), Value::Integer(2), Value::Number(4.0)]
    );
}

#[test]
fn test_mixed_and_string_operands() {
    let mut state = new_state();
    let proto = main_proto(
        vec![
            abc(OpCode::Add, 0, k(0), k(1)),
            abc(OpCode::Mul, 1, k(2), k(0)),
            abc(OpCode::Unm, 2, 0, 0),
            abc(OpCode::Return, 0, 4, 0),
        ],
        vec![int(1), float(0.5), string("10")],
        3,
    );
    let results = run(&mut state, &proto).unwrap();
    assert_eq!(results, vec![Value::Number(1.5), Value::Integer(10), Value::Number(-1.5)]);
}

#[test]
fn test_shifts_and_bitwise() {
    let mut state = new_state();
    let proto = main_proto(
        vec![
            abc(OpCode::Shl, 0, k(0), k(0)),
            abc(OpCode::Shl, 1, k(1), k(2)),
            abc(OpCode::Shr, 2, k(1), k(3)),
            abc(OpCode::BAnd, 3, k(1), k(4)),
            abc(OpCode::BNot, 4, 3, 0),
            abc(OpCode::Return, 0, 6, 0),
        ],
        vec![int(1), int(0x0ff0), int(-4), int(4), float(255.0)],
        5,
    );
    let results = run(&mut state, &proto).unwrap();
    assert_eq!(results[0], Value::Integer(2));
    assert_eq!(results[1], results[2]);
    assert_eq!(results[1], Value::Integer(0x00ff));
    assert_eq!(results[3], Value::Integer(0xf0));
    assert_eq!(results[4], Value::Integer(!0xf0));
}

#[test]
fn test_integer_division_by_zero() {
    let mut state = new_state();
    let proto = main_proto(
        vec![abc(OpCode::IDiv, 0, k(0), k(1)), abc(OpCode::Return, 0, 2, 0)],
        vec![int(1), int(0)],
        1,
    );
    let err = run(&mut state, &proto).unwrap_err();
    assert!(matches!(err, LuaError::ArithmeticError(_)));
    assert_eq!(err.to_string(), "attempt to perform 'n//0'");

    // Float division by zero is fine
    let proto = main_proto(
        vec![abc(OpCode::Div, 0, k(0), k(1)), abc(OpCode::Return, 0, 2, 0)],
        vec![int(1), int(0)],
        1,
    );
    assert_eq!(run(&mut state, &proto).unwrap(), vec![Value::Number(f64::INFINITY)]);
}

fn left_add(state: &mut LuaState) -> LuaResult<usize> {
    state.push_string("left")?;
    Ok(1)
}

fn right_add(state: &mut LuaState) -> LuaResult<usize> {
    state.push_string("right")?;
    Ok(1)
}

fn global_with_add(state: &mut LuaState, name: &str, handler: luavm::lua::NativeFunction) {
    state.new_table().unwrap();
    state.new_table().unwrap();
    state.push_native_function(handler).unwrap();
    state.set_field(-2, "__add").unwrap();
    state.set_metatable(-2).unwrap();
    state.set_global(name).unwrap();
}

#[test]
fn test_add_metamethod_prefers_left_operand() {
    let mut state = new_state();
    global_with_add(&mut state, "a", left_add);
    global_with_add(&mut state, "b", right_add);

    let proto = main_proto(
        vec![
            abc(OpCode::GetTabUp, 0, 0, k(0)),
            abc(OpCode::GetTabUp, 1, 0, k(1)),
            abc(OpCode::Add, 2, 0, 1),
            abc(OpCode::Add, 3, 1, 0),
            abc(OpCode::Add, 4, k(2), 1),
            abc(OpCode::Return, 2, 4, 0),
        ],
        vec![string("a"), string("b"), int(5)],
        5,
    );
    let results = run(&mut state, &proto).unwrap();
    assert_eq!(results, vec![Value::from("left"), Value::from("right"), Value::from("right")]);
}

#[test]
fn test_missing_metamethod_is_a_type_error() {
    let mut state = new_state();
    state.new_table().unwrap();
    state.set_global("plain").unwrap();

    let proto = main_proto(
        vec![
            abc(OpCode::GetTabUp, 0, 0, k(0)),
            abc(OpCode::Add, 1, 0, k(1)),
            abc(OpCode::Return, 1, 2, 0),
        ],
        vec![string("plain"), int(1)],
        2,
    );
    let err = run(&mut state, &proto).unwrap_err();
    assert!(matches!(err, LuaError::TypeError(_)));
    assert_eq!(err.to_string(), "attempt to perform arithmetic on a table value");
    assert_eq!(state.call_depth(), 0);
}

#[test]
fn test_comparisons_drive_jumps() {
    // return 1 < 2, "a" <= "b", 1 == 1.0
    let mut state = new_state();
    let mut code = Vec::new();
    for (reg, op, b, c) in [(0, OpCode::Lt, k(0), k(1)), (1, OpCode::Le, k(2), k(3)), (2, OpCode::Eq, k(0), k(4))] {
        code.push(abc(op, 1, b, c));
        code.push(asbx(OpCode::Jmp, 0, 1));
        code.push(abc(OpCode::LoadBool, reg, 0, 1));
        code.push(abc(OpCode::LoadBool, reg, 1, 0));
    }
    code.push(abc(OpCode::Return, 0, 4, 0));

    let proto = main_proto(code, vec![int(1), int(2), string("a"), string("b"), float(1.0)], 3);
    let results = run(&mut state, &proto).unwrap();
    assert_eq!(results, vec![Value::Boolean(true); 3]);
}

#[test]
fn test_comparing_incompatible_values_fails() {
    let mut state = new_state();
    let proto = main_proto(
        vec![abc(OpCode::Lt, 1, k(0), k(1)), abc(OpCode::Return, 0, 1, 0)],
        vec![int(1), string("x")],
        1,
    );
    let err = run(&mut state, &proto).unwrap_err();
    assert_eq!(err.to_string(), "attempt to compare number with string");
}

#[test]
fn test_loadkx_reads_the_extra_argument() {
    let mut state = new_state();
    let proto = main_proto(
        vec![
            abx(OpCode::LoadKX, 0, 0),
            ax(OpCode::ExtraArg, 1),
            abc(OpCode::Return, 0, 2, 0),
        ],
        vec![int(0), int(7)],
        1,
    );
    assert_eq!(run(&mut state, &proto).unwrap(), vec![Value::Integer(7)]);
}

fn always_equal(state: &mut LuaState) -> LuaResult<usize> {
    state.push_boolean(true)?;
    Ok(1)
}

fn smaller_size(state: &mut LuaState) -> LuaResult<usize> {
    state.get_field(1, "size")?;
    state.get_field(2, "size")?;
    let less = state.to_integer(-2) < state.to_integer(-1);
    state.push_boolean(less)?;
    Ok(1)
}

fn concat_cat(state: &mut LuaState) -> LuaResult<usize> {
    state.push_string("cat")?;
    Ok(1)
}

fn length_nine(state: &mut LuaState) -> LuaResult<usize> {
    state.push_integer(9)?;
    Ok(1)
}

/// Global table `name` with a `size` field and comparison, concat and
/// length metamethods; no `__le`, so `<=` falls back to `__lt`
fn global_sized(state: &mut LuaState, name: &str, size: i64) {
    state.new_table().unwrap();
    state.push_integer(size).unwrap();
    state.set_field(-2, "size").unwrap();
    state.new_table().unwrap();
    for (event, handler) in [
        ("__eq", always_equal as luavm::lua::NativeFunction),
        ("__lt", smaller_size),
        ("__concat", concat_cat),
        ("__len", length_nine),
    ] {
        state.push_native_function(handler).unwrap();
        state.set_field(-2, event).unwrap();
    }
    state.set_metatable(-2).unwrap();
    state.set_global(name).unwrap();
}

#[test]
fn test_comparison_metamethods() {
    // return a == b, a < b, b <= a, a <= b
    let mut state = new_state();
    global_sized(&mut state, "a", 1);
    global_sized(&mut state, "b", 2);

    let mut code = vec![abc(OpCode::GetTabUp, 0, 0, k(0)), abc(OpCode::GetTabUp, 1, 0, k(1))];
    for (reg, op, b, c) in [(2, OpCode::Eq, 0, 1), (3, OpCode::Lt, 0, 1), (4, OpCode::Le, 1, 0), (5, OpCode::Le, 0, 1)] {
        code.push(abc(op, 1, b, c));
        code.push(asbx(OpCode::Jmp, 0, 1));
        code.push(abc(OpCode::LoadBool, reg, 0, 1));
        code.push(abc(OpCode::LoadBool, reg, 1, 0));
    }
    code.push(abc(OpCode::Return, 2, 5, 0));

    let proto = main_proto(code, vec![string("a"), string("b")], 6);
    let results = run(&mut state, &proto).unwrap();
    assert_eq!(
        results,
        vec![Value::Boolean(true), Value::Boolean(true), Value::Boolean(false), Value::Boolean(true)]
    );
}

#[test]
fn test_concat_and_len_metamethods() {
    // return "x" .. a, #a
    let mut state = new_state();
    global_sized(&mut state, "a", 1);

    let proto = main_proto(
        vec![
            abc(OpCode::GetTabUp, 0, 0, k(0)),
            abx(OpCode::LoadK, 1, 1),
            abc(OpCode::Move, 2, 0, 0),
            abc(OpCode::Concat, 3, 1, 2),
            abc(OpCode::Len, 4, 0, 0),
            abc(OpCode::Return, 3, 3, 0),
        ],
        vec![string("a"), string("x")],
        5,
    );
    let results = run(&mut state, &proto).unwrap();
    assert_eq!(results, vec![Value::from("cat"), Value::Integer(9)]);
}
