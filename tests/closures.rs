//! Closures, upvalues and call arity

mod common;

use common::*;
use luavm::chunk::Prototype;
use luavm::lua::OpCode;
use luavm::Value;

/// `function() n = n + 1; return n end` over the enclosing local in register 0
fn increment_proto() -> Prototype {
    function_proto(
        0,
        vec![
            abc(OpCode::GetUpval, 0, 0, 0),
            abc(OpCode::Add, 0, 0, k(0)),
            abc(OpCode::SetUpval, 0, 0, 0),
            abc(OpCode::GetUpval, 0, 0, 0),
            abc(OpCode::Return, 0, 2, 0),
        ],
        vec![int(1)],
        1,
        vec![in_stack(0)],
    )
}

/// `function() return n end` over the enclosing local in register 0
fn getter_proto() -> Prototype {
    function_proto(
        0,
        vec![abc(OpCode::GetUpval, 0, 0, 0), abc(OpCode::Return, 0, 2, 0)],
        vec![],
        1,
        vec![in_stack(0)],
    )
}

/// `function() local n = 0; return inc, get end`
fn counter_proto() -> Prototype {
    let mut proto = function_proto(
        0,
        vec![
            abx(OpCode::LoadK, 0, 0),
            abx(OpCode::Closure, 1, 0),
            abx(OpCode::Closure, 2, 1),
            abc(OpCode::Return, 1, 3, 0),
        ],
        vec![int(0)],
        3,
        vec![],
    );
    proto.protos = vec![increment_proto().into(), getter_proto().into()];
    proto
}

#[test]
fn test_closed_variables_detach_after_return() {
    // local inc, get = counter(); inc(); inc(); return get(), inc(), get()
    let mut state = new_state();
    let mut main = main_proto(
        vec![
            abx(OpCode::Closure, 0, 0),
            abc(OpCode::Move, 1, 0, 0),
            abc(OpCode::Call, 1, 1, 3),
            abc(OpCode::Move, 3, 1, 0),
            abc(OpCode::Call, 3, 1, 1),
            abc(OpCode::Move, 3, 1, 0),
            abc(OpCode::Call, 3, 1, 1),
            abc(OpCode::Move, 3, 2, 0),
            abc(OpCode::Call, 3, 1, 2),
            abc(OpCode::Move, 4, 1, 0),
            abc(OpCode::Call, 4, 1, 2),
            abc(OpCode::Move, 5, 2, 0),
            abc(OpCode::Call, 5, 1, 2),
            abc(OpCode::Return, 3, 4, 0),
        ],
        vec![],
        6,
    );
    main.protos = vec![counter_proto().into()];

    let results = run(&mut state, &main).unwrap();
    assert_eq!(results, vec![Value::Integer(0), Value::Integer(3), Value::Integer(0)]);
}

#[test]
fn test_closures_share_a_variable_while_its_frame_is_live() {
    // function() local n = 0; inc(); return get(), inc, get end
    let mut shared = function_proto(
        0,
        vec![
            abx(OpCode::LoadK, 0, 0),
            abx(OpCode::Closure, 1, 0),
            abx(OpCode::Closure, 2, 1),
            abc(OpCode::Move, 3, 1, 0),
            abc(OpCode::Call, 3, 1, 1),
            abc(OpCode::Move, 3, 2, 0),
            abc(OpCode::Call, 3, 1, 2),
            abc(OpCode::Move, 4, 1, 0),
            abc(OpCode::Move, 5, 2, 0),
            abc(OpCode::Return, 3, 4, 0),
        ],
        vec![int(0)],
        6,
        vec![],
    );
    shared.protos = vec![increment_proto().into(), getter_proto().into()];

    // local seen, inc, get = shared(); inc(); return seen, get(), inc()
    let mut state = new_state();
    let mut main = main_proto(
        vec![
            abx(OpCode::Closure, 0, 0),
            abc(OpCode::Move, 1, 0, 0),
            abc(OpCode::Call, 1, 1, 4),
            abc(OpCode::Move, 4, 2, 0),
            abc(OpCode::Call, 4, 1, 1),
            abc(OpCode::Move, 4, 3, 0),
            abc(OpCode::Call, 4, 1, 2),
            abc(OpCode::Move, 5, 2, 0),
            abc(OpCode::Call, 5, 1, 2),
            abc(OpCode::Move, 2, 4, 0),
            abc(OpCode::Move, 3, 5, 0),
            abc(OpCode::Return, 1, 4, 0),
        ],
        vec![],
        6,
    );
    main.protos = vec![shared.into()];

    let results = run(&mut state, &main).unwrap();
    assert_eq!(results, vec![Value::Integer(1), Value::Integer(1), Value::Integer(3)]);
}

#[test]
fn test_each_call_gets_its_own_variable() {
    let mut state = new_state();
    let mut main = main_proto(
        vec![
            abx(OpCode::Closure, 0, 0),
            // inc1, get1 = counter()
            abc(OpCode::Move, 1, 0, 0),
            abc(OpCode::Call, 1, 1, 3),
            // inc2, get2 = counter()
            abc(OpCode::Move, 3, 0, 0),
            abc(OpCode::Call, 3, 1, 3),
            // inc1()
            abc(OpCode::Move, 5, 1, 0),
            abc(OpCode::Call, 5, 1, 1),
            // return get1(), get2()
            abc(OpCode::Move, 5, 2, 0),
            abc(OpCode::Call, 5, 1, 2),
            abc(OpCode::Move, 6, 4, 0),
            abc(OpCode::Call, 6, 1, 2),
            abc(OpCode::Return, 5, 3, 0),
        ],
        vec![],
        7,
    );
    main.protos = vec![counter_proto().into()];

    let results = run(&mut state, &main).unwrap();
    assert_eq!(results, vec![Value::Integer(1), Value::Integer(0)]);
}

#[test]
fn test_open_upvalue_writes_reach_the_frame() {
    // local n = 10; local function inc() n = n + 1 end; inc(); return n
    let mut state = new_state();
    let inc = function_proto(
        0,
        vec![
            abc(OpCode::GetUpval, 0, 0, 0),
            abc(OpCode::Add, 0, 0, k(0)),
            abc(OpCode::SetUpval, 0, 0, 0),
            abc(OpCode::Return, 0, 1, 0),
        ],
        vec![int(1)],
        1,
        vec![in_stack(0)],
    );
    let mut main = main_proto(
        vec![
            abx(OpCode::LoadK, 0, 0),
            abx(OpCode::Closure, 1, 0),
            abc(OpCode::Move, 2, 1, 0),
            abc(OpCode::Call, 2, 1, 1),
            abc(OpCode::Return, 0, 2, 0),
        ],
        vec![int(10)],
        3,
    );
    main.protos = vec![inc.into()];

    assert_eq!(run(&mut state, &main).unwrap(), vec![Value::Integer(11)]);
}

#[test]
fn test_loop_closures_capture_fresh_variables() {
    // local fs = {}; for i = 1, 3 do fs[i] = function() return i end end
    // return fs[1](), fs[3]()
    let mut state = new_state();
    let mut main = main_proto(
        vec![
            abc(OpCode::NewTable, 0, 0, 0),
            abx(OpCode::LoadK, 1, 0),
            abx(OpCode::LoadK, 2, 1),
            abx(OpCode::LoadK, 3, 0),
            asbx(OpCode::ForPrep, 1, 3),
            abx(OpCode::Closure, 5, 0),
            abc(OpCode::SetTable, 0, 4, 5),
            asbx(OpCode::Jmp, 5, 0),
            asbx(OpCode::ForLoop, 1, -4),
            abc(OpCode::GetTable, 5, 0, k(0)),
            abc(OpCode::Call, 5, 1, 2),
            abc(OpCode::GetTable, 6, 0, k(1)),
            abc(OpCode::Call, 6, 1, 2),
            abc(OpCode::Return, 5, 3, 0),
        ],
        vec![int(1), int(3)],
        7,
    );
    main.protos = vec![function_proto(
        0,
        vec![abc(OpCode::GetUpval, 0, 0, 0), abc(OpCode::Return, 0, 2, 0)],
        vec![],
        1,
        vec![in_stack(4)],
    )
    .into()];

    assert_eq!(run(&mut state, &main).unwrap(), vec![Value::Integer(1), Value::Integer(3)]);
}

#[test]
fn test_call_arity_padding_and_truncation() {
    let mut state = new_state();
    // function(a, b) return a, b end
    let pair = function_proto(2, vec![abc(OpCode::Return, 0, 3, 0)], vec![], 2, vec![]);
    let mut main = main_proto(
        vec![
            abx(OpCode::Closure, 0, 0),
            // R1, R2 = f(1)
            abc(OpCode::Move, 1, 0, 0),
            abx(OpCode::LoadK, 2, 0),
            abc(OpCode::Call, 1, 2, 3),
            // R3 = f(1, 2, 3)
            abc(OpCode::Move, 3, 0, 0),
            abx(OpCode::LoadK, 4, 0),
            abx(OpCode::LoadK, 5, 1),
            abx(OpCode::LoadK, 6, 2),
            abc(OpCode::Call, 3, 4, 2),
            // R4, R5, R6 = f(2)
            abc(OpCode::Move, 4, 0, 0),
            abx(OpCode::LoadK, 5, 1),
            abc(OpCode::Call, 4, 2, 4),
            abc(OpCode::Return, 1, 7, 0),
        ],
        vec![int(1), int(2), int(3)],
        7,
    );
    main.protos = vec![pair.into()];

    let results = run(&mut state, &main).unwrap();
    assert_eq!(
        results,
        vec![
            Value::Integer(1),
            Value::Nil,
            Value::Integer(1),
            Value::Integer(2),
            Value::Nil,
            Value::Nil,
        ]
    );
}

#[test]
fn test_varargs_pass_through_calls() {
    // local function g(...) return select('#', ...), ... end
    // return g(10, 20, nil)
    let mut state = new_state();
    let mut g = function_proto(
        0,
        vec![
            abc(OpCode::GetTabUp, 0, 0, k(0)),
            abx(OpCode::LoadK, 1, 1),
            abc(OpCode::VarArg, 2, 0, 0),
            abc(OpCode::Call, 0, 0, 2),
            abc(OpCode::VarArg, 1, 0, 0),
            abc(OpCode::Return, 0, 0, 0),
        ],
        vec![string("select"), string("#")],
        3,
        vec![enclosing(0)],
    );
    g.is_vararg = true;

    let mut main = main_proto(
        vec![
            abx(OpCode::Closure, 0, 0),
            abx(OpCode::LoadK, 1, 0),
            abx(OpCode::LoadK, 2, 1),
            abc(OpCode::LoadNil, 3, 0, 0),
            abc(OpCode::Call, 0, 4, 0),
            abc(OpCode::Return, 0, 0, 0),
        ],
        vec![int(10), int(20)],
        4,
    );
    main.protos = vec![g.into()];

    let results = run(&mut state, &main).unwrap();
    assert_eq!(
        results,
        vec![Value::Integer(3), Value::Integer(10), Value::Integer(20), Value::Nil]
    );
}

#[test]
fn test_tail_call_returns_every_result() {
    // local function three() return 1, 2, 3 end; return three()
    let mut state = new_state();
    let three = function_proto(
        0,
        vec![
            abx(OpCode::LoadK, 0, 0),
            abx(OpCode::LoadK, 1, 1),
            abx(OpCode::LoadK, 2, 2),
            abc(OpCode::Return, 0, 4, 0),
        ],
        vec![int(1), int(2), int(3)],
        3,
        vec![],
    );
    let mut main = main_proto(
        vec![
            abx(OpCode::Closure, 0, 0),
            abc(OpCode::TailCall, 0, 1, 0),
            abc(OpCode::Return, 0, 0, 0),
        ],
        vec![],
        1,
    );
    main.protos = vec![three.into()];

    let results = run(&mut state, &main).unwrap();
    assert_eq!(results, vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)]);
}

#[test]
fn test_deep_recursion_hits_the_depth_limit() {
    // local function f() return f() end, through the global table
    let mut state = new_state();
    let recurse = function_proto(
        0,
        vec![
            abc(OpCode::GetTabUp, 0, 0, k(0)),
            abc(OpCode::Call, 0, 1, 2),
            abc(OpCode::Return, 0, 2, 0),
        ],
        vec![string("f")],
        1,
        vec![enclosing(0)],
    );
    let mut main = main_proto(
        vec![
            abx(OpCode::Closure, 0, 0),
            abc(OpCode::SetTabUp, 0, k(0), 0),
            abc(OpCode::Call, 0, 1, 1),
            abc(OpCode::Return, 0, 1, 0),
        ],
        vec![string("f")],
        1,
    );
    main.protos = vec![recurse.into()];

    let err = run(&mut state, &main).unwrap_err();
    assert!(matches!(err, luavm::LuaError::CallDepthExceeded(200)));
    assert_eq!(state.call_depth(), 0);
}
