//! Closures and upvalue cells

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::chunk::Prototype;
use crate::error::LuaResult;

use super::state::LuaState;
use super::value::Value;

/// Host function callable from Lua. Arguments are on the stack of its own
/// frame; it returns how many values from the top are its results.
pub type NativeFunction = fn(&mut LuaState) -> LuaResult<usize>;

pub type ClosureRef = Rc<Closure>;
pub type UpvalueRef = Rc<RefCell<Upvalue>>;

/// Upvalue cell
#[derive(Debug, Clone)]
pub enum Upvalue {
    /// Still lives in a register of a running frame
    Open {
        /// Depth of the frame in the call chain
        frame: usize,
        /// Slot index within that frame
        slot: usize,
    },
    /// Owns its value after the frame closed it
    Closed(Value),
}

impl Upvalue {
    pub fn new_closed(value: Value) -> UpvalueRef {
        Rc::new(RefCell::new(Upvalue::Closed(value)))
    }

    pub fn is_open(&self) -> bool {
        matches!(self, Upvalue::Open { .. })
    }
}

/// Function body of a closure
#[derive(Clone)]
pub enum FunctionKind {
    Lua(Rc<Prototype>),
    Native(NativeFunction),
}

/// A function value: a body plus its captured upvalue cells
///
/// The cell bindings can change once: when the frame a cell is open over
/// closes it, every closure that captured it from that frame is rebound to
/// its own closed cell.
pub struct Closure {
    pub kind: FunctionKind,
    upvalues: RefCell<Vec<UpvalueRef>>,
}

impl Closure {
    pub fn new_lua(proto: Rc<Prototype>, upvalues: Vec<UpvalueRef>) -> Self {
        Closure { kind: FunctionKind::Lua(proto), upvalues: RefCell::new(upvalues) }
    }

    /// Native closure with closed upvalues
    pub fn new_native(func: NativeFunction, upvalues: Vec<Value>) -> Self {
        let upvalues = upvalues.into_iter().map(Upvalue::new_closed).collect();
        Closure { kind: FunctionKind::Native(func), upvalues: RefCell::new(upvalues) }
    }

    /// Cell currently bound to upvalue `idx`
    pub fn upvalue(&self, idx: usize) -> Option<UpvalueRef> {
        self.upvalues.borrow().get(idx).cloned()
    }

    pub fn upvalue_count(&self) -> usize {
        self.upvalues.borrow().len()
    }

    /// Rebind upvalue `idx` to a closed cell holding `value`, if it is
    /// still bound to `shared`
    pub(crate) fn detach_upvalue(&self, idx: usize, shared: &UpvalueRef, value: Value) {
        if let Some(cell) = self.upvalues.borrow_mut().get_mut(idx) {
            if Rc::ptr_eq(cell, shared) {
                *cell = Upvalue::new_closed(value);
            }
        }
    }

    pub fn is_native(&self) -> bool {
        matches!(self.kind, FunctionKind::Native(_))
    }

    /// Prototype of a Lua closure
    pub fn proto(&self) -> Option<&Rc<Prototype>> {
        match &self.kind {
            FunctionKind::Lua(proto) => Some(proto),
            FunctionKind::Native(_) => None,
        }
    }
}

impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            FunctionKind::Lua(proto) => f
                .debug_struct("Closure")
                .field("source", &proto.source)
                .field("line_defined", &proto.line_defined)
                .field("upvalues", &self.upvalue_count())
                .finish(),
            FunctionKind::Native(func) => f
                .debug_struct("Closure")
                .field("native", &(*func as usize as *const ()))
                .field("upvalues", &self.upvalue_count())
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_: &mut LuaState) -> LuaResult<usize> {
        Ok(0)
    }

    #[test]
    fn test_native_upvalues_start_closed() {
        let closure = Closure::new_native(noop, vec![Value::Integer(1), Value::Nil]);
        assert!(closure.is_native());
        assert!(closure.proto().is_none());
        assert_eq!(closure.upvalue_count(), 2);
        assert!(!closure.upvalue(0).unwrap().borrow().is_open());
        assert!(closure.upvalue(2).is_none());
    }

    #[test]
    fn test_detach_only_replaces_matching_binding() {
        let shared = Rc::new(RefCell::new(Upvalue::Open { frame: 0, slot: 3 }));
        let other = Upvalue::new_closed(Value::Integer(5));
        let proto = Rc::new(Prototype::default());
        let closure = Closure::new_lua(proto, vec![Rc::clone(&shared), Rc::clone(&other)]);

        closure.detach_upvalue(0, &shared, Value::Integer(1));
        closure.detach_upvalue(1, &shared, Value::Integer(2));

        let first = closure.upvalue(0).unwrap();
        assert!(!Rc::ptr_eq(&first, &shared));
        assert!(matches!(&*first.borrow(), Upvalue::Closed(Value::Integer(1))));
        assert!(Rc::ptr_eq(&closure.upvalue(1).unwrap(), &other));
        assert!(shared.borrow().is_open());
    }

    #[test]
    fn test_lua_closure_exposes_proto() {
        let proto = Rc::new(Prototype { source: "=test".to_string(), ..Prototype::default() });
        let closure = Closure::new_lua(Rc::clone(&proto), Vec::new());
        assert!(!closure.is_native());
        assert!(Rc::ptr_eq(closure.proto().unwrap(), &proto));
    }
}
