//! Call frames
//!
//! Each call runs on its own frame: a slot vector with a top cursor, the
//! running closure, its varargs and program counter, and the upvalue cells
//! currently open over its slots. Stack index `i` (1-based) is slot `i - 1`.

use std::collections::HashMap;
use std::rc::{Rc, Weak};

use crate::chunk::Prototype;
use crate::error::{LuaError, LuaResult};

use super::closure::{Closure, ClosureRef, Upvalue, UpvalueRef};
use super::value::Value;

/// Cell open over one slot, with the closures that captured it
#[derive(Debug)]
pub(crate) struct OpenUpvalue {
    pub(crate) cell: UpvalueRef,

    /// Capturing closure and the upvalue index it bound the cell to
    pub(crate) captures: Vec<(Weak<Closure>, usize)>,
}

impl OpenUpvalue {
    pub(crate) fn new(cell: UpvalueRef) -> Self {
        OpenUpvalue { cell, captures: Vec::new() }
    }
}

/// Register window of one call
#[derive(Debug)]
pub struct Frame {
    slots: Vec<Value>,

    /// Number of slots in use
    top: usize,

    /// Running closure, none for the host frame
    pub(crate) closure: Option<ClosureRef>,

    /// Prototype of a running Lua closure
    pub(crate) proto: Option<Rc<Prototype>>,

    /// Extra arguments of a vararg function
    pub(crate) varargs: Vec<Value>,

    pub(crate) pc: usize,

    /// Open upvalue cells keyed by slot
    pub(crate) open_upvalues: HashMap<usize, OpenUpvalue>,
}

impl Frame {
    pub fn new(size: usize) -> Self {
        Frame {
            slots: vec![Value::Nil; size],
            top: 0,
            closure: None,
            proto: None,
            varargs: Vec::new(),
            pc: 0,
            open_upvalues: HashMap::new(),
        }
    }

    pub fn top(&self) -> usize {
        self.top
    }

    /// Slot capacity
    pub fn size(&self) -> usize {
        self.slots.len()
    }

    /// Make room for `n` more values without exceeding `limit` slots
    pub fn check(&mut self, n: usize, limit: usize) -> bool {
        let needed = self.top + n;
        if needed <= self.slots.len() {
            return true;
        }
        if needed > limit {
            return false;
        }
        self.slots.resize(needed, Value::Nil);
        true
    }

    pub fn push(&mut self, value: Value) -> LuaResult<()> {
        if self.top == self.slots.len() {
            return Err(LuaError::StackOverflow);
        }
        self.slots[self.top] = value;
        self.top += 1;
        Ok(())
    }

    pub fn pop(&mut self) -> LuaResult<Value> {
        if self.top == 0 {
            return Err(LuaError::StackUnderflow);
        }
        self.top -= 1;
        Ok(std::mem::take(&mut self.slots[self.top]))
    }

    /// Push exactly `n` of `values`, padding with nil; all of them when
    /// `n` is negative
    pub fn push_n(&mut self, values: Vec<Value>, n: i32) -> LuaResult<()> {
        let n = if n < 0 { values.len() } else { n as usize };
        let mut values = values.into_iter();
        for _ in 0..n {
            self.push(values.next().unwrap_or_default())?;
        }
        Ok(())
    }

    /// Pop `n` values, returned bottom first
    pub fn pop_n(&mut self, n: usize) -> LuaResult<Vec<Value>> {
        if n > self.top {
            return Err(LuaError::StackUnderflow);
        }
        let start = self.top - n;
        let values = self.slots[start..self.top].iter_mut().map(std::mem::take).collect();
        self.top = start;
        Ok(values)
    }

    /// Absolute form of a relative index; pseudo-indices pass through
    pub fn abs_index(&self, idx: i32) -> i32 {
        if idx >= 0 || idx <= super::state::REGISTRY_INDEX {
            idx
        } else {
            idx + self.top as i32 + 1
        }
    }

    /// Whether a non-pseudo index refers to a slot below top
    pub fn is_valid(&self, idx: i32) -> bool {
        let abs = self.abs_index(idx);
        abs > 0 && (abs as usize) <= self.top
    }

    /// Value at a stack index; nil when out of range
    pub fn get(&self, idx: i32) -> Value {
        if self.is_valid(idx) {
            self.slots[self.abs_index(idx) as usize - 1].clone()
        } else {
            Value::Nil
        }
    }

    pub fn set(&mut self, idx: i32, value: Value) -> LuaResult<()> {
        if !self.is_valid(idx) {
            return Err(LuaError::InvalidIndex(idx));
        }
        let abs = self.abs_index(idx) as usize;
        self.slots[abs - 1] = value;
        Ok(())
    }

    /// Raw slot read, for registers and open upvalues
    pub(crate) fn slot(&self, slot: usize) -> Value {
        self.slots.get(slot).cloned().unwrap_or_default()
    }

    pub(crate) fn set_slot(&mut self, slot: usize, value: Value) -> LuaResult<()> {
        match self.slots.get_mut(slot) {
            Some(s) => {
                *s = value;
                Ok(())
            }
            None => Err(LuaError::InvalidIndex(slot as i32 + 1)),
        }
    }

    /// Reverse slots `from..=to`
    pub fn reverse(&mut self, from: usize, to: usize) {
        if from < to {
            self.slots[from..=to].reverse();
        }
    }

    /// Close every open upvalue over a slot at or above `from`
    ///
    /// Each capturing closure gets a closed cell of its own; the shared cell
    /// keeps the value for closures that copied it from an enclosing closure.
    pub fn close_upvalues(&mut self, from: usize) {
        let closing: Vec<usize> = self.open_upvalues.keys().copied().filter(|&s| s >= from).collect();
        for slot in closing {
            let Some(open) = self.open_upvalues.remove(&slot) else {
                continue;
            };
            let value = self.slot(slot);
            *open.cell.borrow_mut() = Upvalue::Closed(value.clone());
            for (closure, idx) in &open.captures {
                if let Some(closure) = closure.upgrade() {
                    closure.detach_upvalue(*idx, &open.cell, value.clone());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_pop_and_overflow() {
        let mut frame = Frame::new(2);
        frame.push(Value::Integer(1)).unwrap();
        frame.push(Value::Integer(2)).unwrap();
        assert!(matches!(frame.push(Value::Nil), Err(LuaError::StackOverflow)));

        assert_eq!(frame.pop().unwrap(), Value::Integer(2));
        assert_eq!(frame.pop().unwrap(), Value::Integer(1));
        assert!(matches!(frame.pop(), Err(LuaError::StackUnderflow)));
    }

    #[test]
    fn test_push_n_pads_and_truncates() {
        let mut frame = Frame::new(8);
        frame.push_n(vec![Value::Integer(1)], 3).unwrap();
        assert_eq!(frame.top(), 3);
        assert!(frame.get(3).is_nil());

        frame.push_n(vec![Value::Integer(4), Value::Integer(5)], 1).unwrap();
        assert_eq!(frame.top(), 4);
        assert_eq!(frame.get(-1), Value::Integer(4));

        let values = frame.pop_n(2).unwrap();
        assert_eq!(values, vec![Value::Nil, Value::Integer(4)]);
    }

    #[test]
    fn test_indices() {
        let mut frame = Frame::new(4);
        frame.push(Value::from("a")).unwrap();
        frame.push(Value::from("b")).unwrap();
        assert_eq!(frame.abs_index(-1), 2);
        assert_eq!(frame.get(-2), Value::from("a"));
        assert!(frame.get(3).is_nil());
        assert!(matches!(frame.set(3, Value::Nil), Err(LuaError::InvalidIndex(3))));
    }

    #[test]
    fn test_check_respects_limit() {
        let mut frame = Frame::new(2);
        assert!(frame.check(5, 10));
        assert_eq!(frame.size(), 5);
        assert!(!frame.check(11, 10));
    }

    #[test]
    fn test_close_upvalues_from_slot() {
        let mut frame = Frame::new(4);
        frame.push_n(vec![Value::Integer(10), Value::Integer(20)], 2).unwrap();
        let low = Rc::new(std::cell::RefCell::new(Upvalue::Open { frame: 0, slot: 0 }));
        let high = Rc::new(std::cell::RefCell::new(Upvalue::Open { frame: 0, slot: 1 }));
        frame.open_upvalues.insert(0, OpenUpvalue::new(Rc::clone(&low)));
        frame.open_upvalues.insert(1, OpenUpvalue::new(Rc::clone(&high)));

        frame.close_upvalues(1);
        assert!(low.borrow().is_open());
        assert!(matches!(&*high.borrow(), Upvalue::Closed(Value::Integer(20))));
        assert_eq!(frame.open_upvalues.len(), 1);
    }

    #[test]
    fn test_close_detaches_each_capture() {
        let mut frame = Frame::new(2);
        frame.push(Value::Integer(7)).unwrap();
        let shared = Rc::new(std::cell::RefCell::new(Upvalue::Open { frame: 0, slot: 0 }));
        let proto = Rc::new(Prototype::default());
        let first = Rc::new(Closure::new_lua(Rc::clone(&proto), vec![Rc::clone(&shared)]));
        let second = Rc::new(Closure::new_lua(proto, vec![Rc::clone(&shared)]));

        let mut open = OpenUpvalue::new(Rc::clone(&shared));
        open.captures.push((Rc::downgrade(&first), 0));
        open.captures.push((Rc::downgrade(&second), 0));
        frame.open_upvalues.insert(0, open);
        frame.close_upvalues(0);

        let a = first.upvalue(0).unwrap();
        let b = second.upvalue(0).unwrap();
        assert!(!Rc::ptr_eq(&a, &b));
        *a.borrow_mut() = Upvalue::Closed(Value::Integer(8));
        assert!(matches!(&*b.borrow(), Upvalue::Closed(Value::Integer(7))));
        assert!(frame.open_upvalues.is_empty());
    }
}
