//! Interpreter state and the basic stack API
//!
//! A [`LuaState`] owns the registry, the running frame and the chain of
//! paused caller frames. Host code talks to it through 1-based stack
//! indices; negative indices count down from the top.

use std::fmt;

use crate::chunk::ChunkCache;
use crate::config::VmConfig;
use crate::error::{LuaError, LuaResult};

use super::closure::{Upvalue, UpvalueRef};
use super::frame::Frame;
use super::table::{Table, TableRef};
use super::value::Value;

/// Largest stack index
pub const MAX_STACK: i32 = 1_000_000;

/// Pseudo-index of the registry table
pub const REGISTRY_INDEX: i32 = -MAX_STACK - 1000;

/// Registry key of the globals table
pub const RIDX_GLOBALS: i64 = 2;

/// Pass as the result count to keep every result
pub const MULTRET: i32 = -1;

/// Pseudo-index of upvalue `i` (1-based) of the running native closure
pub fn upvalue_index(i: i32) -> i32 {
    REGISTRY_INDEX - i
}

/// An interpreter instance
pub struct LuaState {
    pub(crate) registry: TableRef,

    /// Running frame
    pub(crate) stack: Frame,

    /// Paused frames, outermost first
    pub(crate) callers: Vec<Frame>,

    pub(crate) config: VmConfig,

    pub(crate) chunk_cache: ChunkCache,
}

impl fmt::Debug for LuaState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LuaState")
            .field("depth", &self.callers.len())
            .field("top", &self.stack.top())
            .field("config", &self.config)
            .finish()
    }
}

impl Default for LuaState {
    fn default() -> Self {
        LuaState::new()
    }
}

impl LuaState {
    /// Create a state with the default configuration
    pub fn new() -> Self {
        LuaState::with_config(VmConfig::default())
    }

    /// Create a state with a custom configuration
    pub fn with_config(config: VmConfig) -> Self {
        let registry = Table::new_ref(2, 0);
        // Fresh tables accept any non-nil key
        let _ = registry.borrow_mut().set_int(RIDX_GLOBALS, Value::new_table());

        LuaState {
            registry,
            stack: Frame::new(config.min_stack),
            callers: Vec::new(),
            chunk_cache: ChunkCache::with_capacity(config.chunk_cache_size),
            config,
        }
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    /// Cache of decoded chunks
    pub fn chunk_cache(&self) -> &ChunkCache {
        &self.chunk_cache
    }

    /// Number of paused frames below the running one
    pub fn call_depth(&self) -> usize {
        self.callers.len()
    }

    /// Make `frame` the running frame
    pub(crate) fn push_frame(&mut self, frame: Frame) -> LuaResult<()> {
        if self.callers.len() >= self.config.max_call_depth {
            tracing::warn!(
                target: "luavm::call",
                limit = self.config.max_call_depth,
                "call depth exceeded"
            );
            return Err(LuaError::CallDepthExceeded(self.config.max_call_depth));
        }
        let caller = std::mem::replace(&mut self.stack, frame);
        self.callers.push(caller);
        Ok(())
    }

    /// Remove the running frame, closing its open upvalues
    pub(crate) fn pop_frame(&mut self) -> LuaResult<Frame> {
        let caller = self.callers.pop().ok_or(LuaError::StackUnderflow)?;
        let mut frame = std::mem::replace(&mut self.stack, caller);
        frame.close_upvalues(0);
        Ok(frame)
    }

    fn frame_at(&self, depth: usize) -> Option<&Frame> {
        if depth == self.callers.len() {
            Some(&self.stack)
        } else {
            self.callers.get(depth)
        }
    }

    fn frame_at_mut(&mut self, depth: usize) -> Option<&mut Frame> {
        if depth == self.callers.len() {
            Some(&mut self.stack)
        } else {
            self.callers.get_mut(depth)
        }
    }

    /// Current value of an upvalue cell
    pub(crate) fn upvalue_get(&self, cell: &UpvalueRef) -> Value {
        match &*cell.borrow() {
            Upvalue::Open { frame, slot } => {
                self.frame_at(*frame).map(|f| f.slot(*slot)).unwrap_or_default()
            }
            Upvalue::Closed(value) => value.clone(),
        }
    }

    pub(crate) fn upvalue_set(&mut self, cell: &UpvalueRef, value: Value) -> LuaResult<()> {
        let open = match &*cell.borrow() {
            Upvalue::Open { frame, slot } => Some((*frame, *slot)),
            Upvalue::Closed(_) => None,
        };
        match open {
            Some((frame, slot)) => self
                .frame_at_mut(frame)
                .ok_or(LuaError::InvalidIndex(slot as i32 + 1))?
                .set_slot(slot, value),
            None => {
                *cell.borrow_mut() = Upvalue::Closed(value);
                Ok(())
            }
        }
    }

    fn upvalue_cell(&self, idx: i32) -> Option<UpvalueRef> {
        let n = (REGISTRY_INDEX - idx) as usize;
        let closure = self.stack.closure.as_ref()?;
        closure.upvalue(n.checked_sub(1)?)
    }

    /// Value at any index, including pseudo-indices; nil when invalid
    pub(crate) fn index_value(&self, idx: i32) -> Value {
        if idx == REGISTRY_INDEX {
            return Value::Table(self.registry.clone());
        }
        if idx < REGISTRY_INDEX {
            return match self.upvalue_cell(idx) {
                Some(cell) => self.upvalue_get(&cell),
                None => Value::Nil,
            };
        }
        self.stack.get(idx)
    }

    pub(crate) fn set_index_value(&mut self, idx: i32, value: Value) -> LuaResult<()> {
        if idx == REGISTRY_INDEX {
            return match value {
                Value::Table(t) => {
                    self.registry = t;
                    Ok(())
                }
                _ => Err(LuaError::type_error("registry must be a table")),
            };
        }
        if idx < REGISTRY_INDEX {
            let cell = self.upvalue_cell(idx).ok_or(LuaError::InvalidIndex(idx))?;
            return self.upvalue_set(&cell, value);
        }
        self.stack.set(idx, value)
    }

    /// Push a value onto the running frame
    pub fn push(&mut self, value: Value) -> LuaResult<()> {
        self.stack.push(value)
    }

    /// Pop the top value of the running frame
    pub fn pop_value(&mut self) -> LuaResult<Value> {
        self.stack.pop()
    }

    // Basic stack manipulation

    pub fn get_top(&self) -> i32 {
        self.stack.top() as i32
    }

    pub fn abs_index(&self, idx: i32) -> i32 {
        self.stack.abs_index(idx)
    }

    /// Ensure `n` more values fit; false when the frame limit forbids it
    pub fn check_stack(&mut self, n: usize) -> bool {
        self.stack.check(n, self.config.max_stack_size)
    }

    /// Pop `n` values
    pub fn pop(&mut self, n: usize) -> LuaResult<()> {
        for _ in 0..n {
            self.stack.pop()?;
        }
        Ok(())
    }

    /// Copy the value at `from` into `to`
    pub fn copy(&mut self, from: i32, to: i32) -> LuaResult<()> {
        let value = self.index_value(from);
        self.set_index_value(to, value)
    }

    /// Push a copy of the value at `idx`
    pub fn push_value(&mut self, idx: i32) -> LuaResult<()> {
        let value = self.index_value(idx);
        self.stack.push(value)
    }

    /// Pop the top value into `idx`
    pub fn replace(&mut self, idx: i32) -> LuaResult<()> {
        let value = self.stack.pop()?;
        self.set_index_value(idx, value)
    }

    /// Move the top value into `idx`, shifting values above it up
    pub fn insert(&mut self, idx: i32) -> LuaResult<()> {
        self.rotate(idx, 1)
    }

    /// Remove the value at `idx`, shifting values above it down
    pub fn remove(&mut self, idx: i32) -> LuaResult<()> {
        self.rotate(idx, -1)?;
        self.pop(1)
    }

    /// Rotate the values between `idx` and the top `n` positions towards
    /// the top (towards the bottom when negative)
    pub fn rotate(&mut self, idx: i32, n: i32) -> LuaResult<()> {
        if !self.stack.is_valid(idx) {
            return Err(LuaError::InvalidIndex(idx));
        }
        let t = self.stack.top() as i32 - 1;
        let p = self.stack.abs_index(idx) - 1;
        let m = if n >= 0 { t - n } else { p - n - 1 };
        if m < p - 1 || m > t {
            return Err(LuaError::InvalidIndex(idx));
        }
        for (from, to) in [(p, m), (m + 1, t), (p, t)] {
            if from < to {
                self.stack.reverse(from as usize, to as usize);
            }
        }
        Ok(())
    }

    /// Set the top to `idx`, popping values or pushing nils
    pub fn set_top(&mut self, idx: i32) -> LuaResult<()> {
        let new_top = self.stack.abs_index(idx);
        if new_top < 0 {
            return Err(LuaError::StackUnderflow);
        }
        let n = self.stack.top() as i32 - new_top;
        if n > 0 {
            self.pop(n as usize)
        } else {
            if !self.check_stack((-n) as usize) {
                return Err(LuaError::StackOverflow);
            }
            for _ in n..0 {
                self.stack.push(Value::Nil)?;
            }
            Ok(())
        }
    }
}
