//! Loading chunks and calling functions
//!
//! Every call runs on a fresh frame pushed on top of the caller's. The
//! frame is popped, closing its upvalues, whether the call succeeds or
//! fails, so errors unwind the chain one frame at a time.

use std::path::Path;
use std::rc::Rc;

use crate::chunk;
use crate::error::{LuaError, LuaResult, Status};

use super::closure::{Closure, ClosureRef, FunctionKind, NativeFunction, Upvalue};
use super::frame::Frame;
use super::metamethod::MetamethodType;
use super::opcodes::OpCode;
use super::state::LuaState;
use super::value::Value;

impl LuaState {
    /// Decode a binary chunk and push its main function
    pub fn load(&mut self, data: &[u8], chunk_name: &str) -> LuaResult<()> {
        let proto = if self.config.cache_chunks {
            self.chunk_cache.load(data)?
        } else {
            Rc::new(chunk::undump(data)?)
        };
        tracing::debug!(
            target: "luavm::chunk",
            chunk = chunk_name,
            source = %proto.source,
            "chunk loaded"
        );

        // The first upvalue of a main function is the globals table
        let upvalues = (0..proto.upvalues.len())
            .map(|i| Upvalue::new_closed(if i == 0 { self.globals() } else { Value::Nil }))
            .collect();
        let closure = Closure::new_lua(proto, upvalues);
        self.push(Value::Function(Rc::new(closure)))
    }

    /// Read a binary chunk from a file and push its main function
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> LuaResult<()> {
        let path = path.as_ref();
        let data = std::fs::read(path)
            .map_err(|e| LuaError::Io(format!("cannot open {}: {}", path.display(), e)))?;
        self.load(&data, &path.display().to_string())
    }

    /// Call the function below the top `n_args` values, leaving
    /// `n_results` results (all of them for `MULTRET`) in its place
    pub fn call(&mut self, n_args: usize, n_results: i32) -> LuaResult<()> {
        let func_idx = -(n_args as i32 + 1);
        let value = self.index_value(func_idx);

        let (closure, n_args) = match value {
            Value::Function(closure) => (closure, n_args),
            other => {
                let handler = match self.get_metafield(&other, MetamethodType::Call) {
                    Some(Value::Function(handler)) => handler,
                    _ => {
                        return Err(LuaError::type_error(format!(
                            "attempt to call a {} value",
                            other.type_name()
                        )))
                    }
                };
                // The called object becomes the first argument of its handler
                self.push(other)?;
                self.insert(func_idx - 1)?;
                (handler, n_args + 1)
            }
        };

        match closure.kind.clone() {
            FunctionKind::Lua(_) => self.call_lua_closure(n_args, n_results, closure),
            FunctionKind::Native(f) => self.call_native(n_args, n_results, closure, f),
        }
    }

    /// Protected call: on error the stack is cut back to below the called
    /// function and the error value is pushed in its place
    pub fn pcall(&mut self, n_args: usize, n_results: i32) -> Status {
        let depth = self.callers.len();
        let base = self.get_top() - n_args as i32 - 1;

        match self.call(n_args, n_results) {
            Ok(()) => Status::Ok,
            Err(err) => {
                let status = err.status();
                tracing::debug!(target: "luavm::pcall", error = %err, "protected call failed");
                while self.callers.len() > depth {
                    if self.pop_frame().is_err() {
                        break;
                    }
                }
                let base = base.max(0);
                if self.set_top(base).is_err() || self.push(err.into_value()).is_err() {
                    return Status::RuntimeError;
                }
                status
            }
        }
    }

    fn call_lua_closure(&mut self, n_args: usize, n_results: i32, closure: ClosureRef) -> LuaResult<()> {
        let Some(proto) = closure.proto().cloned() else {
            return Err(LuaError::type_error("attempt to run a native function as bytecode"));
        };
        let n_regs = proto.max_stack_size as usize;
        let n_params = proto.num_params as usize;
        tracing::trace!(
            target: "luavm::call",
            source = %proto.source,
            line = proto.line_defined,
            n_args,
            n_results,
            "calling lua function"
        );

        let mut frame = Frame::new(n_regs + self.config.min_stack);
        let mut func_and_args = self.stack.pop_n(n_args + 1)?;
        let mut args = func_and_args.split_off(1);
        if n_args > n_params && proto.is_vararg {
            frame.varargs = args.split_off(n_params);
        }
        // Missing parameters and the remaining registers start as nil
        args.truncate(n_params);
        frame.push_n(args, n_regs.max(n_params) as i32)?;
        frame.closure = Some(closure);
        frame.proto = Some(proto);

        self.push_frame(frame)?;
        let outcome = self.run_lua_closure();
        let mut frame = self.pop_frame()?;
        outcome?;

        if n_results != 0 {
            let results = frame.pop_n(frame.top() - n_regs)?;
            self.push_results(results, n_results)?;
        }
        Ok(())
    }

    fn call_native(&mut self, n_args: usize, n_results: i32, closure: ClosureRef, f: NativeFunction) -> LuaResult<()> {
        tracing::trace!(target: "luavm::call", n_args, n_results, "calling native function");

        let mut frame = Frame::new(n_args + self.config.min_stack);
        let args = self.stack.pop_n(n_args)?;
        self.stack.pop()?;
        frame.push_n(args, n_args as i32)?;
        frame.closure = Some(closure);

        self.push_frame(frame)?;
        let outcome = f(self);
        let mut frame = self.pop_frame()?;
        let n = outcome?;

        if n_results != 0 {
            let results = frame.pop_n(n)?;
            self.push_results(results, n_results)?;
        }
        Ok(())
    }

    fn push_results(&mut self, results: Vec<Value>, n_results: i32) -> LuaResult<()> {
        let needed = if n_results < 0 { results.len() } else { n_results as usize };
        if !self.check_stack(needed) {
            return Err(LuaError::StackOverflow);
        }
        self.stack.push_n(results, n_results)
    }

    /// Dispatch loop of the running Lua frame, until RETURN
    fn run_lua_closure(&mut self) -> LuaResult<()> {
        loop {
            let inst = self.fetch()?;
            let info = inst.info().ok_or(LuaError::InvalidOpcode(inst.opcode()))?;
            if self.config.trace_instructions {
                tracing::trace!(
                    target: "luavm::vm",
                    pc = self.stack.pc - 1,
                    op = info.name,
                    word = format_args!("{:#010x}", inst.0),
                    "dispatch"
                );
            }
            let action = info.action.ok_or(LuaError::InvalidOpcode(inst.opcode()))?;
            action(self, inst)?;
            if info.code == OpCode::Return {
                return Ok(());
            }
        }
    }
}
