//! Instruction handlers
//!
//! Register `r` of the running Lua frame is slot `r` (stack index `r + 1`).
//! Values above the register window are scratch space for calls: CALL
//! and VARARG with an open result count leave their values there and push
//! an integer marker naming the first destination register, which the
//! next CALL, RETURN or SETLIST consumes.

use std::cell::RefCell;
use std::rc::Rc;

use crate::chunk::Constant;
use crate::error::{LuaError, LuaResult};

use super::closure::{Closure, ClosureRef, Upvalue, UpvalueRef};
use super::frame::OpenUpvalue;
use super::instruction::{fb2int, is_k, Instruction, LFIELDS_PER_FLUSH};
use super::operators::{ArithOp, CompareOp};
use super::state::{upvalue_index, LuaState};
use super::table::Table;
use super::value::Value;

impl From<&Constant> for Value {
    fn from(k: &Constant) -> Self {
        match k {
            Constant::Nil => Value::Nil,
            Constant::Boolean(b) => Value::Boolean(*b),
            Constant::Integer(n) => Value::Integer(*n),
            Constant::Number(n) => Value::Number(*n),
            Constant::String(s) => Value::String(s.clone()),
        }
    }
}

/// Integer loop limit for a numeric for; `None` when the loop must not run
fn for_limit(limit: &Value, step: i64) -> LuaResult<Option<i64>> {
    if let Value::Integer(n) = limit {
        return Ok(Some(*n));
    }
    let f = limit
        .to_number()
        .ok_or_else(|| LuaError::type_error("'for' limit must be a number"))?;
    let f = if step < 0 { f.ceil() } else { f.floor() };
    if let Some(n) = super::number::float_to_integer(f) {
        return Ok(Some(n));
    }
    // Out of range: clip, or skip the loop when no value can reach the limit
    if f > 0.0 {
        Ok(if step < 0 { None } else { Some(i64::MAX) })
    } else {
        Ok(if step > 0 { None } else { Some(i64::MIN) })
    }
}

fn for_number(value: &Value, what: &str) -> LuaResult<f64> {
    value
        .to_number()
        .ok_or_else(|| LuaError::type_error(format!("'for' {} must be a number", what)))
}

impl LuaState {
    /// Next instruction of the running function
    pub(crate) fn fetch(&mut self) -> LuaResult<Instruction> {
        let pc = self.stack.pc;
        let word = self
            .stack
            .proto
            .as_ref()
            .and_then(|p| p.code.get(pc).copied())
            .ok_or(LuaError::InvalidProgramCounter(pc))?;
        self.stack.pc += 1;
        Ok(Instruction(word))
    }

    pub(crate) fn add_pc(&mut self, n: i32) -> LuaResult<()> {
        let pc = self.stack.pc;
        self.stack.pc = pc
            .checked_add_signed(n as isize)
            .ok_or(LuaError::InvalidProgramCounter(pc))?;
        Ok(())
    }

    fn constant(&self, idx: usize) -> LuaResult<Value> {
        self.stack
            .proto
            .as_ref()
            .and_then(|p| p.constants.get(idx))
            .map(Value::from)
            .ok_or(LuaError::InvalidConstant(idx))
    }

    fn reg(&self, r: usize) -> Value {
        self.stack.slot(r)
    }

    fn set_reg(&mut self, r: usize, value: Value) -> LuaResult<()> {
        self.stack.set_slot(r, value)
    }

    /// Register or constant, by the RK flag bit
    fn rk(&self, rk: usize) -> LuaResult<Value> {
        if is_k(rk) {
            self.constant(rk & 0xFF)
        } else {
            Ok(self.reg(rk))
        }
    }

    /// Size of the register window
    fn register_count(&self) -> usize {
        self.stack.proto.as_ref().map_or(0, |p| p.max_stack_size as usize)
    }

    fn upvalue(&self, idx: usize) -> LuaResult<UpvalueRef> {
        self.stack
            .closure
            .as_ref()
            .and_then(|c| c.upvalue(idx))
            .ok_or(LuaError::InvalidIndex(upvalue_index(idx as i32 + 1)))
    }

    fn skip(&mut self) -> LuaResult<()> {
        self.add_pc(1)
    }

    fn ensure_stack(&mut self, n: usize) -> LuaResult<()> {
        if self.check_stack(n) {
            Ok(())
        } else {
            Err(LuaError::StackOverflow)
        }
    }

    /// Push `n` varargs (all of them when negative)
    fn load_vararg(&mut self, n: i32) -> LuaResult<()> {
        let varargs = self.stack.varargs.clone();
        self.ensure_stack(if n < 0 { varargs.len() } else { n as usize })?;
        self.stack.push_n(varargs, n)
    }

    /// Instantiate nested prototype `idx` of the running function
    fn load_proto(&mut self, idx: usize) -> LuaResult<ClosureRef> {
        let proto = self
            .stack
            .proto
            .as_ref()
            .and_then(|p| p.protos.get(idx))
            .cloned()
            .ok_or(LuaError::InvalidConstant(idx))?;

        let depth = self.callers.len();
        let mut upvalues = Vec::with_capacity(proto.upvalues.len());
        let mut captured = Vec::new();
        for (idx, desc) in proto.upvalues.iter().enumerate() {
            let slot = desc.index as usize;
            let cell = if desc.in_stack {
                // Closures over the same live local share one open cell
                captured.push((slot, idx));
                let open = self.stack.open_upvalues.entry(slot).or_insert_with(|| {
                    OpenUpvalue::new(Rc::new(RefCell::new(Upvalue::Open { frame: depth, slot })))
                });
                Rc::clone(&open.cell)
            } else {
                self.upvalue(slot)?
            };
            upvalues.push(cell);
        }

        let closure = Rc::new(Closure::new_lua(proto, upvalues));
        for (slot, idx) in captured {
            if let Some(open) = self.stack.open_upvalues.get_mut(&slot) {
                open.captures.push((Rc::downgrade(&closure), idx));
            }
        }
        Ok(closure)
    }

    /// Pop the result marker and move registers `a..marker` under the
    /// values left above the register window
    fn fix_stack(&mut self, a: usize) -> LuaResult<()> {
        let marker = self.pop_value()?;
        let x = marker.to_integer().ok_or(LuaError::StackUnderflow)? as usize;
        let n = x.saturating_sub(a);
        self.ensure_stack(n)?;
        if n == 0 {
            return Ok(());
        }
        for r in a..x {
            let value = self.reg(r);
            self.push(value)?;
        }
        self.rotate(self.register_count() as i32 + 1, n as i32)
    }

    /// Push the function in `R(a)` and its arguments; returns the argument count
    fn push_func_and_args(&mut self, a: usize, b: usize) -> LuaResult<usize> {
        if b >= 1 {
            self.ensure_stack(b)?;
            for r in a..a + b {
                let value = self.reg(r);
                self.push(value)?;
            }
            Ok(b - 1)
        } else {
            self.fix_stack(a)?;
            Ok(self.stack.top() - self.register_count() - 1)
        }
    }

    /// Store `c - 1` results from the top into `R(a)..`; with `c == 0` the
    /// results stay where they are, followed by a marker
    fn pop_results(&mut self, a: usize, c: usize) -> LuaResult<()> {
        if c == 1 {
            return Ok(());
        }
        if c > 1 {
            for r in (a..a + c - 1).rev() {
                let value = self.pop_value()?;
                self.set_reg(r, value)?;
            }
            return Ok(());
        }
        self.ensure_stack(1)?;
        self.push(Value::Integer(a as i64))
    }

    fn binary_arith(&mut self, i: Instruction, op: ArithOp) -> LuaResult<()> {
        let (a, b, c) = i.abc();
        let x = self.rk(b)?;
        let y = self.rk(c)?;
        let result = self.arith_values(op, &x, &y)?;
        self.set_reg(a, result)
    }

    fn unary_arith(&mut self, i: Instruction, op: ArithOp) -> LuaResult<()> {
        let (a, b, _) = i.abc();
        let x = self.reg(b);
        let result = self.arith_values(op, &x, &x)?;
        self.set_reg(a, result)
    }

    fn compare_and_skip(&mut self, i: Instruction, op: CompareOp) -> LuaResult<()> {
        let (a, b, c) = i.abc();
        let x = self.rk(b)?;
        let y = self.rk(c)?;
        if self.compare_values(&x, &y, op)? != (a != 0) {
            self.skip()?;
        }
        Ok(())
    }

    // Loads and moves

    /// R(A) := R(B)
    pub(crate) fn op_move(&mut self, i: Instruction) -> LuaResult<()> {
        let (a, b, _) = i.abc();
        let value = self.reg(b);
        self.set_reg(a, value)
    }

    /// R(A) := Kst(Bx)
    pub(crate) fn op_loadk(&mut self, i: Instruction) -> LuaResult<()> {
        let (a, bx) = i.abx();
        let value = self.constant(bx)?;
        self.set_reg(a, value)
    }

    /// R(A) := Kst(extra arg)
    pub(crate) fn op_loadkx(&mut self, i: Instruction) -> LuaResult<()> {
        let (a, _) = i.abx();
        let ax = self.fetch()?.ax();
        let value = self.constant(ax)?;
        self.set_reg(a, value)
    }

    /// R(A) := (Bool)B; if (C) pc++
    pub(crate) fn op_loadbool(&mut self, i: Instruction) -> LuaResult<()> {
        let (a, b, c) = i.abc();
        self.set_reg(a, Value::Boolean(b != 0))?;
        if c != 0 {
            self.skip()?;
        }
        Ok(())
    }

    /// R(A), R(A+1), ..., R(A+B) := nil
    pub(crate) fn op_loadnil(&mut self, i: Instruction) -> LuaResult<()> {
        let (a, b, _) = i.abc();
        for r in a..=a + b {
            self.set_reg(r, Value::Nil)?;
        }
        Ok(())
    }

    // Upvalues and tables

    /// R(A) := UpValue[B]
    pub(crate) fn op_getupval(&mut self, i: Instruction) -> LuaResult<()> {
        let (a, b, _) = i.abc();
        let cell = self.upvalue(b)?;
        let value = self.upvalue_get(&cell);
        self.set_reg(a, value)
    }

    /// UpValue[B] := R(A)
    pub(crate) fn op_setupval(&mut self, i: Instruction) -> LuaResult<()> {
        let (a, b, _) = i.abc();
        let cell = self.upvalue(b)?;
        let value = self.reg(a);
        self.upvalue_set(&cell, value)
    }

    /// R(A) := UpValue[B][RK(C)]
    pub(crate) fn op_gettabup(&mut self, i: Instruction) -> LuaResult<()> {
        let (a, b, c) = i.abc();
        let cell = self.upvalue(b)?;
        let t = self.upvalue_get(&cell);
        let k = self.rk(c)?;
        let value = self.table_get(&t, &k)?;
        self.set_reg(a, value)
    }

    /// UpValue[A][RK(B)] := RK(C)
    pub(crate) fn op_settabup(&mut self, i: Instruction) -> LuaResult<()> {
        let (a, b, c) = i.abc();
        let cell = self.upvalue(a)?;
        let t = self.upvalue_get(&cell);
        let k = self.rk(b)?;
        let v = self.rk(c)?;
        self.table_set(&t, k, v)
    }

    /// R(A) := R(B)[RK(C)]
    pub(crate) fn op_gettable(&mut self, i: Instruction) -> LuaResult<()> {
        let (a, b, c) = i.abc();
        let t = self.reg(b);
        let k = self.rk(c)?;
        let value = self.table_get(&t, &k)?;
        self.set_reg(a, value)
    }

    /// R(A)[RK(B)] := RK(C)
    pub(crate) fn op_settable(&mut self, i: Instruction) -> LuaResult<()> {
        let (a, b, c) = i.abc();
        let t = self.reg(a);
        let k = self.rk(b)?;
        let v = self.rk(c)?;
        self.table_set(&t, k, v)
    }

    /// R(A) := {} (size hints B, C)
    pub(crate) fn op_newtable(&mut self, i: Instruction) -> LuaResult<()> {
        let (a, b, c) = i.abc();
        self.set_reg(a, Value::Table(Table::new_ref(fb2int(b), fb2int(c))))
    }

    /// R(A+1) := R(B); R(A) := R(B)[RK(C)]
    pub(crate) fn op_self(&mut self, i: Instruction) -> LuaResult<()> {
        let (a, b, c) = i.abc();
        let obj = self.reg(b);
        self.set_reg(a + 1, obj.clone())?;
        let k = self.rk(c)?;
        let method = self.table_get(&obj, &k)?;
        self.set_reg(a, method)
    }

    /// R(A)[(C-1)*FPF+i] := R(A+i), 1 <= i <= B
    pub(crate) fn op_setlist(&mut self, i: Instruction) -> LuaResult<()> {
        let (a, b, c) = i.abc();
        let batch = if c > 0 { c - 1 } else { self.fetch()?.ax() };
        let Value::Table(t) = self.reg(a) else {
            return Err(LuaError::type_error("table expected for SETLIST"));
        };

        let open = b == 0;
        let n = if open {
            let marker = self.pop_value()?.to_integer().ok_or(LuaError::StackUnderflow)?;
            (marker as usize).saturating_sub(a + 1)
        } else {
            b
        };

        let mut idx = batch as i64 * LFIELDS_PER_FLUSH;
        for j in 1..=n {
            idx += 1;
            t.borrow_mut().set_int(idx, self.reg(a + j))?;
        }
        if open {
            let extra = self.stack.top().saturating_sub(self.register_count());
            for value in self.stack.pop_n(extra)? {
                idx += 1;
                t.borrow_mut().set_int(idx, value)?;
            }
        }
        Ok(())
    }

    // Operators

    pub(crate) fn op_add(&mut self, i: Instruction) -> LuaResult<()> {
        self.binary_arith(i, ArithOp::Add)
    }

    pub(crate) fn op_sub(&mut self, i: Instruction) -> LuaResult<()> {
        self.binary_arith(i, ArithOp::Sub)
    }

    pub(crate) fn op_mul(&mut self, i: Instruction) -> LuaResult<()> {
        self.binary_arith(i, ArithOp::Mul)
    }

    pub(crate) fn op_mod(&mut self, i: Instruction) -> LuaResult<()> {
        self.binary_arith(i, ArithOp::Mod)
    }

    pub(crate) fn op_pow(&mut self, i: Instruction) -> LuaResult<()> {
        self.binary_arith(i, ArithOp::Pow)
    }

    pub(crate) fn op_div(&mut self, i: Instruction) -> LuaResult<()> {
        self.binary_arith(i, ArithOp::Div)
    }

    pub(crate) fn op_idiv(&mut self, i: Instruction) -> LuaResult<()> {
        self.binary_arith(i, ArithOp::IDiv)
    }

    pub(crate) fn op_band(&mut self, i: Instruction) -> LuaResult<()> {
        self.binary_arith(i, ArithOp::BAnd)
    }

    pub(crate) fn op_bor(&mut self, i: Instruction) -> LuaResult<()> {
        self.binary_arith(i, ArithOp::BOr)
    }

    pub(crate) fn op_bxor(&mut self, i: Instruction) -> LuaResult<()> {
        self.binary_arith(i, ArithOp::BXor)
    }

    pub(crate) fn op_shl(&mut self, i: Instruction) -> LuaResult<()> {
        self.binary_arith(i, ArithOp::Shl)
    }

    pub(crate) fn op_shr(&mut self, i: Instruction) -> LuaResult<()> {
        self.binary_arith(i, ArithOp::Shr)
    }

    pub(crate) fn op_unm(&mut self, i: Instruction) -> LuaResult<()> {
        self.unary_arith(i, ArithOp::Unm)
    }

    pub(crate) fn op_bnot(&mut self, i: Instruction) -> LuaResult<()> {
        self.unary_arith(i, ArithOp::BNot)
    }

    /// R(A) := not R(B)
    pub(crate) fn op_not(&mut self, i: Instruction) -> LuaResult<()> {
        let (a, b, _) = i.abc();
        let value = Value::Boolean(self.reg(b).is_falsy());
        self.set_reg(a, value)
    }

    /// R(A) := length of R(B)
    pub(crate) fn op_len(&mut self, i: Instruction) -> LuaResult<()> {
        let (a, b, _) = i.abc();
        let value = self.reg(b);
        let length = self.len_of(&value)?;
        self.set_reg(a, length)
    }

    /// R(A) := R(B).. ... ..R(C)
    pub(crate) fn op_concat(&mut self, i: Instruction) -> LuaResult<()> {
        let (a, b, c) = i.abc();
        let mut acc = self.reg(c);
        for r in (b..c).rev() {
            let left = self.reg(r);
            acc = self.concat_values(&left, &acc)?;
        }
        self.set_reg(a, acc)
    }

    // Jumps and tests

    /// pc += sBx; if (A) close all upvalues >= R(A - 1)
    pub(crate) fn op_jmp(&mut self, i: Instruction) -> LuaResult<()> {
        let (a, sbx) = i.asbx();
        self.add_pc(sbx)?;
        if a != 0 {
            self.stack.close_upvalues(a - 1);
        }
        Ok(())
    }

    pub(crate) fn op_eq(&mut self, i: Instruction) -> LuaResult<()> {
        self.compare_and_skip(i, CompareOp::Eq)
    }

    pub(crate) fn op_lt(&mut self, i: Instruction) -> LuaResult<()> {
        self.compare_and_skip(i, CompareOp::Lt)
    }

    pub(crate) fn op_le(&mut self, i: Instruction) -> LuaResult<()> {
        self.compare_and_skip(i, CompareOp::Le)
    }

    /// if not (R(A) <=> C) then pc++
    pub(crate) fn op_test(&mut self, i: Instruction) -> LuaResult<()> {
        let (a, _, c) = i.abc();
        if self.reg(a).to_boolean() != (c != 0) {
            self.skip()?;
        }
        Ok(())
    }

    /// if (R(B) <=> C) then R(A) := R(B) else pc++
    pub(crate) fn op_testset(&mut self, i: Instruction) -> LuaResult<()> {
        let (a, b, c) = i.abc();
        let value = self.reg(b);
        if value.to_boolean() == (c != 0) {
            self.set_reg(a, value)
        } else {
            self.skip()
        }
    }

    // Calls

    /// R(A), ... ,R(A+C-2) := R(A)(R(A+1), ... ,R(A+B-1))
    pub(crate) fn op_call(&mut self, i: Instruction) -> LuaResult<()> {
        let (a, b, c) = i.abc();
        let n_args = self.push_func_and_args(a, b)?;
        self.call(n_args, c as i32 - 1)?;
        self.pop_results(a, c)
    }

    /// return R(A)(R(A+1), ... ,R(A+B-1)); the following RETURN hands
    /// every result back
    pub(crate) fn op_tailcall(&mut self, i: Instruction) -> LuaResult<()> {
        let (a, b, _) = i.abc();
        let n_args = self.push_func_and_args(a, b)?;
        self.call(n_args, -1)?;
        self.pop_results(a, 0)
    }

    /// return R(A), ... ,R(A+B-2)
    pub(crate) fn op_return(&mut self, i: Instruction) -> LuaResult<()> {
        let (a, b, _) = i.abc();
        if b == 1 {
            return Ok(());
        }
        if b > 1 {
            self.ensure_stack(b - 1)?;
            for r in a..a + b - 1 {
                let value = self.reg(r);
                self.push(value)?;
            }
            return Ok(());
        }
        self.fix_stack(a)
    }

    /// R(A), R(A+1), ..., R(A+B-2) = vararg
    pub(crate) fn op_vararg(&mut self, i: Instruction) -> LuaResult<()> {
        let (a, b, _) = i.abc();
        if b != 1 {
            self.load_vararg(b as i32 - 1)?;
            self.pop_results(a, b)?;
        }
        Ok(())
    }

    /// R(A) := closure(KPROTO[Bx])
    pub(crate) fn op_closure(&mut self, i: Instruction) -> LuaResult<()> {
        let (a, bx) = i.abx();
        let closure = self.load_proto(bx)?;
        self.set_reg(a, Value::Function(closure))
    }

    // Loops

    /// R(A) -= R(A+2); pc += sBx
    pub(crate) fn op_forprep(&mut self, i: Instruction) -> LuaResult<()> {
        let (a, sbx) = i.asbx();
        let init = self.reg(a);
        let limit = self.reg(a + 1);
        let step = self.reg(a + 2);

        if let (Value::Integer(init), Value::Integer(step)) = (&init, &step) {
            if *step == 0 {
                return Err(LuaError::type_error("'for' step is zero"));
            }
            match for_limit(&limit, *step)? {
                Some(limit) => {
                    self.set_reg(a + 1, Value::Integer(limit))?;
                    self.set_reg(a, Value::Integer(init.wrapping_sub(*step)))?;
                }
                None => {
                    // No integer reaches the limit: make the first test fail
                    let limit = if *step > 0 { i64::MIN } else { i64::MAX };
                    self.set_reg(a + 1, Value::Integer(limit))?;
                    self.set_reg(a, Value::Integer(0i64.wrapping_sub(*step)))?;
                }
            }
        } else {
            let limit = for_number(&limit, "limit")?;
            let step = for_number(&step, "step")?;
            let init = for_number(&init, "initial value")?;
            self.set_reg(a + 1, Value::Number(limit))?;
            self.set_reg(a + 2, Value::Number(step))?;
            self.set_reg(a, Value::Number(init - step))?;
        }
        self.add_pc(sbx)
    }

    /// R(A) += R(A+2); if R(A) <?= R(A+1) then { pc += sBx; R(A+3) = R(A) }
    pub(crate) fn op_forloop(&mut self, i: Instruction) -> LuaResult<()> {
        let (a, sbx) = i.asbx();
        let next = match (self.reg(a), self.reg(a + 1), self.reg(a + 2)) {
            (Value::Integer(idx), Value::Integer(limit), Value::Integer(step)) => {
                let idx = idx.wrapping_add(step);
                let more = if step > 0 { idx <= limit } else { limit <= idx };
                more.then_some(Value::Integer(idx))
            }
            (idx, limit, step) => {
                let step = for_number(&step, "step")?;
                let idx = for_number(&idx, "initial value")? + step;
                let limit = for_number(&limit, "limit")?;
                let more = if step > 0.0 { idx <= limit } else { limit <= idx };
                more.then_some(Value::Number(idx))
            }
        };
        if let Some(idx) = next {
            self.set_reg(a, idx.clone())?;
            self.set_reg(a + 3, idx)?;
            self.add_pc(sbx)?;
        }
        Ok(())
    }

    /// R(A+3), ... ,R(A+2+C) := R(A)(R(A+1), R(A+2))
    pub(crate) fn op_tforcall(&mut self, i: Instruction) -> LuaResult<()> {
        let (a, _, c) = i.abc();
        self.push_func_and_args(a, 3)?;
        self.call(2, c as i32)?;
        self.pop_results(a + 3, c + 1)
    }

    /// if R(A+1) ~= nil then { R(A) = R(A+1); pc += sBx }
    pub(crate) fn op_tforloop(&mut self, i: Instruction) -> LuaResult<()> {
        let (a, sbx) = i.asbx();
        let control = self.reg(a + 1);
        if !control.is_nil() {
            self.set_reg(a, control)?;
            self.add_pc(sbx)?;
        }
        Ok(())
    }
}
