//! Table access through the stack
//!
//! Metatable-aware lookups follow `__index` / `__newindex` chains; the raw
//! variants never consult metatables.

use crate::error::{LuaError, LuaResult};

use super::closure::NativeFunction;
use super::metamethod::MetamethodType;
use super::state::LuaState;
use super::table::Table;
use super::value::{LuaType, Value};

/// Bound on `__index` / `__newindex` chains
const MAX_TAG_LOOP: usize = 2000;

impl LuaState {
    /// `t[k]` honouring `__index`
    pub(crate) fn table_get(&mut self, t: &Value, k: &Value) -> LuaResult<Value> {
        let mut current = t.clone();
        for _ in 0..MAX_TAG_LOOP {
            if let Value::Table(tbl) = &current {
                let tbl = tbl.borrow();
                let value = tbl.get(k);
                if !value.is_nil() || !tbl.has_metafield(MetamethodType::Index.name()) {
                    return Ok(value);
                }
            }

            let handler = match self.get_metafield(&current, MetamethodType::Index) {
                Some(handler) => handler,
                None => {
                    return Err(LuaError::type_error(format!(
                        "attempt to index a {} value",
                        current.type_name()
                    )))
                }
            };
            match handler {
                Value::Function(_) => return self.call_metamethod(handler, &[current, k.clone()]),
                next => current = next,
            }
        }
        Err(LuaError::type_error("'__index' chain too long; possible loop"))
    }

    /// `t[k] = v` honouring `__newindex`
    pub(crate) fn table_set(&mut self, t: &Value, k: Value, v: Value) -> LuaResult<()> {
        let mut current = t.clone();
        for _ in 0..MAX_TAG_LOOP {
            if let Value::Table(tbl) = &current {
                // The metatable may be the table itself, so check before borrowing mutably
                let raw = {
                    let t = tbl.borrow();
                    !t.get(&k).is_nil() || !t.has_metafield(MetamethodType::NewIndex.name())
                };
                if raw {
                    return tbl.borrow_mut().set(k, v);
                }
            }

            let handler = match self.get_metafield(&current, MetamethodType::NewIndex) {
                Some(handler) => handler,
                None => {
                    return Err(LuaError::type_error(format!(
                        "attempt to index a {} value",
                        current.type_name()
                    )))
                }
            };
            match handler {
                Value::Function(_) => {
                    self.call_metamethod_n(handler, &[current, k, v], 0)?;
                    return Ok(());
                }
                next => current = next,
            }
        }
        Err(LuaError::type_error("'__newindex' chain too long; possible loop"))
    }

    fn raw_table_get(&self, t: &Value, k: &Value) -> LuaResult<Value> {
        match t {
            Value::Table(tbl) => Ok(tbl.borrow().get(k)),
            other => Err(LuaError::type_error(format!("table expected, got {}", other.type_name()))),
        }
    }

    fn raw_table_set(&self, t: &Value, k: Value, v: Value) -> LuaResult<()> {
        match t {
            Value::Table(tbl) => tbl.borrow_mut().set(k, v),
            other => Err(LuaError::type_error(format!("table expected, got {}", other.type_name()))),
        }
    }

    fn push_typed(&mut self, value: Value) -> LuaResult<LuaType> {
        let tp = value.type_of();
        self.push(value)?;
        Ok(tp)
    }

    /// Push a new empty table
    pub fn new_table(&mut self) -> LuaResult<()> {
        self.create_table(0, 0)
    }

    /// Push a new table with preallocated array and hash parts
    pub fn create_table(&mut self, narr: usize, nrec: usize) -> LuaResult<()> {
        self.push(Value::Table(Table::new_ref(narr, nrec)))
    }

    /// Pop a key and push `t[key]` for the table at `idx`
    pub fn get_table(&mut self, idx: i32) -> LuaResult<LuaType> {
        let t = self.index_value(idx);
        let k = self.pop_value()?;
        let value = self.table_get(&t, &k)?;
        self.push_typed(value)
    }

    /// Push `t[k]` for the table at `idx`
    pub fn get_field(&mut self, idx: i32, k: &str) -> LuaResult<LuaType> {
        let t = self.index_value(idx);
        let value = self.table_get(&t, &Value::from(k))?;
        self.push_typed(value)
    }

    /// Push `t[i]` for the table at `idx`
    pub fn get_i(&mut self, idx: i32, i: i64) -> LuaResult<LuaType> {
        let t = self.index_value(idx);
        let value = self.table_get(&t, &Value::Integer(i))?;
        self.push_typed(value)
    }

    pub fn raw_get(&mut self, idx: i32) -> LuaResult<LuaType> {
        let t = self.index_value(idx);
        let k = self.pop_value()?;
        let value = self.raw_table_get(&t, &k)?;
        self.push_typed(value)
    }

    pub fn raw_get_i(&mut self, idx: i32, i: i64) -> LuaResult<LuaType> {
        let t = self.index_value(idx);
        let value = self.raw_table_get(&t, &Value::Integer(i))?;
        self.push_typed(value)
    }

    /// Pop a value and a key and store `t[key] = value`
    pub fn set_table(&mut self, idx: i32) -> LuaResult<()> {
        let t = self.index_value(idx);
        let v = self.pop_value()?;
        let k = self.pop_value()?;
        self.table_set(&t, k, v)
    }

    /// Pop a value and store `t[k] = value`
    pub fn set_field(&mut self, idx: i32, k: &str) -> LuaResult<()> {
        let t = self.index_value(idx);
        let v = self.pop_value()?;
        self.table_set(&t, Value::from(k), v)
    }

    /// Pop a value and store `t[i] = value`
    pub fn set_i(&mut self, idx: i32, i: i64) -> LuaResult<()> {
        let t = self.index_value(idx);
        let v = self.pop_value()?;
        self.table_set(&t, Value::Integer(i), v)
    }

    pub fn raw_set(&mut self, idx: i32) -> LuaResult<()> {
        let t = self.index_value(idx);
        let v = self.pop_value()?;
        let k = self.pop_value()?;
        self.raw_table_set(&t, k, v)
    }

    pub fn raw_set_i(&mut self, idx: i32, i: i64) -> LuaResult<()> {
        let t = self.index_value(idx);
        let v = self.pop_value()?;
        self.raw_table_set(&t, Value::Integer(i), v)
    }

    /// Push the metatable of the value at `idx`; false and nothing pushed
    /// when it has none
    pub fn get_metatable(&mut self, idx: i32) -> LuaResult<bool> {
        let value = self.index_value(idx);
        match self.metatable_of(&value) {
            Some(mt) => {
                self.push(Value::Table(mt))?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Pop a table (or nil) and make it the metatable of the value at `idx`
    pub fn set_metatable(&mut self, idx: i32) -> LuaResult<()> {
        let value = self.index_value(idx);
        let mt = match self.pop_value()? {
            Value::Nil => None,
            Value::Table(t) => Some(t),
            _ => return Err(LuaError::type_error("table expected")),
        };
        self.set_metatable_of(&value, mt)
    }

    /// Push the global `name`
    pub fn get_global(&mut self, name: &str) -> LuaResult<LuaType> {
        let globals = self.globals();
        let value = self.table_get(&globals, &Value::from(name))?;
        self.push_typed(value)
    }

    /// Pop a value into the global `name`
    pub fn set_global(&mut self, name: &str) -> LuaResult<()> {
        let globals = self.globals();
        let v = self.pop_value()?;
        self.table_set(&globals, Value::from(name), v)
    }

    /// Expose a native function as the global `name`
    pub fn register(&mut self, name: &str, f: NativeFunction) -> LuaResult<()> {
        self.push_native_function(f)?;
        self.set_global(name)
    }

    /// Pop a key and push the next key/value pair of the table at `idx`.
    /// Returns false, pushing nothing, when the traversal is over.
    pub fn next(&mut self, idx: i32) -> LuaResult<bool> {
        let t = self.index_value(idx);
        let Value::Table(tbl) = t else {
            return Err(LuaError::type_error(format!("table expected, got {}", t.type_name())));
        };
        let key = self.pop_value()?;
        let entry = tbl.borrow_mut().next(&key)?;
        match entry {
            Some((k, v)) => {
                self.push(k)?;
                self.push(v)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Length without `__len`: string size or table border
    pub fn raw_len(&self, idx: i32) -> usize {
        match self.index_value(idx) {
            Value::String(s) => s.len(),
            Value::Table(t) => t.borrow().len(),
            _ => 0,
        }
    }

    pub fn raw_equal(&self, idx1: i32, idx2: i32) -> bool {
        if !self.is_valid(idx1) || !self.is_valid(idx2) {
            return false;
        }
        self.index_value(idx1).raw_equals(&self.index_value(idx2))
    }
}
