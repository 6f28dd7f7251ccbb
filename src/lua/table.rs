//! Lua tables
//!
//! A table keeps a dense array part for keys `1..=n` and a hash part for
//! everything else. The array part never ends in nil, so its length is
//! always a valid border.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use crate::error::{LuaError, LuaResult};

use super::number::float_to_integer;
use super::value::Value;

pub type TableRef = Rc<RefCell<Table>>;

/// Hash key wrapper. Never holds nil or NaN, and floats with an integral
/// value are stored as integers.
#[derive(Debug, Clone)]
struct TableKey(Value);

impl Hash for TableKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match &self.0 {
            Value::Nil => 0u8.hash(state),
            Value::Boolean(b) => (1u8, b).hash(state),
            Value::Integer(i) => (2u8, i).hash(state),
            Value::Number(n) => (3u8, n.to_bits()).hash(state),
            Value::String(s) => (4u8, s).hash(state),
            other => (5u8, other.ref_ptr().map(|p| p as usize)).hash(state),
        }
    }
}

impl PartialEq for TableKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.raw_equals(&other.0)
    }
}

impl Eq for TableKey {}

fn normalize_key(key: &Value) -> Value {
    match key {
        Value::Number(n) => match float_to_integer(*n) {
            Some(i) => Value::Integer(i),
            None => key.clone(),
        },
        _ => key.clone(),
    }
}

/// Lua table
#[derive(Default)]
pub struct Table {
    /// Array part, keys 1..=array.len()
    array: Vec<Value>,

    /// Hash part
    map: HashMap<TableKey, Value>,

    /// Metatable
    metatable: Option<TableRef>,

    /// Successor of each key for `next`, rebuilt when a traversal starts
    /// after the table changed
    iter_keys: Option<HashMap<Option<TableKey>, TableKey>>,

    /// Final key of the traversal order
    last_key: Option<TableKey>,

    changed: bool,
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("array", &self.array)
            .field("hash_len", &self.map.len())
            .field("metatable", &self.metatable.as_ref().map(Rc::as_ptr))
            .finish()
    }
}

impl Table {
    /// Create a table with capacity hints for both parts
    pub fn new(narr: usize, nrec: usize) -> Self {
        Table {
            array: Vec::with_capacity(narr),
            map: HashMap::with_capacity(nrec),
            ..Table::default()
        }
    }

    pub fn new_ref(narr: usize, nrec: usize) -> TableRef {
        Rc::new(RefCell::new(Table::new(narr, nrec)))
    }

    /// Raw lookup
    pub fn get(&self, key: &Value) -> Value {
        let key = normalize_key(key);
        if let Value::Integer(i) = key {
            return self.get_int(i);
        }
        match key {
            Value::Nil => Value::Nil,
            Value::Number(n) if n.is_nan() => Value::Nil,
            key => self.map.get(&TableKey(key)).cloned().unwrap_or_default(),
        }
    }

    pub fn get_int(&self, i: i64) -> Value {
        if i >= 1 && (i as u64) <= self.array.len() as u64 {
            return self.array[(i - 1) as usize].clone();
        }
        self.map.get(&TableKey(Value::Integer(i))).cloned().unwrap_or_default()
    }

    pub fn get_str(&self, key: &str) -> Value {
        self.get(&Value::from(key))
    }

    /// Raw store. A nil value removes the key.
    pub fn set(&mut self, key: Value, value: Value) -> LuaResult<()> {
        match &key {
            Value::Nil => return Err(LuaError::type_error("table index is nil")),
            Value::Number(n) if n.is_nan() => return Err(LuaError::type_error("table index is NaN")),
            _ => {}
        }
        self.changed = true;

        let key = normalize_key(&key);
        if let Value::Integer(idx) = key {
            if idx >= 1 {
                let len = self.array.len() as u64;
                let pos = idx as u64;
                if pos <= len {
                    let last = pos == len;
                    let clearing = value.is_nil();
                    self.array[(pos - 1) as usize] = value;
                    if last && clearing {
                        self.shrink_array();
                    }
                    return Ok(());
                }
                if pos == len + 1 {
                    self.map.remove(&TableKey(key));
                    if !value.is_nil() {
                        self.array.push(value);
                        self.expand_array();
                    }
                    return Ok(());
                }
            }
        }

        if value.is_nil() {
            self.map.remove(&TableKey(key));
        } else {
            self.map.insert(TableKey(key), value);
        }
        Ok(())
    }

    pub fn set_int(&mut self, i: i64, value: Value) -> LuaResult<()> {
        self.set(Value::Integer(i), value)
    }

    pub fn set_str(&mut self, key: &str, value: Value) -> LuaResult<()> {
        self.set(Value::from(key), value)
    }

    fn shrink_array(&mut self) {
        while matches!(self.array.last(), Some(Value::Nil)) {
            self.array.pop();
        }
    }

    /// Move keys following the array part out of the hash part
    fn expand_array(&mut self) {
        loop {
            let next = Value::Integer(self.array.len() as i64 + 1);
            match self.map.remove(&TableKey(next)) {
                Some(value) => self.array.push(value),
                None => break,
            }
        }
    }

    /// Border of the table: the size of the array part
    pub fn len(&self) -> usize {
        self.array.len()
    }

    /// True when the table holds no entries at all
    pub fn is_empty(&self) -> bool {
        self.array.is_empty() && self.map.is_empty()
    }

    pub fn metatable(&self) -> Option<TableRef> {
        self.metatable.clone()
    }

    pub fn set_metatable(&mut self, metatable: Option<TableRef>) {
        self.metatable = metatable;
    }

    /// Whether the metatable has a non-nil field `name`
    pub fn has_metafield(&self, name: &str) -> bool {
        self.metatable
            .as_ref()
            .map(|mt| !mt.borrow().get_str(name).is_nil())
            .unwrap_or(false)
    }

    /// Entry following `key` in traversal order; `nil` starts a traversal.
    /// Entries cleared during a traversal are skipped.
    pub fn next(&mut self, key: &Value) -> LuaResult<Option<(Value, Value)>> {
        let key = normalize_key(key);
        if self.iter_keys.is_none() || (key.is_nil() && self.changed) {
            self.init_keys();
            self.changed = false;
        }
        let Some(keys) = self.iter_keys.as_ref() else {
            return Ok(None);
        };

        let cursor = if key.is_nil() { None } else { Some(TableKey(key)) };
        let mut next = match keys.get(&cursor) {
            Some(k) => k.clone(),
            None if cursor.is_some() && cursor != self.last_key => {
                return Err(LuaError::type_error("invalid key to 'next'"));
            }
            None => return Ok(None),
        };

        loop {
            let value = self.get(&next.0);
            if !value.is_nil() {
                return Ok(Some((next.0, value)));
            }
            match keys.get(&Some(next)) {
                Some(k) => next = k.clone(),
                None => return Ok(None),
            }
        }
    }

    fn init_keys(&mut self) {
        let mut keys = HashMap::with_capacity(self.array.len() + self.map.len());
        let mut prev: Option<TableKey> = None;
        for (i, value) in self.array.iter().enumerate() {
            if !value.is_nil() {
                let key = TableKey(Value::Integer(i as i64 + 1));
                keys.insert(prev, key.clone());
                prev = Some(key);
            }
        }
        for key in self.map.keys() {
            keys.insert(prev, key.clone());
            prev = Some(key.clone());
        }
        self.last_key = prev;
        self.iter_keys = Some(keys);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_border_after_clearing_last() {
        let mut t = Table::new(0, 0);
        for i in 1..=5 {
            t.set_int(i, Value::Integer(i * 10)).unwrap();
        }
        assert_eq!(t.len(), 5);

        t.set_int(5, Value::Nil).unwrap();
        let border = t.len() as i64;
        assert_eq!(border, 4);
        assert!(!t.get_int(border).is_nil());
        assert!(t.get_int(border + 1).is_nil());
    }

    #[test]
    fn test_array_absorbs_hash_keys() {
        let mut t = Table::new(0, 0);
        t.set_int(3, Value::from("c")).unwrap();
        t.set_int(2, Value::from("b")).unwrap();
        assert_eq!(t.len(), 0);

        t.set_int(1, Value::from("a")).unwrap();
        assert_eq!(t.len(), 3);
        assert_eq!(t.get_int(3), Value::from("c"));
    }

    #[test]
    fn test_float_keys_normalize() {
        let mut t = Table::new(0, 0);
        t.set(Value::Number(1.0), Value::from("one")).unwrap();
        assert_eq!(t.get(&Value::Integer(1)), Value::from("one"));
        t.set(Value::Number(1.5), Value::from("half")).unwrap();
        assert_eq!(t.get(&Value::Number(1.5)), Value::from("half"));
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn test_invalid_keys() {
        let mut t = Table::new(0, 0);
        assert!(t.set(Value::Nil, Value::Integer(1)).is_err());
        assert!(t.set(Value::Number(f64::NAN), Value::Integer(1)).is_err());
        assert!(t.get(&Value::Nil).is_nil());
    }

    #[test]
    fn test_reference_keys_use_identity() {
        let mut t = Table::new(0, 0);
        let k1 = Value::new_table();
        let k2 = Value::new_table();
        t.set(k1.clone(), Value::Integer(1)).unwrap();
        assert_eq!(t.get(&k1), Value::Integer(1));
        assert!(t.get(&k2).is_nil());
    }

    #[test]
    fn test_next_visits_every_entry() {
        let mut t = Table::new(0, 0);
        t.set_int(1, Value::Integer(10)).unwrap();
        t.set_int(2, Value::Integer(20)).unwrap();
        t.set_str("x", Value::Boolean(true)).unwrap();
        t.set_str("y", Value::Boolean(false)).unwrap();

        let mut key = Value::Nil;
        let mut seen = Vec::new();
        while let Some((k, v)) = t.next(&key).unwrap() {
            seen.push((k.clone(), v));
            key = k;
        }
        assert_eq!(seen.len(), 4);
        assert_eq!(seen[0], (Value::Integer(1), Value::Integer(10)));
        assert_eq!(seen[1], (Value::Integer(2), Value::Integer(20)));

        assert!(t.next(&Value::from("missing")).is_err());
    }

    #[test]
    fn test_next_skips_cleared_entries() {
        let mut t = Table::new(0, 0);
        t.set_str("a", Value::Integer(1)).unwrap();
        t.set_str("b", Value::Integer(2)).unwrap();

        let (first, _) = t.next(&Value::Nil).unwrap().unwrap();
        t.set(first.clone(), Value::Nil).unwrap();
        let (second, _) = t.next(&first).unwrap().unwrap();
        assert_ne!(second, first);
        assert!(t.next(&second).unwrap().is_none());
    }

    #[test]
    fn test_metafield_lookup() {
        let mut t = Table::new(0, 0);
        assert!(!t.has_metafield("__index"));
        let mt = Table::new_ref(0, 0);
        mt.borrow_mut().set_str("__index", Value::new_table()).unwrap();
        t.set_metatable(Some(mt));
        assert!(t.has_metafield("__index"));
        assert!(!t.has_metafield("__call"));
    }
}
