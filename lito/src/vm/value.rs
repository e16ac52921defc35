use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::channel::Channel;
use super::class::ClassId;
use super::error::ErrorObject;
use super::frame::BlockObject;
use super::host::{FileObject, LockObject};
use super::wait_group::WaitGroup;

#[derive(Clone, Debug, Default)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    Array(Arc<ArrayObject>),
    Hash(Arc<HashObject>),
    Range(RangeValue),
    Block(Arc<BlockObject>),
    Channel(Arc<Channel>),
    WaitGroup(Arc<WaitGroup>),
    Regexp(Arc<RegexpObject>),
    Class(ClassId),
    Object(Arc<Instance>),
    Error(Arc<ErrorObject>),
    File(Arc<FileObject>),
    Lock(Arc<LockObject>),
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(Arc::from(value))
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(Arc::from(value))
    }
}

impl Value {
    pub fn array(elements: Vec<Value>) -> Self {
        Value::Array(Arc::new(ArrayObject::new(elements)))
    }

    pub fn hash(pairs: BTreeMap<String, Value>) -> Self {
        Value::Hash(Arc::new(HashObject::new(pairs)))
    }

    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(value) => Some(*value),
            _ => None,
        }
    }

    /// Integers widen to floats.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Int(value) => Some(*value as f64),
            Value::Float(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_class(&self) -> Option<ClassId> {
        match self {
            Value::Class(id) => Some(*id),
            _ => None,
        }
    }

    /// Identity: scalars compare by value, heap objects by address.
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Range(a), Value::Range(b)) => a == b,
            (Value::Class(a), Value::Class(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Arc::ptr_eq(a, b),
            (Value::Hash(a), Value::Hash(b)) => Arc::ptr_eq(a, b),
            (Value::Block(a), Value::Block(b)) => Arc::ptr_eq(a, b),
            (Value::Channel(a), Value::Channel(b)) => Arc::ptr_eq(a, b),
            (Value::WaitGroup(a), Value::WaitGroup(b)) => Arc::ptr_eq(a, b),
            (Value::Regexp(a), Value::Regexp(b)) => Arc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            (Value::Error(a), Value::Error(b)) => Arc::ptr_eq(a, b),
            (Value::File(a), Value::File(b)) => Arc::ptr_eq(a, b),
            (Value::Lock(a), Value::Lock(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Structural equality used by `==`.
    pub fn equal_to(&self, other: &Value) -> bool {
        if self.same(other) {
            return true;
        }
        match (self, other) {
            (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
                self.as_number() == other.as_number()
            }
            (Value::Array(a), Value::Array(b)) => {
                let left = a.snapshot();
                let right = b.snapshot();
                left.len() == right.len()
                    && left.iter().zip(&right).all(|(l, r)| l.equal_to(r))
            }
            (Value::Hash(a), Value::Hash(b)) => {
                let left = a.snapshot();
                let right = b.snapshot();
                left.len() == right.len()
                    && left
                        .iter()
                        .all(|(key, value)| right.get(key).is_some_and(|other| value.equal_to(other)))
            }
            (Value::Object(a), Value::Object(b)) => {
                a.class == b.class && a.ivars.same_contents(&b.ivars)
            }
            _ => false,
        }
    }
}

/// Shared, mutable array storage.
#[derive(Debug, Default)]
pub struct ArrayObject {
    elements: RwLock<Vec<Value>>,
}

impl ArrayObject {
    pub fn new(elements: Vec<Value>) -> Self {
        Self {
            elements: RwLock::new(elements),
        }
    }

    pub fn snapshot(&self) -> Vec<Value> {
        self.elements.read().clone()
    }

    pub fn len(&self) -> usize {
        self.elements.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.read().is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.elements.read().get(index).cloned()
    }

    pub fn push(&self, value: Value) {
        self.elements.write().push(value);
    }

    pub fn with_mut<R>(&self, f: impl FnOnce(&mut Vec<Value>) -> R) -> R {
        f(&mut self.elements.write())
    }

    pub fn replace(&self, elements: Vec<Value>) {
        *self.elements.write() = elements;
    }
}

/// Shared string-keyed map; keys iterate in sorted order.
#[derive(Debug, Default)]
pub struct HashObject {
    pairs: RwLock<BTreeMap<String, Value>>,
}

impl HashObject {
    pub fn new(pairs: BTreeMap<String, Value>) -> Self {
        Self {
            pairs: RwLock::new(pairs),
        }
    }

    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.pairs.read().clone()
    }

    pub fn len(&self) -> usize {
        self.pairs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.read().is_empty()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.pairs.read().get(key).cloned()
    }

    pub fn insert(&self, key: impl Into<String>, value: Value) {
        self.pairs.write().insert(key.into(), value);
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.pairs.write().remove(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.pairs.read().keys().cloned().collect()
    }

    pub fn clear(&self) {
        self.pairs.write().clear();
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RangeValue {
    pub start: i64,
    pub end: i64,
    pub exclusive: bool,
}

impl RangeValue {
    /// Values in iteration order; descending when `end < start`.
    pub fn values(&self) -> Vec<i64> {
        let step = if self.end < self.start { -1 } else { 1 };
        let stop = if self.exclusive {
            self.end
        } else {
            self.end + step
        };
        let mut out = Vec::new();
        let mut current = self.start;
        while current != stop {
            out.push(current);
            current += step;
        }
        out
    }

    pub fn len(&self) -> usize {
        let span = (self.end - self.start).unsigned_abs() as usize;
        if self.exclusive { span } else { span + 1 }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug)]
pub struct RegexpObject {
    pub source: String,
    pub regex: regex::Regex,
}

/// Instance variables, kept sorted by name.
#[derive(Debug, Default)]
pub struct Ivars {
    vars: RwLock<BTreeMap<String, Value>>,
}

impl Ivars {
    pub fn get(&self, name: &str) -> Option<Value> {
        self.vars.read().get(name).cloned()
    }

    pub fn set(&self, name: impl Into<String>, value: Value) {
        self.vars.write().insert(name.into(), value);
    }

    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.vars.read().clone()
    }

    pub fn from_map(vars: BTreeMap<String, Value>) -> Self {
        Self {
            vars: RwLock::new(vars),
        }
    }

    fn same_contents(&self, other: &Ivars) -> bool {
        let left = self.snapshot();
        let right = other.snapshot();
        left.len() == right.len()
            && left
                .iter()
                .all(|(name, value)| right.get(name).is_some_and(|other| value.same(other)))
    }
}

/// Instance of a user-defined (or `Object`) class.
#[derive(Debug)]
pub struct Instance {
    pub class: ClassId,
    pub ivars: Ivars,
}

impl Instance {
    pub fn new(class: ClassId) -> Self {
        Self {
            class,
            ivars: Ivars::default(),
        }
    }
}

/// Mutable cell backing a local variable or constant.
#[derive(Debug, Default)]
pub struct Pointer {
    target: RwLock<Value>,
}

impl Pointer {
    pub fn new(value: Value) -> Arc<Self> {
        Arc::new(Self {
            target: RwLock::new(value),
        })
    }

    pub fn get(&self) -> Value {
        self.target.read().clone()
    }

    pub fn set(&self, value: Value) {
        *self.target.write() = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranges_walk_both_directions() {
        let up = RangeValue {
            start: 1,
            end: 3,
            exclusive: false,
        };
        assert_eq!(up.values(), vec![1, 2, 3]);
        let down = RangeValue {
            start: 3,
            end: 0,
            exclusive: true,
        };
        assert_eq!(down.values(), vec![3, 2, 1]);
        assert_eq!(down.len(), 3);
    }

    #[test]
    fn numeric_equality_crosses_int_and_float() {
        assert!(Value::Int(2).equal_to(&Value::Float(2.0)));
        assert!(!Value::Int(2).same(&Value::Float(2.0)));
        let a = Value::array(vec![Value::Int(1), Value::from("x")]);
        let b = Value::array(vec![Value::Float(1.0), Value::from("x")]);
        assert!(a.equal_to(&b));
        assert!(!a.same(&b));
    }
}
