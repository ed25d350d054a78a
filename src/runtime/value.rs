//! Runtime value representation
//!
//! This module defines the values coroutines yield, receive and return.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use crate::config::DumpLimits;

/// Runtime value
#[derive(Debug, Clone)]
pub enum Value {
    Int(i64),
    Float(f64),
    String(String),
    Bool(bool),
    Nil,
    List(Vec<Value>),
    Table(BTreeMap<String, Value>),
    Pointer(Arc<Mutex<Value>>),
}

impl Value {
    /// Create a shared, mutable value
    pub fn pointer(value: Value) -> Self {
        Value::Pointer(Arc::new(Mutex::new(value)))
    }

    /// Build a table from key/value pairs
    pub fn table<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Table(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Tag shown in place of a container nested too deep to render
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Bool(_) => "bool",
            Value::Nil => "nil",
            Value::List(_) => "list",
            Value::Table(_) => "table",
            Value::Pointer(_) => "pointer",
        }
    }

    /// Render with explicit bounds; see [`super::dump`]
    pub fn dump(&self, limits: &DumpLimits) -> String {
        super::dump::dump(self, limits)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.dump(&DumpLimits::default()))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Nil, Value::Nil) => true,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Table(a), Value::Table(b)) => a == b,
            // pointers compare by identity, so cyclic values never recurse
            (Value::Pointer(a), Value::Pointer(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}
