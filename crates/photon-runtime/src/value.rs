// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2026 Photon Contributors

//! Runtime value representation.
//!
//! Module exports are objects mutated by the module factory during and after
//! execution. Objects are handed out by reference (`ObjectRef`), so a reader
//! holding an exports object observes live mutation. This is what makes
//! circular requires resolvable: a partially-initialized exports object is a
//! valid value, and later writes become visible to everyone already holding
//! it.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

/// A shared, mutable object. Cloning is cheap and aliases the same storage.
pub type ObjectRef = Rc<RefCell<BTreeMap<String, Value>>>;

/// Creates a new empty object.
pub fn new_object() -> ObjectRef {
    Rc::new(RefCell::new(BTreeMap::new()))
}

/// A runtime value.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// undefined
    #[default]
    Undefined,
    /// null
    Null,
    /// Boolean value
    Boolean(bool),
    /// Number (IEEE 754 double)
    Number(f64),
    /// String
    String(String),
    /// Object reference
    Object(ObjectRef),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) => true,
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => {
                // NaN is never equal to itself
                if a.is_nan() && b.is_nan() { false } else { a == b }
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Value {
    /// Returns true if this value is undefined.
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Returns true if this value is an object.
    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    /// Returns the object reference if this value is an object.
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
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

impl From<ObjectRef> for Value {
    fn from(obj: ObjectRef) -> Self {
        Value::Object(obj)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_aliases_storage() {
        let obj = new_object();
        let alias = obj.clone();
        obj.borrow_mut().insert("a".into(), Value::Number(1.0));
        assert_eq!(alias.borrow().get("a"), Some(&Value::Number(1.0)));
    }

    #[test]
    fn test_object_equality_is_identity() {
        let a = new_object();
        let b = new_object();
        assert_eq!(Value::Object(a.clone()), Value::Object(a.clone()));
        assert_ne!(Value::Object(a), Value::Object(b));
    }

    #[test]
    fn test_nan_never_equal() {
        assert_ne!(Value::Number(f64::NAN), Value::Number(f64::NAN));
    }
}
