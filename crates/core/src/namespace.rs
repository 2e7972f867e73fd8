use std::fmt;

use ndarray::ArrayD;

use crate::Value;

/// An ordered group of named, typed attributes.
///
/// Attributes keep their insertion order, and replacing an existing attribute
/// keeps its position. The order is part of the namespace's layout: it is the
/// field order seen by JIT views and native structs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Namespace {
    entries: Vec<(String, Value)>,
}

impl Namespace {
    /// Creates an empty namespace.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.position(name).map(|i| &self.entries[i].1)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.position(name).map(|i| &mut self.entries[i].1)
    }

    /// Sets an attribute, returning the previous value if it existed.
    ///
    /// No type checking happens here. Structural changes are caught by
    /// [`EconModel::check_types`](crate::EconModel::check_types) or avoided
    /// by assigning through [`EconModel::set`](crate::EconModel::set).
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let name = name.into();
        let value = value.into();
        match self.position(&name) {
            Some(i) => Some(std::mem::replace(&mut self.entries[i].1, value)),
            None => {
                self.entries.push((name, value));
                None
            }
        }
    }

    /// Removes an attribute, preserving the order of the remaining ones.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.position(name).map(|i| self.entries.remove(i).1)
    }

    /// Returns an iterator over attribute names in order.
    pub fn names(&self) -> impl ExactSizeIterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    /// Returns an iterator over `(name, value)` pairs in order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Returns an iterator over `(name, value)` pairs with mutable values.
    pub fn iter_mut(&mut self) -> impl ExactSizeIterator<Item = (&str, &mut Value)> {
        self.entries
            .iter_mut()
            .map(|(name, value)| (name.as_str(), value))
    }

    /// Returns the float stored under `name`, if it is a float.
    #[must_use]
    pub fn float(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Value::as_float)
    }

    /// Returns the integer stored under `name`, if it is an integer.
    #[must_use]
    pub fn int(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_int)
    }

    /// Returns the boolean stored under `name`, if it is a boolean.
    #[must_use]
    pub fn bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(Value::as_bool)
    }

    #[must_use]
    pub fn float_array(&self, name: &str) -> Option<&ArrayD<f64>> {
        self.get(name).and_then(Value::as_float_array)
    }

    pub fn float_array_mut(&mut self, name: &str) -> Option<&mut ArrayD<f64>> {
        self.get_mut(name).and_then(Value::as_float_array_mut)
    }

    #[must_use]
    pub fn int_array(&self, name: &str) -> Option<&ArrayD<i64>> {
        self.get(name).and_then(Value::as_int_array)
    }

    pub fn int_array_mut(&mut self, name: &str) -> Option<&mut ArrayD<i64>> {
        self.get_mut(name).and_then(Value::as_int_array_mut)
    }

    /// Total bytes held by array elements in this namespace.
    #[must_use]
    pub fn nbytes(&self) -> usize {
        self.entries.iter().map(|(_, value)| value.nbytes()).sum()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|(key, _)| key == name)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in self.iter() {
            match value {
                Value::Float(v) => writeln!(f, " {name} = {v} [float]")?,
                Value::Int(v) => writeln!(f, " {name} = {v} [int]")?,
                Value::Bool(v) => writeln!(f, " {name} = {v}")?,
                Value::Text(v) => writeln!(f, " {name} = {v:?} [text]")?,
                Value::List(items) => writeln!(f, " {name} = list with {} items", items.len())?,
                array => writeln!(
                    f,
                    " {name} = {} with shape = {:?}",
                    array.kind(),
                    array.shape().unwrap_or_default()
                )?,
            }
        }
        writeln!(f, " memory, gb: {:.1}", self.nbytes() as f64 / 1e9)
    }
}
