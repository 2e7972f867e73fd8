use std::fmt;

use ndarray::{Array, ArrayD, Dimension};
use serde::{Deserialize, Serialize};

/// A value stored under an attribute name in a [`Namespace`](crate::Namespace).
///
/// The variant is the value's type discriminator. Once a model has been
/// initialized, the variant (and for arrays, the number of dimensions) of
/// every namespace entry is fixed; only array shapes may change.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A 64-bit floating-point number.
    Float(f64),
    /// A 64-bit signed integer.
    Int(i64),
    /// A boolean value.
    Bool(bool),
    /// A UTF-8 string.
    Text(String),
    /// An n-dimensional array of 64-bit floats.
    FloatArray(ArrayD<f64>),
    /// An n-dimensional array of 64-bit signed integers.
    IntArray(ArrayD<i64>),
    /// An n-dimensional array of booleans.
    BoolArray(ArrayD<bool>),
    /// A heterogeneous list of values.
    ///
    /// Lists are copied and serialized like any other value but cannot be
    /// handed to a JIT or native backend.
    List(Vec<Value>),
}

/// Represents the kind of a `Value`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Float,
    Int,
    Bool,
    Text,
    FloatArray,
    IntArray,
    BoolArray,
    List,
}

/// The structural type of a value: its kind and, for arrays, its rank.
///
/// Non-array values always have `ndim == 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldType {
    pub kind: ValueKind,
    #[serde(default)]
    pub ndim: usize,
}

impl Value {
    /// Returns the kind of this value.
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        ValueKind::from(self)
    }

    /// Returns the number of array dimensions, or `0` for non-array values.
    #[must_use]
    pub fn ndim(&self) -> usize {
        match self {
            Value::FloatArray(a) => a.ndim(),
            Value::IntArray(a) => a.ndim(),
            Value::BoolArray(a) => a.ndim(),
            _ => 0,
        }
    }

    /// Returns the structural type of this value.
    #[must_use]
    pub fn field_type(&self) -> FieldType {
        FieldType {
            kind: self.kind(),
            ndim: self.ndim(),
        }
    }

    /// Returns the array shape, or `None` for non-array values.
    #[must_use]
    pub fn shape(&self) -> Option<&[usize]> {
        match self {
            Value::FloatArray(a) => Some(a.shape()),
            Value::IntArray(a) => Some(a.shape()),
            Value::BoolArray(a) => Some(a.shape()),
            _ => None,
        }
    }

    /// Returns the number of bytes held by array elements.
    #[must_use]
    pub fn nbytes(&self) -> usize {
        match self {
            Value::FloatArray(a) => a.len() * size_of::<f64>(),
            Value::IntArray(a) => a.len() * size_of::<i64>(),
            Value::BoolArray(a) => a.len() * size_of::<bool>(),
            Value::List(items) => items.iter().map(Value::nbytes).sum(),
            _ => 0,
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_float_array(&self) -> Option<&ArrayD<f64>> {
        match self {
            Value::FloatArray(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_float_array_mut(&mut self) -> Option<&mut ArrayD<f64>> {
        match self {
            Value::FloatArray(a) => Some(a),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_int_array(&self) -> Option<&ArrayD<i64>> {
        match self {
            Value::IntArray(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_int_array_mut(&mut self) -> Option<&mut ArrayD<i64>> {
        match self {
            Value::IntArray(a) => Some(a),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool_array(&self) -> Option<&ArrayD<bool>> {
        match self {
            Value::BoolArray(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_bool_array_mut(&mut self) -> Option<&mut ArrayD<bool>> {
        match self {
            Value::BoolArray(a) => Some(a),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }
}

impl ValueKind {
    /// Returns `true` for the array kinds.
    #[must_use]
    pub fn is_array(self) -> bool {
        matches!(
            self,
            ValueKind::FloatArray | ValueKind::IntArray | ValueKind::BoolArray
        )
    }
}

impl FieldType {
    /// Creates a scalar (or list/text) field type.
    #[must_use]
    pub fn scalar(kind: ValueKind) -> Self {
        Self { kind, ndim: 0 }
    }

    /// Creates an array field type with the given rank.
    #[must_use]
    pub fn array(kind: ValueKind, ndim: usize) -> Self {
        Self { kind, ndim }
    }
}

impl From<&Value> for ValueKind {
    fn from(value: &Value) -> Self {
        match value {
            Value::Float(_) => ValueKind::Float,
            Value::Int(_) => ValueKind::Int,
            Value::Bool(_) => ValueKind::Bool,
            Value::Text(_) => ValueKind::Text,
            Value::FloatArray(_) => ValueKind::FloatArray,
            Value::IntArray(_) => ValueKind::IntArray,
            Value::BoolArray(_) => ValueKind::BoolArray,
            Value::List(_) => ValueKind::List,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Float => "float",
            ValueKind::Int => "int",
            ValueKind::Bool => "bool",
            ValueKind::Text => "text",
            ValueKind::FloatArray => "float array",
            ValueKind::IntArray => "int array",
            ValueKind::BoolArray => "bool array",
            ValueKind::List => "list",
        };
        f.write_str(name)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.kind.is_array() {
            write!(f, "{} (ndim {})", self.kind, self.ndim)
        } else {
            write!(f, "{}", self.kind)
        }
    }
}

impl From<f64> for Value {
    fn from(val: f64) -> Self {
        Value::Float(val)
    }
}

impl From<i64> for Value {
    fn from(val: i64) -> Self {
        Value::Int(val)
    }
}

impl From<i32> for Value {
    fn from(val: i32) -> Self {
        Value::Int(val.into())
    }
}

impl From<bool> for Value {
    fn from(val: bool) -> Self {
        Value::Bool(val)
    }
}

impl From<&str> for Value {
    fn from(val: &str) -> Self {
        Value::Text(val.to_owned())
    }
}

impl From<String> for Value {
    fn from(val: String) -> Self {
        Value::Text(val)
    }
}

impl<D: Dimension> From<Array<f64, D>> for Value {
    fn from(val: Array<f64, D>) -> Self {
        Value::FloatArray(val.into_dyn())
    }
}

impl<D: Dimension> From<Array<i64, D>> for Value {
    fn from(val: Array<i64, D>) -> Self {
        Value::IntArray(val.into_dyn())
    }
}

impl<D: Dimension> From<Array<bool, D>> for Value {
    fn from(val: Array<bool, D>) -> Self {
        Value::BoolArray(val.into_dyn())
    }
}

impl From<Vec<Value>> for Value {
    fn from(val: Vec<Value>) -> Self {
        Value::List(val)
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{Array1, Array2, array};

    use super::*;

    #[test]
    fn field_type_tracks_kind_and_rank() {
        assert_eq!(
            Value::from(0.5).field_type(),
            FieldType::scalar(ValueKind::Float)
        );
        assert_eq!(
            Value::from(Array2::<f64>::zeros((3, 4))).field_type(),
            FieldType::array(ValueKind::FloatArray, 2)
        );
        assert_eq!(
            Value::from(array![1_i64, 2, 3]).field_type(),
            FieldType::array(ValueKind::IntArray, 1)
        );
        assert_eq!(Value::from("euler").kind(), ValueKind::Text);
        assert_eq!(Value::from(7_i32), Value::Int(7));
    }

    #[test]
    fn shape_and_nbytes() {
        let value = Value::from(Array1::<f64>::zeros(10));
        assert_eq!(value.shape(), Some(&[10][..]));
        assert_eq!(value.nbytes(), 80);

        let list = Value::from(vec![Value::from(array![true, false]), Value::from(1.0)]);
        assert_eq!(list.shape(), None);
        assert_eq!(list.nbytes(), 2);
    }

    #[test]
    fn typed_accessors_reject_other_kinds() {
        let mut value = Value::from(array![1.0, 2.0]);
        assert!(value.as_float().is_none());
        assert!(value.as_int_array().is_none());

        value.as_float_array_mut().unwrap().fill(5.0);
        assert_eq!(value.as_float_array().unwrap().sum(), 10.0);
    }

    #[test]
    fn display_names_rank_for_arrays_only() {
        assert_eq!(FieldType::array(ValueKind::IntArray, 3).to_string(), "int array (ndim 3)");
        assert_eq!(FieldType::scalar(ValueKind::Bool).to_string(), "bool");
    }
}
