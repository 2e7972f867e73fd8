//! Plain-mapping form of a model.
//!
//! A [`ModelDict`] maps every namespace name to an ordered list of encoded
//! attributes and every declared other attribute to its encoded value. Arrays
//! are stored as a dtype, a shape and a little-endian byte buffer in row-major
//! order, so the mapping is independent of in-memory layout.

use std::collections::BTreeMap;

use ndarray::{ArrayD, IxDyn};
use serde::{Deserialize, Serialize};

use crate::{DecodeError, ModelState, Value};

/// A model's state as a plain, serializable mapping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelDict {
    entries: BTreeMap<String, Entry>,
}

/// A top-level entry of a [`ModelDict`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Entry {
    /// A namespace and its attributes in namespace order.
    Namespace(Vec<(String, Encoded)>),
    /// An other attribute.
    Attr(Encoded),
}

/// An encoded [`Value`].
///
/// Equality is bitwise: floats compare by bit pattern, so a NaN equals the
/// same NaN, as array buffers already do.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Encoded {
    Float(f64),
    Int(i64),
    Bool(bool),
    Text(String),
    Array {
        dtype: DType,
        shape: Vec<usize>,
        data: Vec<u8>,
    },
    List(Vec<Encoded>),
}

/// Element type of an encoded array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DType {
    F64,
    I64,
    Bool,
}

impl DType {
    /// Size of one element in bytes.
    #[must_use]
    pub fn itemsize(self) -> usize {
        match self {
            DType::F64 | DType::I64 => 8,
            DType::Bool => 1,
        }
    }
}

impl ModelDict {
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
        self.entries.contains_key(name)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Entry> {
        self.entries.get(name)
    }

    /// Returns the encoded attributes of a namespace entry.
    #[must_use]
    pub fn namespace(&self, name: &str) -> Option<&[(String, Encoded)]> {
        match self.entries.get(name) {
            Some(Entry::Namespace(attrs)) => Some(attrs),
            _ => None,
        }
    }

    /// Returns the encoded value of `namespace.attribute`.
    #[must_use]
    pub fn attribute(&self, namespace: &str, attribute: &str) -> Option<&Encoded> {
        self.namespace(namespace)?
            .iter()
            .find(|(name, _)| name == attribute)
            .map(|(_, encoded)| encoded)
    }

    pub fn insert(&mut self, name: impl Into<String>, entry: Entry) -> Option<Entry> {
        self.entries.insert(name.into(), entry)
    }

    pub fn remove(&mut self, name: &str) -> Option<Entry> {
        self.entries.remove(name)
    }

    /// Returns the top-level names in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Returns the entries in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Entry)> {
        self.entries.iter().map(|(name, entry)| (name.as_str(), entry))
    }

    /// Encodes `state`, leaving out whatever `filter` excludes.
    pub(crate) fn encode(state: &ModelState, filter: &AttrFilter) -> Self {
        let mut dict = Self::new();

        for (name, namespace) in state.namespaces() {
            if filter.excludes_entry(name) {
                continue;
            }
            let attrs = namespace
                .iter()
                .filter(|(attr, _)| !filter.excludes_attr(name, attr))
                .map(|(attr, value)| (attr.to_owned(), Encoded::from(value)))
                .collect();
            dict.insert(name, Entry::Namespace(attrs));
        }

        for (name, value) in state.other_attrs().iter() {
            if !filter.excludes_entry(name) {
                dict.insert(name, Entry::Attr(Encoded::from(value)));
            }
        }

        dict
    }

    /// Decodes the entries that apply to `state` without modifying it.
    ///
    /// With `existing_only`, namespace attributes that `state` does not
    /// already hold are passed over.
    pub(crate) fn decode(
        &self,
        state: &ModelState,
        filter: &AttrFilter,
        existing_only: bool,
    ) -> Result<Vec<Restored>, DecodeError> {
        let mut restored = Vec::new();

        for (name, entry) in self.iter() {
            if filter.excludes_entry(name) {
                continue;
            }

            if let Some(namespace) = state.namespace(name) {
                let Entry::Namespace(attrs) = entry else {
                    return Err(DecodeError::ExpectedNamespace(name.to_owned()));
                };
                for (attr, encoded) in attrs {
                    if filter.excludes_attr(name, attr)
                        || (existing_only && !namespace.contains(attr))
                    {
                        continue;
                    }
                    restored.push(Restored {
                        slot: Slot::Namespace(name.to_owned()),
                        attribute: attr.clone(),
                        value: encoded.decode(&format!("{name}.{attr}"))?,
                    });
                }
            } else if state.other_attr(name).is_some() {
                let Entry::Attr(encoded) = entry else {
                    return Err(DecodeError::ExpectedAttribute(name.to_owned()));
                };
                restored.push(Restored {
                    slot: Slot::Other,
                    attribute: name.to_owned(),
                    value: encoded.decode(name)?,
                });
            } else {
                return Err(DecodeError::UnknownEntry(name.to_owned()));
            }
        }

        Ok(restored)
    }
}

/// Where a decoded value goes.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Slot {
    Namespace(String),
    Other,
}

/// A decoded value waiting to be assigned.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Restored {
    pub slot: Slot,
    pub attribute: String,
    pub value: Value,
}

impl Restored {
    /// Assigns the value into `state`.
    pub(crate) fn apply(self, state: &mut ModelState) {
        match self.slot {
            Slot::Namespace(name) => {
                if let Some(namespace) = state.namespace_mut(&name) {
                    namespace.set(self.attribute, self.value);
                }
            }
            Slot::Other => {
                state.other_attrs_mut().set(self.attribute, self.value);
            }
        }
    }
}

/// A set of names to leave out when encoding or restoring.
///
/// Entries are either top-level names (a namespace or an other attribute) or
/// `namespace.attribute` paths.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct AttrFilter {
    entries: Vec<String>,
    attrs: Vec<(String, String)>,
}

impl AttrFilter {
    pub(crate) fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut filter = Self::default();
        for name in names {
            match name.as_ref().split_once('.') {
                Some((ns, attr)) => filter.attrs.push((ns.to_owned(), attr.to_owned())),
                None => filter.entries.push(name.as_ref().to_owned()),
            }
        }
        filter
    }

    pub(crate) fn excludes_entry(&self, name: &str) -> bool {
        self.entries.iter().any(|entry| entry == name)
    }

    pub(crate) fn excludes_attr(&self, namespace: &str, attribute: &str) -> bool {
        self.attrs
            .iter()
            .any(|(ns, attr)| ns == namespace && attr == attribute)
    }
}

impl From<&Value> for Encoded {
    fn from(value: &Value) -> Self {
        match value {
            Value::Float(v) => Encoded::Float(*v),
            Value::Int(v) => Encoded::Int(*v),
            Value::Bool(v) => Encoded::Bool(*v),
            Value::Text(v) => Encoded::Text(v.clone()),
            Value::FloatArray(a) => Encoded::Array {
                dtype: DType::F64,
                shape: a.shape().to_vec(),
                data: a.iter().flat_map(|v| v.to_le_bytes()).collect(),
            },
            Value::IntArray(a) => Encoded::Array {
                dtype: DType::I64,
                shape: a.shape().to_vec(),
                data: a.iter().flat_map(|v| v.to_le_bytes()).collect(),
            },
            Value::BoolArray(a) => Encoded::Array {
                dtype: DType::Bool,
                shape: a.shape().to_vec(),
                data: a.iter().map(|&v| u8::from(v)).collect(),
            },
            Value::List(items) => Encoded::List(items.iter().map(Encoded::from).collect()),
        }
    }
}

impl PartialEq for Encoded {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Encoded::Float(a), Encoded::Float(b)) => a.to_bits() == b.to_bits(),
            (Encoded::Int(a), Encoded::Int(b)) => a == b,
            (Encoded::Bool(a), Encoded::Bool(b)) => a == b,
            (Encoded::Text(a), Encoded::Text(b)) => a == b,
            (
                Encoded::Array {
                    dtype: a_dtype,
                    shape: a_shape,
                    data: a_data,
                },
                Encoded::Array {
                    dtype: b_dtype,
                    shape: b_shape,
                    data: b_data,
                },
            ) => a_dtype == b_dtype && a_shape == b_shape && a_data == b_data,
            (Encoded::List(a), Encoded::List(b)) => a == b,
            _ => false,
        }
    }
}

impl Encoded {
    /// Decodes into a [`Value`]; `path` names the entry in errors.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] if an array buffer does not match its shape
    /// or a bool byte is neither 0 nor 1.
    pub fn decode(&self, path: &str) -> Result<Value, DecodeError> {
        Ok(match self {
            Encoded::Float(v) => Value::Float(*v),
            Encoded::Int(v) => Value::Int(*v),
            Encoded::Bool(v) => Value::Bool(*v),
            Encoded::Text(v) => Value::Text(v.clone()),
            Encoded::Array { dtype, shape, data } => decode_array(path, *dtype, shape, data)?,
            Encoded::List(items) => Value::List(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| item.decode(&format!("{path}[{i}]")))
                    .collect::<Result<_, _>>()?,
            ),
        })
    }
}

fn decode_array(
    path: &str,
    dtype: DType,
    shape: &[usize],
    data: &[u8],
) -> Result<Value, DecodeError> {
    let size_error = |expected| DecodeError::BufferSize {
        path: path.to_owned(),
        shape: shape.to_vec(),
        expected,
        actual: data.len(),
    };

    let expected = shape
        .iter()
        .try_fold(dtype.itemsize(), |acc, &dim| acc.checked_mul(dim))
        .ok_or_else(|| size_error(usize::MAX))?;
    if expected != data.len() {
        return Err(size_error(expected));
    }

    let dim = IxDyn(shape);
    let value = match dtype {
        DType::F64 => {
            let elems = data
                .chunks_exact(8)
                .map(|chunk| f64::from_le_bytes(le_bytes(chunk)))
                .collect();
            Value::FloatArray(ArrayD::from_shape_vec(dim, elems).map_err(|_| size_error(expected))?)
        }
        DType::I64 => {
            let elems = data
                .chunks_exact(8)
                .map(|chunk| i64::from_le_bytes(le_bytes(chunk)))
                .collect();
            Value::IntArray(ArrayD::from_shape_vec(dim, elems).map_err(|_| size_error(expected))?)
        }
        DType::Bool => {
            let elems = data
                .iter()
                .map(|&byte| match byte {
                    0 => Ok(false),
                    1 => Ok(true),
                    byte => Err(DecodeError::InvalidBool {
                        path: path.to_owned(),
                        byte,
                    }),
                })
                .collect::<Result<Vec<_>, _>>()?;
            Value::BoolArray(ArrayD::from_shape_vec(dim, elems).map_err(|_| size_error(expected))?)
        }
    };

    Ok(value)
}

fn le_bytes(chunk: &[u8]) -> [u8; 8] {
    let mut bytes = [0; 8];
    bytes.copy_from_slice(chunk);
    bytes
}
