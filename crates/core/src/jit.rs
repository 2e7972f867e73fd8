//! Scoped views of model state for JIT-compiled functions.
//!
//! A JIT backend can only see namespaces made of numbers, booleans and arrays
//! of those. [`JitScope`] checks that, moves the in-scope namespaces into
//! [`JitRecord`]s for the duration of the scope and moves them back when it
//! is dropped, however the scope is left.

use std::mem;

use ndarray::{ArrayViewD, ArrayViewMutD};
use thiserror::Error;
use tracing::debug;

use crate::{EconModel, FieldType, ModelState, Namespace, StructuralError, Value, ValueKind};

/// The types a JIT function can receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JitField {
    Float,
    Int,
    Bool,
    FloatArray { ndim: usize },
    IntArray { ndim: usize },
    BoolArray { ndim: usize },
}

impl JitField {
    /// Maps a field type to its JIT counterpart, if there is one.
    #[must_use]
    pub fn from_field_type(ty: FieldType) -> Option<Self> {
        match ty.kind {
            ValueKind::Float => Some(JitField::Float),
            ValueKind::Int => Some(JitField::Int),
            ValueKind::Bool => Some(JitField::Bool),
            ValueKind::FloatArray => Some(JitField::FloatArray { ndim: ty.ndim }),
            ValueKind::IntArray => Some(JitField::IntArray { ndim: ty.ndim }),
            ValueKind::BoolArray => Some(JitField::BoolArray { ndim: ty.ndim }),
            ValueKind::Text | ValueKind::List => None,
        }
    }
}

/// An attribute whose type has no JIT counterpart.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{namespace}.{attribute} has type {kind}, which is not supported in jit functions")]
pub struct UnsupportedTypeError {
    pub namespace: String,
    pub attribute: String,
    pub kind: ValueKind,
}

/// Errors that prevent entering a JIT scope.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JitError {
    #[error(transparent)]
    Structural(#[from] StructuralError),

    #[error(transparent)]
    Unsupported(#[from] UnsupportedTypeError),

    #[error("{0} is not a namespace")]
    UnknownNamespace(String),
}

/// One namespace as seen by a JIT function.
///
/// Field order mirrors the namespace. Scalars can be reassigned and array
/// elements mutated, but no field can change type, rank or shape.
#[derive(Debug)]
pub struct JitRecord {
    namespace: String,
    layout: Vec<(String, JitField)>,
    values: Namespace,
}

impl JitRecord {
    /// Name of the namespace this record holds.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Field names and types in order.
    #[must_use]
    pub fn layout(&self) -> &[(String, JitField)] {
        &self.layout
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.layout.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layout.is_empty()
    }

    #[must_use]
    pub fn float(&self, name: &str) -> Option<f64> {
        self.values.float(name)
    }

    pub fn float_mut(&mut self, name: &str) -> Option<&mut f64> {
        match self.values.get_mut(name)? {
            Value::Float(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn int(&self, name: &str) -> Option<i64> {
        self.values.int(name)
    }

    pub fn int_mut(&mut self, name: &str) -> Option<&mut i64> {
        match self.values.get_mut(name)? {
            Value::Int(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn bool(&self, name: &str) -> Option<bool> {
        self.values.bool(name)
    }

    pub fn bool_mut(&mut self, name: &str) -> Option<&mut bool> {
        match self.values.get_mut(name)? {
            Value::Bool(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn float_array(&self, name: &str) -> Option<ArrayViewD<'_, f64>> {
        self.values.float_array(name).map(|a| a.view())
    }

    pub fn float_array_mut(&mut self, name: &str) -> Option<ArrayViewMutD<'_, f64>> {
        self.values.float_array_mut(name).map(|a| a.view_mut())
    }

    #[must_use]
    pub fn int_array(&self, name: &str) -> Option<ArrayViewD<'_, i64>> {
        self.values.int_array(name).map(|a| a.view())
    }

    pub fn int_array_mut(&mut self, name: &str) -> Option<ArrayViewMutD<'_, i64>> {
        self.values.int_array_mut(name).map(|a| a.view_mut())
    }

    #[must_use]
    pub fn bool_array(&self, name: &str) -> Option<ArrayViewD<'_, bool>> {
        self.values
            .get(name)
            .and_then(Value::as_bool_array)
            .map(|a| a.view())
    }

    pub fn bool_array_mut(&mut self, name: &str) -> Option<ArrayViewMutD<'_, bool>> {
        self.values
            .get_mut(name)
            .and_then(Value::as_bool_array_mut)
            .map(|a| a.view_mut())
    }
}

/// A model's namespaces lent out as [`JitRecord`]s.
///
/// The scope mutably borrows the model, so the records cannot outlive it and
/// a second scope over the same model cannot be opened while it is alive.
#[derive(Debug)]
pub struct JitScope<'m> {
    state: &'m mut ModelState,
    records: Vec<JitRecord>,
}

impl<'m> JitScope<'m> {
    /// Opens a scope over every namespace of `model`.
    ///
    /// # Errors
    ///
    /// Returns a [`JitError`] if the model's structure changed since
    /// initialization or any attribute has no JIT type. The model is left
    /// untouched on error.
    pub fn enter<D>(model: &'m mut EconModel<D>) -> Result<Self, JitError> {
        let names: Vec<String> = model
            .state()
            .namespace_names()
            .map(str::to_owned)
            .collect();
        Self::open(model, &names)
    }

    /// Opens a scope over the named namespaces only.
    ///
    /// # Errors
    ///
    /// As [`enter`](Self::enter), and [`JitError::UnknownNamespace`] for a
    /// name the model does not have.
    pub fn enter_only<D>(model: &'m mut EconModel<D>, names: &[&str]) -> Result<Self, JitError> {
        let mut unique: Vec<String> = Vec::with_capacity(names.len());
        for &name in names {
            if !unique.iter().any(|n| n == name) {
                unique.push(name.to_owned());
            }
        }
        Self::open(model, &unique)
    }

    fn open<D>(model: &'m mut EconModel<D>, names: &[String]) -> Result<Self, JitError> {
        model.check_types()?;

        let state = model.state_mut();
        let mut layouts = Vec::with_capacity(names.len());
        for name in names {
            let namespace = state
                .namespace(name)
                .ok_or_else(|| JitError::UnknownNamespace(name.clone()))?;
            layouts.push(layout_of(name, namespace)?);
        }

        let records = names
            .iter()
            .zip(layouts)
            .map(|(name, layout)| JitRecord {
                namespace: name.clone(),
                layout,
                values: state.namespace_mut(name).map(mem::take).unwrap_or_default(),
            })
            .collect();

        debug!(namespaces = names.len(), "entered jit scope");
        Ok(Self { state, records })
    }

    /// Returns the record of the named namespace, if it is in scope.
    #[must_use]
    pub fn record(&self, namespace: &str) -> Option<&JitRecord> {
        self.records.iter().find(|r| r.namespace == namespace)
    }

    pub fn record_mut(&mut self, namespace: &str) -> Option<&mut JitRecord> {
        self.records.iter_mut().find(|r| r.namespace == namespace)
    }

    /// Returns the in-scope records in order.
    #[must_use]
    pub fn records(&self) -> &[JitRecord] {
        &self.records
    }

    pub fn records_mut(&mut self) -> &mut [JitRecord] {
        &mut self.records
    }
}

impl Drop for JitScope<'_> {
    fn drop(&mut self) {
        for record in self.records.drain(..) {
            if let Some(namespace) = self.state.namespace_mut(&record.namespace) {
                *namespace = record.values;
            }
        }
        debug!("left jit scope");
    }
}

impl<D> EconModel<D> {
    /// Runs `f` with every namespace lent out as a JIT record.
    ///
    /// Mutations made through the records are in the model once `f` returns
    /// or unwinds.
    ///
    /// # Errors
    ///
    /// Returns a [`JitError`] if the scope cannot be entered; `f` is not run.
    pub fn jit<R>(&mut self, f: impl FnOnce(&mut JitScope<'_>) -> R) -> Result<R, JitError> {
        let mut scope = JitScope::enter(self)?;
        Ok(f(&mut scope))
    }
}

fn layout_of(name: &str, namespace: &Namespace) -> Result<Vec<(String, JitField)>, JitError> {
    namespace
        .iter()
        .map(|(attribute, value)| {
            JitField::from_field_type(value.field_type())
                .map(|field| (attribute.to_owned(), field))
                .ok_or_else(|| {
                    JitError::Unsupported(UnsupportedTypeError {
                        namespace: name.to_owned(),
                        attribute: attribute.to_owned(),
                        kind: value.kind(),
                    })
                })
        })
        .collect()
}
