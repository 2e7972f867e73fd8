use std::{fmt, io, path::PathBuf};

use econ_model_core::{FieldType, StructuralError, ValueKind};
use thiserror::Error;

use crate::{BufferError, layout::ValidationError};

/// An attribute with no C representation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{namespace}.{attribute} has type {kind}, which has no C representation")]
pub struct UnsupportedFieldError {
    pub namespace: String,
    pub attribute: String,
    pub kind: ValueKind,
}

/// Errors raised while rendering a C header.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeaderError {
    #[error(transparent)]
    UnsupportedField(#[from] UnsupportedFieldError),

    /// An entry point takes a namespace that has no declared struct.
    #[error("entry point {entry} takes {namespace}, which has no declared struct")]
    UndeclaredNamespace { entry: String, namespace: String },
}

/// How a struct declared by a native backend differs from the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mismatch {
    /// The model has no namespace with this name.
    MissingNamespace,
    /// The model has an attribute the struct lacks.
    MissingField { attribute: String },
    /// The struct has a field the model lacks.
    UnexpectedField { attribute: String },
    /// Both have the attribute, but at different positions.
    FieldOrder {
        position: usize,
        expected: String,
        found: String,
    },
    /// Both have the attribute, with different types.
    FieldType {
        attribute: String,
        expected: FieldType,
        found: FieldType,
    },
    /// The declared `sizeof` differs from the computed layout.
    Size { expected: usize, found: usize },
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mismatch::MissingNamespace => f.write_str("the model has no such namespace"),
            Mismatch::MissingField { attribute } => {
                write!(f, "{attribute} is missing from the native struct")
            }
            Mismatch::UnexpectedField { attribute } => {
                write!(f, "{attribute} is not an attribute of the model")
            }
            Mismatch::FieldOrder {
                position,
                expected,
                found,
            } => write!(f, "field {position} is {found}, should be {expected}"),
            Mismatch::FieldType {
                attribute,
                expected,
                found,
            } => write!(f, "{attribute} is declared as {found}, should be {expected}"),
            Mismatch::Size { expected, found } => {
                write!(f, "sizeof is {found}, should be {expected}")
            }
        }
    }
}

/// Errors in a native backend manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("cannot read manifest {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("invalid manifest: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("manifest exported by the library is not valid UTF-8")]
    Encoding,

    #[error("struct for namespace {0} is declared more than once")]
    DuplicateStruct(String),

    #[error("entry point {0} is declared more than once")]
    DuplicateEntryPoint(String),
}

/// Errors raised while linking a native backend to a model.
#[derive(Debug, Error)]
pub enum LinkError {
    /// A declared struct does not match the model's namespace.
    #[error("struct for {namespace} does not match the model: {mismatch}")]
    SchemaMismatch { namespace: String, mismatch: Mismatch },

    #[error(transparent)]
    UnsupportedField(#[from] UnsupportedFieldError),

    #[error("invalid layout for {namespace}: {source}")]
    InvalidLayout {
        namespace: String,
        source: ValidationError,
    },

    #[error("library does not export {0}")]
    MissingSymbol(String),

    /// An entry point takes a namespace that has no declared struct.
    #[error("entry point {entry} takes {namespace}, which has no declared struct")]
    UndeclaredNamespace { entry: String, namespace: String },

    #[error("entry point {entry} takes {count} arguments, at most {max} are supported")]
    TooManyArguments {
        entry: String,
        count: usize,
        max: usize,
    },

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// Neither the model nor the library provides a manifest.
    #[error("no manifest: the model has no native backend source and the library exports none")]
    NoManifest,

    #[cfg(feature = "dylib")]
    #[error("cannot open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        source: libloading::Error,
    },
}

/// Errors raised when calling into a linked native backend.
#[derive(Debug, Error)]
pub enum CallError {
    #[error("{0} is not a linked entry point")]
    UnknownEntryPoint(String),

    #[error(transparent)]
    Structural(#[from] StructuralError),

    /// The namespace no longer has the layout the backend was linked against.
    #[error("layout of {namespace} changed since linking; relink the backend")]
    LayoutChanged { namespace: String },

    #[error("{namespace}.{attribute} contains a NUL byte")]
    InvalidText { namespace: String, attribute: String },

    /// An attribute is missing or has an unexpected value for its field.
    #[error("{namespace}.{attribute} does not match its linked field")]
    FieldMismatch { namespace: String, attribute: String },

    #[error(transparent)]
    Buffer(#[from] BufferError),
}
