use std::{fmt, io, path::PathBuf};

use thiserror::Error;

use crate::StructuralError;

/// Errors raised while configuring or constructing a model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("namespace {0} is declared more than once")]
    DuplicateNamespace(String),

    #[error("{0} is reserved and cannot be declared")]
    ReservedNamespace(String),

    #[error("{0:?} is not a valid identifier")]
    InvalidName(String),

    #[error("{attribute:?} in {namespace} is not a valid identifier")]
    InvalidAttributeName { namespace: String, attribute: String },

    #[error("other attribute {0} is declared more than once")]
    DuplicateOtherAttr(String),

    /// The same name is used for a namespace and an other attribute.
    #[error("{0} is declared both as a namespace and as an other attribute")]
    NamespaceAttrClash(String),

    /// An other attribute shares its name with an attribute of a namespace.
    #[error("{name} is both an other attribute and an attribute of {namespace}")]
    AmbiguousAttribute { name: String, namespace: String },

    #[error("{0} is not a namespace")]
    UnknownNamespace(String),

    #[error("{attribute} is not an attribute of {namespace}")]
    UnknownAttribute { namespace: String, attribute: String },

    #[error("{0} is not a declared other attribute")]
    UnknownOtherAttr(String),

    #[error("a model cannot be loaded from storage and from a mapping at once")]
    ConflictingSources,
}

/// Errors raised while decoding a plain mapping into values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("{0} must map to a namespace")]
    ExpectedNamespace(String),

    #[error("{0} must map to a single value")]
    ExpectedAttribute(String),

    /// An array buffer does not match its declared shape and dtype.
    #[error("{path}: buffer of {actual} bytes does not match shape {shape:?} ({expected} bytes)")]
    BufferSize {
        path: String,
        shape: Vec<usize>,
        expected: usize,
        actual: usize,
    },

    #[error("{path}: byte {byte} is not a valid bool")]
    InvalidBool { path: String, byte: u8 },

    #[error("{0} is neither a namespace nor a declared other attribute")]
    UnknownEntry(String),
}

/// Errors raised while persisting or restoring a model.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("cannot create {}: {source}", path.display())]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("cannot write {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },

    #[error("cannot read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("cannot move {} into place: {source}", path.display())]
    Rename { path: PathBuf, source: io::Error },

    #[error("cannot encode model: {0}")]
    Encode(bincode::Error),

    #[error("cannot decode {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        source: bincode::Error,
    },

    #[error("{} has format version {found}, expected {expected}", path.display())]
    Version {
        path: PathBuf,
        found: u32,
        expected: u32,
    },
}

/// The model definition phase in which a failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Setup,
    Allocate,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Setup => f.write_str("setup"),
            Phase::Allocate => f.write_str("allocate"),
        }
    }
}

/// Errors returned by model operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Structural(#[from] StructuralError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The model definition failed in one of its phases.
    #[error("{phase} failed: {source}")]
    Definition {
        phase: Phase,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl Error {
    pub(crate) fn definition(
        phase: Phase,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Definition {
            phase,
            source: Box::new(source),
        }
    }
}
