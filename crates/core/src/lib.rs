//! Core types for namespace-based economic models.
//!
//! An [`EconModel`] owns typed, named state grouped into namespaces (`par`,
//! `sol`, `sim` and any extras a model declares). This crate provides:
//!
//! - [`ModelDefinition`]: the settings, setup and allocate phases a model
//!   implements, run in a fixed order by [`EconModel::builder`]
//! - the structural invariant: attribute kinds and array ranks are fixed once
//!   a model is initialized, checked by [`EconModel::check_types`]
//! - [`ModelDict`] and [`storage`]: plain-mapping and on-disk forms used for
//!   copying, saving and loading
//! - [`JitScope`]: a scoped, restricted view for JIT-compiled functions

mod definition;
mod dict;
mod error;
pub mod invariant;
mod jit;
mod model;
mod namespace;
mod schema;
mod state;
pub mod storage;
mod value;

pub use definition::{
    DEFAULT_SAVEFOLDER, ModelDefinition, PAR, RESERVED_NAMESPACES, SIM, SOL, Settings,
};
pub use dict::{DType, Encoded, Entry, ModelDict};
pub use error::{ConfigError, DecodeError, Error, Phase, StorageError};
pub use invariant::{Growth, StructuralError};
pub use jit::{JitError, JitField, JitRecord, JitScope, UnsupportedTypeError};
pub use model::{Builder, EconModel};
pub use namespace::Namespace;
pub use schema::{FieldSpec, ModelSchema, NamespaceSchema};
pub use state::ModelState;
pub use value::{FieldType, Value, ValueKind};
