//! Native backends for econ-model namespaces.
//!
//! A native backend is a compiled library whose functions receive one C
//! struct per model namespace. This crate computes the struct each namespace
//! maps to, checks a backend's declared structs against the model before any
//! call is made, and marshals the namespaces on each call:
//!
//! - [`StructLayout`]: the C layout of a namespace, field by field
//! - [`Manifest`]: what a backend declares it was compiled against
//! - [`link`] and [`NativeBackend`]: verification and calling
//! - [`header::render`]: the C header matching a manifest
//!
//! Libraries are reached through the [`Library`] trait. [`SymbolTable`]
//! serves functions compiled into the current binary; with the `dylib`
//! feature, `DynamicLibrary` opens shared libraries from disk.

mod buffer;
mod ctype;
mod error;
pub mod header;
mod layout;
mod library;
mod linker;
mod manifest;
mod view;

pub use buffer::BufferError;
pub use ctype::CType;
pub use error::{
    CallError, HeaderError, LinkError, ManifestError, Mismatch, UnsupportedFieldError,
};
pub use layout::{Field, StructLayout, ValidationError};
#[cfg(feature = "dylib")]
pub use library::DynamicLibrary;
pub use library::{Library, SymbolTable};
pub use linker::{MAX_ARGS, NativeBackend, NativeReturn, link};
pub use manifest::{EntryPoint, MANIFEST_SYMBOL, Manifest, ReturnType, StructDecl};
