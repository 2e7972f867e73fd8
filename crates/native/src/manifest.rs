//! Descriptions of what a native backend expects.
//!
//! A manifest lists, for each namespace the backend reads, the struct it was
//! compiled against, and every entry point with the namespaces it takes. It is
//! JSON, for example:
//!
//! ```json
//! {
//!   "structs": [
//!     { "namespace": "par", "fields": [
//!         { "name": "beta", "kind": "float" },
//!         { "name": "grid_a", "kind": "float_array", "ndim": 1 } ] }
//!   ],
//!   "entry_points": [ { "name": "solve", "args": ["par"], "returns": "void" } ]
//! }
//! ```

use std::{
    ffi::{CStr, c_char},
    fs,
    path::Path,
};

use econ_model_core::{FieldSpec, ModelSchema};
use serde::{Deserialize, Serialize};

use crate::{Library, ManifestError, StructLayout};

/// Name of the function a library may export to describe itself.
///
/// Its C signature is `const char* econ_model_manifest(void)`, returning the
/// manifest JSON as a NUL-terminated string.
pub const MANIFEST_SYMBOL: &str = "econ_model_manifest";

/// A native backend's struct declarations and entry points.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub structs: Vec<StructDecl>,
    #[serde(default)]
    pub entry_points: Vec<EntryPoint>,
}

/// The struct a backend uses for one namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructDecl {
    pub namespace: String,
    /// C struct name; defaults to `<namespace>_struct`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub struct_name: Option<String>,
    pub fields: Vec<FieldSpec>,
    /// `sizeof` the struct as compiled, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,
}

/// A function exported by the backend.
///
/// It is called with one pointer per namespace in `args`, in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryPoint {
    pub name: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub returns: ReturnType,
}

/// Return type of an entry point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnType {
    #[default]
    Void,
    Double,
    Int64,
    Bool,
}

impl StructDecl {
    /// Returns the C struct name.
    #[must_use]
    pub fn struct_name(&self) -> String {
        self.struct_name
            .clone()
            .unwrap_or_else(|| format!("{}_struct", self.namespace))
    }
}

impl Manifest {
    /// Parses a manifest from JSON.
    ///
    /// # Errors
    ///
    /// Returns a [`ManifestError`] if the JSON is invalid or declares a
    /// namespace or entry point twice.
    pub fn from_json(json: &str) -> Result<Self, ManifestError> {
        let manifest: Self = serde_json::from_str(json)?;
        manifest.check_duplicates()?;
        Ok(manifest)
    }

    /// Reads a manifest from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns a [`ManifestError`] if the file cannot be read or parsed.
    pub fn read(path: &Path) -> Result<Self, ManifestError> {
        let json = fs::read_to_string(path).map_err(|source| ManifestError::Read {
            path: path.to_owned(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Reads the manifest a library exports through [`MANIFEST_SYMBOL`].
    ///
    /// Returns `Ok(None)` if the library does not export it.
    ///
    /// # Errors
    ///
    /// Returns a [`ManifestError`] if the exported text is not a valid
    /// manifest.
    ///
    /// # Safety
    ///
    /// If the library exports [`MANIFEST_SYMBOL`], it must be a function with
    /// the documented signature returning a valid NUL-terminated string.
    pub unsafe fn from_library(library: &impl Library) -> Result<Option<Self>, ManifestError> {
        let Some(address) = library.symbol(MANIFEST_SYMBOL) else {
            return Ok(None);
        };

        let manifest_fn: unsafe extern "C" fn() -> *const c_char =
            unsafe { std::mem::transmute_copy(&address) };
        let text = unsafe { manifest_fn() };
        if text.is_null() {
            return Ok(None);
        }

        let json = unsafe { CStr::from_ptr(text) }
            .to_str()
            .map_err(|_| ManifestError::Encoding)?;
        Self::from_json(json).map(Some)
    }

    /// Describes every namespace of `schema`, with no entry points.
    ///
    /// Struct sizes are filled in for namespaces whose fields all have a C
    /// representation.
    #[must_use]
    pub fn for_schema(schema: &ModelSchema) -> Self {
        let structs = schema
            .namespaces
            .iter()
            .map(|(namespace, ns_schema)| StructDecl {
                namespace: namespace.clone(),
                struct_name: None,
                fields: ns_schema.fields.clone(),
                size: StructLayout::from_schema(namespace, "", ns_schema)
                    .ok()
                    .map(|layout| layout.size),
            })
            .collect();

        Self {
            structs,
            entry_points: Vec::new(),
        }
    }

    /// Adds an entry point.
    #[must_use]
    pub fn with_entry_point<I, S>(
        mut self,
        name: impl Into<String>,
        args: I,
        returns: ReturnType,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entry_points.push(EntryPoint {
            name: name.into(),
            args: args.into_iter().map(Into::into).collect(),
            returns,
        });
        self
    }

    /// Returns the struct declared for `namespace`.
    #[must_use]
    pub fn struct_decl(&self, namespace: &str) -> Option<&StructDecl> {
        self.structs.iter().find(|decl| decl.namespace == namespace)
    }

    /// Returns the named entry point.
    #[must_use]
    pub fn entry_point(&self, name: &str) -> Option<&EntryPoint> {
        self.entry_points.iter().find(|entry| entry.name == name)
    }

    /// Serializes the manifest as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    fn check_duplicates(&self) -> Result<(), ManifestError> {
        for (i, decl) in self.structs.iter().enumerate() {
            if self.structs[..i].iter().any(|d| d.namespace == decl.namespace) {
                return Err(ManifestError::DuplicateStruct(decl.namespace.clone()));
            }
        }
        for (i, entry) in self.entry_points.iter().enumerate() {
            if self.entry_points[..i].iter().any(|e| e.name == entry.name) {
                return Err(ManifestError::DuplicateEntryPoint(entry.name.clone()));
            }
        }
        Ok(())
    }
}
