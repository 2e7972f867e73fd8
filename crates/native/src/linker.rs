use std::{ffi::c_void, mem};

use econ_model_core::{EconModel, ModelSchema, NamespaceSchema};
use tracing::{debug, info};

use crate::{
    CallError, LinkError, Library, Manifest, Mismatch, ReturnType, StructLayout,
    manifest::StructDecl, view::NativeView,
};

/// Most namespace arguments an entry point can take.
pub const MAX_ARGS: usize = 8;

/// The value returned by an entry point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NativeReturn {
    Void,
    Double(f64),
    Int64(i64),
    Bool(bool),
}

impl NativeReturn {
    #[must_use]
    pub fn as_f64(self) -> Option<f64> {
        match self {
            NativeReturn::Double(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_i64(self) -> Option<i64> {
        match self {
            NativeReturn::Int64(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(self) -> Option<bool> {
        match self {
            NativeReturn::Bool(v) => Some(v),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct LinkedEntry {
    name: String,
    args: Vec<String>,
    returns: ReturnType,
    address: *const c_void,
}

/// A native library whose struct declarations were verified against a model.
///
/// Entry points receive one pointer per namespace argument, pointing at a C
/// struct laid out as the namespace. Scalars are copied into the struct and
/// arrays are passed by address, so array writes are seen by the model and
/// scalar writes are not.
#[derive(Debug)]
pub struct NativeBackend<L> {
    library: L,
    manifest: Manifest,
    schema: ModelSchema,
    layouts: Vec<(String, StructLayout)>,
    entries: Vec<LinkedEntry>,
}

/// Verifies `manifest` against `schema` and resolves every entry point in
/// `library`.
///
/// # Errors
///
/// Returns a [`LinkError`] if a declared struct differs from its namespace
/// in attribute order, kind, rank or size, names a namespace the model lacks,
/// or an entry point takes an undeclared namespace, takes too many arguments
/// or is not exported.
///
/// # Safety
///
/// Every symbol named by an entry point must be a C function taking one
/// pointer per declared argument and returning the declared type.
pub unsafe fn link<L: Library>(
    library: L,
    manifest: Manifest,
    schema: &ModelSchema,
) -> Result<NativeBackend<L>, LinkError> {
    let layouts = verify(&manifest, schema)?;

    let mut entries = Vec::with_capacity(manifest.entry_points.len());
    for entry in &manifest.entry_points {
        if entry.args.len() > MAX_ARGS {
            return Err(LinkError::TooManyArguments {
                entry: entry.name.clone(),
                count: entry.args.len(),
                max: MAX_ARGS,
            });
        }
        if let Some(namespace) = entry
            .args
            .iter()
            .find(|ns| !layouts.iter().any(|(name, _)| name == *ns))
        {
            return Err(LinkError::UndeclaredNamespace {
                entry: entry.name.clone(),
                namespace: namespace.clone(),
            });
        }

        let address = library
            .symbol(&entry.name)
            .ok_or_else(|| LinkError::MissingSymbol(entry.name.clone()))?;

        entries.push(LinkedEntry {
            name: entry.name.clone(),
            args: entry.args.clone(),
            returns: entry.returns,
            address,
        });
    }

    info!(
        structs = layouts.len(),
        entry_points = entries.len(),
        "linked native backend"
    );

    Ok(NativeBackend {
        library,
        manifest,
        schema: schema.clone(),
        layouts,
        entries,
    })
}

impl<L: Library> NativeBackend<L> {
    /// Links `library` to `model`.
    ///
    /// The manifest is read from the model's native backend source if it
    /// declares one, otherwise from the library's exported manifest.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::NoManifest`] if neither is available, or any
    /// error of [`link`].
    ///
    /// # Safety
    ///
    /// As for [`link`] and [`Manifest::from_library`].
    pub unsafe fn link_model<D>(library: L, model: &EconModel<D>) -> Result<Self, LinkError> {
        let manifest = match model.native_backend_source() {
            Some(path) => Manifest::read(path)?,
            None => unsafe { Manifest::from_library(&library) }?.ok_or(LinkError::NoManifest)?,
        };
        unsafe { link(library, manifest, model.schema()) }
    }

    /// Calls the named entry point with views of the model's namespaces.
    ///
    /// # Errors
    ///
    /// Returns a [`CallError`] without calling if the entry point is unknown,
    /// the model's structure changed since initialization, a linked namespace
    /// no longer has its linked layout, or a text attribute contains a NUL
    /// byte.
    pub fn call<D>(
        &self,
        model: &mut EconModel<D>,
        entry: &str,
    ) -> Result<NativeReturn, CallError> {
        let linked = self
            .entries
            .iter()
            .find(|linked| linked.name == entry)
            .ok_or_else(|| CallError::UnknownEntryPoint(entry.to_owned()))?;

        model.check_types()?;
        let current = ModelSchema::of(model.state());
        for (namespace, _) in &self.layouts {
            if current.namespace(namespace) != self.schema.namespace(namespace) {
                return Err(CallError::LayoutChanged {
                    namespace: namespace.clone(),
                });
            }
        }

        let mut views: Vec<(&str, NativeView<'_>)> = Vec::with_capacity(self.layouts.len());
        for (name, namespace) in model.state_mut().namespaces_mut() {
            if let Some((_, layout)) = self.layouts.iter().find(|(ns, _)| ns == name) {
                views.push((name, NativeView::build(name, layout, namespace)?));
            }
        }

        let mut args: Vec<*mut c_void> = Vec::with_capacity(linked.args.len());
        for arg in &linked.args {
            if let Some((_, view)) = views.iter_mut().find(|(ns, _)| *ns == arg.as_str()) {
                args.push(view.as_mut_ptr().cast());
            }
        }

        debug!(entry, args = args.len(), "calling native entry point");
        let result = unsafe { invoke(linked.address, linked.returns, &args) };
        drop(views);

        Ok(result)
    }

    /// Re-verifies the manifest against a new schema.
    ///
    /// Needed after the model was reinitialized with a different layout.
    ///
    /// # Errors
    ///
    /// Returns a [`LinkError`] if the manifest does not match `schema`.
    pub fn relink(&mut self, schema: &ModelSchema) -> Result<(), LinkError> {
        self.layouts = verify(&self.manifest, schema)?;
        self.schema = schema.clone();
        info!("relinked native backend");
        Ok(())
    }

    #[must_use]
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// The schema the backend was linked against.
    #[must_use]
    pub fn schema(&self) -> &ModelSchema {
        &self.schema
    }

    #[must_use]
    pub fn library(&self) -> &L {
        &self.library
    }

    /// Returns the computed layout of a linked namespace.
    #[must_use]
    pub fn layout(&self, namespace: &str) -> Option<&StructLayout> {
        self.layouts
            .iter()
            .find(|(ns, _)| ns == namespace)
            .map(|(_, layout)| layout)
    }

    /// Returns the names of the linked entry points.
    pub fn entry_points(&self) -> impl ExactSizeIterator<Item = &str> {
        self.entries.iter().map(|entry| entry.name.as_str())
    }
}

/// Checks every declared struct against the schema and computes its layout.
fn verify(
    manifest: &Manifest,
    schema: &ModelSchema,
) -> Result<Vec<(String, StructLayout)>, LinkError> {
    manifest
        .structs
        .iter()
        .map(|decl| {
            let mismatch = |mismatch| LinkError::SchemaMismatch {
                namespace: decl.namespace.clone(),
                mismatch,
            };

            let ns_schema = schema
                .namespace(&decl.namespace)
                .ok_or_else(|| mismatch(Mismatch::MissingNamespace))?;
            compare_fields(decl, ns_schema).map_err(mismatch)?;

            let layout = StructLayout::from_schema(&decl.namespace, decl.struct_name(), ns_schema)?;
            layout.validate().map_err(|source| LinkError::InvalidLayout {
                namespace: decl.namespace.clone(),
                source,
            })?;

            if let Some(found) = decl.size.filter(|&size| size != layout.size) {
                return Err(mismatch(Mismatch::Size {
                    expected: layout.size,
                    found,
                }));
            }

            Ok((decl.namespace.clone(), layout))
        })
        .collect()
}

fn compare_fields(decl: &StructDecl, schema: &NamespaceSchema) -> Result<(), Mismatch> {
    for (position, (declared, actual)) in decl.fields.iter().zip(&schema.fields).enumerate() {
        if declared.name != actual.name {
            return Err(if schema.field(&declared.name).is_none() {
                Mismatch::UnexpectedField {
                    attribute: declared.name.clone(),
                }
            } else {
                Mismatch::FieldOrder {
                    position,
                    expected: actual.name.clone(),
                    found: declared.name.clone(),
                }
            });
        }
        if declared.ty != actual.ty {
            return Err(Mismatch::FieldType {
                attribute: actual.name.clone(),
                expected: actual.ty,
                found: declared.ty,
            });
        }
    }

    if let Some(extra) = decl.fields.get(schema.fields.len()) {
        return Err(Mismatch::UnexpectedField {
            attribute: extra.name.clone(),
        });
    }
    if let Some(missing) = schema.fields.get(decl.fields.len()) {
        return Err(Mismatch::MissingField {
            attribute: missing.name.clone(),
        });
    }

    Ok(())
}

type Arg = *mut c_void;

/// Calls the function at `address` with `args`.
///
/// # Safety
///
/// `address` must be a C function taking `args.len()` pointers and returning
/// `returns`, and every pointer must be valid for the call.
unsafe fn invoke(address: *const c_void, returns: ReturnType, args: &[Arg]) -> NativeReturn {
    unsafe {
        match returns {
            ReturnType::Void => {
                call_with::<()>(address, args);
                NativeReturn::Void
            }
            ReturnType::Double => NativeReturn::Double(call_with(address, args)),
            ReturnType::Int64 => NativeReturn::Int64(call_with(address, args)),
            ReturnType::Bool => NativeReturn::Bool(call_with(address, args)),
        }
    }
}

/// # Safety
///
/// As for [`invoke`]; `args` holds at most [`MAX_ARGS`] pointers.
unsafe fn call_with<R>(address: *const c_void, args: &[Arg]) -> R {
    unsafe {
        match *args {
            [] => {
                let f: unsafe extern "C" fn() -> R = mem::transmute_copy(&address);
                f()
            }
            [a] => {
                let f: unsafe extern "C" fn(Arg) -> R = mem::transmute_copy(&address);
                f(a)
            }
            [a, b] => {
                let f: unsafe extern "C" fn(Arg, Arg) -> R = mem::transmute_copy(&address);
                f(a, b)
            }
            [a, b, c] => {
                let f: unsafe extern "C" fn(Arg, Arg, Arg) -> R = mem::transmute_copy(&address);
                f(a, b, c)
            }
            [a, b, c, d] => {
                let f: unsafe extern "C" fn(Arg, Arg, Arg, Arg) -> R =
                    mem::transmute_copy(&address);
                f(a, b, c, d)
            }
            [a, b, c, d, e] => {
                let f: unsafe extern "C" fn(Arg, Arg, Arg, Arg, Arg) -> R =
                    mem::transmute_copy(&address);
                f(a, b, c, d, e)
            }
            [a, b, c, d, e, g] => {
                let f: unsafe extern "C" fn(Arg, Arg, Arg, Arg, Arg, Arg) -> R =
                    mem::transmute_copy(&address);
                f(a, b, c, d, e, g)
            }
            [a, b, c, d, e, g, h] => {
                let f: unsafe extern "C" fn(Arg, Arg, Arg, Arg, Arg, Arg, Arg) -> R =
                    mem::transmute_copy(&address);
                f(a, b, c, d, e, g, h)
            }
            [a, b, c, d, e, g, h, i, ..] => {
                let f: unsafe extern "C" fn(Arg, Arg, Arg, Arg, Arg, Arg, Arg, Arg) -> R =
                    mem::transmute_copy(&address);
                f(a, b, c, d, e, g, h, i)
            }
        }
    }
}
