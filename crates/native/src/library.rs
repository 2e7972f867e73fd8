use std::ffi::c_void;

/// A source of exported symbols.
pub trait Library {
    /// Returns the address of the named symbol, if it is exported.
    fn symbol(&self, name: &str) -> Option<*const c_void>;
}

/// An in-process symbol table.
///
/// Lets functions compiled into the current binary act as a native backend.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    symbols: Vec<(String, *const c_void)>,
}

impl SymbolTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `address` under `name`, replacing any earlier entry.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, address: *const c_void) -> Self {
        self.insert(name, address);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, address: *const c_void) {
        let name = name.into();
        self.symbols.retain(|(existing, _)| *existing != name);
        self.symbols.push((name, address));
    }
}

impl Library for SymbolTable {
    fn symbol(&self, name: &str) -> Option<*const c_void> {
        self.symbols
            .iter()
            .find(|(symbol, _)| symbol == name)
            .map(|&(_, address)| address)
            .filter(|address| !address.is_null())
    }
}

#[cfg(feature = "dylib")]
pub use dylib::DynamicLibrary;

#[cfg(feature = "dylib")]
mod dylib {
    use std::{
        ffi::c_void,
        path::{Path, PathBuf},
    };

    use tracing::info;

    use super::Library;
    use crate::LinkError;

    /// A shared library opened from disk.
    #[derive(Debug)]
    pub struct DynamicLibrary {
        library: libloading::Library,
        path: PathBuf,
    }

    impl DynamicLibrary {
        /// Opens the shared library at `path`.
        ///
        /// # Errors
        ///
        /// Returns [`LinkError::Open`] if the library cannot be loaded.
        ///
        /// # Safety
        ///
        /// Loading a library runs its initialization routines, which must be
        /// sound to run in this process.
        pub unsafe fn open(path: impl AsRef<Path>) -> Result<Self, LinkError> {
            let path = path.as_ref().to_owned();
            let library = unsafe { libloading::Library::new(&path) }.map_err(|source| {
                LinkError::Open {
                    path: path.clone(),
                    source,
                }
            })?;
            info!(path = %path.display(), "opened native library");
            Ok(Self { library, path })
        }

        #[must_use]
        pub fn path(&self) -> &Path {
            &self.path
        }
    }

    impl Library for DynamicLibrary {
        fn symbol(&self, name: &str) -> Option<*const c_void> {
            let symbol = unsafe { self.library.get::<*const c_void>(name.as_bytes()) }.ok()?;
            let address = *symbol;
            (!address.is_null()).then_some(address)
        }
    }
}
