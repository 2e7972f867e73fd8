//! Durable storage of models.
//!
//! A model is saved as `<savefolder>/<name>.bin`, a bincode-encoded
//! [`SavedModel`] that carries its own format version, the model's name and
//! namespace names, its established [`ModelSchema`] and the full
//! [`ModelDict`].

use std::{
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{ModelDict, ModelSchema, StorageError};

/// Current version of the on-disk format.
pub const FORMAT_VERSION: u32 = 2;

/// File extension of saved models.
pub const EXTENSION: &str = "bin";

/// The persisted form of a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedModel {
    pub version: u32,
    pub name: String,
    pub namespaces: Vec<String>,
    pub other_attrs: Vec<String>,
    /// The schema the model had when it was saved, including attributes it
    /// gained when reconstructed from a mapping.
    pub schema: ModelSchema,
    pub dict: ModelDict,
}

impl SavedModel {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        namespaces: Vec<String>,
        other_attrs: Vec<String>,
        schema: ModelSchema,
        dict: ModelDict,
    ) -> Self {
        Self {
            version: FORMAT_VERSION,
            name: name.into(),
            namespaces,
            other_attrs,
            schema,
            dict,
        }
    }
}

/// Returns the file a model named `name` is saved to inside `savefolder`.
#[must_use]
pub fn path_for(savefolder: &Path, name: &str) -> PathBuf {
    savefolder.join(format!("{name}.{EXTENSION}"))
}

/// Writes `saved` to `path` atomically, creating parent folders as needed.
///
/// # Errors
///
/// Returns a [`StorageError`] if encoding fails or any filesystem step fails.
/// On failure an existing file at `path` is left unchanged.
pub fn write(path: &Path, saved: &SavedModel) -> Result<(), StorageError> {
    let bytes = bincode::serialize(saved).map_err(StorageError::Encode)?;
    atomic_write(path, &bytes)?;
    debug!(path = %path.display(), bytes = bytes.len(), "wrote model file");
    Ok(())
}

/// Reads a saved model from `path`.
///
/// # Errors
///
/// Returns a [`StorageError`] if the file cannot be read, was written with a
/// different format version, or cannot be decoded.
pub fn read(path: &Path) -> Result<SavedModel, StorageError> {
    let bytes = fs::read(path).map_err(|source| StorageError::Read {
        path: path.to_owned(),
        source,
    })?;

    let decode_error = |source| StorageError::Decode {
        path: path.to_owned(),
        source,
    };

    // The version is the first field, so it can be read ahead of the rest.
    let version: u32 = bincode::deserialize(&bytes).map_err(decode_error)?;
    if version != FORMAT_VERSION {
        return Err(StorageError::Version {
            path: path.to_owned(),
            found: version,
            expected: FORMAT_VERSION,
        });
    }

    bincode::deserialize(&bytes).map_err(decode_error)
}

/// Reads only the plain mapping of a saved model.
///
/// Useful for inspecting a file without the model definition that wrote it.
///
/// # Errors
///
/// Same as [`read`].
pub fn read_dict(path: &Path) -> Result<ModelDict, StorageError> {
    read(path).map(|saved| saved.dict)
}

fn atomic_write(path: &Path, contents: &[u8]) -> Result<(), StorageError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| StorageError::CreateDir {
            path: parent.to_owned(),
            source,
        })?;
    }

    let tmp_path = path.with_extension(format!("{EXTENSION}.tmp"));

    let written = File::create(&tmp_path)
        .and_then(|mut file| {
            file.write_all(contents)?;
            file.sync_all()
        })
        .map_err(|source| StorageError::Write {
            path: tmp_path.clone(),
            source,
        })
        .and_then(|()| {
            fs::rename(&tmp_path, path).map_err(|source| StorageError::Rename {
                path: path.to_owned(),
                source,
            })
        });

    if written.is_err() && tmp_path.exists() {
        if let Err(err) = fs::remove_file(&tmp_path) {
            warn!(path = %tmp_path.display(), %err, "could not remove temporary file");
        }
    }

    written
}
