use std::path::PathBuf;

use tracing::info;

use crate::{
    ConfigError, DEFAULT_SAVEFOLDER, EconModel, Error, Growth, ModelDefinition, ModelDict,
    ModelSchema, Value,
    dict::AttrFilter,
    storage,
};

use super::lifecycle::{self, Override, Restore};

/// Configures how an [`EconModel`] is created.
///
/// Without [`load`](Self::load) or [`from_dict`](Self::from_dict) the model is
/// created fresh from its definition.
#[derive(Debug)]
pub struct Builder<D> {
    name: String,
    definition: D,
    load: Option<Option<PathBuf>>,
    dict: Option<ModelDict>,
    skip: Vec<String>,
    overrides: Vec<Override>,
    savefolder: Option<PathBuf>,
}

impl<D: ModelDefinition> Builder<D> {
    pub(crate) fn new(name: impl Into<String>, definition: D) -> Self {
        Self {
            name: name.into(),
            definition,
            load: None,
            dict: None,
            skip: Vec::new(),
            overrides: Vec::new(),
            savefolder: None,
        }
    }

    /// Reconstructs the model from `<savefolder>/<name>.bin`.
    ///
    /// Attributes that setup and allocate do not create are accepted if the
    /// schema saved with the model records them, with the recorded type.
    #[must_use]
    pub fn load(mut self) -> Self {
        self.load = Some(None);
        self
    }

    /// Reconstructs the model from a saved file at `path`.
    #[must_use]
    pub fn load_from(mut self, path: impl Into<PathBuf>) -> Self {
        self.load = Some(Some(path.into()));
        self
    }

    /// Reconstructs the model from a plain mapping.
    ///
    /// Attributes in the mapping that setup and allocate do not create are
    /// accepted and become part of the model's schema.
    #[must_use]
    pub fn from_dict(mut self, dict: ModelDict) -> Self {
        self.dict = Some(dict);
        self
    }

    /// Leaves the named entries out when reconstructing.
    ///
    /// Each entry is a namespace, an other attribute, or a
    /// `namespace.attribute` path. Skipped attributes keep the values computed
    /// by setup and allocate.
    #[must_use]
    pub fn skip_attrs<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skip.extend(names.into_iter().map(Into::into));
        self
    }

    /// Overrides an attribute that setup created, before allocate runs.
    ///
    /// When reconstructing, the override also wins over restored values.
    #[must_use]
    pub fn with_value(
        mut self,
        namespace: impl Into<String>,
        attribute: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.overrides.push(Override {
            namespace: namespace.into(),
            attribute: attribute.into(),
            value: value.into(),
        });
        self
    }

    /// Sets the save folder, taking precedence over the model's settings.
    #[must_use]
    pub fn savefolder(mut self, path: impl Into<PathBuf>) -> Self {
        self.savefolder = Some(path.into());
        self
    }

    /// Runs the model's lifecycle and returns the initialized model.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if the configuration is invalid, a definition
    /// phase fails, saved data cannot be read, or restored values break the
    /// structure established by setup and allocate.
    pub fn build(self) -> Result<EconModel<D>, Error> {
        let Self {
            name,
            mut definition,
            load,
            dict,
            skip,
            overrides,
            savefolder,
        } = self;

        if load.is_some() && dict.is_some() {
            return Err(ConfigError::ConflictingSources.into());
        }

        let settings = lifecycle::declare(&mut definition)?;
        let savefolder = savefolder
            .or_else(|| settings.savefolder_path().map(ToOwned::to_owned))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SAVEFOLDER));

        let restored = match (load, dict) {
            (Some(path), _) => {
                let path = path.unwrap_or_else(|| storage::path_for(&savefolder, &name));
                let saved = storage::read(&path)?;
                info!(model = %name, path = %path.display(), "loading model");
                Some((saved.dict, Growth::Forbidden, Some(saved.schema)))
            }
            (None, Some(dict)) => Some((dict, Growth::Permitted, None)),
            (None, None) => None,
        };

        let skip = AttrFilter::new(&skip);
        let restore = restored.as_ref().map(|(dict, growth, recorded)| Restore {
            dict,
            skip: &skip,
            growth: *growth,
            recorded: recorded.as_ref(),
        });

        let state = lifecycle::initialize(&name, &mut definition, &settings, restore, &overrides)?;
        let schema = ModelSchema::of(&state);

        Ok(EconModel {
            name,
            savefolder,
            native_backend_source: settings.native_backend_source_path().map(ToOwned::to_owned),
            definition,
            state,
            schema,
        })
    }
}
