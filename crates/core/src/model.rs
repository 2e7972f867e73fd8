mod builder;
mod lifecycle;

use std::{
    fmt,
    path::{Path, PathBuf},
};

use tracing::{debug, info};

use crate::{
    Error, Growth, ModelDefinition, ModelDict, ModelSchema, ModelState, Namespace, Phase,
    StructuralError, Value,
    dict::AttrFilter,
    invariant::{check_assignment, check_model},
    storage::{self, SavedModel},
};

use self::lifecycle::Override;

pub use builder::Builder;

/// A parameterized economic model.
///
/// The model owns its state, the definition that created it and the schema
/// established when it was initialized. Every namespace attribute keeps the
/// kind and rank recorded in that schema through copies, saves and loads.
#[derive(Debug)]
pub struct EconModel<D> {
    name: String,
    savefolder: PathBuf,
    native_backend_source: Option<PathBuf>,
    definition: D,
    state: ModelState,
    schema: ModelSchema,
}

impl<D: ModelDefinition> EconModel<D> {
    /// Creates and initializes a fresh model.
    ///
    /// # Errors
    ///
    /// See [`Builder::build`].
    pub fn new(name: impl Into<String>, definition: D) -> Result<Self, Error> {
        Self::builder(name, definition).build()
    }

    /// Returns a builder for loading, reconstructing or overriding.
    pub fn builder(name: impl Into<String>, definition: D) -> Builder<D> {
        Builder::new(name, definition)
    }

    /// Replaces state from a plain mapping.
    ///
    /// The whole mapping is decoded and checked before anything is assigned,
    /// so on error the model is unchanged. Attributes absent from the mapping
    /// or named in `skip` keep their current values.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if an entry cannot be decoded, names something the
    /// model does not have, or has a different type than established.
    pub fn from_dict(&mut self, dict: &ModelDict, skip: &[&str]) -> Result<(), Error> {
        let restored = dict.decode(&self.state, &AttrFilter::new(skip), false)?;
        lifecycle::apply_restored(&self.schema, &mut self.state, restored, Growth::Forbidden)
    }

    /// Runs allocate again, typically after parameters changed.
    ///
    /// Allocate works on a copy of the state, which replaces the model's
    /// only if every attribute kept its kind and rank. Shapes may change.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if allocate fails or changes the structure; the
    /// model is unchanged in both cases.
    pub fn reallocate(&mut self) -> Result<(), Error> {
        let mut next = self.state.clone();
        debug!(model = %self.name, phase = %Phase::Allocate, "running model phase");
        self.definition
            .allocate(&mut next)
            .map_err(|err| Error::definition(Phase::Allocate, err))?;
        check_model(&self.schema, &next, Growth::Forbidden)?;
        self.state = next;
        Ok(())
    }

    /// Saves the model to `<savefolder>/<name>.bin` and returns that path.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if the file cannot be written.
    pub fn save(&self) -> Result<PathBuf, Error> {
        self.save_excluding(&[])
    }

    /// Saves the model without the entries in `drop`.
    ///
    /// Entries are namespaces, other attributes, or `namespace.attribute`
    /// paths. Dropped attributes are recomputed by allocate on load.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if the file cannot be written.
    pub fn save_excluding(&self, drop: &[&str]) -> Result<PathBuf, Error> {
        let path = storage::path_for(&self.savefolder, &self.name);
        self.write(&path, drop)?;
        Ok(path)
    }

    /// Saves the model to an explicit path.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if the file cannot be written.
    pub fn save_to(&self, path: &Path) -> Result<(), Error> {
        self.write(path, &[])
    }

    /// Reloads state saved under the model's name in place.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if the file cannot be read or its contents do not
    /// fit the model.
    pub fn load(&mut self, skip: &[&str]) -> Result<(), Error> {
        let path = storage::path_for(&self.savefolder, &self.name);
        self.load_from(&path, skip)
    }

    /// Reloads state from a saved file in place.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if the file cannot be read or its contents do not
    /// fit the model.
    pub fn load_from(&mut self, path: &Path, skip: &[&str]) -> Result<(), Error> {
        let saved = storage::read(path)?;
        info!(model = %self.name, path = %path.display(), "loading model");
        self.from_dict(&saved.dict, skip)
    }

    /// Returns a deep copy named `<name>_copy`.
    ///
    /// # Errors
    ///
    /// See [`copy_as`](Self::copy_as).
    pub fn copy(&self) -> Result<Self, Error>
    where
        D: Clone,
    {
        self.copy_as(format!("{}_copy", self.name))
    }

    /// Returns a deep copy with the given name.
    ///
    /// The copy is rebuilt from [`as_dict`](Self::as_dict), shares no storage
    /// with this model and inherits its schema.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if this model's state no longer matches its
    /// schema.
    pub fn copy_as(&self, name: impl Into<String>) -> Result<Self, Error>
    where
        D: Clone,
    {
        self.copy_with(name, &[])
    }

    /// Returns a deep copy with the given name and some attributes replaced.
    ///
    /// Each override is `(namespace, attribute, value)` and must target an
    /// existing attribute without changing its type. Allocate does not run
    /// again; call [`reallocate`](Self::reallocate) on the copy when sizes
    /// depend on the replaced parameters.
    ///
    /// # Errors
    ///
    /// As [`copy_as`](Self::copy_as), and an [`Error`] if an override names
    /// an unknown attribute or has a different type.
    pub fn copy_with(
        &self,
        name: impl Into<String>,
        overrides: &[(&str, &str, Value)],
    ) -> Result<Self, Error>
    where
        D: Clone,
    {
        let mut state = self.state.skeleton();
        let restored = self
            .as_dict()
            .decode(&state, &AttrFilter::default(), false)?;
        lifecycle::apply_restored(&self.schema, &mut state, restored, Growth::Forbidden)?;

        let overrides: Vec<Override> = overrides
            .iter()
            .map(|(namespace, attribute, value)| Override {
                namespace: (*namespace).to_owned(),
                attribute: (*attribute).to_owned(),
                value: value.clone(),
            })
            .collect();
        lifecycle::apply_overrides(&mut state, &overrides)?;

        Ok(Self {
            name: name.into(),
            savefolder: self.savefolder.clone(),
            native_backend_source: self.native_backend_source.clone(),
            definition: self.definition.clone(),
            state,
            schema: self.schema.clone(),
        })
    }

    fn write(&self, path: &Path, drop: &[&str]) -> Result<(), Error> {
        let saved = SavedModel::new(
            self.name.clone(),
            self.state.namespace_names().map(str::to_owned).collect(),
            self.state.other_attrs().names().map(str::to_owned).collect(),
            self.schema.clone(),
            self.as_dict_excluding(drop),
        );
        storage::write(path, &saved)?;
        info!(model = %self.name, path = %path.display(), "saved model");
        Ok(())
    }
}

impl<D> EconModel<D> {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn savefolder(&self) -> &Path {
        &self.savefolder
    }

    pub fn set_savefolder(&mut self, path: impl Into<PathBuf>) {
        self.savefolder = path.into();
    }

    /// Path of the description of the model's native backend, if declared.
    #[must_use]
    pub fn native_backend_source(&self) -> Option<&Path> {
        self.native_backend_source.as_deref()
    }

    #[must_use]
    pub fn definition(&self) -> &D {
        &self.definition
    }

    pub fn definition_mut(&mut self) -> &mut D {
        &mut self.definition
    }

    #[must_use]
    pub fn state(&self) -> &ModelState {
        &self.state
    }

    /// Gives unrestricted access to the state.
    ///
    /// Structural changes made here are detected by
    /// [`check_types`](Self::check_types) and every operation that runs it.
    pub fn state_mut(&mut self) -> &mut ModelState {
        &mut self.state
    }

    #[must_use]
    pub fn par(&self) -> &Namespace {
        self.state.par()
    }

    pub fn par_mut(&mut self) -> &mut Namespace {
        self.state.par_mut()
    }

    #[must_use]
    pub fn sol(&self) -> &Namespace {
        self.state.sol()
    }

    pub fn sol_mut(&mut self) -> &mut Namespace {
        self.state.sol_mut()
    }

    #[must_use]
    pub fn sim(&self) -> &Namespace {
        self.state.sim()
    }

    pub fn sim_mut(&mut self) -> &mut Namespace {
        self.state.sim_mut()
    }

    #[must_use]
    pub fn namespace(&self, name: &str) -> Option<&Namespace> {
        self.state.namespace(name)
    }

    pub fn namespace_mut(&mut self, name: &str) -> Option<&mut Namespace> {
        self.state.namespace_mut(name)
    }

    /// The schema established when the model was initialized.
    #[must_use]
    pub fn schema(&self) -> &ModelSchema {
        &self.schema
    }

    /// Verifies that no namespace attribute changed kind or rank and none was
    /// added since initialization.
    ///
    /// # Errors
    ///
    /// Returns the first [`StructuralError`] found.
    pub fn check_types(&self) -> Result<(), StructuralError> {
        check_model(&self.schema, &self.state, Growth::Forbidden)
    }

    /// Assigns `namespace.attribute` if the value keeps the established type.
    ///
    /// # Errors
    ///
    /// Returns a [`StructuralError`] and leaves the model unchanged if the
    /// namespace or attribute is unknown or the type differs.
    pub fn set(
        &mut self,
        namespace: &str,
        attribute: &str,
        value: impl Into<Value>,
    ) -> Result<Option<Value>, StructuralError> {
        let value = value.into();
        check_assignment(&self.schema, namespace, attribute, &value, Growth::Forbidden)?;
        let ns = self
            .state
            .namespace_mut(namespace)
            .ok_or_else(|| StructuralError::UnknownNamespace(namespace.to_owned()))?;
        Ok(ns.set(attribute, value))
    }

    /// Returns the model's state as a plain mapping.
    #[must_use]
    pub fn as_dict(&self) -> ModelDict {
        self.as_dict_excluding(&[])
    }

    /// Returns the model's state as a plain mapping without the entries in
    /// `drop`.
    #[must_use]
    pub fn as_dict_excluding(&self, drop: &[&str]) -> ModelDict {
        ModelDict::encode(&self.state, &AttrFilter::new(drop))
    }
}

impl<D> fmt::Display for EconModel<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Modelclass: {}", std::any::type_name::<D>())?;
        writeln!(f, "Name: {}", self.name)?;
        writeln!(f)?;
        write!(f, "{}", self.state)
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use approx::assert_relative_eq;
    use ndarray::Array1;
    use tempfile::tempdir;

    use super::*;
    use crate::{ConfigError, DecodeError, Settings, ValueKind};

    /// A small consumption-saving model.
    #[derive(Debug, Clone, Default)]
    struct Savings;

    impl ModelDefinition for Savings {
        type Error = Infallible;

        fn settings(&mut self, settings: &mut Settings) {
            settings.other_attr("info", "baseline");
        }

        fn setup(&mut self, state: &mut ModelState) -> Result<(), Infallible> {
            let par = state.par_mut();
            par.set("beta", 0.96);
            par.set("Na", 10);
            par.set("a_max", 5.0);
            Ok(())
        }

        fn allocate(&mut self, state: &mut ModelState) -> Result<(), Infallible> {
            let na = state.par().int("Na").unwrap_or(0);
            let a_max = state.par().float("a_max").unwrap_or(1.0);
            let na = usize::try_from(na).unwrap_or(0);
            state
                .par_mut()
                .set("grid_a", Array1::linspace(0.0, a_max, na));
            state.sol_mut().set("c", Array1::<f64>::zeros(na));
            Ok(())
        }
    }

    #[test]
    fn fresh_model_runs_every_phase() -> Result<(), Error> {
        let model = EconModel::new("baseline", Savings)?;

        assert_eq!(
            model.par().names().collect::<Vec<_>>(),
            ["beta", "Na", "a_max", "grid_a"]
        );
        assert_eq!(model.sol().float_array("c").map(|c| c.len()), Some(10));
        assert_eq!(model.savefolder(), Path::new("saved"));
        assert_eq!(model.schema().names().collect::<Vec<_>>(), ["par", "sol", "sim"]);
        Ok(())
    }

    #[test]
    fn overrides_apply_before_allocate() -> Result<(), Error> {
        let model = EconModel::builder("big", Savings)
            .with_value("par", "Na", 20)
            .build()?;

        assert_eq!(model.par().float_array("grid_a").map(|g| g.len()), Some(20));
        Ok(())
    }

    #[test]
    fn overrides_must_target_existing_attributes() {
        let err = EconModel::builder("bad", Savings)
            .with_value("par", "sigma", 2.0)
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Config(ConfigError::UnknownAttribute { ref attribute, .. })
                if attribute == "sigma"
        ));

        let err = EconModel::builder("bad", Savings)
            .with_value("par", "Na", 2.5)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Structural(_)));
    }

    #[test]
    fn loading_and_mapping_together_conflict() {
        let err = EconModel::builder("x", Savings)
            .load()
            .from_dict(ModelDict::new())
            .build()
            .unwrap_err();

        assert!(matches!(err, Error::Config(ConfigError::ConflictingSources)));
    }

    #[test]
    fn set_rejects_structural_changes() -> Result<(), Error> {
        let mut model = EconModel::new("baseline", Savings)?;

        let err = model.set("par", "grid_a", 1.0).unwrap_err();
        assert_eq!(err.attribute(), Some("grid_a"));
        assert_eq!(model.par().get("grid_a").map(Value::kind), Some(ValueKind::FloatArray));

        model.set("par", "grid_a", Array1::<f64>::ones(20))?;
        assert_eq!(model.par().float_array("grid_a").map(|g| g.len()), Some(20));
        Ok(())
    }

    #[test]
    fn reallocate_follows_parameters() -> Result<(), Error> {
        let mut model = EconModel::new("baseline", Savings)?;
        model.set("par", "Na", 20)?;

        model.reallocate()?;

        assert_eq!(model.par().float_array("grid_a").map(|g| g.len()), Some(20));
        assert_eq!(model.sol().float_array("c").map(|c| c.len()), Some(20));
        Ok(())
    }

    #[test]
    fn check_types_sees_direct_mutation() -> Result<(), Error> {
        let mut model = EconModel::new("baseline", Savings)?;
        assert!(model.check_types().is_ok());

        model.sol_mut().set("extra", 1.0);
        assert_eq!(
            model.check_types(),
            Err(StructuralError::UnknownAttribute {
                namespace: "sol".into(),
                attribute: "extra".into(),
            })
        );
        Ok(())
    }

    #[test]
    fn copy_is_independent() -> Result<(), Error> {
        let model = EconModel::new("baseline", Savings)?;
        let mut copy = model.copy()?;

        copy.par_mut().set("beta", 0.5);
        copy.sol_mut().float_array_mut("c").unwrap().fill(1.0);

        assert_eq!(copy.name(), "baseline_copy");
        assert_relative_eq!(model.par().float("beta").unwrap(), 0.96);
        assert_relative_eq!(model.sol().float_array("c").unwrap().sum(), 0.0);
        assert_eq!(copy.schema(), model.schema());
        Ok(())
    }

    #[test]
    fn copy_with_replaces_parameters() -> Result<(), Error> {
        let model = EconModel::new("baseline", Savings)?;

        let mut patient = model.copy_with("patient", &[("par", "beta", Value::from(0.99))])?;

        assert_eq!(patient.name(), "patient");
        assert_relative_eq!(patient.par().float("beta").unwrap(), 0.99);
        assert_relative_eq!(model.par().float("beta").unwrap(), 0.96);

        let mut larger = model.copy_with("larger", &[("par", "Na", Value::from(20))])?;
        assert_eq!(larger.sol().float_array("c").map(|c| c.len()), Some(10));
        larger.reallocate()?;
        assert_eq!(larger.sol().float_array("c").map(|c| c.len()), Some(20));

        patient.set("par", "beta", 0.95)?;
        assert_eq!(patient.schema(), model.schema());
        Ok(())
    }

    #[test]
    fn copy_with_keeps_the_schema() -> Result<(), Error> {
        let model = EconModel::new("baseline", Savings)?;

        let err = model
            .copy_with("bad", &[("par", "Na", Value::from(2.5))])
            .unwrap_err();
        assert!(matches!(err, Error::Structural(_)));

        let err = model
            .copy_with("bad", &[("par", "sigma", Value::from(2.0))])
            .unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::UnknownAttribute { .. })));
        Ok(())
    }

    #[test]
    fn from_dict_is_all_or_nothing() -> Result<(), Error> {
        let mut model = EconModel::new("baseline", Savings)?;
        let mut other = model.copy()?;
        other.par_mut().set("beta", 0.9);
        other.par_mut().set("Na", 1.5);

        let err = model.from_dict(&other.as_dict(), &[]).unwrap_err();

        assert!(matches!(err, Error::Structural(_)));
        assert_relative_eq!(model.par().float("beta").unwrap(), 0.96);
        Ok(())
    }

    #[test]
    fn from_dict_honors_skip() -> Result<(), Error> {
        let mut model = EconModel::new("baseline", Savings)?;
        let mut other = model.copy()?;
        other.par_mut().set("beta", 0.9);
        other.par_mut().set("a_max", 8.0);

        model.from_dict(&other.as_dict(), &["par.beta"])?;

        assert_relative_eq!(model.par().float("beta").unwrap(), 0.96);
        assert_relative_eq!(model.par().float("a_max").unwrap(), 8.0);
        Ok(())
    }

    #[test]
    fn save_then_load_in_place() -> Result<(), Error> {
        let dir = tempdir().unwrap();
        let mut model = EconModel::builder("baseline", Savings)
            .savefolder(dir.path())
            .build()?;
        model.sol_mut().float_array_mut("c").unwrap().fill(2.0);

        let path = model.save()?;
        assert_eq!(path, dir.path().join("baseline.bin"));

        model.sol_mut().float_array_mut("c").unwrap().fill(0.0);
        model.load(&[])?;

        assert_relative_eq!(model.sol().float_array("c").unwrap().sum(), 20.0);
        Ok(())
    }

    #[test]
    fn attribute_names_are_checked_when_built() -> Result<(), Error> {
        let mut dict = EconModel::new("baseline", Savings)?.as_dict();
        let Some(crate::Entry::Namespace(mut sol)) = dict.remove("sol") else {
            panic!("sol must be a namespace");
        };
        sol.push(("c lag".into(), crate::Encoded::Float(0.0)));
        dict.insert("sol", crate::Entry::Namespace(sol));

        let err = EconModel::builder("spaced", Savings)
            .from_dict(dict)
            .build()
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Config(ConfigError::InvalidAttributeName { ref attribute, .. })
                if attribute == "c lag"
        ));
        Ok(())
    }

    #[test]
    fn undeclared_entries_fail_to_restore() -> Result<(), Error> {
        let mut model = EconModel::new("baseline", Savings)?;
        let mut dict = model.as_dict();
        dict.insert("notes", crate::Entry::Attr(crate::Encoded::Int(1)));

        let err = model.from_dict(&dict, &[]).unwrap_err();
        assert!(matches!(err, Error::Decode(DecodeError::UnknownEntry(_))));
        Ok(())
    }

    #[test]
    fn display_lists_namespaces() -> Result<(), Error> {
        let model = EconModel::new("baseline", Savings)?;
        let text = model.to_string();

        assert!(text.contains("Name: baseline"));
        assert!(text.contains("par:"));
        assert!(text.contains(" beta = 0.96 [float]"));
        Ok(())
    }
}
