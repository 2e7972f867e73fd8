use std::path::{Path, PathBuf};

use crate::{ConfigError, ModelState, Value};

/// Name of the reserved parameters namespace.
pub const PAR: &str = "par";
/// Name of the reserved solution namespace.
pub const SOL: &str = "sol";
/// Name of the reserved simulation namespace.
pub const SIM: &str = "sim";

/// Namespaces every model has, in order.
pub const RESERVED_NAMESPACES: [&str; 3] = [PAR, SOL, SIM];

/// Folder used for persistence unless a model or caller chooses another.
pub const DEFAULT_SAVEFOLDER: &str = "saved";

/// The model-specific part of an economic model.
///
/// An implementation supplies exactly three capabilities, invoked in this
/// order when a model is initialized:
///
/// 1. [`settings`](Self::settings) declares the namespace set, the
///    non-namespace attributes and where the model is persisted.
/// 2. [`setup`](Self::setup) assigns the free (primitive) parameters.
/// 3. [`allocate`](Self::allocate) derives compound values whose shape
///    depends on the free parameters and allocates their storage.
///
/// When a model is reconstructed from saved data, `setup` and `allocate`
/// still run, but any attribute present in the restored data overrides what
/// they produce. This lets `allocate` rebuild attributes that were skipped or
/// excluded when the data was saved.
pub trait ModelDefinition {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Declares the model's namespaces and other attributes.
    fn settings(&mut self, settings: &mut Settings);

    /// Assigns free parameter values.
    ///
    /// # Errors
    ///
    /// Each definition decides which parameter combinations are invalid.
    fn setup(&mut self, state: &mut ModelState) -> Result<(), Self::Error>;

    /// Allocates arrays and other values derived from the free parameters.
    ///
    /// # Errors
    ///
    /// Each definition decides which parameter combinations are invalid.
    fn allocate(&mut self, state: &mut ModelState) -> Result<(), Self::Error>;
}

/// Schema registration filled in by [`ModelDefinition::settings`].
///
/// The reserved namespaces `par`, `sol` and `sim` always exist and come first;
/// extra namespaces follow in declaration order.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    namespaces: Vec<String>,
    other_attrs: Vec<(String, Value)>,
    savefolder: Option<PathBuf>,
    native_backend_source: Option<PathBuf>,
}

impl Settings {
    /// Declares an extra namespace.
    pub fn namespace(&mut self, name: impl Into<String>) -> &mut Self {
        self.namespaces.push(name.into());
        self
    }

    /// Declares an attribute outside the namespaces that is still copied and
    /// serialized with the model.
    pub fn other_attr(&mut self, name: impl Into<String>, default: impl Into<Value>) -> &mut Self {
        self.other_attrs.push((name.into(), default.into()));
        self
    }

    /// Sets the folder the model is saved to and loaded from.
    pub fn savefolder(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.savefolder = Some(path.into());
        self
    }

    /// Sets the path of the native backend's source description.
    pub fn native_backend_source(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.native_backend_source = Some(path.into());
        self
    }

    /// Returns all namespace names, reserved ones first.
    pub fn namespace_names(&self) -> impl Iterator<Item = &str> {
        RESERVED_NAMESPACES
            .into_iter()
            .chain(self.namespaces.iter().map(String::as_str))
    }

    /// Returns the declared other attributes with their default values.
    pub fn other_attrs(&self) -> impl ExactSizeIterator<Item = (&str, &Value)> {
        self.other_attrs
            .iter()
            .map(|(name, value)| (name.as_str(), value))
    }

    #[must_use]
    pub fn savefolder_path(&self) -> Option<&Path> {
        self.savefolder.as_deref()
    }

    #[must_use]
    pub fn native_backend_source_path(&self) -> Option<&Path> {
        self.native_backend_source.as_deref()
    }

    /// Validates the declared names.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if a name is not an identifier, a reserved
    /// namespace is redeclared, a name is declared twice, or a name is used
    /// both for a namespace and an other attribute.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen: Vec<&str> = Vec::new();

        for name in &self.namespaces {
            if !is_identifier(name) {
                return Err(ConfigError::InvalidName(name.clone()));
            }
            if RESERVED_NAMESPACES.contains(&name.as_str()) {
                return Err(ConfigError::ReservedNamespace(name.clone()));
            }
            if seen.contains(&name.as_str()) {
                return Err(ConfigError::DuplicateNamespace(name.clone()));
            }
            seen.push(name);
        }

        let mut seen_attrs: Vec<&str> = Vec::new();
        for (name, _) in &self.other_attrs {
            if !is_identifier(name) {
                return Err(ConfigError::InvalidName(name.clone()));
            }
            if self.namespace_names().any(|ns| ns == name) {
                return Err(ConfigError::NamespaceAttrClash(name.clone()));
            }
            if seen_attrs.contains(&name.as_str()) {
                return Err(ConfigError::DuplicateOtherAttr(name.clone()));
            }
            seen_attrs.push(name);
        }

        Ok(())
    }
}

/// Names end up as C struct and field names on the native side.
pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_namespaces_come_first() {
        let mut settings = Settings::default();
        settings.namespace("egm").namespace("moments");

        assert_eq!(
            settings.namespace_names().collect::<Vec<_>>(),
            ["par", "sol", "sim", "egm", "moments"]
        );
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn rejects_bad_declarations() {
        let cases = [
            (
                Settings::default().namespace("sol").clone(),
                ConfigError::ReservedNamespace("sol".into()),
            ),
            (
                Settings::default().namespace("x").namespace("x").clone(),
                ConfigError::DuplicateNamespace("x".into()),
            ),
            (
                Settings::default().namespace("2nd").clone(),
                ConfigError::InvalidName("2nd".into()),
            ),
            (
                Settings::default().other_attr("par", 1.0).clone(),
                ConfigError::NamespaceAttrClash("par".into()),
            ),
            (
                Settings::default()
                    .other_attr("info", "a")
                    .other_attr("info", "b")
                    .clone(),
                ConfigError::DuplicateOtherAttr("info".into()),
            ),
        ];

        for (settings, expected) in cases {
            assert_eq!(settings.validate().unwrap_err(), expected);
        }
    }

    #[test]
    fn identifiers() {
        assert!(is_identifier("grid_a"));
        assert!(is_identifier("_tmp2"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("a-b"));
        assert!(!is_identifier("a.b"));
    }
}
