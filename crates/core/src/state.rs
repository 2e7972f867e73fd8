use std::fmt;

use crate::{ConfigError, Namespace, Settings, Value, definition::is_identifier};

/// Owned state of a model: its namespaces and other attributes.
///
/// The reserved namespaces `par`, `sol` and `sim` always exist and are the
/// first three, in that order.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelState {
    names: Vec<String>,
    namespaces: Vec<Namespace>,
    other: Namespace,
}

impl ModelState {
    /// Creates empty namespaces and default-valued other attributes for the
    /// given settings.
    ///
    /// The settings are assumed to be validated.
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        let names: Vec<String> = settings.namespace_names().map(str::to_owned).collect();
        let namespaces = vec![Namespace::new(); names.len()];

        let mut other = Namespace::new();
        for (name, default) in settings.other_attrs() {
            other.set(name, default.clone());
        }

        Self {
            names,
            namespaces,
            other,
        }
    }

    /// The parameters namespace.
    #[must_use]
    pub fn par(&self) -> &Namespace {
        &self.namespaces[0]
    }

    pub fn par_mut(&mut self) -> &mut Namespace {
        &mut self.namespaces[0]
    }

    /// The solution namespace.
    #[must_use]
    pub fn sol(&self) -> &Namespace {
        &self.namespaces[1]
    }

    pub fn sol_mut(&mut self) -> &mut Namespace {
        &mut self.namespaces[1]
    }

    /// The simulation namespace.
    #[must_use]
    pub fn sim(&self) -> &Namespace {
        &self.namespaces[2]
    }

    pub fn sim_mut(&mut self) -> &mut Namespace {
        &mut self.namespaces[2]
    }

    #[must_use]
    pub fn namespace(&self, name: &str) -> Option<&Namespace> {
        self.index_of(name).map(|i| &self.namespaces[i])
    }

    pub fn namespace_mut(&mut self, name: &str) -> Option<&mut Namespace> {
        self.index_of(name).map(|i| &mut self.namespaces[i])
    }

    #[must_use]
    pub fn has_namespace(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    /// Returns an iterator over `(name, namespace)` pairs in order.
    pub fn namespaces(&self) -> impl ExactSizeIterator<Item = (&str, &Namespace)> {
        self.names.iter().map(String::as_str).zip(&self.namespaces)
    }

    pub fn namespaces_mut(&mut self) -> impl ExactSizeIterator<Item = (&str, &mut Namespace)> {
        self.names
            .iter()
            .map(String::as_str)
            .zip(self.namespaces.iter_mut())
    }

    pub fn namespace_names(&self) -> impl ExactSizeIterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// The declared other attributes and their current values.
    #[must_use]
    pub fn other_attrs(&self) -> &Namespace {
        &self.other
    }

    #[must_use]
    pub fn other_attr(&self, name: &str) -> Option<&Value> {
        self.other.get(name)
    }

    /// Assigns a declared other attribute, returning its previous value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownOtherAttr`] if `name` was not declared
    /// in the model's settings.
    pub fn set_other_attr(
        &mut self,
        name: &str,
        value: impl Into<Value>,
    ) -> Result<Option<Value>, ConfigError> {
        if !self.other.contains(name) {
            return Err(ConfigError::UnknownOtherAttr(name.to_owned()));
        }
        Ok(self.other.set(name, value))
    }

    /// Total bytes held by arrays in all namespaces.
    #[must_use]
    pub fn nbytes(&self) -> usize {
        self.namespaces.iter().map(Namespace::nbytes).sum()
    }

    /// Rejects other attributes whose names also appear inside a namespace.
    pub(crate) fn check_ambiguity(&self) -> Result<(), ConfigError> {
        for name in self.other.names() {
            if let Some((namespace, _)) = self.namespaces().find(|(_, ns)| ns.contains(name)) {
                return Err(ConfigError::AmbiguousAttribute {
                    name: name.to_owned(),
                    namespace: namespace.to_owned(),
                });
            }
        }
        Ok(())
    }

    /// Rejects namespace attributes whose names are not identifiers.
    pub(crate) fn check_attribute_names(&self) -> Result<(), ConfigError> {
        for (namespace, ns) in self.namespaces() {
            if let Some(attribute) = ns.names().find(|name| !is_identifier(name)) {
                return Err(ConfigError::InvalidAttributeName {
                    namespace: namespace.to_owned(),
                    attribute: attribute.to_owned(),
                });
            }
        }
        Ok(())
    }

    /// Returns a state with the same namespace names and other attributes but
    /// empty namespaces.
    pub(crate) fn skeleton(&self) -> Self {
        Self {
            names: self.names.clone(),
            namespaces: vec![Namespace::new(); self.names.len()],
            other: self.other.clone(),
        }
    }

    pub(crate) fn other_attrs_mut(&mut self) -> &mut Namespace {
        &mut self.other
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|ns| ns == name)
    }
}

impl fmt::Display for ModelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, namespace) in self.namespaces() {
            writeln!(f, "{name}:")?;
            write!(f, "{namespace}")?;
        }
        if !self.other.is_empty() {
            writeln!(f, "other attributes:")?;
            for (name, value) in self.other.iter() {
                writeln!(f, " {name}: {}", value.kind())?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> Settings {
        let mut settings = Settings::default();
        settings.namespace("egm").other_attr("info", "baseline");
        settings
    }

    #[test]
    fn namespaces_follow_settings_order() {
        let state = ModelState::from_settings(&settings());

        assert_eq!(
            state.namespace_names().collect::<Vec<_>>(),
            ["par", "sol", "sim", "egm"]
        );
        assert!(state.namespaces().all(|(_, ns)| ns.is_empty()));
        assert_eq!(state.other_attr("info"), Some(&Value::from("baseline")));
    }

    #[test]
    fn reserved_accessors_match_named_lookup() {
        let mut state = ModelState::from_settings(&settings());
        state.sol_mut().set("v", 1.0);

        assert_eq!(state.namespace("sol"), Some(state.sol()));
        assert!(state.namespace("missing").is_none());
    }

    #[test]
    fn undeclared_other_attrs_are_rejected() {
        let mut state = ModelState::from_settings(&settings());

        assert_eq!(
            state.set_other_attr("info", "robustness"),
            Ok(Some(Value::from("baseline")))
        );
        assert_eq!(
            state.set_other_attr("notes", "x"),
            Err(ConfigError::UnknownOtherAttr("notes".into()))
        );
    }

    #[test]
    fn attribute_names_must_be_identifiers() {
        let mut state = ModelState::from_settings(&settings());
        state.par_mut().set("grid_a", 1.0);
        assert!(state.check_attribute_names().is_ok());

        state.namespace_mut("egm").unwrap().set("a b", 1.0);
        assert_eq!(
            state.check_attribute_names(),
            Err(ConfigError::InvalidAttributeName {
                namespace: "egm".into(),
                attribute: "a b".into(),
            })
        );
    }

    #[test]
    fn other_attr_shadowing_a_namespace_attribute_is_ambiguous() {
        let mut state = ModelState::from_settings(&settings());
        state.par_mut().set("beta", 0.96);
        assert!(state.check_ambiguity().is_ok());

        state.namespace_mut("egm").unwrap().set("info", 1.0);
        assert_eq!(
            state.check_ambiguity(),
            Err(ConfigError::AmbiguousAttribute {
                name: "info".into(),
                namespace: "egm".into(),
            })
        );
    }
}
