//! Layout descriptors for namespaces and models.
//!
//! A schema records, for every attribute, its name and [`FieldType`] in
//! namespace order. It is the "before" snapshot consulted by the structural
//! invariant checker and the layout a native backend is verified against.

use serde::{Deserialize, Serialize};

use crate::{FieldType, ModelState, Namespace};

/// One attribute of a namespace layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(flatten)]
    pub ty: FieldType,
}

/// The ordered layout of a single namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NamespaceSchema {
    pub fields: Vec<FieldSpec>,
}

/// The ordered layout of every namespace in a model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSchema {
    pub namespaces: Vec<(String, NamespaceSchema)>,
}

impl FieldSpec {
    #[must_use]
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

impl NamespaceSchema {
    /// Captures the current layout of `namespace`.
    #[must_use]
    pub fn of(namespace: &Namespace) -> Self {
        Self {
            fields: namespace
                .iter()
                .map(|(name, value)| FieldSpec::new(name, value.field_type()))
                .collect(),
        }
    }

    /// Returns the field with the given name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|field| field.name == name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl ModelSchema {
    /// Captures the current layout of every namespace in `state`.
    #[must_use]
    pub fn of(state: &ModelState) -> Self {
        Self {
            namespaces: state
                .namespaces()
                .map(|(name, namespace)| (name.to_owned(), NamespaceSchema::of(namespace)))
                .collect(),
        }
    }

    /// Returns the schema of the named namespace.
    #[must_use]
    pub fn namespace(&self, name: &str) -> Option<&NamespaceSchema> {
        self.namespaces
            .iter()
            .find(|(ns, _)| ns == name)
            .map(|(_, schema)| schema)
    }

    /// Returns the namespace names in order.
    pub fn names(&self) -> impl ExactSizeIterator<Item = &str> {
        self.namespaces.iter().map(|(name, _)| name.as_str())
    }

    /// Returns this schema with every field of `recorded` that it lacks
    /// appended to the namespace of the same name.
    ///
    /// Namespaces that only `recorded` has are left out, and fields present in
    /// both keep the type they have here.
    #[must_use]
    pub fn extended_with(&self, recorded: &ModelSchema) -> ModelSchema {
        let mut extended = self.clone();
        for (name, schema) in &mut extended.namespaces {
            let Some(other) = recorded.namespace(name) else {
                continue;
            };
            let extra: Vec<FieldSpec> = other
                .fields
                .iter()
                .filter(|field| schema.field(&field.name).is_none())
                .cloned()
                .collect();
            schema.fields.extend(extra);
        }
        extended
    }
}
