//! Structural invariant checking.
//!
//! Once a model is initialized, every namespace attribute keeps its kind and,
//! for arrays, its number of dimensions. Shapes may change freely.

use thiserror::Error;

use crate::{FieldType, ModelSchema, ModelState, Namespace, NamespaceSchema, Value, ValueKind};

/// Whether attributes missing from the established schema may be added.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Growth {
    /// Unknown attributes are rejected.
    Forbidden,
    /// Unknown attributes are accepted; only used when a model is first
    /// reconstructed from a plain mapping.
    Permitted,
}

/// A violation of the structural invariant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructuralError {
    /// The value's kind differs from the established kind.
    #[error("{namespace}.{attribute} has type {actual}, should be {expected}")]
    TypeMismatch {
        namespace: String,
        attribute: String,
        expected: ValueKind,
        actual: ValueKind,
    },

    /// The array's number of dimensions differs from the established rank.
    #[error("{namespace}.{attribute} has ndim {actual}, should be {expected}")]
    RankMismatch {
        namespace: String,
        attribute: String,
        expected: usize,
        actual: usize,
    },

    /// The attribute was not part of the namespace when it was established.
    #[error("{attribute} is not allowed in {namespace}")]
    UnknownAttribute { namespace: String, attribute: String },

    /// No namespace with this name exists.
    #[error("{0} is not a namespace")]
    UnknownNamespace(String),
}

impl StructuralError {
    /// Returns the offending attribute name, if the error concerns one.
    #[must_use]
    pub fn attribute(&self) -> Option<&str> {
        match self {
            StructuralError::TypeMismatch { attribute, .. }
            | StructuralError::RankMismatch { attribute, .. }
            | StructuralError::UnknownAttribute { attribute, .. } => Some(attribute),
            StructuralError::UnknownNamespace(_) => None,
        }
    }
}

/// Checks a single value against its established field type.
///
/// # Errors
///
/// Returns a [`StructuralError`] naming `namespace.attribute` if the kind or
/// the array rank differs.
pub fn check_value(
    namespace: &str,
    attribute: &str,
    expected: &FieldType,
    value: &Value,
) -> Result<(), StructuralError> {
    let actual = value.field_type();

    if actual.kind != expected.kind {
        return Err(StructuralError::TypeMismatch {
            namespace: namespace.to_owned(),
            attribute: attribute.to_owned(),
            expected: expected.kind,
            actual: actual.kind,
        });
    }

    if actual.ndim != expected.ndim {
        return Err(StructuralError::RankMismatch {
            namespace: namespace.to_owned(),
            attribute: attribute.to_owned(),
            expected: expected.ndim,
            actual: actual.ndim,
        });
    }

    Ok(())
}

/// Checks every attribute of `namespace` against `schema`.
///
/// Attributes in the schema but absent from the namespace are not an error.
///
/// # Errors
///
/// Returns the first [`StructuralError`] found, in namespace order.
pub fn check_namespace(
    name: &str,
    schema: &NamespaceSchema,
    namespace: &Namespace,
    growth: Growth,
) -> Result<(), StructuralError> {
    for (attribute, value) in namespace.iter() {
        match schema.field(attribute) {
            Some(field) => check_value(name, attribute, &field.ty, value)?,
            None if growth == Growth::Permitted => {}
            None => {
                return Err(StructuralError::UnknownAttribute {
                    namespace: name.to_owned(),
                    attribute: attribute.to_owned(),
                });
            }
        }
    }

    Ok(())
}

/// Checks a single pending assignment of `namespace.attribute` against the
/// model schema.
///
/// # Errors
///
/// Returns a [`StructuralError`] if the namespace is unknown, the attribute is
/// new and growth is forbidden, or the type differs.
pub fn check_assignment(
    schema: &ModelSchema,
    namespace: &str,
    attribute: &str,
    value: &Value,
    growth: Growth,
) -> Result<(), StructuralError> {
    let ns_schema = schema
        .namespace(namespace)
        .ok_or_else(|| StructuralError::UnknownNamespace(namespace.to_owned()))?;

    match ns_schema.field(attribute) {
        Some(field) => check_value(namespace, attribute, &field.ty, value),
        None if growth == Growth::Permitted => Ok(()),
        None => Err(StructuralError::UnknownAttribute {
            namespace: namespace.to_owned(),
            attribute: attribute.to_owned(),
        }),
    }
}

/// Checks every namespace of `state` against `schema`.
///
/// # Errors
///
/// Returns [`StructuralError::UnknownNamespace`] for a namespace missing from
/// the schema, or the first attribute-level violation.
pub fn check_model(
    schema: &ModelSchema,
    state: &ModelState,
    growth: Growth,
) -> Result<(), StructuralError> {
    for (name, namespace) in state.namespaces() {
        let ns_schema = schema
            .namespace(name)
            .ok_or_else(|| StructuralError::UnknownNamespace(name.to_owned()))?;
        check_namespace(name, ns_schema, namespace, growth)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use ndarray::{Array1, Array2, array};

    use super::*;

    fn established() -> (Namespace, NamespaceSchema) {
        let mut ns = Namespace::new();
        ns.set("beta", 0.96);
        ns.set("Na", 10);
        ns.set("grid_a", Array1::<f64>::zeros(10));
        let schema = NamespaceSchema::of(&ns);
        (ns, schema)
    }

    #[test]
    fn unchanged_namespace_passes() {
        let (ns, schema) = established();
        assert!(check_namespace("par", &schema, &ns, Growth::Forbidden).is_ok());
    }

    #[test]
    fn array_replaced_by_scalar_is_rejected() {
        let (mut ns, schema) = established();
        ns.set("grid_a", 1.0);

        let err = check_namespace("par", &schema, &ns, Growth::Forbidden).unwrap_err();

        assert_eq!(
            err,
            StructuralError::TypeMismatch {
                namespace: "par".into(),
                attribute: "grid_a".into(),
                expected: ValueKind::FloatArray,
                actual: ValueKind::Float,
            }
        );
        assert_eq!(err.attribute(), Some("grid_a"));
    }

    #[test]
    fn shape_change_with_same_rank_is_accepted() {
        let (mut ns, schema) = established();
        ns.set("grid_a", Array1::<f64>::zeros(20));

        assert!(check_namespace("par", &schema, &ns, Growth::Forbidden).is_ok());
    }

    #[test]
    fn rank_change_is_rejected() {
        let (mut ns, schema) = established();
        ns.set("grid_a", Array2::<f64>::zeros((2, 5)));

        let err = check_namespace("par", &schema, &ns, Growth::Forbidden).unwrap_err();
        assert!(matches!(
            err,
            StructuralError::RankMismatch {
                expected: 1,
                actual: 2,
                ..
            }
        ));
    }

    #[test]
    fn dtype_change_is_a_type_mismatch() {
        let (mut ns, schema) = established();
        ns.set("grid_a", array![1_i64, 2, 3]);

        let err = check_namespace("par", &schema, &ns, Growth::Forbidden).unwrap_err();
        assert!(matches!(
            err,
            StructuralError::TypeMismatch {
                expected: ValueKind::FloatArray,
                actual: ValueKind::IntArray,
                ..
            }
        ));
    }

    #[test]
    fn int_is_not_coerced_to_float() {
        let (mut ns, schema) = established();
        ns.set("beta", 1);

        assert!(check_namespace("par", &schema, &ns, Growth::Forbidden).is_err());
    }

    #[test]
    fn new_attributes_depend_on_growth() {
        let (mut ns, schema) = established();
        ns.set("sigma", 2.0);

        let err = check_namespace("par", &schema, &ns, Growth::Forbidden).unwrap_err();
        assert_eq!(
            err,
            StructuralError::UnknownAttribute {
                namespace: "par".into(),
                attribute: "sigma".into(),
            }
        );
        assert!(check_namespace("par", &schema, &ns, Growth::Permitted).is_ok());
    }

    #[test]
    fn assignments_are_checked_against_the_model_schema() {
        let (ns, _) = established();
        let schema = ModelSchema {
            namespaces: vec![("par".into(), NamespaceSchema::of(&ns))],
        };

        let beta = Value::from(0.9);
        let rho = Value::from(2.0);

        assert!(check_assignment(&schema, "par", "beta", &beta, Growth::Forbidden).is_ok());
        assert_eq!(
            check_assignment(&schema, "sol", "v", &beta, Growth::Permitted),
            Err(StructuralError::UnknownNamespace("sol".into()))
        );
        assert!(check_assignment(&schema, "par", "rho", &rho, Growth::Forbidden).is_err());
        assert!(check_assignment(&schema, "par", "rho", &rho, Growth::Permitted).is_ok());
    }

    #[test]
    fn missing_attributes_are_tolerated() {
        let (mut ns, schema) = established();
        ns.remove("Na");

        assert!(check_namespace("par", &schema, &ns, Growth::Forbidden).is_ok());
    }
}
