use econ_model_core::{FieldSpec, NamespaceSchema};

use crate::{CType, UnsupportedFieldError};

/// The C memory layout of one namespace struct.
///
/// Fields appear in namespace order with natural alignment and padding, and
/// the total size is rounded up to the struct's alignment, as a C compiler
/// lays out the matching `typedef struct`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructLayout {
    /// Name of the C struct.
    pub name: String,
    /// Fields in declaration order.
    pub fields: Vec<Field>,
    /// Total size in bytes.
    pub size: usize,
    /// Alignment in bytes.
    pub alignment: usize,
}

/// One field of a [`StructLayout`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub ctype: CType,
    pub offset: usize,
}

/// Problems found when validating a layout.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// The structure's alignment is not a power of two.
    #[error("struct alignment is not a power of two")]
    InvalidAlignment,
    /// A field's offset is misaligned.
    #[error("field {field} is misaligned")]
    MisalignedField { field: String },
    /// A field's range exceeds the structure's size.
    #[error("field {field} extends past the end of the struct")]
    FieldOutOfBounds { field: String },
    /// Two fields overlap in memory.
    #[error("fields {field1} and {field2} overlap")]
    OverlappingFields { field1: String, field2: String },
}

impl StructLayout {
    /// Computes the layout of `namespace` from its schema.
    ///
    /// # Errors
    ///
    /// Returns an [`UnsupportedFieldError`] for a field without a C type.
    pub fn from_schema(
        namespace: &str,
        struct_name: impl Into<String>,
        schema: &NamespaceSchema,
    ) -> Result<Self, UnsupportedFieldError> {
        let mut fields = Vec::with_capacity(schema.len());
        let mut cursor = 0_usize;
        let mut alignment = 1_usize;

        for FieldSpec { name, ty } in &schema.fields {
            let ctype = CType::for_field(*ty).ok_or_else(|| UnsupportedFieldError {
                namespace: namespace.to_owned(),
                attribute: name.clone(),
                kind: ty.kind,
            })?;

            let offset = cursor.next_multiple_of(ctype.alignment());
            cursor = offset + ctype.size();
            alignment = alignment.max(ctype.alignment());

            fields.push(Field {
                name: name.clone(),
                ctype,
                offset,
            });
        }

        Ok(Self {
            name: struct_name.into(),
            fields,
            size: cursor.next_multiple_of(alignment),
            alignment,
        })
    }

    /// Returns the named field.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Validates the layout of the structure.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] if the alignment is not a power of two,
    /// or a field is misaligned, out of bounds or overlaps another.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.alignment.is_power_of_two() {
            return Err(ValidationError::InvalidAlignment);
        }

        let mut used_ranges: Vec<(usize, usize, &str)> = Vec::new();

        for field in &self.fields {
            let field_size = field.ctype.size();

            if field.offset % field.ctype.alignment() != 0 {
                return Err(ValidationError::MisalignedField {
                    field: field.name.clone(),
                });
            }

            let field_end = field.offset + field_size;
            if field_end > self.size {
                return Err(ValidationError::FieldOutOfBounds {
                    field: field.name.clone(),
                });
            }

            if let Some(&(_, _, other)) = used_ranges
                .iter()
                .find(|&&(start, end, _)| field.offset < end && start < field_end)
            {
                return Err(ValidationError::OverlappingFields {
                    field1: field.name.clone(),
                    field2: other.to_owned(),
                });
            }

            used_ranges.push((field.offset, field_end, &field.name));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use econ_model_core::{FieldType, ValueKind};

    use super::*;

    fn schema(fields: &[(&str, FieldType)]) -> NamespaceSchema {
        NamespaceSchema {
            fields: fields
                .iter()
                .map(|&(name, ty)| FieldSpec::new(name, ty))
                .collect(),
        }
    }

    #[test]
    fn padding_follows_c_rules() {
        let layout = StructLayout::from_schema(
            "par",
            "par_struct",
            &schema(&[
                ("do_print", FieldType::scalar(ValueKind::Bool)),
                ("beta", FieldType::scalar(ValueKind::Float)),
                ("flag", FieldType::scalar(ValueKind::Bool)),
                ("grid_a", FieldType::array(ValueKind::FloatArray, 1)),
                ("last", FieldType::scalar(ValueKind::Bool)),
            ]),
        )
        .unwrap();

        let offsets: Vec<_> = layout.fields.iter().map(|f| f.offset).collect();
        assert_eq!(offsets, [0, 8, 16, 24, 32]);
        assert_eq!(layout.size, 40);
        assert_eq!(layout.alignment, 8);
        assert!(layout.validate().is_ok());
    }

    #[test]
    fn bools_pack_together() {
        let layout = StructLayout::from_schema(
            "sim",
            "sim_struct",
            &schema(&[
                ("a", FieldType::scalar(ValueKind::Bool)),
                ("b", FieldType::scalar(ValueKind::Bool)),
                ("c", FieldType::scalar(ValueKind::Bool)),
            ]),
        )
        .unwrap();

        assert_eq!(layout.size, 3);
        assert_eq!(layout.alignment, 1);
        assert_eq!(layout.field("c").map(|f| f.offset), Some(2));
    }

    #[test]
    fn empty_namespace_has_zero_size() {
        let layout =
            StructLayout::from_schema("sim", "sim_struct", &NamespaceSchema::default()).unwrap();
        assert_eq!(layout.size, 0);
        assert!(layout.validate().is_ok());
    }

    #[test]
    fn lists_are_unsupported() {
        let err = StructLayout::from_schema(
            "par",
            "par_struct",
            &schema(&[("shocks", FieldType::scalar(ValueKind::List))]),
        )
        .unwrap_err();

        assert_eq!(err.attribute, "shocks");
        assert_eq!(err.kind, ValueKind::List);
    }

    #[test]
    fn validate_catches_broken_layouts() {
        let field = |name: &str, ctype, offset| Field {
            name: name.into(),
            ctype,
            offset,
        };

        let invalid_cases = [
            (
                StructLayout {
                    name: "s".into(),
                    fields: vec![field("flag", CType::Bool, 0), field("overlap", CType::Bool, 0)],
                    size: 8,
                    alignment: 8,
                },
                ValidationError::OverlappingFields {
                    field1: "overlap".into(),
                    field2: "flag".into(),
                },
            ),
            (
                StructLayout {
                    name: "s".into(),
                    fields: vec![field("flag", CType::Bool, 0), field("x", CType::Double, 4)],
                    size: 16,
                    alignment: 8,
                },
                ValidationError::MisalignedField { field: "x".into() },
            ),
            (
                StructLayout {
                    name: "s".into(),
                    fields: vec![field("x", CType::Double, 24)],
                    size: 28,
                    alignment: 8,
                },
                ValidationError::FieldOutOfBounds { field: "x".into() },
            ),
            (
                StructLayout {
                    name: "s".into(),
                    fields: vec![field("flag", CType::Bool, 0)],
                    size: 16,
                    alignment: 3,
                },
                ValidationError::InvalidAlignment,
            ),
        ];

        for (layout, expected) in invalid_cases {
            assert_eq!(layout.validate().unwrap_err(), expected);
        }
    }
}
