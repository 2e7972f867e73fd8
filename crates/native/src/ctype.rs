use std::{fmt, mem};

use econ_model_core::{FieldType, ValueKind};

/// The C type a namespace attribute is passed as.
///
/// Arrays of any rank are passed as a pointer to their first element in
/// row-major order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CType {
    Double,
    Int64,
    Bool,
    CharPtr,
    DoublePtr,
    Int64Ptr,
    BoolPtr,
}

impl CType {
    /// Returns the C type for a field, or `None` for lists.
    #[must_use]
    pub fn for_field(ty: FieldType) -> Option<Self> {
        match ty.kind {
            ValueKind::Float => Some(CType::Double),
            ValueKind::Int => Some(CType::Int64),
            ValueKind::Bool => Some(CType::Bool),
            ValueKind::Text => Some(CType::CharPtr),
            ValueKind::FloatArray => Some(CType::DoublePtr),
            ValueKind::IntArray => Some(CType::Int64Ptr),
            ValueKind::BoolArray => Some(CType::BoolPtr),
            ValueKind::List => None,
        }
    }

    /// Returns the size of this type in bytes.
    #[must_use]
    pub fn size(self) -> usize {
        match self {
            CType::Double => mem::size_of::<f64>(),
            CType::Int64 => mem::size_of::<i64>(),
            CType::Bool => mem::size_of::<bool>(),
            CType::CharPtr | CType::DoublePtr | CType::Int64Ptr | CType::BoolPtr => {
                mem::size_of::<*const u8>()
            }
        }
    }

    /// Returns the alignment of this type in bytes.
    #[must_use]
    pub fn alignment(self) -> usize {
        match self {
            CType::Double => mem::align_of::<f64>(),
            CType::Int64 => mem::align_of::<i64>(),
            CType::Bool => mem::align_of::<bool>(),
            CType::CharPtr | CType::DoublePtr | CType::Int64Ptr | CType::BoolPtr => {
                mem::align_of::<*const u8>()
            }
        }
    }

    /// Returns the C spelling of this type.
    #[must_use]
    pub fn c_name(self) -> &'static str {
        match self {
            CType::Double => "double",
            CType::Int64 => "int64_t",
            CType::Bool => "bool",
            CType::CharPtr => "char*",
            CType::DoublePtr => "double*",
            CType::Int64Ptr => "int64_t*",
            CType::BoolPtr => "bool*",
        }
    }

    /// Returns `true` for the pointer types.
    #[must_use]
    pub fn is_pointer(self) -> bool {
        !matches!(self, CType::Double | CType::Int64 | CType::Bool)
    }
}

impl fmt::Display for CType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.c_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arrays_of_any_rank_are_pointers() {
        for ndim in 1..4 {
            let ty = FieldType::array(ValueKind::FloatArray, ndim);
            assert_eq!(CType::for_field(ty), Some(CType::DoublePtr));
        }
        assert!(CType::Int64Ptr.is_pointer());
        assert!(!CType::Bool.is_pointer());
    }

    #[test]
    fn lists_have_no_c_type() {
        assert_eq!(CType::for_field(FieldType::scalar(ValueKind::List)), None);
    }

    #[test]
    fn sizes_match_c() {
        assert_eq!(CType::Double.size(), 8);
        assert_eq!(CType::Int64.alignment(), 8);
        assert_eq!(CType::Bool.size(), 1);
        assert_eq!(CType::CharPtr.to_string(), "char*");
    }
}
