use std::{ffi::CString, marker::PhantomData};

use econ_model_core::{Namespace, Value};
use ndarray::ArrayD;

use crate::{CType, CallError, StructLayout, buffer::StructBuffer};

/// A C struct describing one namespace, pointing into the namespace's own
/// array storage.
///
/// Scalars are copied into the struct; arrays are passed by address, so
/// element writes made by native code land directly in the model. The view
/// mutably borrows the namespace, keeping those addresses valid.
#[derive(Debug)]
pub(crate) struct NativeView<'a> {
    buffer: StructBuffer,
    // Owns the strings the struct's `char*` fields point to.
    _texts: Vec<CString>,
    _namespace: PhantomData<&'a mut Namespace>,
}

impl<'a> NativeView<'a> {
    pub(crate) fn build(
        name: &str,
        layout: &StructLayout,
        namespace: &'a mut Namespace,
    ) -> Result<Self, CallError> {
        let mut buffer = StructBuffer::new(layout.size, layout.alignment)?;
        let mut texts = Vec::new();

        for field in &layout.fields {
            let mismatch = || CallError::FieldMismatch {
                namespace: name.to_owned(),
                attribute: field.name.clone(),
            };
            let value = namespace.get_mut(&field.name).ok_or_else(mismatch)?;

            match (field.ctype, value) {
                (CType::Double, Value::Float(v)) => buffer.write(field.offset, *v)?,
                (CType::Int64, Value::Int(v)) => buffer.write(field.offset, *v)?,
                (CType::Bool, Value::Bool(v)) => buffer.write(field.offset, *v)?,
                (CType::CharPtr, Value::Text(text)) => {
                    let text = CString::new(text.as_str()).map_err(|_| CallError::InvalidText {
                        namespace: name.to_owned(),
                        attribute: field.name.clone(),
                    })?;
                    buffer.write(field.offset, text.as_ptr())?;
                    texts.push(text);
                }
                (CType::DoublePtr, Value::FloatArray(array)) => {
                    buffer.write(field.offset, contiguous_ptr(array))?;
                }
                (CType::Int64Ptr, Value::IntArray(array)) => {
                    buffer.write(field.offset, contiguous_ptr(array))?;
                }
                (CType::BoolPtr, Value::BoolArray(array)) => {
                    buffer.write(field.offset, contiguous_ptr(array))?;
                }
                _ => return Err(mismatch()),
            }
        }

        Ok(Self {
            buffer,
            _texts: texts,
            _namespace: PhantomData,
        })
    }

    /// Address of the struct, valid while the view is alive.
    pub(crate) fn as_mut_ptr(&mut self) -> *mut u8 {
        self.buffer.as_mut_ptr()
    }

    #[cfg(test)]
    pub(crate) fn buffer(&self) -> &StructBuffer {
        &self.buffer
    }
}

/// Returns a pointer to the first element, reallocating in row-major order
/// first if the array is not already laid out that way.
fn contiguous_ptr<T: Clone>(array: &mut ArrayD<T>) -> *mut T {
    if !array.is_standard_layout() {
        let owned = array.as_standard_layout().into_owned();
        *array = owned;
    }
    array.as_mut_ptr()
}

#[cfg(test)]
mod tests {
    use econ_model_core::NamespaceSchema;
    use ndarray::{Array2, array};

    use super::*;

    fn namespace() -> Namespace {
        let mut ns = Namespace::new();
        ns.set("beta", 0.96);
        ns.set("do_print", true);
        ns.set("grid_a", array![1.0, 2.0, 3.0]);
        ns
    }

    #[test]
    fn scalars_by_value_and_arrays_by_address() {
        let mut ns = namespace();
        let layout =
            StructLayout::from_schema("par", "par_struct", &NamespaceSchema::of(&ns)).unwrap();
        let grid_ptr = ns.float_array_mut("grid_a").unwrap().as_mut_ptr();

        let view = NativeView::build("par", &layout, &mut ns).unwrap();

        assert_eq!(view.buffer().read::<f64>(0), 0.96);
        assert!(view.buffer().read::<bool>(8));
        assert_eq!(view.buffer().read::<*mut f64>(16), grid_ptr);
    }

    #[test]
    fn non_standard_arrays_are_made_contiguous() {
        let mut ns = Namespace::new();
        let c = Array2::from_shape_fn((2, 3), |(i, j)| (i * 3 + j) as f64);
        ns.set("c", c.t().as_standard_layout().into_owned().reversed_axes());
        let layout =
            StructLayout::from_schema("sol", "sol_struct", &NamespaceSchema::of(&ns)).unwrap();

        let view = NativeView::build("sol", &layout, &mut ns).unwrap();
        let ptr = view.buffer().read::<*const f64>(0);
        drop(view);

        let stored = ns.float_array("c").unwrap();
        assert!(stored.is_standard_layout());
        assert_eq!(stored, &c.into_dyn());
        assert_eq!(ptr, stored.as_ptr());
    }

    #[test]
    fn text_is_passed_as_c_string() {
        let mut ns = Namespace::new();
        ns.set("method", "egm");
        let layout =
            StructLayout::from_schema("par", "par_struct", &NamespaceSchema::of(&ns)).unwrap();

        let view = NativeView::build("par", &layout, &mut ns).unwrap();
        let text = unsafe {
            std::ffi::CStr::from_ptr(view.buffer().read::<*const std::ffi::c_char>(0))
        };
        assert_eq!(text.to_str(), Ok("egm"));
    }

    #[test]
    fn interior_nul_is_rejected() {
        let mut ns = Namespace::new();
        ns.set("method", "e\0gm");
        let layout =
            StructLayout::from_schema("par", "par_struct", &NamespaceSchema::of(&ns)).unwrap();

        let err = NativeView::build("par", &layout, &mut ns).unwrap_err();
        assert!(matches!(err, CallError::InvalidText { attribute, .. } if attribute == "method"));
    }

    #[test]
    fn changed_values_are_a_mismatch() {
        let mut ns = namespace();
        let layout =
            StructLayout::from_schema("par", "par_struct", &NamespaceSchema::of(&ns)).unwrap();
        ns.set("beta", 1);

        let err = NativeView::build("par", &layout, &mut ns).unwrap_err();
        assert!(matches!(err, CallError::FieldMismatch { attribute, .. } if attribute == "beta"));
    }
}
