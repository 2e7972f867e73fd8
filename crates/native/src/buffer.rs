use std::{
    alloc::{Layout, alloc_zeroed, dealloc},
    mem,
};

/// Errors that can occur when creating or writing a [`StructBuffer`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BufferError {
    /// The allocation failed.
    #[error("cannot allocate {requested} bytes")]
    SizeTooLarge { requested: usize },
    /// The requested alignment is not a power of two.
    #[error("alignment {alignment} is not a power of two")]
    BadAlignment { alignment: usize },
    /// A write would not fit or would be misaligned at the given offset.
    #[error("cannot place {len} bytes at offset {offset}")]
    BadOffset { offset: usize, len: usize },
}

/// A zeroed, heap-allocated buffer holding one C struct.
///
/// # Safety
///
/// Unsafe operations are used in:
/// - Allocation: memory is allocated with the requested size and alignment.
/// - Writes: every write is bounds and alignment checked first.
/// - Deallocation: memory is freed with the layout it was allocated with.
pub(crate) struct StructBuffer {
    ptr: *mut u8,
    layout: Layout,
    size: usize,
}

impl StructBuffer {
    pub(crate) fn new(size: usize, alignment: usize) -> Result<Self, BufferError> {
        if !alignment.is_power_of_two() {
            return Err(BufferError::BadAlignment { alignment });
        }

        // Zero-sized allocations are not allowed, and empty structs still get
        // passed by address.
        let layout = Layout::from_size_align(size.max(1), alignment)
            .map_err(|_| BufferError::SizeTooLarge { requested: size })?;

        let ptr = unsafe { alloc_zeroed(layout) };
        if ptr.is_null() {
            return Err(BufferError::SizeTooLarge { requested: size });
        }

        Ok(Self { ptr, layout, size })
    }

    /// Writes `value` at `offset`.
    pub(crate) fn write<T: Copy>(&mut self, offset: usize, value: T) -> Result<(), BufferError> {
        let len = mem::size_of::<T>();
        let fits = offset
            .checked_add(len)
            .is_some_and(|end| end <= self.size);
        let aligned = (self.ptr as usize + offset) % mem::align_of::<T>() == 0;
        if !fits || !aligned {
            return Err(BufferError::BadOffset { offset, len });
        }

        unsafe { self.ptr.add(offset).cast::<T>().write(value) };
        Ok(())
    }

    pub(crate) fn as_mut_ptr(&mut self) -> *mut u8 {
        self.ptr
    }

    #[cfg(test)]
    pub(crate) fn read<T: Copy>(&self, offset: usize) -> T {
        assert!(offset + mem::size_of::<T>() <= self.size);
        unsafe { self.ptr.add(offset).cast::<T>().read() }
    }
}

impl Drop for StructBuffer {
    fn drop(&mut self) {
        unsafe { dealloc(self.ptr, self.layout) };
    }
}

impl std::fmt::Debug for StructBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StructBuffer")
            .field("size", &self.size)
            .field("alignment", &self.layout.align())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_zeroed_and_aligned() {
        let mut buffer = StructBuffer::new(32, 8).unwrap();
        assert_eq!(buffer.as_mut_ptr() as usize % 8, 0);
        assert_eq!(buffer.read::<f64>(8), 0.0);
        assert_eq!(buffer.read::<u64>(24), 0);
    }

    #[test]
    fn writes_are_checked() {
        let mut buffer = StructBuffer::new(16, 8).unwrap();

        buffer.write(8, 2.5_f64).unwrap();
        assert_eq!(buffer.read::<f64>(8), 2.5);

        assert_eq!(
            buffer.write(12, 1_i64),
            Err(BufferError::BadOffset { offset: 12, len: 8 })
        );
        assert_eq!(
            buffer.write(4, 1_i64),
            Err(BufferError::BadOffset { offset: 4, len: 8 })
        );
    }

    #[test]
    fn empty_structs_still_allocate() {
        let mut buffer = StructBuffer::new(0, 1).unwrap();
        assert!(!buffer.as_mut_ptr().is_null());
        assert!(buffer.write(0, true).is_err());
    }

    #[test]
    fn invalid_alignment() {
        let result = StructBuffer::new(128, 3);
        assert!(matches!(result, Err(BufferError::BadAlignment { .. })));
    }
}
