use bstr::BStr;
use std::ops::Range;
use std::sync::Arc;

/// An immutable, reference counted byte buffer together with the
/// range of it that this handle refers to.
/// Slicing produces a new handle onto the same allocation, so every
/// node of a parsed message tree can refer back into the original
/// input without copying it.
#[derive(Clone)]
pub struct SharedBytes {
    data: Arc<[u8]>,
    range: Range<usize>,
}

impl SharedBytes {
    /// Returns a handle for a sub-range, where `slice_range` is relative
    /// to the start of this handle.
    pub fn slice(&self, slice_range: Range<usize>) -> Self {
        if slice_range.start > slice_range.end || slice_range.end > self.len() {
            panic!(
                "slice range {slice_range:?} is invalid for buffer of length {}",
                self.len()
            );
        }
        Self {
            data: Arc::clone(&self.data),
            range: self.range.start + slice_range.start..self.range.start + slice_range.end,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data[self.range.clone()]
    }

    pub fn len(&self) -> usize {
        self.range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    /// Position of the first byte of this handle within the
    /// buffer that it was originally created from
    pub fn offset(&self) -> usize {
        self.range.start
    }

    /// Returns true if both handles refer to the same allocation
    pub fn shares_buffer_with(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

impl std::ops::Deref for SharedBytes {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl AsRef<[u8]> for SharedBytes {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl PartialEq for SharedBytes {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl PartialEq<[u8]> for SharedBytes {
    fn eq(&self, other: &[u8]) -> bool {
        self.as_bytes() == other
    }
}

impl PartialEq<&[u8]> for SharedBytes {
    fn eq(&self, other: &&[u8]) -> bool {
        self.as_bytes() == *other
    }
}

impl PartialEq<&str> for SharedBytes {
    fn eq(&self, other: &&str) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl std::fmt::Debug for SharedBytes {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(fmt, "{:?}", BStr::new(self.as_bytes()))
    }
}

impl From<Vec<u8>> for SharedBytes {
    fn from(data: Vec<u8>) -> Self {
        let len = data.len();
        Self {
            data: data.into(),
            range: 0..len,
        }
    }
}

impl From<&[u8]> for SharedBytes {
    fn from(data: &[u8]) -> Self {
        Self {
            data: data.into(),
            range: 0..data.len(),
        }
    }
}

impl From<String> for SharedBytes {
    fn from(s: String) -> Self {
        s.into_bytes().into()
    }
}

impl From<&str> for SharedBytes {
    fn from(s: &str) -> Self {
        s.as_bytes().into()
    }
}
