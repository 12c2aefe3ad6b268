//! Owned strings allocated on the far side of the ABI.

use std::borrow::Cow;
use std::ffi::{c_char, CStr};
use std::fmt;
use std::ptr::NonNull;
use std::str::Utf8Error;

use crate::ffi::ReleaseFn;

/// A NUL-terminated string allocated by the extension module.
///
/// Ownership moves to the host when an entry point returns. The buffer stays
/// readable until the value is released, either through [`release`] or by
/// dropping it, and is handed back to `release_fn` exactly once.
///
/// [`release`]: ForeignString::release
pub struct ForeignString {
    ptr: NonNull<c_char>,
    release_fn: ReleaseFn,
}

// The buffer is exclusively owned and never mutated after adoption.
unsafe impl Send for ForeignString {}
unsafe impl Sync for ForeignString {}

impl ForeignString {
    /// Take ownership of a callee-allocated string.
    ///
    /// Returns `None` for a null pointer.
    ///
    /// # Safety
    /// `ptr` must be null or point to a NUL-terminated buffer that nothing
    /// else owns and that `release_fn` can free.
    pub unsafe fn adopt(ptr: *mut c_char, release_fn: ReleaseFn) -> Option<Self> {
        NonNull::new(ptr).map(|ptr| Self { ptr, release_fn })
    }

    pub fn as_c_str(&self) -> &CStr {
        // SAFETY: adopt() requires a NUL-terminated buffer, alive until drop.
        unsafe { CStr::from_ptr(self.ptr.as_ptr()) }
    }

    pub fn to_str(&self) -> Result<&str, Utf8Error> {
        self.as_c_str().to_str()
    }

    pub fn to_string_lossy(&self) -> Cow<'_, str> {
        self.as_c_str().to_string_lossy()
    }

    pub fn is_empty(&self) -> bool {
        self.as_c_str().to_bytes().is_empty()
    }

    /// Address of the underlying buffer, for identity checks only.
    pub fn addr(&self) -> usize {
        self.ptr.as_ptr() as usize
    }

    /// Hand the buffer back to its allocator.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for ForeignString {
    fn drop(&mut self) {
        // SAFETY: sole owner; the value cannot be used after drop.
        unsafe { (self.release_fn)(self.ptr.as_ptr().cast()) }
    }
}

impl fmt::Debug for ForeignString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ForeignString")
            .field(&self.to_string_lossy())
            .finish()
    }
}

impl fmt::Display for ForeignString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}
