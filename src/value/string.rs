use crate::{runtime::runtime, value::Object};
use std::{
    ffi::{c_void, CString},
    fmt::{Debug, Display, Formatter},
};

/// A runtime string instance: an object header followed by a length and
/// UTF-16 character data.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Il2CppString {
    handle: *mut c_void,
}

// SAFETY: plain address wrapper, see Object.
unsafe impl Send for Il2CppString {}
unsafe impl Sync for Il2CppString {}

impl Il2CppString {
    pub(crate) fn new(handle: *mut c_void) -> Self {
        Self { handle }
    }

    pub fn raw(&self) -> *mut c_void {
        self.handle
    }

    pub fn is_null(&self) -> bool {
        self.handle.is_null()
    }

    /// Gets the length of this string, in UTF-16 code units.
    pub fn len(&self) -> usize {
        unsafe { runtime().api().string_get_length()(self.handle) as usize }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Gets the content of this string.
    pub fn content(&self) -> Option<String> {
        if self.is_null() {
            return None;
        }

        let chars = unsafe { runtime().api().string_get_chars()(self.handle) };
        if chars.is_null() {
            return None;
        }

        let units = unsafe { std::slice::from_raw_parts(chars, self.len()) };
        Some(String::from_utf16_lossy(units))
    }

    /// Gets the encompassing object of this string.
    pub fn object(&self) -> Object {
        Object::new(self.handle)
    }
}

impl Debug for Il2CppString {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Il2CppString({:#x})", self.handle as usize)
    }
}

impl Display for Il2CppString {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.content() {
            Some(content) => write!(f, "\"{}\"", content),
            None => write!(f, "null"),
        }
    }
}

/// Creates a new runtime string with the given content.
pub fn string(content: &str) -> Il2CppString {
    let content = CString::new(content).unwrap_or_default();
    let handle = unsafe { runtime().api().string_new()(content.as_ptr()) };
    Il2CppString::new(handle)
}
