use crate::{
    abi,
    error::{MarshalError, ProbeError, Result},
    runtime::runtime,
    types::{Class, Type},
    value::{string, Object, Pointer, Value},
};
use std::{
    ffi::c_void,
    fmt::{Debug, Display, Formatter},
};
use tracing::debug;

/// A runtime array instance: an object header followed by bookkeeping and the
/// element storage.
///
/// The byte offset of the element storage is not exposed by the C API; it is
/// probed once per process by building an array with known content and
/// scanning for it.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Il2CppArray {
    handle: *mut c_void,
}

// SAFETY: plain address wrapper, see Object.
unsafe impl Send for Il2CppArray {}
unsafe impl Sync for Il2CppArray {}

impl Il2CppArray {
    pub(crate) fn new(handle: *mut c_void) -> Self {
        Self { handle }
    }

    pub fn from_raw(handle: *mut c_void) -> Option<Self> {
        if handle.is_null() {
            None
        } else {
            Some(Self { handle })
        }
    }

    pub fn raw(&self) -> *mut c_void {
        self.handle
    }

    pub fn is_null(&self) -> bool {
        self.handle.is_null()
    }

    /// Gets the total number of elements of this array.
    pub fn len(&self) -> usize {
        unsafe { runtime().api().array_get_length()(self.handle) as usize }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Gets the encompassing object of this array.
    pub fn object(&self) -> Object {
        Object::new(self.handle)
    }

    /// Gets the type of the elements of this array.
    pub fn element_type(&self) -> Type {
        self.object()
            .class()
            .base_type()
            .unwrap_or_else(|| panic!("array class {} has no element type", self.object().class().name()))
    }

    /// Gets the size of the elements of this array.
    pub fn element_size(&self) -> usize {
        self.element_type().class().array_element_size()
    }

    /// Gets a pointer to the first element of this array.
    pub fn elements(&self) -> Result<Pointer> {
        let offset = elements_offset()?;
        Ok(Pointer::new(
            self.handle.cast::<u8>().wrapping_add(offset).cast(),
            self.element_type(),
        ))
    }

    /// Gets the element at the given index.
    pub fn get(&self, index: usize) -> Result<Value> {
        self.check_bounds(index)?;
        self.elements()?.get(index)
    }

    /// Sets the element at the given index.
    pub fn set(&self, index: usize, value: &Value) -> Result<()> {
        self.check_bounds(index)?;
        self.elements()?.set(index, value)
    }

    /// Reads every element of this array.
    pub fn values(&self) -> Result<Vec<Value>> {
        self.elements()?.read_elements(self.len(), 0)
    }

    fn check_bounds(&self, index: usize) -> Result<()> {
        let length = self.len();
        if index >= length {
            return Err(MarshalError::OutOfBounds { index, length }.into());
        }
        Ok(())
    }
}

impl Debug for Il2CppArray {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Il2CppArray({:#x})", self.handle as usize)
    }
}

impl Display for Il2CppArray {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_null() {
            return write!(f, "null");
        }

        let rendered = self
            .values()
            .unwrap_or_default()
            .iter()
            .map(|value| value.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "[{}]", rendered)
    }
}

/// Creates a new array of the given element class holding the given elements.
pub fn array(class: &Class, elements: &[Value]) -> Result<Il2CppArray> {
    let handle = unsafe { runtime().api().array_new()(class.raw(), elements.len() as u32) };
    let array = Il2CppArray::new(handle);
    array.elements()?.write_elements(elements, 0)?;
    Ok(array)
}

/// The byte offset of the element storage within an array instance, probed
/// once per process: a single-character array with known content is built and
/// scanned for that character.
fn elements_offset() -> Result<usize> {
    let rt = runtime();
    if let Some(offset) = rt.array_elements_offset.get() {
        return Ok(*offset);
    }

    let probe = string("v").object().method("ToCharArray", 0)?.invoke(&[])?;
    let Value::Array(probe) = probe else {
        return Err(ProbeError::ArrayElements.into());
    };

    let offset = abi::scan_forward(probe.raw(), abi::SCAN_WINDOW, |candidate| {
        (unsafe { candidate.cast::<i16>().read_unaligned() }) == 'v' as i16
    })
    .ok_or(ProbeError::ArrayElements)?;

    debug!(offset, "probed the array elements offset");
    Ok(*rt.array_elements_offset.get_or_init(|| offset))
}
