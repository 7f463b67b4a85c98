use crate::{
    error::{MarshalError, Result},
    image::corlib,
    memory::{read, write},
    runtime::runtime,
    types::Type,
    value::Value,
};
use std::{
    ffi::c_void,
    fmt::{Debug, Display, Formatter},
};

/// A typed raw pointer into runtime memory, indexable by element.
#[derive(Clone, Copy, PartialEq)]
pub struct Pointer {
    handle: *mut c_void,
    ty: Type,
}

// SAFETY: plain address wrapper plus a type handle, see Object.
unsafe impl Send for Pointer {}
unsafe impl Sync for Pointer {}

impl Pointer {
    pub fn new(handle: *mut c_void, ty: Type) -> Self {
        Self { handle, ty }
    }

    pub fn raw(&self) -> *mut c_void {
        self.handle
    }

    /// Gets the type of the elements this pointer walks over.
    pub fn ty(&self) -> Type {
        self.ty
    }

    pub fn is_null(&self) -> bool {
        self.handle.is_null()
    }

    fn element(&self, index: usize) -> *mut c_void {
        let stride = self.ty.class().array_element_size();
        self.handle.cast::<u8>().wrapping_add(index * stride).cast()
    }

    /// Gets the element at the given index.
    pub fn get(&self, index: usize) -> Result<Value> {
        read(self.element(index), &self.ty)
    }

    /// Sets the element at the given index.
    pub fn set(&self, index: usize, value: &Value) -> Result<()> {
        write(self.element(index), value, &self.ty)
    }

    /// Reads the given amount of elements starting at the given offset.
    pub fn read_elements(&self, length: usize, offset: usize) -> Result<Vec<Value>> {
        (offset..offset + length).map(|index| self.get(index)).collect()
    }

    /// Writes the given elements starting at the given offset.
    pub fn write_elements(&self, values: &[Value], offset: usize) -> Result<()> {
        for (index, value) in values.iter().enumerate() {
            self.set(offset + index, value)?;
        }
        Ok(())
    }
}

impl Debug for Pointer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Pointer({:#x}, {})", self.handle as usize, self.ty)
    }
}

impl Display for Pointer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.handle as usize)
    }
}

/// A pointer to a slot holding a value, used for by-reference parameters.
#[derive(Clone, Copy, PartialEq)]
pub struct Reference {
    handle: *mut c_void,
    ty: Type,
}

// SAFETY: as for Pointer.
unsafe impl Send for Reference {}
unsafe impl Sync for Reference {}

impl Reference {
    pub fn new(handle: *mut c_void, ty: Type) -> Self {
        Self { handle, ty }
    }

    pub fn raw(&self) -> *mut c_void {
        self.handle
    }

    pub fn ty(&self) -> Type {
        self.ty
    }

    pub fn is_null(&self) -> bool {
        self.handle.is_null()
    }

    /// Gets the value behind this reference.
    pub fn value(&self) -> Result<Value> {
        read(self.handle, &self.ty)
    }

    /// Sets the value behind this reference.
    pub fn set(&self, value: &Value) -> Result<()> {
        write(self.handle, value, &self.ty)
    }
}

impl Debug for Reference {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Reference({:#x}, {})", self.handle as usize, self.ty)
    }
}

impl Display for Reference {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_null() {
            return write!(f, "null");
        }
        match self.value() {
            Ok(value) => write!(f, "->{}", value),
            Err(_) => write!(f, "->{:#x}", self.handle as usize),
        }
    }
}

/// Creates a reference to the given value, backed by a freshly allocated
/// slot. Value types and pointers are already slot-shaped and reference their
/// own storage directly.
pub fn reference(value: &Value) -> Result<Reference> {
    let ty = match value {
        Value::ValueType(value_type) => return Ok(Reference::new(value_type.raw(), value_type.ty())),
        Value::Pointer(pointer) => return Ok(Reference::new(pointer.raw(), pointer.ty())),
        Value::Object(object) => object.class().ty(),
        Value::String(string) => string.object().class().ty(),
        Value::Array(array) => array.object().class().ty(),
        Value::Boolean(_) => corlib().class("System.Boolean")?.ty(),
        Value::Char(_) => corlib().class("System.Char")?.ty(),
        Value::SByte(_) => corlib().class("System.SByte")?.ty(),
        Value::Byte(_) => corlib().class("System.Byte")?.ty(),
        Value::Short(_) => corlib().class("System.Int16")?.ty(),
        Value::UShort(_) => corlib().class("System.UInt16")?.ty(),
        Value::Int(_) => corlib().class("System.Int32")?.ty(),
        Value::UInt(_) => corlib().class("System.UInt32")?.ty(),
        Value::Long(_) => corlib().class("System.Int64")?.ty(),
        Value::ULong(_) => corlib().class("System.UInt64")?.ty(),
        Value::Float(_) => corlib().class("System.Single")?.ty(),
        Value::Double(_) => corlib().class("System.Double")?.ty(),
        Value::NativePointer(_) => corlib().class("System.IntPtr")?.ty(),
        other => {
            return Err(MarshalError::IncompatibleValue {
                expected: "a referenceable value",
                type_name: other.to_string(),
            }
            .into())
        }
    };

    let slot = runtime().alloc(size_of::<usize>());
    write(slot, value, &ty)?;
    Ok(Reference::new(slot, ty))
}
