//! Descriptors over the runtime's metadata records.
//!
//! Every descriptor is a non-owning handle: a copyable wrapper around the
//! address of a record the runtime itself owns and lays out. Equality is
//! address equality and derived properties are memoized process-wide, which
//! is sound because the metadata is immutable once the runtime has
//! initialized it.

use crate::{runtime::runtime, value::Object};
use std::{
    ffi::c_void,
    fmt::{Debug, Display, Formatter},
    hash::{Hash, Hasher},
    ptr::NonNull,
};

pub mod class;
pub mod field;
pub mod method;

pub use class::Class;
pub use field::{BoundField, Field, FieldAttributes};
pub use method::{BoundMethod, Method, MethodAttributes, OverloadHint, Parameter};

/// The category a native type record declares, as the fixed element-type
/// constants the runtime's metadata uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum TypeCategory {
    Void = 0x01,
    Boolean = 0x02,
    Char = 0x03,
    SByte = 0x04,
    Byte = 0x05,
    Short = 0x06,
    UShort = 0x07,
    Int = 0x08,
    UInt = 0x09,
    Long = 0x0a,
    ULong = 0x0b,
    Float = 0x0c,
    Double = 0x0d,
    String = 0x0e,
    Pointer = 0x0f,
    ByReference = 0x10,
    ValueType = 0x11,
    Class = 0x12,
    Var = 0x13,
    MultiArray = 0x14,
    GenericInstance = 0x15,
    TypedByRef = 0x16,
    NativeInt = 0x18,
    NativeUInt = 0x19,
    FunctionPointer = 0x1b,
    Object = 0x1c,
    Array = 0x1d,
    MethodVar = 0x1e,
}

impl TypeCategory {
    pub fn from_raw(raw: i32) -> Option<Self> {
        Some(match raw {
            0x01 => Self::Void,
            0x02 => Self::Boolean,
            0x03 => Self::Char,
            0x04 => Self::SByte,
            0x05 => Self::Byte,
            0x06 => Self::Short,
            0x07 => Self::UShort,
            0x08 => Self::Int,
            0x09 => Self::UInt,
            0x0a => Self::Long,
            0x0b => Self::ULong,
            0x0c => Self::Float,
            0x0d => Self::Double,
            0x0e => Self::String,
            0x0f => Self::Pointer,
            0x10 => Self::ByReference,
            0x11 => Self::ValueType,
            0x12 => Self::Class,
            0x13 => Self::Var,
            0x14 => Self::MultiArray,
            0x15 => Self::GenericInstance,
            0x16 => Self::TypedByRef,
            0x18 => Self::NativeInt,
            0x19 => Self::NativeUInt,
            0x1b => Self::FunctionPointer,
            0x1c => Self::Object,
            0x1d => Self::Array,
            0x1e => Self::MethodVar,
            _ => return None,
        })
    }
}

/// The primitive or aggregate shape a type occupies in a native call frame.
///
/// Primitives map one to one; strings, arrays, pointers and object references
/// take a single pointer slot; a value type expands to the shapes of its
/// non-static fields (an empty struct degrades to a single byte, matching the
/// ABI's empty-struct padding rule); an enum takes the shape of its
/// underlying integral type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AbiType {
    Void,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    Pointer,
    Aggregate(Vec<AbiType>),
}

#[derive(Clone, Copy)]
pub struct Type {
    handle: NonNull<c_void>,
}

// SAFETY: Type wraps the address of a type record owned by the instrumented
// runtime. The record is immutable once the runtime has initialized it, so
// concurrent reads from any thread are safe.
unsafe impl Send for Type {}
unsafe impl Sync for Type {}

impl Type {
    pub(crate) fn from_raw(handle: *mut c_void) -> Option<Self> {
        NonNull::new(handle).map(|handle| Self { handle })
    }

    pub(crate) fn raw(&self) -> *mut c_void {
        self.handle.as_ptr()
    }

    /// Gets the class of this type.
    pub fn class(&self) -> Class {
        let rt = runtime();
        let handle = unsafe { rt.api().type_get_class()(self.raw()) };
        Class::from_raw(handle)
            .unwrap_or_else(|| panic!("type {} resolved to a NULL class record", self.name()))
    }

    /// Gets the category of this type, read once from the native record.
    /// `None` means the record carries a category outside the known closed
    /// set; callers fall back to pointer-sized handling where that is safe.
    pub fn category(&self) -> Option<TypeCategory> {
        TypeCategory::from_raw(self.raw_category())
    }

    pub(crate) fn raw_category(&self) -> i32 {
        let rt = runtime();
        if let Some(cached) = rt.category_cache.get(&(self.raw() as usize)) {
            return *cached;
        }
        let raw = unsafe { rt.api().type_get_type_enum()(self.raw()) };
        rt.category_cache.insert(self.raw() as usize, raw);
        raw
    }

    /// The shape of this type in a native call frame.
    pub fn call_alias(&self) -> AbiType {
        let rt = runtime();
        if let Some(cached) = rt.alias_cache.get(&(self.raw() as usize)) {
            return cached.clone();
        }
        let alias = self.compute_call_alias();
        rt.alias_cache.insert(self.raw() as usize, alias.clone());
        alias
    }

    fn compute_call_alias(&self) -> AbiType {
        fn value_type_fields(ty: &Type) -> AbiType {
            let instance_fields: Vec<AbiType> = ty
                .class()
                .fields()
                .into_iter()
                .filter(|field| !field.is_static())
                .map(|field| field.ty().call_alias())
                .collect();

            if instance_fields.is_empty() {
                AbiType::Aggregate(vec![AbiType::I8])
            } else {
                AbiType::Aggregate(instance_fields)
            }
        }

        fn enum_alias(ty: &Type) -> AbiType {
            match ty.class().base_type() {
                Some(base) => base.call_alias(),
                None => AbiType::Pointer,
            }
        }

        if self.is_by_reference() {
            return AbiType::Pointer;
        }

        match self.category() {
            Some(TypeCategory::Void) => AbiType::Void,
            Some(TypeCategory::Boolean) => AbiType::U8,
            Some(TypeCategory::Char) => AbiType::U16,
            Some(TypeCategory::SByte) => AbiType::I8,
            Some(TypeCategory::Byte) => AbiType::U8,
            Some(TypeCategory::Short) => AbiType::I16,
            Some(TypeCategory::UShort) => AbiType::U16,
            Some(TypeCategory::Int) => AbiType::I32,
            Some(TypeCategory::UInt) => AbiType::U32,
            Some(TypeCategory::Long) => AbiType::I64,
            Some(TypeCategory::ULong) => AbiType::U64,
            Some(TypeCategory::Float) => AbiType::F32,
            Some(TypeCategory::Double) => AbiType::F64,
            Some(
                TypeCategory::NativeInt
                | TypeCategory::NativeUInt
                | TypeCategory::Pointer
                | TypeCategory::String
                | TypeCategory::Array
                | TypeCategory::MultiArray,
            ) => AbiType::Pointer,
            Some(TypeCategory::ValueType) => {
                if self.class().is_enum() {
                    enum_alias(self)
                } else {
                    value_type_fields(self)
                }
            }
            Some(TypeCategory::Class | TypeCategory::Object | TypeCategory::GenericInstance) => {
                let class = self.class();
                if class.is_struct() {
                    value_type_fields(self)
                } else if class.is_enum() {
                    enum_alias(self)
                } else {
                    AbiType::Pointer
                }
            }
            _ => AbiType::Pointer,
        }
    }

    /// Determines whether this type is passed by reference.
    pub fn is_by_reference(&self) -> bool {
        self.name().ends_with('&')
    }

    /// Determines whether this type is primitive.
    pub fn is_primitive(&self) -> bool {
        matches!(
            self.category(),
            Some(
                TypeCategory::Boolean
                    | TypeCategory::Char
                    | TypeCategory::SByte
                    | TypeCategory::Byte
                    | TypeCategory::Short
                    | TypeCategory::UShort
                    | TypeCategory::Int
                    | TypeCategory::UInt
                    | TypeCategory::Long
                    | TypeCategory::ULong
                    | TypeCategory::Float
                    | TypeCategory::Double
                    | TypeCategory::NativeInt
                    | TypeCategory::NativeUInt
            )
        )
    }

    /// Gets the display name of this type.
    pub fn name(&self) -> String {
        let rt = runtime();
        let chars = unsafe { rt.api().type_get_name()(self.raw()) };
        unsafe { rt.api().read_owned_string(chars) }
    }

    /// Gets the reflection `System.Type` instance for this type.
    pub fn object(&self) -> Object {
        let rt = runtime();
        Object::new(unsafe { rt.api().type_get_object()(self.raw()) })
    }

    /// Determines whether this type represents the same type as `other`.
    pub fn is(&self, other: &Type) -> bool {
        self.handle == other.handle || self.name() == other.name()
    }
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        self.handle == other.handle
    }
}

impl Eq for Type {}

impl Hash for Type {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.handle.hash(state);
    }
}

impl Debug for Type {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Type({})", self.name())
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
