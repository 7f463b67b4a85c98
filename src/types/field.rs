use crate::{
    abi,
    error::{InvocationError, Result},
    memory::{read, write},
    runtime::runtime,
    types::{Class, Type, TypeCategory},
    value::{Instance, Object, Value},
};
use bitflags::bitflags;
use std::{
    ffi::c_void,
    fmt::{Debug, Display, Formatter},
    hash::{Hash, Hasher},
    ptr::NonNull,
};

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct FieldAttributes: u32 {
        const FIELD_ACCESS_MASK = 0x0007;
        const PRIVATE = 0x0001;
        const FAMILY_AND_ASSEMBLY = 0x0002;
        const ASSEMBLY = 0x0003;
        const FAMILY = 0x0004;
        const FAMILY_OR_ASSEMBLY = 0x0005;
        const PUBLIC = 0x0006;
        const STATIC = 0x0010;
        const INIT_ONLY = 0x0020;
        const LITERAL = 0x0040;
        const NOT_SERIALIZED = 0x0080;
        const HAS_FIELD_RVA = 0x0100;
        const SPECIAL_NAME = 0x0200;
        const RT_SPECIAL_NAME = 0x0400;
        const HAS_FIELD_MARSHAL = 0x1000;
        const PINVOKE_IMPL = 0x2000;
        const HAS_DEFAULT = 0x8000;
    }
}

#[derive(Clone, Copy)]
pub struct Field {
    handle: NonNull<c_void>,
}

// SAFETY: Field wraps the address of a field record owned by the instrumented
// runtime; the record is immutable once initialized, so sharing the handle
// across threads is safe.
unsafe impl Send for Field {}
unsafe impl Sync for Field {}

impl Field {
    pub(crate) fn from_handle(handle: NonNull<c_void>) -> Self {
        Self { handle }
    }

    pub(crate) fn raw(&self) -> *mut c_void {
        self.handle.as_ptr()
    }

    /// Gets the class in which this field is defined.
    pub fn class(&self) -> Class {
        let handle = unsafe { runtime().api().field_get_parent()(self.raw()) };
        Class::from_raw(handle)
            .unwrap_or_else(|| panic!("field {} has a NULL declaring class", self.name()))
    }

    /// Gets the flags of this field.
    pub fn flags(&self) -> FieldAttributes {
        let raw = unsafe { runtime().api().field_get_flags()(self.raw()) };
        FieldAttributes::from_bits_retain(raw as u32)
    }

    /// Determines whether this field's value is known at compile time.
    pub fn is_literal(&self) -> bool {
        self.flags().contains(FieldAttributes::LITERAL)
    }

    pub fn is_static(&self) -> bool {
        self.flags().contains(FieldAttributes::STATIC)
    }

    /// Determines whether this field is thread static. The runtime marks
    /// those with a reserved offset, discovered once from a corlib field
    /// known to be thread static.
    pub fn is_thread_static(&self) -> bool {
        match abi::thread_static_offset(runtime()) {
            Ok(offset) => self.offset() == offset,
            Err(_) => false,
        }
    }

    /// Gets the access modifier of this field.
    pub fn modifier(&self) -> Option<&'static str> {
        let access = self.flags() & FieldAttributes::FIELD_ACCESS_MASK;
        if access == FieldAttributes::PRIVATE {
            Some("private")
        } else if access == FieldAttributes::FAMILY_AND_ASSEMBLY {
            Some("private protected")
        } else if access == FieldAttributes::ASSEMBLY {
            Some("internal")
        } else if access == FieldAttributes::FAMILY {
            Some("protected")
        } else if access == FieldAttributes::FAMILY_OR_ASSEMBLY {
            Some("protected internal")
        } else if access == FieldAttributes::PUBLIC {
            Some("public")
        } else {
            None
        }
    }

    /// Gets the name of this field.
    pub fn name(&self) -> String {
        let api = runtime().api();
        unsafe { api.read_string(api.field_get_name()(self.raw())) }
    }

    /// Gets the byte offset of this field within the instance layout.
    pub fn offset(&self) -> i32 {
        unsafe { runtime().api().field_get_offset()(self.raw()) }
    }

    /// Gets the type of this field.
    pub fn ty(&self) -> Type {
        let handle = unsafe { runtime().api().field_get_type()(self.raw()) };
        Type::from_raw(handle)
            .unwrap_or_else(|| panic!("field {} has a NULL type record", self.name()))
    }

    fn qualified_name(&self) -> String {
        format!("{}::{}", self.class().ty().name(), self.name())
    }

    /// Gets the value of this static field. Instance fields must be read
    /// through an instance-bound view instead.
    pub fn value(&self) -> Result<Value> {
        if !self.is_static() {
            return Err(InvocationError::InstanceFieldThroughClass {
                field: self.qualified_name(),
            }
            .into());
        }

        let rt = runtime();
        let ty = self.ty();
        let size = match ty.category() {
            Some(TypeCategory::ValueType | TypeCategory::GenericInstance) => {
                ty.class().value_type_size().max(size_of::<usize>())
            }
            _ => size_of::<usize>(),
        };

        let scratch = rt.alloc(size);
        unsafe { rt.api().field_static_get_value()(self.raw(), scratch) };

        read(scratch, &ty)
    }

    /// Sets the value of this static field. Thread static and literal fields
    /// cannot be altered.
    pub fn set_value(&self, value: &Value) -> Result<()> {
        if !self.is_static() {
            return Err(InvocationError::InstanceFieldThroughClass {
                field: self.qualified_name(),
            }
            .into());
        }

        if self.is_thread_static() || self.is_literal() {
            return Err(InvocationError::ImmutableField {
                field: self.name(),
            }
            .into());
        }

        let rt = runtime();
        let ty = self.ty();

        // Pointer-like values are handed over as they are, but boxed value
        // types (primitives included) must be unboxed first.
        let handle = match value {
            Value::Object(object) if ty.class().is_value_type() => {
                unsafe { rt.api().object_unbox()(object.raw()) }
            }
            Value::ValueType(value_type) => value_type.raw(),
            other => match other.raw_handle() {
                Some(handle) => handle,
                None => {
                    let scratch = rt.alloc(ty.class().value_type_size().max(size_of::<usize>()));
                    write(scratch, other, &ty)?;
                    scratch
                }
            },
        };

        unsafe { rt.api().field_static_set_value()(self.raw(), handle) };
        Ok(())
    }

    /// Binds this field to an instance so its value can be read and written
    /// through the instance's storage. Binding a static field is forbidden.
    pub fn bind(&self, instance: impl Into<Instance>) -> Result<BoundField> {
        if self.is_static() {
            return Err(InvocationError::StaticFieldBind {
                field: self.qualified_name(),
            }
            .into());
        }

        Ok(BoundField {
            field: *self,
            instance: instance.into(),
        })
    }
}

impl PartialEq for Field {
    fn eq(&self, other: &Self) -> bool {
        self.handle == other.handle
    }
}

impl Eq for Field {}

impl Hash for Field {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.handle.hash(state);
    }
}

impl Debug for Field {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Field({})", self.qualified_name())
    }
}

impl Display for Field {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_thread_static() {
            write!(f, "[ThreadStatic] ")?;
        }
        if self.is_static() {
            write!(f, "static ")?;
        }

        write!(f, "{} {}", self.ty().name(), self.name())?;

        if self.is_literal() {
            let rendered = self
                .value()
                .ok()
                .and_then(|value| match &value {
                    Value::ValueType(value_type) if self.ty().class().is_enum() => self
                        .ty()
                        .class()
                        .base_type()
                        .and_then(|base| read(value_type.raw(), &base).ok())
                        .map(|underlying| underlying.to_string()),
                    other => Some(other.to_string()),
                })
                .unwrap_or_default();
            write!(f, " = {}", rendered)?;
        }

        write!(f, ";")?;

        if !self.is_thread_static() && !self.is_literal() {
            write!(f, " // {:#x}", self.offset())?;
        }

        Ok(())
    }
}

/// A field bound to an instance. The target address is the instance address
/// plus the field offset, pulled back by the object header size when the
/// holder is a raw value-type payload rather than a boxed object.
#[derive(Clone)]
pub struct BoundField {
    field: Field,
    instance: Instance,
}

impl BoundField {
    pub fn field(&self) -> Field {
        self.field
    }

    fn address(&self) -> *mut c_void {
        let offset = self.field.offset() as isize
            - match self.instance {
                Instance::ValueType(_) => Object::header_size() as isize,
                Instance::Object(_) => 0,
            };

        self.instance.raw().cast::<u8>().wrapping_offset(offset).cast()
    }

    pub fn value(&self) -> Result<Value> {
        read(self.address(), &self.field.ty())
    }

    pub fn set(&self, value: &Value) -> Result<()> {
        write(self.address(), value, &self.field.ty())
    }
}

impl Display for BoundField {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.field)
    }
}
