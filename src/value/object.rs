use crate::{
    error::{LookupError, MarshalError, Result},
    image::corlib,
    runtime::runtime,
    types::{BoundField, BoundMethod, Class, Method, Type},
    value::Value,
};
use std::{
    ffi::c_void,
    fmt::{Debug, Display, Formatter},
};

/// A reference-type instance: a pointer to a runtime object header followed
/// by the field payload. The instance is owned by the runtime's garbage
/// collector; this wrapper owns nothing.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Object {
    handle: *mut c_void,
}

// SAFETY: the wrapper is a plain address; whether the pointee may be touched
// concurrently is governed by the instrumented runtime, not by this type.
unsafe impl Send for Object {}
unsafe impl Sync for Object {}

impl Object {
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

    /// Gets the object header size, that is the size of a plain
    /// `System.Object` instance.
    pub fn header_size() -> usize {
        let rt = runtime();
        *rt.header_size.get_or_init(|| {
            corlib()
                .try_class("System.Object")
                .unwrap_or_else(|| panic!("couldn't find System.Object in the core library"))
                .instance_size()
        })
    }

    /// Gets the class of this object.
    pub fn class(&self) -> Class {
        let handle = unsafe { runtime().api().object_get_class()(self.handle) };
        Class::from_raw(handle)
            .unwrap_or_else(|| panic!("object {:#x} has a NULL class", self.handle as usize))
    }

    /// Gets the size of this object.
    pub fn size(&self) -> usize {
        unsafe { runtime().api().object_get_size()(self.handle) as usize }
    }

    /// Gets the non-static field with the given name in this object's class
    /// hierarchy, bound to this object.
    pub fn field(&self, name: &str) -> Result<BoundField> {
        self.try_field(name).ok_or_else(|| {
            LookupError::Field {
                name: name.to_string(),
                class: self.class().full_name(),
            }
            .into()
        })
    }

    /// Gets the non-static field with the given name in this object's class
    /// hierarchy, bound to this object, if it exists.
    pub fn try_field(&self, name: &str) -> Option<BoundField> {
        let field = self.class().try_field(name);

        match field {
            Some(field) if field.is_static() => {
                // A class cannot declare a static and a non-static field with
                // the same name, so continue the search at the parent.
                for class in self.class().hierarchy().skip(1) {
                    for field in class.fields() {
                        if field.name() == name && !field.is_static() {
                            return field.bind(*self).ok();
                        }
                    }
                }
                None
            }
            Some(field) => field.bind(*self).ok(),
            None => None,
        }
    }

    /// Gets the non-static method with the given name (and parameter count,
    /// `-1` to ignore it) in this object's class hierarchy, bound to this
    /// object.
    pub fn method(&self, name: &str, parameter_count: i32) -> Result<BoundMethod> {
        self.try_method(name, parameter_count).ok_or_else(|| {
            LookupError::Method {
                name: name.to_string(),
                class: self.class().full_name(),
            }
            .into()
        })
    }

    /// Gets the non-static method with the given name (and parameter count,
    /// `-1` to ignore it) in this object's class hierarchy, bound to this
    /// object, if it exists.
    pub fn try_method(&self, name: &str, parameter_count: i32) -> Option<BoundMethod> {
        let method = self.class().try_method(name, parameter_count);

        match method {
            Some(method) if method.is_static() => {
                for class in self.class().hierarchy() {
                    for method in class.methods() {
                        if method.name() == name
                            && !method.is_static()
                            && (parameter_count < 0
                                || method.parameter_count() == parameter_count as usize)
                        {
                            return method.bind(*self).ok();
                        }
                    }
                }
                None
            }
            Some(method) => method.bind(*self).ok(),
            None => None,
        }
    }

    /// Resolves the implementation of the given (possibly abstract or
    /// interface) method for this object's actual class, bound to this
    /// object.
    pub fn virtual_method(&self, method: &Method) -> Result<BoundMethod> {
        let handle =
            unsafe { runtime().api().object_get_virtual_method()(self.handle, method.raw()) };
        let resolved = Method::from_raw(handle).ok_or_else(|| LookupError::Method {
            name: method.name(),
            class: self.class().full_name(),
        })?;
        resolved.bind(*self)
    }

    /// Unboxes the value type (a primitive, a struct or an enum) carried by
    /// this object.
    pub fn unbox(&self) -> Result<ValueType> {
        let class = self.class();
        if !class.is_value_type() {
            return Err(MarshalError::IncompatibleValue {
                expected: "value type",
                type_name: class.ty().name(),
            }
            .into());
        }

        let payload = unsafe { runtime().api().object_unbox()(self.handle) };
        Ok(ValueType::new(payload, class.ty()))
    }

    /// Renders this object through its managed `ToString`, when that is
    /// callable.
    pub fn try_to_string(&self) -> Option<String> {
        let result = self.try_method("ToString", 0)?.invoke(&[]).ok()?;
        match result {
            Value::String(string) => string.content(),
            _ => None,
        }
    }
}

impl Debug for Object {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Object({:#x})", self.handle as usize)
    }
}

impl Display for Object {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_null() {
            return write!(f, "null");
        }
        match self.try_to_string() {
            Some(content) => write!(f, "{}", content),
            None => write!(f, "{:#x}", self.handle as usize),
        }
    }
}

/// A value-type instance: a pointer straight at the field payload, with no
/// object header in front of it.
#[derive(Clone, Copy, PartialEq)]
pub struct ValueType {
    handle: *mut c_void,
    ty: Type,
}

// SAFETY: as for Object, the wrapper is a plain address plus a type handle.
unsafe impl Send for ValueType {}
unsafe impl Sync for ValueType {}

impl ValueType {
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

    /// Boxes this value type into a reference-type instance.
    pub fn box_value(&self) -> Object {
        let handle =
            unsafe { runtime().api().value_box()(self.ty.class().raw(), self.handle) };
        Object::new(handle)
    }

    /// Gets the field with the given name, bound to this instance.
    pub fn field(&self, name: &str) -> Result<BoundField> {
        self.ty.class().field(name)?.bind(*self)
    }

    /// Gets the field with the given name, bound to this instance, if it
    /// exists.
    pub fn try_field(&self, name: &str) -> Option<BoundField> {
        self.ty
            .class()
            .try_field(name)
            .and_then(|field| field.bind(*self).ok())
    }

    /// Gets the method with the given name (and parameter count, `-1` to
    /// ignore it), bound to this instance.
    pub fn method(&self, name: &str, parameter_count: i32) -> Result<BoundMethod> {
        self.ty
            .class()
            .method(name, parameter_count)?
            .bind(*self)
    }

    /// Gets the method with the given name (and parameter count, `-1` to
    /// ignore it), bound to this instance, if it exists.
    pub fn try_method(&self, name: &str, parameter_count: i32) -> Option<BoundMethod> {
        self.ty
            .class()
            .try_method(name, parameter_count)
            .and_then(|method| method.bind(*self).ok())
    }
}

impl Debug for ValueType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "ValueType({:#x}, {})", self.handle as usize, self.ty)
    }
}

impl Display for ValueType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_null() {
            return write!(f, "null");
        }

        let rendered = self
            .try_method("ToString", 0)
            .and_then(|to_string| {
                // A ToString defined on the value type class itself avoids a
                // boxing operation.
                if to_string.method().class().is_value_type() {
                    match to_string.invoke(&[]) {
                        Ok(Value::String(string)) => string.content(),
                        _ => None,
                    }
                } else {
                    self.box_value().try_to_string()
                }
            });

        match rendered {
            Some(content) => write!(f, "{}", content),
            None => write!(f, "{:#x}", self.handle as usize),
        }
    }
}
