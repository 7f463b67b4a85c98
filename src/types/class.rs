use crate::{
    error::{InvocationError, LookupError, Result},
    image::{corlib, Image},
    runtime::runtime,
    types::{Field, Method, Type},
    value::{array, Object, Value},
};
use std::{
    ffi::{c_void, CString},
    fmt::{Debug, Display, Formatter},
    hash::{Hash, Hasher},
    ptr::NonNull,
};

/// Drains one of the runtime's iterator-style enumeration callbacks into an
/// ordered sequence. Enumeration order is declaration order as reported by
/// the runtime.
fn drain_enumerator(
    mut next: impl FnMut(*mut *mut c_void) -> *mut c_void,
) -> Vec<NonNull<c_void>> {
    let mut iter: *mut c_void = std::ptr::null_mut();
    let mut items = Vec::new();

    loop {
        let item = next(&mut iter);
        match NonNull::new(item) {
            Some(item) => items.push(item),
            None => break,
        }
    }

    items
}

#[derive(Clone, Copy)]
pub struct Class {
    handle: NonNull<c_void>,
}

// SAFETY: Class wraps the address of a class record owned by the instrumented
// runtime; the record is immutable once initialized, so sharing the handle
// across threads is safe.
unsafe impl Send for Class {}
unsafe impl Sync for Class {}

impl Class {
    pub(crate) fn from_raw(handle: *mut c_void) -> Option<Self> {
        NonNull::new(handle).map(|handle| Self { handle })
    }

    pub(crate) fn raw(&self) -> *mut c_void {
        self.handle.as_ptr()
    }

    /// Gets the size of the object encompassed by an array of this class.
    pub fn array_element_size(&self) -> usize {
        unsafe { runtime().api().class_get_array_element_size()(self.raw()) as usize }
    }

    /// Gets the encompassed type of this array, pointer or enum class.
    pub fn base_type(&self) -> Option<Type> {
        Type::from_raw(unsafe { runtime().api().class_get_base_type()(self.raw()) })
    }

    /// Gets the class of the element encompassed or referred to by this
    /// array, pointer or reference class.
    pub fn element_class(&self) -> Option<Class> {
        Class::from_raw(unsafe { runtime().api().class_get_element_class()(self.raw()) })
    }

    /// Gets the fields of this class, in declaration order.
    pub fn fields(&self) -> Vec<Field> {
        let api = runtime().api();
        drain_enumerator(|iter| unsafe { api.class_get_fields()(self.raw(), iter) })
            .into_iter()
            .map(Field::from_handle)
            .collect()
    }

    pub fn flags(&self) -> i32 {
        unsafe { runtime().api().class_get_flags()(self.raw()) }
    }

    /// Gets the full name (namespace plus name) of this class.
    pub fn full_name(&self) -> String {
        let namespace = self.namespace();
        if namespace.is_empty() {
            self.name()
        } else {
            format!("{}.{}", namespace, self.name())
        }
    }

    /// Gets the generic arguments of this generic class.
    pub fn generics(&self) -> Result<Vec<Class>> {
        if !self.is_generic() && !self.is_inflated() {
            return Ok(Vec::new());
        }

        let types = self
            .ty()
            .object()
            .method("GetGenericArguments", 0)?
            .invoke(&[])?;

        let Value::Array(types) = types else {
            return Ok(Vec::new());
        };

        let api = runtime().api();
        let mut generics = Vec::with_capacity(types.len());
        for index in 0..types.len() {
            if let Value::Object(object) = types.get(index)? {
                let handle = unsafe { api.class_from_system_type()(object.raw()) };
                if let Some(class) = Class::from_raw(handle) {
                    generics.push(class);
                }
            }
        }

        Ok(generics)
    }

    /// Gets the image in which this class is defined.
    pub fn image(&self) -> Image {
        Image::from_handle(unsafe { runtime().api().class_get_image()(self.raw()) })
    }

    /// Gets the size of an instance of this class.
    pub fn instance_size(&self) -> usize {
        unsafe { runtime().api().class_get_instance_size()(self.raw()) as usize }
    }

    /// Gets the interfaces implemented or inherited by this class.
    pub fn interfaces(&self) -> Vec<Class> {
        let api = runtime().api();
        drain_enumerator(|iter| unsafe { api.class_get_interfaces()(self.raw(), iter) })
            .into_iter()
            .map(|handle| Class { handle })
            .collect()
    }

    pub fn is_abstract(&self) -> bool {
        unsafe { runtime().api().class_is_abstract()(self.raw()) }
    }

    /// Determines whether an instance of `other` can be assigned to a
    /// variable of this class. Delegates to the runtime's own assignability
    /// check.
    pub fn is_assignable_from(&self, other: &Class) -> bool {
        unsafe { runtime().api().class_is_assignable_from()(self.raw(), other.raw()) }
    }

    pub fn is_blittable(&self) -> bool {
        unsafe { runtime().api().class_is_blittable()(self.raw()) }
    }

    pub fn is_enum(&self) -> bool {
        unsafe { runtime().api().class_is_enum()(self.raw()) }
    }

    pub fn is_generic(&self) -> bool {
        unsafe { runtime().api().class_is_generic()(self.raw()) }
    }

    pub fn is_inflated(&self) -> bool {
        unsafe { runtime().api().class_is_inflated()(self.raw()) }
    }

    pub fn is_interface(&self) -> bool {
        unsafe { runtime().api().class_is_interface()(self.raw()) }
    }

    /// Determines whether this class is a struct, that is a non-enum value
    /// type.
    pub fn is_struct(&self) -> bool {
        self.is_value_type() && !self.is_enum()
    }

    /// Determines whether this class derives from `other`.
    pub fn is_subclass_of(&self, other: &Class, include_interfaces: bool) -> bool {
        unsafe {
            runtime().api().class_is_subclass_of()(self.raw(), other.raw(), include_interfaces)
        }
    }

    pub fn is_value_type(&self) -> bool {
        unsafe { runtime().api().class_is_value_type()(self.raw()) }
    }

    /// Gets the methods implemented by this class, in declaration order.
    pub fn methods(&self) -> Vec<Method> {
        let api = runtime().api();
        drain_enumerator(|iter| unsafe { api.class_get_methods()(self.raw(), iter) })
            .into_iter()
            .map(Method::from_handle)
            .collect()
    }

    /// Gets the name of this class.
    pub fn name(&self) -> String {
        let api = runtime().api();
        unsafe { api.read_string(api.class_get_name()(self.raw())) }
    }

    /// Gets the namespace of this class.
    pub fn namespace(&self) -> String {
        let api = runtime().api();
        unsafe { api.read_string(api.class_get_namespace()(self.raw())) }
    }

    /// Gets the classes nested inside this class, in declaration order.
    pub fn nested_classes(&self) -> Vec<Class> {
        let api = runtime().api();
        drain_enumerator(|iter| unsafe { api.class_get_nested_types()(self.raw(), iter) })
            .into_iter()
            .map(|handle| Class { handle })
            .collect()
    }

    /// Gets the class from which this class directly inherits, terminating at
    /// the root object class.
    pub fn parent(&self) -> Option<Class> {
        Class::from_raw(unsafe { runtime().api().class_get_parent()(self.raw()) })
    }

    /// Iterates this class and its ancestors, most derived first.
    pub fn hierarchy(&self) -> impl Iterator<Item = Class> {
        std::iter::successors(Some(*self), |class| class.parent())
    }

    /// Gets the rank (number of dimensions) of this array class. The
    /// underlying C API does not expose the rank directly, so it is recovered
    /// from the bracketed dimension suffix of the display name.
    pub fn rank(&self) -> usize {
        let mut rank = 0;
        let name = self.name();
        let chars: Vec<char> = name.chars().collect();

        for i in (1..chars.len()).rev() {
            let c = chars[i];

            if c == ']' {
                rank += 1;
            } else if c == '[' || rank == 0 {
                break;
            } else if c == ',' {
                rank += 1;
            } else {
                break;
            }
        }

        rank
    }

    /// Gets a pointer to the static field storage of this class.
    pub fn static_fields_data(&self) -> *mut c_void {
        unsafe { runtime().api().class_get_static_field_data()(self.raw()) }
    }

    /// Gets the size of an instance of this class laid out as a value type.
    pub fn value_type_size(&self) -> usize {
        unsafe {
            runtime().api().class_get_value_type_size()(self.raw(), std::ptr::null_mut()) as usize
        }
    }

    /// Gets the type of this class.
    pub fn ty(&self) -> Type {
        let handle = unsafe { runtime().api().class_get_type()(self.raw()) };
        Type::from_raw(handle)
            .unwrap_or_else(|| panic!("class {} resolved to a NULL type record", self.name()))
    }

    /// Allocates a new, zeroed object of this class. The allocation is owned
    /// by the runtime's garbage collector.
    pub fn alloc(&self) -> Object {
        Object::new(unsafe { runtime().api().object_new()(self.raw()) })
    }

    /// Allocates a new object of this class and runs its parameterless
    /// constructor. An exception raised by the constructor becomes an error
    /// carrying the exception's rendering.
    pub fn new_instance(&self) -> Result<Object> {
        let object = self.alloc();

        let mut exception: *mut c_void = std::ptr::null_mut();
        unsafe { runtime().api().object_initialize()(object.raw(), &mut exception) };

        if let Some(exception) = Object::from_raw(exception) {
            let message = exception
                .try_to_string()
                .unwrap_or_else(|| exception.class().full_name());
            return Err(InvocationError::Constructor {
                class: self.full_name(),
                message,
            }
            .into());
        }

        Ok(object)
    }

    /// Gets the field with the given name.
    pub fn field(&self, name: &str) -> Result<Field> {
        self.try_field(name).ok_or_else(|| {
            LookupError::Field {
                name: name.to_string(),
                class: self.full_name(),
            }
            .into()
        })
    }

    /// Gets the field with the given name, if it exists.
    pub fn try_field(&self, name: &str) -> Option<Field> {
        let name = CString::new(name).ok()?;
        let handle =
            unsafe { runtime().api().class_get_field_from_name()(self.raw(), name.as_ptr()) };
        NonNull::new(handle).map(Field::from_handle)
    }

    /// Gets the method with the given name and parameter count; pass `-1` to
    /// ignore the parameter count.
    pub fn method(&self, name: &str, parameter_count: i32) -> Result<Method> {
        self.try_method(name, parameter_count).ok_or_else(|| {
            LookupError::Method {
                name: name.to_string(),
                class: self.full_name(),
            }
            .into()
        })
    }

    /// Gets the method with the given name and parameter count, if it exists;
    /// pass `-1` to ignore the parameter count.
    pub fn try_method(&self, name: &str, parameter_count: i32) -> Option<Method> {
        let name = CString::new(name).ok()?;
        let handle = unsafe {
            runtime().api().class_get_method_from_name()(self.raw(), name.as_ptr(), parameter_count)
        };
        NonNull::new(handle).map(Method::from_handle)
    }

    /// Gets the nested class with the given name.
    pub fn nested(&self, name: &str) -> Result<Class> {
        self.try_nested(name).ok_or_else(|| {
            LookupError::NestedClass {
                name: name.to_string(),
                class: self.full_name(),
            }
            .into()
        })
    }

    /// Gets the nested class with the given name, if it exists.
    pub fn try_nested(&self, name: &str) -> Option<Class> {
        self.nested_classes()
            .into_iter()
            .find(|class| class.name() == name)
    }

    /// Builds a generic instance of this generic class.
    pub fn inflate(&self, type_arguments: &[Class]) -> Result<Class> {
        if !self.is_generic() {
            return Err(InvocationError::NotGeneric {
                name: self.ty().name(),
            }
            .into());
        }

        let generics = self.generics()?;
        if generics.len() != type_arguments.len() {
            return Err(InvocationError::GenericArity {
                name: self.ty().name(),
                expected: generics.len(),
                actual: type_arguments.len(),
            }
            .into());
        }

        let types: Vec<Value> = type_arguments
            .iter()
            .map(|class| Value::Object(class.ty().object()))
            .collect();
        let type_array = array(&corlib().class("System.Type")?, &types)?;

        let inflated = self
            .ty()
            .object()
            .method("MakeGenericType", 1)?
            .invoke(&[Value::Array(type_array)])?;

        let Value::Object(inflated) = inflated else {
            return Err(LookupError::Class {
                name: self.ty().name(),
                image: self.image().name(),
            }
            .into());
        };

        let handle = unsafe { runtime().api().class_from_system_type()(inflated.raw()) };
        Class::from_raw(handle).ok_or_else(|| {
            LookupError::Class {
                name: self.ty().name(),
                image: self.image().name(),
            }
            .into()
        })
    }

    /// Runs the static constructor of this class.
    pub fn initialize(&self) -> Class {
        unsafe { runtime().api().class_initialize()(self.raw()) };
        *self
    }
}

impl PartialEq for Class {
    fn eq(&self, other: &Self) -> bool {
        self.handle == other.handle
    }
}

impl Eq for Class {}

impl Hash for Class {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.handle.hash(state);
    }
}

impl Debug for Class {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Class({})", self.full_name())
    }
}


impl Display for Class {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let kind = if self.is_enum() {
            "enum"
        } else if self.is_struct() {
            "struct"
        } else if self.is_interface() {
            "interface"
        } else {
            "class"
        };

        let mut inherited: Vec<String> = Vec::new();
        if let Some(parent) = self.parent() {
            inherited.push(parent.ty().name());
        }
        inherited.extend(self.interfaces().iter().map(|i| i.ty().name()));

        writeln!(f, "// {}", self.image().name())?;
        write!(f, "{} {}", kind, self.ty().name())?;
        if !inherited.is_empty() {
            write!(f, " : {}", inherited.join(", "))?;
        }
        writeln!(f)?;
        writeln!(f, "{{")?;
        for field in self.fields() {
            writeln!(f, "    {}", field)?;
        }
        for method in self.methods() {
            writeln!(f, "    {}", method)?;
        }
        write!(f, "}}")
    }
}
