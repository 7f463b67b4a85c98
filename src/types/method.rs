use crate::{
    abi,
    error::{InvocationError, LookupError, MarshalError, Result},
    ffi::{self, CallSignature},
    hook::{self, Receiver},
    image::corlib,
    memory::{from_native_value, to_native_value, NativeValue},
    runtime::runtime,
    types::{AbiType, Class, Type},
    value::{array, Instance, Object, Value},
};
use bitflags::bitflags;
use libffi::middle::CodePtr;
use std::{
    ffi::c_void,
    fmt::{Debug, Display, Formatter},
    hash::{Hash, Hasher},
    ptr::NonNull,
    sync::Arc,
};

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct MethodAttributes: u32 {
        const MEMBER_ACCESS_MASK = 0x0007;
        const PRIVATE = 0x0001;
        const FAMILY_AND_ASSEMBLY = 0x0002;
        const ASSEMBLY = 0x0003;
        const FAMILY = 0x0004;
        const FAMILY_OR_ASSEMBLY = 0x0005;
        const PUBLIC = 0x0006;
        const STATIC = 0x0010;
        const FINAL = 0x0020;
        const VIRTUAL = 0x0040;
        const HIDE_BY_SIG = 0x0080;
        const NEW_SLOT = 0x0100;
        const ABSTRACT = 0x0400;
        const SPECIAL_NAME = 0x0800;
        const RT_SPECIAL_NAME = 0x1000;
        const PINVOKE_IMPL = 0x2000;
    }
}

/// A parameter of a method, as reported by the runtime's metadata.
#[derive(Clone)]
pub struct Parameter {
    pub name: String,
    pub position: usize,
    pub ty: Type,
}

impl Display for Parameter {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.ty.name(), self.name)
    }
}

/// A hint for overload resolution: either the display name of the wanted
/// parameter type (exact match only) or a class (exact or assignable match).
#[derive(Clone)]
pub enum OverloadHint {
    TypeName(String),
    Class(Class),
}

impl From<&str> for OverloadHint {
    fn from(name: &str) -> Self {
        Self::TypeName(name.to_string())
    }
}

impl From<Class> for OverloadHint {
    fn from(class: Class) -> Self {
        Self::Class(class)
    }
}

impl Display for OverloadHint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TypeName(name) => write!(f, "{}", name),
            Self::Class(class) => write!(f, "{}", class.ty().name()),
        }
    }
}

#[derive(Clone, Copy)]
pub struct Method {
    handle: NonNull<c_void>,
}

// SAFETY: Method wraps the address of a method record owned by the
// instrumented runtime; the record is immutable once initialized, so sharing
// the handle across threads is safe.
unsafe impl Send for Method {}
unsafe impl Sync for Method {}

impl Method {
    pub(crate) fn from_handle(handle: NonNull<c_void>) -> Self {
        Self { handle }
    }

    pub(crate) fn from_raw(handle: *mut c_void) -> Option<Self> {
        NonNull::new(handle).map(Self::from_handle)
    }

    pub(crate) fn raw(&self) -> *mut c_void {
        self.handle.as_ptr()
    }

    /// Gets the class in which this method is defined.
    pub fn class(&self) -> Class {
        let handle = unsafe { runtime().api().method_get_class()(self.raw()) };
        Class::from_raw(handle)
            .unwrap_or_else(|| panic!("method {} has a NULL declaring class", self.name()))
    }

    /// Gets the flags of this method.
    pub fn flags(&self) -> MethodAttributes {
        let raw =
            unsafe { runtime().api().method_get_flags()(self.raw(), std::ptr::null_mut()) };
        MethodAttributes::from_bits_retain(raw)
    }

    pub fn is_generic(&self) -> bool {
        unsafe { runtime().api().method_is_generic()(self.raw()) }
    }

    /// Determines whether this method is inflated, that is generic with
    /// concrete type arguments.
    pub fn is_inflated(&self) -> bool {
        unsafe { runtime().api().method_is_inflated()(self.raw()) }
    }

    pub fn is_static(&self) -> bool {
        !unsafe { runtime().api().method_is_instance()(self.raw()) }
    }

    /// Gets the access modifier of this method.
    pub fn modifier(&self) -> Option<&'static str> {
        let access = self.flags() & MethodAttributes::MEMBER_ACCESS_MASK;
        if access == MethodAttributes::PRIVATE {
            Some("private")
        } else if access == MethodAttributes::FAMILY_AND_ASSEMBLY {
            Some("private protected")
        } else if access == MethodAttributes::ASSEMBLY {
            Some("internal")
        } else if access == MethodAttributes::FAMILY {
            Some("protected")
        } else if access == MethodAttributes::FAMILY_OR_ASSEMBLY {
            Some("protected internal")
        } else if access == MethodAttributes::PUBLIC {
            Some("public")
        } else {
            None
        }
    }

    /// Gets the name of this method.
    pub fn name(&self) -> String {
        let api = runtime().api();
        unsafe { api.read_string(api.method_get_name()(self.raw())) }
    }

    /// Gets the reflection `MethodInfo` instance for this method.
    pub fn object(&self) -> Object {
        let handle =
            unsafe { runtime().api().method_get_object()(self.raw(), std::ptr::null_mut()) };
        Object::new(handle)
    }

    /// Gets the amount of parameters of this method.
    pub fn parameter_count(&self) -> usize {
        unsafe { runtime().api().method_get_parameter_count()(self.raw()) as usize }
    }

    /// Gets the parameters of this method, in declaration order.
    pub fn parameters(&self) -> Arc<[Parameter]> {
        let rt = runtime();
        if let Some(cached) = rt.params_cache.get(&(self.raw() as usize)) {
            return cached.clone();
        }

        let api = rt.api();
        let parameters: Arc<[Parameter]> = (0..self.parameter_count())
            .map(|position| {
                let name = unsafe {
                    api.read_string(api.method_get_parameter_name()(self.raw(), position as u32))
                };
                let handle =
                    unsafe { api.method_get_parameter_type()(self.raw(), position as u32) };
                let ty = Type::from_raw(handle).unwrap_or_else(|| {
                    panic!("parameter {} of method {} has a NULL type", position, name)
                });
                Parameter { name, position, ty }
            })
            .collect();

        rt.params_cache
            .insert(self.raw() as usize, parameters.clone());
        parameters
    }

    /// Gets the return type of this method.
    pub fn return_type(&self) -> Type {
        let handle = unsafe { runtime().api().method_get_return_type()(self.raw()) };
        Type::from_raw(handle)
            .unwrap_or_else(|| panic!("method {} has a NULL return type", self.name()))
    }

    /// Gets the generic arguments of this generic method.
    pub fn generics(&self) -> Result<Vec<Class>> {
        if !self.is_generic() && !self.is_inflated() {
            return Ok(Vec::new());
        }

        let types = self
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

    /// Gets the entry point of this method's compiled body. The byte offset
    /// at which method records store it is probed once per process; every
    /// read re-applies that offset to this record, so a replaced body is
    /// always observed.
    pub fn virtual_address(&self) -> Result<*mut c_void> {
        let offset = abi::virtual_address_offset(runtime())?;
        let slot = self.raw().cast::<u8>().wrapping_add(offset) as *const *mut c_void;
        Ok(unsafe { slot.read_unaligned() })
    }

    /// The native call frame layout of this method: its parameter shapes,
    /// prefixed with a receiver pointer slot unless the method is static, and
    /// suffixed with a method handle slot if the method is inflated.
    pub(crate) fn signature(&self) -> CallSignature {
        let mut args = Vec::with_capacity(self.parameter_count() + 2);

        if !self.is_static() {
            args.push(AbiType::Pointer);
        }

        for parameter in self.parameters().iter() {
            args.push(parameter.ty.call_alias());
        }

        if self.is_inflated() {
            args.push(AbiType::Pointer);
        }

        CallSignature {
            args,
            ret: self.return_type().call_alias(),
        }
    }

    /// Invokes this static method. Instance methods must be invoked through
    /// an instance-bound view instead.
    pub fn invoke(&self, arguments: &[Value]) -> Result<Value> {
        if !self.is_static() {
            return Err(InvocationError::InstanceRequired {
                method: self.name(),
            }
            .into());
        }
        self.invoke_raw(std::ptr::null_mut(), arguments)
    }

    /// Invokes this method against a raw receiver pointer. No receiver
    /// adjustment is applied; `bind` is the checked way in.
    pub fn invoke_raw(&self, instance: *mut c_void, arguments: &[Value]) -> Result<Value> {
        if arguments.len() != self.parameter_count() {
            return Err(InvocationError::ParameterCount {
                method: self.name(),
                expected: self.parameter_count(),
                actual: arguments.len(),
            }
            .into());
        }

        let mut natives = Vec::with_capacity(arguments.len() + 2);
        if !self.is_static() {
            natives.push(NativeValue::Pointer(instance));
        }
        for argument in arguments {
            natives.push(to_native_value(argument)?);
        }
        if self.is_inflated() {
            natives.push(NativeValue::Pointer(self.raw()));
        }

        let target = self.virtual_address()?;
        if target.is_null() {
            return Err(InvocationError::NullTarget {
                method: self.name(),
            }
            .into());
        }

        let raw = match ffi::call(CodePtr(target), &self.signature(), &natives) {
            Ok(raw) => raw,
            Err(MarshalError::IncompatibleValue { .. }) => {
                return Err(InvocationError::ParameterTypes {
                    method: self.name(),
                }
                .into())
            }
            Err(error) => return Err(error.into()),
        };

        from_native_value(raw, &self.return_type())
    }

    /// All methods sharing this method's name across the declaring class and
    /// its ancestors.
    pub fn overloads(&self) -> Vec<Method> {
        let name = self.name();
        let mut overloads = Vec::new();

        for class in self.class().hierarchy() {
            for method in class.methods() {
                if method.name() == name {
                    overloads.push(method);
                }
            }
        }

        overloads
    }

    /// Gets the overloaded method best matching the given parameter type
    /// hints.
    pub fn overload(&self, hints: &[OverloadHint]) -> Result<Method> {
        self.try_overload(hints).ok_or_else(|| {
            let hints = hints
                .iter()
                .map(|hint| hint.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            LookupError::Overload {
                name: self.name(),
                hints,
            }
            .into()
        })
    }

    /// Gets the overloaded method best matching the given parameter type
    /// hints, if any.
    ///
    /// Each candidate with matching arity is scored per parameter: an exact
    /// type match is worth 2, an assignable match 1, anything else rejects
    /// the candidate. A candidate reaching the maximum score wins
    /// immediately; ties between partial matches are broken by keeping the
    /// more derived signature.
    pub fn try_overload(&self, hints: &[OverloadHint]) -> Option<Method> {
        let max_score = hints.len() * 2;
        let mut candidate: Option<(usize, Method)> = None;

        'candidates: for method in self.overloads() {
            if method.parameter_count() != hints.len() {
                continue;
            }

            let parameters = method.parameters();
            let mut score = 0;
            for (parameter, hint) in parameters.iter().zip(hints) {
                match hint {
                    OverloadHint::Class(class) => {
                        if parameter.ty.is(&class.ty()) {
                            score += 2;
                        } else if parameter.ty.class().is_assignable_from(class) {
                            score += 1;
                        } else {
                            continue 'candidates;
                        }
                    }
                    OverloadHint::TypeName(name) => {
                        if parameter.ty.name() == *name {
                            score += 2;
                        } else {
                            continue 'candidates;
                        }
                    }
                }
            }

            if score == max_score {
                return Some(method);
            }

            let replace = match &candidate {
                None => true,
                Some((kept_score, _)) if score > *kept_score => true,
                Some((kept_score, kept)) if score == *kept_score => {
                    // Two partial matches, e.g. f(Parent) and f(Child) both
                    // scoring 1 against a grandchild argument: keep the
                    // signature whose parameters are the more derived. Only
                    // the previously kept candidate is compared, not every
                    // tied candidate pairwise.
                    kept.parameters()
                        .iter()
                        .zip(parameters.iter())
                        .any(|(kept_parameter, new_parameter)| {
                            kept_parameter
                                .ty
                                .class()
                                .is_assignable_from(&new_parameter.ty.class())
                        })
                }
                _ => false,
            };

            if replace {
                candidate = Some((score, method));
            }
        }

        candidate.map(|(_, method)| method)
    }

    /// Gets the parameter with the given name.
    pub fn parameter(&self, name: &str) -> Result<Parameter> {
        self.try_parameter(name).ok_or_else(|| {
            LookupError::Parameter {
                name: name.to_string(),
                method: self.name(),
            }
            .into()
        })
    }

    /// Gets the parameter with the given name, if it exists.
    pub fn try_parameter(&self, name: &str) -> Option<Parameter> {
        self.parameters()
            .iter()
            .find(|parameter| parameter.name == name)
            .cloned()
    }

    /// Creates a generic instance of this generic method.
    pub fn inflate(&self, type_arguments: &[Class]) -> Result<Method> {
        if !self.is_generic() {
            return Err(InvocationError::NotGeneric { name: self.name() }.into());
        }

        let generics = self.generics()?;
        if generics.len() != type_arguments.len() {
            return Err(InvocationError::GenericArity {
                name: self.name(),
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
            .object()
            .method("MakeGenericMethod", 1)?
            .invoke(&[Value::Array(type_array)])?;

        let Value::Object(inflated) = inflated else {
            return Err(LookupError::Method {
                name: self.name(),
                class: self.class().full_name(),
            }
            .into());
        };

        let handle = inflated.field("mhandle")?.value()?;
        let Value::NativePointer(handle) = handle else {
            return Err(LookupError::Method {
                name: self.name(),
                class: self.class().full_name(),
            }
            .into());
        };

        Method::from_raw(handle).ok_or_else(|| {
            LookupError::Method {
                name: self.name(),
                class: self.class().full_name(),
            }
            .into()
        })
    }

    /// Binds this method to an instance, producing a view that adjusts the
    /// receiver pointer per the runtime's struct-receiver convention on every
    /// call. Binding a static method is forbidden.
    pub fn bind(&self, instance: impl Into<Instance>) -> Result<BoundMethod> {
        if self.is_static() {
            return Err(InvocationError::StaticBind {
                method: format!("{}::{}", self.class().ty().name(), self.name()),
            }
            .into());
        }

        Ok(BoundMethod {
            method: *self,
            instance: instance.into(),
        })
    }

    /// Replaces the body of this method with the given handler. The handler
    /// runs on whichever foreign thread calls the method, so it must be
    /// reentrant.
    pub fn install(
        &self,
        handler: impl Fn(Receiver, &[Value]) -> Value + Send + Sync + 'static,
    ) -> Result<()> {
        hook::install(self, Box::new(handler))
    }

    /// Restores the original body of this method.
    pub fn revert(&self) {
        hook::revert(self);
    }
}

impl PartialEq for Method {
    fn eq(&self, other: &Self) -> bool {
        self.handle == other.handle
    }
}

impl Eq for Method {}

impl Hash for Method {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.handle.hash(state);
    }
}

impl Debug for Method {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Method({}::{})", self.class().full_name(), self.name())
    }
}

impl Display for Method {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_static() {
            write!(f, "static ")?;
        }

        let parameters = self
            .parameters()
            .iter()
            .map(|parameter| parameter.to_string())
            .collect::<Vec<_>>()
            .join(", ");

        write!(
            f,
            "{} {}({});",
            self.return_type().name(),
            self.name(),
            parameters
        )?;

        if let Ok(address) = self.virtual_address() {
            if !address.is_null() {
                write!(f, " // {:#010x}", address as usize)?;
            }
        }

        Ok(())
    }
}

/// A method bound to an instance: invoking it passes the instance as the
/// receiver, with the address adjusted for the struct-receiver convention
/// when the declaring class is a value type.
#[derive(Clone)]
pub struct BoundMethod {
    method: Method,
    instance: Instance,
}

impl BoundMethod {
    pub fn method(&self) -> Method {
        self.method
    }

    /// The receiver pointer the native body expects. Value-type receivers
    /// may point either at raw field data or at a boxed instance depending
    /// on the runtime build; the probed convention decides the adjustment.
    fn receiver(&self) -> Result<*mut c_void> {
        let header_size = Object::header_size();

        match &self.instance {
            Instance::ValueType(value_type) => {
                if self.method.class().is_value_type() {
                    let adjust = if abi::boxed_struct_receivers(runtime())? {
                        header_size
                    } else {
                        0
                    };
                    Ok(value_type.raw().cast::<u8>().wrapping_sub(adjust).cast())
                } else {
                    Err(InvocationError::UnboxedReceiver {
                        method: format!(
                            "{}::{}",
                            self.method.class().ty().name(),
                            self.method.name()
                        ),
                    }
                    .into())
                }
            }
            Instance::Object(object) => {
                if self.method.class().is_value_type() {
                    let adjust = if abi::boxed_struct_receivers(runtime())? {
                        0
                    } else {
                        header_size
                    };
                    Ok(object.raw().cast::<u8>().wrapping_add(adjust).cast())
                } else {
                    Ok(object.raw())
                }
            }
        }
    }

    pub fn invoke(&self, arguments: &[Value]) -> Result<Value> {
        self.method.invoke_raw(self.receiver()?, arguments)
    }

    /// Resolves an overload and re-binds it to the same instance.
    pub fn overload(&self, hints: &[OverloadHint]) -> Result<BoundMethod> {
        self.method.overload(hints)?.bind(self.instance.clone())
    }

    /// Resolves an overload and re-binds it to the same instance, if any.
    pub fn try_overload(&self, hints: &[OverloadHint]) -> Option<BoundMethod> {
        self.method
            .try_overload(hints)
            .and_then(|method| method.bind(self.instance.clone()).ok())
    }

    /// Inflates the generic method and re-binds it to the same instance.
    pub fn inflate(&self, type_arguments: &[Class]) -> Result<BoundMethod> {
        self.method
            .inflate(type_arguments)?
            .bind(self.instance.clone())
    }
}

impl Display for BoundMethod {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.method)
    }
}
