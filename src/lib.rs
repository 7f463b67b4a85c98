//! In-process inspection and instrumentation of an IL2CPP runtime.
//!
//! The runtime's metadata records (classes, methods, fields, types) are
//! exposed as non-owning, freely copyable descriptors; a memory codec moves
//! structured values in and out of foreign memory and across native call
//! boundaries, so methods can be invoked, bound to instances, and have their
//! bodies replaced.
//!
//! ```no_run
//! use il2cpp_rs::{corlib, Il2Cpp, Value};
//!
//! # fn main() -> il2cpp_rs::Result<()> {
//! Il2Cpp::attach("./GameAssembly.so")?;
//!
//! let math = corlib().class("System.Math")?;
//! let max = math.method("Max", 2)?;
//! let result = max.invoke(&[Value::Int(3), Value::Int(7)])?;
//! # Ok(())
//! # }
//! ```

mod abi;
mod api;
pub mod error;
mod ffi;
mod hook;
mod image;
mod memory;
mod runtime;
pub mod types;
pub mod value;

#[cfg(test)]
mod fixture;

pub use error::{Error, HookError, InvocationError, LookupError, MarshalError, ProbeError, Result};
pub use hook::Receiver;
pub use image::{corlib, domain, Assembly, Domain, Image};
pub use memory::{from_native_value, read, to_native_value, write, NativeValue};
pub use runtime::Il2Cpp;
pub use types::{
    AbiType, BoundField, BoundMethod, Class, Field, FieldAttributes, Method, MethodAttributes,
    OverloadHint, Parameter, Type, TypeCategory,
};
pub use value::{
    array, reference, string, Il2CppArray, Il2CppString, Instance, Object, Pointer, Reference,
    Value, ValueType,
};
