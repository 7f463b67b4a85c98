//! Error taxonomy: one enum per failure family, aggregated into [`Error`].
//!
//! Lookup misses are recoverable through the `try_` variants, which return
//! `Option` instead; everything surfacing as an `Error` is meant to unwind to
//! the caller. Probe and marshal failures are fatal by design: the former has
//! no safe default, the latter risks corrupting foreign memory.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("couldn't load the runtime module: {0}")]
    Attach(#[from] libloading::Error),

    #[error("lookup failed: {0}")]
    Lookup(#[from] LookupError),

    #[error("invocation failed: {0}")]
    Invocation(#[from] InvocationError),

    #[error("hook installation failed: {0}")]
    Hook(#[from] HookError),

    #[error("ABI probe failed: {0}")]
    Probe(#[from] ProbeError),

    #[error("marshaling failed: {0}")]
    Marshal(#[from] MarshalError),
}

/// A class, member or overload was not found where it was expected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("couldn't find class {name} in assembly {image}")]
    Class { name: String, image: String },

    #[error("couldn't find field {name} in class {class}")]
    Field { name: String, class: String },

    #[error("couldn't find method {name} in class {class}")]
    Method { name: String, class: String },

    #[error("couldn't find nested class {name} in class {class}")]
    NestedClass { name: String, class: String },

    #[error("couldn't find overloaded method {name}({hints})")]
    Overload { name: String, hints: String },

    #[error("couldn't find parameter {name} in method {method}")]
    Parameter { name: String, method: String },
}

/// A call or member access was shaped wrongly for its target.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvocationError {
    #[error("cannot invoke non-static method {method} without an instance, bind it first")]
    InstanceRequired { method: String },

    #[error("couldn't invoke method {method} as it needs {expected} parameter(s), not {actual}")]
    ParameterCount {
        method: String,
        expected: usize,
        actual: usize,
    },

    #[error("couldn't invoke method {method} using incorrect parameter types")]
    ParameterTypes { method: String },

    #[error("couldn't invoke method {method} as it has a NULL virtual address")]
    NullTarget { method: String },

    #[error("couldn't construct an instance of {class}: {message}")]
    Constructor { class: String, message: String },

    #[error("cannot inflate {name} as it is not generic")]
    NotGeneric { name: String },

    #[error("couldn't inflate {name} with {actual} type argument(s) as it expects {expected}")]
    GenericArity {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("cannot bind static method {method} to an instance")]
    StaticBind { method: String },

    #[error("cannot invoke method {method} against a value type, box it first")]
    UnboxedReceiver { method: String },

    #[error("cannot access instance field {field} without an instance, bind it first")]
    InstanceFieldThroughClass { field: String },

    #[error("cannot bind static field {field} to an instance")]
    StaticFieldBind { field: String },

    #[error("cannot write the thread static or literal field {field}")]
    ImmutableField { field: String },
}

/// A method body replacement could not be installed. The recoverable cases
/// (thunk target, already replaced) never surface here, they are logged and
/// skipped instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HookError {
    #[error("couldn't replace the body of method {method} as it has a NULL virtual address")]
    NullTarget { method: String },
}

/// An empirical ABI probe came up empty. There is no safe fallback, so these
/// are fatal and never retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("couldn't find the virtual address offset in the native method record")]
    VirtualAddressOffset,

    #[error("couldn't determine the struct receiver convention")]
    StructReceiver,

    #[error("couldn't find the elements offset in the native array record")]
    ArrayElements,
}

/// A value could not be moved between its structured and native renderings.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MarshalError {
    #[error("couldn't {operation} a value of unhandled type {type_name} ({raw})")]
    UnknownCategory {
        operation: &'static str,
        type_name: String,
        raw: i32,
    },

    #[error("couldn't marshal {type_name} as {expected}")]
    IncompatibleValue {
        expected: &'static str,
        type_name: String,
    },

    #[error("couldn't compute the native layout of a by-value struct")]
    StructLayout,

    #[error("cannot access element at index {index} as the length is {length}")]
    OutOfBounds { index: usize, length: usize },
}
