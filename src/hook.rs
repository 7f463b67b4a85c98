//! Method body replacement.
//!
//! A hook is an explicit registry entry mapping a method record to a
//! native-callable shim built around the caller's handler. Installing writes
//! the shim's code pointer into the record's virtual-address slot and keeps
//! the original pointer; reverting restores it. The shim decodes incoming
//! arguments through the memory codec, reconstructs the receiver (adjusted
//! for the struct-receiver convention) and encodes the handler's result back
//! for the native caller.
//!
//! Handlers run on whichever foreign thread calls the hooked method, so they
//! must be reentrant and must not assume exclusive access to the runtime's
//! metadata.

use crate::{
    abi,
    error::{HookError, Result},
    ffi::{self, CallSignature},
    memory::{from_native_value, to_native_value},
    runtime::runtime,
    types::{Class, Method},
    value::{Object, Value, ValueType},
};
use libffi::{low, middle::Closure};
use std::{ffi::c_void, mem::ManuallyDrop};
use tracing::{error, warn};

/// The receiver a handler is invoked with: the declaring class for a static
/// method, otherwise the instance the foreign caller passed in.
#[derive(Clone, Copy)]
pub enum Receiver {
    Class(Class),
    Object(Object),
    ValueType(ValueType),
}

pub(crate) type Handler = Box<dyn Fn(Receiver, &[Value]) -> Value + Send + Sync + 'static>;

struct HookData {
    method: Method,
    signature: CallSignature,
    handler: Handler,
}

pub(crate) struct HookEntry {
    closure: ManuallyDrop<Closure<'static>>,
    data: *mut HookData,
    original: *mut c_void,
    code: usize,
}

// SAFETY: the entry is only ever handed out behind the registry map; the
// closure and its data are immutable after installation.
unsafe impl Send for HookEntry {}
unsafe impl Sync for HookEntry {}

impl Drop for HookEntry {
    fn drop(&mut self) {
        // The closure borrows the data, so it goes first.
        unsafe {
            ManuallyDrop::drop(&mut self.closure);
            drop(Box::from_raw(self.data));
        }
    }
}

/// Replaces the body of `method` with a shim around `handler`.
///
/// A method that is already hooked, or whose body is another hook's shim
/// (method records sharing one body), is skipped with a warning; a NULL
/// virtual address is fatal.
pub(crate) fn install(method: &Method, handler: Handler) -> Result<()> {
    let rt = runtime();

    let target = method.virtual_address()?;
    if target.is_null() {
        return Err(HookError::NullTarget {
            method: method.name(),
        }
        .into());
    }

    if rt.hooks.contains_key(&(method.raw() as usize)) {
        warn!(
            method = %method.name(),
            "couldn't replace the method body as it has already been replaced"
        );
        return Ok(());
    }

    if rt.hooks.iter().any(|entry| entry.code == target as usize) {
        warn!(
            method = %method.name(),
            "couldn't replace the method body as it is a replacement shim of another method"
        );
        return Ok(());
    }

    let signature = method.signature();
    let cif = signature.cif();

    let data = Box::into_raw(Box::new(HookData {
        method: *method,
        signature,
        handler,
    }));
    let closure = Closure::new(cif, trampoline, unsafe { &*data });
    let code = *closure.code_ptr() as usize;

    let offset = abi::virtual_address_offset(rt)?;
    let slot = method.raw().cast::<u8>().wrapping_add(offset) as *mut *mut c_void;
    let original = unsafe { slot.read_unaligned() };
    unsafe { slot.write_unaligned(code as *mut c_void) };

    rt.hooks.insert(
        method.raw() as usize,
        HookEntry {
            closure: ManuallyDrop::new(closure),
            data,
            original,
            code,
        },
    );

    Ok(())
}

/// Restores the original body of `method` and drops its registry entry.
pub(crate) fn revert(method: &Method) {
    let rt = runtime();

    if let Some((_, entry)) = rt.hooks.remove(&(method.raw() as usize)) {
        // The offset is memoized since installation, this cannot miss.
        if let Ok(offset) = abi::virtual_address_offset(rt) {
            let slot = method.raw().cast::<u8>().wrapping_add(offset) as *mut *mut c_void;
            unsafe { slot.write_unaligned(entry.original) };
        }
    }
}

unsafe extern "C" fn trampoline(
    _cif: &low::ffi_cif,
    result: &mut c_void,
    args: *const *const c_void,
    data: &HookData,
) {
    let result = result as *mut c_void;

    match unsafe { intercept(data, args) } {
        Ok(native) => {
            if let Err(failure) = ffi::write_native(result, &native, &data.signature.ret) {
                error!(
                    method = %data.method.name(),
                    %failure,
                    "couldn't encode the hook handler result, returning zeroes"
                );
                zero_result(result, &data.signature.ret);
            }
        }
        Err(failure) => {
            // A shim cannot unwind into the foreign caller; report and
            // return zeroes instead.
            error!(
                method = %data.method.name(),
                %failure,
                "hook handler failed, returning zeroes"
            );
            zero_result(result, &data.signature.ret);
        }
    }
}

unsafe fn intercept(
    data: &HookData,
    args: *const *const c_void,
) -> Result<crate::memory::NativeValue> {
    let rt = runtime();
    let method = data.method;

    let mut index = 0;
    let receiver = if method.is_static() {
        Receiver::Class(method.class())
    } else {
        let instance = unsafe { (*args).cast::<*mut c_void>().read() };
        index = 1;

        let class = method.class();
        if class.is_value_type() {
            // Receiver adjustment mirrors the bound-call path: a boxed
            // receiver carries a header in front of its field data.
            let adjust = if abi::boxed_struct_receivers(rt)? {
                Object::header_size()
            } else {
                0
            };
            Receiver::ValueType(ValueType::new(
                instance.cast::<u8>().wrapping_add(adjust).cast(),
                class.ty(),
            ))
        } else {
            Receiver::Object(Object::new(instance))
        }
    };

    let parameters = method.parameters();
    let mut values = Vec::with_capacity(parameters.len());
    for (position, parameter) in parameters.iter().enumerate() {
        let storage = unsafe { *args.add(index + position) };
        let native = ffi::read_native(storage, &data.signature.args[index + position])?;
        values.push(from_native_value(native, &parameter.ty)?);
    }

    let outcome = (data.handler)(receiver, &values);
    to_native_value(&outcome)
}

fn zero_result(result: *mut c_void, ret: &crate::types::AbiType) {
    if let Ok(size) = ffi::abi_size(ret) {
        unsafe { std::ptr::write_bytes(result.cast::<u8>(), 0, size) };
    }
}
