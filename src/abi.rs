//! Empirical ABI probes.
//!
//! Two facts about the runtime's compiled layout are not exposed as metadata
//! and must be discovered at run time: the byte offset at which method
//! records store their entry point, and whether instance methods of value
//! types expect their receiver to point at a boxed instance or at raw field
//! data. Both are invariant per runtime build, so each probe runs once per
//! process and its outcome is memoized; a probe that comes up empty fails
//! loudly, because no safe default exists.

use crate::{
    error::{ProbeError, Result},
    image::corlib,
    runtime::Il2Cpp,
    types::OverloadHint,
    value::Value,
};
use std::ffi::c_void;
use tracing::debug;

/// How far a structural scan walks before giving up. An empirical constant,
/// not a documented guarantee.
pub(crate) const SCAN_WINDOW: usize = 512;

const STRUCT_RECEIVER_SENTINEL: i64 = 0xdeadbeef;

/// Scans forward from `base`, one byte at a time, for the first offset whose
/// address satisfies the predicate.
pub(crate) fn scan_forward(
    base: *mut c_void,
    window: usize,
    predicate: impl Fn(*const u8) -> bool,
) -> Option<usize> {
    (0..window).find(|offset| predicate(base.cast::<u8>().wrapping_add(*offset)))
}

/// The byte offset at which method records store their virtual address.
///
/// The `System.Reflection.Module.FilterTypeName` delegate exposes both its
/// target method record and that method's function pointer as plain fields;
/// scanning the record for the known pointer reveals where every method
/// record of this build keeps its entry point.
pub(crate) fn virtual_address_offset(rt: &Il2Cpp) -> Result<usize> {
    if let Some(offset) = rt.va_offset.get() {
        return Ok(*offset);
    }

    let module = corlib().class("System.Reflection.Module")?.initialize();
    let filter = module.field("FilterTypeName")?.value()?;
    let Value::Object(filter) = filter else {
        return Err(ProbeError::VirtualAddressOffset.into());
    };

    let Value::NativePointer(function_pointer) = filter.field("method_ptr")?.value()? else {
        return Err(ProbeError::VirtualAddressOffset.into());
    };
    let Value::NativePointer(record) = filter.field("method")?.value()? else {
        return Err(ProbeError::VirtualAddressOffset.into());
    };

    let offset = scan_forward(record, SCAN_WINDOW, |candidate| {
        (unsafe { candidate.cast::<*mut c_void>().read_unaligned() }) == function_pointer
    })
    .ok_or(ProbeError::VirtualAddressOffset)?;

    debug!(offset, "probed the method record virtual address offset");
    Ok(*rt.va_offset.get_or_init(|| offset))
}

/// Whether instance methods of value-type classes expect a boxed receiver
/// (header included) rather than a pointer at raw field data.
///
/// Not discoverable from metadata: a sentinel is written into a boxed
/// `System.Int64` and `Equals(Int64)` is invoked with the boxed pointer as
/// the receiver. Only a build whose struct methods skip the header themselves
/// sees the sentinel where it expects its field data.
pub(crate) fn boxed_struct_receivers(rt: &Il2Cpp) -> Result<bool> {
    if let Some(flag) = rt.boxed_receivers.get() {
        return Ok(*flag);
    }

    let class = corlib().class("System.Int64")?;
    let object = class.alloc();
    object
        .field("m_value")?
        .set(&Value::Long(STRUCT_RECEIVER_SENTINEL))?;

    let equals = class
        .method("Equals", 1)?
        .overload(&[OverloadHint::Class(class)])?;
    let outcome = equals.invoke_raw(object.raw(), &[Value::Long(STRUCT_RECEIVER_SENTINEL)])?;

    let Value::Boolean(boxed) = outcome else {
        return Err(ProbeError::StructReceiver.into());
    };

    debug!(boxed, "probed the struct receiver convention");
    Ok(*rt.boxed_receivers.get_or_init(|| boxed))
}

/// The reserved offset marking a field as thread static, discovered from a
/// corlib field known to be one.
pub(crate) fn thread_static_offset(rt: &Il2Cpp) -> Result<i32> {
    if let Some(offset) = rt.thread_static_offset.get() {
        return Ok(*offset);
    }

    let offset = corlib()
        .class("System.AppDomain")?
        .field("type_resolve_in_progress")?
        .offset();
    Ok(*rt.thread_static_offset.get_or_init(|| offset))
}
