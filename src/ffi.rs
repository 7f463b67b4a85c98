//! The native call bridge.
//!
//! Builds libffi call interfaces out of [`AbiType`] shapes, serializes
//! [`NativeValue`]s into argument storage and reads them back out of result
//! storage. By-value aggregates are laid out with libffi's own struct layout
//! so the flattened field list lands exactly where the callee expects it.

use crate::{error::MarshalError, memory::NativeValue, types::AbiType};
use libffi::{
    middle::{Arg, Cif, CodePtr, Type},
    raw,
};
use std::ffi::c_void;

/// The native call frame layout of a method: its argument shapes and return
/// shape.
#[derive(Clone, Debug)]
pub(crate) struct CallSignature {
    pub args: Vec<AbiType>,
    pub ret: AbiType,
}

impl CallSignature {
    pub(crate) fn cif(&self) -> Cif {
        Cif::new(self.args.iter().map(ffi_type), ffi_type(&self.ret))
    }
}

fn ffi_type(ty: &AbiType) -> Type {
    match ty {
        AbiType::Void => Type::void(),
        AbiType::I8 => Type::i8(),
        AbiType::U8 => Type::u8(),
        AbiType::I16 => Type::i16(),
        AbiType::U16 => Type::u16(),
        AbiType::I32 => Type::i32(),
        AbiType::U32 => Type::u32(),
        AbiType::I64 => Type::i64(),
        AbiType::U64 => Type::u64(),
        AbiType::F32 => Type::f32(),
        AbiType::F64 => Type::f64(),
        AbiType::Pointer => Type::pointer(),
        AbiType::Aggregate(fields) => Type::structure(fields.iter().map(ffi_type)),
    }
}

/// The in-memory size and field offsets of a by-value aggregate, as libffi
/// lays it out for the default ABI.
fn layout(fields: &[AbiType]) -> Result<(usize, Vec<usize>), MarshalError> {
    let ffi_struct = ffi_type(&AbiType::Aggregate(fields.to_vec()));
    let raw_type = ffi_struct.as_raw_ptr();

    let mut offsets = vec![0usize; fields.len()];
    let status = unsafe {
        raw::ffi_get_struct_offsets(raw::ffi_abi_FFI_DEFAULT_ABI, raw_type, offsets.as_mut_ptr())
    };
    if status != raw::ffi_status_FFI_OK {
        return Err(MarshalError::StructLayout);
    }

    let size = unsafe { (*raw_type).size };
    Ok((size, offsets))
}

pub(crate) fn abi_size(ty: &AbiType) -> Result<usize, MarshalError> {
    Ok(match ty {
        AbiType::Void => 0,
        AbiType::I8 | AbiType::U8 => 1,
        AbiType::I16 | AbiType::U16 => 2,
        AbiType::I32 | AbiType::U32 | AbiType::F32 => 4,
        AbiType::I64 | AbiType::U64 | AbiType::F64 => 8,
        AbiType::Pointer => size_of::<*mut c_void>(),
        AbiType::Aggregate(fields) => layout(fields)?.0,
    })
}

/// Serializes a native value into pre-sized storage shaped like `ty`.
pub(crate) fn write_native(
    storage: *mut c_void,
    value: &NativeValue,
    ty: &AbiType,
) -> Result<(), MarshalError> {
    macro_rules! store {
        ($t:ty, $value:expr) => {{
            unsafe { storage.cast::<$t>().write_unaligned($value) };
            Ok(())
        }};
    }

    macro_rules! integral {
        ($t:ty) => {
            store!($t, expect_integral(value, ty)? as $t)
        };
    }

    match ty {
        AbiType::Void => Ok(()),
        AbiType::I8 => integral!(i8),
        AbiType::U8 => integral!(u8),
        AbiType::I16 => integral!(i16),
        AbiType::U16 => integral!(u16),
        AbiType::I32 => integral!(i32),
        AbiType::U32 => integral!(u32),
        AbiType::I64 => integral!(i64),
        AbiType::U64 => integral!(u64),
        AbiType::F32 => store!(f32, expect_floating(value, ty)? as f32),
        AbiType::F64 => store!(f64, expect_floating(value, ty)?),
        AbiType::Pointer => match value {
            NativeValue::Pointer(pointer) => store!(*mut c_void, *pointer),
            other => store!(*mut c_void, expect_integral(other, ty)? as usize as *mut c_void),
        },
        AbiType::Aggregate(fields) => {
            let NativeValue::Aggregate(elements) = value else {
                return Err(mismatch(value, ty));
            };
            if elements.len() != fields.len() {
                return Err(mismatch(value, ty));
            }

            let (_, offsets) = layout(fields)?;
            for ((element, field), offset) in elements.iter().zip(fields).zip(offsets) {
                write_native(
                    storage.cast::<u8>().wrapping_add(offset).cast(),
                    element,
                    field,
                )?;
            }
            Ok(())
        }
    }
}

/// Reads a native value out of storage shaped like `ty`.
pub(crate) fn read_native(storage: *const c_void, ty: &AbiType) -> Result<NativeValue, MarshalError> {
    macro_rules! load {
        ($t:ty) => {
            unsafe { storage.cast::<$t>().read_unaligned() }
        };
    }

    Ok(match ty {
        AbiType::Void => NativeValue::Void,
        AbiType::I8 => NativeValue::I8(load!(i8)),
        AbiType::U8 => NativeValue::U8(load!(u8)),
        AbiType::I16 => NativeValue::I16(load!(i16)),
        AbiType::U16 => NativeValue::U16(load!(u16)),
        AbiType::I32 => NativeValue::I32(load!(i32)),
        AbiType::U32 => NativeValue::U32(load!(u32)),
        AbiType::I64 => NativeValue::I64(load!(i64)),
        AbiType::U64 => NativeValue::U64(load!(u64)),
        AbiType::F32 => NativeValue::F32(load!(f32)),
        AbiType::F64 => NativeValue::F64(load!(f64)),
        AbiType::Pointer => NativeValue::Pointer(load!(*mut c_void)),
        AbiType::Aggregate(fields) => {
            let (_, offsets) = layout(fields)?;
            let mut elements = Vec::with_capacity(fields.len());
            for (field, offset) in fields.iter().zip(offsets) {
                elements.push(read_native(
                    storage.cast::<u8>().wrapping_add(offset).cast(),
                    field,
                )?);
            }
            NativeValue::Aggregate(elements)
        }
    })
}

/// Performs a native call against `target` with the given signature and
/// argument values, returning the raw result.
pub(crate) fn call(
    target: CodePtr,
    signature: &CallSignature,
    values: &[NativeValue],
) -> Result<NativeValue, MarshalError> {
    if values.len() != signature.args.len() {
        return Err(MarshalError::IncompatibleValue {
            expected: "an argument list matching the call signature",
            type_name: format!("{} value(s)", values.len()),
        });
    }

    // Each argument gets its own storage; libffi receives a pointer to it
    // whatever the argument's shape.
    let mut buffers: Vec<Vec<u8>> = Vec::with_capacity(values.len());
    for (value, ty) in values.iter().zip(&signature.args) {
        let mut buffer = vec![0u8; abi_size(ty)?.max(1)];
        write_native(buffer.as_mut_ptr().cast(), value, ty)?;
        buffers.push(buffer);
    }
    let args: Vec<Arg> = buffers.iter().map(|buffer| Arg::new(&buffer[0])).collect();

    let cif = signature.cif();

    macro_rules! ret {
        ($t:ty) => {
            unsafe { cif.call::<$t>(target, &args) }
        };
    }

    Ok(match &signature.ret {
        AbiType::Void => {
            ret!(());
            NativeValue::Void
        }
        AbiType::I8 => NativeValue::I8(ret!(i8)),
        AbiType::U8 => NativeValue::U8(ret!(u8)),
        AbiType::I16 => NativeValue::I16(ret!(i16)),
        AbiType::U16 => NativeValue::U16(ret!(u16)),
        AbiType::I32 => NativeValue::I32(ret!(i32)),
        AbiType::U32 => NativeValue::U32(ret!(u32)),
        AbiType::I64 => NativeValue::I64(ret!(i64)),
        AbiType::U64 => NativeValue::U64(ret!(u64)),
        AbiType::F32 => NativeValue::F32(ret!(f32)),
        AbiType::F64 => NativeValue::F64(ret!(f64)),
        AbiType::Pointer => NativeValue::Pointer(ret!(*mut c_void)),
        AbiType::Aggregate(fields) => {
            let (size, _) = layout(fields)?;
            let mut result = vec![0u8; size.max(1)];
            let mut raw_args: Vec<*mut c_void> = buffers
                .iter()
                .map(|buffer| buffer.as_ptr() as *mut c_void)
                .collect();

            unsafe {
                raw::ffi_call(
                    cif.as_raw_ptr(),
                    Some(*target.as_safe_fun()),
                    result.as_mut_ptr().cast(),
                    raw_args.as_mut_ptr(),
                );
            }

            read_native(result.as_ptr().cast(), &signature.ret)?
        }
    })
}

fn expect_integral(value: &NativeValue, ty: &AbiType) -> Result<i64, MarshalError> {
    value.integral().ok_or_else(|| mismatch(value, ty))
}

fn expect_floating(value: &NativeValue, ty: &AbiType) -> Result<f64, MarshalError> {
    value
        .floating()
        .or_else(|| value.integral().map(|integral| integral as f64))
        .ok_or_else(|| mismatch(value, ty))
}

fn mismatch(value: &NativeValue, ty: &AbiType) -> MarshalError {
    MarshalError::IncompatibleValue {
        expected: "a value matching the call signature",
        type_name: format!("{:?} (as {:?})", value, ty),
    }
}
