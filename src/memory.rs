//! The memory codec: structured values in and out of raw memory, and in and
//! out of the shapes the native call layer moves around.
//!
//! `read`/`write` move a [`Value`] between a memory address and its
//! structured rendering, dispatching on the type's category. `from_native_value`
//! and `to_native_value` do the same at call boundaries, where a value type is
//! flattened into the ordered list of its fields' native representations
//! rather than handed over as a pointer.

use crate::{
    error::{MarshalError, Result},
    runtime::runtime,
    types::{Type, TypeCategory},
    value::{Il2CppArray, Il2CppString, Object, Pointer, Reference, Value, ValueType},
};
use std::ffi::c_void;

/// A value as the native call layer sees it: a scalar in a register slot, a
/// pointer, or a by-value aggregate flattened into its fields' values.
#[derive(Clone, Debug, PartialEq)]
pub enum NativeValue {
    Void,
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    Pointer(*mut c_void),
    Aggregate(Vec<NativeValue>),
}

impl NativeValue {
    /// The integral interpretation, widened to 64 bits.
    pub(crate) fn integral(&self) -> Option<i64> {
        match self {
            Self::I8(value) => Some(*value as i64),
            Self::U8(value) => Some(*value as i64),
            Self::I16(value) => Some(*value as i64),
            Self::U16(value) => Some(*value as i64),
            Self::I32(value) => Some(*value as i64),
            Self::U32(value) => Some(*value as i64),
            Self::I64(value) => Some(*value),
            Self::U64(value) => Some(*value as i64),
            _ => None,
        }
    }

    pub(crate) fn floating(&self) -> Option<f64> {
        match self {
            Self::F32(value) => Some(*value as f64),
            Self::F64(value) => Some(*value),
            _ => None,
        }
    }

    /// Variant-wise passthrough into a structured value, for categories with
    /// no dedicated conversion.
    fn into_value(self) -> Value {
        match self {
            Self::Void | Self::Aggregate(_) => Value::Void,
            Self::I8(value) => Value::SByte(value),
            Self::U8(value) => Value::Byte(value),
            Self::I16(value) => Value::Short(value),
            Self::U16(value) => Value::UShort(value),
            Self::I32(value) => Value::Int(value),
            Self::U32(value) => Value::UInt(value),
            Self::I64(value) => Value::Long(value),
            Self::U64(value) => Value::ULong(value),
            Self::F32(value) => Value::Float(value),
            Self::F64(value) => Value::Double(value),
            Self::Pointer(value) => Value::NativePointer(value),
        }
    }
}

/// Reads the value of the given type at the given address.
pub fn read(address: *mut c_void, ty: &Type) -> Result<Value> {
    macro_rules! load {
        ($t:ty) => {
            unsafe { address.cast::<$t>().read_unaligned() }
        };
    }

    match ty.category() {
        Some(TypeCategory::Boolean) => Ok(Value::Boolean(load!(i8) != 0)),
        Some(TypeCategory::SByte) => Ok(Value::SByte(load!(i8))),
        Some(TypeCategory::Byte) => Ok(Value::Byte(load!(u8))),
        Some(TypeCategory::Short) => Ok(Value::Short(load!(i16))),
        Some(TypeCategory::UShort) => Ok(Value::UShort(load!(u16))),
        Some(TypeCategory::Char) => Ok(Value::Char(load!(u16))),
        Some(TypeCategory::Int) => Ok(Value::Int(load!(i32))),
        Some(TypeCategory::UInt) => Ok(Value::UInt(load!(u32))),
        Some(TypeCategory::Long) => Ok(Value::Long(load!(i64))),
        Some(TypeCategory::ULong) => Ok(Value::ULong(load!(u64))),
        Some(TypeCategory::Float) => Ok(Value::Float(load!(f32))),
        Some(TypeCategory::Double) => Ok(Value::Double(load!(f64))),
        Some(TypeCategory::NativeInt | TypeCategory::NativeUInt) => {
            Ok(Value::NativePointer(load!(*mut c_void)))
        }
        Some(TypeCategory::Pointer) => {
            Ok(Value::Pointer(Pointer::new(load!(*mut c_void), pointee(ty))))
        }
        // Value types are read in place, there is nothing to dereference.
        Some(TypeCategory::ValueType) => Ok(Value::ValueType(ValueType::new(address, *ty))),
        Some(TypeCategory::Class | TypeCategory::Object) => {
            Ok(Value::Object(Object::new(load!(*mut c_void))))
        }
        Some(TypeCategory::GenericInstance) => {
            if ty.class().is_value_type() {
                Ok(Value::ValueType(ValueType::new(address, *ty)))
            } else {
                Ok(Value::Object(Object::new(load!(*mut c_void))))
            }
        }
        Some(TypeCategory::String) => Ok(Value::String(Il2CppString::new(load!(*mut c_void)))),
        Some(TypeCategory::Array | TypeCategory::MultiArray) => {
            Ok(Value::Array(Il2CppArray::new(load!(*mut c_void))))
        }
        _ => Err(MarshalError::UnknownCategory {
            operation: "read",
            type_name: ty.name(),
            raw: ty.raw_category(),
        }
        .into()),
    }
}

/// Writes the value of the given type at the given address.
pub fn write(address: *mut c_void, value: &Value, ty: &Type) -> Result<()> {
    macro_rules! store {
        ($t:ty, $value:expr) => {{
            unsafe { address.cast::<$t>().write_unaligned($value) };
            Ok(())
        }};
    }

    macro_rules! integral {
        ($t:ty) => {
            store!($t, expect_integral(value, ty)? as $t)
        };
    }

    match ty.category() {
        Some(TypeCategory::Boolean) => match value {
            Value::Boolean(flag) => store!(i8, *flag as i8),
            other => store!(i8, (expect_integral(other, ty)? != 0) as i8),
        },
        Some(TypeCategory::SByte) => integral!(i8),
        Some(TypeCategory::Byte) => integral!(u8),
        Some(TypeCategory::Short) => integral!(i16),
        Some(TypeCategory::UShort | TypeCategory::Char) => integral!(u16),
        Some(TypeCategory::Int) => integral!(i32),
        Some(TypeCategory::UInt) => integral!(u32),
        Some(TypeCategory::Long) => integral!(i64),
        Some(TypeCategory::ULong) => integral!(u64),
        Some(TypeCategory::Float) => store!(f32, expect_floating(value, ty)? as f32),
        Some(TypeCategory::Double) => store!(f64, expect_floating(value, ty)?),
        Some(
            TypeCategory::NativeInt
            | TypeCategory::NativeUInt
            | TypeCategory::Pointer
            | TypeCategory::String
            | TypeCategory::Array
            | TypeCategory::MultiArray,
        ) => store!(*mut c_void, expect_handle(value, ty)?),
        Some(TypeCategory::ValueType) => match value {
            Value::ValueType(value_type) => {
                copy_payload(address, value_type.raw(), ty);
                Ok(())
            }
            other => Err(incompatible("a value type", other, ty)),
        },
        Some(TypeCategory::Class | TypeCategory::Object | TypeCategory::GenericInstance) => {
            match value {
                // Boxed/value semantics differ at this boundary: a raw value
                // type going into an object-typed slot is copied, not stored
                // as a pointer.
                Value::ValueType(value_type) => {
                    copy_payload(address, value_type.raw(), ty);
                    Ok(())
                }
                other => store!(*mut c_void, expect_handle(other, ty)?),
            }
        }
        _ => Err(MarshalError::UnknownCategory {
            operation: "write",
            type_name: ty.name(),
            raw: ty.raw_category(),
        }
        .into()),
    }
}

/// Converts a value delivered by the native call layer into its structured
/// rendering under the given type.
pub fn from_native_value(value: NativeValue, ty: &Type) -> Result<Value> {
    match value {
        // A flattened by-value aggregate: materialize scratch storage and
        // reassemble it field by field. Field offsets include the object
        // header a raw value-type payload doesn't carry.
        NativeValue::Aggregate(elements) => {
            let class = ty.class();
            let storage = runtime().alloc(class.value_type_size());
            let header_size = Object::header_size() as i32;

            let fields = class
                .fields()
                .into_iter()
                .filter(|field| !field.is_static());
            for (field, element) in fields.zip(elements) {
                let field_type = field.ty();
                let converted = from_native_value(element, &field_type)?;
                let address = storage
                    .cast::<u8>()
                    .wrapping_offset((field.offset() - header_size) as isize)
                    .cast();
                write(address, &converted, &field_type)?;
            }

            Ok(Value::ValueType(ValueType::new(storage, *ty)))
        }
        NativeValue::Pointer(pointer) => {
            if ty.is_by_reference() {
                return Ok(Value::Reference(Reference::new(pointer, *ty)));
            }

            match ty.category() {
                Some(TypeCategory::Pointer) => {
                    Ok(Value::Pointer(Pointer::new(pointer, pointee(ty))))
                }
                Some(TypeCategory::String) => Ok(Value::String(Il2CppString::new(pointer))),
                Some(
                    TypeCategory::Class | TypeCategory::GenericInstance | TypeCategory::Object,
                ) => Ok(Value::Object(Object::new(pointer))),
                Some(TypeCategory::Array | TypeCategory::MultiArray) => {
                    Ok(Value::Array(Il2CppArray::new(pointer)))
                }
                _ => Ok(Value::NativePointer(pointer)),
            }
        }
        NativeValue::Void => Ok(Value::Void),
        scalar => {
            if ty.category() == Some(TypeCategory::Boolean) {
                return Ok(Value::Boolean(scalar.integral().unwrap_or(0) != 0));
            }

            // An enum arrives as its bare backing numeric; re-enter the
            // aggregate path with a one-element list so the same
            // reassembly logic materializes it.
            if ty.category() == Some(TypeCategory::ValueType) && ty.class().is_enum() {
                return from_native_value(NativeValue::Aggregate(vec![scalar]), ty);
            }

            Ok(match ty.category() {
                Some(TypeCategory::SByte) => Value::SByte(scalar.integral().unwrap_or(0) as i8),
                Some(TypeCategory::Byte) => Value::Byte(scalar.integral().unwrap_or(0) as u8),
                Some(TypeCategory::Short) => Value::Short(scalar.integral().unwrap_or(0) as i16),
                Some(TypeCategory::UShort) => Value::UShort(scalar.integral().unwrap_or(0) as u16),
                Some(TypeCategory::Char) => Value::Char(scalar.integral().unwrap_or(0) as u16),
                Some(TypeCategory::Int) => Value::Int(scalar.integral().unwrap_or(0) as i32),
                Some(TypeCategory::UInt) => Value::UInt(scalar.integral().unwrap_or(0) as u32),
                Some(TypeCategory::Long) => Value::Long(scalar.integral().unwrap_or(0)),
                Some(TypeCategory::ULong) => Value::ULong(scalar.integral().unwrap_or(0) as u64),
                Some(TypeCategory::Float) => Value::Float(scalar.floating().unwrap_or(0.0) as f32),
                Some(TypeCategory::Double) => Value::Double(scalar.floating().unwrap_or(0.0)),
                _ => scalar.into_value(),
            })
        }
    }
}

/// Converts a structured value into the shape the native call layer expects.
pub fn to_native_value(value: &Value) -> Result<NativeValue> {
    match value {
        Value::Void => Ok(NativeValue::Void),
        Value::Boolean(flag) => Ok(NativeValue::U8(*flag as u8)),
        Value::Char(value) => Ok(NativeValue::U16(*value)),
        Value::SByte(value) => Ok(NativeValue::I8(*value)),
        Value::Byte(value) => Ok(NativeValue::U8(*value)),
        Value::Short(value) => Ok(NativeValue::I16(*value)),
        Value::UShort(value) => Ok(NativeValue::U16(*value)),
        Value::Int(value) => Ok(NativeValue::I32(*value)),
        Value::UInt(value) => Ok(NativeValue::U32(*value)),
        Value::Long(value) => Ok(NativeValue::I64(*value)),
        Value::ULong(value) => Ok(NativeValue::U64(*value)),
        Value::Float(value) => Ok(NativeValue::F32(*value)),
        Value::Double(value) => Ok(NativeValue::F64(*value)),
        Value::ValueType(value_type) => {
            let class = value_type.ty().class();

            // An enum travels as its single backing numeric.
            if class.is_enum() {
                let backing = value_type.field("value__")?.value()?;
                return to_native_value(&backing);
            }

            let mut elements = Vec::new();
            for field in class.fields() {
                if field.is_static() {
                    continue;
                }
                let field_value = field.bind(*value_type)?.value()?;
                elements.push(to_native_value(&field_value)?);
            }

            // An empty struct still occupies a byte, mirroring the
            // call-convention alias of an empty aggregate.
            if elements.is_empty() {
                elements.push(NativeValue::I8(0));
            }

            Ok(NativeValue::Aggregate(elements))
        }
        other => match other.raw_handle() {
            Some(handle) => Ok(NativeValue::Pointer(handle)),
            None => Err(MarshalError::IncompatibleValue {
                expected: "a native call value",
                type_name: other.to_string(),
            }
            .into()),
        },
    }
}

/// The element type behind a pointer-category type record.
fn pointee(ty: &Type) -> Type {
    ty.class()
        .base_type()
        .unwrap_or_else(|| panic!("pointer type {} has no base type", ty.name()))
}

fn copy_payload(destination: *mut c_void, source: *mut c_void, ty: &Type) {
    let size = ty.class().value_type_size();
    unsafe {
        std::ptr::copy_nonoverlapping(source.cast::<u8>(), destination.cast::<u8>(), size);
    }
}

fn expect_integral(value: &Value, ty: &Type) -> Result<i64> {
    value
        .integral()
        .ok_or_else(|| incompatible("an integral value", value, ty))
}

fn expect_floating(value: &Value, ty: &Type) -> Result<f64> {
    value
        .floating()
        .or_else(|| value.integral().map(|integral| integral as f64))
        .ok_or_else(|| incompatible("a floating point value", value, ty))
}

fn expect_handle(value: &Value, ty: &Type) -> Result<*mut c_void> {
    value
        .raw_handle()
        .ok_or_else(|| incompatible("a pointer-shaped value", value, ty))
}

fn incompatible(expected: &'static str, value: &Value, ty: &Type) -> crate::error::Error {
    MarshalError::IncompatibleValue {
        expected,
        type_name: format!("{} (as {})", value, ty.name()),
    }
    .into()
}
