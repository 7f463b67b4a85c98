//! The runtime's exported C entry points.
//!
//! Every export is resolved lazily by name from the loaded module and cached,
//! so attaching never fails on an export the current runtime build happens to
//! lack but this library never calls.

use libloading::{Library, Symbol};
use std::{
    ffi::{c_char, c_void, CStr},
    sync::OnceLock,
};

enum Source {
    Module(Library),
    #[cfg(test)]
    Table(std::collections::HashMap<&'static str, usize>),
}

impl Source {
    fn resolve(&self, name: &'static str) -> usize {
        match self {
            Self::Module(library) => {
                let symbol: Symbol<unsafe extern "C" fn()> = unsafe { library.get(name.as_bytes()) }
                    .unwrap_or_else(|error| panic!("couldn't resolve export {}: {}", name, error));
                *symbol as usize
            }
            #[cfg(test)]
            Self::Table(table) => *table
                .get(name)
                .unwrap_or_else(|| panic!("the fixture runtime doesn't export {}", name)),
        }
    }
}

macro_rules! exports {
    ($($name:ident: $symbol:literal => fn($($arg:ty),*) $(-> $ret:ty)?,)*) => {
        pub(crate) struct Api {
            source: Source,
            $($name: OnceLock<usize>,)*
        }

        impl Api {
            fn with_source(source: Source) -> Self {
                Self {
                    source,
                    $($name: OnceLock::new(),)*
                }
            }

            $(
                pub(crate) fn $name(&self) -> unsafe extern "C" fn($($arg),*) $(-> $ret)? {
                    let address = *self.$name.get_or_init(|| self.source.resolve($symbol));
                    unsafe {
                        std::mem::transmute::<usize, unsafe extern "C" fn($($arg),*) $(-> $ret)?>(
                            address,
                        )
                    }
                }
            )*
        }
    };
}

exports! {
    alloc: "il2cpp_alloc" => fn(usize) -> *mut c_void,
    array_get_length: "il2cpp_array_length" => fn(*mut c_void) -> u32,
    array_new: "il2cpp_array_new" => fn(*mut c_void, u32) -> *mut c_void,
    assembly_get_image: "il2cpp_assembly_get_image" => fn(*mut c_void) -> *mut c_void,
    class_from_name: "il2cpp_class_from_name" => fn(*mut c_void, *const c_char, *const c_char) -> *mut c_void,
    class_from_system_type: "il2cpp_class_from_system_type" => fn(*mut c_void) -> *mut c_void,
    class_get_array_element_size: "il2cpp_class_array_element_size" => fn(*mut c_void) -> i32,
    class_get_base_type: "il2cpp_class_enum_basetype" => fn(*mut c_void) -> *mut c_void,
    class_get_element_class: "il2cpp_class_get_element_class" => fn(*mut c_void) -> *mut c_void,
    class_get_field_from_name: "il2cpp_class_get_field_from_name" => fn(*mut c_void, *const c_char) -> *mut c_void,
    class_get_fields: "il2cpp_class_get_fields" => fn(*mut c_void, *mut *mut c_void) -> *mut c_void,
    class_get_flags: "il2cpp_class_get_flags" => fn(*mut c_void) -> i32,
    class_get_image: "il2cpp_class_get_image" => fn(*mut c_void) -> *mut c_void,
    class_get_instance_size: "il2cpp_class_instance_size" => fn(*mut c_void) -> i32,
    class_get_interfaces: "il2cpp_class_get_interfaces" => fn(*mut c_void, *mut *mut c_void) -> *mut c_void,
    class_get_method_from_name: "il2cpp_class_get_method_from_name" => fn(*mut c_void, *const c_char, i32) -> *mut c_void,
    class_get_methods: "il2cpp_class_get_methods" => fn(*mut c_void, *mut *mut c_void) -> *mut c_void,
    class_get_name: "il2cpp_class_get_name" => fn(*mut c_void) -> *const c_char,
    class_get_namespace: "il2cpp_class_get_namespace" => fn(*mut c_void) -> *const c_char,
    class_get_nested_types: "il2cpp_class_get_nested_types" => fn(*mut c_void, *mut *mut c_void) -> *mut c_void,
    class_get_parent: "il2cpp_class_get_parent" => fn(*mut c_void) -> *mut c_void,
    class_get_static_field_data: "il2cpp_class_get_static_field_data" => fn(*mut c_void) -> *mut c_void,
    class_get_type: "il2cpp_class_get_type" => fn(*mut c_void) -> *mut c_void,
    class_get_value_type_size: "il2cpp_class_value_size" => fn(*mut c_void, *mut u32) -> i32,
    class_initialize: "il2cpp_runtime_class_init" => fn(*mut c_void),
    class_is_abstract: "il2cpp_class_is_abstract" => fn(*mut c_void) -> bool,
    class_is_assignable_from: "il2cpp_class_is_assignable_from" => fn(*mut c_void, *mut c_void) -> bool,
    class_is_blittable: "il2cpp_class_is_blittable" => fn(*mut c_void) -> bool,
    class_is_enum: "il2cpp_class_is_enum" => fn(*mut c_void) -> bool,
    class_is_generic: "il2cpp_class_is_generic" => fn(*mut c_void) -> bool,
    class_is_inflated: "il2cpp_class_is_inflated" => fn(*mut c_void) -> bool,
    class_is_interface: "il2cpp_class_is_interface" => fn(*mut c_void) -> bool,
    class_is_subclass_of: "il2cpp_class_is_subclass_of" => fn(*mut c_void, *mut c_void, bool) -> bool,
    class_is_value_type: "il2cpp_class_is_valuetype" => fn(*mut c_void) -> bool,
    domain_get: "il2cpp_domain_get" => fn() -> *mut c_void,
    domain_get_assemblies: "il2cpp_domain_get_assemblies" => fn(*mut c_void, *mut usize) -> *mut *mut c_void,
    field_get_flags: "il2cpp_field_get_flags" => fn(*mut c_void) -> i32,
    field_get_name: "il2cpp_field_get_name" => fn(*mut c_void) -> *const c_char,
    field_get_offset: "il2cpp_field_get_offset" => fn(*mut c_void) -> i32,
    field_get_parent: "il2cpp_field_get_parent" => fn(*mut c_void) -> *mut c_void,
    field_get_type: "il2cpp_field_get_type" => fn(*mut c_void) -> *mut c_void,
    field_static_get_value: "il2cpp_field_static_get_value" => fn(*mut c_void, *mut c_void),
    field_static_set_value: "il2cpp_field_static_set_value" => fn(*mut c_void, *mut c_void),
    free: "il2cpp_free" => fn(*mut c_void),
    get_corlib: "il2cpp_get_corlib" => fn() -> *mut c_void,
    image_get_assembly: "il2cpp_image_get_assembly" => fn(*mut c_void) -> *mut c_void,
    image_get_class: "il2cpp_image_get_class" => fn(*mut c_void, u32) -> *mut c_void,
    image_get_class_count: "il2cpp_image_get_class_count" => fn(*mut c_void) -> u32,
    image_get_name: "il2cpp_image_get_name" => fn(*mut c_void) -> *const c_char,
    method_get_class: "il2cpp_method_get_class" => fn(*mut c_void) -> *mut c_void,
    method_get_flags: "il2cpp_method_get_flags" => fn(*mut c_void, *mut u32) -> u32,
    method_get_name: "il2cpp_method_get_name" => fn(*mut c_void) -> *const c_char,
    method_get_object: "il2cpp_method_get_object" => fn(*mut c_void, *mut c_void) -> *mut c_void,
    method_get_parameter_count: "il2cpp_method_get_param_count" => fn(*mut c_void) -> u8,
    method_get_parameter_name: "il2cpp_method_get_param_name" => fn(*mut c_void, u32) -> *const c_char,
    method_get_parameter_type: "il2cpp_method_get_param" => fn(*mut c_void, u32) -> *mut c_void,
    method_get_return_type: "il2cpp_method_get_return_type" => fn(*mut c_void) -> *mut c_void,
    method_is_generic: "il2cpp_method_is_generic" => fn(*mut c_void) -> bool,
    method_is_inflated: "il2cpp_method_is_inflated" => fn(*mut c_void) -> bool,
    method_is_instance: "il2cpp_method_is_instance" => fn(*mut c_void) -> bool,
    object_get_class: "il2cpp_object_get_class" => fn(*mut c_void) -> *mut c_void,
    object_get_size: "il2cpp_object_get_size" => fn(*mut c_void) -> u32,
    object_get_virtual_method: "il2cpp_object_get_virtual_method" => fn(*mut c_void, *mut c_void) -> *mut c_void,
    object_initialize: "il2cpp_runtime_object_init_exception" => fn(*mut c_void, *mut *mut c_void),
    object_new: "il2cpp_object_new" => fn(*mut c_void) -> *mut c_void,
    object_unbox: "il2cpp_object_unbox" => fn(*mut c_void) -> *mut c_void,
    string_get_chars: "il2cpp_string_chars" => fn(*mut c_void) -> *const u16,
    string_get_length: "il2cpp_string_length" => fn(*mut c_void) -> i32,
    string_new: "il2cpp_string_new" => fn(*const c_char) -> *mut c_void,
    type_get_class: "il2cpp_class_from_type" => fn(*mut c_void) -> *mut c_void,
    type_get_name: "il2cpp_type_get_name" => fn(*mut c_void) -> *mut c_char,
    type_get_object: "il2cpp_type_get_object" => fn(*mut c_void) -> *mut c_void,
    type_get_type_enum: "il2cpp_type_get_type" => fn(*mut c_void) -> i32,
    value_box: "il2cpp_value_box" => fn(*mut c_void, *mut c_void) -> *mut c_void,
}

impl Api {
    pub(crate) fn open(path: impl AsRef<std::ffi::OsStr>) -> Result<Self, libloading::Error> {
        let library = unsafe { Library::new(path.as_ref()) }?;
        Ok(Self::with_source(Source::Module(library)))
    }

    #[cfg(test)]
    pub(crate) fn from_table(table: std::collections::HashMap<&'static str, usize>) -> Self {
        Self::with_source(Source::Table(table))
    }

    /// Reads a NUL-terminated string the runtime owns.
    pub(crate) unsafe fn read_string(&self, chars: *const c_char) -> String {
        if chars.is_null() {
            return String::new();
        }
        unsafe { CStr::from_ptr(chars) }.to_string_lossy().into_owned()
    }

    /// Reads a NUL-terminated string the runtime allocated for us, then
    /// returns the allocation.
    pub(crate) unsafe fn read_owned_string(&self, chars: *mut c_char) -> String {
        let content = unsafe { self.read_string(chars) };
        if !chars.is_null() {
            unsafe { self.free()(chars.cast()) };
        }
        content
    }
}
