//! An in-process fake IL2CPP runtime backing the tests.
//!
//! A handful of metadata records, real C ABI entry points over them, and a
//! few compiled method bodies: enough for the probes to anchor on and for the
//! call paths to run for real through libffi. Everything is leaked on
//! purpose, mirroring the process-lifetime model of the metadata this crate
//! reads.
//!
//! The fixture's struct receiver convention is "headers included": value-type
//! method bodies expect a boxed receiver and skip the header themselves.

use crate::{api::Api, runtime::Il2Cpp};
use std::{
    collections::HashMap,
    ffi::{c_char, c_void, CStr, CString},
    ptr::null_mut,
    sync::OnceLock,
};

pub(crate) const HEADER: usize = 16;

// Field attribute bits, matching the runtime's metadata encoding.
const FIELD_PUBLIC: i32 = 0x0006;
const FIELD_STATIC: i32 = 0x0010;
const FIELD_LITERAL: i32 = 0x0040;
const FIELD_HAS_DEFAULT: i32 = 0x8000;

const METHOD_PUBLIC: u32 = 0x0006;
const METHOD_STATIC: u32 = 0x0010;

#[repr(C)]
struct TypeRecord {
    category: i32,
    class: *mut ClassRecord,
    name: *const c_char,
}

#[derive(Default)]
struct ClassFlags {
    value_type: bool,
    enumeration: bool,
    interface: bool,
    abstract_: bool,
    generic: bool,
    inflated: bool,
    blittable: bool,
}

#[repr(C)]
struct ClassRecord {
    name: *const c_char,
    namespace: *const c_char,
    ty: *mut TypeRecord,
    parent: *mut ClassRecord,
    base_type: *mut TypeRecord,
    element_class: *mut ClassRecord,
    fields: Vec<*mut FieldRecord>,
    methods: Vec<*mut MethodRecord>,
    interfaces: Vec<*mut ClassRecord>,
    nested: Vec<*mut ClassRecord>,
    image: *mut ImageRecord,
    instance_size: i32,
    value_size: i32,
    element_size: i32,
    flags: ClassFlags,
}

#[repr(C)]
struct FieldRecord {
    name: *const c_char,
    ty: *mut TypeRecord,
    parent: *mut ClassRecord,
    offset: i32,
    flags: i32,
    storage: *mut u8,
}

#[repr(C)]
struct ParameterRecord {
    name: *const c_char,
    ty: *mut TypeRecord,
}

// The virtual address slot deliberately sits at a nonzero offset so the
// probe has something to find.
#[repr(C)]
struct MethodRecord {
    name: *const c_char,
    class: *mut ClassRecord,
    return_type: *mut TypeRecord,
    parameters: Vec<ParameterRecord>,
    flags: u32,
    instance: bool,
    virtual_address: *mut c_void,
}

#[repr(C)]
struct ImageRecord {
    name: *const c_char,
    assembly: *mut AssemblyRecord,
    classes: Vec<*mut ClassRecord>,
}

#[repr(C)]
struct AssemblyRecord {
    image: *mut ImageRecord,
}

#[repr(C)]
struct DomainRecord {
    assemblies: Vec<*mut AssemblyRecord>,
}

pub(crate) struct Fixture {
    domain: *mut DomainRecord,
    corlib: *mut ImageRecord,
    string_class: *mut ClassRecord,
    array_classes: Vec<(*mut ClassRecord, *mut ClassRecord)>,
}

unsafe impl Send for Fixture {}
unsafe impl Sync for Fixture {}

static FIXTURE: OnceLock<Fixture> = OnceLock::new();

fn fixture() -> &'static Fixture {
    FIXTURE.get_or_init(|| unsafe { build() })
}

/// Attaches the process-wide runtime context to the fixture. Every test goes
/// through here; the first call wins and the rest reuse it.
pub(crate) fn attach() -> &'static Il2Cpp {
    let _ = fixture();
    Il2Cpp::attach_with_api(Api::from_table(exports::table()))
}

fn leak<T>(value: T) -> *mut T {
    Box::into_raw(Box::new(value))
}

fn cstr(text: &str) -> *const c_char {
    CString::new(text).unwrap().into_raw()
}

fn zeroed(size: usize) -> *mut u8 {
    let layout = std::alloc::Layout::from_size_align(size.max(1), 16).unwrap();
    unsafe { std::alloc::alloc_zeroed(layout) }
}

fn new_class(name: &str, namespace: &str, image: *mut ImageRecord) -> *mut ClassRecord {
    let class = leak(ClassRecord {
        name: cstr(name),
        namespace: cstr(namespace),
        ty: null_mut(),
        parent: null_mut(),
        base_type: null_mut(),
        element_class: null_mut(),
        fields: Vec::new(),
        methods: Vec::new(),
        interfaces: Vec::new(),
        nested: Vec::new(),
        image,
        instance_size: HEADER as i32,
        value_size: 0,
        element_size: 0,
        flags: ClassFlags::default(),
    });
    unsafe { (*image).classes.push(class) };
    class
}

unsafe fn set_type(class: *mut ClassRecord, category: i32, full_name: &str) -> *mut TypeRecord {
    let ty = leak(TypeRecord {
        category,
        class,
        name: cstr(full_name),
    });
    unsafe { (*class).ty = ty };
    ty
}

unsafe fn add_field(
    class: *mut ClassRecord,
    name: &str,
    ty: *mut TypeRecord,
    offset: i32,
    flags: i32,
    storage: usize,
) -> *mut FieldRecord {
    let field = leak(FieldRecord {
        name: cstr(name),
        ty,
        parent: class,
        offset,
        flags,
        storage: if storage > 0 { zeroed(storage) } else { null_mut() },
    });
    unsafe { (*class).fields.push(field) };
    field
}

unsafe fn add_method(
    class: *mut ClassRecord,
    name: &str,
    return_type: *mut TypeRecord,
    parameters: &[(&str, *mut TypeRecord)],
    is_static: bool,
    virtual_address: *mut c_void,
) -> *mut MethodRecord {
    let method = leak(MethodRecord {
        name: cstr(name),
        class,
        return_type,
        parameters: parameters
            .iter()
            .map(|(name, ty)| ParameterRecord {
                name: cstr(name),
                ty: *ty,
            })
            .collect(),
        flags: METHOD_PUBLIC | if is_static { METHOD_STATIC } else { 0 },
        instance: !is_static,
        virtual_address,
    });
    unsafe { (*class).methods.push(method) };
    method
}

// ── Compiled method bodies ──────────────────────────────────────────────

#[repr(C)]
#[derive(Clone, Copy)]
struct PointRepr {
    x: i32,
    y: i32,
}

unsafe extern "C" fn body_add(a: i32, b: i32) -> i32 {
    a.wrapping_add(b)
}

unsafe extern "C" fn body_mul(a: i32, b: i32) -> i32 {
    a.wrapping_mul(b)
}

unsafe extern "C" fn body_sum_point(point: PointRepr) -> i32 {
    point.x.wrapping_add(point.y)
}

unsafe extern "C" fn body_make_point(x: i32, y: i32) -> PointRepr {
    PointRepr { x, y }
}

// Value-type receivers arrive boxed in this fixture, the body skips the
// header itself.
unsafe extern "C" fn body_scale_point(instance: *mut c_void, factor: i32) -> i32 {
    let point = unsafe { instance.cast::<u8>().add(HEADER).cast::<PointRepr>().read_unaligned() };
    point.x.wrapping_add(point.y).wrapping_mul(factor)
}

unsafe extern "C" fn body_offset_point(instance: *mut c_void, amount: i32) -> i32 {
    let point = unsafe { instance.cast::<u8>().add(HEADER).cast::<PointRepr>().read_unaligned() };
    point.x.wrapping_add(point.y).wrapping_add(amount)
}

unsafe extern "C" fn body_int64_equals_int64(instance: *mut c_void, other: i64) -> bool {
    unsafe { instance.cast::<u8>().add(HEADER).cast::<i64>().read_unaligned() == other }
}

unsafe extern "C" fn body_int64_equals_object(instance: *mut c_void, other: *mut c_void) -> bool {
    if other.is_null() {
        return false;
    }
    unsafe {
        instance.cast::<u8>().add(HEADER).cast::<i64>().read_unaligned()
            == other.cast::<u8>().add(HEADER).cast::<i64>().read_unaligned()
    }
}

unsafe extern "C" fn body_string_to_char_array(instance: *mut c_void) -> *mut c_void {
    let length = unsafe { instance.cast::<u8>().add(HEADER).cast::<i32>().read_unaligned() } as usize;
    let chars = unsafe { instance.cast::<u8>().add(HEADER + 4).cast::<u16>() };

    let fx = fixture();
    let char_class = unsafe { (*fx.string_class).element_class };
    let array = exports::new_array(char_class, length as u32);
    unsafe {
        std::ptr::copy_nonoverlapping(chars, array.cast::<u8>().add(24).cast::<u16>(), length);
    }
    array
}

// Never invoked, only its address matters: the virtual address probe anchors
// on the delegate that carries this function pointer.
unsafe extern "C" fn body_filter_type_name(_module: *mut c_void, _name: *mut c_void) -> bool {
    false
}

// ── Record assembly ─────────────────────────────────────────────────────

unsafe fn build() -> Fixture {
    let corlib = leak(ImageRecord {
        name: cstr("mscorlib.dll"),
        assembly: null_mut(),
        classes: Vec::new(),
    });
    let assembly = leak(AssemblyRecord { image: corlib });
    unsafe { (*corlib).assembly = assembly };
    let domain = leak(DomainRecord {
        assemblies: vec![assembly],
    });

    unsafe {
        // System.Object is the hierarchy root and defines the header size.
        let object_class = new_class("Object", "System", corlib);
        let object_ty = set_type(object_class, 0x1c, "System.Object");

        // Primitive value types.
        let primitive = |name: &str, category: i32, size: i32| {
            let class = new_class(name, "System", corlib);
            (*class).flags.value_type = true;
            (*class).flags.blittable = true;
            (*class).parent = object_class;
            (*class).value_size = size;
            (*class).element_size = size;
            (*class).instance_size = HEADER as i32 + size;
            set_type(class, category, &format!("System.{}", name));
            class
        };

        let boolean_class = primitive("Boolean", 0x02, 1);
        let char_class = primitive("Char", 0x03, 2);
        let sbyte_class = primitive("SByte", 0x04, 1);
        let byte_class = primitive("Byte", 0x05, 1);
        let short_class = primitive("Int16", 0x06, 2);
        let ushort_class = primitive("UInt16", 0x07, 2);
        let int32_class = primitive("Int32", 0x08, 4);
        let uint32_class = primitive("UInt32", 0x09, 4);
        let int64_class = primitive("Int64", 0x0a, 8);
        let uint64_class = primitive("UInt64", 0x0b, 8);
        let single_class = primitive("Single", 0x0c, 4);
        let double_class = primitive("Double", 0x0d, 8);
        let intptr_class = primitive("IntPtr", 0x18, 8);
        let _ = (
            sbyte_class,
            byte_class,
            short_class,
            ushort_class,
            uint32_class,
            uint64_class,
            single_class,
            double_class,
        );

        let boolean_ty = (*boolean_class).ty;
        let char_ty = (*char_class).ty;
        let int32_ty = (*int32_class).ty;
        let int64_ty = (*int64_class).ty;
        let intptr_ty = (*intptr_class).ty;
        let void_class = new_class("Void", "System", corlib);
        (*void_class).flags.value_type = true;
        let void_ty = set_type(void_class, 0x01, "System.Void");

        add_field(int32_class, "m_value", int32_ty, HEADER as i32, FIELD_PUBLIC, 0);
        add_field(int64_class, "m_value", int64_ty, HEADER as i32, FIELD_PUBLIC, 0);

        // System.Int64 carries the struct receiver probe anchors.
        add_method(
            int64_class,
            "Equals",
            boolean_ty,
            &[("obj", int64_ty)],
            false,
            body_int64_equals_int64 as unsafe extern "C" fn(*mut c_void, i64) -> bool as *mut c_void,
        );
        add_method(
            int64_class,
            "Equals",
            boolean_ty,
            &[("obj", object_ty)],
            false,
            body_int64_equals_object as unsafe extern "C" fn(*mut c_void, *mut c_void) -> bool
                as *mut c_void,
        );

        // System.String and the Char[] array class behind ToCharArray.
        let string_class = new_class("String", "System", corlib);
        (*string_class).parent = object_class;
        let string_ty = set_type(string_class, 0x0e, "System.String");
        let _ = string_ty;

        let char_array_class = new_class("Char[]", "System", corlib);
        (*char_array_class).parent = object_class;
        (*char_array_class).base_type = char_ty;
        (*char_array_class).element_class = char_class;
        (*char_array_class).element_size = 2;
        let char_array_ty = set_type(char_array_class, 0x1d, "System.Char[]");

        let int32_array_class = new_class("Int32[]", "System", corlib);
        (*int32_array_class).parent = object_class;
        (*int32_array_class).base_type = int32_ty;
        (*int32_array_class).element_class = int32_class;
        (*int32_array_class).element_size = 4;
        set_type(int32_array_class, 0x1d, "System.Int32[]");

        (*string_class).element_class = char_class;
        add_method(
            string_class,
            "ToCharArray",
            char_array_ty,
            &[],
            false,
            body_string_to_char_array as unsafe extern "C" fn(*mut c_void) -> *mut c_void
                as *mut c_void,
        );

        // System.Reflection.Module and the delegate the virtual address
        // probe anchors on.
        let filter_class = new_class("TypeNameFilter", "System.Reflection", corlib);
        (*filter_class).parent = object_class;
        (*filter_class).instance_size = HEADER as i32 + 16;
        let filter_ty = set_type(filter_class, 0x12, "System.Reflection.TypeNameFilter");
        add_field(filter_class, "method_ptr", intptr_ty, HEADER as i32, FIELD_PUBLIC, 0);
        add_field(filter_class, "method", intptr_ty, HEADER as i32 + 8, FIELD_PUBLIC, 0);

        let module_class = new_class("Module", "System.Reflection", corlib);
        (*module_class).parent = object_class;
        set_type(module_class, 0x12, "System.Reflection.Module");

        let filter_pointer = body_filter_type_name
            as unsafe extern "C" fn(*mut c_void, *mut c_void) -> bool
            as *mut c_void;
        let filter_method = add_method(
            module_class,
            "FilterTypeNameImpl",
            boolean_ty,
            &[("m", intptr_ty), ("filterCriteria", intptr_ty)],
            true,
            filter_pointer,
        );

        let delegate = zeroed(HEADER + 16);
        delegate.cast::<*mut ClassRecord>().write(filter_class);
        delegate.add(HEADER).cast::<*mut c_void>().write(filter_pointer);
        delegate
            .add(HEADER + 8)
            .cast::<*mut MethodRecord>()
            .write(filter_method);

        let filter_field = add_field(
            module_class,
            "FilterTypeName",
            filter_ty,
            0,
            FIELD_PUBLIC | FIELD_STATIC,
            size_of::<usize>(),
        );
        (*filter_field)
            .storage
            .cast::<*mut u8>()
            .write(delegate);

        // System.AppDomain holds the known thread static field; the reserved
        // offset marks thread static storage.
        let appdomain_class = new_class("AppDomain", "System", corlib);
        (*appdomain_class).parent = object_class;
        set_type(appdomain_class, 0x12, "System.AppDomain");
        add_field(
            appdomain_class,
            "type_resolve_in_progress",
            boolean_ty,
            -1,
            FIELD_PUBLIC | FIELD_STATIC,
            0,
        );

        // Test-only types under the Fixtures namespace.
        let point_class = new_class("Point", "Fixtures", corlib);
        (*point_class).flags.value_type = true;
        (*point_class).flags.blittable = true;
        (*point_class).parent = object_class;
        (*point_class).value_size = 8;
        (*point_class).instance_size = HEADER as i32 + 8;
        let point_ty = set_type(point_class, 0x11, "Fixtures.Point");
        add_field(point_class, "x", int32_ty, HEADER as i32, FIELD_PUBLIC, 0);
        add_field(point_class, "y", int32_ty, HEADER as i32 + 4, FIELD_PUBLIC, 0);

        add_method(
            point_class,
            "Add",
            int32_ty,
            &[("a", int32_ty), ("b", int32_ty)],
            true,
            body_add as unsafe extern "C" fn(i32, i32) -> i32 as *mut c_void,
        );
        add_method(
            point_class,
            "Mul",
            int32_ty,
            &[("a", int32_ty), ("b", int32_ty)],
            true,
            body_mul as unsafe extern "C" fn(i32, i32) -> i32 as *mut c_void,
        );
        add_method(
            point_class,
            "Sum",
            int32_ty,
            &[("point", point_ty)],
            true,
            body_sum_point as unsafe extern "C" fn(PointRepr) -> i32 as *mut c_void,
        );
        add_method(
            point_class,
            "Make",
            point_ty,
            &[("x", int32_ty), ("y", int32_ty)],
            true,
            body_make_point as unsafe extern "C" fn(i32, i32) -> PointRepr as *mut c_void,
        );
        add_method(
            point_class,
            "Scale",
            int32_ty,
            &[("factor", int32_ty)],
            false,
            body_scale_point as unsafe extern "C" fn(*mut c_void, i32) -> i32 as *mut c_void,
        );
        add_method(
            point_class,
            "Offset",
            int32_ty,
            &[("amount", int32_ty)],
            false,
            body_offset_point as unsafe extern "C" fn(*mut c_void, i32) -> i32 as *mut c_void,
        );
        add_method(point_class, "Broken", void_ty, &[], true, null_mut());

        let color_class = new_class("Color", "Fixtures", corlib);
        (*color_class).flags.value_type = true;
        (*color_class).flags.enumeration = true;
        (*color_class).parent = object_class;
        (*color_class).base_type = int32_ty;
        (*color_class).value_size = 4;
        (*color_class).instance_size = HEADER as i32 + 4;
        set_type(color_class, 0x11, "Fixtures.Color");
        add_field(color_class, "value__", int32_ty, HEADER as i32, FIELD_PUBLIC, 0);

        let empty_class = new_class("Empty", "Fixtures", corlib);
        (*empty_class).flags.value_type = true;
        (*empty_class).parent = object_class;
        (*empty_class).value_size = 1;
        (*empty_class).instance_size = HEADER as i32 + 1;
        set_type(empty_class, 0x11, "Fixtures.Empty");

        let statics_class = new_class("Statics", "Fixtures", corlib);
        (*statics_class).parent = object_class;
        set_type(statics_class, 0x12, "Fixtures.Statics");
        add_field(
            statics_class,
            "Counter",
            int32_ty,
            0,
            FIELD_PUBLIC | FIELD_STATIC,
            size_of::<usize>(),
        );
        let seven = add_field(
            statics_class,
            "Seven",
            int32_ty,
            0,
            FIELD_PUBLIC | FIELD_STATIC | FIELD_LITERAL | FIELD_HAS_DEFAULT,
            size_of::<usize>(),
        );
        (*seven).storage.cast::<i32>().write(7);

        // An inheritance chain for overload resolution.
        let parent_class = new_class("Parent", "Fixtures", corlib);
        (*parent_class).parent = object_class;
        let parent_ty = set_type(parent_class, 0x12, "Fixtures.Parent");

        let child1_class = new_class("Child1", "Fixtures", corlib);
        (*child1_class).parent = parent_class;
        let child1_ty = set_type(child1_class, 0x12, "Fixtures.Child1");

        let child11_class = new_class("Child11", "Fixtures", corlib);
        (*child11_class).parent = child1_class;
        set_type(child11_class, 0x12, "Fixtures.Child11");

        let methods_class = new_class("Methods", "Fixtures", corlib);
        (*methods_class).parent = object_class;
        set_type(methods_class, 0x12, "Fixtures.Methods");
        add_method(methods_class, "Foo", void_ty, &[("obj", parent_ty)], true, null_mut());
        add_method(methods_class, "Foo", void_ty, &[("obj", child1_ty)], true, null_mut());
        add_method(methods_class, "Bar", void_ty, &[("obj", parent_ty)], true, null_mut());

        Fixture {
            domain,
            corlib,
            string_class,
            array_classes: vec![
                (char_class, char_array_class),
                (int32_class, int32_array_class),
            ],
        }
    }
}

// ── Exported C entry points ─────────────────────────────────────────────

mod exports {
    use super::*;

    unsafe fn class(handle: *mut c_void) -> &'static ClassRecord {
        unsafe { &*handle.cast::<ClassRecord>() }
    }

    unsafe fn method(handle: *mut c_void) -> &'static MethodRecord {
        unsafe { &*handle.cast::<MethodRecord>() }
    }

    unsafe fn field(handle: *mut c_void) -> &'static FieldRecord {
        unsafe { &*handle.cast::<FieldRecord>() }
    }

    unsafe fn type_record(handle: *mut c_void) -> &'static TypeRecord {
        unsafe { &*handle.cast::<TypeRecord>() }
    }

    fn drain<T>(items: &[*mut T], iter: *mut *mut c_void) -> *mut c_void {
        let cursor = unsafe { *iter } as usize;
        if cursor < items.len() {
            unsafe { *iter = (cursor + 1) as *mut c_void };
            items[cursor].cast()
        } else {
            null_mut()
        }
    }

    unsafe fn type_value_size(ty: *mut TypeRecord) -> usize {
        match unsafe { (*ty).category } {
            0x02 | 0x04 | 0x05 => 1,
            0x03 | 0x06 | 0x07 => 2,
            0x08 | 0x09 | 0x0c => 4,
            0x0a | 0x0b | 0x0d => 8,
            0x11 => unsafe { (*(*ty).class).value_size as usize },
            _ => size_of::<usize>(),
        }
    }

    pub(super) fn new_array(element_class: *mut ClassRecord, length: u32) -> *mut c_void {
        let fx = fixture();
        let array_class = fx
            .array_classes
            .iter()
            .find(|(element, _)| *element == element_class)
            .map(|(_, array)| *array)
            .unwrap_or_else(|| panic!("the fixture has no array class for this element class"));

        let element_size = unsafe { (*element_class).element_size } as usize;
        let storage = zeroed(24 + element_size * length as usize);
        unsafe {
            storage.cast::<*mut ClassRecord>().write(array_class);
            storage.add(16).cast::<u32>().write(length);
        }
        storage.cast()
    }

    unsafe extern "C" fn alloc(size: usize) -> *mut c_void {
        zeroed(size).cast()
    }

    unsafe extern "C" fn free(_pointer: *mut c_void) {}

    unsafe extern "C" fn array_get_length(array: *mut c_void) -> u32 {
        unsafe { array.cast::<u8>().add(16).cast::<u32>().read() }
    }

    unsafe extern "C" fn array_new(element_class: *mut c_void, length: u32) -> *mut c_void {
        new_array(element_class.cast(), length)
    }

    unsafe extern "C" fn assembly_get_image(assembly: *mut c_void) -> *mut c_void {
        unsafe { (*assembly.cast::<AssemblyRecord>()).image.cast() }
    }

    unsafe extern "C" fn class_from_name(
        image: *mut c_void,
        namespace: *const c_char,
        name: *const c_char,
    ) -> *mut c_void {
        let image = unsafe { &*image.cast::<ImageRecord>() };
        let namespace = unsafe { CStr::from_ptr(namespace) };
        let name = unsafe { CStr::from_ptr(name) };

        for &candidate in &image.classes {
            let record = unsafe { &*candidate };
            if unsafe { CStr::from_ptr(record.name) } == name
                && unsafe { CStr::from_ptr(record.namespace) } == namespace
            {
                return candidate.cast();
            }
        }
        null_mut()
    }

    unsafe extern "C" fn class_from_system_type(_object: *mut c_void) -> *mut c_void {
        null_mut()
    }

    unsafe extern "C" fn class_get_array_element_size(handle: *mut c_void) -> i32 {
        unsafe { class(handle).element_size }
    }

    unsafe extern "C" fn class_get_base_type(handle: *mut c_void) -> *mut c_void {
        unsafe { class(handle).base_type.cast() }
    }

    unsafe extern "C" fn class_get_element_class(handle: *mut c_void) -> *mut c_void {
        unsafe { class(handle).element_class.cast() }
    }

    unsafe extern "C" fn class_get_field_from_name(
        handle: *mut c_void,
        name: *const c_char,
    ) -> *mut c_void {
        let name = unsafe { CStr::from_ptr(name) };
        let mut current = handle.cast::<ClassRecord>();
        while !current.is_null() {
            let record = unsafe { &*current };
            for &candidate in &record.fields {
                if unsafe { CStr::from_ptr((*candidate).name) } == name {
                    return candidate.cast();
                }
            }
            current = record.parent;
        }
        null_mut()
    }

    unsafe extern "C" fn class_get_fields(
        handle: *mut c_void,
        iter: *mut *mut c_void,
    ) -> *mut c_void {
        drain(unsafe { &class(handle).fields }, iter)
    }

    unsafe extern "C" fn class_get_flags(_handle: *mut c_void) -> i32 {
        0
    }

    unsafe extern "C" fn class_get_image(handle: *mut c_void) -> *mut c_void {
        unsafe { class(handle).image.cast() }
    }

    unsafe extern "C" fn class_get_instance_size(handle: *mut c_void) -> i32 {
        unsafe { class(handle).instance_size }
    }

    unsafe extern "C" fn class_get_interfaces(
        handle: *mut c_void,
        iter: *mut *mut c_void,
    ) -> *mut c_void {
        drain(unsafe { &class(handle).interfaces }, iter)
    }

    unsafe extern "C" fn class_get_method_from_name(
        handle: *mut c_void,
        name: *const c_char,
        parameter_count: i32,
    ) -> *mut c_void {
        let name = unsafe { CStr::from_ptr(name) };
        let mut current = handle.cast::<ClassRecord>();
        while !current.is_null() {
            let record = unsafe { &*current };
            for &candidate in &record.methods {
                let candidate_record = unsafe { &*candidate };
                if unsafe { CStr::from_ptr(candidate_record.name) } == name
                    && (parameter_count < 0
                        || candidate_record.parameters.len() == parameter_count as usize)
                {
                    return candidate.cast();
                }
            }
            current = record.parent;
        }
        null_mut()
    }

    unsafe extern "C" fn class_get_methods(
        handle: *mut c_void,
        iter: *mut *mut c_void,
    ) -> *mut c_void {
        drain(unsafe { &class(handle).methods }, iter)
    }

    unsafe extern "C" fn class_get_name(handle: *mut c_void) -> *const c_char {
        unsafe { class(handle).name }
    }

    unsafe extern "C" fn class_get_namespace(handle: *mut c_void) -> *const c_char {
        unsafe { class(handle).namespace }
    }

    unsafe extern "C" fn class_get_nested_types(
        handle: *mut c_void,
        iter: *mut *mut c_void,
    ) -> *mut c_void {
        drain(unsafe { &class(handle).nested }, iter)
    }

    unsafe extern "C" fn class_get_parent(handle: *mut c_void) -> *mut c_void {
        unsafe { class(handle).parent.cast() }
    }

    unsafe extern "C" fn class_get_static_field_data(_handle: *mut c_void) -> *mut c_void {
        null_mut()
    }

    unsafe extern "C" fn class_get_type(handle: *mut c_void) -> *mut c_void {
        unsafe { class(handle).ty.cast() }
    }

    unsafe extern "C" fn class_get_value_type_size(
        handle: *mut c_void,
        _align: *mut u32,
    ) -> i32 {
        unsafe { class(handle).value_size }
    }

    unsafe extern "C" fn class_initialize(_handle: *mut c_void) {}

    unsafe extern "C" fn class_is_abstract(handle: *mut c_void) -> bool {
        unsafe { class(handle).flags.abstract_ }
    }

    unsafe extern "C" fn class_is_assignable_from(
        target: *mut c_void,
        source: *mut c_void,
    ) -> bool {
        let mut current = source.cast::<ClassRecord>();
        while !current.is_null() {
            if current.cast::<c_void>() == target {
                return true;
            }
            let record = unsafe { &*current };
            if record
                .interfaces
                .iter()
                .any(|&interface| interface.cast::<c_void>() == target)
            {
                return true;
            }
            current = record.parent;
        }
        false
    }

    unsafe extern "C" fn class_is_blittable(handle: *mut c_void) -> bool {
        unsafe { class(handle).flags.blittable }
    }

    unsafe extern "C" fn class_is_enum(handle: *mut c_void) -> bool {
        unsafe { class(handle).flags.enumeration }
    }

    unsafe extern "C" fn class_is_generic(handle: *mut c_void) -> bool {
        unsafe { class(handle).flags.generic }
    }

    unsafe extern "C" fn class_is_inflated(handle: *mut c_void) -> bool {
        unsafe { class(handle).flags.inflated }
    }

    unsafe extern "C" fn class_is_interface(handle: *mut c_void) -> bool {
        unsafe { class(handle).flags.interface }
    }

    unsafe extern "C" fn class_is_subclass_of(
        handle: *mut c_void,
        parent: *mut c_void,
        check_interfaces: bool,
    ) -> bool {
        let mut current = unsafe { class(handle).parent };
        while !current.is_null() {
            if current.cast::<c_void>() == parent {
                return true;
            }
            let record = unsafe { &*current };
            if check_interfaces
                && record
                    .interfaces
                    .iter()
                    .any(|&interface| interface.cast::<c_void>() == parent)
            {
                return true;
            }
            current = record.parent;
        }
        false
    }

    unsafe extern "C" fn class_is_value_type(handle: *mut c_void) -> bool {
        unsafe { class(handle).flags.value_type }
    }

    unsafe extern "C" fn domain_get() -> *mut c_void {
        fixture().domain.cast()
    }

    unsafe extern "C" fn domain_get_assemblies(
        domain: *mut c_void,
        count: *mut usize,
    ) -> *mut *mut c_void {
        let domain = unsafe { &*domain.cast::<DomainRecord>() };
        unsafe { *count = domain.assemblies.len() };
        domain.assemblies.as_ptr() as *mut *mut c_void
    }

    unsafe extern "C" fn field_get_flags(handle: *mut c_void) -> i32 {
        unsafe { field(handle).flags }
    }

    unsafe extern "C" fn field_get_name(handle: *mut c_void) -> *const c_char {
        unsafe { field(handle).name }
    }

    unsafe extern "C" fn field_get_offset(handle: *mut c_void) -> i32 {
        unsafe { field(handle).offset }
    }

    unsafe extern "C" fn field_get_parent(handle: *mut c_void) -> *mut c_void {
        unsafe { field(handle).parent.cast() }
    }

    unsafe extern "C" fn field_get_type(handle: *mut c_void) -> *mut c_void {
        unsafe { field(handle).ty.cast() }
    }

    unsafe extern "C" fn field_static_get_value(handle: *mut c_void, out: *mut c_void) {
        let record = unsafe { field(handle) };
        if record.storage.is_null() {
            return;
        }
        let size = unsafe { type_value_size(record.ty) };
        unsafe { std::ptr::copy_nonoverlapping(record.storage, out.cast::<u8>(), size) };
    }

    unsafe extern "C" fn field_static_set_value(handle: *mut c_void, value: *mut c_void) {
        let record = unsafe { field(handle) };
        if record.storage.is_null() {
            return;
        }
        let size = unsafe { type_value_size(record.ty) };
        unsafe { std::ptr::copy_nonoverlapping(value.cast::<u8>(), record.storage, size) };
    }

    unsafe extern "C" fn get_corlib() -> *mut c_void {
        fixture().corlib.cast()
    }

    unsafe extern "C" fn image_get_assembly(image: *mut c_void) -> *mut c_void {
        unsafe { (*image.cast::<ImageRecord>()).assembly.cast() }
    }

    unsafe extern "C" fn image_get_class(image: *mut c_void, index: u32) -> *mut c_void {
        let image = unsafe { &*image.cast::<ImageRecord>() };
        image
            .classes
            .get(index as usize)
            .map(|&class| class.cast())
            .unwrap_or(null_mut())
    }

    unsafe extern "C" fn image_get_class_count(image: *mut c_void) -> u32 {
        unsafe { (*image.cast::<ImageRecord>()).classes.len() as u32 }
    }

    unsafe extern "C" fn image_get_name(image: *mut c_void) -> *const c_char {
        unsafe { (*image.cast::<ImageRecord>()).name }
    }

    unsafe extern "C" fn method_get_class(handle: *mut c_void) -> *mut c_void {
        unsafe { method(handle).class.cast() }
    }

    unsafe extern "C" fn method_get_flags(handle: *mut c_void, _iflags: *mut u32) -> u32 {
        unsafe { method(handle).flags }
    }

    unsafe extern "C" fn method_get_name(handle: *mut c_void) -> *const c_char {
        unsafe { method(handle).name }
    }

    unsafe extern "C" fn method_get_object(
        _handle: *mut c_void,
        _refclass: *mut c_void,
    ) -> *mut c_void {
        null_mut()
    }

    unsafe extern "C" fn method_get_parameter_count(handle: *mut c_void) -> u8 {
        unsafe { method(handle).parameters.len() as u8 }
    }

    unsafe extern "C" fn method_get_parameter_name(
        handle: *mut c_void,
        index: u32,
    ) -> *const c_char {
        unsafe {
            method(handle)
                .parameters
                .get(index as usize)
                .map(|parameter| parameter.name)
                .unwrap_or(std::ptr::null())
        }
    }

    unsafe extern "C" fn method_get_parameter_type(
        handle: *mut c_void,
        index: u32,
    ) -> *mut c_void {
        unsafe {
            method(handle)
                .parameters
                .get(index as usize)
                .map(|parameter| parameter.ty.cast())
                .unwrap_or(null_mut())
        }
    }

    unsafe extern "C" fn method_get_return_type(handle: *mut c_void) -> *mut c_void {
        unsafe { method(handle).return_type.cast() }
    }

    unsafe extern "C" fn method_is_generic(_handle: *mut c_void) -> bool {
        false
    }

    unsafe extern "C" fn method_is_inflated(_handle: *mut c_void) -> bool {
        false
    }

    unsafe extern "C" fn method_is_instance(handle: *mut c_void) -> bool {
        unsafe { method(handle).instance }
    }

    unsafe extern "C" fn object_get_class(object: *mut c_void) -> *mut c_void {
        unsafe { object.cast::<*mut ClassRecord>().read().cast() }
    }

    unsafe extern "C" fn object_get_size(object: *mut c_void) -> u32 {
        unsafe { (*object.cast::<*mut ClassRecord>().read()).instance_size as u32 }
    }

    unsafe extern "C" fn object_get_virtual_method(
        object: *mut c_void,
        handle: *mut c_void,
    ) -> *mut c_void {
        let wanted = unsafe { method(handle) };
        let wanted_name = unsafe { CStr::from_ptr(wanted.name) };

        let mut current = unsafe { object.cast::<*mut ClassRecord>().read() };
        while !current.is_null() {
            let record = unsafe { &*current };
            for &candidate in &record.methods {
                let candidate_record = unsafe { &*candidate };
                if candidate_record.instance
                    && unsafe { CStr::from_ptr(candidate_record.name) } == wanted_name
                    && candidate_record.parameters.len() == wanted.parameters.len()
                {
                    return candidate.cast();
                }
            }
            current = record.parent;
        }
        handle
    }

    unsafe extern "C" fn object_initialize(_object: *mut c_void, exception: *mut *mut c_void) {
        unsafe { *exception = null_mut() };
    }

    unsafe extern "C" fn object_new(handle: *mut c_void) -> *mut c_void {
        let record = unsafe { class(handle) };
        let storage = zeroed(record.instance_size.max(HEADER as i32) as usize);
        unsafe { storage.cast::<*mut ClassRecord>().write(handle.cast()) };
        storage.cast()
    }

    unsafe extern "C" fn object_unbox(object: *mut c_void) -> *mut c_void {
        unsafe { object.cast::<u8>().add(HEADER).cast() }
    }

    unsafe extern "C" fn string_get_chars(string: *mut c_void) -> *const u16 {
        unsafe { string.cast::<u8>().add(HEADER + 4).cast() }
    }

    unsafe extern "C" fn string_get_length(string: *mut c_void) -> i32 {
        unsafe { string.cast::<u8>().add(HEADER).cast::<i32>().read() }
    }

    unsafe extern "C" fn string_new(content: *const c_char) -> *mut c_void {
        let content = unsafe { CStr::from_ptr(content) }.to_string_lossy();
        let units: Vec<u16> = content.encode_utf16().collect();

        let storage = zeroed(HEADER + 4 + units.len() * 2);
        unsafe {
            storage
                .cast::<*mut ClassRecord>()
                .write(fixture().string_class);
            storage.add(HEADER).cast::<i32>().write(units.len() as i32);
            std::ptr::copy_nonoverlapping(
                units.as_ptr(),
                storage.add(HEADER + 4).cast::<u16>(),
                units.len(),
            );
        }
        storage.cast()
    }

    unsafe extern "C" fn type_get_class(handle: *mut c_void) -> *mut c_void {
        unsafe { type_record(handle).class.cast() }
    }

    unsafe extern "C" fn type_get_name(handle: *mut c_void) -> *mut c_char {
        // The caller frees the name through il2cpp_free, which is a no-op
        // here, so the interned pointer can be handed out as is.
        unsafe { type_record(handle).name as *mut c_char }
    }

    unsafe extern "C" fn type_get_object(_handle: *mut c_void) -> *mut c_void {
        null_mut()
    }

    unsafe extern "C" fn type_get_type_enum(handle: *mut c_void) -> i32 {
        unsafe { type_record(handle).category }
    }

    unsafe extern "C" fn value_box(handle: *mut c_void, data: *mut c_void) -> *mut c_void {
        let record = unsafe { class(handle) };
        let storage = zeroed(record.instance_size as usize);
        unsafe {
            storage.cast::<*mut ClassRecord>().write(handle.cast());
            std::ptr::copy_nonoverlapping(
                data.cast::<u8>(),
                storage.add(HEADER),
                record.value_size as usize,
            );
        }
        storage.cast()
    }

    macro_rules! export {
        ($table:ident, $symbol:literal, $function:ident: fn($($arg:ty),*) $(-> $ret:ty)?) => {
            $table.insert(
                $symbol,
                $function as unsafe extern "C" fn($($arg),*) $(-> $ret)? as usize,
            );
        };
    }

    pub(super) fn table() -> HashMap<&'static str, usize> {
        let mut table = HashMap::new();
        export!(table, "il2cpp_alloc", alloc: fn(usize) -> *mut c_void);
        export!(table, "il2cpp_array_length", array_get_length: fn(*mut c_void) -> u32);
        export!(table, "il2cpp_array_new", array_new: fn(*mut c_void, u32) -> *mut c_void);
        export!(table, "il2cpp_assembly_get_image", assembly_get_image: fn(*mut c_void) -> *mut c_void);
        export!(table, "il2cpp_class_from_name", class_from_name: fn(*mut c_void, *const c_char, *const c_char) -> *mut c_void);
        export!(table, "il2cpp_class_from_system_type", class_from_system_type: fn(*mut c_void) -> *mut c_void);
        export!(table, "il2cpp_class_array_element_size", class_get_array_element_size: fn(*mut c_void) -> i32);
        export!(table, "il2cpp_class_enum_basetype", class_get_base_type: fn(*mut c_void) -> *mut c_void);
        export!(table, "il2cpp_class_get_element_class", class_get_element_class: fn(*mut c_void) -> *mut c_void);
        export!(table, "il2cpp_class_get_field_from_name", class_get_field_from_name: fn(*mut c_void, *const c_char) -> *mut c_void);
        export!(table, "il2cpp_class_get_fields", class_get_fields: fn(*mut c_void, *mut *mut c_void) -> *mut c_void);
        export!(table, "il2cpp_class_get_flags", class_get_flags: fn(*mut c_void) -> i32);
        export!(table, "il2cpp_class_get_image", class_get_image: fn(*mut c_void) -> *mut c_void);
        export!(table, "il2cpp_class_instance_size", class_get_instance_size: fn(*mut c_void) -> i32);
        export!(table, "il2cpp_class_get_interfaces", class_get_interfaces: fn(*mut c_void, *mut *mut c_void) -> *mut c_void);
        export!(table, "il2cpp_class_get_method_from_name", class_get_method_from_name: fn(*mut c_void, *const c_char, i32) -> *mut c_void);
        export!(table, "il2cpp_class_get_methods", class_get_methods: fn(*mut c_void, *mut *mut c_void) -> *mut c_void);
        export!(table, "il2cpp_class_get_name", class_get_name: fn(*mut c_void) -> *const c_char);
        export!(table, "il2cpp_class_get_namespace", class_get_namespace: fn(*mut c_void) -> *const c_char);
        export!(table, "il2cpp_class_get_nested_types", class_get_nested_types: fn(*mut c_void, *mut *mut c_void) -> *mut c_void);
        export!(table, "il2cpp_class_get_parent", class_get_parent: fn(*mut c_void) -> *mut c_void);
        export!(table, "il2cpp_class_get_static_field_data", class_get_static_field_data: fn(*mut c_void) -> *mut c_void);
        export!(table, "il2cpp_class_get_type", class_get_type: fn(*mut c_void) -> *mut c_void);
        export!(table, "il2cpp_class_value_size", class_get_value_type_size: fn(*mut c_void, *mut u32) -> i32);
        export!(table, "il2cpp_runtime_class_init", class_initialize: fn(*mut c_void));
        export!(table, "il2cpp_class_is_abstract", class_is_abstract: fn(*mut c_void) -> bool);
        export!(table, "il2cpp_class_is_assignable_from", class_is_assignable_from: fn(*mut c_void, *mut c_void) -> bool);
        export!(table, "il2cpp_class_is_blittable", class_is_blittable: fn(*mut c_void) -> bool);
        export!(table, "il2cpp_class_is_enum", class_is_enum: fn(*mut c_void) -> bool);
        export!(table, "il2cpp_class_is_generic", class_is_generic: fn(*mut c_void) -> bool);
        export!(table, "il2cpp_class_is_inflated", class_is_inflated: fn(*mut c_void) -> bool);
        export!(table, "il2cpp_class_is_interface", class_is_interface: fn(*mut c_void) -> bool);
        export!(table, "il2cpp_class_is_subclass_of", class_is_subclass_of: fn(*mut c_void, *mut c_void, bool) -> bool);
        export!(table, "il2cpp_class_is_valuetype", class_is_value_type: fn(*mut c_void) -> bool);
        export!(table, "il2cpp_domain_get", domain_get: fn() -> *mut c_void);
        export!(table, "il2cpp_domain_get_assemblies", domain_get_assemblies: fn(*mut c_void, *mut usize) -> *mut *mut c_void);
        export!(table, "il2cpp_field_get_flags", field_get_flags: fn(*mut c_void) -> i32);
        export!(table, "il2cpp_field_get_name", field_get_name: fn(*mut c_void) -> *const c_char);
        export!(table, "il2cpp_field_get_offset", field_get_offset: fn(*mut c_void) -> i32);
        export!(table, "il2cpp_field_get_parent", field_get_parent: fn(*mut c_void) -> *mut c_void);
        export!(table, "il2cpp_field_get_type", field_get_type: fn(*mut c_void) -> *mut c_void);
        export!(table, "il2cpp_field_static_get_value", field_static_get_value: fn(*mut c_void, *mut c_void));
        export!(table, "il2cpp_field_static_set_value", field_static_set_value: fn(*mut c_void, *mut c_void));
        export!(table, "il2cpp_free", free: fn(*mut c_void));
        export!(table, "il2cpp_get_corlib", get_corlib: fn() -> *mut c_void);
        export!(table, "il2cpp_image_get_assembly", image_get_assembly: fn(*mut c_void) -> *mut c_void);
        export!(table, "il2cpp_image_get_class", image_get_class: fn(*mut c_void, u32) -> *mut c_void);
        export!(table, "il2cpp_image_get_class_count", image_get_class_count: fn(*mut c_void) -> u32);
        export!(table, "il2cpp_image_get_name", image_get_name: fn(*mut c_void) -> *const c_char);
        export!(table, "il2cpp_method_get_class", method_get_class: fn(*mut c_void) -> *mut c_void);
        export!(table, "il2cpp_method_get_flags", method_get_flags: fn(*mut c_void, *mut u32) -> u32);
        export!(table, "il2cpp_method_get_name", method_get_name: fn(*mut c_void) -> *const c_char);
        export!(table, "il2cpp_method_get_object", method_get_object: fn(*mut c_void, *mut c_void) -> *mut c_void);
        export!(table, "il2cpp_method_get_param_count", method_get_parameter_count: fn(*mut c_void) -> u8);
        export!(table, "il2cpp_method_get_param_name", method_get_parameter_name: fn(*mut c_void, u32) -> *const c_char);
        export!(table, "il2cpp_method_get_param", method_get_parameter_type: fn(*mut c_void, u32) -> *mut c_void);
        export!(table, "il2cpp_method_get_return_type", method_get_return_type: fn(*mut c_void) -> *mut c_void);
        export!(table, "il2cpp_method_is_generic", method_is_generic: fn(*mut c_void) -> bool);
        export!(table, "il2cpp_method_is_inflated", method_is_inflated: fn(*mut c_void) -> bool);
        export!(table, "il2cpp_method_is_instance", method_is_instance: fn(*mut c_void) -> bool);
        export!(table, "il2cpp_object_get_class", object_get_class: fn(*mut c_void) -> *mut c_void);
        export!(table, "il2cpp_object_get_size", object_get_size: fn(*mut c_void) -> u32);
        export!(table, "il2cpp_object_get_virtual_method", object_get_virtual_method: fn(*mut c_void, *mut c_void) -> *mut c_void);
        export!(table, "il2cpp_runtime_object_init_exception", object_initialize: fn(*mut c_void, *mut *mut c_void));
        export!(table, "il2cpp_object_new", object_new: fn(*mut c_void) -> *mut c_void);
        export!(table, "il2cpp_object_unbox", object_unbox: fn(*mut c_void) -> *mut c_void);
        export!(table, "il2cpp_string_chars", string_get_chars: fn(*mut c_void) -> *const u16);
        export!(table, "il2cpp_string_length", string_get_length: fn(*mut c_void) -> i32);
        export!(table, "il2cpp_string_new", string_new: fn(*const c_char) -> *mut c_void);
        export!(table, "il2cpp_class_from_type", type_get_class: fn(*mut c_void) -> *mut c_void);
        export!(table, "il2cpp_type_get_name", type_get_name: fn(*mut c_void) -> *mut c_char);
        export!(table, "il2cpp_type_get_object", type_get_object: fn(*mut c_void) -> *mut c_void);
        export!(table, "il2cpp_type_get_type", type_get_type_enum: fn(*mut c_void) -> i32);
        export!(table, "il2cpp_value_box", value_box: fn(*mut c_void, *mut c_void) -> *mut c_void);
        table
    }
}
