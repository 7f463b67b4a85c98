//! The lookup surface over the runtime's loaded metadata images.

use crate::{
    error::{LookupError, Result},
    runtime::runtime,
    types::Class,
};
use std::{
    ffi::{c_void, CString},
    fmt::{Debug, Display, Formatter},
};

/// The application domain holding every loaded assembly.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Domain {
    handle: *mut c_void,
}

// SAFETY: plain address wrapper over a runtime-owned record, see Class.
unsafe impl Send for Domain {}
unsafe impl Sync for Domain {}

impl Domain {
    /// Gets the assemblies loaded into this domain.
    pub fn assemblies(&self) -> Vec<Assembly> {
        let api = runtime().api();
        let mut count: usize = 0;
        let handles = unsafe { api.domain_get_assemblies()(self.handle, &mut count) };
        if handles.is_null() {
            return Vec::new();
        }

        unsafe { std::slice::from_raw_parts(handles, count) }
            .iter()
            .map(|&handle| Assembly { handle })
            .collect()
    }

    /// Gets the assembly with the given name, if it is loaded.
    pub fn try_assembly(&self, name: &str) -> Option<Assembly> {
        self.assemblies()
            .into_iter()
            .find(|assembly| assembly.name() == name)
    }
}

impl Debug for Domain {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Domain({:#x})", self.handle as usize)
    }
}

/// A loaded assembly; a thin step towards its metadata image.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Assembly {
    handle: *mut c_void,
}

// SAFETY: as for Domain.
unsafe impl Send for Assembly {}
unsafe impl Sync for Assembly {}

impl Assembly {
    /// Gets the metadata image of this assembly.
    pub fn image(&self) -> Image {
        Image::from_handle(unsafe { runtime().api().assembly_get_image()(self.handle) })
    }

    /// Gets the name of this assembly.
    pub fn name(&self) -> String {
        self.image().name()
    }
}

impl Debug for Assembly {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Assembly({})", self.name())
    }
}

/// A metadata image: the class table of one assembly.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Image {
    handle: *mut c_void,
}

// SAFETY: as for Domain.
unsafe impl Send for Image {}
unsafe impl Sync for Image {}

impl Image {
    pub(crate) fn from_handle(handle: *mut c_void) -> Self {
        Self { handle }
    }

    pub(crate) fn raw(&self) -> *mut c_void {
        self.handle
    }

    /// Gets the assembly in which this image is defined.
    pub fn assembly(&self) -> Assembly {
        Assembly {
            handle: unsafe { runtime().api().image_get_assembly()(self.handle) },
        }
    }

    /// Gets the amount of classes defined in this image.
    pub fn class_count(&self) -> usize {
        unsafe { runtime().api().image_get_class_count()(self.handle) as usize }
    }

    /// Gets the classes defined in this image.
    pub fn classes(&self) -> Vec<Class> {
        let api = runtime().api();
        (0..self.class_count())
            .filter_map(|index| {
                Class::from_raw(unsafe { api.image_get_class()(self.handle, index as u32) })
            })
            .collect()
    }

    /// Gets the name of this image.
    pub fn name(&self) -> String {
        let api = runtime().api();
        unsafe { api.read_string(api.image_get_name()(self.handle)) }
    }

    /// Gets the class with the given namespace-qualified name defined in this
    /// image.
    pub fn class(&self, name: &str) -> Result<Class> {
        self.try_class(name).ok_or_else(|| {
            LookupError::Class {
                name: name.to_string(),
                image: self.name(),
            }
            .into()
        })
    }

    /// Gets the class with the given namespace-qualified name defined in this
    /// image, if it exists. The namespace is everything before the last dot.
    pub fn try_class(&self, name: &str) -> Option<Class> {
        let (namespace, name) = match name.rfind('.') {
            Some(index) => (&name[..index], &name[index + 1..]),
            None => ("", name),
        };

        let namespace = CString::new(namespace).ok()?;
        let name = CString::new(name).ok()?;
        let handle = unsafe {
            runtime().api().class_from_name()(self.handle, namespace.as_ptr(), name.as_ptr())
        };
        Class::from_raw(handle)
    }
}

impl Debug for Image {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Image({})", self.name())
    }
}

impl Display for Image {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// The current application domain.
pub fn domain() -> Domain {
    Domain {
        handle: unsafe { runtime().api().domain_get()() },
    }
}

/// The core library image (`mscorlib`), home of the `System` classes the ABI
/// probes anchor on.
pub fn corlib() -> Image {
    Image::from_handle(unsafe { runtime().api().get_corlib()() })
}
